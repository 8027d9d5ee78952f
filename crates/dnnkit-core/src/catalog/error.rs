//! Catalog load and ordering errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("read catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("entry {index}: kind `{kind}` needs a `target`")]
    MissingTarget { index: usize, kind: &'static str },

    #[error(
        "entry {index} ({}): archive {} is not downloaded by an earlier entry",
        target.display(),
        archive.display()
    )]
    ArchiveNotDownloaded {
        index: usize,
        target: PathBuf,
        archive: PathBuf,
    },

    #[error(
        "entry {index} ({}): archive {} is already deleted by entry {deleted_at}",
        target.display(),
        archive.display()
    )]
    ArchiveDeletedBeforeExtract {
        index: usize,
        target: PathBuf,
        archive: PathBuf,
        deleted_at: usize,
    },
}
