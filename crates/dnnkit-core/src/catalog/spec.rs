//! TOML form of catalog entries (`[[asset]]` tables).

use super::descriptor::{AssetDescriptor, AssetSource};
use super::error::CatalogError;
use crate::fetch::GoogleDrive;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct CatalogFile {
    #[serde(default)]
    pub asset: Vec<AssetSpec>,
}

/// One `[[asset]]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssetSpec {
    pub group: String,
    #[serde(default)]
    pub target: Option<PathBuf>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(flatten)]
    pub source: SourceSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    Url { url: String },
    ArchiveMember { archive: PathBuf, member: String },
    GoogleDrive { id: String },
    Delete { path: PathBuf },
}

impl SourceSpec {
    fn kind(&self) -> &'static str {
        match self {
            SourceSpec::Url { .. } => "url",
            SourceSpec::ArchiveMember { .. } => "archive_member",
            SourceSpec::GoogleDrive { .. } => "google_drive",
            SourceSpec::Delete { .. } => "delete",
        }
    }
}

impl AssetSpec {
    /// Builds the runtime descriptor. `index` is only used for error messages.
    pub fn into_descriptor(self, index: usize) -> Result<AssetDescriptor, CatalogError> {
        let kind = self.source.kind();
        let source = match self.source {
            SourceSpec::Url { url } => AssetSource::DirectUrl { url },
            SourceSpec::ArchiveMember { archive, member } => {
                AssetSource::ArchiveMember { archive, member }
            }
            SourceSpec::GoogleDrive { id } => AssetSource::Custom {
                fetcher: Arc::new(GoogleDrive::new(id)),
            },
            SourceSpec::Delete { path } => {
                let target = self.target.unwrap_or_else(|| path.clone());
                return Ok(AssetDescriptor {
                    group: self.group,
                    target,
                    checksum: None,
                    source: AssetSource::Delete { path },
                });
            }
        };
        let target = self
            .target
            .ok_or(CatalogError::MissingTarget { index, kind })?;
        Ok(AssetDescriptor {
            group: self.group,
            target,
            checksum: self.sha1,
            source,
        })
    }
}
