//! One catalog entry: where an asset lives locally and how to obtain it.

use crate::fetch::RemoteFetch;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Fetch strategy of a descriptor. Each case carries only the fields it needs.
#[derive(Debug, Clone)]
pub enum AssetSource {
    /// Plain HTTP(S) GET of `url` into the target.
    DirectUrl { url: String },
    /// Copy one member out of an archive fetched by an earlier entry.
    ArchiveMember { archive: PathBuf, member: String },
    /// Delegate the transfer to an injected fetcher (e.g. a cookie-aware host).
    Custom { fetcher: Arc<dyn RemoteFetch> },
    /// Cleanup only: remove `path` if it exists. Never checksummed.
    Delete { path: PathBuf },
}

impl AssetSource {
    /// Short kind label, matching the `kind` key of catalog files.
    pub fn kind(&self) -> &'static str {
        match self {
            AssetSource::DirectUrl { .. } => "url",
            AssetSource::ArchiveMember { .. } => "archive_member",
            AssetSource::Custom { .. } => "custom",
            AssetSource::Delete { .. } => "delete",
        }
    }

    /// Human-readable origin (URL, archive member, fetcher label or deleted path).
    pub fn origin(&self) -> String {
        match self {
            AssetSource::DirectUrl { url } => url.clone(),
            AssetSource::ArchiveMember { archive, member } => {
                format!("{}:{}", archive.display(), member)
            }
            AssetSource::Custom { fetcher } => fetcher.describe(),
            AssetSource::Delete { path } => path.display().to_string(),
        }
    }
}

/// A single catalog entry. Read-only for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct AssetDescriptor {
    /// Selection tag; entries of one example share it.
    pub group: String,
    /// Destination file, relative to the cache root.
    pub target: PathBuf,
    /// Expected lowercase hex SHA-1. `None` means the target is never considered verified.
    pub checksum: Option<String>,
    pub source: AssetSource,
}

impl AssetDescriptor {
    pub fn direct_url(
        group: impl Into<String>,
        target: impl Into<PathBuf>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            target: target.into(),
            checksum: None,
            source: AssetSource::DirectUrl { url: url.into() },
        }
    }

    pub fn archive_member(
        group: impl Into<String>,
        target: impl Into<PathBuf>,
        archive: impl Into<PathBuf>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            target: target.into(),
            checksum: None,
            source: AssetSource::ArchiveMember {
                archive: archive.into(),
                member: member.into(),
            },
        }
    }

    pub fn custom(
        group: impl Into<String>,
        target: impl Into<PathBuf>,
        fetcher: Arc<dyn RemoteFetch>,
    ) -> Self {
        Self {
            group: group.into(),
            target: target.into(),
            checksum: None,
            source: AssetSource::Custom { fetcher },
        }
    }

    /// Cleanup entry; its target is the deleted path itself.
    pub fn delete(group: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            group: group.into(),
            target: path.clone(),
            checksum: None,
            source: AssetSource::Delete { path },
        }
    }

    pub fn with_checksum(mut self, sha1: impl Into<String>) -> Self {
        self.checksum = Some(sha1.into());
        self
    }

    /// Prefix match on the group; `None` selects everything.
    pub fn matches(&self, prefix: Option<&str>) -> bool {
        prefix.map_or(true, |p| self.group.starts_with(p))
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.source, AssetSource::Delete { .. })
    }
}

impl fmt::Display for AssetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Asset <{}> {}", self.group, self.target.display())
    }
}
