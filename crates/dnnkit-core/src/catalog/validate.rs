//! Ordering rules between archive downloads, member extraction and cleanup.

use super::descriptor::{AssetDescriptor, AssetSource};
use super::error::CatalogError;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Checks that every archive member is extracted after its archive has been
/// fetched and before the archive is deleted.
pub fn validate_order(assets: &[AssetDescriptor]) -> Result<(), CatalogError> {
    let mut fetched: HashSet<&Path> = HashSet::new();
    let mut deleted: HashMap<&Path, usize> = HashMap::new();

    for (index, asset) in assets.iter().enumerate() {
        match &asset.source {
            AssetSource::ArchiveMember { archive, .. } => {
                if let Some(&deleted_at) = deleted.get(archive.as_path()) {
                    return Err(CatalogError::ArchiveDeletedBeforeExtract {
                        index,
                        target: asset.target.clone(),
                        archive: archive.clone(),
                        deleted_at,
                    });
                }
                if !fetched.contains(archive.as_path()) {
                    return Err(CatalogError::ArchiveNotDownloaded {
                        index,
                        target: asset.target.clone(),
                        archive: archive.clone(),
                    });
                }
            }
            AssetSource::Delete { path } => {
                fetched.remove(path.as_path());
                deleted.insert(path.as_path(), index);
                continue;
            }
            AssetSource::DirectUrl { .. } | AssetSource::Custom { .. } => {}
        }
        deleted.remove(asset.target.as_path());
        fetched.insert(asset.target.as_path());
    }
    Ok(())
}
