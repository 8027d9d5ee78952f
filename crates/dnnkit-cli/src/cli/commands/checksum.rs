//! Checksum command: print the digest of a file.

use anyhow::Result;
use dnnkit_core::checksum;
use std::path::Path;

/// SHA-1 matches the catalog's `sha1` field; `--sha256` for everything else.
pub fn run_checksum(path: &Path, sha256: bool) -> Result<()> {
    let digest = if sha256 {
        checksum::sha256_path(path)?
    } else {
        checksum::sha1_path(path)?
    };
    println!("{}  {}", digest, path.display());
    Ok(())
}
