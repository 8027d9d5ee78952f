//! File digests used as the sole success criterion for fetched assets.
//!
//! Catalog entries carry SHA-1 digests; SHA-256 is kept for the `checksum`
//! command.

use anyhow::{Context, Result};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

fn digest_path<D: Digest>(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute SHA-1 of a file and return the digest as lowercase hex.
pub fn sha1_path(path: &Path) -> Result<String> {
    digest_path::<Sha1>(path)
}

/// Compute SHA-256 of a file and return the digest as lowercase hex.
pub fn sha256_path(path: &Path) -> Result<String> {
    digest_path::<Sha256>(path)
}

/// Returns true only when `expected` is set and the file's SHA-1 equals it
/// (exact, case-sensitive). A missing or unreadable file is "not verified".
pub fn verify(path: &Path, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    println!("  expect {}", expected);
    match sha1_path(path) {
        Ok(actual) => {
            println!("  actual {}", actual);
            actual == expected
        }
        Err(e) => {
            println!("  catch {:#}", e);
            tracing::debug!(path = %path.display(), "verification read failed: {:#}", e);
            false
        }
    }
}
