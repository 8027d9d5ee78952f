//! Single-member extraction from zip and tar-family archives.
//!
//! The archive type is detected from content, never from the file name.

use anyhow::{anyhow, Context, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tar::Archive;
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    TarBz2,
    Tar,
}

impl ArchiveKind {
    /// Zip when a central directory parses; otherwise tar, unwrapped by magic bytes.
    pub fn detect(file: &mut File) -> Result<Self> {
        let is_zip = ZipArchive::new(&mut *file).is_ok();
        file.seek(SeekFrom::Start(0)).context("rewind archive")?;
        if is_zip {
            return Ok(ArchiveKind::Zip);
        }

        let mut magic = [0u8; 3];
        let n = read_up_to(file, &mut magic)?;
        file.seek(SeekFrom::Start(0)).context("rewind archive")?;
        Ok(match &magic[..n] {
            [0x1f, 0x8b, ..] => ArchiveKind::TarGz,
            [b'B', b'Z', b'h'] => ArchiveKind::TarBz2,
            _ => ArchiveKind::Tar,
        })
    }
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).context("read archive header")?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Member names are compared without a leading `./`.
fn normalize(name: &str) -> &str {
    name.trim_start_matches("./")
}

/// Copies `member` of `archive` into `dst`. Fails without touching `dst` when
/// the member does not exist. Returns the number of bytes written.
pub fn extract_member(archive: &Path, member: &str, dst: &Path, buffer_bytes: usize) -> Result<u64> {
    let mut file =
        File::open(archive).with_context(|| format!("open archive {}", archive.display()))?;
    let kind = ArchiveKind::detect(&mut file)?;
    tracing::debug!(archive = %archive.display(), ?kind, member, "extracting member");
    match kind {
        ArchiveKind::Zip => extract_zip(file, member, dst, buffer_bytes),
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(file), member, dst, buffer_bytes),
        ArchiveKind::TarBz2 => extract_tar(BzDecoder::new(file), member, dst, buffer_bytes),
        ArchiveKind::Tar => extract_tar(file, member, dst, buffer_bytes),
    }
}

fn copy_to(reader: &mut dyn Read, dst: &Path, buffer_bytes: usize) -> Result<u64> {
    let out = File::create(dst).with_context(|| format!("create {}", dst.display()))?;
    let mut writer = BufWriter::with_capacity(buffer_bytes.max(1), out);
    let n = io::copy(reader, &mut writer).with_context(|| format!("write {}", dst.display()))?;
    writer
        .flush()
        .with_context(|| format!("flush {}", dst.display()))?;
    Ok(n)
}

fn extract_zip(file: File, member: &str, dst: &Path, buffer_bytes: usize) -> Result<u64> {
    let mut archive = ZipArchive::new(file).context("open zip archive")?;
    let wanted = normalize(member);
    let name = archive
        .file_names()
        .find(|n| normalize(n) == wanted)
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("member {} not found in zip archive", member))?;
    let mut entry = archive.by_name(&name).context("read zip entry")?;
    copy_to(&mut entry, dst, buffer_bytes)
}

fn extract_tar<R: Read>(reader: R, member: &str, dst: &Path, buffer_bytes: usize) -> Result<u64> {
    let mut archive = Archive::new(reader);
    let wanted = normalize(member);
    for entry in archive.entries().context("iterate tar entries")? {
        let mut entry = entry.context("read tar entry")?;
        let path = entry.path().context("read entry path")?.into_owned();
        if normalize(&path.to_string_lossy()) == wanted {
            return copy_to(&mut entry, dst, buffer_bytes);
        }
    }
    Err(anyhow!("member {} not found in tar archive", member))
}
