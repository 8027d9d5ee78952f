//! Single-stream HTTP GET into a target file.
//!
//! The body is written sequentially through a fixed-size buffer. No retries:
//! a failed transfer surfaces as a failed verification of the target.

use super::progress::{print_marks, ProgressMarks};
use crate::config::FetchConfig;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

const MIB: f64 = 1024.0 * 1024.0;

/// Applies redirect, failure and timeout settings shared by all fetchers.
pub(crate) fn configure(easy: &mut curl::easy::Easy, cfg: &FetchConfig) -> Result<()> {
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    // HTTP >= 400 is a transfer error, so error pages never reach the target.
    easy.fail_on_error(true)?;
    easy.connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))?;
    // Read timeout: abort when no byte arrives for `timeout_secs`.
    easy.low_speed_limit(1)?;
    easy.low_speed_time(Duration::from_secs(cfg.timeout_secs))?;
    Ok(())
}

/// Performs a GET of `url` on an already configured handle, truncating and
/// writing `dst`. Returns the number of body bytes written.
pub(crate) fn stream_to_file(
    easy: &mut curl::easy::Easy,
    url: &str,
    dst: &Path,
    cfg: &FetchConfig,
) -> Result<u64> {
    easy.url(url).context("invalid URL")?;
    let file = File::create(dst).with_context(|| format!("create {}", dst.display()))?;
    let mut writer = BufWriter::with_capacity(cfg.buffer_bytes.max(1), file);
    let mut marks = ProgressMarks::new(cfg.progress_interval_bytes);
    let mut write_error: Option<io::Error> = None;

    let performed = {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            if let Err(e) = writer.write_all(data) {
                write_error = Some(e);
                return Ok(0); // abort transfer
            }
            print_marks(marks.advance(data.len() as u64));
            Ok(data.len())
        })?;
        transfer.perform()
    };

    if let Some(e) = write_error {
        return Err(anyhow::Error::new(e).context(format!("write {}", dst.display())));
    }
    performed.with_context(|| format!("GET {} failed", url))?;
    writer
        .flush()
        .with_context(|| format!("flush {}", dst.display()))?;
    Ok(marks.total())
}

/// Downloads `url` into `dst`, printing the response line and progress marks.
pub fn download_url(url: &str, dst: &Path, cfg: &FetchConfig) -> Result<u64> {
    let mut easy = curl::easy::Easy::new();
    configure(&mut easy, cfg)?;

    print!("  progress ");
    let _ = io::stdout().flush();
    let result = stream_to_file(&mut easy, url, dst, cfg);
    println!();
    let written = result?;

    let code = easy.response_code().context("no response code")?;
    println!("  {} [{:.2} Mb]", code, written as f64 / MIB);
    tracing::debug!(url, code, bytes = written, "download finished");
    Ok(written)
}
