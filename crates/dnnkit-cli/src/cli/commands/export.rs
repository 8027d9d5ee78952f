//! `dnnkit export` – checkpoint to ONNX.

use anyhow::Result;
use dnnkit_core::config::ExportConfig;
use dnnkit_core::export::{self, ExportOptions};
use std::path::Path;

pub fn run_export(
    network: &Path,
    checkpoint: &Path,
    output: &Path,
    cfg: &ExportConfig,
) -> Result<()> {
    let opts = ExportOptions::new(network, checkpoint, output, cfg);
    let summary = export::export(&opts)?;
    println!(
        "Wrote {} (output shape {:?})",
        opts.output.display(),
        summary.output_shape
    );
    Ok(())
}
