//! Checkpoint → ONNX export.
//!
//! A checkpoint is matched by name against the parameters of a sequential
//! network description. Missing parameters keep a seeded fresh
//! initialization; a checkpoint sharing no names with the network aborts the
//! export before anything is written.

mod checkpoint;
mod network;
pub mod onnx;
mod verify;

pub use checkpoint::{Checkpoint, KeyReport, ParamTensor, CONTAINER_PREFIX, PARALLEL_PREFIX};
pub use network::{Init, Layer, NetworkSpec, ParamSpec, ParamValues, Traced};
pub use verify::{run_model, synthetic_input};

use crate::config::ExportConfig;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("checkpoint shares no parameter names with network {network}")]
    NoMatchingKeys { network: String },

    #[error("parameter {key}: checkpoint shape {found:?} does not match model shape {expected:?}")]
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("tensor {key} has unsupported dtype {dtype}")]
    UnsupportedDtype { key: String, dtype: String },

    #[error("invalid network: {0}")]
    InvalidNetwork(String),
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub network: PathBuf,
    pub checkpoint: PathBuf,
    pub output: PathBuf,
    pub opset_version: i64,
    pub seed: u64,
    pub verify: bool,
}

impl ExportOptions {
    pub fn new(
        network: impl Into<PathBuf>,
        checkpoint: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        cfg: &ExportConfig,
    ) -> Self {
        Self {
            network: network.into(),
            checkpoint: checkpoint.into(),
            output: output.into(),
            opset_version: cfg.opset_version,
            seed: cfg.seed,
            verify: cfg.verify,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub report: KeyReport,
    /// Output shape inferred while tracing.
    pub output_shape: Vec<usize>,
    /// Output shapes produced by tract, when verification ran.
    pub verified_shapes: Option<Vec<Vec<usize>>>,
}

/// Loads, matches, traces and writes; see the module docs.
pub fn export(opts: &ExportOptions) -> Result<ExportSummary> {
    let net = NetworkSpec::from_path(&opts.network)?;
    let ckpt = Checkpoint::load(&opts.checkpoint)?;
    export_with(&net, ckpt, opts)
}

/// [`export`] with the network and checkpoint already in memory.
pub fn export_with(net: &NetworkSpec, mut ckpt: Checkpoint, opts: &ExportOptions) -> Result<ExportSummary> {
    if ckpt.unwrap_container() {
        println!("remove prefix 'module.'");
    }

    let params = net.parameters();
    let report = KeyReport::compare(params.iter().map(|p| p.key.as_str()), ckpt.keys());
    report.print();
    report.ensure_overlap(&net.name)?;

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let values = net.resolve_parameters(&ckpt, &mut rng)?;
    let traced = net.trace(&values, opts.opset_version)?;

    write_model(&opts.output, &traced)?;
    tracing::info!(
        network = %net.name,
        output = %opts.output.display(),
        used = report.used.len(),
        missing = report.missing.len(),
        "model exported"
    );

    let verified_shapes = if opts.verify {
        let input = synthetic_input(&net.input_shape, opts.seed);
        let shapes = run_model(&opts.output, &net.input_shape, &input)?;
        for (name, shape) in net.output_names.iter().zip(&shapes) {
            println!("{}: {:?}", name, shape);
        }
        Some(shapes)
    } else {
        None
    };

    Ok(ExportSummary {
        report,
        output_shape: traced.output_shape,
        verified_shapes,
    })
}

fn write_model(path: &Path, traced: &Traced) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
    }
    std::fs::write(path, onnx::encode_model(&traced.model))
        .with_context(|| format!("write {}", path.display()))
}
