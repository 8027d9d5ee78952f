//! Round-trip check: load the written model with tract and run it once.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::path::Path;
use tract_onnx::prelude::*;

/// Seeded standard-normal values for a tensor of `shape`.
pub fn synthetic_input(shape: &[usize], seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n: usize = shape.iter().product();
    (0..n).map(|_| rng.sample::<f32, _>(StandardNormal)).collect()
}

/// Runs the model at `path` on `input`; returns the shapes of its outputs.
pub fn run_model(path: &Path, shape: &[usize], input: &[f32]) -> Result<Vec<Vec<usize>>> {
    let plan = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("load {} with tract", path.display()))?
        .into_optimized()?
        .into_runnable()?;
    let tensor = Tensor::from_shape(shape, input)?;
    let outputs = plan.run(tvec!(tensor.into()))?;
    Ok(outputs.iter().map(|t| t.shape().to_vec()).collect())
}
