//! Sequential network descriptions and their lowering to an ONNX graph.

use super::checkpoint::{Checkpoint, ParamTensor};
use super::onnx::{attr_float, attr_int, attr_ints, GraphBuilder, ModelProto};
use super::ExportError;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

fn default_input_name() -> String {
    "input".to_string()
}

fn default_output_names() -> Vec<String> {
    vec!["output".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_one() -> usize {
    1
}

fn default_epsilon() -> f32 {
    1e-5
}

/// Network description loaded from TOML.
///
/// ```toml
/// name = "tiny"
/// input_shape = [1, 3, 8, 8]
///
/// [[layers]]
/// op = "conv2d"
/// name = "conv1"
/// in_channels = 3
/// out_channels = 4
/// kernel = 3
/// padding = 1
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub input_shape: Vec<usize>,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_output_names")]
    pub output_names: Vec<String>,
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Layer {
    Conv2d {
        name: String,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        #[serde(default = "default_one")]
        stride: usize,
        #[serde(default)]
        padding: usize,
        #[serde(default = "default_true")]
        bias: bool,
    },
    BatchNorm2d {
        name: String,
        channels: usize,
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
    Relu,
    MaxPool2d {
        kernel: usize,
        stride: Option<usize>,
    },
    Flatten,
    Linear {
        name: String,
        in_features: usize,
        out_features: usize,
        #[serde(default = "default_true")]
        bias: bool,
    },
    Softmax,
}

/// Fresh value of a parameter the checkpoint does not provide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    /// U(-bound, bound) with bound = 1/sqrt(fan_in).
    Uniform { fan_in: usize },
    Ones,
    Zeros,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub key: String,
    pub shape: Vec<usize>,
    pub init: Init,
}

impl ParamSpec {
    fn new(key: String, shape: Vec<usize>, init: Init) -> Self {
        Self { key, shape, init }
    }

    fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    fn fresh(&self, rng: &mut StdRng) -> Vec<f32> {
        match self.init {
            Init::Uniform { fan_in } => {
                let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
                (0..self.numel()).map(|_| rng.gen_range(-bound..=bound)).collect()
            }
            Init::Ones => vec![1.0; self.numel()],
            Init::Zeros => vec![0.0; self.numel()],
        }
    }
}

impl Layer {
    fn params(&self) -> Vec<ParamSpec> {
        match self {
            Layer::Conv2d {
                name,
                in_channels,
                out_channels,
                kernel,
                bias,
                ..
            } => {
                let fan_in = in_channels * kernel * kernel;
                let mut p = vec![ParamSpec::new(
                    format!("{name}.weight"),
                    vec![*out_channels, *in_channels, *kernel, *kernel],
                    Init::Uniform { fan_in },
                )];
                if *bias {
                    p.push(ParamSpec::new(
                        format!("{name}.bias"),
                        vec![*out_channels],
                        Init::Uniform { fan_in },
                    ));
                }
                p
            }
            Layer::BatchNorm2d { name, channels, .. } => vec![
                ParamSpec::new(format!("{name}.weight"), vec![*channels], Init::Ones),
                ParamSpec::new(format!("{name}.bias"), vec![*channels], Init::Zeros),
                ParamSpec::new(format!("{name}.running_mean"), vec![*channels], Init::Zeros),
                ParamSpec::new(format!("{name}.running_var"), vec![*channels], Init::Ones),
            ],
            Layer::Linear {
                name,
                in_features,
                out_features,
                bias,
            } => {
                let fan_in = *in_features;
                let mut p = vec![ParamSpec::new(
                    format!("{name}.weight"),
                    vec![*out_features, *in_features],
                    Init::Uniform { fan_in },
                )];
                if *bias {
                    p.push(ParamSpec::new(
                        format!("{name}.bias"),
                        vec![*out_features],
                        Init::Uniform { fan_in },
                    ));
                }
                p
            }
            Layer::Relu | Layer::MaxPool2d { .. } | Layer::Flatten | Layer::Softmax => Vec::new(),
        }
    }
}

fn invalid(msg: String) -> ExportError {
    ExportError::InvalidNetwork(msg)
}

fn expect_rank(layer: &str, shape: &[usize], rank: usize) -> Result<(), ExportError> {
    if shape.len() != rank {
        return Err(invalid(format!(
            "{layer} expects a rank-{rank} input, got {shape:?}"
        )));
    }
    Ok(())
}

/// Output length of a sliding window; `None` when the window does not fit.
fn window_out(len: usize, kernel: usize, stride: usize, padding: usize) -> Option<usize> {
    let padded = len + 2 * padding;
    if kernel == 0 || stride == 0 || padded < kernel {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

/// Parameter values used for the export, keyed by parameter name.
pub type ParamValues = BTreeMap<String, ParamTensor>;

/// Lowered graph plus the inferred output shape.
#[derive(Debug, Clone)]
pub struct Traced {
    pub model: ModelProto,
    pub output_shape: Vec<usize>,
}

impl NetworkSpec {
    pub fn from_toml_str(data: &str) -> Result<Self> {
        let spec: NetworkSpec = toml::from_str(data).context("parse network description")?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read network description {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("load {}", path.display()))
    }

    fn validate(&self) -> Result<(), ExportError> {
        if self.input_shape.is_empty() || self.input_shape.contains(&0) {
            return Err(invalid(format!(
                "input_shape {:?} must be non-empty and positive",
                self.input_shape
            )));
        }
        if self.output_names.len() != 1 {
            return Err(invalid(format!(
                "a sequential network has one output, got {} output names",
                self.output_names.len()
            )));
        }
        if self.layers.is_empty() {
            return Err(invalid("network has no layers".to_string()));
        }
        Ok(())
    }

    /// Every parameter of the network, in layer order.
    pub fn parameters(&self) -> Vec<ParamSpec> {
        self.layers.iter().flat_map(Layer::params).collect()
    }

    /// Checkpoint tensors where present (shape-checked), fresh values otherwise.
    pub fn resolve_parameters(
        &self,
        checkpoint: &Checkpoint,
        rng: &mut StdRng,
    ) -> Result<ParamValues, ExportError> {
        let mut values = ParamValues::new();
        for spec in self.parameters() {
            if let Some(dtype) = checkpoint.non_float_dtype(&spec.key) {
                return Err(ExportError::UnsupportedDtype {
                    key: spec.key,
                    dtype: dtype.to_string(),
                });
            }
            let tensor = match checkpoint.get(&spec.key) {
                Some(t) if t.shape != spec.shape => {
                    return Err(ExportError::ShapeMismatch {
                        key: spec.key,
                        expected: spec.shape,
                        found: t.shape.clone(),
                    })
                }
                Some(t) => t.clone(),
                None => ParamTensor {
                    data: spec.fresh(rng),
                    shape: spec.shape.clone(),
                },
            };
            values.insert(spec.key, tensor);
        }
        Ok(values)
    }

    /// Lowers the layers into ONNX nodes while tracking tensor shapes.
    pub fn trace(&self, params: &ParamValues, opset_version: i64) -> Result<Traced, ExportError> {
        let mut g = GraphBuilder::new();
        let mut shape = self.input_shape.clone();
        let mut current = self.input_name.clone();

        let embed = |g: &mut GraphBuilder, key: &str| -> Result<(), ExportError> {
            let t = params
                .get(key)
                .ok_or_else(|| invalid(format!("parameter {key} was not resolved")))?;
            g.initializer(key, &t.shape, &t.data);
            Ok(())
        };

        for layer in &self.layers {
            current = match layer {
                Layer::Conv2d {
                    name,
                    in_channels,
                    out_channels,
                    kernel,
                    stride,
                    padding,
                    bias,
                } => {
                    expect_rank(name, &shape, 4)?;
                    if shape[1] != *in_channels {
                        return Err(invalid(format!(
                            "{name} expects {in_channels} channels, got {}",
                            shape[1]
                        )));
                    }
                    let h = window_out(shape[2], *kernel, *stride, *padding);
                    let w = window_out(shape[3], *kernel, *stride, *padding);
                    let (Some(h), Some(w)) = (h, w) else {
                        return Err(invalid(format!("{name} kernel does not fit input {shape:?}")));
                    };
                    let weight = format!("{name}.weight");
                    embed(&mut g, &weight)?;
                    let mut inputs = vec![current.as_str(), weight.as_str()];
                    let bias_key = format!("{name}.bias");
                    if *bias {
                        embed(&mut g, &bias_key)?;
                        inputs.push(bias_key.as_str());
                    }
                    let (k, s, p) = (*kernel as i64, *stride as i64, *padding as i64);
                    let out = g.node(
                        "Conv",
                        &inputs,
                        vec![
                            attr_ints("kernel_shape", &[k, k]),
                            attr_ints("strides", &[s, s]),
                            attr_ints("pads", &[p, p, p, p]),
                            attr_ints("dilations", &[1, 1]),
                            attr_int("group", 1),
                        ],
                    );
                    shape = vec![shape[0], *out_channels, h, w];
                    out
                }
                Layer::BatchNorm2d {
                    name,
                    channels,
                    epsilon,
                } => {
                    expect_rank(name, &shape, 4)?;
                    if shape[1] != *channels {
                        return Err(invalid(format!(
                            "{name} expects {channels} channels, got {}",
                            shape[1]
                        )));
                    }
                    let keys = ["weight", "bias", "running_mean", "running_var"]
                        .map(|suffix| format!("{name}.{suffix}"));
                    for key in &keys {
                        embed(&mut g, key)?;
                    }
                    let mut inputs = vec![current.as_str()];
                    inputs.extend(keys.iter().map(String::as_str));
                    g.node(
                        "BatchNormalization",
                        &inputs,
                        vec![attr_float("epsilon", *epsilon)],
                    )
                }
                Layer::Relu => g.node("Relu", &[current.as_str()], Vec::new()),
                Layer::MaxPool2d { kernel, stride } => {
                    expect_rank("max_pool2d", &shape, 4)?;
                    let stride = stride.unwrap_or(*kernel);
                    let h = window_out(shape[2], *kernel, stride, 0);
                    let w = window_out(shape[3], *kernel, stride, 0);
                    let (Some(h), Some(w)) = (h, w) else {
                        return Err(invalid(format!("max_pool2d window does not fit input {shape:?}")));
                    };
                    let (k, s) = (*kernel as i64, stride as i64);
                    let out = g.node(
                        "MaxPool",
                        &[current.as_str()],
                        vec![
                            attr_ints("kernel_shape", &[k, k]),
                            attr_ints("strides", &[s, s]),
                            attr_ints("pads", &[0, 0, 0, 0]),
                        ],
                    );
                    shape = vec![shape[0], shape[1], h, w];
                    out
                }
                Layer::Flatten => {
                    if shape.len() < 2 {
                        return Err(invalid(format!("flatten needs a batch axis, got {shape:?}")));
                    }
                    let out = g.node(
                        "Flatten",
                        &[current.as_str()],
                        vec![attr_int("axis", 1)],
                    );
                    shape = vec![shape[0], shape[1..].iter().product()];
                    out
                }
                Layer::Linear {
                    name,
                    in_features,
                    out_features,
                    bias,
                } => {
                    expect_rank(name, &shape, 2)?;
                    if shape[1] != *in_features {
                        return Err(invalid(format!(
                            "{name} expects {in_features} features, got {}",
                            shape[1]
                        )));
                    }
                    let weight = format!("{name}.weight");
                    embed(&mut g, &weight)?;
                    let out = if *bias {
                        let bias_key = format!("{name}.bias");
                        embed(&mut g, &bias_key)?;
                        g.node(
                            "Gemm",
                            &[current.as_str(), weight.as_str(), bias_key.as_str()],
                            vec![attr_int("transB", 1)],
                        )
                    } else {
                        // Gemm needs C before opset 11; Transpose + MatMul keeps the stored
                        // weight layout.
                        let wt = g.node(
                            "Transpose",
                            &[weight.as_str()],
                            vec![attr_ints("perm", &[1, 0])],
                        );
                        g.node("MatMul", &[current.as_str(), wt.as_str()], Vec::new())
                    };
                    shape = vec![shape[0], *out_features];
                    out
                }
                Layer::Softmax => {
                    if shape.len() < 2 {
                        return Err(invalid(format!("softmax needs a batch axis, got {shape:?}")));
                    }
                    g.node(
                        "Softmax",
                        &[current.as_str()],
                        vec![attr_int("axis", 1)],
                    )
                }
            };
        }

        let output_name = self.output_names[0].as_str();
        g.rename_last_output(output_name);
        tracing::debug!(network = %self.name, nodes = g.node_count(), ?shape, "graph traced");
        let model = g.finish(
            &self.name,
            (&self.input_name, &self.input_shape),
            (output_name, &shape),
            opset_version,
        );
        Ok(Traced {
            model,
            output_shape: shape,
        })
    }
}
