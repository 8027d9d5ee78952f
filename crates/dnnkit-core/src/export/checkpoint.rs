//! Trained parameter checkpoints (safetensors) and key matching.

use super::ExportError;
use anyhow::{Context, Result};
use safetensors::{Dtype, SafeTensors};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Prefix of a wrapped `{"state_dict": ...}` container, flattened.
pub const CONTAINER_PREFIX: &str = "state_dict.";
/// Prefix left behind by data-parallel training wrappers.
pub const PARALLEL_PREFIX: &str = "module.";

#[derive(Debug, Clone, PartialEq)]
pub struct ParamTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Float(ParamTensor),
    /// Non-float tensor (e.g. an i64 `num_batches_tracked` counter); kept by
    /// name only so it still counts as an unused key.
    Other { dtype: String },
}

/// Name → tensor mapping; float tensors are stored as f32.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    entries: BTreeMap<String, Entry>,
}

fn le_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn le_f64_as_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(8)
        .map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            f64::from_le_bytes(b) as f32
        })
        .collect()
}

fn strip_keys(
    entries: BTreeMap<String, Entry>,
    prefix: &str,
    keep_unprefixed: bool,
) -> BTreeMap<String, Entry> {
    entries
        .into_iter()
        .filter_map(|(k, v)| match k.strip_prefix(prefix) {
            Some(s) => Some((s.to_string(), v)),
            None if keep_unprefixed => Some((k, v)),
            None => None,
        })
        .collect()
}

impl Checkpoint {
    pub fn from_tensors(tensors: BTreeMap<String, ParamTensor>) -> Self {
        Self {
            entries: tensors.into_iter().map(|(k, t)| (k, Entry::Float(t))).collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read checkpoint {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("parse checkpoint {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let st = SafeTensors::deserialize(bytes)?;
        let mut entries = BTreeMap::new();
        for (name, view) in st.tensors() {
            let data = match view.dtype() {
                Dtype::F32 => le_f32(view.data()),
                Dtype::F64 => le_f64_as_f32(view.data()),
                other => {
                    tracing::debug!(tensor = %name, dtype = ?other, "non-float tensor, not loaded");
                    entries.insert(
                        name,
                        Entry::Other {
                            dtype: format!("{:?}", other),
                        },
                    );
                    continue;
                }
            };
            let tensor = ParamTensor {
                shape: view.shape().to_vec(),
                data,
            };
            entries.insert(name, Entry::Float(tensor));
        }
        tracing::debug!(tensors = entries.len(), "checkpoint loaded");
        Ok(Self { entries })
    }

    /// Unwraps a `state_dict.` container, then strips `module.` from keys.
    /// Returns true when the `module.` prefix was removed from any key.
    pub fn unwrap_container(&mut self) -> bool {
        if self.entries.keys().any(|k| k.starts_with(CONTAINER_PREFIX)) {
            self.entries = strip_keys(std::mem::take(&mut self.entries), CONTAINER_PREFIX, false);
        }
        if !self.entries.keys().any(|k| k.starts_with(PARALLEL_PREFIX)) {
            return false;
        }
        self.entries = strip_keys(std::mem::take(&mut self.entries), PARALLEL_PREFIX, true);
        true
    }

    /// Float tensor stored under `key`.
    pub fn get(&self, key: &str) -> Option<&ParamTensor> {
        match self.entries.get(key) {
            Some(Entry::Float(t)) => Some(t),
            _ => None,
        }
    }

    /// Dtype name when `key` holds a tensor that cannot be used as a parameter.
    pub fn non_float_dtype(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(Entry::Other { dtype }) => Some(dtype.as_str()),
            _ => None,
        }
    }

    /// Every key, float or not.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Set comparison between model parameter names and checkpoint keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyReport {
    /// In the model, absent from the checkpoint.
    pub missing: BTreeSet<String>,
    /// In the checkpoint, unknown to the model.
    pub unused: BTreeSet<String>,
    pub used: BTreeSet<String>,
}

impl KeyReport {
    pub fn compare<'a, M, C>(model_keys: M, checkpoint_keys: C) -> Self
    where
        M: IntoIterator<Item = &'a str>,
        C: IntoIterator<Item = &'a str>,
    {
        let model: BTreeSet<String> = model_keys.into_iter().map(str::to_owned).collect();
        let ckpt: BTreeSet<String> = checkpoint_keys.into_iter().map(str::to_owned).collect();
        Self {
            missing: model.difference(&ckpt).cloned().collect(),
            unused: ckpt.difference(&model).cloned().collect(),
            used: model.intersection(&ckpt).cloned().collect(),
        }
    }

    pub fn print(&self) {
        println!("Missing keys:{}", self.missing.len());
        println!("Unused checkpoint keys:{}", self.unused.len());
        println!("Used keys:{}", self.used.len());
    }

    /// Fails with [`ExportError::NoMatchingKeys`] when nothing overlaps.
    pub fn ensure_overlap(&self, network: &str) -> Result<(), ExportError> {
        if self.used.is_empty() {
            return Err(ExportError::NoMatchingKeys {
                network: network.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetensors::tensor::TensorView;

    fn tensor(v: f32) -> ParamTensor {
        ParamTensor {
            shape: vec![1],
            data: vec![v],
        }
    }

    fn ckpt(keys: &[&str]) -> Checkpoint {
        Checkpoint::from_tensors(keys.iter().map(|k| (k.to_string(), tensor(1.0))).collect())
    }

    #[test]
    fn strips_parallel_prefix() {
        let mut c = ckpt(&["module.conv1.weight", "module.conv1.bias", "fc.weight"]);
        assert!(c.unwrap_container());
        let keys: Vec<&str> = c.keys().collect();
        assert_eq!(keys, vec!["conv1.bias", "conv1.weight", "fc.weight"]);
    }

    #[test]
    fn unwraps_state_dict_container() {
        let mut c = ckpt(&["state_dict.module.fc.weight", "epoch", "optimizer.lr"]);
        assert!(c.unwrap_container());
        let keys: Vec<&str> = c.keys().collect();
        assert_eq!(keys, vec!["fc.weight"]);
    }

    #[test]
    fn plain_checkpoint_is_untouched() {
        let mut c = ckpt(&["fc.weight"]);
        assert!(!c.unwrap_container());
        assert_eq!(c.keys().collect::<Vec<_>>(), vec!["fc.weight"]);
    }

    #[test]
    fn key_report_counts() {
        let r = KeyReport::compare(
            ["a.weight", "a.bias", "b.weight"],
            ["a.weight", "a.bias", "num_batches_tracked"],
        );
        assert_eq!(r.missing.len(), 1);
        assert_eq!(r.unused.len(), 1);
        assert_eq!(r.used.len(), 2);
        assert!(r.ensure_overlap("net").is_ok());
    }

    #[test]
    fn zero_overlap_is_fatal() {
        let r = KeyReport::compare(["a.weight"], ["z.weight"]);
        assert!(matches!(
            r.ensure_overlap("net"),
            Err(ExportError::NoMatchingKeys { .. })
        ));
    }

    #[test]
    fn reads_f32_and_f64_tensors() {
        let f32_bytes: Vec<u8> = [1.0f32, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let f64_bytes: Vec<u8> = [0.5f64].iter().flat_map(|v| v.to_le_bytes()).collect();
        let views = vec![
            ("w".to_string(), TensorView::new(Dtype::F32, vec![2], &f32_bytes).unwrap()),
            ("b".to_string(), TensorView::new(Dtype::F64, vec![1], &f64_bytes).unwrap()),
        ];
        let bytes = safetensors::serialize(views, &None).unwrap();
        let c = Checkpoint::from_bytes(&bytes).unwrap();
        assert_eq!(c.get("w").unwrap().data, vec![1.0, 2.0]);
        assert_eq!(c.get("b").unwrap().data, vec![0.5]);
    }

    #[test]
    fn integer_tensors_are_kept_as_keys_only() {
        let w = 1.0f32.to_le_bytes();
        let raw = 7i64.to_le_bytes();
        let views = vec![
            ("module.bn1.weight".to_string(), TensorView::new(Dtype::F32, vec![1], &w).unwrap()),
            (
                "module.bn1.num_batches_tracked".to_string(),
                TensorView::new(Dtype::I64, vec![], &raw).unwrap(),
            ),
        ];
        let bytes = safetensors::serialize(views, &None).unwrap();
        let mut c = Checkpoint::from_bytes(&bytes).unwrap();
        assert!(c.unwrap_container());

        let keys: Vec<&str> = c.keys().collect();
        assert_eq!(keys, vec!["bn1.num_batches_tracked", "bn1.weight"]);
        assert!(c.get("bn1.num_batches_tracked").is_none());
        assert_eq!(c.non_float_dtype("bn1.num_batches_tracked"), Some("I64"));
        assert_eq!(c.non_float_dtype("bn1.weight"), None);
    }
}
