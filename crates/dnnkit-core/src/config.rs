use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MIB: u64 = 1024 * 1024;

/// Transport and buffering parameters for the asset fetcher (`[fetch]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Seconds without incoming data before a transfer is abandoned.
    pub timeout_secs: u64,
    /// Seconds allowed for establishing the connection.
    pub connect_timeout_secs: u64,
    /// Write buffer size for streamed downloads and archive extraction.
    pub buffer_bytes: usize,
    /// A progress mark is printed every time this many bytes have been written.
    pub progress_interval_bytes: u64,
    /// Optional catalog file used instead of the built-in one.
    pub catalog: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 30,
            buffer_bytes: (10 * MIB) as usize,
            progress_interval_bytes: 10 * MIB,
            catalog: None,
        }
    }
}

/// ONNX export parameters (`[export]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Default-domain opset version written to the model.
    pub opset_version: i64,
    /// Seed for fresh parameter initialization and the synthetic input.
    pub seed: u64,
    /// Load the written model with tract and run one inference on it.
    pub verify: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            opset_version: 10,
            seed: 0,
            verify: true,
        }
    }
}

/// Global configuration loaded from `~/.config/dnnkit/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnnkitConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dnnkit")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DnnkitConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<DnnkitConfig> {
    if !path.exists() {
        let default_cfg = DnnkitConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: DnnkitConfig = toml::from_str(&data)?;
    Ok(cfg)
}

/// [`load_or_init`], falling back to built-in defaults when the config
/// directory is unusable.
pub fn load_or_default() -> DnnkitConfig {
    or_default(load_or_init())
}

fn or_default(loaded: Result<DnnkitConfig>) -> DnnkitConfig {
    loaded.unwrap_or_else(|e| {
        tracing::warn!("config unavailable, using defaults: {:#}", e);
        DnnkitConfig::default()
    })
}
