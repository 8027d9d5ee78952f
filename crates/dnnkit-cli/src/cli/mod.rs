//! CLI for the dnnkit asset fetcher and checkpoint exporter.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dnnkit_core::config;
use std::path::PathBuf;

use commands::{run_checksum, run_export, run_fetch, run_list};

/// Top-level CLI for dnnkit.
#[derive(Debug, Parser)]
#[command(name = "dnnkit")]
#[command(about = "dnnkit: fetch DNN example assets and export checkpoints to ONNX", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download, extract and verify catalog assets. Exits 15 if any asset fails.
    Fetch {
        /// Only process assets whose group starts with this prefix.
        prefix: Option<String>,
        /// Catalog file to use instead of the built-in one.
        #[arg(long, value_name = "PATH")]
        catalog: Option<PathBuf>,
        /// Cache root that catalog paths are relative to (default: current directory).
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// List catalog assets (group, kind, target).
    List {
        /// Only list assets whose group starts with this prefix.
        prefix: Option<String>,
        #[arg(long, value_name = "PATH")]
        catalog: Option<PathBuf>,
        /// Print one line per group with its asset count instead.
        #[arg(long)]
        groups: bool,
    },

    /// Print the SHA-1 (default) or SHA-256 digest of a file.
    Checksum {
        /// Path to the file.
        path: PathBuf,
        #[arg(long)]
        sha256: bool,
    },

    /// Export a checkpoint to a single ONNX file.
    Export {
        /// Network description (TOML).
        #[arg(long, value_name = "NET.toml")]
        network: PathBuf,
        /// Trained parameters (safetensors).
        #[arg(long, value_name = "CKPT")]
        checkpoint: PathBuf,
        #[arg(long, short, default_value = "model.onnx")]
        output: PathBuf,
        /// Default-domain opset version (overrides config).
        #[arg(long, value_name = "N")]
        opset: Option<i64>,
        /// Skip the tract inference check of the written model.
        #[arg(long)]
        no_verify: bool,
    },
}

impl CliCommand {
    /// Parses arguments, runs the command and returns the process exit code.
    pub fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch {
                prefix,
                catalog,
                dir,
            } => run_fetch(&cfg.fetch, prefix.as_deref(), catalog.as_deref(), dir.as_deref()),
            CliCommand::List {
                prefix,
                catalog,
                groups,
            } => {
                let catalog = catalog.or_else(|| cfg.fetch.catalog.clone());
                run_list(prefix.as_deref(), catalog.as_deref(), groups)?;
                Ok(0)
            }
            CliCommand::Checksum { path, sha256 } => {
                run_checksum(&path, sha256)?;
                Ok(0)
            }
            CliCommand::Export {
                network,
                checkpoint,
                output,
                opset,
                no_verify,
            } => {
                let mut export_cfg = cfg.export.clone();
                if let Some(v) = opset {
                    export_cfg.opset_version = v;
                }
                if no_verify {
                    export_cfg.verify = false;
                }
                run_export(&network, &checkpoint, &output, &export_cfg)?;
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests;
