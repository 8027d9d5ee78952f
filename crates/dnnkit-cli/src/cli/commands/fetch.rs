//! `dnnkit fetch` – run the verify-fetch-verify engine over a catalog.

use anyhow::Result;
use dnnkit_core::catalog::Catalog;
use dnnkit_core::config::FetchConfig;
use dnnkit_core::fetch::Fetcher;
use std::path::Path;

pub fn run_fetch(
    cfg: &FetchConfig,
    prefix: Option<&str>,
    catalog: Option<&Path>,
    dir: Option<&Path>,
) -> Result<i32> {
    let catalog_path = catalog.or(cfg.catalog.as_deref());
    let catalog = Catalog::load(catalog_path)?;
    if let Some(p) = catalog_path {
        tracing::info!("using catalog {}", p.display());
    }

    let fetcher = match dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Fetcher::new(dir, cfg.clone())
        }
        None => Fetcher::in_current_dir(cfg.clone())?,
    };
    let report = fetcher.run(&catalog, prefix);
    report.print_failures();
    Ok(report.exit_code())
}
