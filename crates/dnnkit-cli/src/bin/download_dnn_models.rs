//! `download-dnn-models [group-prefix]`: fetch the built-in catalog into the
//! current directory. Exits 0 when every selected asset verified, 15 otherwise.

use anyhow::Result;
use dnnkit_core::catalog::Catalog;
use dnnkit_core::config;
use dnnkit_core::fetch::Fetcher;
use dnnkit_core::logging;

fn run() -> Result<i32> {
    let prefix = std::env::args().nth(1);
    let cfg = config::load_or_default();
    let catalog = Catalog::builtin()?;
    let fetcher = Fetcher::in_current_dir(cfg.fetch)?;
    let report = fetcher.run(&catalog, prefix.as_deref());
    report.print_failures();
    Ok(report.exit_code())
}

fn main() {
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("download-dnn-models error: {:#}", err);
            std::process::exit(1);
        }
    }
}
