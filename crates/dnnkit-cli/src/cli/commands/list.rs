//! `dnnkit list` – show catalog entries without touching the filesystem.

use anyhow::Result;
use dnnkit_core::catalog::Catalog;
use std::path::Path;

pub fn run_list(prefix: Option<&str>, catalog: Option<&Path>, groups: bool) -> Result<()> {
    let catalog = Catalog::load(catalog)?;
    let shown = if groups {
        print_groups(&catalog, prefix)
    } else {
        print_assets(&catalog, prefix)
    };
    if shown == 0 {
        println!("No assets match.");
    }
    Ok(())
}

fn print_assets(catalog: &Catalog, prefix: Option<&str>) -> usize {
    let mut shown = 0usize;
    println!("{:<28} {:<15} TARGET", "GROUP", "KIND");
    for asset in catalog.select(prefix) {
        println!(
            "{:<28} {:<15} {}",
            asset.group,
            asset.source.kind(),
            asset.target.display()
        );
        shown += 1;
    }
    shown
}

/// Group name and asset count, one line per group.
fn group_rows<'a>(catalog: &'a Catalog, prefix: Option<&str>) -> Vec<(&'a str, usize)> {
    catalog
        .groups()
        .into_iter()
        .filter(|g| prefix.map_or(true, |p| g.starts_with(p)))
        .map(|g| (g, catalog.iter().filter(|a| a.group == g).count()))
        .collect()
}

fn print_groups(catalog: &Catalog, prefix: Option<&str>) -> usize {
    let rows = group_rows(catalog, prefix);
    println!("{:<28} ASSETS", "GROUP");
    for (group, count) in &rows {
        println!("{:<28} {}", group, count);
    }
    rows.len()
}
