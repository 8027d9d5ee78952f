//! Declarative catalog of example assets.
//!
//! The catalog is configuration: it is built once (from the embedded
//! `dnn_models.toml` or a user file), validated for archive ordering, and
//! never mutated afterwards.

mod descriptor;
mod error;
mod spec;
mod validate;

pub use descriptor::{AssetDescriptor, AssetSource};
pub use error::CatalogError;
pub use spec::{AssetSpec, SourceSpec};
pub use validate::validate_order;

use spec::CatalogFile;
use std::fs;
use std::path::Path;

/// Catalog shipped with the examples.
pub const BUILTIN_CATALOG: &str = include_str!("../../catalog/dnn_models.toml");

#[derive(Debug, Clone)]
pub struct Catalog {
    assets: Vec<AssetDescriptor>,
}

impl Catalog {
    /// Builds a catalog from descriptors in declaration order.
    pub fn new(assets: Vec<AssetDescriptor>) -> Result<Self, CatalogError> {
        validate_order(&assets)?;
        Ok(Self { assets })
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn from_toml_str(data: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(data)?;
        let assets = file
            .asset
            .into_iter()
            .enumerate()
            .map(|(index, spec)| spec.into_descriptor(index))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(assets)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let data = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&data)
    }

    /// Loads `path` when given, the built-in catalog otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(p) => Self::from_path(p),
            None => Self::builtin(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetDescriptor> {
        self.assets.iter()
    }

    /// Descriptors whose group starts with `prefix`, in declaration order.
    pub fn select<'a>(
        &'a self,
        prefix: Option<&'a str>,
    ) -> impl Iterator<Item = &'a AssetDescriptor> + 'a {
        self.assets.iter().filter(move |a| a.matches(prefix))
    }

    /// Distinct group names in first-seen order.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for asset in &self.assets {
            if !groups.contains(&asset.group.as_str()) {
                groups.push(&asset.group);
            }
        }
        groups
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
