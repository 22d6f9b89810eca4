//! Store configuration loading.

use std::path::Path;

use aisle_commerce::config::StoreConfig;
use anyhow::{Context, Result};

/// Load a store configuration. `.json` files are read as JSON, anything
/// else as TOML.
pub fn load(path: &str) -> Result<StoreConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read store config: {}", path))?;

    let is_json = Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON store config: {}", path))
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML store config: {}", path))
    }
}
