//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod delete;
pub mod get;
pub mod normalize;
pub mod send;
pub mod sql;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Read a file holding a JSON array.
pub(crate) async fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of entities", path.display()))
}
