//! `etl get` command implementation

use crate::{ConnectionArgs, QueryArgs};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

pub async fn run(
    connection: &ConnectionArgs,
    query: &QueryArgs,
    limit: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    let cb = connection.context_broker()?;
    let mut auth = connection.auth_manager()?;

    let entities = cb
        .get_entities(auth.as_mut(), &connection.target(), &query.to_query(), limit)
        .await?;

    let json = serde_json::to_string_pretty(&entities)?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, json + "\n")
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{} {} entities to {}",
                "Saved".green().bold(),
                entities.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}
