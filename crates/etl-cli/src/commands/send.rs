//! `etl send` command implementation

use super::read_json_array;
use crate::ConnectionArgs;
use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use std::path::Path;

pub async fn run(
    connection: &ConnectionArgs,
    file: &Path,
    action_type: &str,
    options: &[String],
) -> Result<()> {
    let entities: Vec<Value> = read_json_array(file).await?;

    let cb = connection.context_broker()?;
    let mut auth = connection.auth_manager()?;

    cb.send_batch(auth.as_mut(), &connection.target(), &entities, action_type, options)
        .await?;

    eprintln!(
        "{} {} entities ({})",
        "Sent".green().bold(),
        entities.len(),
        action_type
    );
    Ok(())
}
