//! `etl sql` command implementation

use super::read_json_array;
use crate::connection::parse_pair;
use anyhow::{Context, Result};
use colored::Colorize;
use etl_client::{SqlFileOptions, SqlFileStore, Store};
use etl_common::Entity;
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    file: &Path,
    output: &Path,
    subservice: Option<&str>,
    schema: &str,
    namespace: &str,
    tables: &[String],
    chunk_size: usize,
    append: bool,
) -> Result<()> {
    let subservice =
        subservice.context("You must define <<subservice>> (--subservice or ETL_SUBSERVICE)")?;

    let mut options = SqlFileOptions::new(subservice)
        .schema(schema)
        .namespace(namespace)
        .chunk_size(chunk_size)
        .append(append);
    for table in tables {
        let (entity_type, name) = parse_pair(table)?;
        options = options.table_name(entity_type, name.as_deref());
    }

    let entities: Vec<Entity> = read_json_array(file).await?;

    let mut store = SqlFileStore::open(output, options).await?;
    store.send_batch(&entities).await?;
    store.finish().await?;

    eprintln!(
        "{} {} entities to {}",
        "Wrote".green().bold(),
        entities.len(),
        output.display()
    );
    Ok(())
}
