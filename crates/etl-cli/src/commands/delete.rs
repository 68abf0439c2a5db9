//! `etl delete` command implementation

use crate::{ConnectionArgs, QueryArgs};
use anyhow::Result;
use colored::Colorize;

pub async fn run(connection: &ConnectionArgs, query: &QueryArgs, limit: usize) -> Result<()> {
    let cb = connection.context_broker()?;
    let mut auth = connection.auth_manager()?;

    cb.delete_entities(auth.as_mut(), &connection.target(), &query.to_query(), limit, &[])
        .await?;

    eprintln!("{}", "Matching entities deleted".green().bold());
    Ok(())
}
