//! `etl normalize` command implementation

use crate::connection::parse_pair;
use anyhow::{bail, Result};
use etl_client::Normalizer;

pub fn run(text: &[String], replacement: &str, overrides: &[String]) -> Result<()> {
    let mut builder = Normalizer::builder().replacement(replacement);

    for pair in overrides {
        let (key, value) = parse_pair(pair)?;
        let mut chars = key.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            bail!("Override key must be a single character, got '{}'", key);
        };
        builder = builder.override_char(c, value.as_deref());
    }

    let normalizer = builder.build()?;
    println!("{}", normalizer.normalize(&text.join(" ")));
    Ok(())
}
