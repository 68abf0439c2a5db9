//! Entity stores
//!
//! A [`Store`] is where an ETL job saves its batches. The same job can write
//! to the context broker ([`OrionStore`]) or dump PostgreSQL INSERT statements
//! to a file ([`SqlFileStore`]) without changing its code.

pub mod orion;
pub mod sql;
pub mod sqlfile;

pub use orion::OrionStore;
pub use sql::{sql_escape, sql_table_name, sqlfile_batch, sqlfile_insert, sqlfile_values, TableNames};
pub use sqlfile::{SqlFileOptions, SqlFileStore};

use crate::error::Result;
use async_trait::async_trait;
use etl_common::Entity;

/// Destination for batches of entities
#[async_trait]
pub trait Store: Send {
    /// Save a batch of entities
    async fn send_batch(&mut self, entities: &[Entity]) -> Result<()>;
}
