//! Store writing PostgreSQL INSERT statements to a file

use super::sql::{sqlfile_batch, TableNames};
use super::Store;
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use etl_common::Entity;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// Default schema, a psql variable resolved when the file is run
pub const DEFAULT_SCHEMA: &str = ":target_schema";

/// Default maximum number of rows per INSERT statement
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Settings for a [`SqlFileStore`]
#[derive(Debug, Clone)]
pub struct SqlFileOptions {
    /// Value of the `fiwareservicepath` column
    pub subservice: String,
    pub schema: String,
    /// Prefix for default table names (`{namespace}_{type}`)
    pub namespace: String,
    pub table_names: TableNames,
    pub chunk_size: usize,
    /// Append to the file instead of truncating it
    pub append: bool,
}

impl SqlFileOptions {
    pub fn new(subservice: impl Into<String>) -> Self {
        Self {
            subservice: subservice.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            namespace: String::new(),
            table_names: TableNames::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            append: false,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Table for `entity_type`; `None` or `""` skips the type.
    pub fn table_name(mut self, entity_type: impl Into<String>, table: Option<&str>) -> Self {
        self.table_names
            .insert(entity_type.into(), table.map(str::to_string));
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }
}

pub struct SqlFileStore {
    path: PathBuf,
    writer: BufWriter<File>,
    options: SqlFileOptions,
}

impl std::fmt::Debug for SqlFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlFileStore")
            .field("path", &self.path)
            .field("options", &self.options)
            .finish()
    }
}

impl SqlFileStore {
    /// Open (or create) the file at `path`.
    pub async fn open(path: impl AsRef<Path>, options: SqlFileOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(EtlError::validation("<<chunk_size>> must be greater than 0"));
        }

        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(options.append)
            .truncate(!options.append)
            .open(&path)
            .await?;

        debug!(path = %path.display(), append = options.append, "SQL file opened");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync the file to disk and close it.
    ///
    /// Every `send_batch` already flushes its statements to the file.
    pub async fn finish(mut self) -> Result<()> {
        self.writer.flush().await?;
        self.writer.get_mut().sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqlFileStore {
    async fn send_batch(&mut self, entities: &[Entity]) -> Result<()> {
        let options = &self.options;
        for chunk in entities.chunks(options.chunk_size) {
            let sql = sqlfile_batch(
                &options.schema,
                &options.namespace,
                &options.table_names,
                &options.subservice,
                chunk,
            )?;
            self.writer.write_all(sql.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
        }
        // accepted rows must survive a store dropped without finish()
        self.writer.flush().await?;
        Ok(())
    }
}
