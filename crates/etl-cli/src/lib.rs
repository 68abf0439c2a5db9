//! ETL CLI Library
//!
//! Command-line front end for the ETL client library.
//!
//! # Overview
//!
//! - **Reading**: Dump every entity matching a filter as JSON (`etl get`)
//! - **Deleting**: Remove every entity matching a filter (`etl delete`)
//! - **Writing**: Send entities from a JSON file in batches (`etl send`)
//! - **SQL export**: Turn entities into PostgreSQL INSERT statements (`etl sql`)
//! - **Normalizing**: Turn free text into a valid entity id (`etl normalize`)
//!
//! Connection settings come from flags or their `ETL_*` environment
//! variables; a `.env` file in the working directory is loaded first.

pub mod commands;
pub mod connection;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// ETL toolkit for NGSI-v2 context brokers
#[derive(Parser, Debug)]
#[command(name = "etl")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Where and as whom to connect
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Context broker URL
    #[arg(long, env = "ETL_CB_ENDPOINT", global = true)]
    pub cb_endpoint: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "ETL_CB_TIMEOUT", default_value_t = 10, global = true)]
    pub timeout: u64,

    /// Maximum entities per batch (0 = only the size limit applies)
    #[arg(long, env = "ETL_CB_BATCH_SIZE", default_value_t = 0, global = true)]
    pub batch_size: usize,

    /// Seconds to wait after every batch
    #[arg(long, env = "ETL_CB_SLEEP_SEND_BATCH", default_value_t = 0.0, global = true)]
    pub sleep_send_batch: f64,

    /// Ask the broker for flow control on batch updates
    #[arg(long, env = "ETL_CB_FLOWCONTROL", global = true)]
    pub flow_control: bool,

    /// Auth service URL (omit to connect without authentication)
    #[arg(long, env = "ETL_AUTH_ENDPOINT", global = true)]
    pub auth_endpoint: Option<String>,

    /// Tenant (Fiware-Service)
    #[arg(long, env = "ETL_SERVICE", global = true)]
    pub service: Option<String>,

    /// Sub-tenant (Fiware-ServicePath)
    #[arg(long, env = "ETL_SUBSERVICE", global = true)]
    pub subservice: Option<String>,

    #[arg(long, env = "ETL_USER", global = true)]
    pub user: Option<String>,

    #[arg(long, env = "ETL_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, env = "ETL_ACCEPT_INVALID_CERTS", global = true)]
    pub accept_invalid_certs: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print every entity matching the filter as a JSON array
    Get {
        #[command(flatten)]
        query: QueryArgs,

        /// Entities per request
        #[arg(short, long, default_value_t = 100)]
        limit: usize,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete every entity matching the filter
    Delete {
        #[command(flatten)]
        query: QueryArgs,

        /// Entities per request
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },

    /// Send the entities of a JSON array file to the context broker
    Send {
        /// File with a JSON array of entities
        file: PathBuf,

        /// Batch action type (append, append_strict, update, replace, delete)
        #[arg(short, long, default_value = "append")]
        action_type: String,

        /// Update options, comma separated
        #[arg(long, value_delimiter = ',')]
        options: Vec<String>,
    },

    /// Write PostgreSQL INSERT statements for the entities of a JSON array file
    Sql {
        /// File with a JSON array of entities
        file: PathBuf,

        /// SQL file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Schema of the tables
        #[arg(long, default_value = ":target_schema")]
        schema: String,

        /// Prefix for table names
        #[arg(long, default_value = "")]
        namespace: String,

        /// Table for an entity type, as TYPE=TABLE (TYPE= skips the type)
        #[arg(long = "table", value_name = "TYPE=TABLE")]
        tables: Vec<String>,

        /// Maximum rows per INSERT statement
        #[arg(long, default_value_t = 10_000)]
        chunk_size: usize,

        /// Append to the SQL file instead of overwriting it
        #[arg(long)]
        append: bool,
    },

    /// Print TEXT normalized to a valid entity id
    Normalize {
        /// Text to normalize
        #[arg(required = true)]
        text: Vec<String>,

        /// Replacement for forbidden characters and whitespace
        #[arg(short, long, default_value = "-")]
        replacement: String,

        /// Replacement for one character, as C=REPLACEMENT (C= removes it)
        #[arg(long = "override", value_name = "C=REPLACEMENT")]
        overrides: Vec<String>,
    },
}

/// Entity filter flags
#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Entity type
    #[arg(long = "type")]
    pub entity_type: Option<String>,

    /// Entity id
    #[arg(long)]
    pub id: Option<String>,

    /// Attribute filter (Simple Query Language)
    #[arg(short, long)]
    pub q: Option<String>,

    /// Metadata filter
    #[arg(long)]
    pub mq: Option<String>,

    /// Spatial relationship, e.g. "near;maxDistance:1000"
    #[arg(long)]
    pub georel: Option<String>,

    /// Reference shape (point, line, polygon, box)
    #[arg(long)]
    pub geometry: Option<String>,

    /// Coordinates of the reference shape
    #[arg(long)]
    pub coords: Option<String>,

    /// Result ordering
    #[arg(long)]
    pub order_by: Option<String>,

    /// Listing options, comma separated (keyValues, count, ...)
    #[arg(long = "query-options", value_delimiter = ',')]
    pub options: Vec<String>,
}
