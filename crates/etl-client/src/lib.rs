//! ETL Client Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Client helpers for ETL jobs that move entities in and out of an NGSI-v2
//! context broker.
//!
//! # Overview
//!
//! - **Authentication**: Keystone token issuing with a per-subservice token cache ([`auth`])
//! - **Context broker**: batched, size-bounded writes and paginated reads ([`cb`])
//! - **Stores**: one interface over the context broker and SQL files ([`store`])
//! - **Normalizer**: unicode text to valid entity ids ([`normalizer`])
//! - **IoT agent**: single and batch device measures ([`iota`])
//! - **Object storage**: S3 compatible bucket and file helpers ([`object_storage`])
//!
//! # Example
//!
//! ```no_run
//! use etl_client::{AuthConfig, AuthManager, CbConfig, ContextBroker, Target};
//! use etl_common::Entity;
//!
//! #[tokio::main]
//! async fn main() -> etl_client::Result<()> {
//!     let mut auth = AuthManager::new(AuthConfig::from_env()?)?;
//!     let cb = ContextBroker::new(CbConfig::from_env()?)?;
//!
//!     let entities = vec![Entity::new("room1", "Room").with_attribute("temperature", "Number", 21)];
//!     cb.send_batch(Some(&mut auth), &Target::default(), &entities, "append", &[])
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod batch;
pub mod cb;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod iota;
pub mod normalizer;
pub mod object_storage;
pub mod retry;
pub mod store;

// Re-export commonly used types
pub use auth::{AuthManager, TenantToken};
pub use batch::BatchLimits;
pub use cb::{ContextBroker, EntityQuery, Target};
pub use config::{AuthConfig, CbConfig, IotaConfig, ObjectStorageConfig};
pub use error::{EtlError, FetchError, Result};
pub use iota::IotaManager;
pub use normalizer::Normalizer;
pub use object_storage::ObjectStorageManager;
pub use store::{OrionStore, SqlFileOptions, SqlFileStore, Store};
