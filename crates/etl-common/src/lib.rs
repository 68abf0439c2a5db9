//! ETL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and utilities for the ETL toolkit workspace.
//!
//! # Overview
//!
//! - **Types**: NGSI entities and attributes as they travel through batches
//! - **JSON**: the canonical JSON text used for batch size accounting and SQL values
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use etl_common::types::Entity;
//! use etl_common::json::to_canonical_string;
//!
//! let entity: Entity = serde_json::from_str(r#"{"id":"e1","type":"Room"}"#).unwrap();
//! let text = to_canonical_string(&entity).unwrap();
//! assert_eq!(text, r#"{"id": "e1", "type": "Room"}"#);
//! ```

pub mod json;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use types::{Attribute, Entity};
