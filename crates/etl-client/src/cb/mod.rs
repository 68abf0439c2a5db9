//! Context broker client
//!
//! [`ContextBroker`] implements the batched write path and the paginated
//! read path; [`Target`] and [`EntityQuery`] describe where a request goes and
//! what it selects.

pub mod client;
pub mod query;

pub use client::{ContextBroker, DEFAULT_PAGE_LIMIT, FLOW_CONTROL_OPTION};
pub use query::{EntityQuery, Target};
