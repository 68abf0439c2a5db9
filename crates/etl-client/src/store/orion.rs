//! Store writing to the context broker

use super::Store;
use crate::auth::AuthManager;
use crate::cb::{ContextBroker, Target};
use crate::error::Result;
use async_trait::async_trait;
use etl_common::Entity;

/// Forwards every batch to [`ContextBroker::send_batch`] with a fixed
/// target, action type and options.
#[derive(Debug)]
pub struct OrionStore<'a> {
    cb: &'a ContextBroker,
    auth: Option<&'a mut AuthManager>,
    target: Target,
    action_type: String,
    options: Vec<String>,
}

impl<'a> OrionStore<'a> {
    /// Store appending entities to the authenticator's default target.
    pub fn new(cb: &'a ContextBroker, auth: Option<&'a mut AuthManager>) -> Self {
        Self {
            cb,
            auth,
            target: Target::default(),
            action_type: "append".to_string(),
            options: Vec::new(),
        }
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn action_type(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = action_type.into();
        self
    }

    pub fn options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl Store for OrionStore<'_> {
    async fn send_batch(&mut self, entities: &[Entity]) -> Result<()> {
        self.cb
            .send_batch(
                self.auth.as_deref_mut(),
                &self.target,
                entities,
                &self.action_type,
                &self.options,
            )
            .await
    }
}
