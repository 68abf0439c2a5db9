//! Client construction from connection flags

use crate::{ConnectionArgs, QueryArgs};
use anyhow::{Context, Result};
use etl_client::{AuthConfig, AuthManager, CbConfig, ContextBroker, EntityQuery, Target};

impl ConnectionArgs {
    pub fn cb_config(&self) -> Result<CbConfig> {
        let endpoint = self
            .cb_endpoint
            .clone()
            .context("You must define <<endpoint>> in ContextBroker (--cb-endpoint or ETL_CB_ENDPOINT)")?;

        Ok(CbConfig::new(endpoint)
            .with_timeout_secs(self.timeout)
            .with_batch_size(self.batch_size)
            .with_sleep_send_batch_secs(self.sleep_send_batch)
            .with_flow_control(self.flow_control)
            .with_accept_invalid_certs(self.accept_invalid_certs))
    }

    pub fn context_broker(&self) -> Result<ContextBroker> {
        Ok(ContextBroker::new(self.cb_config()?)?)
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            endpoint: self.auth_endpoint.clone(),
            service: self.service.clone(),
            subservice: self.subservice.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }

    /// Authenticator, or `None` when no auth endpoint is configured.
    pub fn auth_manager(&self) -> Result<Option<AuthManager>> {
        if self.auth_endpoint.is_none() {
            return Ok(None);
        }
        Ok(Some(AuthManager::new(self.auth_config())?))
    }

    pub fn target(&self) -> Target {
        Target {
            service: self.service.clone(),
            subservice: self.subservice.clone(),
        }
    }
}

impl QueryArgs {
    pub fn to_query(&self) -> EntityQuery {
        EntityQuery {
            entity_type: self.entity_type.clone(),
            id: self.id.clone(),
            q: self.q.clone(),
            mq: self.mq.clone(),
            georel: self.georel.clone(),
            geometry: self.geometry.clone(),
            coords: self.coords.clone(),
            order_by: self.order_by.clone(),
            options: self.options.clone(),
        }
    }
}

/// Split `KEY=VALUE`; an empty value becomes `None`.
pub fn parse_pair(pair: &str) -> Result<(String, Option<String>)> {
    let (key, value) = pair
        .split_once('=')
        .with_context(|| format!("Expected KEY=VALUE, got '{}'", pair))?;
    let value = (!value.is_empty()).then(|| value.to_string());
    Ok((key.to_string(), value))
}
