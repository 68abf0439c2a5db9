//! HTTP client for the NGSI-v2 context broker
//!
//! Writes go through `/v2/op/update` in size bounded batches, reads page
//! through `/v2/entities`. Every request is sent sequentially.

use super::query::{EntityQuery, Target};
use crate::auth::AuthManager;
use crate::batch::BatchLimits;
use crate::config::CbConfig;
use crate::endpoints;
use crate::error::{error_body, EtlError, FetchError, Result};
use crate::retry::RetryPolicy;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, instrument};

pub const SERVICE_HEADER: &str = "Fiware-Service";
pub const SERVICE_PATH_HEADER: &str = "Fiware-ServicePath";
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Option asking the broker to throttle batch updates
pub const FLOW_CONTROL_OPTION: &str = "flowControl";

/// Default page size for listings
pub const DEFAULT_PAGE_LIMIT: usize = 100;

#[derive(Serialize)]
struct BatchUpdate<'a, T> {
    #[serde(rename = "actionType")]
    action_type: &'a str,
    entities: &'a [T],
}

/// Context broker client
#[derive(Debug, Clone)]
pub struct ContextBroker {
    endpoint: String,
    client: Client,
    limits: BatchLimits,
    retry: RetryPolicy,
    flow_control: bool,
    sleep_send_batch: Duration,
}

impl ContextBroker {
    /// Create a client, validating the batch limits up front.
    pub fn new(config: CbConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(EtlError::missing_fields(&["<<endpoint>>"], "ContextBroker"));
        }

        let limits = BatchLimits::new(config.block_size, config.batch_size)?;
        let retry = RetryPolicy::new(config.post_retry_connect, config.post_retry_backoff_factor)?;
        let sleep_send_batch = config.sleep_send_batch()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
            limits,
            retry,
            flow_control: config.flow_control,
            sleep_send_batch,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    /// Send `entities` with the given `action_type` (`append`, `update`,
    /// `delete`, ...), split into batches.
    ///
    /// Batches are sent in order and the first failure stops the operation;
    /// batches already accepted by the broker stay applied.
    #[instrument(skip_all, fields(action_type = %action_type, entities = entities.len()))]
    pub async fn send_batch<T: Serialize>(
        &self,
        mut auth: Option<&mut AuthManager>,
        target: &Target,
        entities: &[T],
        action_type: &str,
        options: &[String],
    ) -> Result<()> {
        let (service, subservice) = target.resolve(auth.as_deref())?;

        if entities.is_empty() {
            debug!("Nothing to send");
            return Ok(());
        }

        let batches = self.limits.split(entities)?;
        let options = self.update_options(options);
        let url = endpoints::batch_update_url(&self.endpoint, &options);

        for (n, batch) in batches.iter().enumerate() {
            debug!(
                batch = n + 1,
                total = batches.len(),
                size = batch.len(),
                "Sending batch {} of {} entities",
                action_type,
                batch.len()
            );

            let body = serde_json::to_vec(&BatchUpdate {
                action_type,
                entities: batch,
            })?;

            self.post_update(auth.as_deref_mut(), &url, &body, &service, &subservice, action_type)
                .await?;

            debug!(size = batch.len(), "Update batch {} done", action_type);

            if !self.sleep_send_batch.is_zero() {
                tokio::time::sleep(self.sleep_send_batch).await;
            }
        }

        info!(
            service = %service,
            subservice = %subservice,
            batches = batches.len(),
            "Batch {} of {} entities completed",
            action_type,
            entities.len()
        );
        Ok(())
    }

    /// Read one page of entities.
    #[instrument(skip(self, auth, target, query))]
    pub async fn get_entities_page(
        &self,
        mut auth: Option<&mut AuthManager>,
        target: &Target,
        query: &EntityQuery,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let (service, subservice) = target.resolve(auth.as_deref())?;
        query.validate()?;

        let token = match auth.as_deref_mut() {
            Some(auth) => Some(auth.ensure_token(&subservice).await?),
            None => None,
        };

        let url = endpoints::entities_url(&self.endpoint, &query.options);
        let params = query.params(offset, limit);
        let headers = broker_headers(&service, &subservice, token.as_deref())?;

        let response = self
            .client
            .get(&url)
            .headers(headers.clone())
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        let success = (200..=204).contains(&status.as_u16());
        let text = if success {
            response.text().await?
        } else {
            error_body(response).await
        };

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            log_broker_error(&text);
        }

        if !success {
            return Err(FetchError {
                method: "GET".to_string(),
                url,
                params,
                headers: redacted(&headers),
                body: None,
                status: status.as_u16(),
                response: text,
            }
            .into());
        }

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Read every entity matching `query`, `limit` entities per request.
    ///
    /// Pages are requested until the broker answers with an empty one.
    pub async fn get_entities(
        &self,
        mut auth: Option<&mut AuthManager>,
        target: &Target,
        query: &EntityQuery,
        limit: usize,
    ) -> Result<Vec<Value>> {
        if limit == 0 {
            return Err(EtlError::validation("<<limit>> must be greater than 0"));
        }

        let mut result = Vec::new();
        let mut page: usize = 1;

        loop {
            let offset = (page - 1).checked_mul(limit).ok_or_else(|| {
                EtlError::validation(format!("Page offset overflows with <<limit>> {}", limit))
            })?;
            let data = self
                .get_entities_page(auth.as_deref_mut(), target, query, Some(offset), Some(limit))
                .await?;
            if data.is_empty() {
                break;
            }
            result.extend(data);
            page += 1;
        }

        info!(entities = result.len(), pages = page, "Entities retrieved");
        Ok(result)
    }

    /// Delete every entity matching `query`.
    ///
    /// Matching entities are read first and then deleted in batches; entities
    /// created in between are not deleted.
    pub async fn delete_entities(
        &self,
        mut auth: Option<&mut AuthManager>,
        target: &Target,
        query: &EntityQuery,
        limit: usize,
        send_options: &[String],
    ) -> Result<()> {
        let found = self
            .get_entities(auth.as_deref_mut(), target, query, limit)
            .await?;

        let references: Vec<Value> = found.iter().map(entity_reference).collect();
        info!(entities = references.len(), "Deleting entities");

        self.send_batch(auth, target, &references, "delete", send_options)
            .await
    }

    fn update_options(&self, options: &[String]) -> Vec<String> {
        let mut options = options.to_vec();
        if self.flow_control && !options.iter().any(|o| o == FLOW_CONTROL_OPTION) {
            options.push(FLOW_CONTROL_OPTION.to_string());
        }
        options
    }

    async fn post_update(
        &self,
        mut auth: Option<&mut AuthManager>,
        url: &str,
        body: &[u8],
        service: &str,
        subservice: &str,
        action_type: &str,
    ) -> Result<()> {
        let token = match auth.as_deref_mut() {
            Some(auth) => Some(auth.ensure_token(subservice).await?),
            None => None,
        };

        let mut response = self
            .execute_update(url, body, service, subservice, token.as_deref())
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if let Some(auth) = auth.as_deref_mut() {
                debug!(subservice = %subservice, "Token rejected, authenticating again");
                let token = auth.authenticate(Some(subservice)).await?;
                response = self
                    .execute_update(url, body, service, subservice, Some(&token))
                    .await?;
            }
        }

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = error_body(response).await;
            error!(status = status.as_u16(), body = %body, "Batch {} rejected", action_type);
            return Err(EtlError::Write {
                action_type: action_type.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn execute_update(
        &self,
        url: &str,
        body: &[u8],
        service: &str,
        subservice: &str,
        token: Option<&str>,
    ) -> Result<Response> {
        let request = self
            .client
            .post(url)
            .headers(broker_headers(service, subservice, token)?)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .build()?;

        self.retry.execute(&self.client, request).await
    }
}

fn broker_headers(service: &str, subservice: &str, token: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(SERVICE_HEADER, header_value(SERVICE_HEADER, service)?);
    headers.insert(SERVICE_PATH_HEADER, header_value(SERVICE_PATH_HEADER, subservice)?);
    if let Some(token) = token {
        headers.insert(AUTH_TOKEN_HEADER, header_value(AUTH_TOKEN_HEADER, token)?);
    }
    Ok(headers)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| EtlError::validation(format!("Invalid value for header {}: {:?}", name, value)))
}

/// Header pairs for error reports, with the token masked.
fn redacted(headers: &HeaderMap) -> Vec<(String, String)> {
    let token_header = HeaderName::from_static("x-auth-token");
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if *name == token_header {
                "***".to_string()
            } else {
                value.to_str().unwrap_or_default().to_string()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

/// Log the error detail the broker puts in 400/401 answers.
fn log_broker_error(text: &str) {
    let Ok(detail) = serde_json::from_str::<Value>(text) else {
        error!(response = %text, "Context broker error");
        return;
    };

    let pick = |key: &str| detail.get(key).and_then(Value::as_str).map(str::to_string);
    match (pick("name").or_else(|| pick("error")), pick("message").or_else(|| pick("description"))) {
        (Some(name), Some(message)) => error!("{}: {}", name, message),
        _ => error!(response = %text, "Context broker error"),
    }
}

/// `{id, type}` reference of a listed entity.
fn entity_reference(entity: &Value) -> Value {
    let field = |key: &str| match entity.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    json!({"id": field("id"), "type": field("type")})
}
