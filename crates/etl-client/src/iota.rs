//! IoT agent device measures over JSON/HTTP

use crate::config::{IotaConfig, DEFAULT_TIMEOUT_SECS};
use crate::error::{error_body, EtlError, FetchError, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// One device measure: a flat object of attribute name to value
pub type Record = Map<String, Value>;

/// Sends measures on behalf of one device.
#[derive(Debug, Clone)]
pub struct IotaManager {
    endpoint: String,
    sensor_id: String,
    api_key: String,
    sleep_send_batch: Duration,
    client: Client,
}

impl IotaManager {
    pub fn new(config: IotaConfig) -> Result<Self> {
        let missing: Vec<&str> = [
            (config.endpoint.is_empty(), "<<endpoint>>"),
            (config.sensor_id.is_empty(), "<<sensor_id>>"),
            (config.api_key.is_empty(), "<<api_key>>"),
        ]
        .into_iter()
        .filter_map(|(is_missing, name)| is_missing.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(EtlError::missing_fields(&missing, "IotaManager"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            sleep_send_batch: config.sleep_send_batch()?,
            endpoint: config.endpoint,
            sensor_id: config.sensor_id,
            api_key: config.api_key,
            client,
        })
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    /// Send one measure. Only a 200 answer counts as success.
    pub async fn send_http(&self, record: &Record) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("i", &self.sensor_id), ("k", &self.api_key)])
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = error_body(response).await;
            return Err(FetchError {
                method: "POST".to_string(),
                url: self.endpoint.clone(),
                params: vec![
                    ("i".to_string(), self.sensor_id.clone()),
                    ("k".to_string(), "***".to_string()),
                ],
                headers: vec![(CONTENT_TYPE.to_string(), "application/json".to_string())],
                body: None,
                status: status.as_u16(),
                response: text,
            }
            .into());
        }

        debug!(sensor_id = %self.sensor_id, "Measure sent");
        Ok(())
    }

    /// Send `records` one after another, pausing after each one.
    ///
    /// Stops at the first failure, reporting the index of the failed record.
    #[instrument(skip_all, fields(sensor_id = %self.sensor_id, records = records.len()))]
    pub async fn send_batch_http(&self, records: &[Record]) -> Result<()> {
        for (index, record) in records.iter().enumerate() {
            self.send_http(record)
                .await
                .map_err(|source| EtlError::SendBatch {
                    index,
                    source: Box::new(source),
                })?;

            if !self.sleep_send_batch.is_zero() {
                tokio::time::sleep(self.sleep_send_batch).await;
            }
        }

        info!("Measures sent");
        Ok(())
    }
}
