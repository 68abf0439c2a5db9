//! Configuration for the ETL clients
//!
//! Each client is configured with a plain struct that can be built in code or
//! loaded from `ETL_*` environment variables. Values are fixed once the client
//! is constructed.

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Context Broker Configuration Constants
// ============================================================================

/// Default timeout for a single HTTP request, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of retries for batch updates on transient failures.
pub const DEFAULT_POST_RETRY_CONNECT: u32 = 3;

/// Default backoff factor in seconds: delay = factor * 2^(retry - 1).
pub const DEFAULT_POST_RETRY_BACKOFF_FACTOR: f64 = 20.0;

/// Default maximum serialized size of a batch, in bytes.
///
/// The broker rejects requests over 1MB; 800k leaves room for headers and the
/// request envelope.
pub const DEFAULT_BLOCK_SIZE: usize = 800_000;

/// Default maximum number of entities per batch (0 = only the block size applies).
pub const DEFAULT_BATCH_SIZE: usize = 0;

/// Default S3 region used when talking to S3 compatible stores.
pub const DEFAULT_OBJECT_STORAGE_REGION: &str = "us-east-1";

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| EtlError::config(format!("Invalid value '{}' for {}: {}", raw, name, e))),
        None => Ok(None),
    }
}

/// `secs` as a `Duration`, negative values meaning no wait.
///
/// Infinite, NaN or out of range values are rejected.
pub(crate) fn duration_from_secs(name: &str, secs: f64) -> Result<Duration> {
    let secs = if secs < 0.0 { 0.0 } else { secs };
    Duration::try_from_secs_f64(secs)
        .map_err(|e| EtlError::validation(format!("Invalid value {} for <<{}>>: {}", secs, name, e)))
}

// ============================================================================
// Auth
// ============================================================================

/// Credentials for the Keystone-style auth service.
///
/// Fields are optional here so that every missing one can be reported at once
/// when the [`AuthManager`](crate::auth::AuthManager) is built.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub endpoint: Option<String>,
    pub service: Option<String>,
    pub subservice: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("endpoint", &self.endpoint)
            .field("service", &self.service)
            .field("subservice", &self.subservice)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

impl AuthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load credentials from environment variables
    ///
    /// - `ETL_AUTH_ENDPOINT`
    /// - `ETL_SERVICE`
    /// - `ETL_SUBSERVICE` (optional default subservice)
    /// - `ETL_USER`
    /// - `ETL_PASSWORD`
    /// - `ETL_AUTH_ACCEPT_INVALID_CERTS`
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: env_string("ETL_AUTH_ENDPOINT"),
            service: env_string("ETL_SERVICE"),
            subservice: env_string("ETL_SUBSERVICE"),
            user: env_string("ETL_USER"),
            password: env_string("ETL_PASSWORD"),
            accept_invalid_certs: env_parse("ETL_AUTH_ACCEPT_INVALID_CERTS")?.unwrap_or(false),
        })
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn subservice(mut self, subservice: impl Into<String>) -> Self {
        self.subservice = Some(subservice.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// True when no field at all has been set, i.e. the caller does not use auth.
    pub fn is_empty(&self) -> bool {
        self.endpoint.is_none()
            && self.service.is_none()
            && self.subservice.is_none()
            && self.user.is_none()
            && self.password.is_none()
    }
}

// ============================================================================
// Context Broker
// ============================================================================

/// Context broker client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CbConfig {
    /// Base URL, e.g. `https://orion.example.com:1026`
    pub endpoint: String,

    pub timeout_secs: u64,

    /// Retries for batch updates on connection errors and 429/5xx answers
    pub post_retry_connect: u32,

    /// Backoff factor in seconds
    pub post_retry_backoff_factor: f64,

    /// Pause after every successful batch, in seconds
    pub sleep_send_batch_secs: f64,

    /// Ask the broker for flow control on batch updates
    pub flow_control: bool,

    /// Maximum serialized size of a batch, in bytes (at most 800000)
    pub block_size: usize,

    /// Maximum entities per batch, 0 for no limit
    pub batch_size: usize,

    /// Skip TLS certificate verification (self-signed broker deployments)
    pub accept_invalid_certs: bool,
}

impl CbConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            post_retry_connect: DEFAULT_POST_RETRY_CONNECT,
            post_retry_backoff_factor: DEFAULT_POST_RETRY_BACKOFF_FACTOR,
            sleep_send_batch_secs: 0.0,
            flow_control: false,
            block_size: DEFAULT_BLOCK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            accept_invalid_certs: false,
        }
    }

    /// Load settings from environment variables
    ///
    /// - `ETL_CB_ENDPOINT` (required)
    /// - `ETL_CB_TIMEOUT`
    /// - `ETL_CB_POST_RETRY_CONNECT`
    /// - `ETL_CB_POST_RETRY_BACKOFF_FACTOR`
    /// - `ETL_CB_SLEEP_SEND_BATCH`
    /// - `ETL_CB_FLOWCONTROL`
    /// - `ETL_CB_BLOCK_SIZE`
    /// - `ETL_CB_BATCH_SIZE`
    /// - `ETL_CB_ACCEPT_INVALID_CERTS`
    pub fn from_env() -> Result<Self> {
        let endpoint = env_string("ETL_CB_ENDPOINT")
            .ok_or_else(|| EtlError::missing_fields(&["<<endpoint>>"], "ContextBroker"))?;

        let mut config = Self::new(endpoint);

        if let Some(v) = env_parse("ETL_CB_TIMEOUT")? {
            config.timeout_secs = v;
        }
        if let Some(v) = env_parse("ETL_CB_POST_RETRY_CONNECT")? {
            config.post_retry_connect = v;
        }
        if let Some(v) = env_parse("ETL_CB_POST_RETRY_BACKOFF_FACTOR")? {
            config.post_retry_backoff_factor = v;
        }
        if let Some(v) = env_parse("ETL_CB_SLEEP_SEND_BATCH")? {
            config.sleep_send_batch_secs = v;
        }
        if let Some(v) = env_parse("ETL_CB_FLOWCONTROL")? {
            config.flow_control = v;
        }
        if let Some(v) = env_parse("ETL_CB_BLOCK_SIZE")? {
            config.block_size = v;
        }
        if let Some(v) = env_parse("ETL_CB_BATCH_SIZE")? {
            config.batch_size = v;
        }
        if let Some(v) = env_parse("ETL_CB_ACCEPT_INVALID_CERTS")? {
            config.accept_invalid_certs = v;
        }

        Ok(config)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_retries(mut self, retries: u32, backoff_factor: f64) -> Self {
        self.post_retry_connect = retries;
        self.post_retry_backoff_factor = backoff_factor;
        self
    }

    pub fn with_sleep_send_batch_secs(mut self, secs: f64) -> Self {
        self.sleep_send_batch_secs = secs;
        self
    }

    pub fn with_flow_control(mut self, flow_control: bool) -> Self {
        self.flow_control = flow_control;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sleep_send_batch(&self) -> Result<Duration> {
        duration_from_secs("sleep_send_batch", self.sleep_send_batch_secs)
    }
}

// ============================================================================
// IoT Agent
// ============================================================================

/// IoT agent (JSON over HTTP) device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IotaConfig {
    pub endpoint: String,
    pub sensor_id: String,
    pub api_key: String,

    /// Pause after every record of a batch, in seconds
    pub sleep_send_batch_secs: f64,
}

impl IotaConfig {
    pub fn new(
        endpoint: impl Into<String>,
        sensor_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            sensor_id: sensor_id.into(),
            api_key: api_key.into(),
            sleep_send_batch_secs: 0.0,
        }
    }

    /// Load settings from `ETL_IOTA_ENDPOINT`, `ETL_IOTA_SENSOR_ID`,
    /// `ETL_IOTA_API_KEY` and `ETL_IOTA_SLEEP_SEND_BATCH`.
    pub fn from_env() -> Result<Self> {
        let endpoint = env_string("ETL_IOTA_ENDPOINT");
        let sensor_id = env_string("ETL_IOTA_SENSOR_ID");
        let api_key = env_string("ETL_IOTA_API_KEY");

        match (endpoint, sensor_id, api_key) {
            (Some(endpoint), Some(sensor_id), Some(api_key)) => {
                let mut config = Self::new(endpoint, sensor_id, api_key);
                if let Some(v) = env_parse("ETL_IOTA_SLEEP_SEND_BATCH")? {
                    config.sleep_send_batch_secs = v;
                }
                Ok(config)
            }
            (endpoint, sensor_id, api_key) => {
                let mut missing = Vec::new();
                if endpoint.is_none() {
                    missing.push("<<endpoint>>");
                }
                if sensor_id.is_none() {
                    missing.push("<<sensor_id>>");
                }
                if api_key.is_none() {
                    missing.push("<<api_key>>");
                }
                Err(EtlError::missing_fields(&missing, "IotaManager"))
            }
        }
    }

    pub fn with_sleep_send_batch_secs(mut self, secs: f64) -> Self {
        self.sleep_send_batch_secs = secs;
        self
    }

    pub fn sleep_send_batch(&self) -> Result<Duration> {
        duration_from_secs("sleep_send_batch", self.sleep_send_batch_secs)
    }
}

// ============================================================================
// Object Storage
// ============================================================================

/// S3 compatible object storage settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: String,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            access_key: None,
            secret_key: None,
            region: DEFAULT_OBJECT_STORAGE_REGION.to_string(),
        }
    }
}

impl fmt::Debug for ObjectStorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStorageConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("region", &self.region)
            .finish()
    }
}

impl ObjectStorageConfig {
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            access_key: Some(access_key.into()),
            secret_key: Some(secret_key.into()),
            ..Self::default()
        }
    }

    /// Load settings from `ETL_OBJECT_STORAGE_ENDPOINT`,
    /// `ETL_OBJECT_STORAGE_ACCESS_KEY`, `ETL_OBJECT_STORAGE_SECRET_KEY` and
    /// `ETL_OBJECT_STORAGE_REGION`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: env_string("ETL_OBJECT_STORAGE_ENDPOINT"),
            access_key: env_string("ETL_OBJECT_STORAGE_ACCESS_KEY"),
            secret_key: env_string("ETL_OBJECT_STORAGE_SECRET_KEY"),
            region: env_string("ETL_OBJECT_STORAGE_REGION")
                .unwrap_or_else(|| DEFAULT_OBJECT_STORAGE_REGION.to_string()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_cb_config_defaults() {
        let config = CbConfig::new("http://localhost:1026");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.post_retry_connect, 3);
        assert_eq!(config.post_retry_backoff_factor, 20.0);
        assert_eq!(config.block_size, 800_000);
        assert_eq!(config.batch_size, 0);
        assert!(!config.flow_control);
        assert_eq!(config.sleep_send_batch().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_sleep_durations() {
        let config = CbConfig::new("http://localhost:1026").with_sleep_send_batch_secs(0.25);
        assert_eq!(config.sleep_send_batch().unwrap(), Duration::from_millis(250));

        let config = config.with_sleep_send_batch_secs(-3.0);
        assert_eq!(config.sleep_send_batch().unwrap(), Duration::ZERO);

        for secs in [f64::INFINITY, f64::NAN, 1e300] {
            let config = CbConfig::new("http://localhost:1026").with_sleep_send_batch_secs(secs);
            assert!(matches!(config.sleep_send_batch(), Err(EtlError::Validation(_))));
        }
    }

    #[test]
    #[serial]
    fn test_cb_config_from_env() {
        std::env::set_var("ETL_CB_ENDPOINT", "http://orion:1026");
        std::env::set_var("ETL_CB_BATCH_SIZE", "50");
        std::env::set_var("ETL_CB_FLOWCONTROL", "true");

        let config = CbConfig::from_env().unwrap();
        assert_eq!(config.endpoint, "http://orion:1026");
        assert_eq!(config.batch_size, 50);
        assert!(config.flow_control);

        std::env::remove_var("ETL_CB_ENDPOINT");
        std::env::remove_var("ETL_CB_BATCH_SIZE");
        std::env::remove_var("ETL_CB_FLOWCONTROL");
    }

    #[test]
    #[serial]
    fn test_cb_config_from_env_missing_endpoint() {
        std::env::remove_var("ETL_CB_ENDPOINT");
        let err = CbConfig::from_env().unwrap_err();
        assert_eq!(err.to_string(), "You must define <<endpoint>> in ContextBroker");
    }

    #[test]
    #[serial]
    fn test_cb_config_from_env_invalid_number() {
        std::env::set_var("ETL_CB_ENDPOINT", "http://orion:1026");
        std::env::set_var("ETL_CB_BLOCK_SIZE", "big");

        let err = CbConfig::from_env().unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
        assert!(err.to_string().contains("ETL_CB_BLOCK_SIZE"));

        std::env::remove_var("ETL_CB_ENDPOINT");
        std::env::remove_var("ETL_CB_BLOCK_SIZE");
    }

    #[test]
    #[serial]
    fn test_iota_config_from_env_lists_missing() {
        std::env::set_var("ETL_IOTA_ENDPOINT", "http://iota:7896/iot/json");
        std::env::remove_var("ETL_IOTA_SENSOR_ID");
        std::env::remove_var("ETL_IOTA_API_KEY");

        let err = IotaConfig::from_env().unwrap_err();
        assert_eq!(
            err.to_string(),
            "You must define <<sensor_id>> and <<api_key>> in IotaManager"
        );

        std::env::remove_var("ETL_IOTA_ENDPOINT");
    }

    #[test]
    fn test_auth_config_debug_hides_password() {
        let config = AuthConfig::new().user("etl").password("s3cret");
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("etl"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_auth_config_is_empty() {
        assert!(AuthConfig::new().is_empty());
        assert!(!AuthConfig::new().service("smartcity").is_empty());
    }
}
