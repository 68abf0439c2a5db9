//! Keystone authentication with a per-subservice token cache
//!
//! Tokens are issued for a service/subservice pair and cached by subservice.
//! They are never expired proactively: callers re-authenticate when the
//! context broker answers 401.

use crate::config::{AuthConfig, DEFAULT_TIMEOUT_SECS};
use crate::endpoints;
use crate::error::{error_body, EtlError, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Header carrying the issued token in the auth service response
pub const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Result of a service (domain) scoped authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantToken {
    pub token: String,
    pub user_id: String,
    pub tenant_id: String,
}

/// Authentication manager owning the token cache.
///
/// Calls that need a token borrow the manager mutably, so one manager cannot
/// be shared between concurrent requests without external synchronization.
pub struct AuthManager {
    endpoint: String,
    service: String,
    subservice: Option<String>,
    user: String,
    password: String,
    tokens: HashMap<String, String>,
    client: Client,
}

impl fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("endpoint", &self.endpoint)
            .field("service", &self.service)
            .field("subservice", &self.subservice)
            .field("user", &self.user)
            .field("tokens", &self.tokens.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AuthManager {
    /// Build a manager, failing with every missing required field listed.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let AuthConfig {
            endpoint,
            service,
            subservice,
            user,
            password,
            accept_invalid_certs,
        } = config;

        let (endpoint, service, user, password) = match (endpoint, service, user, password) {
            (Some(endpoint), Some(service), Some(user), Some(password)) => {
                (endpoint, service, user, password)
            }
            (endpoint, service, user, password) => {
                let missing: Vec<&str> = [
                    (endpoint.is_none(), "<<endpoint>>"),
                    (service.is_none(), "<<service>>"),
                    (user.is_none(), "<<user>>"),
                    (password.is_none(), "<<password>>"),
                ]
                .into_iter()
                .filter_map(|(is_missing, name)| is_missing.then_some(name))
                .collect();
                return Err(EtlError::missing_fields(&missing, "AuthManager"));
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        Ok(Self {
            endpoint,
            service,
            subservice,
            user,
            password,
            tokens: HashMap::new(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn default_subservice(&self) -> Option<&str> {
        self.subservice.as_deref()
    }

    /// Replace the default subservice used when calls do not name one.
    pub fn set_default_subservice(&mut self, subservice: Option<String>) {
        self.subservice = subservice;
    }

    /// Cached token for `subservice`, if any.
    pub fn token(&self, subservice: &str) -> Option<&str> {
        self.tokens.get(subservice).map(String::as_str)
    }

    /// Store a token obtained elsewhere.
    pub fn set_token(&mut self, subservice: impl Into<String>, token: impl Into<String>) {
        self.tokens.insert(subservice.into(), token.into());
    }

    /// The explicit subservice, else the configured default.
    pub fn resolve_subservice<'a>(&'a self, subservice: Option<&'a str>) -> Result<&'a str> {
        subservice
            .or(self.subservice.as_deref())
            .ok_or_else(|| EtlError::config("You must define <<subservice>> in AuthManager"))
    }

    /// Return the cached token for `subservice`, authenticating only if there is none.
    pub async fn ensure_token(&mut self, subservice: &str) -> Result<String> {
        if let Some(token) = self.tokens.get(subservice) {
            return Ok(token.clone());
        }
        self.authenticate(Some(subservice)).await
    }

    /// Request a new token scoped to `subservice` (or the default one) and cache it.
    ///
    /// Always contacts the auth service, even if a token is already cached.
    #[instrument(skip(self), fields(service = %self.service))]
    pub async fn authenticate(&mut self, subservice: Option<&str>) -> Result<String> {
        let subservice = self.resolve_subservice(subservice)?.to_string();

        let body = json!({
            "auth": {
                "scope": {
                    "project": {
                        "domain": {"name": self.service},
                        "name": subservice
                    }
                },
                "identity": self.password_identity()
            }
        });

        debug!(subservice = %subservice, "Getting auth token");
        let scope = format!("subservice \"{}\"", subservice);
        let (token, _) = self.request_token(&body, &scope).await?;

        debug!(subservice = %subservice, "Auth token created");
        self.tokens.insert(subservice, token.clone());
        Ok(token)
    }

    /// Request a token scoped to the whole service. The token is not cached.
    #[instrument(skip(self), fields(service = %self.service))]
    pub async fn authenticate_tenant(&self) -> Result<TenantToken> {
        let body = json!({
            "auth": {
                "scope": {
                    "domain": {"name": self.service}
                },
                "identity": self.password_identity()
            }
        });

        let scope = format!("service \"{}\"", self.service);
        let (token, payload) = self.request_token(&body, &scope).await?;

        let user_id = payload
            .pointer("/token/user/id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tenant_id = payload
            .pointer("/token/user/domain/id")
            .or_else(|| payload.pointer("/token/domain/id"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(TenantToken {
            token,
            user_id,
            tenant_id,
        })
    }

    fn password_identity(&self) -> Value {
        json!({
            "methods": ["password"],
            "password": {
                "user": {
                    "domain": {"name": self.service},
                    "name": self.user,
                    "password": self.password
                }
            }
        })
    }

    async fn request_token(&self, body: &Value, scope: &str) -> Result<(String, Value)> {
        let response = self
            .client
            .post(endpoints::auth_tokens_url(&self.endpoint))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = error_body(response).await;
            return Err(EtlError::Auth {
                scope: scope.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| EtlError::Auth {
                scope: scope.to_string(),
                status: status.as_u16(),
                body: format!("response has no {} header", SUBJECT_TOKEN_HEADER),
            })?;

        let payload = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((token, payload))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn config(endpoint: &str) -> AuthConfig {
        AuthConfig::new()
            .endpoint(endpoint)
            .service("smartcity")
            .user("etl")
            .password("secret")
    }

    #[test]
    fn test_missing_two_fields_listed_together() {
        let err = AuthManager::new(
            AuthConfig::new()
                .endpoint("http://keystone:5001")
                .service("smartcity"),
        )
        .unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
        assert_eq!(
            err.to_string(),
            "You must define <<user>> and <<password>> in AuthManager"
        );
    }

    #[test]
    fn test_missing_all_fields() {
        let err = AuthManager::new(AuthConfig::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "You must define <<endpoint>>, <<service>>, <<user>> and <<password>> in AuthManager"
        );
    }

    #[tokio::test]
    async fn test_authenticate_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .and(body_partial_json(serde_json::json!({
                "auth": {"scope": {"project": {"domain": {"name": "smartcity"}, "name": "/gardens"}}}
            })))
            .respond_with(ResponseTemplate::new(201).insert_header("X-Subject-Token", "tok-1"))
            .expect(1)
            .mount(&server)
            .await;

        let mut auth = AuthManager::new(config(&server.uri())).unwrap();
        let token = auth.authenticate(Some("/gardens")).await.unwrap();

        assert_eq!(token, "tok-1");
        assert_eq!(auth.token("/gardens"), Some("tok-1"));
        // cached: no second request
        assert_eq!(auth.ensure_token("/gardens").await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn test_authenticate_uses_default_subservice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .and(body_partial_json(serde_json::json!({
                "auth": {"scope": {"project": {"name": "/parking"}}}
            })))
            .respond_with(ResponseTemplate::new(201).insert_header("X-Subject-Token", "tok-p"))
            .mount(&server)
            .await;

        let mut auth = AuthManager::new(config(&server.uri()).subservice("/parking")).unwrap();
        assert_eq!(auth.authenticate(None).await.unwrap(), "tok-p");
        assert_eq!(auth.default_subservice(), Some("/parking"));
    }

    #[tokio::test]
    async fn test_authenticate_without_subservice_fails() {
        let mut auth = AuthManager::new(config("http://127.0.0.1:9")).unwrap();
        let err = auth.authenticate(None).await.unwrap_err();
        assert_eq!(err.to_string(), "You must define <<subservice>> in AuthManager");
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"bad password"}"#))
            .mount(&server)
            .await;

        let mut auth = AuthManager::new(config(&server.uri())).unwrap();
        let err = auth.authenticate(Some("/gardens")).await.unwrap_err();

        match err {
            EtlError::Auth { status, body, .. } => {
                assert_eq!(status, 401);
                assert!(body.contains("bad password"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(auth.token("/gardens"), None);
    }

    #[tokio::test]
    async fn test_authenticate_tenant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .and(body_partial_json(serde_json::json!({
                "auth": {"scope": {"domain": {"name": "smartcity"}}}
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "tok-domain")
                    .set_body_json(serde_json::json!({
                        "token": {"user": {"id": "u-1", "domain": {"id": "d-9"}}}
                    })),
            )
            .mount(&server)
            .await;

        let auth = AuthManager::new(config(&server.uri())).unwrap();
        let tenant = auth.authenticate_tenant().await.unwrap();

        assert_eq!(
            tenant,
            TenantToken {
                token: "tok-domain".to_string(),
                user_id: "u-1".to_string(),
                tenant_id: "d-9".to_string(),
            }
        );
        assert_eq!(auth.token("/"), None);
    }

    #[test]
    fn test_debug_hides_password() {
        let auth = AuthManager::new(config("http://keystone:5001")).unwrap();
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("secret"));
    }
}
