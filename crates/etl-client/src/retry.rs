//! Retry policy for transient HTTP failures
//!
//! The policy is plain configuration, built once per client. Requests are
//! retried on transport errors and on statuses that signal a temporary
//! condition (throttling, gateway or availability problems).

use crate::config::{DEFAULT_POST_RETRY_BACKOFF_FACTOR, DEFAULT_POST_RETRY_CONNECT};
use crate::error::{EtlError, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Request, Response, StatusCode};
use std::time::Duration;
use tracing::warn;

/// Statuses retried by default
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_factor: f64,
    statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_POST_RETRY_CONNECT,
            backoff_factor: DEFAULT_POST_RETRY_BACKOFF_FACTOR,
            statuses: RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// `backoff_factor` is in seconds and must be finite.
    pub fn new(max_retries: u32, backoff_factor: f64) -> Result<Self> {
        if !backoff_factor.is_finite() {
            return Err(EtlError::validation(format!(
                "Invalid value {} for <<backoff_factor>>: must be a finite number of seconds",
                backoff_factor
            )));
        }
        Ok(Self {
            max_retries,
            backoff_factor: backoff_factor.max(0.0),
            statuses: RETRYABLE_STATUSES.to_vec(),
        })
    }

    /// A policy that sends every request exactly once.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_factor: 0.0,
            statuses: RETRYABLE_STATUSES.to_vec(),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_retryable(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status.as_u16())
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// The first retry is immediate; later ones wait
    /// `backoff_factor * 2^(retry - 1)` seconds, saturating at `Duration::MAX`.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let exponent = (retry - 1).min(16) as i32;
        Duration::try_from_secs_f64(self.backoff_factor * 2f64.powi(exponent)).unwrap_or(Duration::MAX)
    }

    /// Execute `request`, retrying transient failures.
    ///
    /// When retries are exhausted on a retryable status, that last response is
    /// returned so the caller can report its status and body.
    pub async fn execute(&self, client: &Client, request: Request) -> Result<Response> {
        let mut retry = 0;

        loop {
            let attempt = request
                .try_clone()
                .ok_or_else(|| EtlError::validation("Request body cannot be retried"))?;
            let exhausted = retry >= self.max_retries;

            match client.execute(attempt).await {
                Ok(response) if !exhausted && self.is_retryable(response.status()) => {
                    retry += 1;
                    let delay = retry_after(&response).unwrap_or_else(|| self.backoff(retry));
                    warn!(
                        status = response.status().as_u16(),
                        url = %request.url(),
                        retry,
                        max_retries = self.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        "Retryable response, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Ok(response),
                Err(err) if !exhausted && is_transient(&err) => {
                    retry += 1;
                    let delay = self.backoff(retry);
                    warn!(
                        error = %err,
                        url = %request.url(),
                        retry,
                        max_retries = self.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

/// `Retry-After` in seconds, honoured on 429 and 503 answers.
fn retry_after(response: &Response) -> Option<Duration> {
    if !matches!(
        response.status(),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    ) {
        return None;
    }
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::new(4, 20.0).unwrap();
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::from_secs(40));
        assert_eq!(policy.backoff(3), Duration::from_secs(80));
        assert_eq!(policy.backoff(4), Duration::from_secs(160));
    }

    #[test]
    fn test_huge_backoff_saturates() {
        let policy = RetryPolicy::new(3, 1e300).unwrap();
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::MAX);
    }

    #[test]
    fn test_non_finite_backoff_is_rejected() {
        for factor in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let err = RetryPolicy::new(3, factor).unwrap_err();
            assert!(matches!(err, EtlError::Validation(_)));
        }
    }

    #[test]
    fn test_retryable_statuses() {
        let policy = RetryPolicy::default();
        for status in [429, 500, 502, 503, 504] {
            assert!(policy.is_retryable(StatusCode::from_u16(status).unwrap()));
        }
        for status in [200, 204, 400, 401, 404, 422] {
            assert!(!policy.is_retryable(StatusCode::from_u16(status).unwrap()));
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/op/update"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/op/update"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new();
        let request = client
            .post(format!("{}/v2/op/update", server.uri()))
            .body("{}")
            .build()
            .unwrap();

        let response = RetryPolicy::new(3, 0.0).unwrap().execute(&client, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_returns_last_response_when_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(3)
            .mount(&server)
            .await;

        let client = Client::new();
        let request = client.post(server.uri()).body("{}").build().unwrap();

        let response = RetryPolicy::new(2, 0.0).unwrap().execute(&client, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.text().await.unwrap(), "bad gateway");
    }

    #[tokio::test]
    async fn test_non_retryable_status_is_returned_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new();
        let request = client.post(server.uri()).body("{}").build().unwrap();

        let response = RetryPolicy::new(3, 0.0).unwrap().execute(&client, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_connection_error_surfaces_after_retries() {
        let client = Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        // nothing listens on the discard port
        let request = client.post("http://127.0.0.1:9/").body("{}").build().unwrap();

        let err = RetryPolicy::new(1, 0.0).unwrap().execute(&client, request).await.unwrap_err();
        assert!(matches!(err, EtlError::Http(_)));
    }

    #[tokio::test]
    async fn test_retry_after_wins_over_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "0"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new();
        let request = client.post(server.uri()).body("{}").build().unwrap();

        // the second retry would otherwise wait 2000 seconds
        let policy = RetryPolicy::new(3, 1000.0).unwrap();
        let response = tokio::time::timeout(Duration::from_secs(10), policy.execute(&client, request))
            .await
            .expect("Retry-After was ignored")
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_retry_after_delays_first_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new();
        let request = client.post(server.uri()).body("{}").build().unwrap();

        let started = std::time::Instant::now();
        let response = RetryPolicy::new(3, 0.0)
            .unwrap()
            .execute(&client, request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
