//! HTTP transport with an enforced per-call deadline.
//!
//! Epistemic foundation:
//! - K_i: Every call either yields a response or a classified error
//! - B_i: The endpoint will answer within the deadline (might not)
//! - I^B: Network availability unknowable → classify, let the caller retry
//!
//! The deadline is the only hard abort: when it elapses the in-flight future
//! is dropped, which releases the underlying connection.

use crate::models::{ClassifiedError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Raw response from a transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request/response channel to a remote service.
///
/// Implementations must turn every failure into a [`ClassifiedError`]:
/// deadline elapsed → `Timeout`, anything else at transport level → `Network`.
/// Non-2xx responses are *not* errors at this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> Result<TransportResponse>;
}

/// [`Transport`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    /// Bearer token (None for local proxies without auth)
    api_key: Option<String>,
    /// Custom headers to include in requests
    custom_headers: HashMap<String, String>,
}

impl HttpTransport {
    /// Create a new transport.
    pub fn new(api_key: Option<String>, custom_headers: HashMap<String, String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("waypoint/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ClassifiedError::unknown(
                    format!("Failed to build HTTP client: {e}"),
                    "Unable to start the search service.",
                )
            })?;

        Ok(Self {
            client,
            api_key,
            custom_headers,
        })
    }

    /// Build headers for a request.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &self.api_key {
            match HeaderValue::from_str(&format!("Bearer {api_key}")) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("API key contains characters not valid in a header, skipping"),
            }
        }

        for (key, value) in &self.custom_headers {
            if let (Ok(name), Ok(val)) = (
                HeaderName::try_from(key.as_str()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, val);
            }
        }

        headers
    }

    async fn send(&self, url: &str, payload: &serde_json::Value) -> Result<TransportResponse> {
        let response = self
            .client
            .post(url)
            .headers(self.headers())
            .json(payload)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;
        Ok(TransportResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> Result<TransportResponse> {
        let start = Instant::now();

        let response = match tokio::time::timeout(timeout, self.send(url, payload)).await {
            Ok(result) => result?,
            Err(_) => {
                debug!(url = url, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                return Err(ClassifiedError::timeout(format!(
                    "Request timed out after {}ms",
                    timeout.as_millis()
                )));
            }
        };

        debug!(
            url = url,
            status = response.status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        Ok(response)
    }
}

/// Map a `reqwest` failure onto the taxonomy.
fn classify_reqwest_error(e: reqwest::Error) -> ClassifiedError {
    if e.is_timeout() {
        return ClassifiedError::timeout(format!("Request timed out: {e}"));
    }
    ClassifiedError::network(
        "Network request failed",
        Some(json!({
            "error": e.to_string(),
            "connect": e.is_connect(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_post_json_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/places/autocomplete"))
            .and(header("authorization", "Bearer test-key"))
            .and(header("x-client", "waypoint-tests"))
            .and(body_json(json!({ "input": "Par" })))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(1)
            .mount(&server)
            .await;

        let headers = HashMap::from([("x-client".to_string(), "waypoint-tests".to_string())]);
        let transport = HttpTransport::new(Some("test-key".to_string()), headers).unwrap();
        let url = format!("{}/api/places/autocomplete", server.uri());

        let response = transport
            .post_json(&url, &json!({ "input": "Par" }), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response, TransportResponse::new(503, "busy"));
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_slow_response_becomes_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(None, HashMap::new()).unwrap();
        let error = transport
            .post_json(&server.uri(), &json!({}), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Timeout);
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_becomes_network() {
        // Bind then drop a listener so the port is very likely closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(None, HashMap::new()).unwrap();
        let error = transport
            .post_json(&format!("http://{addr}/"), &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Network);
        assert!(error.is_retryable());
        assert!(error.details().is_some());
    }
}
