//! Places autocomplete client.
//!
//! Epistemic foundation:
//! - K_i: Queries shorter than 2 characters are never sent
//! - K_i: Queries longer than 100 characters are rejected before any network call
//! - B_i: Endpoint will answer with `{ predictions, status }` (might not)
//! - I^B: Network availability unknowable → retry with backoff
//!
//! Every error returned from here is a [`ClassifiedError`] that has already
//! been recorded under the `getSuggestions` context.

use crate::client::{RetryPolicy, Transport, TransportResponse, with_retry};
use crate::models::{
    ClassifiedError, Config, ErrorKind, ErrorLog, PlacesErrorBody, PlacesResponse,
    ProviderStatus, Result, Suggestion, TracingErrorLog, classify_status, record,
};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Context tag attached to every recorded error.
pub const SUGGESTIONS_CONTEXT: &str = "getSuggestions";

/// Shortest query worth sending, in characters after trimming.
pub const MIN_QUERY_CHARS: usize = 2;

/// Longest accepted query, in characters after trimming.
pub const MAX_QUERY_CHARS: usize = 100;

/// Per-attempt deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(8_000);

const FALLBACK_USER_MESSAGE: &str = "Unable to fetch city suggestions. Please try again.";

/// Anything that can turn a query into suggestions.
///
/// The autocomplete controller depends on this rather than on the concrete
/// service so hosts and tests can substitute their own source.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn get_suggestions(&self, query: &str) -> Result<Vec<Suggestion>>;
}

/// Validate and normalize a raw query.
///
/// - `None` (absent or non-text input) → `Validation` error
/// - trimmed shorter than [`MIN_QUERY_CHARS`] → `Ok(None)`: nothing to search, not a failure
/// - trimmed longer than [`MAX_QUERY_CHARS`] → `Validation` error
pub fn validate_query(input: Option<&str>) -> Result<Option<String>> {
    let Some(input) = input else {
        return Err(ClassifiedError::validation(
            "Invalid input provided",
            "Please enter a valid search term",
        ));
    };

    let trimmed = input.trim();
    let length = trimmed.chars().count();

    if length < MIN_QUERY_CHARS {
        return Ok(None);
    }

    if length > MAX_QUERY_CHARS {
        return Err(ClassifiedError::validation(
            format!("Input too long ({length} characters)"),
            "Search term must be less than 100 characters",
        ));
    }

    Ok(Some(trimmed.to_string()))
}

/// Autocomplete lookups against a single endpoint.
///
/// Stateless apart from its injected handles; safe to share across tasks.
pub struct SuggestionService {
    transport: Arc<dyn Transport>,
    endpoint: String,
    policy: RetryPolicy,
    timeout: Duration,
    error_log: Arc<dyn ErrorLog>,
}

impl SuggestionService {
    /// Create a service with the default policy, deadline and tracing error log.
    pub fn new(transport: Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            policy: RetryPolicy::suggestions(),
            timeout: DEFAULT_TIMEOUT,
            error_log: Arc::new(TracingErrorLog),
        }
    }

    /// Build an HTTP-backed service from configuration.
    pub fn from_config(config: &Config, error_log: Arc<dyn ErrorLog>) -> Result<Self> {
        let transport =
            crate::client::HttpTransport::new(config.resolve_api_key(), config.resolved_headers())?;

        Ok(Self::new(Arc::new(transport), config.places.endpoint.clone())
            .with_policy(config.retry.policy())
            .with_timeout(config.places.timeout())
            .with_error_log(error_log))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_error_log(mut self, error_log: Arc<dyn ErrorLog>) -> Self {
        self.error_log = error_log;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Look up suggestions for a query.
    ///
    /// B_i(query valid) → Result
    /// B_i(endpoint available) → Result, retried per policy
    pub async fn get_suggestions(&self, query: &str) -> Result<Vec<Suggestion>> {
        self.get_suggestions_for(Some(query)).await
    }

    /// Same as [`get_suggestions`](Self::get_suggestions) for input that may be absent.
    pub async fn get_suggestions_for(&self, input: Option<&str>) -> Result<Vec<Suggestion>> {
        let query = match validate_query(input) {
            Ok(Some(query)) => query,
            Ok(None) => return Ok(Vec::new()),
            Err(error) => {
                record(self.error_log.as_ref(), &error, SUGGESTIONS_CONTEXT);
                return Err(error);
            }
        };

        with_retry(|| self.fetch_once(&query), &self.policy).await
    }

    /// One attempt: call, interpret, record any failure.
    async fn fetch_once(&self, query: &str) -> Result<Vec<Suggestion>> {
        let result = self.try_fetch(query).await;
        match &result {
            Ok(suggestions) => debug!(
                query = query,
                count = suggestions.len(),
                "Suggestions fetched"
            ),
            Err(error) => record(self.error_log.as_ref(), error, SUGGESTIONS_CONTEXT),
        }
        result
    }

    async fn try_fetch(&self, query: &str) -> Result<Vec<Suggestion>> {
        let payload = json!({ "input": query });
        let call = self.transport.post_json(&self.endpoint, &payload, self.timeout);

        let response = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result?,
            Err(panic) => {
                return Err(ClassifiedError::unknown(
                    format!("Transport panicked: {}", panic_message(panic.as_ref())),
                    FALLBACK_USER_MESSAGE,
                ));
            }
        };

        interpret_response(&response)
    }
}

#[async_trait]
impl SuggestionSource for SuggestionService {
    async fn get_suggestions(&self, query: &str) -> Result<Vec<Suggestion>> {
        self.get_suggestions_for(Some(query)).await
    }
}

/// Turn a transport response into suggestions or a classified error.
pub fn interpret_response(response: &TransportResponse) -> Result<Vec<Suggestion>> {
    if !response.is_success() {
        return Err(http_error(response));
    }

    let body: PlacesResponse = serde_json::from_str(&response.body).map_err(|e| {
        ClassifiedError::unknown(format!("Failed to parse response: {e}"), FALLBACK_USER_MESSAGE)
            .with_status(response.status)
    })?;

    if let Some(status) = body.status.as_deref().map(ProviderStatus::parse)
        && !status.is_success()
    {
        return Err(ClassifiedError::new(
            ErrorKind::Provider,
            format!("Places provider error: {status}"),
            status.user_message(),
            Some(response.status),
            status.is_retryable(),
            Some(json!({ "providerStatus": status.as_str() })),
        ));
    }

    Ok(body
        .predictions
        .unwrap_or_default()
        .into_iter()
        .map(Suggestion::from)
        .collect())
}

/// Classify a non-2xx response.
fn http_error(response: &TransportResponse) -> ClassifiedError {
    let status = response.status;
    let original = serde_json::from_str::<PlacesErrorBody>(&response.body)
        .ok()
        .and_then(|body| body.error)
        .filter(|error| !error.is_empty());

    let internal_message = original
        .clone()
        .unwrap_or_else(|| format!("HTTP error! status: {status}"));

    ClassifiedError::new(
        classify_status(status),
        internal_message,
        status_user_message(status, original.as_deref()),
        Some(status),
        status >= 500 || status == 429,
        Some(json!({
            "status": status,
            "originalError": original.unwrap_or_else(|| response.body.clone()),
        })),
    )
}

/// Display-safe message for an HTTP status.
fn status_user_message(status: u16, original: Option<&str>) -> String {
    let message = match status {
        400 => "Invalid search request. Please check your input.",
        401 | 403 => "Access denied. Please try again later.",
        429 => "Too many requests. Please wait a moment before searching again.",
        500 | 502 | 503 => "Server is temporarily unavailable. Please try again in a moment.",
        504 => "Request timed out. Please try again.",
        _ => original.unwrap_or("Unable to fetch suggestions. Please try again."),
    };
    message.to_string()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
