//! Error taxonomy for waypoint.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (bad input, rejected credentials)
//! - I^B materialized: Infrastructure failures (network, timeout, provider, rate limit)
//! - I^B unresolvable: Truly unknown failure
//!
//! Every failure that crosses a component boundary is a [`ClassifiedError`].
//! The `internal_message` and `details` are diagnostic only; anything shown to
//! a user goes through [`user_facing_message`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED — Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════
    /// Connection refused, DNS failure, broken body stream
    Network,
    /// Upstream 5xx-class failure or a provider-level status
    Provider,
    /// Upstream asked us to slow down
    RateLimited,
    /// No response within the per-call deadline
    Timeout,

    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════
    /// Bad input, rejected before or by the service
    Validation,
    /// Credentials missing or rejected
    Authentication,

    // ═══════════════════════════════════════════════════════════════════
    // I^B UNRESOLVABLE — Truly unknown failure
    // ═══════════════════════════════════════════════════════════════════
    Unknown,
}

impl ErrorKind {
    /// Stable snake_case name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Provider => "provider",
            Self::Validation => "validation",
            Self::RateLimited => "rate_limited",
            Self::Authentication => "authentication",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured, immutable error value.
///
/// K_i: `retryable` is fixed at construction and never changes afterwards;
/// fields are private so no caller can flip it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} error: {internal_message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    internal_message: String,
    user_message: String,
    status_code: Option<u16>,
    retryable: bool,
    details: Option<serde_json::Value>,
}

impl ClassifiedError {
    /// Create a classified error.
    pub fn new(
        kind: ErrorKind,
        internal_message: impl Into<String>,
        user_message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind,
            internal_message: internal_message.into(),
            user_message: user_message.into(),
            status_code,
            retryable,
            details,
        }
    }

    /// Rejected input. Never retryable.
    pub fn validation(internal_message: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Validation,
            internal_message,
            user_message,
            Some(400),
            false,
            None,
        )
    }

    /// Deadline elapsed before a response arrived.
    pub fn timeout(internal_message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Timeout,
            internal_message,
            "The request took too long to complete",
            Some(408),
            true,
            None,
        )
    }

    /// Transport-level failure other than a timeout.
    pub fn network(internal_message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self::new(
            ErrorKind::Network,
            internal_message,
            "Unable to connect to the server",
            None,
            true,
            details,
        )
    }

    /// Anything we did not anticipate. Retryable, since we cannot rule out a transient cause.
    pub fn unknown(internal_message: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Unknown,
            internal_message,
            user_message,
            None,
            true,
            None,
        )
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Override the retry decision while the value is still being built.
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Diagnostic message. Not for display.
    pub fn internal_message(&self) -> &str {
        &self.internal_message
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Structured payload for logging/debugging only.
    pub fn details(&self) -> Option<&serde_json::Value> {
        self.details.as_ref()
    }

    /// Display-safe message for this error.
    pub fn user_facing_message(&self) -> String {
        user_facing_message(self)
    }
}

/// Map an HTTP status code to an error kind.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::Validation,
        401 | 403 => ErrorKind::Authentication,
        408 | 504 => ErrorKind::Timeout,
        429 => ErrorKind::RateLimited,
        500 | 502 | 503 => ErrorKind::Provider,
        _ => ErrorKind::Unknown,
    }
}

/// Render a message suitable for end users.
///
/// Never includes the internal message or details. Validation errors echo
/// their own user message because it describes what to fix.
pub fn user_facing_message(error: &ClassifiedError) -> String {
    let message = match error.kind {
        ErrorKind::Network => "Please check your internet connection and try again.",
        ErrorKind::Provider => {
            "We're experiencing technical difficulties. Please try again in a moment."
        }
        ErrorKind::Validation if !error.user_message.trim().is_empty() => {
            return error.user_message.clone();
        }
        ErrorKind::Validation => "Please check your input and try again.",
        ErrorKind::RateLimited => "Too many requests. Please wait a moment before trying again.",
        ErrorKind::Authentication => "Authentication failed. Please check your credentials.",
        ErrorKind::Timeout => "The request timed out. Please try again.",
        ErrorKind::Unknown => "Something went wrong. Please try again.",
    };
    message.to_string()
}

/// Result type alias for waypoint.
pub type Result<T> = std::result::Result<T, ClassifiedError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_status_table() {
        assert_eq!(classify_status(400), ErrorKind::Validation);
        assert_eq!(classify_status(401), ErrorKind::Authentication);
        assert_eq!(classify_status(403), ErrorKind::Authentication);
        assert_eq!(classify_status(408), ErrorKind::Timeout);
        assert_eq!(classify_status(504), ErrorKind::Timeout);
        assert_eq!(classify_status(429), ErrorKind::RateLimited);
        for status in [500, 502, 503] {
            assert_eq!(classify_status(status), ErrorKind::Provider);
        }
        for status in [0, 200, 404, 418, 501, 599] {
            assert_eq!(classify_status(status), ErrorKind::Unknown, "status {status}");
        }
    }

    #[test]
    fn test_user_message_never_leaks_internals() {
        let error = ClassifiedError::new(
            ErrorKind::Provider,
            "upstream exploded: secret=abc123",
            "ignored for provider errors",
            Some(502),
            true,
            Some(json!({ "token": "abc123" })),
        );

        let message = user_facing_message(&error);
        assert!(!message.contains("abc123"));
        assert!(message.contains("technical difficulties"));
    }

    #[test]
    fn test_validation_echoes_user_message() {
        let error = ClassifiedError::validation("too long", "Search term must be less than 100 characters");
        assert_eq!(
            error.user_facing_message(),
            "Search term must be less than 100 characters"
        );

        let bare = ClassifiedError::validation("empty", "");
        assert_eq!(
            bare.user_facing_message(),
            "Please check your input and try again."
        );
    }

    #[test]
    fn test_per_kind_templates() {
        let network = ClassifiedError::network("connection refused", None);
        assert!(network.user_facing_message().contains("internet connection"));

        let limited = ClassifiedError::new(ErrorKind::RateLimited, "429", "", Some(429), true, None);
        assert!(limited.user_facing_message().contains("wait a moment"));

        let timeout = ClassifiedError::timeout("deadline elapsed");
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert!(timeout.is_retryable());
        assert!(timeout.user_facing_message().contains("timed out"));
    }

    #[test]
    fn test_builder_helpers() {
        let error = ClassifiedError::unknown("decode failed", "Try again")
            .with_status(200)
            .with_details(json!({ "byte": 3 }))
            .retryable(false);

        assert_eq!(error.status_code(), Some(200));
        assert_eq!(error.details(), Some(&json!({ "byte": 3 })));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_display_is_diagnostic() {
        let error = ClassifiedError::unknown("decoder failed at byte 3", "Try again");
        assert_eq!(error.to_string(), "unknown error: decoder failed at byte 3");
        assert_eq!(error.status_code(), None);
        assert!(error.details().is_none());
    }
}
