//! Centralized error taxonomy for the request-execution core.
//!
//! Every kind here corresponds to a category named in the design: errors
//! recovered locally (token/transport) never escape the [`crate::executor`]
//! retry loop; everything else is surfaced to the caller wrapped in enough
//! context (status, method, url, message, raw body preview) to act on.

use crate::utils::security::create_safe_error_message;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Normalized description of a failed API call, regardless of which
/// backend dialect produced it.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub method: String,
    pub url: String,
    pub message: String,
    /// Full raw body, never truncated; truncation only applies to what
    /// gets embedded in `Display`/log output.
    pub raw_body: String,
}

impl ApiError {
    pub fn new(status: u16, method: impl Into<String>, url: impl Into<String>, message: impl Into<String>, raw_body: impl Into<String>) -> Self {
        Self {
            status,
            method: method.into(),
            url: url.into(),
            message: message.into(),
            raw_body: raw_body.into(),
        }
    }

    /// A body preview suitable for log lines: redacted and capped.
    pub fn body_preview(&self, byte_budget: usize) -> String {
        let redacted = create_safe_error_message(&self.raw_body, "body");
        if redacted.len() > byte_budget {
            format!("{}…", &redacted[..byte_budget.min(redacted.len())])
        } else {
            redacted
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {}: {}",
            self.method, self.url, self.status, self.message
        )
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Bad adapter/credential at build time; token buffer >= token
    /// lifetime; unsupported auth method.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Credential acquisition failed after internal retries, the
    /// refresh endpoint returned non-success, or the token response was
    /// malformed.
    #[error("token error: {0}")]
    TokenError(String),

    /// Network, TLS, or DNS failure. Recovered locally up to the retry
    /// budget; surfaced as-is once exhausted.
    #[error("transport error: {0}")]
    TransportError(#[from] reqwest::Error),

    /// 429 persisted across the retry budget.
    #[error("rate limit exhausted after {attempts} attempts: {source}")]
    RateLimitExhausted { attempts: u32, source: ApiError },

    /// 5xx (or 5xx-equivalent network failure) persisted across the
    /// retry budget.
    #[error("transient failure exhausted after {attempts} attempts: {source}")]
    TransientExhausted { attempts: u32, source: ApiError },

    /// 4xx with a normalized message from the Response Decoder.
    #[error("non-retryable API error: {0}")]
    NonRetryableApiError(ApiError),

    /// Unknown Content-Type on a success response.
    #[error("unsupported response media type {content_type:?} for {method} {url}")]
    UnsupportedResponseMedia {
        content_type: String,
        method: String,
        url: String,
    },

    /// Content-Type matched a known dispatch branch but the parser
    /// failed.
    #[error("decode error for {method} {url}: {message}")]
    DecodeError {
        method: String,
        url: String,
        message: String,
    },

    #[error("redirect loop detected at {0}")]
    RedirectLoop(String),

    #[error("maximum redirect count ({0}) exceeded")]
    RedirectLimitExceeded(usize),

    #[error("call cancelled")]
    Cancelled,

    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The concurrency gate's semaphore was closed. Never happens in
    /// normal operation (nothing ever calls `Semaphore::close`); kept as
    /// a distinct kind so a bug there surfaces as a typed error instead
    /// of a panic.
    #[error("concurrency gate closed")]
    GateClosed,
}

impl From<tokio::sync::AcquireError> for Error {
    fn from(_: tokio::sync::AcquireError) -> Self {
        Error::GateClosed
    }
}

impl Error {
    /// True for the kinds the Executor recovers locally within budget
    /// (spec §7 propagation policy); everything else always surfaces.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(self, Error::TokenError(_) | Error::TransportError(_))
    }
}

/// Strips sensitive header values for inclusion in logs/errors, as used
/// by the Token Manager and Structured Logger when `hide_sensitive_data`
/// is set.
pub fn redact(value: &str) -> String {
    create_safe_error_message(value, "header")
}

#[cfg(test)]
mod tests;
