//! Structured Logger Interface (spec §4.9): a sink every component logs
//! through, with specialized methods for the events the Executor, Token
//! Manager, and Gate need to surface. No implementation is mandated; a
//! no-op default satisfies the interface for tests, and an optional
//! `tracing`-backed implementation is provided behind the `tracing`
//! feature.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured key-value fields attached to one log event. `BTreeMap` for
/// deterministic ordering in tests and any backend that serializes them
/// verbatim.
pub type Fields = BTreeMap<String, String>;

pub fn fields() -> Fields {
    BTreeMap::new()
}

/// Implementations must be safe under parallel callers (spec §4.9);
/// `Send + Sync` captures that at the type level.
pub trait Logger: Send + Sync {
    fn enabled(&self, level: Level) -> bool;
    fn emit(&self, level: Level, message: &str, fields: &Fields);

    fn request_start(&self, method: &str, url: &str, attempt: u32) {
        if !self.enabled(Level::Debug) {
            return;
        }
        let mut f = fields();
        f.insert("method".into(), method.into());
        f.insert("url".into(), url.into());
        f.insert("attempt".into(), attempt.to_string());
        self.emit(Level::Debug, "request start", &f);
    }

    fn request_end(&self, method: &str, url: &str, status: u16, elapsed_ms: u128) {
        if !self.enabled(Level::Info) {
            return;
        }
        let mut f = fields();
        f.insert("method".into(), method.into());
        f.insert("url".into(), url.into());
        f.insert("status".into(), status.to_string());
        f.insert("elapsed_ms".into(), elapsed_ms.to_string());
        self.emit(Level::Info, "request end", &f);
    }

    fn error(&self, method: &str, url: &str, status: Option<u16>, message: &str, raw_body_preview: &str) {
        if !self.enabled(Level::Error) {
            return;
        }
        let mut f = fields();
        f.insert("method".into(), method.into());
        f.insert("url".into(), url.into());
        if let Some(s) = status {
            f.insert("status".into(), s.to_string());
        }
        f.insert("body_preview".into(), raw_body_preview.into());
        self.emit(Level::Error, message, &f);
    }

    fn retry(&self, method: &str, url: &str, attempt: u32, wait: std::time::Duration, reason: &str) {
        if !self.enabled(Level::Warn) {
            return;
        }
        let mut f = fields();
        f.insert("method".into(), method.into());
        f.insert("url".into(), url.into());
        f.insert("attempt".into(), attempt.to_string());
        f.insert("wait_ms".into(), wait.as_millis().to_string());
        f.insert("reason".into(), reason.into());
        self.emit(Level::Warn, "retrying", &f);
    }

    fn rate_limit_wait(&self, url: &str, wait: std::time::Duration) {
        if !self.enabled(Level::Warn) {
            return;
        }
        let mut f = fields();
        f.insert("url".into(), url.into());
        f.insert("wait_ms".into(), wait.as_millis().to_string());
        self.emit(Level::Warn, "rate limit wait", &f);
    }

    fn cookie_trace(&self, url: &str, cookie_names: &[String]) {
        if !self.enabled(Level::Trace) {
            return;
        }
        let mut f = fields();
        f.insert("url".into(), url.into());
        f.insert("cookies".into(), cookie_names.join(","));
        self.emit(Level::Trace, "cookie jar updated", &f);
    }
}

/// Satisfies [`Logger`] without emitting anything. The default for a
/// `Client` built without explicit logging configuration, and for
/// tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn enabled(&self, _level: Level) -> bool {
        false
    }

    fn emit(&self, _level: Level, _message: &str, _fields: &Fields) {}
}

/// Redacting wrapper: replaces any field whose key looks like a header
/// or credential with [`crate::error::redact`]'s output before handing
/// the event to the wrapped logger. Used when `hide_sensitive_data` is
/// set (spec §4.9, §6 `logging.sensitive_redaction`).
pub struct RedactingLogger<L: Logger> {
    inner: L,
}

impl<L: Logger> RedactingLogger<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

const SENSITIVE_FIELD_KEYS: &[&str] = &["authorization", "cookie", "token", "body_preview"];

impl<L: Logger> Logger for RedactingLogger<L> {
    fn enabled(&self, level: Level) -> bool {
        self.inner.enabled(level)
    }

    fn emit(&self, level: Level, message: &str, fields: &Fields) {
        let redacted: Fields = fields
            .iter()
            .map(|(k, v)| {
                if SENSITIVE_FIELD_KEYS.contains(&k.to_ascii_lowercase().as_str()) {
                    (k.clone(), crate::error::redact(v))
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect();
        self.inner.emit(level, message, &redacted);
    }
}

/// `tracing`-backed implementation, mirroring the direct `tracing::*!`
/// call style already used elsewhere in this crate's transport layer.
#[cfg(feature = "tracing")]
pub struct TracingLogger {
    pub min_level: Level,
}

#[cfg(feature = "tracing")]
impl Logger for TracingLogger {
    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn emit(&self, level: Level, message: &str, fields: &Fields) {
        let field_str = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        match level {
            Level::Trace => tracing::trace!("{message} {field_str}"),
            Level::Debug => tracing::debug!("{message} {field_str}"),
            Level::Info => tracing::info!("{message} {field_str}"),
            Level::Warn => tracing::warn!("{message} {field_str}"),
            Level::Error => tracing::error!("{message} {field_str}"),
        }
    }
}
