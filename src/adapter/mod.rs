//! Per-backend policy (spec §4.4): base-URL construction, accept/content-
//! type negotiation, request/multipart marshaling, and the auth endpoint
//! constants the [`crate::token::TokenManager`] needs.
//!
//! `Adapter` is the "capability object passed to the Executor" the
//! Design Notes call for in place of interface-downcasting: the
//! Executor only ever calls trait methods, never inspects which
//! concrete adapter it holds.

pub mod jamf;
pub mod msgraph;

use url::Url;

use crate::error::Result;
use crate::multipart::MultipartBody;

/// What an un-serialized request body represents, before an adapter
/// turns it into wire bytes. The Executor chooses this (spec §9:
/// "the Executor chooses the variant before transport"); adapters never
/// see a caller's concrete type `T`.
#[derive(Debug, Clone)]
pub enum Body {
    /// Serialized as JSON or XML depending on the adapter's per-endpoint
    /// rules, from a `serde_json::Value` intermediate representation.
    Json(serde_json::Value),
    /// Pre-rendered XML payload (Jamf `/JSSResource` writes).
    Xml(String),
    /// Opaque bytes, sent as-is.
    Raw(Vec<u8>),
    /// No body (GET, DELETE, and the 303-rewrite case).
    Empty,
}

/// The fully wire-ready form of a request body: bytes plus the
/// Content-Type the adapter chose (or `None` when the adapter wants the
/// transport to set it, e.g. a multipart boundary).
#[derive(Debug, Clone)]
pub struct PreparedBody {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl PreparedBody {
    pub fn empty() -> Self {
        Self { bytes: Vec::new(), content_type: None }
    }
}

/// Accept/Content-Type rule for one endpoint (or endpoint-prefix class).
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    pub accept: String,
    pub content_type: Option<String>,
}

/// Builds a weighted `Accept` header preferring earlier entries, mirroring
/// the "weighted list" negotiation spec §4.4/§6 describe for both
/// adapters.
pub fn weighted_accept(preference_order: &[&str]) -> String {
    preference_order
        .iter()
        .enumerate()
        .map(|(i, mime)| {
            let q = (1.0 - i as f64 * 0.1).max(0.1);
            format!("{mime};q={q:.1}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub trait Adapter: Send + Sync {
    /// Short identifier used in logs and test assertions.
    fn name(&self) -> &'static str;

    /// Resolves `endpoint` against this backend's resource (API) host.
    fn resource_url(&self, endpoint: &str) -> Result<Url>;

    /// Resolves `endpoint` against this backend's auth host.
    fn auth_url(&self, endpoint: &str) -> Result<Url>;

    /// Endpoint for basic-credential → bearer-token exchange.
    fn bearer_endpoint(&self) -> &str;

    /// Endpoint for OAuth2 client-credentials token exchange.
    fn oauth_endpoint(&self) -> &str;

    /// Endpoint for refreshing an existing bearer token.
    fn refresh_endpoint(&self) -> &str;

    /// Endpoint for explicit token invalidation, if the backend offers one.
    fn invalidate_endpoint(&self) -> Option<&str> {
        None
    }

    /// Accept/Content-Type rule for `endpoint`.
    fn endpoint_policy(&self, endpoint: &str) -> EndpointPolicy;

    /// Serializes `body` into wire bytes per `endpoint`'s content-type
    /// rule.
    fn marshal_body(&self, endpoint: &str, body: &Body) -> Result<PreparedBody>;

    /// Builds a `multipart/form-data` form from fields and files. Shared
    /// across adapters since boundary negotiation is a transport concern,
    /// not a backend-specific one; adapters may override if a backend
    /// needs bespoke field naming.
    fn marshal_multipart<'a>(
        &'a self,
        _endpoint: &'a str,
        body: &'a MultipartBody,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<reqwest::multipart::Form>> + Send + 'a>> {
        Box::pin(async move { body.to_form().await })
    }
}
