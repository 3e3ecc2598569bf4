//! Redirect-following policy: loop detection, hop limit, cross-origin
//! sensitive-header stripping, and the 303 method rewrite.

use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName};
use std::collections::HashSet;
use url::Url;

#[derive(Debug, Clone)]
pub struct RedirectConfig {
    pub follow: bool,
    pub max_redirects: usize,
    pub sensitive_headers: Vec<String>,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            follow: true,
            max_redirects: 10,
            sensitive_headers: vec!["Authorization".to_string(), "Cookie".to_string()],
        }
    }
}

/// Per-call state: the set of URLs already visited, discarded when the
/// call returns. Never shared across calls.
#[derive(Default)]
pub struct RedirectState {
    visited: HashSet<String>,
    hops: usize,
}

/// The outcome of following one redirect: where to go next, and what
/// mutations the caller's request needs to make before retrying.
pub struct RedirectOutcome {
    pub next_url: Url,
    pub rewrite_to_get: bool,
    pub strip_headers: Vec<HeaderName>,
}

/// Resolves a single redirect hop from `current_url` given the response
/// `status` and `Location` header, enforcing loop/hop-limit checks and
/// computing which headers must be stripped for a cross-origin hop.
pub fn follow(
    config: &RedirectConfig,
    state: &mut RedirectState,
    current_url: &Url,
    status: u16,
    location: &str,
) -> Result<RedirectOutcome> {
    let next_url = current_url
        .join(location)
        .map_err(|e| Error::ConfigurationError(format!("invalid redirect Location '{location}': {e}")))?;

    let key = next_url.as_str().to_string();
    if state.visited.contains(&key) {
        return Err(Error::RedirectLoop(key));
    }
    if state.hops >= config.max_redirects {
        return Err(Error::RedirectLimitExceeded(config.max_redirects));
    }

    state.visited.insert(key);
    state.hops += 1;

    let cross_origin = current_url.origin() != next_url.origin();
    let strip_headers = if cross_origin {
        config
            .sensitive_headers
            .iter()
            .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
            .collect()
    } else {
        Vec::new()
    };

    Ok(RedirectOutcome {
        next_url,
        rewrite_to_get: status == 303,
        strip_headers,
    })
}

/// Applies a [`RedirectOutcome`] to a set of request headers in place,
/// removing stripped headers. Method/body rewriting for a 303 is the
/// Executor's responsibility since it owns the request body.
pub fn apply_header_stripping(headers: &mut HeaderMap, outcome: &RedirectOutcome) {
    for name in &outcome.strip_headers {
        headers.remove(name);
    }
}
