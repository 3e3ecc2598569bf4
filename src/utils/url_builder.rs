//! Shared base-URL-plus-path joining used by adapters for both the
//! resource host and the auth host.

use crate::error::{Error, Result};
use url::Url;

/// Joins a path onto a base URL with consistent leading/trailing slash
/// handling, regardless of which convention the caller used.
pub struct UrlBuilder {
    base_url: Url,
}

impl UrlBuilder {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    /// Builds a URL by appending `path` to the base URL. Leading slashes
    /// on `path` are stripped so callers don't need to know whether the
    /// base URL itself ends in `/`.
    pub fn build(&self, path: &str) -> Result<Url> {
        let clean_path = path.trim_start_matches('/');
        self.base_url
            .join(clean_path)
            .map_err(|e| Error::ConfigurationError(format!("invalid URL for path '{path}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_with_trailing_slash_appends_cleanly() {
        let builder = UrlBuilder::new(Url::parse("https://api.example.com/v1/").unwrap());
        let url = builder.build("activity").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/activity");
    }

    #[test]
    fn leading_slash_on_path_does_not_double_up() {
        let builder = UrlBuilder::new(Url::parse("https://api.example.com/v1/").unwrap());
        let url = builder.build("/activity").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/activity");
    }

    #[test]
    fn base_without_trailing_slash_replaces_last_segment() {
        let builder = UrlBuilder::new(Url::parse("https://api.example.com/v1").unwrap());
        let url = builder.build("activity").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/activity");
    }
}
