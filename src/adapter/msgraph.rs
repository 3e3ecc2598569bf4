//! Microsoft Graph adapter: fixed resource host, tenant-scoped auth
//! host, all bodies JSON (spec §4.4).

use url::Url;

use super::{weighted_accept, Adapter, Body, EndpointPolicy, PreparedBody};
use crate::error::Result;
use crate::utils::url_builder::UrlBuilder;

pub struct MsGraphAdapter {
    tenant: String,
    resource_base: Url,
    auth_root: Url,
}

impl MsGraphAdapter {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            resource_base: Url::parse("https://graph.microsoft.com/").unwrap(),
            auth_root: Url::parse("https://login.microsoftonline.com/").unwrap(),
        }
    }

    /// Overrides the resource (API) host, e.g. for government cloud
    /// endpoints or a test double.
    pub fn with_resource_base_url(mut self, url: Url) -> Self {
        self.resource_base = url;
        self
    }

    /// Overrides the root auth host (the `{tenant}/...` path is still
    /// appended by `auth_url`).
    pub fn with_auth_base_url(mut self, url: Url) -> Self {
        self.auth_root = url;
        self
    }
}

impl Adapter for MsGraphAdapter {
    fn name(&self) -> &'static str {
        "msgraph"
    }

    fn resource_url(&self, endpoint: &str) -> Result<Url> {
        UrlBuilder::new(self.resource_base.clone()).build(endpoint)
    }

    fn auth_url(&self, endpoint: &str) -> Result<Url> {
        let tenant_scoped = format!("{}/{}", self.tenant.trim_matches('/'), endpoint.trim_start_matches('/'));
        UrlBuilder::new(self.auth_root.clone()).build(&tenant_scoped)
    }

    fn bearer_endpoint(&self) -> &str {
        // Graph has no basic->bearer exchange; exposed only so the trait
        // is total. A Basic credential paired with this adapter will
        // fail at the token endpoint rather than mid-request.
        "oauth2/v2.0/token"
    }

    fn oauth_endpoint(&self) -> &str {
        "oauth2/v2.0/token"
    }

    fn refresh_endpoint(&self) -> &str {
        "oauth2/v2.0/token"
    }

    fn endpoint_policy(&self, _endpoint: &str) -> EndpointPolicy {
        EndpointPolicy {
            accept: weighted_accept(&["application/json"]),
            content_type: Some("application/json".to_string()),
        }
    }

    fn marshal_body(&self, endpoint: &str, body: &Body) -> Result<PreparedBody> {
        match body {
            Body::Empty => Ok(PreparedBody::empty()),
            Body::Raw(bytes) => Ok(PreparedBody { bytes: bytes.clone(), content_type: Some("application/json".to_string()) }),
            Body::Xml(_) => Err(crate::error::Error::ConfigurationError(format!(
                "endpoint '{endpoint}' on the msgraph adapter does not accept XML bodies"
            ))),
            Body::Json(value) => {
                let bytes = serde_json::to_vec(value)?;
                Ok(PreparedBody { bytes, content_type: Some("application/json".to_string()) })
            }
        }
    }
}
