//! Jamf Pro adapter: classic `/JSSResource` endpoints speak XML, newer
//! `/api` endpoints speak JSON, and a small exception table overrides
//! either rule per endpoint prefix (spec §4.4).

use url::Url;

use super::{weighted_accept, Adapter, Body, EndpointPolicy, PreparedBody};
use crate::error::{Error, Result};
use crate::utils::url_builder::UrlBuilder;

const JSS_RESOURCE_PREFIX: &str = "/JSSResource";
const API_PREFIX: &str = "/api";

fn xml_policy() -> EndpointPolicy {
    EndpointPolicy {
        accept: weighted_accept(&["application/xml", "image/*", "application/octet-stream", "application/json"]),
        content_type: Some("application/xml".to_string()),
    }
}

fn json_policy() -> EndpointPolicy {
    EndpointPolicy {
        accept: weighted_accept(&["application/json", "application/xml"]),
        content_type: Some("application/json".to_string()),
    }
}

/// Per-endpoint-prefix overrides (spec §4.4: "explicit exception table
/// allows per-endpoint overrides"). Treated as a plain data table per
/// the Design Notes rather than loaded from embedded JSON, since the
/// set is small and static.
fn exceptions() -> Vec<(&'static str, EndpointPolicy)> {
    vec![
        (
            // Multipart icon/package uploads: the boundary must dictate
            // Content-Type, so the adapter deliberately omits one.
            "/JSSResource/fileuploads",
            EndpointPolicy {
                accept: weighted_accept(&["application/xml", "application/json"]),
                content_type: None,
            },
        ),
        (
            // Computer/mobile device command endpoints accept JSON even
            // though they live under the classic prefix.
            "/JSSResource/commandflush",
            json_policy(),
        ),
    ]
}

pub struct JamfAdapter {
    instance_base: Url,
    exceptions: Vec<(&'static str, EndpointPolicy)>,
}

impl JamfAdapter {
    /// `instance_name` is the Jamf Cloud instance short name; the base
    /// domain is `https://{instance_name}.jamfcloud.com/`.
    pub fn new(instance_name: impl AsRef<str>) -> Self {
        let host = format!("https://{}.jamfcloud.com/", instance_name.as_ref());
        Self {
            instance_base: Url::parse(&host).expect("instance name produces a valid host"),
            exceptions: exceptions(),
        }
    }

    /// Overrides the instance base URL, e.g. to point at an on-prem
    /// Jamf Pro server or a test double.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.instance_base = base_url;
        self
    }
}

impl Adapter for JamfAdapter {
    fn name(&self) -> &'static str {
        "jamf"
    }

    fn resource_url(&self, endpoint: &str) -> Result<Url> {
        UrlBuilder::new(self.instance_base.clone()).build(endpoint)
    }

    fn auth_url(&self, endpoint: &str) -> Result<Url> {
        // Jamf Pro's auth endpoints live on the same host as the API.
        UrlBuilder::new(self.instance_base.clone()).build(endpoint)
    }

    fn bearer_endpoint(&self) -> &str {
        "api/v1/auth/token"
    }

    fn oauth_endpoint(&self) -> &str {
        "api/oauth/token"
    }

    fn refresh_endpoint(&self) -> &str {
        "api/v1/auth/keep-alive"
    }

    fn invalidate_endpoint(&self) -> Option<&str> {
        Some("api/v1/auth/invalidate-token")
    }

    fn endpoint_policy(&self, endpoint: &str) -> EndpointPolicy {
        for (prefix, policy) in &self.exceptions {
            if endpoint.starts_with(prefix) {
                return policy.clone();
            }
        }
        if endpoint.starts_with(JSS_RESOURCE_PREFIX) {
            xml_policy()
        } else if endpoint.starts_with(API_PREFIX) {
            json_policy()
        } else {
            json_policy()
        }
    }

    fn marshal_body(&self, endpoint: &str, body: &Body) -> Result<PreparedBody> {
        let policy = self.endpoint_policy(endpoint);
        match body {
            Body::Empty => Ok(PreparedBody::empty()),
            Body::Raw(bytes) => Ok(PreparedBody { bytes: bytes.clone(), content_type: policy.content_type }),
            Body::Xml(xml) => Ok(PreparedBody {
                bytes: xml.clone().into_bytes(),
                content_type: Some("application/xml".to_string()),
            }),
            Body::Json(value) => {
                if endpoint.starts_with(JSS_RESOURCE_PREFIX) {
                    // Classic endpoints expect XML on the wire even when
                    // the caller built the payload as a JSON value; the
                    // Executor is responsible for constructing `Body::Xml`
                    // directly for these endpoints. A JSON value reaching
                    // here for a classic endpoint is a caller error.
                    return Err(Error::ConfigurationError(format!(
                        "endpoint '{endpoint}' requires an XML body, got a JSON value"
                    )));
                }
                let bytes = serde_json::to_vec(value)?;
                Ok(PreparedBody { bytes, content_type: Some("application/json".to_string()) })
            }
        }
    }
}
