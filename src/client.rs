//! The public surface: a type-state builder (`Unconfigured -> NoAuth ->
//! Ready`, generalizing the teacher's `OpenRouterClient<State>` pattern)
//! producing a [`Client`] that exposes `execute`/`execute_multipart`
//! (spec §6).

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use crate::adapter::jamf::JamfAdapter;
use crate::adapter::msgraph::MsGraphAdapter;
use crate::adapter::{Adapter, Body};
use crate::backoff::BackoffConfig;
use crate::context::CallContext;
use crate::decode::Decoded;
use crate::error::{Error, Result};
use crate::executor::{Executor, RetryPolicyConfig};
use crate::gate::{Gate, GateConfig};
use crate::logger::{Logger, NoopLogger};
use crate::metrics::{MetricsSink, NoopMetricsSink};
use crate::multipart::MultipartBody;
use crate::redirect::RedirectConfig;
use crate::token::{Credential, SecretString, TokenManager, TokenManagerConfig};

/// Cookie jar configuration (SPEC_FULL §4.1 — spec §6 names the group,
/// SPEC_FULL wires it to `reqwest`'s existing cookie-store support).
#[derive(Clone, Default)]
pub struct CookieConfig {
    pub enable_jar: bool,
    pub custom_cookies: Vec<(String, Url)>,
}

#[derive(Debug)]
pub struct Unconfigured;
#[derive(Debug)]
pub struct NoAuth;
#[derive(Debug)]
pub struct Ready;

/// Builds a [`Client`] through the states spec §6 implies: pick a
/// backend adapter, configure the ambient groups, then supply
/// credentials to unlock `build()`.
pub struct ClientBuilder<State = Unconfigured> {
    adapter: Option<Arc<dyn Adapter>>,
    credential: Option<Credential>,
    gate_config: GateConfig,
    retry: RetryPolicyConfig,
    redirect_config: RedirectConfig,
    token_config: TokenManagerConfig,
    backoff_config: BackoffConfig,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn MetricsSink>,
    cookies: CookieConfig,
    _state: PhantomData<State>,
}

impl Default for ClientBuilder<Unconfigured> {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder<Unconfigured> {
    pub fn new() -> Self {
        Self {
            adapter: None,
            credential: None,
            gate_config: GateConfig::default(),
            retry: RetryPolicyConfig::default(),
            redirect_config: RedirectConfig::default(),
            token_config: TokenManagerConfig::default(),
            backoff_config: BackoffConfig::default(),
            logger: Arc::new(NoopLogger),
            metrics: Arc::new(NoopMetricsSink),
            cookies: CookieConfig::default(),
            _state: PhantomData,
        }
    }

    /// Jamf Pro backend at `{instance_name}.jamfcloud.com`.
    pub fn with_jamf_adapter(self, instance_name: impl AsRef<str>) -> ClientBuilder<NoAuth> {
        self.with_adapter(Arc::new(JamfAdapter::new(instance_name)))
    }

    /// Microsoft Graph backend scoped to `tenant`.
    pub fn with_msgraph_adapter(self, tenant: impl Into<String>) -> ClientBuilder<NoAuth> {
        self.with_adapter(Arc::new(MsGraphAdapter::new(tenant)))
    }

    /// Escape hatch for a custom [`Adapter`] implementation.
    pub fn with_adapter(self, adapter: Arc<dyn Adapter>) -> ClientBuilder<NoAuth> {
        ClientBuilder {
            adapter: Some(adapter),
            credential: self.credential,
            gate_config: self.gate_config,
            retry: self.retry,
            redirect_config: self.redirect_config,
            token_config: self.token_config,
            backoff_config: self.backoff_config,
            logger: self.logger,
            metrics: self.metrics,
            cookies: self.cookies,
            _state: PhantomData,
        }
    }
}

impl ClientBuilder<NoAuth> {
    /// `concurrency.max_concurrent_requests` (spec §6: default 10,
    /// bounded 1-10). Sets both the gate's initial capacity and, since
    /// this core treats the configured value as the operating ceiling,
    /// `c_max`.
    pub fn with_concurrency(mut self, max_concurrent_requests: usize) -> Self {
        let clamped = max_concurrent_requests.clamp(1, 10);
        self.gate_config = GateConfig {
            c_min: 1,
            c_max: clamped,
            initial_capacity: clamped,
        };
        self
    }

    /// `retry.{max_attempts, enable_dynamic_rate_limiting}` (spec §6:
    /// defaults 5, true).
    pub fn with_retry(mut self, max_attempts: u32, enable_dynamic_rate_limiting: bool) -> Self {
        self.retry = RetryPolicyConfig { max_attempts, enable_dynamic_rate_limiting };
        self
    }

    /// `redirect.{follow, max_redirects, sensitive_headers}` (spec §6:
    /// defaults true, 10, [Authorization, Cookie]).
    pub fn with_redirect_policy(mut self, follow: bool, max_redirects: usize, sensitive_headers: Vec<String>) -> Self {
        self.redirect_config = RedirectConfig { follow, max_redirects, sensitive_headers };
        self
    }

    /// `token.refresh_buffer` (spec §6: default 5 min; must be less than
    /// the acquired token's lifetime or `ensure_valid` returns a
    /// `ConfigurationError`).
    pub fn with_refresh_buffer(mut self, refresh_buffer: Duration) -> Self {
        self.token_config.refresh_buffer = refresh_buffer;
        self
    }

    pub fn with_backoff(mut self, backoff_config: BackoffConfig) -> Self {
        self.backoff_config = backoff_config;
        self
    }

    /// `logging` (spec §6). Sensitive-value redaction is applied by
    /// wrapping with [`crate::logger::RedactingLogger`] before calling
    /// this, not by a flag here.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// `cookies.enable_jar` (spec §6): turns on `reqwest`'s cookie
    /// store.
    pub fn with_cookie_jar(mut self, enable: bool) -> Self {
        self.cookies.enable_jar = enable;
        self
    }

    /// `cookies.custom_cookies` (spec §6): a raw `Set-Cookie`-shaped
    /// string seeded into the jar for `url` at build time.
    pub fn with_custom_cookie(mut self, cookie: impl Into<String>, url: Url) -> Self {
        self.cookies.custom_cookies.push((cookie.into(), url));
        self
    }

    /// `auth: {kind: basic, credentials}` (spec §6).
    pub fn with_basic_credential(self, username: impl Into<String>, password: impl Into<String>) -> ClientBuilder<Ready> {
        self.with_credential(Credential::Basic {
            username: username.into(),
            password: SecretString::new(password.into()),
        })
    }

    /// `auth: {kind: oauth2, credentials}` (spec §6).
    pub fn with_oauth2_credential(
        self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: Option<String>,
    ) -> ClientBuilder<Ready> {
        self.with_credential(Credential::OAuth2ClientCredentials {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            scope,
        })
    }

    /// `auth: {kind: oauth2-cert, credentials}` (spec §6). Accepted at
    /// the configuration surface; acquisition always fails with
    /// `ConfigurationError` (see [`crate::token::Credential::OAuth2Cert`]).
    pub fn with_oauth2_cert_credential(self, client_id: impl Into<String>, certificate_pem: impl Into<String>) -> ClientBuilder<Ready> {
        self.with_credential(Credential::OAuth2Cert {
            client_id: client_id.into(),
            certificate_pem: SecretString::new(certificate_pem.into()),
        })
    }

    fn with_credential(self, credential: Credential) -> ClientBuilder<Ready> {
        ClientBuilder {
            adapter: self.adapter,
            credential: Some(credential),
            gate_config: self.gate_config,
            retry: self.retry,
            redirect_config: self.redirect_config,
            token_config: self.token_config,
            backoff_config: self.backoff_config,
            logger: self.logger,
            metrics: self.metrics,
            cookies: self.cookies,
            _state: PhantomData,
        }
    }
}

impl ClientBuilder<Ready> {
    pub fn build(self) -> Result<Client> {
        let adapter = self.adapter.expect("ClientBuilder<Ready> always carries an adapter");
        let credential = self.credential.expect("ClientBuilder<Ready> always carries a credential");

        let mut http_builder = reqwest::Client::builder();
        if self.cookies.enable_jar || !self.cookies.custom_cookies.is_empty() {
            let jar = reqwest::cookie::Jar::default();
            for (cookie, url) in &self.cookies.custom_cookies {
                jar.add_cookie_str(cookie, url);
            }
            http_builder = http_builder.cookie_provider(Arc::new(jar)).cookie_store(true);
        }
        let http = http_builder
            .build()
            .map_err(|e| Error::ConfigurationError(format!("failed to build HTTP client: {e}")))?;

        let token_manager = TokenManager::new(adapter.clone(), credential, http.clone(), self.token_config, self.logger.clone());
        let gate = Gate::new(self.gate_config);

        Ok(Client {
            adapter,
            token_manager,
            gate,
            redirect_config: self.redirect_config,
            retry: self.retry,
            backoff_config: self.backoff_config,
            http,
            logger: self.logger,
            metrics: self.metrics,
        })
    }
}

/// A fully configured request-execution core for one backend + one
/// credential. Cheap to share across tasks behind an `Arc`; every
/// suspension point inside `execute`/`execute_multipart` is already
/// internally synchronized (spec §5).
pub struct Client {
    adapter: Arc<dyn Adapter>,
    token_manager: TokenManager,
    gate: Gate,
    redirect_config: RedirectConfig,
    retry: RetryPolicyConfig,
    backoff_config: BackoffConfig,
    http: reqwest::Client,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn MetricsSink>,
}

impl Client {
    pub fn builder() -> ClientBuilder<Unconfigured> {
        ClientBuilder::new()
    }

    fn executor(&self) -> Executor<'_> {
        Executor {
            adapter: self.adapter.as_ref(),
            token_manager: &self.token_manager,
            gate: &self.gate,
            redirect_config: &self.redirect_config,
            retry: &self.retry,
            backoff_config: &self.backoff_config,
            http: &self.http,
            logger: self.logger.as_ref(),
            metrics: self.metrics.as_ref(),
        }
    }

    /// `execute(method, endpoint, body, out, ctx)` (spec §6).
    pub async fn execute<T: DeserializeOwned>(&self, method: Method, endpoint: &str, body: Body, ctx: &CallContext) -> Result<Decoded<T>> {
        self.executor().execute(method, endpoint, body, ctx).await
    }

    /// `executeMultipart(endpoint, fields, files, out, ctx)` (spec §6).
    pub async fn execute_multipart<T: DeserializeOwned>(&self, endpoint: &str, body: MultipartBody, ctx: &CallContext) -> Result<Decoded<T>> {
        self.executor().execute_multipart(endpoint, body, ctx).await
    }

    /// Current admission capacity, for diagnostics/tests.
    pub async fn gate_capacity(&self) -> usize {
        self.gate.capacity().await
    }

    pub fn adapter_name(&self) -> &'static str {
        self.adapter.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_adapter_then_credential_at_compile_time() {
        let builder: ClientBuilder<Ready> = ClientBuilder::new()
            .with_jamf_adapter("mycompany")
            .with_concurrency(4)
            .with_basic_credential("svc", "hunter2");
        let client = builder.build().unwrap();
        assert_eq!(client.adapter_name(), "jamf");
    }

    #[tokio::test]
    async fn gate_capacity_reflects_concurrency_config() {
        let client = ClientBuilder::new()
            .with_msgraph_adapter("tenant")
            .with_concurrency(3)
            .with_oauth2_credential("id", "secret", None)
            .build()
            .unwrap();
        assert_eq!(client.gate_capacity().await, 3);
    }

    #[test]
    fn custom_cookie_seeds_the_jar_without_error() {
        let client = ClientBuilder::new()
            .with_msgraph_adapter("tenant")
            .with_custom_cookie("session=abc", Url::parse("https://graph.microsoft.com/").unwrap())
            .with_oauth2_credential("id", "secret", None)
            .build();
        assert!(client.is_ok());
    }
}
