//! Single-flight credential acquisition and refresh (spec §4.5).
//!
//! A [`TokenManager`] owns exactly one [`Credential`] for the lifetime of
//! a [`crate::client::Client`] and hands out a valid bearer token to every
//! admitted request. "Valid" means non-empty and with at least
//! `refresh_buffer` left before expiry. Concurrent callers discovering an
//! invalid token coalesce onto one acquisition via `refresh_lock`; the
//! fast path under `state`'s read guard never blocks on that lock.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::adapter::Adapter;
use crate::error::{Error, Result};
use crate::logger::Logger;

/// Credential material bound to one [`TokenManager`]. Immutable after
/// `Client` build (spec Data Model).
#[derive(Clone, ZeroizeOnDrop)]
pub enum Credential {
    Basic {
        username: String,
        #[zeroize(skip)]
        password: SecretString,
    },
    OAuth2ClientCredentials {
        client_id: String,
        #[zeroize(skip)]
        client_secret: SecretString,
        scope: Option<String>,
    },
    /// Accepted at the configuration surface (spec §6 names `oauth2-cert`
    /// as a kind) but acquisition is not implemented: signing the client
    /// assertion JWT this flow requires is outside the core's transport
    /// concerns. Using it surfaces `ConfigurationError` ("unsupported
    /// auth method"), matching the taxonomy in spec §7.
    OAuth2Cert {
        client_id: String,
        #[zeroize(skip)]
        certificate_pem: SecretString,
    },
}

/// A `String` that zeroes its buffer on drop, wrapping secret material
/// (passwords, client secrets, the acquired token itself).
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Zeroize for SecretString {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// A short-lived authentication artifact (spec Data Model). Never shared
/// across `Client`s; replaced wholesale on refresh.
#[derive(Clone)]
pub struct Token {
    value: SecretString,
    expiry: Instant,
}

impl Token {
    fn remaining(&self) -> Duration {
        self.expiry.saturating_duration_since(Instant::now())
    }

    fn is_valid(&self, refresh_buffer: Duration) -> bool {
        !self.value.expose().is_empty() && self.remaining() >= refresh_buffer
    }

    pub fn bearer_header_value(&self) -> String {
        format!("Bearer {}", self.value.expose())
    }
}

#[derive(Debug, Clone)]
pub struct TokenManagerConfig {
    pub refresh_buffer: Duration,
    pub max_consecutive_refresh_attempts: u32,
    pub initial_refresh_delay: Duration,
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self {
            refresh_buffer: Duration::from_secs(5 * 60),
            max_consecutive_refresh_attempts: 10,
            initial_refresh_delay: Duration::from_millis(100),
        }
    }
}

pub struct TokenManager {
    adapter: Arc<dyn Adapter>,
    credential: Credential,
    http: reqwest::Client,
    config: TokenManagerConfig,
    logger: Arc<dyn Logger>,
    state: RwLock<Option<Token>>,
    refresh_lock: Mutex<()>,
}

#[derive(Deserialize)]
struct BearerTokenResponse {
    token: String,
    /// Seconds-from-now expiry, matching the Jamf/basic-to-bearer
    /// convention of an absolute epoch or relative seconds depending on
    /// backend; this crate treats it as relative seconds for both basic
    /// and refresh flows and as `expires_in` for OAuth2.
    expires: u64,
}

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: u64,
}

impl TokenManager {
    pub fn new(
        adapter: Arc<dyn Adapter>,
        credential: Credential,
        http: reqwest::Client,
        config: TokenManagerConfig,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            adapter,
            credential,
            http,
            config,
            logger,
            state: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns a header-ready bearer value for a currently-valid token,
    /// acquiring or refreshing one if necessary. Single-flight: of any
    /// number of concurrent callers observing an invalid token, exactly
    /// one performs the acquisition.
    pub async fn ensure_valid(&self) -> Result<String> {
        if let Some(token) = self.state.read().await.as_ref() {
            if token.is_valid(self.config.refresh_buffer) {
                return Ok(token.bearer_header_value());
            }
        }

        let _guard = self.refresh_lock.lock().await;
        // Re-check: another caller may have already refreshed while we
        // waited for `refresh_lock`.
        if let Some(token) = self.state.read().await.as_ref() {
            if token.is_valid(self.config.refresh_buffer) {
                return Ok(token.bearer_header_value());
            }
        }

        let previous = self.state.read().await.clone();
        let acquired = self.acquire_with_backoff(previous.as_ref()).await?;

        if acquired.remaining() < self.config.refresh_buffer {
            return Err(Error::ConfigurationError(format!(
                "token lifetime ({:?}) is shorter than the configured refresh buffer ({:?})",
                acquired.remaining(),
                self.config.refresh_buffer
            )));
        }

        let mut state = self.state.write().await;
        // Invariant: expiry is monotonic non-decreasing across successful
        // refreshes; never downgrade an existing token.
        let stored = match state.take() {
            Some(existing) if existing.expiry >= acquired.expiry => existing,
            _ => acquired,
        };
        let header = stored.bearer_header_value();
        *state = Some(stored);
        Ok(header)
    }

    async fn acquire_with_backoff(&self, previous: Option<&Token>) -> Result<Token> {
        let mut delay = self.config.initial_refresh_delay;
        let mut last_err = None;

        for attempt in 0..self.config.max_consecutive_refresh_attempts {
            match self.acquire_once(previous).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    self.logger.retry(
                        "POST",
                        self.adapter.name(),
                        attempt,
                        delay,
                        "token acquisition failed",
                    );
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }

        Err(Error::TokenError(format!(
            "exhausted {} acquisition attempts: {}",
            self.config.max_consecutive_refresh_attempts,
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no attempts made".into())
        )))
    }

    async fn acquire_once(&self, previous: Option<&Token>) -> Result<Token> {
        match (&self.credential, previous) {
            (Credential::Basic { .. }, Some(prev)) => match self.refresh_bearer(prev).await {
                Ok(token) => Ok(token),
                Err(_) => self.acquire_basic().await,
            },
            (Credential::Basic { .. }, None) => self.acquire_basic().await,
            (Credential::OAuth2ClientCredentials { .. }, _) => self.acquire_oauth2().await,
            (Credential::OAuth2Cert { .. }, _) => Err(Error::ConfigurationError(
                "unsupported auth method: oauth2-cert acquisition requires an external JWT signer".into(),
            )),
        }
    }

    async fn acquire_basic(&self) -> Result<Token> {
        let (username, password) = match &self.credential {
            Credential::Basic { username, password } => (username, password),
            _ => return Err(Error::ConfigurationError("basic acquisition requires a Basic credential".into())),
        };

        let url = self.adapter.auth_url(self.adapter.bearer_endpoint())?;
        let response = self
            .http
            .post(url)
            .basic_auth(username, Some(password.expose()))
            .send()
            .await?;

        self.parse_bearer_response(response).await
    }

    async fn refresh_bearer(&self, previous: &Token) -> Result<Token> {
        let url = self.adapter.auth_url(self.adapter.refresh_endpoint())?;
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, previous.bearer_header_value())
            .send()
            .await?;

        self.parse_bearer_response(response).await
    }

    async fn acquire_oauth2(&self) -> Result<Token> {
        let (client_id, client_secret, scope) = match &self.credential {
            Credential::OAuth2ClientCredentials { client_id, client_secret, scope } => {
                (client_id, client_secret, scope)
            }
            _ => {
                return Err(Error::ConfigurationError(
                    "oauth2 acquisition requires an OAuth2ClientCredentials credential".into(),
                ))
            }
        };

        let mut form = vec![
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.expose()),
            ("grant_type", "client_credentials"),
        ];
        if let Some(scope) = scope {
            form.push(("scope", scope.as_str()));
        }

        let url = self.adapter.auth_url(self.adapter.oauth_endpoint())?;
        let response = self.http.post(url).form(&form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::TokenError(format!(
                "OAuth2 token endpoint returned {}: {}",
                status.as_u16(),
                crate::utils::security::create_safe_error_message(&body, "oauth2 token error")
            )));
        }

        let parsed: OAuthTokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::TokenError(format!("malformed OAuth2 token response: {e}")))?;

        Ok(Token {
            value: SecretString::new(parsed.access_token),
            expiry: Instant::now() + Duration::from_secs(parsed.expires_in),
        })
    }

    async fn parse_bearer_response(&self, response: reqwest::Response) -> Result<Token> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::TokenError(format!(
                "bearer endpoint returned {}: {}",
                status.as_u16(),
                crate::utils::security::create_safe_error_message(&body, "token error")
            )));
        }

        let parsed: BearerTokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::TokenError(format!("malformed token response: {e}")))?;

        Ok(Token {
            value: SecretString::new(parsed.token),
            expiry: Instant::now() + Duration::from_secs(parsed.expires),
        })
    }
}
