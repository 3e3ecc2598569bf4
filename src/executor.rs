//! The Request Executor (spec §4.8): the orchestrator that drives one
//! logical call through token acquisition, gate admission, transport,
//! redirect-following, and retry/backoff until it reaches a terminal
//! state.
//!
//! State machine (spec §4.8, implemented as the `loop` in [`Executor::run`]
//! rather than an explicit enum — the states map onto loop iterations and
//! early returns, which is the idiom the teacher's own retry loop in
//! `client.rs` uses for a simpler version of the same thing):
//!
//! `Start -> Ready -> Admitting -> InFlight -> Classified ->
//! {Decoding | Waiting | Failed} -> Done`

use std::time::{Duration, Instant, SystemTime};

use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use crate::adapter::{Adapter, Body, PreparedBody};
use crate::backoff::{self, BackoffConfig};
use crate::context::CallContext;
use crate::decode::{self, Decoded, Sink};
use crate::error::{ApiError, Error, Result};
use crate::gate::Gate;
use crate::logger::Logger;
use crate::metrics::MetricsSink;
use crate::multipart::MultipartBody;
use crate::redirect::{self, RedirectConfig, RedirectState};
use crate::status::{self, Category};
use crate::token::TokenManager;

/// Defensive upper bound on one transport round trip, independent of
/// whatever deadline the caller supplied via [`CallContext`]. Not named
/// by spec.md; without it an unbounded `ctx` plus a hung socket would
/// never resolve.
const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(120);

/// Added on top of an `X-RateLimit-Reset`-derived wait to absorb clock
/// skew between this process and the backend (spec §4.2 precedence
/// chain; the skew buffer itself is this crate's choice).
const RATE_LIMIT_SKEW_BUFFER: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub enable_dynamic_rate_limiting: bool,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            enable_dynamic_rate_limiting: true,
        }
    }
}

/// Borrows every component a `Client` owns for the duration of one
/// `execute`/`execute_multipart` call. Kept separate from `Client` itself
/// so the state machine reads as one self-contained module (spec §4.8 is
/// the largest single component in the design).
pub struct Executor<'a> {
    pub adapter: &'a dyn Adapter,
    pub token_manager: &'a TokenManager,
    pub gate: &'a Gate,
    pub redirect_config: &'a RedirectConfig,
    pub retry: &'a RetryPolicyConfig,
    pub backoff_config: &'a BackoffConfig,
    pub http: &'a reqwest::Client,
    pub logger: &'a dyn Logger,
    pub metrics: &'a dyn MetricsSink,
}

struct RawAttempt {
    status: u16,
    url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
    ttfb: Duration,
    elapsed: Duration,
}

/// What the Executor sends on each attempt. `Prepared` bytes are
/// marshaled once and reused verbatim on retry (spec §4.8: "the Executor
/// captures the serialized body on the first attempt and reuses it").
/// `Multipart` is re-marshaled every attempt since file sources must be
/// re-materialized (spec §4.8, §4.5 of SPEC_FULL).
enum Payload {
    Prepared(PreparedBody),
    Multipart(MultipartBody),
}

#[derive(Default)]
struct CallMetrics {
    attempts: u32,
    /// Retry budget consumed so far (spec §4.8: "independent of redirect
    /// hops"). Only the 429 and transient/retryable waits, and a locally
    /// recoverable transport error, advance this; following a redirect
    /// does not, no matter how many hops it takes.
    retries: u32,
    token_wait: Duration,
    gate_wait: Duration,
    ttfb: Duration,
    response_time: Duration,
    throughput_bytes_per_sec: f64,
    final_status: Option<u16>,
}

impl<'a> Executor<'a> {
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Body,
        ctx: &CallContext,
    ) -> Result<Decoded<T>> {
        let prepared = self.adapter.marshal_body(endpoint, &body)?;
        self.run(method, endpoint, Payload::Prepared(prepared), ctx).await
    }

    pub async fn execute_multipart<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: MultipartBody,
        ctx: &CallContext,
    ) -> Result<Decoded<T>> {
        self.run(Method::POST, endpoint, Payload::Multipart(body), ctx).await
    }

    async fn run<T: DeserializeOwned>(
        &self,
        mut method: Method,
        endpoint: &str,
        payload: Payload,
        ctx: &CallContext,
    ) -> Result<Decoded<T>> {
        let mut metrics = CallMetrics::default();

        let token_started = Instant::now();
        let token_header = match self.token_manager.ensure_valid().await {
            Ok(header) => header,
            Err(e) => {
                self.logger.error(method.as_str(), endpoint, None, &e.to_string(), "");
                return Err(e);
            }
        };
        metrics.token_wait = token_started.elapsed();

        let policy = self.adapter.endpoint_policy(endpoint);
        let mut current_url = self.adapter.resource_url(endpoint)?;
        let mut redirect_state = RedirectState::default();
        let mut strip_auth = false;
        let mut body_cleared = false;

        loop {
            if ctx.is_cancelled() {
                self.finish_metrics(&metrics);
                return Err(Error::Cancelled);
            }

            let gate_started = Instant::now();
            let permit = self.gate.acquire(ctx).await?;
            metrics.gate_wait += gate_started.elapsed();

            self.logger.request_start(method.as_str(), current_url.as_str(), metrics.attempts);

            let attempt = self
                .send_one(&method, &current_url, &policy.accept, &token_header, strip_auth, &payload, endpoint, body_cleared, ctx)
                .await;
            metrics.attempts += 1;

            let outcome_headers = attempt.as_ref().map(|a| a.headers.clone()).unwrap_or_default();
            let outcome_status = attempt.as_ref().ok().map(|a| a.status);
            let outcome_elapsed = attempt.as_ref().map(|a| a.elapsed).unwrap_or_else(|_| gate_started.elapsed());
            // Release before feeding the adaptive policy: resize must
            // never happen while this attempt's permit is still held
            // (spec §5).
            self.gate.release(permit).await;
            self.gate.record_and_adapt(&outcome_headers, outcome_status, outcome_elapsed).await;

            let raw = match attempt {
                Ok(raw) => raw,
                Err(e) => {
                    if e.is_locally_recoverable() && metrics.retries < self.retry.max_attempts {
                        let wait = backoff::backoff(self.backoff_config, metrics.retries);
                        metrics.retries += 1;
                        self.logger.retry(method.as_str(), current_url.as_str(), metrics.retries, wait, "transport error");
                        self.sleep_respecting_ctx(wait, ctx).await?;
                        continue;
                    }
                    self.logger.error(method.as_str(), current_url.as_str(), None, &e.to_string(), "");
                    self.finish_metrics(&metrics);
                    return Err(e);
                }
            };

            metrics.ttfb = raw.ttfb;
            metrics.response_time = raw.elapsed;
            metrics.final_status = Some(raw.status);
            metrics.throughput_bytes_per_sec = if raw.elapsed.as_secs_f64() > 0.0 {
                raw.body.len() as f64 / raw.elapsed.as_secs_f64()
            } else {
                0.0
            };
            self.logger.request_end(method.as_str(), current_url.as_str(), raw.status, raw.elapsed.as_millis());

            match status::classify(raw.status) {
                Category::Success => {
                    self.finish_metrics(&metrics);
                    let method_str = method.as_str().to_string();
                    let url_str = raw.url.as_str().to_string();
                    return decode::decode(Sink::Negotiated, &method_str, raw.status, &raw.headers, &raw.body)
                        .map_err(|e| attach_context(e, &method_str, &url_str));
                }
                Category::RedirectPermanent | Category::RedirectTemporary => {
                    if !self.redirect_config.follow {
                        self.finish_metrics(&metrics);
                        let method_str = method.as_str().to_string();
                        let url_str = raw.url.as_str().to_string();
                        return decode::decode(Sink::Negotiated, &method_str, raw.status, &raw.headers, &raw.body)
                            .map_err(|e| attach_context(e, &method_str, &url_str));
                    }

                    let location = raw.headers.get(LOCATION).and_then(|v| v.to_str().ok()).map(str::to_string);
                    let Some(location) = location else {
                        self.finish_metrics(&metrics);
                        return Err(Error::NonRetryableApiError(ApiError::new(
                            raw.status,
                            method.as_str(),
                            raw.url.as_str(),
                            "redirect response missing Location header",
                            String::from_utf8_lossy(&raw.body),
                        )));
                    };

                    let outcome = redirect::follow(self.redirect_config, &mut redirect_state, &current_url, raw.status, &location)?;
                    if outcome.rewrite_to_get {
                        method = Method::GET;
                        body_cleared = true;
                    }
                    if outcome.strip_headers.iter().any(|h| h == AUTHORIZATION) {
                        strip_auth = true;
                    }
                    current_url = outcome.next_url;
                    continue;
                }
                Category::RateLimited => {
                    if metrics.retries < self.retry.max_attempts {
                        let wait = self.compute_retry_wait(&raw.headers, metrics.retries);
                        metrics.retries += 1;
                        self.logger.rate_limit_wait(current_url.as_str(), wait);
                        self.sleep_respecting_ctx(wait, ctx).await?;
                        continue;
                    }
                    self.finish_metrics(&metrics);
                    return Err(Error::RateLimitExhausted {
                        attempts: metrics.retries,
                        source: self.api_error_from(&method, &raw),
                    });
                }
                Category::Transient | Category::Retryable => {
                    if metrics.retries < self.retry.max_attempts {
                        let wait = self.compute_retry_wait(&raw.headers, metrics.retries);
                        metrics.retries += 1;
                        self.logger.retry(method.as_str(), current_url.as_str(), metrics.retries, wait, "transient status");
                        self.sleep_respecting_ctx(wait, ctx).await?;
                        continue;
                    }
                    self.finish_metrics(&metrics);
                    return Err(Error::TransientExhausted {
                        attempts: metrics.retries,
                        source: self.api_error_from(&method, &raw),
                    });
                }
                Category::NonRetryableClient | Category::Other => {
                    self.finish_metrics(&metrics);
                    return Err(Error::NonRetryableApiError(self.api_error_from(&method, &raw)));
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_one(
        &self,
        method: &Method,
        url: &Url,
        accept: &str,
        token_header: &str,
        strip_auth: bool,
        payload: &Payload,
        endpoint: &str,
        body_cleared: bool,
        ctx: &CallContext,
    ) -> Result<RawAttempt> {
        let mut builder = self.http.request(method.clone(), url.clone()).header(ACCEPT, accept);
        if !strip_auth {
            builder = builder.header(AUTHORIZATION, token_header);
        }

        builder = if body_cleared {
            builder
        } else {
            match payload {
                Payload::Prepared(prepared) => {
                    if prepared.bytes.is_empty() {
                        builder
                    } else {
                        if let Some(ct) = &prepared.content_type {
                            builder = builder.header(CONTENT_TYPE, ct);
                        }
                        builder.body(prepared.bytes.clone())
                    }
                }
                Payload::Multipart(body) => {
                    let form = self.adapter.marshal_multipart(endpoint, body).await?;
                    builder.multipart(form)
                }
            }
        };

        let started = Instant::now();
        let response = ctx.race_with_deadline(builder.send(), TRANSPORT_TIMEOUT).await??;
        let ttfb = started.elapsed();
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = ctx.race_with_deadline(response.bytes(), TRANSPORT_TIMEOUT).await??.to_vec();
        let elapsed = started.elapsed();

        Ok(RawAttempt {
            status,
            url: url.clone(),
            headers,
            body,
            ttfb,
            elapsed,
        })
    }

    fn compute_retry_wait(&self, headers: &HeaderMap, retry_number: u32) -> Duration {
        let backoff_wait = backoff::backoff(self.backoff_config, retry_number);
        if !self.retry.enable_dynamic_rate_limiting {
            return backoff_wait;
        }
        let rate_limit_wait = backoff::rate_limit_wait(headers, SystemTime::now(), RATE_LIMIT_SKEW_BUFFER);
        backoff_wait.max(rate_limit_wait)
    }

    async fn sleep_respecting_ctx(&self, wait: Duration, ctx: &CallContext) -> Result<()> {
        ctx.race_with_deadline(tokio::time::sleep(wait), wait + Duration::from_secs(1)).await
    }

    fn api_error_from(&self, method: &Method, raw: &RawAttempt) -> ApiError {
        let message = decode::extract_error_message(&raw.headers, &raw.body);
        ApiError::new(raw.status, method.as_str(), raw.url.as_str(), message, String::from_utf8_lossy(&raw.body))
    }

    fn finish_metrics(&self, metrics: &CallMetrics) {
        self.metrics.increment_counter("request.attempts_total", metrics.attempts as u64);
        self.metrics.record_histogram("request.token_wait_ms", metrics.token_wait.as_millis() as f64);
        self.metrics.record_histogram("request.gate_wait_ms", metrics.gate_wait.as_millis() as f64);
        self.metrics.record_histogram("request.ttfb_ms", metrics.ttfb.as_millis() as f64);
        self.metrics.record_histogram("request.response_time_ms", metrics.response_time.as_millis() as f64);
        self.metrics.record_histogram("request.throughput_bytes_per_sec", metrics.throughput_bytes_per_sec);
        if let Some(status) = metrics.final_status {
            self.metrics.record_gauge("request.final_status", status as f64);
        }
    }
}

/// Fills in the method/url context the [`crate::decode`] module leaves
/// blank, since it operates on bare bytes and has no notion of the call
/// that produced them.
fn attach_context(err: Error, method: &str, url: &str) -> Error {
    match err {
        Error::DecodeError { message, .. } => Error::DecodeError {
            method: method.to_string(),
            url: url.to_string(),
            message,
        },
        Error::UnsupportedResponseMedia { content_type, .. } => Error::UnsupportedResponseMedia {
            content_type,
            method: method.to_string(),
            url: url.to_string(),
        },
        other => other,
    }
}
