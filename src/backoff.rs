//! Exponential backoff with jitter, and extraction of `Retry-After` /
//! `X-RateLimit-*` headers into a concrete wait duration.

use reqwest::header::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay to jitter by, e.g. 0.5 means the
    /// result is uniformly distributed in `delay * (1 - 0.5) ..= delay * (1 + 0.5)`.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: 0.5,
        }
    }
}

/// `wait = min(max_delay, base_delay * 2^attempt) * (1 + U(-jitter, +jitter))`.
/// `attempt` is zero-indexed.
pub fn backoff(config: &BackoffConfig, attempt: u32) -> Duration {
    backoff_with_rng(config, attempt, &mut fastrand::Rng::new())
}

pub fn backoff_with_rng(config: &BackoffConfig, attempt: u32, rng: &mut fastrand::Rng) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let unclamped = config.base_delay.saturating_mul(exp as u32);
    let clamped = unclamped.min(config.max_delay);

    let jitter_factor = 1.0 + (rng.f64() * 2.0 - 1.0) * config.jitter;
    let jittered_nanos = (clamped.as_nanos() as f64 * jitter_factor.max(0.0)).round() as u64;
    Duration::from_nanos(jittered_nanos)
}

/// Derives the rate-limit wait from response headers per the precedence
/// in spec §4.2. Malformed headers are swallowed (the caller logs and
/// falls back to zero); the outer retry policy still applies on top of
/// whatever is returned here.
pub fn rate_limit_wait(headers: &HeaderMap, now: SystemTime, skew_buffer: Duration) -> Duration {
    if let Some(wait) = retry_after_wait(headers, now) {
        return wait;
    }
    if let Some(wait) = rate_limit_reset_wait(headers, now, skew_buffer) {
        return wait;
    }
    Duration::ZERO
}

fn retry_after_wait(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?;
    let s = value.to_str().ok()?.trim();

    if let Ok(seconds) = s.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = httpdate::parse_http_date(s) {
        return Some(date.duration_since(now).unwrap_or(Duration::ZERO));
    }

    None
}

fn rate_limit_reset_wait(headers: &HeaderMap, now: SystemTime, skew_buffer: Duration) -> Option<Duration> {
    let remaining = headers
        .get("X-RateLimit-Remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())?;
    if remaining != 0 {
        return None;
    }

    let reset_epoch = headers
        .get("X-RateLimit-Reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())?;

    let reset_time = UNIX_EPOCH + Duration::from_secs(reset_epoch);
    let base = reset_time.duration_since(now).unwrap_or(Duration::ZERO);
    Some(base + skew_buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, RETRY_AFTER};

    #[test]
    fn backoff_stays_within_jitter_bounds() {
        let config = BackoffConfig::default();
        let mut rng = fastrand::Rng::new();
        for attempt in 0..8 {
            for _ in 0..200 {
                let wait = backoff_with_rng(&config, attempt, &mut rng);
                let nominal = config
                    .base_delay
                    .saturating_mul(2u64.saturating_pow(attempt) as u32)
                    .min(config.max_delay);
                let lower = nominal.mul_f64(1.0 - config.jitter);
                let upper = nominal.mul_f64(1.0 + config.jitter);
                assert!(
                    wait >= lower && wait <= upper,
                    "attempt {attempt}: {wait:?} not in [{lower:?}, {upper:?}]"
                );
            }
        }
    }

    #[test]
    fn backoff_never_exceeds_max_delay_plus_jitter() {
        let config = BackoffConfig::default();
        let mut rng = fastrand::Rng::new();
        let cap = config.max_delay.mul_f64(1.0 + config.jitter);
        for _ in 0..200 {
            let wait = backoff_with_rng(&config, 20, &mut rng);
            assert!(wait <= cap);
        }
    }

    #[test]
    fn retry_after_seconds_round_trips() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("5"));
        let wait = rate_limit_wait(&headers, SystemTime::now(), Duration::from_secs(5));
        assert_eq!(wait, Duration::from_secs(5));
    }

    #[test]
    fn retry_after_zero_is_immediate() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("0"));
        let wait = rate_limit_wait(&headers, SystemTime::now(), Duration::from_secs(5));
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn retry_after_http_date_round_trips_within_a_second() {
        let now = SystemTime::now();
        let future = now + Duration::from_secs(10);
        let formatted = httpdate::fmt_http_date(future);
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(&formatted).unwrap());
        let wait = rate_limit_wait(&headers, now, Duration::from_secs(5));
        let diff = wait.as_secs_f64() - 10.0;
        assert!(diff.abs() <= 1.0, "expected ~10s, got {wait:?}");
    }

    #[test]
    fn retry_after_past_date_clamps_to_zero() {
        let now = SystemTime::now();
        let past = now - Duration::from_secs(30);
        let formatted = httpdate::fmt_http_date(past);
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(&formatted).unwrap());
        let wait = rate_limit_wait(&headers, now, Duration::from_secs(5));
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn rate_limit_remaining_zero_uses_reset_plus_skew() {
        let now = SystemTime::now();
        let reset = now + Duration::from_secs(20);
        let reset_epoch = reset.duration_since(UNIX_EPOCH).unwrap().as_secs();
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
        headers.insert(
            "X-RateLimit-Reset",
            HeaderValue::from_str(&reset_epoch.to_string()).unwrap(),
        );
        let wait = rate_limit_wait(&headers, now, Duration::from_secs(5));
        assert!(wait >= Duration::from_secs(24) && wait <= Duration::from_secs(26));
    }

    #[test]
    fn no_relevant_headers_yields_zero() {
        let headers = HeaderMap::new();
        let wait = rate_limit_wait(&headers, SystemTime::now(), Duration::from_secs(5));
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn malformed_retry_after_falls_back_to_zero() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("not-a-number-or-date"));
        let wait = rate_limit_wait(&headers, SystemTime::now(), Duration::from_secs(5));
        assert_eq!(wait, Duration::ZERO);
    }
}
