//! Bounded, dynamically-resizable admission control.
//!
//! A [`Gate`] is a counting semaphore whose capacity can be resized live
//! while permits are held. The resize never revokes an outstanding
//! permit (spec §4.6): shrinking is implemented by "debiting" future
//! acquisitions/releases until enough capacity has cycled through.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::context::CallContext;
use crate::error::{Error, Result};

/// The internal acquisition timeout, independent of the caller's
/// deadline (spec §5: "whichever fires first wins").
const INTERNAL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub c_min: usize,
    pub c_max: usize,
    pub initial_capacity: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            c_min: 1,
            c_max: 10,
            initial_capacity: 10,
        }
    }
}

struct Inner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    active: usize,
    forget_debt: usize,
    c_min: usize,
    c_max: usize,
    held: std::collections::HashMap<Uuid, OwnedSemaphorePermit>,
    window: VecDeque<AttemptOutcome>,
}

#[derive(Clone, Copy)]
struct AttemptOutcome {
    is_error: bool,
    response_time: Duration,
    rate_limited_signal: bool,
}

const WINDOW_SIZE: usize = 50;

/// A unique correlation id for one admitted permit, attached to logs.
pub type PermitId = Uuid;

pub struct Gate {
    inner: Mutex<Inner>,
}

impl Gate {
    pub fn new(config: GateConfig) -> Self {
        let capacity = config.initial_capacity.clamp(config.c_min, config.c_max);
        Self {
            inner: Mutex::new(Inner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                active: 0,
                forget_debt: 0,
                c_min: config.c_min,
                c_max: config.c_max,
                held: std::collections::HashMap::new(),
                window: VecDeque::with_capacity(WINDOW_SIZE),
            }),
        }
    }

    pub async fn capacity(&self) -> usize {
        self.inner.lock().await.capacity
    }

    pub async fn active_permits(&self) -> usize {
        self.inner.lock().await.active
    }

    /// Blocks until a permit is free, `ctx` is cancelled/past its
    /// deadline, or the internal 10s timeout elapses — whichever comes
    /// first.
    pub async fn acquire(&self, ctx: &CallContext) -> Result<PermitId> {
        loop {
            let semaphore = {
                let inner = self.inner.lock().await;
                inner.semaphore.clone()
            };

            let acquire_fut = semaphore.acquire_owned();
            let permit = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(Error::Cancelled),
                res = ctx.race_with_deadline(acquire_fut, INTERNAL_ACQUIRE_TIMEOUT) => res??,
            };

            let mut inner = self.inner.lock().await;
            if inner.forget_debt > 0 {
                permit.forget();
                inner.forget_debt -= 1;
                continue;
            }

            let id = Uuid::new_v4();
            inner.held.insert(id, permit);
            inner.active += 1;
            return Ok(id);
        }
    }

    /// Returns exactly one permit. Releasing an unknown id is a no-op
    /// (the caller should log it; this function cannot log on its own
    /// since it has no logger reference, so callers in [`crate::executor`]
    /// log before calling this).
    pub async fn release(&self, id: PermitId) {
        let mut inner = self.inner.lock().await;
        if let Some(permit) = inner.held.remove(&id) {
            inner.active = inner.active.saturating_sub(1);
            if inner.forget_debt > 0 {
                permit.forget();
                inner.forget_debt -= 1;
            } else {
                drop(permit);
            }
        }
    }

    /// Atomically changes capacity within `[c_min, c_max]`. Holders keep
    /// their permits; the change takes effect for future
    /// acquire/release cycles.
    pub async fn resize(&self, new_capacity: usize) {
        let mut inner = self.inner.lock().await;
        let clamped = new_capacity.clamp(inner.c_min, inner.c_max);
        if clamped == inner.capacity {
            return;
        }
        if clamped > inner.capacity {
            let diff = clamped - inner.capacity;
            inner.semaphore.add_permits(diff);
        } else {
            let diff = inner.capacity - clamped;
            inner.forget_debt += diff;
        }
        inner.capacity = clamped;
    }

    /// Feeds one Attempt's outcome into the adaptive policy and applies
    /// any resulting resize. Called by the Executor after every Attempt
    /// completes and the permit has been released.
    pub async fn record_and_adapt(&self, outcome_headers: &reqwest::header::HeaderMap, status: Option<u16>, response_time: Duration) {
        let rate_limited_signal = is_rate_limit_low(outcome_headers);
        let is_error = status.map(|s| !crate::status::is_success(s)).unwrap_or(true);

        let mut inner = self.inner.lock().await;
        if inner.window.len() == WINDOW_SIZE {
            inner.window.pop_front();
        }
        inner.window.push_back(AttemptOutcome {
            is_error,
            response_time,
            rate_limited_signal,
        });

        let decision = score(&inner.window, inner.active, inner.capacity, inner.c_max);
        drop(inner);

        match decision {
            ScoreDecision::ScaleDown(by) => {
                let capacity = self.capacity().await;
                self.resize(capacity.saturating_sub(by)).await;
            }
            ScoreDecision::ScaleUp(by) => {
                let capacity = self.capacity().await;
                self.resize(capacity + by).await;
            }
            ScoreDecision::NoChange => {}
        }
    }
}

fn is_rate_limit_low(headers: &reqwest::header::HeaderMap) -> bool {
    if headers.get(reqwest::header::RETRY_AFTER).is_some() {
        return true;
    }
    headers
        .get("X-RateLimit-Remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .map(|remaining| remaining < 10)
        .unwrap_or(false)
}

enum ScoreDecision {
    ScaleDown(usize),
    ScaleUp(usize),
    NoChange,
}

/// `max(1, floor(0.1 * (c_max - c)))` (spec §4.6 scale-up step).
fn scale_up_step(capacity: usize, c_max: usize) -> usize {
    let headroom = c_max.saturating_sub(capacity);
    (headroom / 10).max(1)
}

/// Response-time standard deviation threshold above which the response-
/// time score turns negative. Expressed as a fraction of the window's
/// mean so it self-calibrates per backend instead of a hardcoded
/// absolute millisecond figure.
const RESPONSE_TIME_STDDEV_THRESHOLD_RATIO: f64 = 0.5;
const ERROR_RATE_THRESHOLD: f64 = 0.10;
const CRITICAL_RATE_LIMIT_THRESHOLD: i32 = -1;
const CRITICAL_ERROR_SCORE_THRESHOLD: i32 = -1;

fn score(window: &VecDeque<AttemptOutcome>, active: usize, capacity: usize, c_max: usize) -> ScoreDecision {
    if window.is_empty() {
        return ScoreDecision::NoChange;
    }

    let at_capacity = active >= capacity;

    let rate_limit_score: i32 = if window.back().map(|o| o.rate_limited_signal).unwrap_or(false) {
        -1
    } else {
        0
    };

    let error_rate = window.iter().filter(|o| o.is_error).count() as f64 / window.len() as f64;
    let response_code_score: i32 = if error_rate > ERROR_RATE_THRESHOLD {
        -1
    } else if !at_capacity && window.back().map(|o| !o.is_error).unwrap_or(false) {
        1
    } else {
        0
    };

    let times: Vec<f64> = window.iter().map(|o| o.response_time.as_secs_f64()).collect();
    let mean = times.iter().sum::<f64>() / times.len() as f64;
    let variance = times.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / times.len() as f64;
    let stddev = variance.sqrt();
    let response_time_score: i32 = if stddev > mean * RESPONSE_TIME_STDDEV_THRESHOLD_RATIO && mean > 0.0 {
        -1
    } else if !at_capacity {
        1
    } else {
        0
    };

    let weighted = rate_limit_score * 5 + response_code_score * 3 + response_time_score;

    // Critical short-circuit: a hard rate-limit signal or an outright
    // error-rate breach scales down immediately regardless of the
    // weighted sum.
    if rate_limit_score <= CRITICAL_RATE_LIMIT_THRESHOLD || response_code_score <= CRITICAL_ERROR_SCORE_THRESHOLD {
        return ScoreDecision::ScaleDown(1);
    }

    if weighted < 0 {
        ScoreDecision::ScaleDown(1)
    } else if weighted > 0 {
        ScoreDecision::ScaleUp(scale_up_step(capacity, c_max))
    } else {
        ScoreDecision::NoChange
    }
}
