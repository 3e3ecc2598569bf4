//! Metrics sink: an observability seam parallel to [`crate::logger`], for
//! counters/gauges a caller wants exported to its own metrics system.
//! Supplemental to the spec's named components — no spec section
//! mandates it, but the ambient stack (spec §2) carries observability
//! regardless of which feature Non-goals exclude.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &str, value: u64);
    fn record_gauge(&self, name: &str, value: f64);
    fn record_histogram(&self, name: &str, value: f64);
}

#[derive(Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment_counter(&self, _name: &str, _value: u64) {}
    fn record_gauge(&self, _name: &str, _value: f64) {}
    fn record_histogram(&self, _name: &str, _value: f64) {}
}

/// An in-memory sink for tests: records every call it receives so
/// assertions can check which metrics an operation emitted, instead of
/// just that "some logging happened".
#[derive(Default)]
pub struct RecordingMetricsSink {
    counters: Mutex<std::collections::HashMap<String, AtomicU64>>,
    gauges: Mutex<std::collections::HashMap<String, f64>>,
    histograms: Mutex<std::collections::HashMap<String, Vec<f64>>>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        self.gauges.lock().unwrap().get(name).copied()
    }

    pub fn histogram_values(&self, name: &str) -> Vec<f64> {
        self.histograms.lock().unwrap().get(name).cloned().unwrap_or_default()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn increment_counter(&self, name: &str, value: u64) {
        let mut counters = self.counters.lock().unwrap();
        counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    fn record_gauge(&self, name: &str, value: f64) {
        self.gauges.lock().unwrap().insert(name.to_string(), value);
    }

    fn record_histogram(&self, name: &str, value: f64) {
        self.histograms
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(value);
    }
}
