use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::metrics::{RequestRecord, ResponseClass};

/// Always-on aggregation of request outcomes.
///
/// Every record handed to the reporter lands here exactly once, under one lock, regardless of
/// which optional collectors are configured. The final [RunStats] snapshot is what the runner
/// turns into the run summary.
pub(crate) struct StatsCollector {
    inner: Mutex<StatsInner>,
}

struct StatsInner {
    started: Instant,
    /// Response times in microseconds. One hour of microseconds is more than any sane request
    /// timeout, anything beyond it is clamped rather than lost.
    histogram: Histogram<u64>,
    requests_total: u64,
    requests_succeeded: u64,
    requests_failed: u64,
    transport_errors: u64,
    checks: BTreeMap<String, CheckCounts>,
}

/// Outcome tally for one named check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckCounts {
    pub passes: u64,
    pub total: u64,
}

/// Latency distribution over completed requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyStats {
    pub min: Duration,
    pub mean: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

/// A point in time snapshot of the aggregated statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub requests_total: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub transport_errors: u64,
    pub requests_per_second: f64,
    pub latency: LatencyStats,
    pub checks: BTreeMap<String, CheckCounts>,
}

impl StatsCollector {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                started: Instant::now(),
                histogram: Histogram::new_with_bounds(1, 60 * 60 * 1_000_000, 3)
                    .expect("histogram bounds are valid"),
                requests_total: 0,
                requests_succeeded: 0,
                requests_failed: 0,
                transport_errors: 0,
                checks: BTreeMap::new(),
            }),
        }
    }

    pub(crate) fn add(&self, record: &RequestRecord) {
        let mut inner = self.inner.lock();

        inner.requests_total += 1;
        match record.response {
            Some(ResponseClass::Success) => inner.requests_succeeded += 1,
            Some(ResponseClass::HttpError) => inner.requests_failed += 1,
            Some(ResponseClass::TransportError) | None => inner.transport_errors += 1,
        }

        if !matches!(record.response, Some(ResponseClass::TransportError) | None) {
            if let Some(elapsed) = record.elapsed {
                inner
                    .histogram
                    .saturating_record(elapsed.as_micros().min(u64::MAX as u128) as u64);
            }
        }

        for (name, passed) in &record.checks {
            let counts = inner.checks.entry(name.clone()).or_default();
            counts.total += 1;
            if *passed {
                counts.passes += 1;
            }
        }
    }

    pub(crate) fn snapshot(&self) -> RunStats {
        let inner = self.inner.lock();

        let latency = if inner.histogram.is_empty() {
            LatencyStats::default()
        } else {
            LatencyStats {
                min: Duration::from_micros(inner.histogram.min()),
                mean: Duration::from_secs_f64(inner.histogram.mean() / 1_000_000.0),
                max: Duration::from_micros(inner.histogram.max()),
                p50: Duration::from_micros(inner.histogram.value_at_quantile(0.5)),
                p90: Duration::from_micros(inner.histogram.value_at_quantile(0.9)),
                p95: Duration::from_micros(inner.histogram.value_at_quantile(0.95)),
                p99: Duration::from_micros(inner.histogram.value_at_quantile(0.99)),
            }
        };

        let elapsed = inner.started.elapsed().as_secs_f64();
        let requests_per_second = if elapsed > 0.0 {
            inner.requests_total as f64 / elapsed
        } else {
            0.0
        };

        RunStats {
            requests_total: inner.requests_total,
            requests_succeeded: inner.requests_succeeded,
            requests_failed: inner.requests_failed,
            transport_errors: inner.transport_errors,
            requests_per_second,
            latency,
            checks: inner.checks.clone(),
        }
    }
}
