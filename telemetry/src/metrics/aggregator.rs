//! In-process metric aggregation.
//!
//! The `MetricsAggregator` owns every counter, gauge accumulator and the
//! active-user set. Request-path code mutates it through cheap, infallible
//! operations; the exporter is the only reader and drains it through
//! [`MetricsAggregator::snapshot_and_reset`].
//!
//! All state lives behind a single mutex so that a snapshot observes every
//! increment that completed before it and none that started after it.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::CounterMode;
use crate::models::MetricSample;

/// Fixed-point scale for revenue (micro-units).
const REVENUE_SCALE: f64 = 1_000_000.0;

/// HTTP methods with a dedicated request counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl TrackedMethod {
    /// Parses a method name, case-insensitively. Other methods return `None`.
    #[must_use]
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Running sum and count of latency observations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct LatencyWindow {
    sum_ms: f64,
    count: u64,
}

impl LatencyWindow {
    fn observe(&mut self, latency_ms: f64) {
        if latency_ms.is_finite() {
            self.sum_ms += latency_ms;
            self.count = self.count.saturating_add(1);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_ms / self.count as f64)
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests_total: u64,
    requests_get: u64,
    requests_post: u64,
    requests_put: u64,
    requests_delete: u64,
    auth_attempts: u64,
    auth_successes: u64,
    auth_failures: u64,
    pizzas_sold: u64,
    pizza_failures: u64,
    revenue_micros: i64,
}

#[derive(Debug, Default)]
struct AggregatorState {
    counters: Counters,
    active_users: HashSet<String>,
    pizza_latency: LatencyWindow,
    service_latency: LatencyWindow,
}

/// Point-in-time view of the aggregator, taken by the exporter.
///
/// Optional fields are `None` when nothing was observed in the window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// All requests seen.
    pub requests_total: u64,
    /// `GET` requests.
    pub requests_get: u64,
    /// `POST` requests.
    pub requests_post: u64,
    /// `PUT` requests.
    pub requests_put: u64,
    /// `DELETE` requests.
    pub requests_delete: u64,
    /// Authentication attempts.
    pub auth_attempts: u64,
    /// Successful authentication attempts.
    pub auth_successes: u64,
    /// Failed authentication attempts.
    pub auth_failures: u64,
    /// Pizzas sold.
    pub pizzas_sold: u64,
    /// Pizzas whose purchase failed.
    pub pizza_failures: u64,
    /// Revenue from successful purchases.
    pub revenue: f64,
    /// Distinct users seen in the window.
    pub active_users: usize,
    /// Average purchase latency in the window, in milliseconds.
    pub pizza_latency_avg_ms: Option<f64>,
    /// Average service latency in the window, in milliseconds.
    pub service_latency_avg_ms: Option<f64>,
    /// Host CPU load as a percentage of available cores.
    pub cpu_percent: Option<f64>,
    /// Host memory in use as a percentage.
    pub memory_percent: Option<f64>,
}

impl MetricsSnapshot {
    /// Converts the snapshot into wire samples.
    ///
    /// Zero counters and absent gauges are omitted, so a snapshot of an idle
    /// window with no system reading yields no samples at all.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_samples(&self, source: &str) -> Vec<MetricSample> {
        let counters = [
            ("http_requests_total", self.requests_total as f64),
            ("http_requests_get", self.requests_get as f64),
            ("http_requests_post", self.requests_post as f64),
            ("http_requests_put", self.requests_put as f64),
            ("http_requests_delete", self.requests_delete as f64),
            ("auth_attempts_total", self.auth_attempts as f64),
            ("auth_success_total", self.auth_successes as f64),
            ("auth_failure_total", self.auth_failures as f64),
            ("pizza_sold_total", self.pizzas_sold as f64),
            ("pizza_failures_total", self.pizza_failures as f64),
            ("pizza_revenue_total", self.revenue),
        ];

        let gauges = [
            (
                "active_users",
                (self.active_users > 0).then_some(self.active_users as f64),
            ),
            ("pizza_latency_avg_ms", self.pizza_latency_avg_ms),
            ("service_latency_avg_ms", self.service_latency_avg_ms),
            ("cpu_usage_percent", self.cpu_percent),
            ("memory_usage_percent", self.memory_percent),
        ];

        counters
            .into_iter()
            .filter(|(_, value)| *value != 0.0)
            .map(|(name, value)| MetricSample::counter(name, value, source))
            .chain(gauges.into_iter().filter_map(|(name, value)| {
                value.map(|v| MetricSample::gauge(name, v, source))
            }))
            .collect()
    }
}

/// Process-wide metric accumulator.
///
/// # Example
///
/// ```
/// use telemetry::config::CounterMode;
/// use telemetry::metrics::MetricsAggregator;
///
/// let metrics = MetricsAggregator::new(CounterMode::Cumulative);
/// metrics.record_request("GET");
/// metrics.track_auth_attempt(true);
///
/// let snapshot = metrics.snapshot_and_reset();
/// assert_eq!(snapshot.requests_total, 1);
/// assert_eq!(snapshot.auth_successes, 1);
/// ```
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    mode: CounterMode,
    state: Mutex<AggregatorState>,
}

impl MetricsAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new(mode: CounterMode) -> Self {
        Self {
            mode,
            state: Mutex::new(AggregatorState::default()),
        }
    }

    /// Counter reset policy in effect.
    #[must_use]
    pub fn mode(&self) -> CounterMode {
        self.mode
    }

    // A panic while holding the lock leaves plain counters behind, which are
    // still valid; request-path calls must not fail.
    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts a request. Unrecognized methods only increment the total.
    pub fn record_request(&self, method: &str) {
        let tracked = TrackedMethod::parse(method);
        let mut state = self.lock();
        let counters = &mut state.counters;
        counters.requests_total = counters.requests_total.saturating_add(1);
        let per_method = match tracked {
            Some(TrackedMethod::Get) => &mut counters.requests_get,
            Some(TrackedMethod::Post) => &mut counters.requests_post,
            Some(TrackedMethod::Put) => &mut counters.requests_put,
            Some(TrackedMethod::Delete) => &mut counters.requests_delete,
            None => return,
        };
        *per_method = per_method.saturating_add(1);
    }

    /// Adds a user to the active set. Absent or empty ids are ignored.
    pub fn track_active_user(&self, user_id: Option<&str>) {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            return;
        };
        let mut state = self.lock();
        if !state.active_users.contains(user_id) {
            state.active_users.insert(user_id.to_string());
        }
    }

    /// Counts an authentication attempt and its outcome.
    pub fn track_auth_attempt(&self, success: bool) {
        let mut state = self.lock();
        let counters = &mut state.counters;
        counters.auth_attempts = counters.auth_attempts.saturating_add(1);
        let outcome = if success {
            &mut counters.auth_successes
        } else {
            &mut counters.auth_failures
        };
        *outcome = outcome.saturating_add(1);
    }

    /// Records a pizza purchase.
    ///
    /// On success `count` pizzas and `revenue` are added to the sold totals;
    /// on failure `count` is added to the failure counter. A latency, when
    /// given, is recorded either way.
    pub fn track_pizza_purchase(
        &self,
        success: bool,
        latency_ms: Option<f64>,
        count: u64,
        revenue: f64,
    ) {
        let mut state = self.lock();
        let counters = &mut state.counters;
        // Counters pin at their limits instead of wrapping.
        if success {
            counters.pizzas_sold = counters.pizzas_sold.saturating_add(count);
            counters.revenue_micros = counters.revenue_micros.saturating_add(to_micros(revenue));
        } else {
            counters.pizza_failures = counters.pizza_failures.saturating_add(count);
        }
        if let Some(latency) = latency_ms {
            state.pizza_latency.observe(latency);
        }
    }

    /// Records the end-to-end latency of a served request.
    pub fn record_service_latency(&self, latency_ms: f64) {
        self.lock().service_latency.observe(latency_ms);
    }

    /// Captures the current values and starts a new window.
    ///
    /// Latency windows and the active-user set are always cleared. Counters
    /// are cleared only in [`CounterMode::Delta`]. The read and the reset
    /// happen under the same lock.
    ///
    /// System gauges are left empty; the exporter fills them in.
    #[must_use]
    pub fn snapshot_and_reset(&self) -> MetricsSnapshot {
        let mut state = self.lock();

        let snapshot = {
            let c = &state.counters;
            MetricsSnapshot {
                requests_total: c.requests_total,
                requests_get: c.requests_get,
                requests_post: c.requests_post,
                requests_put: c.requests_put,
                requests_delete: c.requests_delete,
                auth_attempts: c.auth_attempts,
                auth_successes: c.auth_successes,
                auth_failures: c.auth_failures,
                pizzas_sold: c.pizzas_sold,
                pizza_failures: c.pizza_failures,
                revenue: from_micros(c.revenue_micros),
                active_users: state.active_users.len(),
                pizza_latency_avg_ms: state.pizza_latency.average(),
                service_latency_avg_ms: state.service_latency.average(),
                cpu_percent: None,
                memory_percent: None,
            }
        };

        state.active_users.clear();
        state.pizza_latency = LatencyWindow::default();
        state.service_latency = LatencyWindow::default();
        if self.mode == CounterMode::Delta {
            state.counters = Counters::default();
        }

        snapshot
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_micros(value: f64) -> i64 {
    if value.is_finite() {
        (value * REVENUE_SCALE).round() as i64
    } else {
        0
    }
}

#[allow(clippy::cast_precision_loss)]
fn from_micros(micros: i64) -> f64 {
    micros as f64 / REVENUE_SCALE
}
