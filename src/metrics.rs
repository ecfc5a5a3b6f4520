use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::time::{Duration, Instant};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Counter for API requests by endpoint and method
    pub static ref API_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("api_requests_total", "Total number of API requests"),
        &["method", "endpoint", "status"]
    ).expect("Failed to create API requests counter");

    /// Histogram for API request duration
    pub static ref API_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("api_request_duration_seconds", "API request duration")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["method", "endpoint"]
    ).expect("Failed to create API request duration histogram");

    /// Gauge for simulator sessions currently in the store
    pub static ref ACTIVE_SESSIONS: Gauge = Gauge::new(
        "active_sessions_total", "Number of simulator sessions currently stored"
    ).expect("Failed to create active sessions gauge");

    /// Counter for created sessions
    pub static ref SESSIONS_CREATED_TOTAL: Counter = Counter::new(
        "sessions_created_total", "Total number of simulator sessions created"
    ).expect("Failed to create sessions created counter");

    /// Counter for recorded code entries
    pub static ref CODE_APPENDS_TOTAL: Counter = Counter::new(
        "code_appends_total", "Total number of code entries appended to session histories"
    ).expect("Failed to create code appends counter");

    /// Counter for append retries caused by concurrent writes to one session
    pub static ref APPEND_CONFLICTS_TOTAL: Counter = Counter::new(
        "append_conflicts_total", "Total number of version conflicts retried while appending code"
    ).expect("Failed to create append conflicts counter");

    /// Counter for history blobs discarded as unreadable
    pub static ref HISTORY_RECOVERIES_TOTAL: Counter = Counter::new(
        "history_recoveries_total", "Total number of session histories discarded as unreadable"
    ).expect("Failed to create history recoveries counter");

    /// Counter for sessions removed by the retention sweeper
    pub static ref SESSIONS_REAPED_TOTAL: Counter = Counter::new(
        "sessions_reaped_total", "Total number of sessions deleted by the retention sweeper"
    ).expect("Failed to create sessions reaped counter");

    /// Counter for failed retention passes
    pub static ref SWEEP_FAILURES_TOTAL: Counter = Counter::new(
        "sweep_failures_total", "Total number of retention sweeps that failed"
    ).expect("Failed to create sweep failures counter");
}

/// Initialize Prometheus metrics by registering them with the global registry
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(API_REQUESTS_TOTAL.clone()))
        .expect("Failed to register API requests counter");

    REGISTRY
        .register(Box::new(API_REQUEST_DURATION.clone()))
        .expect("Failed to register API request duration histogram");

    REGISTRY
        .register(Box::new(ACTIVE_SESSIONS.clone()))
        .expect("Failed to register active sessions gauge");

    REGISTRY
        .register(Box::new(SESSIONS_CREATED_TOTAL.clone()))
        .expect("Failed to register sessions created counter");

    REGISTRY
        .register(Box::new(CODE_APPENDS_TOTAL.clone()))
        .expect("Failed to register code appends counter");

    REGISTRY
        .register(Box::new(APPEND_CONFLICTS_TOTAL.clone()))
        .expect("Failed to register append conflicts counter");

    REGISTRY
        .register(Box::new(HISTORY_RECOVERIES_TOTAL.clone()))
        .expect("Failed to register history recoveries counter");

    REGISTRY
        .register(Box::new(SESSIONS_REAPED_TOTAL.clone()))
        .expect("Failed to register sessions reaped counter");

    REGISTRY
        .register(Box::new(SWEEP_FAILURES_TOTAL.clone()))
        .expect("Failed to register sweep failures counter");
}

/// Record an API request
pub fn record_api_request(method: &str, endpoint: &str, status: u16, duration: Duration) {
    API_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    API_REQUEST_DURATION
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

/// Update the stored-session gauge
pub fn set_active_sessions(count: usize) {
    ACTIVE_SESSIONS.set(count as f64);
}

/// Record a session creation
pub fn record_session_created() {
    SESSIONS_CREATED_TOTAL.inc();
}

/// Record a successfully appended code entry
pub fn record_code_append() {
    CODE_APPENDS_TOTAL.inc();
}

/// Record a retried append after a concurrent write to the same session
pub fn record_append_conflict() {
    APPEND_CONFLICTS_TOTAL.inc();
}

/// Record a history blob discarded as unreadable
pub fn record_history_recovery() {
    HISTORY_RECOVERIES_TOTAL.inc();
}

/// Record sessions deleted by a retention sweep
pub fn record_sessions_reaped(count: usize) {
    SESSIONS_REAPED_TOTAL.inc_by(count as f64);
}

/// Record a failed retention sweep
pub fn record_sweep_failure() {
    SWEEP_FAILURES_TOTAL.inc();
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
