use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, histogram_opts, HistogramVec, IntCounter, IntCounterVec, Registry,
};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionMetricsSnapshot {
    pub commands: u64,
    pub command_success: u64,
    pub command_failures: u64,
    pub command_latency_total_us: u64,
    pub sessions_attached: u64,
    pub frames_skipped_ads: u64,
    pub attach_cap_hits: u64,
}

static COMMANDS: AtomicU64 = AtomicU64::new(0);
static COMMAND_SUCCESS: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static COMMAND_LATENCY_TOTAL_US: AtomicU64 = AtomicU64::new(0);
static SESSIONS_ATTACHED: AtomicU64 = AtomicU64::new(0);
static FRAMES_SKIPPED_ADS: AtomicU64 = AtomicU64::new(0);
static ATTACH_CAP_HITS: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref CDP_COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("pagelens_cdp_commands_total", "Total CDP commands executed"),
        &["method"]
    )
    .unwrap();
    static ref CDP_COMMAND_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "pagelens_cdp_command_failures_total",
            "Total CDP command failures"
        ),
        &["method"]
    )
    .unwrap();
    static ref CDP_COMMAND_DURATION: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "pagelens_cdp_command_duration_seconds",
            "CDP command latency",
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]
        ),
        &["method"]
    )
    .unwrap();
    static ref SESSIONS_ATTACHED_TOTAL: IntCounter = IntCounter::new(
        "pagelens_sessions_attached_total",
        "Total protocol sessions attached"
    )
    .unwrap();
    static ref FRAMES_SKIPPED_ADS_TOTAL: IntCounter = IntCounter::new(
        "pagelens_frames_skipped_ads_total",
        "Iframe targets skipped by the ad-host skip-list"
    )
    .unwrap();
    static ref ATTACH_CAP_HITS_TOTAL: IntCounter = IntCounter::new(
        "pagelens_attach_cap_hits_total",
        "Discovery passes that hit the iframe attachment cap"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register session metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, CDP_COMMANDS_TOTAL.clone());
    register(registry, CDP_COMMAND_FAILURES_TOTAL.clone());
    register(registry, CDP_COMMAND_DURATION.clone());
    register(registry, SESSIONS_ATTACHED_TOTAL.clone());
    register(registry, FRAMES_SKIPPED_ADS_TOTAL.clone());
    register(registry, ATTACH_CAP_HITS_TOTAL.clone());
}

pub fn record_command(method: &str) {
    COMMANDS.fetch_add(1, Ordering::Relaxed);
    CDP_COMMANDS_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_command_success(method: &str, duration: Duration) {
    COMMAND_SUCCESS.fetch_add(1, Ordering::Relaxed);
    let micros = duration.as_micros().min(u64::MAX as u128) as u64;
    COMMAND_LATENCY_TOTAL_US.fetch_add(micros, Ordering::Relaxed);
    CDP_COMMAND_DURATION
        .with_label_values(&[method])
        .observe(duration.as_secs_f64());
}

pub fn record_command_failure(method: &str) {
    COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
    CDP_COMMAND_FAILURES_TOTAL
        .with_label_values(&[method])
        .inc();
}

pub fn record_session_attached() {
    SESSIONS_ATTACHED.fetch_add(1, Ordering::Relaxed);
    SESSIONS_ATTACHED_TOTAL.inc();
}

pub fn record_frame_skipped_ad() {
    FRAMES_SKIPPED_ADS.fetch_add(1, Ordering::Relaxed);
    FRAMES_SKIPPED_ADS_TOTAL.inc();
}

pub fn record_attach_cap_hit() {
    ATTACH_CAP_HITS.fetch_add(1, Ordering::Relaxed);
    ATTACH_CAP_HITS_TOTAL.inc();
}

pub fn snapshot() -> SessionMetricsSnapshot {
    SessionMetricsSnapshot {
        commands: COMMANDS.load(Ordering::Relaxed),
        command_success: COMMAND_SUCCESS.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        command_latency_total_us: COMMAND_LATENCY_TOTAL_US.load(Ordering::Relaxed),
        sessions_attached: SESSIONS_ATTACHED.load(Ordering::Relaxed),
        frames_skipped_ads: FRAMES_SKIPPED_ADS.load(Ordering::Relaxed),
        attach_cap_hits: ATTACH_CAP_HITS.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    COMMANDS.store(0, Ordering::Relaxed);
    COMMAND_SUCCESS.store(0, Ordering::Relaxed);
    COMMAND_FAILURES.store(0, Ordering::Relaxed);
    COMMAND_LATENCY_TOTAL_US.store(0, Ordering::Relaxed);
    SESSIONS_ATTACHED.store(0, Ordering::Relaxed);
    FRAMES_SKIPPED_ADS.store(0, Ordering::Relaxed);
    ATTACH_CAP_HITS.store(0, Ordering::Relaxed);
}
