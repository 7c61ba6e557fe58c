use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounter, Registry};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractorMetricsSnapshot {
    pub nodes_considered: u64,
    pub interactive_kept: u64,
    pub occluded_dropped: u64,
}

static NODES_CONSIDERED: AtomicU64 = AtomicU64::new(0);
static INTERACTIVE_KEPT: AtomicU64 = AtomicU64::new(0);
static OCCLUDED_DROPPED: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref NODES_CONSIDERED_TOTAL: IntCounter = IntCounter::new(
        "pagelens_extract_nodes_total",
        "Fused nodes visited during simplification"
    )
    .unwrap();
    static ref INTERACTIVE_KEPT_TOTAL: IntCounter = IntCounter::new(
        "pagelens_extract_interactive_total",
        "Interactive nodes surviving simplification"
    )
    .unwrap();
    static ref OCCLUDED_DROPPED_TOTAL: IntCounter = IntCounter::new(
        "pagelens_extract_occluded_total",
        "Interactive nodes dropped as paint-order occluded"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register extractor metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, NODES_CONSIDERED_TOTAL.clone());
    register(registry, INTERACTIVE_KEPT_TOTAL.clone());
    register(registry, OCCLUDED_DROPPED_TOTAL.clone());
}

pub fn record_node_considered() {
    NODES_CONSIDERED.fetch_add(1, Ordering::Relaxed);
    NODES_CONSIDERED_TOTAL.inc();
}

pub fn record_interactive_kept() {
    INTERACTIVE_KEPT.fetch_add(1, Ordering::Relaxed);
    INTERACTIVE_KEPT_TOTAL.inc();
}

pub fn record_occluded_dropped() {
    OCCLUDED_DROPPED.fetch_add(1, Ordering::Relaxed);
    OCCLUDED_DROPPED_TOTAL.inc();
}

pub fn snapshot() -> ExtractorMetricsSnapshot {
    ExtractorMetricsSnapshot {
        nodes_considered: NODES_CONSIDERED.load(Ordering::Relaxed),
        interactive_kept: INTERACTIVE_KEPT.load(Ordering::Relaxed),
        occluded_dropped: OCCLUDED_DROPPED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    NODES_CONSIDERED.store(0, Ordering::Relaxed);
    INTERACTIVE_KEPT.store(0, Ordering::Relaxed);
    OCCLUDED_DROPPED.store(0, Ordering::Relaxed);
}
