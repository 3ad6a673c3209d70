use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics Module - Prometheus metrics for the relay pipeline
// ============================================================================
//
// Counters for publish outcomes and retention sweeps. The registry is owned
// here so an embedding application can gather and expose it however it
// likes; no scrape server is started by this crate.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub records_published: IntCounterVec,
    pub records_failed: IntCounterVec,
    pub records_dead: IntCounterVec,
    pub records_purged: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let records_published = IntCounterVec::new(
            Opts::new(
                "outbox_records_published_total",
                "Outbox records successfully published to the broker",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(records_published.clone()))?;

        let records_failed = IntCounterVec::new(
            Opts::new(
                "outbox_records_failed_total",
                "Publish attempts that failed and were scheduled for retry",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(records_failed.clone()))?;

        let records_dead = IntCounterVec::new(
            Opts::new(
                "outbox_records_dead_total",
                "Outbox records dead-lettered after exhausting the retry budget",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(records_dead.clone()))?;

        let records_purged = IntCounter::new(
            "outbox_records_purged_total",
            "Processed outbox records deleted by the retention sweep",
        )?;
        registry.register(Box::new(records_purged.clone()))?;

        Ok(Self {
            registry,
            records_published,
            records_failed,
            records_dead,
            records_purged,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
