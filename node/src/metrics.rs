//! Prometheus metrics for the election service.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`]; [`NodeMetrics::encode`]
//! renders it in the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Envelopes received from peers.
    pub messages_received: IntCounter,
    /// Envelopes that failed to decode or named an election we refused.
    pub messages_rejected: IntCounter,
    /// Messages parked for a later round.
    pub messages_deferred: IntCounter,
    /// Envelopes handed to the network.
    pub messages_broadcast: IntCounter,
    pub elections_started: IntCounter,
    pub elections_committed: IntCounter,
    /// Round timeouts fired by this node.
    pub rounds_advanced: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub active_elections: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time from trigger to local commit, in milliseconds.
    pub commit_latency_ms: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| {
            register_int_counter_with_registry!(Opts::new(name, help), registry)
        };

        let messages_received =
            counter("fedvote_messages_received_total", "Election envelopes received")?;
        let messages_rejected = counter(
            "fedvote_messages_rejected_total",
            "Envelopes dropped as malformed or unroutable",
        )?;
        let messages_deferred = counter(
            "fedvote_messages_deferred_total",
            "Messages held for a later round",
        )?;
        let messages_broadcast =
            counter("fedvote_messages_broadcast_total", "Election envelopes broadcast")?;
        let elections_started = counter("fedvote_elections_started_total", "Elections started")?;
        let elections_committed =
            counter("fedvote_elections_committed_total", "Elections committed locally")?;
        let rounds_advanced =
            counter("fedvote_rounds_advanced_total", "Round timeouts fired")?;

        let active_elections = register_int_gauge_with_registry!(
            Opts::new("fedvote_active_elections", "Elections currently running"),
            registry
        )?;

        // 1 ms → ~16 s
        let commit_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "fedvote_commit_latency_ms",
                "Trigger to commit latency in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            messages_received,
            messages_rejected,
            messages_deferred,
            messages_broadcast,
            elections_started,
            elections_committed,
            rounds_advanced,
            active_elections,
            commit_latency_ms,
        })
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
