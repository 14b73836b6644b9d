//! Engine metrics, recorded as a side effect of submissions and telemetry.

use std::sync::LazyLock;

use metrics::{Counter, Gauge, Histogram};
use metrics_derive::Metrics;

/// Metric bundle for the submission engine and telemetry collector.
#[derive(Metrics, Clone)]
#[metrics(scope = "txload")]
pub struct EngineMetrics {
    /// Transactions accepted by a node.
    #[metric(describe = "Count of transactions submitted")]
    pub txs_submitted: Counter,

    /// Transactions rejected synchronously.
    #[metric(describe = "Count of transactions rejected or failed to submit")]
    pub txs_failed: Counter,

    /// Transactions with an observed receipt.
    #[metric(describe = "Count of transactions confirmed by receipt")]
    pub txs_confirmed: Counter,

    /// Confirmation waits that expired without a receipt.
    #[metric(describe = "Count of confirmation waits that timed out")]
    pub txs_timed_out: Counter,

    /// Duration of individual RPC requests.
    #[metric(describe = "RPC request duration in milliseconds")]
    pub request_duration_ms: Histogram,

    /// Seconds-per-block deltas, in milliseconds.
    #[metric(describe = "Observed block time in milliseconds")]
    pub block_time_ms: Histogram,

    /// Block fullness.
    #[metric(describe = "Gas used over gas limit for the latest block")]
    pub block_gas_ratio: Histogram,

    /// Throughput derived from block deltas.
    #[metric(describe = "Confirmed transactions per second derived from block deltas")]
    pub block_tps: Histogram,

    /// Current txpool pending depth.
    #[metric(describe = "Pending transactions reported by the txpool")]
    pub pool_pending: Gauge,

    /// Current txpool queued depth.
    #[metric(describe = "Queued transactions reported by the txpool")]
    pub pool_queued: Gauge,
}

static ENGINE_METRICS: LazyLock<EngineMetrics> = LazyLock::new(EngineMetrics::default);

/// The process-wide metric bundle.
pub fn engine_metrics() -> &'static EngineMetrics {
    &ENGINE_METRICS
}
