//! Read-side telemetry: block cadence, txpool depth, and receipt lookups.
//!
//! These operations never consume a nonce. Block metrics are derived from
//! deltas against the previously observed block, tracked per endpoint so a
//! lagging node does not skew its neighbours' numbers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use alloy_consensus::BlockHeader;
use alloy_primitives::B256;
use alloy_provider::Provider;
use alloy_rpc_types_txpool::TxpoolStatus;
use serde::Serialize;
use tracing::debug;

use crate::error::EngineError;
use crate::metrics::engine_metrics;
use crate::result::EndpointResults;
use crate::unit::TestUnit;

/// Poll interval while waiting for a receipt in `tx_info_by_hash`.
const RECEIPT_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
struct BlockMark {
    number: u64,
    timestamp: u64,
}

/// Last observed block per endpoint. Deltas only make sense against the
/// same endpoint's previous observation.
#[derive(Debug, Default)]
pub struct BlockWatch {
    marks: Mutex<HashMap<String, BlockMark>>,
}

impl BlockWatch {
    /// Records the observation and returns the previous mark for the same
    /// endpoint, if the chain advanced since then.
    fn advance(&self, endpoint: &str, number: u64, timestamp: u64) -> Option<BlockMark> {
        let mut marks = self.marks.lock().expect("block watch lock poisoned");
        let prev = marks.insert(endpoint.to_string(), BlockMark { number, timestamp });
        match prev {
            Some(p) if p.number < number => Some(p),
            // Same block seen again, or the node rewound; no usable delta.
            _ => None,
        }
    }
}

/// Snapshot of the latest block with cadence deltas where available.
#[derive(Debug, Clone, Serialize)]
pub struct BlockReport {
    /// Block number.
    pub number: u64,
    /// Block timestamp in seconds.
    pub timestamp: u64,
    /// Transactions in the block.
    pub tx_count: u64,
    /// Gas used by the block.
    pub gas_used: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Gas used over gas limit.
    pub gas_ratio: f64,
    /// Average seconds per block since the previous observation, if the
    /// chain advanced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_time: Option<f64>,
    /// Transactions per second over the last block interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tps: Option<f64>,
    /// Million gas per second over the last block interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mgas_per_sec: Option<f64>,
}

/// Txpool depth as reported by `txpool_status`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStatus {
    /// Executable transactions waiting for inclusion.
    pub pending: u64,
    /// Transactions parked with nonce gaps or insufficient funds.
    pub queued: u64,
}

/// Receipt summary for a known transaction hash.
#[derive(Debug, Clone, Serialize)]
pub struct TxInfo {
    /// The queried hash.
    pub tx_hash: B256,
    /// True when the transaction executed successfully.
    pub status: bool,
    /// Gas consumed by the transaction.
    pub gas_used: u64,
    /// Block the transaction landed in.
    pub block_number: u64,
}

impl TestUnit {
    /// Samples the latest block on every endpoint and records cadence
    /// metrics against each endpoint's previous sample.
    pub async fn report_block_metrics(&self) -> EndpointResults<BlockReport> {
        self.pool()
            .for_each(|ep| async move {
                let block = ep
                    .bounded("latest block", async {
                        ep.provider()
                            .get_block_by_number(alloy_eips::BlockNumberOrTag::Latest)
                            .await
                    })
                    .await?
                    .ok_or_else(|| EngineError::connection("no latest block"))?;

                let number = block.header.number();
                let timestamp = block.header.timestamp();
                let tx_count = block.transactions.len() as u64;
                let gas_used = block.header.gas_used();
                let gas_limit = block.header.gas_limit();
                let gas_ratio =
                    if gas_limit > 0 { gas_used as f64 / gas_limit as f64 } else { 0.0 };

                let mut report = BlockReport {
                    number,
                    timestamp,
                    tx_count,
                    gas_used,
                    gas_limit,
                    gas_ratio,
                    block_time: None,
                    tps: None,
                    mgas_per_sec: None,
                };

                if let Some(prev) = self.blocks().advance(ep.id(), number, timestamp) {
                    let blocks = (number - prev.number) as f64;
                    let elapsed = timestamp.saturating_sub(prev.timestamp) as f64;
                    if elapsed > 0.0 {
                        let block_time = elapsed / blocks;
                        report.block_time = Some(block_time);
                        report.tps = Some(tx_count as f64 / block_time);
                        report.mgas_per_sec = Some(gas_used as f64 / 1e6 / block_time);

                        engine_metrics().block_time_ms.record(block_time * 1000.0);
                        engine_metrics().block_tps.record(tx_count as f64 / block_time);
                    }
                }
                engine_metrics().block_gas_ratio.record(gas_ratio);
                debug!(endpoint = %ep.id(), number, tx_count, gas_ratio, "sampled block");
                Ok(report)
            })
            .await
    }

    /// Txpool depth per endpoint via the `txpool_status` namespace.
    pub async fn tx_pool_status(&self) -> EndpointResults<PoolStatus> {
        self.pool()
            .for_each(|ep| async move {
                let raw = ep.raw_call("txpool_status", Vec::new()).await?;
                let status: TxpoolStatus = serde_json::from_value(raw).map_err(|e| {
                    EngineError::submission(format!("malformed txpool_status reply: {e}"))
                })?;
                let out = PoolStatus { pending: status.pending, queued: status.queued };
                engine_metrics().pool_pending.set(out.pending as f64);
                engine_metrics().pool_queued.set(out.queued as f64);
                Ok(out)
            })
            .await
    }

    /// Receipt lookup per endpoint. With `wait_seconds` of zero this is a
    /// single poll; otherwise it keeps polling until the bound elapses.
    pub async fn tx_info_by_hash(
        &self,
        tx_hash: B256,
        wait_seconds: u64,
    ) -> EndpointResults<TxInfo> {
        self.pool()
            .for_each(|ep| async move {
                let receipt = if wait_seconds == 0 {
                    ep.bounded("receipt", async {
                        ep.provider().get_transaction_receipt(tx_hash).await
                    })
                    .await?
                    .ok_or_else(|| EngineError::submission(format!("no receipt for {tx_hash}")))?
                } else {
                    ep.await_receipt(tx_hash, Duration::from_secs(wait_seconds), RECEIPT_POLL)
                        .await?
                };
                Ok(TxInfo {
                    tx_hash,
                    status: receipt.status(),
                    gas_used: receipt.gas_used,
                    block_number: receipt.block_number.unwrap_or_default(),
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_yields_delta_only_when_chain_advances() {
        let watch = BlockWatch::default();
        assert!(watch.advance("a", 100, 1_000).is_none());

        let prev = watch.advance("a", 102, 1_024).expect("chain advanced");
        assert_eq!(prev.number, 100);
        assert_eq!(prev.timestamp, 1_000);

        // Same block again: no delta.
        assert!(watch.advance("a", 102, 1_024).is_none());
        // Rewind: no delta either.
        assert!(watch.advance("a", 101, 1_012).is_none());
    }

    #[test]
    fn watch_tracks_endpoints_independently() {
        let watch = BlockWatch::default();
        watch.advance("a", 100, 1_000);
        assert!(watch.advance("b", 100, 1_000).is_none());
        assert!(watch.advance("a", 101, 1_012).is_some());
    }
}
