//! Live tests against a local development node.
//!
//! These exercise the full engine path: unit provisioning, funding, transfer
//! submission, and telemetry. They expect an anvil-style node on
//! `127.0.0.1:8545` with the default prefunded accounts.

use eyre::Result;
use txload::{Registry, TxOptions, UnitConfig};

const NODE_URL: &str = "http://127.0.0.1:8545";

/// First anvil prefunded key.
const SPONSOR_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn local_config() -> Result<UnitConfig> {
    let yaml = format!(
        r#"
endpoints:
  - http: {NODE_URL}
private_keys: ["{SPONSOR_KEY}"]
num_wallets: 4
fund_amount: "1000000000000000000"
num_target_addresses: 4
"#
    );
    Ok(UnitConfig::from_yaml(&yaml)?)
}

#[tokio::test]
#[ignore = "requires a running node"]
async fn provisions_unit_and_sends_transfers() -> Result<()> {
    init_tracing();
    let registry = Registry::default();
    let cfg = local_config()?;
    let unit = registry.get_or_create(&cfg, "live-test").await?;

    // Second call with the same uid must return the same unit, not
    // provision again.
    let again = registry.get_or_create(&cfg, "live-test").await?;
    assert!(std::sync::Arc::ptr_eq(&unit, &again));

    let opts = TxOptions { tx_count: 5, confirmation_delay: 30, ..TxOptions::default() };
    let results = unit.send_transaction(&opts).await;
    assert_eq!(results.len(), 1);
    for (endpoint, outcome) in &results {
        let report = outcome.data.as_ref().unwrap_or_else(|| {
            panic!("endpoint {endpoint} failed: {:?}", outcome.err);
        });
        assert_eq!(report.submitted, 5);
        assert_eq!(report.state, txload::TxState::Confirmed);
    }
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running node"]
async fn reports_block_and_pool_telemetry() -> Result<()> {
    init_tracing();
    let registry = Registry::default();
    let cfg = local_config()?;
    let unit = registry.get_or_create(&cfg, "telemetry-test").await?;

    // Drive a little traffic so the pool and block reports have content.
    let opts = TxOptions { tx_count: 3, ..TxOptions::default() };
    unit.send_transaction(&opts).await;

    let blocks = unit.report_block_metrics().await;
    for outcome in blocks.values() {
        let report = outcome.data.as_ref().expect("block report");
        assert!(report.gas_ratio >= 0.0 && report.gas_ratio <= 1.0);
    }

    let pools = unit.tx_pool_status().await;
    for outcome in pools.values() {
        assert!(outcome.is_ok(), "txpool_status failed: {:?}", outcome.err);
    }

    let chain_ids = unit.chain_ids().await;
    for outcome in chain_ids.values() {
        assert_eq!(outcome.data, Some(unit.chain_id()));
    }
    Ok(())
}
