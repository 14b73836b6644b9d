//! Concurrent Ethereum transaction load generator.
//!
//! This crate manages pools of funded wallets and drives signed transaction
//! traffic against one or more JSON-RPC endpoints. It is built to sit behind
//! a load-test harness whose workers re-enter concurrently: expensive state
//! (endpoint connections, wallet ledgers) is provisioned once per caller uid
//! and shared, while nonce issuance stays strictly serialized per wallet.
//!
//! # Overview
//!
//! The engine is organized into layers:
//!
//! - **Config**: YAML unit configuration and validation
//! - **Wallets**: key material plus gap-free / offset nonce streams
//! - **Endpoints**: pooled RPC connections with concurrent fan-out
//! - **Builder**: signed legacy, EIP-1559, and EIP-2930 payload construction
//! - **Engine**: transfer, token, deployment, and contract-call operations
//! - **Telemetry**: block cadence, txpool depth, and receipt lookups
//!
//! Every fan-out operation returns one entry per endpoint; a failing
//! endpoint yields an error entry instead of failing the whole call.
//!
//! # Example
//!
//! ```rust,ignore
//! use txload::{registry, TxOptions, UnitConfig};
//!
//! # async fn run() -> txload::Result<()> {
//! let cfg = UnitConfig::from_yaml_file("loadtest.yaml")?;
//! let unit = registry().get_or_create(&cfg, "worker-1").await?;
//! let results = unit.send_transaction(&TxOptions::default()).await;
//! for (endpoint, outcome) in &results {
//!     println!("{endpoint}: {outcome:?}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, unreachable_pub)]

pub mod abi;
pub mod builder;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod result;
pub mod telemetry;
pub mod unit;
pub mod wallet;

pub use config::{EndpointConfig, UnitConfig};
pub use endpoint::{Endpoint, EndpointPool};
pub use engine::{
    DeployOutcome, DeployParams, FnParams, SharedWalletHandle, TxOptions, TxState, TxSubmission,
};
pub use error::{EngineError, Result};
pub use registry::{create_shared_unit, registry, Registry};
pub use result::{CallOutcome, EndpointResults};
pub use telemetry::{BlockReport, PoolStatus, TxInfo};
pub use unit::TestUnit;
pub use wallet::{Wallet, WalletLedger};
