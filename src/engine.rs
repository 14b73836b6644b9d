//! Submission engine: builds signed payloads and fans them out to every
//! endpoint of a unit.
//!
//! A payload moves through build, broadcast, and optional confirmation.
//! The nonce is consumed at build time and never rolled back, mirroring
//! chain semantics where a skipped nonce stays skipped until the gap is
//! filled. A synchronous node rejection surfaces as the endpoint's `err`
//! entry, never as an exception across the engine boundary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_dyn_abi::JsonAbiExt;
use alloy_json_abi::JsonAbi;
use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::TransactionRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::abi::{self, AbiArg, AccessListEntry};
use crate::builder::{build_signed, BuiltTx, TxPlan};
use crate::error::{EngineError, Result};
use crate::metrics::engine_metrics;
use crate::result::EndpointResults;
use crate::unit::TestUnit;

/// Poll interval while waiting for a confirmation receipt.
const CONFIRMATION_POLL: Duration = Duration::from_millis(250);
/// How long a deployment may wait for its receipt.
const DEPLOY_TIMEOUT: Duration = Duration::from_secs(60);

/// Observable final state of a submission. Building is transient and a
/// synchronous rejection is reported through the endpoint's `err` entry,
/// so neither appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    /// Accepted by the node; not waiting for confirmation.
    Sent,
    /// Receipt observed within the confirmation bound.
    Confirmed,
    /// No receipt within the confirmation bound.
    TimedOut,
}

/// Caller options shared by the plain/ERC-20/ERC-721 send operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TxOptions {
    /// Payloads to build and submit in sequence, each on the next nonce.
    pub tx_count: u64,
    /// Shifts nonces upward, deliberately leaving a visible gap.
    pub nonce_offset: u64,
    /// Seconds to wait for the last payload's receipt; 0 = do not wait.
    pub confirmation_delay: u64,
    /// Gas price multiplier, default 1.
    pub gas_price_multiplier: u64,
    /// Pinned shared wallet addresses; empty = round-robin lease.
    pub wallets: Vec<Address>,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            tx_count: 1,
            nonce_offset: 0,
            confirmation_delay: 0,
            gas_price_multiplier: 1,
            wallets: Vec::new(),
        }
    }
}

impl TxOptions {
    fn validate(&self) -> Result<()> {
        if self.confirmation_delay > 0 && self.nonce_offset > 0 {
            // An offset nonce cannot mine until the gap is filled, so
            // waiting for its receipt would always time out.
            return Err(EngineError::build("cannot use nonce_offset with confirmation_delay"));
        }
        Ok(())
    }
}

/// Parameters for `deploy_contract`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployParams {
    /// Gas limit for the deployment; required, deployment cost cannot be
    /// estimated generically.
    pub gas_limit: u64,
    /// Path to the contract's JSON ABI.
    pub abi_path: PathBuf,
    /// Path to the hex-encoded deployment bytecode.
    pub bin_path: PathBuf,
    /// Constructor arguments.
    #[serde(default)]
    pub args: Vec<AbiArg>,
    /// Gas price multiplier, default 1.
    #[serde(default = "default_multiplier")]
    pub gas_price_multiplier: u64,
}

/// Parameters for `tx_contract` / `call_contract`.
#[derive(Debug, Clone, Deserialize)]
pub struct FnParams {
    /// Deployed contract address, previously registered by `deploy_contract`.
    pub contract_address: Address,
    /// Method name.
    pub method: String,
    /// Typed arguments.
    #[serde(default)]
    pub args: Vec<AbiArg>,
    /// Gas price multiplier, default 1.
    #[serde(default = "default_multiplier")]
    pub gas_price_multiplier: u64,
    /// Optional access list; switches the envelope type.
    #[serde(default)]
    pub access_list: Vec<AccessListEntry>,
    /// Shifts the nonce upward, deliberately leaving a visible gap.
    #[serde(default)]
    pub nonce_offset: u64,
}

fn default_multiplier() -> u64 {
    1
}

/// Per-endpoint submission report.
#[derive(Debug, Clone, Serialize)]
pub struct TxSubmission {
    /// Hash of the last successfully submitted payload.
    pub tx_hash: B256,
    /// How many payloads of the batch this endpoint accepted.
    pub submitted: u64,
    /// How many payloads of the batch this endpoint rejected.
    pub rejected: u64,
    /// First rejection message, kept so a degraded batch is
    /// distinguishable from a clean one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
    /// Final state of the last payload.
    pub state: TxState,
}

/// Per-endpoint deployment report.
#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    /// Deployment transaction hash.
    pub transaction_hash: B256,
    /// Address of the created contract.
    pub contract_address: Address,
    /// Wallet that signed the deployment.
    pub owner: Address,
}

/// Shared wallet handle returned to the harness.
#[derive(Debug, Clone, Serialize)]
pub struct SharedWalletHandle {
    /// Endpoint identifier the handle is valid against.
    pub uid: String,
    /// Wallet address.
    pub address: Address,
}

#[derive(Debug, Clone, Copy)]
enum TransferKind {
    Plain,
    Erc20,
    Erc721,
}

/// Nodes answer "already known" when a payload reaches them twice (their
/// mempools gossip); that counts as an accepted submission.
fn is_benign_duplicate(msg: &str) -> bool {
    msg.contains("already known") || msg.contains("ALREADY_EXISTS")
}

impl TestUnit {
    /// Sends `tx_count` plain value transfers from one leased wallet.
    pub async fn send_transaction(&self, opts: &TxOptions) -> EndpointResults<TxSubmission> {
        self.send_transfers(opts, TransferKind::Plain).await
    }

    /// Sends `tx_count` ERC-20 transfers against the configured token.
    pub async fn send_erc20_transaction(&self, opts: &TxOptions) -> EndpointResults<TxSubmission> {
        self.send_transfers(opts, TransferKind::Erc20).await
    }

    /// Sends `tx_count` ERC-721 transfers against the configured collection.
    pub async fn send_erc721_transaction(&self, opts: &TxOptions) -> EndpointResults<TxSubmission> {
        self.send_transfers(opts, TransferKind::Erc721).await
    }

    async fn send_transfers(
        &self,
        opts: &TxOptions,
        kind: TransferKind,
    ) -> EndpointResults<TxSubmission> {
        let built = match self.build_transfers(opts, kind).await {
            Ok(b) => b,
            Err(e) => return self.pool().fail_all(&e),
        };
        self.broadcast(built, opts.confirmation_delay).await
    }

    /// Deploys a contract from on-disk ABI + bytecode and registers its ABI
    /// for later `tx_contract` / `call_contract` invocations.
    pub async fn deploy_contract(&self, params: &DeployParams) -> EndpointResults<DeployOutcome> {
        let (built, abi) = match self.build_deploy(params).await {
            Ok(b) => b,
            Err(e) => return self.pool().fail_all(&e),
        };

        let results = self
            .pool()
            .for_each(|ep| {
                let built = built.clone();
                async move {
                    let started = Instant::now();
                    match ep
                        .bounded("deploy", ep.provider().send_raw_transaction(&built.raw))
                        .await
                    {
                        Ok(_) => {}
                        Err(e) if is_benign_duplicate(&e.to_string()) => {}
                        Err(e) => {
                            engine_metrics().txs_failed.increment(1);
                            return Err(EngineError::submission(format!("deploy rejected: {e}")));
                        }
                    }
                    let receipt =
                        ep.await_receipt(built.hash, DEPLOY_TIMEOUT, CONFIRMATION_POLL).await?;
                    let contract_address = receipt.contract_address.ok_or_else(|| {
                        EngineError::submission("no contract address in deploy receipt")
                    })?;
                    engine_metrics().txs_submitted.increment(1);
                    engine_metrics()
                        .request_duration_ms
                        .record(started.elapsed().as_millis() as f64);
                    Ok(DeployOutcome {
                        transaction_hash: built.hash,
                        contract_address,
                        owner: built.from,
                    })
                }
            })
            .await;

        // Same payload on every endpoint of one chain: any success pins the
        // contract address, so the ABI registration is shared.
        if let Some(outcome) = results.values().find_map(|r| r.data.as_ref()) {
            self.register_contract(outcome.contract_address, (*abi).clone());
            debug!(contract = %outcome.contract_address, "registered deployed contract");
        }
        results
    }

    /// State-mutating contract invocation; consumes a nonce and returns the
    /// transaction hash per endpoint.
    pub async fn tx_contract(&self, params: &FnParams) -> EndpointResults<TxSubmission> {
        let built = match self.build_invoke(params).await {
            Ok(b) => b,
            Err(e) => return self.pool().fail_all(&e),
        };
        self.broadcast(vec![built], 0).await
    }

    /// Read-only contract invocation: executed as a call against current
    /// state, no nonce consumed, no signature required.
    pub async fn call_contract(&self, params: &FnParams) -> EndpointResults<Vec<Value>> {
        let (func, calldata) = match self.prepare_call(params) {
            Ok(p) => p,
            Err(e) => return self.pool().fail_all(&e),
        };

        let to = params.contract_address;
        self.pool()
            .for_each(|ep| {
                let calldata = calldata.clone();
                let func = func.clone();
                async move {
                    let req = TransactionRequest::default().with_to(to).with_input(calldata);
                    let started = Instant::now();
                    let ret = ep
                        .bounded("call", async { ep.provider().call(req).await })
                        .await?;
                    engine_metrics()
                        .request_duration_ms
                        .record(started.elapsed().as_millis() as f64);
                    abi::decode_output(&func, &ret)
                }
            })
            .await
    }

    /// Raw JSON-RPC pass-through for protocol-level testing.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> EndpointResults<Value> {
        self.pool()
            .for_each(|ep| {
                let method = method.to_string();
                let params = params.clone();
                async move { ep.raw_call(&method, params).await }
            })
            .await
    }

    /// Chain id as reported by each endpoint.
    pub async fn chain_ids(&self) -> EndpointResults<u64> {
        self.pool()
            .for_each(|ep| async move {
                ep.bounded("chainId", async { ep.provider().get_chain_id().await }).await
            })
            .await
    }

    /// Hands out a shared wallet lease, reported per endpoint.
    pub async fn shared_wallet(&self) -> EndpointResults<SharedWalletHandle> {
        let wallet = match self.request_shared_wallet() {
            Ok(w) => w,
            Err(e) => return self.pool().fail_all(&e),
        };
        let address = wallet.address();
        self.pool()
            .for_each(|ep| async move {
                Ok(SharedWalletHandle { uid: ep.id().to_string(), address })
            })
            .await
    }

    /// Builds and signs the whole batch up front, consuming nonces in order.
    /// Every payload targets a freshly drawn recipient.
    async fn build_transfers(&self, opts: &TxOptions, kind: TransferKind) -> Result<Vec<BuiltTx>> {
        opts.validate()?;
        let wallet = self.wallet_for(&opts.wallets)?;
        let quote = self.gas_quote().await?;
        let count = opts.tx_count.max(1);

        let mut built = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let target = self.targets().random()?;
            let nonce = wallet.next_nonce(opts.nonce_offset);
            let plan = match kind {
                TransferKind::Plain => TxPlan::transfer(target, U256::from(1)),
                TransferKind::Erc20 => {
                    let token = self
                        .erc20()
                        .ok_or_else(|| EngineError::build("erc20 contract is not configured"))?;
                    TxPlan::erc20_transfer(token, target, U256::from(1))
                }
                TransferKind::Erc721 => {
                    let collection = self
                        .erc721()
                        .ok_or_else(|| EngineError::build("erc721 contract is not configured"))?;
                    // Nonce doubles as the token id so each payload moves a
                    // distinct token.
                    TxPlan::erc721_transfer(collection, wallet.address(), target, U256::from(nonce))
                }
            }
            .with_gas_price_multiplier(opts.gas_price_multiplier);
            built.push(build_signed(wallet.signer(), self.chain_id(), nonce, &plan, &quote)?);
        }
        Ok(built)
    }

    async fn build_invoke(&self, params: &FnParams) -> Result<BuiltTx> {
        let abi = self.contract_abi(params.contract_address)?;
        let calldata = abi::encode_call(&abi, &params.method, &params.args)?;
        let mut plan = TxPlan::invoke(params.contract_address, calldata.into())
            .with_gas_price_multiplier(params.gas_price_multiplier);
        if !params.access_list.is_empty() {
            plan = plan.with_access_list(abi::to_access_list(&params.access_list));
        }

        let wallet = self.wallet_for(&[])?;
        let quote = self.gas_quote().await?;
        let nonce = wallet.next_nonce(params.nonce_offset);
        build_signed(wallet.signer(), self.chain_id(), nonce, &plan, &quote)
    }

    async fn build_deploy(&self, params: &DeployParams) -> Result<(BuiltTx, Arc<JsonAbi>)> {
        let abi_raw = std::fs::read_to_string(&params.abi_path).map_err(|e| {
            EngineError::build(format!("failed to read {}: {e}", params.abi_path.display()))
        })?;
        let bin_raw = std::fs::read_to_string(&params.bin_path).map_err(|e| {
            EngineError::build(format!("failed to read {}: {e}", params.bin_path.display()))
        })?;
        let abi = abi::parse_abi(&abi_raw)?;
        let bytecode = hex::decode(bin_raw.trim().trim_start_matches("0x"))
            .map_err(|e| EngineError::build(format!("invalid bytecode hex: {e}")))?;
        let code = abi::encode_deploy(&abi, &bytecode, &params.args)?;

        let wallet = self.testers().lease()?;
        let quote = self.gas_quote().await?;
        let nonce = wallet.next_nonce(0);
        let plan = TxPlan::deploy(code.into(), params.gas_limit)
            .with_gas_price_multiplier(params.gas_price_multiplier);
        let built = build_signed(wallet.signer(), self.chain_id(), nonce, &plan, &quote)?;
        Ok((built, Arc::new(abi)))
    }

    fn prepare_call(&self, params: &FnParams) -> Result<(alloy_json_abi::Function, Bytes)> {
        let abi = self.contract_abi(params.contract_address)?;
        let values = abi::parse_args(&params.args)?;
        let func = abi::resolve_function(&abi, &params.method, values.len())?.clone();
        if !abi::is_read_only(&func) {
            return Err(EngineError::build(format!(
                "{} is state-mutating, use tx_contract",
                params.method
            )));
        }
        let calldata = func
            .abi_encode_input(&values)
            .map_err(|e| EngineError::build(format!("failed to encode {}: {e}", params.method)))?;
        Ok((func, Bytes::from(calldata)))
    }

    /// Broadcasts an already-signed batch to every endpoint concurrently.
    /// Endpoints fail independently; a batch with at least one accepted
    /// payload reports the last accepted hash.
    async fn broadcast(
        &self,
        built: Vec<BuiltTx>,
        confirmation_delay: u64,
    ) -> EndpointResults<TxSubmission> {
        self.pool()
            .for_each(|ep| {
                let built = built.clone();
                async move {
                    let mut submitted = 0u64;
                    let mut rejected = 0u64;
                    let mut last_hash = None;
                    let mut first_err: Option<EngineError> = None;

                    for tx in &built {
                        let started = Instant::now();
                        match ep
                            .bounded(
                                "sendRawTransaction",
                                ep.provider().send_raw_transaction(&tx.raw),
                            )
                            .await
                        {
                            Ok(_) => {}
                            Err(e) if is_benign_duplicate(&e.to_string()) => {
                                debug!(endpoint = %ep.id(), hash = %tx.hash, "payload already known");
                            }
                            Err(e) => {
                                engine_metrics().txs_failed.increment(1);
                                warn!(
                                    endpoint = %ep.id(),
                                    nonce = tx.nonce,
                                    error = %e,
                                    "node rejected transaction"
                                );
                                rejected += 1;
                                if first_err.is_none() {
                                    first_err = Some(e);
                                }
                                continue;
                            }
                        }
                        engine_metrics().txs_submitted.increment(1);
                        engine_metrics()
                            .request_duration_ms
                            .record(started.elapsed().as_millis() as f64);
                        submitted += 1;
                        last_hash = Some(tx.hash);
                    }

                    let Some(tx_hash) = last_hash else {
                        return Err(first_err.unwrap_or_else(|| {
                            EngineError::submission("failed to send any transaction")
                        }));
                    };

                    let state = if confirmation_delay > 0 {
                        let bound = Duration::from_secs(confirmation_delay);
                        match ep.await_receipt(tx_hash, bound, CONFIRMATION_POLL).await {
                            Ok(_) => {
                                engine_metrics().txs_confirmed.increment(1);
                                TxState::Confirmed
                            }
                            Err(_) => {
                                engine_metrics().txs_timed_out.increment(1);
                                TxState::TimedOut
                            }
                        }
                    } else {
                        TxState::Sent
                    };

                    Ok(TxSubmission {
                        tx_hash,
                        submitted,
                        rejected,
                        first_error: first_err.map(|e| e.to_string()),
                        state,
                    })
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_single_payload() {
        let opts = TxOptions::default();
        assert_eq!(opts.tx_count, 1);
        assert_eq!(opts.gas_price_multiplier, 1);
        assert_eq!(opts.confirmation_delay, 0);
    }

    #[test]
    fn offset_with_confirmation_is_rejected() {
        let opts = TxOptions { nonce_offset: 3, confirmation_delay: 5, ..TxOptions::default() };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: TxOptions = serde_json::from_str(r#"{"tx_count": 4}"#).unwrap();
        assert_eq!(opts.tx_count, 4);
        assert_eq!(opts.nonce_offset, 0);
        assert!(opts.wallets.is_empty());
    }

    #[test]
    fn fn_params_deserialize_with_access_list() {
        let raw = r#"{
            "contract_address": "0x00000000000000000000000000000000000000aa",
            "method": "store",
            "args": [{"type": "uint256", "value": "7"}],
            "access_list": [{
                "address": "0x00000000000000000000000000000000000000aa",
                "storage_keys": ["0x0000000000000000000000000000000000000000000000000000000000000001"]
            }]
        }"#;
        let params: FnParams = serde_json::from_str(raw).unwrap();
        assert_eq!(params.method, "store");
        assert_eq!(params.access_list.len(), 1);
        assert_eq!(params.gas_price_multiplier, 1);
    }

    #[test]
    fn duplicate_detection_matches_node_phrasing() {
        assert!(is_benign_duplicate("submission error: already known"));
        assert!(!is_benign_duplicate("nonce too low"));
    }

    #[test]
    fn submission_report_keeps_rejection_detail() {
        let degraded = TxSubmission {
            tx_hash: B256::repeat_byte(1),
            submitted: 3,
            rejected: 2,
            first_error: Some("submission error: nonce too low".to_string()),
            state: TxState::Sent,
        };
        let json = serde_json::to_value(&degraded).unwrap();
        assert_eq!(json["submitted"], 3);
        assert_eq!(json["rejected"], 2);
        assert_eq!(json["first_error"], "submission error: nonce too low");
        assert_eq!(json["state"], "sent");

        // A clean batch carries no error field at all.
        let clean = TxSubmission {
            tx_hash: B256::repeat_byte(1),
            submitted: 3,
            rejected: 0,
            first_error: None,
            state: TxState::Confirmed,
        };
        let json = serde_json::to_value(&clean).unwrap();
        assert!(json.get("first_error").is_none());
        assert_eq!(json["state"], "confirmed");
    }

    #[test]
    fn tx_states_are_the_observable_outcomes() {
        for (state, wire) in [
            (TxState::Sent, "\"sent\""),
            (TxState::Confirmed, "\"confirmed\""),
            (TxState::TimedOut, "\"timed_out\""),
        ] {
            assert_eq!(serde_json::to_string(&state).unwrap(), wire);
        }
    }
}
