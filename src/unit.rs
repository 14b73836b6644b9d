//! Test unit: one wallet ledger plus one endpoint pool under a caller uid.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use alloy_consensus::BlockHeader;
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use rand::Rng;
use tracing::info;

use crate::builder::{build_signed, GasQuote, TxPlan};
use crate::config::UnitConfig;
use crate::endpoint::EndpointPool;
use crate::error::{EngineError, Result};
use crate::telemetry::BlockWatch;
use crate::wallet::{Wallet, WalletLedger};

/// How long wallet funding may take before setup fails.
const FUNDING_TIMEOUT: Duration = Duration::from_secs(120);
const FUNDING_POLL: Duration = Duration::from_millis(500);

/// Transfer recipients, configured and/or generated.
#[derive(Debug, Default)]
pub struct TargetPool {
    list: Vec<Address>,
}

impl TargetPool {
    fn new(configured: &[Address], generate: u64) -> Self {
        let mut list = configured.to_vec();
        for _ in 0..generate {
            list.push(Wallet::generate().address());
        }
        Self { list }
    }

    /// A random recipient, spreading load across account slots.
    pub fn random(&self) -> Result<Address> {
        if self.list.is_empty() {
            return Err(EngineError::config("no target addresses configured"));
        }
        let idx = rand::rng().random_range(0..self.list.len());
        Ok(self.list[idx])
    }

    /// Number of recipients.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// True when no recipients are configured.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

/// One logical test unit. Created once per uid and reused by all subsequent
/// operations; lives for the process lifetime.
#[derive(Debug)]
pub struct TestUnit {
    uid: String,
    chain_id: u64,
    pool: EndpointPool,
    testers: WalletLedger,
    sponsors: WalletLedger,
    targets: TargetPool,
    contracts: RwLock<HashMap<Address, Arc<JsonAbi>>>,
    shared: Mutex<HashSet<Address>>,
    blocks: BlockWatch,
    erc20: Option<Address>,
    erc721: Option<Address>,
    min_gas_price: u128,
}

impl TestUnit {
    /// Connects every endpoint, provisions and funds the wallet ledger, and
    /// returns the ready unit. Any failure here is fatal for setup.
    pub async fn create(cfg: &UnitConfig, uid: &str) -> Result<Self> {
        cfg.validate()?;

        let pool = EndpointPool::connect(cfg).await?;
        let chain_id = pool.chain_id();

        let sponsors = WalletLedger::from_private_keys(&cfg.private_keys)?;
        sponsors.sync_nonces(pool.primary().provider()).await?;

        let mut testers = WalletLedger::from_private_keys(&cfg.wallets)?;
        testers.sync_nonces(pool.primary().provider()).await?;
        let loaded = testers.len();
        testers.generate(cfg.num_wallets);

        let unit = Self {
            uid: uid.to_string(),
            chain_id,
            pool,
            testers,
            sponsors,
            targets: TargetPool::new(&cfg.target_addresses, cfg.num_target_addresses),
            contracts: RwLock::new(HashMap::new()),
            shared: Mutex::new(HashSet::new()),
            blocks: BlockWatch::default(),
            erc20: cfg.erc20_address,
            erc721: cfg.erc721_address,
            min_gas_price: cfg.min_gas_price,
        };

        unit.fund_generated_wallets(loaded, cfg.fund_amount).await?;

        info!(
            uid,
            chain_id,
            endpoints = unit.pool.len(),
            wallets = unit.testers.len(),
            targets = unit.targets.len(),
            "test unit ready"
        );
        Ok(unit)
    }

    /// Funds every generated tester wallet from the sponsor pool with plain
    /// value transfers, then waits for the last transfer to mine.
    async fn fund_generated_wallets(&self, skip: usize, amount: U256) -> Result<()> {
        let generated = &self.testers.all()[skip..];
        if generated.is_empty() {
            return Ok(());
        }
        if amount.is_zero() {
            return Err(EngineError::config("fund_amount must be positive"));
        }

        let primary = self.pool.primary();
        let quote = self.gas_quote().await?;
        let mut last_hash = None;

        for wallet in generated {
            let sponsor = self.sponsors.lease()?;
            let nonce = sponsor.next_nonce(0);
            let plan = TxPlan::transfer(wallet.address(), amount);
            let built = build_signed(sponsor.signer(), self.chain_id, nonce, &plan, &quote)?;
            primary
                .bounded("fund transfer", primary.provider().send_raw_transaction(&built.raw))
                .await?;
            last_hash = Some(built.hash);
        }

        if let Some(hash) = last_hash {
            primary
                .await_receipt(hash, FUNDING_TIMEOUT, FUNDING_POLL)
                .await
                .map_err(|e| EngineError::connection(format!("wallet funding not mined: {e}")))?;
            info!(uid = %self.uid, wallets = generated.len(), %amount, "funded wallets");
        }
        Ok(())
    }

    /// Current gas pricing from the primary endpoint, floored at the
    /// configured minimum.
    pub async fn gas_quote(&self) -> Result<GasQuote> {
        let ep = self.pool.primary();
        if ep.is_legacy() {
            let gas_price =
                ep.bounded("gasPrice", async { ep.provider().get_gas_price().await }).await?;
            Ok(GasQuote {
                legacy: true,
                gas_price: gas_price.max(self.min_gas_price),
                tip: 0,
                base_fee: 0,
            })
        } else {
            let tip = ep
                .bounded("maxPriorityFeePerGas", async {
                    ep.provider().get_max_priority_fee_per_gas().await
                })
                .await?;
            let head = ep
                .bounded("latest header", async {
                    ep.provider()
                        .get_block_by_number(alloy_eips::BlockNumberOrTag::Latest)
                        .await
                })
                .await?
                .ok_or_else(|| EngineError::connection("no latest block"))?;
            Ok(GasQuote {
                legacy: false,
                gas_price: 0,
                tip: tip.max(self.min_gas_price),
                base_fee: head.header.base_fee_per_gas().unwrap_or_default() as u128,
            })
        }
    }

    /// Leases a wallet from the shared pool. Leases are advisory: the wallet
    /// stays in the ledger and nonce issuance remains the only serialization
    /// point. A wallet already handed out is not handed out again, so two
    /// scenarios never accidentally pin the same address.
    pub fn request_shared_wallet(&self) -> Result<Arc<Wallet>> {
        let mut shared = self.shared.lock().expect("shared wallet lock poisoned");
        for _ in 0..self.testers.len().max(1) {
            let wallet = self.testers.lease()?;
            if shared.insert(wallet.address()) {
                return Ok(wallet);
            }
        }
        Err(EngineError::config("all wallets are already shared"))
    }

    /// Releases a shared wallet lease. Unknown addresses are ignored.
    pub fn release_shared_wallet(&self, address: Address) {
        self.shared.lock().expect("shared wallet lock poisoned").remove(&address);
    }

    /// Resolves the first pinned address that is a shared wallet of this
    /// unit, falling back to a round-robin lease.
    pub fn wallet_for(&self, pinned: &[Address]) -> Result<Arc<Wallet>> {
        let shared = self.shared.lock().expect("shared wallet lock poisoned");
        for addr in pinned {
            if shared.contains(addr) {
                if let Some(w) = self.testers.get(*addr) {
                    return Ok(w);
                }
            }
        }
        drop(shared);
        self.testers.lease()
    }

    /// Records a deployed contract's ABI for later invocation by name.
    pub fn register_contract(&self, address: Address, abi: JsonAbi) {
        self.contracts
            .write()
            .expect("contract table lock poisoned")
            .insert(address, Arc::new(abi));
    }

    /// Looks up a deployed contract's ABI.
    pub fn contract_abi(&self, address: Address) -> Result<Arc<JsonAbi>> {
        self.contracts
            .read()
            .expect("contract table lock poisoned")
            .get(&address)
            .cloned()
            .ok_or_else(|| EngineError::build(format!("contract not found: {address}")))
    }

    /// The unit identifier.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The unit chain id.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The endpoint pool.
    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    /// The tester wallet ledger.
    pub fn testers(&self) -> &WalletLedger {
        &self.testers
    }

    /// The transfer recipient pool.
    pub fn targets(&self) -> &TargetPool {
        &self.targets
    }

    /// Per-endpoint block observation state.
    pub(crate) fn blocks(&self) -> &BlockWatch {
        &self.blocks
    }

    /// Configured ERC-20 token contract, if any.
    pub fn erc20(&self) -> Option<Address> {
        self.erc20
    }

    /// Configured ERC-721 collection contract, if any.
    pub fn erc721(&self) -> Option<Address> {
        self.erc721
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_pool_mixes_configured_and_generated() {
        let configured = vec![Address::repeat_byte(0xaa)];
        let pool = TargetPool::new(&configured, 3);
        assert_eq!(pool.len(), 4);
        for _ in 0..16 {
            pool.random().unwrap();
        }
    }

    #[test]
    fn empty_target_pool_errors() {
        let pool = TargetPool::new(&[], 0);
        assert!(pool.random().is_err());
    }
}
