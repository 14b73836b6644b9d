//! Wallet ledger: funded accounts and their nonce counters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy_network::Ethereum;
use alloy_primitives::Address;
use alloy_provider::{Provider, RootProvider};
use alloy_signer_local::PrivateKeySigner;

use crate::error::{EngineError, Result};

/// Per-wallet nonce counters.
///
/// `next` is the next plain nonce; `offset_next` tracks the offset stream
/// used when a caller requests deliberately gapped nonces. Both only ever
/// move forward.
#[derive(Debug, Default)]
struct NonceSlot {
    next: u64,
    offset_next: u64,
}

/// One funded account: address, signing key, and nonce state.
///
/// The nonce mutex is the single serialization point that keeps concurrent
/// builders from ever observing a duplicate or out-of-order nonce.
#[derive(Debug)]
pub struct Wallet {
    address: Address,
    signer: PrivateKeySigner,
    nonce: Mutex<NonceSlot>,
}

impl Wallet {
    /// Creates a wallet with a freshly generated key.
    pub fn generate() -> Self {
        let signer = PrivateKeySigner::random();
        Self { address: signer.address(), signer, nonce: Mutex::new(NonceSlot::default()) }
    }

    /// Creates a wallet from a hex-encoded private key, `0x` prefix optional.
    pub fn from_private_key(key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| EngineError::config(format!("invalid private key: {e}")))?;
        Ok(Self { address: signer.address(), signer, nonce: Mutex::new(NonceSlot::default()) })
    }

    /// The wallet's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The wallet's signer.
    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Atomically reserves the next nonce.
    ///
    /// With `offset == 0` this yields the strictly increasing, gap-free
    /// sequence. A non-zero `offset` switches to the offset stream: the first
    /// offset request on a fresh stream jumps `offset` ahead of the plain
    /// nonce, subsequent ones continue from there. The plain counter is not
    /// advanced by offset requests, so the gap stays visible to the node.
    pub fn next_nonce(&self, offset: u64) -> u64 {
        let mut slot = self.nonce.lock().expect("wallet nonce lock poisoned");
        let nonce = if offset > 0 {
            if slot.offset_next <= slot.next {
                slot.offset_next = slot.next + offset;
            }
            slot.offset_next
        } else {
            let n = slot.next;
            slot.next += 1;
            n
        };
        slot.offset_next += 1;
        nonce
    }

    /// Overwrites both nonce counters with the chain-observed value.
    /// Setup-time only; racing this against in-flight builds would corrupt
    /// the sequence.
    pub fn reset_nonce(&self, nonce: u64) {
        let mut slot = self.nonce.lock().expect("wallet nonce lock poisoned");
        slot.next = nonce;
        slot.offset_next = nonce;
    }

    /// Current value of the plain nonce counter, for inspection.
    pub fn pending_nonce(&self) -> u64 {
        self.nonce.lock().expect("wallet nonce lock poisoned").next
    }
}

/// The set of wallets owned by one test unit.
///
/// Leasing is round-robin to spread nonce contention across addresses, and
/// never removes a wallet from the pool: a lease is advisory, correctness
/// rests on per-wallet nonce serialization.
#[derive(Debug, Default)]
pub struct WalletLedger {
    wallets: Vec<Arc<Wallet>>,
    cursor: AtomicUsize,
}

impl WalletLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from hex-encoded private keys.
    pub fn from_private_keys(keys: &[String]) -> Result<Self> {
        let wallets = keys
            .iter()
            .map(|k| Wallet::from_private_key(k).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { wallets, cursor: AtomicUsize::new(0) })
    }

    /// Generates and registers `count` fresh wallets.
    pub fn generate(&mut self, count: u64) {
        for _ in 0..count {
            self.wallets.push(Arc::new(Wallet::generate()));
        }
    }

    /// Registers an existing wallet.
    pub fn register(&mut self, wallet: Wallet) {
        self.wallets.push(Arc::new(wallet));
    }

    /// Number of wallets in the ledger.
    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    /// True when the ledger holds no wallets.
    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Leases a wallet round-robin. The wallet stays in the pool and is
    /// immediately leasable again.
    pub fn lease(&self) -> Result<Arc<Wallet>> {
        if self.wallets.is_empty() {
            return Err(EngineError::config("no available wallet"));
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.wallets.len();
        Ok(self.wallets[idx].clone())
    }

    /// Finds a wallet by address.
    pub fn get(&self, address: Address) -> Option<Arc<Wallet>> {
        self.wallets.iter().find(|w| w.address() == address).cloned()
    }

    /// All wallets, in registration order.
    pub fn all(&self) -> &[Arc<Wallet>] {
        &self.wallets
    }

    /// Refreshes every wallet's nonce counters from the chain.
    pub async fn sync_nonces(&self, provider: &RootProvider<Ethereum>) -> Result<()> {
        for wallet in &self.wallets {
            let nonce = provider
                .get_transaction_count(wallet.address())
                .await
                .map_err(|e| {
                    EngineError::connection(format!(
                        "failed to get nonce for {}: {e}",
                        wallet.address()
                    ))
                })?;
            wallet.reset_nonce(nonce);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    #[test]
    fn plain_nonces_are_gap_free() {
        let wallet = Wallet::generate();
        for expected in 0..100 {
            assert_eq!(wallet.next_nonce(0), expected);
        }
    }

    #[test]
    fn concurrent_nonces_never_collide() {
        let wallet = Arc::new(Wallet::generate());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let w = wallet.clone();
            handles.push(thread::spawn(move || {
                (0..250).map(|_| w.next_nonce(0)).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for nonce in handle.join().unwrap() {
                assert!(seen.insert(nonce), "duplicate nonce {nonce}");
            }
        }
        // 8 threads x 250 nonces, gap free.
        assert_eq!(seen.len(), 2000);
        assert_eq!(*seen.iter().max().unwrap(), 1999);
    }

    #[test]
    fn offset_shifts_first_nonce_exactly() {
        let wallet = Wallet::generate();
        assert_eq!(wallet.next_nonce(5), 5);
        assert_eq!(wallet.next_nonce(5), 6);
        assert_eq!(wallet.next_nonce(5), 7);
        // The plain stream was never advanced by offset requests.
        assert_eq!(wallet.next_nonce(0), 0);
    }

    #[test]
    fn reset_nonce_applies_chain_value() {
        let wallet = Wallet::generate();
        wallet.reset_nonce(42);
        assert_eq!(wallet.next_nonce(0), 42);
        assert_eq!(wallet.next_nonce(0), 43);
    }

    #[test]
    fn lease_is_round_robin() {
        let mut ledger = WalletLedger::new();
        ledger.generate(3);
        let first = ledger.lease().unwrap().address();
        let second = ledger.lease().unwrap().address();
        let third = ledger.lease().unwrap().address();
        assert_ne!(first, second);
        assert_ne!(second, third);
        // Cycles back around.
        assert_eq!(ledger.lease().unwrap().address(), first);
    }

    #[test]
    fn lease_on_empty_ledger_fails() {
        let ledger = WalletLedger::new();
        assert!(ledger.lease().is_err());
    }

    #[test]
    fn from_private_key_rejects_garbage() {
        assert!(Wallet::from_private_key("not-a-key").is_err());
    }
}
