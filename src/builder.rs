//! Pure transaction construction: no I/O, nonce already reserved by the
//! caller.

use alloy_consensus::{SignableTransaction, TxEip1559, TxEip2930, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_eips::eip2930::AccessList;
use alloy_primitives::{Address, Bytes, B256, TxKind, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;

use crate::error::{EngineError, Result};

/// Gas limit for a plain value transfer.
pub const TRANSFER_GAS: u64 = 21_000;
/// Gas limit for an ERC-20 transfer.
pub const ERC20_TRANSFER_GAS: u64 = 100_000;
/// Gas limit for an ERC-721 transfer.
pub const ERC721_TRANSFER_GAS: u64 = 200_000;
/// Gas limit for an arbitrary contract invocation.
pub const CONTRACT_CALL_GAS: u64 = 1_000_000;

alloy_sol_macro::sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
    }

    interface IERC721 {
        function transferFrom(address from, address to, uint256 tokenId) external;
    }
}

/// Gas pricing observed on the unit's primary endpoint at build time.
#[derive(Debug, Clone, Copy)]
pub struct GasQuote {
    /// True when the chain has no base fee (legacy pricing).
    pub legacy: bool,
    /// Suggested legacy gas price in wei.
    pub gas_price: u128,
    /// Suggested priority fee in wei.
    pub tip: u128,
    /// Latest base fee in wei.
    pub base_fee: u128,
}

impl GasQuote {
    /// Legacy price scaled by the caller's multiplier.
    pub fn legacy_price(&self, multiplier: u64) -> u128 {
        self.gas_price * multiplier as u128
    }

    /// EIP-1559 `(max_fee, max_priority_fee)` pair scaled by the caller's
    /// multiplier; fee cap leaves headroom of twice the base fee.
    pub fn eip1559_fees(&self, multiplier: u64) -> (u128, u128) {
        let tip = self.tip * multiplier as u128;
        (tip + self.base_fee * 2, tip)
    }
}

/// What to build: every variant resolves to calldata plus a target.
#[derive(Debug, Clone)]
pub struct TxPlan {
    /// Call target, or `None` for contract creation.
    pub to: Option<Address>,
    /// Transferred value in wei.
    pub value: U256,
    /// Calldata or deployment code.
    pub input: Bytes,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas price multiplier, default 1.
    pub gas_price_multiplier: u64,
    /// Optional EIP-2930 access list.
    pub access_list: Option<AccessList>,
}

impl TxPlan {
    /// Plain value transfer.
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to: Some(to),
            value,
            input: Bytes::new(),
            gas_limit: TRANSFER_GAS,
            gas_price_multiplier: 1,
            access_list: None,
        }
    }

    /// ERC-20 `transfer(to, amount)` against the given token contract.
    pub fn erc20_transfer(token: Address, to: Address, amount: U256) -> Self {
        let input = IERC20::transferCall { to, amount }.abi_encode();
        Self {
            to: Some(token),
            value: U256::ZERO,
            input: input.into(),
            gas_limit: ERC20_TRANSFER_GAS,
            gas_price_multiplier: 1,
            access_list: None,
        }
    }

    /// ERC-721 `transferFrom(from, to, tokenId)` against the collection.
    pub fn erc721_transfer(collection: Address, from: Address, to: Address, token_id: U256) -> Self {
        let input = IERC721::transferFromCall { from, to, tokenId: token_id }.abi_encode();
        Self {
            to: Some(collection),
            value: U256::ZERO,
            input: input.into(),
            gas_limit: ERC721_TRANSFER_GAS,
            gas_price_multiplier: 1,
            access_list: None,
        }
    }

    /// Contract deployment from prepared deploy code.
    pub fn deploy(code: Bytes, gas_limit: u64) -> Self {
        Self {
            to: None,
            value: U256::ZERO,
            input: code,
            gas_limit,
            gas_price_multiplier: 1,
            access_list: None,
        }
    }

    /// Contract method invocation from prepared calldata.
    pub fn invoke(contract: Address, calldata: Bytes) -> Self {
        Self {
            to: Some(contract),
            value: U256::ZERO,
            input: calldata,
            gas_limit: CONTRACT_CALL_GAS,
            gas_price_multiplier: 1,
            access_list: None,
        }
    }

    /// Sets the gas price multiplier.
    pub fn with_gas_price_multiplier(mut self, multiplier: u64) -> Self {
        self.gas_price_multiplier = multiplier.max(1);
        self
    }

    /// Attaches an access list, switching the envelope type.
    pub fn with_access_list(mut self, list: AccessList) -> Self {
        self.access_list = Some(list);
        self
    }
}

/// A signed payload ready for broadcast. Producing one has consumed the
/// wallet nonce it carries; that is irreversible by design.
#[derive(Debug, Clone)]
pub struct BuiltTx {
    /// Transaction hash.
    pub hash: B256,
    /// EIP-2718 encoded raw transaction.
    pub raw: Bytes,
    /// The nonce consumed by this payload.
    pub nonce: u64,
    /// Sender address.
    pub from: Address,
}

/// Builds and signs one payload.
///
/// Envelope selection: an access list always produces the EIP-2930 envelope
/// so with/without-list submissions diverge exactly at envelope type (the
/// harness measures the gas delta between the two). Otherwise base-fee
/// chains get EIP-1559 and legacy chains get an EIP-155 legacy envelope.
pub fn build_signed(
    signer: &PrivateKeySigner,
    chain_id: u64,
    nonce: u64,
    plan: &TxPlan,
    gas: &GasQuote,
) -> Result<BuiltTx> {
    let to = match plan.to {
        Some(addr) => TxKind::Call(addr),
        None => TxKind::Create,
    };
    let multiplier = plan.gas_price_multiplier.max(1);

    let envelope: TxEnvelope = if let Some(list) = &plan.access_list {
        let gas_price =
            if gas.legacy { gas.legacy_price(multiplier) } else { gas.eip1559_fees(multiplier).0 };
        let tx = TxEip2930 {
            chain_id,
            nonce,
            gas_price,
            gas_limit: plan.gas_limit,
            to,
            value: plan.value,
            access_list: list.clone(),
            input: plan.input.clone(),
        };
        let sig = signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| EngineError::build(format!("signing failed: {e}")))?;
        tx.into_signed(sig).into()
    } else if gas.legacy {
        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price: gas.legacy_price(multiplier),
            gas_limit: plan.gas_limit,
            to,
            value: plan.value,
            input: plan.input.clone(),
        };
        let sig = signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| EngineError::build(format!("signing failed: {e}")))?;
        tx.into_signed(sig).into()
    } else {
        let (max_fee, tip) = gas.eip1559_fees(multiplier);
        let tx = TxEip1559 {
            chain_id,
            nonce,
            gas_limit: plan.gas_limit,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: tip,
            to,
            value: plan.value,
            access_list: AccessList::default(),
            input: plan.input.clone(),
        };
        let sig = signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| EngineError::build(format!("signing failed: {e}")))?;
        tx.into_signed(sig).into()
    };

    Ok(BuiltTx {
        hash: *envelope.tx_hash(),
        raw: envelope.encoded_2718().into(),
        nonce,
        from: signer.address(),
    })
}
