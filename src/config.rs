//! Unit configuration: endpoint descriptors plus wallet funding parameters.

use std::path::Path;

use alloy_primitives::{Address, U256};
use serde::Deserialize;
use url::Url;

use crate::error::{EngineError, Result};

/// Hard cap on wallets when a token contract is exercised, matching the
/// batch-transfer limits of common token test contracts.
pub const MAX_TOKEN_WALLETS: usize = 1000;

/// Default per-request timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// One RPC target of a unit.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// HTTP(S) URL of the endpoint, credentials allowed in userinfo.
    pub http: String,
}

/// Configuration for one test unit: all of its endpoints front the same
/// logical chain and share one wallet ledger.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct UnitConfig {
    /// RPC targets. At least one; the first is the primary used for gas
    /// quoting and nonce synchronization.
    pub endpoints: Vec<EndpointConfig>,

    /// Expected chain id. Queried from the primary endpoint when absent;
    /// verified against every endpoint at connect time either way.
    #[serde(default)]
    pub chain_id: Option<u64>,

    /// Sponsor private keys used to fund generated wallets.
    #[serde(default)]
    pub private_keys: Vec<String>,

    /// Prefunded tester private keys.
    #[serde(default)]
    pub wallets: Vec<String>,

    /// Number of tester wallets to generate and fund from the sponsors.
    #[serde(default)]
    pub num_wallets: u64,

    /// Amount of wei to fund each generated wallet with.
    #[serde(default)]
    pub fund_amount: U256,

    /// Transfer recipients.
    #[serde(default)]
    pub target_addresses: Vec<Address>,

    /// Number of additional random recipients to generate.
    #[serde(default)]
    pub num_target_addresses: u64,

    /// ERC-20 token contract, required for `send_erc20`.
    #[serde(default)]
    pub erc20_address: Option<Address>,

    /// ERC-721 collection contract, required for `send_erc721`.
    #[serde(default)]
    pub erc721_address: Option<Address>,

    /// Floor gas price / tip in wei when the node suggests zero.
    #[serde(default = "default_min_gas_price")]
    pub min_gas_price: u128,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_min_gas_price() -> u128 {
    1_000_000_000 // 1 gwei
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl UnitConfig {
    /// Reads and validates a unit configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => {}
            other => {
                return Err(EngineError::config(format!(
                    "invalid config file extension: {other:?}"
                )))
            }
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_yaml(&raw)
    }

    /// Parses and validates a unit configuration from a YAML string.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(raw)
            .map_err(|e| EngineError::config(format!("failed to parse config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates cross-field constraints. Failures abort setup.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(EngineError::config("at least one endpoint is required"));
        }
        for ep in &self.endpoints {
            let uri = Url::parse(&ep.http)
                .map_err(|e| EngineError::config(format!("invalid endpoint URL {}: {e}", ep.http)))?;
            if uri.scheme() != "http" && uri.scheme() != "https" {
                return Err(EngineError::config(format!(
                    "invalid endpoint URL scheme: {}",
                    uri.scheme()
                )));
            }
        }

        if self.num_wallets > 0 && self.private_keys.is_empty() {
            return Err(EngineError::config("private_keys is required when num_wallets > 0"));
        }
        if self.num_wallets > 0 && self.fund_amount.is_zero() {
            return Err(EngineError::config("fund_amount must be positive when num_wallets > 0"));
        }

        let num_testers = self.wallets.len() + self.num_wallets as usize;
        if num_testers > 0 && self.target_addresses.is_empty() && self.num_target_addresses == 0 {
            return Err(EngineError::config(
                "target addresses are required when tester wallets are configured",
            ));
        }

        if self.erc20_address.is_some() && num_testers > MAX_TOKEN_WALLETS {
            return Err(EngineError::config(format!(
                "num_wallets must be at most {MAX_TOKEN_WALLETS} when erc20_address is set"
            )));
        }
        if self.erc721_address.is_some() && num_testers > MAX_TOKEN_WALLETS {
            return Err(EngineError::config(format!(
                "num_wallets must be at most {MAX_TOKEN_WALLETS} when erc721_address is set"
            )));
        }

        Ok(())
    }

    /// Request timeout as a [`std::time::Duration`].
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPONSOR_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn base_yaml() -> String {
        format!(
            r#"
endpoints:
  - http: http://127.0.0.1:8545
chain_id: 1337
private_keys: ["{SPONSOR_KEY}"]
num_wallets: 4
fund_amount: "1000000000000000000"
num_target_addresses: 2
"#
        )
    }

    #[test]
    fn parses_valid_config() {
        let cfg = UnitConfig::from_yaml(&base_yaml()).unwrap();
        assert_eq!(cfg.endpoints.len(), 1);
        assert_eq!(cfg.chain_id, Some(1337));
        assert_eq!(cfg.num_wallets, 4);
        assert_eq!(cfg.min_gas_price, 1_000_000_000);
        assert_eq!(cfg.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn rejects_missing_endpoints() {
        let err = UnitConfig::from_yaml("endpoints: []").unwrap_err();
        assert!(err.to_string().contains("at least one endpoint"));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let yaml = r#"
endpoints:
  - http: ws://127.0.0.1:8546
"#;
        let err = UnitConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn rejects_generated_wallets_without_sponsor() {
        let yaml = r#"
endpoints:
  - http: http://127.0.0.1:8545
num_wallets: 10
fund_amount: "1"
num_target_addresses: 1
"#;
        let err = UnitConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("private_keys"));
    }

    #[test]
    fn rejects_zero_fund_amount() {
        let yaml = format!(
            r#"
endpoints:
  - http: http://127.0.0.1:8545
private_keys: ["{SPONSOR_KEY}"]
num_wallets: 10
num_target_addresses: 1
"#
        );
        let err = UnitConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("fund_amount"));
    }

    #[test]
    fn rejects_testers_without_targets() {
        let yaml = format!(
            r#"
endpoints:
  - http: http://127.0.0.1:8545
private_keys: ["{SPONSOR_KEY}"]
num_wallets: 10
fund_amount: "1"
"#
        );
        let err = UnitConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("target addresses"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let yaml = r#"
endpoints:
  - http: http://127.0.0.1:8545
no_such_field: true
"#;
        assert!(UnitConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn from_yaml_file_checks_extension() {
        let err = UnitConfig::from_yaml_file("/tmp/config.json").unwrap_err();
        assert!(err.to_string().contains("extension"));
    }
}
