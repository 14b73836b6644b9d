//! Process-wide unit registry.
//!
//! Harness runtimes re-enter per worker, but endpoint connections and
//! wallet ledgers must be provisioned exactly once per uid. The registry
//! makes unit creation idempotent: the first caller pays for setup, every
//! later caller gets the existing unit.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use tokio::sync::RwLock;
use tracing::info;

use crate::config::UnitConfig;
use crate::error::{EngineError, Result};
use crate::unit::TestUnit;

/// Registry of live test units, keyed by caller uid.
#[derive(Debug, Default)]
pub struct Registry {
    units: RwLock<HashMap<String, Arc<TestUnit>>>,
}

impl Registry {
    /// Returns the unit for `uid`, creating it from `cfg` on first use.
    /// Creation runs under the write lock so concurrent callers with the
    /// same uid never provision twice; lookups after setup only take the
    /// read path.
    pub async fn get_or_create(&self, cfg: &UnitConfig, uid: &str) -> Result<Arc<TestUnit>> {
        if let Some(unit) = self.units.read().await.get(uid) {
            return Ok(unit.clone());
        }
        let mut units = self.units.write().await;
        // Re-check: another caller may have won the race for this uid.
        if let Some(unit) = units.get(uid) {
            return Ok(unit.clone());
        }
        let unit = Arc::new(TestUnit::create(cfg, uid).await?);
        units.insert(uid.to_string(), unit.clone());
        info!(uid, "registered test unit");
        Ok(unit)
    }

    /// Looks up an existing unit.
    pub async fn get(&self, uid: &str) -> Result<Arc<TestUnit>> {
        self.units
            .read()
            .await
            .get(uid)
            .cloned()
            .ok_or_else(|| EngineError::config(format!("no test unit registered for uid {uid}")))
    }

    /// Number of registered units.
    pub async fn len(&self) -> usize {
        self.units.read().await.len()
    }

    /// True when no units are registered.
    pub async fn is_empty(&self) -> bool {
        self.units.read().await.is_empty()
    }
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::default);

/// The process-wide registry.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Loads the YAML config at `config_path` and returns the unit for `uid`,
/// provisioning it on first use. This is the harness entry point.
pub async fn create_shared_unit(config_path: &str, uid: &str) -> Result<Arc<TestUnit>> {
    let cfg = UnitConfig::from_yaml_file(config_path)?;
    registry().get_or_create(&cfg, uid).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_uid_is_a_config_error() {
        let reg = Registry::default();
        let err = reg.get("missing").await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn fresh_registry_is_empty() {
        let reg = Registry::default();
        assert!(reg.is_empty().await);
        assert_eq!(reg.len().await, 0);
    }
}
