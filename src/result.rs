//! Per-endpoint result mapping returned by every fan-out operation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::EngineError;

/// Identifier of one configured endpoint (its sanitized URL).
pub type EndpointId = String;

/// Outcome of one operation against one endpoint.
///
/// Exactly one of `data` / `err` is set. Mirrors the shape the harness
/// asserts on: `{ data: ..., err: ... }`.
#[derive(Debug, Clone, Serialize)]
pub struct CallOutcome<T> {
    /// Successful payload, absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl<T> CallOutcome<T> {
    /// Successful outcome.
    pub fn ok(data: T) -> Self {
        Self { data: Some(data), err: None }
    }

    /// Failed outcome.
    pub fn fail(err: &EngineError) -> Self {
        Self { data: None, err: Some(err.to_string()) }
    }

    /// True when the outcome carries data.
    pub fn is_ok(&self) -> bool {
        self.data.is_some()
    }
}

impl<T> From<crate::error::Result<T>> for CallOutcome<T> {
    fn from(res: crate::error::Result<T>) -> Self {
        match res {
            Ok(data) => Self::ok(data),
            Err(err) => Self::fail(&err),
        }
    }
}

/// Endpoint-keyed result mapping. Always has exactly one entry per endpoint
/// configured for the unit, even on partial failure.
pub type EndpointResults<T> = BTreeMap<EndpointId, CallOutcome<T>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_is_exclusive() {
        let ok = CallOutcome::ok(42u64);
        assert!(ok.is_ok());
        assert!(ok.err.is_none());

        let err = CallOutcome::<u64>::fail(&EngineError::build("bad abi"));
        assert!(!err.is_ok());
        assert_eq!(err.err.as_deref(), Some("build error: bad abi"));
    }

    #[test]
    fn outcome_serializes_without_empty_fields() {
        let ok = CallOutcome::ok("0xabc");
        let json = serde_json::to_string(&ok).unwrap();
        assert_eq!(json, r#"{"data":"0xabc"}"#);
    }
}
