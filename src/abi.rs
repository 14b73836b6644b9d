//! Typed `{type, value}` argument codec and ABI helpers.
//!
//! Callers describe contract arguments as `{ type, value }` pairs. The codec
//! is a closed enumeration over supported ABI primitive names; anything else
//! fails fast with a build error before a nonce is consumed.

use alloy_dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_eips::eip2930::{AccessList, AccessListItem};
use alloy_json_abi::{Function, JsonAbi, StateMutability};
use alloy_primitives::{Address, B256, U256};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{EngineError, Result};

/// One caller-supplied contract argument.
#[derive(Debug, Clone, Deserialize)]
pub struct AbiArg {
    /// ABI primitive name: `uint256`/`uint`, `address`, `bool`, `string`.
    #[serde(rename = "type")]
    pub ty: String,
    /// Value in the wire form for that type (uint256 as decimal string,
    /// address as hex string).
    pub value: Value,
}

/// Maps `{type, value}` arguments onto typed ABI values.
pub fn parse_args(args: &[AbiArg]) -> Result<Vec<DynSolValue>> {
    args.iter().map(parse_arg).collect()
}

fn parse_arg(arg: &AbiArg) -> Result<DynSolValue> {
    match arg.ty.to_lowercase().as_str() {
        "uint256" | "uint" => {
            // Accept both decimal strings and plain JSON numbers.
            let raw = match &arg.value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(EngineError::build(format!(
                        "uint256 value must be a decimal string: {other}"
                    )))
                }
            };
            let v = U256::from_str_radix(&raw, 10)
                .map_err(|_| EngineError::build(format!("invalid uint256 value: {raw}")))?;
            Ok(DynSolValue::Uint(v, 256))
        }
        "address" => {
            let raw = arg.value.as_str().ok_or_else(|| {
                EngineError::build(format!("address value must be a string: {}", arg.value))
            })?;
            let addr: Address = raw
                .parse()
                .map_err(|_| EngineError::build(format!("invalid address value: {raw}")))?;
            Ok(DynSolValue::Address(addr))
        }
        "bool" => {
            let v = arg.value.as_bool().ok_or_else(|| {
                EngineError::build(format!("bool value must be a boolean: {}", arg.value))
            })?;
            Ok(DynSolValue::Bool(v))
        }
        "string" => {
            let v = arg.value.as_str().ok_or_else(|| {
                EngineError::build(format!("string value must be a string: {}", arg.value))
            })?;
            Ok(DynSolValue::String(v.to_string()))
        }
        other => Err(EngineError::build(format!("unsupported argument type: {other}"))),
    }
}

/// One caller-supplied access-list entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessListEntry {
    /// Touched contract address.
    pub address: Address,
    /// Storage keys declared for that address.
    #[serde(default)]
    pub storage_keys: Vec<B256>,
}

/// Converts caller entries into the EIP-2930 access list.
pub fn to_access_list(entries: &[AccessListEntry]) -> AccessList {
    AccessList(
        entries
            .iter()
            .map(|e| AccessListItem { address: e.address, storage_keys: e.storage_keys.clone() })
            .collect(),
    )
}

/// Parses a JSON ABI document.
pub fn parse_abi(raw: &str) -> Result<JsonAbi> {
    serde_json::from_str(raw).map_err(|e| EngineError::build(format!("invalid ABI: {e}")))
}

/// Resolves a named function, preferring the overload whose arity matches.
pub fn resolve_function<'a>(abi: &'a JsonAbi, method: &str, arity: usize) -> Result<&'a Function> {
    let overloads = abi
        .function(method)
        .ok_or_else(|| EngineError::build(format!("method not found in ABI: {method}")))?;
    overloads
        .iter()
        .find(|f| f.inputs.len() == arity)
        .or_else(|| overloads.first())
        .ok_or_else(|| EngineError::build(format!("method not found in ABI: {method}")))
}

/// True when the function can be executed as a read-only call.
pub fn is_read_only(func: &Function) -> bool {
    matches!(func.state_mutability, StateMutability::View | StateMutability::Pure)
}

/// Encodes calldata for a named method: selector plus ABI-encoded arguments.
pub fn encode_call(abi: &JsonAbi, method: &str, args: &[AbiArg]) -> Result<Vec<u8>> {
    let values = parse_args(args)?;
    let func = resolve_function(abi, method, values.len())?;
    func.abi_encode_input(&values)
        .map_err(|e| EngineError::build(format!("failed to encode {method}: {e}")))
}

/// Decodes a method's return data into JSON-friendly values.
pub fn decode_output(func: &Function, data: &[u8]) -> Result<Vec<Value>> {
    let values = func
        .abi_decode_output(data)
        .map_err(|e| EngineError::build(format!("failed to decode {} output: {e}", func.name)))?;
    Ok(values.iter().map(dyn_value_to_json).collect())
}

/// Concatenates deployment bytecode with ABI-encoded constructor arguments.
pub fn encode_deploy(abi: &JsonAbi, bytecode: &[u8], args: &[AbiArg]) -> Result<Vec<u8>> {
    let values = parse_args(args)?;
    let mut data = bytecode.to_vec();
    match abi.constructor() {
        Some(ctor) => {
            if ctor.inputs.len() != values.len() {
                return Err(EngineError::build(format!(
                    "constructor expects {} arguments, got {}",
                    ctor.inputs.len(),
                    values.len()
                )));
            }
            let encoded = ctor
                .abi_encode_input(&values)
                .map_err(|e| EngineError::build(format!("failed to encode constructor: {e}")))?;
            data.extend_from_slice(&encoded);
        }
        None if !values.is_empty() => {
            return Err(EngineError::build("ABI has no constructor but arguments were supplied"))
        }
        None => {}
    }
    Ok(data)
}

/// Renders a decoded ABI value as JSON (uints as decimal strings, addresses
/// and byte strings as hex).
pub fn dyn_value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(a) => Value::String(a.to_string()),
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        DynSolValue::FixedBytes(b, len) => Value::String(format!("0x{}", hex::encode(&b[..*len]))),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(dyn_value_to_json).collect())
        }
        other => Value::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn arg(ty: &str, value: Value) -> AbiArg {
        AbiArg { ty: ty.to_string(), value }
    }

    #[test]
    fn parses_supported_primitives() {
        let args = vec![
            arg("uint256", json!("1000000000000000000")),
            arg("address", json!("0x00000000000000000000000000000000000000aa")),
            arg("bool", json!(true)),
            arg("string", json!("hello")),
        ];
        let parsed = parse_args(&args).unwrap();
        assert_eq!(parsed.len(), 4);
        assert!(matches!(parsed[0], DynSolValue::Uint(_, 256)));
        assert!(matches!(parsed[1], DynSolValue::Address(_)));
    }

    #[test]
    fn uint_accepts_json_numbers() {
        let parsed = parse_args(&[arg("uint", json!(7))]).unwrap();
        assert_eq!(parsed[0], DynSolValue::Uint(U256::from(7), 256));
    }

    #[test]
    fn unknown_type_fails_fast() {
        let err = parse_args(&[arg("uint48", json!("1"))]).unwrap_err();
        assert!(matches!(err, EngineError::Build(_)));
        assert!(err.to_string().contains("unsupported argument type"));
    }

    #[test]
    fn malformed_values_fail_fast() {
        assert!(parse_args(&[arg("uint256", json!("0xff"))]).is_err());
        assert!(parse_args(&[arg("address", json!("not-an-address"))]).is_err());
        assert!(parse_args(&[arg("bool", json!("true"))]).is_err());
    }

    const COUNTER_ABI: &str = r#"[
        {"type":"constructor","inputs":[{"name":"start","type":"uint256"}]},
        {"type":"function","name":"increment","stateMutability":"nonpayable",
         "inputs":[{"name":"by","type":"uint256"}],"outputs":[]},
        {"type":"function","name":"current","stateMutability":"view",
         "inputs":[],"outputs":[{"name":"","type":"uint256"}]}
    ]"#;

    #[test]
    fn encodes_method_call_with_selector() {
        let abi = parse_abi(COUNTER_ABI).unwrap();
        let data = encode_call(&abi, "increment", &[arg("uint256", json!("5"))]).unwrap();
        // 4-byte selector plus one 32-byte word.
        assert_eq!(data.len(), 36);
        assert_eq!(U256::from_be_slice(&data[4..]), U256::from(5));
    }

    #[test]
    fn distinguishes_read_only_methods() {
        let abi = parse_abi(COUNTER_ABI).unwrap();
        assert!(is_read_only(resolve_function(&abi, "current", 0).unwrap()));
        assert!(!is_read_only(resolve_function(&abi, "increment", 1).unwrap()));
    }

    #[test]
    fn decodes_view_output() {
        let abi = parse_abi(COUNTER_ABI).unwrap();
        let func = resolve_function(&abi, "current", 0).unwrap();
        let word = U256::from(42).to_be_bytes::<32>();
        let out = decode_output(func, &word).unwrap();
        assert_eq!(out, vec![json!("42")]);
    }

    #[test]
    fn deploy_appends_constructor_args() {
        let abi = parse_abi(COUNTER_ABI).unwrap();
        let bytecode = vec![0x60, 0x80];
        let data = encode_deploy(&abi, &bytecode, &[arg("uint256", json!("9"))]).unwrap();
        assert_eq!(&data[..2], &bytecode[..]);
        assert_eq!(U256::from_be_slice(&data[2..]), U256::from(9));
    }

    #[test]
    fn deploy_arity_mismatch_is_a_build_error() {
        let abi = parse_abi(COUNTER_ABI).unwrap();
        let err = encode_deploy(&abi, &[0u8], &[]).unwrap_err();
        assert!(matches!(err, EngineError::Build(_)));
    }

    #[test]
    fn access_list_conversion_keeps_all_keys() {
        let entries = vec![AccessListEntry {
            address: Address::repeat_byte(0xaa),
            storage_keys: vec![B256::repeat_byte(1), B256::repeat_byte(2)],
        }];
        let list = to_access_list(&entries);
        assert_eq!(list.0.len(), 1);
        assert_eq!(list.0[0].storage_keys.len(), 2);
    }
}
