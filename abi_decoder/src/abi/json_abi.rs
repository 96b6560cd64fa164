//! Reader for Solidity JSON ABI descriptions.
//!
//! Only the parts the decoder needs are read: function and constructor
//! inputs. Tuple parameters become inline structs; enums and user-defined
//! value types already appear under their underlying elementary type.

use crate::abi::types::{AbiFile, ElementaryKind, FunctionDef, StructField, TypeKind};
use serde_derive::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonAbiEntry {
    #[serde(rename = "type", default = "default_entry_kind")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<JsonAbiParam>,
}

fn default_entry_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonAbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub type_string: String,
    #[serde(default)]
    pub components: Vec<JsonAbiParam>,
}

#[derive(Debug, Error)]
pub enum JsonAbiError {
    #[error("malformed JSON ABI: {0}")]
    Json(#[from] serde_json::Error),
    #[error("parameter '{param}' has unsupported type '{type_string}': {reason}")]
    InvalidTypeString {
        param: String,
        type_string: String,
        reason: String,
    },
}

/// Parses a JSON ABI array into function parameter lists.
pub fn parse_json_abi(source: &str) -> Result<AbiFile, JsonAbiError> {
    let entries: Vec<JsonAbiEntry> = serde_json::from_str(source)?;
    from_entries(&entries)
}

pub fn from_entries(entries: &[JsonAbiEntry]) -> Result<AbiFile, JsonAbiError> {
    let callable: Vec<(String, &JsonAbiEntry)> = entries
        .iter()
        .filter_map(|entry| match entry.kind.as_str() {
            "function" => Some((entry.name.clone(), entry)),
            "constructor" => Some(("constructor".to_string(), entry)),
            _ => None,
        })
        .collect();
    let mut overloads: HashMap<&str, usize> = HashMap::new();
    for (name, _) in &callable {
        *overloads.entry(name.as_str()).or_insert(0) += 1;
    }

    let mut file = AbiFile::default();
    for (name, entry) in &callable {
        let params = params_to_fields(&entry.inputs)?;
        // Every member of an overload set is named by its canonical signature.
        let name = if overloads[name.as_str()] > 1 {
            signature(name, &entry.inputs)
        } else {
            name.clone()
        };
        file.functions.push(FunctionDef { name, params });
    }
    Ok(file)
}

fn params_to_fields(params: &[JsonAbiParam]) -> Result<Vec<StructField>, JsonAbiError> {
    params
        .iter()
        .enumerate()
        .map(|(idx, param)| {
            let name = if param.name.is_empty() {
                format!("_{idx}")
            } else {
                param.name.clone()
            };
            Ok(StructField {
                field_type: param_type(param, &name)?,
                name,
            })
        })
        .collect()
}

fn param_type(param: &JsonAbiParam, name: &str) -> Result<TypeKind, JsonAbiError> {
    let fail = |reason: &str| JsonAbiError::InvalidTypeString {
        param: name.to_string(),
        type_string: param.type_string.clone(),
        reason: reason.to_string(),
    };

    let type_string = param.type_string.trim();
    let base_end = type_string.find('[').unwrap_or(type_string.len());
    let (base, mut suffixes) = type_string.split_at(base_end);

    let mut kind = if base == "tuple" {
        TypeKind::Struct(crate::abi::types::StructType {
            fields: params_to_fields(&param.components)?,
        })
    } else {
        parse_elementary(base).ok_or_else(|| fail("unknown elementary type"))?
    };

    while !suffixes.is_empty() {
        let close = suffixes.find(']').ok_or_else(|| fail("unterminated array suffix"))?;
        let inner = &suffixes[1..close];
        let length = if inner.is_empty() {
            None
        } else {
            Some(inner.parse::<u64>().map_err(|_| fail("array length is not a number"))?)
        };
        kind = TypeKind::array(kind, length);
        suffixes = &suffixes[close + 1..];
        if !suffixes.is_empty() && !suffixes.starts_with('[') {
            return Err(fail("trailing characters after array suffix"));
        }
    }
    Ok(kind)
}

fn parse_elementary(base: &str) -> Option<TypeKind> {
    let sized = |prefix: &str, kind: ElementaryKind, default: u16| -> Option<TypeKind> {
        let digits = base.strip_prefix(prefix)?;
        if digits.is_empty() {
            return Some(TypeKind::elementary(kind, default));
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<u16>().ok().map(|bits| TypeKind::elementary(kind, bits))
    };

    match base {
        "bool" => Some(TypeKind::bool()),
        "address" => Some(TypeKind::address()),
        "string" => Some(TypeKind::string()),
        "bytes" => Some(TypeKind::bytes()),
        "function" => Some(TypeKind::Function(Default::default())),
        _ if base.starts_with("uint") => sized("uint", ElementaryKind::Uint, 256),
        _ if base.starts_with("int") => sized("int", ElementaryKind::Int, 256),
        _ if base.starts_with("bytes") => {
            let size: u16 = base.strip_prefix("bytes")?.parse().ok()?;
            size.checked_mul(8).map(|bits| TypeKind::elementary(ElementaryKind::Byte, bits))
        }
        _ => None,
    }
}

fn signature(name: &str, inputs: &[JsonAbiParam]) -> String {
    let types: Vec<String> = inputs.iter().map(canonical_type).collect();
    format!("{name}({})", types.join(","))
}

fn canonical_type(param: &JsonAbiParam) -> String {
    match param.type_string.strip_prefix("tuple") {
        Some(suffix) => {
            let inner: Vec<String> = param.components.iter().map(canonical_type).collect();
            format!("({}){suffix}", inner.join(","))
        }
        None => {
            let type_string = param.type_string.as_str();
            let (base, suffix) = type_string.split_at(type_string.find('[').unwrap_or(type_string.len()));
            match base {
                "uint" => format!("uint256{suffix}"),
                "int" => format!("int256{suffix}"),
                _ => type_string.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_functions_with_tuples_and_arrays() {
        let source = r#"[
            {"type": "event", "name": "Ignored", "inputs": []},
            {"type": "function", "name": "submit", "inputs": [
                {"name": "amount", "type": "uint"},
                {"name": "grid", "type": "uint64[3][]"},
                {"name": "order", "type": "tuple[]", "components": [
                    {"name": "maker", "type": "address"},
                    {"name": "salt", "type": "bytes32"},
                    {"name": "data", "type": "bytes"}
                ]},
                {"name": "", "type": "bool"}
            ]}
        ]"#;
        let file = parse_json_abi(source).unwrap();
        assert_eq!(file.functions.len(), 1);
        let params = &file.functions[0].params;
        assert_eq!(params[0].field_type, TypeKind::uint(256));
        assert_eq!(
            params[1].field_type,
            TypeKind::array(TypeKind::array(TypeKind::uint(64), Some(3)), None)
        );
        assert_eq!(
            params[2].field_type,
            TypeKind::array(
                TypeKind::structure(vec![
                    ("maker", TypeKind::address()),
                    ("salt", TypeKind::fixed_bytes(32)),
                    ("data", TypeKind::bytes()),
                ]),
                None
            )
        );
        assert_eq!(params[3].name, "_3");
    }

    fn function_names(source: &str) -> Vec<String> {
        parse_json_abi(source)
            .unwrap()
            .functions
            .into_iter()
            .map(|f| f.name)
            .collect()
    }

    #[test]
    fn overloads_get_signatures() {
        let first = r#"{"type": "function", "name": "f", "inputs": [{"name": "a", "type": "uint[]"}]}"#;
        let second = r#"{"type": "function", "name": "f", "inputs": [{"name": "p", "type": "tuple", "components": [{"name": "x", "type": "int16"}]}]}"#;
        let single = r#"{"type": "function", "name": "g", "inputs": []}"#;

        assert_eq!(
            function_names(&format!("[{first}, {single}, {second}]")),
            vec!["f(uint256[])", "g", "f((int16))"]
        );
        // Names do not depend on declaration order.
        assert_eq!(
            function_names(&format!("[{second}, {first}, {single}]")),
            vec!["f((int16))", "f(uint256[])", "g"]
        );
    }

    #[test]
    fn rejects_unknown_types() {
        let source = r#"[{"type": "function", "name": "f", "inputs": [{"name": "a", "type": "fixed128x18"}]}]"#;
        assert!(matches!(
            parse_json_abi(source),
            Err(JsonAbiError::InvalidTypeString { .. })
        ));
        let source = r#"[{"type": "function", "name": "f", "inputs": [{"name": "a", "type": "uint8[x]"}]}]"#;
        assert!(parse_json_abi(source).is_err());
    }
}
