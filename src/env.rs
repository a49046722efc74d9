//! Typed parsing of environment-variable strings.
//!
//! Every bound key knows its [`FieldKind`], so an env value is parsed as that
//! kind directly instead of being guessed at. The same helpers back the
//! decoder's weak coercion of file values.

use std::collections::{BTreeMap, HashMap};

use toml::{Table, Value};

use crate::types::FieldKind;

/// Look up a variable, treating an empty value as unset.
pub(crate) fn lookup<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

/// Parse an env var value as `kind`.
pub(crate) fn parse_env_value(kind: FieldKind, raw: &str) -> Result<Value, String> {
    match kind {
        FieldKind::Bool => parse_bool(raw)
            .map(Value::Boolean)
            .ok_or_else(|| format!("{raw:?} is not a boolean")),
        FieldKind::Int => raw
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|e| format!("{raw:?} is not an integer: {e}")),
        FieldKind::UInt => {
            let n = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("{raw:?} is not an unsigned integer: {e}"))?;
            i64::try_from(n)
                .map(Value::Integer)
                .map_err(|_| format!("{n} does not fit a signed 64-bit integer"))
        }
        FieldKind::Float => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| format!("{raw:?} is not a number: {e}")),
        FieldKind::String => Ok(Value::String(raw.to_string())),
        FieldKind::StringSeq => Ok(Value::Array(
            split_list(raw).into_iter().map(Value::String).collect(),
        )),
        FieldKind::StringMap => {
            let map = parse_map(raw)?;
            Ok(Value::Table(
                map.into_iter().map(|(k, v)| (k, Value::String(v))).collect::<Table>(),
            ))
        }
        FieldKind::Nested => Err("a nested struct cannot be set from a single variable".into()),
    }
}

/// Boolean spellings: `1 t T TRUE true True 0 f F FALSE false False`.
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated list, trimming items. An empty string is an empty
/// list.
pub(crate) fn split_list(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

/// Parse one `key=value` pair. Also used as the clap value parser for map
/// flags.
pub(crate) fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {raw:?}"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Parse `k1=v1,k2=v2`. Later duplicates win.
pub(crate) fn parse_map(raw: &str) -> Result<BTreeMap<String, String>, String> {
    split_list(raw)
        .iter()
        .filter(|item| !item.is_empty())
        .map(|item| parse_key_value(item))
        .collect()
}
