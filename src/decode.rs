//! Strict decode of the merged settings into a fresh `T`.
//!
//! The defaults tree is walked again, this time under the decoder's tag name,
//! to learn which settings key feeds which serde field. Every leaf in the
//! merged settings must land in some field; leftovers are reported together as
//! [`CharmError::UnknownFields`]. Values are then coerced to each field's kind
//! and the rebuilt table, keyed by serde field names, is deserialized.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use toml::{Table, Value};

use crate::bind::LeafValue;
use crate::env;
use crate::error::CharmError;
use crate::merge::get_dotted;
use crate::resolve::Layer;
use crate::tags::{DEFAULT_FIELD_TAG, FieldTags};
use crate::tree::Node;
use crate::types::FieldKind;
use crate::walk::{self, Entry, Untagged};

/// Knobs of the final decode step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Tag holding each field's settings key.
    pub tag_name: String,
    /// Convert between strings, numbers and booleans where the field kind
    /// asks for it, and lift single values into sequences.
    pub weakly_typed_input: bool,
    /// Leave untagged fields at their defaults instead of keying them by
    /// field name.
    pub ignore_untagged_fields: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            tag_name: DEFAULT_FIELD_TAG.to_string(),
            weakly_typed_input: true,
            ignore_untagged_fields: false,
        }
    }
}

/// A customization applied to the [`DecoderConfig`] before each decode.
pub type DecoderOption = Box<dyn Fn(&mut DecoderConfig) + Send + Sync>;

/// Build the effective decoder config: defaults, then each option in order,
/// then the engine's field tag name if it is not the default one.
pub(crate) fn decoder_config(options: &[DecoderOption], field_tag: &str) -> DecoderConfig {
    let mut config = DecoderConfig::default();
    for option in options {
        option(&mut config);
    }
    if field_tag != DEFAULT_FIELD_TAG {
        config.tag_name = field_tag.to_string();
    }
    config
}

pub(crate) fn decode<T: DeserializeOwned>(
    root: &Node,
    tags: &'static [FieldTags],
    merged: &Table,
    sources: &BTreeMap<String, Layer>,
    config: &DecoderConfig,
) -> Result<T, CharmError> {
    let untagged = if config.ignore_untagged_fields {
        Untagged::Skip
    } else {
        Untagged::UseFieldName
    };
    // Schema problems were reported when binding; here they only mean a
    // field stays out of the key map.
    let walked = walk::walk(root, tags, &config.tag_name, untagged);

    let mut leaves = BTreeMap::new();
    let mut sections = BTreeSet::new();
    for entry in &walked.entries {
        match entry {
            Entry::Leaf { key, node, .. } => {
                // Unclassifiable leaves pass through uncoerced.
                let kind = LeafValue::classify(node).ok().map(|v| v.kind());
                leaves.insert(key.as_str(), kind);
            }
            Entry::Section { key, .. } => {
                sections.insert(key.as_str());
            }
            Entry::Skipped { .. } => {}
        }
    }

    let mut unknown = Vec::new();
    collect_unknown(merged, "", &leaves, &sections, &mut unknown);
    if !unknown.is_empty() {
        return Err(CharmError::UnknownFields(unknown));
    }

    let mut out = Table::new();
    for entry in &walked.entries {
        match entry {
            Entry::Leaf { key, path, node, .. } => {
                let kind = leaves.get(key.as_str()).copied().flatten();
                let value = match get_dotted(merged, key) {
                    Some(value) => match kind {
                        Some(kind) => coerce(kind, value.clone(), config.weakly_typed_input)
                            .map_err(|reason| CharmError::InvalidValue {
                                key: key.clone(),
                                layer: sources
                                    .get(key)
                                    .unwrap_or(&Layer::File)
                                    .to_string(),
                                reason,
                            })?,
                        None => value.clone(),
                    },
                    // Key unknown to settings (e.g. the decoder reads another
                    // tag than binding did): keep the default.
                    None => match node_value(node, key)? {
                        Some(value) => value,
                        None => continue,
                    },
                };
                insert_path(&mut out, path, value);
            }
            Entry::Skipped { path, node } => {
                let key = path.join(".");
                if let Some(value) = node_value(node, &key)? {
                    insert_path(&mut out, path, value);
                }
            }
            Entry::Section { path, .. } => ensure_table(&mut out, path),
        }
    }

    Ok(Value::Table(out).try_into()?)
}

fn node_value(node: &Node, key: &str) -> Result<Option<Value>, CharmError> {
    node.to_value().map_err(|reason| CharmError::InvalidValue {
        key: key.to_string(),
        layer: Layer::Default.to_string(),
        reason,
    })
}

/// Leaf paths in `table` that no field consumes.
fn collect_unknown(
    table: &Table,
    prefix: &str,
    leaves: &BTreeMap<&str, Option<FieldKind>>,
    sections: &BTreeSet<&str>,
    unknown: &mut Vec<String>,
) {
    for (key, value) in table {
        let full = crate::tags::join_key(prefix, key);
        if leaves.contains_key(full.as_str()) {
            continue;
        }
        match value {
            Value::Table(sub) if !sub.is_empty() => {
                collect_unknown(sub, &full, leaves, sections, unknown);
            }
            Value::Table(_) if sections.contains(full.as_str()) => {}
            _ => unknown.push(full),
        }
    }
}

fn insert_path(table: &mut Table, path: &[&str], value: Value) {
    let Some((leaf, parents)) = path.split_last() else {
        return;
    };
    let mut current = table;
    for segment in parents {
        let slot = current
            .entry(*segment)
            .or_insert_with(|| Value::Table(Table::new()));
        let Some(next) = slot.as_table_mut() else {
            return;
        };
        current = next;
    }
    current.insert(leaf.to_string(), value);
}

fn ensure_table(table: &mut Table, path: &[&str]) {
    let mut current = table;
    for segment in path {
        let slot = current
            .entry(*segment)
            .or_insert_with(|| Value::Table(Table::new()));
        let Some(next) = slot.as_table_mut() else {
            return;
        };
        current = next;
    }
}

/// Convert a settings value to the shape a field of `kind` deserializes from.
pub(crate) fn coerce(kind: FieldKind, value: Value, weak: bool) -> Result<Value, String> {
    let found = value.type_str();
    let mismatch = || format!("expected {kind}, found {found}");
    match (kind, value) {
        (FieldKind::Bool, v @ Value::Boolean(_)) => Ok(v),
        (FieldKind::Bool, Value::Integer(i)) if weak => Ok(Value::Boolean(i != 0)),
        (FieldKind::Bool, Value::Float(f)) if weak => Ok(Value::Boolean(f != 0.0)),
        (FieldKind::Bool, Value::String(s)) if weak => {
            if s.is_empty() {
                return Ok(Value::Boolean(false));
            }
            env::parse_bool(&s)
                .map(Value::Boolean)
                .ok_or_else(|| format!("{s:?} is not a boolean"))
        }

        (FieldKind::Int | FieldKind::UInt, Value::Integer(i)) => {
            if kind == FieldKind::UInt && i < 0 {
                return Err(format!("{i} is negative"));
            }
            Ok(Value::Integer(i))
        }
        (FieldKind::Int | FieldKind::UInt, Value::Float(f)) => {
            if f.fract() != 0.0 || !f.is_finite() {
                return Err(format!("{f} is not a whole number"));
            }
            // 2^63: the first float past i64::MAX.
            if !(-9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0).contains(&f) {
                return Err(format!("{f} is out of range for a 64-bit integer"));
            }
            coerce(kind, Value::Integer(f as i64), weak)
        }
        (FieldKind::Int | FieldKind::UInt, Value::Boolean(b)) if weak => {
            Ok(Value::Integer(i64::from(b)))
        }
        (FieldKind::Int | FieldKind::UInt, Value::String(s)) if weak => {
            let s = if s.trim().is_empty() { "0" } else { s.as_str() };
            env::parse_env_value(kind, s)
        }

        (FieldKind::Float, v @ Value::Float(_)) => Ok(v),
        (FieldKind::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
        (FieldKind::Float, Value::Boolean(b)) if weak => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
        (FieldKind::Float, Value::String(s)) if weak => {
            let s = if s.trim().is_empty() { "0" } else { s.as_str() };
            env::parse_env_value(kind, s)
        }

        (FieldKind::String, v @ Value::String(_)) => Ok(v),
        (FieldKind::String, Value::Boolean(b)) if weak => {
            Ok(Value::String(if b { "1" } else { "0" }.into()))
        }
        (FieldKind::String, Value::Integer(i)) if weak => Ok(Value::String(i.to_string())),
        (FieldKind::String, Value::Float(f)) if weak => Ok(Value::String(f.to_string())),

        (FieldKind::StringSeq, Value::Array(items)) => items
            .into_iter()
            .map(|item| coerce(FieldKind::String, item, weak))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (FieldKind::StringSeq, Value::String(s)) => Ok(Value::Array(
            env::split_list(&s).into_iter().map(Value::String).collect(),
        )),
        (FieldKind::StringSeq, v @ (Value::Integer(_) | Value::Float(_) | Value::Boolean(_)))
            if weak =>
        {
            Ok(Value::Array(vec![coerce(FieldKind::String, v, weak)?]))
        }

        (FieldKind::StringMap, Value::Table(map)) => map
            .into_iter()
            .map(|(k, v)| coerce(FieldKind::String, v, weak).map(|v| (k, v)))
            .collect::<Result<Table, _>>()
            .map(Value::Table),
        (FieldKind::StringMap, Value::Array(items)) if weak && items.is_empty() => {
            Ok(Value::Table(Table::new()))
        }

        _ => Err(mismatch()),
    }
}
