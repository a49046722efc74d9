//! Core resolution pipeline: reconcile defaults, the config file, env vars and
//! command-line flags into one settings table.
//!
//! Operates on pre-loaded data with no I/O, so every precedence case can be
//! tested with synthetic inputs. Per bound key, highest priority first:
//!
//! 1. a flag the user actually passed on the command line
//! 2. a non-empty env var bound to the key
//! 3. the config file
//! 4. the compiled-in default
//!
//! Flag defaults registered with clap never count as "passed": only
//! [`ValueSource::CommandLine`] does.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use clap::ArgMatches;
use clap::parser::ValueSource;
use toml::{Table, Value};
use tracing::trace;

use crate::env;
use crate::error::CharmError;
use crate::merge::{deep_merge, get_dotted, insert_dotted};
use crate::settings::KeyBinding;
use crate::types::FieldKind;

/// Where a key's effective value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Default,
    File,
    /// Named env var.
    Env(String),
    /// Named flag.
    Flag(String),
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Default => f.write_str("default"),
            Layer::File => f.write_str("config file"),
            Layer::Env(var) => write!(f, "env var {var}"),
            Layer::Flag(flag) => write!(f, "flag --{flag}"),
        }
    }
}

/// The runtime inputs to a resolution: parsed flags and the environment.
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    /// `None` resolves as if no flags were passed.
    pub matches: Option<&'a ArgMatches>,
    /// Pass `std::env::vars().collect()` or synthetic data.
    pub env_vars: &'a HashMap<String, String>,
}

/// Merged settings plus the winning layer of every bound key.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub table: Table,
    pub sources: BTreeMap<String, Layer>,
}

pub(crate) fn resolve(
    defaults: &Table,
    file: &Table,
    bindings: &BTreeMap<String, KeyBinding>,
    input: &ResolveInput<'_>,
) -> Result<Resolved, CharmError> {
    let mut table = deep_merge(defaults.clone(), file.clone());
    let mut sources = BTreeMap::new();

    for (key, binding) in bindings {
        let flagged = match (&binding.flag, input.matches) {
            (Some(id), Some(matches)) => flag_value(matches, id, binding.kind)?
                .map(|v| (v, Layer::Flag(id.clone()))),
            _ => None,
        };
        let winner = match flagged {
            Some(found) => Some(found),
            None => match &binding.env {
                Some(var) => match env::lookup(input.env_vars, var) {
                    Some(raw) => {
                        let value = env::parse_env_value(binding.kind, raw).map_err(|reason| {
                            CharmError::InvalidValue {
                                key: key.clone(),
                                layer: Layer::Env(var.clone()).to_string(),
                                reason,
                            }
                        })?;
                        Some((value, Layer::Env(var.clone())))
                    }
                    None => None,
                },
                None => None,
            },
        };

        let layer = match winner {
            Some((value, layer)) => {
                insert_dotted(&mut table, key, value);
                layer
            }
            None if get_dotted(file, key).is_some() => Layer::File,
            None => Layer::Default,
        };
        trace!(%key, %layer, "resolved");
        sources.insert(key.clone(), layer);
    }

    Ok(Resolved { table, sources })
}

/// The value of flag `id` if it was passed on the command line.
fn flag_value(
    matches: &ArgMatches,
    id: &str,
    kind: FieldKind,
) -> Result<Option<Value>, CharmError> {
    // value_source may panic on ids the command never defined
    if !matches.ids().any(|known| known.as_str() == id) {
        return Ok(None);
    }
    if matches.value_source(id) != Some(ValueSource::CommandLine) {
        return Ok(None);
    }

    let lookup = |source| CharmError::FlagLookup {
        key: id.to_string(),
        source,
    };
    let value = match kind {
        FieldKind::Bool => matches
            .try_get_one::<bool>(id)
            .map_err(lookup)?
            .map(|b| Value::Boolean(*b)),
        FieldKind::Int => matches
            .try_get_one::<i64>(id)
            .map_err(lookup)?
            .map(|i| Value::Integer(*i)),
        FieldKind::UInt => match matches.try_get_one::<u64>(id).map_err(lookup)? {
            Some(u) => Some(Value::Integer(i64::try_from(*u).map_err(|_| {
                CharmError::InvalidValue {
                    key: id.to_string(),
                    layer: Layer::Flag(id.to_string()).to_string(),
                    reason: format!("{u} does not fit a signed 64-bit integer"),
                }
            })?)),
            None => None,
        },
        FieldKind::Float => matches
            .try_get_one::<f64>(id)
            .map_err(lookup)?
            .map(|f| Value::Float(*f)),
        FieldKind::String => matches
            .try_get_one::<String>(id)
            .map_err(lookup)?
            .map(|s| Value::String(s.clone())),
        FieldKind::StringSeq => matches
            .try_get_many::<String>(id)
            .map_err(lookup)?
            .map(|items| Value::Array(items.cloned().map(Value::String).collect())),
        FieldKind::StringMap => matches
            .try_get_many::<(String, String)>(id)
            .map_err(lookup)?
            .map(|pairs| {
                Value::Table(
                    pairs
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect(),
                )
            }),
        FieldKind::Nested => None,
    };
    Ok(value)
}
