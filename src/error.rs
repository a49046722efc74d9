use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::ConfigFormat;

/// A problem with the tagged defaults struct itself.
///
/// These are developer mistakes, not runtime conditions: they surface on every
/// start-up until the schema is fixed. [`Charmer::add_flags`](crate::Charmer::add_flags)
/// collects all of them before failing so they can be fixed in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "rich-errors", derive(miette::Diagnostic))]
pub enum SchemaError {
    #[error("field '{field}' has no '{tag}' tag")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(help("tag the field, or enable .ignore_untagged_fields(true)"))
    )]
    MissingTag { field: String, tag: String },

    #[error("'{key}' has no '{tag}' tag; every flag needs help text")]
    MissingHelpTag { key: String, tag: String },

    #[error("'{key}' has no concrete default (None or not serialized)")]
    NilDefault { key: String },

    #[error("'{key}' has unsupported type: {kind}")]
    UnsupportedFieldType { key: String, kind: String },

    #[error("invalid default for '{key}': {reason}")]
    InvalidDefault { key: String, reason: String },

    #[error("settings key '{key}' is bound more than once")]
    DuplicateKey { key: String },

    #[error("flag '--{key}' already exists on the command")]
    FlagConflict { key: String },
}

#[derive(Debug, Error)]
#[cfg_attr(feature = "rich-errors", derive(miette::Diagnostic))]
pub enum CharmError {
    #[error("Defaults are required (call .defaults() on the builder)")]
    DefaultsRequired,

    #[error("A clap command is required (call .command() on the builder)")]
    CommandRequired,

    #[error("Defaults must serialize as a struct, got {found}")]
    NotAStruct { found: &'static str },

    #[error("Failed to inspect defaults: {0}")]
    Introspection(String),

    #[error("Invalid {which} tag name: {value:?}")]
    InvalidTagName { which: &'static str, value: String },

    #[error("Invalid config file type: {0:?} (supported: {supported})", supported = ConfigFormat::supported_list())]
    UnsupportedConfigType(String),

    #[error("Invalid config file base name: {0:?}")]
    InvalidConfigBaseName(String),

    #[error("Invalid configuration schema:\n{}", SchemaList(.0))]
    Schema(Vec<SchemaError>),

    #[error("Flags were already added; a Charmer binds exactly once")]
    FlagsAlreadyAdded,

    #[error("Flags have not been added (call .add_flags() before resolving)")]
    FlagsNotAdded,

    #[error("No such file or directory: {path}")]
    ConfigPathNotFound { path: PathBuf },

    #[error("Cannot tell whether {path} exists: {source}")]
    ConfigPathIndeterminate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No '{name}' config file with a supported extension in {dir}")]
    ConfigFileNotFound { dir: PathBuf, name: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path} as {format}: {reason}")]
    ConfigParse {
        path: PathBuf,
        format: ConfigFormat,
        reason: String,
    },

    #[error("Unknown settings keys with no destination field: {}", .0.join(", "))]
    UnknownFields(Vec<String>),

    #[error("Invalid value for '{key}' from {layer}: {reason}")]
    InvalidValue {
        key: String,
        layer: String,
        reason: String,
    },

    #[error("Failed to read flag '--{key}': {source}")]
    FlagLookup {
        key: String,
        source: clap::parser::MatchesError,
    },

    #[error("While decoding config, flags, and env vars: {0}")]
    Decode(#[from] toml::de::Error),
}

struct SchemaList<'a>(&'a [SchemaError]);

impl fmt::Display for SchemaList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {err}")?;
        }
        Ok(())
    }
}
