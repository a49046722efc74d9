use std::fmt;
use std::path::Path;

/// Serialization formats a config file may use.
///
/// The variant order is the order in which a config directory is searched
/// for `<base name>.<extension>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Extensions tried, in order, when searching a directory.
    pub const SEARCH_EXTENSIONS: &'static [&'static str] = &["json", "toml", "yaml", "yml"];

    /// Look up a format by file extension or type name (case-insensitive,
    /// leading dot allowed).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.');
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Infer the format from a path's extension. `None` for a missing or
    /// unsupported extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
        }
    }

    pub(crate) fn supported_list() -> String {
        Self::SEARCH_EXTENSIONS.join(", ")
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of a struct field, decided once when the defaults are inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    Int,
    UInt,
    Float,
    String,
    StringSeq,
    StringMap,
    /// A struct-typed field. Produces no flag of its own, only its leaves do.
    Nested,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Float => "float",
            Self::String => "string",
            Self::StringSeq => "string sequence",
            Self::StringMap => "string map",
            Self::Nested => "nested struct",
        };
        f.write_str(name)
    }
}

/// One field visited while binding: its dotted key and how it was bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Dotted settings key, e.g. `log.limit.warn`. Doubles as the flag name.
    pub key: String,
    pub kind: FieldKind,
    /// Flag help text. Always present for leaves.
    pub help: Option<String>,
    /// Environment variable bound to the key, if any.
    pub env: Option<String>,
}
