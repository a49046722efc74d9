//! Field metadata: the tag tables a struct publishes through [`Tagged`], and
//! the rules for reading a settings key, env var and help text out of them.
//!
//! A field's tags are `(tag name, value)` pairs. Which names carry the key, the
//! env var and the help text is configurable ([`TagNames`]); the defaults are
//! `mapstructure`, `env` and `usage`:
//!
//! ```ignore
//! impl Tagged for ServerConfig {
//!     const TAGS: &'static [FieldTags] = &[
//!         FieldTags::leaf("workers", &[
//!             ("mapstructure", "workers,omitempty"),
//!             ("env", "WORKERS"),
//!             ("usage", "Number of workers to run"),
//!         ]),
//!         FieldTags::nested::<LogConfig>("logging", &[("mapstructure", "log")]),
//!     ];
//! }
//! ```

use crate::error::CharmError;

pub const DEFAULT_FIELD_TAG: &str = "mapstructure";
pub const DEFAULT_ENV_TAG: &str = "env";
pub const DEFAULT_HELP_TAG: &str = "usage";

/// A key tag whose first segment is this value excludes the field entirely.
pub(crate) const SKIP_KEY: &str = "-";

/// Tags attached to one struct field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTags {
    /// The field's serde name (what `Serialize` emits for it).
    pub field: &'static str,
    /// Raw `(tag name, value)` pairs.
    pub tags: &'static [(&'static str, &'static str)],
    /// Tag table of the field's type when it is itself a tagged struct.
    pub nested: Option<&'static [FieldTags]>,
}

impl FieldTags {
    pub const fn leaf(field: &'static str, tags: &'static [(&'static str, &'static str)]) -> Self {
        Self {
            field,
            tags,
            nested: None,
        }
    }

    pub const fn nested<T: Tagged>(
        field: &'static str,
        tags: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            field,
            tags,
            nested: Some(T::TAGS),
        }
    }

    /// Value of the first tag called `name`. An empty value counts as absent.
    pub fn get(&self, name: &str) -> Option<&'static str> {
        self.tags
            .iter()
            .find(|(tag, _)| *tag == name)
            .map(|(_, value)| *value)
            .filter(|value| !value.is_empty())
    }
}

/// A struct that publishes per-field metadata tags.
pub trait Tagged {
    const TAGS: &'static [FieldTags];
}

/// Look up the tags declared for a serde field name.
pub(crate) fn find<'t>(tags: &'t [FieldTags], field: &str) -> Option<&'t FieldTags> {
    tags.iter().find(|t| t.field == field)
}

/// Names of the three tags the engine reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNames {
    pub field: String,
    pub env: String,
    pub help: String,
}

impl Default for TagNames {
    fn default() -> Self {
        Self {
            field: DEFAULT_FIELD_TAG.to_string(),
            env: DEFAULT_ENV_TAG.to_string(),
            help: DEFAULT_HELP_TAG.to_string(),
        }
    }
}

/// Trim a configured tag name, rejecting blank ones.
pub(crate) fn validate_tag_name(which: &'static str, name: &str) -> Result<String, CharmError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CharmError::InvalidTagName {
            which,
            value: name.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Split a raw key tag into the key and its trailing options.
///
/// `"max-burst,omitempty"` → `("max-burst", ["omitempty"])`. Options are
/// carried for the decoder's benefit only; nothing here interprets them.
pub(crate) fn parse_key(raw: &str) -> (&str, Vec<&str>) {
    match raw.split_once(',') {
        Some((key, rest)) => (key.trim(), rest.split(',').map(str::trim).collect()),
        None => (raw.trim(), Vec::new()),
    }
}

/// Resolve the settings key segment for a field, or `None` when the field
/// carries no key tag.
///
/// An empty key segment (e.g. `",omitempty"`) falls back to the field name.
pub(crate) fn field_key(tags: Option<&FieldTags>, field: &str, tag_name: &str) -> Option<String> {
    let raw = tags?.get(tag_name)?;
    let (key, _options) = parse_key(raw);
    if key.is_empty() {
        Some(field.to_string())
    } else {
        Some(key.to_string())
    }
}

/// Join a parent key and a child segment with `.`.
pub(crate) fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKERS: FieldTags = FieldTags::leaf(
        "workers",
        &[
            ("mapstructure", "workers,omitempty"),
            ("env", "WORKERS"),
            ("usage", "Number of workers"),
            ("empty", ""),
        ],
    );

    struct Inner;
    impl Tagged for Inner {
        const TAGS: &'static [FieldTags] = &[FieldTags::leaf("x", &[("mapstructure", "x")])];
    }

    #[test]
    fn get_finds_tag_by_name() {
        assert_eq!(WORKERS.get("env"), Some("WORKERS"));
        assert_eq!(WORKERS.get("usage"), Some("Number of workers"));
    }

    #[test]
    fn get_treats_empty_as_absent() {
        assert_eq!(WORKERS.get("empty"), None);
        assert_eq!(WORKERS.get("nope"), None);
    }

    #[test]
    fn nested_links_child_table() {
        let tags = FieldTags::nested::<Inner>("inner", &[("mapstructure", "in")]);
        assert_eq!(tags.nested.map(<[_]>::len), Some(1));
        assert!(WORKERS.nested.is_none());
    }

    #[test]
    fn parse_key_splits_on_first_comma() {
        assert_eq!(parse_key("max-burst,omitempty"), ("max-burst", vec!["omitempty"]));
        assert_eq!(parse_key("a,b,c"), ("a", vec!["b", "c"]));
        assert_eq!(parse_key("plain"), ("plain", vec![]));
    }

    #[test]
    fn field_key_uses_configured_tag() {
        assert_eq!(
            field_key(Some(&WORKERS), "workers", "mapstructure"),
            Some("workers".to_string())
        );
        assert_eq!(field_key(Some(&WORKERS), "workers", "charm"), None);
        assert_eq!(field_key(None, "workers", "mapstructure"), None);
    }

    #[test]
    fn empty_key_segment_falls_back_to_field_name() {
        let tags = FieldTags::leaf("bind_addr", &[("mapstructure", ",omitempty")]);
        assert_eq!(
            field_key(Some(&tags), "bind_addr", "mapstructure"),
            Some("bind_addr".to_string())
        );
    }

    #[test]
    fn blank_tag_names_rejected() {
        assert!(matches!(
            validate_tag_name("field", "   "),
            Err(CharmError::InvalidTagName { which: "field", .. })
        ));
        assert_eq!(validate_tag_name("env", " env ").unwrap(), "env");
    }

    #[test]
    fn join_key_handles_root() {
        assert_eq!(join_key("", "workers"), "workers");
        assert_eq!(join_key("log.limit", "warn"), "log.limit.warn");
    }
}
