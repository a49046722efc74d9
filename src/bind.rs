//! Binding synthesis: turn each walked leaf into a typed clap [`Arg`], a
//! settings default, and its flag/env bindings.
//!
//! Everything is validated before anything is registered, so a schema with
//! problems leaves the command and the settings store untouched and reports
//! every problem at once.

use std::collections::{BTreeMap, BTreeSet};

use clap::{Arg, ArgAction, Command, value_parser};
use toml::Value;
use tracing::debug;

use crate::env;
use crate::error::SchemaError;
use crate::settings::Settings;
use crate::tags::{FieldTags, TagNames};
use crate::tree::Node;
use crate::types::{FieldDescriptor, FieldKind};
use crate::walk::{self, Entry, Untagged};

/// A leaf default, classified once.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LeafValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    StringSeq(Vec<String>),
    StringMap(BTreeMap<String, String>),
}

/// Why a leaf default could not be classified.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Unbindable {
    Invalid(String),
    Unsupported(String),
}

impl LeafValue {
    pub(crate) fn classify(node: &Node) -> Result<Self, Unbindable> {
        match node {
            Node::Bool(b) => Ok(Self::Bool(*b)),
            Node::Int(i) => Ok(Self::Int(*i)),
            Node::UInt(u) => {
                if i64::try_from(*u).is_err() {
                    return Err(Unbindable::Invalid(format!(
                        "{u} is larger than settings can hold ({})",
                        i64::MAX
                    )));
                }
                Ok(Self::UInt(*u))
            }
            Node::Float(f) => Ok(Self::Float(*f)),
            Node::Str(s) => Ok(Self::String(s.clone())),
            Node::Seq(items) => {
                if items.is_empty() {
                    return Err(Unbindable::Invalid(
                        "empty sequence; give a representative default".into(),
                    ));
                }
                items
                    .iter()
                    .map(|item| match item {
                        Node::Str(s) => Ok(s.clone()),
                        other => Err(Unbindable::Unsupported(format!(
                            "sequence of {}",
                            other.describe()
                        ))),
                    })
                    .collect::<Result<_, _>>()
                    .map(Self::StringSeq)
            }
            Node::Map(entries) => {
                if entries.is_empty() {
                    return Err(Unbindable::Invalid(
                        "empty map; give a representative default".into(),
                    ));
                }
                entries
                    .iter()
                    .map(|(k, v)| match v {
                        Node::Str(s) => Ok((k.clone(), s.clone())),
                        other => Err(Unbindable::Unsupported(format!(
                            "map of {}",
                            other.describe()
                        ))),
                    })
                    .collect::<Result<_, _>>()
                    .map(Self::StringMap)
            }
            other => Err(Unbindable::Unsupported(other.describe().to_string())),
        }
    }

    pub(crate) fn kind(&self) -> FieldKind {
        match self {
            Self::Bool(_) => FieldKind::Bool,
            Self::Int(_) => FieldKind::Int,
            Self::UInt(_) => FieldKind::UInt,
            Self::Float(_) => FieldKind::Float,
            Self::String(_) => FieldKind::String,
            Self::StringSeq(_) => FieldKind::StringSeq,
            Self::StringMap(_) => FieldKind::StringMap,
        }
    }

    /// The settings value for this default. Unsigned values were range
    /// checked by [`classify`](Self::classify).
    pub(crate) fn to_value(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Boolean(*b),
            Self::Int(i) => Value::Integer(*i),
            Self::UInt(u) => Value::Integer(i64::try_from(*u).unwrap_or(i64::MAX)),
            Self::Float(f) => Value::Float(*f),
            Self::String(s) => Value::String(s.clone()),
            Self::StringSeq(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            Self::StringMap(map) => Value::Table(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        }
    }

    /// The default as clap would parse it back, for scalars.
    fn scalar_default(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::UInt(u) => Some(u.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::StringSeq(_) | Self::StringMap(_) => None,
        }
    }

    /// The default as shown in help for collections. Never parsed: clap
    /// would split item values containing the delimiter.
    fn collection_default(&self) -> Option<String> {
        match self {
            Self::StringSeq(items) => Some(format!("{items:?}")),
            Self::StringMap(map) => Some(format!("{map:?}")),
            _ => None,
        }
    }

    /// Build the clap argument for `key`.
    pub(crate) fn to_arg(&self, key: &str, help: &str) -> Arg {
        let help = match self.collection_default() {
            Some(shown) => format!("{help} [default: {shown}]"),
            None => help.to_string(),
        };
        let arg = Arg::new(key.to_string())
            .long(key.to_string())
            .help(help)
            .global(true);

        let arg = match self.scalar_default() {
            Some(default) => arg.default_value(default),
            None => arg,
        };
        match self {
            Self::Bool(_) => arg
                .value_parser(parse_bool_flag)
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value("true"),
            Self::Int(_) => arg
                .value_parser(value_parser!(i64))
                .allow_negative_numbers(true),
            Self::UInt(_) => arg.value_parser(value_parser!(u64)),
            Self::Float(_) => arg
                .value_parser(value_parser!(f64))
                .allow_negative_numbers(true),
            Self::String(_) => arg.value_parser(value_parser!(String)),
            Self::StringSeq(_) => arg
                .value_parser(value_parser!(String))
                .action(ArgAction::Append)
                .value_delimiter(','),
            Self::StringMap(_) => arg
                .value_parser(env::parse_key_value)
                .action(ArgAction::Append)
                .value_delimiter(','),
        }
    }
}

fn parse_bool_flag(raw: &str) -> Result<bool, String> {
    env::parse_bool(raw).ok_or_else(|| format!("{raw:?} is not a boolean (use true or false)"))
}

/// A validated leaf, ready to register.
#[derive(Debug)]
struct Pending {
    key: String,
    value: LeafValue,
    help: String,
    env: Option<String>,
}

/// Walk `root`, validate every leaf, and if nothing is wrong register each
/// one on `command` and in `settings`.
///
/// Returns the command with the new args appended plus one descriptor per
/// visited field (sections included), in declaration order.
pub(crate) fn synthesize(
    root: &Node,
    tags: &'static [FieldTags],
    names: &TagNames,
    ignore_untagged: bool,
    command: Command,
    settings: &mut Settings,
) -> Result<(Command, Vec<FieldDescriptor>), (Command, Vec<SchemaError>)> {
    let untagged = if ignore_untagged {
        Untagged::Skip
    } else {
        Untagged::Reject
    };
    let walked = walk::walk(root, tags, &names.field, untagged);
    let mut errors = walked.errors;
    let mut pending = Vec::new();
    let mut fields = Vec::new();

    for entry in &walked.entries {
        match entry {
            Entry::Section { key, .. } => fields.push(FieldDescriptor {
                key: key.clone(),
                kind: FieldKind::Nested,
                help: None,
                env: None,
            }),
            Entry::Leaf {
                key, tags, node, ..
            } => {
                let value = match LeafValue::classify(node) {
                    Ok(value) => value,
                    Err(Unbindable::Invalid(reason)) => {
                        errors.push(SchemaError::InvalidDefault {
                            key: key.clone(),
                            reason,
                        });
                        continue;
                    }
                    Err(Unbindable::Unsupported(kind)) => {
                        errors.push(SchemaError::UnsupportedFieldType {
                            key: key.clone(),
                            kind,
                        });
                        continue;
                    }
                };
                let Some(help) = tags.and_then(|t| t.get(&names.help)) else {
                    errors.push(SchemaError::MissingHelpTag {
                        key: key.clone(),
                        tag: names.help.clone(),
                    });
                    continue;
                };
                let env = tags.and_then(|t| t.get(&names.env)).map(str::to_string);
                fields.push(FieldDescriptor {
                    key: key.clone(),
                    kind: value.kind(),
                    help: Some(help.to_string()),
                    env: env.clone(),
                });
                pending.push(Pending {
                    key: key.clone(),
                    value,
                    help: help.to_string(),
                    env,
                });
            }
            Entry::Skipped { path, .. } => {
                debug!(field = %path.join("."), "field excluded from binding");
            }
        }
    }

    errors.extend(check_collisions(&pending, &command));
    if !errors.is_empty() {
        return Err((command, errors));
    }

    let mut args = Vec::with_capacity(pending.len());
    for p in pending {
        let kind = p.value.kind();
        debug!(key = %p.key, %kind, env = ?p.env, "binding field");
        args.push(p.value.to_arg(&p.key, &p.help));
        settings.set_default(&p.key, p.value.to_value());
        settings.bind_flag(&p.key, kind, &p.key);
        if let Some(var) = &p.env {
            settings.bind_env(&p.key, kind, var);
        }
    }

    Ok((command.args(args), fields))
}

/// Duplicate keys, keys nested under another leaf, and clashes with args the
/// command already has.
fn check_collisions(pending: &[Pending], command: &Command) -> Vec<SchemaError> {
    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();
    for p in pending {
        if !seen.insert(p.key.as_str()) {
            errors.push(SchemaError::DuplicateKey { key: p.key.clone() });
        }
    }
    for p in pending {
        let mut prefix = p.key.as_str();
        while let Some((parent, _)) = prefix.rsplit_once('.') {
            if seen.contains(parent) {
                errors.push(SchemaError::DuplicateKey { key: p.key.clone() });
                break;
            }
            prefix = parent;
        }
    }

    for p in pending {
        let taken = command
            .get_arguments()
            .any(|a| a.get_id().as_str() == p.key || a.get_long() == Some(p.key.as_str()));
        let builtin = (p.key == "help" && !command.is_disable_help_flag_set())
            || (p.key == "version"
                && command.get_version().is_some()
                && !command.is_disable_version_flag_set());
        if taken || builtin {
            errors.push(SchemaError::FlagConflict { key: p.key.clone() });
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{TEST_TAG, TestConfig};
    use crate::tags::Tagged;
    use crate::tree::to_tree;
    use serde::Serialize;

    fn names() -> TagNames {
        TagNames {
            field: TEST_TAG.into(),
            ..TagNames::default()
        }
    }

    fn bind_test_config() -> (Command, Vec<FieldDescriptor>, Settings) {
        let tree = to_tree(&TestConfig::default()).unwrap();
        let mut settings = Settings::new();
        let (cmd, fields) = synthesize(
            &tree,
            TestConfig::TAGS,
            &names(),
            true,
            Command::new("test"),
            &mut settings,
        )
        .unwrap();
        (cmd, fields, settings)
    }

    #[test]
    fn every_leaf_gets_one_flag() {
        let (cmd, _, _) = bind_test_config();
        let mut flags: Vec<_> = cmd
            .get_arguments()
            .filter_map(|a| a.get_long())
            .collect();
        flags.sort_unstable();
        let mut expected = vec![
            "workers",
            "max-burst",
            "bind-addr",
            "upstreams",
            "log.level",
            "log.json",
            "log.dst",
            "log.limit.warn",
            "log.limit.error",
        ];
        expected.sort_unstable();
        assert_eq!(flags, expected);
    }

    #[test]
    fn descriptors_carry_kind_help_and_env() {
        let (_, fields, _) = bind_test_config();
        let by_key = |k: &str| fields.iter().find(|f| f.key == k).unwrap();
        assert_eq!(by_key("workers").kind, FieldKind::Int);
        assert_eq!(by_key("workers").env.as_deref(), Some("TEST_WORKERS"));
        assert_eq!(by_key("max-burst").kind, FieldKind::Float);
        assert_eq!(by_key("log.limit.warn").kind, FieldKind::UInt);
        assert_eq!(by_key("log.json").kind, FieldKind::Bool);
        assert_eq!(by_key("upstreams").kind, FieldKind::StringSeq);
        assert_eq!(by_key("upstreams").env, None);
        assert_eq!(by_key("log.dst").kind, FieldKind::StringMap);
        assert_eq!(by_key("log").kind, FieldKind::Nested);
        assert_eq!(by_key("log.level").help.as_deref(), Some("Log level"));
    }

    #[test]
    fn defaults_are_shown_on_flags() {
        let (cmd, _, _) = bind_test_config();
        let arg = |id: &str| cmd.get_arguments().find(|a| a.get_id().as_str() == id).unwrap();
        let shown = |id: &str| -> Vec<String> {
            arg(id)
                .get_default_values()
                .iter()
                .map(|v| v.to_string_lossy().into_owned())
                .collect()
        };
        assert_eq!(shown("workers"), ["128"]);
        assert_eq!(shown("max-burst"), ["1.25"]);
        assert_eq!(shown("log.json"), ["false"]);
        assert!(shown("log.dst").is_empty());
        let help = arg("log.dst").get_help().unwrap().to_string();
        assert!(help.contains("/var/log/test/error.log"), "{help}");
    }

    #[derive(Serialize)]
    struct Commas {
        labels: BTreeMap<String, String>,
        hosts: Vec<String>,
    }

    impl Tagged for Commas {
        const TAGS: &'static [FieldTags] = &[
            FieldTags::leaf("labels", &[("mapstructure", "labels"), ("usage", "x")]),
            FieldTags::leaf("hosts", &[("mapstructure", "hosts"), ("usage", "x")]),
        ];
    }

    #[test]
    fn comma_inside_collection_default_parses_without_flags() {
        let tree = to_tree(&Commas {
            labels: BTreeMap::from([("hosts".to_string(), "a,b".to_string())]),
            hosts: vec!["x,y".into()],
        })
        .unwrap();
        let mut settings = Settings::new();
        let (mut cmd, _) = synthesize(
            &tree,
            Commas::TAGS,
            &TagNames::default(),
            false,
            Command::new("t"),
            &mut settings,
        )
        .unwrap();
        let m = cmd.try_get_matches_from_mut(["t"]).unwrap();
        assert!(m.get_many::<(String, String)>("labels").is_none());
        assert_eq!(settings.defaults()["labels"]["hosts"].as_str(), Some("a,b"));
        assert_eq!(settings.defaults()["hosts"][0].as_str(), Some("x,y"));
    }

    #[test]
    fn settings_defaults_match_field_defaults() {
        let (_, _, settings) = bind_test_config();
        let d = settings.defaults();
        assert_eq!(d["workers"].as_integer(), Some(128));
        assert_eq!(d["max-burst"].as_float(), Some(1.25));
        assert_eq!(d["bind-addr"].as_str(), Some("0.0.0.0"));
        assert_eq!(d["log"]["limit"]["error"].as_integer(), Some(100));
        assert_eq!(
            d["log"]["dst"]["error"].as_str(),
            Some("/var/log/test/error.log")
        );
        assert!(!d.contains_key("ignore_me"));
    }

    #[test]
    fn parsed_flags_use_typed_parsers() {
        let (mut cmd, _, _) = bind_test_config();
        let m = cmd
            .try_get_matches_from_mut([
                "test",
                "--workers=-3",
                "--log.json",
                "--upstreams=a,b",
                "--log.dst",
                "debug=/tmp/d.log",
                "--log.limit.warn=7",
            ])
            .unwrap();
        assert_eq!(m.get_one::<i64>("workers"), Some(&-3));
        assert_eq!(m.get_one::<bool>("log.json"), Some(&true));
        assert_eq!(m.get_one::<u64>("log.limit.warn"), Some(&7));
        let ups: Vec<_> = m.get_many::<String>("upstreams").unwrap().collect();
        assert_eq!(ups, ["a", "b"]);
        let dst: Vec<_> = m.get_many::<(String, String)>("log.dst").unwrap().collect();
        assert_eq!(dst, [&("debug".to_string(), "/tmp/d.log".to_string())]);
    }

    #[test]
    fn bool_flag_accepts_explicit_false() {
        let (mut cmd, _, _) = bind_test_config();
        let m = cmd
            .try_get_matches_from_mut(["test", "--log.json=false"])
            .unwrap();
        assert_eq!(m.get_one::<bool>("log.json"), Some(&false));
    }

    #[test]
    fn unsigned_flag_rejects_negative() {
        let (mut cmd, _, _) = bind_test_config();
        assert!(
            cmd.try_get_matches_from_mut(["test", "--log.limit.warn=-1"])
                .is_err()
        );
    }

    #[derive(Serialize)]
    struct Broken {
        empty_list: Vec<String>,
        numbers: Vec<u8>,
        pair: (u8, u8),
        no_help: String,
        huge: u64,
    }

    impl Tagged for Broken {
        const TAGS: &'static [FieldTags] = &[
            FieldTags::leaf("empty_list", &[("mapstructure", "empty"), ("usage", "x")]),
            FieldTags::leaf("numbers", &[("mapstructure", "numbers"), ("usage", "x")]),
            FieldTags::leaf("pair", &[("mapstructure", "pair"), ("usage", "x")]),
            FieldTags::leaf("no_help", &[("mapstructure", "no-help")]),
            FieldTags::leaf("huge", &[("mapstructure", "huge"), ("usage", "x")]),
        ];
    }

    #[test]
    fn schema_errors_are_aggregated_and_nothing_is_registered() {
        let tree = to_tree(&Broken {
            empty_list: vec![],
            numbers: vec![1],
            pair: (1, 2),
            no_help: "x".into(),
            huge: u64::MAX,
        })
        .unwrap();
        let mut settings = Settings::new();
        let (cmd, errors) = synthesize(
            &tree,
            Broken::TAGS,
            &TagNames::default(),
            false,
            Command::new("test"),
            &mut settings,
        )
        .unwrap_err();

        assert_eq!(errors.len(), 5, "{errors:?}");
        assert!(matches!(&errors[0], SchemaError::InvalidDefault { key, .. } if key == "empty"));
        assert!(matches!(
            &errors[1],
            SchemaError::UnsupportedFieldType { key, kind } if key == "numbers" && kind == "sequence of unsigned integer"
        ));
        assert!(matches!(&errors[2], SchemaError::UnsupportedFieldType { key, kind } if key == "pair" && kind == "tuple"));
        assert!(matches!(&errors[3], SchemaError::MissingHelpTag { key, .. } if key == "no-help"));
        assert!(matches!(&errors[4], SchemaError::InvalidDefault { key, .. } if key == "huge"));
        assert_eq!(cmd.get_arguments().count(), 0);
        assert!(settings.defaults().is_empty());
    }

    #[derive(Serialize)]
    struct Clashing {
        a: String,
        b: String,
        parent: String,
        child: String,
        existing: String,
    }

    impl Tagged for Clashing {
        const TAGS: &'static [FieldTags] = &[
            FieldTags::leaf("a", &[("mapstructure", "same"), ("usage", "x")]),
            FieldTags::leaf("b", &[("mapstructure", "same"), ("usage", "x")]),
            FieldTags::leaf("parent", &[("mapstructure", "log"), ("usage", "x")]),
            FieldTags::leaf("child", &[("mapstructure", "log.level"), ("usage", "x")]),
            FieldTags::leaf("existing", &[("mapstructure", "config"), ("usage", "x")]),
        ];
    }

    #[test]
    fn collisions_are_schema_errors() {
        let tree = to_tree(&Clashing {
            a: "1".into(),
            b: "2".into(),
            parent: "p".into(),
            child: "c".into(),
            existing: "e".into(),
        })
        .unwrap();
        let cmd = Command::new("test").arg(Arg::new("config").long("config"));
        let mut settings = Settings::new();
        let (_, errors) = synthesize(
            &tree,
            Clashing::TAGS,
            &TagNames::default(),
            false,
            cmd,
            &mut settings,
        )
        .unwrap_err();
        assert!(errors.contains(&SchemaError::DuplicateKey { key: "same".into() }));
        assert!(errors.contains(&SchemaError::DuplicateKey {
            key: "log.level".into()
        }));
        assert!(errors.contains(&SchemaError::FlagConflict {
            key: "config".into()
        }));
    }

    #[test]
    fn classify_unit_variant_as_string() {
        assert_eq!(
            LeafValue::classify(&Node::Str("Fast".into())).unwrap().kind(),
            FieldKind::String
        );
        assert!(matches!(
            LeafValue::classify(&Node::Unit),
            Err(Unbindable::Unsupported(_))
        ));
    }
}
