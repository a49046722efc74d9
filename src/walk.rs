//! Schema walker: pairs the serialized defaults tree with the tag tables and
//! yields every field in declaration order, with its dotted key.
//!
//! Binding and decoding both walk the same tree; they differ only in which
//! tag names the settings key and whether untagged fields are tolerated.

use crate::error::SchemaError;
use crate::tags::{self, FieldTags, SKIP_KEY};
use crate::tree::Node;

/// What to do with a field that has no key tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Untagged {
    /// Report [`SchemaError::MissingTag`].
    Reject,
    /// Leave it out.
    Skip,
    /// Key it by its serde field name.
    UseFieldName,
}

/// One visited field.
#[derive(Debug)]
pub(crate) enum Entry<'n> {
    /// A bindable field. `node` is its default.
    Leaf {
        key: String,
        /// Serde field names from the root down to this field.
        path: Vec<&'static str>,
        tags: Option<&'static FieldTags>,
        node: &'n Node,
    },
    /// A struct-typed field. Its leaves follow as separate entries.
    Section {
        key: String,
        path: Vec<&'static str>,
    },
    /// Excluded from binding (untagged and tolerated, or keyed `-`). Keeps
    /// its default through decode.
    Skipped {
        path: Vec<&'static str>,
        node: &'n Node,
    },
}

#[derive(Debug, Default)]
pub(crate) struct Walk<'n> {
    pub entries: Vec<Entry<'n>>,
    pub errors: Vec<SchemaError>,
}

/// Walk a struct node. Callers make sure `root` is a [`Node::Struct`];
/// anything else yields no entries.
pub(crate) fn walk<'n>(
    root: &'n Node,
    tags: &'static [FieldTags],
    tag_name: &str,
    untagged: Untagged,
) -> Walk<'n> {
    let mut out = Walk::default();
    if let Node::Struct(fields) = root {
        let cx = Context { tag_name, untagged };
        cx.visit(fields, tags, "", &[], &mut out);
    }
    out
}

struct Context<'a> {
    tag_name: &'a str,
    untagged: Untagged,
}

impl Context<'_> {
    fn visit<'n>(
        &self,
        fields: &'n [(&'static str, Node)],
        tags: &'static [FieldTags],
        prefix: &str,
        parent: &[&'static str],
        out: &mut Walk<'n>,
    ) {
        for (field, node) in fields {
            let path = extend(parent, field);
            let field_tags = tags::find(tags, field);

            let segment = match tags::field_key(field_tags, field, self.tag_name) {
                Some(segment) => segment,
                None if self.untagged == Untagged::UseFieldName => field.to_string(),
                None => {
                    if self.untagged == Untagged::Reject {
                        out.errors.push(SchemaError::MissingTag {
                            field: path.join("."),
                            tag: self.tag_name.to_string(),
                        });
                    }
                    out.entries.push(Entry::Skipped { path, node });
                    continue;
                }
            };
            if segment == SKIP_KEY {
                out.entries.push(Entry::Skipped { path, node });
                continue;
            }

            let key = tags::join_key(prefix, &segment);
            match node {
                Node::Nil => out.errors.push(SchemaError::NilDefault { key }),
                Node::Struct(children) => {
                    let child_tags = field_tags.and_then(|t| t.nested).unwrap_or(&[]);
                    out.entries.push(Entry::Section {
                        key: key.clone(),
                        path: path.clone(),
                    });
                    self.visit(children, child_tags, &key, &path, out);
                }
                _ => out.entries.push(Entry::Leaf {
                    key,
                    path,
                    tags: field_tags,
                    node,
                }),
            }
        }

        // Tagged fields that never showed up were skipped by serde, which
        // leaves them without a default.
        for declared in tags {
            if fields.iter().any(|(name, _)| *name == declared.field) {
                continue;
            }
            if let Some(segment) = tags::field_key(Some(declared), declared.field, self.tag_name)
                && segment != SKIP_KEY
            {
                out.errors.push(SchemaError::NilDefault {
                    key: tags::join_key(prefix, &segment),
                });
            }
        }
    }
}

fn extend(parent: &[&'static str], field: &'static str) -> Vec<&'static str> {
    let mut path = Vec::with_capacity(parent.len() + 1);
    path.extend_from_slice(parent);
    path.push(field);
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{TEST_TAG, TestConfig};
    use crate::tags::Tagged;
    use crate::tree::to_tree;
    use serde::Serialize;

    fn leaf_keys(walk: &Walk<'_>) -> Vec<String> {
        walk.entries
            .iter()
            .filter_map(|e| match e {
                Entry::Leaf { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn nested_fields_get_dotted_keys_in_declaration_order() {
        let tree = to_tree(&TestConfig::default()).unwrap();
        let walk = walk(&tree, TestConfig::TAGS, TEST_TAG, Untagged::Skip);
        assert!(walk.errors.is_empty(), "{:?}", walk.errors);
        assert_eq!(
            leaf_keys(&walk),
            [
                "workers",
                "max-burst",
                "bind-addr",
                "upstreams",
                "log.level",
                "log.json",
                "log.limit.warn",
                "log.limit.error",
                "log.dst",
            ]
        );
    }

    #[test]
    fn sections_are_reported_but_not_leaves() {
        let tree = to_tree(&TestConfig::default()).unwrap();
        let walk = walk(&tree, TestConfig::TAGS, TEST_TAG, Untagged::Skip);
        let sections: Vec<_> = walk
            .entries
            .iter()
            .filter_map(|e| match e {
                Entry::Section { key, .. } => Some(key.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(sections, ["log", "log.limit"]);
    }

    #[test]
    fn untagged_fields_error_unless_ignored() {
        let tree = to_tree(&TestConfig::default()).unwrap();
        let strict = walk(&tree, TestConfig::TAGS, TEST_TAG, Untagged::Reject);
        let missing: Vec<_> = strict
            .errors
            .iter()
            .map(|e| match e {
                SchemaError::MissingTag { field, .. } => field.as_str(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            missing,
            ["logging.limit.ignore_me", "logging.ignore_me", "ignore_me"]
        );
    }

    #[test]
    fn other_tag_name_sees_nothing_tagged() {
        let tree = to_tree(&TestConfig::default()).unwrap();
        let walk = walk(&tree, TestConfig::TAGS, "mapstructure", Untagged::Skip);
        assert!(leaf_keys(&walk).is_empty());
        assert!(walk.entries.iter().all(|e| matches!(e, Entry::Skipped { .. })));
    }

    #[test]
    fn field_names_stand_in_for_missing_tags() {
        let tree = to_tree(&TestConfig::default()).unwrap();
        let walk = walk(&tree, TestConfig::TAGS, TEST_TAG, Untagged::UseFieldName);
        assert!(walk.errors.is_empty());
        let keys = leaf_keys(&walk);
        assert!(keys.contains(&"ignore_me".to_string()));
        assert!(keys.contains(&"log.limit.ignore_me".to_string()));
    }

    #[derive(Serialize)]
    struct WithOptions {
        present: Option<String>,
        absent: Option<String>,
        #[serde(skip_serializing)]
        hidden: String,
        excluded: String,
    }

    impl Tagged for WithOptions {
        const TAGS: &'static [FieldTags] = &[
            FieldTags::leaf("present", &[("mapstructure", "present")]),
            FieldTags::leaf("absent", &[("mapstructure", "absent")]),
            FieldTags::leaf("hidden", &[("mapstructure", "hidden")]),
            FieldTags::leaf("excluded", &[("mapstructure", "-")]),
        ];
    }

    #[test]
    fn none_and_unserialized_defaults_are_nil() {
        let value = WithOptions {
            present: Some("x".into()),
            absent: None,
            hidden: String::new(),
            excluded: "y".into(),
        };
        let tree = to_tree(&value).unwrap();
        let walk = walk(&tree, WithOptions::TAGS, "mapstructure", Untagged::Reject);
        assert_eq!(leaf_keys(&walk), ["present"]);
        assert_eq!(
            walk.errors,
            [
                SchemaError::NilDefault {
                    key: "absent".into()
                },
                SchemaError::NilDefault {
                    key: "hidden".into()
                },
            ]
        );
        assert!(walk.entries.iter().any(|e| matches!(
            e,
            Entry::Skipped { path, .. } if path == &["excluded"]
        )));
    }
}
