//! Custom serde Serializer that captures a `Serialize` value as a [`Node`]
//! tree, keeping the distinctions the binding step needs (signed vs unsigned
//! integers, `None` vs missing, struct vs map, declaration order).

use serde::ser::{self, Serialize};
use toml::Value;

/// Deepest nesting accepted. Deeper values are treated as self-referential.
pub(crate) const MAX_DEPTH: usize = 64;

/// A serialized value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    /// `Option::None`.
    Nil,
    /// `()` and unit structs.
    Unit,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Strings, chars and unit enum variants.
    Str(String),
    Seq(Vec<Node>),
    /// A map with string keys.
    Map(Vec<(String, Node)>),
    /// Struct fields in declaration order.
    Struct(Vec<(&'static str, Node)>),
    /// Something the settings layers cannot represent.
    Unsupported(&'static str),
}

impl Node {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Node::Nil => "none",
            Node::Unit => "unit",
            Node::Bool(_) => "bool",
            Node::Int(_) => "signed integer",
            Node::UInt(_) => "unsigned integer",
            Node::Float(_) => "float",
            Node::Str(_) => "string",
            Node::Seq(_) => "sequence",
            Node::Map(_) => "map",
            Node::Struct(_) => "struct",
            Node::Unsupported(kind) => kind,
        }
    }

    /// Convert to a settings value. `Ok(None)` for `Nil`, which has no TOML
    /// spelling and is expressed by leaving the key out.
    pub(crate) fn to_value(&self) -> Result<Option<Value>, String> {
        let value = match self {
            Node::Nil => return Ok(None),
            Node::Bool(b) => Value::Boolean(*b),
            Node::Int(i) => Value::Integer(*i),
            Node::UInt(u) => Value::Integer(
                i64::try_from(*u).map_err(|_| format!("{u} does not fit a signed 64-bit integer"))?,
            ),
            Node::Float(f) => Value::Float(*f),
            Node::Str(s) => Value::String(s.clone()),
            Node::Seq(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(v) = item.to_value()? {
                        out.push(v);
                    }
                }
                Value::Array(out)
            }
            Node::Map(entries) => Value::Table(table_from(entries.iter().map(|(k, v)| (k.as_str(), v)))?),
            Node::Struct(fields) => Value::Table(table_from(fields.iter().map(|(k, v)| (*k, v)))?),
            Node::Unit | Node::Unsupported(_) => {
                return Err(format!("a {} value cannot be carried through settings", self.describe()));
            }
        };
        Ok(Some(value))
    }
}

fn table_from<'a>(entries: impl Iterator<Item = (&'a str, &'a Node)>) -> Result<toml::Table, String> {
    let mut table = toml::Table::new();
    for (key, node) in entries {
        if let Some(v) = node.to_value()? {
            table.insert(key.to_string(), v);
        }
    }
    Ok(table)
}

/// Serialize `source` into a [`Node`] tree.
pub(crate) fn to_tree<S: Serialize + ?Sized>(source: &S) -> Result<Node, TreeError> {
    source.serialize(TreeSerializer { depth: 0 })
}

#[derive(Debug)]
pub(crate) struct TreeError(String);

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TreeError {}

impl ser::Error for TreeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        TreeError(msg.to_string())
    }
}

#[derive(Clone, Copy)]
struct TreeSerializer {
    depth: usize,
}

impl TreeSerializer {
    fn descend(self) -> Result<Self, TreeError> {
        if self.depth >= MAX_DEPTH {
            return Err(TreeError(format!(
                "value nests deeper than {MAX_DEPTH} levels; self-referential types are not supported"
            )));
        }
        Ok(Self {
            depth: self.depth + 1,
        })
    }
}

impl ser::Serializer for TreeSerializer {
    type Ok = Node;
    type Error = TreeError;
    type SerializeSeq = SeqCollector;
    type SerializeTuple = SeqCollector;
    type SerializeTupleStruct = SeqCollector;
    type SerializeTupleVariant = SeqCollector;
    type SerializeMap = MapCollector;
    type SerializeStruct = StructCollector;
    type SerializeStructVariant = StructCollector;

    fn serialize_bool(self, v: bool) -> Result<Node, TreeError> {
        Ok(Node::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Node, TreeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Node, TreeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Node, TreeError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Node, TreeError> {
        Ok(Node::Int(v))
    }

    fn serialize_i128(self, _v: i128) -> Result<Node, TreeError> {
        Ok(Node::Unsupported("128-bit integer"))
    }

    fn serialize_u8(self, v: u8) -> Result<Node, TreeError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Node, TreeError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Node, TreeError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Node, TreeError> {
        Ok(Node::UInt(v))
    }

    fn serialize_u128(self, _v: u128) -> Result<Node, TreeError> {
        Ok(Node::Unsupported("128-bit integer"))
    }

    fn serialize_f32(self, v: f32) -> Result<Node, TreeError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Node, TreeError> {
        Ok(Node::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Node, TreeError> {
        Ok(Node::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Node, TreeError> {
        Ok(Node::Str(v.to_string()))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Node, TreeError> {
        Ok(Node::Unsupported("bytes"))
    }

    fn serialize_none(self) -> Result<Node, TreeError> {
        Ok(Node::Nil)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Node, TreeError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Node, TreeError> {
        Ok(Node::Unit)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Node, TreeError> {
        Ok(Node::Unit)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Node, TreeError> {
        Ok(Node::Str(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Node, TreeError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<Node, TreeError> {
        // Still walk the payload so the depth guard sees it.
        value.serialize(self.descend()?)?;
        Ok(Node::Unsupported("enum variant with data"))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqCollector, TreeError> {
        Ok(SeqCollector {
            inner: self.descend()?,
            items: Vec::with_capacity(len.unwrap_or(0)),
            unsupported: None,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqCollector, TreeError> {
        let mut seq = self.serialize_seq(Some(len))?;
        seq.unsupported = Some("tuple");
        Ok(seq)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqCollector, TreeError> {
        self.serialize_tuple(len)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        len: usize,
    ) -> Result<SeqCollector, TreeError> {
        let mut seq = self.serialize_seq(Some(len))?;
        seq.unsupported = Some("enum variant with data");
        Ok(seq)
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapCollector, TreeError> {
        Ok(MapCollector {
            inner: self.descend()?,
            entries: Vec::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<StructCollector, TreeError> {
        Ok(StructCollector {
            inner: self.descend()?,
            fields: Vec::with_capacity(len),
            unsupported: None,
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        len: usize,
    ) -> Result<StructCollector, TreeError> {
        let mut collector = self.serialize_struct("", len)?;
        collector.unsupported = Some("enum variant with data");
        Ok(collector)
    }
}

// --- Sequences and tuples ---

struct SeqCollector {
    inner: TreeSerializer,
    items: Vec<Node>,
    unsupported: Option<&'static str>,
}

impl SeqCollector {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TreeError> {
        self.items.push(value.serialize(self.inner)?);
        Ok(())
    }

    fn finish(self) -> Node {
        match self.unsupported {
            Some(kind) => Node::Unsupported(kind),
            None => Node::Seq(self.items),
        }
    }
}

impl ser::SerializeSeq for SeqCollector {
    type Ok = Node;
    type Error = TreeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TreeError> {
        self.push(value)
    }

    fn end(self) -> Result<Node, TreeError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqCollector {
    type Ok = Node;
    type Error = TreeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TreeError> {
        self.push(value)
    }

    fn end(self) -> Result<Node, TreeError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SeqCollector {
    type Ok = Node;
    type Error = TreeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TreeError> {
        self.push(value)
    }

    fn end(self) -> Result<Node, TreeError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleVariant for SeqCollector {
    type Ok = Node;
    type Error = TreeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TreeError> {
        self.push(value)
    }

    fn end(self) -> Result<Node, TreeError> {
        Ok(self.finish())
    }
}

// --- Maps ---

struct MapCollector {
    inner: TreeSerializer,
    entries: Vec<(Node, Node)>,
    pending_key: Option<Node>,
}

impl ser::SerializeMap for MapCollector {
    type Ok = Node;
    type Error = TreeError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), TreeError> {
        self.pending_key = Some(key.serialize(self.inner)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TreeError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| TreeError("map value serialized before its key".into()))?;
        self.entries.push((key, value.serialize(self.inner)?));
        Ok(())
    }

    fn end(self) -> Result<Node, TreeError> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (key, value) in self.entries {
            match key {
                Node::Str(k) => entries.push((k, value)),
                _ => return Ok(Node::Unsupported("map with non-string keys")),
            }
        }
        // HashMap iteration order is arbitrary; keep defaults stable.
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Node::Map(entries))
    }
}

// --- Structs ---

struct StructCollector {
    inner: TreeSerializer,
    fields: Vec<(&'static str, Node)>,
    unsupported: Option<&'static str>,
}

impl StructCollector {
    fn push<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<(), TreeError> {
        self.fields.push((key, value.serialize(self.inner)?));
        Ok(())
    }

    fn finish(self) -> Node {
        match self.unsupported {
            Some(kind) => Node::Unsupported(kind),
            None => Node::Struct(self.fields),
        }
    }
}

impl ser::SerializeStruct for StructCollector {
    type Ok = Node;
    type Error = TreeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), TreeError> {
        self.push(key, value)
    }

    fn end(self) -> Result<Node, TreeError> {
        Ok(self.finish())
    }
}

impl ser::SerializeStructVariant for StructCollector {
    type Ok = Node;
    type Error = TreeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), TreeError> {
        self.push(key, value)
    }

    fn end(self) -> Result<Node, TreeError> {
        Ok(self.finish())
    }
}
