//! The SQL/JSON item model.
//!
//! An [`Item`] is one atomic value flowing between path nodes: a JSON scalar,
//! a reference to a binary container, or a virtual datetime. Scalars are
//! always decoded out of the binary form before they enter path logic — a
//! container reference is only ever an array or an object.

use std::borrow::Cow;
use std::rc::Rc;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Value;

use crate::datetime::DatetimeValue;
use crate::jsonb::{JsonbDoc, JsonbKind, Node};

/// One SQL/JSON item. Borrows from the input document where it can; items
/// derived from generated objects (`.keyvalue()`) own their storage.
#[derive(Debug, Clone)]
pub enum Item<'a> {
    Null,
    Bool(bool),
    Number(BigDecimal),
    String(Cow<'a, str>),
    Array(ContainerRef<'a>),
    Object(ContainerRef<'a>),
    Datetime(DatetimeValue),
}

impl<'a> Item<'a> {
    /// Decode a document node into an item, unwrapping scalars.
    pub(crate) fn from_node(node: Node<'a>) -> Item<'a> {
        match node.kind() {
            JsonbKind::Null => Item::Null,
            JsonbKind::Bool => Item::Bool(node.bool_value()),
            JsonbKind::Number => Item::Number(node.number_value()),
            JsonbKind::String => Item::String(Cow::Borrowed(node.string_value())),
            JsonbKind::Array => Item::Array(ContainerRef::Doc(node)),
            JsonbKind::Object => Item::Object(ContainerRef::Doc(node)),
        }
    }

    /// Decode a node of a generated (shared) document into an item. Strings
    /// are copied out so the item does not borrow the `Rc` contents.
    fn from_synth(doc: &Rc<JsonbDoc>, offset: u32) -> Item<'a> {
        let node = Node::at(doc, offset);
        match node.kind() {
            JsonbKind::Null => Item::Null,
            JsonbKind::Bool => Item::Bool(node.bool_value()),
            JsonbKind::Number => Item::Number(node.number_value()),
            JsonbKind::String => Item::String(Cow::Owned(node.string_value().to_string())),
            JsonbKind::Array => Item::Array(ContainerRef::Synth {
                doc: Rc::clone(doc),
                offset,
            }),
            JsonbKind::Object => Item::Object(ContainerRef::Synth {
                doc: Rc::clone(doc),
                offset,
            }),
        }
    }

    /// The `.type()` name of this item.
    pub fn type_name(&self) -> &'static str {
        match self {
            Item::Null => "null",
            Item::Bool(_) => "boolean",
            Item::Number(_) => "number",
            Item::String(_) => "string",
            Item::Array(_) => "array",
            Item::Object(_) => "object",
            Item::Datetime(dt) => dt.type_name(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Item::Array(_) | Item::Object(_))
    }

    pub(crate) fn as_container(&self) -> Option<&ContainerRef<'a>> {
        match self {
            Item::Array(c) | Item::Object(c) => Some(c),
            _ => None,
        }
    }

    /// Render this item as a `serde_json::Value`. Datetimes render as
    /// ISO-8601 strings; this is the only place they become visible text.
    pub fn to_json(&self) -> Value {
        match self {
            Item::Null => Value::Null,
            Item::Bool(b) => Value::Bool(*b),
            Item::Number(n) => Value::Number(decimal_to_number(n)),
            Item::String(s) => Value::String(s.clone().into_owned()),
            Item::Array(c) | Item::Object(c) => c.to_value(),
            Item::Datetime(dt) => Value::String(dt.to_iso_string()),
        }
    }
}

/// Convert a decimal to a JSON number, degrading through `f64` only when the
/// canonical literal form is unrepresentable.
pub(crate) fn decimal_to_number(dec: &BigDecimal) -> serde_json::Number {
    let literal = dec.normalized().to_string();
    serde_json::Number::from_str(&literal)
        .ok()
        .or_else(|| {
            bigdecimal::ToPrimitive::to_f64(dec).and_then(serde_json::Number::from_f64)
        })
        .unwrap_or_else(|| serde_json::Number::from(0))
}

// ---------------------------------------------------------------------------
// Container references
// ---------------------------------------------------------------------------

/// A reference to an array or object container.
///
/// `Doc` borrows a node of a caller-owned document. `Synth` shares a
/// document generated during evaluation (a `.keyvalue()` row), so the
/// reference stays valid inside result sequences that outlive the evaluator.
#[derive(Debug, Clone)]
pub enum ContainerRef<'a> {
    Doc(Node<'a>),
    Synth { doc: Rc<JsonbDoc>, offset: u32 },
}

impl<'a> ContainerRef<'a> {
    pub fn kind(&self) -> JsonbKind {
        self.node().kind()
    }

    pub fn is_array(&self) -> bool {
        self.kind() == JsonbKind::Array
    }

    pub fn is_object(&self) -> bool {
        self.kind() == JsonbKind::Object
    }

    pub fn len(&self) -> u32 {
        self.node().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte offset of this container within its document.
    pub fn offset(&self) -> u32 {
        match self {
            ContainerRef::Doc(node) => node.offset(),
            ContainerRef::Synth { offset, .. } => *offset,
        }
    }

    /// The i-th array element, as an item.
    pub fn element(&self, i: u32) -> Option<Item<'a>> {
        match self {
            ContainerRef::Doc(node) => node.element(i).map(Item::from_node),
            ContainerRef::Synth { doc, offset } => Node::at(doc, *offset)
                .element(i)
                .map(|n| Item::from_synth(doc, n.offset())),
        }
    }

    /// Iterate array elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = Item<'a>> + '_ {
        (0..self.len()).filter_map(move |i| self.element(i))
    }

    /// The i-th object entry, as `(key, value)`.
    pub fn object_entry(&self, i: u32) -> Option<(Cow<'a, str>, Item<'a>)> {
        match self {
            ContainerRef::Doc(node) => node
                .entry(i)
                .map(|(k, v)| (Cow::Borrowed(k), Item::from_node(v))),
            ContainerRef::Synth { doc, offset } => Node::at(doc, *offset).entry(i).map(|(k, v)| {
                (
                    Cow::Owned(k.to_string()),
                    Item::from_synth(doc, v.offset()),
                )
            }),
        }
    }

    /// Iterate object entries in stored (sorted-key) order.
    pub fn entries(&self) -> impl Iterator<Item = (Cow<'a, str>, Item<'a>)> + '_ {
        (0..self.len()).filter_map(move |i| self.object_entry(i))
    }

    /// Look up an object key.
    pub fn find_key(&self, key: &str) -> Option<Item<'a>> {
        match self {
            ContainerRef::Doc(node) => node.find_key(key).map(Item::from_node),
            ContainerRef::Synth { doc, offset } => Node::at(doc, *offset)
                .find_key(key)
                .map(|n| Item::from_synth(doc, n.offset())),
        }
    }

    pub fn to_value(&self) -> Value {
        self.node().to_value()
    }

    fn node(&self) -> Node<'_> {
        match self {
            ContainerRef::Doc(node) => *node,
            ContainerRef::Synth { doc, offset } => Node::at(doc, *offset),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
