//! Binary JSON document model.
//!
//! A [`JsonbDoc`] is a flat, read-only encoding of one JSON document. Path
//! evaluation never walks `serde_json::Value` trees; it reads containers in
//! place through [`Node`] views, so a document is decoded element-by-element
//! only where a path actually touches it.
//!
//! ## Encoding
//!
//! Every node starts with a one-byte tag. Scalars carry their payload inline
//! (numbers as canonical decimal strings, strings as length-prefixed UTF-8).
//! Containers carry an entry count followed by a table of absolute `u32`
//! offsets, so element access and key lookup never scan sibling payloads.
//! Object entries are stored sorted by key bytes; lookup is a binary search
//! and iteration order is deterministic.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Value;

use crate::error::JsonbError;

const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_ARRAY: u8 = 5;
const TAG_OBJECT: u8 = 6;

/// Node classification, as reported by [`Node::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonbKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// An immutable binary JSON document. The root node lives at offset `0`.
#[derive(Clone, PartialEq, Eq)]
pub struct JsonbDoc {
    buf: Vec<u8>,
}

impl JsonbDoc {
    /// Encode a `serde_json::Value` into binary form.
    ///
    /// Fails only when a number literal cannot be represented as an
    /// arbitrary-precision decimal (e.g. an exponent outside `i64`).
    pub fn from_value(value: &Value) -> Result<Self, JsonbError> {
        let mut buf = Vec::with_capacity(64);
        encode(value, &mut buf)?;
        Ok(JsonbDoc { buf })
    }

    /// Parse JSON text and encode it.
    pub fn parse(text: &str) -> Result<Self, JsonbError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// View of the root node.
    pub fn root(&self) -> Node<'_> {
        Node {
            doc: self,
            offset: 0,
        }
    }

    /// Encoded size in bytes.
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    fn tag(&self, offset: u32) -> u8 {
        self.buf[offset as usize]
    }

    fn read_u32(&self, offset: u32) -> u32 {
        let i = offset as usize;
        let bytes: [u8; 4] = self.buf[i..i + 4]
            .try_into()
            .expect("offset table slot is 4 bytes");
        u32::from_le_bytes(bytes)
    }

    fn read_str(&self, offset: u32) -> &str {
        let len = self.read_u32(offset + 1) as usize;
        let start = offset as usize + 5;
        std::str::from_utf8(&self.buf[start..start + len]).expect("encoder stores UTF-8")
    }
}

impl fmt::Debug for JsonbDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonbDoc")
            .field("bytes", &self.buf.len())
            .field("root", &self.root().to_value())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Encode one value, returning its node offset.
fn encode(value: &Value, buf: &mut Vec<u8>) -> Result<u32, JsonbError> {
    let offset = buf.len() as u32;
    match value {
        Value::Null => buf.push(TAG_NULL),
        Value::Bool(false) => buf.push(TAG_FALSE),
        Value::Bool(true) => buf.push(TAG_TRUE),
        Value::Number(n) => {
            // Canonicalize through BigDecimal so the read side never fails.
            let literal = n.to_string();
            let dec = BigDecimal::from_str(&literal).map_err(|_| JsonbError::Number {
                literal: literal.clone(),
            })?;
            let canonical = dec.normalized().to_string();
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(&(canonical.len() as u32).to_le_bytes());
            buf.extend_from_slice(canonical.as_bytes());
        }
        Value::String(s) => encode_string(s, buf),
        Value::Array(elems) => {
            buf.push(TAG_ARRAY);
            buf.extend_from_slice(&(elems.len() as u32).to_le_bytes());
            let table = buf.len();
            buf.resize(table + elems.len() * 4, 0);
            for (i, elem) in elems.iter().enumerate() {
                let child = encode(elem, buf)?;
                buf[table + i * 4..table + i * 4 + 4].copy_from_slice(&child.to_le_bytes());
            }
        }
        Value::Object(map) => {
            // serde_json's default map is a BTreeMap, so entries arrive
            // already sorted by key bytes.
            buf.push(TAG_OBJECT);
            buf.extend_from_slice(&(map.len() as u32).to_le_bytes());
            let table = buf.len();
            buf.resize(table + map.len() * 8, 0);
            for (i, (key, val)) in map.iter().enumerate() {
                let key_off = buf.len() as u32;
                encode_string(key, buf);
                let val_off = encode(val, buf)?;
                let slot = table + i * 8;
                buf[slot..slot + 4].copy_from_slice(&key_off.to_le_bytes());
                buf[slot + 4..slot + 8].copy_from_slice(&val_off.to_le_bytes());
            }
        }
    }
    Ok(offset)
}

fn encode_string(s: &str, buf: &mut Vec<u8>) {
    buf.push(TAG_STRING);
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

// ---------------------------------------------------------------------------
// Node view
// ---------------------------------------------------------------------------

/// A borrowed view of one node inside a [`JsonbDoc`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    doc: &'a JsonbDoc,
    offset: u32,
}

impl<'a> Node<'a> {
    pub(crate) fn at(doc: &'a JsonbDoc, offset: u32) -> Self {
        Node { doc, offset }
    }

    /// Byte offset of this node inside its document. Container offsets feed
    /// the `.keyvalue()` id scheme.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn kind(&self) -> JsonbKind {
        match self.doc.tag(self.offset) {
            TAG_NULL => JsonbKind::Null,
            TAG_FALSE | TAG_TRUE => JsonbKind::Bool,
            TAG_NUMBER => JsonbKind::Number,
            TAG_STRING => JsonbKind::String,
            TAG_ARRAY => JsonbKind::Array,
            TAG_OBJECT => JsonbKind::Object,
            other => unreachable!("corrupt jsonb tag {other}"),
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind(), JsonbKind::Array | JsonbKind::Object)
    }

    pub fn bool_value(&self) -> bool {
        self.doc.tag(self.offset) == TAG_TRUE
    }

    /// Decode a number node. The encoder canonicalized the payload, so this
    /// cannot fail on well-formed documents.
    pub fn number_value(&self) -> BigDecimal {
        BigDecimal::from_str(self.doc.read_str(self.offset))
            .expect("encoder stores canonical decimals")
    }

    pub fn string_value(&self) -> &'a str {
        self.doc.read_str(self.offset)
    }

    /// Element/entry count of a container node. Scalars report zero.
    pub fn len(&self) -> u32 {
        if self.is_container() {
            self.doc.read_u32(self.offset + 1)
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The i-th element of an array node.
    pub fn element(&self, i: u32) -> Option<Node<'a>> {
        if self.kind() != JsonbKind::Array || i >= self.len() {
            return None;
        }
        let child = self.doc.read_u32(self.offset + 5 + i * 4);
        Some(Node::at(self.doc, child))
    }

    /// The i-th entry of an object node, as `(key, value)`.
    pub fn entry(&self, i: u32) -> Option<(&'a str, Node<'a>)> {
        if self.kind() != JsonbKind::Object || i >= self.len() {
            return None;
        }
        let slot = self.offset + 5 + i * 8;
        let key_off = self.doc.read_u32(slot);
        let val_off = self.doc.read_u32(slot + 4);
        Some((self.doc.read_str(key_off), Node::at(self.doc, val_off)))
    }

    /// Binary-search an object node for `key`.
    pub fn find_key(&self, key: &str) -> Option<Node<'a>> {
        if self.kind() != JsonbKind::Object {
            return None;
        }
        let (mut lo, mut hi) = (0u32, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (k, v) = self.entry(mid)?;
            match k.cmp(key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(v),
            }
        }
        None
    }

    /// Decode this node back into a `serde_json::Value`.
    pub fn to_value(&self) -> Value {
        match self.kind() {
            JsonbKind::Null => Value::Null,
            JsonbKind::Bool => Value::Bool(self.bool_value()),
            JsonbKind::Number => {
                let literal = self.doc.read_str(self.offset);
                serde_json::Number::from_str(literal)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
            JsonbKind::String => Value::String(self.string_value().to_string()),
            JsonbKind::Array => {
                let elems = (0..self.len())
                    .filter_map(|i| self.element(i))
                    .map(|n| n.to_value())
                    .collect();
                Value::Array(elems)
            }
            JsonbKind::Object => {
                let mut map = serde_json::Map::new();
                for i in 0..self.len() {
                    if let Some((k, v)) = self.entry(i) {
                        map.insert(k.to_string(), v.to_value());
                    }
                }
                Value::Object(map)
            }
        }
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node@{} {:?}", self.offset, self.to_value())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(v: Value) -> JsonbDoc {
        JsonbDoc::from_value(&v).unwrap()
    }

    // -----------------------------------------------------------------------
    // Round trip
    // -----------------------------------------------------------------------

    #[test]
    fn scalar_roots_round_trip() {
        for v in [json!(null), json!(true), json!(false), json!("hi"), json!(42)] {
            assert_eq!(doc(v.clone()).root().to_value(), v);
        }
    }

    #[test]
    fn nested_document_round_trips() {
        let v = json!({
            "a": {"b": [1, 2, 3]},
            "s": "text",
            "n": -1.25,
            "z": null
        });
        assert_eq!(doc(v.clone()).root().to_value(), v);
    }

    #[test]
    fn number_canonicalization_drops_trailing_zeros() {
        let d = doc(json!([1.50]));
        let elem = d.root().element(0).unwrap();
        assert_eq!(elem.number_value(), BigDecimal::from_str("1.5").unwrap());
    }

    // -----------------------------------------------------------------------
    // Container access
    // -----------------------------------------------------------------------

    #[test]
    fn array_elements_in_document_order() {
        let d = doc(json!([10, "x", null]));
        let root = d.root();
        assert_eq!(root.kind(), JsonbKind::Array);
        assert_eq!(root.len(), 3);
        assert_eq!(root.element(0).unwrap().to_value(), json!(10));
        assert_eq!(root.element(1).unwrap().string_value(), "x");
        assert_eq!(root.element(2).unwrap().kind(), JsonbKind::Null);
        assert!(root.element(3).is_none());
    }

    #[test]
    fn object_entries_sorted_by_key() {
        let d = doc(json!({"b": 2, "a": 1, "c": 3}));
        let keys: Vec<&str> = (0..d.root().len())
            .map(|i| d.root().entry(i).unwrap().0)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn find_key_hits_and_misses() {
        let d = doc(json!({"alpha": 1, "beta": 2, "gamma": 3}));
        let root = d.root();
        assert_eq!(root.find_key("beta").unwrap().to_value(), json!(2));
        assert_eq!(root.find_key("gamma").unwrap().to_value(), json!(3));
        assert!(root.find_key("delta").is_none());
        assert!(root.find_key("").is_none());
    }

    #[test]
    fn find_key_on_non_object_is_none() {
        let d = doc(json!([1, 2]));
        assert!(d.root().find_key("a").is_none());
    }

    // -----------------------------------------------------------------------
    // Offsets
    // -----------------------------------------------------------------------

    #[test]
    fn root_offset_is_zero_and_children_are_distinct() {
        let d = doc(json!({"a": {"x": 1}, "b": {"y": 2}}));
        let root = d.root();
        assert_eq!(root.offset(), 0);
        let a = root.find_key("a").unwrap();
        let b = root.find_key("b").unwrap();
        assert_ne!(a.offset(), b.offset());
        assert!(a.offset() > 0);
    }

    #[test]
    fn offsets_are_deterministic() {
        let v = json!({"k": [1, {"m": true}]});
        let d1 = doc(v.clone());
        let d2 = doc(v);
        let o1 = d1.root().find_key("k").unwrap().offset();
        let o2 = d2.root().find_key("k").unwrap().offset();
        assert_eq!(o1, o2);
    }

    #[test]
    fn parse_rejects_bad_json() {
        assert!(JsonbDoc::parse("{nope").is_err());
    }

    #[test]
    fn parse_accepts_huge_precision_numbers() {
        let d = JsonbDoc::parse("[0.10000000000000000001]").unwrap();
        let n = d.root().element(0).unwrap().number_value();
        assert_eq!(n, BigDecimal::from_str("0.10000000000000000001").unwrap());
    }
}
