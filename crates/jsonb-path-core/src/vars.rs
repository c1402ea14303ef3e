//! Named path variables.
//!
//! `$name` references resolve through the [`VarLookup`] hook. Besides the
//! item value, each variable carries a *base-object id* — the identity
//! `.keyvalue()` uses to synthesize stable row ids. The root document owns id
//! `0`, variables own `1..=count`, and generated objects continue from
//! `count + 1`.

use serde_json::Value;

use crate::error::JsonbError;
use crate::item::Item;
use crate::jsonb::JsonbDoc;

/// A resolved variable: its item value and its base-object identity.
#[derive(Debug, Clone)]
pub struct ResolvedVar<'a> {
    pub item: Item<'a>,
    pub base_id: u32,
}

/// Resolver hook consumed by the evaluator.
///
/// `var_count` is the probe that sizes the base-object id space before any
/// lookup happens; `resolve` returns `None` for unknown names, which the
/// evaluator reports as an undefined-variable error.
pub trait VarLookup {
    fn var_count(&self) -> u32;
    fn resolve(&self, name: &str) -> Option<ResolvedVar<'_>>;
}

/// Map-backed [`VarLookup`] implementation. Insertion order assigns the
/// base-object ids.
#[derive(Debug, Default)]
pub struct Variables {
    entries: Vec<(String, JsonbDoc)>,
}

impl Variables {
    pub fn new() -> Self {
        Variables::default()
    }

    /// Bind `name` to a JSON value. Re-binding an existing name replaces the
    /// value but keeps its base-object id.
    pub fn insert(&mut self, name: impl Into<String>, value: &Value) -> Result<(), JsonbError> {
        let name = name.into();
        let doc = JsonbDoc::from_value(value)?;
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = doc,
            None => self.entries.push((name, doc)),
        }
        Ok(())
    }

    /// Build the variable set from a JSON object, one binding per key.
    pub fn from_object(value: &Value) -> Result<Self, JsonbError> {
        let mut vars = Variables::new();
        if let Value::Object(map) = value {
            for (name, val) in map {
                vars.insert(name.clone(), val)?;
            }
        }
        Ok(vars)
    }
}

impl VarLookup for Variables {
    fn var_count(&self) -> u32 {
        self.entries.len() as u32
    }

    fn resolve(&self, name: &str) -> Option<ResolvedVar<'_>> {
        self.entries
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| ResolvedVar {
                item: Item::from_node(self.entries[i].1.root()),
                base_id: i as u32 + 1,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insertion_order_assigns_base_ids() {
        let mut vars = Variables::new();
        vars.insert("b", &json!(1)).unwrap();
        vars.insert("a", &json!({"x": 2})).unwrap();
        assert_eq!(vars.var_count(), 2);
        assert_eq!(vars.resolve("b").unwrap().base_id, 1);
        assert_eq!(vars.resolve("a").unwrap().base_id, 2);
        assert!(vars.resolve("c").is_none());
    }

    #[test]
    fn rebinding_keeps_the_id() {
        let mut vars = Variables::new();
        vars.insert("v", &json!(1)).unwrap();
        vars.insert("w", &json!(2)).unwrap();
        vars.insert("v", &json!([3])).unwrap();
        let v = vars.resolve("v").unwrap();
        assert_eq!(v.base_id, 1);
        assert_eq!(v.item.to_json(), json!([3]));
    }

    #[test]
    fn from_object_binds_every_key() {
        let vars = Variables::from_object(&json!({"x": 1, "y": "s"})).unwrap();
        assert_eq!(vars.var_count(), 2);
        assert_eq!(vars.resolve("y").unwrap().item.to_json(), json!("s"));
    }
}
