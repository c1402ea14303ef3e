//! Item methods: `.size()`, `.abs()`, `.floor()`, `.ceiling()`, `.double()`,
//! `.datetime()` and `.keyvalue()` (`.type()` is handled inline by the
//! dispatcher — it never unwraps its target).

use std::rc::Rc;
use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use serde_json::json;

use crate::datetime::{parse_datetime, TzSpec};
use crate::error::PathError;
use crate::item::{ContainerRef, Item};
use crate::jsonb::JsonbDoc;
use crate::path::{NodeId, PathKind};
use crate::sequence::ValueSeq;

use super::{BaseObject, ExecContext, ExecOutcome, ExecResult};

/// Multiplier of the base-object id in `.keyvalue()` row ids.
const KEYVALUE_ID_BASE: i64 = 10_000_000_000;

impl<'a> ExecContext<'a> {
    pub(crate) fn item_size(
        &mut self,
        id: NodeId,
        value: &Item<'a>,
        found: Option<&mut ValueSeq<'a>>,
    ) -> ExecResult {
        let size = match value {
            Item::Array(c) => i64::from(c.len()),
            // Lax mode sees any non-array as a one-element array.
            _ if !self.strict() => 1,
            _ => return self.structural(PathError::ArrayNotFound),
        };
        self.execute_next(id, Item::Number(size.into()), found)
    }

    /// `.abs()`, `.floor()`, `.ceiling()`.
    pub(crate) fn numeric_method(
        &mut self,
        id: NodeId,
        kind: &PathKind,
        value: &Item<'a>,
        found: Option<&mut ValueSeq<'a>>,
        unwrap: bool,
    ) -> ExecResult {
        if unwrap {
            if let Item::Array(c) = value {
                let c = c.clone();
                return self.execute_unwrap_array(id, &c, found, false);
            }
        }
        let method = match kind {
            PathKind::Abs => "abs",
            PathKind::Floor => "floor",
            PathKind::Ceiling => "ceiling",
            _ => "number",
        };
        let Item::Number(n) = value else {
            return Err(PathError::NonNumeric { method });
        };
        let result = match kind {
            PathKind::Abs => n.abs(),
            PathKind::Floor => n.with_scale_round(0, RoundingMode::Floor),
            _ => n.with_scale_round(0, RoundingMode::Ceiling),
        };
        self.execute_next(id, Item::Number(result), found)
    }

    pub(crate) fn item_double(
        &mut self,
        id: NodeId,
        value: &Item<'a>,
        found: Option<&mut ValueSeq<'a>>,
        unwrap: bool,
    ) -> ExecResult {
        if unwrap {
            if let Item::Array(c) = value {
                let c = c.clone();
                return self.execute_unwrap_array(id, &c, found, false);
            }
        }
        let double = match value {
            Item::Number(n) => n
                .to_f64()
                .filter(|f| f.is_finite())
                .ok_or(PathError::NumericOverflow)?,
            Item::String(s) => {
                let parsed: f64 = s
                    .parse()
                    .map_err(|_| PathError::NonNumeric { method: "double" })?;
                if !parsed.is_finite() {
                    return Err(PathError::NumericOverflow);
                }
                parsed
            }
            Item::Array(_) | Item::Object(_) => {
                return Err(PathError::ScalarRequired { method: "double" })
            }
            _ => return Err(PathError::NonNumeric { method: "double" }),
        };
        // Shortest round-trip text, so .double() of "1.5" is exactly 1.5.
        let result = BigDecimal::from_str(&format!("{double}"))
            .map_err(|_| PathError::NumericOverflow)?;
        self.execute_next(id, Item::Number(result), found)
    }

    pub(crate) fn item_datetime(
        &mut self,
        id: NodeId,
        template: Option<&str>,
        tz: Option<&TzSpec>,
        value: &Item<'a>,
        found: Option<&mut ValueSeq<'a>>,
        unwrap: bool,
    ) -> ExecResult {
        if unwrap {
            if let Item::Array(c) = value {
                let c = c.clone();
                return self.execute_unwrap_array(id, &c, found, false);
            }
        }
        let parsed = match value {
            Item::String(s) => parse_datetime(s, template, tz)?,
            Item::Array(_) | Item::Object(_) => {
                return Err(PathError::ScalarRequired { method: "datetime" })
            }
            _ => {
                return Err(PathError::DatetimeArgument {
                    detail: ".datetime() can only be applied to a string".to_string(),
                })
            }
        };
        self.execute_next(id, Item::Datetime(parsed), found)
    }

    /// Explode an object into `{"key": K, "value": V, "id": I}` rows.
    ///
    /// `I = 10^10 * base_id + offset`, where the offset locates the source
    /// object relative to the current base container and `base_id` is the
    /// id freshly allocated for the emitted row, so ids stay distinct
    /// across rows and across chained `.keyvalue()` calls.
    pub(crate) fn item_keyvalue(
        &mut self,
        id: NodeId,
        value: &Item<'a>,
        mut found: Option<&mut ValueSeq<'a>>,
        unwrap: bool,
    ) -> ExecResult {
        if unwrap {
            if let Item::Array(c) = value {
                let c = c.clone();
                return self.execute_unwrap_array(id, &c, found, false);
            }
        }
        let Item::Object(container) = value else {
            return Err(PathError::ObjectNotFound {
                accessor: "item method .keyvalue()",
            });
        };
        let container = container.clone();
        let rel_offset = i64::from(container.offset()) - i64::from(self.base.offset);

        let mut out = ExecOutcome::NotFound;
        for (key, val) in container.entries() {
            let row_base_id = self.next_object_id;
            self.next_object_id += 1;
            let row_id = KEYVALUE_ID_BASE * i64::from(row_base_id) + rel_offset;

            let row = json!({
                "id": row_id,
                "key": key.as_ref(),
                "value": val.to_json(),
            });
            // Row fields are canonical JSON values, so encoding cannot fail.
            let doc = match JsonbDoc::from_value(&row) {
                Ok(doc) => Rc::new(doc),
                Err(_) => return Err(PathError::NumericOverflow),
            };
            let item = Item::Object(ContainerRef::Synth { doc, offset: 0 });

            let saved = self.base;
            self.base = BaseObject {
                id: row_base_id,
                offset: 0,
            };
            let res = self.execute_next(id, item, found.as_deref_mut());
            self.base = saved;

            if res? == ExecOutcome::Found {
                if found.is_none() {
                    return Ok(ExecOutcome::Found);
                }
                out = ExecOutcome::Found;
            }
        }
        Ok(out)
    }
}
