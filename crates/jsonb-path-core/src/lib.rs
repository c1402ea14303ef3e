//! Executor for the SQL/JSON path language over a binary JSON document
//! model.
//!
//! This crate evaluates pre-compiled path programs ([`CompiledPath`])
//! against binary documents ([`JsonbDoc`]), with the standard strict/lax
//! dual-mode semantics: lax mode auto-unwraps arrays, auto-wraps scalars
//! and treats shape mismatches as empty results, while strict mode
//! observes every error. Filter predicates use three-valued logic —
//! `true`, `false`, `unknown` — collapsed to a boolean only at the
//! outermost filter, match or exists site.
//!
//! Path *text* parsing is out of scope: a front end builds a [`PathExpr`]
//! (tests do the same) and compiles it once. The compiled program is
//! immutable and reusable across documents and threads of its own.
//!
//! ```rust
//! use jsonb_path_core::{path_query, EvalOptions, JsonbDoc, Mode, PathExpr, Variables};
//! use serde_json::json;
//!
//! let doc = JsonbDoc::from_value(&json!({"a": {"b": [1, 2, 3]}}))?;
//! let path = PathExpr::root().key("a").key("b").index(1).compile(Mode::Lax)?;
//! let vars = Variables::new();
//!
//! let rows = path_query(&doc, &path, &vars, &EvalOptions::default())?;
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows.first().unwrap().to_json(), json!(2));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod datetime;
mod error;
mod exec;
mod item;
mod jsonb;
mod path;
mod sequence;
mod vars;

pub use crate::{
    datetime::{DatetimeValue, TzSpec},
    error::{ErrorCode, JsonbError, PathBuildError, PathError},
    exec::{Collation, EvalOptions, DEFAULT_MAX_DEPTH},
    item::{ContainerRef, Item},
    jsonb::{JsonbDoc, JsonbKind, Node},
    path::{
        ArithOp, CmpOp, CompiledPath, Mode, PathExpr, PathLiteral, RegexFlags, UnaryOp,
        ANY_UNBOUNDED,
    },
    sequence::ValueSeq,
    vars::{ResolvedVar, VarLookup, Variables},
};

use serde_json::Value;

/// Does the path select anything in the document?
///
/// Returns `None` when an error was suppressed by [`EvalOptions::silent`].
/// In lax mode the walk short-circuits on the first match; strict mode
/// evaluates to completion so every error is observed first.
pub fn path_exists<'a>(
    doc: &'a JsonbDoc,
    path: &'a CompiledPath,
    vars: &'a dyn VarLookup,
    opts: &EvalOptions<'a>,
) -> Result<Option<bool>, PathError> {
    match exec::evaluate(doc, path, vars, opts, false) {
        Ok(output) => Ok(Some(output.exists)),
        Err(err) => suppress(err, opts.silent).map(|_| None),
    }
}

/// Evaluate a predicate path to a boolean.
///
/// Returns `Some(bool)` for a singleton boolean result and `None` for a
/// singleton `null` (unknown). Any other result shape is a
/// singleton-required error — reported as `None` under
/// [`EvalOptions::silent`].
pub fn path_match<'a>(
    doc: &'a JsonbDoc,
    path: &'a CompiledPath,
    vars: &'a dyn VarLookup,
    opts: &EvalOptions<'a>,
) -> Result<Option<bool>, PathError> {
    let seq = match exec::evaluate(doc, path, vars, opts, true) {
        Ok(output) => output.seq,
        Err(err) => return suppress(err, opts.silent).map(|_| None),
    };
    if seq.len() == 1 {
        match seq.first() {
            Some(Item::Bool(b)) => return Ok(Some(*b)),
            Some(Item::Null) => return Ok(None),
            _ => {}
        }
    }
    let err = PathError::SingletonRequired {
        what: "jsonpath match result".to_string(),
        expected: "boolean",
    };
    suppress(err, opts.silent).map(|_| None)
}

/// All items the path selects, one row per item, in evaluation order.
///
/// A suppressed error yields an empty sequence.
pub fn path_query<'a>(
    doc: &'a JsonbDoc,
    path: &'a CompiledPath,
    vars: &'a dyn VarLookup,
    opts: &EvalOptions<'a>,
) -> Result<ValueSeq<'a>, PathError> {
    match exec::evaluate(doc, path, vars, opts, true) {
        Ok(output) => Ok(output.seq),
        Err(err) => suppress(err, opts.silent).map(|_| ValueSeq::new()),
    }
}

/// The query result wrapped into one JSON array.
pub fn path_query_array<'a>(
    doc: &'a JsonbDoc,
    path: &'a CompiledPath,
    vars: &'a dyn VarLookup,
    opts: &EvalOptions<'a>,
) -> Result<Value, PathError> {
    let seq = path_query(doc, path, vars, opts)?;
    Ok(Value::Array(seq.iter().map(Item::to_json).collect()))
}

/// The first item the path selects, if any.
pub fn path_query_first<'a>(
    doc: &'a JsonbDoc,
    path: &'a CompiledPath,
    vars: &'a dyn VarLookup,
    opts: &EvalOptions<'a>,
) -> Result<Option<Item<'a>>, PathError> {
    let seq = path_query(doc, path, vars, opts)?;
    Ok(seq.into_iter().next())
}

/// Silent mode converts raisable errors into empty results; resource
/// guards always propagate.
fn suppress(err: PathError, silent: bool) -> Result<(), PathError> {
    if silent && !err.is_always_raised() {
        tracing::debug!(error = %err, "suppressed jsonpath error");
        Ok(())
    } else {
        Err(err)
    }
}
