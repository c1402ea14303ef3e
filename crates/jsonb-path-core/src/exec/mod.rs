//! Evaluator core.
//!
//! Recursive descent over the compiled node arena. Each node kind has one
//! handler; after a handler produces a candidate item it calls
//! [`ExecContext::execute_next`], which either recurses into the chained
//! node or appends the item to the caller's sink. With no sink the walk
//! short-circuits on the first satisfying item — except in strict mode,
//! where the entry point always installs a sink so every error is observed
//! before the result is reported.
//!
//! Lax behavior splits into three flags the handlers consult separately:
//! auto-unwrap on access, auto-wrap on subscript, and ignore-structural
//! errors. `.**` descent forces the last one on regardless of mode.

mod arith;
mod methods;
mod predicate;

pub(crate) use predicate::Truth;

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use chrono::FixedOffset;

use crate::error::PathError;
use crate::item::{ContainerRef, Item};
use crate::jsonb::JsonbDoc;
use crate::path::{CompiledPath, Mode, NodeId, PathKind, Subscript};
use crate::sequence::ValueSeq;
use crate::vars::VarLookup;

/// Default recursion ceiling; one level per path node visited.
pub const DEFAULT_MAX_DEPTH: u32 = 256;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// String ordering hook. The evaluator compares strings bytewise for
/// equality and delegates `<`/`>` ordering to this handle when present.
pub trait Collation {
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

/// Per-call evaluation options.
pub struct EvalOptions<'a> {
    /// Suppress raisable errors: the top-level API reports `None`/empty
    /// instead. Resource guards (depth, interrupt) are never suppressed.
    pub silent: bool,
    /// Time zone for datetime coercions that need one; without it those
    /// comparisons yield `unknown`.
    pub timezone: Option<FixedOffset>,
    /// Recursion ceiling.
    pub max_depth: u32,
    /// Optional collation for string ordering comparisons.
    pub collation: Option<&'a dyn Collation>,
    /// Interrupt hook, checked at every recursion entry and inside `.**`
    /// descent. Returning `true` aborts the evaluation.
    pub interrupt: Option<&'a dyn Fn() -> bool>,
}

impl Default for EvalOptions<'_> {
    fn default() -> Self {
        EvalOptions {
            silent: false,
            timezone: None,
            max_depth: DEFAULT_MAX_DEPTH,
            collation: None,
            interrupt: None,
        }
    }
}

impl fmt::Debug for EvalOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalOptions")
            .field("silent", &self.silent)
            .field("timezone", &self.timezone)
            .field("max_depth", &self.max_depth)
            .field("collation", &self.collation.map(|_| "custom"))
            .field("interrupt", &self.interrupt.map(|_| "hook"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecOutcome {
    Found,
    NotFound,
}

pub(crate) type ExecResult = Result<ExecOutcome, PathError>;

/// Identity of the object a `.keyvalue()` result derives from.
#[derive(Debug, Clone, Copy)]
struct BaseObject {
    id: u32,
    offset: u32,
}

pub(crate) struct ExecContext<'a> {
    path: &'a CompiledPath,
    vars: &'a dyn VarLookup,
    root: Item<'a>,
    /// LIFO of `@` items; the top is the innermost filtered item.
    current: Vec<Item<'a>>,
    base: BaseObject,
    /// Size of the innermost subscripted array; `None` outside subscripts.
    last_array_size: Option<i64>,
    ignore_structural: bool,
    /// Monotonic id source for `.keyvalue()` rows, seeded past the
    /// variable base ids.
    next_object_id: u32,
    depth: u32,
    max_depth: u32,
    timezone: Option<FixedOffset>,
    collation: Option<&'a dyn Collation>,
    interrupt: Option<&'a dyn Fn() -> bool>,
}

/// Result of one top-level evaluation.
pub(crate) struct EvalOutput<'a> {
    pub exists: bool,
    pub seq: ValueSeq<'a>,
}

/// Evaluate a compiled path against a document.
///
/// When `want_results` is false and the mode allows it, the walk stops at
/// the first satisfying item; strict mode always materializes the full
/// sequence so that every error is observed before reporting.
pub(crate) fn evaluate<'a>(
    doc: &'a JsonbDoc,
    path: &'a CompiledPath,
    vars: &'a dyn VarLookup,
    opts: &EvalOptions<'a>,
    want_results: bool,
) -> Result<EvalOutput<'a>, PathError> {
    let root = Item::from_node(doc.root());
    let mut ctx = ExecContext {
        path,
        vars,
        root: root.clone(),
        current: vec![root.clone()],
        base: BaseObject { id: 0, offset: 0 },
        last_array_size: None,
        ignore_structural: false,
        next_object_id: vars.var_count() + 1,
        depth: 0,
        max_depth: opts.max_depth,
        timezone: opts.timezone,
        collation: opts.collation,
        interrupt: opts.interrupt,
    };
    tracing::debug!(
        mode = ?path.mode(),
        predicate = path.is_predicate(),
        "executing jsonpath"
    );

    let use_sink = want_results || ctx.strict();
    let mut seq = ValueSeq::new();
    let sink = if use_sink { Some(&mut seq) } else { None };
    let outcome = ctx.execute_item(path.entry(), &root, sink)?;

    let exists = if use_sink {
        !seq.is_empty()
    } else {
        outcome == ExecOutcome::Found
    };
    Ok(EvalOutput { exists, seq })
}

impl<'a> ExecContext<'a> {
    // ── Mode flags ──────────────────────────────────────────────────────

    fn lax(&self) -> bool {
        self.path.mode() == Mode::Lax
    }

    pub(crate) fn strict(&self) -> bool {
        !self.lax()
    }

    fn auto_unwrap(&self) -> bool {
        self.lax()
    }

    fn auto_wrap(&self) -> bool {
        self.lax()
    }

    fn structural_suppressed(&self) -> bool {
        self.ignore_structural || self.lax()
    }

    /// Raise a structural error, or report an empty result where the mode
    /// suppresses it.
    fn structural(&self, err: PathError) -> ExecResult {
        if self.structural_suppressed() {
            Ok(ExecOutcome::NotFound)
        } else {
            Err(err)
        }
    }

    fn check_interrupt(&self) -> Result<(), PathError> {
        if let Some(hook) = self.interrupt {
            if hook() {
                return Err(PathError::Interrupted);
            }
        }
        Ok(())
    }

    fn enter(&mut self) -> Result<(), PathError> {
        self.check_interrupt()?;
        if self.depth >= self.max_depth {
            return Err(PathError::RecursionDepthExceeded {
                max: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    pub(crate) fn timezone(&self) -> Option<FixedOffset> {
        self.timezone
    }

    pub(crate) fn collate(&self, a: &str, b: &str) -> Ordering {
        match self.collation {
            Some(collation) => collation.compare(a, b),
            None => a.cmp(b),
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &'a crate::path::PathNode {
        let path = self.path;
        &path[id]
    }

    // ── Core recursion ──────────────────────────────────────────────────

    pub(crate) fn execute_item(
        &mut self,
        id: NodeId,
        value: &Item<'a>,
        found: Option<&mut ValueSeq<'a>>,
    ) -> ExecResult {
        let unwrap = self.auto_unwrap();
        self.execute_item_opt_unwrap_target(id, value, found, unwrap)
    }

    fn execute_item_opt_unwrap_target(
        &mut self,
        id: NodeId,
        value: &Item<'a>,
        mut found: Option<&mut ValueSeq<'a>>,
        unwrap: bool,
    ) -> ExecResult {
        self.enter()?;
        let res = self.dispatch(id, value, found.as_deref_mut(), unwrap);
        self.leave();
        res
    }

    /// Hand the candidate item to the chained node, or append it to the
    /// sink when the chain ends here.
    pub(crate) fn execute_next(
        &mut self,
        id: NodeId,
        value: Item<'a>,
        found: Option<&mut ValueSeq<'a>>,
    ) -> ExecResult {
        match self.node(id).next {
            Some(next) => self.execute_item(next, &value, found),
            None => {
                if let Some(seq) = found {
                    seq.push(value);
                }
                Ok(ExecOutcome::Found)
            }
        }
    }

    /// Evaluate a subexpression into a fresh sequence. With `unwrap`, lax
    /// mode flattens one level of arrays out of the result.
    pub(crate) fn execute_to_seq(
        &mut self,
        id: NodeId,
        value: &Item<'a>,
        unwrap: bool,
    ) -> Result<ValueSeq<'a>, PathError> {
        if unwrap && self.auto_unwrap() {
            let mut raw = ValueSeq::new();
            self.execute_item(id, value, Some(&mut raw))?;
            let mut seq = ValueSeq::new();
            for item in raw {
                match &item {
                    Item::Array(c) => {
                        for elem in c.elements() {
                            seq.push(elem);
                        }
                    }
                    _ => seq.push(item),
                }
            }
            Ok(seq)
        } else {
            let mut seq = ValueSeq::new();
            self.execute_item(id, value, Some(&mut seq))?;
            Ok(seq)
        }
    }

    /// Re-apply the node at `id` to every element of an array (lax
    /// auto-unwrap of the access target).
    pub(crate) fn execute_unwrap_array(
        &mut self,
        id: NodeId,
        container: &ContainerRef<'a>,
        mut found: Option<&mut ValueSeq<'a>>,
        unwrap_elements: bool,
    ) -> ExecResult {
        let mut out = ExecOutcome::NotFound;
        for elem in container.elements() {
            let res =
                self.execute_item_opt_unwrap_target(id, &elem, found.as_deref_mut(), unwrap_elements)?;
            if res == ExecOutcome::Found {
                if found.is_none() {
                    return Ok(ExecOutcome::Found);
                }
                out = ExecOutcome::Found;
            }
        }
        Ok(out)
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    fn dispatch(
        &mut self,
        id: NodeId,
        value: &Item<'a>,
        mut found: Option<&mut ValueSeq<'a>>,
        unwrap: bool,
    ) -> ExecResult {
        let path = self.path;
        let node = &path[id];
        tracing::trace!(kind = node.kind.name(), depth = self.depth, "path step");

        match &node.kind {
            PathKind::Root => {
                self.base = BaseObject { id: 0, offset: 0 };
                let root = self.root.clone();
                self.execute_next(id, root, found)
            }

            PathKind::Current => {
                let Some(current) = self.current.last().cloned() else {
                    return Ok(ExecOutcome::NotFound);
                };
                self.execute_next(id, current, found)
            }

            PathKind::Last => match self.last_array_size {
                None => Err(PathError::LastOutsideSubscript),
                Some(size) => self.execute_next(id, Item::Number((size - 1).into()), found),
            },

            PathKind::Literal(lit) => {
                let item = literal_item(lit);
                self.execute_next(id, item, found)
            }

            PathKind::Variable(name) => {
                let resolved =
                    self.vars
                        .resolve(name)
                        .ok_or_else(|| PathError::UndefinedVariable {
                            name: name.clone(),
                        })?;
                let saved = self.base;
                self.base = BaseObject {
                    id: resolved.base_id,
                    offset: resolved
                        .item
                        .as_container()
                        .map(|c| c.offset())
                        .unwrap_or(0),
                };
                let res = self.execute_next(id, resolved.item, found);
                self.base = saved;
                res
            }

            PathKind::Key(name) => match value {
                Item::Object(c) => match c.find_key(name) {
                    Some(child) => self.execute_next(id, child, found),
                    None => self.structural(PathError::MemberNotFound { key: name.clone() }),
                },
                Item::Array(c) if unwrap => {
                    let c = c.clone();
                    self.execute_unwrap_array(id, &c, found, false)
                }
                _ => self.structural(PathError::ObjectNotFound {
                    accessor: "member accessor",
                }),
            },

            PathKind::WildMember => match value {
                Item::Object(c) => {
                    let c = c.clone();
                    let mut out = ExecOutcome::NotFound;
                    for (_, child) in c.entries() {
                        let res = self.execute_next(id, child, found.as_deref_mut())?;
                        if res == ExecOutcome::Found {
                            if found.is_none() {
                                return Ok(ExecOutcome::Found);
                            }
                            out = ExecOutcome::Found;
                        }
                    }
                    Ok(out)
                }
                Item::Array(c) if unwrap => {
                    let c = c.clone();
                    self.execute_unwrap_array(id, &c, found, false)
                }
                _ => self.structural(PathError::ObjectNotFound {
                    accessor: "wildcard member accessor",
                }),
            },

            PathKind::WildElement => match value {
                Item::Array(c) => {
                    let c = c.clone();
                    let mut out = ExecOutcome::NotFound;
                    for elem in c.elements() {
                        let res = self.execute_next(id, elem, found.as_deref_mut())?;
                        if res == ExecOutcome::Found {
                            if found.is_none() {
                                return Ok(ExecOutcome::Found);
                            }
                            out = ExecOutcome::Found;
                        }
                    }
                    Ok(out)
                }
                _ if self.auto_wrap() => self.execute_next(id, value.clone(), found),
                _ => self.structural(PathError::ArrayNotFound),
            },

            PathKind::Subscripts(subs) => self.execute_subscripts(id, subs, value, found),

            PathKind::Recursive { first, last } => {
                self.execute_recursive(id, value, found, *first, *last)
            }

            PathKind::Filter(pred) => {
                if unwrap {
                    if let Item::Array(c) = value {
                        let c = c.clone();
                        return self.execute_unwrap_array(id, &c, found, false);
                    }
                }
                let pred = *pred;
                self.current.push(value.clone());
                let truth = self.execute_bool(pred, value);
                self.current.pop();
                match truth? {
                    Truth::True => self.execute_next(id, value.clone(), found),
                    Truth::Unknown if self.strict() => Err(PathError::PredicateUnknown),
                    _ => Ok(ExecOutcome::NotFound),
                }
            }

            PathKind::Type => {
                let name = value.type_name();
                self.execute_next(id, Item::String(Cow::Borrowed(name)), found)
            }

            PathKind::Size => self.item_size(id, value, found),

            PathKind::Abs | PathKind::Floor | PathKind::Ceiling => {
                self.numeric_method(id, &node.kind, value, found, unwrap)
            }

            PathKind::Double => self.item_double(id, value, found, unwrap),

            PathKind::Datetime { template, tz } => {
                self.item_datetime(id, template.as_deref(), tz.as_ref(), value, found, unwrap)
            }

            PathKind::KeyValue => self.item_keyvalue(id, value, found, unwrap),

            PathKind::Arith { op, left, right } => {
                self.execute_binary_arith(id, *op, *left, *right, value, found)
            }

            PathKind::Unary { op, arg } => self.execute_unary_arith(id, *op, *arg, value, found),

            PathKind::Not(_)
            | PathKind::IsUnknown(_)
            | PathKind::And(..)
            | PathKind::Or(..)
            | PathKind::Compare { .. }
            | PathKind::StartsWith { .. }
            | PathKind::LikeRegex { .. }
            | PathKind::Exists(_) => {
                let truth = self.execute_bool(id, value)?;
                self.append_bool_result(id, truth, found)
            }
        }
    }

    /// Wrap a tri-state result into an item (`unknown` becomes JSON null)
    /// and hand it down the chain.
    fn append_bool_result(
        &mut self,
        id: NodeId,
        truth: Truth,
        found: Option<&mut ValueSeq<'a>>,
    ) -> ExecResult {
        let item = match truth {
            Truth::True => Item::Bool(true),
            Truth::False => Item::Bool(false),
            Truth::Unknown => Item::Null,
        };
        self.execute_next(id, item, found)
    }

    // ── Array subscripts ────────────────────────────────────────────────

    fn execute_subscripts(
        &mut self,
        id: NodeId,
        subs: &[Subscript],
        value: &Item<'a>,
        found: Option<&mut ValueSeq<'a>>,
    ) -> ExecResult {
        let (container, size) = match value {
            Item::Array(c) => (Some(c.clone()), i64::from(c.len())),
            _ if self.auto_wrap() => (None, 1),
            _ => return self.structural(PathError::ArrayNotFound),
        };

        let saved = self.last_array_size;
        self.last_array_size = Some(size);
        let res = self.run_subscripts(id, subs, value, container.as_ref(), size, found);
        self.last_array_size = saved;
        res
    }

    fn run_subscripts(
        &mut self,
        id: NodeId,
        subs: &[Subscript],
        value: &Item<'a>,
        container: Option<&ContainerRef<'a>>,
        size: i64,
        mut found: Option<&mut ValueSeq<'a>>,
    ) -> ExecResult {
        let mut out = ExecOutcome::NotFound;
        for sub in subs {
            let index_from = self.array_index(sub.from, value)?;
            let index_to = match sub.to {
                Some(to) => self.array_index(to, value)?,
                None => index_from,
            };

            if self.strict() && (index_from < 0 || index_from > index_to || index_to >= size) {
                return Err(PathError::InvalidSubscript {
                    detail: "is out of bounds",
                });
            }
            let lo = index_from.max(0);
            let hi = index_to.min(size - 1);

            for i in lo..=hi {
                let elem = match container {
                    Some(c) => match c.element(i as u32) {
                        Some(elem) => elem,
                        None => continue,
                    },
                    // Auto-wrapped scalar: index 0 is the item itself.
                    None => value.clone(),
                };
                let res = self.execute_next(id, elem, found.as_deref_mut())?;
                if res == ExecOutcome::Found {
                    if found.is_none() {
                        return Ok(ExecOutcome::Found);
                    }
                    out = ExecOutcome::Found;
                }
            }
        }
        Ok(out)
    }

    /// Evaluate one subscript expression to a single truncated i64 index.
    fn array_index(&mut self, id: NodeId, value: &Item<'a>) -> Result<i64, PathError> {
        let seq = self.execute_to_seq(id, value, false)?;
        let non_singleton = PathError::InvalidSubscript {
            detail: "is not a single numeric value",
        };
        if seq.len() != 1 {
            return Err(non_singleton);
        }
        match seq.first() {
            Some(Item::Number(n)) => {
                use bigdecimal::{RoundingMode, ToPrimitive};
                n.with_scale_round(0, RoundingMode::Down)
                    .to_i32()
                    .map(i64::from)
                    .ok_or(PathError::InvalidSubscript {
                        detail: "is out of bounds",
                    })
            }
            _ => Err(non_singleton),
        }
    }

    // ── Recursive descent ───────────────────────────────────────────────

    fn execute_recursive(
        &mut self,
        id: NodeId,
        value: &Item<'a>,
        mut found: Option<&mut ValueSeq<'a>>,
        first: u32,
        last: u32,
    ) -> ExecResult {
        let mut out = ExecOutcome::NotFound;

        // Depth 0 is the item itself; try it before descending.
        if first == 0 {
            let saved = self.ignore_structural;
            self.ignore_structural = true;
            let res = self.execute_next(id, value.clone(), found.as_deref_mut());
            self.ignore_structural = saved;
            if res? == ExecOutcome::Found {
                if found.is_none() {
                    return Ok(ExecOutcome::Found);
                }
                out = ExecOutcome::Found;
            }
        }

        if last >= 1 {
            if let Some(container) = value.as_container() {
                let container = container.clone();
                let res = self.execute_any(id, &container, found, 1, first, last)?;
                if res == ExecOutcome::Found {
                    out = ExecOutcome::Found;
                }
            }
        }
        Ok(out)
    }

    /// Pre-order walk over a container's sub-items, applying the chained
    /// node to every item whose depth lies in `[first, last]`. Structural
    /// errors are suppressed for the whole descent.
    fn execute_any(
        &mut self,
        id: NodeId,
        container: &ContainerRef<'a>,
        mut found: Option<&mut ValueSeq<'a>>,
        level: u32,
        first: u32,
        last: u32,
    ) -> ExecResult {
        let mut out = ExecOutcome::NotFound;
        let children: Vec<Item<'a>> = if container.is_object() {
            container.entries().map(|(_, v)| v).collect()
        } else {
            container.elements().collect()
        };

        for child in children {
            self.check_interrupt()?;

            if level >= first && level <= last {
                let saved = self.ignore_structural;
                self.ignore_structural = true;
                let res = self.execute_next(id, child.clone(), found.as_deref_mut());
                self.ignore_structural = saved;
                if res? == ExecOutcome::Found {
                    if found.is_none() {
                        return Ok(ExecOutcome::Found);
                    }
                    out = ExecOutcome::Found;
                }
            }

            if level < last {
                if let Some(sub) = child.as_container() {
                    let sub = sub.clone();
                    let res =
                        self.execute_any(id, &sub, found.as_deref_mut(), level + 1, first, last)?;
                    if res == ExecOutcome::Found {
                        if found.is_none() {
                            return Ok(ExecOutcome::Found);
                        }
                        out = ExecOutcome::Found;
                    }
                }
            }
        }
        Ok(out)
    }
}

fn literal_item<'a>(lit: &'a crate::path::PathLiteral) -> Item<'a> {
    use crate::path::PathLiteral;
    match lit {
        PathLiteral::Null => Item::Null,
        PathLiteral::Bool(b) => Item::Bool(*b),
        PathLiteral::Number(n) => Item::Number(n.clone()),
        PathLiteral::String(s) => Item::String(Cow::Borrowed(s.as_str())),
    }
}
