//! Compiled path programs.
//!
//! A front-end parser (out of scope here) or test code builds a [`PathExpr`]
//! tree with the fluent constructors, then compiles it into a
//! [`CompiledPath`]: a flat arena of immutable nodes, each with an optional
//! *next* link (the accessor chained to its right) and argument links into
//! the arena. The evaluator only ever reads the arena.
//!
//! Compilation also enforces placement rules the grammar would normally
//! guarantee: predicates may appear only as the path root, as a filter
//! argument, or under the boolean connectives.

use std::ops::Index;

use bigdecimal::BigDecimal;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::datetime::TzSpec;
use crate::error::PathBuildError;

/// Evaluation mode, a property of the compiled path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Auto-unwrap arrays, auto-wrap scalars, treat shape mismatches as
    /// empty results.
    #[default]
    Lax,
    /// Observe every error and reject structural mismatches.
    Strict,
}

/// Upper bound of an unbounded `.**` descent.
pub const ANY_UNBOUNDED: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Literals and operators
// ---------------------------------------------------------------------------

/// A literal embedded in a path program.
#[derive(Debug, Clone, PartialEq)]
pub enum PathLiteral {
    Null,
    Bool(bool),
    Number(BigDecimal),
    String(String),
}

impl From<bool> for PathLiteral {
    fn from(v: bool) -> Self {
        PathLiteral::Bool(v)
    }
}

impl From<i64> for PathLiteral {
    fn from(v: i64) -> Self {
        PathLiteral::Number(v.into())
    }
}

impl From<i32> for PathLiteral {
    fn from(v: i32) -> Self {
        PathLiteral::Number(v.into())
    }
}

impl From<f64> for PathLiteral {
    fn from(v: f64) -> Self {
        use std::str::FromStr;
        // Shortest round-trip text keeps literals like 1.5 exact.
        PathLiteral::Number(BigDecimal::from_str(&format!("{v}")).unwrap_or_default())
    }
}

impl From<BigDecimal> for PathLiteral {
    fn from(v: BigDecimal) -> Self {
        PathLiteral::Number(v)
    }
}

impl From<&str> for PathLiteral {
    fn from(v: &str) -> Self {
        PathLiteral::String(v.to_string())
    }
}

impl From<String> for PathLiteral {
    fn from(v: String) -> Self {
        PathLiteral::String(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

impl UnaryOp {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
        }
    }
}

/// `like_regex` flag set (`i`, `s`, `m`, `x`, `q`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegexFlags {
    pub case_insensitive: bool,
    pub dot_all: bool,
    pub multi_line: bool,
    pub ignore_whitespace: bool,
    pub literal: bool,
}

impl RegexFlags {
    pub fn parse(flags: &str) -> Result<Self, PathBuildError> {
        let mut out = RegexFlags::default();
        for flag in flags.chars() {
            match flag {
                'i' => out.case_insensitive = true,
                's' => out.dot_all = true,
                'm' => out.multi_line = true,
                'x' => out.ignore_whitespace = true,
                'q' => out.literal = true,
                other => return Err(PathBuildError::UnknownRegexFlag { flag: other }),
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Compiled arena
// ---------------------------------------------------------------------------

/// Index of a node inside a [`CompiledPath`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeId(u32);

/// One array subscript: an index expression, or a `from TO to` pair.
#[derive(Debug, Clone)]
pub(crate) struct Subscript {
    pub from: NodeId,
    pub to: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub(crate) enum PathKind {
    Root,
    Current,
    Last,
    Literal(PathLiteral),
    Variable(String),
    Key(String),
    WildMember,
    WildElement,
    Subscripts(Vec<Subscript>),
    Recursive {
        first: u32,
        last: u32,
    },
    Filter(NodeId),
    Type,
    Size,
    Abs,
    Floor,
    Ceiling,
    Double,
    KeyValue,
    Datetime {
        template: Option<String>,
        tz: Option<TzSpec>,
    },
    Not(NodeId),
    IsUnknown(NodeId),
    And(NodeId, NodeId),
    Or(NodeId, NodeId),
    Compare {
        op: CmpOp,
        left: NodeId,
        right: NodeId,
    },
    StartsWith {
        left: NodeId,
        right: NodeId,
    },
    LikeRegex {
        target: NodeId,
        pattern: String,
        flags: RegexFlags,
        regex: OnceCell<Regex>,
    },
    Exists(NodeId),
    Arith {
        op: ArithOp,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: UnaryOp,
        arg: NodeId,
    },
}

impl PathKind {
    fn is_predicate(&self) -> bool {
        matches!(
            self,
            PathKind::Not(_)
                | PathKind::IsUnknown(_)
                | PathKind::And(..)
                | PathKind::Or(..)
                | PathKind::Compare { .. }
                | PathKind::StartsWith { .. }
                | PathKind::LikeRegex { .. }
                | PathKind::Exists(_)
        )
    }

    /// Short name used in trace output.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            PathKind::Root => "$",
            PathKind::Current => "@",
            PathKind::Last => "last",
            PathKind::Literal(_) => "literal",
            PathKind::Variable(_) => "variable",
            PathKind::Key(_) => "key",
            PathKind::WildMember => ".*",
            PathKind::WildElement => "[*]",
            PathKind::Subscripts(_) => "subscript",
            PathKind::Recursive { .. } => ".**",
            PathKind::Filter(_) => "filter",
            PathKind::Type => "type",
            PathKind::Size => "size",
            PathKind::Abs => "abs",
            PathKind::Floor => "floor",
            PathKind::Ceiling => "ceiling",
            PathKind::Double => "double",
            PathKind::KeyValue => "keyvalue",
            PathKind::Datetime { .. } => "datetime",
            PathKind::Not(_) => "!",
            PathKind::IsUnknown(_) => "is unknown",
            PathKind::And(..) => "&&",
            PathKind::Or(..) => "||",
            PathKind::Compare { op, .. } => op.as_str(),
            PathKind::StartsWith { .. } => "starts with",
            PathKind::LikeRegex { .. } => "like_regex",
            PathKind::Exists(_) => "exists",
            PathKind::Arith { op, .. } => op.as_str(),
            PathKind::Unary { op, .. } => op.as_str(),
        }
    }
}

/// One immutable node of a compiled path.
#[derive(Debug, Clone)]
pub(crate) struct PathNode {
    pub kind: PathKind,
    pub next: Option<NodeId>,
}

impl PathNode {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// A compiled, immutable path program.
#[derive(Debug, Clone)]
pub struct CompiledPath {
    nodes: Vec<PathNode>,
    entry: NodeId,
    mode: Mode,
    predicate: bool,
}

impl CompiledPath {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// True when the whole path is a predicate (`@@`-style programs), whose
    /// result is a single `true`/`false`/`null` item.
    pub fn is_predicate(&self) -> bool {
        self.predicate
    }

    pub(crate) fn entry(&self) -> NodeId {
        self.entry
    }
}

impl Index<NodeId> for CompiledPath {
    type Output = PathNode;

    fn index(&self, id: NodeId) -> &PathNode {
        &self.nodes[id.0 as usize]
    }
}

// ---------------------------------------------------------------------------
// Expression tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Seg {
    Root,
    Current,
    Last,
    Literal(PathLiteral),
    Variable(String),
    Key(String),
    WildMember,
    WildElement,
    Subscripts(Vec<(PathExpr, Option<PathExpr>)>),
    Recursive { first: u32, last: u32 },
    Filter(Box<PathExpr>),
    Type,
    Size,
    Abs,
    Floor,
    Ceiling,
    Double,
    KeyValue,
    Datetime {
        template: Option<String>,
        tz: Option<TzSpec>,
    },
    Not(Box<PathExpr>),
    IsUnknown(Box<PathExpr>),
    And(Box<PathExpr>, Box<PathExpr>),
    Or(Box<PathExpr>, Box<PathExpr>),
    Compare(CmpOp, Box<PathExpr>, Box<PathExpr>),
    StartsWith(Box<PathExpr>, Box<PathExpr>),
    LikeRegex {
        target: Box<PathExpr>,
        pattern: String,
        flags: String,
    },
    Exists(Box<PathExpr>),
    Arith(ArithOp, Box<PathExpr>, Box<PathExpr>),
    Unary(UnaryOp, Box<PathExpr>),
}

impl Seg {
    fn is_predicate(&self) -> bool {
        matches!(
            self,
            Seg::Not(_)
                | Seg::IsUnknown(_)
                | Seg::And(..)
                | Seg::Or(..)
                | Seg::Compare(..)
                | Seg::StartsWith(..)
                | Seg::LikeRegex { .. }
                | Seg::Exists(_)
        )
    }
}

/// An owned path expression, built with the fluent constructors below and
/// compiled with [`PathExpr::compile`].
#[derive(Debug, Clone)]
pub struct PathExpr {
    segs: Vec<Seg>,
}

impl PathExpr {
    fn head(seg: Seg) -> Self {
        PathExpr { segs: vec![seg] }
    }

    fn step(mut self, seg: Seg) -> Self {
        self.segs.push(seg);
        self
    }

    // ── Heads ───────────────────────────────────────────────────────────

    /// `$` — the root document.
    pub fn root() -> Self {
        Self::head(Seg::Root)
    }

    /// `@` — the innermost filtered item.
    pub fn current() -> Self {
        Self::head(Seg::Current)
    }

    /// `last` — size minus one of the innermost subscripted array.
    pub fn last() -> Self {
        Self::head(Seg::Last)
    }

    /// A literal value.
    pub fn lit(value: impl Into<PathLiteral>) -> Self {
        Self::head(Seg::Literal(value.into()))
    }

    /// The `null` literal.
    pub fn null() -> Self {
        Self::head(Seg::Literal(PathLiteral::Null))
    }

    /// `$name` — a named variable.
    pub fn var(name: impl Into<String>) -> Self {
        Self::head(Seg::Variable(name.into()))
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// `.name` member accessor.
    pub fn key(self, name: impl Into<String>) -> Self {
        self.step(Seg::Key(name.into()))
    }

    /// `.*` wildcard member accessor.
    pub fn wild_member(self) -> Self {
        self.step(Seg::WildMember)
    }

    /// `[*]` wildcard element accessor.
    pub fn wild_element(self) -> Self {
        self.step(Seg::WildElement)
    }

    /// `[i]` element accessor with a literal index.
    pub fn index(self, i: i64) -> Self {
        self.subscript(PathExpr::lit(i))
    }

    /// `[from to to]` element accessor with literal bounds.
    pub fn index_range(self, from: i64, to: i64) -> Self {
        self.subscript_range(PathExpr::lit(from), PathExpr::lit(to))
    }

    /// `[expr]` element accessor with a computed index.
    pub fn subscript(self, index: PathExpr) -> Self {
        self.step(Seg::Subscripts(vec![(index, None)]))
    }

    /// `[from to to]` element accessor with computed bounds.
    pub fn subscript_range(self, from: PathExpr, to: PathExpr) -> Self {
        self.step(Seg::Subscripts(vec![(from, Some(to))]))
    }

    /// `[s1, s2, ...]` general subscript list.
    pub fn subscripts(self, list: Vec<(PathExpr, Option<PathExpr>)>) -> Self {
        self.step(Seg::Subscripts(list))
    }

    /// `.**` unbounded recursive descent.
    pub fn recursive(self) -> Self {
        self.step(Seg::Recursive {
            first: 0,
            last: ANY_UNBOUNDED,
        })
    }

    /// `.**{first, last}` bounded recursive descent; pass
    /// [`ANY_UNBOUNDED`] for an open upper bound.
    pub fn recursive_bounded(self, first: u32, last: u32) -> Self {
        self.step(Seg::Recursive { first, last })
    }

    /// `?(pred)` filter.
    pub fn filter(self, pred: PathExpr) -> Self {
        self.step(Seg::Filter(Box::new(pred)))
    }

    // ── Item methods ────────────────────────────────────────────────────

    pub fn type_of(self) -> Self {
        self.step(Seg::Type)
    }

    pub fn size_of(self) -> Self {
        self.step(Seg::Size)
    }

    pub fn abs(self) -> Self {
        self.step(Seg::Abs)
    }

    pub fn floor(self) -> Self {
        self.step(Seg::Floor)
    }

    pub fn ceiling(self) -> Self {
        self.step(Seg::Ceiling)
    }

    pub fn double(self) -> Self {
        self.step(Seg::Double)
    }

    pub fn keyvalue(self) -> Self {
        self.step(Seg::KeyValue)
    }

    /// `.datetime()` — parse with the default ISO template list.
    pub fn datetime(self) -> Self {
        self.step(Seg::Datetime {
            template: None,
            tz: None,
        })
    }

    /// `.datetime(template)`.
    pub fn datetime_format(self, template: impl Into<String>) -> Self {
        self.step(Seg::Datetime {
            template: Some(template.into()),
            tz: None,
        })
    }

    /// `.datetime(template, tz)`.
    pub fn datetime_format_tz(self, template: impl Into<String>, tz: TzSpec) -> Self {
        self.step(Seg::Datetime {
            template: Some(template.into()),
            tz: Some(tz),
        })
    }

    // ── Predicates ──────────────────────────────────────────────────────

    pub fn and(left: PathExpr, right: PathExpr) -> Self {
        Self::head(Seg::And(Box::new(left), Box::new(right)))
    }

    pub fn or(left: PathExpr, right: PathExpr) -> Self {
        Self::head(Seg::Or(Box::new(left), Box::new(right)))
    }

    pub fn not(pred: PathExpr) -> Self {
        Self::head(Seg::Not(Box::new(pred)))
    }

    pub fn is_unknown(pred: PathExpr) -> Self {
        Self::head(Seg::IsUnknown(Box::new(pred)))
    }

    pub fn compare(op: CmpOp, left: PathExpr, right: PathExpr) -> Self {
        Self::head(Seg::Compare(op, Box::new(left), Box::new(right)))
    }

    pub fn eq(left: PathExpr, right: PathExpr) -> Self {
        Self::compare(CmpOp::Eq, left, right)
    }

    pub fn ne(left: PathExpr, right: PathExpr) -> Self {
        Self::compare(CmpOp::Ne, left, right)
    }

    pub fn lt(left: PathExpr, right: PathExpr) -> Self {
        Self::compare(CmpOp::Lt, left, right)
    }

    pub fn le(left: PathExpr, right: PathExpr) -> Self {
        Self::compare(CmpOp::Le, left, right)
    }

    pub fn gt(left: PathExpr, right: PathExpr) -> Self {
        Self::compare(CmpOp::Gt, left, right)
    }

    pub fn ge(left: PathExpr, right: PathExpr) -> Self {
        Self::compare(CmpOp::Ge, left, right)
    }

    /// `target starts with prefix`.
    pub fn starts_with(target: PathExpr, prefix: PathExpr) -> Self {
        Self::head(Seg::StartsWith(Box::new(target), Box::new(prefix)))
    }

    /// `target like_regex pattern flag "flags"`.
    pub fn like_regex(
        target: PathExpr,
        pattern: impl Into<String>,
        flags: impl Into<String>,
    ) -> Self {
        Self::head(Seg::LikeRegex {
            target: Box::new(target),
            pattern: pattern.into(),
            flags: flags.into(),
        })
    }

    /// `exists(path)`.
    pub fn exists(path: PathExpr) -> Self {
        Self::head(Seg::Exists(Box::new(path)))
    }

    // ── Arithmetic ──────────────────────────────────────────────────────

    pub fn arith(op: ArithOp, left: PathExpr, right: PathExpr) -> Self {
        Self::head(Seg::Arith(op, Box::new(left), Box::new(right)))
    }

    pub fn add(left: PathExpr, right: PathExpr) -> Self {
        Self::arith(ArithOp::Add, left, right)
    }

    pub fn sub(left: PathExpr, right: PathExpr) -> Self {
        Self::arith(ArithOp::Sub, left, right)
    }

    pub fn mul(left: PathExpr, right: PathExpr) -> Self {
        Self::arith(ArithOp::Mul, left, right)
    }

    pub fn div(left: PathExpr, right: PathExpr) -> Self {
        Self::arith(ArithOp::Div, left, right)
    }

    pub fn modulo(left: PathExpr, right: PathExpr) -> Self {
        Self::arith(ArithOp::Mod, left, right)
    }

    pub fn neg(arg: PathExpr) -> Self {
        Self::head(Seg::Unary(UnaryOp::Minus, Box::new(arg)))
    }

    pub fn plus(arg: PathExpr) -> Self {
        Self::head(Seg::Unary(UnaryOp::Plus, Box::new(arg)))
    }

    // ── Compilation ─────────────────────────────────────────────────────

    /// Compile into the flat node arena the evaluator consumes.
    pub fn compile(&self, mode: Mode) -> Result<CompiledPath, PathBuildError> {
        let mut compiler = Compiler { nodes: Vec::new() };
        let entry = compiler.compile_expr(self, true)?;
        let predicate = compiler.nodes[entry.0 as usize].kind.is_predicate();
        Ok(CompiledPath {
            nodes: compiler.nodes,
            entry,
            mode,
            predicate,
        })
    }
}

struct Compiler {
    nodes: Vec<PathNode>,
}

impl Compiler {
    fn push(&mut self, kind: PathKind, next: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(PathNode { kind, next });
        id
    }

    /// Compile a whole expression, linking its segments right to left.
    fn compile_expr(
        &mut self,
        expr: &PathExpr,
        allow_predicate: bool,
    ) -> Result<NodeId, PathBuildError> {
        if expr.segs.is_empty() {
            return Err(PathBuildError::EmptyPath);
        }
        let mut next = None;
        for seg in expr.segs.iter().rev() {
            if seg.is_predicate() && !(allow_predicate && expr.segs.len() == 1) {
                return Err(PathBuildError::MisplacedPredicate);
            }
            next = Some(self.compile_seg(seg, next)?);
        }
        next.ok_or(PathBuildError::EmptyPath)
    }

    /// Compile one expression that the grammar requires to be a predicate.
    fn compile_predicate(
        &mut self,
        expr: &PathExpr,
        op: &'static str,
    ) -> Result<NodeId, PathBuildError> {
        let id = self.compile_expr(expr, true)?;
        if !self.nodes[id.0 as usize].kind.is_predicate() {
            return Err(PathBuildError::PredicateArgumentRequired { op });
        }
        Ok(id)
    }

    fn compile_seg(&mut self, seg: &Seg, next: Option<NodeId>) -> Result<NodeId, PathBuildError> {
        let kind = match seg {
            Seg::Root => PathKind::Root,
            Seg::Current => PathKind::Current,
            Seg::Last => PathKind::Last,
            Seg::Literal(lit) => PathKind::Literal(lit.clone()),
            Seg::Variable(name) => PathKind::Variable(name.clone()),
            Seg::Key(name) => PathKind::Key(name.clone()),
            Seg::WildMember => PathKind::WildMember,
            Seg::WildElement => PathKind::WildElement,
            Seg::Subscripts(list) => {
                let mut subs = Vec::with_capacity(list.len());
                for (from, to) in list {
                    let from = self.compile_expr(from, false)?;
                    let to = to
                        .as_ref()
                        .map(|to| self.compile_expr(to, false))
                        .transpose()?;
                    subs.push(Subscript { from, to });
                }
                PathKind::Subscripts(subs)
            }
            Seg::Recursive { first, last } => {
                if first > last {
                    return Err(PathBuildError::InvertedRecursiveBounds {
                        first: *first,
                        last: *last,
                    });
                }
                PathKind::Recursive {
                    first: *first,
                    last: *last,
                }
            }
            Seg::Filter(pred) => {
                let id = self.compile_expr(pred, true)?;
                if !self.nodes[id.0 as usize].kind.is_predicate() {
                    return Err(PathBuildError::FilterNotPredicate);
                }
                PathKind::Filter(id)
            }
            Seg::Type => PathKind::Type,
            Seg::Size => PathKind::Size,
            Seg::Abs => PathKind::Abs,
            Seg::Floor => PathKind::Floor,
            Seg::Ceiling => PathKind::Ceiling,
            Seg::Double => PathKind::Double,
            Seg::KeyValue => PathKind::KeyValue,
            Seg::Datetime { template, tz } => PathKind::Datetime {
                template: template.clone(),
                tz: tz.clone(),
            },
            Seg::Not(pred) => PathKind::Not(self.compile_predicate(pred, "!")?),
            Seg::IsUnknown(pred) => {
                PathKind::IsUnknown(self.compile_predicate(pred, "is unknown")?)
            }
            Seg::And(l, r) => PathKind::And(
                self.compile_predicate(l, "&&")?,
                self.compile_predicate(r, "&&")?,
            ),
            Seg::Or(l, r) => PathKind::Or(
                self.compile_predicate(l, "||")?,
                self.compile_predicate(r, "||")?,
            ),
            Seg::Compare(op, l, r) => PathKind::Compare {
                op: *op,
                left: self.compile_expr(l, false)?,
                right: self.compile_expr(r, false)?,
            },
            Seg::StartsWith(l, r) => PathKind::StartsWith {
                left: self.compile_expr(l, false)?,
                right: self.compile_expr(r, false)?,
            },
            Seg::LikeRegex {
                target,
                pattern,
                flags,
            } => PathKind::LikeRegex {
                target: self.compile_expr(target, false)?,
                pattern: pattern.clone(),
                flags: RegexFlags::parse(flags)?,
                regex: OnceCell::new(),
            },
            Seg::Exists(path) => PathKind::Exists(self.compile_expr(path, false)?),
            Seg::Arith(op, l, r) => PathKind::Arith {
                op: *op,
                left: self.compile_expr(l, false)?,
                right: self.compile_expr(r, false)?,
            },
            Seg::Unary(op, arg) => PathKind::Unary {
                op: *op,
                arg: self.compile_expr(arg, false)?,
            },
        };
        Ok(self.push(kind, next))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
