//! Error types for path evaluation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, machine-readable error codes for embedding query engines.
///
/// These codes form a **stable API contract** — once published, variant names
/// and their serialized `snake_case` strings must never change across versions.
/// A surrounding engine maps these to its own SQLSTATE-style error space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCode {
    /// An array accessor was applied to a non-array in strict mode.
    ArrayNotFound,
    /// An object accessor or `.keyvalue()` was applied to a non-object in strict mode.
    ObjectNotFound,
    /// A member accessor named a key the object does not contain (strict mode).
    MemberNotFound,
    /// A unary arithmetic operand was not numeric.
    NumberNotFound,
    /// An item method that requires a scalar was applied to a container.
    ScalarRequired,
    /// An operand or result that must be a single item was empty or plural.
    SingletonJsonItemRequired,
    /// A numeric item method was applied to a non-numeric value.
    NonNumericJsonItem,
    /// An array subscript was non-numeric, non-singleton, or out of bounds.
    InvalidSubscript,
    /// `.datetime()` received an unparsable input or unsupported template/zone.
    InvalidArgumentForDatetime,
    /// A `$name` reference named a variable the resolver does not know.
    UndefinedObject,
    /// Decimal division by zero.
    DivisionByZero,
    /// A decimal or double-precision result left the representable range.
    NumericOverflow,
    /// A `like_regex` pattern failed to compile.
    InvalidRegularExpression,
    /// `last` was evaluated outside of an array subscript.
    LastOutsideSubscript,
    /// A filter predicate evaluated to `unknown` in strict mode.
    PredicateUnknown,
    /// Path recursion exceeded the configured depth ceiling.
    RecursionDepthExceeded,
    /// The caller-installed interrupt hook requested cancellation.
    Interrupted,
}

/// Errors raised while evaluating a compiled path against a document.
///
/// Structural errors (shape mismatches) are suppressed by lax mode and by the
/// `.**` descent; value errors raise in both modes. Inside predicates every
/// error collapses to the `unknown` truth value.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum PathError {
    #[error("jsonpath array accessor can only be applied to an array")]
    ArrayNotFound,

    #[error("jsonpath {accessor} can only be applied to an object")]
    ObjectNotFound { accessor: &'static str },

    #[error("JSON object does not contain key {key:?}")]
    MemberNotFound { key: String },

    #[error("operand of unary jsonpath operator {op} is not a numeric value")]
    NumberNotFound { op: &'static str },

    #[error("jsonpath item method .{method}() can only be applied to a scalar")]
    ScalarRequired { method: &'static str },

    #[error("{what} must be a singleton {expected}")]
    SingletonRequired {
        what: String,
        expected: &'static str,
    },

    #[error("jsonpath item method .{method}() can only be applied to a numeric value")]
    NonNumeric { method: &'static str },

    #[error("jsonpath array subscript {detail}")]
    InvalidSubscript { detail: &'static str },

    #[error(
        "datetime format is not recognized: {input:?} \
         (use a datetime template argument to specify the input data format)"
    )]
    DatetimeFormat { input: String },

    #[error("invalid datetime argument: {detail}")]
    DatetimeArgument { detail: String },

    #[error("could not find jsonpath variable {name:?}")]
    UndefinedVariable { name: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("numeric value out of range")]
    NumericOverflow,

    #[error("invalid regular expression {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("evaluating jsonpath 'last' outside of array subscript")]
    LastOutsideSubscript,

    #[error("jsonpath filter predicate result is unknown")]
    PredicateUnknown,

    #[error("jsonpath recursion exceeded depth limit of {max}")]
    RecursionDepthExceeded { max: u32 },

    #[error("jsonpath evaluation was interrupted")]
    Interrupted,
}

impl PathError {
    /// Returns the stable error code for this error variant.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            PathError::ArrayNotFound => ErrorCode::ArrayNotFound,
            PathError::ObjectNotFound { .. } => ErrorCode::ObjectNotFound,
            PathError::MemberNotFound { .. } => ErrorCode::MemberNotFound,
            PathError::NumberNotFound { .. } => ErrorCode::NumberNotFound,
            PathError::ScalarRequired { .. } => ErrorCode::ScalarRequired,
            PathError::SingletonRequired { .. } => ErrorCode::SingletonJsonItemRequired,
            PathError::NonNumeric { .. } => ErrorCode::NonNumericJsonItem,
            PathError::InvalidSubscript { .. } => ErrorCode::InvalidSubscript,
            PathError::DatetimeFormat { .. } | PathError::DatetimeArgument { .. } => {
                ErrorCode::InvalidArgumentForDatetime
            }
            PathError::UndefinedVariable { .. } => ErrorCode::UndefinedObject,
            PathError::DivisionByZero => ErrorCode::DivisionByZero,
            PathError::NumericOverflow => ErrorCode::NumericOverflow,
            PathError::InvalidRegex { .. } => ErrorCode::InvalidRegularExpression,
            PathError::LastOutsideSubscript => ErrorCode::LastOutsideSubscript,
            PathError::PredicateUnknown => ErrorCode::PredicateUnknown,
            PathError::RecursionDepthExceeded { .. } => ErrorCode::RecursionDepthExceeded,
            PathError::Interrupted => ErrorCode::Interrupted,
        }
    }

    /// True for shape-mismatch errors that lax mode turns into empty results.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            PathError::ArrayNotFound
                | PathError::ObjectNotFound { .. }
                | PathError::MemberNotFound { .. }
        )
    }

    /// True for errors the `silent` flag must not swallow: resource guards
    /// and cancellation always reach the caller.
    pub fn is_always_raised(&self) -> bool {
        matches!(
            self,
            PathError::RecursionDepthExceeded { .. } | PathError::Interrupted
        )
    }
}

/// Errors raised while compiling a [`PathExpr`](crate::PathExpr) into a
/// [`CompiledPath`](crate::CompiledPath).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PathBuildError {
    #[error("path expression is empty")]
    EmptyPath,

    #[error("predicate is only allowed as the path root or inside a filter")]
    MisplacedPredicate,

    #[error("filter argument must be a predicate")]
    FilterNotPredicate,

    #[error("argument of {op} must be a predicate")]
    PredicateArgumentRequired { op: &'static str },

    #[error("recursive descent bounds are inverted: {first} > {last}")]
    InvertedRecursiveBounds { first: u32, last: u32 },

    #[error("unrecognized like_regex flag {flag:?}")]
    UnknownRegexFlag { flag: char },
}

/// Errors raised while encoding a JSON document into the binary form.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JsonbError {
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("number {literal:?} cannot be stored as an arbitrary-precision decimal")]
    Number { literal: String },
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_code_serializes_snake_case() {
        let code = ErrorCode::SingletonJsonItemRequired;
        let json = serde_json::to_value(code).unwrap();
        assert_eq!(json, json!("singleton_json_item_required"));
    }

    #[test]
    fn test_error_code_round_trips() {
        let code = ErrorCode::InvalidArgumentForDatetime;
        let json_str = serde_json::to_string(&code).unwrap();
        let deserialized: ErrorCode = serde_json::from_str(&json_str).unwrap();
        assert_eq!(deserialized, code);
    }

    #[test]
    fn test_member_not_found_display_names_key() {
        let err = PathError::MemberNotFound {
            key: "missing".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("\"missing\""));
        assert_eq!(err.error_code(), ErrorCode::MemberNotFound);
    }

    #[test]
    fn test_structural_classification() {
        assert!(PathError::ArrayNotFound.is_structural());
        assert!(PathError::MemberNotFound { key: "k".into() }.is_structural());
        assert!(!PathError::DivisionByZero.is_structural());
        assert!(!PathError::InvalidSubscript {
            detail: "is out of bounds"
        }
        .is_structural());
    }

    #[test]
    fn test_resource_guards_are_always_raised() {
        assert!(PathError::Interrupted.is_always_raised());
        assert!(PathError::RecursionDepthExceeded { max: 256 }.is_always_raised());
        assert!(!PathError::ArrayNotFound.is_always_raised());
    }
}
