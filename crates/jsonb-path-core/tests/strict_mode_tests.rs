//! Strict/lax divergence and the error taxonomy: which shapes raise, which
//! collapse to empty results, and what the silent flag suppresses.

use jsonb_path_core::{
    path_exists, path_query, path_query_array, ErrorCode, EvalOptions, JsonbDoc, Mode, PathError,
    PathExpr, Variables,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn doc(v: Value) -> JsonbDoc {
    JsonbDoc::from_value(&v).expect("test document encodes")
}

fn run(d: &JsonbDoc, expr: &PathExpr, mode: Mode) -> Result<Value, PathError> {
    let path = expr.compile(mode).expect("test path compiles");
    let vars = Variables::new();
    path_query_array(d, &path, &vars, &EvalOptions::default())
}

fn code(result: Result<Value, PathError>) -> ErrorCode {
    result.expect_err("expected an error").error_code()
}

// ── Structural errors ───────────────────────────────────────────────────────

#[test]
fn missing_member_raises_in_strict_and_empties_in_lax() {
    let d = doc(json!({}));
    let expr = PathExpr::root().key("missing");
    assert_eq!(code(run(&d, &expr, Mode::Strict)), ErrorCode::MemberNotFound);
    assert_eq!(run(&d, &expr, Mode::Lax).unwrap(), json!([]));
}

#[test]
fn member_access_on_scalar() {
    let d = doc(json!({"a": 5}));
    let expr = PathExpr::root().key("a").key("b");
    assert_eq!(code(run(&d, &expr, Mode::Strict)), ErrorCode::ObjectNotFound);
    assert_eq!(run(&d, &expr, Mode::Lax).unwrap(), json!([]));
}

#[test]
fn wildcard_member_on_array() {
    let d = doc(json!([{"a": 1}]));
    let expr = PathExpr::root().wild_member();
    assert_eq!(code(run(&d, &expr, Mode::Strict)), ErrorCode::ObjectNotFound);
    // Lax unwraps the array first.
    assert_eq!(run(&d, &expr, Mode::Lax).unwrap(), json!([1]));
}

#[test]
fn wildcard_element_on_scalar() {
    let d = doc(json!(42));
    let expr = PathExpr::root().wild_element();
    assert_eq!(code(run(&d, &expr, Mode::Strict)), ErrorCode::ArrayNotFound);
    assert_eq!(run(&d, &expr, Mode::Lax).unwrap(), json!([42]));
}

#[test]
fn recursive_descent_swallows_structural_errors_even_in_strict() {
    let d = doc(json!({"a": 1, "b": {"a": 2}}));
    let expr = PathExpr::root().recursive().key("a");
    assert_eq!(
        run(&d, &expr, Mode::Strict).unwrap(),
        json!([1, 2])
    );
}

// ── Subscript errors ────────────────────────────────────────────────────────

#[test]
fn out_of_bounds_subscripts() {
    let d = doc(json!([1, 2, 3]));

    let over = PathExpr::root().index(5);
    assert_eq!(code(run(&d, &over, Mode::Strict)), ErrorCode::InvalidSubscript);
    assert_eq!(run(&d, &over, Mode::Lax).unwrap(), json!([]));

    let negative = PathExpr::root().index(-1);
    assert_eq!(
        code(run(&d, &negative, Mode::Strict)),
        ErrorCode::InvalidSubscript
    );
    assert_eq!(run(&d, &negative, Mode::Lax).unwrap(), json!([]));
}

#[test]
fn lax_clamps_ranges_to_the_array() {
    let d = doc(json!([0, 1, 2]));
    let expr = PathExpr::root().index_range(1, 9);
    assert_eq!(run(&d, &expr, Mode::Lax).unwrap(), json!([1, 2]));

    let inverted = PathExpr::root().index_range(2, 1);
    assert_eq!(run(&d, &inverted, Mode::Lax).unwrap(), json!([]));
    assert_eq!(
        code(run(&d, &inverted, Mode::Strict)),
        ErrorCode::InvalidSubscript
    );
}

#[test]
fn non_numeric_subscript_is_invalid() {
    let d = doc(json!([1, 2]));
    let expr = PathExpr::root().subscript(PathExpr::lit("x"));
    for mode in [Mode::Lax, Mode::Strict] {
        assert_eq!(code(run(&d, &expr, mode)), ErrorCode::InvalidSubscript);
    }
}

#[test]
fn plural_subscript_expression_is_invalid() {
    let d = doc(json!({"idx": [0, 1], "arr": [1, 2, 3]}));
    let expr = PathExpr::root()
        .key("arr")
        .subscript(PathExpr::root().key("idx").wild_element());
    assert_eq!(code(run(&d, &expr, Mode::Strict)), ErrorCode::InvalidSubscript);
}

#[test]
fn last_outside_a_subscript_is_an_error() {
    let d = doc(json!([1]));
    let expr = PathExpr::last();
    assert_eq!(
        code(run(&d, &expr, Mode::Lax)),
        ErrorCode::LastOutsideSubscript
    );
}

// ── Value errors ────────────────────────────────────────────────────────────

#[test]
fn value_errors_raise_even_in_lax() {
    let d = doc(json!({"s": "nope", "n": 1}));

    let abs = PathExpr::root().key("s").abs();
    assert_eq!(code(run(&d, &abs, Mode::Lax)), ErrorCode::NonNumericJsonItem);

    let division = PathExpr::div(PathExpr::root().key("n"), PathExpr::lit(0));
    assert_eq!(code(run(&d, &division, Mode::Lax)), ErrorCode::DivisionByZero);

    let size = PathExpr::root().key("s").size_of();
    assert_eq!(run(&d, &size, Mode::Lax).unwrap(), json!([1]));
    assert_eq!(code(run(&d, &size, Mode::Strict)), ErrorCode::ArrayNotFound);
}

#[test]
fn arithmetic_requires_singleton_numerics() {
    let d = doc(json!({"a": [1, 2], "b": "x"}));

    let plural = PathExpr::add(PathExpr::root().key("a").wild_element(), PathExpr::lit(1));
    assert_eq!(
        code(run(&d, &plural, Mode::Lax)),
        ErrorCode::SingletonJsonItemRequired
    );

    let non_numeric = PathExpr::add(PathExpr::root().key("b"), PathExpr::lit(1));
    assert_eq!(
        code(run(&d, &non_numeric, Mode::Lax)),
        ErrorCode::SingletonJsonItemRequired
    );
}

#[test]
fn unary_arithmetic_rejects_non_numerics() {
    let d = doc(json!({"a": ["x"]}));
    let expr = PathExpr::neg(PathExpr::root().key("a").wild_element());
    assert_eq!(code(run(&d, &expr, Mode::Lax)), ErrorCode::NumberNotFound);
}

#[test]
fn double_rejects_bad_strings_and_infinities() {
    let d = doc(json!({"bad": "not-a-number", "huge": "1e400"}));

    let bad = PathExpr::root().key("bad").double();
    assert_eq!(code(run(&d, &bad, Mode::Lax)), ErrorCode::NonNumericJsonItem);

    let huge = PathExpr::root().key("huge").double();
    assert_eq!(code(run(&d, &huge, Mode::Lax)), ErrorCode::NumericOverflow);
}

#[test]
fn datetime_rejects_unrecognized_input() {
    let d = doc(json!({"a": "not a date"}));
    let expr = PathExpr::root().key("a").datetime();
    assert_eq!(
        code(run(&d, &expr, Mode::Lax)),
        ErrorCode::InvalidArgumentForDatetime
    );
}

#[test]
fn keyvalue_requires_an_object() {
    let d = doc(json!({"a": 5}));
    let expr = PathExpr::root().key("a").keyvalue();
    for mode in [Mode::Lax, Mode::Strict] {
        assert_eq!(code(run(&d, &expr, mode)), ErrorCode::ObjectNotFound);
    }
}

// ── Predicates under strict mode ────────────────────────────────────────────

#[test]
fn strict_filter_rejects_unknown_predicates() {
    let d = doc(json!([1, "two", 3]));
    let expr = PathExpr::root()
        .wild_element()
        .filter(PathExpr::gt(PathExpr::current(), PathExpr::lit(0)));

    assert_eq!(run(&d, &expr, Mode::Lax).unwrap(), json!([1, 3]));
    assert_eq!(
        code(run(&d, &expr, Mode::Strict)),
        ErrorCode::PredicateUnknown
    );
}

#[test]
fn operand_errors_inside_predicates_are_unknown() {
    let d = doc(json!([{"a": 1}, {"b": 2}]));
    // In lax mode the missing member is an empty sequence: no pair matches,
    // the predicate is false, the element is dropped.
    let expr = PathExpr::root().wild_element().filter(PathExpr::eq(
        PathExpr::current().key("a"),
        PathExpr::lit(1),
    ));
    assert_eq!(run(&d, &expr, Mode::Lax).unwrap(), json!([{"a": 1}]));
}

#[test]
fn exists_in_filters() {
    let d = doc(json!([{"a": 1}, {"b": 2}]));
    let expr = PathExpr::root()
        .wild_element()
        .filter(PathExpr::exists(PathExpr::current().key("a")));
    assert_eq!(run(&d, &expr, Mode::Lax).unwrap(), json!([{"a": 1}]));
}

// ── Silent mode ─────────────────────────────────────────────────────────────

#[test]
fn silent_mode_suppresses_raisable_errors() {
    let d = doc(json!({}));
    let vars = Variables::new();
    let silent = EvalOptions {
        silent: true,
        ..Default::default()
    };

    let path = PathExpr::root().key("missing").compile(Mode::Strict).unwrap();
    assert_eq!(path_exists(&d, &path, &vars, &silent).unwrap(), None);
    assert!(path_query(&d, &path, &vars, &silent).unwrap().is_empty());

    // Non-silent keeps the error.
    assert!(path_query(&d, &path, &vars, &EvalOptions::default()).is_err());
}

#[test]
fn silent_mode_does_not_mask_resource_guards() {
    let d = doc(json!({"a": {"b": 1}}));
    let vars = Variables::new();
    let opts = EvalOptions {
        silent: true,
        max_depth: 2,
        ..Default::default()
    };
    let path = PathExpr::root()
        .key("a")
        .key("b")
        .compile(Mode::Lax)
        .unwrap();
    let err = path_query(&d, &path, &vars, &opts).unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::RecursionDepthExceeded);
}

#[test]
fn interrupt_hook_aborts_evaluation() {
    let d = doc(json!({"a": [1, 2, 3]}));
    let vars = Variables::new();
    let interrupt = || true;
    let opts = EvalOptions {
        interrupt: Some(&interrupt),
        ..Default::default()
    };
    let path = PathExpr::root().key("a").compile(Mode::Lax).unwrap();
    let err = path_query(&d, &path, &vars, &opts).unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::Interrupted);
}

// ── Strict mode evaluates to completion ─────────────────────────────────────

#[test]
fn strict_exists_observes_errors_past_the_first_match() {
    // First element matches, second raises: strict exists must still report
    // the error, lax short-circuits on the match.
    let d = doc(json!([{"x": 1}, 5]));
    let vars = Variables::new();
    let expr = PathExpr::root().wild_element().key("x");

    let strict = expr.compile(Mode::Strict).unwrap();
    assert!(path_exists(&d, &strict, &vars, &EvalOptions::default()).is_err());

    let lax = expr.compile(Mode::Lax).unwrap();
    assert_eq!(
        path_exists(&d, &lax, &vars, &EvalOptions::default()).unwrap(),
        Some(true)
    );
}
