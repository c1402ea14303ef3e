//! Property-based tests for the evaluator's quantified invariants.
//!
//! Properties under test:
//! 1. Determinism: repeated evaluation yields identical sequences.
//! 2. Existence/query consistency: `exists` is true iff `query` is
//!    non-empty (lax mode).
//! 3. Tri-state NOT involution: `!!P` behaves as `P`.
//! 4. `.keyvalue()` id uniqueness within one evaluation.
//! 5. Lax results contain strict results in order.
//! 6. Lax subscript clamping emits exactly the clamped ranges.

use jsonb_path_core::{
    path_exists, path_match, path_query_array, EvalOptions, JsonbDoc, Mode, PathExpr, Variables,
};
use proptest::prelude::*;
use serde_json::{json, Value};

// ── Strategies ──────────────────────────────────────────────────────────────

/// Arbitrary JSON values: bounded depth, small fan-out, lowercase keys.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(|n| json!(n)),
        "[a-z]{0,6}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Arbitrary non-empty JSON objects (for `.keyvalue()`).
fn arb_object() -> impl Strategy<Value = Value> {
    proptest::collection::btree_map("[a-z]{1,4}", arb_json(), 1..5)
        .prop_map(|map| Value::Object(map.into_iter().collect()))
}

fn doc(v: &Value) -> JsonbDoc {
    JsonbDoc::from_value(v).expect("generated document encodes")
}

fn query_json(d: &JsonbDoc, expr: &PathExpr, mode: Mode) -> Value {
    let path = expr.compile(mode).expect("test path compiles");
    let vars = Variables::new();
    path_query_array(d, &path, &vars, &EvalOptions::default()).expect("lax accessor query")
}

/// Accessor-only probe paths; none of these can raise in lax mode.
fn probe_paths() -> Vec<PathExpr> {
    vec![
        PathExpr::root().key("a"),
        PathExpr::root().wild_element(),
        PathExpr::root().recursive(),
        PathExpr::root().recursive().key("k"),
    ]
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, ..Default::default() })]

    /// Property 1: evaluation is a pure function of (doc, path, mode).
    #[test]
    fn evaluation_is_deterministic(value in arb_json()) {
        let d = doc(&value);
        for expr in probe_paths() {
            let first = query_json(&d, &expr, Mode::Lax);
            let second = query_json(&d, &expr, Mode::Lax);
            prop_assert_eq!(first, second);
        }
    }

    /// Property 2: `exists` is true iff `query` returns rows (lax).
    #[test]
    fn exists_matches_query_emptiness(value in arb_json()) {
        let d = doc(&value);
        let vars = Variables::new();
        for expr in probe_paths() {
            let path = expr.compile(Mode::Lax).unwrap();
            let exists = path_exists(&d, &path, &vars, &EvalOptions::default()).unwrap();
            let rows = query_json(&d, &expr, Mode::Lax);
            let non_empty = !rows.as_array().unwrap().is_empty();
            prop_assert_eq!(exists, Some(non_empty));
        }
    }

    /// Property 3: double negation does not change a predicate's answer.
    #[test]
    fn double_negation_is_identity(value in arb_json()) {
        let d = doc(&value);
        let vars = Variables::new();
        for mode in [Mode::Lax, Mode::Strict] {
            let plain = PathExpr::eq(PathExpr::root().key("a"), PathExpr::lit(1))
                .compile(mode)
                .unwrap();
            let doubled = PathExpr::not(PathExpr::not(PathExpr::eq(
                PathExpr::root().key("a"),
                PathExpr::lit(1),
            )))
            .compile(mode)
            .unwrap();
            let lhs = path_match(&d, &plain, &vars, &EvalOptions::default()).unwrap();
            let rhs = path_match(&d, &doubled, &vars, &EvalOptions::default()).unwrap();
            prop_assert_eq!(lhs, rhs);
        }
    }

    /// Property 4: every `.keyvalue()` row id is unique in one evaluation.
    #[test]
    fn keyvalue_ids_are_unique(value in arb_object()) {
        let d = doc(&value);
        let rows = query_json(&d, &PathExpr::root().keyvalue().key("id"), Mode::Lax);
        let ids: Vec<i64> = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().expect("row ids are integers"))
            .collect();
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        prop_assert_eq!(ids.len(), deduped.len());
    }

    /// Property 5: when strict succeeds, lax returns the same rows in
    /// order, possibly with extras from auto-unwrap.
    #[test]
    fn lax_contains_strict_in_order(value in arb_json()) {
        let d = doc(&value);
        let vars = Variables::new();
        for expr in probe_paths() {
            let Ok(strict_path) = expr.compile(Mode::Strict) else { continue };
            let Ok(strict_rows) =
                path_query_array(&d, &strict_path, &vars, &EvalOptions::default())
            else {
                continue;
            };
            let lax_rows = query_json(&d, &expr, Mode::Lax);

            let strict_rows = strict_rows.as_array().unwrap();
            let lax_rows = lax_rows.as_array().unwrap();
            let mut cursor = lax_rows.iter();
            let subsequence = strict_rows
                .iter()
                .all(|want| cursor.any(|have| have == want));
            prop_assert!(subsequence, "strict rows missing from lax output");
        }
    }

    /// Property 6: lax subscript lists emit exactly the clamped ranges, in
    /// declared order.
    #[test]
    fn lax_subscripts_emit_clamped_ranges(
        elems in proptest::collection::vec(-100i64..100, 0..6),
        ranges in proptest::collection::vec((-2i64..8, proptest::option::of(-2i64..8)), 1..4),
    ) {
        let value = json!(elems);
        let d = doc(&value);
        let expr = PathExpr::root().subscripts(
            ranges
                .iter()
                .map(|(from, to)| (PathExpr::lit(*from), to.map(|t| PathExpr::lit(t))))
                .collect(),
        );
        let rows = query_json(&d, &expr, Mode::Lax);

        let len = elems.len() as i64;
        let mut expected = Vec::new();
        for (from, to) in &ranges {
            let to = to.unwrap_or(*from);
            let lo = (*from).max(0);
            let hi = to.min(len - 1);
            for i in lo..=hi {
                expected.push(json!(elems[i as usize]));
            }
        }
        prop_assert_eq!(rows, Value::Array(expected));
    }

    /// Round-trip law: `$.a[*]` equals the elements of `$.a` when it is an
    /// array.
    #[test]
    fn wildcard_equals_elements(elems in proptest::collection::vec(arb_json(), 0..5)) {
        let value = json!({"a": elems});
        let d = doc(&value);
        let rows = query_json(&d, &PathExpr::root().key("a").wild_element(), Mode::Lax);
        prop_assert_eq!(rows, Value::Array(value["a"].as_array().unwrap().clone()));
    }
}
