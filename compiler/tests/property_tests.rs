// Property-based tests for compiler invariants.
//
// Three categories:
// 1. Return unification: order independence and widening over numeric types
// 2. Stratification: generated chains level every edge forward
// 3. Constant folding: generated literal heads lower to one constant node
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use std::collections::HashSet;
use std::sync::Arc;

use arcc::analyze::compile;
use arcc::analyzer::unify_return_types;
use arcc::ir::{node_type, IR};
use arcc::symbol::{MapResolver, Resolver};
use arcc::types::Type;
use proptest::prelude::*;

// ── Test helpers ────────────────────────────────────────────────────────────

fn channels() -> Option<Arc<dyn Resolver>> {
    Some(Arc::new(
        MapResolver::new()
            .channel("a", 1, Type::F64)
            .channel("b", 2, Type::F64),
    ))
}

const FUNCS: &str = "
func pass(v f64) f64 { return v }
func gain{k f64} (v f64) f64 { return v * k }
func hot(v f64) u8 { return v > 100.0 }
func fire() { b = 1.0 }
";

fn compile_ok(source: &str) -> Result<IR, TestCaseError> {
    let out = compile(source, channels());
    prop_assert!(
        out.ok(),
        "diagnostics for:\n{}\n{:?}",
        source,
        out.diagnostics.iter().map(|d| &d.message).collect::<Vec<_>>()
    );
    out.ir
        .ok_or_else(|| TestCaseError::fail(format!("no IR for:\n{source}")))
}

fn bits(ty: &Type) -> u32 {
    ty.numeric_kind().map(|k| k.bits()).unwrap_or(0)
}

// ── Generators ──────────────────────────────────────────────────────────────

fn arb_numeric() -> impl Strategy<Value = Type> {
    prop_oneof![
        Just(Type::U8),
        Just(Type::U16),
        Just(Type::U32),
        Just(Type::U64),
        Just(Type::I8),
        Just(Type::I16),
        Just(Type::I32),
        Just(Type::I64),
        Just(Type::F32),
        Just(Type::F64),
    ]
}

/// A chain `a -> f{} -> ... -> b` over pass-through stages, optionally ending
/// in a one-shot trigger.
fn arb_chain() -> impl Strategy<Value = String> {
    let stage = prop_oneof![
        Just("pass{}".to_string()),
        (1u32..50).prop_map(|k| format!("gain{{k={k}.0}}")),
    ];
    (prop::collection::vec(stage, 0..=5), prop::bool::ANY).prop_map(|(stages, trigger)| {
        let mut chain = String::from("a");
        for stage in &stages {
            chain.push_str(" -> ");
            chain.push_str(stage);
        }
        if trigger {
            chain.push_str(" -> hot{} => fire{}");
        } else {
            chain.push_str(" -> b");
        }
        chain
    })
}

/// Integer arithmetic over small positive literals, parenthesized at random.
fn arb_literal_expr() -> impl Strategy<Value = String> {
    let leaf = (1u32..100).prop_map(|v| v.to_string());
    leaf.prop_recursive(3, 8, 2, |inner| {
        (inner.clone(), prop_oneof![Just("+"), Just("*"), Just("-")], inner)
            .prop_map(|(l, op, r)| format!("({l} {op} {r})"))
    })
}

// ── 1. Return unification ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn return_unification_ignores_order(types in prop::collection::vec(arb_numeric(), 1..5)) {
        let forward = unify_return_types(&types);
        let mut reversed = types.clone();
        reversed.reverse();
        let backward = unify_return_types(&reversed);
        prop_assert_eq!(forward.is_ok(), backward.is_ok());
        if let (Ok(f), Ok(b)) = (forward, backward) {
            prop_assert_eq!(f, b);
        }
    }

    #[test]
    fn return_unification_never_narrows(types in prop::collection::vec(arb_numeric(), 1..5)) {
        if let Ok(unified) = unify_return_types(&types) {
            for ty in &types {
                prop_assert!(
                    bits(&unified) >= bits(ty),
                    "{} narrower than {} in {:?}", unified, ty, types
                );
            }
        }
    }

    #[test]
    fn mixed_float_and_integer_returns_fail(
        int in prop_oneof![Just(Type::I8), Just(Type::U32), Just(Type::I64)],
        float in prop_oneof![Just(Type::F32), Just(Type::F64)],
    ) {
        prop_assert!(unify_return_types(&[int.clone(), float.clone()]).is_err());
        prop_assert!(unify_return_types(&[float, int]).is_err());
    }
}

// ── 2. Stratification ───────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn edges_point_to_later_strata(chains in prop::collection::vec(arb_chain(), 1..4)) {
        let source = format!("{FUNCS}\n{}", chains.join("\n"));
        let ir = compile_ok(&source)?;

        prop_assert_eq!(ir.strata.node_count(), ir.nodes.len());
        for edge in &ir.edges {
            let src = ir.strata.get(&edge.source.node);
            let dst = ir.strata.get(&edge.target.node);
            prop_assert!(
                matches!((src, dst), (Some(s), Some(d)) if s < d),
                "edge {} not leveled forward ({:?} -> {:?})\n{}", edge, src, dst, source
            );
        }
    }

    #[test]
    fn node_keys_are_unique(chains in prop::collection::vec(arb_chain(), 1..4)) {
        let source = format!("{FUNCS}\n{}", chains.join("\n"));
        let ir = compile_ok(&source)?;
        let mut seen = HashSet::new();
        for key in ir.nodes.keys() {
            prop_assert!(seen.insert(key), "duplicate node key {}", key);
        }
    }
}

// ── 3. Constant folding ─────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn literal_head_is_one_constant(expr in arb_literal_expr()) {
        let ir = compile_ok(&format!("{expr} -> b"))?;
        let constants: Vec<_> = ir
            .nodes
            .iter()
            .filter(|n| n.ty == node_type::CONSTANT)
            .collect();
        prop_assert_eq!(constants.len(), 1);
        prop_assert!(ir.nodes.iter().all(|n| n.ty != node_type::ON));
        prop_assert!(constants[0].config.get("value").and_then(|p| p.value.as_ref()).is_some());
    }
}
