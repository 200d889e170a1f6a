// End-to-end analysis scenarios: diagnostics and inferred types for whole
// programs, run through the same driver the binary uses.

use std::sync::Arc;

use arcc::analyze::{compile, Compilation};
use arcc::symbol::{MapResolver, Resolver};
use arcc::types::Type;

// ── Test helpers ────────────────────────────────────────────────────────────

fn channels() -> Option<Arc<dyn Resolver>> {
    Some(Arc::new(
        MapResolver::new()
            .channel("ox_pt_1", 12, Type::F64)
            .channel("ox_pt_2", 13, Type::F32)
            .channel("press_vlv", 20, Type::U8)
            .channel("status", 21, Type::Str),
    ))
}

fn run(source: &str) -> Compilation {
    compile(source, channels())
}

fn messages(out: &Compilation) -> Vec<String> {
    out.diagnostics.errors().map(|d| d.message.clone()).collect()
}

fn assert_clean(out: &Compilation) {
    assert!(out.ok(), "unexpected diagnostics: {:?}", messages(out));
}

fn assert_error(out: &Compilation, needle: &str) {
    let all = messages(out);
    assert!(
        all.iter().any(|m| m.contains(needle)),
        "expected an error containing {needle:?}, got {all:?}"
    );
}

fn return_type(out: &Compilation, name: &str) -> Option<Type> {
    let analysis = out.analysis.as_ref()?;
    let ty = analysis.type_of(name)?;
    ty.function_props()?.return_type().cloned()
}

// ── Return inference ────────────────────────────────────────────────────────

#[test]
fn literal_return_defaults_to_i64() {
    let out = run("func answer() { return 42 }");
    assert_clean(&out);
    assert_eq!(return_type(&out, "answer"), Some(Type::I64));
}

#[test]
fn branch_returns_promote() {
    let out = run("func pick(a i8, b i32) { if a > 0 { return a } else { return b } }");
    assert_clean(&out);
    assert_eq!(return_type(&out, "pick"), Some(Type::I32));
}

#[test]
fn signed_input_with_large_literal() {
    let out = run("func f(x i8) { if x > 0 { return x } ; return 300 }");
    assert_clean(&out);
    assert_eq!(return_type(&out, "f"), Some(Type::I32));
}

#[test]
fn missing_return_means_no_output() {
    let out = run("func log_it(v f64) { x := v * 2 }");
    assert_clean(&out);
    assert_eq!(return_type(&out, "log_it"), None);
}

#[test]
fn partial_returns_still_infer() {
    let out = run("func f(a i32) { if a > 0 { return a } }");
    assert_clean(&out);
    assert_eq!(return_type(&out, "f"), Some(Type::I32));
}

#[test]
fn declared_output_must_return_on_all_paths() {
    let out = run("func f(a i32) i32 { if a > 0 { return a } }");
    assert_error(&out, "function 'f' must return a value of type i32 on all paths");
}

#[test]
fn inferred_function_feeds_a_flow() {
    let out = run("func double(v f64) { return v * 2 }\nox_pt_1 -> double{} -> ox_pt_1");
    assert_clean(&out);
    assert_eq!(return_type(&out, "double"), Some(Type::F64));
}

#[test]
fn inferred_outputs_do_not_depend_on_item_order() {
    let callee = "func gain(v f64) { return v * 2 }";
    let caller = "func boost(v f64) { return gain(v) }";
    let flow = "ox_pt_1 -> boost{} -> ox_pt_1";
    for source in [
        format!("{caller}\n{callee}\n{flow}"),
        format!("{flow}\n{callee}\n{caller}"),
    ] {
        let out = run(&source);
        assert_clean(&out);
        assert_eq!(return_type(&out, "boost"), Some(Type::F64), "{source}");
    }
}

// ── Scopes ──────────────────────────────────────────────────────────────────

#[test]
fn redeclaration_in_same_block_conflicts() {
    let out = run("func f() { x := 1\n x := 2 }");
    assert_error(&out, "conflicts with existing symbol");
}

#[test]
fn shadowing_in_nested_block_is_allowed() {
    let out = run("func f(a i32) { x := 1\n if a > 0 { x := 2 } }");
    assert_clean(&out);
}

#[test]
fn undefined_symbols_do_not_stop_siblings() {
    let out = run("func f() { x := nope\n y := also_nope }");
    assert_eq!(
        messages(&out),
        ["undefined symbol: nope", "undefined symbol: also_nope"]
    );
}

#[test]
fn failing_conditions_keep_branch_diagnostics() {
    let out = run("func f() { if y > 0 { z := w } }");
    assert_eq!(messages(&out), ["undefined symbol: y", "undefined symbol: w"]);
}

// ── Channels ────────────────────────────────────────────────────────────────

#[test]
fn channel_reads_and_writes_are_recorded() {
    let out = run("func ctl() { if ox_pt_1 > 500.0 { press_vlv = 1 } }");
    assert_clean(&out);
    let analysis = out.analysis.as_ref().expect("analysis");
    let scope = analysis.resolve("ctl").and_then(|r| r.scope).expect("scope");
    let channels = &analysis.scopes.get(scope).channels;
    assert_eq!(channels.read.get(&12).map(String::as_str), Some("ox_pt_1"));
    assert_eq!(channels.write.get(&20).map(String::as_str), Some("press_vlv"));
}

#[test]
fn channel_write_type_mismatch() {
    let out = run(r#"func f() { status = 1.5 }"#);
    assert!(!out.ok());
}

// ── Flows ───────────────────────────────────────────────────────────────────

#[test]
fn flow_type_mismatch_names_both_types() {
    let out = run("func open(v u8) u8 { return v }\nox_pt_1 -> open{}");
    assert_error(
        &out,
        "channel ox_pt_1 value type f64 does not match func open parameter type u8",
    );
}

#[test]
fn mixing_channel_widths_in_expression() {
    let out = run("ox_pt_1 + ox_pt_2 -> press_vlv");
    assert!(!out.ok());
}

#[test]
fn sequence_with_next_in_last_stage() {
    let out = run("sequence main { stage a { } stage b { ox_pt_1 > 10 => next } }");
    assert_error(&out, "'next' in last stage 'b' has no next stage");
}

#[test]
fn global_constants_configure_functions() {
    let out = run(
        "limit := 500.0\nfunc over{threshold f64} (v f64) u8 { return v > threshold }\nox_pt_1 -> over{threshold=limit} -> press_vlv",
    );
    assert_clean(&out);
    let ir = out.ir.as_ref().expect("ir");
    let node = ir.nodes.get("over_0").expect("over node");
    assert_eq!(
        node.config.get("threshold").and_then(|p| p.value.clone()),
        Some(arcc::types::Value::Float(500.0))
    );
}
