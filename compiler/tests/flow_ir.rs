// IR shape tests: nodes, edges, edge kinds, sequences, and strata produced
// by the full front end for small flow programs.

use std::sync::Arc;

use arcc::analyze::{compile, Compilation};
use arcc::ir::{node_type, EdgeKind, Handle, ACTIVATE, IR};
use arcc::symbol::{MapResolver, Resolver};
use arcc::types::Type;

fn channels() -> Option<Arc<dyn Resolver>> {
    Some(Arc::new(
        MapResolver::new()
            .channel("a", 1, Type::F64)
            .channel("b", 2, Type::F64)
            .channel("alarm_on", 3, Type::U8),
    ))
}

fn build(source: &str) -> IR {
    let out: Compilation = compile(source, channels());
    assert!(
        out.ok(),
        "diagnostics: {:?}",
        out.diagnostics.iter().map(|d| &d.message).collect::<Vec<_>>()
    );
    out.ir.expect("ir")
}

fn edge_strings(ir: &IR) -> Vec<String> {
    ir.edges.iter().map(ToString::to_string).collect()
}

/// Every edge endpoint is a declared parameter of an existing node.
fn assert_handles_exist(ir: &IR) {
    for edge in &ir.edges {
        for (handle, side) in [(&edge.source, "source"), (&edge.target, "target")] {
            let node = ir
                .nodes
                .get(&handle.node)
                .unwrap_or_else(|| panic!("{side} node of {edge} missing"));
            assert!(node.has_param(&handle.param), "{side} param of {edge} missing");
        }
    }
}

// ── Edge kinds ──────────────────────────────────────────────────────────────

#[test]
fn arrow_is_continuous() {
    let ir = build("a -> b");
    assert_eq!(edge_strings(&ir), ["on_a_0.output -> write_b_0.input"]);
    assert_eq!(ir.edges.by_kind(EdgeKind::Continuous).count(), 1);
}

#[test]
fn double_arrow_is_one_shot() {
    let ir = build("a => b");
    assert_eq!(ir.edges.by_kind(EdgeKind::OneShot).count(), 1);
    assert_eq!(ir.edges.by_kind(EdgeKind::Continuous).count(), 0);
}

#[test]
fn channel_read_expression_gets_one_trigger() {
    let ir = build("func raise() { alarm_on = 1 }\na > 10 => raise{}");
    let on_nodes: Vec<&str> = ir
        .nodes
        .iter()
        .filter(|n| n.ty == node_type::ON)
        .map(|n| n.key.as_str())
        .collect();
    assert_eq!(on_nodes, ["on_a_0"]);
    assert_eq!(
        edge_strings(&ir),
        [
            "on_a_0.output -> expression_0.a",
            "expression_0.output => raise_0.input",
        ]
    );
    assert_handles_exist(&ir);
}

#[test]
fn expression_reading_two_channels_gets_two_triggers() {
    let ir = build("a + b -> b");
    assert!(ir.nodes.get("on_a_0").is_some());
    assert!(ir.nodes.get("on_b_0").is_some());
    assert_eq!(ir.edges.into_node("expression_0").count(), 2);
    assert_handles_exist(&ir);
}

#[test]
fn repeated_channel_reads_share_a_trigger() {
    let ir = build("a * a -> b");
    assert_eq!(ir.edges.into_node("expression_0").count(), 1);
}

// ── Constants ───────────────────────────────────────────────────────────────

#[test]
fn folded_literal_head_is_one_constant_node() {
    let ir = build("(1 + 2) * 3 - 4 -> b");
    let constants: Vec<_> = ir
        .nodes
        .iter()
        .filter(|n| n.ty == node_type::CONSTANT)
        .collect();
    assert_eq!(constants.len(), 1);
    assert_eq!(
        constants[0].outputs.get("output").map(|p| p.ty.clone()),
        Some(Type::F64)
    );
    assert_eq!(edge_strings(&ir), ["const_0.output -> write_b_0.input"]);
}

#[test]
fn function_spelled_like_a_trigger_gets_its_own_key() {
    let ir = build("func on_a(v f64) f64 { return v }\na -> on_a{} -> b");
    let keys: Vec<&str> = ir.nodes.keys().collect();
    assert_eq!(keys, ["on_a_0", "on_a_1", "write_b_0"]);
    assert_eq!(
        edge_strings(&ir),
        ["on_a_0.output -> on_a_1.v", "on_a_1.output -> write_b_0.input"]
    );
}

// ── Literal range ───────────────────────────────────────────────────────────

fn range_errors(source: &str) -> (Vec<String>, IR) {
    let out = compile(source, channels());
    let messages = out
        .diagnostics
        .errors()
        .filter(|d| d.message.contains("out of range"))
        .map(|d| d.message.clone())
        .collect();
    (messages, out.ir.expect("partial ir"))
}

#[test]
fn oversized_constant_head_is_reported() {
    let (errors, ir) = range_errors("300 -> alarm_on");
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].starts_with("value 300 out of range for u8"));
    assert!(ir.nodes.iter().all(|n| n.ty != node_type::CONSTANT));
}

#[test]
fn oversized_config_value_is_reported_once() {
    let (errors, ir) =
        range_errors("func arm{level u8} (v f64) u8 { return v > 1.0 }\na -> arm{level=256} -> alarm_on");
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].starts_with("value 256 out of range for u8"));
    let node = ir.nodes.get("arm_0").expect("arm node");
    assert!(node.config.get("level").is_none());
}

#[test]
fn oversized_input_default_is_reported() {
    let (errors, ir) =
        range_errors("func arm(v f64, level u8 = 999) u8 { return v > 1.0 }\na -> arm{} -> alarm_on");
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].starts_with("value 999 out of range for u8"));
    let node = ir.nodes.get("arm_0").expect("arm node");
    assert!(node.inputs.get("level").and_then(|p| p.value.as_ref()).is_none());
}

#[test]
fn in_range_literals_lower_to_values() {
    let ir = build("func arm{level u8} (v f64) u8 { return v > 1.0 }\n255 -> alarm_on\na -> arm{level=255} -> alarm_on");
    let node = ir.nodes.get("arm_0").expect("arm node");
    assert_eq!(
        node.config.get("level").and_then(|p| p.value.clone()),
        Some(arcc::types::Value::Uint(255))
    );
    let constant = ir.nodes.iter().find(|n| n.ty == node_type::CONSTANT).expect("constant");
    assert_eq!(
        constant.outputs.get("output").map(|p| p.ty.clone()),
        Some(Type::U8)
    );
}

// ── Sequences ───────────────────────────────────────────────────────────────

#[test]
fn next_jumps_to_following_stage() {
    let ir = build("sequence s { stage arm { a > 0 => next } stage fire { } }");
    let edge = ir.edges.by_kind(EdgeKind::OneShot).next().expect("one-shot");
    assert_eq!(edge.target, Handle::new("entry_s_fire", ACTIVATE));

    let seq = ir.sequence("s").expect("sequence");
    assert_eq!(seq.entry().map(|s| s.key.as_str()), Some("arm"));
    assert_eq!(seq.next_stage("arm").map(|s| s.key.as_str()), Some("fire"));
    assert!(seq.next_stage("fire").is_none());
    assert_handles_exist(&ir);
}

#[test]
fn named_stage_jump_stays_in_its_sequence() {
    let ir = build("sequence s { stage arm { a > 0 => fire } stage fire { } }");
    let edge = ir.edges.by_kind(EdgeKind::OneShot).next().expect("one-shot");
    assert_eq!(edge.target, Handle::new("entry_s_fire", ACTIVATE));
    assert_eq!(ir.stage_of("expression_0").map(|(_, st)| st.key.as_str()), Some("arm"));
}

#[test]
fn stage_entries_are_global_and_stage_nodes_are_local() {
    let ir = build("sequence s { stage fill { a -> b } stage drain { b -> a } }");
    assert_eq!(ir.strata.get("entry_s_fill"), Some(0));
    assert_eq!(ir.strata.get("entry_s_drain"), Some(0));
    assert_eq!(ir.strata.get("on_a_0"), None);

    let seq = ir.sequence("s").expect("sequence");
    let first = &seq.stages[0];
    assert_eq!(first.nodes, ["on_a_0", "write_b_0"]);
    assert_eq!(first.strata.get("on_a_0"), Some(0));
    assert_eq!(first.strata.get("write_b_0"), Some(1));
    assert_eq!(ir.stage_of("on_b_0").map(|(_, st)| st.key.as_str()), Some("drain"));
}

#[test]
fn single_invocations_join_their_stage() {
    let ir = build("func tick() { alarm_on = 0 }\nsequence s { stage idle { tick{} } }");
    let seq = ir.sequence("s").expect("sequence");
    assert_eq!(seq.stages[0].nodes, ["tick_0"]);
    assert_eq!(seq.stages[0].strata.node_count(), 1);
}

// ── Routing ─────────────────────────────────────────────────────────────────

#[test]
fn output_routing_table_fans_out_by_label() {
    let ir = build(
        "func split(v f64) (hi f64, lo f64) { hi = v\n lo = v }\na -> split{} -> {hi: b, lo: a}",
    );
    assert_eq!(
        edge_strings(&ir),
        [
            "on_a_0.output -> split_0.v",
            "split_0.hi -> write_b_0.input",
            "split_0.lo -> write_a_0.input",
        ]
    );
    assert_handles_exist(&ir);
}

#[test]
fn input_routing_table_fans_in_by_parameter() {
    let ir = build("func sum(x f64, y f64) f64 { return x + y }\n{a: x, b: y} -> sum{} -> b");
    assert_eq!(
        edge_strings(&ir),
        [
            "on_a_0.output -> sum_0.x",
            "on_b_0.output -> sum_0.y",
            "sum_0.output -> write_b_0.input",
        ]
    );
    assert_handles_exist(&ir);
}

// ── Strata and serialization ────────────────────────────────────────────────

#[test]
fn strata_follow_longest_path() {
    let ir = build("func f(v f64) f64 { return v }\na -> f{} -> f{} -> b");
    assert_eq!(ir.strata.get("on_a_0"), Some(0));
    assert_eq!(ir.strata.get("f_0"), Some(1));
    assert_eq!(ir.strata.get("f_1"), Some(2));
    assert_eq!(ir.strata.get("write_b_0"), Some(3));
    assert_eq!(ir.strata.node_count(), ir.nodes.len());
}

#[test]
fn ir_survives_json() {
    let ir = build("sequence s { stage arm { a > 1 => next } stage run { a -> b } }");
    let json = serde_json::to_string(&ir).expect("serialize");
    let back: IR = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.edges, ir.edges);
    assert_eq!(back.sequences[0].stages[1].strata, ir.sequences[0].stages[1].strata);
    assert_eq!(serde_json::to_string(&back).expect("reserialize"), json);
}

#[test]
fn fingerprint_tracks_source() {
    let one = build("a -> b");
    let two = build("a -> b ");
    assert_eq!(one.fingerprint.len(), 64);
    assert_ne!(one.fingerprint, two.fingerprint);
    assert_eq!(one.fingerprint, build("a -> b").fingerprint);
}
