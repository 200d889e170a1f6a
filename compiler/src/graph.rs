// graph.rs — Flow graph construction for Arc programs
//
// Lowers flow statements, routing tables, and sequences into IR nodes and
// edges. Channel reads become `on` nodes, channel writes `write` nodes,
// pure-literal expressions `constant` nodes, and function invocations and
// flow expressions become nodes typed by their function. Every stage gets a
// `stage_entry` node so sequences, stages, and `next` share one activation
// target.
//
// Preconditions: `analysis` comes from analyzing `program`; its
//                `flow_exprs` covers every expression flow node that
//                analyzed cleanly.
// Postconditions: every edge handle names a declared input or output of its
//                 node. Strata are left empty for the stratifier.
// Failure modes: structural errors (`next` outside a sequence, a sequence
//                with no stages, single-node flows) → `Diagnostic`. Chains
//                whose elements failed analysis are dropped silently.
// Side effects: none.

use tracing::{debug, trace};

use crate::analyzer::{span_key, Analysis, FlowExpr};
use crate::ast::{
    ConfigValues, Expr, ExprKind, FlowElem, FlowNode, FlowOp, FlowStmt, FuncCall, Ident,
    ItemKind, Program, RoutingTable, SequenceDecl, Span, StageItem,
};
use crate::diag::{codes, Diagnostic};
use crate::id::KeyGenerator;
use crate::ir::{node_type, Edge, EdgeKind, Function, Handle, Node, Sequence, Stage, ACTIVATE, IR};
use crate::literal;
use crate::symbol::{Channels, Kind, Resolved};
use crate::types::{FunctionProps, Param, Type, Value, DEFAULT_INPUT, DEFAULT_OUTPUT};

// ── Public entry point ──

/// Result of graph construction: a possibly partial IR and the structural
/// errors found while building it.
#[derive(Debug)]
pub struct GraphResult {
    pub ir: IR,
    pub diagnostics: Vec<Diagnostic>,
}

/// Build the flow graph of `program`.
pub fn build_graph(program: &Program, analysis: &Analysis, source: &str) -> GraphResult {
    let mut builder = GraphBuilder::new(analysis);
    builder.collect_functions();
    for item in &program.items {
        match &item.kind {
            ItemKind::Flow(stmt) => builder.build_flow(stmt),
            ItemKind::Sequence(decl) => builder.build_sequence(decl),
            ItemKind::Function(_) | ItemKind::Constant(_) => {}
        }
    }
    debug!(
        nodes = builder.ir.nodes.len(),
        edges = builder.ir.edges.len(),
        sequences = builder.ir.sequences.len(),
        "graph built"
    );
    builder.ir.fingerprint = crate::ir::fingerprint(source);
    GraphResult {
        ir: builder.ir,
        diagnostics: builder.diagnostics,
    }
}

// ── Internal builder ──

/// Where the builder currently is: inside a stage, and which stage follows.
#[derive(Debug, Default)]
struct Context {
    sequence: Option<String>,
    stage: Option<String>,
    /// Stage names of the current sequence, for bare stage references.
    stages: Vec<String>,
    /// Node keys introduced by the current stage.
    stage_nodes: Option<Vec<String>>,
}

/// A node placed in the graph, with the parameters edges attach to.
#[derive(Debug, Clone)]
struct Built {
    key: String,
    /// Where an incoming edge lands, if the node accepts one.
    input: Option<String>,
    /// Where an outgoing edge leaves from, if the node produces one value.
    output: Option<String>,
}

struct GraphBuilder<'a> {
    analysis: &'a Analysis,
    keys: KeyGenerator,
    ir: IR,
    ctx: Context,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> GraphBuilder<'a> {
    fn new(analysis: &'a Analysis) -> Self {
        GraphBuilder {
            analysis,
            keys: KeyGenerator::new(),
            ir: IR::default(),
            ctx: Context::default(),
            diagnostics: Vec::new(),
        }
    }

    fn error(&mut self, span: Span, message: String) {
        self.diagnostics
            .push(Diagnostic::error(span, message).with_code(codes::E_FLOW));
    }

    /// Functions declared at the root, including synthetic flow expressions.
    fn collect_functions(&mut self) {
        let analysis = self.analysis;
        let scopes = &analysis.scopes;
        for scope in scopes.children(scopes.root()) {
            if scope.kind() != Kind::Function {
                continue;
            }
            let Some(props) = scope.symbol.ty.function_props() else {
                continue;
            };
            self.ir.functions.push(Function {
                key: scope.name().to_string(),
                props: props.clone(),
                channels: scope.channels.clone(),
            });
        }
    }

    fn add_node(&mut self, node: Node) {
        trace!(key = %node.key, ty = %node.ty, "node");
        if let Some(stage_nodes) = &mut self.ctx.stage_nodes {
            stage_nodes.push(node.key.clone());
        }
        self.ir.nodes.push(node);
    }

    fn add_edge(&mut self, source: Handle, target: Handle, kind: EdgeKind) {
        trace!(%source, %target, ?kind, "edge");
        self.ir.edges.push(Edge {
            source,
            target,
            kind,
        });
    }

    fn lookup(&self, name: &str) -> Option<Resolved> {
        self.analysis.resolve(name)
    }

    // ── Sequences ──

    fn build_sequence(&mut self, decl: &SequenceDecl) {
        let name = decl.name.name.clone();
        if decl.stages.is_empty() {
            self.error(decl.name.span, format!("sequence '{name}' has no stages"));
        }
        let mut sequence = Sequence {
            key: name.clone(),
            stages: Vec::with_capacity(decl.stages.len()),
        };

        // Entry nodes first, so stages can jump forward.
        for stage in &decl.stages {
            let key = self.keys.entry(&name, &stage.name.name);
            let mut node = Node::new(&key, node_type::STAGE_ENTRY);
            node.inputs.push(Param::new(ACTIVATE, Type::U8));
            self.add_node(node);
        }

        let stage_names: Vec<String> = decl.stages.iter().map(|s| s.name.name.clone()).collect();
        for stage in &decl.stages {
            self.ctx = Context {
                sequence: Some(name.clone()),
                stage: Some(stage.name.name.clone()),
                stages: stage_names.clone(),
                stage_nodes: Some(Vec::new()),
            };
            for item in &stage.items {
                match item {
                    StageItem::Flow(stmt) => self.build_flow(stmt),
                    StageItem::Single(node) => {
                        self.build_head(node);
                    }
                }
            }
            let nodes = self.ctx.stage_nodes.take().unwrap_or_default();
            sequence.stages.push(Stage {
                key: stage.name.name.clone(),
                nodes,
                strata: Default::default(),
            });
        }
        self.ctx = Context::default();
        self.ir.sequences.push(sequence);
    }

    /// Entry key of the stage after the current one.
    fn next_entry(&mut self, span: Span) -> Option<String> {
        let (Some(sequence), Some(stage)) = (self.ctx.sequence.clone(), self.ctx.stage.clone())
        else {
            self.error(span, "'next' used outside of a sequence".to_string());
            return None;
        };
        let position = self.ctx.stages.iter().position(|s| *s == stage)?;
        match self.ctx.stages.get(position + 1) {
            Some(next) => Some(self.keys.entry(&sequence, next)),
            None => {
                self.error(span, format!("'next' in last stage '{stage}' has no next stage"));
                None
            }
        }
    }

    fn activation(key: String) -> Built {
        Built {
            key,
            input: Some(ACTIVATE.to_string()),
            output: None,
        }
    }

    // ── Flow statements ──

    fn build_flow(&mut self, stmt: &FlowStmt) {
        if stmt.len() < 2 {
            self.error(stmt.span, "flow statement requires at least two nodes".to_string());
            return;
        }
        let elements: Vec<(Option<FlowOp>, &FlowElem)> = stmt.elements().collect();
        let mut prev: Option<Built> = None;
        let mut pending_inputs: Option<&RoutingTable> = None;

        for (i, (op, elem)) in elements.iter().enumerate() {
            let kind = edge_kind(*op);
            match elem {
                FlowElem::Table(table) if i == 0 => {
                    pending_inputs = Some(table);
                }
                FlowElem::Table(table) => {
                    let Some(source) = prev.take() else {
                        return;
                    };
                    self.build_output_table(&source, table, kind);
                }
                FlowElem::Node(node) => {
                    let built = if i == 0 {
                        self.build_head(node)
                    } else {
                        self.build_target(node)
                    };
                    let Some(built) = built else {
                        return;
                    };
                    if let Some(table) = pending_inputs.take() {
                        self.build_input_table(table, &built, kind);
                    } else if let Some(source) = &prev {
                        self.connect(source, &built, None, kind);
                    }
                    prev = Some(if i + 1 < elements.len() {
                        self.continue_from(built)
                    } else {
                        built
                    });
                }
            }
        }
    }

    /// A channel in the middle of a chain is written and read back, so the
    /// chain can keep going from it.
    fn continue_from(&mut self, built: Built) -> Built {
        if built.output.is_some() {
            return built;
        }
        let Some(node) = self.ir.nodes.get(&built.key) else {
            return built;
        };
        if node.ty != node_type::WRITE {
            return built;
        }
        let Some((&key, name)) = node.channels.write.iter().next() else {
            return built;
        };
        let name = name.clone();
        let elem = node.inputs.first().map(|p| p.ty.clone()).unwrap_or_default();
        self.on_node(&name, key, elem)
    }

    /// Connect `source`'s output to `target`, at `param` or its default
    /// input.
    fn connect(&mut self, source: &Built, target: &Built, param: Option<&str>, kind: EdgeKind) {
        let Some(output) = &source.output else {
            return;
        };
        let param = match param.map(str::to_string).or_else(|| target.input.clone()) {
            Some(p) => p,
            None => match self.implicit_input(source, &target.key) {
                Some(p) => p,
                None => return,
            },
        };
        self.add_edge(
            Handle::new(&source.key, output),
            Handle::new(&target.key, param),
            kind,
        );
    }

    /// Give an input-less node an `input` of the source's output type, so a
    /// one-shot trigger has a parameter to land on.
    fn implicit_input(&mut self, source: &Built, target: &str) -> Option<String> {
        let output = source.output.as_deref()?;
        let ty = self
            .ir
            .nodes
            .get(&source.key)
            .and_then(|n| n.outputs.get(output))
            .map(|p| p.ty.clone())?;
        let node = self.ir.nodes.get_mut(target)?;
        if !node.inputs.is_empty() {
            return None;
        }
        node.inputs.push(Param::new(DEFAULT_INPUT, ty));
        Some(DEFAULT_INPUT.to_string())
    }

    /// The first element of a chain, or a stage's single invocation.
    fn build_head(&mut self, node: &FlowNode) -> Option<Built> {
        match node {
            FlowNode::Expr(expr) => match &expr.kind {
                ExprKind::Ident(name) => {
                    let resolved = self.lookup(name);
                    match resolved.as_ref().map(|r| r.symbol.kind) {
                        Some(Kind::Channel) => {
                            let resolved = resolved?;
                            let key = resolved.symbol.id.unwrap_or_default();
                            let elem = resolved.symbol.ty.inner().clone();
                            Some(self.on_node(name, key, elem))
                        }
                        _ => self.build_target(node),
                    }
                }
                _ => self.build_expression(expr, true),
            },
            _ => self.build_target(node),
        }
    }

    /// Any element after the first.
    fn build_target(&mut self, node: &FlowNode) -> Option<Built> {
        match node {
            FlowNode::Next(span) => self.next_entry(*span).map(Self::activation),
            FlowNode::Call(call) => self.build_call(call),
            FlowNode::Expr(expr) => match &expr.kind {
                ExprKind::Ident(name) => self.build_ident(name, expr.span),
                _ => self.build_expression(expr, false),
            },
        }
    }

    fn build_ident(&mut self, name: &str, span: Span) -> Option<Built> {
        if let (Some(sequence), true) = (&self.ctx.sequence, self.ctx.stages.iter().any(|s| s == name)) {
            let key = self.keys.entry(sequence, name);
            return Some(Self::activation(key));
        }
        let resolved = self.lookup(name)?;
        match resolved.symbol.kind {
            Kind::Channel => {
                let key = resolved.symbol.id.unwrap_or_default();
                let elem = resolved.symbol.ty.inner().clone();
                Some(self.write_node(name, key, elem))
            }
            Kind::Sequence => {
                let first = self
                    .analysis
                    .scopes
                    .children(resolved.scope?)
                    .find(|s| s.kind() == Kind::Stage)
                    .map(|s| s.name().to_string());
                match first {
                    Some(stage) => Some(Self::activation(self.keys.entry(name, &stage))),
                    None => {
                        self.error(span, format!("sequence '{name}' has no stages"));
                        None
                    }
                }
            }
            Kind::Function => self.build_call(&FuncCall {
                name: Ident {
                    name: name.to_string(),
                    span,
                },
                config: ConfigValues::Named(Vec::new()),
                span,
            }),
            _ => None,
        }
    }

    fn channel_param(key: u32, elem: &Type) -> Param {
        Param::new("channel", Type::chan(elem.clone())).with_value(Value::Uint(u64::from(key)))
    }

    fn on_node(&mut self, name: &str, channel: u32, elem: Type) -> Built {
        let key = self.keys.generate(node_type::ON, name);
        let mut node = Node::new(&key, node_type::ON);
        node.config.push(Self::channel_param(channel, &elem));
        node.outputs.push(Param::new(DEFAULT_OUTPUT, elem));
        node.channels.read.insert(channel, name.to_string());
        self.add_node(node);
        Built {
            key,
            input: None,
            output: Some(DEFAULT_OUTPUT.to_string()),
        }
    }

    fn write_node(&mut self, name: &str, channel: u32, elem: Type) -> Built {
        let key = self.keys.generate(node_type::WRITE, name);
        let mut node = Node::new(&key, node_type::WRITE);
        node.config.push(Self::channel_param(channel, &elem));
        node.inputs.push(Param::new(DEFAULT_INPUT, elem));
        node.channels.write.insert(channel, name.to_string());
        self.add_node(node);
        Built {
            key,
            input: Some(DEFAULT_INPUT.to_string()),
            output: None,
        }
    }

    // ── Expressions ──

    /// Lower a non-identifier expression. At the head of a chain, an
    /// expression that reads channels gets one `on` trigger per channel.
    fn build_expression(&mut self, expr: &Expr, head: bool) -> Option<Built> {
        let analysis = self.analysis;
        match analysis.flow_exprs.get(&span_key(expr.span))? {
            FlowExpr::Constant { ty, value } => {
                // Unset only when analysis already reported the fold failure.
                let value = value.clone()?;
                let ty = ty.clone();
                let key = self.keys.generate("const", "");
                let mut node = Node::new(&key, node_type::CONSTANT);
                node.config.push(Param::new("value", ty.clone()).with_value(value));
                node.outputs.push(Param::new(DEFAULT_OUTPUT, ty));
                self.add_node(node);
                Some(Built {
                    key,
                    input: None,
                    output: Some(DEFAULT_OUTPUT.to_string()),
                })
            }
            FlowExpr::Function { name } => {
                let resolved = self.lookup(name)?;
                let props = resolved.symbol.ty.function_props()?.clone();
                let channels = resolved
                    .scope
                    .map(|id| analysis.scopes.get(id).channels.clone())
                    .unwrap_or_default();
                let mut node = Node::new(name, name);
                node.inputs = props.inputs.clone();
                node.outputs = props.outputs.clone();
                node.channels = channels.clone();
                let input = node.inputs.first().map(|p| p.name.clone());
                self.add_node(node);

                if head {
                    self.triggers(name, &channels, &props);
                }
                Some(Built {
                    key: name.clone(),
                    input: if head { None } else { input },
                    output: props.return_type().map(|_| DEFAULT_OUTPUT.to_string()),
                })
            }
        }
    }

    fn triggers(&mut self, target: &str, channels: &Channels, props: &FunctionProps) {
        for (&key, channel) in &channels.read {
            let Some(param) = props.inputs.get(channel) else {
                continue;
            };
            let on = self.on_node(channel, key, param.ty.clone());
            self.connect(&on, &Built {
                key: target.to_string(),
                input: Some(channel.clone()),
                output: None,
            }, None, EdgeKind::Continuous);
        }
    }

    // ── Function invocations ──

    fn build_call(&mut self, call: &FuncCall) -> Option<Built> {
        let name = &call.name.name;
        let resolved = self.lookup(name)?;
        let props = resolved.symbol.ty.function_props()?.clone();
        let key = self.keys.generate(name, "");
        let mut node = Node::new(&key, name.as_str());
        node.inputs = props.inputs.clone();
        node.outputs = props.outputs.clone();
        if let Some(scope) = resolved.scope {
            node.channels = self.analysis.scopes.get(scope).channels.clone();
        }
        self.config_values(call, &props, &mut node);
        let input = node.inputs.first().map(|p| p.name.clone());
        self.add_node(node);
        Some(Built {
            key,
            input,
            output: props.return_type().map(|_| DEFAULT_OUTPUT.to_string()),
        })
    }

    /// Bind config values by name or position. Names the analyzer rejected
    /// are left unset; a literal that does not fit its parameter is an error.
    fn config_values(&mut self, call: &FuncCall, props: &FunctionProps, node: &mut Node) {
        let pairs: Vec<(&Param, &Expr)> = match &call.config {
            ConfigValues::Named(values) => values
                .iter()
                .filter_map(|(key, value)| props.config.get(&key.name).map(|p| (p, value)))
                .collect(),
            ConfigValues::Anonymous(values) => props.config.iter().zip(values).collect(),
        };
        for (param, value) in pairs {
            if let Some(bound) = self.config_value(param, value, &mut node.channels) {
                node.config.push(bound);
            }
        }
    }

    fn config_value(&mut self, param: &Param, value: &Expr, channels: &mut Channels) -> Option<Param> {
        if let ExprKind::Ident(name) = &value.kind {
            let resolved = self.lookup(name)?;
            return match resolved.symbol.kind {
                Kind::Channel => {
                    let key = resolved.symbol.id?;
                    channels.read.insert(key, name.clone());
                    Some(Param::new(&param.name, param.ty.clone()).with_value(Value::Uint(u64::from(key))))
                }
                Kind::Constant => {
                    let value = resolved.symbol.default_value?;
                    Some(Param::new(&param.name, param.ty.clone()).with_value(value))
                }
                _ => None,
            };
        }
        match literal::fold(value, &param.ty) {
            Ok(parsed) => Some(Param::new(&param.name, param.ty.clone()).with_value(parsed.value)),
            Err(e) => {
                self.diagnostics.push(
                    Diagnostic::error(value.span, e.to_string()).with_code(codes::E_LITERAL),
                );
                None
            }
        }
    }

    // ── Routing tables ──

    /// `source -> {label: chain, ...}`: one chain per named output.
    fn build_output_table(&mut self, source: &Built, table: &RoutingTable, kind: EdgeKind) {
        for entry in &table.entries {
            let output = Built {
                key: source.key.clone(),
                input: None,
                output: Some(entry.label.name.clone()),
            };
            let last = entry.nodes.len().saturating_sub(1);
            let mut prev = output;
            let mut edge_kind = kind;
            for (i, node) in entry.nodes.iter().enumerate() {
                let Some(built) = self.build_target(node) else {
                    break;
                };
                let param = if i == last {
                    entry.param.as_ref().map(|p| p.name.as_str())
                } else {
                    None
                };
                self.connect(&prev, &built, param, edge_kind);
                prev = if i < last { self.continue_from(built) } else { built };
                edge_kind = EdgeKind::Continuous;
            }
        }
    }

    /// `{channel: param, ...} -> target`: each entry reads a channel, runs
    /// its intermediate nodes, and lands on one input of `target`.
    fn build_input_table(&mut self, table: &RoutingTable, target: &Built, kind: EdgeKind) {
        for entry in &table.entries {
            let Some(resolved) = self.lookup(&entry.label.name) else {
                continue;
            };
            if resolved.symbol.kind != Kind::Channel {
                continue;
            }
            let channel = resolved.symbol.id.unwrap_or_default();
            let elem = resolved.symbol.ty.inner().clone();
            let mut prev = self.on_node(&entry.label.name, channel, elem);

            let (param, intermediate) = match (&entry.param, entry.nodes.split_last()) {
                (Some(param), _) => (param.name.clone(), entry.nodes.as_slice()),
                (None, Some((last, rest))) => match last.as_ident() {
                    Some(ident) => (ident.to_string(), rest),
                    None => continue,
                },
                (None, None) => continue,
            };
            for node in intermediate {
                let Some(built) = self.build_target(node) else {
                    break;
                };
                self.connect(&prev, &built, None, EdgeKind::Continuous);
                prev = self.continue_from(built);
            }
            self.connect(&prev, target, Some(&param), kind);
        }
    }
}

fn edge_kind(op: Option<FlowOp>) -> EdgeKind {
    match op {
        Some(FlowOp::OneShot) => EdgeKind::OneShot,
        _ => EdgeKind::Continuous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze_program;
    use crate::parser;
    use crate::symbol::{MapResolver, Resolver};
    use std::sync::Arc;

    fn resolver() -> Arc<dyn Resolver> {
        Arc::new(
            MapResolver::new()
                .channel("sensor", 1, Type::F64)
                .channel("valve", 2, Type::U8)
                .channel("level", 3, Type::F64),
        )
    }

    fn build(source: &str) -> GraphResult {
        let parsed = parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let program = parsed.program.expect("program");
        let analysis = analyze_program(source, &program, Some(resolver()));
        assert!(
            analysis.diagnostics.ok(),
            "analysis errors: {:?}",
            analysis.diagnostics.errors().map(|d| d.message.clone()).collect::<Vec<_>>()
        );
        build_graph(&program, &analysis, source)
    }

    fn edges(ir: &IR) -> Vec<String> {
        ir.edges.iter().map(ToString::to_string).collect()
    }

    fn messages(result: &GraphResult) -> Vec<String> {
        result.diagnostics.iter().map(|d| d.message.clone()).collect()
    }

    const FUNCS: &str = "
        func scale{factor f64} (v f64) f64 { return v * factor }
        func open(v f64) u8 { return v > 10.0 }
        func alarm() { }
        func split(v f64) (hi f64, lo f64) { hi = v; lo = v }
        func pair(a f64, b f64) f64 { return a + b }
    ";

    #[test]
    fn channel_to_function_to_channel() {
        let result = build(&format!("{FUNCS}\nsensor -> scale{{factor=2.0}} -> level"));
        let ir = &result.ir;
        let keys: Vec<&str> = ir.nodes.keys().collect();
        assert_eq!(keys, ["on_sensor_0", "scale_0", "write_level_0"]);
        assert_eq!(
            edges(ir),
            ["on_sensor_0.output -> scale_0.v", "scale_0.output -> write_level_0.input"]
        );
        let scale = ir.nodes.get("scale_0").expect("scale node");
        assert_eq!(scale.config.get("factor").and_then(|p| p.value.clone()), Some(Value::Float(2.0)));
    }

    #[test]
    fn implicit_trigger_for_expression_head() {
        let result = build(&format!("{FUNCS}\nsensor > 20 => alarm{{}}"));
        let ir = &result.ir;
        let keys: Vec<&str> = ir.nodes.keys().collect();
        assert_eq!(keys, ["expression_0", "on_sensor_0", "alarm_0"]);
        assert_eq!(
            edges(ir),
            [
                "on_sensor_0.output -> expression_0.sensor",
                "expression_0.output => alarm_0.input",
            ]
        );
        assert_eq!(ir.edges.by_kind(EdgeKind::OneShot).count(), 1);
        let alarm = ir.nodes.get("alarm_0").expect("alarm");
        assert!(alarm.has_param("input"));
    }

    #[test]
    fn literal_head_is_one_constant() {
        let result = build(&format!("{FUNCS}\n1 + 2 * 3 -> scale{{factor=1.0}}"));
        let constants: Vec<&Node> = result
            .ir
            .nodes
            .iter()
            .filter(|n| n.ty == node_type::CONSTANT)
            .collect();
        assert_eq!(constants.len(), 1);
        assert_eq!(constants[0].key, "const_0");
        assert_eq!(
            constants[0].config.get("value").and_then(|p| p.value.clone()),
            Some(Value::Float(7.0))
        );
    }

    #[test]
    fn routing_table_edges() {
        let result = build(&format!(
            "{FUNCS}\nsensor -> split{{}} -> {{hi: level, lo: pair{{}}: b}}"
        ));
        assert_eq!(
            edges(&result.ir),
            [
                "on_sensor_0.output -> split_0.v",
                "split_0.hi -> write_level_0.input",
                "split_0.lo -> pair_0.b",
            ]
        );
    }

    #[test]
    fn input_routing_table() {
        let result = build(&format!("{FUNCS}\n{{sensor: a, level: b}} -> pair{{}}"));
        assert_eq!(
            edges(&result.ir),
            ["on_sensor_0.output -> pair_0.a", "on_level_0.output -> pair_0.b"]
        );
    }

    #[test]
    fn next_targets_following_stage() {
        let result = build("sequence s { stage a { sensor > 0 => next } stage b { } }");
        assert!(result.diagnostics.is_empty(), "{:?}", messages(&result));
        let ir = &result.ir;
        let edge = ir
            .edges
            .by_kind(EdgeKind::OneShot)
            .next()
            .expect("one-shot edge");
        assert_eq!(edge.target, Handle::new("entry_s_b", ACTIVATE));
        let seq = ir.sequence("s").expect("sequence");
        assert_eq!(seq.stages[0].nodes, ["expression_0", "on_sensor_0"]);
        assert!(seq.stages[1].nodes.is_empty());
    }

    #[test]
    fn next_in_last_stage() {
        let result = build("sequence s { stage a { } stage b { sensor > 0 => next } }");
        assert!(messages(&result)
            .iter()
            .any(|m| m == "'next' in last stage 'b' has no next stage"));
    }

    #[test]
    fn next_outside_sequence() {
        let result = build("sensor > 0 => next");
        assert_eq!(messages(&result), ["'next' used outside of a sequence"]);
    }

    #[test]
    fn sequence_reference_targets_first_stage() {
        let result = build("sequence s { stage a { } stage b { } }\nsensor > 1 => s");
        let edge = result.ir.edges.by_kind(EdgeKind::OneShot).next().expect("edge");
        assert_eq!(edge.target, Handle::new("entry_s_a", ACTIVATE));
    }

    #[test]
    fn stage_reference_targets_its_entry() {
        let result = build("sequence s { stage a { sensor > 1 => c } stage b { } stage c { } }");
        let edge = result.ir.edges.by_kind(EdgeKind::OneShot).next().expect("edge");
        assert_eq!(edge.target, Handle::new("entry_s_c", ACTIVATE));
    }

    #[test]
    fn empty_sequence() {
        let result = build("sequence s { }");
        assert_eq!(messages(&result), ["sequence 's' has no stages"]);
    }

    #[test]
    fn channel_config_is_read() {
        let result = build(
            "func watch{src chan f64} () u8 { return 1 }\nsensor > 0 => watch{src=level}",
        );
        let node = result.ir.nodes.get("watch_0").expect("watch");
        assert_eq!(node.channels.read.get(&3).map(String::as_str), Some("level"));
        assert_eq!(node.config.get("src").and_then(|p| p.value.clone()), Some(Value::Uint(3)));
    }

    #[test]
    fn every_edge_handle_exists() {
        let result = build(&format!(
            "{FUNCS}\nsensor -> split{{}} -> {{hi: level, lo: open{{}} -> valve}}\nsensor * 2 => alarm{{}}"
        ));
        let ir = &result.ir;
        for edge in &ir.edges {
            let source = ir.nodes.get(&edge.source.node).expect("source node");
            let target = ir.nodes.get(&edge.target.node).expect("target node");
            assert!(source.has_param(&edge.source.param), "{edge}");
            assert!(target.has_param(&edge.target.param), "{edge}");
        }
    }

    #[test]
    fn oversized_config_literal_is_reported() {
        let source = "func f{n u8} (v f64) u8 { return v > 1.0 }\nsensor -> f{n=300} -> valve";
        let program = parser::parse(source).program.expect("program");
        let analysis = analyze_program(source, &program, Some(resolver()));
        assert!(!analysis.diagnostics.ok());

        let result = build_graph(&program, &analysis, source);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, Some(codes::E_LITERAL));
        assert!(messages(&result)[0].contains("out of range for u8"));
        let node = result.ir.nodes.get("f_0").expect("f node");
        assert!(node.config.get("n").is_none());
    }
}
