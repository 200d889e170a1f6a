// analyzer/flow.rs — Flow statement validation
//
// Walks a flow chain left to right, tracking what the previous element
// produces, and checks that each element can consume it: channel value
// types against function parameters, function outputs against channels,
// routing table labels against named outputs. Non-trivial expressions are
// registered as synthetic `expression_N` functions so the graph builder can
// give them a node and the channels they read.
//
// Preconditions: declarations are registered.
// Postconditions: `flow_exprs` maps every expression flow node to how it is
//                 lowered.
// Failure modes: the first failing element aborts the statement.
// Side effects: none beyond the analyzer state.

use crate::ast::{
    ConfigValues, Expr, ExprKind, FlowElem, FlowNode, FlowOp, FlowStmt, FuncCall, Ident,
    RoutingEntry, RoutingTable, Span,
};
use crate::diag::codes;
use crate::literal;
use crate::symbol::{Kind, ScopeId, Symbol};
use crate::types::{compatible, FunctionProps, Param, Params, Type, DEFAULT_OUTPUT};

use super::{error, span_key, unification_diagnostic, Analyzer, Check, FlowExpr};

/// What the previous element of a chain hands to the next one.
#[derive(Debug, Clone)]
enum Upstream {
    /// Start of a chain; nothing flows in.
    None,
    Channel { name: String, ty: Type },
    Expression { ty: Type },
    Func { name: String, props: FunctionProps },
    /// One named output of a function, inside a routing table.
    Output { func: String, output: String, ty: Type },
    /// An activation target or a routing table; nothing to type-check.
    Routed,
}

/// A flow node that invokes a function, with or without a config block.
pub(crate) fn as_call(node: &FlowNode, symbol: &Symbol) -> Option<FuncCall> {
    match node {
        FlowNode::Call(call) => Some(call.clone()),
        FlowNode::Expr(Expr {
            kind: ExprKind::Ident(name),
            span,
        }) if symbol.kind == Kind::Function => Some(FuncCall {
            name: Ident {
                name: name.clone(),
                span: *span,
            },
            config: ConfigValues::Named(Vec::new()),
            span: *span,
        }),
        _ => None,
    }
}

impl Analyzer {
    pub(crate) fn analyze_flow(&mut self, scope: ScopeId, stmt: &FlowStmt) {
        let result = self.flow_chain(scope, stmt);
        self.record(result);
    }

    /// A stage item with no edges.
    pub(crate) fn analyze_single(&mut self, scope: ScopeId, node: &FlowNode) {
        let result = self
            .flow_node(scope, node, &Upstream::None, None, false)
            .map(|_| ());
        self.record(result);
    }

    fn flow_chain(&mut self, scope: ScopeId, stmt: &FlowStmt) -> Check {
        let elements: Vec<(Option<FlowOp>, &FlowElem)> = stmt.elements().collect();
        let mut upstream = Upstream::None;
        for (i, (op, elem)) in elements.iter().enumerate() {
            upstream = match elem {
                FlowElem::Node(node) => self.flow_node(scope, node, &upstream, *op, false)?,
                FlowElem::Table(table) if i == 0 => {
                    let next = elements.get(1).map(|(_, e)| *e);
                    self.input_table(scope, table, next)?;
                    Upstream::Routed
                }
                FlowElem::Table(table) => {
                    self.output_table(scope, table, &upstream)?;
                    Upstream::Routed
                }
            };
        }
        Ok(())
    }

    fn flow_node(
        &mut self,
        scope: ScopeId,
        node: &FlowNode,
        upstream: &Upstream,
        op: Option<FlowOp>,
        in_table: bool,
    ) -> Check<Upstream> {
        match node {
            FlowNode::Next(_) => Ok(Upstream::Routed),
            FlowNode::Call(call) => self.flow_call(scope, call, upstream, op),
            FlowNode::Expr(expr) => match &expr.kind {
                ExprKind::Ident(name) => {
                    let resolved = self.resolve(scope, name, expr.span)?;
                    let symbol = resolved.symbol;
                    match symbol.kind {
                        Kind::Channel => {
                            let ty = symbol.ty.inner().clone();
                            self.into_channel(upstream, name, &ty, expr.span)?;
                            Ok(Upstream::Channel {
                                name: name.clone(),
                                ty,
                            })
                        }
                        Kind::Sequence | Kind::Stage => Ok(Upstream::Routed),
                        Kind::Function => match as_call(node, &symbol) {
                            Some(call) => self.flow_call(scope, &call, upstream, op),
                            None => Ok(Upstream::Routed),
                        },
                        _ => {
                            let what = if in_table {
                                "a channel or sequence"
                            } else {
                                "a channel"
                            };
                            Err(error(
                                expr.span,
                                codes::E_NOT_A_CHANNEL,
                                format!("{name} is not {what}"),
                            ))
                        }
                    }
                }
                _ => {
                    let ty = self.flow_expression(expr)?;
                    Ok(Upstream::Expression { ty })
                }
            },
        }
    }

    /// Register a non-identifier flow expression and return its type.
    fn flow_expression(&mut self, expr: &Expr) -> Check<Type> {
        let root = self.scopes.root();
        if expr.is_pure_literal() {
            let ty = self.expr(root, expr)?;
            self.flow_exprs.insert(
                span_key(expr.span),
                FlowExpr::Constant {
                    ty: ty.clone(),
                    value: None,
                },
            );
            self.constant_heads.push(expr.clone());
            return Ok(ty);
        }
        let name = self.ids.alloc_expression();
        let symbol = Symbol::new(&name, Kind::Function, Type::Invalid).with_span(expr.span);
        let func = self.add_symbol(root, symbol)?;
        let ty = self.expr(func, expr)?;

        let mut props = FunctionProps::default();
        let read = self.scopes.get(func).channels.read.clone();
        for channel in read.values() {
            if props.inputs.has(channel) {
                continue;
            }
            let elem = self
                .scopes
                .resolve(root, channel)
                .map(|r| r.symbol.ty.inner().clone())
                .unwrap_or_default();
            props.inputs.push(Param::new(channel, elem));
        }
        props.outputs = Params::single(DEFAULT_OUTPUT, ty.clone());
        self.scopes.get_mut(func).symbol.ty = Type::function(props);
        self.flow_exprs
            .insert(span_key(expr.span), FlowExpr::Function { name });
        Ok(ty)
    }

    // ── Function invocations ──

    fn flow_call(
        &mut self,
        scope: ScopeId,
        call: &FuncCall,
        upstream: &Upstream,
        op: Option<FlowOp>,
    ) -> Check<Upstream> {
        let name = &call.name.name;
        let resolved = self.resolve(scope, name, call.name.span)?;
        let Some(props) = resolved.symbol.ty.function_props().cloned() else {
            return Err(error(
                call.name.span,
                codes::E_NOT_A_FUNCTION,
                format!("{name} is not a function"),
            ));
        };
        self.flow_config(scope, call, &props)?;

        if !matches!(upstream, Upstream::None | Upstream::Routed) {
            match props.inputs.first() {
                None if op == Some(FlowOp::OneShot) => {}
                None => {
                    return Err(error(
                        call.span,
                        codes::E_FLOW,
                        format!("func '{name}' does not accept an input"),
                    ))
                }
                Some(_) if props.required_inputs() > 1 => {
                    return Err(error(
                        call.span,
                        codes::E_FLOW,
                        format!("{name} has more than one parameter"),
                    ))
                }
                Some(param) => self.into_param(upstream, name, param, call.span)?,
            }
        }
        Ok(Upstream::Func {
            name: name.clone(),
            props,
        })
    }

    fn flow_config(&mut self, scope: ScopeId, call: &FuncCall, props: &FunctionProps) -> Check {
        let fname = &call.name.name;
        let provided: Vec<(&Param, &Expr)> = match &call.config {
            ConfigValues::Named(values) => {
                let mut out = Vec::with_capacity(values.len());
                for (key, value) in values {
                    let Some(param) = props.config.get(&key.name) else {
                        return Err(error(
                            key.span,
                            codes::E_FLOW,
                            format!("unknown config parameter '{}' for func '{fname}'", key.name),
                        ));
                    };
                    out.push((param, value));
                }
                out
            }
            ConfigValues::Anonymous(values) => {
                if values.len() > props.config.len() {
                    return Err(error(
                        call.span,
                        codes::E_FLOW,
                        format!(
                            "func '{fname}' expects {} config value(s), got {}",
                            props.config.len(),
                            values.len()
                        ),
                    ));
                }
                props.config.iter().zip(values.iter()).collect()
            }
        };

        for (param, value) in &provided {
            let actual = self.config_value(scope, &param.name, value)?;
            let ok = if param.ty.is_chan() {
                actual.is_chan() && compatible(&param.ty, &actual)
            } else if actual.is_var() {
                crate::types::literal_assignment_compatible(&param.ty, &actual)
            } else {
                compatible(&param.ty, &actual)
            };
            if !ok {
                return Err(error(
                    value.span,
                    codes::E_TYPE_MISMATCH,
                    format!(
                        "type mismatch: config parameter '{}' expects {} but got {actual}",
                        param.name, param.ty
                    ),
                ));
            }
            if value.is_pure_literal() {
                literal::fold(value, &param.ty)
                    .map_err(|e| error(value.span, codes::E_LITERAL, e.to_string()))?;
            }
        }

        for param in props.config.iter() {
            if !provided.iter().any(|(p, _)| p.name == param.name) {
                return Err(error(
                    call.span,
                    codes::E_FLOW,
                    format!(
                        "missing required config parameter '{}' for func '{fname}'",
                        param.name
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Type of a config value: a literal, a channel, or a global constant.
    fn config_value(&mut self, scope: ScopeId, param: &str, value: &Expr) -> Check<Type> {
        let not_literal = || {
            error(
                value.span,
                codes::E_FLOW,
                format!("config value for '{param}' must be a literal"),
            )
        };
        if let ExprKind::Ident(name) = &value.kind {
            let resolved = self.resolve(scope, name, value.span)?;
            return match resolved.symbol.kind {
                Kind::Channel => Ok(Type::chan(resolved.symbol.ty.inner().clone())),
                Kind::Constant => Ok(resolved.symbol.ty),
                _ => Err(not_literal()),
            };
        }
        if !value.is_pure_literal() {
            return Err(not_literal());
        }
        self.expr(scope, value)
    }

    // ── Connections ──

    /// Check that `upstream` can feed `param` of function `func`.
    fn into_param(&mut self, upstream: &Upstream, func: &str, param: &Param, span: Span) -> Check {
        let expected = &param.ty;
        let (actual, message) = match upstream {
            Upstream::None | Upstream::Routed => return Ok(()),
            Upstream::Channel { name, ty } => (
                ty.clone(),
                format!("channel {name} value type {ty} does not match func {func} parameter type {expected}"),
            ),
            Upstream::Expression { ty } => (
                ty.clone(),
                format!("expression type {ty} does not match func {func} parameter type {expected}"),
            ),
            Upstream::Output { func: source, output, ty } => (
                ty.clone(),
                format!("output {output} type {ty} of {source} does not match func {func} parameter type {expected}"),
            ),
            Upstream::Func { name, props } => {
                let ret = self.produced(name, props, span)?;
                let message =
                    format!("return type {ret} of {name} is not equal to argument type {expected} of {func}");
                (ret, message)
            }
        };
        self.connect(expected.inner(), &actual, span, message)
    }

    /// Check that `upstream` can be written to channel `channel`.
    fn into_channel(&mut self, upstream: &Upstream, channel: &str, elem: &Type, span: Span) -> Check {
        let (actual, message) = match upstream {
            Upstream::None | Upstream::Routed => return Ok(()),
            Upstream::Channel { name, ty } => (
                ty.clone(),
                format!("channel {name} value type {ty} does not match channel {channel} value type {elem}"),
            ),
            Upstream::Expression { ty } => (
                ty.clone(),
                format!("expression type {ty} does not match channel {channel} value type {elem}"),
            ),
            Upstream::Output { func, output, ty } => (
                ty.clone(),
                format!("output {output} type {ty} of {func} does not match channel {channel} value type {elem}"),
            ),
            Upstream::Func { name, props } => {
                let ret = self.produced(name, props, span)?;
                let message =
                    format!("return type {ret} of {name} does not match channel {channel} value type {elem}");
                (ret, message)
            }
        };
        self.connect(elem, &actual, span, message)
    }

    /// The single value a function hands downstream.
    fn produced(&self, name: &str, props: &FunctionProps, span: Span) -> Check<Type> {
        if props.has_named_outputs() {
            return Err(error(
                span,
                codes::E_FLOW,
                format!("func '{name}' has named outputs and requires a routing table"),
            ));
        }
        props.return_type().cloned().ok_or_else(|| {
            error(
                span,
                codes::E_FLOW,
                format!("func '{name}' has no output"),
            )
        })
    }

    fn connect(&mut self, expected: &Type, actual: &Type, span: Span, message: String) -> Check {
        if !expected.is_valid() || !actual.is_valid() {
            return Ok(());
        }
        if expected.is_var() || actual.is_var() {
            return self
                .constraints
                .check(expected, actual, Some(span), "flow connection")
                .map_err(|e| unification_diagnostic(e, span));
        }
        if !compatible(expected, actual) {
            return Err(error(span, codes::E_TYPE_MISMATCH, message));
        }
        Ok(())
    }

    // ── Routing tables ──

    /// `{label: target, ...}` after a function with named outputs.
    fn output_table(&mut self, scope: ScopeId, table: &RoutingTable, upstream: &Upstream) -> Check {
        let Upstream::Func { name, props } = upstream else {
            return Err(error(
                table.span,
                codes::E_FLOW,
                "output routing table must follow a func invocation",
            ));
        };
        if !props.has_named_outputs() {
            return Err(error(
                table.span,
                codes::E_FLOW,
                format!("func '{name}' does not have named outputs, cannot use routing table"),
            ));
        }
        for entry in &table.entries {
            let Some(output) = props.outputs.get(&entry.label.name) else {
                return Err(error(
                    entry.label.span,
                    codes::E_FLOW,
                    format!("func '{name}' does not have output '{}'", entry.label.name),
                ));
            };
            let start = Upstream::Output {
                func: name.clone(),
                output: output.name.clone(),
                ty: output.ty.clone(),
            };
            self.routing_entry(scope, entry, start, &entry.nodes)?;
        }
        Ok(())
    }

    /// Walk the nodes of one routing entry, honoring an explicit `: param`.
    fn routing_entry(
        &mut self,
        scope: ScopeId,
        entry: &RoutingEntry,
        start: Upstream,
        nodes: &[FlowNode],
    ) -> Check<Upstream> {
        let mut upstream = start;
        let Some(param) = &entry.param else {
            for node in nodes {
                upstream =
                    self.flow_node(scope, node, &upstream, Some(FlowOp::Continuous), true)?;
            }
            return Ok(upstream);
        };
        let Some((last, rest)) = nodes.split_last() else {
            return Err(error(
                param.span,
                codes::E_FLOW,
                "parameter mapping requires a func after the routing table",
            ));
        };
        for node in rest {
            upstream = self.flow_node(scope, node, &upstream, Some(FlowOp::Continuous), true)?;
        }
        let target = self.flow_node(scope, last, &Upstream::Routed, None, true)?;
        let Upstream::Func { name, props } = &target else {
            return Err(error(
                param.span,
                codes::E_FLOW,
                "parameter mapping requires a func after the routing table",
            ));
        };
        let Some(input) = props.inputs.get(&param.name) else {
            return Err(error(
                param.span,
                codes::E_FLOW,
                format!("func '{name}' does not have parameter '{}'", param.name),
            ));
        };
        self.into_param(&upstream, name, input, param.span)?;
        Ok(target)
    }

    /// `{channel: param, ...} -> f{}`: each entry feeds one input of `f`.
    fn input_table(&mut self, scope: ScopeId, table: &RoutingTable, next: Option<&FlowElem>) -> Check {
        let target = match next {
            Some(FlowElem::Node(node)) => match node {
                FlowNode::Call(call) => Some(call.name.clone()),
                FlowNode::Expr(Expr {
                    kind: ExprKind::Ident(name),
                    span,
                }) => Some(Ident {
                    name: name.clone(),
                    span: *span,
                }),
                _ => None,
            },
            _ => None,
        };
        let target = target
            .map(|ident| {
                let resolved = self.resolve(scope, &ident.name, ident.span)?;
                Ok::<_, crate::diag::Diagnostic>(
                    resolved
                        .symbol
                        .ty
                        .function_props()
                        .cloned()
                        .map(|props| (ident.name, props)),
                )
            })
            .transpose()?
            .flatten();
        let Some((fname, props)) = target else {
            return Err(error(
                table.span,
                codes::E_FLOW,
                "input routing table must precede a func invocation",
            ));
        };

        for entry in &table.entries {
            let source = self.resolve(scope, &entry.label.name, entry.label.span)?;
            if source.symbol.kind != Kind::Channel {
                return Err(error(
                    entry.label.span,
                    codes::E_NOT_A_CHANNEL,
                    format!("{} is not a channel", entry.label.name),
                ));
            }
            let mut upstream = Upstream::Channel {
                name: entry.label.name.clone(),
                ty: source.symbol.ty.inner().clone(),
            };
            let (param, intermediate) = match &entry.param {
                Some(param) => (param.clone(), entry.nodes.as_slice()),
                None => match entry.nodes.split_last() {
                    Some((FlowNode::Expr(Expr { kind: ExprKind::Ident(name), span }), rest)) => (
                        Ident {
                            name: name.clone(),
                            span: *span,
                        },
                        rest,
                    ),
                    _ => {
                        return Err(error(
                            entry.span,
                            codes::E_FLOW,
                            format!(
                                "input routing entry '{}' must end in a parameter of {fname}",
                                entry.label.name
                            ),
                        ))
                    }
                },
            };
            for node in intermediate {
                upstream =
                    self.flow_node(scope, node, &upstream, Some(FlowOp::Continuous), true)?;
            }
            let Some(input) = props.inputs.get(&param.name) else {
                return Err(error(
                    param.span,
                    codes::E_FLOW,
                    format!("func '{fname}' does not have parameter '{}'", param.name),
                ));
            };
            self.into_param(&upstream, &fname, input, param.span)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::FlowExpr;
    use crate::symbol::MapResolver;
    use crate::types::Type;

    fn resolver() -> MapResolver {
        MapResolver::new()
            .channel("sensor", 1, Type::F64)
            .channel("pressure", 2, Type::F32)
            .channel("valve", 3, Type::U8)
            .channel("label", 4, Type::Str)
            .channel("level", 5, Type::F64)
    }

    fn check(source: &str) -> crate::analyzer::Analysis {
        analyze_with(source, resolver())
    }

    const FUNCS: &str = "
        func scale{factor f64} (v f64) f64 { return v * factor }
        func open(v f64) u8 { return v > 10.0 }
        func alarm() { }
        func split(v f64) (hi f64, lo f64) { hi = v; lo = v }
        func pair(a f64, b f64) f64 { return a + b }
    ";

    fn with_funcs(flow: &str) -> String {
        format!("{FUNCS}\n{flow}")
    }

    #[test]
    fn simple_chain() {
        assert_clean(&check(&with_funcs("sensor -> scale{factor=2.0} -> open{} -> valve")));
    }

    #[test]
    fn anonymous_config() {
        assert_clean(&check(&with_funcs("sensor -> scale{2.0}")));
        assert_error(
            &check(&with_funcs("sensor -> scale{2.0, 3.0}")),
            "func 'scale' expects 1 config value(s), got 2",
        );
    }

    #[test]
    fn config_errors() {
        assert_error(
            &check(&with_funcs("sensor -> scale{gain=2.0}")),
            "unknown config parameter 'gain' for func 'scale'",
        );
        assert_error(
            &check(&with_funcs("sensor -> scale{}")),
            "missing required config parameter 'factor' for func 'scale'",
        );
        assert_error(
            &check(&with_funcs(r#"sensor -> scale{factor="x"}"#)),
            "type mismatch: config parameter 'factor' expects f64 but got str",
        );
        assert_error(
            &check(&with_funcs("sensor -> scale{factor=sensor * 2}")),
            "config value for 'factor' must be a literal",
        );
    }

    #[test]
    fn global_constant_as_config() {
        assert_clean(&check(&with_funcs("gain := 2.5\nsensor -> scale{factor=gain}")));
    }

    #[test]
    fn channel_type_mismatch() {
        assert_error(
            &check(&with_funcs("label -> open{}")),
            "channel label value type str does not match func open parameter type f64",
        );
    }

    #[test]
    fn return_type_mismatch() {
        assert_error(
            &check(&with_funcs("sensor -> open{} -> scale{factor=1.0}")),
            "return type u8 of open is not equal to argument type f64 of scale",
        );
        assert_error(
            &check(&with_funcs("sensor -> scale{factor=1.0} -> label")),
            "return type f64 of scale does not match channel label value type str",
        );
    }

    #[test]
    fn not_a_function() {
        assert_error(&check("sensor -> valve{}"), "valve is not a function");
    }

    #[test]
    fn multiple_parameters() {
        assert_error(&check(&with_funcs("sensor -> pair{}")), "pair has more than one parameter");
    }

    #[test]
    fn named_outputs_need_a_table() {
        assert_error(
            &check(&with_funcs("sensor -> split{} -> valve")),
            "func 'split' has named outputs and requires a routing table",
        );
    }

    #[test]
    fn one_shot_into_function_without_inputs() {
        assert_clean(&check(&with_funcs("sensor > 20 => alarm{}")));
        assert_error(
            &check(&with_funcs("sensor -> alarm{}")),
            "func 'alarm' does not accept an input",
        );
    }

    #[test]
    fn output_routing_tables() {
        assert_clean(&check(&with_funcs(
            "sensor -> split{} -> {hi: open{} -> valve, lo: scale{factor=1.0}}",
        )));
        assert_error(
            &check(&with_funcs("sensor -> split{} -> {mid: valve}")),
            "func 'split' does not have output 'mid'",
        );
        assert_error(
            &check(&with_funcs("sensor -> open{} -> {hi: valve}")),
            "func 'open' does not have named outputs, cannot use routing table",
        );
        assert_error(
            &check(&with_funcs("sensor -> {hi: valve}")),
            "output routing table must follow a func invocation",
        );
    }

    #[test]
    fn routing_table_parameter_mapping() {
        assert_clean(&check(&with_funcs(
            "sensor -> split{} -> {hi: pair{}: a, lo: pair{}: b}",
        )));
        assert_error(
            &check(&with_funcs("sensor -> split{} -> {hi: pair{}: c}")),
            "func 'pair' does not have parameter 'c'",
        );
        assert_error(
            &check(&with_funcs("sensor -> split{} -> {hi: valve: a}")),
            "parameter mapping requires a func after the routing table",
        );
    }

    #[test]
    fn routing_targets_must_be_channels_or_sequences() {
        assert_error(
            &check(&with_funcs("k := 1\nsensor -> split{} -> {hi: k}")),
            "k is not a channel or sequence",
        );
    }

    #[test]
    fn input_routing_tables() {
        assert_clean(&check(&with_funcs("{sensor: a, level: b} -> pair{}")));
        assert_error(
            &check(&with_funcs("{sensor: z} -> pair{}")),
            "func 'pair' does not have parameter 'z'",
        );
        assert_error(
            &check(&with_funcs("{sensor: a} -> valve")),
            "input routing table must precede a func invocation",
        );
    }

    #[test]
    fn expressions_become_synthetic_functions() {
        let analysis = check(&with_funcs("sensor * 2 + pressure -> open{}"));
        assert_error(&analysis, "type mismatch: cannot use f64 and f32 in + operation");

        let analysis = check(&with_funcs("sensor * 2 -> open{}"));
        assert_clean(&analysis);
        let expr = analysis
            .flow_exprs
            .values()
            .find_map(|e| match e {
                FlowExpr::Function { name } => Some(name.clone()),
                _ => None,
            })
            .expect("expression");
        assert_eq!(expr, "expression_0");
        let ty = analysis.type_of(&expr).expect("type");
        let props = ty.function_props().expect("props");
        assert_eq!(props.inputs.len(), 1);
        assert_eq!(props.inputs.first().map(|p| p.name.as_str()), Some("sensor"));
        assert_eq!(props.return_type(), Some(&Type::F64));
    }

    #[test]
    fn literal_heads_become_constants() {
        let source = with_funcs("1 + 2 * 3 -> scale{factor=1.0}");
        let analysis = check(&source);
        assert_clean(&analysis);
        let constants: Vec<_> = analysis
            .flow_exprs
            .values()
            .filter(|e| matches!(e, FlowExpr::Constant { .. }))
            .collect();
        assert_eq!(constants.len(), 1);
        assert_eq!(
            constants[0],
            &FlowExpr::Constant {
                ty: Type::F64,
                value: Some(crate::types::Value::Float(7.0)),
            }
        );
    }

    #[test]
    fn literal_head_out_of_range_for_sink() {
        let analysis = check("300 -> valve");
        assert_error(&analysis, "value 300 out of range for u8");
        assert!(analysis
            .flow_exprs
            .values()
            .all(|e| matches!(e, FlowExpr::Constant { value: None, .. })));
        assert_clean(&check("255 -> valve"));
    }

    #[test]
    fn config_literal_out_of_range() {
        let source = "func f{n u8} (v f64) u8 { return v > 1.0 }\nsensor -> f{n=300} -> valve";
        assert_error(&check(source), "value 300 out of range for u8");
        assert_error(
            &check("func f{n i8} (v f64) u8 { return v > 1.0 }\nsensor -> f{-200}"),
            "value -200 out of range for i8",
        );
        assert_clean(&check("func f{n u8} (v f64) u8 { return v > 1.0 }\nsensor -> f{n=200}"));
    }

    #[test]
    fn stage_names_are_local_to_their_sequence() {
        assert_clean(&check("sequence s { stage arm { sensor > 1 => fire } stage fire { } }"));
        assert_error(
            &check("sequence s { stage arm { } stage fire { } }\nsensor > 1 => fire"),
            "undefined symbol: fire",
        );
    }

    #[test]
    fn sink_type_mismatch_from_expression() {
        assert_error(
            &check(r#"sensor * 2 -> label"#),
            "expression type f64 does not match channel label value type str",
        );
    }
}
