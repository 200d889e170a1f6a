// analyzer/function.rs — Declarations and return-type inference
//
// The declaration pass turns function, sequence, and constant items into
// root-scope symbols. Output-less functions then go through inference
// rounds over a snapshot that only collect return types, until no output
// changes. A validation pass finally checks every return against the
// unified result.
//
// Preconditions: every declaration is registered before inference runs.
// Postconditions: every function symbol carries its final signature.
// Failure modes: bad parameters, defaults, and irreconcilable return types
//                produce diagnostics; the function is still registered.
// Side effects: none beyond the analyzer state.

use tracing::debug;

use crate::ast::{FunctionDecl, GlobalConst, Outputs, SequenceDecl, Span, StageItem};
use crate::diag::codes;
use crate::literal;
use crate::symbol::{Kind, ScopeId, Symbol};
use crate::types::{FunctionProps, LiteralClass, Numeric, Param, Params, Type, DEFAULT_OUTPUT};

use super::statement::always_returns;
use super::{error, span_key, Analyzer, Check, Mode};

impl Analyzer {
    // ── Declaration pass ──

    pub(crate) fn declare_function(&mut self, decl: &FunctionDecl, span: Span) {
        let mut props = FunctionProps::default();

        for param in &decl.config {
            let ty = self.resolve_type(&param.ty);
            let ty = self.record(ty).unwrap_or_default();
            if props.config.has(&param.name.name) {
                self.diagnostics.add(error(
                    param.name.span,
                    codes::E_CONFLICT,
                    format!("duplicate config parameter {}", param.name),
                ));
                continue;
            }
            props.config.push(Param::new(&param.name.name, ty));
        }

        let mut optional_seen = false;
        for input in &decl.inputs {
            let ty = self.resolve_type(&input.ty);
            let ty = self.record(ty).unwrap_or_default();
            if props.inputs.has(&input.name.name) {
                self.diagnostics.add(error(
                    input.name.span,
                    codes::E_CONFLICT,
                    format!("duplicate input {}", input.name),
                ));
                continue;
            }
            let mut param = Param::new(&input.name.name, ty.clone());
            match &input.default {
                Some(default) => {
                    optional_seen = true;
                    let parsed = literal::fold(default, &ty)
                        .map_err(|e| error(default.span, codes::E_LITERAL, e.to_string()));
                    if let Some(parsed) = self.record(parsed) {
                        param = param.with_value(parsed.value);
                    }
                }
                None if optional_seen => self.diagnostics.add(error(
                    input.name.span,
                    codes::E_POLICY,
                    format!(
                        "required parameter {} cannot follow optional parameters",
                        input.name
                    ),
                )),
                None => {}
            }
            props.inputs.push(param);
        }

        match &decl.outputs {
            Outputs::None => {}
            Outputs::Single(ty) => {
                let ty = self.resolve_type(ty);
                let ty = self.record(ty).unwrap_or_default();
                props.outputs.push(Param::new(DEFAULT_OUTPUT, ty));
            }
            Outputs::Named(params) => {
                for param in params {
                    let ty = self.resolve_type(&param.ty);
                    let ty = self.record(ty).unwrap_or_default();
                    if props.outputs.has(&param.name.name) {
                        self.diagnostics.add(error(
                            param.name.span,
                            codes::E_CONFLICT,
                            format!("duplicate output {}", param.name),
                        ));
                        continue;
                    }
                    props.outputs.push(Param::new(&param.name.name, ty));
                }
            }
        }

        let root = self.scopes.root();
        let symbol = Symbol::new(&decl.name.name, Kind::Function, Type::function(props.clone()))
            .with_span(span);
        let func = self.add_symbol(root, symbol);
        let Some(func) = self.record(func) else {
            return;
        };
        self.declared.insert(span_key(decl.name.span), func);
        debug!(function = %decl.name, "declared");

        let spans = |name: &str| -> Span {
            decl.config
                .iter()
                .map(|p| (&p.name, p.span))
                .chain(decl.inputs.iter().map(|p| (&p.name, p.span)))
                .find(|(n, _)| n.name == name)
                .map(|(_, s)| s)
                .unwrap_or(decl.name.span)
        };
        for param in props.config.iter() {
            let symbol = Symbol::new(&param.name, Kind::Config, param.ty.clone())
                .with_span(spans(&param.name));
            let added = self.add_symbol(func, symbol);
            self.record(added);
        }
        for param in props.inputs.iter() {
            let mut symbol = Symbol::new(&param.name, Kind::Input, param.ty.clone())
                .with_span(spans(&param.name));
            if let Some(value) = &param.value {
                symbol = symbol.with_default(value.clone());
            }
            let added = self.add_symbol(func, symbol);
            self.record(added);
        }
        if let Outputs::Named(params) = &decl.outputs {
            for param in params {
                let Some(out) = props.outputs.get(&param.name.name) else {
                    continue;
                };
                let symbol =
                    Symbol::new(&out.name, Kind::Output, out.ty.clone()).with_span(param.span);
                let added = self.add_symbol(func, symbol);
                self.record(added);
            }
        }
    }

    pub(crate) fn declare_sequence(&mut self, decl: &SequenceDecl, span: Span) {
        let root = self.scopes.root();
        let symbol = Symbol::new(&decl.name.name, Kind::Sequence, Type::Invalid).with_span(span);
        let seq = self.add_symbol(root, symbol);
        let Some(seq) = self.record(seq) else {
            return;
        };
        self.declared.insert(span_key(decl.name.span), seq);
        for stage in &decl.stages {
            let symbol =
                Symbol::new(&stage.name.name, Kind::Stage, Type::Invalid).with_span(stage.span);
            let added = self.add_symbol(seq, symbol);
            if let Some(scope) = self.record(added) {
                self.declared.insert(span_key(stage.name.span), scope);
            }
        }
    }

    pub(crate) fn declare_constant(&mut self, decl: &GlobalConst, span: Span) -> Check {
        let target = match &decl.ty {
            Some(ty) => self.resolve_type(ty)?,
            None => Type::Invalid,
        };
        if !decl.value.is_pure_literal() {
            return Err(error(
                decl.value.span,
                codes::E_LITERAL,
                format!("global constant {} must be a literal", decl.name),
            ));
        }
        let parsed = literal::fold(&decl.value, &target)
            .map_err(|e| error(decl.value.span, codes::E_LITERAL, e.to_string()))?;
        let symbol = Symbol::new(&decl.name.name, Kind::Constant, parsed.ty)
            .with_span(span)
            .with_default(parsed.value);
        self.add_symbol(self.scopes.root(), symbol)?;
        Ok(())
    }

    // ── Analysis pass ──

    pub(crate) fn analyze_function(&mut self, decl: &FunctionDecl) {
        let Some(&func) = self.declared.get(&span_key(decl.name.span)) else {
            return;
        };
        self.block(func, &decl.body, Mode::Validation);

        if let Outputs::Single(_) = decl.outputs {
            let expected = self
                .scopes
                .get(func)
                .symbol
                .ty
                .function_props()
                .and_then(|p| p.return_type().cloned())
                .unwrap_or_default();
            if expected.is_valid() && !always_returns(&decl.body.stmts) {
                self.diagnostics.add(error(
                    decl.name.span,
                    codes::E_RETURN_TYPE,
                    format!(
                        "function '{}' must return a value of type {expected} on all paths",
                        decl.name
                    ),
                ));
            }
        }
    }

    /// Infer the output of every function in `decls`.
    ///
    /// A call to a function whose output is not known yet types as invalid
    /// and its return is dropped, so the whole set is re-inferred until no
    /// output changes. Outputs travel one call level per round, so the rounds
    /// are bounded by the number of functions. Errors are reported from the
    /// final round only.
    pub(crate) fn infer_return_types(&mut self, decls: &[&FunctionDecl]) {
        let funcs: Vec<(ScopeId, &FunctionDecl)> = decls
            .iter()
            .filter_map(|decl| {
                let func = self.declared.get(&span_key(decl.name.span))?;
                Some((*func, *decl))
            })
            .collect();

        let mut previous: Vec<Result<Type, String>> = Vec::new();
        for round in 0..=funcs.len() {
            let results: Vec<Result<Type, String>> = funcs
                .iter()
                .map(|&(func, decl)| {
                    let result = self.infer_return_type(func, decl);
                    let output = result.clone().unwrap_or(Type::Invalid);
                    if let Type::Function(props) = &mut self.scopes.get_mut(func).symbol.ty {
                        props.outputs = if output.is_valid() || result.is_err() {
                            Params::single(DEFAULT_OUTPUT, output)
                        } else {
                            Params::default()
                        };
                    }
                    result
                })
                .collect();
            let settled = results == previous;
            previous = results;
            if settled {
                debug!(rounds = round + 1, "return inference settled");
                break;
            }
        }

        for (&(_, decl), result) in funcs.iter().zip(previous) {
            match result {
                Ok(ty) if ty.is_valid() => {
                    debug!(function = %decl.name, ty = %ty, "inferred return type");
                }
                Ok(_) => {}
                Err(msg) => self
                    .diagnostics
                    .add(error(decl.name.span, codes::E_RETURN_TYPE, msg)),
            }
        }
    }

    /// Run the body over a snapshot and unify what it returns. The analyzer
    /// state is left as it was.
    fn infer_return_type(&mut self, func: ScopeId, decl: &FunctionDecl) -> Result<Type, String> {
        let scopes = self.scopes.clone();
        let constraints = self.constraints.clone();
        let ids = self.ids.clone();
        let mark = self.diagnostics.len();

        self.returns.clear();
        self.block(func, &decl.body, Mode::Inference);
        let returns: Vec<Type> = std::mem::take(&mut self.returns)
            .into_iter()
            .filter(Type::is_valid)
            .collect();

        self.scopes = scopes;
        self.constraints = constraints;
        self.ids = ids;
        self.diagnostics.truncate(mark);

        unify_return_types(&returns)
    }

    pub(crate) fn analyze_sequence(&mut self, decl: &SequenceDecl) {
        for stage in &decl.stages {
            let Some(&scope) = self.declared.get(&span_key(stage.name.span)) else {
                continue;
            };
            for item in &stage.items {
                match item {
                    StageItem::Flow(stmt) => self.analyze_flow(scope, stmt),
                    StageItem::Single(node) => self.analyze_single(scope, node),
                }
            }
        }
    }
}

// ── Return-type unification ──

/// Default for a literal type variable with nothing else to go on.
fn default_literal(var: &Type) -> Type {
    let ty = match var {
        Type::Var {
            constraint: Some(c),
            ..
        } => match c.as_ref() {
            Type::Constraint(LiteralClass::Integer) => Type::I64,
            Type::Constraint(_) => Type::F64,
            concrete => concrete.clone(),
        },
        _ => Type::F64,
    };
    ty.with_unit(var.unit().cloned())
}

/// Resolve a type variable against the concrete types it is returned
/// alongside.
fn resolve_in_context(var: &Type, concrete: &[&Type]) -> Type {
    let first_float = concrete.iter().find(|t| t.is_float()).map(|t| (*t).clone());
    let ty = match var.literal_class() {
        Some(LiteralClass::Integer) => {
            if let Some(float) = first_float {
                float
            } else if concrete.iter().all(|t| t.is_unsigned_integer()) {
                let bits = concrete
                    .iter()
                    .filter_map(|t| t.numeric_kind())
                    .map(Numeric::bits)
                    .max()
                    .unwrap_or(32);
                smallest_unsigned(bits)
            } else {
                Type::I32
            }
        }
        Some(LiteralClass::Float | LiteralClass::ExactIntegerFloat) => {
            first_float.unwrap_or(Type::F64)
        }
        Some(LiteralClass::Numeric) => Type::F64,
        None => return default_literal(var),
    };
    ty.with_unit(var.unit().cloned())
}

fn smallest_signed(bits: u32) -> Type {
    match bits {
        0..=8 => Type::I8,
        9..=16 => Type::I16,
        17..=32 => Type::I32,
        _ => Type::I64,
    }
}

fn smallest_unsigned(bits: u32) -> Type {
    match bits {
        0..=8 => Type::U8,
        9..=16 => Type::U16,
        17..=32 => Type::U32,
        _ => Type::U64,
    }
}

/// Unify the types returned along every path of a function body.
///
/// Channel and series wrappers are unwrapped first. Type variables resolve
/// against the concrete types present; numeric types then meet by width and
/// signedness. Signed mixed with unsigned widens to the next signed bucket
/// (`≤8 → i16`, `≤16 → i32`, otherwise `i64`).
pub fn unify_return_types(types: &[Type]) -> Result<Type, String> {
    let Some(first) = types.first() else {
        return Ok(Type::Invalid);
    };
    let unwrapped: Vec<Type> = types.iter().map(|t| t.inner().clone()).collect();

    if unwrapped.iter().all(Type::is_var) {
        return Ok(default_literal(&unwrapped[0]));
    }
    let concrete: Vec<&Type> = unwrapped.iter().filter(|t| !t.is_var()).collect();
    let resolved: Vec<Type> = unwrapped
        .iter()
        .map(|t| {
            if t.is_var() {
                resolve_in_context(t, &concrete)
            } else {
                t.clone()
            }
        })
        .collect();

    if resolved.iter().all(|t| *t == resolved[0]) {
        return Ok(resolved[0].clone());
    }
    let plain: Vec<Type> = resolved.iter().map(Type::without_unit).collect();
    if plain.iter().any(|t| t.numeric_kind().is_none()) {
        if plain.iter().all(|t| *t == plain[0]) {
            return Ok(plain[0].clone());
        }
        let second = types.get(1).unwrap_or(first);
        return Err(format!(
            "incompatible return types: cannot unify {first} and {second}"
        ));
    }

    let kinds: Vec<Numeric> = plain.iter().filter_map(Type::numeric_kind).collect();
    let has_float = kinds.iter().any(|k| k.is_float());
    let has_int = kinds.iter().any(|k| !k.is_float());
    if has_float && has_int {
        return Err("mixed integer and floating-point returns are not allowed".to_string());
    }
    let max_bits = kinds.iter().map(|k| k.bits()).max().unwrap_or(0);
    if has_float {
        return Ok(if max_bits <= 32 { Type::F32 } else { Type::F64 });
    }
    let signed = kinds.iter().any(|k| k.is_signed());
    let unsigned = kinds.iter().any(|k| k.is_unsigned());
    Ok(match (signed, unsigned) {
        (true, true) => match max_bits {
            0..=8 => Type::I16,
            9..=16 => Type::I32,
            _ => Type::I64,
        },
        (true, false) => smallest_signed(max_bits),
        _ => smallest_unsigned(max_bits),
    })
}
