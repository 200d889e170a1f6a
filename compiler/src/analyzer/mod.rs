// analyzer/mod.rs — Semantic analysis of Arc programs
//
// Two passes over the AST. The declaration pass registers every function,
// sequence, and global constant in the root scope so bodies can refer to
// items declared later in the file. Output types of functions that declare
// none are then inferred together, so a call may precede its callee in the
// file. The analysis pass then walks function
// bodies, flow statements, and stages, resolving names, inferring types,
// and recording deferred literal constraints. A final unification solves
// those constraints and substitutes the results into every symbol.
//
// Preconditions: `program` comes from `parser::parse`, possibly partial.
// Postconditions: `Analysis` holds the populated scope tree, the solved
//                 constraint system, the flow expression table consumed by
//                 the graph builder, and every diagnostic in encounter order.
// Failure modes: user errors become `Diagnostic` entries; analysis of the
//                failing statement stops and its siblings continue.
// Side effects: none.

pub mod expression;
pub mod flow;
pub mod function;
pub mod statement;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::ast::{Expr, FunctionDecl, ItemKind, Outputs, Program, Span, TypeExpr, TypeExprKind};
use crate::constraints::{System, UnificationError};
use crate::diag::{codes, DiagCode, Diagnostic, Diagnostics};
use crate::id::IdAllocator;
use crate::literal;
use crate::symbol::{Resolved, Resolver, ScopeId, ScopeTree, Symbol};
use crate::types::{Type, Value};
use crate::units;

pub use function::unify_return_types;

/// Result of a fallible analysis step. The driver records the `Err` and
/// moves on to the next statement.
pub(crate) type Check<T = ()> = Result<T, Diagnostic>;

/// Key for side tables indexed by AST position.
pub type SpanKey = (usize, usize);

pub fn span_key(span: Span) -> SpanKey {
    (span.start, span.end)
}

/// Which pass a function body is analyzed for.
///
/// `Inference` runs before the return type is known: return statements only
/// report their type. `Validation` checks every return against the now
/// concrete output type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Inference,
    Validation,
}

/// How the graph builder lowers a flow node that is an expression rather
/// than a name or a call.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowExpr {
    /// A pure-literal expression, folded into one `constant` node of `ty`.
    /// `value` is set once unification has fixed `ty`; it stays `None` only
    /// when folding failed and an `E_LITERAL` diagnostic was recorded.
    Constant { ty: Type, value: Option<Value> },
    /// A synthetic function registered in the root scope under `name`.
    Function { name: String },
}

/// Everything the later phases need from analysis.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub scopes: ScopeTree,
    pub constraints: System,
    pub flow_exprs: HashMap<SpanKey, FlowExpr>,
    pub diagnostics: Diagnostics,
}

impl Analysis {
    /// Resolve `name` from the root scope.
    pub fn resolve(&self, name: &str) -> Option<Resolved> {
        self.scopes.resolve(self.scopes.root(), name).ok()
    }

    /// Type of a root-level symbol, after substitution.
    pub fn type_of(&self, name: &str) -> Option<Type> {
        self.resolve(name).map(|r| r.symbol.ty)
    }
}

pub struct Analyzer {
    pub(crate) scopes: ScopeTree,
    pub(crate) constraints: System,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) ids: IdAllocator,
    pub(crate) flow_exprs: HashMap<SpanKey, FlowExpr>,
    /// Function, sequence, and stage scopes by name span, filled by the
    /// declaration pass.
    pub(crate) declared: HashMap<SpanKey, ScopeId>,
    /// Return types seen during the current inference pass.
    pub(crate) returns: Vec<Type>,
    /// Pure-literal flow heads, folded once their type is solved.
    pub(crate) constant_heads: Vec<Expr>,
}

impl Analyzer {
    pub fn new(source: &str) -> Self {
        Self {
            scopes: ScopeTree::new(source),
            constraints: System::new(),
            diagnostics: Diagnostics::new(),
            ids: IdAllocator::new(),
            flow_exprs: HashMap::new(),
            declared: HashMap::new(),
            returns: Vec::new(),
            constant_heads: Vec::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.scopes = self.scopes.with_resolver(resolver);
        self
    }

    /// Run both passes and unification over `program`.
    pub fn analyze(mut self, program: &Program) -> Analysis {
        debug!(items = program.items.len(), "declaration pass");
        for item in &program.items {
            match &item.kind {
                ItemKind::Function(decl) => self.declare_function(decl, item.span),
                ItemKind::Sequence(decl) => self.declare_sequence(decl, item.span),
                ItemKind::Constant(decl) => {
                    let result = self.declare_constant(decl, item.span);
                    self.record(result);
                }
                ItemKind::Flow(_) => {}
            }
        }

        let pending: Vec<&FunctionDecl> = program
            .items
            .iter()
            .filter_map(|item| match &item.kind {
                ItemKind::Function(decl) if matches!(decl.outputs, Outputs::None) => Some(decl),
                _ => None,
            })
            .collect();
        self.infer_return_types(&pending);

        debug!("analysis pass");
        let root = self.scopes.root();
        for item in &program.items {
            match &item.kind {
                ItemKind::Function(decl) => self.analyze_function(decl),
                ItemKind::Sequence(decl) => self.analyze_sequence(decl),
                ItemKind::Flow(stmt) => self.analyze_flow(root, stmt),
                ItemKind::Constant(_) => {}
            }
        }

        self.solve(program.span);
        Analysis {
            scopes: self.scopes,
            constraints: self.constraints,
            flow_exprs: self.flow_exprs,
            diagnostics: self.diagnostics,
        }
    }

    /// Unify deferred constraints and substitute the solution everywhere.
    fn solve(&mut self, fallback: Span) {
        debug!(constraints = self.constraints.constraints.len(), "unifying");
        if let Err(err) = self.constraints.unify() {
            let span = err.constraint.as_ref().and_then(|c| c.span).unwrap_or(fallback);
            self.diagnostics.add(unification_diagnostic(err, span));
        }
        let constraints = &self.constraints;
        for scope in self.scopes.iter_mut() {
            scope.symbol.ty = constraints.apply(&scope.symbol.ty);
        }
        for expr in self.flow_exprs.values_mut() {
            if let FlowExpr::Constant { ty, .. } = expr {
                *ty = constraints.apply(ty);
            }
        }

        for expr in std::mem::take(&mut self.constant_heads) {
            let Some(FlowExpr::Constant { ty, value }) = self.flow_exprs.get_mut(&span_key(expr.span))
            else {
                continue;
            };
            match literal::fold(&expr, ty) {
                Ok(parsed) => {
                    *ty = parsed.ty;
                    *value = Some(parsed.value);
                }
                Err(e) => self
                    .diagnostics
                    .add(error(expr.span, codes::E_LITERAL, e.to_string())),
            }
        }
    }

    // ── Shared helpers ──

    /// Record a failed step and discard its payload.
    pub(crate) fn record<T>(&mut self, result: Check<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(diag) => {
                self.diagnostics.add(diag);
                None
            }
        }
    }

    pub(crate) fn add_symbol(&mut self, parent: ScopeId, symbol: Symbol) -> Check<ScopeId> {
        let span = symbol.span;
        self.scopes.add(parent, symbol).map_err(|e| {
            let diag = Diagnostic::error(span.unwrap_or_else(|| Span::from(0..0)), e.to_string());
            diag.with_code(codes::E_CONFLICT)
        })
    }

    pub(crate) fn resolve(&self, scope: ScopeId, name: &str, span: Span) -> Check<Resolved> {
        self.scopes
            .resolve(scope, name)
            .map_err(|e| Diagnostic::error(span, e.to_string()).with_code(codes::E_UNDEFINED))
    }

    pub(crate) fn resolve_type(&self, ty: &TypeExpr) -> Check<Type> {
        match &ty.kind {
            TypeExprKind::Prim(prim, unit) => {
                let base = Type::from_name(prim.name()).unwrap_or_default();
                let Some(unit) = unit else {
                    return Ok(base);
                };
                if !prim.is_numeric() {
                    return Err(error(
                        ty.span,
                        codes::E_UNIT,
                        format!("unit {} requires a numeric type, got {prim}", unit.name),
                    ));
                }
                let resolved = units::lookup(&unit.name).ok_or_else(|| {
                    error(unit.span, codes::E_UNIT, format!("unknown unit: {}", unit.name))
                })?;
                Ok(base.with_unit(Some(resolved)))
            }
            TypeExprKind::Chan(elem, _) => Ok(Type::chan(self.resolve_type(elem)?)),
            TypeExprKind::Series(elem) => Ok(Type::series(self.resolve_type(elem)?)),
        }
    }
}

/// Build an error diagnostic with a code.
pub(crate) fn error(span: Span, code: DiagCode, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(span, message).with_code(code)
}

pub(crate) fn unification_diagnostic(err: UnificationError, span: Span) -> Diagnostic {
    let mut diag = error(span, codes::E_UNIFY, err.message.clone());
    if let Some(constraint) = &err.constraint {
        if !constraint.reason.is_empty() {
            diag = diag.with_cause(constraint.reason.clone(), constraint.span);
        }
    }
    if let Some(hint) = err.hint {
        diag = diag.with_hint(hint);
    }
    diag
}

/// Convenience entry point: analyze `program` with an optional resolver.
pub fn analyze_program(
    source: &str,
    program: &Program,
    resolver: Option<Arc<dyn Resolver>>,
) -> Analysis {
    let analyzer = Analyzer::new(source);
    let analyzer = match resolver {
        Some(resolver) => analyzer.with_resolver(resolver),
        None => analyzer,
    };
    analyzer.analyze(program)
}
