// analyzer/statement.rs — Statement analysis
//
// One entry point per statement kind, dispatched by an exhaustive match.
// Each returns `Check<()>`; the block driver records a failure and carries
// on with the next statement so one pass reports as much as possible.
//
// Preconditions: function declarations are registered.
// Postconditions: declared locals live in the block scope; channel writes
//                 are recorded on the enclosing function.
// Failure modes: one diagnostic per failing statement.
// Side effects: return types are collected into `returns` in inference mode.

use crate::ast::{AssignOp, AssignTarget, Block, Expr, ExprKind, Ident, Index, Span, Stmt, StmtKind, TypeExpr};
use crate::diag::{codes, Diagnostic};
use crate::literal;
use crate::symbol::{Kind, ScopeId, Symbol};
use crate::types::{
    check_assignment_units, compatible, literal_assignment_compatible, Type, UnitCheck,
};

use super::function::unify_return_types;
use super::{error, unification_diagnostic, Analyzer, Check, Mode};

impl Analyzer {
    /// Analyze `block` in a fresh child scope of `parent`.
    pub(crate) fn block(&mut self, parent: ScopeId, block: &Block, mode: Mode) {
        let scope = self.add_symbol(parent, Symbol::block().with_span(block.span));
        if let Some(scope) = self.record(scope) {
            self.statements(scope, &block.stmts, mode);
        }
    }

    pub(crate) fn statements(&mut self, scope: ScopeId, stmts: &[Stmt], mode: Mode) {
        for stmt in stmts {
            let result = self.statement(scope, stmt, mode);
            self.record(result);
        }
    }

    fn statement(&mut self, scope: ScopeId, stmt: &Stmt, mode: Mode) -> Check {
        match &stmt.kind {
            StmtKind::VarDecl {
                name,
                ty,
                value,
                stateful,
            } => self.var_decl(scope, name, ty.as_ref(), value, *stateful, stmt.span),
            StmtKind::ChannelRead { name, channel } => self.channel_read(scope, name, channel),
            StmtKind::Assign { target, op, value } => {
                self.assignment(scope, target, *op, value, stmt.span)
            }
            StmtKind::ChannelWrite { value, channel } => {
                let ty = self.expr(scope, value)?;
                self.channel_write(scope, channel, value, &ty, stmt.span)
            }
            StmtKind::If {
                cond,
                then,
                else_ifs,
                otherwise,
            } => {
                // A bad condition never hides its branches.
                let checked = self.condition(scope, cond);
                self.record(checked);
                self.block(scope, then, mode);
                for (cond, body) in else_ifs {
                    let checked = self.condition(scope, cond);
                    self.record(checked);
                    self.block(scope, body, mode);
                }
                if let Some(body) = otherwise {
                    self.block(scope, body, mode);
                }
                Ok(())
            }
            StmtKind::Return(value) => self.return_stmt(scope, value.as_ref(), stmt.span, mode),
            StmtKind::Expr(expr) => self.expr(scope, expr).map(|_| ()),
        }
    }

    fn condition(&mut self, scope: ScopeId, cond: &Expr) -> Check {
        let ty = self.expr(scope, cond)?;
        let inner = ty.inner();
        if inner.is_var() || inner.is_numeric() {
            return Ok(());
        }
        Err(error(
            cond.span,
            codes::E_TYPE_MISMATCH,
            format!("condition must be numeric, got {ty}"),
        ))
    }

    // ── Declarations ──

    fn var_decl(
        &mut self,
        scope: ScopeId,
        name: &Ident,
        declared: Option<&TypeExpr>,
        value: &Expr,
        stateful: bool,
        span: Span,
    ) -> Check {
        let kind = if stateful {
            Kind::StatefulVariable
        } else {
            Kind::Variable
        };
        let actual = self.expr(scope, value)?;

        let Some(declared) = declared else {
            if let ExprKind::Ident(source) = &value.kind {
                let resolved = self.resolve(scope, source, value.span)?;
                if resolved.symbol.kind == Kind::Channel && !stateful {
                    let mut alias = Symbol::new(&name.name, Kind::Channel, actual)
                        .with_span(name.span)
                        .with_alias(resolved.symbol.channel_name());
                    alias.id = resolved.symbol.id;
                    self.add_symbol(scope, alias)?;
                    return Ok(());
                }
            }
            if !actual.is_valid() {
                return Err(error(
                    name.span,
                    codes::E_TYPE_MISMATCH,
                    format!("no type declaration found for {}", name.name),
                ));
            }
            let symbol = Symbol::new(&name.name, kind, actual).with_span(name.span);
            self.add_symbol(scope, symbol)?;
            return Ok(());
        };

        let target = self.resolve_type(declared)?;
        self.unit_assignment(&target, &actual, span)?;
        if target.is_var() || actual.is_var() {
            self.constraints
                .check(&target, &actual, Some(span), "assignment")
                .map_err(|e| unification_diagnostic(e, span))?;
        } else {
            let ok = if value.is_literal() {
                literal_assignment_compatible(&target, &actual)
            } else {
                compatible(&target, &actual)
            };
            if !ok {
                return Err(error(
                    span,
                    codes::E_TYPE_MISMATCH,
                    format!("type mismatch: cannot assign {actual} to {target}"),
                ));
            }
        }
        if value.is_pure_literal() && target.inner().is_numeric() {
            literal::fold(value, &target)
                .map_err(|e| error(value.span, codes::E_LITERAL, e.to_string()))?;
        }
        let symbol = Symbol::new(&name.name, kind, target).with_span(name.span);
        self.add_symbol(scope, symbol)?;
        Ok(())
    }

    /// `x := <-ch` declares `x` with the channel's value type.
    fn channel_read(&mut self, scope: ScopeId, name: &Ident, channel: &Ident) -> Check {
        let resolved = self.resolve(scope, &channel.name, channel.span)?;
        if resolved.symbol.kind != Kind::Channel {
            return Err(error(
                channel.span,
                codes::E_NOT_A_CHANNEL,
                format!("{} is not a channel", channel.name),
            ));
        }
        self.record_read(scope, &resolved.symbol);
        let ty = resolved.symbol.ty.inner().clone();
        let symbol = Symbol::new(&name.name, Kind::Variable, ty).with_span(name.span);
        self.add_symbol(scope, symbol)?;
        Ok(())
    }

    // ── Assignment ──

    fn assignment(
        &mut self,
        scope: ScopeId,
        target: &AssignTarget,
        op: AssignOp,
        value: &Expr,
        span: Span,
    ) -> Check {
        let resolved = self.resolve(scope, &target.name.name, target.name.span)?;
        let symbol = resolved.symbol;
        let name = &target.name.name;

        if let Some(index) = &target.index {
            return self.indexed_assignment(scope, &symbol, index, op, value, span);
        }

        if symbol.kind == Kind::Channel || symbol.ty.is_chan() {
            if op != AssignOp::Set {
                return Err(error(
                    span,
                    codes::E_POLICY,
                    format!("compound assignment not supported on channel {name}"),
                ));
            }
            let ty = self.expr(scope, value)?;
            return self.channel_write(scope, &target.name, value, &ty, span);
        }

        match symbol.kind {
            Kind::Variable | Kind::StatefulVariable | Kind::Output | Kind::Input => {}
            other => {
                return Err(error(
                    target.name.span,
                    codes::E_POLICY,
                    format!("cannot assign to {other} {name}"),
                ))
            }
        }

        let actual = self.expr(scope, value)?;
        let expected = symbol.ty;

        if op != AssignOp::Set {
            self.compound_operands(op, &expected, &actual, span)?;
            if let (Type::Series(elem), false) = (&expected, actual.is_series()) {
                return self.element_assignment(elem, &actual, value, span);
            }
        }

        self.unit_assignment(&expected, &actual, span)?;
        if expected.is_var() || actual.is_var() {
            return self
                .constraints
                .check(&expected, &actual, Some(span), "assignment")
                .map_err(|e| unification_diagnostic(e, span));
        }
        if !compatible(&expected, &actual) {
            return Err(error(
                span,
                codes::E_TYPE_MISMATCH,
                format!("type mismatch: cannot assign {actual} to variable of type {expected}"),
            ));
        }
        Ok(())
    }

    /// Operators permitted for a compound assignment onto `target`.
    fn compound_operands(&self, op: AssignOp, target: &Type, value: &Type, span: Span) -> Check {
        if *target == Type::Str {
            if op != AssignOp::Add {
                return Err(error(
                    span,
                    codes::E_POLICY,
                    format!("operator {op} not supported for str, only += is allowed"),
                ));
            }
            if !compatible(target, value) {
                return Err(error(
                    span,
                    codes::E_TYPE_MISMATCH,
                    format!("type mismatch: cannot use {value} in {op} on str"),
                ));
            }
            return Ok(());
        }
        let elem = target.inner();
        if !(elem.is_numeric() || elem.is_temporal() || elem.is_var()) {
            return Err(error(
                span,
                codes::E_POLICY,
                format!("operator {op} not supported for type {target}"),
            ));
        }
        Ok(())
    }

    fn indexed_assignment(
        &mut self,
        scope: ScopeId,
        symbol: &Symbol,
        index: &Index,
        op: AssignOp,
        value: &Expr,
        span: Span,
    ) -> Check {
        let Type::Series(elem) = &symbol.ty else {
            return Err(error(
                span,
                codes::E_POLICY,
                "indexed assignment only supported on series types",
            ));
        };
        let Index::Single(index) = index else {
            return Err(error(span, codes::E_POLICY, "slice assignment not supported"));
        };
        let index_ty = self.expr(scope, index)?;
        self.check_index(&index_ty, index.span)?;
        let actual = self.expr(scope, value)?;
        if op != AssignOp::Set {
            self.compound_operands(op, elem, &actual, span)?;
        }
        self.element_assignment(elem, &actual, value, span)
    }

    fn element_assignment(&mut self, elem: &Type, actual: &Type, value: &Expr, span: Span) -> Check {
        if elem.is_var() || actual.is_var() {
            return self
                .constraints
                .check(elem, actual, Some(span), "series element")
                .map_err(|e| unification_diagnostic(e, span));
        }
        let ok = if value.is_literal() {
            literal_assignment_compatible(elem, actual)
        } else {
            compatible(elem, actual)
        };
        if !ok {
            return Err(error(
                span,
                codes::E_TYPE_MISMATCH,
                format!("type mismatch: cannot assign {actual} to series element of type {elem}"),
            ));
        }
        Ok(())
    }

    pub(crate) fn channel_write(
        &mut self,
        scope: ScopeId,
        channel: &Ident,
        value: &Expr,
        actual: &Type,
        span: Span,
    ) -> Check {
        let resolved = self.resolve(scope, &channel.name, channel.span)?;
        let symbol = resolved.symbol;
        if symbol.kind != Kind::Channel && !symbol.ty.is_chan() {
            return Err(error(
                channel.span,
                codes::E_NOT_A_CHANNEL,
                format!("{} is not a channel", channel.name),
            ));
        }
        if let (Some(key), Some(func)) = (
            symbol.id,
            self.scopes.closest_ancestor_of_kind(scope, Kind::Function),
        ) {
            self.scopes
                .get_mut(func)
                .channels
                .write
                .insert(key, symbol.channel_name().to_string());
        }
        let elem = symbol.ty.inner().clone();
        if elem.is_var() || actual.is_var() {
            return self
                .constraints
                .check(&elem, actual, Some(span), "channel write")
                .map_err(|e| unification_diagnostic(e, span));
        }
        let ok = if value.is_literal() {
            literal_assignment_compatible(&elem, actual)
        } else {
            compatible(&elem, actual)
        };
        if !ok {
            return Err(error(
                span,
                codes::E_TYPE_MISMATCH,
                format!("type mismatch: cannot write {actual} to channel of type {elem}"),
            ));
        }
        Ok(())
    }

    fn unit_assignment(&mut self, target: &Type, value: &Type, span: Span) -> Check {
        match check_assignment_units(target, value) {
            Ok(UnitCheck::Ok) => Ok(()),
            Ok(UnitCheck::Magnitude(msg)) => {
                self.diagnostics
                    .add(Diagnostic::warning(span, msg).with_code(codes::W_UNIT_MAGNITUDE));
                Ok(())
            }
            Err(msg) => Err(error(span, codes::E_UNIT, msg)),
        }
    }

    // ── Return ──

    fn return_stmt(&mut self, scope: ScopeId, value: Option<&Expr>, span: Span, mode: Mode) -> Check {
        let Some(func) = self.scopes.closest_ancestor_of_kind(scope, Kind::Function) else {
            return Err(error(span, codes::E_POLICY, "return statement not in function"));
        };
        let function = &self.scopes.get(func).symbol;
        let fname = function.name.clone();
        let expected = function
            .ty
            .function_props()
            .and_then(|p| p.return_type().cloned());

        let Some(value) = value else {
            if mode == Mode::Inference {
                self.returns.push(Type::Invalid);
                return Ok(());
            }
            return match expected {
                Some(ty) if ty.is_valid() => Err(error(
                    span,
                    codes::E_RETURN_TYPE,
                    format!("return statement missing value of type {ty}"),
                )),
                _ => Ok(()),
            };
        };

        let actual = self.expr(scope, value)?;
        if mode == Mode::Inference {
            self.returns.push(actual);
            return Ok(());
        }
        let expected = match expected {
            None => {
                return Err(error(
                    value.span,
                    codes::E_RETURN_TYPE,
                    format!("function '{fname}' has no output, cannot return {actual}"),
                ))
            }
            // Inference already failed and said why.
            Some(ty) if !ty.is_valid() => return Ok(()),
            Some(ty) => ty,
        };
        self.unit_assignment(&expected, &actual, span)?;
        if expected.is_var() || actual.is_var() {
            return self
                .constraints
                .check(&expected, &actual, Some(span), "return")
                .map_err(|e| unification_diagnostic(e, span));
        }
        let (e, a) = (expected.inner(), actual.inner());
        let ok = if value.is_literal() || (e.is_numeric() && a.is_numeric()) {
            literal_assignment_compatible(&expected, &actual) || widens_to(a, e)
        } else {
            compatible(&expected, &actual)
        };
        if !ok {
            return Err(error(
                value.span,
                codes::E_RETURN_TYPE,
                format!("cannot return {actual}, expected {expected}"),
            ));
        }
        Ok(())
    }
}

/// A concrete numeric `from` that unifies into `to` without changing it.
fn widens_to(from: &Type, to: &Type) -> bool {
    unify_return_types(&[from.without_unit(), to.without_unit()])
        .is_ok_and(|t| t == to.without_unit())
}

/// True if every path through `stmts` ends in a valued return.
pub(crate) fn always_returns(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match &stmt.kind {
        StmtKind::Return(Some(_)) => true,
        StmtKind::If {
            then,
            else_ifs,
            otherwise: Some(otherwise),
            ..
        } => {
            always_returns(&then.stmts)
                && else_ifs.iter().all(|(_, b)| always_returns(&b.stmts))
                && always_returns(&otherwise.stmts)
        }
        _ => false,
    })
}
