// analyzer/expression.rs — Expression analysis and type inference
//
// Infers the type of an expression bottom-up. Literals become type
// variables tagged with their literal class; comparisons and logic yield
// u8; arithmetic keeps the operand type and combines physical units.
// Whenever a type variable meets another type, the pair is deferred to the
// constraint system instead of being judged on the spot.
//
// Preconditions: `scope` is the innermost scope enclosing the expression.
// Postconditions: channel reads are recorded on the enclosing function.
// Failure modes: the first failing sub-expression aborts the expression.
// Side effects: unit magnitude warnings go straight to the sink.

use crate::ast::{BinOp, Expr, ExprKind, Ident, Literal, Span, TypeExpr, UnaryOp};
use crate::diag::{codes, Diagnostic};
use crate::literal;
use crate::symbol::{Kind, ScopeId, Symbol};
use crate::types::{
    check_additive_units, compatible, normalize_unit, LiteralClass, Type, UnitCheck,
};
use crate::units::{self, Unit};

use super::{error, unification_diagnostic, Analyzer, Check};

/// Numbers, times, and undecided literals all take part in arithmetic.
fn is_arithmetic(ty: &Type) -> bool {
    ty.is_var() || ty.is_numeric() || ty.is_temporal()
}

fn is_boolean(ty: &Type) -> bool {
    ty.is_var() || ty.is_bool()
}

/// Reading a channel yields its value.
fn read_value(ty: Type) -> Type {
    match ty {
        Type::Chan(elem) => *elem,
        other => other,
    }
}

impl Analyzer {
    pub(crate) fn expr(&mut self, scope: ScopeId, expr: &Expr) -> Check<Type> {
        match &expr.kind {
            ExprKind::Literal(lit) => self.literal(lit, expr.span),
            ExprKind::Ident(name) => self.ident(scope, name, expr.span),
            ExprKind::Unary(op, inner) => self.unary(scope, *op, inner, expr.span),
            ExprKind::Binary(op, lhs, rhs) => self.binary(scope, *op, lhs, rhs, expr.span),
            ExprKind::Call { callee, args } => self.call(scope, callee, args, expr.span),
            ExprKind::Cast { ty, value } => self.cast(scope, ty, value, expr.span),
            ExprKind::Index { target, index } => {
                let target_ty = self.expr(scope, target)?;
                let index_ty = self.expr(scope, index)?;
                let Type::Series(elem) = target_ty else {
                    return Err(error(
                        target.span,
                        codes::E_TYPE_MISMATCH,
                        format!("cannot index into {target_ty}"),
                    ));
                };
                self.check_index(&index_ty, index.span)?;
                Ok(*elem)
            }
            ExprKind::Slice { target, start, end } => {
                let target_ty = self.expr(scope, target)?;
                for bound in [start, end].into_iter().flatten() {
                    let bound_ty = self.expr(scope, bound)?;
                    self.check_index(&bound_ty, bound.span)?;
                }
                if !target_ty.is_series() {
                    return Err(error(
                        target.span,
                        codes::E_TYPE_MISMATCH,
                        format!("cannot slice {target_ty}"),
                    ));
                }
                Ok(target_ty)
            }
            ExprKind::Series(elems) => self.series_literal(scope, elems, expr.span),
        }
    }

    pub(crate) fn check_index(&mut self, ty: &Type, span: Span) -> Check {
        if ty.is_var() {
            return match ty.literal_class() {
                Some(LiteralClass::Float) => Err(error(
                    span,
                    codes::E_TYPE_MISMATCH,
                    "series index must be an integer, got float literal",
                )),
                _ => Ok(()),
            };
        }
        if !ty.is_integer() {
            return Err(error(
                span,
                codes::E_TYPE_MISMATCH,
                format!("series index must be an integer, got {ty}"),
            ));
        }
        Ok(())
    }

    // ── Leaves ──

    fn literal(&mut self, lit: &Literal, span: Span) -> Check<Type> {
        match lit {
            Literal::Int(_) => Ok(Type::literal_var(
                self.ids.alloc_literal(),
                LiteralClass::Integer,
                None,
            )),
            Literal::Float(value) => {
                let class = if value.fract() == 0.0 {
                    LiteralClass::ExactIntegerFloat
                } else {
                    LiteralClass::Float
                };
                Ok(Type::literal_var(self.ids.alloc_literal(), class, None))
            }
            Literal::Unit {
                value,
                integral,
                unit,
            } => {
                let resolved = units::lookup(unit).ok_or_else(|| {
                    error(span, codes::E_LITERAL, format!("unknown unit: {unit}"))
                })?;
                let class = if *integral && literal::is_exact_integer(*value) {
                    LiteralClass::Integer
                } else {
                    LiteralClass::Float
                };
                Ok(Type::literal_var(
                    self.ids.alloc_literal(),
                    class,
                    Some(resolved),
                ))
            }
            Literal::Str(_) => Ok(Type::Str),
        }
    }

    fn ident(&mut self, scope: ScopeId, name: &str, span: Span) -> Check<Type> {
        let resolved = self.resolve(scope, name, span)?;
        if resolved.symbol.kind == Kind::Channel {
            self.record_read(scope, &resolved.symbol);
        }
        Ok(read_value(resolved.symbol.ty))
    }

    /// Add a channel to the read set of the enclosing function.
    pub(crate) fn record_read(&mut self, scope: ScopeId, channel: &Symbol) {
        let (Some(key), Some(func)) = (
            channel.id,
            self.scopes.closest_ancestor_of_kind(scope, Kind::Function),
        ) else {
            return;
        };
        self.scopes
            .get_mut(func)
            .channels
            .read
            .insert(key, channel.channel_name().to_string());
    }

    // ── Operators ──

    fn unary(&mut self, scope: ScopeId, op: UnaryOp, inner: &Expr, span: Span) -> Check<Type> {
        let ty = self.expr(scope, inner)?;
        match op {
            UnaryOp::Neg => {
                if !is_arithmetic(ty.inner()) {
                    return Err(error(
                        span,
                        codes::E_TYPE_MISMATCH,
                        format!("operator - not supported for type {ty}"),
                    ));
                }
                Ok(ty)
            }
            UnaryOp::Not => {
                if !is_boolean(ty.inner()) {
                    return Err(error(
                        span,
                        codes::E_TYPE_MISMATCH,
                        format!("operator 'not' requires boolean operand, received {ty}"),
                    ));
                }
                Ok(Type::U8)
            }
        }
    }

    fn binary(
        &mut self,
        scope: ScopeId,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Check<Type> {
        let left = self.expr(scope, lhs)?;
        let right = self.expr(scope, rhs)?;
        let (l, r) = (left.inner().clone(), right.inner().clone());

        let operand_ok = match op {
            BinOp::And | BinOp::Or => is_boolean(&l),
            BinOp::Eq | BinOp::Ne => true,
            BinOp::Add => is_arithmetic(&l) || l == Type::Str,
            _ => is_arithmetic(&l),
        };
        if !operand_ok {
            return Err(error(
                lhs.span,
                codes::E_TYPE_MISMATCH,
                format!("cannot use {left} in {op} operation"),
            ));
        }

        let unit = self.operator_units(op, &l, &r, rhs, span)?;

        if l.is_var() || r.is_var() {
            self.constraints
                .add_compatible(
                    l.without_unit(),
                    r.without_unit(),
                    Some(span),
                    format!("{op} operands must be compatible"),
                )
                .map_err(|e| unification_diagnostic(e, span))?;
        } else if !compatible(&l, &r) {
            return Err(error(
                span,
                codes::E_TYPE_MISMATCH,
                format!("type mismatch: cannot use {l} and {r} in {op} operation"),
            ));
        }

        if op.is_comparison() || op.is_logical() {
            return Ok(Type::U8);
        }
        let base = if left.is_var() && !right.is_var() {
            right
        } else {
            left
        };
        Ok(match base {
            Type::Series(elem) => Type::series(elem.with_unit(unit)),
            other => other.with_unit(unit),
        })
    }

    /// Check units for `op` and compute the unit of its result.
    fn operator_units(
        &mut self,
        op: BinOp,
        left: &Type,
        right: &Type,
        rhs: &Expr,
        span: Span,
    ) -> Check<Option<Unit>> {
        let (lu, ru) = (left.unit().cloned(), right.unit().cloned());
        if lu.is_none() && ru.is_none() {
            return Ok(None);
        }
        let unit = match op {
            BinOp::Mul => match (&lu, &ru) {
                (Some(a), Some(b)) => Some(a.product(b)),
                _ => lu.or(ru),
            },
            BinOp::Div => match (&lu, &ru) {
                (Some(a), Some(b)) => Some(a.quotient(b)),
                (Some(a), None) => Some(a.clone()),
                (None, Some(b)) => Some(b.powi(-1)),
                (None, None) => None,
            },
            BinOp::Pow => {
                if let Some(exp_unit) = &ru {
                    if !exp_unit.dimensions.is_dimensionless() {
                        return Err(error(
                            rhs.span,
                            codes::E_UNIT,
                            format!("exponent must be dimensionless, got {exp_unit}"),
                        ));
                    }
                }
                match &lu {
                    Some(base) => {
                        let exp = rhs.as_integer_literal().and_then(|v| i32::try_from(v).ok());
                        let Some(exp) = exp else {
                            return Err(error(
                                rhs.span,
                                codes::E_UNIT,
                                "power operation with dimensioned base requires a literal integer exponent",
                            ));
                        };
                        Some(base.powi(exp))
                    }
                    None => None,
                }
            }
            BinOp::And | BinOp::Or => None,
            _ => {
                match check_additive_units(op.symbol(), left, right) {
                    Ok(UnitCheck::Ok) => {}
                    Ok(UnitCheck::Magnitude(msg)) => self.diagnostics.add(
                        Diagnostic::warning(span, msg).with_code(codes::W_UNIT_MAGNITUDE),
                    ),
                    Err(msg) => return Err(error(span, codes::E_UNIT, msg)),
                }
                if op.is_comparison() {
                    None
                } else {
                    lu.or(ru)
                }
            }
        };
        Ok(normalize_unit(unit))
    }

    // ── Calls and casts ──

    fn call(&mut self, scope: ScopeId, callee: &Ident, args: &[Expr], span: Span) -> Check<Type> {
        let resolved = self.resolve(scope, &callee.name, callee.span)?;
        let Some(props) = resolved.symbol.ty.function_props().cloned() else {
            return Err(error(
                callee.span,
                codes::E_NOT_A_FUNCTION,
                format!("{} is not a function", callee.name),
            ));
        };
        let name = &callee.name;
        if props.has_named_outputs() {
            return Err(error(
                span,
                codes::E_POLICY,
                format!(
                    "cannot call function {name}: functions with multiple named outputs are not callable"
                ),
            ));
        }
        let total = props.inputs.len();
        let required = props.required_inputs();
        if args.len() < required || args.len() > total {
            let expected = if required == total {
                format!("{total}")
            } else {
                format!("{required} to {total}")
            };
            return Err(error(
                span,
                codes::E_TYPE_MISMATCH,
                format!("function {name} expects {expected} argument(s), got {}", args.len()),
            ));
        }
        for (i, (arg, param)) in args.iter().zip(props.inputs.iter()).enumerate() {
            let arg_ty = self.expr(scope, arg)?;
            let reason = format!("argument {} of {name}", i + 1);
            if arg_ty.is_var() || param.ty.is_var() {
                self.constraints
                    .add_compatible(arg_ty.without_unit(), param.ty.without_unit(), Some(arg.span), reason)
                    .map_err(|e| unification_diagnostic(e, arg.span))?;
            } else if !compatible(&param.ty, &arg_ty) {
                return Err(error(
                    arg.span,
                    codes::E_TYPE_MISMATCH,
                    format!("{reason}: expected {}, got {arg_ty}", param.ty),
                ));
            }
        }
        Ok(props.return_type().cloned().unwrap_or_default())
    }

    fn cast(&mut self, scope: ScopeId, ty: &TypeExpr, value: &Expr, span: Span) -> Check<Type> {
        let target = self.resolve_type(ty)?;
        let actual = self.expr(scope, value)?;
        if actual.is_var() {
            return Ok(target);
        }
        let source = actual.inner();
        let castable = |t: &Type| t.is_numeric() || t.is_temporal();
        let ok = match (&target, source) {
            (Type::Str, Type::Str) => true,
            (Type::Str, _) | (_, Type::Str) => false,
            (t, s) => castable(t) && castable(s),
        };
        if !ok {
            return Err(error(
                span,
                codes::E_TYPE_MISMATCH,
                format!("cannot cast {actual} to {target}"),
            ));
        }
        Ok(target)
    }

    fn series_literal(&mut self, scope: ScopeId, elems: &[Expr], span: Span) -> Check<Type> {
        let Some((first, rest)) = elems.split_first() else {
            return Err(error(
                span,
                codes::E_TYPE_MISMATCH,
                "cannot infer element type of empty series literal",
            ));
        };
        let mut elem = self.expr(scope, first)?;
        for e in rest {
            let ty = self.expr(scope, e)?;
            if elem.is_var() || ty.is_var() {
                self.constraints
                    .add_compatible(elem.clone(), ty.clone(), Some(e.span), "series elements")
                    .map_err(|err| unification_diagnostic(err, e.span))?;
                if elem.is_var() && !ty.is_var() {
                    elem = ty;
                }
            } else if !compatible(&elem, &ty) {
                return Err(error(
                    e.span,
                    codes::E_TYPE_MISMATCH,
                    format!("series elements must share one type, got {elem} and {ty}"),
                ));
            }
        }
        Ok(Type::series(elem))
    }
}
