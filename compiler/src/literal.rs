// literal.rs — Literal parsing and constant folding
//
// Converts literal AST nodes into typed compile-time values against an
// optional target type. Integers are range-checked, floats are checked for
// lossy integer conversion, and unit literals are scaled either to the
// target's unit, to SI when the target has none, or left in SI when there is
// no target. `fold` evaluates a pure-literal expression tree the same way.
//
// Preconditions: `target` is `Type::Invalid` when no target type is known.
// Postconditions: `Parsed::ty` is concrete (never a type variable).
// Failure modes: out-of-range values, fractional values for integer targets,
// unknown units, strings assigned to non-string targets.
// Side effects: none.

use thiserror::Error;

use crate::ast::{BinOp, Expr, ExprKind, Literal, UnaryOp};
use crate::types::{Numeric, Type, Value};
use crate::units::{self, Unit};

/// A literal resolved to a value and its concrete type.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub value: Value,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LiteralError {
    #[error("unknown unit: {0}")]
    UnknownUnit(String),
    #[error("{0}")]
    OutOfRange(String),
    #[error("cannot convert non-integer float {value:.6} to {target}")]
    NonInteger { value: f64, target: String },
    #[error("cannot convert {value} to {target}: value has fractional part")]
    Fractional { value: f64, target: String },
    #[error("cannot assign string to {0}")]
    StringTarget(Type),
    #[error("cannot convert {from} to {to}")]
    UnitMismatch { from: Unit, to: Unit },
    #[error("cannot assign numeric literal to {0}")]
    NumericTarget(Type),
    #[error("series literals not supported for default values")]
    Series,
    #[error("expression is not a compile-time constant")]
    NotConstant,
    #[error("division by zero in constant expression")]
    DivisionByZero,
    #[error("cannot use {0} in constant {1} operation")]
    Operand(&'static str, BinOp),
}

// ── Entry points ──

/// Parse a single literal against `target`.
pub fn parse(literal: &Literal, target: &Type) -> Result<Parsed, LiteralError> {
    finish(leaf(literal)?, target)
}

/// Evaluate a pure-literal expression tree (literals combined with unary and
/// binary operators) to a single value of `target`.
pub fn fold(expr: &Expr, target: &Type) -> Result<Parsed, LiteralError> {
    finish(eval(expr)?, target)
}

/// True if a float is within a relative 1e-9 of an integer.
pub fn is_exact_integer(value: f64) -> bool {
    let rounded = value.round();
    if rounded == 0.0 {
        return value.abs() < 1e-9;
    }
    (value - rounded).abs() / rounded.abs() < 1e-9
}

// ── Intermediate values ──

#[derive(Debug, Clone, PartialEq)]
enum Raw {
    Int(i128),
    Float(f64),
    Str(String),
}

impl Raw {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Raw::Int(v) => Some(*v as f64),
            Raw::Float(v) => Some(*v),
            Raw::Str(_) => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Raw::Int(v) => *v != 0,
            Raw::Float(v) => *v != 0.0,
            Raw::Str(s) => !s.is_empty(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Raw::Int(_) => "integer",
            Raw::Float(_) => "float",
            Raw::Str(_) => "str",
        }
    }
}

/// A value still expressed in the unit it was written in.
#[derive(Debug, Clone, PartialEq)]
struct Folded {
    raw: Raw,
    unit: Option<Unit>,
}

fn leaf(literal: &Literal) -> Result<Folded, LiteralError> {
    Ok(match literal {
        Literal::Int(v) => Folded {
            raw: Raw::Int(i128::from(*v)),
            unit: None,
        },
        Literal::Float(v) => Folded {
            raw: Raw::Float(*v),
            unit: None,
        },
        Literal::Unit {
            value,
            integral,
            unit,
        } => {
            let unit = units::lookup(unit).ok_or_else(|| LiteralError::UnknownUnit(unit.clone()))?;
            let raw = if *integral {
                Raw::Int(*value as i128)
            } else {
                Raw::Float(*value)
            };
            Folded {
                raw,
                unit: Some(unit),
            }
        }
        Literal::Str(s) => Folded {
            raw: Raw::Str(s.clone()),
            unit: None,
        },
    })
}

// ── Folding ──

fn eval(expr: &Expr) -> Result<Folded, LiteralError> {
    match &expr.kind {
        ExprKind::Literal(lit) => leaf(lit),
        ExprKind::Series(_) => Err(LiteralError::Series),
        ExprKind::Unary(op, inner) => {
            let value = eval(inner)?;
            match op {
                UnaryOp::Neg => {
                    let raw = match value.raw {
                        Raw::Int(v) => Raw::Int(-v),
                        Raw::Float(v) => Raw::Float(-v),
                        Raw::Str(_) => return Err(LiteralError::Operand("str", BinOp::Sub)),
                    };
                    Ok(Folded {
                        raw,
                        unit: value.unit,
                    })
                }
                UnaryOp::Not => Ok(Folded {
                    raw: Raw::Int(i128::from(!value.raw.truthy())),
                    unit: None,
                }),
            }
        }
        ExprKind::Binary(op, lhs, rhs) => binary(*op, eval(lhs)?, eval(rhs)?),
        _ => Err(LiteralError::NotConstant),
    }
}

fn binary(op: BinOp, lhs: Folded, rhs: Folded) -> Result<Folded, LiteralError> {
    if op.is_logical() {
        let v = match op {
            BinOp::And => lhs.raw.truthy() && rhs.raw.truthy(),
            _ => lhs.raw.truthy() || rhs.raw.truthy(),
        };
        return Ok(Folded {
            raw: Raw::Int(i128::from(v)),
            unit: None,
        });
    }

    if let (Raw::Str(a), Raw::Str(b)) = (&lhs.raw, &rhs.raw) {
        let raw = match op {
            BinOp::Add => Raw::Str(format!("{a}{b}")),
            BinOp::Eq => Raw::Int(i128::from(a == b)),
            BinOp::Ne => Raw::Int(i128::from(a != b)),
            _ => return Err(LiteralError::Operand("str", op)),
        };
        return Ok(Folded { raw, unit: None });
    }
    if matches!(lhs.raw, Raw::Str(_)) || matches!(rhs.raw, Raw::Str(_)) {
        return Err(LiteralError::Operand("str", op));
    }

    let (rhs_raw, unit) = combine_units(op, &lhs, rhs)?;
    let lhs_raw = lhs.raw;

    if op.is_comparison() {
        let (a, b) = (lhs_raw.as_f64().unwrap_or(0.0), rhs_raw.as_f64().unwrap_or(0.0));
        let v = match op {
            BinOp::Eq => a == b,
            BinOp::Ne => a != b,
            BinOp::Lt => a < b,
            BinOp::Gt => a > b,
            BinOp::Le => a <= b,
            _ => a >= b,
        };
        return Ok(Folded {
            raw: Raw::Int(i128::from(v)),
            unit: None,
        });
    }

    let raw = match (lhs_raw, rhs_raw) {
        (Raw::Int(a), Raw::Int(b)) => integer_op(op, a, b)?,
        (a, b) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            Raw::Float(float_op(op, a, b)?)
        }
    };
    Ok(Folded { raw, unit })
}

/// Bring the right operand into the left operand's unit where the operator
/// requires it, and compute the unit of the result.
fn combine_units(
    op: BinOp,
    lhs: &Folded,
    rhs: Folded,
) -> Result<(Raw, Option<Unit>), LiteralError> {
    match op {
        BinOp::Mul => {
            let unit = match (&lhs.unit, &rhs.unit) {
                (Some(a), Some(b)) => Some(a.product(b)),
                (a, b) => a.clone().or_else(|| b.clone()),
            };
            Ok((rhs.raw, crate::types::normalize_unit(unit)))
        }
        BinOp::Div => {
            let unit = match (&lhs.unit, &rhs.unit) {
                (Some(a), Some(b)) => Some(a.quotient(b)),
                (Some(a), None) => Some(a.clone()),
                (None, Some(b)) => Some(b.powi(-1)),
                (None, None) => None,
            };
            Ok((rhs.raw, crate::types::normalize_unit(unit)))
        }
        BinOp::Pow => {
            let unit = match (&lhs.unit, &rhs.raw) {
                (Some(u), Raw::Int(n)) => Some(u.powi(*n as i32)),
                (Some(u), _) => Some(u.clone()),
                (None, _) => None,
            };
            Ok((rhs.raw, crate::types::normalize_unit(unit)))
        }
        _ => match (&lhs.unit, &rhs.unit) {
            (Some(a), Some(b)) => {
                let factor = units::scale_factor(b, a).ok_or_else(|| LiteralError::UnitMismatch {
                    from: b.clone(),
                    to: a.clone(),
                })?;
                let raw = if factor == 1.0 {
                    rhs.raw
                } else {
                    Raw::Float(rhs.raw.as_f64().unwrap_or(0.0) * factor)
                };
                Ok((raw, Some(a.clone())))
            }
            (a, b) => Ok((rhs.raw, a.clone().or_else(|| b.clone()))),
        },
    }
}

fn integer_op(op: BinOp, a: i128, b: i128) -> Result<Raw, LiteralError> {
    let overflow = || LiteralError::OutOfRange("constant expression overflows".to_string());
    let v = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => a.checked_div(b).ok_or(LiteralError::DivisionByZero)?,
        BinOp::Mod => a.checked_rem(b).ok_or(LiteralError::DivisionByZero)?,
        BinOp::Pow => {
            if b < 0 {
                return Ok(Raw::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
        _ => return Err(LiteralError::Operand("integer", op)),
    };
    Ok(Raw::Int(v))
}

fn float_op(op: BinOp, a: f64, b: f64) -> Result<f64, LiteralError> {
    Ok(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div if b == 0.0 => return Err(LiteralError::DivisionByZero),
        BinOp::Div => a / b,
        BinOp::Mod if b == 0.0 => return Err(LiteralError::DivisionByZero),
        BinOp::Mod => a % b,
        BinOp::Pow => a.powf(b),
        _ => return Err(LiteralError::Operand("float", op)),
    })
}

// ── Conversion to the target ──

fn finish(folded: Folded, target: &Type) -> Result<Parsed, LiteralError> {
    let target = match target {
        Type::Chan(elem) => elem.as_ref(),
        other => other,
    };
    if let Raw::Str(s) = folded.raw {
        if target.is_valid() && *target != Type::Str {
            return Err(LiteralError::StringTarget(target.clone()));
        }
        return Ok(Parsed {
            value: Value::Str(s),
            ty: Type::Str,
        });
    }
    let Some(unit) = folded.unit else {
        return match folded.raw {
            Raw::Int(v) => convert_integer(v, target),
            _ => convert_float(folded.raw.as_f64().unwrap_or(0.0), target),
        };
    };

    let value = folded.raw.as_f64().unwrap_or(0.0);
    let target_unit = match target {
        Type::TimeSpan => Some(Unit::nanoseconds()),
        Type::Numeric { unit: Some(u), .. } => Some(u.clone()),
        _ => None,
    };
    if let Some(to) = target_unit {
        let factor = units::scale_factor(&unit, &to).ok_or_else(|| LiteralError::UnitMismatch {
            from: unit.clone(),
            to: to.clone(),
        })?;
        return convert_scaled(value * factor, target, unit);
    }
    let si = value * unit.scale;
    if target.is_valid() {
        return convert_scaled(si, target, unit);
    }
    if matches!(folded.raw, Raw::Int(_)) && is_exact_integer(si) {
        return Ok(Parsed {
            value: Value::Int(si.round() as i64),
            ty: Type::I64.with_unit(Some(unit)),
        });
    }
    Ok(Parsed {
        value: Value::Float(si),
        ty: Type::F64.with_unit(Some(unit)),
    })
}

fn integer_range(kind: Numeric) -> Option<(i128, i128)> {
    Some(match kind {
        Numeric::I8 => (i128::from(i8::MIN), i128::from(i8::MAX)),
        Numeric::I16 => (i128::from(i16::MIN), i128::from(i16::MAX)),
        Numeric::I32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
        Numeric::I64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
        Numeric::U8 => (0, i128::from(u8::MAX)),
        Numeric::U16 => (0, i128::from(u16::MAX)),
        Numeric::U32 => (0, i128::from(u32::MAX)),
        Numeric::U64 => (0, i128::from(u64::MAX)),
        Numeric::F32 | Numeric::F64 => return None,
    })
}

fn integer_value(kind: Numeric, v: i128) -> Value {
    if kind.is_unsigned() {
        Value::Uint(v as u64)
    } else {
        Value::Int(v as i64)
    }
}

fn convert_integer(v: i128, target: &Type) -> Result<Parsed, LiteralError> {
    let (kind, ty) = match target {
        Type::Invalid => (Numeric::I64, Type::I64),
        Type::TimeSpan | Type::TimeStamp => (Numeric::I64, target.clone()),
        Type::Numeric { kind, .. } => (*kind, target.clone()),
        other => return Err(LiteralError::NumericTarget(other.clone())),
    };
    if kind.is_float() {
        return Ok(Parsed {
            value: Value::Float(v as f64),
            ty,
        });
    }
    if let Some((min, max)) = integer_range(kind) {
        if kind == Numeric::U64 && v < 0 {
            return Err(LiteralError::OutOfRange(format!(
                "value {v} out of range for u64 (must be non-negative)"
            )));
        }
        if v < min || v > max {
            return Err(LiteralError::OutOfRange(format!(
                "value {v} out of range for {kind} (must be in [{min}, {max}])"
            )));
        }
    }
    Ok(Parsed {
        value: integer_value(kind, v),
        ty,
    })
}

fn convert_float(v: f64, target: &Type) -> Result<Parsed, LiteralError> {
    let (kind, ty) = match target {
        Type::Invalid => (Numeric::F64, Type::F64),
        Type::TimeSpan | Type::TimeStamp => (Numeric::I64, target.clone()),
        Type::Numeric { kind, .. } => (*kind, target.clone()),
        other => return Err(LiteralError::NumericTarget(other.clone())),
    };
    match kind {
        Numeric::F32 if v.abs() > f64::from(f32::MAX) => Err(LiteralError::OutOfRange(format!(
            "value {v:.6} out of range for f32"
        ))),
        Numeric::F32 | Numeric::F64 => Ok(Parsed {
            value: Value::Float(v),
            ty,
        }),
        _ => {
            if v.trunc() != v {
                return Err(LiteralError::NonInteger {
                    value: v,
                    target: target.to_string(),
                });
            }
            check_integer_range(kind, v, &format!("{v:.6}"))?;
            Ok(Parsed {
                value: integer_value(kind, v as i128),
                ty,
            })
        }
    }
}

fn check_integer_range(kind: Numeric, v: f64, shown: &str) -> Result<(), LiteralError> {
    if kind == Numeric::U64 && v < 0.0 {
        return Err(LiteralError::OutOfRange(format!(
            "value {shown} out of range for u64 (must be non-negative)"
        )));
    }
    if let Some((min, max)) = integer_range(kind) {
        if v < min as f64 || v > max as f64 {
            return Err(LiteralError::OutOfRange(format!(
                "value {shown} out of range for {kind}"
            )));
        }
    }
    Ok(())
}

/// Convert an already-scaled unit value. The result keeps the source unit.
fn convert_scaled(v: f64, target: &Type, unit: Unit) -> Result<Parsed, LiteralError> {
    let kind = match target {
        Type::TimeSpan | Type::TimeStamp => Numeric::I64,
        Type::Numeric { kind, .. } => *kind,
        other => return Err(LiteralError::NumericTarget(other.clone())),
    };
    let ty = match target {
        Type::Numeric { .. } => Type::numeric(kind).with_unit(Some(unit)),
        other => other.clone(),
    };
    match kind {
        Numeric::F32 if v.abs() > f64::from(f32::MAX) && v.is_finite() => Err(
            LiteralError::OutOfRange(format!("value {v} out of range for f32")),
        ),
        Numeric::F32 | Numeric::F64 => Ok(Parsed {
            value: Value::Float(v),
            ty,
        }),
        _ => {
            if !is_exact_integer(v) {
                return Err(LiteralError::Fractional {
                    value: v,
                    target: target.to_string(),
                });
            }
            let v = v.round();
            check_integer_range(kind, v, &v.to_string())?;
            Ok(Parsed {
                value: integer_value(kind, v as i128),
                ty,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn int(v: u64) -> Literal {
        Literal::Int(v)
    }

    fn unit_lit(value: f64, integral: bool, unit: &str) -> Literal {
        Literal::Unit {
            value,
            integral,
            unit: unit.to_string(),
        }
    }

    fn folded(source: &str, target: &Type) -> Result<Parsed, LiteralError> {
        let result = parser::parse(&format!("x := {source}"));
        let program = result.program.expect("expected program");
        let crate::ast::ItemKind::Constant(c) = &program.items[0].kind else {
            panic!("expected constant")
        };
        fold(&c.value, target)
    }

    // ── Integers ──

    #[test]
    fn integer_defaults_to_i64() {
        let p = parse(&int(42), &Type::Invalid).unwrap();
        assert_eq!(p.ty, Type::I64);
        assert_eq!(p.value, Value::Int(42));
    }

    #[test]
    fn integer_range_checks() {
        let err = parse(&int(300), &Type::I8).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value 300 out of range for i8 (must be in [-128, 127])"
        );
        let err = parse(&int(256), &Type::U8).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value 256 out of range for u8 (must be in [0, 255])"
        );
        assert_eq!(parse(&int(255), &Type::U8).unwrap().value, Value::Uint(255));
    }

    #[test]
    fn negative_into_u64() {
        let err = folded("-1", &Type::U64).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value -1 out of range for u64 (must be non-negative)"
        );
    }

    #[test]
    fn integer_into_float_target() {
        let p = parse(&int(3), &Type::F32).unwrap();
        assert_eq!(p.ty, Type::F32);
        assert_eq!(p.value, Value::Float(3.0));
    }

    // ── Floats ──

    #[test]
    fn float_to_integer_requires_whole_value() {
        let err = parse(&Literal::Float(2.5), &Type::I32).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot convert non-integer float 2.500000 to i32"
        );
        assert_eq!(
            parse(&Literal::Float(2.0), &Type::I32).unwrap().value,
            Value::Int(2)
        );
    }

    #[test]
    fn float_out_of_range_for_f32() {
        let err = parse(&Literal::Float(1e39), &Type::F32).unwrap_err();
        assert!(err.to_string().contains("out of range for f32"));
    }

    // ── Units ──

    #[test]
    fn unit_literal_scales_to_timespan() {
        let p = parse(&unit_lit(300.0, true, "ms"), &Type::TimeSpan).unwrap();
        assert_eq!(p.ty, Type::TimeSpan);
        assert_eq!(p.value, Value::Int(300_000_000));
    }

    #[test]
    fn unit_literal_without_target_uses_si() {
        let p = parse(&unit_lit(5.0, true, "km"), &Type::Invalid).unwrap();
        assert_eq!(p.value, Value::Int(5000));
        assert_eq!(p.ty.numeric_kind(), Some(Numeric::I64));
        assert_eq!(p.ty.unit().map(|u| u.name.as_str()), Some("km"));

        let p = parse(&unit_lit(1.5, false, "ms"), &Type::Invalid).unwrap();
        assert_eq!(p.ty.numeric_kind(), Some(Numeric::F64));
    }

    #[test]
    fn unit_literal_scales_to_target_unit() {
        let target = Type::F64.with_unit(units::lookup("m"));
        let p = parse(&unit_lit(2.0, true, "km"), &target).unwrap();
        assert_eq!(p.value, Value::Float(2000.0));
    }

    #[test]
    fn fractional_unit_value_rejected_for_integers() {
        let target = Type::I32.with_unit(units::lookup("s"));
        let err = parse(&unit_lit(1500.5, false, "ms"), &target).unwrap_err();
        assert!(matches!(err, LiteralError::Fractional { .. }));
        assert!(err.to_string().ends_with("value has fractional part"));
    }

    #[test]
    fn unknown_unit() {
        let err = parse(&unit_lit(1.0, true, "furlong"), &Type::Invalid).unwrap_err();
        assert_eq!(err.to_string(), "unknown unit: furlong");
    }

    #[test]
    fn mismatched_unit_dimensions() {
        let target = Type::F64.with_unit(units::lookup("s"));
        let err = parse(&unit_lit(1.0, true, "m"), &target).unwrap_err();
        assert!(matches!(err, LiteralError::UnitMismatch { .. }));
    }

    // ── Strings ──

    #[test]
    fn string_literals() {
        let lit = Literal::Str("hi".into());
        assert_eq!(parse(&lit, &Type::Invalid).unwrap().ty, Type::Str);
        let err = parse(&lit, &Type::I32).unwrap_err();
        assert_eq!(err.to_string(), "cannot assign string to i32");
    }

    // ── Folding ──

    #[test]
    fn fold_arithmetic() {
        assert_eq!(folded("1 + 2 * 3", &Type::Invalid).unwrap().value, Value::Int(7));
        assert_eq!(
            folded("2.5 * 2", &Type::Invalid).unwrap().value,
            Value::Float(5.0)
        );
        assert_eq!(folded("2 ^ 10", &Type::Invalid).unwrap().value, Value::Int(1024));
    }

    #[test]
    fn fold_comparison_yields_bool() {
        let p = folded("3 > 2 and 1 == 1", &Type::U8).unwrap();
        assert_eq!(p.value, Value::Uint(1));
    }

    #[test]
    fn fold_rejects_division_by_zero() {
        assert_eq!(
            folded("1 / 0", &Type::Invalid).unwrap_err(),
            LiteralError::DivisionByZero
        );
    }

    #[test]
    fn fold_rejects_series() {
        assert_eq!(
            folded("[1, 2]", &Type::Invalid).unwrap_err(),
            LiteralError::Series
        );
    }

    #[test]
    fn fold_units_add_in_left_unit() {
        let p = folded("1m + 50cm", &Type::Invalid).unwrap();
        assert_eq!(p.value, Value::Float(1.5));
        assert_eq!(p.ty.unit().map(|u| u.name.as_str()), Some("m"));
    }

    #[test]
    fn exact_integer_tolerance() {
        assert!(is_exact_integer(3.0000000000001));
        assert!(!is_exact_integer(3.1));
        assert!(is_exact_integer(0.0));
    }
}
