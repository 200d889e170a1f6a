// types.rs — Arc value types and compatibility relations
//
// Defines the structural `Type` sum, function parameter lists, compile-time
// `Value`s, and the relations the analyzer uses to decide whether one type
// may flow into another: structural compatibility, literal-assignment
// compatibility, and physical-unit checks.
//
// Preconditions: none (pure value types).
// Postconditions: equality is by value; two `Type`s are interchangeable iff
// they compare equal.
// Failure modes: unit checks return `Err(message)` for dimension mismatches.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::units::{self, Unit};

// ── Numeric kinds ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Numeric {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Numeric {
    pub const ALL: [Numeric; 10] = [
        Numeric::U8,
        Numeric::U16,
        Numeric::U32,
        Numeric::U64,
        Numeric::I8,
        Numeric::I16,
        Numeric::I32,
        Numeric::I64,
        Numeric::F32,
        Numeric::F64,
    ];

    pub fn bits(self) -> u32 {
        match self {
            Numeric::U8 | Numeric::I8 => 8,
            Numeric::U16 | Numeric::I16 => 16,
            Numeric::U32 | Numeric::I32 | Numeric::F32 => 32,
            Numeric::U64 | Numeric::I64 | Numeric::F64 => 64,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Numeric::F32 | Numeric::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Numeric::I8 | Numeric::I16 | Numeric::I32 | Numeric::I64
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            Numeric::U8 | Numeric::U16 | Numeric::U32 | Numeric::U64
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Numeric::U8 => "u8",
            Numeric::U16 => "u16",
            Numeric::U32 => "u32",
            Numeric::U64 => "u64",
            Numeric::I8 => "i8",
            Numeric::I16 => "i16",
            Numeric::I32 => "i32",
            Numeric::I64 => "i64",
            Numeric::F32 => "f32",
            Numeric::F64 => "f64",
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The category of literal that produced a type variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralClass {
    Numeric,
    Integer,
    Float,
    /// A float literal with no fractional part (`5.0`). Defaults like a
    /// float but may be assigned to integer targets.
    ExactIntegerFloat,
}

impl LiteralClass {
    pub fn name(self) -> &'static str {
        match self {
            LiteralClass::Numeric => "numeric",
            LiteralClass::Integer => "integer",
            LiteralClass::Float => "float",
            LiteralClass::ExactIntegerFloat => "exact-integer-float",
        }
    }

    pub fn accepts_integer_targets(self) -> bool {
        !matches!(self, LiteralClass::Float)
    }
}

// ── Compile-time values ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Uint(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
        }
    }
}

// ── Parameters ──

pub const DEFAULT_INPUT: &str = "input";
pub const DEFAULT_OUTPUT: &str = "output";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            value: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// Named, ordered parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(pub Vec<Param>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(name: impl Into<String>, ty: Type) -> Self {
        Self(vec![Param::new(name, ty)])
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.0.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.0.iter_mut().find(|p| p.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|p| p.name == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn push(&mut self, param: Param) {
        self.0.push(param);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Param> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&Param> {
        self.0.first()
    }

    pub fn at(&self, i: usize) -> Option<&Param> {
        self.0.get(i)
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", p.name, p.ty)?;
            if let Some(v) = &p.value {
                write!(f, " = {v}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionProps {
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub config: Params,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub inputs: Params,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub outputs: Params,
}

impl FunctionProps {
    /// The type of the single unnamed output, if the function has one.
    pub fn return_type(&self) -> Option<&Type> {
        match self.outputs.0.as_slice() {
            [p] if p.name == DEFAULT_OUTPUT => Some(&p.ty),
            _ => None,
        }
    }

    pub fn has_named_outputs(&self) -> bool {
        self.outputs.len() > 1
            || self
                .outputs
                .first()
                .is_some_and(|p| p.name != DEFAULT_OUTPUT)
    }

    /// Number of inputs without a default value.
    pub fn required_inputs(&self) -> usize {
        self.inputs.iter().filter(|p| p.value.is_none()).count()
    }
}

// ── Type ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    #[default]
    Invalid,
    Numeric {
        kind: Numeric,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<Unit>,
    },
    Str,
    TimeStamp,
    /// Nanosecond-scaled 64-bit duration.
    TimeSpan,
    Chan(Box<Type>),
    Series(Box<Type>),
    Var {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        constraint: Option<Box<Type>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<Unit>,
    },
    Constraint(LiteralClass),
    Function(Box<FunctionProps>),
}

impl Type {
    pub const U8: Type = Type::numeric(Numeric::U8);
    pub const U16: Type = Type::numeric(Numeric::U16);
    pub const U32: Type = Type::numeric(Numeric::U32);
    pub const U64: Type = Type::numeric(Numeric::U64);
    pub const I8: Type = Type::numeric(Numeric::I8);
    pub const I16: Type = Type::numeric(Numeric::I16);
    pub const I32: Type = Type::numeric(Numeric::I32);
    pub const I64: Type = Type::numeric(Numeric::I64);
    pub const F32: Type = Type::numeric(Numeric::F32);
    pub const F64: Type = Type::numeric(Numeric::F64);

    pub const fn numeric(kind: Numeric) -> Type {
        Type::Numeric { kind, unit: None }
    }

    pub fn chan(elem: Type) -> Type {
        Type::Chan(Box::new(elem))
    }

    pub fn series(elem: Type) -> Type {
        Type::Series(Box::new(elem))
    }

    pub fn var(name: impl Into<String>, constraint: Option<Type>) -> Type {
        Type::Var {
            name: name.into(),
            constraint: constraint.map(Box::new),
            unit: None,
        }
    }

    /// A type variable standing for a literal of the given class.
    pub fn literal_var(name: impl Into<String>, class: LiteralClass, unit: Option<Unit>) -> Type {
        Type::Var {
            name: name.into(),
            constraint: Some(Box::new(Type::Constraint(class))),
            unit,
        }
    }

    pub fn function(props: FunctionProps) -> Type {
        Type::Function(Box::new(props))
    }

    /// Parse a primitive type name (`i32`, `str`, `timespan`, ...).
    pub fn from_name(name: &str) -> Option<Type> {
        match name {
            "str" => return Some(Type::Str),
            "timestamp" => return Some(Type::TimeStamp),
            "timespan" => return Some(Type::TimeSpan),
            _ => {}
        }
        Numeric::ALL
            .iter()
            .find(|n| n.name() == name)
            .map(|n| Type::numeric(*n))
    }

    /// Parse a full type spelling, including `chan T` and `series T`.
    pub fn parse(text: &str) -> Option<Type> {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix("chan ") {
            return Type::parse(rest).map(Type::chan);
        }
        if let Some(rest) = text.strip_prefix("series ") {
            return Type::parse(rest).map(Type::series);
        }
        Type::from_name(text)
    }

    // ── Classification ──

    pub fn is_valid(&self) -> bool {
        !matches!(self, Type::Invalid)
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Type::Var { .. })
    }

    pub fn is_chan(&self) -> bool {
        matches!(self, Type::Chan(_))
    }

    pub fn is_series(&self) -> bool {
        matches!(self, Type::Series(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function(_))
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Type::TimeStamp | Type::TimeSpan)
    }

    pub fn numeric_kind(&self) -> Option<Numeric> {
        match self {
            Type::Numeric { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Literal class of a literal type variable.
    pub fn literal_class(&self) -> Option<LiteralClass> {
        match self {
            Type::Var {
                constraint: Some(c),
                ..
            } => match c.as_ref() {
                Type::Constraint(class) => Some(*class),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        match self {
            Type::Numeric { .. } | Type::Constraint(_) => true,
            Type::Chan(elem) => elem.is_numeric(),
            Type::Var { constraint, .. } => constraint.as_ref().is_some_and(|c| c.is_numeric()),
            _ => false,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.numeric_kind().is_some_and(|k| !k.is_float())
    }

    pub fn is_signed_integer(&self) -> bool {
        self.numeric_kind().is_some_and(Numeric::is_signed)
    }

    pub fn is_unsigned_integer(&self) -> bool {
        self.numeric_kind().is_some_and(Numeric::is_unsigned)
    }

    pub fn is_float(&self) -> bool {
        self.numeric_kind().is_some_and(Numeric::is_float)
    }

    /// `u8` doubles as the boolean type.
    pub fn is_bool(&self) -> bool {
        self.numeric_kind() == Some(Numeric::U8)
    }

    pub fn is_64bit(&self) -> bool {
        match self {
            Type::TimeStamp | Type::TimeSpan => true,
            _ => self.numeric_kind().is_some_and(|k| k.bits() == 64),
        }
    }

    /// Element type of a chan or series; the type itself otherwise.
    pub fn inner(&self) -> &Type {
        match self {
            Type::Chan(elem) | Type::Series(elem) => elem,
            other => other,
        }
    }

    pub fn into_inner(self) -> Type {
        match self {
            Type::Chan(elem) | Type::Series(elem) => *elem,
            other => other,
        }
    }

    pub fn unit(&self) -> Option<&Unit> {
        match self {
            Type::Numeric { unit, .. } | Type::Var { unit, .. } => unit.as_ref(),
            Type::Chan(elem) | Type::Series(elem) => elem.unit(),
            _ => None,
        }
    }

    /// Replace the unit on a numeric type or type variable. Other types are
    /// returned unchanged.
    pub fn with_unit(self, new_unit: Option<Unit>) -> Type {
        match self {
            Type::Numeric { kind, .. } => Type::Numeric {
                kind,
                unit: new_unit,
            },
            Type::Var {
                name, constraint, ..
            } => Type::Var {
                name,
                constraint,
                unit: new_unit,
            },
            other => other,
        }
    }

    /// Same type with units removed at every level.
    pub fn without_unit(&self) -> Type {
        match self {
            Type::Chan(elem) => Type::chan(elem.without_unit()),
            Type::Series(elem) => Type::series(elem.without_unit()),
            other => other.clone().with_unit(None),
        }
    }

    pub fn function_props(&self) -> Option<&FunctionProps> {
        match self {
            Type::Function(props) => Some(props),
            _ => None,
        }
    }

    /// True if the variable named `name` occurs anywhere inside this type.
    pub fn mentions(&self, name: &str) -> bool {
        match self {
            Type::Var {
                name: n,
                constraint,
                ..
            } => n == name || constraint.as_ref().is_some_and(|c| c.mentions(name)),
            Type::Chan(elem) | Type::Series(elem) => elem.mentions(name),
            Type::Function(props) => props
                .inputs
                .iter()
                .chain(props.outputs.iter())
                .chain(props.config.iter())
                .any(|p| p.ty.mentions(name)),
            _ => false,
        }
    }

    fn same_kind(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Numeric { kind: a, .. }, Type::Numeric { kind: b, .. }) => a == b,
            (Type::Constraint(a), Type::Constraint(b)) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Invalid => f.write_str("invalid"),
            Type::Numeric { kind, unit } => match unit {
                Some(u) => write!(f, "{kind} {u}"),
                None => write!(f, "{kind}"),
            },
            Type::Str => f.write_str("str"),
            Type::TimeStamp => f.write_str("timestamp"),
            Type::TimeSpan => f.write_str("timespan"),
            Type::Chan(elem) => write!(f, "chan {elem}"),
            Type::Series(elem) => write!(f, "series {elem}"),
            Type::Var {
                name, constraint, ..
            } => match constraint {
                Some(c) => write!(f, "{name}:{c}"),
                None => write!(f, "{name}"),
            },
            Type::Constraint(class) => f.write_str(class.name()),
            Type::Function(_) => f.write_str("function"),
        }
    }
}

// ── Compatibility ──

/// Structural compatibility: type variables and invalid types are accepted
/// (checked later), chan wrappers unwrap on either side, series pairs only
/// with series, and everything else must be the same kind.
pub fn compatible(a: &Type, b: &Type) -> bool {
    if a.is_var() || b.is_var() || !a.is_valid() || !b.is_valid() {
        return true;
    }
    match (a, b) {
        (Type::Chan(x), _) => compatible(x, b),
        (_, Type::Chan(y)) => compatible(a, y),
        (Type::Series(x), Type::Series(y)) => compatible(x, y),
        (Type::Series(_), _) | (_, Type::Series(_)) => false,
        _ => a.same_kind(b),
    }
}

/// Whether a literal of type `lit` may be assigned to `target`. Range and
/// overflow checks happen later in the literal parser.
pub fn literal_assignment_compatible(target: &Type, lit: &Type) -> bool {
    let target = match target {
        Type::Chan(elem) => elem.as_ref(),
        other => other,
    };
    if let Some(class) = lit.literal_class() {
        let time_unit = lit
            .unit()
            .is_some_and(|u| u.dimensions == units::Dimensions::TIME);
        if target.is_var() {
            return true;
        }
        if matches!(target, Type::TimeSpan) && (time_unit || class != LiteralClass::Float) {
            return true;
        }
        if matches!(target, Type::TimeStamp) && class != LiteralClass::Float {
            return true;
        }
        return match class {
            LiteralClass::Float => target.is_float(),
            _ => target.is_numeric(),
        };
    }
    compatible(target, lit)
}

// ── Units ──

/// Outcome of a unit check that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitCheck {
    Ok,
    /// Same dimensions, different scale.
    Magnitude(String),
}

/// Check units for `+`, `-`, `%`, and comparisons: both sides must measure
/// the same quantity. A side without a unit is accepted.
pub fn check_additive_units(op: &str, left: &Type, right: &Type) -> Result<UnitCheck, String> {
    let (Some(l), Some(r)) = (left.unit(), right.unit()) else {
        return Ok(UnitCheck::Ok);
    };
    if !l.same_dimensions(r) {
        return Err(format!(
            "incompatible units: cannot use {l} and {r} in {op} operation"
        ));
    }
    if l.scale != r.scale {
        return Ok(UnitCheck::Magnitude(format!(
            "mixing {l} and {r} in {op} operation implies an implicit scale conversion"
        )));
    }
    Ok(UnitCheck::Ok)
}

/// Check units when a value of type `value` is assigned to `target`.
pub fn check_assignment_units(target: &Type, value: &Type) -> Result<UnitCheck, String> {
    let (Some(t), Some(v)) = (target.unit(), value.unit()) else {
        return Ok(UnitCheck::Ok);
    };
    if !t.same_dimensions(v) {
        return Err(format!("incompatible units: cannot assign {v} to {t}"));
    }
    match units::scale_factor(v, t) {
        Some(factor) if factor != 1.0 => Ok(UnitCheck::Magnitude(format!(
            "assigning {v} to {t} scales the value by {factor}"
        ))),
        _ => Ok(UnitCheck::Ok),
    }
}

/// Drop units that have cancelled out.
pub fn normalize_unit(unit: Option<Unit>) -> Option<Unit> {
    unit.filter(|u| !u.dimensions.is_dimensionless())
}
