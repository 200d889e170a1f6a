// constraints.rs — Type-variable constraint store and unifier
//
// Collects equality and compatibility constraints between types while the
// analyzer walks a program, then solves them with a bounded fixpoint that
// links variables, binds them to concrete types, and applies numeric
// promotion under compatibility. Variables are identified by name.
//
// Preconditions: one `System` per analysis; never shared across analyses.
// Postconditions: after `unify` succeeds, every registered variable resolves
// to a type that contains no unbound variables.
// Failure modes: impossible pairs are rejected eagerly when added; `unify`
// reports mismatches discovered through substitution and variables that
// cannot be defaulted.
// Side effects: none.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{trace, warn};

use crate::ast::Span;
use crate::types::{LiteralClass, Params, Type};

// ── Constraints ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Both sides must be the same type.
    Equality,
    /// Both sides must be able to meet at a promoted numeric type.
    Compatible,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub left: Type,
    pub right: Type,
    pub span: Option<Span>,
    pub reason: String,
}

impl Constraint {
    pub fn equality(left: Type, right: Type, reason: impl Into<String>) -> Self {
        Self {
            kind: ConstraintKind::Equality,
            left,
            right,
            span: None,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UnificationError {
    pub constraint: Option<Constraint>,
    pub left: Type,
    pub right: Type,
    pub message: String,
    pub hint: Option<String>,
}

impl UnificationError {
    fn mismatch(left: &Type, right: &Type, suffix: &str) -> Self {
        let hint = (left.is_numeric() && right.is_numeric() && !left.is_var() && !right.is_var())
            .then(|| format!("use {left}(...) to convert"));
        Self {
            constraint: None,
            left: left.clone(),
            right: right.clone(),
            message: format!("type mismatch: {left} is not compatible with {right}{suffix}"),
            hint,
        }
    }

    fn unresolved(var: &Type) -> Self {
        let name = match var {
            Type::Var { name, .. } => name.clone(),
            other => other.to_string(),
        };
        Self {
            constraint: None,
            left: var.clone(),
            right: Type::Invalid,
            message: format!("unresolved type variable {name}"),
            hint: None,
        }
    }

    fn with_constraint(mut self, constraint: &Constraint) -> Self {
        self.constraint = Some(constraint.clone());
        self
    }
}

// ── System ──

/// Constraint store plus the substitution it solves for.
#[derive(Debug, Clone, Default)]
pub struct System {
    pub constraints: Vec<Constraint>,
    pub substitutions: BTreeMap<String, Type>,
    /// Every variable seen, keyed by name, with its strongest constraint.
    vars: BTreeMap<String, Option<Type>>,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn add_equality(
        &mut self,
        left: Type,
        right: Type,
        span: Option<Span>,
        reason: impl Into<String>,
    ) -> Result<(), UnificationError> {
        self.add(ConstraintKind::Equality, left, right, span, reason.into())
    }

    pub fn add_compatible(
        &mut self,
        left: Type,
        right: Type,
        span: Option<Span>,
        reason: impl Into<String>,
    ) -> Result<(), UnificationError> {
        self.add(ConstraintKind::Compatible, left, right, span, reason.into())
    }

    fn add(
        &mut self,
        kind: ConstraintKind,
        left: Type,
        right: Type,
        span: Option<Span>,
        reason: String,
    ) -> Result<(), UnificationError> {
        let constraint = Constraint {
            kind,
            left,
            right,
            span,
            reason,
        };
        precheck(&constraint.left, &constraint.right, kind)
            .map_err(|e| e.with_constraint(&constraint))?;
        self.register(&constraint.left);
        self.register(&constraint.right);
        self.constraints.push(constraint);
        Ok(())
    }

    fn register(&mut self, ty: &Type) {
        match ty {
            Type::Var {
                name, constraint, ..
            } => {
                let entry = self.vars.entry(name.clone()).or_insert(None);
                if entry.is_none() {
                    *entry = constraint.as_deref().cloned();
                }
            }
            Type::Chan(elem) | Type::Series(elem) => self.register(elem),
            Type::Function(props) => {
                for p in props
                    .config
                    .iter()
                    .chain(props.inputs.iter())
                    .chain(props.outputs.iter())
                {
                    self.register(&p.ty);
                }
            }
            _ => {}
        }
    }

    /// Compare `expected` and `actual`. A type variable on either side
    /// becomes an equality constraint instead of an immediate verdict.
    pub fn check(
        &mut self,
        expected: &Type,
        actual: &Type,
        span: Option<Span>,
        reason: &str,
    ) -> Result<(), UnificationError> {
        if !expected.is_valid() || !actual.is_valid() {
            return Ok(());
        }
        if expected.is_var() || actual.is_var() {
            return self.add_equality(expected.clone(), actual.clone(), span, reason);
        }
        match (expected, actual) {
            (Type::Chan(e), Type::Chan(a)) | (Type::Series(e), Type::Series(a)) => {
                self.check(e, a, span, &format!("{reason} (element types)"))
            }
            _ if expected == actual => Ok(()),
            _ => Err(UnificationError {
                constraint: None,
                left: expected.clone(),
                right: actual.clone(),
                message: format!("type mismatch: expected {expected}, got {actual}"),
                hint: None,
            }),
        }
    }

    // ── Solving ──

    /// Solve every recorded constraint, then default unbound variables.
    pub fn unify(&mut self) -> Result<(), UnificationError> {
        let limit = self.constraints.len().max(1) * 4 + 8;
        let constraints = self.constraints.clone();
        let mut iteration = 0;
        loop {
            let mut changed = false;
            for c in &constraints {
                changed |= self
                    .unify_pair(&c.left, &c.right, c.kind)
                    .map_err(|e| e.with_constraint(c))?;
            }
            iteration += 1;
            trace!(iteration, changed, "unification pass");
            if !changed {
                break;
            }
            if iteration >= limit {
                warn!(iteration, "unification did not reach a fixpoint");
                break;
            }
        }
        self.apply_defaults()
    }

    /// Solve a single constraint against the current substitution.
    pub fn unify_constraint(&mut self, constraint: &Constraint) -> Result<(), UnificationError> {
        self.register(&constraint.left);
        self.register(&constraint.right);
        self.unify_pair(&constraint.left, &constraint.right, constraint.kind)
            .map(|_| ())
            .map_err(|e| e.with_constraint(constraint))
    }

    fn unify_pair(
        &mut self,
        left: &Type,
        right: &Type,
        kind: ConstraintKind,
    ) -> Result<bool, UnificationError> {
        match (left, right) {
            (Type::Var { name: a, .. }, Type::Var { name: b, .. }) => self.unify_vars(a, b, kind),
            (Type::Var { name, .. }, other) | (other, Type::Var { name, .. }) => {
                if other.mentions(name) {
                    return Err(UnificationError::mismatch(left, right, ""));
                }
                self.unify_var_with(name, other, kind)
            }
            (Type::Chan(x), Type::Chan(y)) | (Type::Series(x), Type::Series(y)) => {
                self.unify_pair(x, y, kind)
            }
            _ => {
                concrete_check(left, right, kind)?;
                Ok(false)
            }
        }
    }

    fn unify_vars(&mut self, a: &str, b: &str, kind: ConstraintKind) -> Result<bool, UnificationError> {
        let (ra, bound_a) = self.find(a);
        let (rb, bound_b) = self.find(b);
        if ra == rb {
            return Ok(false);
        }
        match (bound_a, bound_b) {
            (None, None) => {
                let (from, to) = if self.rank(&ra) < self.rank(&rb) {
                    (ra, rb)
                } else {
                    (rb, ra)
                };
                let target = self.var_type(&to);
                self.substitutions.insert(from, target);
                Ok(true)
            }
            (Some(t), None) => {
                self.accept(&rb, &t, kind)?;
                let target = self.var_type(&ra);
                self.substitutions.insert(rb, target);
                Ok(true)
            }
            (None, Some(t)) => {
                self.accept(&ra, &t, kind)?;
                let target = self.var_type(&rb);
                self.substitutions.insert(ra, target);
                Ok(true)
            }
            (Some(x), Some(y)) => {
                if x == y {
                    return Ok(false);
                }
                if kind == ConstraintKind::Compatible && x.is_numeric() && y.is_numeric() {
                    let p = promote(&x, &y);
                    let mut changed = false;
                    if p != x {
                        self.substitutions.insert(ra, p.clone());
                        changed = true;
                    }
                    if p != y {
                        self.substitutions.insert(rb, p);
                        changed = true;
                    }
                    return Ok(changed);
                }
                self.unify_pair(&x, &y, kind)
            }
        }
    }

    fn unify_var_with(
        &mut self,
        name: &str,
        other: &Type,
        kind: ConstraintKind,
    ) -> Result<bool, UnificationError> {
        let (root, bound) = self.find(name);
        match bound {
            None => {
                self.accept(&root, other, kind)?;
                let value = self.bound_value(&root, other, kind);
                self.substitutions.insert(root, value);
                Ok(true)
            }
            Some(b) if b == *other => Ok(false),
            Some(b) => {
                if kind == ConstraintKind::Compatible && b.is_numeric() && other.is_numeric() {
                    let p = promote(&b, other);
                    if p != b {
                        self.substitutions.insert(root, p);
                        return Ok(true);
                    }
                    return Ok(false);
                }
                self.unify_pair(&b, other, kind)
            }
        }
    }

    /// Follow links from `name` to its root variable and the root's binding.
    fn find(&self, name: &str) -> (String, Option<Type>) {
        let mut current = name.to_string();
        for _ in 0..=self.substitutions.len() {
            match self.substitutions.get(&current) {
                Some(Type::Var { name: next, .. }) if *next != current => current = next.clone(),
                Some(Type::Var { .. }) | None => return (current, None),
                Some(bound) => return (current, Some(bound.clone())),
            }
        }
        (current, None)
    }

    fn var_type(&self, name: &str) -> Type {
        Type::var(name, self.vars.get(name).cloned().flatten())
    }

    fn rank(&self, name: &str) -> u8 {
        match self.vars.get(name).cloned().flatten() {
            None => 0,
            Some(Type::Constraint(LiteralClass::Numeric)) => 1,
            Some(Type::Constraint(LiteralClass::Integer)) => 2,
            Some(Type::Constraint(LiteralClass::Float | LiteralClass::ExactIntegerFloat)) => 3,
            Some(_) => 4,
        }
    }

    fn accept(&self, root: &str, other: &Type, kind: ConstraintKind) -> Result<(), UnificationError> {
        let var = self.var_type(root);
        accepts(&var, other, kind)
    }

    fn bound_value(&self, root: &str, other: &Type, kind: ConstraintKind) -> Type {
        if kind != ConstraintKind::Compatible || !other.is_numeric() || other.is_var() {
            return other.clone();
        }
        match self.vars.get(root).cloned().flatten() {
            Some(Type::Constraint(LiteralClass::Float)) if other.is_integer() => {
                promote(&Type::F32, other)
            }
            Some(c @ Type::Numeric { .. }) if c != *other => promote(&c, other),
            _ => other.clone(),
        }
    }

    fn apply_defaults(&mut self) -> Result<(), UnificationError> {
        let names: Vec<String> = self.vars.keys().cloned().collect();
        for name in names {
            let (root, bound) = self.find(&name);
            if bound.is_some() {
                continue;
            }
            let default = match self.vars.get(&root).cloned().flatten() {
                None => return Err(UnificationError::unresolved(&self.var_type(&root))),
                Some(Type::Constraint(LiteralClass::Integer)) => Type::I64,
                Some(Type::Constraint(_)) => Type::F64,
                Some(concrete) => concrete,
            };
            trace!(var = %root, ty = %default, "defaulted type variable");
            self.substitutions.insert(root, default);
        }
        Ok(())
    }

    /// Substitute every solved variable inside `ty`. Units on a variable
    /// carry over to the type it resolves to.
    pub fn apply(&self, ty: &Type) -> Type {
        match ty {
            Type::Var { name, unit, .. } => match self.find(name) {
                (_, Some(bound)) => {
                    let resolved = self.apply(&bound);
                    match unit {
                        Some(u) if resolved.unit().is_none() => resolved.with_unit(Some(u.clone())),
                        _ => resolved,
                    }
                }
                (root, None) if root != *name => self.var_type(&root).with_unit(unit.clone()),
                _ => ty.clone(),
            },
            Type::Chan(elem) => Type::chan(self.apply(elem)),
            Type::Series(elem) => Type::series(self.apply(elem)),
            Type::Function(props) => {
                let mut props = props.as_ref().clone();
                apply_params(self, &mut props.config);
                apply_params(self, &mut props.inputs);
                apply_params(self, &mut props.outputs);
                Type::function(props)
            }
            other => other.clone(),
        }
    }
}

fn apply_params(system: &System, params: &mut Params) {
    for p in params.iter_mut() {
        p.ty = system.apply(&p.ty);
    }
}

// ── Relations ──

/// Numeric promotion for two types meeting under compatibility.
pub fn promote(a: &Type, b: &Type) -> Type {
    if a.without_unit() == b.without_unit() {
        return a.clone();
    }
    let (Some(x), Some(y)) = (a.numeric_kind(), b.numeric_kind()) else {
        return a.clone();
    };
    let wide = x.bits() == 64 || y.bits() == 64;
    if x.is_float() || y.is_float() {
        return if wide { Type::F64 } else { Type::F32 };
    }
    let unsigned = x.is_unsigned() && y.is_unsigned();
    match (wide, unsigned) {
        (true, true) => Type::U64,
        (true, false) => Type::F64,
        (false, true) => Type::U32,
        (false, false) => Type::I32,
    }
}

/// Whether a variable with its constraint may be bound to `other`.
fn accepts(var: &Type, other: &Type, kind: ConstraintKind) -> Result<(), UnificationError> {
    if other.is_var() || !other.is_valid() {
        return Ok(());
    }
    let Type::Var { constraint, .. } = var else {
        return Ok(());
    };
    let Some(constraint) = constraint.as_deref() else {
        return Ok(());
    };
    match constraint {
        Type::Constraint(class) => {
            let temporal = other.is_temporal() && *class != LiteralClass::Float;
            if !other.is_numeric() && !temporal && !matches!(other, Type::TimeSpan) {
                return Err(UnificationError::mismatch(var, other, ""));
            }
            if *class == LiteralClass::Float
                && kind == ConstraintKind::Equality
                && other.is_integer()
            {
                return Err(UnificationError::mismatch(
                    var,
                    other,
                    &format!(": {other} does not satisfy float constraint"),
                ));
            }
            Ok(())
        }
        concrete => concrete_check(concrete, other, kind),
    }
}

fn concrete_check(left: &Type, right: &Type, kind: ConstraintKind) -> Result<(), UnificationError> {
    if !left.is_valid() || !right.is_valid() {
        return Ok(());
    }
    let ok = match kind {
        ConstraintKind::Equality => left.without_unit() == right.without_unit(),
        ConstraintKind::Compatible => {
            (left.inner().is_numeric() && right.inner().is_numeric()
                && left.is_series() == right.is_series())
                || crate::types::compatible(left, right)
        }
    };
    if ok {
        Ok(())
    } else {
        Err(UnificationError::mismatch(left, right, ""))
    }
}

/// Reject pairs that no substitution could ever make agree.
fn precheck(left: &Type, right: &Type, kind: ConstraintKind) -> Result<(), UnificationError> {
    match (left, right) {
        (Type::Var { .. }, Type::Var { .. }) => Ok(()),
        (Type::Var { name, .. }, other) | (other, Type::Var { name, .. }) => {
            let var = if left.is_var() { left } else { right };
            if other.mentions(name) {
                return Err(UnificationError::mismatch(left, right, ""));
            }
            accepts(var, other, kind)
        }
        (Type::Chan(x), Type::Chan(y)) | (Type::Series(x), Type::Series(y)) => {
            precheck(x, y, kind)
        }
        (Type::Chan(_) | Type::Series(_), _) | (_, Type::Chan(_) | Type::Series(_))
            if kind == ConstraintKind::Equality =>
        {
            Err(UnificationError::mismatch(left, right, ""))
        }
        _ => concrete_check(left, right, kind),
    }
}
