// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all analysis phases, plus
// the ordered, append-only `Diagnostics` sink every pass writes into.
//
// Preconditions: none (types only).
// Postconditions: diagnostics are kept in encounter order and never removed.
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// Stable code printed in brackets after the severity, e.g. `error[E0101]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Stable codes, grouped by the error taxonomy: structural (E00xx),
/// resolution (E01xx), type (E02xx), policy (E03xx), constraint (E04xx),
/// flow/graph (E05xx).
pub mod codes {
    use super::DiagCode;

    pub const E_SYNTAX: DiagCode = DiagCode("E0001");
    pub const E_UNDEFINED: DiagCode = DiagCode("E0101");
    pub const E_CONFLICT: DiagCode = DiagCode("E0102");
    pub const E_NOT_A_CHANNEL: DiagCode = DiagCode("E0103");
    pub const E_NOT_A_FUNCTION: DiagCode = DiagCode("E0104");
    pub const E_TYPE_MISMATCH: DiagCode = DiagCode("E0201");
    pub const E_LITERAL: DiagCode = DiagCode("E0202");
    pub const E_RETURN_TYPE: DiagCode = DiagCode("E0203");
    pub const E_UNIT: DiagCode = DiagCode("E0204");
    pub const E_POLICY: DiagCode = DiagCode("E0301");
    pub const E_UNIFY: DiagCode = DiagCode("E0401");
    pub const E_FLOW: DiagCode = DiagCode("E0501");
    pub const E_CYCLE: DiagCode = DiagCode("E0502");
    pub const W_UNIT_MAGNITUDE: DiagCode = DiagCode("W0201");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// The constraint that made a deferred unification fail: its reason text and,
/// when known, where it was introduced.
#[derive(Debug, Clone, PartialEq)]
pub struct Cause {
    pub reason: String,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub causes: Vec<Cause>,
}

impl Diagnostic {
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            causes: Vec::new(),
        }
    }

    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message)
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, span, message)
    }

    pub fn with_code(self, code: DiagCode) -> Self {
        Diagnostic {
            code: Some(code),
            ..self
        }
    }

    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        Diagnostic {
            hint: Some(hint.into()),
            ..self
        }
    }

    pub fn with_cause(mut self, reason: impl Into<String>, span: Option<Span>) -> Self {
        self.causes.push(Cause {
            reason: reason.into(),
            span,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

/// `error[E0201]: message`, then one indented line per cause and the hint.
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        })?;
        match self.code {
            Some(code) => write!(f, "[{code}]: {}", self.message)?,
            None => write!(f, ": {}", self.message)?,
        }
        for cause in &self.causes {
            write!(f, "\n  from: {}", cause.reason)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {hint}")?;
        }
        Ok(())
    }
}

// ── Sink ─────────────────────────────────────────────────────────────────

/// Ordered, append-only collection of diagnostics for one analysis.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diag: Diagnostic) {
        self.items.push(diag);
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.add(Diagnostic::error(span, message));
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.add(Diagnostic::warning(span, message));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Drop every entry recorded after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    /// True iff no error-severity entries have been recorded.
    pub fn ok(&self) -> bool {
        !self.items.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.is_error())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&Diagnostic> {
        self.items.first()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ── Source positions ─────────────────────────────────────────────────────

/// Maps byte offsets to (line, column). Lines are 1-based, columns 0-based.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, offset - self.starts[line])
    }
}
