//! Diagnostics reported by the analyzer.

use std::fmt;

use qfold_qasm3::{ParseError, Span};
use serde::{Deserialize, Serialize};

/// Diagnostic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum DiagnosticKind {
    /// Passed through from the parser.
    Syntax,
    UndefinedSymbol,
    Redeclaration,
    TypeMismatch,
    ArityMismatch,
    OutOfRangeIndex,
    /// A value that must be known at compile time is not.
    NonConstantBound,
    UnsupportedModifierCombination,
    ResourceMisuse,
    /// Valid syntax the analyzer does not accept (recursion, nested qubit
    /// declarations, unknown includes, ...).
    Unsupported,
    /// A loop ran past `max_loop_iterations`.
    IterationLimit,
}

impl DiagnosticKind {
    /// Kebab-case name used in rendered diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::Syntax => "syntax",
            DiagnosticKind::UndefinedSymbol => "undefined-symbol",
            DiagnosticKind::Redeclaration => "redeclaration",
            DiagnosticKind::TypeMismatch => "type-mismatch",
            DiagnosticKind::ArityMismatch => "arity-mismatch",
            DiagnosticKind::OutOfRangeIndex => "out-of-range-index",
            DiagnosticKind::NonConstantBound => "non-constant-bound",
            DiagnosticKind::UnsupportedModifierCombination => "unsupported-modifier-combination",
            DiagnosticKind::ResourceMisuse => "resource-misuse",
            DiagnosticKind::Unsupported => "unsupported",
            DiagnosticKind::IterationLimit => "iteration-limit",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious a diagnostic is. `Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// A located, categorized message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub span: Span,
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    /// An error diagnostic.
    pub fn error(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    /// A warning diagnostic.
    pub fn warning(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    /// Check if this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl From<&ParseError> for Diagnostic {
    fn from(err: &ParseError) -> Self {
        Diagnostic::error(DiagnosticKind::Syntax, err.span(), err.to_string())
    }
}

impl fmt::Display for Diagnostic {
    /// `line:col: error[type-mismatch]: message`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}[{}]: {}",
            self.span, self.severity, self.kind, self.message
        )
    }
}
