//! Error types for the QASM3 parser.

use thiserror::Error;

use crate::ast::Span;

/// Errors that can occur during parsing.
///
/// The parser recovers after each error, so a single run can report many.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Lexer error (invalid token).
    #[error("invalid token at {span}: {message}")]
    LexerError { span: Span, message: String },

    /// Unexpected token.
    #[error("unexpected token at {span}: expected {expected}, found {found}")]
    UnexpectedToken {
        span: Span,
        expected: String,
        found: String,
    },

    /// Unexpected end of input.
    #[error("unexpected end of input at {span}: expected {expected}")]
    UnexpectedEof { span: Span, expected: String },

    /// Invalid version.
    #[error("invalid OPENQASM version at {span}: {version}")]
    InvalidVersion { span: Span, version: String },

    /// Integer literal does not fit in 64 bits.
    #[error("integer literal out of range at {span}")]
    IntegerOverflow { span: Span },

    /// Syntactically valid construct in an invalid position.
    #[error("{message} at {span}")]
    Misplaced { span: Span, message: String },
}

impl ParseError {
    /// Location the error refers to.
    pub fn span(&self) -> Span {
        match self {
            ParseError::LexerError { span, .. }
            | ParseError::UnexpectedToken { span, .. }
            | ParseError::UnexpectedEof { span, .. }
            | ParseError::InvalidVersion { span, .. }
            | ParseError::IntegerOverflow { span }
            | ParseError::Misplaced { span, .. } => *span,
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;
