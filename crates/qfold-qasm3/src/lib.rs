//! `OpenQASM` 3 front end for qfold
//!
//! This crate turns QASM source text into a syntax tree. It does no name
//! resolution or type checking; that is the job of `qfold-sema`.
//!
//! # Supported Syntax
//!
//! | Feature | Example |
//! |---------|---------|
//! | Version declaration (optional) | `OPENQASM 3.0;` |
//! | Includes | `include "stdgates.inc";` |
//! | Qubit declarations | `qubit[5] q;`, `qreg q[5];` |
//! | Classical declarations | `const int[32] n = 4;`, `input angle theta;` |
//! | Aliases and concatenation | `let a = q[0:1] ++ r;` |
//! | Gate calls with modifiers | `ctrl(2) @ inv @ rx(pi/2) a, b, c;` |
//! | Gate and subroutine definitions | `gate g(t) a { rz(t) a; }`, `def f(qubit q) -> bit { ... }` |
//! | Control flow | `if`, `else`, `for`, `while`, `break`, `continue`, `return` |
//! | Measurement | `c = measure q;`, `measure q -> c;` |
//! | Pragmas and annotations | `#pragma ...`, `@keyword ...` |
//!
//! # Example
//!
//! ```rust
//! use qfold_qasm3::{StmtKind, parse};
//!
//! let (program, errors) = parse(r#"
//!     OPENQASM 3.0;
//!     qubit[2] q;
//!     h q[0];
//!     cx q[0] q[1];
//!     x q[1];
//! "#);
//!
//! // The malformed `cx` is reported and skipped; parsing continues.
//! assert_eq!(errors.len(), 1);
//! assert_eq!(errors[0].span().line, 5);
//! assert!(matches!(program.statements.last().map(|s| &s.kind), Some(StmtKind::Gate(_))));
//! ```

mod ast;
mod error;
mod lexer;
mod parser;
mod printer;

pub use ast::*;
pub use error::{ParseError, ParseResult};
pub use lexer::{SpannedToken, Token, tokenize};
pub use parser::{parse, parse_strict};
pub use printer::{gate_call, print_expression, print_program, print_statement, print_type};
