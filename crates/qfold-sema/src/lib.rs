//! qfold semantic analyzer
//!
//! Validates an OpenQASM 3 program and flattens it into an ordered sequence
//! of elementary operations on physical qubits and clbits. Loops are
//! unrolled, subroutines and user gates are inlined, modifiers are applied,
//! and classical code that depends only on compile-time values is folded away.
//!
//! # Core Components
//!
//! - **Scopes**: [`scope::ScopeArena`] with gate and subroutine bodies
//!   parented to the global scope
//! - **Types**: [`types::ClassicalType`] plus the implicit conversion rules
//! - **Resources**: [`resources::ResourceTracker`] for registers, aliases and
//!   per-qubit usage
//! - **Constant evaluation**: [`consteval::Value`] and the folding evaluator
//! - **Output**: [`Module`] with counts, depth, operation iteration,
//!   transformations and [`Module::to_source`]
//! - **Diagnostics**: [`Diagnostic`] values, collected or fail-fast per
//!   [`AnalyzerConfig`]
//!
//! # Example
//!
//! ```rust
//! use qfold_sema::analyze;
//!
//! let module = analyze(
//!     r#"
//!     OPENQASM 3.0;
//!     include "stdgates.inc";
//!     qubit[3] q;
//!     bit[3] c;
//!     for int i in [0:2] {
//!         h q[i];
//!     }
//!     c = measure q;
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(module.num_qubits(), 3);
//! assert_eq!(module.operations().count(), 6);
//! assert_eq!(module.depth(), 2);
//! ```

mod analyzer;
pub mod config;
pub mod consteval;
pub mod diagnostic;
mod emitter;
pub mod error;
mod gates;
pub mod module;
pub mod resources;
pub mod scope;
pub mod types;
mod unroll;

pub use config::{AnalyzerConfig, AnalyzerConfigBuilder, ConfigError, ConfigResult, ErrorMode};
pub use consteval::Value;
pub use diagnostic::{Diagnostic, DiagnosticKind, Severity};
pub use error::AnalysisFailure;
pub use module::{Declaration, FlatStatement, Module, Operations, RegisterInfo};
pub use types::ClassicalType;

use tracing::{debug, info, instrument};

use crate::analyzer::Analyzer;

/// Analyze with the default configuration.
pub fn analyze(source: &str) -> Result<Module, AnalysisFailure> {
    analyze_with(source, &AnalyzerConfig::default())
}

/// Analyze a program.
///
/// Returns the module when no diagnostic reaches `config.fatal_severity`;
/// otherwise an [`AnalysisFailure`] carrying the best-effort module.
#[instrument(skip_all, fields(bytes = source.len()))]
pub fn analyze_with(source: &str, config: &AnalyzerConfig) -> Result<Module, AnalysisFailure> {
    let (program, parse_errors) = qfold_qasm3::parse(source);
    debug!(
        statements = program.statements.len(),
        parse_errors = parse_errors.len(),
        "parsed program"
    );

    let module = Analyzer::new(config).run(&program, &parse_errors);
    info!(
        qubits = module.num_qubits(),
        clbits = module.num_clbits(),
        statements = module.num_statements(),
        diagnostics = module.diagnostics().len(),
        "analysis complete"
    );

    if module.has_fatal_errors() {
        return Err(AnalysisFailure::new(module));
    }
    Ok(module)
}

/// Whether a source file opts out of processing in `mode` (for example
/// `"unroll"` or `"validate"`).
///
/// Only comment lines before the `OPENQASM` version line are considered:
/// `// qfold: ignore` skips every mode, `// qfold disable: <mode>` skips one.
pub fn should_skip(source: &str, mode: &str) -> bool {
    let targeted = format!("// qfold disable: {mode}");
    for line in source.lines() {
        if line.contains("// qfold: ignore") || line.contains(&targeted) {
            return true;
        }
        if line.contains("OPENQASM") {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_skip() {
        assert!(should_skip("// qfold: ignore\nOPENQASM 3.0;", "unroll"));
        assert!(should_skip("// qfold disable: unroll\nOPENQASM 3.0;", "unroll"));
        assert!(!should_skip("// qfold disable: unroll\nOPENQASM 3.0;", "validate"));
        assert!(!should_skip("OPENQASM 3.0;\n// qfold: ignore", "unroll"));
    }

    #[test]
    fn test_failure_keeps_partial_module() {
        let err = analyze("OPENQASM 3.0;\nqubit[2] q;\nh q[5];\nx q[0];").unwrap_err();
        assert_eq!(err.diagnostics().len(), 1);
        assert_eq!(err.diagnostics()[0].kind, DiagnosticKind::OutOfRangeIndex);
        assert_eq!(err.module().operations().count(), 1);
        assert!(err.to_string().contains("out-of-range-index"));
    }
}
