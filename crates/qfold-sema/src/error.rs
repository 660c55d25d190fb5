//! Error type returned by the analysis entry points.

use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::module::Module;

/// Analysis finished with fatal diagnostics.
///
/// The best-effort module is still available, so callers can report
/// partial results alongside the diagnostics.
#[derive(Debug, Error)]
#[error("analysis failed with {errors} error(s); first: {first}")]
pub struct AnalysisFailure {
    errors: usize,
    first: String,
    module: Box<Module>,
}

impl AnalysisFailure {
    pub(crate) fn new(module: Module) -> Self {
        let fatal = module.fatal_diagnostics().count();
        let first = module
            .fatal_diagnostics()
            .next()
            .map_or_else(String::new, ToString::to_string);
        Self {
            errors: fatal,
            first,
            module: Box::new(module),
        }
    }

    /// Every diagnostic of the run, in analysis order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.module.diagnostics()
    }

    /// The partial module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Take the partial module.
    pub fn into_module(self) -> Module {
        *self.module
    }
}
