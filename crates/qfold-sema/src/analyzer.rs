//! The statement walker.
//!
//! One depth-first pass over the parsed program validates every statement
//! and appends its flattened form to a sink. Each statement records the sink
//! length on entry; when it fails, everything it emitted is truncated away and
//! the diagnostic is reported. Local errors drop only the failing statement.
//! Structural errors (recursion, loops that cannot be unrolled) abort the
//! enclosing construct up to the nearest subroutine or gate call, or the top
//! level.

use std::sync::Arc;

use qfold_ir::{BUILTIN_GATES, BuiltinId, ClbitId, Instruction, QubitId};
use qfold_qasm3::{
    AssignOp, ClassicalDecl, Expression, IndexItem, IoModifier, Param, ParseError, Program, Span,
    Statement, StmtKind, SubroutineDef,
};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::config::{AnalyzerConfig, ErrorMode};
use crate::consteval::Value;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::module::{Declaration, FlatStatement, Module, RegisterInfo};
use crate::resources::{RegisterId, ResourceKind, ResourceTracker, UsageState, View};
use crate::scope::{Binding, ScopeArena, ScopeId, ScopeKind, Symbol, SymbolKind};
use crate::types::{ClassicalType, check_assignable, coerce};

/// Includes that only declare the builtin gate set.
const STANDARD_INCLUDES: [&str; 2] = ["stdgates.inc", "qelib1.inc"];

/// Why a statement did not complete.
#[derive(Debug)]
pub(crate) enum SemError {
    /// Drop the statement and keep going.
    Local(Diagnostic),
    /// Drop the enclosing construct.
    Structural(Diagnostic),
    /// Already reported; unwinding to the nearest call boundary.
    Aborted,
    /// Already reported; drop the current statement only.
    Dropped,
}

pub(crate) type SemResult<T> = Result<T, SemError>;

/// What a subroutine call produced.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CallResult {
    Value(Value),
    /// `return measure q;` handed back to the caller.
    Measure(Vec<QubitId>),
    Runtime(Expression),
    Void,
}

/// Control flow out of a statement.
#[derive(Debug)]
pub(crate) enum Signal {
    Normal,
    Break,
    Continue,
    Return(CallResult),
}

/// An evaluated right-hand side.
#[derive(Debug)]
pub(crate) enum Rvalue {
    Known(Value),
    Runtime(Expression),
    /// Qubits whose measurement outcomes are being stored.
    Measured(Vec<QubitId>),
}

/// Analysis state for one program.
pub(crate) struct Analyzer<'c> {
    pub(crate) config: &'c AnalyzerConfig,
    pub(crate) scopes: ScopeArena,
    pub(crate) resources: ResourceTracker,
    pub(crate) sink: Vec<FlatStatement>,
    pub(crate) declarations: Vec<Declaration>,
    pub(crate) external_defs: Vec<qfold_qasm3::GateDef>,
    /// Gates and subroutines currently being expanded.
    pub(crate) call_stack: Vec<String>,
    /// Scope the innermost loop was entered from.
    pub(crate) loop_scope: Option<ScopeId>,
    /// Body scope of the innermost subroutine call.
    pub(crate) call_scope: Option<ScopeId>,
    /// Scope of the innermost branch on a runtime condition. Writes to
    /// symbols declared outside it make them runtime-valued.
    pub(crate) runtime_floor: Option<ScopeId>,
    /// Span of the statement being analyzed.
    pub(crate) span: Span,
    diagnostics: Vec<Diagnostic>,
    halted: bool,
}

impl<'c> Analyzer<'c> {
    pub(crate) fn new(config: &'c AnalyzerConfig) -> Self {
        let mut scopes = ScopeArena::new();
        for gate in BUILTIN_GATES {
            if let Some(id) = BuiltinId::lookup(gate.name) {
                let symbol = Symbol::new(gate.name, SymbolKind::GateDefinition, Span::default())
                    .with_binding(Binding::Builtin(id));
                // Builtin names are unique.
                let _ = scopes.declare(symbol);
            }
        }
        Self {
            config,
            scopes,
            resources: ResourceTracker::new(),
            sink: Vec::new(),
            declarations: Vec::new(),
            external_defs: Vec::new(),
            call_stack: Vec::new(),
            loop_scope: None,
            call_scope: None,
            runtime_floor: None,
            span: Span::default(),
            diagnostics: Vec::new(),
            halted: false,
        }
    }

    /// Analyze a whole program.
    pub(crate) fn run(mut self, program: &Program, parse_errors: &[ParseError]) -> Module {
        for err in parse_errors {
            self.report(Diagnostic::from(err));
        }
        for stmt in &program.statements {
            if self.halted {
                debug!(line = stmt.span.line, "analysis halted");
                break;
            }
            // Failures were reported where they happened.
            let _ = self.analyze_statement(stmt);
        }
        self.finish(program.version.clone())
    }

    fn finish(self, version: Option<String>) -> Module {
        let registers = |kind| {
            self.resources
                .registers(kind)
                .map(|r| RegisterInfo {
                    name: r.name.clone(),
                    size: r.size,
                    base: r.base,
                })
                .collect::<Vec<_>>()
        };
        let qregs = registers(ResourceKind::Quantum);
        let cregs = registers(ResourceKind::Classical);
        let globals = self
            .scopes
            .globals()
            .filter(|s| !matches!(s.binding, Binding::Builtin(_)))
            .cloned()
            .collect();
        Module {
            version,
            statements: self.sink,
            qregs,
            cregs,
            declarations: self.declarations,
            external_gates: self.external_defs,
            globals,
            diagnostics: self.diagnostics,
            fatal_severity: self.config.fatal_severity,
            includes_stdgates: true,
        }
    }

    /// Record a diagnostic. In fail-fast mode a fatal one halts analysis.
    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        debug!(%diagnostic, "diagnostic");
        if self.config.error_mode == ErrorMode::FailFast
            && diagnostic.severity >= self.config.fatal_severity
        {
            self.halted = true;
        }
        self.diagnostics.push(diagnostic);
    }

    /// A statement-local error at the current span.
    pub(crate) fn local(&self, kind: DiagnosticKind, message: impl Into<String>) -> SemError {
        SemError::Local(Diagnostic::error(kind, self.span, message))
    }

    /// An error that aborts the enclosing construct.
    pub(crate) fn structural(&self, kind: DiagnosticKind, message: impl Into<String>) -> SemError {
        SemError::Structural(Diagnostic::error(kind, self.span, message))
    }

    fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.report(Diagnostic::warning(kind, self.span, message));
    }

    /// Declare in the innermost scope.
    pub(crate) fn declare_symbol(&mut self, symbol: Symbol) -> SemResult<()> {
        let name = symbol.name.clone();
        self.scopes.declare(symbol).map_err(|_| self.redeclaration(&name))
    }

    fn redeclaration(&self, name: &str) -> SemError {
        let message = match self.scopes.resolve(name) {
            Some(Symbol {
                binding: Binding::Builtin(_),
                ..
            }) => format!("`{name}` is a builtin gate and cannot be redeclared"),
            Some(first) => format!("`{name}` is already declared at {}", first.span),
            None => format!("`{name}` is already declared"),
        };
        self.local(DiagnosticKind::Redeclaration, message)
    }

    /// Run `f` inside a fresh scope.
    pub(crate) fn scoped<T>(
        &mut self,
        kind: ScopeKind,
        f: impl FnOnce(&mut Self) -> SemResult<T>,
    ) -> SemResult<T> {
        self.scopes.enter(kind);
        let result = f(self);
        self.scopes.exit();
        result
    }

    /// Whether a write to a symbol declared in `scope` happens under a
    /// runtime condition the symbol does not live in.
    pub(crate) fn in_runtime_branch(&self, scope: ScopeId) -> bool {
        self.runtime_floor.is_some_and(|floor| scope < floor)
    }

    pub(crate) fn analyze_block(&mut self, body: &[Statement]) -> SemResult<Signal> {
        for stmt in body {
            if self.halted {
                return Err(SemError::Aborted);
            }
            match self.analyze_statement(stmt)? {
                Signal::Normal => {}
                signal => return Ok(signal),
            }
        }
        Ok(Signal::Normal)
    }

    /// Analyze one statement, rolling back its output on failure.
    pub(crate) fn analyze_statement(&mut self, stmt: &Statement) -> SemResult<Signal> {
        trace!(line = stmt.span.line, "statement");
        let saved = std::mem::replace(&mut self.span, stmt.span);
        let mark = self.sink.len();
        let result = self.dispatch(stmt);
        self.span = saved;

        let err = match result {
            Ok(signal) => return Ok(signal),
            Err(err) => err,
        };
        self.sink.truncate(mark);
        match err {
            SemError::Local(diagnostic) => {
                self.report(diagnostic);
                Ok(Signal::Normal)
            }
            SemError::Structural(diagnostic) => {
                self.report(diagnostic);
                Err(SemError::Aborted)
            }
            SemError::Aborted => Err(SemError::Aborted),
            SemError::Dropped if self.halted => Err(SemError::Aborted),
            SemError::Dropped => Ok(Signal::Normal),
        }
    }

    fn dispatch(&mut self, stmt: &Statement) -> SemResult<Signal> {
        match &stmt.kind {
            StmtKind::Include(path) => self.include(path)?,
            StmtKind::QubitDecl { name, size } => self.declare_qubits(name, size.as_ref())?,
            StmtKind::ClassicalDecl(decl) => self.declare_classical(decl)?,
            StmtKind::Alias { name, value } => self.declare_alias(name, value)?,
            StmtKind::Gate(call) => {
                let ops = self.expand_call(call)?;
                self.sink.extend(ops.into_iter().map(FlatStatement::Op));
            }
            StmtKind::Measure { qubits, target } => self.measure(qubits, target.as_ref())?,
            StmtKind::Reset(operand) => {
                for q in self.quantum_qubits(operand)? {
                    self.sink.push(FlatStatement::Op(Instruction::reset(q)));
                    self.note_usage(q, UsageState::Reset);
                }
            }
            StmtKind::Barrier(operands) => self.barrier(operands)?,
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                return self.analyze_if(condition, then_body, else_body.as_deref().unwrap_or(&[]));
            }
            StmtKind::For {
                var_type,
                variable,
                iterable,
                body,
            } => return self.analyze_for(var_type.as_ref(), variable, iterable, body),
            StmtKind::While { condition, body } => return self.analyze_while(condition, body),
            StmtKind::Break => return self.loop_control(Signal::Break, "break"),
            StmtKind::Continue => return self.loop_control(Signal::Continue, "continue"),
            StmtKind::Return(value) => return self.analyze_return(value.as_ref()),
            StmtKind::Block(body) => return self.scoped(ScopeKind::Block, |a| a.analyze_block(body)),
            StmtKind::SubroutineDef(def) => self.define_subroutine(def)?,
            StmtKind::GateDef(def) => self.define_gate(def)?,
            StmtKind::Assignment { target, op, value } => self.assign(target, *op, value)?,
            StmtKind::Expr(expr) => self.expression_statement(expr)?,
            StmtKind::Pragma(text) => self.sink.push(FlatStatement::Pragma(text.clone())),
            StmtKind::Annotation { keyword, .. } => trace!(keyword = %keyword, "annotation ignored"),
        }
        Ok(Signal::Normal)
    }

    fn include(&mut self, path: &str) -> SemResult<()> {
        if STANDARD_INCLUDES.contains(&path) {
            debug!(path, "standard include");
            return Ok(());
        }
        Err(self.local(
            DiagnosticKind::Unsupported,
            format!("cannot resolve include \"{path}\""),
        ))
    }

    // ---- declarations ----

    fn allocate(&mut self, name: &str, size: u32, kind: ResourceKind) -> SemResult<(RegisterId, View)> {
        self.resources
            .allocate(name, size, kind)
            .map_err(|msg| self.local(DiagnosticKind::ResourceMisuse, msg))
    }

    fn declare_qubits(&mut self, name: &str, size: Option<&Expression>) -> SemResult<()> {
        if !self.scopes.is_global() {
            return Err(self.local(
                DiagnosticKind::Unsupported,
                "qubits can only be declared in the global scope",
            ));
        }
        let size = match size {
            Some(e) => self.resolve_width(e)?,
            None => 1,
        };
        self.ensure_undeclared(name)?;
        if let Some(limit) = self.config.device_qubits {
            let total = self.resources.num_qubits().saturating_add(size);
            if total > limit {
                self.report(Diagnostic::error(
                    DiagnosticKind::ResourceMisuse,
                    self.span,
                    format!("program declares {total} qubits but the device has {limit}"),
                ));
            }
        }
        let (_, view) = self.allocate(name, size, ResourceKind::Quantum)?;
        let mut symbol = Symbol::new(name, SymbolKind::QuantumRegister, self.span)
            .with_binding(Binding::Qubits(view));
        symbol.size = Some(size);
        self.declare_symbol(symbol)
    }

    fn declare_classical(&mut self, decl: &ClassicalDecl) -> SemResult<()> {
        let ty = self.resolve_type(&decl.ty)?;
        let name = decl.name.as_str();

        if decl.is_const {
            let Some(init) = &decl.init else {
                return Err(self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("constant `{name}` needs an initializer"),
                ));
            };
            self.check_initializer(&ty, init)?;
            let Rvalue::Known(value) = self.rvalue(init)? else {
                return Err(self.local(
                    DiagnosticKind::NonConstantBound,
                    format!("initializer of constant `{name}` is not a compile-time constant"),
                ));
            };
            let value = self.coerce_to(&ty, value)?;
            return self.declare_symbol(
                Symbol::new(name, SymbolKind::Constant, self.span)
                    .with_type(ty)
                    .with_value(Some(value)),
            );
        }

        let init = match &decl.init {
            Some(e) => {
                self.check_initializer(&ty, e)?;
                Some(self.rvalue(e)?)
            }
            None => None,
        };

        match decl.io {
            Some(IoModifier::Input) => {
                if init.is_some() {
                    return Err(self.local(
                        DiagnosticKind::Unsupported,
                        format!("input `{name}` cannot have an initializer"),
                    ));
                }
                self.ensure_undeclared(name)?;
                let emit = self.resources.reserve_name(name);
                self.declarations.push(Declaration {
                    name: emit.clone(),
                    ty: ty.clone(),
                    io: Some(IoModifier::Input),
                });
                let mut symbol = Symbol::new(name, SymbolKind::ClassicalVariable, self.span).with_type(ty);
                symbol.emit_name = Some(emit);
                return self.declare_symbol(symbol);
            }
            Some(IoModifier::Output) => {
                self.ensure_undeclared(name)?;
                let emit = self.resources.reserve_name(name);
                self.declarations.push(Declaration {
                    name: emit.clone(),
                    ty: ty.clone(),
                    io: Some(IoModifier::Output),
                });
                let mut symbol =
                    Symbol::new(name, SymbolKind::ClassicalVariable, self.span).with_type(ty).mutable();
                symbol.emit_name = Some(emit);
                self.declare_symbol(symbol)?;
            }
            None => {
                self.ensure_undeclared(name)?;
                let symbol = match ty {
                    ClassicalType::Bit(width) => {
                        let (id, view) = self.allocate(name, width, ResourceKind::Classical)?;
                        let mut symbol = Symbol::new(name, SymbolKind::ClassicalRegister, self.span)
                            .with_type(ty)
                            .with_binding(Binding::Clbits(view))
                            .mutable();
                        symbol.emit_name = Some(self.resources.register(id).name.clone());
                        symbol
                    }
                    ty => Symbol::new(name, SymbolKind::ClassicalVariable, self.span)
                        .with_type(ty)
                        .mutable(),
                };
                self.declare_symbol(symbol)?;
            }
        }

        match init {
            Some(rvalue) => self.store(name, rvalue),
            None => Ok(()),
        }
    }

    fn ensure_undeclared(&self, name: &str) -> SemResult<()> {
        if self.scopes.declared_here(name) {
            return Err(self.redeclaration(name));
        }
        Ok(())
    }

    fn declare_alias(&mut self, name: &str, value: &Expression) -> SemResult<()> {
        let (kind, view) = self.view_of(value)?;
        if kind == ResourceKind::Classical {
            return Err(self.local(
                DiagnosticKind::Unsupported,
                format!("alias `{name}` refers to classical bits; only qubit aliases are supported"),
            ));
        }
        let mut symbol =
            Symbol::new(name, SymbolKind::Alias, self.span).with_binding(Binding::Qubits(view.clone()));
        symbol.size = Some(view.len());
        self.declare_symbol(symbol)
    }

    fn define_subroutine(&mut self, def: &SubroutineDef) -> SemResult<()> {
        if !self.scopes.is_global() {
            return Err(self.local(
                DiagnosticKind::Unsupported,
                "subroutines can only be defined in the global scope",
            ));
        }
        self.declare_symbol(
            Symbol::new(&def.name, SymbolKind::SubroutineDefinition, self.span)
                .with_binding(Binding::Subroutine(Arc::new(def.clone()))),
        )
    }

    // ---- registers and quantum operands ----

    /// Resolve a register, alias, slice or concatenation.
    pub(crate) fn view_of(&mut self, expr: &Expression) -> SemResult<(ResourceKind, View)> {
        match expr {
            Expression::Identifier(name) => {
                let Some(symbol) = self.scopes.resolve(name) else {
                    return Err(self.local(
                        DiagnosticKind::UndefinedSymbol,
                        format!("undefined name `{name}`"),
                    ));
                };
                match &symbol.binding {
                    Binding::Qubits(view) => Ok((ResourceKind::Quantum, view.clone())),
                    Binding::Clbits(view) => Ok((ResourceKind::Classical, view.clone())),
                    _ => Err(self.local(
                        DiagnosticKind::TypeMismatch,
                        format!("`{name}` is not a register"),
                    )),
                }
            }
            Expression::Index { base, items } => {
                let (kind, view) = self.view_of(base)?;
                let [item] = items.as_slice() else {
                    return Err(self.local(
                        DiagnosticKind::TypeMismatch,
                        "registers take exactly one index",
                    ));
                };
                if let IndexItem::Single(index) = item {
                    let index = self.fold_index_value(index)?;
                    let element = self
                        .resources
                        .resolve_index(&view, index)
                        .ok()
                        .and_then(|physical| self.resources.element_view(kind, physical))
                        .ok_or_else(|| {
                            self.local(
                                DiagnosticKind::OutOfRangeIndex,
                                format!("index {index} is out of range for size {}", view.len()),
                            )
                        })?;
                    return Ok((kind, element));
                }
                let positions = self.index_positions(item, view.len())?;
                Ok((kind, view.pick(&positions)))
            }
            Expression::BinOp {
                left,
                op: qfold_qasm3::BinOp::Concat,
                right,
            } => {
                let (lkind, lview) = self.view_of(left)?;
                let (rkind, rview) = self.view_of(right)?;
                if lkind != rkind {
                    return Err(self.local(
                        DiagnosticKind::TypeMismatch,
                        "cannot concatenate qubits with classical bits",
                    ));
                }
                Ok((lkind, lview.concat(&rview)))
            }
            Expression::Paren(inner) => self.view_of(inner),
            _ => Err(self.local(
                DiagnosticKind::TypeMismatch,
                "expected a register, alias or slice",
            )),
        }
    }

    /// Resolve an operand that must denote qubits.
    pub(crate) fn quantum_view(&mut self, expr: &Expression) -> SemResult<View> {
        match self.view_of(expr)? {
            (ResourceKind::Quantum, view) => Ok(view),
            (ResourceKind::Classical, _) => Err(self.local(
                DiagnosticKind::TypeMismatch,
                "expected qubits, found classical bits",
            )),
        }
    }

    pub(crate) fn quantum_qubits(&mut self, expr: &Expression) -> SemResult<Vec<QubitId>> {
        let view = self.quantum_view(expr)?;
        Ok(self.resources.qubits(&view))
    }

    fn note_usage(&mut self, qubit: QubitId, state: UsageState) {
        if let Some(message) = self.resources.mark_used(qubit, state) {
            self.warn(DiagnosticKind::ResourceMisuse, message);
        }
    }

    fn measure(&mut self, operand: &Expression, target: Option<&Expression>) -> SemResult<()> {
        let qubits = self.quantum_qubits(operand)?;
        match target {
            Some(target) => self.measure_into(&qubits, target),
            None => {
                self.measure_discard(&qubits);
                Ok(())
            }
        }
    }

    fn measure_discard(&mut self, qubits: &[QubitId]) {
        for &q in qubits {
            self.sink.push(FlatStatement::Op(Instruction::measure_discard(q)));
            self.note_usage(q, UsageState::Measured);
        }
    }

    /// Emit measurements of `qubits` into the bits denoted by `target`.
    fn measure_into(&mut self, qubits: &[QubitId], target: &Expression) -> SemResult<()> {
        let (kind, view) = self.view_of(target)?;
        if kind != ResourceKind::Classical {
            return Err(self.local(
                DiagnosticKind::TypeMismatch,
                "measurement target must be a bit register",
            ));
        }
        if view.len() as usize != qubits.len() {
            return Err(self.local(
                DiagnosticKind::ArityMismatch,
                format!(
                    "cannot store {} measurement outcomes in {} bits",
                    qubits.len(),
                    view.len()
                ),
            ));
        }
        let clbits = self.resources.clbits(&view);
        for (&q, &c) in qubits.iter().zip(&clbits) {
            self.sink.push(FlatStatement::Op(Instruction::measure(q, c)));
            self.note_usage(q, UsageState::Measured);
        }
        if let Some(symbol) = target.root_name().and_then(|n| self.scopes.resolve_mut(n)) {
            symbol.value = None;
        }
        Ok(())
    }

    fn barrier(&mut self, operands: &[Expression]) -> SemResult<()> {
        let qubits: Vec<QubitId> = if operands.is_empty() {
            (0..self.resources.num_qubits()).map(QubitId).collect()
        } else {
            let mut seen = FxHashSet::default();
            let mut qubits = Vec::new();
            for operand in operands {
                for q in self.quantum_qubits(operand)? {
                    if seen.insert(q) {
                        qubits.push(q);
                    }
                }
            }
            qubits
        };
        if !qubits.is_empty() {
            self.sink.push(FlatStatement::Op(Instruction::barrier(qubits)));
        }
        Ok(())
    }

    // ---- classical values ----

    /// Evaluate a right-hand side.
    pub(crate) fn rvalue(&mut self, expr: &Expression) -> SemResult<Rvalue> {
        match expr.unparen() {
            Expression::Measure(operand) => Ok(Rvalue::Measured(self.quantum_qubits(operand)?)),
            Expression::FnCall { name, args } if self.is_subroutine(name) => {
                match self.call_subroutine(name, args)? {
                    CallResult::Value(v) => Ok(Rvalue::Known(v)),
                    CallResult::Runtime(e) => Ok(Rvalue::Runtime(e)),
                    CallResult::Measure(qubits) => Ok(Rvalue::Measured(qubits)),
                    CallResult::Void => Err(self.local(
                        DiagnosticKind::TypeMismatch,
                        format!("subroutine `{name}` does not return a value"),
                    )),
                }
            }
            e => match self.fold(e)? {
                Some(v) => Ok(Rvalue::Known(v)),
                None => Ok(Rvalue::Runtime(self.residualize(e)?)),
            },
        }
    }

    fn is_subroutine(&self, name: &str) -> bool {
        matches!(
            self.scopes.resolve(name).map(|s| &s.binding),
            Some(Binding::Subroutine(_))
        )
    }

    pub(crate) fn coerce_to(&self, ty: &ClassicalType, value: Value) -> SemResult<Value> {
        coerce(ty, value).map_err(|msg| self.local(DiagnosticKind::TypeMismatch, msg))
    }

    /// Give a variable an emitted name and hoisted declaration.
    pub(crate) fn materialize(&mut self, name: &str) -> SemResult<String> {
        let Some(symbol) = self.scopes.resolve(name) else {
            return Err(self.local(
                DiagnosticKind::UndefinedSymbol,
                format!("undefined name `{name}`"),
            ));
        };
        let Some(ty) = symbol.ty.clone() else {
            return Err(self.not_a_value(name, symbol.kind));
        };
        let value = symbol.value.clone();
        let emit = self.hoist(name, ty)?;
        if let Some(v) = value {
            self.sink.push(FlatStatement::Assign {
                target: Expression::Identifier(emit.clone()),
                value: v.to_expression(),
            });
        }
        if let Some(symbol) = self.scopes.resolve_mut(name) {
            symbol.emit_name = Some(emit.clone());
        }
        debug!(name, emit = %emit, "variable becomes runtime-valued");
        Ok(emit)
    }

    /// Reserve an emitted name for a runtime variable. Bit variables become
    /// clbit registers so re-analysis of the output counts them the same way.
    fn hoist(&mut self, name: &str, ty: ClassicalType) -> SemResult<String> {
        if let ClassicalType::Bit(width) = ty {
            let (id, _) = self.allocate(name, width, ResourceKind::Classical)?;
            return Ok(self.resources.register(id).name.clone());
        }
        let emit = self.resources.reserve_name(name);
        self.declarations.push(Declaration {
            name: emit.clone(),
            ty,
            io: None,
        });
        Ok(emit)
    }

    /// Store a whole value into `name`.
    fn store(&mut self, name: &str, rvalue: Rvalue) -> SemResult<()> {
        match rvalue {
            Rvalue::Measured(qubits) => {
                self.measure_into(&qubits, &Expression::Identifier(name.to_string()))
            }
            Rvalue::Known(v) => {
                let ty = self.declared_type(name)?;
                let v = self.coerce_to(&ty, v)?;
                self.write_variable(name, None, v.to_expression(), Some(v))
            }
            Rvalue::Runtime(e) => self.write_variable(name, None, e, None),
        }
    }

    fn declared_type(&self, name: &str) -> SemResult<ClassicalType> {
        match self.scopes.resolve(name) {
            Some(Symbol { ty: Some(ty), .. }) => Ok(ty.clone()),
            Some(symbol) => Err(self.not_a_value(name, symbol.kind)),
            None => Err(self.local(
                DiagnosticKind::UndefinedSymbol,
                format!("undefined name `{name}`"),
            )),
        }
    }

    /// Record a write. Emits an assignment when the variable is (or becomes)
    /// runtime-valued; otherwise only the tracked value changes.
    fn write_variable(
        &mut self,
        name: &str,
        items: Option<Vec<IndexItem>>,
        rendered: Expression,
        updated: Option<Value>,
    ) -> SemResult<()> {
        let Some(symbol) = self.scopes.resolve(name) else {
            return Err(self.local(
                DiagnosticKind::UndefinedSymbol,
                format!("undefined name `{name}`"),
            ));
        };
        let runtime_write = self.in_runtime_branch(symbol.scope);
        let emitted = symbol.kind == SymbolKind::ClassicalRegister
            || symbol.emit_name.is_some()
            || runtime_write
            || updated.is_none();
        if emitted {
            let emit = self.runtime_name(name)?;
            let base = Expression::Identifier(emit);
            let target = match items {
                Some(items) => Expression::Index {
                    base: Box::new(base),
                    items,
                },
                None => base,
            };
            self.sink.push(FlatStatement::Assign {
                target,
                value: rendered,
            });
        }
        if let Some(symbol) = self.scopes.resolve_mut(name) {
            symbol.value = if runtime_write { None } else { updated };
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expression, op: AssignOp, value: &Expression) -> SemResult<()> {
        let Some(root) = target.root_name() else {
            return Err(self.local(
                DiagnosticKind::TypeMismatch,
                "left-hand side is not assignable",
            ));
        };
        let Some(symbol) = self.scopes.resolve(root) else {
            return Err(self.local(
                DiagnosticKind::UndefinedSymbol,
                format!("undefined name `{root}`"),
            ));
        };
        match symbol.kind {
            SymbolKind::ClassicalVariable | SymbolKind::ClassicalRegister if symbol.mutable => {}
            SymbolKind::ClassicalVariable | SymbolKind::ClassicalRegister => {
                return Err(self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("`{root}` is read-only"),
                ));
            }
            SymbolKind::Constant => {
                return Err(self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("cannot assign to constant `{root}`"),
                ));
            }
            kind => return Err(self.not_a_value(root, kind)),
        }

        let rhs = match op.binop() {
            Some(binop) => Expression::BinOp {
                left: Box::new(target.clone()),
                op: binop,
                right: Box::new(value.clone()),
            },
            None => value.clone(),
        };
        match target.unparen() {
            Expression::Identifier(name) => {
                let ty = self.declared_type(name)?;
                self.check_initializer(&ty, &rhs)?;
                let rvalue = self.rvalue(&rhs)?;
                self.store(name, rvalue)
            }
            Expression::Index { base, items } if matches!(base.unparen(), Expression::Identifier(_)) => {
                self.assign_indexed(root, items, &rhs)
            }
            _ => Err(self.local(
                DiagnosticKind::Unsupported,
                "nested indexed assignment is not supported",
            )),
        }
    }

    fn assign_indexed(&mut self, name: &str, items: &[IndexItem], rhs: &Expression) -> SemResult<()> {
        let ty = self.declared_type(name)?;
        let current = self.scopes.resolve(name).and_then(|s| s.value.clone());

        if let ClassicalType::Array { .. } = ty {
            let mut element = ty.clone();
            let mut path = Vec::with_capacity(items.len());
            for item in items {
                if !matches!(item, IndexItem::Single(_)) {
                    return Err(self.local(
                        DiagnosticKind::Unsupported,
                        "array slices cannot be assigned",
                    ));
                }
                let len = element.width().unwrap_or(0);
                let positions = self.index_positions(item, len)?;
                path.push(positions);
                element = element.indexed().ok_or_else(|| {
                    self.local(DiagnosticKind::TypeMismatch, format!("too many indices for `{name}`"))
                })?;
            }
            self.check_initializer(&element, rhs)?;
            let rendered_items = literal_items(&path, items);
            return match self.rvalue(rhs)? {
                Rvalue::Known(v) => {
                    let v = self.coerce_to(&element, v)?;
                    let flat: Vec<usize> = path.iter().map(|p| p[0] as usize).collect();
                    let updated = current.and_then(|c| replace_element(c, &flat, v.clone()));
                    self.write_variable(name, Some(rendered_items), v.to_expression(), updated)
                }
                Rvalue::Runtime(e) => self.write_variable(name, Some(rendered_items), e, None),
                Rvalue::Measured(_) => Err(self.local(
                    DiagnosticKind::TypeMismatch,
                    "measurement results can only be stored in bits",
                )),
            };
        }

        let Some(width) = ty.width().filter(|_| {
            matches!(
                ty,
                ClassicalType::Int(_) | ClassicalType::Uint(_) | ClassicalType::Bit(_)
            )
        }) else {
            return Err(self.local(DiagnosticKind::TypeMismatch, format!("{ty} cannot be indexed")));
        };
        let [item] = items else {
            return Err(self.local(
                DiagnosticKind::TypeMismatch,
                format!("`{name}` takes exactly one index"),
            ));
        };
        let positions = self.index_positions(item, width)?;
        let element = ClassicalType::Bit(positions.len() as u32);
        self.check_initializer(&element, rhs)?;
        let rendered_items = literal_items(std::slice::from_ref(&positions), items);
        match self.rvalue(rhs)? {
            Rvalue::Measured(qubits) => {
                let target = Expression::Index {
                    base: Box::new(Expression::Identifier(name.to_string())),
                    items: rendered_items,
                };
                self.measure_into(&qubits, &target)
            }
            Rvalue::Known(v) => {
                let bits = self.coerce_to(&element, v)?;
                let updated = match (current.as_ref().and_then(Value::as_i64), bits.as_i64()) {
                    (Some(old), Some(bits)) => match set_bits(old, &positions, bits) {
                        Some(v) => Some(self.coerce_to(&ty, Value::Int(v))?),
                        None => None,
                    },
                    _ => None,
                };
                self.write_variable(name, Some(rendered_items), bits.to_expression(), updated)
            }
            Rvalue::Runtime(e) => self.write_variable(name, Some(rendered_items), e, None),
        }
    }

    fn expression_statement(&mut self, expr: &Expression) -> SemResult<()> {
        match expr.unparen() {
            Expression::FnCall { name, args } if self.is_subroutine(name) => {
                if let CallResult::Measure(qubits) = self.call_subroutine(name, args)? {
                    self.measure_discard(&qubits);
                }
                Ok(())
            }
            Expression::Measure(operand) => self.measure(operand, None),
            other => self.fold(other).map(drop),
        }
    }

    // ---- control flow ----

    fn analyze_if(
        &mut self,
        condition: &Expression,
        then_body: &[Statement],
        else_body: &[Statement],
    ) -> SemResult<Signal> {
        let Some(value) = self.fold(condition)? else {
            return self.runtime_branch(condition, then_body, else_body);
        };
        let taken = value.truthy().ok_or_else(|| {
            self.local(
                DiagnosticKind::TypeMismatch,
                format!("condition must be boolean, found {value}"),
            )
        })?;
        trace!(taken, "branch folded");
        let body = if taken { then_body } else { else_body };
        self.scoped(ScopeKind::Block, |a| a.analyze_block(body))
    }

    fn runtime_branch(
        &mut self,
        condition: &Expression,
        then_body: &[Statement],
        else_body: &[Statement],
    ) -> SemResult<Signal> {
        let residual = self.residualize(condition)?;
        let clbits = self.condition_clbits(condition);
        self.materialize_targets(then_body)?;
        self.materialize_targets(else_body)?;

        let outer = std::mem::take(&mut self.sink);
        let then_result = self.runtime_body(then_body);
        let then_ops = std::mem::take(&mut self.sink);
        let else_result = match then_result {
            Ok(_) => self.runtime_body(else_body),
            Err(e) => Err(e),
        };
        let else_ops = std::mem::replace(&mut self.sink, outer);
        else_result?;

        self.sink.push(FlatStatement::Branch {
            condition: residual,
            clbits,
            then_body: then_ops,
            else_body: else_ops,
        });
        Ok(Signal::Normal)
    }

    fn runtime_body(&mut self, body: &[Statement]) -> SemResult<Signal> {
        let floor = self.scopes.enter(ScopeKind::Block);
        let saved = self.runtime_floor.replace(floor);
        let result = self.analyze_block(body);
        self.runtime_floor = saved;
        self.scopes.exit();
        result
    }

    /// Clbits a runtime condition reads.
    fn condition_clbits(&self, expr: &Expression) -> Vec<ClbitId> {
        let mut out = Vec::new();
        self.collect_clbits(expr, &mut out);
        let mut seen = FxHashSet::default();
        out.retain(|c| seen.insert(*c));
        out
    }

    fn collect_clbits(&self, expr: &Expression, out: &mut Vec<ClbitId>) {
        match expr {
            Expression::Identifier(name) => {
                if let Some(Binding::Clbits(view)) = self.scopes.resolve(name).map(|s| &s.binding) {
                    out.extend(self.resources.clbits(view));
                }
            }
            Expression::Index { base, .. } => self.collect_clbits(base, out),
            Expression::Unary { operand, .. }
            | Expression::Cast { operand, .. }
            | Expression::Paren(operand) => self.collect_clbits(operand, out),
            Expression::BinOp { left, right, .. } => {
                self.collect_clbits(left, out);
                self.collect_clbits(right, out);
            }
            Expression::FnCall { args, .. } | Expression::Array(args) => {
                for arg in args {
                    self.collect_clbits(arg, out);
                }
            }
            _ => {}
        }
    }

    /// Give every plain variable assigned in `body` an emitted name before a
    /// runtime branch, so its pre-branch value is emitted outside the branch.
    fn materialize_targets(&mut self, body: &[Statement]) -> SemResult<()> {
        for stmt in body {
            match &stmt.kind {
                StmtKind::Assignment { target, .. } => {
                    let Some(root) = target.root_name() else { continue };
                    let needs_name = self.scopes.resolve(root).is_some_and(|s| {
                        s.kind == SymbolKind::ClassicalVariable && s.mutable && s.emit_name.is_none()
                    });
                    if needs_name {
                        self.materialize(root)?;
                    }
                }
                StmtKind::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    self.materialize_targets(then_body)?;
                    if let Some(else_body) = else_body {
                        self.materialize_targets(else_body)?;
                    }
                }
                StmtKind::For { body, .. } | StmtKind::While { body, .. } | StmtKind::Block(body) => {
                    self.materialize_targets(body)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn loop_control(&mut self, signal: Signal, keyword: &str) -> SemResult<Signal> {
        let Some(loop_scope) = self.loop_scope else {
            return Err(self.local(
                DiagnosticKind::Unsupported,
                format!("`{keyword}` outside a loop"),
            ));
        };
        if self.runtime_floor.is_some_and(|floor| floor > loop_scope) {
            return Err(self.local(
                DiagnosticKind::Unsupported,
                format!("`{keyword}` under a runtime condition cannot be unrolled"),
            ));
        }
        Ok(signal)
    }

    fn analyze_return(&mut self, value: Option<&Expression>) -> SemResult<Signal> {
        let Some(call_scope) = self.call_scope else {
            return Err(self.local(
                DiagnosticKind::Unsupported,
                "`return` outside a subroutine",
            ));
        };
        if self.runtime_floor.is_some_and(|floor| floor > call_scope) {
            return Err(self.local(
                DiagnosticKind::Unsupported,
                "`return` under a runtime condition is not supported",
            ));
        }
        let result = match value {
            None => CallResult::Void,
            Some(expr) => match self.rvalue(expr)? {
                Rvalue::Known(v) => CallResult::Value(v),
                Rvalue::Runtime(e) => CallResult::Runtime(e),
                Rvalue::Measured(qubits) => CallResult::Measure(qubits),
            },
        };
        Ok(Signal::Return(result))
    }

    // ---- subroutines ----

    /// Inline a subroutine call at the current position.
    pub(crate) fn call_subroutine(&mut self, name: &str, args: &[Expression]) -> SemResult<CallResult> {
        let def = match self.scopes.resolve(name).map(|s| &s.binding) {
            Some(Binding::Subroutine(def)) => Arc::clone(def),
            _ => {
                return Err(self.local(
                    DiagnosticKind::UndefinedSymbol,
                    format!("undefined subroutine `{name}`"),
                ));
            }
        };
        if self.call_stack.iter().any(|n| n == name) {
            return Err(self.structural(
                DiagnosticKind::Unsupported,
                format!("recursive call to `{name}`"),
            ));
        }
        if args.len() != def.params.len() {
            return Err(self.local(
                DiagnosticKind::ArityMismatch,
                format!(
                    "`{name}` takes {} arguments, found {}",
                    def.params.len(),
                    args.len()
                ),
            ));
        }

        let bindings = self.bind_arguments(&def, args)?;
        debug!(name, depth = self.call_stack.len(), "inlining subroutine");

        let scope = self.scopes.enter(ScopeKind::SubroutineBody);
        self.call_stack.push(name.to_string());
        let saved_loop = self.loop_scope.take();
        let saved_call = self.call_scope.replace(scope);
        let result = self.run_body(bindings, &def.body);
        self.call_scope = saved_call;
        self.loop_scope = saved_loop;
        self.call_stack.pop();
        self.scopes.exit();

        let returned = match result {
            Ok(Signal::Return(r)) => r,
            Ok(_) => CallResult::Void,
            Err(SemError::Aborted) if !self.halted => return Err(SemError::Dropped),
            Err(e) => return Err(e),
        };
        self.check_return(&def, returned)
    }

    fn run_body(&mut self, bindings: Vec<Symbol>, body: &[Statement]) -> SemResult<Signal> {
        for symbol in bindings {
            self.declare_symbol(symbol)?;
        }
        self.analyze_block(body)
    }

    /// Evaluate actual arguments in the caller's scope.
    fn bind_arguments(&mut self, def: &SubroutineDef, args: &[Expression]) -> SemResult<Vec<Symbol>> {
        let mut bindings = Vec::with_capacity(args.len());
        let mut seen = FxHashSet::default();
        for (param, arg) in def.params.iter().zip(args) {
            match param {
                Param::Qubit { name: formal, size } => {
                    let view = self.quantum_view(arg)?;
                    let expected = match size {
                        Some(e) => self.resolve_width(e)?,
                        None => 1,
                    };
                    if view.len() != expected {
                        return Err(self.local(
                            DiagnosticKind::ArityMismatch,
                            format!(
                                "argument `{formal}` of `{}` expects {expected} qubits, found {}",
                                def.name,
                                view.len()
                            ),
                        ));
                    }
                    for q in self.resources.qubits(&view) {
                        if !seen.insert(q) {
                            return Err(self.local(
                                DiagnosticKind::ResourceMisuse,
                                format!(
                                    "qubit {} is passed to `{}` more than once",
                                    self.qubit_label(q),
                                    def.name
                                ),
                            ));
                        }
                    }
                    let mut symbol = Symbol::new(formal, SymbolKind::Alias, self.span)
                        .with_binding(Binding::Qubits(view));
                    symbol.size = Some(expected);
                    bindings.push(symbol);
                }
                Param::Classical { ty, name: formal } => {
                    let ty = self.resolve_type(ty)?;
                    self.check_initializer(&ty, arg)?;
                    let symbol = match self.rvalue(arg)? {
                        Rvalue::Known(v) => {
                            let v = self.coerce_to(&ty, v)?;
                            Symbol::new(formal, SymbolKind::ClassicalVariable, self.span)
                                .with_type(ty)
                                .with_value(Some(v))
                                .mutable()
                        }
                        Rvalue::Runtime(e) => self.runtime_argument(formal, ty, arg, e)?,
                        Rvalue::Measured(_) => {
                            return Err(self.local(
                                DiagnosticKind::Unsupported,
                                format!("measurement passed as argument `{formal}`"),
                            ));
                        }
                    };
                    bindings.push(symbol);
                }
            }
        }
        Ok(bindings)
    }

    /// Bind a runtime-valued argument. Plain names are passed by reference
    /// and become read-only; anything else is copied into a fresh variable.
    fn runtime_argument(
        &mut self,
        formal: &str,
        ty: ClassicalType,
        arg: &Expression,
        residual: Expression,
    ) -> SemResult<Symbol> {
        if let Expression::Identifier(source) = arg.unparen() {
            let emit = self.runtime_name(source)?;
            let (kind, binding) = match self.scopes.resolve(source) {
                Some(s) => (s.kind, s.binding.clone()),
                None => (SymbolKind::ClassicalVariable, Binding::None),
            };
            let mut symbol = Symbol::new(formal, kind, self.span)
                .with_type(ty)
                .with_binding(binding);
            symbol.emit_name = Some(emit);
            return Ok(symbol);
        }
        let emit = self.hoist(formal, ty.clone())?;
        self.sink.push(FlatStatement::Assign {
            target: Expression::Identifier(emit.clone()),
            value: residual,
        });
        let mut symbol = Symbol::new(formal, SymbolKind::ClassicalVariable, self.span)
            .with_type(ty)
            .mutable();
        symbol.emit_name = Some(emit);
        Ok(symbol)
    }

    fn check_return(&mut self, def: &SubroutineDef, returned: CallResult) -> SemResult<CallResult> {
        let name = &def.name;
        let Some(spec) = &def.return_type else {
            return match returned {
                CallResult::Void => Ok(CallResult::Void),
                _ => Err(self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("subroutine `{name}` has no return type but returns a value"),
                )),
            };
        };
        let ty = self.resolve_type(spec)?;
        match returned {
            CallResult::Void => Err(self.local(
                DiagnosticKind::TypeMismatch,
                format!("subroutine `{name}` must return {ty}"),
            )),
            CallResult::Value(v) => {
                check_assignable(&ty, &v.type_of()).map_err(|msg| {
                    self.local(
                        DiagnosticKind::TypeMismatch,
                        format!("`{name}` returns {ty}: {msg}"),
                    )
                })?;
                Ok(CallResult::Value(self.coerce_to(&ty, v)?))
            }
            CallResult::Measure(qubits) => match ty {
                ClassicalType::Bit(n) if n as usize == qubits.len() => Ok(CallResult::Measure(qubits)),
                ty => Err(self.local(
                    DiagnosticKind::TypeMismatch,
                    format!(
                        "`{name}` returns {ty} but measures {} qubits",
                        qubits.len()
                    ),
                )),
            },
            CallResult::Runtime(e) => Ok(CallResult::Runtime(e)),
        }
    }

    /// `name[i]` form of a physical qubit for messages.
    pub(crate) fn qubit_label(&self, qubit: QubitId) -> String {
        self.resources
            .registers(ResourceKind::Quantum)
            .find(|r| qubit.0 >= r.base && qubit.0 < r.base + r.size)
            .map_or_else(
                || format!("#{}", qubit.0),
                |r| format!("{}[{}]", r.name, qubit.0 - r.base),
            )
    }
}

/// Index items with every position folded to a literal.
fn literal_items(positions: &[Vec<u32>], items: &[IndexItem]) -> Vec<IndexItem> {
    positions
        .iter()
        .zip(items)
        .map(|(pos, item)| match (pos.as_slice(), item) {
            ([single], IndexItem::Single(_)) => IndexItem::Single(Expression::Int(u64::from(*single))),
            _ => IndexItem::Set(pos.iter().map(|&p| Expression::Int(u64::from(p))).collect()),
        })
        .collect()
}

/// Overwrite the bits at `positions`; the first position takes the most
/// significant bit of `bits`.
///
/// `None` when a position reaches past 64 bits.
fn set_bits(value: i64, positions: &[u32], bits: i64) -> Option<i64> {
    positions.iter().rev().enumerate().try_fold(value, |acc, (k, &p)| {
        let bit = bits.checked_shr(u32::try_from(k).ok()?).unwrap_or(0) & 1;
        let mask = 1i64.checked_shl(p)?;
        Some((acc & !mask) | (bit << p))
    })
}

fn replace_element(value: Value, path: &[usize], element: Value) -> Option<Value> {
    let Some((&first, rest)) = path.split_first() else {
        return Some(element);
    };
    let Value::Array(mut items) = value else {
        return None;
    };
    let slot = items.get_mut(first)?;
    let inner = std::mem::replace(slot, Value::Bool(false));
    *slot = replace_element(inner, rest, element)?;
    Some(Value::Array(items))
}
