//! The analyzed program: a flat statement sequence plus the tables needed to
//! query and re-emit it.

use std::collections::BTreeMap;

use qfold_ir::{CircuitDag, ClbitId, Gate, Instruction, QubitId};
use qfold_qasm3::{Expression, GateDef, IoModifier};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::diagnostic::{Diagnostic, Severity};
use crate::scope::Symbol;
use crate::types::ClassicalType;

/// A statement that survives flattening.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatStatement {
    /// An elementary operation.
    Op(Instruction),
    /// A classical assignment to a runtime-valued variable or bit register.
    Assign { target: Expression, value: Expression },
    /// A branch whose condition is only known at runtime.
    Branch {
        condition: Expression,
        /// Clbits the condition reads.
        clbits: Vec<ClbitId>,
        then_body: Vec<FlatStatement>,
        else_body: Vec<FlatStatement>,
    },
    /// `#pragma` text, passed through.
    Pragma(String),
}

impl FlatStatement {
    fn retain_ops(body: &[FlatStatement], keep: &impl Fn(&Instruction) -> bool) -> Vec<FlatStatement> {
        body.iter()
            .filter_map(|stmt| match stmt {
                FlatStatement::Op(inst) if !keep(inst) => None,
                FlatStatement::Branch {
                    condition,
                    clbits,
                    then_body,
                    else_body,
                } => Some(FlatStatement::Branch {
                    condition: condition.clone(),
                    clbits: clbits.clone(),
                    then_body: Self::retain_ops(then_body, keep),
                    else_body: Self::retain_ops(else_body, keep),
                }),
                other => Some(other.clone()),
            })
            .collect()
    }

    fn map_ops(
        body: &[FlatStatement],
        map: &impl Fn(&Instruction) -> Option<Instruction>,
    ) -> Vec<FlatStatement> {
        body.iter()
            .filter_map(|stmt| match stmt {
                FlatStatement::Op(inst) => map(inst).map(FlatStatement::Op),
                FlatStatement::Branch {
                    condition,
                    clbits,
                    then_body,
                    else_body,
                } => Some(FlatStatement::Branch {
                    condition: condition.clone(),
                    clbits: clbits.clone(),
                    then_body: Self::map_ops(then_body, map),
                    else_body: Self::map_ops(else_body, map),
                }),
                other => Some(other.clone()),
            })
            .collect()
    }
}

/// A declared register in the flat numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterInfo {
    pub name: String,
    pub size: u32,
    /// First physical index.
    pub base: u32,
}

impl RegisterInfo {
    fn contains(&self, index: u32) -> bool {
        index >= self.base && index < self.base + self.size
    }
}

/// A classical variable that stays in the emitted program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub ty: ClassicalType,
    pub io: Option<IoModifier>,
}

/// Result of analysis.
///
/// A module is never mutated after analysis; the transformations below return
/// new modules.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) version: Option<String>,
    pub(crate) statements: Vec<FlatStatement>,
    pub(crate) qregs: Vec<RegisterInfo>,
    pub(crate) cregs: Vec<RegisterInfo>,
    pub(crate) declarations: Vec<Declaration>,
    pub(crate) external_gates: Vec<GateDef>,
    pub(crate) globals: Vec<Symbol>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) fatal_severity: Severity,
    /// Whether re-emitted source starts with `include "stdgates.inc";`.
    pub(crate) includes_stdgates: bool,
}

impl Module {
    /// `OPENQASM` version as written, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Declared qubits across all registers.
    pub fn num_qubits(&self) -> u32 {
        self.qregs.iter().map(|r| r.size).sum()
    }

    /// Declared clbits across all registers.
    pub fn num_clbits(&self) -> u32 {
        self.cregs.iter().map(|r| r.size).sum()
    }

    /// Qubits referenced by at least one operation other than a barrier.
    pub fn used_qubits(&self) -> u32 {
        let used: FxHashSet<QubitId> = self
            .operations()
            .filter(|op| !op.is_barrier())
            .flat_map(|op| op.qubits.iter().copied())
            .collect();
        u32::try_from(used.len()).unwrap_or(u32::MAX)
    }

    /// Number of top-level flat statements.
    pub fn num_statements(&self) -> usize {
        self.statements.len()
    }

    /// The top-level flat statements.
    pub fn statements(&self) -> &[FlatStatement] {
        &self.statements
    }

    /// Quantum registers in declaration order.
    pub fn qubit_registers(&self) -> &[RegisterInfo] {
        &self.qregs
    }

    /// Classical bit registers in declaration order.
    pub fn clbit_registers(&self) -> &[RegisterInfo] {
        &self.cregs
    }

    /// Classical variables kept in the emitted program.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Elementary operations in program order, descending into runtime
    /// branches (then-branch first). Each call starts a fresh pass.
    pub fn operations(&self) -> Operations<'_> {
        Operations {
            stack: vec![self.statements.iter()],
        }
    }

    /// Longest dependency chain over the elementary operations.
    pub fn depth(&self) -> usize {
        let mut dag = CircuitDag::new();
        for q in 0..self.num_qubits() {
            dag.add_qubit(QubitId(q));
        }
        for c in 0..self.num_clbits() {
            dag.add_clbit(ClbitId(c));
        }
        Self::add_to_dag(&mut dag, &self.statements, &[]);
        dag.depth()
    }

    fn add_to_dag(dag: &mut CircuitDag, body: &[FlatStatement], condition: &[ClbitId]) {
        for stmt in body {
            match stmt {
                FlatStatement::Op(inst) => {
                    if let Err(err) = dag.apply_conditioned(inst.clone(), condition) {
                        warn!(%err, "operation skipped in depth computation");
                    }
                }
                FlatStatement::Branch {
                    clbits,
                    then_body,
                    else_body,
                    ..
                } => {
                    let mut nested = condition.to_vec();
                    nested.extend(clbits.iter().filter(|c| !condition.contains(*c)));
                    Self::add_to_dag(dag, then_body, &nested);
                    Self::add_to_dag(dag, else_body, &nested);
                }
                FlatStatement::Assign { .. } | FlatStatement::Pragma(_) => {}
            }
        }
    }

    /// Histogram of operation names; controlled gates are keyed with their
    /// modifiers, e.g. `ctrl @ x`.
    pub fn gate_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for op in self.operations() {
            let key = match op.as_gate() {
                Some(gate) => {
                    let mut key = String::new();
                    for state in &gate.controls {
                        key.push_str(state.keyword());
                        key.push_str(" @ ");
                    }
                    key.push_str(gate.name());
                    key
                }
                None => op.name().to_string(),
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    /// Check if any operation is a measurement.
    pub fn has_measurements(&self) -> bool {
        self.operations().any(Instruction::is_measure)
    }

    /// Check if any operation is a barrier.
    pub fn has_barriers(&self) -> bool {
        self.operations().any(Instruction::is_barrier)
    }

    /// Global symbol by name. Builtin gates are not listed.
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.globals.iter().find(|s| s.name == name)
    }

    /// Global symbols in declaration order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.globals
    }

    /// All diagnostics in the order they were reported.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Check if any diagnostic reaches the configured fatal severity.
    pub fn has_fatal_errors(&self) -> bool {
        self.fatal_diagnostics().next().is_some()
    }

    /// Diagnostics at or above the fatal severity threshold.
    pub fn fatal_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.severity >= self.fatal_severity)
    }

    /// Diagnostics as a JSON array.
    pub fn diagnostics_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.diagnostics)
    }

    fn with_statements(&self, statements: Vec<FlatStatement>) -> Self {
        Self {
            statements,
            ..self.clone()
        }
    }

    /// Copy without measurements.
    #[must_use]
    pub fn remove_measurements(&self) -> Self {
        self.with_statements(FlatStatement::retain_ops(&self.statements, &|op| {
            !op.is_measure()
        }))
    }

    /// Copy without barriers.
    #[must_use]
    pub fn remove_barriers(&self) -> Self {
        self.with_statements(FlatStatement::retain_ops(&self.statements, &|op| {
            !op.is_barrier()
        }))
    }

    /// Copy with qubit order reversed inside every register.
    #[must_use]
    pub fn reverse_qubit_order(&self) -> Self {
        let qregs = &self.qregs;
        let flip = |q: QubitId| match qregs.iter().find(|r| r.contains(q.0)) {
            Some(r) => QubitId(r.base + (r.size - 1 - (q.0 - r.base))),
            None => q,
        };
        self.with_statements(FlatStatement::map_ops(&self.statements, &|op| {
            Some(op.map_qubits(flip))
        }))
    }

    /// Copy without idle qubits: unused registers are dropped and partially
    /// used ones are compacted. Barriers keep only surviving qubits.
    #[must_use]
    pub fn remove_idle_qubits(&self) -> Self {
        let used: FxHashSet<u32> = self
            .operations()
            .filter(|op| !op.is_barrier())
            .flat_map(|op| op.qubits.iter().map(|q| q.0))
            .collect();

        let mut remap: FxHashMap<u32, u32> = FxHashMap::default();
        let mut qregs = Vec::new();
        let mut next = 0;
        for reg in &self.qregs {
            let kept: Vec<u32> = (reg.base..reg.base + reg.size)
                .filter(|q| used.contains(q))
                .collect();
            if kept.is_empty() {
                continue;
            }
            let base = next;
            for (k, &old) in kept.iter().enumerate() {
                remap.insert(old, base + u32::try_from(k).unwrap_or(u32::MAX));
            }
            let size = u32::try_from(kept.len()).unwrap_or(u32::MAX);
            next += size;
            qregs.push(RegisterInfo {
                name: reg.name.clone(),
                size,
                base,
            });
        }

        let statements = FlatStatement::map_ops(&self.statements, &|op| {
            if op.is_barrier() {
                let qubits: Vec<QubitId> = op
                    .qubits
                    .iter()
                    .filter_map(|q| remap.get(&q.0).map(|&n| QubitId(n)))
                    .collect();
                return (!qubits.is_empty()).then(|| Instruction::barrier(qubits));
            }
            Some(op.map_qubits(|q| QubitId(remap.get(&q.0).copied().unwrap_or(q.0))))
        });

        Self {
            statements,
            qregs,
            ..self.clone()
        }
    }

    /// Copy with an `id` gate appended on every idle qubit, so each declared
    /// qubit is used at least once.
    #[must_use]
    pub fn populate_idle_qubits(&self) -> Self {
        let used: FxHashSet<u32> = self
            .operations()
            .filter(|op| !op.is_barrier())
            .flat_map(|op| op.qubits.iter().map(|q| q.0))
            .collect();
        let Ok(identity) = Gate::builtin("id", vec![]) else {
            return self.clone();
        };

        let mut statements = self.statements.clone();
        statements.extend(
            self.qregs
                .iter()
                .flat_map(|r| r.base..r.base + r.size)
                .filter(|q| !used.contains(q))
                .filter_map(|q| Instruction::gate(identity.clone(), [QubitId(q)]).ok())
                .map(FlatStatement::Op),
        );
        self.with_statements(statements)
    }

    /// Copy whose re-emitted source has no `include` line.
    #[must_use]
    pub fn remove_includes(&self) -> Self {
        Self {
            includes_stdgates: false,
            ..self.clone()
        }
    }

    /// Whether re-emitted source includes the standard gate library.
    pub fn includes_stdgates(&self) -> bool {
        self.includes_stdgates
    }

    /// Register and offset of a physical qubit.
    pub fn qubit_location(&self, qubit: QubitId) -> Option<(&str, u32)> {
        self.qregs
            .iter()
            .find(|r| r.contains(qubit.0))
            .map(|r| (r.name.as_str(), qubit.0 - r.base))
    }

    /// Register and offset of a physical clbit.
    pub fn clbit_location(&self, clbit: ClbitId) -> Option<(&str, u32)> {
        self.cregs
            .iter()
            .find(|r| r.contains(clbit.0))
            .map(|r| (r.name.as_str(), clbit.0 - r.base))
    }
}

/// Lazy iterator over a module's elementary operations.
#[derive(Debug, Clone)]
pub struct Operations<'a> {
    stack: Vec<std::slice::Iter<'a, FlatStatement>>,
}

impl<'a> Iterator for Operations<'a> {
    type Item = &'a Instruction;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(FlatStatement::Op(inst)) => return Some(inst),
                Some(FlatStatement::Branch {
                    then_body,
                    else_body,
                    ..
                }) => {
                    self.stack.push(else_body.iter());
                    self.stack.push(then_body.iter());
                }
                Some(_) => {}
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
