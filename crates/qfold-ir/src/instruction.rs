//! Elementary operations with their operands.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::gate::Gate;
use crate::qubit::{ClbitId, QubitId};

/// The kind of elementary operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// A gate application.
    Gate(Gate),
    /// Measure each qubit into the matching clbit.
    Measure,
    /// Reset qubit to |0⟩.
    Reset,
    /// Barrier (synchronization point).
    Barrier,
}

/// An elementary operation: the atomic unit of the flattened program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The kind of operation.
    pub kind: InstructionKind,
    /// Qubit operands; for gates, controls come first.
    pub qubits: Vec<QubitId>,
    /// Classical bit operands (for measure).
    pub clbits: Vec<ClbitId>,
}

impl Instruction {
    /// Create a gate instruction, checking arity and operand uniqueness.
    pub fn gate(gate: Gate, qubits: impl IntoIterator<Item = QubitId>) -> IrResult<Self> {
        let qubits: Vec<_> = qubits.into_iter().collect();
        let expected = gate.num_qubits();
        let got = u32::try_from(qubits.len()).unwrap_or(u32::MAX);
        if expected != got {
            return Err(IrError::QubitCountMismatch {
                gate_name: gate.name().to_string(),
                expected,
                got,
            });
        }
        let instruction = Self {
            kind: InstructionKind::Gate(gate),
            qubits,
            clbits: vec![],
        };
        instruction.check_distinct()?;
        Ok(instruction)
    }

    /// Create a measurement of `qubit` into `clbit`.
    pub fn measure(qubit: QubitId, clbit: ClbitId) -> Self {
        Self {
            kind: InstructionKind::Measure,
            qubits: vec![qubit],
            clbits: vec![clbit],
        }
    }

    /// Create a measurement whose result is discarded (`measure q;`).
    pub fn measure_discard(qubit: QubitId) -> Self {
        Self {
            kind: InstructionKind::Measure,
            qubits: vec![qubit],
            clbits: vec![],
        }
    }

    /// Create a reset instruction.
    pub fn reset(qubit: QubitId) -> Self {
        Self {
            kind: InstructionKind::Reset,
            qubits: vec![qubit],
            clbits: vec![],
        }
    }

    /// Create a barrier instruction.
    pub fn barrier(qubits: impl IntoIterator<Item = QubitId>) -> Self {
        Self {
            kind: InstructionKind::Barrier,
            qubits: qubits.into_iter().collect(),
            clbits: vec![],
        }
    }

    /// Fail with [`IrError::DuplicateQubit`] if a qubit appears twice.
    pub fn check_distinct(&self) -> IrResult<()> {
        let mut seen = FxHashSet::default();
        for &qubit in &self.qubits {
            if !seen.insert(qubit) {
                return Err(IrError::DuplicateQubit {
                    qubit,
                    gate_name: self.as_gate().map(|g| g.name().to_string()),
                });
            }
        }
        Ok(())
    }

    /// Get the gate, if this is a gate instruction.
    pub fn as_gate(&self) -> Option<&Gate> {
        match &self.kind {
            InstructionKind::Gate(g) => Some(g),
            _ => None,
        }
    }

    /// Operation name as it appears in source (`h`, `measure`, ...).
    pub fn name(&self) -> &str {
        match &self.kind {
            InstructionKind::Gate(g) => g.name(),
            InstructionKind::Measure => "measure",
            InstructionKind::Reset => "reset",
            InstructionKind::Barrier => "barrier",
        }
    }

    /// Check if this is a gate instruction.
    pub fn is_gate(&self) -> bool {
        matches!(self.kind, InstructionKind::Gate(_))
    }

    /// Check if this is a measurement.
    pub fn is_measure(&self) -> bool {
        matches!(self.kind, InstructionKind::Measure)
    }

    /// Check if this is a reset.
    pub fn is_reset(&self) -> bool {
        matches!(self.kind, InstructionKind::Reset)
    }

    /// Check if this is a barrier.
    pub fn is_barrier(&self) -> bool {
        matches!(self.kind, InstructionKind::Barrier)
    }

    /// Copy with every qubit operand passed through `map`.
    pub fn map_qubits(&self, mut map: impl FnMut(QubitId) -> QubitId) -> Self {
        Self {
            kind: self.kind.clone(),
            qubits: self.qubits.iter().map(|&q| map(q)).collect(),
            clbits: self.clbits.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ControlState;

    #[test]
    fn test_gate_arity_checked() {
        let cx = Gate::builtin("cx", vec![]).unwrap();
        assert!(Instruction::gate(cx.clone(), [QubitId(0), QubitId(1)]).is_ok());
        assert!(matches!(
            Instruction::gate(cx, [QubitId(0)]),
            Err(IrError::QubitCountMismatch { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_operands_rejected() {
        let x = Gate::builtin("x", vec![]).unwrap().controlled(ControlState::Positive);
        let err = Instruction::gate(x, [QubitId(1), QubitId(1)]).unwrap_err();
        assert!(matches!(err, IrError::DuplicateQubit { qubit: QubitId(1), .. }));
    }

    #[test]
    fn test_predicates() {
        let m = Instruction::measure(QubitId(0), ClbitId(0));
        assert!(m.is_measure());
        assert_eq!(m.name(), "measure");
        assert!(Instruction::barrier([QubitId(0), QubitId(1)]).is_barrier());
        assert!(Instruction::reset(QubitId(2)).is_reset());
    }

    #[test]
    fn test_map_qubits() {
        let h = Instruction::gate(Gate::builtin("h", vec![]).unwrap(), [QubitId(0)]).unwrap();
        let moved = h.map_qubits(|q| QubitId(q.0 + 3));
        assert_eq!(moved.qubits, vec![QubitId(3)]);
        assert_eq!(moved.name(), "h");
    }
}
