//! qfold elementary-operation IR
//!
//! This crate holds the data structures the semantic analyzer flattens a
//! program into: physical qubit/clbit ids, gate parameters, the builtin gate
//! table, elementary instructions, and the dependency DAG used for depth.
//!
//! # Core Components
//!
//! - **Ids**: [`QubitId`], [`ClbitId`] index the flat physical numbering across
//!   all declared registers; [`Qubit`]/[`Clbit`] remember the declaring slot
//! - **Gates**: [`BUILTIN_GATES`] is the read-only builtin table;
//!   [`Gate`] is a builtin or external gate plus its control modifiers
//! - **Parameters**: [`ParameterExpression`] folded or symbolic angles
//! - **Instructions**: [`Instruction`] combining a gate, measure, reset or
//!   barrier with its operands
//! - **DAG**: [`CircuitDag`] for depth computation
//! - **Unitary**: [`unitary`] numeric primitive (unitary check, fractional
//!   powers, ZYZ decomposition)
//!
//! # Example
//!
//! ```rust
//! use qfold_ir::{CircuitDag, ClbitId, ControlState, Gate, Instruction, QubitId};
//!
//! let mut dag = CircuitDag::new();
//! for q in 0..2 {
//!     dag.add_qubit(QubitId(q));
//!     dag.add_clbit(ClbitId(q));
//! }
//!
//! let h = Gate::builtin("h", vec![]).unwrap();
//! let cx = Gate::builtin("x", vec![]).unwrap().controlled(ControlState::Positive);
//! dag.apply(Instruction::gate(h, [QubitId(0)]).unwrap()).unwrap();
//! dag.apply(Instruction::gate(cx, [QubitId(0), QubitId(1)]).unwrap()).unwrap();
//! dag.apply(Instruction::measure(QubitId(1), ClbitId(1))).unwrap();
//!
//! assert_eq!(dag.depth(), 3);
//! ```
//!
//! # Builtin Gates
//!
//! | Gates | Qubits | Inverse |
//! |-------|--------|---------|
//! | `id`, `x`, `y`, `z`, `h` | 1 | self |
//! | `s`/`sdg`, `t`/`tdg`, `sx`/`sxdg` | 1 | partner |
//! | `rx`, `ry`, `rz`, `p`, `phase`, `u1` | 1 | negated angle |
//! | `U`, `u`, `u3`, `u2` | 1 | `(-θ, -λ, -φ)` |
//! | `CX`, `cx`, `cy`, `cz`, `ch`, `swap` | 2 | self |
//! | `cp`, `cphase`, `crx`, `cry`, `crz`, `rxx`, `ryy`, `rzz` | 2 | negated angle |
//! | `cu` | 2 | `(-θ, -λ, -φ, -γ)` |
//! | `ccx`, `cswap` | 3 | self |

pub mod dag;
pub mod error;
pub mod gate;
pub mod instruction;
pub mod parameter;
pub mod qubit;
pub mod unitary;

pub use dag::{CircuitDag, DagEdge, DagNode, NodeIndex, WireId};
pub use error::{IrError, IrResult};
pub use gate::{
    BUILTIN_GATES, BuiltinGate, BuiltinId, ControlState, Gate, GateKind, InverseRule, OpaqueGate,
    builtin_gate,
};
pub use instruction::{Instruction, InstructionKind};
pub use parameter::ParameterExpression;
pub use qubit::{Clbit, ClbitId, Qubit, QubitId};
pub use unitary::Unitary2x2;
