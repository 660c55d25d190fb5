//! Gate types and the builtin gate table.
//!
//! The builtin table is process-wide read-only data. Each entry records the
//! gate's arity, how it inverts, whether fractional powers scale its angle,
//! and (for single-qubit gates) its matrix generator.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{IrError, IrResult};
use crate::parameter::ParameterExpression;
use crate::unitary::Unitary2x2;

/// How a builtin gate is inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InverseRule {
    /// The gate is its own inverse.
    SelfInverse,
    /// The inverse is another parameterless builtin (`s` -> `sdg`).
    Named(&'static str),
    /// Every angle is negated (`rx(θ)` -> `rx(-θ)`).
    NegateParams,
    /// `(θ, φ, λ)` -> `(-θ, -λ, -φ)`.
    EulerSwap,
    /// `u2(φ, λ)` -> `u3(-π/2, -λ, -φ)`.
    U2ToU3,
    /// `cu(θ, φ, λ, γ)` -> `cu(-θ, -λ, -φ, -γ)`.
    ControlledEulerSwap,
}

/// Matrix generator of a single-qubit builtin.
pub type MatrixFn = fn(&[f64]) -> Unitary2x2;

/// A builtin elementary gate.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinGate {
    /// Gate name as written in source.
    pub name: &'static str,
    /// Number of qubit operands.
    pub num_qubits: u32,
    /// Number of classical (angle) parameters.
    pub num_params: usize,
    /// Inversion rule.
    pub inverse: InverseRule,
    /// Single-angle rotation: `pow(k)` scales the angle by `k`.
    pub rotation: bool,
    /// Matrix generator for single-qubit gates.
    pub matrix: Option<MatrixFn>,
}

fn arg(params: &[f64], i: usize) -> f64 {
    params.get(i).copied().unwrap_or(0.0)
}

const fn entry(
    name: &'static str,
    num_qubits: u32,
    num_params: usize,
    inverse: InverseRule,
    rotation: bool,
    matrix: Option<MatrixFn>,
) -> BuiltinGate {
    BuiltinGate {
        name,
        num_qubits,
        num_params,
        inverse,
        rotation,
        matrix,
    }
}

use InverseRule::{
    ControlledEulerSwap, EulerSwap, NegateParams, Named, SelfInverse, U2ToU3,
};

/// Every builtin gate known to the analyzer.
pub static BUILTIN_GATES: &[BuiltinGate] = &[
    entry("U", 1, 3, EulerSwap, false, Some(|p| Unitary2x2::u(arg(p, 0), arg(p, 1), arg(p, 2)))),
    entry("CX", 2, 0, SelfInverse, false, None),
    entry("id", 1, 0, SelfInverse, false, Some(|_| Unitary2x2::identity())),
    entry("x", 1, 0, SelfInverse, false, Some(|_| Unitary2x2::x())),
    entry("y", 1, 0, SelfInverse, false, Some(|_| Unitary2x2::y())),
    entry("z", 1, 0, SelfInverse, false, Some(|_| Unitary2x2::z())),
    entry("h", 1, 0, SelfInverse, false, Some(|_| Unitary2x2::h())),
    entry("s", 1, 0, Named("sdg"), false, Some(|_| Unitary2x2::p(PI / 2.0))),
    entry("sdg", 1, 0, Named("s"), false, Some(|_| Unitary2x2::p(-PI / 2.0))),
    entry("t", 1, 0, Named("tdg"), false, Some(|_| Unitary2x2::p(PI / 4.0))),
    entry("tdg", 1, 0, Named("t"), false, Some(|_| Unitary2x2::p(-PI / 4.0))),
    entry("sx", 1, 0, Named("sxdg"), false, Some(|_| Unitary2x2::sx())),
    entry("sxdg", 1, 0, Named("sx"), false, Some(|_| Unitary2x2::sxdg())),
    entry("rx", 1, 1, NegateParams, true, Some(|p| Unitary2x2::rx(arg(p, 0)))),
    entry("ry", 1, 1, NegateParams, true, Some(|p| Unitary2x2::ry(arg(p, 0)))),
    entry("rz", 1, 1, NegateParams, true, Some(|p| Unitary2x2::rz(arg(p, 0)))),
    entry("p", 1, 1, NegateParams, true, Some(|p| Unitary2x2::p(arg(p, 0)))),
    entry("phase", 1, 1, NegateParams, true, Some(|p| Unitary2x2::p(arg(p, 0)))),
    entry("u1", 1, 1, NegateParams, true, Some(|p| Unitary2x2::p(arg(p, 0)))),
    entry("u2", 1, 2, U2ToU3, false, Some(|p| Unitary2x2::u(PI / 2.0, arg(p, 0), arg(p, 1)))),
    entry("u3", 1, 3, EulerSwap, false, Some(|p| Unitary2x2::u(arg(p, 0), arg(p, 1), arg(p, 2)))),
    entry("u", 1, 3, EulerSwap, false, Some(|p| Unitary2x2::u(arg(p, 0), arg(p, 1), arg(p, 2)))),
    entry("cx", 2, 0, SelfInverse, false, None),
    entry("cy", 2, 0, SelfInverse, false, None),
    entry("cz", 2, 0, SelfInverse, false, None),
    entry("ch", 2, 0, SelfInverse, false, None),
    entry("swap", 2, 0, SelfInverse, false, None),
    entry("cp", 2, 1, NegateParams, true, None),
    entry("cphase", 2, 1, NegateParams, true, None),
    entry("crx", 2, 1, NegateParams, true, None),
    entry("cry", 2, 1, NegateParams, true, None),
    entry("crz", 2, 1, NegateParams, true, None),
    entry("cu", 2, 4, ControlledEulerSwap, false, None),
    entry("rxx", 2, 1, NegateParams, true, None),
    entry("ryy", 2, 1, NegateParams, true, None),
    entry("rzz", 2, 1, NegateParams, true, None),
    entry("ccx", 3, 0, SelfInverse, false, None),
    entry("cswap", 3, 0, SelfInverse, false, None),
];

static BUILTIN_INDEX: LazyLock<FxHashMap<&'static str, BuiltinId>> = LazyLock::new(|| {
    BUILTIN_GATES
        .iter()
        .enumerate()
        .filter_map(|(i, g)| u16::try_from(i).ok().map(|id| (g.name, BuiltinId(id))))
        .collect()
});

/// Handle to an entry of [`BUILTIN_GATES`].
///
/// Only obtainable through a name lookup, so it always indexes a valid entry.
/// Serializes as the gate name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuiltinId(u16);

impl BuiltinId {
    /// Look up a builtin by name.
    pub fn lookup(name: &str) -> Option<Self> {
        BUILTIN_INDEX.get(name).copied()
    }

    /// The table entry.
    pub fn gate(self) -> &'static BuiltinGate {
        &BUILTIN_GATES[usize::from(self.0)]
    }
}

impl TryFrom<String> for BuiltinId {
    type Error = IrError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        BuiltinId::lookup(&name).ok_or(IrError::UnknownGate(name))
    }
}

impl From<BuiltinId> for String {
    fn from(id: BuiltinId) -> Self {
        id.gate().name.to_string()
    }
}

/// Look up a builtin gate by name.
pub fn builtin_gate(name: &str) -> Option<&'static BuiltinGate> {
    BuiltinId::lookup(name).map(BuiltinId::gate)
}

/// A gate that is validated but never expanded (declared external).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueGate {
    /// Gate name.
    pub name: String,
    /// Number of qubit operands.
    pub num_qubits: u32,
    /// Number of classical parameters.
    pub num_params: usize,
}

/// Which gate an elementary operation applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateKind {
    /// A builtin gate.
    Builtin(BuiltinId),
    /// An external gate kept by name.
    Opaque(OpaqueGate),
}

impl GateKind {
    /// Get the gate name.
    pub fn name(&self) -> &str {
        match self {
            GateKind::Builtin(id) => id.gate().name,
            GateKind::Opaque(g) => &g.name,
        }
    }

    /// Number of target qubits (controls excluded).
    pub fn num_qubits(&self) -> u32 {
        match self {
            GateKind::Builtin(id) => id.gate().num_qubits,
            GateKind::Opaque(g) => g.num_qubits,
        }
    }
}

/// Polarity of a control qubit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlState {
    /// Active when the control is |1⟩ (`ctrl`).
    Positive,
    /// Active when the control is |0⟩ (`negctrl`).
    Negative,
}

impl ControlState {
    /// Modifier keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            ControlState::Positive => "ctrl",
            ControlState::Negative => "negctrl",
        }
    }
}

/// An elementary gate: a builtin or external gate plus its control modifiers.
///
/// Operands are laid out as `controls ++ targets`, outermost control first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    /// The base gate.
    pub kind: GateKind,
    /// Classical parameters of the base gate.
    pub params: Vec<ParameterExpression>,
    /// Control modifiers, outermost first.
    pub controls: Vec<ControlState>,
}

impl Gate {
    /// Create a builtin gate, checking the parameter count.
    pub fn builtin(name: &str, params: Vec<ParameterExpression>) -> IrResult<Self> {
        let id = BuiltinId::lookup(name).ok_or_else(|| IrError::UnknownGate(name.to_string()))?;
        let expected = id.gate().num_params;
        if params.len() != expected {
            return Err(IrError::ParameterCountMismatch {
                gate_name: name.to_string(),
                expected,
                got: params.len(),
            });
        }
        Ok(Self {
            kind: GateKind::Builtin(id),
            params,
            controls: Vec::new(),
        })
    }

    /// Create an external gate.
    pub fn opaque(gate: OpaqueGate, params: Vec<ParameterExpression>) -> Self {
        Self {
            kind: GateKind::Opaque(gate),
            params,
            controls: Vec::new(),
        }
    }

    /// Get the base gate name.
    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// Total operand count including controls.
    pub fn num_qubits(&self) -> u32 {
        self.kind.num_qubits() + self.num_controls()
    }

    /// Number of control qubits.
    pub fn num_controls(&self) -> u32 {
        u32::try_from(self.controls.len()).unwrap_or(u32::MAX)
    }

    /// The builtin table entry, if this is a builtin gate.
    pub fn builtin_entry(&self) -> Option<&'static BuiltinGate> {
        match &self.kind {
            GateKind::Builtin(id) => Some(id.gate()),
            GateKind::Opaque(_) => None,
        }
    }

    /// Wrap in one more control; the new control becomes the first operand.
    pub fn controlled(mut self, state: ControlState) -> Self {
        self.controls.insert(0, state);
        self
    }

    /// The inverse gate, or `None` for external gates.
    pub fn inverse(&self) -> Option<Self> {
        let entry = self.builtin_entry()?;
        let (name, params) = match entry.inverse {
            InverseRule::SelfInverse => (entry.name, self.params.clone()),
            InverseRule::Named(other) => (other, self.params.clone()),
            InverseRule::NegateParams => (
                entry.name,
                self.params.iter().map(ParameterExpression::negated).collect(),
            ),
            InverseRule::EulerSwap => {
                let [theta, phi, lambda] = self.params.as_slice() else {
                    return None;
                };
                (
                    entry.name,
                    vec![theta.negated(), lambda.negated(), phi.negated()],
                )
            }
            InverseRule::U2ToU3 => {
                let [phi, lambda] = self.params.as_slice() else {
                    return None;
                };
                (
                    "u3",
                    vec![
                        ParameterExpression::Constant(-PI / 2.0),
                        lambda.negated(),
                        phi.negated(),
                    ],
                )
            }
            InverseRule::ControlledEulerSwap => {
                let [theta, phi, lambda, gamma] = self.params.as_slice() else {
                    return None;
                };
                (
                    entry.name,
                    vec![
                        theta.negated(),
                        lambda.negated(),
                        phi.negated(),
                        gamma.negated(),
                    ],
                )
            }
        };
        let mut inverted = Gate::builtin(name, params).ok()?;
        inverted.controls.clone_from(&self.controls);
        Some(inverted)
    }

    /// Raise a rotation gate to a real power by scaling its angle.
    ///
    /// Returns `None` when the gate is not a single-angle rotation.
    pub fn scaled_rotation(&self, exponent: f64) -> Option<Self> {
        let entry = self.builtin_entry()?;
        if !entry.rotation {
            return None;
        }
        let mut scaled = self.clone();
        scaled.params = self.params.iter().map(|p| p.scaled(exponent)).collect();
        Some(scaled)
    }

    /// The 2x2 matrix of an uncontrolled single-qubit builtin with constant
    /// parameters.
    pub fn matrix(&self) -> Option<Unitary2x2> {
        if !self.controls.is_empty() {
            return None;
        }
        let generator = self.builtin_entry()?.matrix?;
        let values = self
            .params
            .iter()
            .map(ParameterExpression::as_f64)
            .collect::<Option<Vec<_>>>()?;
        Some(generator(&values))
    }
}

impl fmt::Display for Gate {
    /// Renders modifiers, name and parameters: `ctrl(2) @ negctrl @ rx(0.5)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut i = 0;
        while i < self.controls.len() {
            let state = self.controls[i];
            let run = self.controls[i..]
                .iter()
                .take_while(|&&s| s == state)
                .count();
            if run == 1 {
                write!(f, "{} @ ", state.keyword())?;
            } else {
                write!(f, "{}({run}) @ ", state.keyword())?;
            }
            i += run;
        }
        write!(f, "{}", self.name())?;
        if !self.params.is_empty() {
            write!(f, "(")?;
            for (k, p) in self.params.iter().enumerate() {
                if k > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{p}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
