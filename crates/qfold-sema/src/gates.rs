//! Gate calls: resolution, modifiers, broadcast and inlining of user gates.

use std::sync::Arc;

use qfold_ir::{
    BuiltinId, ControlState, Gate, Instruction, InstructionKind, IrError, OpaqueGate,
    ParameterExpression, QubitId,
};
use qfold_qasm3::{Expression, GateCall, GateDef, GateModifier, StmtKind};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::analyzer::{Analyzer, SemError, SemResult};
use crate::consteval::Value;
use crate::diagnostic::DiagnosticKind;
use crate::resources::View;
use crate::scope::{Binding, ScopeKind, Symbol, SymbolKind};
use crate::types::{ClassicalType, DEFAULT_ANGLE_WIDTH};

/// What a gate name refers to.
#[derive(Debug, Clone)]
enum GateTarget {
    Builtin(BuiltinId),
    User(Arc<GateDef>),
    External(OpaqueGate),
}

impl GateTarget {
    fn num_qubits(&self) -> u32 {
        match self {
            GateTarget::Builtin(id) => id.gate().num_qubits,
            GateTarget::User(def) => u32::try_from(def.qubits.len()).unwrap_or(u32::MAX),
            GateTarget::External(op) => op.num_qubits,
        }
    }

    fn num_params(&self) -> usize {
        match self {
            GateTarget::Builtin(id) => id.gate().num_params,
            GateTarget::User(def) => def.params.len(),
            GateTarget::External(op) => op.num_params,
        }
    }
}

/// An evaluated modifier.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Modifier {
    Ctrl(ControlState, u32),
    Inv,
    Pow(f64),
}

impl Analyzer<'_> {
    /// Register a gate definition. Gates listed as external stay opaque.
    pub(crate) fn define_gate(&mut self, def: &GateDef) -> SemResult<()> {
        if !self.scopes.is_global() {
            return Err(self.local(
                DiagnosticKind::Unsupported,
                "gates can only be defined in the global scope",
            ));
        }
        if let Some(stmt) = def.body.iter().find(|s| !matches!(s.kind, StmtKind::Gate(_))) {
            return Err(self.local(
                DiagnosticKind::Unsupported,
                format!(
                    "gate `{}` may only contain gate calls (line {})",
                    def.name, stmt.span.line
                ),
            ));
        }
        let mut formals = FxHashSet::default();
        if let Some(dup) = def.params.iter().chain(&def.qubits).find(|n| !formals.insert(n.as_str())) {
            return Err(self.local(
                DiagnosticKind::Redeclaration,
                format!("gate `{}` declares `{dup}` twice", def.name),
            ));
        }

        let external = self.config.is_external(&def.name);
        let binding = if external {
            Binding::External(OpaqueGate {
                name: def.name.clone(),
                num_qubits: u32::try_from(def.qubits.len()).unwrap_or(u32::MAX),
                num_params: def.params.len(),
            })
        } else {
            Binding::Gate(Arc::new(def.clone()))
        };
        self.declare_symbol(
            Symbol::new(&def.name, SymbolKind::GateDefinition, self.span).with_binding(binding),
        )?;
        if external {
            debug!(gate = %def.name, "keeping external gate opaque");
            self.external_defs.push(def.clone());
        }
        Ok(())
    }

    fn resolve_gate(&self, name: &str) -> SemResult<GateTarget> {
        let Some(symbol) = self.scopes.resolve(name) else {
            return Err(self.local(
                DiagnosticKind::UndefinedSymbol,
                format!("undefined gate `{name}`"),
            ));
        };
        match &symbol.binding {
            Binding::Builtin(id) => Ok(GateTarget::Builtin(*id)),
            Binding::Gate(def) => Ok(GateTarget::User(Arc::clone(def))),
            Binding::External(op) => Ok(GateTarget::External(op.clone())),
            _ => Err(self.local(
                DiagnosticKind::TypeMismatch,
                format!("`{name}` is not a gate"),
            )),
        }
    }

    /// Expand a gate call into elementary operations.
    pub(crate) fn expand_call(&mut self, call: &GateCall) -> SemResult<Vec<Instruction>> {
        let target = self.resolve_gate(&call.name)?;
        let modifiers = self.eval_modifiers(&call.modifiers)?;

        if call.params.len() != target.num_params() {
            return Err(self.local(
                DiagnosticKind::ArityMismatch,
                format!(
                    "gate `{}` takes {} parameters, found {}",
                    call.name,
                    target.num_params(),
                    call.params.len()
                ),
            ));
        }
        let params = call
            .params
            .iter()
            .map(|p| self.to_parameter(p))
            .collect::<SemResult<Vec<_>>>()?;

        let expected = modifiers
            .iter()
            .try_fold(target.num_qubits(), |acc, m| match m {
                Modifier::Ctrl(_, n) => acc.checked_add(*n),
                _ => Some(acc),
            })
            .ok_or_else(|| {
                self.local(
                    DiagnosticKind::ArityMismatch,
                    format!("`{}` has more control qubits than can be addressed", call.name),
                )
            })?;
        if call.qubits.len() != expected as usize {
            return Err(self.local(
                DiagnosticKind::ArityMismatch,
                format!(
                    "`{}` expects {expected} qubit operands, found {}",
                    call.name,
                    call.qubits.len()
                ),
            ));
        }

        let mut views = Vec::with_capacity(call.qubits.len());
        for operand in &call.qubits {
            views.push(self.quantum_view(operand)?);
        }
        let groups = self.broadcast(&call.name, &views)?;
        trace!(gate = %call.name, applications = groups.len(), "gate call");

        let mut ops = Vec::new();
        for group in groups {
            self.check_distinct(&call.name, &group)?;
            ops.extend(self.apply_modifiers(&target, &params, &modifiers, &group)?);
        }
        Ok(ops)
    }

    /// Evaluate modifiers, cancelling adjacent `inv` pairs and merging
    /// adjacent powers.
    fn eval_modifiers(&mut self, modifiers: &[GateModifier]) -> SemResult<Vec<Modifier>> {
        let mut out: Vec<Modifier> = Vec::with_capacity(modifiers.len());
        for modifier in modifiers {
            let next = match modifier {
                GateModifier::Ctrl(n) => Modifier::Ctrl(ControlState::Positive, self.control_count(n.as_ref())?),
                GateModifier::NegCtrl(n) => Modifier::Ctrl(ControlState::Negative, self.control_count(n.as_ref())?),
                GateModifier::Inv => Modifier::Inv,
                GateModifier::Pow(e) => Modifier::Pow(self.pow_exponent(e)?),
            };
            match (out.last().copied(), next) {
                (Some(Modifier::Inv), Modifier::Inv) => {
                    out.pop();
                }
                (Some(Modifier::Pow(a)), Modifier::Pow(b)) => {
                    out.pop();
                    out.push(Modifier::Pow(a * b));
                }
                _ => out.push(next),
            }
        }
        Ok(out)
    }

    fn control_count(&mut self, expr: Option<&Expression>) -> SemResult<u32> {
        let Some(expr) = expr else {
            return Ok(1);
        };
        match self.fold(expr)? {
            Some(Value::Int(n)) if n >= 1 => u32::try_from(n).map_err(|_| {
                self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("control count {n} is too large"),
                )
            }),
            Some(other) => Err(self.local(
                DiagnosticKind::TypeMismatch,
                format!("control count must be a positive integer, found {other}"),
            )),
            None => Err(self.local(
                DiagnosticKind::NonConstantBound,
                "control count is not a compile-time constant",
            )),
        }
    }

    fn pow_exponent(&mut self, expr: &Expression) -> SemResult<f64> {
        match self.fold(expr)? {
            Some(v) => v.as_f64().filter(|_| !matches!(v, Value::Bool(_))).ok_or_else(|| {
                self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("`pow` exponent must be a real number, found {v}"),
                )
            }),
            None => Err(self.local(
                DiagnosticKind::NonConstantBound,
                "`pow` exponent is not a compile-time constant",
            )),
        }
    }

    /// Pair up operands. Single qubits repeat; registers must share a length.
    fn broadcast(&self, name: &str, views: &[View]) -> SemResult<Vec<Vec<QubitId>>> {
        let lists: Vec<Vec<QubitId>> = views.iter().map(|v| self.resources.qubits(v)).collect();
        let mut width = None;
        for list in lists.iter().filter(|l| l.len() != 1) {
            match width {
                None => width = Some(list.len()),
                Some(w) if w != list.len() => {
                    return Err(self.local(
                        DiagnosticKind::ArityMismatch,
                        format!(
                            "registers of lengths {w} and {} cannot be broadcast in `{name}`",
                            list.len()
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        let width = width.unwrap_or(1);
        Ok((0..width)
            .map(|k| {
                lists
                    .iter()
                    .map(|l| if l.len() == 1 { l[0] } else { l[k] })
                    .collect()
            })
            .collect())
    }

    fn check_distinct(&self, name: &str, qubits: &[QubitId]) -> SemResult<()> {
        let mut seen = FxHashSet::default();
        match qubits.iter().find(|q| !seen.insert(**q)) {
            Some(&q) => Err(self.local(
                DiagnosticKind::ResourceMisuse,
                format!(
                    "qubit {} is used twice in one application of `{name}`",
                    self.qubit_label(q)
                ),
            )),
            None => Ok(()),
        }
    }

    /// Apply modifiers outermost first.
    fn apply_modifiers(
        &mut self,
        target: &GateTarget,
        params: &[ParameterExpression],
        modifiers: &[Modifier],
        qubits: &[QubitId],
    ) -> SemResult<Vec<Instruction>> {
        let Some((&first, rest)) = modifiers.split_first() else {
            return self.base_ops(target, params, qubits);
        };
        match first {
            Modifier::Ctrl(state, n) => {
                let (controls, targets) = qubits.split_at(n as usize);
                let inner = self.apply_modifiers(target, params, rest, targets)?;
                Ok(inner
                    .into_iter()
                    .map(|op| add_controls(op, state, controls))
                    .collect())
            }
            Modifier::Inv => {
                let inner = self.apply_modifiers(target, params, rest, qubits)?;
                self.invert(inner)
            }
            Modifier::Pow(exponent) => self.power(target, params, rest, qubits, exponent),
        }
    }

    fn invert(&self, ops: Vec<Instruction>) -> SemResult<Vec<Instruction>> {
        ops.into_iter()
            .rev()
            .map(|op| {
                let Some(gate) = op.as_gate() else {
                    return Ok(op);
                };
                let inverse = gate.inverse().ok_or_else(|| {
                    self.local(
                        DiagnosticKind::UnsupportedModifierCombination,
                        format!("`inv` cannot be applied to external gate `{}`", gate.name()),
                    )
                })?;
                Ok(Instruction {
                    kind: InstructionKind::Gate(inverse),
                    ..op
                })
            })
            .collect()
    }

    fn power(
        &mut self,
        target: &GateTarget,
        params: &[ParameterExpression],
        rest: &[Modifier],
        qubits: &[QubitId],
        exponent: f64,
    ) -> SemResult<Vec<Instruction>> {
        if exponent == 0.0 {
            return Ok(Vec::new());
        }
        if exponent.fract() == 0.0 {
            let limit = self.config.max_loop_iterations;
            if exponent.abs() > limit as f64 {
                return Err(self.local(
                    DiagnosticKind::IterationLimit,
                    format!("`pow({exponent})` repeats more than {limit} times"),
                ));
            }
            let mut once = self.apply_modifiers(target, params, rest, qubits)?;
            if exponent < 0.0 {
                once = self.invert(once)?;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let times = exponent.abs() as usize;
            let mut ops = Vec::with_capacity(once.len() * times);
            for _ in 0..times {
                ops.extend(once.iter().cloned());
            }
            return Ok(ops);
        }

        let inner = self.apply_modifiers(target, params, rest, qubits)?;
        if let [single] = inner.as_slice() {
            if let Some(gate) = single.as_gate() {
                if let Some(scaled) = gate.scaled_rotation(exponent) {
                    return Ok(vec![Instruction {
                        kind: InstructionKind::Gate(scaled),
                        ..single.clone()
                    }]);
                }
                if let Some(matrix) = gate.matrix() {
                    let powered = matrix
                        .power(exponent, self.config.unitary_tolerance)
                        .map_err(|e| self.local(DiagnosticKind::UnsupportedModifierCombination, e.to_string()))?;
                    let (theta, phi, lambda) = powered.u_angles();
                    let u = Gate::builtin("u", vec![theta.into(), phi.into(), lambda.into()])
                        .map_err(|e| self.ir_error(e))?;
                    trace!(gate = gate.name(), exponent, "fractional power through unitary");
                    return Ok(vec![self.instruction(u, &single.qubits)?]);
                }
            }
        }
        Err(self.local(
            DiagnosticKind::UnsupportedModifierCombination,
            format!(
                "`pow({exponent})` needs a single-qubit builtin or a rotation with constant parameters"
            ),
        ))
    }

    fn base_ops(
        &mut self,
        target: &GateTarget,
        params: &[ParameterExpression],
        qubits: &[QubitId],
    ) -> SemResult<Vec<Instruction>> {
        match target {
            GateTarget::Builtin(id) => {
                let gate = Gate::builtin(id.gate().name, params.to_vec()).map_err(|e| self.ir_error(e))?;
                Ok(vec![self.instruction(gate, qubits)?])
            }
            GateTarget::External(op) => {
                let gate = Gate::opaque(op.clone(), params.to_vec());
                Ok(vec![self.instruction(gate, qubits)?])
            }
            GateTarget::User(def) => self.inline_gate(def, params, qubits),
        }
    }

    fn instruction(&self, gate: Gate, qubits: &[QubitId]) -> SemResult<Instruction> {
        Instruction::gate(gate, qubits.iter().copied()).map_err(|e| self.ir_error(e))
    }

    fn ir_error(&self, err: IrError) -> SemError {
        let kind = match err {
            IrError::DuplicateQubit { .. } => DiagnosticKind::ResourceMisuse,
            _ => DiagnosticKind::ArityMismatch,
        };
        self.local(kind, err.to_string())
    }

    /// Substitute a user gate body.
    fn inline_gate(
        &mut self,
        def: &GateDef,
        params: &[ParameterExpression],
        qubits: &[QubitId],
    ) -> SemResult<Vec<Instruction>> {
        if self.call_stack.iter().any(|n| *n == def.name) {
            return Err(self.structural(
                DiagnosticKind::Unsupported,
                format!("gate `{}` is defined in terms of itself", def.name),
            ));
        }
        self.call_stack.push(def.name.clone());
        self.scopes.enter(ScopeKind::GateBody);
        let saved = self.span;
        let result = self.inline_body(def, params, qubits);
        self.span = saved;
        self.scopes.exit();
        self.call_stack.pop();
        result
    }

    fn inline_body(
        &mut self,
        def: &GateDef,
        params: &[ParameterExpression],
        qubits: &[QubitId],
    ) -> SemResult<Vec<Instruction>> {
        for (name, value) in def.params.iter().zip(params) {
            self.declare_symbol(
                Symbol::new(name, SymbolKind::ClassicalVariable, self.span)
                    .with_type(ClassicalType::Angle(DEFAULT_ANGLE_WIDTH))
                    .with_binding(Binding::Param(value.clone())),
            )?;
        }
        for (name, &qubit) in def.qubits.iter().zip(qubits) {
            let Some(view) = self.resources.qubit_view(qubit) else {
                return Err(self.local(
                    DiagnosticKind::UndefinedSymbol,
                    format!("qubit {} is not declared", qubit.0),
                ));
            };
            let mut symbol =
                Symbol::new(name, SymbolKind::Alias, self.span).with_binding(Binding::Qubits(view));
            symbol.size = Some(1);
            self.declare_symbol(symbol)?;
        }

        let mut ops = Vec::new();
        for stmt in &def.body {
            let StmtKind::Gate(call) = &stmt.kind else {
                continue;
            };
            self.span = stmt.span;
            ops.extend(self.expand_call(call)?);
        }
        Ok(ops)
    }
}

/// Prefix `controls` to a gate operation.
fn add_controls(op: Instruction, state: ControlState, controls: &[QubitId]) -> Instruction {
    let Instruction {
        kind,
        qubits,
        clbits,
    } = op;
    match kind {
        InstructionKind::Gate(mut gate) => {
            for _ in controls {
                gate = gate.controlled(state);
            }
            Instruction {
                kind: InstructionKind::Gate(gate),
                qubits: controls.iter().copied().chain(qubits).collect(),
                clbits,
            }
        }
        kind => Instruction {
            kind,
            qubits,
            clbits,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_controls_prepends_operands() {
        let x = Instruction::gate(Gate::builtin("x", vec![]).unwrap(), [QubitId(2)]).unwrap();
        let op = add_controls(x, ControlState::Negative, &[QubitId(0), QubitId(1)]);
        assert_eq!(op.qubits, vec![QubitId(0), QubitId(1), QubitId(2)]);
        let gate = op.as_gate().unwrap();
        assert_eq!(gate.controls, vec![ControlState::Negative; 2]);
        assert_eq!(gate.num_qubits(), 3);
    }
}
