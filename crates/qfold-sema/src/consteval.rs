//! Compile-time evaluation of classical expressions.
//!
//! [`Analyzer::fold`] returns `Ok(None)` when an expression depends on
//! runtime data. Callers that need a constant turn that into a
//! `non-constant-bound` diagnostic; [`Analyzer::residualize`] rewrites such an
//! expression for re-emission with every known part folded.

use std::f64::consts::{E, PI, TAU};
use std::fmt;

use num_complex::Complex64;
use qfold_ir::ParameterExpression;
use qfold_ir::parameter::apply_function;
use qfold_qasm3::{BinOp, Expression, IndexItem, TimeUnit, UnaryOp, print_expression};
use thiserror::Error;

use crate::analyzer::{Analyzer, CallResult, SemResult};
use crate::diagnostic::DiagnosticKind;
use crate::resources::{normalize_index, range_positions};
use crate::scope::{Binding, SymbolKind};
use crate::types::{ClassicalType, cast};

/// Math functions callable in expressions.
const MATH_FUNCTIONS: [&str; 9] = [
    "sin", "cos", "tan", "arcsin", "arccos", "arctan", "exp", "ln", "sqrt",
];

/// Check if `name` is one of the builtin math functions.
pub fn is_math_function(name: &str) -> bool {
    MATH_FUNCTIONS.contains(&name)
}

/// A compile-time classical value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    /// Integers, `uint`s and bit strings (stored as their bit pattern).
    Int(i64),
    Float(f64),
    Complex(Complex64),
    Duration(f64, TimeUnit),
    Array(Vec<Value>),
}

impl Value {
    /// Integer value, if this is an integer or bool.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Real value of a numeric scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Complex(c) if c.im == 0.0 => Some(c.re),
            _ => None,
        }
    }

    /// Truth value as used by conditions.
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Complex(c) => Some(c.norm() != 0.0),
            Value::Duration(..) | Value::Array(_) => None,
        }
    }

    /// Type of the value in the absence of a declared type.
    pub fn type_of(&self) -> ClassicalType {
        match self {
            Value::Bool(_) => ClassicalType::Bool,
            Value::Int(_) => ClassicalType::Int(crate::types::DEFAULT_INT_WIDTH),
            Value::Float(_) => ClassicalType::Float(crate::types::DEFAULT_FLOAT_WIDTH),
            Value::Complex(_) => ClassicalType::Complex(crate::types::DEFAULT_FLOAT_WIDTH),
            Value::Duration(..) => ClassicalType::Duration,
            Value::Array(items) => {
                let element = items
                    .first()
                    .map_or(ClassicalType::Int(crate::types::DEFAULT_INT_WIDTH), Value::type_of);
                match element {
                    ClassicalType::Array { element, mut dims } => {
                        dims.insert(0, items.len());
                        ClassicalType::Array { element, dims }
                    }
                    scalar => ClassicalType::Array {
                        element: Box::new(scalar),
                        dims: vec![items.len()],
                    },
                }
            }
        }
    }

    /// Literal expression denoting this value.
    pub fn to_expression(&self) -> Expression {
        let negate = |e: Expression| Expression::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(e),
        };
        match self {
            Value::Bool(b) => Expression::Bool(*b),
            Value::Int(n) if *n < 0 => negate(Expression::Int(n.unsigned_abs())),
            Value::Int(n) => Expression::Int(n.unsigned_abs()),
            Value::Float(f) if f.is_sign_negative() && *f != 0.0 => negate(Expression::Float(-f)),
            Value::Float(f) => Expression::Float(*f),
            Value::Complex(c) => {
                let re = Value::Float(c.re).to_expression();
                if c.im == 0.0 {
                    return re;
                }
                let (op, im) = if c.im < 0.0 {
                    (BinOp::Sub, -c.im)
                } else {
                    (BinOp::Add, c.im)
                };
                Expression::BinOp {
                    left: Box::new(re),
                    op,
                    right: Box::new(Expression::Imag(im)),
                }
            }
            Value::Duration(v, unit) => Expression::Duration(*v, *unit),
            Value::Array(items) => Expression::Array(items.iter().map(Value::to_expression).collect()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_expression(&self.to_expression()))
    }
}

/// Errors of the pure evaluation primitives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("{0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
}

fn mismatch(op: &str, l: &Value, r: &Value) -> EvalError {
    EvalError::TypeMismatch(format!("operator `{op}` is not defined for {l} and {r}"))
}

/// Apply a unary operator.
pub fn eval_unary(op: UnaryOp, v: Value) -> Result<Value, EvalError> {
    match (op, v) {
        (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Complex(c)) => Ok(Value::Complex(-c)),
        (UnaryOp::Neg, Value::Duration(d, u)) => Ok(Value::Duration(-d, u)),
        (UnaryOp::BitNot, Value::Int(n)) => Ok(Value::Int(!n)),
        (UnaryOp::Not, v) => v
            .truthy()
            .map(|b| Value::Bool(!b))
            .ok_or_else(|| EvalError::TypeMismatch(format!("`!` is not defined for {v}"))),
        (op, v) => Err(EvalError::TypeMismatch(format!(
            "unary `{}` is not defined for {v}",
            match op {
                UnaryOp::Neg => "-",
                UnaryOp::BitNot => "~",
                UnaryOp::Not => "!",
            }
        ))),
    }
}

/// Apply a binary operator with fixed-width integer wraparound and IEEE
/// float semantics.
pub fn eval_binary(op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    use Value as V;
    let sym = op.symbol();
    match op {
        BinOp::And | BinOp::Or => {
            let (Some(a), Some(b)) = (l.truthy(), r.truthy()) else {
                return Err(mismatch(sym, &l, &r));
            };
            return Ok(V::Bool(if op == BinOp::And { a && b } else { a || b }));
        }
        BinOp::Eq | BinOp::NotEq => {
            let equal = match (&l, &r) {
                (V::Bool(a), V::Bool(b)) => a == b,
                (V::Int(a), V::Int(b)) => a == b,
                (V::Bool(_), _) | (_, V::Bool(_)) => return Err(mismatch(sym, &l, &r)),
                (V::Complex(_), _) | (_, V::Complex(_)) => to_complex(&l) == to_complex(&r),
                _ => match (l.as_f64(), r.as_f64()) {
                    (Some(a), Some(b)) => a == b,
                    _ => return Err(mismatch(sym, &l, &r)),
                },
            };
            return Ok(V::Bool(equal == (op == BinOp::Eq)));
        }
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
            let ordering = match (&l, &r) {
                (V::Int(a), V::Int(b)) => a.partial_cmp(b),
                (V::Duration(a, ua), V::Duration(b, ub)) if ua == ub => a.partial_cmp(b),
                (V::Bool(_), _) | (_, V::Bool(_)) => return Err(mismatch(sym, &l, &r)),
                _ => match (l.as_f64(), r.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => return Err(mismatch(sym, &l, &r)),
                },
            };
            let Some(ordering) = ordering else {
                return Ok(V::Bool(false));
            };
            return Ok(V::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::LtEq => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }));
        }
        BinOp::Concat => {
            return match (l, r) {
                (V::Array(mut a), V::Array(b)) => {
                    a.extend(b);
                    Ok(V::Array(a))
                }
                (l, r) => Err(mismatch(sym, &l, &r)),
            };
        }
        _ => {}
    }

    if matches!(l, V::Bool(_)) || matches!(r, V::Bool(_)) {
        return Err(EvalError::TypeMismatch(format!(
            "operator `{sym}` is not defined for bool"
        )));
    }

    match (&l, &r) {
        (V::Int(a), V::Int(b)) => int_binary(op, *a, *b).ok_or_else(|| mismatch(sym, &l, &r))?,
        (V::Duration(a, u), V::Duration(b, v)) if u == v => match op {
            BinOp::Add => Ok(V::Duration(a + b, *u)),
            BinOp::Sub => Ok(V::Duration(a - b, *u)),
            BinOp::Div => Ok(V::Float(a / b)),
            _ => Err(mismatch(sym, &l, &r)),
        },
        (V::Duration(d, u), other) | (other, V::Duration(d, u))
            if matches!(op, BinOp::Mul) && other.as_f64().is_some() =>
        {
            Ok(V::Duration(d * other.as_f64().unwrap_or(1.0), *u))
        }
        (V::Duration(d, u), other) if op == BinOp::Div && other.as_f64().is_some() => {
            Ok(V::Duration(d / other.as_f64().unwrap_or(1.0), *u))
        }
        (V::Complex(_), _) | (_, V::Complex(_)) => {
            let (Some(a), Some(b)) = (to_complex(&l), to_complex(&r)) else {
                return Err(mismatch(sym, &l, &r));
            };
            Ok(V::Complex(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::Pow => a.powc(b),
                _ => return Err(mismatch(sym, &l, &r)),
            }))
        }
        _ => {
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                return Err(mismatch(sym, &l, &r));
            };
            Ok(V::Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::Mod => a % b,
                BinOp::Pow => a.powf(b),
                _ => return Err(mismatch(sym, &l, &r)),
            }))
        }
    }
}

fn int_binary(op: BinOp, a: i64, b: i64) -> Option<Result<Value, EvalError>> {
    Some(Ok(Value::Int(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Some(Err(EvalError::DivisionByZero));
            }
            a.wrapping_div(b)
        }
        BinOp::Mod => {
            if b == 0 {
                return Some(Err(EvalError::DivisionByZero));
            }
            a.wrapping_rem(b)
        }
        BinOp::Pow => match u32::try_from(b) {
            Ok(exp) => a.wrapping_pow(exp),
            #[allow(clippy::cast_precision_loss)]
            Err(_) => return Some(Ok(Value::Float((a as f64).powf(b as f64)))),
        },
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::LShift => a.wrapping_shl(u32::try_from(b).ok()?),
        BinOp::RShift => a.wrapping_shr(u32::try_from(b).ok()?),
        _ => return None,
    })))
}

fn to_complex(v: &Value) -> Option<Complex64> {
    match v {
        Value::Complex(c) => Some(*c),
        other => other.as_f64().map(|re| Complex64::new(re, 0.0)),
    }
}

/// Bits `positions` of `value`, most significant first in the result.
///
/// `None` when a position or the result width reaches past 64 bits.
fn extract_bits(value: i64, positions: &[u32]) -> Option<i64> {
    positions
        .iter()
        .rev()
        .enumerate()
        .try_fold(0i64, |acc, (k, &p)| {
            let bit = value.checked_shr(p)? & 1;
            Some(acc | bit.checked_shl(u32::try_from(k).ok()?)?)
        })
}

impl Analyzer<'_> {
    /// Fold an expression to a value, or `None` if it depends on runtime
    /// data.
    pub(crate) fn fold(&mut self, expr: &Expression) -> SemResult<Option<Value>> {
        Ok(match expr {
            Expression::Int(n) => Some(Value::Int(i64::try_from(*n).map_err(|_| {
                self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("integer literal {n} does not fit in 64 bits"),
                )
            })?)),
            Expression::Float(f) => Some(Value::Float(*f)),
            Expression::Imag(f) => Some(Value::Complex(Complex64::new(0.0, *f))),
            Expression::Bool(b) => Some(Value::Bool(*b)),
            Expression::BitString(bits) => {
                let value = u64::from_str_radix(bits, 2).map_err(|_| {
                    self.local(
                        DiagnosticKind::TypeMismatch,
                        format!("bit string \"{bits}\" is longer than 64 bits"),
                    )
                })?;
                #[allow(clippy::cast_possible_wrap)]
                Some(Value::Int(value as i64))
            }
            Expression::Duration(v, unit) => Some(Value::Duration(*v, *unit)),
            Expression::Pi => Some(Value::Float(PI)),
            Expression::Tau => Some(Value::Float(TAU)),
            Expression::Euler => Some(Value::Float(E)),
            Expression::Identifier(name) => self.fold_identifier(name)?,
            Expression::Unary { op, operand } => match self.fold(operand)? {
                Some(v) => Some(eval_unary(*op, v).map_err(|e| self.local(DiagnosticKind::TypeMismatch, e.to_string()))?),
                None => None,
            },
            Expression::BinOp { left, op, right } => {
                let l = self.fold(left)?;
                // A known left side can decide `&&` / `||` alone.
                match (op, l.as_ref().and_then(Value::truthy)) {
                    (BinOp::And, Some(false)) => return Ok(Some(Value::Bool(false))),
                    (BinOp::Or, Some(true)) => return Ok(Some(Value::Bool(true))),
                    _ => {}
                }
                let r = self.fold(right)?;
                match (l, r) {
                    (Some(l), Some(r)) => Some(
                        eval_binary(*op, l, r).map_err(|e| self.local(DiagnosticKind::TypeMismatch, e.to_string()))?,
                    ),
                    _ => None,
                }
            }
            Expression::FnCall { name, args } => self.fold_call(name, args)?,
            Expression::Index { base, items } => self.fold_index(base, items)?,
            Expression::Cast { ty, operand } => {
                let ty = self.resolve_type(ty)?;
                match self.fold(operand)? {
                    Some(v) => Some(cast(&ty, v).map_err(|msg| self.local(DiagnosticKind::TypeMismatch, msg))?),
                    None => None,
                }
            }
            Expression::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                let mut known = true;
                for item in items {
                    match self.fold(item)? {
                        Some(v) => values.push(v),
                        None => known = false,
                    }
                }
                known.then_some(Value::Array(values))
            }
            Expression::Measure(_) => {
                return Err(self.local(
                    DiagnosticKind::Unsupported,
                    "measurement cannot appear inside a larger expression",
                ));
            }
            Expression::Paren(inner) => self.fold(inner)?,
        })
    }

    fn fold_identifier(&mut self, name: &str) -> SemResult<Option<Value>> {
        let Some(symbol) = self.scopes.resolve(name) else {
            return Err(self.local(
                DiagnosticKind::UndefinedSymbol,
                format!("undefined name `{name}`"),
            ));
        };
        match (&symbol.binding, symbol.kind) {
            (Binding::Param(p), _) => Ok(p.as_f64().map(Value::Float)),
            (
                _,
                SymbolKind::ClassicalVariable | SymbolKind::Constant | SymbolKind::ClassicalRegister,
            ) => Ok(symbol.value.clone()),
            (Binding::Clbits(_), SymbolKind::Alias) => Ok(None),
            (_, kind) => Err(self.not_a_value(name, kind)),
        }
    }

    fn fold_call(&mut self, name: &str, args: &[Expression]) -> SemResult<Option<Value>> {
        if matches!(
            self.scopes.resolve(name).map(|s| &s.binding),
            Some(Binding::Subroutine(_))
        ) {
            return match self.call_subroutine(name, args)? {
                CallResult::Value(v) => Ok(Some(v)),
                CallResult::Void => Err(self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("subroutine `{name}` does not return a value"),
                )),
                CallResult::Measure(_) | CallResult::Runtime(_) => {
                    Err(self.local(
                        DiagnosticKind::Unsupported,
                        format!(
                            "runtime result of `{name}` cannot be used inside a larger expression"
                        ),
                    ))
                }
            };
        }
        if !is_math_function(name) {
            return Err(if self.scopes.resolve(name).is_some() {
                self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("`{name}` is not callable"),
                )
            } else {
                self.local(
                    DiagnosticKind::UndefinedSymbol,
                    format!("undefined subroutine `{name}`"),
                )
            });
        }
        let [arg] = args else {
            return Err(self.local(
                DiagnosticKind::ArityMismatch,
                format!("`{name}` takes 1 argument, found {}", args.len()),
            ));
        };
        let Some(v) = self.fold(arg)? else {
            return Ok(None);
        };
        let x = v.as_f64().ok_or_else(|| {
            self.local(
                DiagnosticKind::TypeMismatch,
                format!("`{name}` expects a real argument, found {v}"),
            )
        })?;
        apply_function(name, x).map(|y| Some(Value::Float(y))).ok_or_else(|| {
            self.local(
                DiagnosticKind::TypeMismatch,
                format!("`{name}({x})` is not a finite real number"),
            )
        })
    }

    fn fold_index(&mut self, base: &Expression, items: &[IndexItem]) -> SemResult<Option<Value>> {
        let base_ty = self.infer(base)?;
        let mut value = self.fold(base)?;
        let mut ty = base_ty;
        for item in items {
            let len = ty.width().ok_or_else(|| {
                self.local(DiagnosticKind::TypeMismatch, format!("{ty} cannot be indexed"))
            })?;
            let positions = self.index_positions(item, len)?;
            let is_array = matches!(ty, ClassicalType::Array { .. });
            value = match value {
                Some(Value::Array(elements)) if is_array => {
                    if let IndexItem::Single(_) = item {
                        elements.into_iter().nth(positions[0] as usize)
                    } else {
                        Some(Value::Array(
                            positions
                                .iter()
                                .filter_map(|&p| elements.get(p as usize).cloned())
                                .collect(),
                        ))
                    }
                }
                Some(Value::Int(bits)) => extract_bits(bits, &positions).map(Value::Int),
                _ => None,
            };
            ty = match item {
                IndexItem::Single(_) => ty.indexed(),
                _ if is_array => Some(ty),
                _ => u32::try_from(positions.len()).ok().map(ClassicalType::Bit),
            }
            .ok_or_else(|| self.local(DiagnosticKind::TypeMismatch, "value cannot be indexed"))?;
        }
        Ok(value)
    }

    /// Positions selected by one index item over a sequence of `len`.
    pub(crate) fn index_positions(&mut self, item: &IndexItem, len: u32) -> SemResult<Vec<u32>> {
        match item {
            IndexItem::Single(e) => {
                let i = self.fold_index_value(e)?;
                Ok(vec![self.normalize(i, len)?])
            }
            IndexItem::Set(items) => items
                .iter()
                .map(|e| {
                    let i = self.fold_index_value(e)?;
                    self.normalize(i, len)
                })
                .collect(),
            IndexItem::Range(range) => {
                let mut part = |e: &Option<Box<Expression>>| -> SemResult<Option<i64>> {
                    e.as_deref().map(|e| self.fold_index_value(e)).transpose()
                };
                let start = part(&range.start)?;
                let step = part(&range.step)?;
                let end = part(&range.end)?;
                if step == Some(0) {
                    return Err(self.local(
                        DiagnosticKind::NonConstantBound,
                        "range step must be non-zero",
                    ));
                }
                range_positions(start, step, end, len)
                    .map_err(|msg| self.local(DiagnosticKind::OutOfRangeIndex, msg))
            }
        }
    }

    fn normalize(&self, index: i64, len: u32) -> SemResult<u32> {
        normalize_index(index, len).map_err(|msg| self.local(DiagnosticKind::OutOfRangeIndex, msg))
    }

    /// Fold an index expression to an integer.
    pub(crate) fn fold_index_value(&mut self, expr: &Expression) -> SemResult<i64> {
        match self.fold(expr)? {
            Some(Value::Int(n)) => Ok(n),
            Some(other) => Err(self.local(
                DiagnosticKind::TypeMismatch,
                format!("index must be an integer, found {other}"),
            )),
            None => Err(self.local(
                DiagnosticKind::NonConstantBound,
                format!(
                    "index `{}` is not a compile-time constant",
                    print_expression(expr)
                ),
            )),
        }
    }

    /// Whether evaluating `expr` would run a subroutine.
    pub(crate) fn calls_subroutine(&self, expr: &Expression) -> bool {
        match expr {
            Expression::FnCall { name, args } => {
                matches!(
                    self.scopes.resolve(name).map(|s| &s.binding),
                    Some(Binding::Subroutine(_))
                ) || args.iter().any(|a| self.calls_subroutine(a))
            }
            Expression::Unary { operand, .. }
            | Expression::Cast { operand, .. }
            | Expression::Paren(operand)
            | Expression::Measure(operand) => self.calls_subroutine(operand),
            Expression::BinOp { left, right, .. } => {
                self.calls_subroutine(left) || self.calls_subroutine(right)
            }
            Expression::Index { base, .. } => self.calls_subroutine(base),
            Expression::Array(items) => items.iter().any(|a| self.calls_subroutine(a)),
            _ => false,
        }
    }

    /// Rewrite a runtime expression for re-emission: known parts become
    /// literals, variables take their emitted names.
    pub(crate) fn residualize(&mut self, expr: &Expression) -> SemResult<Expression> {
        if self.calls_subroutine(expr) {
            return Err(self.local(
                DiagnosticKind::Unsupported,
                "subroutine call inside a runtime expression",
            ));
        }
        if let Some(v) = self.fold(expr)? {
            return Ok(v.to_expression());
        }
        Ok(match expr {
            Expression::Identifier(name) => Expression::Identifier(self.runtime_name(name)?),
            Expression::Unary { op, operand } => Expression::Unary {
                op: *op,
                operand: Box::new(self.residualize(operand)?),
            },
            Expression::BinOp { left, op, right } => Expression::BinOp {
                left: Box::new(self.residualize(left)?),
                op: *op,
                right: Box::new(self.residualize(right)?),
            },
            Expression::FnCall { name, args } => Expression::FnCall {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| self.residualize(a))
                    .collect::<SemResult<_>>()?,
            },
            Expression::Index { base, items } => {
                let len = self.infer(base)?.width().unwrap_or(0);
                let mut folded = Vec::with_capacity(items.len());
                for item in items {
                    let positions = self.index_positions(item, len)?;
                    folded.push(match positions.as_slice() {
                        [single] if matches!(item, IndexItem::Single(_)) => {
                            IndexItem::Single(Expression::Int(u64::from(*single)))
                        }
                        _ => IndexItem::Set(
                            positions
                                .iter()
                                .map(|&p| Expression::Int(u64::from(p)))
                                .collect(),
                        ),
                    });
                }
                Expression::Index {
                    base: Box::new(self.residualize(base)?),
                    items: folded,
                }
            }
            Expression::Cast { ty, operand } => Expression::Cast {
                ty: self.resolve_type(ty)?.to_spec(),
                operand: Box::new(self.residualize(operand)?),
            },
            Expression::Array(items) => Expression::Array(
                items
                    .iter()
                    .map(|a| self.residualize(a))
                    .collect::<SemResult<_>>()?,
            ),
            Expression::Paren(inner) => Expression::Paren(Box::new(self.residualize(inner)?)),
            other => other.clone(),
        })
    }

    /// Convert a gate argument to a parameter expression.
    pub(crate) fn to_parameter(&mut self, expr: &Expression) -> SemResult<ParameterExpression> {
        let p = self.parameter_tree(expr)?;
        Ok(p.simplify())
    }

    fn parameter_tree(&mut self, expr: &Expression) -> SemResult<ParameterExpression> {
        type P = ParameterExpression;
        let binary = |l: P, op: BinOp, r: P| -> Option<P> {
            Some(match op {
                BinOp::Add => P::Add(Box::new(l), Box::new(r)),
                BinOp::Sub => P::Sub(Box::new(l), Box::new(r)),
                BinOp::Mul => P::Mul(Box::new(l), Box::new(r)),
                BinOp::Div => P::Div(Box::new(l), Box::new(r)),
                BinOp::Pow => P::Pow(Box::new(l), Box::new(r)),
                _ => return None,
            })
        };
        match expr {
            Expression::Pi => return Ok(P::Pi),
            Expression::Identifier(name) => {
                if let Some(Binding::Param(p)) = self.scopes.resolve(name).map(|s| &s.binding) {
                    return Ok(p.clone());
                }
            }
            Expression::Paren(inner) => return self.parameter_tree(inner),
            Expression::Unary {
                op: UnaryOp::Neg,
                operand,
            } => return Ok(P::Neg(Box::new(self.parameter_tree(operand)?))),
            Expression::BinOp { left, op, right }
                if matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Pow) =>
            {
                let l = self.parameter_tree(left)?;
                let r = self.parameter_tree(right)?;
                if let Some(p) = binary(l, *op, r) {
                    return Ok(p);
                }
            }
            Expression::FnCall { name, args } if is_math_function(name) && args.len() == 1 => {
                if self.scopes.resolve(name).is_none() {
                    let arg = self.parameter_tree(&args[0])?;
                    return Ok(P::Function(name.clone(), Box::new(arg)));
                }
            }
            _ => {}
        }
        match self.fold(expr)? {
            Some(v) => v.as_f64().map(P::Constant).ok_or_else(|| {
                self.local(
                    DiagnosticKind::TypeMismatch,
                    format!("gate parameter must be a real number, found {v}"),
                )
            }),
            None => {
                let residual = self.residualize(expr)?;
                Ok(match residual {
                    Expression::Identifier(name) => P::Symbol(name),
                    other => P::Symbol(format!("({})", print_expression(&other))),
                })
            }
        }
    }

    /// Name under which a runtime-valued symbol appears in emitted source,
    /// materializing plain variables on first use.
    pub(crate) fn runtime_name(&mut self, name: &str) -> SemResult<String> {
        let Some(symbol) = self.scopes.resolve(name) else {
            return Err(self.local(
                DiagnosticKind::UndefinedSymbol,
                format!("undefined name `{name}`"),
            ));
        };
        if let Some(emit) = &symbol.emit_name {
            return Ok(emit.clone());
        }
        let kind = symbol.kind;
        match kind {
            SymbolKind::ClassicalVariable => self.materialize(name),
            kind => Err(self.not_a_value(name, kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_wraparound() {
        assert_eq!(
            eval_binary(BinOp::Add, Value::Int(i64::MAX), Value::Int(1)),
            Ok(Value::Int(i64::MIN))
        );
        assert_eq!(
            eval_binary(BinOp::Div, Value::Int(7), Value::Int(2)),
            Ok(Value::Int(3))
        );
    }

    #[test]
    fn test_mixed_arithmetic_is_float() {
        assert_eq!(
            eval_binary(BinOp::Mul, Value::Int(3), Value::Float(0.5)),
            Ok(Value::Float(1.5))
        );
        assert_eq!(
            eval_binary(BinOp::Pow, Value::Int(2), Value::Int(-1)),
            Ok(Value::Float(0.5))
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            eval_binary(BinOp::Div, Value::Int(1), Value::Int(0)),
            Err(EvalError::DivisionByZero)
        );
        assert_eq!(
            eval_binary(BinOp::Mod, Value::Int(1), Value::Int(0)),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_bool_is_not_numeric() {
        assert!(eval_binary(BinOp::Add, Value::Bool(true), Value::Int(1)).is_err());
        assert_eq!(
            eval_binary(BinOp::And, Value::Bool(true), Value::Int(0)),
            Ok(Value::Bool(false))
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            eval_binary(BinOp::LtEq, Value::Int(2), Value::Float(2.0)),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            eval_binary(BinOp::NotEq, Value::Int(1), Value::Int(1)),
            Ok(Value::Bool(false))
        );
        assert!(eval_binary(BinOp::Eq, Value::Bool(true), Value::Int(1)).is_err());
    }

    #[test]
    fn test_unary() {
        assert_eq!(eval_unary(UnaryOp::Neg, Value::Int(3)), Ok(Value::Int(-3)));
        assert_eq!(eval_unary(UnaryOp::Not, Value::Int(0)), Ok(Value::Bool(true)));
        assert_eq!(eval_unary(UnaryOp::BitNot, Value::Int(0)), Ok(Value::Int(-1)));
        assert!(eval_unary(UnaryOp::Neg, Value::Bool(true)).is_err());
    }

    #[test]
    fn test_extract_bits() {
        // 0b1010: bit 1 and bit 3 set
        assert_eq!(extract_bits(0b1010, &[1]), Some(1));
        assert_eq!(extract_bits(0b1010, &[0]), Some(0));
        assert_eq!(extract_bits(0b1010, &[3, 1]), Some(0b11));
        assert_eq!(extract_bits(0b1010, &[63]), Some(0));
        assert_eq!(extract_bits(0b1010, &[70]), None);
    }

    #[test]
    fn test_literal_expressions() {
        assert_eq!(print_expression(&Value::Int(-4).to_expression()), "-4");
        assert_eq!(print_expression(&Value::Float(0.5).to_expression()), "0.5");
        assert_eq!(
            print_expression(&Value::Complex(Complex64::new(1.0, -2.0)).to_expression()),
            "1.0 - 2.0im"
        );
        assert_eq!(
            print_expression(&Value::Array(vec![Value::Int(1), Value::Bool(true)]).to_expression()),
            "{1, true}"
        );
    }
}
