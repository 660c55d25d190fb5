//! Classical types, implicit conversions and width resolution.

use std::f64::consts::TAU;
use std::fmt;

use qfold_qasm3::{BinOp, Expression, IndexItem, TypeSpec, UnaryOp};
use serde::{Deserialize, Serialize};

use crate::analyzer::{Analyzer, SemResult};
use crate::consteval::Value;
use crate::diagnostic::DiagnosticKind;
use crate::scope::{Binding, SymbolKind};

/// Default width of `int`/`uint`.
pub const DEFAULT_INT_WIDTH: u32 = 32;
/// Default width of `float` and `complex` components.
pub const DEFAULT_FLOAT_WIDTH: u32 = 64;
/// Default width of `angle`.
pub const DEFAULT_ANGLE_WIDTH: u32 = 32;

const FLOAT_WIDTHS: [u32; 4] = [16, 32, 64, 128];

/// A resolved classical type. Widths are always concrete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassicalType {
    Bool,
    Int(u32),
    Uint(u32),
    Float(u32),
    Angle(u32),
    Bit(u32),
    /// Complex number with components of the given float width.
    Complex(u32),
    Duration,
    Stretch,
    Array {
        element: Box<ClassicalType>,
        dims: Vec<usize>,
    },
}

impl ClassicalType {
    /// Bit width, or the first dimension for arrays.
    pub fn width(&self) -> Option<u32> {
        match self {
            ClassicalType::Int(n)
            | ClassicalType::Uint(n)
            | ClassicalType::Float(n)
            | ClassicalType::Angle(n)
            | ClassicalType::Bit(n)
            | ClassicalType::Complex(n) => Some(*n),
            ClassicalType::Array { dims, .. } => {
                dims.first().map(|&d| u32::try_from(d).unwrap_or(u32::MAX))
            }
            ClassicalType::Bool | ClassicalType::Duration | ClassicalType::Stretch => None,
        }
    }

    /// Check if this is one of the numeric scalar types.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ClassicalType::Int(_)
                | ClassicalType::Uint(_)
                | ClassicalType::Float(_)
                | ClassicalType::Angle(_)
                | ClassicalType::Bit(_)
                | ClassicalType::Complex(_)
        )
    }

    /// Syntax-tree form, for re-emission.
    pub fn to_spec(&self) -> TypeSpec {
        let w = |n: &u32| Some(Box::new(Expression::Int(u64::from(*n))));
        match self {
            ClassicalType::Bool => TypeSpec::Bool,
            ClassicalType::Int(n) => TypeSpec::Int(w(n)),
            ClassicalType::Uint(n) => TypeSpec::Uint(w(n)),
            ClassicalType::Float(n) => TypeSpec::Float(w(n)),
            ClassicalType::Angle(n) => TypeSpec::Angle(w(n)),
            ClassicalType::Bit(n) => TypeSpec::Bit(w(n)),
            ClassicalType::Complex(n) => TypeSpec::Complex(w(n)),
            ClassicalType::Duration => TypeSpec::Duration,
            ClassicalType::Stretch => TypeSpec::Stretch,
            ClassicalType::Array { element, dims } => TypeSpec::Array {
                element: Box::new(element.to_spec()),
                dims: dims.iter().map(|&d| Expression::Int(d as u64)).collect(),
            },
        }
    }

    /// Element type after indexing once.
    pub fn indexed(&self) -> Option<ClassicalType> {
        match self {
            ClassicalType::Int(_) | ClassicalType::Uint(_) | ClassicalType::Bit(_) => {
                Some(ClassicalType::Bit(1))
            }
            ClassicalType::Array { element, dims } if dims.len() > 1 => {
                Some(ClassicalType::Array {
                    element: element.clone(),
                    dims: dims[1..].to_vec(),
                })
            }
            ClassicalType::Array { element, .. } => Some((**element).clone()),
            _ => None,
        }
    }
}

impl fmt::Display for ClassicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassicalType::Bool => write!(f, "bool"),
            ClassicalType::Int(n) => write!(f, "int[{n}]"),
            ClassicalType::Uint(n) => write!(f, "uint[{n}]"),
            ClassicalType::Float(n) => write!(f, "float[{n}]"),
            ClassicalType::Angle(n) => write!(f, "angle[{n}]"),
            ClassicalType::Bit(n) => write!(f, "bit[{n}]"),
            ClassicalType::Complex(n) => write!(f, "complex[float[{n}]]"),
            ClassicalType::Duration => write!(f, "duration"),
            ClassicalType::Stretch => write!(f, "stretch"),
            ClassicalType::Array { element, dims } => {
                write!(f, "array[{element}")?;
                for d in dims {
                    write!(f, ", {d}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Check that a value of type `value` may be implicitly stored into `target`.
pub fn check_assignable(target: &ClassicalType, value: &ClassicalType) -> Result<(), String> {
    use ClassicalType as T;
    let ok = match (target, value) {
        (a, b) if a == b => true,
        (T::Array { .. }, _) | (_, T::Array { .. }) => false,
        (T::Bool, v) => v.is_numeric(),
        (_, T::Bool) if matches!(target, T::Bit(_)) => true,
        (_, T::Bool) => {
            return Err(format!(
                "bool cannot be implicitly converted to {target}"
            ));
        }
        (T::Int(_) | T::Uint(_), T::Int(_) | T::Uint(_) | T::Bit(_)) => true,
        (T::Int(_) | T::Uint(_), T::Float(_) | T::Angle(_)) => {
            return Err(format!(
                "{value} cannot be implicitly converted to {target}; use an explicit cast"
            ));
        }
        (T::Float(_), T::Int(_) | T::Uint(_) | T::Float(_) | T::Bit(_)) => true,
        (T::Angle(_), T::Int(_) | T::Uint(_) | T::Float(_) | T::Angle(_)) => true,
        (T::Bit(_), T::Int(_) | T::Uint(_) | T::Bit(_)) => true,
        (T::Complex(_), T::Int(_) | T::Uint(_) | T::Float(_) | T::Complex(_)) => true,
        (T::Duration | T::Stretch, T::Duration | T::Stretch) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("expected {target}, found {value}"))
    }
}

/// Check that an integer literal initializer fits the declared width.
pub fn check_literal_fit(target: &ClassicalType, expr: &Expression) -> Result<(), String> {
    let (negative, magnitude) = match expr.unparen() {
        Expression::Int(n) => (false, *n),
        Expression::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match operand.unparen() {
            Expression::Int(n) => (true, *n),
            _ => return Ok(()),
        },
        _ => return Ok(()),
    };
    let fits = match *target {
        ClassicalType::Int(n) => {
            let n = n.min(64);
            let max = (1u128 << (n - 1)) - 1;
            let min_magnitude = 1u128 << (n - 1);
            if negative {
                u128::from(magnitude) <= min_magnitude
            } else {
                u128::from(magnitude) <= max
            }
        }
        ClassicalType::Uint(n) | ClassicalType::Bit(n) => {
            !negative && (n >= 64 || u128::from(magnitude) < (1u128 << n))
        }
        _ => true,
    };
    if fits {
        Ok(())
    } else {
        let sign = if negative { "-" } else { "" };
        Err(format!("literal {sign}{magnitude} does not fit in {target}"))
    }
}

/// Wrap to `n` bits, two's complement.
pub fn wrap_signed(v: i64, n: u32) -> i64 {
    if n >= 64 {
        v
    } else {
        let shift = 64 - n;
        (v << shift) >> shift
    }
}

/// Wrap to `n` unsigned bits.
pub fn wrap_unsigned(v: i64, n: u32) -> i64 {
    if n >= 64 { v } else { v & ((1i64 << n) - 1) }
}

/// Convert a value for storage in `ty` after an implicit conversion was
/// accepted by [`check_assignable`].
pub fn coerce(ty: &ClassicalType, value: Value) -> Result<Value, String> {
    match ty {
        ClassicalType::Bool => value
            .truthy()
            .map(Value::Bool)
            .ok_or_else(|| format!("cannot convert {value} to bool")),
        ClassicalType::Int(n) => Ok(Value::Int(wrap_signed(integral(&value)?, *n))),
        ClassicalType::Uint(n) | ClassicalType::Bit(n) => {
            Ok(Value::Int(wrap_unsigned(integral(&value)?, *n)))
        }
        ClassicalType::Float(_) => value
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| format!("cannot convert {value} to {ty}")),
        ClassicalType::Angle(_) => {
            let v = value
                .as_f64()
                .ok_or_else(|| format!("cannot convert {value} to {ty}"))?;
            if !v.is_finite() || v.abs() >= TAU {
                return Err(format!("angle {v} is outside (-2π, 2π)"));
            }
            Ok(Value::Float(v.rem_euclid(TAU)))
        }
        ClassicalType::Complex(_) => match value {
            Value::Complex(c) => Ok(Value::Complex(c)),
            other => other
                .as_f64()
                .map(|re| Value::Complex(num_complex::Complex64::new(re, 0.0)))
                .ok_or_else(|| format!("cannot convert {other} to {ty}")),
        },
        ClassicalType::Duration | ClassicalType::Stretch => match value {
            Value::Duration(..) => Ok(value),
            other => Err(format!("cannot convert {other} to {ty}")),
        },
        ClassicalType::Array { element, dims } => {
            let Value::Array(items) = value else {
                return Err(format!("cannot convert {value} to {ty}"));
            };
            if items.len() != dims[0] {
                return Err(format!(
                    "array of length {} does not match declared length {}",
                    items.len(),
                    dims[0]
                ));
            }
            let inner = if dims.len() > 1 {
                ClassicalType::Array {
                    element: element.clone(),
                    dims: dims[1..].to_vec(),
                }
            } else {
                (**element).clone()
            };
            items
                .into_iter()
                .map(|item| coerce(&inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
    }
}

/// Explicit cast. Accepts every scalar conversion, truncating floats.
pub fn cast(ty: &ClassicalType, value: Value) -> Result<Value, String> {
    match (ty, &value) {
        (ClassicalType::Int(_) | ClassicalType::Uint(_) | ClassicalType::Bit(_), Value::Float(f)) => {
            #[allow(clippy::cast_possible_truncation)]
            let truncated = f.trunc() as i64;
            coerce(ty, Value::Int(truncated))
        }
        (ClassicalType::Angle(_), Value::Float(f)) => coerce(ty, Value::Float(f % TAU)),
        _ => coerce(ty, value),
    }
}

fn integral(value: &Value) -> Result<i64, String> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!("cannot convert {other} to an integer")),
    }
}

impl Analyzer<'_> {
    /// Resolve a syntactic type, folding its widths.
    pub(crate) fn resolve_type(&mut self, spec: &TypeSpec) -> SemResult<ClassicalType> {
        Ok(match spec {
            TypeSpec::Bool => ClassicalType::Bool,
            TypeSpec::Int(w) => ClassicalType::Int(self.int_width(w.as_deref())?),
            TypeSpec::Uint(w) => ClassicalType::Uint(self.int_width(w.as_deref())?),
            TypeSpec::Float(w) => ClassicalType::Float(self.float_width(w.as_deref())?),
            TypeSpec::Complex(w) => ClassicalType::Complex(self.float_width(w.as_deref())?),
            TypeSpec::Angle(w) => ClassicalType::Angle(match w {
                Some(e) => self.resolve_width(e)?,
                None => DEFAULT_ANGLE_WIDTH,
            }),
            TypeSpec::Bit(w) => ClassicalType::Bit(match w {
                Some(e) => self.resolve_width(e)?,
                None => 1,
            }),
            TypeSpec::Duration => ClassicalType::Duration,
            TypeSpec::Stretch => ClassicalType::Stretch,
            TypeSpec::Array { element, dims } => {
                let element = self.resolve_type(element)?;
                if matches!(element, ClassicalType::Array { .. }) {
                    return Err(self.local(
                        DiagnosticKind::TypeMismatch,
                        "array elements cannot be arrays; use extra dimensions",
                    ));
                }
                let dims = dims
                    .iter()
                    .map(|d| self.resolve_width(d).map(|n| n as usize))
                    .collect::<SemResult<Vec<_>>>()?;
                ClassicalType::Array {
                    element: Box::new(element),
                    dims,
                }
            }
        })
    }

    /// Fold a width or size expression to a positive integer.
    pub(crate) fn resolve_width(&mut self, expr: &Expression) -> SemResult<u32> {
        match self.fold(expr)? {
            Some(Value::Int(n)) if n > 0 => u32::try_from(n)
                .map_err(|_| self.local(DiagnosticKind::TypeMismatch, format!("width {n} is too large"))),
            Some(Value::Int(n)) => Err(self.local(
                DiagnosticKind::TypeMismatch,
                format!("width must be positive, found {n}"),
            )),
            Some(other) => Err(self.local(
                DiagnosticKind::TypeMismatch,
                format!("width must be an integer, found {other}"),
            )),
            None => Err(self.local(
                DiagnosticKind::NonConstantBound,
                format!(
                    "width `{}` is not a compile-time constant",
                    qfold_qasm3::print_expression(expr)
                ),
            )),
        }
    }

    fn int_width(&mut self, expr: Option<&Expression>) -> SemResult<u32> {
        let Some(expr) = expr else {
            return Ok(DEFAULT_INT_WIDTH);
        };
        let n = self.resolve_width(expr)?;
        if n > 64 {
            return Err(self.local(
                DiagnosticKind::TypeMismatch,
                format!("integer width {n} exceeds 64"),
            ));
        }
        Ok(n)
    }

    fn float_width(&mut self, expr: Option<&Expression>) -> SemResult<u32> {
        let Some(expr) = expr else {
            return Ok(DEFAULT_FLOAT_WIDTH);
        };
        let n = self.resolve_width(expr)?;
        if !FLOAT_WIDTHS.contains(&n) {
            return Err(self.local(
                DiagnosticKind::TypeMismatch,
                format!("float width must be one of 16, 32, 64, 128; found {n}"),
            ));
        }
        Ok(n)
    }

    /// Static type of a classical expression. Never evaluates subroutine
    /// calls.
    pub(crate) fn infer(&mut self, expr: &Expression) -> SemResult<ClassicalType> {
        use ClassicalType as T;
        Ok(match expr {
            Expression::Int(_) => T::Int(DEFAULT_INT_WIDTH),
            Expression::Float(_) | Expression::Pi | Expression::Tau | Expression::Euler => {
                T::Float(DEFAULT_FLOAT_WIDTH)
            }
            Expression::Imag(_) => T::Complex(DEFAULT_FLOAT_WIDTH),
            Expression::Bool(_) => T::Bool,
            Expression::BitString(s) => T::Bit(u32::try_from(s.len()).unwrap_or(u32::MAX)),
            Expression::Duration(..) => T::Duration,
            Expression::Identifier(name) => {
                let Some(symbol) = self.scopes.resolve(name) else {
                    return Err(self.local(
                        DiagnosticKind::UndefinedSymbol,
                        format!("undefined name `{name}`"),
                    ));
                };
                match (&symbol.binding, &symbol.ty) {
                    (Binding::Param(_), _) => T::Angle(DEFAULT_ANGLE_WIDTH),
                    (_, Some(ty)) => ty.clone(),
                    _ => {
                        let kind = symbol.kind;
                        return Err(self.not_a_value(name, kind));
                    }
                }
            }
            Expression::Unary { op, operand } => {
                let ty = self.infer(operand)?;
                match op {
                    UnaryOp::Not => T::Bool,
                    UnaryOp::Neg if ty == T::Bool => {
                        return Err(self.local(
                            DiagnosticKind::TypeMismatch,
                            "cannot negate a bool",
                        ));
                    }
                    UnaryOp::Neg | UnaryOp::BitNot => ty,
                }
            }
            Expression::BinOp { left, op, right } => {
                let l = self.infer(left)?;
                let r = self.infer(right)?;
                binary_type(*op, &l, &r)
                    .map_err(|msg| self.local(DiagnosticKind::TypeMismatch, msg))?
            }
            Expression::FnCall { name, args } => {
                let return_type = match self.scopes.resolve(name).map(|s| &s.binding) {
                    Some(Binding::Subroutine(def)) => def.return_type.clone(),
                    Some(_) => {
                        return Err(self.local(
                            DiagnosticKind::TypeMismatch,
                            format!("`{name}` is not callable"),
                        ));
                    }
                    None if crate::consteval::is_math_function(name) => {
                        for arg in args {
                            self.infer(arg)?;
                        }
                        return Ok(T::Float(DEFAULT_FLOAT_WIDTH));
                    }
                    None => {
                        return Err(self.local(
                            DiagnosticKind::UndefinedSymbol,
                            format!("undefined subroutine `{name}`"),
                        ));
                    }
                };
                match return_type {
                    Some(spec) => self.resolve_type(&spec)?,
                    None => {
                        return Err(self.local(
                            DiagnosticKind::TypeMismatch,
                            format!("subroutine `{name}` does not return a value"),
                        ));
                    }
                }
            }
            Expression::Index { base, items } => {
                let mut ty = self.infer(base)?;
                for item in items {
                    ty = match item {
                        IndexItem::Single(_) => ty.indexed(),
                        IndexItem::Range(_) | IndexItem::Set(_) => match ty {
                            T::Int(_) | T::Uint(_) | T::Bit(_) => ty.width().map(T::Bit),
                            T::Array { .. } => Some(ty.clone()),
                            _ => None,
                        },
                    }
                    .ok_or_else(|| {
                        self.local(DiagnosticKind::TypeMismatch, "value cannot be indexed")
                    })?;
                }
                ty
            }
            Expression::Cast { ty, .. } => self.resolve_type(ty)?,
            Expression::Array(items) => {
                let element = match items.first() {
                    Some(first) => self.infer(first)?,
                    None => T::Int(DEFAULT_INT_WIDTH),
                };
                match element {
                    T::Array { element, mut dims } => {
                        dims.insert(0, items.len());
                        T::Array { element, dims }
                    }
                    scalar => T::Array {
                        element: Box::new(scalar),
                        dims: vec![items.len()],
                    },
                }
            }
            Expression::Measure(operand) => {
                let n = self.quantum_view(operand)?.len();
                T::Bit(n)
            }
            Expression::Paren(inner) => self.infer(inner)?,
        })
    }

    /// Error for a name that exists but has no classical value.
    pub(crate) fn not_a_value(&self, name: &str, kind: SymbolKind) -> crate::analyzer::SemError {
        let what = match kind {
            SymbolKind::QuantumRegister | SymbolKind::Alias => "a quantum register",
            SymbolKind::GateDefinition => "a gate",
            SymbolKind::SubroutineDefinition => "a subroutine",
            _ => "not a classical value",
        };
        self.local(
            DiagnosticKind::TypeMismatch,
            format!("`{name}` is {what} and cannot be used as a classical value"),
        )
    }

    /// Check an initializer against a declared type, element-wise for
    /// array literals.
    pub(crate) fn check_initializer(&mut self, ty: &ClassicalType, expr: &Expression) -> SemResult<()> {
        if let (ClassicalType::Array { element, dims }, Expression::Array(items)) =
            (ty, expr.unparen())
        {
            if items.len() != dims[0] {
                return Err(self.local(
                    DiagnosticKind::TypeMismatch,
                    format!(
                        "array literal has {} elements, expected {}",
                        items.len(),
                        dims[0]
                    ),
                ));
            }
            let inner = if dims.len() > 1 {
                ClassicalType::Array {
                    element: element.clone(),
                    dims: dims[1..].to_vec(),
                }
            } else {
                (**element).clone()
            };
            for item in items {
                self.check_initializer(&inner, item)?;
            }
            return Ok(());
        }
        let value_ty = self.infer(expr)?;
        check_assignable(ty, &value_ty)
            .and_then(|()| check_literal_fit(ty, expr))
            .map_err(|msg| self.local(DiagnosticKind::TypeMismatch, msg))
    }
}

fn binary_type(op: BinOp, l: &ClassicalType, r: &ClassicalType) -> Result<ClassicalType, String> {
    use ClassicalType as T;
    match op {
        BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq
        | BinOp::And | BinOp::Or => Ok(T::Bool),
        BinOp::Concat => match (l, r) {
            (
                T::Array { element: a, dims: da },
                T::Array { element: b, dims: db },
            ) if a == b && da[1..] == db[1..] => {
                let mut dims = da.clone();
                dims[0] += db[0];
                Ok(T::Array { element: a.clone(), dims })
            }
            _ => Err(format!("cannot concatenate {l} and {r}")),
        },
        _ if *l == T::Bool || *r == T::Bool => Err(format!(
            "operator `{}` is not defined for bool",
            op.symbol()
        )),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::LShift | BinOp::RShift => {
            match (l, r) {
                (T::Float(_) | T::Complex(_), _) | (_, T::Float(_) | T::Complex(_)) => Err(format!(
                    "operator `{}` needs integer operands",
                    op.symbol()
                )),
                _ => Ok(l.clone()),
            }
        }
        _ => Ok(match (l, r) {
            (T::Complex(n), _) | (_, T::Complex(n)) => T::Complex(*n),
            (T::Duration, _) | (_, T::Duration) => T::Duration,
            (T::Float(a), T::Float(b)) => T::Float((*a).max(*b)),
            (T::Float(n), _) | (_, T::Float(n)) => T::Float(*n),
            (T::Angle(n), _) | (_, T::Angle(n)) => T::Angle(*n),
            (T::Int(a), T::Int(b)) => T::Int((*a).max(*b)),
            (T::Int(n), _) | (_, T::Int(n)) => T::Int(*n),
            (T::Uint(a), T::Uint(b)) => T::Uint((*a).max(*b)),
            (T::Uint(n), _) | (_, T::Uint(n)) => T::Uint(*n),
            _ => T::Int(DEFAULT_INT_WIDTH),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_conversions() {
        use ClassicalType as T;
        assert!(check_assignable(&T::Float(64), &T::Int(32)).is_ok());
        assert!(check_assignable(&T::Angle(32), &T::Float(64)).is_ok());
        assert!(check_assignable(&T::Bit(1), &T::Bool).is_ok());
        assert!(check_assignable(&T::Bool, &T::Int(8)).is_ok());
        assert!(check_assignable(&T::Int(32), &T::Bool).is_err());
        assert!(check_assignable(&T::Float(64), &T::Bool).is_err());
        assert!(check_assignable(&T::Int(32), &T::Float(64)).is_err());
    }

    #[test]
    fn test_array_elements_match_exactly() {
        let a = |e: ClassicalType| ClassicalType::Array {
            element: Box::new(e),
            dims: vec![3],
        };
        assert!(check_assignable(&a(ClassicalType::Int(8)), &a(ClassicalType::Int(8))).is_ok());
        assert!(check_assignable(&a(ClassicalType::Int(8)), &a(ClassicalType::Int(16))).is_err());
    }

    #[test]
    fn test_literal_fit() {
        let lit = Expression::Int(128);
        let neg = Expression::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(Expression::Int(128)),
        };
        assert!(check_literal_fit(&ClassicalType::Int(8), &lit).is_err());
        assert!(check_literal_fit(&ClassicalType::Int(8), &neg).is_ok());
        assert!(check_literal_fit(&ClassicalType::Uint(8), &Expression::Int(255)).is_ok());
        assert!(check_literal_fit(&ClassicalType::Uint(8), &Expression::Int(256)).is_err());
        assert!(check_literal_fit(&ClassicalType::Uint(8), &neg).is_err());
        assert!(check_literal_fit(&ClassicalType::Bit(2), &Expression::Int(4)).is_err());
    }

    #[test]
    fn test_wrapping() {
        assert_eq!(wrap_signed(200, 8), -56);
        assert_eq!(wrap_signed(-129, 8), 127);
        assert_eq!(wrap_unsigned(-1, 4), 15);
        assert_eq!(wrap_unsigned(300, 8), 44);
    }

    #[test]
    fn test_angle_range_and_normalization() {
        let ty = ClassicalType::Angle(32);
        let Value::Float(v) = coerce(&ty, Value::Float(-1.0)).unwrap() else {
            panic!("expected float");
        };
        assert!((v - (TAU - 1.0)).abs() < 1e-12);
        assert!(coerce(&ty, Value::Float(7.0)).is_err());
        assert!(coerce(&ty, Value::Float(f64::NAN)).is_err());
    }

    #[test]
    fn test_cast_truncates() {
        assert_eq!(
            cast(&ClassicalType::Int(32), Value::Float(2.9)).unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn test_binary_types() {
        use ClassicalType as T;
        assert_eq!(binary_type(BinOp::Add, &T::Int(8), &T::Float(32)), Ok(T::Float(32)));
        assert_eq!(binary_type(BinOp::Lt, &T::Int(8), &T::Int(8)), Ok(T::Bool));
        assert!(binary_type(BinOp::Add, &T::Bool, &T::Int(8)).is_err());
        assert!(binary_type(BinOp::BitAnd, &T::Float(64), &T::Int(8)).is_err());
    }

    #[test]
    fn test_display() {
        let ty = ClassicalType::Array {
            element: Box::new(ClassicalType::Uint(8)),
            dims: vec![2, 3],
        };
        assert_eq!(ty.to_string(), "array[uint[8], 2, 3]");
        assert_eq!(ty.width(), Some(2));
    }
}
