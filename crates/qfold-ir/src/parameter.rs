//! Gate parameter expressions.
//!
//! Parameters fold to [`ParameterExpression::Constant`] whenever the analyzer
//! knows their value. Parameters that depend on runtime classical values stay
//! symbolic and are re-emitted verbatim.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// A symbolic or concrete gate parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterExpression {
    /// A constant numeric value.
    Constant(f64),
    /// A runtime classical variable.
    Symbol(String),
    /// The constant π.
    Pi,
    /// Negation.
    Neg(Box<ParameterExpression>),
    /// Addition.
    Add(Box<ParameterExpression>, Box<ParameterExpression>),
    /// Subtraction.
    Sub(Box<ParameterExpression>, Box<ParameterExpression>),
    /// Multiplication.
    Mul(Box<ParameterExpression>, Box<ParameterExpression>),
    /// Division.
    Div(Box<ParameterExpression>, Box<ParameterExpression>),
    /// Exponentiation (`a ** b`).
    Pow(Box<ParameterExpression>, Box<ParameterExpression>),
    /// A builtin math function applied to one argument (`sin`, `sqrt`, ...).
    Function(String, Box<ParameterExpression>),
}

impl ParameterExpression {
    /// Create a constant parameter.
    pub fn constant(value: f64) -> Self {
        ParameterExpression::Constant(value)
    }

    /// Create a symbolic parameter.
    pub fn symbol(name: impl Into<String>) -> Self {
        ParameterExpression::Symbol(name.into())
    }

    /// Create a π constant.
    pub fn pi() -> Self {
        ParameterExpression::Pi
    }

    /// Check if this expression references any runtime symbol.
    pub fn is_symbolic(&self) -> bool {
        match self {
            ParameterExpression::Symbol(_) => true,
            ParameterExpression::Constant(_) | ParameterExpression::Pi => false,
            ParameterExpression::Neg(e) | ParameterExpression::Function(_, e) => e.is_symbolic(),
            ParameterExpression::Add(a, b)
            | ParameterExpression::Sub(a, b)
            | ParameterExpression::Mul(a, b)
            | ParameterExpression::Div(a, b)
            | ParameterExpression::Pow(a, b) => a.is_symbolic() || b.is_symbolic(),
        }
    }

    /// Try to evaluate as a concrete f64 value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterExpression::Constant(v) => Some(*v),
            ParameterExpression::Symbol(_) => None,
            ParameterExpression::Pi => Some(PI),
            ParameterExpression::Neg(e) => e.as_f64().map(|v| -v),
            ParameterExpression::Add(a, b) => Some(a.as_f64()? + b.as_f64()?),
            ParameterExpression::Sub(a, b) => Some(a.as_f64()? - b.as_f64()?),
            ParameterExpression::Mul(a, b) => Some(a.as_f64()? * b.as_f64()?),
            ParameterExpression::Div(a, b) => {
                let divisor = b.as_f64()?;
                if divisor == 0.0 {
                    return None;
                }
                Some(a.as_f64()? / divisor)
            }
            ParameterExpression::Pow(a, b) => Some(a.as_f64()?.powf(b.as_f64()?)),
            ParameterExpression::Function(name, e) => apply_function(name, e.as_f64()?),
        }
    }

    /// Fold every constant subexpression.
    pub fn simplify(&self) -> Self {
        if let Some(v) = self.as_f64() {
            return ParameterExpression::Constant(v);
        }
        let fold2 = |a: &Self, b: &Self, build: fn(Box<Self>, Box<Self>) -> Self| {
            build(Box::new(a.simplify()), Box::new(b.simplify()))
        };
        match self {
            ParameterExpression::Neg(e) => ParameterExpression::Neg(Box::new(e.simplify())),
            ParameterExpression::Function(name, e) => {
                ParameterExpression::Function(name.clone(), Box::new(e.simplify()))
            }
            ParameterExpression::Add(a, b) => fold2(a, b, ParameterExpression::Add),
            ParameterExpression::Sub(a, b) => fold2(a, b, ParameterExpression::Sub),
            ParameterExpression::Mul(a, b) => fold2(a, b, ParameterExpression::Mul),
            ParameterExpression::Div(a, b) => fold2(a, b, ParameterExpression::Div),
            ParameterExpression::Pow(a, b) => fold2(a, b, ParameterExpression::Pow),
            _ => self.clone(),
        }
    }

    /// Multiply by a scalar, folding when possible.
    pub fn scaled(&self, factor: f64) -> Self {
        if factor == 1.0 {
            return self.clone();
        }
        match self.as_f64() {
            Some(v) => ParameterExpression::Constant(v * factor),
            None => ParameterExpression::Mul(
                Box::new(ParameterExpression::Constant(factor)),
                Box::new(self.clone()),
            ),
        }
    }

    /// Negate, folding when possible.
    pub fn negated(&self) -> Self {
        match self {
            ParameterExpression::Neg(inner) => (**inner).clone(),
            _ => match self.as_f64() {
                Some(v) => ParameterExpression::Constant(-v),
                None => ParameterExpression::Neg(Box::new(self.clone())),
            },
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            ParameterExpression::Add(..) | ParameterExpression::Sub(..) => 1,
            ParameterExpression::Mul(..) | ParameterExpression::Div(..) => 2,
            ParameterExpression::Neg(_) => 3,
            ParameterExpression::Constant(v) if v.is_sign_negative() => 3,
            ParameterExpression::Pow(..) => 4,
            _ => 5,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        let own = self.precedence();
        if own < min {
            write!(f, "(")?;
        }
        match self {
            ParameterExpression::Constant(v) => write!(f, "{v}")?,
            ParameterExpression::Symbol(name) => write!(f, "{name}")?,
            ParameterExpression::Pi => write!(f, "pi")?,
            ParameterExpression::Neg(e) => {
                write!(f, "-")?;
                e.fmt_prec(f, 4)?;
            }
            ParameterExpression::Add(a, b) => binary(f, a, " + ", b, 1)?,
            ParameterExpression::Sub(a, b) => binary(f, a, " - ", b, 1)?,
            ParameterExpression::Mul(a, b) => binary(f, a, " * ", b, 2)?,
            ParameterExpression::Div(a, b) => binary(f, a, " / ", b, 2)?,
            ParameterExpression::Pow(a, b) => {
                a.fmt_prec(f, 5)?;
                write!(f, " ** ")?;
                b.fmt_prec(f, 4)?;
            }
            ParameterExpression::Function(name, e) => {
                write!(f, "{name}(")?;
                e.fmt_prec(f, 0)?;
                write!(f, ")")?;
            }
        }
        if own < min {
            write!(f, ")")?;
        }
        Ok(())
    }
}

fn binary(
    f: &mut fmt::Formatter<'_>,
    lhs: &ParameterExpression,
    op: &str,
    rhs: &ParameterExpression,
    prec: u8,
) -> fmt::Result {
    lhs.fmt_prec(f, prec)?;
    write!(f, "{op}")?;
    rhs.fmt_prec(f, prec + 1)
}

/// Evaluate one of the builtin single-argument math functions.
pub fn apply_function(name: &str, x: f64) -> Option<f64> {
    let v = match name {
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "arcsin" => x.asin(),
        "arccos" => x.acos(),
        "arctan" => x.atan(),
        "exp" => x.exp(),
        "ln" => x.ln(),
        "sqrt" => x.sqrt(),
        _ => return None,
    };
    v.is_finite().then_some(v)
}

impl fmt::Display for ParameterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

impl From<f64> for ParameterExpression {
    fn from(value: f64) -> Self {
        ParameterExpression::Constant(value)
    }
}

impl From<i32> for ParameterExpression {
    fn from(value: i32) -> Self {
        ParameterExpression::Constant(f64::from(value))
    }
}

impl std::ops::Add for ParameterExpression {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        ParameterExpression::Add(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Sub for ParameterExpression {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        ParameterExpression::Sub(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Mul for ParameterExpression {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        ParameterExpression::Mul(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Div for ParameterExpression {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        ParameterExpression::Div(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Neg for ParameterExpression {
    type Output = Self;

    fn neg(self) -> Self::Output {
        ParameterExpression::Neg(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_folding() {
        let expr = ParameterExpression::pi() / ParameterExpression::constant(2.0);
        assert!((expr.as_f64().unwrap() - PI / 2.0).abs() < 1e-12);
        assert_eq!(expr.simplify(), ParameterExpression::Constant(PI / 2.0));
    }

    #[test]
    fn test_symbolic_stays_symbolic() {
        let expr = ParameterExpression::symbol("theta") * ParameterExpression::constant(2.0);
        assert!(expr.is_symbolic());
        assert!(expr.as_f64().is_none());
    }

    #[test]
    fn test_division_by_zero_does_not_fold() {
        let expr = ParameterExpression::constant(1.0) / ParameterExpression::constant(0.0);
        assert!(expr.as_f64().is_none());
    }

    #[test]
    fn test_display_precedence() {
        let theta = ParameterExpression::symbol("theta");
        let expr = (theta.clone() + ParameterExpression::pi()) * ParameterExpression::constant(0.5);
        assert_eq!(expr.to_string(), "(theta + pi) * 0.5");

        let expr = theta.clone() - (ParameterExpression::pi() - theta.clone());
        assert_eq!(expr.to_string(), "theta - (pi - theta)");

        let expr = -ParameterExpression::constant(-0.25);
        assert_eq!(expr.to_string(), "-(-0.25)");

        let expr = ParameterExpression::Function("sin".into(), Box::new(theta));
        assert_eq!(expr.to_string(), "sin(theta)");
    }

    #[test]
    fn test_scaled_and_negated() {
        let half = ParameterExpression::pi().scaled(0.5);
        assert_eq!(half, ParameterExpression::Constant(PI / 2.0));

        let theta = ParameterExpression::symbol("theta");
        assert_eq!(theta.negated().negated(), theta);
        assert_eq!(theta.scaled(2.0).to_string(), "2 * theta");
    }
}
