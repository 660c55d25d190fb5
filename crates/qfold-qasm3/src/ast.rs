//! Abstract Syntax Tree for `OpenQASM` 3.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location of a statement (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Line number.
    pub line: usize,
    /// Column number.
    pub column: usize,
}

impl Span {
    /// Create a span.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A complete QASM3 program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// QASM version (e.g., "3.0"), if a version line is present.
    pub version: Option<String>,
    /// Statements in the program.
    pub statements: Vec<Statement>,
}

/// A statement with its location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// What the statement does.
    pub kind: StmtKind,
    /// Where it starts.
    pub span: Span,
}

impl Statement {
    /// Create a statement.
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The statement variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// Include statement.
    Include(String),

    /// Qubit register declaration: `qubit[n] q;`, `qubit q;` or `qreg q[n];`
    QubitDecl { name: String, size: Option<Expression> },

    /// Classical declaration, including `bit[n] c;` and `creg c[n];`
    ClassicalDecl(ClassicalDecl),

    /// Alias: `let a = q[0:1] ++ r;`
    Alias { name: String, value: Expression },

    /// Gate application.
    Gate(GateCall),

    /// Measurement: `measure q -> c;`, `c = measure q;` or `measure q;`
    Measure {
        qubits: Expression,
        target: Option<Expression>,
    },

    /// Reset: `reset q;`
    Reset(Expression),

    /// Barrier: `barrier q, r;` (empty means all qubits)
    Barrier(Vec<Expression>),

    /// If statement.
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        else_body: Option<Vec<Statement>>,
    },

    /// For loop.
    For {
        var_type: Option<TypeSpec>,
        variable: String,
        iterable: ForIterable,
        body: Vec<Statement>,
    },

    /// While loop.
    While {
        condition: Expression,
        body: Vec<Statement>,
    },

    /// `break;`
    Break,

    /// `continue;`
    Continue,

    /// `return [expr];`
    Return(Option<Expression>),

    /// Bare block `{ ... }`.
    Block(Vec<Statement>),

    /// Subroutine definition.
    SubroutineDef(SubroutineDef),

    /// Gate definition.
    GateDef(GateDef),

    /// Classical assignment.
    Assignment {
        target: Expression,
        op: AssignOp,
        value: Expression,
    },

    /// Expression statement, usually a subroutine call.
    Expr(Expression),

    /// `#pragma ...`
    Pragma(String),

    /// `@keyword content`
    Annotation { keyword: String, content: String },
}

/// I/O qualifier of a classical declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoModifier {
    /// `input`: value supplied at runtime.
    Input,
    /// `output`.
    Output,
}

/// A classical variable declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassicalDecl {
    /// Declared type.
    pub ty: TypeSpec,
    /// Variable name.
    pub name: String,
    /// Initializer.
    pub init: Option<Expression>,
    /// Declared `const`.
    pub is_const: bool,
    /// `input`/`output` qualifier.
    pub io: Option<IoModifier>,
}

/// Classical type as written in source; widths are unevaluated expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeSpec {
    Bool,
    Int(Option<Box<Expression>>),
    Uint(Option<Box<Expression>>),
    Float(Option<Box<Expression>>),
    Angle(Option<Box<Expression>>),
    Bit(Option<Box<Expression>>),
    /// `complex[float[n]]`; holds the float width.
    Complex(Option<Box<Expression>>),
    Duration,
    Stretch,
    Array {
        element: Box<TypeSpec>,
        dims: Vec<Expression>,
    },
}

/// What a `for` loop iterates over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForIterable {
    /// `[start:stop]` or `[start:step:stop]`
    Range(RangeExpr),
    /// `{a, b, c}`
    Set(Vec<Expression>),
    /// An array-valued expression.
    Expr(Expression),
}

/// Inclusive range with optional parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeExpr {
    pub start: Option<Box<Expression>>,
    pub step: Option<Box<Expression>>,
    pub end: Option<Box<Expression>>,
}

/// One comma-separated item inside `[...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexItem {
    /// `q[i]`
    Single(Expression),
    /// `q[a:b]`
    Range(RangeExpr),
    /// `q[{0, 2}]`
    Set(Vec<Expression>),
}

/// A gate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCall {
    /// Gate name.
    pub name: String,
    /// Gate parameters (angles, etc.).
    pub params: Vec<Expression>,
    /// Qubit operands.
    pub qubits: Vec<Expression>,
    /// Modifiers in declared order (outermost first).
    pub modifiers: Vec<GateModifier>,
}

/// Gate modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GateModifier {
    /// Control modifier: `ctrl @ gate` or `ctrl(k) @ gate`
    Ctrl(Option<Expression>),
    /// Negated control: `negctrl @ gate`
    NegCtrl(Option<Expression>),
    /// Inverse: `inv @ gate`
    Inv,
    /// Power: `pow(n) @ gate`
    Pow(Expression),
}

/// A gate definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDef {
    pub name: String,
    pub params: Vec<String>,
    pub qubits: Vec<String>,
    pub body: Vec<Statement>,
}

/// A subroutine parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Param {
    /// `int[32] a`
    Classical { ty: TypeSpec, name: String },
    /// `qubit q` or `qubit[n] q`
    Qubit {
        name: String,
        size: Option<Expression>,
    },
}

impl Param {
    /// Parameter name.
    pub fn name(&self) -> &str {
        match self {
            Param::Classical { name, .. } | Param::Qubit { name, .. } => name,
        }
    }
}

/// A subroutine definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubroutineDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeSpec>,
    pub body: Vec<Statement>,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    /// The binary operator a compound assignment applies.
    pub fn binop(self) -> Option<BinOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinOp::Add),
            AssignOp::SubAssign => Some(BinOp::Sub),
            AssignOp::MulAssign => Some(BinOp::Mul),
            AssignOp::DivAssign => Some(BinOp::Div),
        }
    }
}

/// Timing literal units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Ns,
    Us,
    Ms,
    S,
    Dt,
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeUnit::Ns => "ns",
            TimeUnit::Us => "us",
            TimeUnit::Ms => "ms",
            TimeUnit::S => "s",
            TimeUnit::Dt => "dt",
        })
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Int(u64),
    Float(f64),
    /// Imaginary literal `2.5im`.
    Imag(f64),
    Bool(bool),
    /// Bit-string literal `"0101"`.
    BitString(String),
    Duration(f64, TimeUnit),
    Identifier(String),
    Pi,
    Tau,
    Euler,
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    BinOp {
        left: Box<Expression>,
        op: BinOp,
        right: Box<Expression>,
    },
    /// Function or subroutine call.
    FnCall {
        name: String,
        args: Vec<Expression>,
    },
    /// `base[items]`
    Index {
        base: Box<Expression>,
        items: Vec<IndexItem>,
    },
    /// Type cast: `int[8](x)`
    Cast {
        ty: TypeSpec,
        operand: Box<Expression>,
    },
    /// Array literal `{1, 2, 3}`.
    Array(Vec<Expression>),
    /// `measure q` used as a value.
    Measure(Box<Expression>),
    Paren(Box<Expression>),
}

impl Expression {
    /// Try to evaluate a literal-only expression as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Expression::Int(n) => Some(*n as f64),
            Expression::Float(f) => Some(*f),
            Expression::Pi => Some(std::f64::consts::PI),
            Expression::Tau => Some(std::f64::consts::TAU),
            Expression::Euler => Some(std::f64::consts::E),
            Expression::Unary {
                op: UnaryOp::Neg,
                operand,
            } => operand.as_f64().map(|v| -v),
            Expression::BinOp { left, op, right } => {
                let l = left.as_f64()?;
                let r = right.as_f64()?;
                Some(match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => l / r,
                    BinOp::Pow => l.powf(r),
                    _ => return None,
                })
            }
            Expression::Paren(e) => e.as_f64(),
            _ => None,
        }
    }

    /// Name of the root identifier of an operand (`q` for `q[1][0]`).
    pub fn root_name(&self) -> Option<&str> {
        match self {
            Expression::Identifier(name) => Some(name),
            Expression::Index { base, .. } => base.root_name(),
            _ => None,
        }
    }

    /// Strip redundant parentheses.
    pub fn unparen(&self) -> &Expression {
        match self {
            Expression::Paren(inner) => inner.unparen(),
            other => other,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
    /// Register concatenation `++` (aliases only).
    Concat,
}

impl BinOp {
    /// Source symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::LShift => "<<",
            BinOp::RShift => ">>",
            BinOp::Concat => "++",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Concat => 1,
            BinOp::Or => 2,
            BinOp::And => 3,
            BinOp::BitOr => 4,
            BinOp::BitXor => 5,
            BinOp::BitAnd => 6,
            BinOp::Eq | BinOp::NotEq => 7,
            BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => 8,
            BinOp::LShift | BinOp::RShift => 9,
            BinOp::Add | BinOp::Sub => 10,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 11,
            BinOp::Pow => 13,
        }
    }

    /// `**` is the only right-associative operator.
    pub fn is_right_assoc(self) -> bool {
        matches!(self, BinOp::Pow)
    }
}

/// Precedence of prefix operators: between `*` and `**`.
pub const UNARY_PRECEDENCE: u8 = 12;

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_expression_eval() {
        let expr = Expression::BinOp {
            left: Box::new(Expression::Pi),
            op: BinOp::Div,
            right: Box::new(Expression::Int(2)),
        };

        let result = expr.as_f64().unwrap();
        assert!((result - PI / 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_root_name() {
        let expr = Expression::Index {
            base: Box::new(Expression::Index {
                base: Box::new(Expression::Identifier("q".into())),
                items: vec![IndexItem::Single(Expression::Int(1))],
            }),
            items: vec![IndexItem::Single(Expression::Int(0))],
        };
        assert_eq!(expr.root_name(), Some("q"));
        assert_eq!(Expression::Int(1).root_name(), None);
    }

    #[test]
    fn test_precedence_order() {
        assert!(BinOp::Pow.precedence() > UNARY_PRECEDENCE);
        assert!(UNARY_PRECEDENCE > BinOp::Mul.precedence());
        assert!(BinOp::Add.precedence() > BinOp::Eq.precedence());
        assert!(BinOp::And.precedence() > BinOp::Or.precedence());
    }
}
