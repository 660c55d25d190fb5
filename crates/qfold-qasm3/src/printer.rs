//! Pretty-printer turning a syntax tree back into QASM3 source.
//!
//! Parentheses are emitted only where operator precedence needs them, so
//! printing a parsed program and parsing the result gives back the same
//! tree modulo redundant [`Expression::Paren`] nodes.

use crate::ast::{
    ClassicalDecl, Expression, ForIterable, GateCall, GateModifier, IndexItem, IoModifier, Param,
    Program, RangeExpr, Statement, StmtKind, TypeSpec, UNARY_PRECEDENCE, UnaryOp,
};

/// Print a whole program.
pub fn print_program(program: &Program) -> String {
    let mut printer = Printer::new();
    if let Some(version) = &program.version {
        printer.writeln(&format!("OPENQASM {version};"));
    }
    for stmt in &program.statements {
        printer.statement(stmt);
    }
    printer.output
}

/// Print one statement (with a trailing newline).
pub fn print_statement(stmt: &Statement) -> String {
    let mut printer = Printer::new();
    printer.statement(stmt);
    printer.output
}

/// Print an expression.
pub fn print_expression(expr: &Expression) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, 0);
    out
}

/// Print a type.
pub fn print_type(ty: &TypeSpec) -> String {
    let mut out = String::new();
    write_type(&mut out, ty);
    out
}

struct Printer {
    output: String,
    indent: usize,
}

impl Printer {
    fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
        }
    }

    fn writeln(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(line);
        self.output.push('\n');
    }

    fn block(&mut self, header: &str, body: &[Statement]) {
        self.writeln(&format!("{header} {{"));
        self.indent += 1;
        for stmt in body {
            self.statement(stmt);
        }
        self.indent -= 1;
        self.writeln("}");
    }

    fn statement(&mut self, stmt: &Statement) {
        match &stmt.kind {
            StmtKind::Include(path) => self.writeln(&format!("include \"{path}\";")),
            StmtKind::QubitDecl { name, size } => match size {
                Some(size) => self.writeln(&format!("qubit[{}] {name};", print_expression(size))),
                None => self.writeln(&format!("qubit {name};")),
            },
            StmtKind::ClassicalDecl(decl) => self.writeln(&classical_decl(decl)),
            StmtKind::Alias { name, value } => {
                self.writeln(&format!("let {name} = {};", print_expression(value)));
            }
            StmtKind::Gate(call) => self.writeln(&format!("{};", gate_call(call))),
            StmtKind::Measure { qubits, target } => {
                let qubits = print_expression(qubits);
                match target {
                    Some(target) => {
                        self.writeln(&format!("{} = measure {qubits};", print_expression(target)));
                    }
                    None => self.writeln(&format!("measure {qubits};")),
                }
            }
            StmtKind::Reset(operand) => {
                self.writeln(&format!("reset {};", print_expression(operand)));
            }
            StmtKind::Barrier(operands) => {
                if operands.is_empty() {
                    self.writeln("barrier;");
                } else {
                    self.writeln(&format!("barrier {};", expression_list(operands)));
                }
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                self.block(&format!("if ({})", print_expression(condition)), then_body);
                if let Some(else_body) = else_body {
                    self.block("else", else_body);
                }
            }
            StmtKind::For {
                var_type,
                variable,
                iterable,
                body,
            } => {
                let ty = var_type
                    .as_ref()
                    .map(|t| format!("{} ", print_type(t)))
                    .unwrap_or_default();
                let iterable = match iterable {
                    ForIterable::Range(range) => format!("[{}]", range_expr(range)),
                    ForIterable::Set(items) => format!("{{{}}}", expression_list(items)),
                    ForIterable::Expr(expr) => print_expression(expr),
                };
                self.block(&format!("for {ty}{variable} in {iterable}"), body);
            }
            StmtKind::While { condition, body } => {
                self.block(&format!("while ({})", print_expression(condition)), body);
            }
            StmtKind::Break => self.writeln("break;"),
            StmtKind::Continue => self.writeln("continue;"),
            StmtKind::Return(value) => match value {
                Some(value) => self.writeln(&format!("return {};", print_expression(value))),
                None => self.writeln("return;"),
            },
            StmtKind::Block(body) => {
                self.writeln("{");
                self.indent += 1;
                for stmt in body {
                    self.statement(stmt);
                }
                self.indent -= 1;
                self.writeln("}");
            }
            StmtKind::SubroutineDef(def) => {
                let params: Vec<String> = def.params.iter().map(param).collect();
                let ret = def
                    .return_type
                    .as_ref()
                    .map(|t| format!(" -> {}", print_type(t)))
                    .unwrap_or_default();
                self.block(
                    &format!("def {}({}){ret}", def.name, params.join(", ")),
                    &def.body,
                );
            }
            StmtKind::GateDef(def) => {
                let params = if def.params.is_empty() {
                    String::new()
                } else {
                    format!("({})", def.params.join(", "))
                };
                self.block(
                    &format!("gate {}{params} {}", def.name, def.qubits.join(", ")),
                    &def.body,
                );
            }
            StmtKind::Assignment { target, op, value } => {
                let op = match op.binop() {
                    Some(binop) => format!("{}=", binop.symbol()),
                    None => "=".to_string(),
                };
                self.writeln(&format!(
                    "{} {op} {};",
                    print_expression(target),
                    print_expression(value)
                ));
            }
            StmtKind::Expr(expr) => self.writeln(&format!("{};", print_expression(expr))),
            StmtKind::Pragma(text) => self.writeln(&format!("#pragma {text}")),
            StmtKind::Annotation { keyword, content } => {
                if content.is_empty() {
                    self.writeln(&format!("@{keyword}"));
                } else {
                    self.writeln(&format!("@{keyword} {content}"));
                }
            }
        }
    }
}

fn classical_decl(decl: &ClassicalDecl) -> String {
    let mut line = String::new();
    if decl.is_const {
        line.push_str("const ");
    }
    match decl.io {
        Some(IoModifier::Input) => line.push_str("input "),
        Some(IoModifier::Output) => line.push_str("output "),
        None => {}
    }
    write_type(&mut line, &decl.ty);
    line.push(' ');
    line.push_str(&decl.name);
    if let Some(init) = &decl.init {
        line.push_str(" = ");
        write_expr(&mut line, init, 0);
    }
    line.push(';');
    line
}

/// Print a gate call without the trailing `;`.
pub fn gate_call(call: &GateCall) -> String {
    let mut out = String::new();
    for modifier in &call.modifiers {
        match modifier {
            GateModifier::Inv => out.push_str("inv"),
            GateModifier::Pow(exp) => out.push_str(&format!("pow({})", print_expression(exp))),
            GateModifier::Ctrl(n) | GateModifier::NegCtrl(n) => {
                out.push_str(if matches!(modifier, GateModifier::Ctrl(_)) {
                    "ctrl"
                } else {
                    "negctrl"
                });
                if let Some(n) = n {
                    out.push_str(&format!("({})", print_expression(n)));
                }
            }
        }
        out.push_str(" @ ");
    }
    out.push_str(&call.name);
    if !call.params.is_empty() {
        out.push_str(&format!("({})", expression_list(&call.params)));
    }
    out.push(' ');
    out.push_str(&expression_list(&call.qubits));
    out
}

fn param(p: &Param) -> String {
    match p {
        Param::Classical { ty, name } => format!("{} {name}", print_type(ty)),
        Param::Qubit { name, size: None } => format!("qubit {name}"),
        Param::Qubit {
            name,
            size: Some(size),
        } => format!("qubit[{}] {name}", print_expression(size)),
    }
}

fn expression_list(exprs: &[Expression]) -> String {
    exprs
        .iter()
        .map(print_expression)
        .collect::<Vec<_>>()
        .join(", ")
}

fn range_expr(range: &RangeExpr) -> String {
    let part = |e: &Option<Box<Expression>>| e.as_deref().map(print_expression).unwrap_or_default();
    match &range.step {
        Some(step) => format!(
            "{}:{}:{}",
            part(&range.start),
            print_expression(step),
            part(&range.end)
        ),
        None => format!("{}:{}", part(&range.start), part(&range.end)),
    }
}

fn write_designator(out: &mut String, size: Option<&Expression>) {
    if let Some(size) = size {
        out.push('[');
        write_expr(out, size, 0);
        out.push(']');
    }
}

fn write_type(out: &mut String, ty: &TypeSpec) {
    match ty {
        TypeSpec::Bool => out.push_str("bool"),
        TypeSpec::Int(w) => {
            out.push_str("int");
            write_designator(out, w.as_deref());
        }
        TypeSpec::Uint(w) => {
            out.push_str("uint");
            write_designator(out, w.as_deref());
        }
        TypeSpec::Float(w) => {
            out.push_str("float");
            write_designator(out, w.as_deref());
        }
        TypeSpec::Angle(w) => {
            out.push_str("angle");
            write_designator(out, w.as_deref());
        }
        TypeSpec::Bit(w) => {
            out.push_str("bit");
            write_designator(out, w.as_deref());
        }
        TypeSpec::Complex(w) => {
            out.push_str("complex");
            if let Some(w) = w {
                out.push_str("[float[");
                write_expr(out, w, 0);
                out.push_str("]]");
            }
        }
        TypeSpec::Duration => out.push_str("duration"),
        TypeSpec::Stretch => out.push_str("stretch"),
        TypeSpec::Array { element, dims } => {
            out.push_str("array[");
            write_type(out, element);
            for dim in dims {
                out.push_str(", ");
                write_expr(out, dim, 0);
            }
            out.push(']');
        }
    }
}

fn precedence(expr: &Expression) -> u8 {
    match expr {
        Expression::BinOp { op, .. } => op.precedence(),
        Expression::Unary { .. } => UNARY_PRECEDENCE,
        _ => u8::MAX,
    }
}

/// Write `expr`, parenthesized if it binds looser than `min_prec`.
fn write_expr(out: &mut String, expr: &Expression, min_prec: u8) {
    let wrap = precedence(expr) < min_prec;
    if wrap {
        out.push('(');
    }
    match expr {
        Expression::Int(n) => out.push_str(&n.to_string()),
        Expression::Float(f) => out.push_str(&format!("{f:?}")),
        Expression::Imag(f) => out.push_str(&format!("{f:?}im")),
        Expression::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Expression::BitString(bits) => out.push_str(&format!("\"{bits}\"")),
        Expression::Duration(v, unit) => out.push_str(&format!("{v:?}{unit}")),
        Expression::Identifier(name) => out.push_str(name),
        Expression::Pi => out.push_str("pi"),
        Expression::Tau => out.push_str("tau"),
        Expression::Euler => out.push_str("euler"),
        Expression::Unary { op, operand } => {
            out.push(match op {
                UnaryOp::Neg => '-',
                UnaryOp::Not => '!',
                UnaryOp::BitNot => '~',
            });
            write_expr(out, operand, UNARY_PRECEDENCE);
        }
        Expression::BinOp { left, op, right } => {
            let prec = op.precedence();
            let (left_min, right_min) = if op.is_right_assoc() {
                (prec + 1, prec)
            } else {
                (prec, prec + 1)
            };
            write_expr(out, left, left_min);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            write_expr(out, right, right_min);
        }
        Expression::FnCall { name, args } => {
            out.push_str(name);
            out.push('(');
            out.push_str(&expression_list(args));
            out.push(')');
        }
        Expression::Index { base, items } => {
            write_expr(out, base, u8::MAX);
            out.push('[');
            let items: Vec<String> = items
                .iter()
                .map(|item| match item {
                    IndexItem::Single(e) => print_expression(e),
                    IndexItem::Range(r) => range_expr(r),
                    IndexItem::Set(s) => format!("{{{}}}", expression_list(s)),
                })
                .collect();
            out.push_str(&items.join(", "));
            out.push(']');
        }
        Expression::Cast { ty, operand } => {
            write_type(out, ty);
            out.push('(');
            write_expr(out, operand, 0);
            out.push(')');
        }
        Expression::Array(items) => {
            out.push('{');
            out.push_str(&expression_list(items));
            out.push('}');
        }
        Expression::Measure(operand) => {
            out.push_str("measure ");
            write_expr(out, operand, u8::MAX);
        }
        Expression::Paren(inner) => {
            out.push('(');
            write_expr(out, inner, 0);
            out.push(')');
        }
    }
    if wrap {
        out.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn reprint(source: &str) -> String {
        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "{errors:?}");
        print_program(&program)
    }

    #[test]
    fn test_print_is_stable() {
        let source = r#"
            OPENQASM 3.0;
            include "stdgates.inc";
            qubit[2] q;
            bit[2] c;
            const int[32] n = 2 * (3 + 1);
            gate g(a) x, y { ctrl @ rz(a / 2) x, y; }
            for int i in [0:n - 1] { h q[i % 2]; }
            if (c == 1) { x q[0]; } else { y q[1]; }
            c[0] = measure q[0];
            negctrl(1) @ inv @ pow(2) @ x q[0], q[1];
        "#;
        let once = reprint(source);
        let twice = reprint(&once);
        assert_eq!(once, twice);
        assert!(once.contains("const int[32] n = 2 * (3 + 1);"));
        assert!(once.contains("negctrl(1) @ inv @ pow(2) @ x q[0], q[1];"));
    }

    #[test]
    fn test_minimal_parentheses() {
        let expr = Expression::BinOp {
            left: Box::new(Expression::BinOp {
                left: Box::new(Expression::Int(1)),
                op: crate::ast::BinOp::Sub,
                right: Box::new(Expression::Int(2)),
            }),
            op: crate::ast::BinOp::Sub,
            right: Box::new(Expression::BinOp {
                left: Box::new(Expression::Int(3)),
                op: crate::ast::BinOp::Sub,
                right: Box::new(Expression::Int(4)),
            }),
        };
        assert_eq!(print_expression(&expr), "1 - 2 - (3 - 4)");
    }

    #[test]
    fn test_float_keeps_decimal_point() {
        assert_eq!(print_expression(&Expression::Float(1.0)), "1.0");
    }
}
