//! Re-emission of an analyzed module as flat OpenQASM 3 source.

use qfold_ir::{Instruction, InstructionKind};
use qfold_qasm3::{IoModifier, Span, Statement, StmtKind, print_expression, print_statement, print_type};

use crate::module::{FlatStatement, Module};

const INDENT: &str = "    ";

struct Emitter<'m> {
    module: &'m Module,
    out: String,
    indent: usize,
}

impl<'m> Emitter<'m> {
    fn new(module: &'m Module) -> Self {
        Self {
            module,
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn header(&mut self) {
        let version = self.module.version().unwrap_or("3.0");
        self.line(&format!("OPENQASM {version};"));
        if self.module.includes_stdgates() {
            self.line("include \"stdgates.inc\";");
        }
        for def in &self.module.external_gates {
            let stmt = Statement {
                kind: StmtKind::GateDef(def.clone()),
                span: Span::default(),
            };
            self.out.push_str(&print_statement(&stmt));
        }
        for reg in self.module.qubit_registers() {
            self.line(&format!("qubit[{}] {};", reg.size, reg.name));
        }
        for reg in self.module.clbit_registers() {
            self.line(&format!("bit[{}] {};", reg.size, reg.name));
        }
        for decl in self.module.declarations() {
            let io = match decl.io {
                Some(IoModifier::Input) => "input ",
                Some(IoModifier::Output) => "output ",
                None => "",
            };
            self.line(&format!("{io}{} {};", print_type(&decl.ty.to_spec()), decl.name));
        }
    }

    fn statements(&mut self, body: &[FlatStatement]) {
        for stmt in body {
            match stmt {
                FlatStatement::Op(inst) => {
                    let text = self.instruction(inst);
                    self.line(&text);
                }
                FlatStatement::Assign { target, value } => {
                    self.line(&format!(
                        "{} = {};",
                        print_expression(target),
                        print_expression(value)
                    ));
                }
                FlatStatement::Branch {
                    condition,
                    then_body,
                    else_body,
                    ..
                } => {
                    self.line(&format!("if ({}) {{", print_expression(condition)));
                    self.nested(then_body);
                    if else_body.is_empty() {
                        self.line("}");
                    } else {
                        self.line("} else {");
                        self.nested(else_body);
                        self.line("}");
                    }
                }
                FlatStatement::Pragma(text) => {
                    let stmt = Statement {
                        kind: StmtKind::Pragma(text.clone()),
                        span: Span::default(),
                    };
                    self.line(print_statement(&stmt).trim_end());
                }
            }
        }
    }

    fn nested(&mut self, body: &[FlatStatement]) {
        self.indent += 1;
        self.statements(body);
        self.indent -= 1;
    }

    fn qubit(&self, q: qfold_ir::QubitId) -> String {
        match self.module.qubit_location(q) {
            Some((name, index)) => format!("{name}[{index}]"),
            None => format!("${}", q.0),
        }
    }

    fn qubit_list(&self, inst: &Instruction) -> String {
        let mut out = String::new();
        for (i, &q) in inst.qubits.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&self.qubit(q));
        }
        out
    }

    fn instruction(&self, inst: &Instruction) -> String {
        match &inst.kind {
            InstructionKind::Gate(gate) => format!("{gate} {};", self.qubit_list(inst)),
            InstructionKind::Measure => {
                let qubits = self.qubit_list(inst);
                match inst.clbits.first().and_then(|&c| self.module.clbit_location(c)) {
                    Some((name, index)) => format!("{name}[{index}] = measure {qubits};"),
                    None => format!("measure {qubits};"),
                }
            }
            InstructionKind::Reset => format!("reset {};", self.qubit_list(inst)),
            InstructionKind::Barrier => format!("barrier {};", self.qubit_list(inst)),
        }
    }
}

impl Module {
    /// Render the module as flat OpenQASM 3: registers and hoisted
    /// declarations first, then every operation in program order with
    /// physical operands spelled as `register[index]`.
    pub fn to_source(&self) -> String {
        let mut emitter = Emitter::new(self);
        emitter.header();
        emitter.statements(&self.statements);
        emitter.out
    }
}
