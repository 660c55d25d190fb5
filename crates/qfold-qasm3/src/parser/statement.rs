//! Statement parsing for QASM3.

use super::Parser;
use crate::ast::{
    AssignOp, ClassicalDecl, Expression, ForIterable, GateCall, GateDef, GateModifier, IoModifier,
    Param, Statement, StmtKind, SubroutineDef, TypeSpec,
};
use crate::error::{ParseError, ParseResult};
use crate::lexer::Token;

impl Parser<'_> {
    /// Parse a statement.
    pub(super) fn parse_statement(&mut self) -> ParseResult<Statement> {
        let span = self.current_span();
        let token = self.peek().cloned().ok_or_else(|| self.unexpected("statement"))?;

        let kind = match token {
            Token::OpenQasm => {
                return Err(ParseError::Misplaced {
                    span,
                    message: "version declaration must be the first statement".into(),
                });
            }
            Token::Include => self.parse_include()?,
            Token::Qubit => self.parse_qubit_decl()?,
            Token::Qreg => self.parse_qreg()?,
            Token::Creg => self.parse_creg()?,
            Token::Const | Token::Input | Token::Output => self.parse_classical_decl()?,
            t if is_type_start(&t) => self.parse_classical_decl()?,
            Token::Let => self.parse_alias()?,
            Token::Measure => self.parse_measure()?,
            Token::Reset => self.parse_reset()?,
            Token::Barrier => self.parse_barrier()?,
            Token::If => self.parse_if()?,
            Token::For => self.parse_for()?,
            Token::While => self.parse_while()?,
            Token::Break => self.parse_keyword_statement(StmtKind::Break)?,
            Token::Continue => self.parse_keyword_statement(StmtKind::Continue)?,
            Token::Return => self.parse_return()?,
            Token::Def => self.parse_subroutine_def()?,
            Token::Gate => self.parse_gate_def()?,
            Token::LBrace => StmtKind::Block(self.parse_block()?),
            Token::Pragma(text) => {
                self.advance();
                StmtKind::Pragma(text)
            }
            Token::At => self.parse_annotation()?,
            Token::Inv | Token::Pow | Token::Ctrl | Token::NegCtrl => {
                StmtKind::Gate(self.parse_gate_call()?)
            }
            Token::Identifier(_) => self.parse_identifier_statement()?,
            _ => return Err(self.unexpected("statement")),
        };

        Ok(Statement::new(kind, span))
    }

    /// Parse `{ statements }`, recovering from errors inside the block.
    pub(super) fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(Token::LBrace)?;
        self.nesting += 1;
        let mut statements = Vec::new();
        while !self.check(&Token::RBrace) && !self.is_eof() {
            let before = self.pos;
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize();
                }
            }
            if self.pos == before && !self.check(&Token::RBrace) {
                self.pos += 1;
            }
        }
        self.nesting -= 1;
        self.expect(Token::RBrace)?;
        Ok(statements)
    }

    /// A block, or a single statement standing in for one.
    fn parse_body(&mut self) -> ParseResult<Vec<Statement>> {
        if self.check(&Token::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_keyword_statement(&mut self, kind: StmtKind) -> ParseResult<StmtKind> {
        self.advance();
        self.expect(Token::Semicolon)?;
        Ok(kind)
    }

    /// Parse include statement.
    fn parse_include(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::Include)?;
        let path = match self.peek() {
            Some(Token::StringLiteral(s)) => s.clone(),
            _ => return Err(self.unexpected("string literal")),
        };
        self.advance();
        self.expect(Token::Semicolon)?;
        Ok(StmtKind::Include(path))
    }

    /// Parse `qubit[n] q;` or `qubit q;`.
    fn parse_qubit_decl(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::Qubit)?;
        let size = self.parse_optional_designator()?;
        let name = self.parse_identifier()?;
        self.expect(Token::Semicolon)?;
        Ok(StmtKind::QubitDecl { name, size })
    }

    /// Parse `qreg q[n];`.
    fn parse_qreg(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::Qreg)?;
        let name = self.parse_identifier()?;
        let size = self.parse_optional_designator()?;
        self.expect(Token::Semicolon)?;
        Ok(StmtKind::QubitDecl { name, size })
    }

    /// Parse `creg c[n];` as a bit declaration.
    fn parse_creg(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::Creg)?;
        let name = self.parse_identifier()?;
        let size = self.parse_optional_designator()?;
        self.expect(Token::Semicolon)?;
        Ok(StmtKind::ClassicalDecl(ClassicalDecl {
            ty: TypeSpec::Bit(size.map(Box::new)),
            name,
            init: None,
            is_const: false,
            io: None,
        }))
    }

    /// `[expr]` if present.
    fn parse_optional_designator(&mut self) -> ParseResult<Option<Expression>> {
        if self.consume(&Token::LBracket) {
            let size = self.parse_expression()?;
            self.expect(Token::RBracket)?;
            Ok(Some(size))
        } else {
            Ok(None)
        }
    }

    /// Parse a type: `int[32]`, `complex[float[64]]`, `array[int[8], 2, 3]`, ...
    pub(super) fn parse_type(&mut self) -> ParseResult<TypeSpec> {
        let token = self.peek().cloned().ok_or_else(|| self.unexpected("type"))?;
        let sized = |p: &mut Self| -> ParseResult<Option<Box<Expression>>> {
            p.advance();
            Ok(p.parse_optional_designator()?.map(Box::new))
        };
        match token {
            Token::Bool => {
                self.advance();
                Ok(TypeSpec::Bool)
            }
            Token::Int => Ok(TypeSpec::Int(sized(self)?)),
            Token::Uint => Ok(TypeSpec::Uint(sized(self)?)),
            Token::Float => Ok(TypeSpec::Float(sized(self)?)),
            Token::Angle => Ok(TypeSpec::Angle(sized(self)?)),
            Token::Bit => Ok(TypeSpec::Bit(sized(self)?)),
            Token::Duration => {
                self.advance();
                Ok(TypeSpec::Duration)
            }
            Token::Stretch => {
                self.advance();
                Ok(TypeSpec::Stretch)
            }
            Token::Complex => {
                self.advance();
                if !self.consume(&Token::LBracket) {
                    return Ok(TypeSpec::Complex(None));
                }
                self.expect(Token::Float)?;
                let width = self.parse_optional_designator()?;
                self.expect(Token::RBracket)?;
                Ok(TypeSpec::Complex(width.map(Box::new)))
            }
            Token::Array => {
                self.advance();
                self.expect(Token::LBracket)?;
                let element = self.parse_type()?;
                let mut dims = Vec::new();
                while self.consume(&Token::Comma) {
                    dims.push(self.parse_expression()?);
                }
                self.expect(Token::RBracket)?;
                if dims.is_empty() {
                    return Err(self.unexpected("array dimension"));
                }
                Ok(TypeSpec::Array {
                    element: Box::new(element),
                    dims,
                })
            }
            _ => Err(self.unexpected("type")),
        }
    }

    /// Parse `[const|input|output] type name [= init];`.
    fn parse_classical_decl(&mut self) -> ParseResult<StmtKind> {
        let is_const = self.consume(&Token::Const);
        let io = if self.consume(&Token::Input) {
            Some(IoModifier::Input)
        } else if self.consume(&Token::Output) {
            Some(IoModifier::Output)
        } else {
            None
        };
        let ty = self.parse_type()?;
        let name = self.parse_identifier()?;
        let init = if self.consume(&Token::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(Token::Semicolon)?;
        Ok(StmtKind::ClassicalDecl(ClassicalDecl {
            ty,
            name,
            init,
            is_const,
            io,
        }))
    }

    /// Parse `let name = expr;`.
    fn parse_alias(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::Let)?;
        let name = self.parse_identifier()?;
        self.expect(Token::Eq)?;
        let value = self.parse_expression()?;
        self.expect(Token::Semicolon)?;
        Ok(StmtKind::Alias { name, value })
    }

    /// Parse `measure q [-> c];`.
    fn parse_measure(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::Measure)?;
        let qubits = self.parse_operand()?;
        let target = if self.consume(&Token::Arrow) {
            Some(self.parse_operand()?)
        } else {
            None
        };
        self.expect(Token::Semicolon)?;
        Ok(StmtKind::Measure { qubits, target })
    }

    /// Parse reset statement.
    fn parse_reset(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::Reset)?;
        let operand = self.parse_operand()?;
        self.expect(Token::Semicolon)?;
        Ok(StmtKind::Reset(operand))
    }

    /// Parse barrier statement.
    fn parse_barrier(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::Barrier)?;
        let operands = if self.check(&Token::Semicolon) {
            vec![]
        } else {
            self.parse_operand_list()?
        };
        self.expect(Token::Semicolon)?;
        Ok(StmtKind::Barrier(operands))
    }

    /// Parse `if (cond) body [else body]`.
    fn parse_if(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::If)?;
        self.expect(Token::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(Token::RParen)?;
        let then_body = self.parse_body()?;
        let else_body = if self.consume(&Token::Else) {
            Some(self.parse_body()?)
        } else {
            None
        };
        Ok(StmtKind::If {
            condition,
            then_body,
            else_body,
        })
    }

    /// Parse `for [type] i in iterable body`.
    fn parse_for(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::For)?;
        let var_type = match self.peek() {
            Some(t) if is_type_start(t) => Some(self.parse_type()?),
            _ => None,
        };
        let variable = self.parse_identifier()?;
        self.expect(Token::In)?;
        let iterable = if self.consume(&Token::LBracket) {
            let range = self.parse_range()?;
            self.expect(Token::RBracket)?;
            ForIterable::Range(range)
        } else if self.check(&Token::LBrace) {
            ForIterable::Set(self.parse_brace_list()?)
        } else {
            ForIterable::Expr(self.parse_expression()?)
        };
        let body = self.parse_body()?;
        Ok(StmtKind::For {
            var_type,
            variable,
            iterable,
            body,
        })
    }

    /// Parse `while (cond) body`.
    fn parse_while(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::While)?;
        self.expect(Token::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(Token::RParen)?;
        let body = self.parse_body()?;
        Ok(StmtKind::While { condition, body })
    }

    /// Parse `return [expr];`.
    fn parse_return(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::Return)?;
        let value = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(Token::Semicolon)?;
        Ok(StmtKind::Return(value))
    }

    /// Parse `def name(params) [-> type] { body }`.
    fn parse_subroutine_def(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::Def)?;
        let name = self.parse_identifier()?;
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            params.push(self.parse_param()?);
            while self.consume(&Token::Comma) {
                params.push(self.parse_param()?);
            }
        }
        self.expect(Token::RParen)?;
        let return_type = if self.consume(&Token::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(StmtKind::SubroutineDef(SubroutineDef {
            name,
            params,
            return_type,
            body,
        }))
    }

    fn parse_param(&mut self) -> ParseResult<Param> {
        // Access qualifiers carry no meaning for the analyzer.
        if matches!(self.peek(), Some(Token::Identifier(q)) if q == "readonly" || q == "mutable") {
            self.advance();
        }
        if self.consume(&Token::Qubit) {
            let size = self.parse_optional_designator()?;
            let name = self.parse_identifier()?;
            return Ok(Param::Qubit { name, size });
        }
        if self.consume(&Token::Qreg) {
            let name = self.parse_identifier()?;
            let size = self.parse_optional_designator()?;
            return Ok(Param::Qubit { name, size });
        }
        let ty = self.parse_type()?;
        let name = self.parse_identifier()?;
        Ok(Param::Classical { ty, name })
    }

    /// Parse `gate name[(params)] qubits { body }`.
    fn parse_gate_def(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::Gate)?;
        let name = self.parse_identifier()?;
        let params = if self.consume(&Token::LParen) {
            let params = if self.check(&Token::RParen) {
                vec![]
            } else {
                self.parse_identifier_list()?
            };
            self.expect(Token::RParen)?;
            params
        } else {
            vec![]
        };
        let qubits = self.parse_identifier_list()?;
        let body = self.parse_block()?;
        Ok(StmtKind::GateDef(GateDef {
            name,
            params,
            qubits,
            body,
        }))
    }

    /// Parse `@keyword rest-of-line`.
    fn parse_annotation(&mut self) -> ParseResult<StmtKind> {
        self.expect(Token::At)?;
        let keyword_end = self.tokens.get(self.pos).map(|t| t.span.end);
        let keyword = self.parse_identifier()?;
        let start = keyword_end.unwrap_or(self.source.len());
        let end = self.source[start..]
            .find('\n')
            .map_or(self.source.len(), |i| start + i);
        while self.tokens.get(self.pos).is_some_and(|t| t.span.start < end) {
            self.pos += 1;
        }
        Ok(StmtKind::Annotation {
            keyword,
            content: self.source[start..end].trim().to_string(),
        })
    }

    /// Parse a gate call, including any modifiers.
    fn parse_gate_call(&mut self) -> ParseResult<GateCall> {
        let modifiers = self.parse_modifiers()?;
        let name = self.parse_identifier()?;
        let params = if self.consume(&Token::LParen) {
            let params = self.parse_expression_list()?;
            self.expect(Token::RParen)?;
            params
        } else {
            vec![]
        };
        self.finish_gate_call(name, params, modifiers)
    }

    fn finish_gate_call(
        &mut self,
        name: String,
        params: Vec<Expression>,
        modifiers: Vec<GateModifier>,
    ) -> ParseResult<GateCall> {
        let qubits = self.parse_operand_list()?;
        self.expect(Token::Semicolon)?;
        Ok(GateCall {
            name,
            params,
            qubits,
            modifiers,
        })
    }

    fn parse_modifiers(&mut self) -> ParseResult<Vec<GateModifier>> {
        let mut modifiers = Vec::new();
        loop {
            let modifier = match self.peek() {
                Some(Token::Inv) => {
                    self.advance();
                    GateModifier::Inv
                }
                Some(Token::Pow) => {
                    self.advance();
                    self.expect(Token::LParen)?;
                    let exponent = self.parse_expression()?;
                    self.expect(Token::RParen)?;
                    GateModifier::Pow(exponent)
                }
                Some(Token::Ctrl | Token::NegCtrl) => {
                    let negated = self.check(&Token::NegCtrl);
                    self.advance();
                    let count = if self.consume(&Token::LParen) {
                        let count = self.parse_expression()?;
                        self.expect(Token::RParen)?;
                        Some(count)
                    } else {
                        None
                    };
                    if negated {
                        GateModifier::NegCtrl(count)
                    } else {
                        GateModifier::Ctrl(count)
                    }
                }
                _ => return Ok(modifiers),
            };
            self.expect(Token::At)?;
            modifiers.push(modifier);
        }
    }

    /// Statements starting with an identifier: gate calls, assignments and
    /// expression statements.
    fn parse_identifier_statement(&mut self) -> ParseResult<StmtKind> {
        match self.peek_at(1) {
            Some(Token::LParen) => {
                let name = self.parse_identifier()?;
                self.expect(Token::LParen)?;
                let args = self.parse_expression_list()?;
                self.expect(Token::RParen)?;
                if self.consume(&Token::Semicolon) {
                    Ok(StmtKind::Expr(Expression::FnCall { name, args }))
                } else {
                    Ok(StmtKind::Gate(self.finish_gate_call(name, args, vec![])?))
                }
            }
            Some(Token::Identifier(_)) => Ok(StmtKind::Gate(self.parse_gate_call()?)),
            Some(Token::Semicolon) => {
                let name = self.parse_identifier()?;
                self.expect(Token::Semicolon)?;
                Ok(StmtKind::Expr(Expression::Identifier(name)))
            }
            _ => self.parse_assignment(),
        }
    }

    /// Parse `target op value;`, turning `c = measure q;` into a measurement.
    fn parse_assignment(&mut self) -> ParseResult<StmtKind> {
        let target = self.parse_operand()?;
        let op = match self.peek() {
            Some(Token::Eq) => AssignOp::Assign,
            Some(Token::PlusEq) => AssignOp::AddAssign,
            Some(Token::MinusEq) => AssignOp::SubAssign,
            Some(Token::StarEq) => AssignOp::MulAssign,
            Some(Token::SlashEq) => AssignOp::DivAssign,
            _ => return Err(self.unexpected("assignment operator")),
        };
        self.advance();
        let value = self.parse_expression()?;
        self.expect(Token::Semicolon)?;
        match (op, value) {
            (AssignOp::Assign, Expression::Measure(qubits)) => Ok(StmtKind::Measure {
                qubits: *qubits,
                target: Some(target),
            }),
            (op, value) => Ok(StmtKind::Assignment { target, op, value }),
        }
    }

    /// Comma-separated operands.
    fn parse_operand_list(&mut self) -> ParseResult<Vec<Expression>> {
        let mut operands = vec![self.parse_operand()?];
        while self.consume(&Token::Comma) {
            operands.push(self.parse_operand()?);
        }
        Ok(operands)
    }
}

/// Tokens that begin a classical type.
fn is_type_start(token: &Token) -> bool {
    matches!(
        token,
        Token::Bool
            | Token::Int
            | Token::Uint
            | Token::Float
            | Token::Angle
            | Token::Bit
            | Token::Complex
            | Token::Duration
            | Token::Stretch
            | Token::Array
    )
}
