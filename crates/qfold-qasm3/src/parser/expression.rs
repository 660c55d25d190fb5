//! Expression parsing by precedence climbing.

use super::Parser;
use crate::ast::{BinOp, Expression, IndexItem, RangeExpr, UNARY_PRECEDENCE, UnaryOp};
use crate::error::{ParseError, ParseResult};
use crate::lexer::Token;

impl Parser<'_> {
    /// Parse an expression.
    pub(super) fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary(1)
    }

    /// Parse a comma-separated expression list (possibly empty before `)`).
    pub(super) fn parse_expression_list(&mut self) -> ParseResult<Vec<Expression>> {
        let mut exprs = Vec::new();
        if self.check(&Token::RParen) {
            return Ok(exprs);
        }
        exprs.push(self.parse_expression()?);
        while self.consume(&Token::Comma) {
            exprs.push(self.parse_expression()?);
        }
        Ok(exprs)
    }

    /// Parse binary operators binding at least as tight as `min_prec`.
    fn parse_binary(&mut self, min_prec: u8) -> ParseResult<Expression> {
        let mut left = self.parse_unary()?;

        while let Some(op) = self.peek().and_then(binop_for) {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = if op.is_right_assoc() { prec } else { prec + 1 };
            let right = self.parse_binary(next_min)?;
            left = Expression::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse prefix operators.
    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Tilde) => UnaryOp::BitNot,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_binary(UNARY_PRECEDENCE)?;
        Ok(Expression::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Primary expression followed by any `[...]` indexing.
    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;
        while self.check(&Token::LBracket) {
            expr = self.parse_index(expr)?;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let span = self.current_span();
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| self.unexpected("expression"))?;

        let expr = match token {
            Token::IntLiteral(n) => Expression::Int(n),
            Token::FloatLiteral(f) => Expression::Float(f),
            Token::ImagLiteral(f) => Expression::Imag(f),
            Token::DurationLiteral((v, unit)) => Expression::Duration(v, unit),
            Token::StringLiteral(s) => {
                if s.is_empty() || !s.chars().all(|c| matches!(c, '0' | '1' | '_')) {
                    return Err(ParseError::UnexpectedToken {
                        span,
                        expected: "bit-string literal".into(),
                        found: format!("\"{s}\""),
                    });
                }
                Expression::BitString(s.replace('_', ""))
            }
            Token::True => Expression::Bool(true),
            Token::False => Expression::Bool(false),
            Token::Pi => Expression::Pi,
            Token::Tau => Expression::Tau,
            Token::Euler => Expression::Euler,
            Token::Identifier(name) => {
                self.advance();
                if self.consume(&Token::LParen) {
                    let args = self.parse_expression_list()?;
                    self.expect(Token::RParen)?;
                    return Ok(Expression::FnCall { name, args });
                }
                return Ok(Expression::Identifier(name));
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(Token::RParen)?;
                return Ok(Expression::Paren(Box::new(inner)));
            }
            Token::LBrace => return Ok(Expression::Array(self.parse_brace_list()?)),
            Token::Measure => {
                self.advance();
                let operand = self.parse_operand()?;
                return Ok(Expression::Measure(Box::new(operand)));
            }
            Token::Bool
            | Token::Int
            | Token::Uint
            | Token::Float
            | Token::Angle
            | Token::Bit
            | Token::Complex
            | Token::Duration => {
                let ty = self.parse_type()?;
                self.expect(Token::LParen)?;
                let operand = self.parse_expression()?;
                self.expect(Token::RParen)?;
                return Ok(Expression::Cast {
                    ty,
                    operand: Box::new(operand),
                });
            }
            _ => return Err(self.unexpected("expression")),
        };

        self.advance();
        Ok(expr)
    }

    /// Parse `{a, b, ...}`.
    pub(super) fn parse_brace_list(&mut self) -> ParseResult<Vec<Expression>> {
        self.expect(Token::LBrace)?;
        let mut items = Vec::new();
        if !self.check(&Token::RBrace) {
            items.push(self.parse_expression()?);
            while self.consume(&Token::Comma) {
                items.push(self.parse_expression()?);
            }
        }
        self.expect(Token::RBrace)?;
        Ok(items)
    }

    /// Parse `[item, ...]` applied to `base`.
    fn parse_index(&mut self, base: Expression) -> ParseResult<Expression> {
        self.expect(Token::LBracket)?;
        let mut items = vec![self.parse_index_item()?];
        while self.consume(&Token::Comma) {
            items.push(self.parse_index_item()?);
        }
        self.expect(Token::RBracket)?;
        Ok(Expression::Index {
            base: Box::new(base),
            items,
        })
    }

    fn parse_index_item(&mut self) -> ParseResult<IndexItem> {
        if self.check(&Token::LBrace) {
            return Ok(IndexItem::Set(self.parse_brace_list()?));
        }
        let start = if self.check(&Token::Colon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        if !self.check(&Token::Colon) {
            return match start {
                Some(expr) => Ok(IndexItem::Single(expr)),
                None => Err(self.unexpected("index")),
            };
        }
        let range = self.finish_range(start)?;
        Ok(IndexItem::Range(range))
    }

    /// Parse `start:end` or `start:step:end` (all parts optional).
    pub(super) fn parse_range(&mut self) -> ParseResult<RangeExpr> {
        let start = if self.check(&Token::Colon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        if !self.check(&Token::Colon) {
            return Err(self.unexpected("':'"));
        }
        self.finish_range(start)
    }

    fn finish_range(&mut self, start: Option<Expression>) -> ParseResult<RangeExpr> {
        self.expect(Token::Colon)?;
        let second = self.parse_optional_range_part()?;
        let (step, end) = if self.consume(&Token::Colon) {
            (second, self.parse_optional_range_part()?)
        } else {
            (None, second)
        };
        Ok(RangeExpr {
            start: start.map(Box::new),
            step: step.map(Box::new),
            end: end.map(Box::new),
        })
    }

    fn parse_optional_range_part(&mut self) -> ParseResult<Option<Expression>> {
        match self.peek() {
            Some(Token::Colon | Token::RBracket | Token::Comma) | None => Ok(None),
            _ => Ok(Some(self.parse_expression()?)),
        }
    }

    /// Parse a quantum or classical operand: `q`, `q[1]`, `q[0:2]`, `a[1][2]`.
    pub(super) fn parse_operand(&mut self) -> ParseResult<Expression> {
        let name = self.parse_identifier()?;
        let mut expr = Expression::Identifier(name);
        while self.check(&Token::LBracket) {
            expr = self.parse_index(expr)?;
        }
        Ok(expr)
    }
}

/// Binary operator a token stands for.
fn binop_for(token: &Token) -> Option<BinOp> {
    Some(match token {
        Token::Plus => BinOp::Add,
        Token::Minus => BinOp::Sub,
        Token::Star => BinOp::Mul,
        Token::Slash => BinOp::Div,
        Token::Percent => BinOp::Mod,
        Token::Power => BinOp::Pow,
        Token::EqEq => BinOp::Eq,
        Token::NotEq => BinOp::NotEq,
        Token::Lt => BinOp::Lt,
        Token::LtEq => BinOp::LtEq,
        Token::Gt => BinOp::Gt,
        Token::GtEq => BinOp::GtEq,
        Token::And => BinOp::And,
        Token::Or => BinOp::Or,
        Token::Ampersand => BinOp::BitAnd,
        Token::Pipe => BinOp::BitOr,
        Token::Caret => BinOp::BitXor,
        Token::LShift => BinOp::LShift,
        Token::RShift => BinOp::RShift,
        Token::PlusPlus => BinOp::Concat,
        _ => return None,
    })
}
