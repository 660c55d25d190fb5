//! Error-recovering parser for `OpenQASM` 3.
//!
//! A malformed statement is recorded as a [`ParseError`]; the parser then
//! skips to the next `;` (or past a balanced `{ ... }`) and carries on, so
//! one run reports every syntax error and still yields the statements it
//! could read.

mod expression;
mod statement;

use crate::ast::{Program, Span};
use crate::error::{ParseError, ParseResult};
use crate::lexer::{SpannedToken, Token, tokenize};

/// Parse a QASM3 source string, collecting every syntax error.
pub fn parse(source: &str) -> (Program, Vec<ParseError>) {
    let mut parser = Parser::new(source);
    let program = parser.parse_program();
    (program, parser.errors)
}

/// Parse a QASM3 source string, failing on the first syntax error.
pub fn parse_strict(source: &str) -> ParseResult<Program> {
    let (program, mut errors) = parse(source);
    if errors.is_empty() {
        Ok(program)
    } else {
        Err(errors.swap_remove(0))
    }
}

/// Parser state.
pub(super) struct Parser<'src> {
    pub(super) source: &'src str,
    pub(super) tokens: Vec<SpannedToken>,
    pub(super) pos: usize,
    /// Byte offset of the start of each line.
    line_starts: Vec<usize>,
    /// Number of `{` blocks currently open.
    pub(super) nesting: usize,
    pub(super) errors: Vec<ParseError>,
}

impl<'src> Parser<'src> {
    /// Create a new parser from source. Invalid tokens become errors and are dropped.
    fn new(source: &'src str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        let mut parser = Self {
            source,
            tokens: Vec::new(),
            pos: 0,
            line_starts,
            nesting: 0,
            errors: Vec::new(),
        };

        for result in tokenize(source) {
            match result {
                Ok(t) => parser.tokens.push(t),
                Err((range, message)) => {
                    let span = parser.span_at(range.start);
                    let digits = &source[range];
                    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                        parser.errors.push(ParseError::IntegerOverflow { span });
                    } else {
                        parser.errors.push(ParseError::LexerError { span, message });
                    }
                }
            }
        }
        parser
    }

    /// Line/column of a byte offset.
    pub(super) fn span_at(&self, offset: usize) -> Span {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line.saturating_sub(1)];
        Span::new(line, offset - line_start + 1)
    }

    /// Span of the current token (or end of input).
    pub(super) fn current_span(&self) -> Span {
        let offset = self
            .tokens
            .get(self.pos)
            .map_or(self.source.len(), |t| t.span.start);
        self.span_at(offset)
    }

    /// Check if we've reached the end.
    pub(super) fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Peek at the current token.
    pub(super) fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    /// Peek `n` tokens ahead.
    pub(super) fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|t| &t.token)
    }

    /// Advance and return the current token.
    pub(super) fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos)?.token.clone();
        self.pos += 1;
        Some(token)
    }

    /// Error describing the current token as unexpected.
    pub(super) fn unexpected(&self, expected: &str) -> ParseError {
        let span = self.current_span();
        match self.peek() {
            Some(found) => ParseError::UnexpectedToken {
                span,
                expected: expected.to_string(),
                found: found.to_string(),
            },
            None => ParseError::UnexpectedEof {
                span,
                expected: expected.to_string(),
            },
        }
    }

    /// Expect a specific token. The token is only consumed when it matches.
    #[allow(clippy::needless_pass_by_value)]
    pub(super) fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.check(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{expected}'")))
        }
    }

    /// Check if current token matches.
    pub(super) fn check(&self, token: &Token) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(token))
    }

    /// Consume token if it matches.
    pub(super) fn consume(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skip to the end of the broken statement.
    ///
    /// Stops after a `;` at the current depth, after the `}` closing a block
    /// opened while skipping, or before a `}` that closes an enclosing block.
    pub(super) fn synchronize(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Semicolon if depth == 0 => {
                    self.pos += 1;
                    return;
                }
                Token::LBrace => depth += 1,
                Token::RBrace if depth == 0 => {
                    // A stray brace at top level is dropped.
                    if self.nesting == 0 {
                        self.pos += 1;
                    }
                    return;
                }
                Token::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    /// Parse the entire program.
    fn parse_program(&mut self) -> Program {
        let version = if self.check(&Token::OpenQasm) {
            match self.parse_version() {
                Ok(v) => Some(v),
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize();
                    None
                }
            }
        } else {
            None
        };

        let mut statements = Vec::new();
        while !self.is_eof() {
            let before = self.pos;
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize();
                }
            }
            if self.pos == before {
                // Guarantee progress on a token no rule accepts.
                self.pos += 1;
            }
        }

        Program {
            version,
            statements,
        }
    }

    /// Parse `OPENQASM x.y;`.
    fn parse_version(&mut self) -> ParseResult<String> {
        self.expect(Token::OpenQasm)?;
        let span = self.current_span();
        let version = match self.advance() {
            Some(Token::FloatLiteral(v)) => format!("{v:?}"),
            Some(Token::IntLiteral(v)) => format!("{v}.0"),
            Some(other) => {
                return Err(ParseError::InvalidVersion {
                    span,
                    version: other.to_string(),
                });
            }
            None => return Err(self.unexpected("version number")),
        };
        if !(version.starts_with("2.") || version.starts_with("3.")) {
            return Err(ParseError::InvalidVersion { span, version });
        }
        self.expect(Token::Semicolon)?;
        Ok(version)
    }

    /// Parse identifier list.
    pub(super) fn parse_identifier_list(&mut self) -> ParseResult<Vec<String>> {
        let mut ids = vec![self.parse_identifier()?];
        while self.consume(&Token::Comma) {
            ids.push(self.parse_identifier()?);
        }
        Ok(ids)
    }

    /// Parse an identifier.
    pub(super) fn parse_identifier(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(Token::Identifier(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StmtKind;

    #[test]
    fn test_parse_bell_state() {
        let source = r"
            OPENQASM 3.0;
            qubit[2] q;
            bit[2] c;
            h q[0];
            cx q[0], q[1];
            c = measure q;
        ";

        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(program.version.as_deref(), Some("3.0"));
        assert_eq!(program.statements.len(), 5);
        assert!(matches!(program.statements[4].kind, StmtKind::Measure { .. }));
    }

    #[test]
    fn test_spans() {
        let source = "OPENQASM 3.0;\nqubit q;\n  h q;\n";
        let (program, _) = parse(source);
        assert_eq!(program.statements[0].span, Span::new(2, 1));
        assert_eq!(program.statements[1].span, Span::new(3, 3));
    }

    #[test]
    fn test_version_optional() {
        let (program, errors) = parse("qubit q; x q;");
        assert!(errors.is_empty());
        assert_eq!(program.version, None);
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_version_text() {
        for (source, expected) in [
            ("OPENQASM 3.0;", "3.0"),
            ("OPENQASM 3;", "3.0"),
            ("OPENQASM 2.0;", "2.0"),
            ("OPENQASM 3.1;", "3.1"),
        ] {
            let (program, errors) = parse(source);
            assert!(errors.is_empty(), "{source}: {errors:?}");
            assert_eq!(program.version.as_deref(), Some(expected));
        }
    }

    #[test]
    fn test_invalid_version() {
        let (_, errors) = parse("OPENQASM 4.0; qubit q;");
        assert!(matches!(errors[0], ParseError::InvalidVersion { .. }));
    }

    #[test]
    fn test_recovers_after_error() {
        let source = r"
            OPENQASM 3.0;
            qubit[2] q;
            h q[0] q[1];
            x q[0];
            cx q[0], ;
            y q[1];
        ";
        let (program, errors) = parse(source);
        assert_eq!(errors.len(), 2, "{errors:?}");
        let names: Vec<_> = program
            .statements
            .iter()
            .filter_map(|s| match &s.kind {
                StmtKind::Gate(g) => Some(g.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["x", "y"]);
        assert_eq!(errors[0].span().line, 4);
    }

    #[test]
    fn test_recovers_inside_block() {
        let source = r"
            qubit[2] q;
            for int i in [0:1] {
                h q[i] +;
                x q[i];
            }
            z q[0];
        ";
        let (program, errors) = parse(source);
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(program.statements.len(), 3);
        match &program.statements[1].kind {
            StmtKind::For { body, .. } => assert_eq!(body.len(), 1),
            other => panic!("expected for loop, got {other:?}"),
        }
    }

    #[test]
    fn test_stray_brace() {
        let (program, errors) = parse("qubit q; } x q;");
        assert_eq!(errors.len(), 1);
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_lexer_error_reported() {
        let (program, errors) = parse("qubit q;\nx $ q;\nh q;");
        assert!(matches!(errors[0], ParseError::LexerError { span, .. } if span.line == 2));
        assert!(!program.statements.is_empty());
    }

    #[test]
    fn test_integer_overflow() {
        let (_, errors) = parse("int x = 99999999999999999999999;");
        assert!(matches!(errors[0], ParseError::IntegerOverflow { .. }));
    }

    #[test]
    fn test_parse_strict() {
        assert!(parse_strict("qubit q; h q;").is_ok());
        assert!(parse_strict("qubit q; h q").is_err());
    }
}
