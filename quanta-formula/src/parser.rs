//! Formula parser (precedence climbing)
//!
//! Loosest to tightest: `||`, `&&`, comparisons, `+ -`, `* /`, `^`, unary
//! sign, primary. All binary levels are left associative, and a leading sign
//! belongs to its operand, so `-2^2` is `(-2)^2`.

use crate::ast::{BinOp, Expr, UnaryOp};
use crate::lexer::{tokenize, Spanned, Token};
use quanta_core::{QuantaError, Result};

/// Parse a formula into an expression tree
pub fn parse_formula(input: &str) -> Result<Expr> {
    if input.trim().is_empty() {
        return Err(QuantaError::parse("empty formula"));
    }
    let mut parser = Parser {
        tokens: tokenize(input)?,
        index: 0,
    };
    let expr = parser.parse_binary(0)?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected {:?}", other))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof
        self.tokens
            .get(self.index)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .or_else(|| self.tokens.last())
            .map(|s| s.position)
            .unwrap_or(0)
    }

    fn error(&self, message: impl std::fmt::Display) -> QuantaError {
        QuantaError::parse(format!("at position {}: {}", self.position(), message))
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, found {:?}", expected, self.peek())))
        }
    }

    fn binary_op(&self) -> Option<BinOp> {
        let op = match self.peek() {
            Token::OrOr => BinOp::Or,
            Token::AndAnd => BinOp::And,
            Token::EqEq => BinOp::Eq,
            Token::NotEq => BinOp::Ne,
            Token::Lt => BinOp::Lt,
            Token::Gt => BinOp::Gt,
            Token::Le => BinOp::Le,
            Token::Ge => BinOp::Ge,
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::Caret => BinOp::Pow,
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.binary_op() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary(precedence + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Token::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Token::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Number(value) => {
                let unit = match self.peek() {
                    Token::UnitTag(tag) => {
                        let tag = tag.clone();
                        self.advance();
                        Some(tag)
                    }
                    _ => None,
                };
                Ok(Expr::Number { value, unit })
            }
            Token::Reference(name) => Ok(Expr::Reference(name)),
            Token::LParen => {
                let inner = self.parse_binary(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Identifier(name) => {
                if *self.peek() != Token::LParen {
                    return Err(self.error(format!(
                        "bare identifier '{}' (references are written [{}])",
                        name, name
                    )));
                }
                self.advance();
                let args = self.parse_args()?;
                Ok(Expr::Call { name, args })
            }
            Token::UnitTag(tag) => Err(self.error(format!("unit tag {{{}}} without a number", tag))),
            Token::Eof => Err(self.error("unexpected end of formula")),
            other => Err(self.error(format!("unexpected {:?}", other))),
        }
    }

    /// Arguments after the opening parenthesis, through the closing one
    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_binary(0)?);
            match self.advance() {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => {
                    return Err(self.error(format!("expected ',' or ')', found {:?}", other)))
                }
            }
        }
    }
}
