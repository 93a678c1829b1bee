//! Formula tokenizer
//!
//! A unit tag (`{kg/m^3}`) and a reference (`[feed_rate]`) are each read as a
//! single token, so nothing downstream has to track whether it is inside
//! braces or brackets.

use quanta_core::{QuantaError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    /// Contents of `{...}`, trimmed
    UnitTag(String),
    /// Contents of `[...]`, trimmed
    Reference(String),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Eof,
}

/// A token and the character offset where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

struct Lexer {
    chars: Vec<char>,
    position: usize,
}

/// Split a formula into tokens, ending with [`Token::Eof`]
pub fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let mut lexer = Lexer {
        chars: input.chars().collect(),
        position: 0,
    };
    let mut tokens = Vec::new();
    loop {
        lexer.skip_whitespace();
        let position = lexer.position;
        let token = lexer.next_token()?;
        let done = token == Token::Eof;
        tokens.push(Spanned { token, position });
        if done {
            return Ok(tokens);
        }
    }
}

fn error(position: usize, message: impl std::fmt::Display) -> QuantaError {
    QuantaError::parse(format!("at position {}: {}", position, message))
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    /// Consume `second` if it follows, choosing between a two- and a
    /// one-character token
    fn pair(&mut self, second: char, double: Token, single: Option<Token>) -> Result<Token> {
        let start = self.position;
        self.advance();
        if self.peek() == Some(second) {
            self.advance();
            return Ok(double);
        }
        single.ok_or_else(|| error(start, format!("expected '{}'", second)))
    }

    fn next_token(&mut self) -> Result<Token> {
        let start = self.position;
        let Some(c) = self.peek() else {
            return Ok(Token::Eof);
        };

        let simple = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = simple {
            self.advance();
            return Ok(token);
        }

        match c {
            '=' => self.pair('=', Token::EqEq, None),
            '!' => self.pair('=', Token::NotEq, None),
            '<' => self.pair('=', Token::Le, Some(Token::Lt)),
            '>' => self.pair('=', Token::Ge, Some(Token::Gt)),
            '&' => self.pair('&', Token::AndAnd, None),
            '|' => self.pair('|', Token::OrOr, None),
            '{' => self.read_delimited('{', '}').map(Token::UnitTag),
            '[' => {
                let name = self.read_delimited('[', ']')?;
                if name.is_empty() {
                    return Err(error(start, "empty reference"));
                }
                Ok(Token::Reference(name))
            }
            c if c.is_ascii_digit() || c == '.' => self.read_number(),
            c if c.is_alphabetic() || c == '_' => Ok(Token::Identifier(self.read_identifier())),
            other => Err(error(start, format!("unexpected character '{}'", other))),
        }
    }

    fn read_delimited(&mut self, open: char, close: char) -> Result<String> {
        let start = self.position;
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some(c) if c == close => return Ok(text.trim().to_string()),
                Some(c) if c == open => {
                    return Err(error(self.position - 1, format!("nested '{}'", open)))
                }
                Some(c) => text.push(c),
                None => return Err(error(start, format!("unterminated '{}'", open))),
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        name
    }

    fn read_number(&mut self) -> Result<Token> {
        let start = self.position;
        let mut text = String::new();
        let mut has_dot = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.' && !has_dot {
                has_dot = true;
                text.push(c);
            } else {
                break;
            }
            self.advance();
        }

        // Scientific notation: 1e10, 1.5E-3
        if matches!(self.peek(), Some('e' | 'E')) {
            let digits_at = match self.peek_at(1) {
                Some('+' | '-') => 2,
                _ => 1,
            };
            if self.peek_at(digits_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digits_at {
                    if let Some(c) = self.advance() {
                        text.push(c);
                    }
                }
                while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                    text.push(c);
                    self.advance();
                }
            }
        }

        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| error(start, format!("invalid number '{}'", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            tokens("2 + 3*4"),
            vec![
                Token::Number(2.0),
                Token::Plus,
                Token::Number(3.0),
                Token::Star,
                Token::Number(4.0),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(tokens("1.5e3")[0], Token::Number(1500.0));
        assert_eq!(tokens("2E-4")[0], Token::Number(2e-4));
        assert_eq!(tokens(".5")[0], Token::Number(0.5));
    }

    #[test]
    fn test_unit_tag_and_reference() {
        assert_eq!(
            tokens("12{ kg/m^3 } * [feed rate]"),
            vec![
                Token::Number(12.0),
                Token::UnitTag("kg/m^3".to_string()),
                Token::Star,
                Token::Reference("feed rate".to_string()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(
            tokens("a<=b != c && d || e > f"),
            vec![
                Token::Identifier("a".into()),
                Token::Le,
                Token::Identifier("b".into()),
                Token::NotEq,
                Token::Identifier("c".into()),
                Token::AndAnd,
                Token::Identifier("d".into()),
                Token::OrOr,
                Token::Identifier("e".into()),
                Token::Gt,
                Token::Identifier("f".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_positions() {
        let spanned = tokenize("1 +  [x]").unwrap();
        assert_eq!(spanned[1].position, 2);
        assert_eq!(spanned[2].position, 5);
    }

    #[test]
    fn test_errors() {
        assert!(tokenize("1 {kg").is_err());
        assert!(tokenize("[]").is_err());
        assert!(tokenize("[a[b]]").is_err());
        assert!(tokenize("1 = 2").is_err());
        assert!(tokenize("1 & 2").is_err());
        assert!(tokenize("3 # 4").is_err());
    }
}
