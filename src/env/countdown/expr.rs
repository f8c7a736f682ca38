//! Restricted arithmetic evaluator
//!
//! Accepts numeric literals, `+ - * /`, unary signs and parentheses. Anything
//! else is a parse error; nothing is ever executed.
//!
//! Grammar
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := ('+' | '-') unary | atom
//! atom   := number | '(' expr ')'
//! ```

use thiserror::Error;

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token '{token}' at position {pos}")]
    UnexpectedToken { token: String, pos: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("expression nests too deeply")]
    TooDeep,
}

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl Token {
    fn describe(self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
        }
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(input: &str) -> Result<f64, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    match parser.peek() {
        None => Ok(value),
        Some((token, pos)) => Err(ExprError::UnexpectedToken {
            token: token.describe(),
            pos,
        }),
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(pos, ch)) = chars.peek() {
        let token = match ch {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(literal.clone()))?;
                tokens.push((Token::Number(value), pos));
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            other => return Err(ExprError::UnexpectedChar { ch: other, pos }),
        };
        tokens.push((token, pos));
        chars.next();
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [(Token, usize)],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<(Token, usize)> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        while let Some((token @ (Token::Plus | Token::Minus), _)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if token == Token::Plus {
                value + rhs
            } else {
                value - rhs
            };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.unary()?;
        while let Some((token @ (Token::Star | Token::Slash), _)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = if token == Token::Star {
                value * rhs
            } else {
                if rhs == 0.0 {
                    return Err(ExprError::DivisionByZero);
                }
                value / rhs
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            Some((Token::Plus, _)) => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            Some((Token::Minus, _)) => {
                self.pos += 1;
                self.nested(Self::unary).map(|v| -v)
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<f64, ExprError> {
        match self.next() {
            Some((Token::Number(value), _)) => Ok(value),
            Some((Token::LParen, _)) => {
                let value = self.nested(Self::expr)?;
                match self.next() {
                    Some((Token::RParen, _)) => Ok(value),
                    Some((token, pos)) => Err(ExprError::UnexpectedToken {
                        token: token.describe(),
                        pos,
                    }),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some((token, pos)) => Err(ExprError::UnexpectedToken {
                token: token.describe(),
                pos,
            }),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<f64, ExprError>,
    ) -> Result<f64, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_precedence_and_brackets() {
        assert_eq!(evaluate("5 + 3 * 2"), Ok(11.0));
        assert_eq!(evaluate("(1 + 2) / 3"), Ok(1.0));
        assert_eq!(evaluate("2 * (3 + 4) - 5"), Ok(9.0));
        assert_eq!(evaluate("8 / 4 / 2"), Ok(1.0));
        assert_eq!(evaluate("7 - 2 - 1"), Ok(4.0));
    }

    #[test]
    fn test_unary_signs() {
        assert_eq!(evaluate("-3 + 5"), Ok(2.0));
        assert_eq!(evaluate("4 * -(1 + 1)"), Ok(-8.0));
        assert_eq!(evaluate("--2"), Ok(2.0));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(evaluate("1/0"), Err(ExprError::DivisionByZero));
        assert_eq!(evaluate("3 / (2 - 2)"), Err(ExprError::DivisionByZero));
    }

    #[test]
    fn test_rejects_anything_but_arithmetic() {
        assert!(matches!(
            evaluate("__import__('os')"),
            Err(ExprError::UnexpectedChar { ch: '_', pos: 0 })
        ));
        assert!(matches!(
            evaluate("2 ** 3"),
            Err(ExprError::UnexpectedToken { .. })
        ));
        assert!(matches!(evaluate("1.2.3"), Err(ExprError::InvalidNumber(_))));
        assert_eq!(evaluate("(1 + 2"), Err(ExprError::UnexpectedEnd));
        assert!(matches!(
            evaluate("1 + 2)"),
            Err(ExprError::UnexpectedToken { .. })
        ));
        assert_eq!(evaluate("   "), Err(ExprError::Empty));
    }

    #[test]
    fn test_depth_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(evaluate(&deep), Err(ExprError::TooDeep));
    }

    proptest! {
        #[test]
        fn evaluates_like_native_arithmetic(a in 1u32..10, b in 1u32..10, c in 1u32..10) {
            let expr = format!("{a} + {b} * {c}");
            prop_assert_eq!(evaluate(&expr), Ok(a as f64 + (b * c) as f64));
            let expr = format!("({a} - {b}) / {c}");
            prop_assert_eq!(evaluate(&expr), Ok((a as f64 - b as f64) / c as f64));
        }

        #[test]
        fn never_panics(input in "[0-9+*/() .-]{0,40}") {
            let _ = evaluate(&input);
        }
    }
}
