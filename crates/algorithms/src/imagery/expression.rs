//! Band arithmetic expressions
//!
//! Formulas reference bands by name and combine them with `+ - * /`,
//! parentheses, unary minus and numeric constants (including exponents such
//! as `1e-4`). Examples:
//! - `"(SR_B6 - SR_B5) / (SR_B6 + SR_B5)"`
//! - `"2.5 * (B8 - B4) / (B8 + 6 * B4 - 7.5 * B2 + 1)"`
//! - `"tmmx * 0.1"`
//!
//! A formula is parsed once into an [`Expression`] and then evaluated per
//! pixel against a slice of band values in [`Expression::bands`] order.

use landsight_core::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Band(String),
    Op(char),
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Num(f64),
    /// Index into the expression's band list
    Band(usize),
    BinOp {
        op: char,
        left: Box<Node>,
        right: Box<Node>,
    },
    Neg(Box<Node>),
}

fn tokenize(formula: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = formula.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(chars[i]));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // exponent: 1e-4, 2.5E3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<f64>()
                    .map_err(|_| Error::Formula(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Band(chars[start..i].iter().collect()));
            }
            c => {
                return Err(Error::Formula(format!(
                    "unexpected character '{}' in formula",
                    c
                )));
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent parser; band names are interned as they appear
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    bands: Vec<String>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn band_index(&mut self, name: String) -> usize {
        match self.bands.iter().position(|b| *b == name) {
            Some(i) => i,
            None => {
                self.bands.push(name);
                self.bands.len() - 1
            }
        }
    }

    /// expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Node> {
        let mut left = self.parse_term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_term()?;
            left = Node::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// term = factor (('*' | '/') factor)*
    fn parse_term(&mut self) -> Result<Node> {
        let mut left = self.parse_factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_factor()?;
            left = Node::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// factor = number | band | '(' expr ')' | ('-' | '+') factor
    fn parse_factor(&mut self) -> Result<Node> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Node::Num(n)),
            Some(Token::Band(name)) => Ok(Node::Band(self.band_index(name))),
            Some(Token::LParen) => {
                let node = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(node),
                    _ => Err(Error::Formula("expected closing parenthesis".into())),
                }
            }
            Some(Token::Op('-')) => Ok(Node::Neg(Box::new(self.parse_factor()?))),
            Some(Token::Op('+')) => self.parse_factor(),
            Some(other) => Err(Error::Formula(format!("unexpected token {:?}", other))),
            None => Err(Error::Formula("formula ends unexpectedly".into())),
        }
    }
}

fn eval(node: &Node, values: &[f64]) -> Option<f64> {
    match node {
        Node::Num(n) => Some(*n),
        Node::Band(i) => values.get(*i).copied(),
        Node::Neg(inner) => eval(inner, values).map(|v| -v),
        Node::BinOp { op, left, right } => {
            let l = eval(left, values)?;
            let r = eval(right, values)?;
            match op {
                '+' => Some(l + r),
                '-' => Some(l - r),
                '*' => Some(l * r),
                '/' if r == 0.0 => None,
                '/' => Some(l / r),
                _ => None,
            }
        }
    }
}

/// A parsed band arithmetic formula
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
    bands: Vec<String>,
}

impl Expression {
    /// Parse a formula
    pub fn parse(formula: &str) -> Result<Self> {
        let tokens = tokenize(formula)?;
        if tokens.is_empty() {
            return Err(Error::Formula("empty formula".into()));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            bands: Vec::new(),
        };
        let root = parser.parse_expr()?;
        if let Some(extra) = parser.peek() {
            return Err(Error::Formula(format!(
                "unexpected {:?} after end of expression",
                extra
            )));
        }
        Ok(Self {
            source: formula.to_string(),
            root,
            bands: parser.bands,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Referenced band names, in first-appearance order
    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    /// Evaluate with one value per band.
    ///
    /// Returns `None` on division by zero, a non-finite result, or a short
    /// value slice.
    pub fn evaluate(&self, values: &[f64]) -> Option<f64> {
        eval(&self.root, values).filter(|v| v.is_finite())
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndvi_formula() {
        let e = Expression::parse("(NIR - Red) / (NIR + Red)").unwrap();
        assert_eq!(e.bands(), &["NIR".to_string(), "Red".to_string()]);
        let v = e.evaluate(&[0.8, 0.2]).unwrap();
        assert!((v - 0.6).abs() < 1e-12, "NDVI should be 0.6, got {}", v);
    }

    #[test]
    fn test_precedence_and_constants() {
        let e = Expression::parse("A * 2.5 + 10").unwrap();
        assert!((e.evaluate(&[5.0]).unwrap() - 22.5).abs() < 1e-12);

        let e = Expression::parse("-A + 1e-1 * 20").unwrap();
        assert!((e.evaluate(&[1.0]).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_evi_formula() {
        let e = Expression::parse("2.5 * (B8 - B4) / (B8 + 6 * B4 - 7.5 * B2 + 1)").unwrap();
        assert_eq!(e.bands().len(), 3);
        let expected = 2.5 * 0.6 / (0.8 + 1.2 - 0.75 + 1.0);
        assert!((e.evaluate(&[0.8, 0.2, 0.1]).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_division_by_zero_is_none() {
        let e = Expression::parse("A / B").unwrap();
        assert_eq!(e.evaluate(&[1.0, 0.0]), None);
    }

    #[test]
    fn test_invalid_formulas() {
        for bad in ["(NIR - ", "NIR $ Red", "", "A B", "1..2"] {
            assert!(
                matches!(Expression::parse(bad), Err(Error::Formula(_))),
                "'{}' should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_repeated_band_interned_once() {
        let e = Expression::parse("(A - B) / (A + B)").unwrap();
        assert_eq!(e.bands().len(), 2);
    }
}
