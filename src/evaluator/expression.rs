//! Boolean expression evaluator for condition and custom-evaluator nodes.
//!
//! A small recursive-descent interpreter over a flat or nested scope map.
//! Grammar, loosest-binding first:
//!
//! ```text
//! or    := and ("||" and)*
//! and   := cmp ("&&" cmp)*
//! cmp   := unary (("==" | "!=" | ">" | "<" | ">=" | "<=") unary)?
//! unary := "!" unary | primary
//! primary := "(" or ")" | number | string | true | false | null | ident
//! ```
//!
//! Identifiers resolve against the scope; dotted paths descend into nested
//! objects and unresolved names evaluate to null. Comparison semantics are
//! shared with [`operators::compare`](super::operators::compare), so null
//! and coercion behavior is identical across all condition strategies.

use serde_json::{Map, Value};

use crate::error::{NodeError, NodeResult};
use crate::evaluator::operand::lookup_field;
use crate::evaluator::operators::{compare, CompareOp};

/// Evaluate an expression to a boolean against the scope.
///
/// Non-boolean final values coerce by truthiness: null and zero are false,
/// an empty string or the string `"false"` is false, everything else true.
pub fn evaluate_bool(expression: &str, scope: &Map<String, Value>) -> NodeResult<bool> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(NodeError::Evaluation("empty expression".into()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        scope,
    };
    let value = parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(NodeError::Evaluation(format!(
            "unexpected trailing token at position {}",
            parser.pos
        )));
    }
    Ok(truthy(&value))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> NodeResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::Equals));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::NotEquals));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::GreaterEqual));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Op(CompareOp::Greater));
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::LessEqual));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op(CompareOp::Less));
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end == chars.len() {
                    return Err(NodeError::Evaluation("unterminated string literal".into()));
                }
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '-' if chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())
                && !matches!(
                    tokens.last(),
                    Some(Token::Ident(_) | Token::Num(_) | Token::Str(_) | Token::RParen)
                ) =>
            {
                let (num, next) = read_number(&chars, i)?;
                tokens.push(Token::Num(num));
                i = next;
            }
            _ if c.is_ascii_digit() => {
                let (num, next) = read_number(&chars, i)?;
                tokens.push(Token::Num(num));
                i = next;
            }
            _ if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                let mut end = i;
                while end < chars.len()
                    && (chars[end].is_alphanumeric()
                        || chars[end] == '_'
                        || chars[end] == '.'
                        || chars[end] == '$')
                {
                    end += 1;
                }
                let word: String = chars[start..end].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => Token::Ident(word.trim_start_matches('$').to_string()),
                });
                i = end;
            }
            other => {
                return Err(NodeError::Evaluation(format!(
                    "unexpected character {other:?} at offset {i}"
                )));
            }
        }
    }
    Ok(tokens)
}

fn read_number(chars: &[char], start: usize) -> NodeResult<(f64, usize)> {
    let mut end = start + 1;
    while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
        end += 1;
    }
    let text: String = chars[start..end].iter().collect();
    let num = text
        .parse::<f64>()
        .map_err(|_| NodeError::Evaluation(format!("invalid number literal: {text}")))?;
    Ok((num, end))
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    scope: &'a Map<String, Value>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn or_expr(&mut self) -> NodeResult<Value> {
        let mut left = truthy(&self.and_expr()?);
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = truthy(&self.and_expr()?);
            left = left || right;
        }
        Ok(Value::Bool(left))
    }

    fn and_expr(&mut self) -> NodeResult<Value> {
        let mut left = truthy(&self.cmp_expr()?);
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = truthy(&self.cmp_expr()?);
            left = left && right;
        }
        Ok(Value::Bool(left))
    }

    fn cmp_expr(&mut self) -> NodeResult<Value> {
        let left = self.unary_expr()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.advance();
            let right = self.unary_expr()?;
            return Ok(Value::Bool(compare(&left, op, &right)?));
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> NodeResult<Value> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let value = self.unary_expr()?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.primary()
    }

    fn primary(&mut self) -> NodeResult<Value> {
        match self.advance() {
            Some(Token::LParen) => {
                let value = self.or_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(NodeError::Evaluation("expected closing parenthesis".into())),
                }
            }
            Some(Token::Num(n)) => Ok(Value::from(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Bool(b)) => Ok(Value::Bool(b)),
            Some(Token::Null) => Ok(Value::Null),
            Some(Token::Ident(path)) => {
                Ok(lookup_field(self.scope, &path).unwrap_or(Value::Null))
            }
            other => Err(NodeError::Evaluation(format!(
                "expected a value, found {other:?}"
            ))),
        }
    }
}
