use regex::Regex;
use serde_json::Value;

use crate::error::{NodeError, NodeResult};

/// Comparison operators shared by the rule and comparison condition
/// strategies and by the expression evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    NotEquals,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,
    In,
    NotIn,
}

impl CompareOp {
    /// Parse the snake_case operator tag used in node configuration.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "equals" => Some(CompareOp::Equals),
            "not_equals" => Some(CompareOp::NotEquals),
            "greater" => Some(CompareOp::Greater),
            "less" => Some(CompareOp::Less),
            "greater_equal" => Some(CompareOp::GreaterEqual),
            "less_equal" => Some(CompareOp::LessEqual),
            "contains" => Some(CompareOp::Contains),
            "not_contains" => Some(CompareOp::NotContains),
            "starts_with" => Some(CompareOp::StartsWith),
            "ends_with" => Some(CompareOp::EndsWith),
            "matches" => Some(CompareOp::Matches),
            "in" => Some(CompareOp::In),
            "not_in" => Some(CompareOp::NotIn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Equals => "equals",
            CompareOp::NotEquals => "not_equals",
            CompareOp::Greater => "greater",
            CompareOp::Less => "less",
            CompareOp::GreaterEqual => "greater_equal",
            CompareOp::LessEqual => "less_equal",
            CompareOp::Contains => "contains",
            CompareOp::NotContains => "not_contains",
            CompareOp::StartsWith => "starts_with",
            CompareOp::EndsWith => "ends_with",
            CompareOp::Matches => "matches",
            CompareOp::In => "in",
            CompareOp::NotIn => "not_in",
        }
    }
}

/// Apply a comparison operator to two resolved values.
///
/// Null handling is fixed by contract: both sides null is `true` only for
/// `equals`; exactly one side null is `true` only for `not_equals`.
pub fn compare(left: &Value, op: CompareOp, right: &Value) -> NodeResult<bool> {
    if left.is_null() && right.is_null() {
        return Ok(op == CompareOp::Equals);
    }
    if left.is_null() || right.is_null() {
        return Ok(op == CompareOp::NotEquals);
    }

    match op {
        CompareOp::Equals => Ok(loose_equal(left, right)),
        CompareOp::NotEquals => Ok(!loose_equal(left, right)),
        CompareOp::Greater => Ok(as_number(left)? > as_number(right)?),
        CompareOp::Less => Ok(as_number(left)? < as_number(right)?),
        CompareOp::GreaterEqual => Ok(as_number(left)? >= as_number(right)?),
        CompareOp::LessEqual => Ok(as_number(left)? <= as_number(right)?),
        CompareOp::Contains => Ok(contains(left, right)),
        CompareOp::NotContains => Ok(!contains(left, right)),
        CompareOp::StartsWith => Ok(to_text(left).starts_with(&to_text(right))),
        CompareOp::EndsWith => Ok(to_text(left).ends_with(&to_text(right))),
        CompareOp::Matches => {
            let pattern = Regex::new(&to_text(right))
                .map_err(|e| NodeError::Evaluation(format!("invalid regex: {e}")))?;
            Ok(pattern.is_match(&to_text(left)))
        }
        // `in`/`not_in` require the right side to already be a list; there
        // is no ad-hoc string splitting.
        CompareOp::In => match right {
            Value::Array(items) => Ok(items.iter().any(|item| loose_equal(item, left))),
            _ => Ok(false),
        },
        CompareOp::NotIn => match right {
            Value::Array(items) => Ok(!items.iter().any(|item| loose_equal(item, left))),
            _ => Ok(false),
        },
    }
}

/// Render a value the way it reads in a rule string: bare strings, numbers
/// and booleans without JSON quoting.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numeric coercion for ordering operators: numbers pass through, numeric
/// strings parse, anything else is an evaluation error.
pub fn as_number(value: &Value) -> NodeResult<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| NodeError::Evaluation(format!("non-finite number: {n}"))),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| NodeError::Evaluation(format!("not a number: {s:?}"))),
        other => Err(NodeError::Evaluation(format!(
            "cannot compare non-numeric value: {other}"
        ))),
    }
}

/// Equality with type coercion between numbers, numeric strings, and
/// boolean-like strings.
pub fn loose_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.parse::<f64>().ok() == n.as_f64()
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            match s.to_lowercase().as_str() {
                "true" => *b,
                "false" => !*b,
                _ => false,
            }
        }
        _ => false,
    }
}

fn contains(left: &Value, right: &Value) -> bool {
    match left {
        Value::String(s) => s.contains(&to_text(right)),
        Value::Array(items) => items.iter().any(|item| loose_equal(item, right)),
        other => to_text(other).contains(&to_text(right)),
    }
}
