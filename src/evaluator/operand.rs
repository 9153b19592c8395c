use serde_json::{Map, Value};

/// Resolve a field path against the execution data.
///
/// A whole-key match wins over dotted traversal, so a flat key containing a
/// literal dot still resolves. Otherwise each dot descends one level into a
/// nested object; a miss at any level yields `None`.
pub fn lookup_field(data: &Map<String, Value>, path: &str) -> Option<Value> {
    if path.trim().is_empty() {
        return None;
    }
    if let Some(value) = data.get(path) {
        return Some(value.clone());
    }

    let mut current = Value::Object(data.clone());
    for part in path.split('.') {
        match current {
            Value::Object(ref obj) => match obj.get(part) {
                Some(next) => current = next.clone(),
                None => return None,
            },
            _ => return None,
        }
    }
    Some(current)
}

/// Convert a condition operand token into a typed value.
///
/// `$field` and `data.field` are field references into the execution data;
/// quoted tokens are string literals; integers, decimals and booleans parse
/// to their typed forms; anything else is kept as a raw string.
pub fn resolve_operand(data: &Map<String, Value>, operand: &str) -> Value {
    let operand = operand.trim();
    if operand.is_empty() {
        return Value::Null;
    }

    if let Some(path) = operand.strip_prefix('$') {
        return lookup_field(data, path).unwrap_or(Value::Null);
    }
    if let Some(path) = operand.strip_prefix("data.") {
        return lookup_field(data, path).unwrap_or(Value::Null);
    }

    if operand.len() >= 2 && operand.starts_with('"') && operand.ends_with('"') {
        return Value::String(operand[1..operand.len() - 1].to_string());
    }

    if operand.contains('.') {
        if let Ok(f) = operand.parse::<f64>() {
            return Value::from(f);
        }
    } else if let Ok(i) = operand.parse::<i64>() {
        return Value::from(i);
    }

    if operand.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if operand.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    Value::String(operand.to_string())
}
