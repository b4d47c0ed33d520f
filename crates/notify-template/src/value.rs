//! Variable lookup and conversion helpers.
//!
//! These follow loose scripting-language conventions so templates written for
//! the previous platform keep rendering the same way.

use serde_json::{Number, Value};

/// Resolve `key` against `vars`.
///
/// An exact top-level key wins; otherwise the key is split on `.` and walked
/// through nested objects (and arrays, for numeric segments).
pub fn lookup<'a>(vars: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(value) = vars.as_object().and_then(|map| map.get(key)) {
        return Some(value);
    }

    let mut current = vars;
    for segment in key.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Truthiness: `null`, `false`, `0`, `NaN` and `""` are falsy; everything
/// else, including empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Convert a value to the text inserted into rendered content.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn format_number(n: &Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                return format!("{}", f as i64);
            }
        }
    }
    n.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_missing_path() {
        let vars = json!({"a": {"b": 1}});
        assert!(lookup(&vars, "a.c").is_none());
        assert!(lookup(&vars, "a.b.c").is_none());
        assert!(lookup(&vars, "z").is_none());
    }

    #[test]
    fn test_lookup_null_is_present() {
        let vars = json!({"a": null});
        assert_eq!(lookup(&vars, "a"), Some(&Value::Null));
    }

    #[test]
    fn test_stringify_numbers() {
        assert_eq!(stringify(&json!(3)), "3");
        assert_eq!(stringify(&json!(3.0)), "3");
        assert_eq!(stringify(&json!(0.75)), "0.75");
        assert_eq!(stringify(&json!(-12)), "-12");
    }

    #[test]
    fn test_stringify_composites() {
        assert_eq!(stringify(&json!(["a", 1, true])), "a, 1, true");
        assert_eq!(stringify(&json!({"k": "v"})), r#"{"k":"v"}"#);
        assert_eq!(stringify(&Value::Null), "");
    }
}
