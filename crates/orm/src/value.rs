//! Helpers for working with `serde_json::Value` as the universal field and
//! bind value type.

use serde_json::Value;

/// True when a value should be treated as "no value" for association
/// resolution: null, empty string, or absent numeric zero is NOT empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Render a bind value the way it appears in a WHERE clause comparison,
/// used for display-field lookups and log output.
pub fn to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Loose scalar equality: numeric values compare numerically so that an
/// integer 1 from the database matches a 1.0 submitted by a form layer.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emptiness() {
        assert!(is_empty(&Value::Null));
        assert!(is_empty(&json!("")));
        assert!(!is_empty(&json!(0)));
        assert!(!is_empty(&json!("0")));
        assert!(!is_empty(&json!(false)));
    }

    #[test]
    fn plain_strings() {
        assert_eq!(to_plain_string(&json!("news")), "news");
        assert_eq!(to_plain_string(&json!(42)), "42");
    }

    #[test]
    fn loose_equality() {
        assert!(loosely_equal(&json!(1), &json!(1.0)));
        assert!(loosely_equal(&json!("a"), &json!("a")));
        assert!(!loosely_equal(&json!("1"), &json!(1)));
    }
}
