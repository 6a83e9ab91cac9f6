//! Null handling and comparison filters.

use super::FilterDef;
use crate::value::Value;

pub(super) fn filters() -> Vec<FilterDef> {
    vec![
        FilterDef::value("default", 2, |_, value, args| {
            Ok(match value {
                Value::Null => args.first().cloned().unwrap_or_default(),
                other => other,
            })
        })
        .handles_unknown(),
        FilterDef::value("isNull", 1, |_, value, _| Ok(Value::Bool(value.is_null()))).handles_unknown(),
        FilterDef::value("equals", 2, |_, value, args| {
            Ok(Value::Bool(args.first().is_some_and(|other| loosely_equal(&value, other))))
        }),
        FilterDef::value("not", 1, |_, value, _| Ok(Value::Bool(!value.is_truthy()))),
    ]
}

/// Equality that treats numerically equal ints, floats and numeric strings
/// as the same value.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::String(x) | Value::Raw(x), Value::String(y) | Value::Raw(y)) => x == y,
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_equality() {
        assert!(loosely_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(loosely_equal(&Value::from("2"), &Value::Int(2)));
        assert!(loosely_equal(&Value::Raw("a".into()), &Value::from("a")));
        assert!(!loosely_equal(&Value::from("a"), &Value::from("b")));
        assert!(!loosely_equal(&Value::Null, &Value::Int(0)));
    }
}
