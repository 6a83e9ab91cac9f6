//! Array and object filters.

use super::{usize_arg, FilterDef};
use crate::error::TemplateError;
use crate::value::Value;

pub(super) fn filters() -> Vec<FilterDef> {
    vec![
        FilterDef::value("length", 1, |_, value, _| {
            let len = match &value {
                Value::Null => 0,
                Value::String(s) | Value::Raw(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(TemplateError::invalid_argument(format!(
                        "length is not defined for {}",
                        other.kind()
                    )))
                }
            };
            Ok(Value::from(len))
        }),
        FilterDef::value("first", 1, |_, value, _| Ok(first(value))),
        FilterDef::value("last", 1, |_, value, _| Ok(last(value))),
        FilterDef::value("reverse", 1, |_, value, _| {
            Ok(match value {
                Value::Array(mut items) => {
                    items.reverse();
                    Value::Array(items)
                }
                Value::String(s) => Value::String(s.chars().rev().collect()),
                other => other,
            })
        }),
        FilterDef::value("take", 2, |_, value, args| {
            let n = usize_arg("take", args, 0)?;
            Ok(map_array(value, |items| items.into_iter().take(n).collect()))
        }),
        FilterDef::value("skip", 2, |_, value, args| {
            let n = usize_arg("skip", args, 0)?;
            Ok(map_array(value, |items| items.into_iter().skip(n).collect()))
        }),
        FilterDef::value("keys", 1, |_, value, _| {
            Ok(match value {
                Value::Object(map) => Value::Array(map.into_keys().map(Value::String).collect()),
                _ => Value::Array(Vec::new()),
            })
        }),
        FilterDef::value("values", 1, |_, value, _| {
            Ok(match value {
                Value::Object(map) => Value::Array(map.into_values().collect()),
                Value::Array(items) => Value::Array(items),
                _ => Value::Array(Vec::new()),
            })
        }),
    ]
}

fn first(value: Value) -> Value {
    match value {
        Value::Array(items) => items.into_iter().next().unwrap_or_default(),
        Value::String(s) => s.chars().next().map(|c| Value::String(c.to_string())).unwrap_or_default(),
        _ => Value::Null,
    }
}

fn last(value: Value) -> Value {
    match value {
        Value::Array(items) => items.into_iter().last().unwrap_or_default(),
        Value::String(s) => s.chars().last().map(|c| Value::String(c.to_string())).unwrap_or_default(),
        _ => Value::Null,
    }
}

fn map_array(value: Value, f: impl FnOnce(Vec<Value>) -> Vec<Value>) -> Value {
    match value {
        Value::Array(items) => Value::Array(f(items)),
        Value::Null => Value::Null,
        other => Value::Array(f(vec![other])),
    }
}
