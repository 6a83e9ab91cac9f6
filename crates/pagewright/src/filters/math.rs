//! Arithmetic filters.
//!
//! Integer operands stay integers until an operation overflows or a float
//! is involved; `divide` yields an integer only when the division is exact.

use super::FilterDef;
use crate::error::{TemplateError, TemplateResult};
use crate::value::{Number, Value};

pub(super) fn filters() -> Vec<FilterDef> {
    vec![
        binary("add", i64::checked_add, |a, b| a + b),
        binary("subtract", i64::checked_sub, |a, b| a - b),
        binary("multiply", i64::checked_mul, |a, b| a * b),
        FilterDef::value("divide", 2, |_, value, args| {
            let (a, b) = operands("divide", &value, args)?;
            divide(a, b).map(Value::from)
        }),
        FilterDef::value("mod", 2, |_, value, args| {
            let (a, b) = operands("mod", &value, args)?;
            modulo(a, b).map(Value::from)
        }),
        FilterDef::value("incr", 1, |_, value, _| {
            let a = number("incr", &value)?;
            Ok(apply(a, Number::Int(1), i64::checked_add, |a, b| a + b).into())
        }),
        FilterDef::value("decr", 1, |_, value, _| {
            let a = number("decr", &value)?;
            Ok(apply(a, Number::Int(1), i64::checked_sub, |a, b| a - b).into())
        }),
    ]
}

fn binary(name: &'static str, int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> FilterDef {
    FilterDef::value(name, 2, move |_, value, args| {
        let (a, b) = operands(name, &value, args)?;
        Ok(apply(a, b, int_op, float_op).into())
    })
}

fn number(name: &str, value: &Value) -> TemplateResult<Number> {
    value
        .as_number()
        .ok_or_else(|| TemplateError::invalid_argument(format!("{} expects a number, got {}", name, value.kind())))
}

fn operands(name: &str, value: &Value, args: &[Value]) -> TemplateResult<(Number, Number)> {
    let a = number(name, value)?;
    let b = args
        .first()
        .ok_or_else(|| TemplateError::invalid_argument(format!("{} expects an operand", name)))
        .and_then(|arg| number(name, arg))?;
    Ok((a, b))
}

fn apply(a: Number, b: Number, int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> Number {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => match int_op(x, y) {
            Some(n) => Number::Int(n),
            None => Number::Float(float_op(x as f64, y as f64)),
        },
        _ => Number::Float(float_op(a.as_f64(), b.as_f64())),
    }
}

fn divide(a: Number, b: Number) -> TemplateResult<Number> {
    if b.as_f64() == 0.0 {
        return Err(TemplateError::invalid_argument("division by zero"));
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) if x.checked_rem(y) == Some(0) => Ok(Number::Int(x / y)),
        _ => Ok(Number::Float(a.as_f64() / b.as_f64())),
    }
}

fn modulo(a: Number, b: Number) -> TemplateResult<Number> {
    if b.as_f64() == 0.0 {
        return Err(TemplateError::invalid_argument("modulo by zero"));
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Ok(x
            .checked_rem(y)
            .map(Number::Int)
            .unwrap_or(Number::Int(0))),
        _ => Ok(Number::Float(a.as_f64() % b.as_f64())),
    }
}
