//! Expression evaluation and fragment writing.
//!
//! Evaluating a variable fragment runs its pipeline left to right:
//!
//! 1. The initial expression is resolved. An initial call `f(a, b)` is
//!    treated as the first stage: `a` is the piped value and `b` its
//!    argument.
//! 2. Each stage is resolved by name and arity (value, then context, then
//!    block filters) and applied.
//! 3. Once a block filter has written output, any later stage receives that
//!    output: either as a block filter fed the buffered text, or as a named
//!    filter transformer.
//!
//! The outcome decides what is written: an encoded value, nothing, or the
//! fragment's original text when the expression could not be handled.

use indexmap::IndexMap;
use pagewright_parser::{Expression, FilterCall, Literal, PageFragment, VariableFragment};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::binding::{evaluate_binding, Lookup};
use crate::error::{TemplateError, TemplateResult};
use crate::filters::{FilterDef, FilterInvoke, FilterKind, FilterOutput};
use crate::scope::ScopeContext;
use crate::value::Value;

/// What evaluating a variable fragment produced.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Value(Value),
    /// The expression deliberately produced nothing.
    Ignore,
    /// The expression could not be resolved; its source text is written.
    Unhandled,
    /// A block filter already wrote the output.
    Written,
}

struct Stage<'e> {
    name: &'e str,
    args: &'e [Expression],
    arity: usize,
}

pub(crate) async fn write_fragments(
    scope: &mut ScopeContext<'_>,
    out: &mut (dyn AsyncWrite + Unpin + Send),
    fragments: &[PageFragment],
) -> TemplateResult<()> {
    for fragment in fragments {
        match fragment {
            PageFragment::Text(text) => out.write_all(text.as_bytes()).await?,
            PageFragment::Variable(var) => write_variable(scope, out, var).await?,
        }
    }
    Ok(())
}

pub(crate) async fn write_variable(
    scope: &mut ScopeContext<'_>,
    out: &mut (dyn AsyncWrite + Unpin + Send),
    var: &VariableFragment,
) -> TemplateResult<()> {
    let outcome = match evaluate_pipeline(scope, out, &var.expression, &var.filters).await {
        Ok(outcome) => outcome,
        Err(err) if err.is_recoverable() => {
            match scope.format().on_expression_exception(scope.context(), &err) {
                Some(fallback) => {
                    warn!(expression = %var.original_text, error = %err, "expression error replaced by fallback");
                    Outcome::Value(fallback)
                }
                None => return Err(err),
            }
        }
        Err(err) => return Err(err),
    };

    let text = match outcome {
        Outcome::Value(Value::Null) | Outcome::Ignore | Outcome::Written => return Ok(()),
        Outcome::Value(value) => scope.format().encode_value(&value),
        Outcome::Unhandled => scope.context().unhandled_text(var),
    };
    out.write_all(text.as_bytes()).await?;
    Ok(())
}

/// Evaluates a pipeline, writing to `out` only when a block filter runs.
pub(crate) async fn evaluate_pipeline(
    scope: &mut ScopeContext<'_>,
    out: &mut (dyn AsyncWrite + Unpin + Send),
    initial: &Expression,
    filters: &[FilterCall],
) -> TemplateResult<Outcome> {
    let mut stages = Vec::with_capacity(filters.len() + 1);
    let base = match initial {
        Expression::Call(call) => {
            if scope.find_filter(&call.name, call.args.len()).is_none() {
                return Ok(Outcome::Unhandled);
            }
            let (base, args) = match call.args.split_first() {
                Some((first, rest)) => (eval_expression(scope, first)?, rest),
                None => (Lookup::Found(Value::Null), &[][..]),
            };
            stages.push(Stage {
                name: &call.name,
                args,
                arity: call.args.len(),
            });
            base
        }
        other => eval_expression(scope, other)?,
    };
    stages.extend(filters.iter().map(|f| Stage {
        name: &f.name,
        args: &f.args,
        arity: f.args.len() + 1,
    }));

    let mut value = match base {
        Lookup::Found(value) => resolve_value(scope, value)?,
        Lookup::NotFound => {
            let handles_unknown = stages.iter().any(|stage| {
                scope
                    .find_filter(stage.name, stage.arity)
                    .is_some_and(FilterDef::accepts_unknown)
            });
            if handles_unknown {
                Value::Null
            } else if stages.is_empty() {
                return Ok(Outcome::Unhandled);
            } else {
                return Ok(Outcome::Ignore);
            }
        }
    };

    for (position, stage) in stages.iter().enumerate() {
        let Some(def) = scope.find_filter(stage.name, stage.arity) else {
            if position == 0 {
                return Ok(Outcome::Ignore);
            }
            return Err(TemplateError::FilterNotFound {
                name: stage.name.to_string(),
                position,
                suggestions: scope.suggest_filters(stage.name),
            });
        };
        let args = eval_args(scope, stage.args)?;
        let wrap = |err| TemplateError::filter(stage.name, err);

        value = match def.invoke() {
            FilterInvoke::Value(filter) => filter(scope.context(), value, &args).map_err(wrap)?,
            FilterInvoke::Context(filter) => match filter(&mut *scope, value, &args).map_err(wrap)? {
                FilterOutput::Value(value) => value,
                FilterOutput::Ignore | FilterOutput::Stop => return Ok(Outcome::Ignore),
            },
            FilterInvoke::Block(block) => {
                let rest = &stages[position + 1..];
                if rest.is_empty() {
                    block.invoke(scope, out, value, args).await.map_err(wrap)?;
                } else {
                    let mut buffer = Vec::new();
                    block.invoke(scope, &mut buffer, value, args).await.map_err(wrap)?;
                    write_block_chain(scope, out, buffer, rest).await?;
                }
                return Ok(Outcome::Written);
            }
        };
        value = resolve_value(scope, value)?;
    }

    Ok(Outcome::Value(value))
}

/// Passes block output through the stages that follow a block filter.
async fn write_block_chain(
    scope: &mut ScopeContext<'_>,
    out: &mut (dyn AsyncWrite + Unpin + Send),
    mut buffer: Vec<u8>,
    stages: &[Stage<'_>],
) -> TemplateResult<()> {
    for (i, stage) in stages.iter().enumerate() {
        let block = scope
            .find_filter_of_kind(FilterKind::Block, stage.name, stage.arity)
            .and_then(FilterDef::as_block);
        if let Some(block) = block {
            let text = String::from_utf8(buffer).map_err(|e| TemplateError::Transform(e.to_string()))?;
            let args = eval_args(scope, stage.args)?;
            let wrap = |err| TemplateError::filter(stage.name, err);
            if i + 1 == stages.len() {
                return block.invoke(scope, out, Value::String(text), args).await.map_err(wrap);
            }
            let mut next = Vec::new();
            block.invoke(scope, &mut next, Value::String(text), args).await.map_err(wrap)?;
            buffer = next;
        } else if let Some(transformer) = scope.filter_transformer(stage.name) {
            buffer = transformer.transform(buffer).await?;
        } else {
            return Err(TemplateError::FilterTransformerNotFound {
                name: stage.name.to_string(),
            });
        }
    }
    out.write_all(&buffer).await?;
    Ok(())
}

fn eval_args(scope: &mut ScopeContext<'_>, args: &[Expression]) -> TemplateResult<Vec<Value>> {
    args.iter()
        .map(|arg| {
            let value = eval_expression(scope, arg)?.into_value();
            resolve_value(scope, value)
        })
        .collect()
}

/// Evaluates an expression to a value. Calls may use value and context
/// filters; block filters cannot produce a value.
pub(crate) fn eval_expression(scope: &mut ScopeContext<'_>, expr: &Expression) -> TemplateResult<Lookup> {
    match expr {
        Expression::Literal(literal) => Ok(Lookup::Found(literal_value(literal))),
        Expression::Binding(path) => evaluate_binding(scope, &path.text),
        Expression::Array(items) => items
            .iter()
            .map(|item| eval_expression(scope, item).map(Lookup::into_value))
            .collect::<TemplateResult<Vec<_>>>()
            .map(|items| Lookup::Found(Value::Array(items))),
        Expression::Object(entries) => entries
            .iter()
            .map(|(key, item)| Ok((key.clone(), eval_expression(scope, item)?.into_value())))
            .collect::<TemplateResult<IndexMap<_, _>>>()
            .map(|map| Lookup::Found(Value::Object(map))),
        Expression::Call(call) => call_filter(scope, call),
    }
}

fn call_filter(scope: &mut ScopeContext<'_>, call: &FilterCall) -> TemplateResult<Lookup> {
    let Some(def) = scope.find_filter(&call.name, call.args.len()) else {
        return Ok(Lookup::NotFound);
    };
    let mut values = eval_args(scope, &call.args)?;
    let value = if values.is_empty() {
        Value::Null
    } else {
        values.remove(0)
    };
    let wrap = |err| TemplateError::filter(call.name.as_str(), err);

    match def.invoke() {
        FilterInvoke::Value(filter) => filter(scope.context(), value, &values).map(Lookup::Found).map_err(wrap),
        FilterInvoke::Context(filter) => match filter(&mut *scope, value, &values).map_err(wrap)? {
            FilterOutput::Value(value) => Ok(Lookup::Found(value)),
            FilterOutput::Ignore | FilterOutput::Stop => Ok(Lookup::Found(Value::Null)),
        },
        FilterInvoke::Block(_) => Err(wrap(TemplateError::NotSupported(format!(
            "block filter '{}' cannot be used as a value",
            call.name
        )))),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

/// Evaluates any expression values held in `value`, including inside arrays
/// and objects. Values without expressions are returned untouched.
pub(crate) fn resolve_value(scope: &mut ScopeContext<'_>, value: Value) -> TemplateResult<Value> {
    if !contains_expression(&value) {
        return Ok(value);
    }
    scope.enter_nested()?;
    let resolved = resolve_nested(scope, value);
    scope.exit_nested();
    resolved
}

fn resolve_nested(scope: &mut ScopeContext<'_>, value: Value) -> TemplateResult<Value> {
    match value {
        Value::Expression(expr) => {
            let value = eval_expression(scope, &expr)?.into_value();
            resolve_value(scope, value)
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| resolve_value(scope, item))
            .collect::<TemplateResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, item)| Ok((key, resolve_value(scope, item)?)))
            .collect::<TemplateResult<IndexMap<_, _>>>()
            .map(Value::Object),
        other => Ok(other),
    }
}

fn contains_expression(value: &Value) -> bool {
    match value {
        Value::Expression(_) => true,
        Value::Array(items) => items.iter().any(contains_expression),
        Value::Object(map) => map.values().any(contains_expression),
        _ => false,
    }
}
