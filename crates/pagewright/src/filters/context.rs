//! Filters that read or change the evaluation scope.

use indexmap::IndexMap;
use pagewright_parser::{parse_accessors, split_binding, Accessor, Expression, Literal};

use super::{FilterDef, FilterOutput, FilterProvider};
use crate::error::{TemplateError, TemplateResult};
use crate::scope::ScopeContext;
use crate::value::Value;

/// `assignTo` and `ifExists`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextFilters;

impl FilterProvider for ContextFilters {
    fn filters(&self) -> Vec<FilterDef> {
        vec![
            FilterDef::context("assignTo", 2, assign_to),
            FilterDef::context("ifExists", 1, if_exists).handles_unknown(),
        ]
    }
}

/// Stores the piped value in a scope local and writes nothing.
///
/// `{{ 11200 | assignTo: balance }}` sets `balance`; a dotted target such as
/// `totals.net` creates or updates a member of the `totals` local.
fn assign_to(scope: &mut ScopeContext<'_>, value: Value, args: &[Value]) -> TemplateResult<FilterOutput> {
    let text = args
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| TemplateError::invalid_argument("assignTo expects a target name"))?;
    let target = scope
        .context()
        .cache()
        .get_or_try_insert_with(text, || AssignTarget::parse(text))?;

    if target.steps.is_empty() {
        scope.set_local(target.head.clone(), value);
        return Ok(FilterOutput::Ignore);
    }

    let mut root = match scope.remove_local(&target.head) {
        Some(existing) => existing,
        None => scope.lookup(&target.head)?.into_value(),
    };
    target.assign(&mut root, value)?;
    scope.set_local(target.head.clone(), root);
    Ok(FilterOutput::Ignore)
}

fn if_exists(_scope: &mut ScopeContext<'_>, value: Value, _args: &[Value]) -> TemplateResult<FilterOutput> {
    if value.is_null() {
        Ok(FilterOutput::Stop)
    } else {
        Ok(FilterOutput::Value(value))
    }
}

/// A parsed `assignTo` target, cached per target text.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignTarget {
    pub head: String,
    pub steps: Vec<AssignStep>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignStep {
    Key(String),
    Index(usize),
}

impl AssignTarget {
    pub fn parse(text: &str) -> TemplateResult<Self> {
        let text = text.trim();
        let (head, rest) = split_binding(text);
        if head.is_empty() {
            return Err(TemplateError::invalid_argument(format!("invalid assign target '{}'", text)));
        }
        let accessors = parse_accessors(rest).map_err(|source| TemplateError::Parse {
            text: text.to_string(),
            source,
        })?;
        let steps = accessors
            .into_iter()
            .map(|accessor| match accessor {
                Accessor::Member(name) => Ok(AssignStep::Key(name)),
                Accessor::Index(Expression::Literal(Literal::String(key))) => Ok(AssignStep::Key(key)),
                Accessor::Index(Expression::Literal(Literal::Int(i))) if i >= 0 => {
                    Ok(AssignStep::Index(i as usize))
                }
                Accessor::Index(_) => Err(TemplateError::invalid_argument(format!(
                    "assign target '{}' may only use constant indexes",
                    text
                ))),
            })
            .collect::<TemplateResult<Vec<_>>>()?;
        Ok(Self {
            head: head.to_string(),
            steps,
        })
    }

    /// Writes `value` at the end of the steps, creating objects for missing
    /// members.
    fn assign(&self, root: &mut Value, value: Value) -> TemplateResult<()> {
        let mut current = root;
        for step in &self.steps {
            current = match step {
                AssignStep::Key(key) => {
                    if !matches!(current, Value::Object(_)) {
                        *current = Value::Object(IndexMap::new());
                    }
                    match current {
                        Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                        _ => return Err(TemplateError::invalid_argument(format!("cannot assign '{}'", key))),
                    }
                }
                AssignStep::Index(i) => match current {
                    Value::Array(items) if *i < items.len() => &mut items[*i],
                    _ => {
                        return Err(TemplateError::invalid_argument(format!(
                            "index {} is out of range for '{}'",
                            i, self.head
                        )))
                    }
                },
            };
        }
        *current = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!(
            AssignTarget::parse("balance").unwrap(),
            AssignTarget {
                head: "balance".into(),
                steps: vec![]
            }
        );
        let target = AssignTarget::parse("totals.net['gross'][1]").unwrap();
        assert_eq!(target.head, "totals");
        assert_eq!(
            target.steps,
            vec![
                AssignStep::Key("net".into()),
                AssignStep::Key("gross".into()),
                AssignStep::Index(1)
            ]
        );
        assert!(AssignTarget::parse("items[i]").is_err());
        assert!(AssignTarget::parse("").is_err());
    }

    #[test]
    fn test_assign_creates_objects() {
        let target = AssignTarget::parse("totals.net").unwrap();
        let mut root = Value::Null;
        target.assign(&mut root, Value::Int(5)).unwrap();
        assert_eq!(root, [("net", Value::Int(5))].into_iter().collect::<Value>());

        let target = AssignTarget::parse("totals.gross").unwrap();
        target.assign(&mut root, Value::Int(7)).unwrap();
        assert_eq!(root.get("net"), Some(&Value::Int(5)));
        assert_eq!(root.get("gross"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_assign_into_array() {
        let target = AssignTarget::parse("items[1]").unwrap();
        let mut root = Value::from(vec![1, 2]);
        target.assign(&mut root, Value::from("b")).unwrap();
        assert_eq!(root, Value::Array(vec![Value::Int(1), Value::from("b")]));
        assert!(AssignTarget::parse("items[5]").unwrap().assign(&mut root, Value::Null).is_err());
    }
}
