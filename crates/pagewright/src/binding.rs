//! Binding resolution.
//!
//! A binding expression such as `model.items[0].title` is resolved in two
//! steps. The head (`model`) is looked up through the scope layers, then the
//! remainder (`.items[0].title`) is compiled into a [`Binder`] for the head's
//! runtime [`ValueKind`] and applied. Compiled binders are cached by
//! `(kind, remainder)` for the life of the context, so each distinct access
//! path is parsed once per value kind.
//!
//! Compilation sits behind the [`BindingCompiler`] trait. The default
//! [`InterpretedCompiler`] produces binders that walk the parsed accessor
//! list; hosts can plug in their own compiler through
//! [`TemplateContext::with_binding_compiler`](crate::TemplateContext::with_binding_compiler).

use std::collections::HashMap;
use std::sync::Arc;

use pagewright_parser::{parse_accessors, split_binding, Accessor};
use parking_lot::RwLock;

use crate::error::{TemplateError, TemplateResult};
use crate::eval::{eval_expression, resolve_value};
use crate::scope::ScopeContext;
use crate::value::{Value, ValueKind};

/// Result of looking a name up: distinguishes an explicit null from absence.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Value),
    NotFound,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// The found value, or null when absent.
    pub fn into_value(self) -> Value {
        match self {
            Lookup::Found(value) => value,
            Lookup::NotFound => Value::Null,
        }
    }

    pub fn into_option(self) -> Option<Value> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

/// A compiled accessor chain.
pub trait Binder: Send + Sync {
    /// Applies the accessors to `target`. Index expressions are evaluated in
    /// `scope`.
    fn bind(&self, scope: &mut ScopeContext<'_>, target: Value) -> TemplateResult<Value>;
}

/// Compiles the remainder of a binding expression for a runtime value kind.
pub trait BindingCompiler: Send + Sync {
    fn compile(
        &self,
        kind: ValueKind,
        expression: &str,
        rest: &str,
    ) -> TemplateResult<Arc<dyn Binder>>;
}

/// The default compiler: validates the first step against the value kind
/// and interprets the accessor list at bind time.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpretedCompiler;

impl BindingCompiler for InterpretedCompiler {
    fn compile(
        &self,
        kind: ValueKind,
        expression: &str,
        rest: &str,
    ) -> TemplateResult<Arc<dyn Binder>> {
        let accessors = parse_accessors(rest).map_err(|err| TemplateError::Binding {
            expression: expression.to_string(),
            member: rest.to_string(),
            message: err.to_string(),
        })?;

        if let Some(first) = accessors.first() {
            check_first_step(kind, first).map_err(|message| TemplateError::Binding {
                expression: expression.to_string(),
                member: accessor_text(first),
                message,
            })?;
        }

        Ok(Arc::new(InterpretedBinder { accessors }))
    }
}

fn check_first_step(kind: ValueKind, accessor: &Accessor) -> Result<(), String> {
    match (kind, accessor) {
        (ValueKind::Object | ValueKind::Null | ValueKind::Expression, _) => Ok(()),
        (ValueKind::Array | ValueKind::String | ValueKind::Raw, Accessor::Member(name))
            if name == "length" =>
        {
            Ok(())
        }
        (ValueKind::Array | ValueKind::String | ValueKind::Raw, Accessor::Index(_)) => Ok(()),
        (kind, Accessor::Member(name)) => Err(format!("{} has no member '{}'", kind, name)),
        (kind, Accessor::Index(_)) => Err(format!("{} cannot be indexed", kind)),
    }
}

fn accessor_text(accessor: &Accessor) -> String {
    match accessor {
        Accessor::Member(name) => name.clone(),
        Accessor::Index(_) => "[]".to_string(),
    }
}

struct InterpretedBinder {
    accessors: Vec<Accessor>,
}

impl Binder for InterpretedBinder {
    fn bind(&self, scope: &mut ScopeContext<'_>, target: Value) -> TemplateResult<Value> {
        let mut current = target;
        for accessor in &self.accessors {
            current = resolve_value(scope, current)?;
            if current.is_null() {
                return Ok(Value::Null);
            }
            current = match accessor {
                Accessor::Member(name) => member(&current, name),
                Accessor::Index(expr) => {
                    let key = eval_expression(scope, expr)?.into_value();
                    let key = resolve_value(scope, key)?;
                    index(&current, &key)
                }
            };
        }
        resolve_value(scope, current)
    }
}

fn member(value: &Value, name: &str) -> Value {
    match value {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        Value::Array(items) if name == "length" => Value::from(items.len()),
        Value::String(s) | Value::Raw(s) if name == "length" => Value::from(s.chars().count()),
        _ => Value::Null,
    }
}

fn index(value: &Value, key: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let found = match key {
                Value::String(k) | Value::Raw(k) => map.get(k.as_str()),
                other => map.get(other.to_string().as_str()),
            };
            found.cloned().unwrap_or(Value::Null)
        }
        Value::Array(items) => key
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        Value::String(s) | Value::Raw(s) => key
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Compiled binders keyed by `(kind, remainder text)`.
#[derive(Default)]
pub struct BinderCache {
    binders: RwLock<HashMap<(ValueKind, String), Arc<dyn Binder>>>,
}

impl BinderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached binder or compiles and caches a new one. Failed
    /// compilations are not cached.
    pub fn get_or_compile(
        &self,
        compiler: &dyn BindingCompiler,
        kind: ValueKind,
        expression: &str,
        rest: &str,
    ) -> TemplateResult<Arc<dyn Binder>> {
        let key = (kind, rest.to_string());
        if let Some(binder) = self.binders.read().get(&key) {
            return Ok(binder.clone());
        }
        tracing::trace!(expression, kind = %kind, "binder cache miss");
        let binder = compiler.compile(kind, expression, rest)?;
        Ok(self.binders.write().entry(key).or_insert(binder).clone())
    }

    pub fn len(&self) -> usize {
        self.binders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.binders.read().is_empty()
    }
}

impl std::fmt::Debug for BinderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinderCache").field("len", &self.len()).finish()
    }
}

/// Resolves a binding expression against `scope`.
///
/// A missing head yields [`Lookup::NotFound`]. A head that resolves to null,
/// or a path that runs into a missing member, yields `Found(Null)`.
pub fn evaluate_binding(scope: &mut ScopeContext<'_>, expression: &str) -> TemplateResult<Lookup> {
    let (head, rest) = split_binding(expression);
    let root = match scope.lookup(head)? {
        Lookup::Found(value) => resolve_value(scope, value)?,
        Lookup::NotFound => return Ok(Lookup::NotFound),
    };
    if rest.is_empty() || root.is_null() {
        return Ok(Lookup::Found(root));
    }

    let ctx = scope.context();
    let binder =
        ctx.binders()
            .get_or_compile(ctx.binding_compiler(), root.kind(), expression, rest)?;
    binder.bind(scope, root).map(Lookup::Found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_rejects_member_on_scalar() {
        let err = InterpretedCompiler
            .compile(ValueKind::Int, "count.total", ".total")
            .err()
            .unwrap();
        match err {
            TemplateError::Binding {
                expression, member, ..
            } => {
                assert_eq!(expression, "count.total");
                assert_eq!(member, "total");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_compile_allows_length_on_collections() {
        assert!(InterpretedCompiler
            .compile(ValueKind::Array, "items.length", ".length")
            .is_ok());
        assert!(InterpretedCompiler
            .compile(ValueKind::String, "name.length", ".length")
            .is_ok());
        assert!(InterpretedCompiler
            .compile(ValueKind::Array, "items.first", ".first")
            .is_err());
    }

    #[test]
    fn test_compile_reports_syntax_errors() {
        let err = InterpretedCompiler
            .compile(ValueKind::Object, "a b", " b")
            .err()
            .unwrap();
        assert!(matches!(err, TemplateError::Binding { .. }));
    }

    #[test]
    fn test_member_and_index() {
        let obj: Value = [("a", Value::from(vec![10, 20]))].into_iter().collect();
        assert_eq!(member(&obj, "a"), Value::from(vec![10, 20]));
        assert_eq!(member(&obj, "missing"), Value::Null);
        assert_eq!(index(&member(&obj, "a"), &Value::Int(1)), Value::Int(20));
        assert_eq!(index(&member(&obj, "a"), &Value::Int(5)), Value::Null);
        assert_eq!(index(&obj, &Value::from("a")), Value::from(vec![10, 20]));
        assert_eq!(index(&Value::from("hey"), &Value::Int(1)), Value::from("e"));
    }

    #[test]
    fn test_binder_cache_reuses_entries() {
        let cache = BinderCache::new();
        let a = cache
            .get_or_compile(&InterpretedCompiler, ValueKind::Object, "x.y", ".y")
            .unwrap();
        let b = cache
            .get_or_compile(&InterpretedCompiler, ValueKind::Object, "z.y", ".y")
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache
            .get_or_compile(&InterpretedCompiler, ValueKind::Array, "x.y", ".y")
            .is_err());
        assert_eq!(cache.len(), 1);
    }
}
