//! Filter registry and the built-in filter set.
//!
//! A filter is a named, arity-matched stage of a pipeline. Filters come in
//! three kinds, tried in this order when a stage is resolved:
//!
//! | Kind | Signature | Typical use |
//! |------|-----------|-------------|
//! | [`FilterKind::Value`] | `(ctx, value, args) -> Value` | pure transforms (`upper`, `add`) |
//! | [`FilterKind::Context`] | `(scope, value, args) -> FilterOutput` | scope mutation (`assignTo`) |
//! | [`FilterKind::Block`] | async, writes to the output stream | `partial`, `select` |
//!
//! The arity of a filter counts the piped value, so `add(2)` in
//! `{{ 1 | add(2) }}` resolves the arity-2 `add`. A zero-arity value filter
//! such as `now` can also be used as a bare binding: `{{ now }}`.
//!
//! Filters are registered through [`FilterProvider`]s. A provider is any
//! type that can enumerate [`FilterDef`]s, including a plain
//! `Vec<FilterDef>`:
//!
//! ```rust
//! use pagewright::filters::FilterDef;
//! use pagewright::Value;
//!
//! let shout = vec![FilterDef::value("shout", 1, |_ctx, value, _args| {
//!     Ok(Value::from(format!("{}!", value).to_uppercase()))
//! })];
//! # let _ = shout;
//! ```

mod block;
mod collections;
mod context;
mod culture;
mod logic;
mod math;
mod text;
mod time;

pub use block::BlockFilters;
pub use context::{AssignTarget, ContextFilters};
pub use culture::{format_currency, Culture};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::context::TemplateContext;
use crate::error::TemplateResult;
use crate::scope::ScopeContext;
use crate::value::Value;

/// How a filter is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Value,
    Context,
    Block,
}

/// What a context filter hands back to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutput {
    /// Continue the pipeline with this value.
    Value(Value),
    /// Produce no output for the whole expression.
    Ignore,
    /// Stop the pipeline; no output.
    Stop,
}

pub type ValueFilterFn = dyn Fn(&TemplateContext, Value, &[Value]) -> TemplateResult<Value> + Send + Sync;

pub type ContextFilterFn =
    dyn Fn(&mut ScopeContext<'_>, Value, &[Value]) -> TemplateResult<FilterOutput> + Send + Sync;

/// A filter that writes its output directly to the render stream.
#[async_trait]
pub trait BlockFilter: Send + Sync {
    async fn invoke(
        &self,
        scope: &mut ScopeContext<'_>,
        out: &mut (dyn AsyncWrite + Unpin + Send),
        value: Value,
        args: Vec<Value>,
    ) -> TemplateResult<()>;
}

#[derive(Clone)]
pub enum FilterInvoke {
    Value(Arc<ValueFilterFn>),
    Context(Arc<ContextFilterFn>),
    Block(Arc<dyn BlockFilter>),
}

impl FilterInvoke {
    pub fn kind(&self) -> FilterKind {
        match self {
            FilterInvoke::Value(_) => FilterKind::Value,
            FilterInvoke::Context(_) => FilterKind::Context,
            FilterInvoke::Block(_) => FilterKind::Block,
        }
    }
}

/// One registration: `(name, arity, kind) -> callable`.
#[derive(Clone)]
pub struct FilterDef {
    name: String,
    arity: usize,
    params: Vec<String>,
    handles_unknown: bool,
    invoke: FilterInvoke,
}

impl FilterDef {
    pub fn value<F>(name: impl Into<String>, arity: usize, filter: F) -> Self
    where
        F: Fn(&TemplateContext, Value, &[Value]) -> TemplateResult<Value> + Send + Sync + 'static,
    {
        Self::with_invoke(name, arity, FilterInvoke::Value(Arc::new(filter)))
    }

    pub fn context<F>(name: impl Into<String>, arity: usize, filter: F) -> Self
    where
        F: Fn(&mut ScopeContext<'_>, Value, &[Value]) -> TemplateResult<FilterOutput> + Send + Sync + 'static,
    {
        Self::with_invoke(name, arity, FilterInvoke::Context(Arc::new(filter)))
    }

    pub fn block(name: impl Into<String>, arity: usize, filter: impl BlockFilter + 'static) -> Self {
        Self::with_invoke(name, arity, FilterInvoke::Block(Arc::new(filter)))
    }

    fn with_invoke(name: impl Into<String>, arity: usize, invoke: FilterInvoke) -> Self {
        Self {
            name: name.into(),
            arity,
            params: Vec::new(),
            handles_unknown: false,
            invoke,
        }
    }

    /// Names the arguments after the piped value, for error messages.
    pub fn with_params(mut self, params: &[&str]) -> Self {
        self.params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Marks the filter as accepting an absent value. When any stage of a
    /// pipeline handles unknowns, a missing base value is passed on as null
    /// instead of suppressing the expression.
    pub fn handles_unknown(mut self) -> Self {
        self.handles_unknown = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn kind(&self) -> FilterKind {
        self.invoke.kind()
    }

    /// Renders the call shape, e.g. `substring(value, start, length)`.
    /// Unnamed arguments show as `arg1`, `arg2`, ...
    pub fn signature(&self) -> String {
        let mut params = Vec::with_capacity(self.arity);
        if self.arity > 0 {
            params.push("value".to_string());
        }
        for i in 1..self.arity {
            match self.params.get(i - 1) {
                Some(param) => params.push(param.clone()),
                None => params.push(format!("arg{}", i)),
            }
        }
        format!("{}({})", self.name, params.join(", "))
    }

    pub fn accepts_unknown(&self) -> bool {
        self.handles_unknown
    }

    pub fn invoke(&self) -> &FilterInvoke {
        &self.invoke
    }

    pub fn as_block(&self) -> Option<&Arc<dyn BlockFilter>> {
        match &self.invoke {
            FilterInvoke::Block(block) => Some(block),
            _ => None,
        }
    }
}

impl std::fmt::Debug for FilterDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterDef")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("kind", &self.kind())
            .field("handles_unknown", &self.handles_unknown)
            .finish()
    }
}

/// A self-describing source of filters.
pub trait FilterProvider: Send + Sync {
    fn filters(&self) -> Vec<FilterDef>;
}

impl FilterProvider for Vec<FilterDef> {
    fn filters(&self) -> Vec<FilterDef> {
        self.clone()
    }
}

/// Filters indexed by `(kind, name, arity)`. The first registration of a
/// key wins.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    filters: HashMap<(FilterKind, String, usize), FilterDef>,
    order: Vec<(FilterKind, String, usize)>,
    names: Vec<String>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_providers<'p>(providers: impl IntoIterator<Item = &'p Arc<dyn FilterProvider>>) -> Self {
        let mut registry = Self::new();
        for provider in providers {
            for def in provider.filters() {
                registry.register(def);
            }
        }
        registry
    }

    /// Adds `def` unless a filter with the same kind, name and arity exists.
    /// Returns `false` when the registration was shadowed.
    pub fn register(&mut self, def: FilterDef) -> bool {
        let key = (def.kind(), def.name.clone(), def.arity);
        if self.filters.contains_key(&key) {
            return false;
        }
        if !self.names.contains(&def.name) {
            self.names.push(def.name.clone());
        }
        self.order.push(key.clone());
        self.filters.insert(key, def);
        true
    }

    pub fn find(&self, kind: FilterKind, name: &str, arity: usize) -> Option<&FilterDef> {
        self.filters.get(&(kind, name.to_string(), arity))
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Distinct filter names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Every registration in registration order.
    pub fn defs(&self) -> impl Iterator<Item = &FilterDef> {
        self.order.iter().filter_map(|key| self.filters.get(key))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

const MAX_SUGGESTIONS: usize = 3;
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Signatures of the filters whose names are within a small edit distance
/// of `name`, closest first. Registrations of `name` itself are included so
/// an arity mismatch lists the shapes that do exist. At most three names are
/// considered; each contributes all of its arities.
pub fn suggest<'d>(name: &str, defs: impl Iterator<Item = &'d FilterDef>) -> Vec<String> {
    let wanted = name.to_lowercase();
    let mut scored: Vec<(usize, &str, usize, String)> = defs
        .map(|def| {
            let distance = strsim::levenshtein(&wanted, &def.name().to_lowercase());
            (distance, def.name(), def.arity(), def.signature())
        })
        .filter(|(distance, ..)| *distance <= MAX_SUGGESTION_DISTANCE)
        .collect();
    scored.sort();
    scored.dedup_by(|a, b| a.3 == b.3);

    let mut names: Vec<&str> = Vec::new();
    for (_, candidate, ..) in &scored {
        if !names.contains(candidate) {
            if names.len() == MAX_SUGGESTIONS {
                break;
            }
            names.push(*candidate);
        }
    }
    scored
        .iter()
        .filter(|(_, candidate, ..)| names.contains(candidate))
        .map(|(.., signature)| signature.clone())
        .collect()
}

/// The built-in value filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFilters;

impl FilterProvider for DefaultFilters {
    fn filters(&self) -> Vec<FilterDef> {
        let mut filters = Vec::new();
        filters.extend(math::filters());
        filters.extend(text::filters());
        filters.extend(collections::filters());
        filters.extend(logic::filters());
        filters.extend(time::filters());
        filters.extend(culture::filters());
        filters
    }
}

/// Reads argument `index` as a string, or fails naming the filter.
pub(crate) fn string_arg<'v>(filter: &str, args: &'v [Value], index: usize) -> TemplateResult<&'v str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| crate::TemplateError::invalid_argument(format!("{} expects a string argument", filter)))
}

/// Reads argument `index` as a non-negative integer.
pub(crate) fn usize_arg(filter: &str, args: &[Value], index: usize) -> TemplateResult<usize> {
    args.get(index)
        .and_then(Value::as_i64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            crate::TemplateError::invalid_argument(format!("{} expects a non-negative integer argument", filter))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str, arity: usize) -> FilterDef {
        FilterDef::value(name, arity, |_, value, _| Ok(value))
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = FilterRegistry::new();
        assert!(registry.register(FilterDef::value("pick", 1, |_, _, _| Ok(Value::from("first")))));
        assert!(!registry.register(FilterDef::value("pick", 1, |_, _, _| Ok(Value::from("second")))));
        assert!(registry.register(noop("pick", 2)));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["pick"]);

        let Some(FilterInvoke::Value(f)) = registry.find(FilterKind::Value, "pick", 1).map(FilterDef::invoke) else {
            panic!("pick/1 not registered");
        };
        let ctx = TemplateContext::new(Arc::new(crate::vfs::MemoryVirtualFiles::new()));
        assert_eq!(f(&ctx, Value::Null, &[]).unwrap(), Value::from("first"));
    }

    #[test]
    fn test_find_matches_kind_and_arity() {
        let registry = FilterRegistry::from_providers(&[Arc::new(vec![noop("upper", 1)]) as Arc<dyn FilterProvider>]);
        assert!(registry.find(FilterKind::Value, "upper", 1).is_some());
        assert!(registry.find(FilterKind::Value, "upper", 2).is_none());
        assert!(registry.find(FilterKind::Context, "upper", 1).is_none());
        assert!(registry.contains_name("upper"));
    }

    #[test]
    fn test_suggest_orders_by_distance() {
        let defs = [
            noop("upper", 1),
            noop("lower", 1),
            noop("append", 2),
            noop("prepend", 2),
            noop("multiply", 2),
        ];
        assert_eq!(suggest("uper", defs.iter()), vec!["upper(value)", "lower(value)"]);
        assert_eq!(suggest("prepnd", defs.iter()), vec!["prepend(value, arg1)", "append(value, arg1)"]);
        assert!(suggest("zzzzzzzz", defs.iter()).is_empty());
    }

    #[test]
    fn test_suggest_lists_every_arity_of_same_name() {
        let defs = [
            noop("substring", 2).with_params(&["start"]),
            noop("substring", 3).with_params(&["start", "length"]),
            noop("string", 1),
        ];
        assert_eq!(
            suggest("substring", defs.iter()),
            vec!["substring(value, start)", "substring(value, start, length)", "string(value)"]
        );
    }

    #[test]
    fn test_signature_names_params() {
        assert_eq!(noop("now", 0).signature(), "now()");
        assert_eq!(noop("pad", 3).with_params(&["width"]).signature(), "pad(value, width, arg2)");
    }

    #[test]
    fn test_defs_keep_registration_order() {
        let mut registry = FilterRegistry::new();
        registry.register(noop("b", 1));
        registry.register(noop("a", 2));
        registry.register(noop("b", 1));
        let sigs: Vec<_> = registry.defs().map(FilterDef::signature).collect();
        assert_eq!(sigs, vec!["b(value)", "a(value, arg1)"]);
    }

    #[test]
    fn test_default_filters_register_without_shadowing() {
        let defs = DefaultFilters.filters();
        let mut registry = FilterRegistry::new();
        for def in defs {
            let name = def.name().to_string();
            assert!(registry.register(def), "duplicate registration of {}", name);
        }
        for name in ["add", "titleCase", "currency", "default", "length", "now", "json"] {
            assert!(registry.contains_name(name), "{} missing", name);
        }
    }

    #[test]
    fn test_handles_unknown_flag() {
        assert!(!noop("x", 1).accepts_unknown());
        assert!(noop("x", 1).handles_unknown().accepts_unknown());
    }
}
