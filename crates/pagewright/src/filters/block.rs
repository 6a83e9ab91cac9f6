//! Block filters: filters that write straight to the output stream.
//!
//! - `partial(args?)` renders another page in a child scope:
//!   `{{ 'nav' | partial }}`, `{{ 'card' | partial({ title: 'Hi' }) }}`
//! - `selectPartial(name)` renders a partial once per item, binding `it`
//!   and `index`: `{{ posts | selectPartial: post-summary }}`
//! - `select(template)` writes an inline template once per item. The inline
//!   template uses single braces: `{{ tags | select: <li>{ it }</li> }}`

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use pagewright_parser::{parse_template, PageFragment};
use tokio::io::AsyncWrite;

use super::{string_arg, BlockFilter, FilterDef, FilterProvider};
use crate::error::{TemplateError, TemplateResult};
use crate::eval::write_fragments;
use crate::scope::ScopeContext;
use crate::value::Value;
use crate::vfs::{join_path, parent_dir};

/// `partial`, `selectPartial` and `select`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockFilters;

impl FilterProvider for BlockFilters {
    fn filters(&self) -> Vec<FilterDef> {
        vec![
            FilterDef::block("partial", 1, Partial),
            FilterDef::block("partial", 2, Partial),
            FilterDef::block("selectPartial", 2, SelectPartial),
            FilterDef::block("select", 2, Select),
        ]
    }
}

struct Partial;

#[async_trait]
impl BlockFilter for Partial {
    async fn invoke(
        &self,
        scope: &mut ScopeContext<'_>,
        out: &mut (dyn AsyncWrite + Unpin + Send),
        value: Value,
        args: Vec<Value>,
    ) -> TemplateResult<()> {
        let name = value
            .as_str()
            .ok_or_else(|| TemplateError::invalid_argument("partial expects a page name"))?;
        let locals = match args.into_iter().next() {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => IndexMap::new(),
            Some(other) => {
                return Err(TemplateError::invalid_argument(format!(
                    "partial arguments must be an object, got {}",
                    other.kind()
                )))
            }
        };
        render_partial(scope, out, name, locals).await
    }
}

struct SelectPartial;

#[async_trait]
impl BlockFilter for SelectPartial {
    async fn invoke(
        &self,
        scope: &mut ScopeContext<'_>,
        out: &mut (dyn AsyncWrite + Unpin + Send),
        value: Value,
        args: Vec<Value>,
    ) -> TemplateResult<()> {
        let name = string_arg("selectPartial", &args, 0)?;
        for (index, item) in items(value).into_iter().enumerate() {
            let mut locals = IndexMap::new();
            locals.insert("it".to_string(), item);
            locals.insert("index".to_string(), Value::from(index));
            render_partial(scope, out, name, locals).await?;
        }
        Ok(())
    }
}

struct Select;

/// An inline `select` template, parsed once per distinct text.
#[derive(Debug)]
struct InlineTemplate {
    fragments: Vec<PageFragment>,
}

impl InlineTemplate {
    fn parse(text: &str) -> Self {
        Self {
            fragments: parse_template(&expand_braces(text)),
        }
    }
}

#[async_trait]
impl BlockFilter for Select {
    async fn invoke(
        &self,
        scope: &mut ScopeContext<'_>,
        out: &mut (dyn AsyncWrite + Unpin + Send),
        value: Value,
        args: Vec<Value>,
    ) -> TemplateResult<()> {
        let text = string_arg("select", &args, 0)?;
        let template = scope
            .context()
            .cache()
            .get_or_try_insert_with(text, || Ok(InlineTemplate::parse(text)))?;

        let saved_it = scope.remove_local("it");
        let saved_index = scope.remove_local("index");
        let mut result = Ok(());
        for (index, item) in items(value).into_iter().enumerate() {
            scope.set_local("it", item);
            scope.set_local("index", Value::from(index));
            result = write_fragments(scope, out, &template.fragments).await;
            if result.is_err() {
                break;
            }
        }
        restore_local(scope, "it", saved_it);
        restore_local(scope, "index", saved_index);
        result
    }
}

fn restore_local(scope: &mut ScopeContext<'_>, name: &str, saved: Option<Value>) {
    match saved {
        Some(value) => scope.set_local(name, value),
        None => {
            scope.remove_local(name);
        }
    }
}

/// The items a per-item filter iterates: array elements, nothing for null,
/// otherwise the value itself.
fn items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Turns single-brace placeholders into template expressions:
/// `{ it }` becomes `{{ it }}`. Existing double braces are kept.
fn expand_braces(text: &str) -> String {
    if text.contains("{{") {
        return text.to_string();
    }
    text.replace('{', "{{").replace('}', "}}")
}

/// Renders the page `name` into `out` in a child scope of `scope`.
///
/// The name is resolved relative to the directory of the page being written
/// first, then from the root. `locals` are bound in the child scope.
pub(crate) async fn render_partial(
    scope: &mut ScopeContext<'_>,
    out: &mut (dyn AsyncWrite + Unpin + Send),
    name: &str,
    locals: IndexMap<String, Value>,
) -> TemplateResult<()> {
    let ctx = scope.context();
    let max_depth = ctx.config().max_partial_depth;
    if scope.depth() >= max_depth {
        return Err(TemplateError::RecursivePartial {
            name: name.to_string(),
            depth: max_depth,
        });
    }

    let relative = if name.starts_with('/') {
        None
    } else {
        parent_dir(&scope.page().path)
            .filter(|dir| !dir.is_empty())
            .map(|dir| join_path(dir, name))
    };
    let mut page = None;
    if let Some(path) = relative {
        page = ctx.get_page(&path).await?;
    }
    let page = match page {
        Some(page) => page,
        None => ctx.page(name).await?,
    };
    let content = page.content().ok_or(TemplateError::NotInitialized("TemplatePage"))?;

    let mut child = scope.child(content.clone(), Arc::clone(page.format()));
    for (key, value) in locals {
        child.set_local(key, value);
    }
    write_fragments(&mut child, out, &content.fragments).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_braces() {
        assert_eq!(expand_braces("<li>{ it }</li>"), "<li>{{ it }}</li>");
        assert_eq!(expand_braces("<li>{{ it }}</li>"), "<li>{{ it }}</li>");
        assert_eq!(expand_braces("plain"), "plain");
    }

    #[test]
    fn test_inline_template_parses_placeholders() {
        let template = InlineTemplate::parse("<b>{ it | upper }</b>");
        assert_eq!(template.fragments.len(), 3);
        assert_eq!(
            template.fragments[1].as_variable().map(|v| v.filters[0].name.as_str()),
            Some("upper")
        );
    }

    #[test]
    fn test_items() {
        assert_eq!(items(Value::Null), Vec::<Value>::new());
        assert_eq!(items(Value::from("x")), vec![Value::from("x")]);
        assert_eq!(items(Value::from(vec![1, 2])).len(), 2);
    }
}
