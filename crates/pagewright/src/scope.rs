//! The per-render evaluation scope.
//!
//! A [`ScopeContext`] is the stack frame of a render: it knows which
//! [`PageResult`] is rendering, which page is currently being written, the
//! format used to encode values, and any local variables set by filters such
//! as `assignTo` or bound by `selectPartial`. Nested renders (partials) get a
//! child scope through [`ScopeContext::child`].
//!
//! # Lookup Order
//!
//! A name is resolved against these layers, first match wins:
//!
//! 1. scope locals
//! 2. result args (including the folded model)
//! 3. page args: the page being written, then the page the result was
//!    created for, then the layout. While the layout itself is written the
//!    page's args still come before the layout's.
//! 4. context args
//! 5. a zero-arity value filter of that name, invoked with null

use std::sync::Arc;

use indexmap::IndexMap;

use crate::binding::Lookup;
use crate::context::TemplateContext;
use crate::error::{TemplateError, TemplateResult};
use crate::filters::{suggest, FilterDef, FilterInvoke, FilterKind, FilterRegistry};
use crate::format::PageFormat;
use crate::page::PageContent;
use crate::result::{PageResult, ResultState};
use crate::transform::StreamTransformer;
use crate::value::Value;

const KIND_PRECEDENCE: [FilterKind; 3] = [FilterKind::Value, FilterKind::Context, FilterKind::Block];

/// Evaluation state for one page being written.
pub struct ScopeContext<'a> {
    result: &'a PageResult,
    state: &'a ResultState,
    filters: &'a FilterRegistry,
    page: Arc<PageContent>,
    root_page: Arc<PageContent>,
    layout: Option<Arc<PageContent>>,
    format: Arc<dyn PageFormat>,
    locals: IndexMap<String, Value>,
    depth: usize,
    nesting: usize,
}

impl<'a> ScopeContext<'a> {
    pub(crate) fn new(
        result: &'a PageResult,
        state: &'a ResultState,
        page: Arc<PageContent>,
        layout: Option<Arc<PageContent>>,
        format: Arc<dyn PageFormat>,
    ) -> TemplateResult<Self> {
        let filters = result.context().filters()?;
        Ok(Self {
            result,
            state,
            filters,
            root_page: page.clone(),
            page,
            layout,
            format,
            locals: IndexMap::new(),
            depth: 0,
            nesting: 0,
        })
    }

    /// Creates a scope for writing `page` from within this one.
    ///
    /// The child starts with a copy of this scope's locals; assignments made
    /// inside it do not leak back.
    pub fn child(&self, page: Arc<PageContent>, format: Arc<dyn PageFormat>) -> ScopeContext<'a> {
        ScopeContext {
            result: self.result,
            state: self.state,
            filters: self.filters,
            page,
            root_page: self.root_page.clone(),
            layout: None,
            format,
            locals: self.locals.clone(),
            depth: self.depth + 1,
            nesting: 0,
        }
    }

    pub fn context(&self) -> &'a TemplateContext {
        self.result.context()
    }

    pub fn result(&self) -> &'a PageResult {
        self.result
    }

    /// The page whose fragments are being written.
    pub fn page(&self) -> &Arc<PageContent> {
        &self.page
    }

    pub(crate) fn set_page(&mut self, page: Arc<PageContent>) -> Arc<PageContent> {
        std::mem::replace(&mut self.page, page)
    }

    pub fn format(&self) -> &Arc<dyn PageFormat> {
        &self.format
    }

    pub(crate) fn set_format(&mut self, format: Arc<dyn PageFormat>) -> Arc<dyn PageFormat> {
        std::mem::replace(&mut self.format, format)
    }

    /// Partial nesting depth; zero for the top-level page.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn locals(&self) -> &IndexMap<String, Value> {
        &self.locals
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn local_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.locals.get_mut(name)
    }

    pub fn remove_local(&mut self, name: &str) -> Option<Value> {
        self.locals.shift_remove(name)
    }

    /// Resolves `name` through the scope layers.
    pub fn lookup(&self, name: &str) -> TemplateResult<Lookup> {
        if let Some(value) = self.locals.get(name) {
            return Ok(Lookup::Found(value.clone()));
        }
        if let Some(value) = self.state.args.get(name) {
            return Ok(Lookup::Found(value.clone()));
        }
        for page in self.page_layers().into_iter().flatten() {
            if let Some(value) = page.args.get(name) {
                return Ok(Lookup::Found(Value::from(value.as_str())));
            }
        }
        let ctx = self.context();
        if let Some(value) = ctx.args().get(name) {
            return Ok(Lookup::Found(value.clone()));
        }
        if let Some(FilterInvoke::Value(filter)) = self
            .find_filter_of_kind(FilterKind::Value, name, 0)
            .map(FilterDef::invoke)
        {
            let value = filter(ctx, Value::Null, &[]).map_err(|e| TemplateError::filter(name, e))?;
            return Ok(Lookup::Found(value));
        }
        Ok(Lookup::NotFound)
    }

    fn page_layers(&self) -> [Option<&Arc<PageContent>>; 3] {
        let writing_layout = self
            .layout
            .as_ref()
            .is_some_and(|layout| Arc::ptr_eq(layout, &self.page));
        if writing_layout {
            return [Some(&self.root_page), self.layout.as_ref(), None];
        }
        let root = Some(&self.root_page).filter(|root| !Arc::ptr_eq(root, &self.page));
        [Some(&self.page), root, self.layout.as_ref()]
    }

    /// Finds a filter by name and arity, trying value, context and block
    /// filters in that order. Result-level filters shadow context-level ones
    /// of the same kind.
    pub fn find_filter(&self, name: &str, arity: usize) -> Option<&'a FilterDef> {
        KIND_PRECEDENCE
            .iter()
            .find_map(|kind| self.find_filter_of_kind(*kind, name, arity))
    }

    pub fn find_filter_of_kind(&self, kind: FilterKind, name: &str, arity: usize) -> Option<&'a FilterDef> {
        self.state
            .filters
            .find(kind, name, arity)
            .or_else(|| self.filters.find(kind, name, arity))
    }

    /// Finds a filter transformer, preferring the result's own.
    pub fn filter_transformer(&self, name: &str) -> Option<&'a Arc<dyn StreamTransformer>> {
        self.result
            .filter_transformer(name)
            .or_else(|| self.context().filter_transformer(name))
    }

    /// Signatures of registered filters close to `name`.
    pub fn suggest_filters(&self, name: &str) -> Vec<String> {
        suggest(name, self.state.filters.defs().chain(self.filters.defs()))
    }

    pub(crate) fn enter_nested(&mut self) -> TemplateResult<()> {
        let limit = self.context().config().max_nested_evaluation_depth;
        if self.nesting >= limit {
            return Err(TemplateError::invalid_argument(format!(
                "nested expressions exceed the maximum depth of {}",
                limit
            )));
        }
        self.nesting += 1;
        Ok(())
    }

    pub(crate) fn exit_nested(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }
}

impl std::fmt::Debug for ScopeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeContext")
            .field("page", &self.page.path)
            .field("format", &self.format.extension())
            .field("locals", &self.locals)
            .field("depth", &self.depth)
            .finish()
    }
}
