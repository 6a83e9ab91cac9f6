//! Rendering a page.
//!
//! A [`PageResult`] binds one page, and optionally a layout, to the data of
//! a single request: a model, extra args, extra filters, and the stream
//! transformers that post-process the output.
//!
//! ```text
//!  PageResult::render()
//!      │
//!      ├─ init: fold model into args, register result filters
//!      ├─ refresh page and layout
//!      ├─ check cancellation
//!      └─ write ──► layout fragments ──► {{ page }} ──► page fragments
//!                          │                               │
//!                          │                     page transformers
//!                          └──────── output transformers ──┘
//! ```
//!
//! The rendered string is cached: a second `render()` returns the same text
//! without evaluating anything.

use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use pagewright_parser::{parse_pipeline, PageFragment, VariableFragment};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::TemplateContext;
use crate::error::{TemplateError, TemplateResult};
use crate::eval::{evaluate_pipeline, write_fragments, write_variable, Outcome};
use crate::filters::{FilterProvider, FilterRegistry};
use crate::page::{PageContent, TemplatePage};
use crate::scope::ScopeContext;
use crate::transform::{apply_transformers, StreamTransformer};
use crate::value::Value;

/// Which layout a result renders its page inside.
#[derive(Debug, Clone, Default)]
pub enum LayoutSelection {
    /// The layout the page resolved when it was loaded.
    #[default]
    FromPage,
    /// A specific layout page.
    Page(Arc<TemplatePage>),
    /// A layout looked up by name from the page's directory upwards.
    Named(String),
    /// No layout.
    None,
}

/// Per-result state built by [`PageResult::init`].
pub(crate) struct ResultState {
    pub(crate) args: IndexMap<String, Value>,
    pub(crate) filters: FilterRegistry,
}

/// A single render of a page.
pub struct PageResult {
    ctx: Arc<TemplateContext>,
    page: Arc<TemplatePage>,
    layout: LayoutSelection,
    model: Option<Value>,
    args: IndexMap<String, Value>,
    filter_providers: Vec<Arc<dyn FilterProvider>>,
    page_transformers: Vec<Arc<dyn StreamTransformer>>,
    output_transformers: Vec<Arc<dyn StreamTransformer>>,
    filter_transformers: IndexMap<String, Arc<dyn StreamTransformer>>,
    options: IndexMap<String, String>,
    state: OnceCell<ResultState>,
    rendered: tokio::sync::OnceCell<String>,
}

impl PageResult {
    pub fn new(ctx: Arc<TemplateContext>, page: Arc<TemplatePage>) -> Self {
        Self {
            ctx,
            page,
            layout: LayoutSelection::FromPage,
            model: None,
            args: IndexMap::new(),
            filter_providers: Vec::new(),
            page_transformers: Vec::new(),
            output_transformers: Vec::new(),
            filter_transformers: IndexMap::new(),
            options: IndexMap::new(),
            state: OnceCell::new(),
            rendered: tokio::sync::OnceCell::new(),
        }
    }

    /// Renders inside `layout` instead of the page's own layout.
    pub fn with_layout(mut self, layout: Arc<TemplatePage>) -> Self {
        self.layout = LayoutSelection::Page(layout);
        self
    }

    /// Renders inside the layout called `name`, searched for from the page's
    /// directory upwards.
    pub fn with_layout_name(mut self, name: impl Into<String>) -> Self {
        self.layout = LayoutSelection::Named(name.into());
        self
    }

    pub fn without_layout(mut self) -> Self {
        self.layout = LayoutSelection::None;
        self
    }

    /// Sets the model. Its properties become args and the whole value is
    /// bound as `model`.
    pub fn with_model(mut self, model: impl Into<Value>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn with_args(mut self, args: IndexMap<String, Value>) -> Self {
        self.args.extend(args);
        self
    }

    /// Adds filters visible only to this result. They shadow context filters
    /// of the same kind, name and arity.
    pub fn with_filters(mut self, provider: impl FilterProvider + 'static) -> Self {
        self.filter_providers.push(Arc::new(provider));
        self
    }

    /// Adds a transformer applied to the page's own output, not the layout's.
    pub fn with_page_transformer(mut self, transformer: impl StreamTransformer + 'static) -> Self {
        self.page_transformers.push(Arc::new(transformer));
        self
    }

    /// Adds a transformer applied to the complete output.
    pub fn with_output_transformer(mut self, transformer: impl StreamTransformer + 'static) -> Self {
        self.output_transformers.push(Arc::new(transformer));
        self
    }

    pub fn with_filter_transformer(
        mut self,
        name: impl Into<String>,
        transformer: impl StreamTransformer + 'static,
    ) -> Self {
        self.filter_transformers.insert(name.into(), Arc::new(transformer));
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn context(&self) -> &TemplateContext {
        &self.ctx
    }

    pub fn page(&self) -> &Arc<TemplatePage> {
        &self.page
    }

    /// Free-form options for the host, such as response headers.
    pub fn options(&self) -> &IndexMap<String, String> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// The content type of the page's format.
    pub fn content_type(&self) -> &str {
        self.page.format().content_type()
    }

    pub fn filter_transformer(&self, name: &str) -> Option<&Arc<dyn StreamTransformer>> {
        self.filter_transformers.get(name)
    }

    /// A new result for `page` sharing this result's model, args, filters,
    /// transformers and options.
    pub fn clone_for(&self, page: Arc<TemplatePage>) -> PageResult {
        PageResult {
            ctx: Arc::clone(&self.ctx),
            page,
            layout: self.layout.clone(),
            model: self.model.clone(),
            args: self.args.clone(),
            filter_providers: self.filter_providers.clone(),
            page_transformers: self.page_transformers.clone(),
            output_transformers: self.output_transformers.clone(),
            filter_transformers: self.filter_transformers.clone(),
            options: self.options.clone(),
            state: OnceCell::new(),
            rendered: tokio::sync::OnceCell::new(),
        }
    }

    /// Initializes the context, builds the result's args and filters, and
    /// loads the page. Calling it again only refreshes the page.
    pub async fn init(&self) -> TemplateResult<()> {
        self.ensure_state();
        self.page.init(&self.ctx).await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some() && self.page.is_loaded()
    }

    fn ensure_state(&self) -> &ResultState {
        self.ctx.init();
        self.state.get_or_init(|| {
            let mut args = self.args.clone();
            if let Some(Value::Object(props)) = &self.model {
                for (key, value) in props {
                    args.insert(key.clone(), value.clone());
                }
            }
            args.insert("model".to_string(), self.model.clone().unwrap_or(Value::Null));
            ResultState {
                args,
                filters: FilterRegistry::from_providers(&self.filter_providers),
            }
        })
    }

    fn state(&self) -> TemplateResult<&ResultState> {
        self.state.get().ok_or(TemplateError::NotInitialized("PageResult"))
    }

    /// Evaluates a pipeline expression against the page, as if it appeared
    /// in the page body. Block filters run but their output is discarded.
    ///
    /// Fails with [`TemplateError::NotInitialized`] before [`init`](Self::init).
    pub async fn evaluate(&self, expression: &str) -> TemplateResult<Value> {
        let state = self.state()?;
        let content = self.page.content().ok_or(TemplateError::NotInitialized("TemplatePage"))?;
        let pipeline = parse_pipeline(expression).map_err(|source| TemplateError::Parse {
            text: expression.to_string(),
            source,
        })?;

        let layout = content.layout.as_ref().and_then(|layout| layout.content());
        let mut scope = ScopeContext::new(self, state, content, layout, Arc::clone(self.page.format()))?;
        let mut sink = tokio::io::sink();
        match evaluate_pipeline(&mut scope, &mut sink, &pipeline.initial, &pipeline.filters).await? {
            Outcome::Value(value) => Ok(value),
            Outcome::Ignore | Outcome::Unhandled | Outcome::Written => Ok(Value::Null),
        }
    }

    /// Renders into `out`. Fails with [`TemplateError::Cancelled`] if
    /// `cancel` fires before any output is written.
    pub async fn write_to(
        &self,
        out: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> TemplateResult<()> {
        let state = self.ensure_state();
        let content = self.page.init(&self.ctx).await?;
        let layout = self.select_layout(&content).await?;

        if cancel.is_cancelled() {
            return Err(TemplateError::Cancelled);
        }

        if self.output_transformers.is_empty() {
            self.write_body(out, state, content, layout).await?;
        } else {
            let mut buffer = Vec::new();
            self.write_body(&mut buffer, state, content, layout).await?;
            let buffer = apply_transformers(buffer, &self.output_transformers).await?;
            out.write_all(&buffer).await?;
        }
        out.flush().await?;
        Ok(())
    }

    /// Renders to a string. The first successful render is cached.
    pub async fn render(&self) -> TemplateResult<&str> {
        let rendered = self
            .rendered
            .get_or_try_init(|| async {
                let mut buffer = Vec::new();
                self.write_to(&mut buffer, &CancellationToken::new()).await?;
                debug!(page = %self.page.virtual_path(), bytes = buffer.len(), "page rendered");
                String::from_utf8(buffer).map_err(|source| TemplateError::Utf8 {
                    path: self.page.virtual_path().to_string(),
                    source,
                })
            })
            .await?;
        Ok(rendered.as_str())
    }

    async fn select_layout(
        &self,
        content: &PageContent,
    ) -> TemplateResult<Option<(Arc<TemplatePage>, Arc<PageContent>)>> {
        let layout = match &self.layout {
            LayoutSelection::None => return Ok(None),
            LayoutSelection::FromPage => match &content.layout {
                Some(layout) => Arc::clone(layout),
                None => return Ok(None),
            },
            LayoutSelection::Page(layout) => Arc::clone(layout),
            LayoutSelection::Named(name) => self
                .ctx
                .pages()
                .resolve_layout_page(&self.ctx, &self.page, Some(name))
                .await?
                .ok_or_else(|| TemplateError::PageNotFound { path: name.clone() })?,
        };
        let layout_content = layout.refresh(&self.ctx).await?;
        Ok(Some((layout, layout_content)))
    }

    async fn write_body(
        &self,
        out: &mut (dyn AsyncWrite + Unpin + Send),
        state: &ResultState,
        content: Arc<PageContent>,
        layout: Option<(Arc<TemplatePage>, Arc<PageContent>)>,
    ) -> TemplateResult<()> {
        let page_format = Arc::clone(self.page.format());
        let Some((layout, layout_content)) = layout else {
            let mut scope = ScopeContext::new(self, state, Arc::clone(&content), None, page_format)?;
            return self.write_page(&mut scope, out, &content).await;
        };

        let mut scope = ScopeContext::new(
            self,
            state,
            Arc::clone(&content),
            Some(Arc::clone(&layout_content)),
            Arc::clone(&page_format),
        )?;
        scope.set_page(Arc::clone(&layout_content));
        scope.set_format(Arc::clone(layout.format()));

        for fragment in &layout_content.fragments {
            match fragment {
                PageFragment::Text(text) => out.write_all(text.as_bytes()).await?,
                PageFragment::Variable(var) if is_page_hole(var) => {
                    let layout_page = scope.set_page(Arc::clone(&content));
                    let layout_format = scope.set_format(Arc::clone(&page_format));
                    let written = self.write_page(&mut scope, out, &content).await;
                    scope.set_page(layout_page);
                    scope.set_format(layout_format);
                    written?;
                }
                PageFragment::Variable(var) => write_variable(&mut scope, out, var).await?,
            }
        }
        Ok(())
    }

    async fn write_page(
        &self,
        scope: &mut ScopeContext<'_>,
        out: &mut (dyn AsyncWrite + Unpin + Send),
        content: &PageContent,
    ) -> TemplateResult<()> {
        if self.page_transformers.is_empty() {
            return write_fragments(scope, out, &content.fragments).await;
        }
        let mut buffer = Vec::new();
        write_fragments(scope, &mut buffer, &content.fragments).await?;
        let buffer = apply_transformers(buffer, &self.page_transformers).await?;
        out.write_all(&buffer).await?;
        Ok(())
    }
}

/// `{{ page }}` in a layout marks where the page is written.
fn is_page_hole(var: &VariableFragment) -> bool {
    var.binding.as_deref() == Some("page") && var.filters.is_empty()
}

impl std::fmt::Debug for PageResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageResult")
            .field("page", &self.page.virtual_path())
            .field("layout", &self.layout)
            .field("args", &self.args)
            .field("options", &self.options)
            .field("rendered", &self.rendered.initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::filters::FilterDef;
    use crate::vfs::MemoryVirtualFiles;

    fn setup(pages: &[(&str, &str)]) -> Arc<TemplateContext> {
        let files = Arc::new(MemoryVirtualFiles::new());
        for (path, contents) in pages {
            files.write_file(path, *contents);
        }
        let ctx = Arc::new(TemplateContext::new(files));
        ctx.init();
        ctx
    }

    async fn result(ctx: &Arc<TemplateContext>, path: &str) -> PageResult {
        PageResult::new(Arc::clone(ctx), ctx.page(path).await.unwrap())
    }

    #[tokio::test]
    async fn test_layout_wraps_page() {
        let ctx = setup(&[
            ("_layout.html", "<!--\ntitle: Site\n-->\n<title>{{ title }}</title>\n<main>{{ page }}</main>"),
            ("about.html", "<!--\ntitle: About\n-->\n<h1>{{ title }}</h1>"),
        ]);
        let out = result(&ctx, "about").await.render().await.unwrap().to_string();
        assert_eq!(out, "<title>About</title>\n<main><h1>About</h1></main>");
    }

    #[tokio::test]
    async fn test_layout_selection() {
        let ctx = setup(&[
            ("_layout.html", "[{{ page }}]"),
            ("wide.html", "<<{{ page }}>>"),
            ("p.html", "p"),
        ]);
        assert_eq!(result(&ctx, "p").await.without_layout().render().await.unwrap(), "p");
        assert_eq!(
            result(&ctx, "p").await.with_layout_name("wide").render().await.unwrap(),
            "<<p>>"
        );
        let err = result(&ctx, "p").await.with_layout_name("narrow").render().await.unwrap_err();
        assert!(matches!(err, TemplateError::PageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_render_is_cached() {
        let ctx = setup(&[("count.md", "{{ tick }}")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = result(&ctx, "count").await.with_filters(vec![FilterDef::value("tick", 0, move |_, _, _| {
            Ok(Value::from(counter.fetch_add(1, Ordering::SeqCst) + 1))
        })]);

        assert_eq!(result.render().await.unwrap(), "1");
        assert_eq!(result.render().await.unwrap(), "1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evaluate_requires_init() {
        let ctx = setup(&[("p.md", "")]);
        let result = result(&ctx, "p").await.with_arg("n", 4);
        let err = result.evaluate("n | add(1)").await.unwrap_err();
        assert!(matches!(err, TemplateError::NotInitialized("PageResult")));

        result.init().await.unwrap();
        assert_eq!(result.evaluate("n | add(1)").await.unwrap(), Value::Int(5));
        assert_eq!(result.evaluate("missing").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_model_properties_become_args() {
        let ctx = setup(&[("m.md", "{{ name }} {{ model.name }} {{ other }}")]);
        let model: Value = [("name", "Ada"), ("other", "from model")].into_iter().collect();
        let result = result(&ctx, "m").await.with_arg("other", "from args").with_model(model);
        assert_eq!(result.render().await.unwrap(), "Ada Ada from model");
    }

    #[tokio::test]
    async fn test_model_is_always_bound() {
        let ctx = setup(&[("m.md", "[{{ model }}]{{ model | isNull }}")]);
        assert_eq!(result(&ctx, "m").await.render().await.unwrap(), "[]true");
    }

    #[tokio::test]
    async fn test_transformers() {
        let ctx = setup(&[("_layout.md", "<{{ page }}>"), ("t.md", "abc")]);
        let upper = |input: Vec<u8>| -> TemplateResult<Vec<u8>> { Ok(input.to_ascii_uppercase()) };
        let bang = |mut input: Vec<u8>| -> TemplateResult<Vec<u8>> {
            input.push(b'!');
            Ok(input)
        };

        let page_only = result(&ctx, "t").await.with_page_transformer(upper);
        assert_eq!(page_only.render().await.unwrap(), "<ABC>");

        let whole = result(&ctx, "t").await.with_page_transformer(upper).with_output_transformer(bang);
        assert_eq!(whole.render().await.unwrap(), "<ABC>!");
    }

    #[tokio::test]
    async fn test_cancelled_before_output() {
        let ctx = setup(&[("p.md", "body")]);
        let result = result(&ctx, "p").await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        let err = result.write_to(&mut out, &cancel).await.unwrap_err();
        assert!(matches!(err, TemplateError::Cancelled));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_clone_for_shares_args() {
        let ctx = setup(&[("a.md", "a={{ x }}"), ("b.md", "b={{ x }}")]);
        let a = result(&ctx, "a").await.with_arg("x", 1).with_option("status", "200");
        let b = a.clone_for(ctx.page("b").await.unwrap());
        assert_eq!(a.render().await.unwrap(), "a=1");
        assert_eq!(b.render().await.unwrap(), "b=1");
        assert_eq!(b.option("status"), Some("200"));
        assert_eq!(b.content_type(), "text/markdown");
    }
}
