//! The shared template context.
//!
//! A [`TemplateContext`] is built once, shared through an `Arc`, and used by
//! any number of concurrent renders. It owns everything that outlives a
//! single render:
//!
//! - configuration and the virtual file source
//! - page formats, filter providers and filter transformers
//! - global args and the dependency [`Container`]
//! - the page registry and the expression caches
//!
//! Registration happens through consuming builder methods. [`init`] then
//! freezes the registrations, appending the built-in formats, filters and
//! transformers after the user's own so that user entries win.
//!
//! ```rust
//! use std::sync::Arc;
//! use pagewright::vfs::MemoryVirtualFiles;
//! use pagewright::TemplateContext;
//!
//! # tokio_test_runtime(async {
//! let files = Arc::new(MemoryVirtualFiles::new());
//! files.write_file("hello.html", "Hello, {{ name | titleCase }}!");
//!
//! let ctx = Arc::new(TemplateContext::new(files).with_arg("name", "world"));
//! ctx.init();
//! assert_eq!(ctx.render_page("hello", Default::default()).await.unwrap(), "Hello, World!");
//! # });
//! # fn tokio_test_runtime(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! [`init`]: TemplateContext::init

use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use pagewright_parser::VariableFragment;
use tracing::debug;

use crate::binding::{BinderCache, BindingCompiler, InterpretedCompiler};
use crate::cache::TypedCache;
use crate::config::TemplateConfig;
use crate::container::Container;
use crate::error::{TemplateError, TemplateResult};
use crate::filters::{BlockFilters, ContextFilters, DefaultFilters, FilterProvider, FilterRegistry};
use crate::format::{HtmlPageFormat, MarkdownPageFormat, PageFormat};
use crate::page::TemplatePage;
use crate::pages::TemplatePages;
use crate::result::PageResult;
use crate::transform::{HtmlEncodeTransformer, StreamTransformer, TrimTransformer};
use crate::value::Value;
use crate::vfs::{MemoryVirtualFiles, VirtualFiles};

/// Produces the text written for an expression that yielded no value.
pub type UnhandledFn = dyn Fn(&VariableFragment) -> String + Send + Sync;

/// Registrations frozen by [`TemplateContext::init`].
struct Resolved {
    formats: Vec<Arc<dyn PageFormat>>,
    filters: FilterRegistry,
    filter_transformers: IndexMap<String, Arc<dyn StreamTransformer>>,
}

/// Configuration and caches shared by all renders.
pub struct TemplateContext {
    config: TemplateConfig,
    files: Arc<dyn VirtualFiles>,
    temp_files: Arc<MemoryVirtualFiles>,
    formats: Vec<Arc<dyn PageFormat>>,
    filter_providers: Vec<Arc<dyn FilterProvider>>,
    filter_transformers: IndexMap<String, Arc<dyn StreamTransformer>>,
    args: IndexMap<String, Value>,
    container: Container,
    binding_compiler: Arc<dyn BindingCompiler>,
    unhandled: Option<Arc<UnhandledFn>>,
    pages: TemplatePages,
    binders: BinderCache,
    cache: TypedCache,
    resolved: OnceCell<Resolved>,
}

impl TemplateContext {
    /// Creates a context serving pages from `files`.
    pub fn new(files: Arc<dyn VirtualFiles>) -> Self {
        Self {
            config: TemplateConfig::default(),
            files,
            temp_files: Arc::new(MemoryVirtualFiles::new()),
            formats: Vec::new(),
            filter_providers: Vec::new(),
            filter_transformers: IndexMap::new(),
            args: IndexMap::new(),
            container: Container::new(),
            binding_compiler: Arc::new(InterpretedCompiler),
            unhandled: None,
            pages: TemplatePages::new(),
            binders: BinderCache::new(),
            cache: TypedCache::new(),
            resolved: OnceCell::new(),
        }
    }

    pub fn with_config(mut self, config: TemplateConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a page format. For a repeated extension the first
    /// registration wins.
    pub fn with_format(mut self, format: impl PageFormat + 'static) -> Self {
        self.formats.push(Arc::new(format));
        self
    }

    /// Registers a filter provider ahead of the built-in filters.
    pub fn with_filters(mut self, provider: impl FilterProvider + 'static) -> Self {
        self.filter_providers.push(Arc::new(provider));
        self
    }

    /// Registers a stream transformer usable after a block filter, as in
    /// `{{ 'nav' | partial | name }}`.
    pub fn with_filter_transformer(
        mut self,
        name: impl Into<String>,
        transformer: impl StreamTransformer + 'static,
    ) -> Self {
        self.filter_transformers
            .entry(name.into())
            .or_insert_with(|| Arc::new(transformer));
        self
    }

    /// Sets a global arg visible to every page.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Registers a service in the dependency container.
    pub fn with_service<T: std::any::Any + Send + Sync>(self, service: T) -> Self {
        self.container.register(service);
        self
    }

    /// Replaces the compiler used for binding accessors.
    pub fn with_binding_compiler(mut self, compiler: impl BindingCompiler + 'static) -> Self {
        self.binding_compiler = Arc::new(compiler);
        self
    }

    /// Sets the hook deciding what is written for an expression that
    /// produced no value. By default its source text is written back.
    pub fn on_unhandled_expression<F>(mut self, hook: F) -> Self
    where
        F: Fn(&VariableFragment) -> String + Send + Sync + 'static,
    {
        self.unhandled = Some(Arc::new(hook));
        self
    }

    /// Freezes registrations and registers the built-ins. Calling it again
    /// does nothing.
    pub fn init(&self) {
        self.resolved.get_or_init(|| {
            let mut formats: Vec<Arc<dyn PageFormat>> = Vec::with_capacity(self.formats.len() + 2);
            let defaults: [Arc<dyn PageFormat>; 2] = [Arc::new(HtmlPageFormat), Arc::new(MarkdownPageFormat)];
            for format in self.formats.iter().cloned().chain(defaults) {
                let ext = format.extension();
                if !formats.iter().any(|f| f.extension().eq_ignore_ascii_case(ext)) {
                    formats.push(format);
                }
            }

            let builtin: [Arc<dyn FilterProvider>; 3] =
                [Arc::new(DefaultFilters), Arc::new(ContextFilters), Arc::new(BlockFilters)];
            let filters = FilterRegistry::from_providers(self.filter_providers.iter().chain(builtin.iter()));

            let mut filter_transformers = self.filter_transformers.clone();
            filter_transformers
                .entry("htmlencode".to_string())
                .or_insert_with(|| Arc::new(HtmlEncodeTransformer));
            filter_transformers
                .entry("trim".to_string())
                .or_insert_with(|| Arc::new(TrimTransformer));

            debug!(
                formats = formats.len(),
                filters = filters.len(),
                filter_transformers = filter_transformers.len(),
                "template context initialized"
            );
            Resolved {
                formats,
                filters,
                filter_transformers,
            }
        });
    }

    pub fn is_initialized(&self) -> bool {
        self.resolved.get().is_some()
    }

    fn resolved(&self) -> TemplateResult<&Resolved> {
        self.resolved
            .get()
            .ok_or(TemplateError::NotInitialized("TemplateContext"))
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    pub fn files(&self) -> &Arc<dyn VirtualFiles> {
        &self.files
    }

    /// The in-memory store backing one-time pages.
    pub fn temp_files(&self) -> &Arc<MemoryVirtualFiles> {
        &self.temp_files
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn args(&self) -> &IndexMap<String, Value> {
        &self.args
    }

    /// Cache for parsed expression artifacts, keyed by type and text.
    pub fn cache(&self) -> &TypedCache {
        &self.cache
    }

    pub fn binders(&self) -> &BinderCache {
        &self.binders
    }

    pub fn binding_compiler(&self) -> &dyn BindingCompiler {
        self.binding_compiler.as_ref()
    }

    pub fn pages(&self) -> &TemplatePages {
        &self.pages
    }

    /// Registered formats in precedence order.
    pub fn formats(&self) -> TemplateResult<&[Arc<dyn PageFormat>]> {
        Ok(&self.resolved()?.formats)
    }

    /// The format handling `ext` (with or without a leading dot).
    pub fn format_for_extension(&self, ext: &str) -> TemplateResult<Option<&Arc<dyn PageFormat>>> {
        let ext = ext.trim_start_matches('.');
        Ok(self.formats()?.iter().find(|f| f.extension().eq_ignore_ascii_case(ext)))
    }

    pub fn filters(&self) -> TemplateResult<&FilterRegistry> {
        Ok(&self.resolved()?.filters)
    }

    /// A context-level filter transformer. `None` before `init()`.
    pub fn filter_transformer(&self, name: &str) -> Option<&Arc<dyn StreamTransformer>> {
        self.resolved.get()?.filter_transformers.get(name)
    }

    /// The text written for an expression that produced no value.
    pub fn unhandled_text(&self, var: &VariableFragment) -> String {
        match &self.unhandled {
            Some(hook) => hook(var),
            None => var.original_text.clone(),
        }
    }

    /// Finds and loads the page at `path`, or `None` if no format has a
    /// matching file.
    pub async fn get_page(&self, path: &str) -> TemplateResult<Option<Arc<TemplatePage>>> {
        self.pages.get_page(self, path).await
    }

    /// Like [`get_page`](Self::get_page), failing with
    /// [`TemplateError::PageNotFound`] when nothing matches.
    pub async fn page(&self, path: &str) -> TemplateResult<Arc<TemplatePage>> {
        self.get_page(path)
            .await?
            .ok_or_else(|| TemplateError::PageNotFound { path: path.to_string() })
    }

    /// Creates a loaded page from `contents`. `ext` picks the format; the
    /// first registered format is used otherwise.
    pub async fn one_time_page(&self, contents: &str, ext: Option<&str>) -> TemplateResult<Arc<TemplatePage>> {
        self.pages.one_time_page(self, contents, ext).await
    }

    /// Renders the page at `path` with `args` to a string.
    pub async fn render_page(self: &Arc<Self>, path: &str, args: IndexMap<String, Value>) -> TemplateResult<String> {
        let page = self.page(path).await?;
        let result = PageResult::new(Arc::clone(self), page).with_args(args);
        Ok(result.render().await?.to_string())
    }

    /// Renders `text` as a one-time page, without a layout.
    pub async fn evaluate_template(
        self: &Arc<Self>,
        text: &str,
        args: IndexMap<String, Value>,
    ) -> TemplateResult<String> {
        self.init();
        let page = self.one_time_page(text, None).await?;
        let result = PageResult::new(Arc::clone(self), page)
            .without_layout()
            .with_args(args);
        Ok(result.render().await?.to_string())
    }
}

impl std::fmt::Debug for TemplateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateContext")
            .field("config", &self.config)
            .field("files", &self.files)
            .field("args", &self.args)
            .field("initialized", &self.is_initialized())
            .field("pages", &self.pages.len())
            .finish_non_exhaustive()
    }
}
