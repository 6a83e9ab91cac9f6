//! # Pagewright - Page and Layout Templates
//!
//! `pagewright` renders pages made of literal text and `{{ ... }}`
//! expressions. Each expression is a pipeline: an initial value followed by
//! filters separated by `|`. Pages may declare front matter args and render
//! inside a layout found by walking up their directory tree.
//!
//! ## Core Concepts
//!
//! - [`TemplateContext`]: shared configuration, registries and caches
//! - [`TemplatePage`]: one source file, its front matter args and fragments
//! - [`PageResult`]: one render of a page with a model, args and transformers
//! - [`ScopeContext`]: the variable scope of the page being written
//! - [`PageFormat`]: per-extension front matter markers and value encoding
//! - [`filters`]: value, context and block filters registered by providers
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use pagewright::vfs::MemoryVirtualFiles;
//! use pagewright::{PageResult, TemplateContext, Value};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let files = Arc::new(MemoryVirtualFiles::new());
//! files.write_file("_layout.html", "<title>{{ title }}</title>\n<body>{{ page }}</body>");
//! files.write_file("posts/hello.html", "<!--\ntitle: Hello\n-->\n<h1>{{ title | upper }}</h1>\n{{ model.tags | join(', ') }}");
//!
//! let ctx = Arc::new(TemplateContext::new(files));
//! ctx.init();
//!
//! let page = ctx.page("posts/hello").await.unwrap();
//! let model: Value = [("tags", Value::from(vec!["rust", "async"]))].into_iter().collect();
//! let result = PageResult::new(ctx.clone(), page).with_model(model);
//!
//! assert_eq!(
//!     result.render().await.unwrap(),
//!     "<title>Hello</title>\n<body><h1>HELLO</h1>\nrust, async</body>"
//! );
//! # });
//! ```
//!
//! ## Expressions
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `{{ title }}` | binding lookup |
//! | `{{ post.author.name }}`, `{{ items[0] }}` | member and index access |
//! | `{{ 'text' }}`, `{{ 42 }}`, `{{ [1, 2] }}`, `{{ { a: 1 } }}` | literals |
//! | `{{ price \| multiply(1.2) \| currency }}` | filter pipeline |
//! | `{{ 'nav' \| partial }}` | block filter writing another page |
//! | `{{ x \| assignTo: total }}` | colon argument, taken as a string |
//!
//! An expression that resolves to nothing writes its own source text back,
//! so unknown syntax passes through untouched. A missing value piped through
//! filters writes nothing.
//!
//! ## Layouts
//!
//! A page renders inside the layout named by its `layout` arg, or
//! `_layout` by default, found in the page's directory or the nearest
//! ancestor. The layout writes the page at its `{{ page }}` hole. `layout:
//! none` opts out.
//!
//! ## Configuration
//!
//! [`TemplateConfig`] can be built in code or loaded from YAML with
//! [`TemplateConfig::from_yaml`].

pub mod binding;
pub mod cache;
mod config;
pub mod container;
mod context;
mod error;
mod eval;
pub mod filters;
pub mod format;
mod page;
mod pages;
mod result;
mod scope;
pub mod transform;
mod value;
pub mod vfs;

pub use binding::{BindingCompiler, InterpretedCompiler, Lookup};
pub use config::TemplateConfig;
pub use container::Container;
pub use context::{TemplateContext, UnhandledFn};
pub use error::{TemplateError, TemplateResult};
pub use filters::{FilterDef, FilterKind, FilterOutput, FilterProvider, FilterRegistry};
pub use format::{HtmlPageFormat, MarkdownPageFormat, PageFormat};
pub use page::{PageContent, PageKind, TemplatePage};
pub use pages::TemplatePages;
pub use result::{LayoutSelection, PageResult};
pub use scope::ScopeContext;
pub use transform::StreamTransformer;
pub use value::{Number, Value, ValueKind};
pub use vfs::{FileInfo, VirtualFiles};

// Re-export the parser types that appear in the public API
pub use pagewright_parser::{Expression, PageFragment, ParseError, VariableFragment};

pub use tokio_util::sync::CancellationToken;
