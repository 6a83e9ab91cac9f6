//! Template pages.
//!
//! A [`TemplatePage`] is one source file: its parsed front matter args, its
//! body fragments and, for ordinary pages, the layout it renders inside.
//! Parsed state lives in an immutable [`PageContent`] that is swapped
//! wholesale when the file changes, so readers always see a complete page.
//!
//! # Freshness
//!
//! Once loaded, a page is only re-checked when the context runs in debug
//! mode or with `check_for_modified_pages`. A check compares the file's
//! last-modified time and reloads only on change. With
//! `check_for_modified_pages_after_secs` set, a page is checked at most once
//! per interval.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use indexmap::IndexMap;
use pagewright_parser::{parse_front_matter, parse_template, PageFragment};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::config::TemplateConfig;
use crate::context::TemplateContext;
use crate::error::{TemplateError, TemplateResult};
use crate::format::PageFormat;
use crate::vfs::VirtualFiles;

/// The role a page was loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// A page requested by path. Resolves a layout.
    Page,
    /// A layout found for another page. Never resolves a layout of its own.
    Layout,
    /// An ephemeral page built from a string.
    OneTime,
}

/// The parsed state of a page at one point in time.
#[derive(Debug)]
pub struct PageContent {
    /// Virtual path of the source file, including its extension.
    pub path: String,
    /// Front matter args in declaration order. A repeated key keeps the
    /// last value.
    pub args: IndexMap<String, String>,
    pub fragments: Vec<PageFragment>,
    /// The layout this page renders inside, if any.
    pub layout: Option<Arc<TemplatePage>>,
    pub last_modified: SystemTime,
}

/// A page source file and its current parsed content.
pub struct TemplatePage {
    virtual_path: String,
    key: String,
    kind: PageKind,
    format: Arc<dyn PageFormat>,
    files: Arc<dyn VirtualFiles>,
    load_lock: tokio::sync::Mutex<()>,
    content: RwLock<Option<Arc<PageContent>>>,
    last_checked: Mutex<Option<Instant>>,
}

impl TemplatePage {
    pub(crate) fn new(
        virtual_path: String,
        key: String,
        kind: PageKind,
        format: Arc<dyn PageFormat>,
        files: Arc<dyn VirtualFiles>,
    ) -> Self {
        Self {
            virtual_path,
            key,
            kind,
            format,
            files,
            load_lock: tokio::sync::Mutex::new(()),
            content: RwLock::new(None),
            last_checked: Mutex::new(None),
        }
    }

    pub fn virtual_path(&self) -> &str {
        &self.virtual_path
    }

    /// The cache key: the virtual path without its extension.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn format(&self) -> &Arc<dyn PageFormat> {
        &self.format
    }

    /// The current parsed content, or `None` before the first load.
    pub fn content(&self) -> Option<Arc<PageContent>> {
        self.content.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.content.read().is_some()
    }

    /// Front matter args of the current content.
    pub fn args(&self) -> IndexMap<String, String> {
        self.content().map(|c| c.args.clone()).unwrap_or_default()
    }

    /// Loads the page if needed, refreshes it if due, and does the same for
    /// its layout.
    pub async fn init(&self, ctx: &TemplateContext) -> TemplateResult<Arc<PageContent>> {
        let content = self.refresh(ctx).await?;
        if let Some(layout) = &content.layout {
            layout.refresh(ctx).await?;
        }
        Ok(content)
    }

    /// Loads the page if it was never loaded, or reloads it if a freshness
    /// check is due and the file changed. A file that has disappeared keeps
    /// its last content.
    pub(crate) async fn refresh(&self, ctx: &TemplateContext) -> TemplateResult<Arc<PageContent>> {
        if let Some(content) = self.content() {
            if !self.due_for_check(ctx.config()) {
                return Ok(content);
            }
            match self.files.file_info(&self.virtual_path).await? {
                Some(info) if info.last_modified != content.last_modified => {}
                _ => return Ok(content),
            }
        }
        self.load(ctx).await
    }

    fn due_for_check(&self, config: &TemplateConfig) -> bool {
        if !config.checks_freshness() {
            return false;
        }
        let Some(interval) = config.check_interval() else {
            return true;
        };
        let now = Instant::now();
        let mut last_checked = self.last_checked.lock();
        match *last_checked {
            Some(at) if now.duration_since(at) < interval => false,
            _ => {
                *last_checked = Some(now);
                true
            }
        }
    }

    async fn load(&self, ctx: &TemplateContext) -> TemplateResult<Arc<PageContent>> {
        let _guard = self.load_lock.lock().await;

        let info = self
            .files
            .file_info(&self.virtual_path)
            .await?
            .ok_or_else(|| TemplateError::PageNotFound {
                path: self.virtual_path.clone(),
            })?;
        if let Some(current) = self.content() {
            if current.last_modified == info.last_modified {
                return Ok(current);
            }
        }

        let bytes = self.files.read_all(&self.virtual_path).await?;
        let source = String::from_utf8(bytes).map_err(|source| TemplateError::Utf8 {
            path: self.virtual_path.clone(),
            source,
        })?;
        let source = source.strip_prefix('\u{feff}').unwrap_or(&source);

        let front_matter = parse_front_matter(source, self.format.args_prefix(), self.format.args_suffix());
        let args: IndexMap<String, String> = front_matter.args.into_iter().collect();
        let fragments = parse_template(front_matter.body);

        let layout = match self.kind {
            PageKind::Page => match self.format.layout_name(&args, &ctx.config().default_layout_page) {
                Some(name) => ctx.pages().find_layout(ctx, self, &name).await?,
                None => None,
            },
            PageKind::Layout | PageKind::OneTime => None,
        };

        let content = Arc::new(PageContent {
            path: self.virtual_path.clone(),
            args,
            fragments,
            layout,
            last_modified: info.last_modified,
        });
        *self.content.write() = Some(content.clone());

        debug!(
            path = %self.virtual_path,
            kind = ?self.kind,
            args = content.args.len(),
            fragments = content.fragments.len(),
            layout = content.layout.as_ref().map(|l| l.virtual_path()),
            "page loaded"
        );
        Ok(content)
    }
}

impl std::fmt::Debug for TemplatePage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplatePage")
            .field("virtual_path", &self.virtual_path)
            .field("kind", &self.kind)
            .field("format", &self.format.extension())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{HtmlPageFormat, MarkdownPageFormat};
    use crate::vfs::MemoryVirtualFiles;

    fn context(files: &Arc<MemoryVirtualFiles>, config: TemplateConfig) -> TemplateContext {
        let ctx = TemplateContext::new(files.clone()).with_config(config);
        ctx.init();
        ctx
    }

    fn page(files: &Arc<MemoryVirtualFiles>, path: &str, kind: PageKind) -> TemplatePage {
        let format: Arc<dyn PageFormat> = if path.ends_with(".md") {
            Arc::new(MarkdownPageFormat)
        } else {
            Arc::new(HtmlPageFormat)
        };
        TemplatePage::new(
            path.to_string(),
            crate::vfs::strip_extension(path).to_string(),
            kind,
            format,
            files.clone(),
        )
    }

    #[tokio::test]
    async fn test_load_parses_front_matter_and_body() {
        let files = Arc::new(MemoryVirtualFiles::new());
        files.write_file("post.html", "\u{feff}<!--\ntitle: Hello\ntitle: Again\nlayout: none\n-->\n<h1>{{ title }}</h1>");
        let ctx = context(&files, TemplateConfig::default());

        let page = page(&files, "post.html", PageKind::Page);
        let content = page.init(&ctx).await.unwrap();
        assert_eq!(content.args.get("title").map(String::as_str), Some("Again"));
        assert_eq!(content.fragments.len(), 3);
        assert!(content.layout.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_page_not_found() {
        let files = Arc::new(MemoryVirtualFiles::new());
        let ctx = context(&files, TemplateConfig::default());
        let err = page(&files, "nope.html", PageKind::Page).init(&ctx).await.unwrap_err();
        assert!(matches!(err, TemplateError::PageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_reported() {
        let files = Arc::new(MemoryVirtualFiles::new());
        files.write_file("bad.md", vec![0xff, 0xfe, 0x00]);
        let ctx = context(&files, TemplateConfig::default());
        let err = page(&files, "bad.md", PageKind::OneTime).init(&ctx).await.unwrap_err();
        assert!(matches!(err, TemplateError::Utf8 { .. }));
    }

    #[tokio::test]
    async fn test_reload_only_when_checking() {
        let files = Arc::new(MemoryVirtualFiles::new());
        files.write_file("a.md", "one");

        let quiet = context(&files, TemplateConfig::default());
        let p = page(&files, "a.md", PageKind::OneTime);
        p.init(&quiet).await.unwrap();
        files.write_file("a.md", "two");
        let content = p.init(&quiet).await.unwrap();
        assert_eq!(content.fragments[0].as_text(), Some("one"));

        let checking = context(
            &files,
            TemplateConfig {
                check_for_modified_pages: true,
                ..TemplateConfig::default()
            },
        );
        let content = p.init(&checking).await.unwrap();
        assert_eq!(content.fragments[0].as_text(), Some("two"));
    }

    #[tokio::test]
    async fn test_throttled_checks() {
        let files = Arc::new(MemoryVirtualFiles::new());
        files.write_file("a.md", "one");
        let ctx = context(
            &files,
            TemplateConfig {
                check_for_modified_pages: true,
                check_for_modified_pages_after_secs: Some(3600),
                ..TemplateConfig::default()
            },
        );
        let p = page(&files, "a.md", PageKind::OneTime);
        p.init(&ctx).await.unwrap();
        // the first check after load starts the interval
        files.write_file("a.md", "two");
        assert_eq!(p.init(&ctx).await.unwrap().fragments[0].as_text(), Some("two"));
        files.write_file("a.md", "three");
        assert_eq!(p.init(&ctx).await.unwrap().fragments[0].as_text(), Some("two"));
    }

    #[tokio::test]
    async fn test_deleted_file_keeps_content() {
        let files = Arc::new(MemoryVirtualFiles::new());
        files.write_file("a.md", "kept");
        let ctx = context(
            &files,
            TemplateConfig {
                debug_mode: true,
                ..TemplateConfig::default()
            },
        );
        let p = page(&files, "a.md", PageKind::OneTime);
        p.init(&ctx).await.unwrap();
        files.remove_file("a.md");
        assert_eq!(p.init(&ctx).await.unwrap().fragments[0].as_text(), Some("kept"));
    }
}
