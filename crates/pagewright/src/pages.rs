//! The page registry.
//!
//! [`TemplatePages`] caches parsed pages by kind and key (virtual path
//! without extension), finds layouts by walking up the directory tree, and
//! builds one-time pages from strings. A file requested directly and the
//! same file found as a layout are cached separately, so each renders the
//! same way regardless of which was asked for first.
//!
//! ```text
//! get_page("docs/")          probes docs/index.html, docs/index.md
//! get_page("docs/intro")     probes docs/intro.html, docs/intro.md
//! get_page("docs/intro.md")  probes docs/intro.md first
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::context::TemplateContext;
use crate::error::{TemplateError, TemplateResult};
use crate::format::PageFormat;
use crate::page::{PageKind, TemplatePage};
use crate::vfs::{extension, join_path, normalize_path, parent_dir, strip_extension, VirtualFiles};

#[derive(Debug, Default)]
pub struct TemplatePages {
    pages: RwLock<HashMap<(PageKind, String), Arc<TemplatePage>>>,
    next_temp_id: AtomicU64,
}

impl TemplatePages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the loaded page for `path`, or `None` if no registered format
    /// has a matching file.
    pub async fn get_page(&self, ctx: &TemplateContext, path: &str) -> TemplateResult<Option<Arc<TemplatePage>>> {
        let formats = ctx.formats()?;
        let normalized = normalize_path(path);
        let (key, explicit) = page_key(ctx, formats, &normalized);

        if let Some(page) = self.cached(PageKind::Page, &key) {
            page.init(ctx).await?;
            return Ok(Some(page));
        }
        trace!(path = %key, "page cache miss");

        for format in ordered_formats(formats, explicit.as_deref()) {
            let file = format!("{}.{}", key, format.extension());
            if ctx.files().file_info(&file).await?.is_none() {
                continue;
            }
            let page = self.insert(TemplatePage::new(
                file,
                key.clone(),
                PageKind::Page,
                format.clone(),
                ctx.files().clone(),
            ));
            page.init(ctx).await?;
            return Ok(Some(page));
        }
        Ok(None)
    }

    /// Finds the layout called `name` for `page`, searching the page's
    /// directory and then each ancestor up to the root. The layout is
    /// registered but not loaded.
    pub(crate) async fn find_layout(
        &self,
        ctx: &TemplateContext,
        page: &TemplatePage,
        name: &str,
    ) -> TemplateResult<Option<Arc<TemplatePage>>> {
        let formats = ctx.formats()?;
        let name = normalize_path(name);
        let name = strip_extension(&name);

        let mut dir = parent_dir(page.key());
        while let Some(current) = dir {
            let key = join_path(current, name);
            if key != page.key() {
                if let Some(layout) = self.cached(PageKind::Layout, &key) {
                    return Ok(Some(layout));
                }
                for format in formats {
                    let file = format!("{}.{}", key, format.extension());
                    if ctx.files().file_info(&file).await?.is_none() {
                        continue;
                    }
                    debug!(page = %page.virtual_path(), layout = %file, "layout resolved");
                    return Ok(Some(self.insert(TemplatePage::new(
                        file,
                        key,
                        PageKind::Layout,
                        format.clone(),
                        ctx.files().clone(),
                    ))));
                }
            }
            dir = parent_dir(current);
        }
        Ok(None)
    }

    /// Resolves and loads the layout for an initialized page. With no
    /// `name`, the page's format picks one from its args.
    pub async fn resolve_layout_page(
        &self,
        ctx: &TemplateContext,
        page: &TemplatePage,
        name: Option<&str>,
    ) -> TemplateResult<Option<Arc<TemplatePage>>> {
        let content = page.content().ok_or(TemplateError::NotInitialized("TemplatePage"))?;
        let name = match name {
            Some(name) => name.to_string(),
            None => match page.format().layout_name(&content.args, &ctx.config().default_layout_page) {
                Some(name) => name,
                None => return Ok(None),
            },
        };
        let Some(layout) = self.find_layout(ctx, page, &name).await? else {
            return Ok(None);
        };
        layout.refresh(ctx).await?;
        Ok(Some(layout))
    }

    /// Creates and loads a page from `contents`.
    ///
    /// The page is backed by a uniquely named file under the context's temp
    /// directory, which is removed again once the page is loaded. One-time
    /// pages are not cached and never use a layout.
    pub async fn one_time_page(
        &self,
        ctx: &TemplateContext,
        contents: &str,
        ext: Option<&str>,
    ) -> TemplateResult<Arc<TemplatePage>> {
        let formats = ctx.formats()?;
        let format = match ext {
            Some(ext) => ctx
                .format_for_extension(ext)?
                .ok_or_else(|| TemplateError::NoPageFormat {
                    path: format!("*.{}", ext.trim_start_matches('.')),
                })?,
            None => formats.first().ok_or_else(|| TemplateError::NoPageFormat {
                path: "one-time page".to_string(),
            })?,
        };

        let id = self.next_temp_id.fetch_add(1, Ordering::Relaxed);
        let dir = normalize_path(&ctx.config().temp_dir);
        let path = join_path(&dir, &format!("{}.{}", id, format.extension()));
        let temp_files = ctx.temp_files();
        temp_files.write_file(&path, contents);

        let files: Arc<dyn VirtualFiles> = temp_files.clone();
        let page = Arc::new(TemplatePage::new(
            path.clone(),
            strip_extension(&path).to_string(),
            PageKind::OneTime,
            format.clone(),
            files,
        ));
        let loaded = page.init(ctx).await;
        temp_files.remove_file(&path);
        loaded?;

        debug!(path = %path, "one-time page created");
        Ok(page)
    }

    /// The number of cached pages and layouts.
    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }

    fn cached(&self, kind: PageKind, key: &str) -> Option<Arc<TemplatePage>> {
        self.pages.read().get(&(kind, key.to_string())).cloned()
    }

    /// Caches `page` unless another caller registered the same kind and key
    /// first.
    fn insert(&self, page: TemplatePage) -> Arc<TemplatePage> {
        self.pages
            .write()
            .entry((page.kind(), page.key().to_string()))
            .or_insert_with(|| Arc::new(page))
            .clone()
    }
}

/// Computes the cache key of a request path. Directory paths map to their
/// index page; a registered extension is split off and returned.
fn page_key(ctx: &TemplateContext, formats: &[Arc<dyn PageFormat>], path: &str) -> (String, Option<String>) {
    if path.is_empty() || path.ends_with('/') {
        return (join_path(path, &ctx.config().index_page), None);
    }
    match extension(path) {
        Some(ext) if formats.iter().any(|f| f.extension().eq_ignore_ascii_case(ext)) => {
            (strip_extension(path).to_string(), Some(ext.to_string()))
        }
        _ => (path.to_string(), None),
    }
}

/// The formats in registration order, with the one for `preferred` first.
fn ordered_formats<'f>(
    formats: &'f [Arc<dyn PageFormat>],
    preferred: Option<&str>,
) -> impl Iterator<Item = &'f Arc<dyn PageFormat>> + 'f {
    let preferred = preferred.map(str::to_ascii_lowercase);
    let first = formats
        .iter()
        .position(|f| Some(f.extension().to_ascii_lowercase()) == preferred);
    first
        .map(|i| &formats[i])
        .into_iter()
        .chain(formats.iter().enumerate().filter(move |(i, _)| Some(*i) != first).map(|(_, f)| f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryVirtualFiles;

    fn setup() -> (Arc<MemoryVirtualFiles>, TemplateContext) {
        let files = Arc::new(MemoryVirtualFiles::new());
        let ctx = TemplateContext::new(files.clone());
        ctx.init();
        (files, ctx)
    }

    #[tokio::test]
    async fn test_get_page_probes_formats_and_caches() {
        let (files, ctx) = setup();
        files.write_file("docs/intro.md", "intro");
        files.write_file("docs/index.html", "index");

        let page = ctx.pages().get_page(&ctx, "/docs/intro").await.unwrap().unwrap();
        assert_eq!(page.virtual_path(), "docs/intro.md");
        let again = ctx.pages().get_page(&ctx, "docs\\intro.md").await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&page, &again));

        let index = ctx.pages().get_page(&ctx, "docs/").await.unwrap().unwrap();
        assert_eq!(index.virtual_path(), "docs/index.html");
        assert!(ctx.pages().get_page(&ctx, "docs/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_explicit_extension_is_probed_first() {
        let (files, ctx) = setup();
        files.write_file("both.html", "html");
        files.write_file("both.md", "md");
        let page = ctx.pages().get_page(&ctx, "both.md").await.unwrap().unwrap();
        assert_eq!(page.virtual_path(), "both.md");
    }

    #[tokio::test]
    async fn test_root_index() {
        let (files, ctx) = setup();
        files.write_file("index.html", "home");
        let page = ctx.pages().get_page(&ctx, "").await.unwrap().unwrap();
        assert_eq!(page.key(), "index");
    }

    #[tokio::test]
    async fn test_layout_walks_ancestors() {
        let (files, ctx) = setup();
        files.write_file("a/_layout.html", "<main>{{ page }}</main>");
        files.write_file("a/b/c/page.html", "deep");
        files.write_file("x/page.html", "other");

        let deep = ctx.pages().get_page(&ctx, "a/b/c/page").await.unwrap().unwrap();
        let layout = deep.content().unwrap().layout.clone().unwrap();
        assert_eq!(layout.virtual_path(), "a/_layout.html");
        assert_eq!(layout.kind(), PageKind::Layout);
        assert!(layout.is_loaded());

        let other = ctx.pages().get_page(&ctx, "x/page").await.unwrap().unwrap();
        assert!(other.content().unwrap().layout.is_none());
    }

    #[tokio::test]
    async fn test_layout_page_does_not_use_itself() {
        let (files, ctx) = setup();
        files.write_file("_layout.html", "{{ page }}");
        let page = ctx.pages().get_page(&ctx, "_layout").await.unwrap().unwrap();
        assert!(page.content().unwrap().layout.is_none());
    }

    #[tokio::test]
    async fn test_layout_and_direct_request_are_cached_apart() {
        let (files, ctx) = setup();
        files.write_file("_layout.md", "ROOT[{{ page }}]");
        files.write_file("a/_layout.md", "A({{ page }})");
        files.write_file("a/p.md", "p");

        let p = ctx.pages().get_page(&ctx, "a/p").await.unwrap().unwrap();
        let as_layout = p.content().unwrap().layout.clone().unwrap();
        let direct = ctx.pages().get_page(&ctx, "a/_layout").await.unwrap().unwrap();

        assert!(!Arc::ptr_eq(&as_layout, &direct));
        assert_eq!(as_layout.kind(), PageKind::Layout);
        assert_eq!(direct.kind(), PageKind::Page);
        assert_eq!(direct.content().unwrap().layout.as_ref().unwrap().virtual_path(), "_layout.md");
        assert_eq!(ctx.pages().len(), 4);
    }

    #[tokio::test]
    async fn test_layout_probes_formats_in_registration_order() {
        let (files, ctx) = setup();
        files.write_file("_layout.md", "md[{{ page }}]");
        files.write_file("_layout.html", "html[{{ page }}]");
        files.write_file("p.md", "p");
        let page = ctx.pages().get_page(&ctx, "p").await.unwrap().unwrap();
        let layout = page.content().unwrap().layout.clone().unwrap();
        assert_eq!(layout.virtual_path(), "_layout.html");
    }

    #[tokio::test]
    async fn test_resolve_layout_requires_init() {
        let (files, ctx) = setup();
        files.write_file("a/_layout.html", "{{ page }}");
        files.write_file("a/wide.html", "{{ page }}");
        let fresh = TemplatePage::new(
            "a/p.html".into(),
            "a/p".into(),
            PageKind::Page,
            Arc::new(crate::format::HtmlPageFormat),
            files.clone(),
        );
        let err = ctx.pages().resolve_layout_page(&ctx, &fresh, None).await.unwrap_err();
        assert!(matches!(err, TemplateError::NotInitialized(_)));

        files.write_file("a/p.html", "p");
        let page = ctx.pages().get_page(&ctx, "a/p").await.unwrap().unwrap();
        let wide = ctx.pages().resolve_layout_page(&ctx, &page, Some("wide.html")).await.unwrap().unwrap();
        assert_eq!(wide.virtual_path(), "a/wide.html");
        assert!(wide.is_loaded());
    }

    #[tokio::test]
    async fn test_one_time_pages_are_unique_and_cleaned_up() {
        let (_files, ctx) = setup();
        let a = ctx.pages().one_time_page(&ctx, "a {{ x }}", None).await.unwrap();
        let b = ctx.pages().one_time_page(&ctx, "b", Some("md")).await.unwrap();
        assert_ne!(a.virtual_path(), b.virtual_path());
        assert!(a.virtual_path().starts_with("__tmp/"));
        assert!(b.virtual_path().ends_with(".md"));
        assert_eq!(a.kind(), PageKind::OneTime);
        assert!(ctx.temp_files().is_empty());
        assert!(ctx.pages().is_empty());

        let err = ctx.pages().one_time_page(&ctx, "x", Some("txt")).await.unwrap_err();
        assert!(matches!(err, TemplateError::NoPageFormat { .. }));
    }

    #[test]
    fn test_ordered_formats() {
        let formats: Vec<Arc<dyn PageFormat>> = vec![
            Arc::new(crate::format::HtmlPageFormat),
            Arc::new(crate::format::MarkdownPageFormat),
        ];
        let exts = |preferred| {
            ordered_formats(&formats, preferred)
                .map(|f| f.extension().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(exts(None), vec!["html", "md"]);
        assert_eq!(exts(Some("md")), vec!["md", "html"]);
        assert_eq!(exts(Some("txt")), vec!["html", "md"]);
    }
}
