//! Property-based rendering tests.

use std::sync::Arc;

use indexmap::IndexMap;
use pagewright::vfs::MemoryVirtualFiles;
use pagewright::TemplateContext;
use proptest::prelude::*;

fn render(text: &str, ext: &str) -> String {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(async {
        let files = Arc::new(MemoryVirtualFiles::new());
        files.write_file(&format!("page.{}", ext), text);
        let ctx = Arc::new(TemplateContext::new(files));
        ctx.init();
        ctx.render_page("page", IndexMap::new()).await.unwrap()
    })
}

/// Text with no expression opener and no front matter marker.
fn literal_text() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 .,;:!?()\\[\\]\\n\\t}#*_=+/-]{0,300}"
        .prop_filter("front matter marker", |s| s.trim_start().lines().next().map(str::trim) != Some("---"))
}

proptest! {
    /// A page without expressions renders byte for byte.
    #[test]
    fn literal_pages_round_trip(text in literal_text()) {
        prop_assert_eq!(render(&text, "html"), text.clone());
        prop_assert_eq!(render(&text, "md"), text);
    }

    /// Integer arithmetic pipelines match Rust arithmetic.
    #[test]
    fn arithmetic_matches(a in -1000i64..1000, b in -1000i64..1000, c in 1i64..50) {
        let text = format!("{{{{ {} | add({}) | multiply({}) }}}}", a, b, c);
        prop_assert_eq!(render(&text, "md"), ((a + b) * c).to_string());
    }
}
