//! Page formats.
//!
//! A [`PageFormat`] is selected per page by file extension. It decides how
//! front matter is delimited, how evaluated values are encoded into the
//! output, which layout a page uses, and whether an expression error may be
//! replaced by a fallback value.
//!
//! | Format | Extension | Front matter | Encoding |
//! |--------|-----------|--------------|----------|
//! | [`HtmlPageFormat`] | `html` | `<!--` ... `-->` | HTML-escaped, [`Value::Raw`] passes through |
//! | [`MarkdownPageFormat`] | `md` | `---` ... `---` | plain text |

use std::fmt::Debug;

use indexmap::IndexMap;

use crate::context::TemplateContext;
use crate::error::TemplateError;
use crate::value::Value;

/// Per-extension strategy for parsing and encoding pages.
pub trait PageFormat: Debug + Send + Sync {
    /// File extension handled by this format, without the dot.
    fn extension(&self) -> &str;

    fn content_type(&self) -> &str;

    /// First line of a front matter block.
    fn args_prefix(&self) -> &str {
        "---"
    }

    /// Last line of a front matter block.
    fn args_suffix(&self) -> &str {
        "---"
    }

    /// Encodes an evaluated value for output.
    fn encode_value(&self, value: &Value) -> String;

    /// Chooses the layout for a page from its front matter.
    ///
    /// The default honors an explicit `layout` argument, where `none` opts
    /// out of layouts, and otherwise uses `default_layout`.
    fn layout_name(&self, args: &IndexMap<String, String>, default_layout: &str) -> Option<String> {
        match args.get("layout").map(|s| s.trim()) {
            Some("none") => None,
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => Some(default_layout.to_string()),
        }
    }

    /// Offered every recoverable expression error. Returning a value writes
    /// it in place of the failed expression; `None` propagates the error.
    fn on_expression_exception(&self, _ctx: &TemplateContext, _error: &TemplateError) -> Option<Value> {
        None
    }
}

/// HTML pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlPageFormat;

impl PageFormat for HtmlPageFormat {
    fn extension(&self) -> &str {
        "html"
    }

    fn content_type(&self) -> &str {
        "text/html"
    }

    fn args_prefix(&self) -> &str {
        "<!--"
    }

    fn args_suffix(&self) -> &str {
        "-->"
    }

    fn encode_value(&self, value: &Value) -> String {
        match value {
            Value::Raw(html) => html.clone(),
            other => escape_html(&other.to_string()),
        }
    }

    fn on_expression_exception(&self, ctx: &TemplateContext, error: &TemplateError) -> Option<Value> {
        if !ctx.config().debug_mode {
            return None;
        }
        Some(Value::Raw(format!(
            "<pre class=\"pagewright-error\">{}</pre>",
            escape_html(&error.to_string())
        )))
    }
}

/// Markdown pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownPageFormat;

impl PageFormat for MarkdownPageFormat {
    fn extension(&self) -> &str {
        "md"
    }

    fn content_type(&self) -> &str {
        "text/markdown"
    }

    fn encode_value(&self, value: &Value) -> String {
        value.to_string()
    }
}

/// Escapes the five HTML-significant characters.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
