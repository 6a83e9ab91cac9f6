//! Front matter parsing.
//!
//! A page may begin with a block of arguments:
//!
//! ```text
//! ---
//! title: Home
//! layout: wide
//! ---
//! body starts here
//! ```
//!
//! The delimiters are supplied by the page format (HTML pages use `<!--` and
//! `-->`). Parsing is lenient: blank lines inside the block are skipped, a
//! line without a colon becomes a key with an empty value, and a missing
//! suffix line simply consumes the rest of the source.

/// Parsed front matter and the remaining body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatter<'a> {
    /// Arguments in declaration order. Later duplicates are kept; consumers
    /// decide whether the first or last occurrence wins.
    pub args: Vec<(String, String)>,
    /// The page body following the arguments block.
    pub body: &'a str,
}

impl FrontMatter<'_> {
    /// Returns `true` if an arguments block was present.
    pub fn has_args(&self) -> bool {
        !self.args.is_empty()
    }

    /// Looks up the last value declared for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Splits `source` into front matter arguments and body.
///
/// The first non-blank line must start with `prefix` for an arguments block to
/// be recognized. Inside the block each line is split on its first `:` into a
/// trimmed key and value, until a line starting with `suffix`. The body after
/// an arguments block is advanced past leading whitespace; without one the
/// body is the entire, untouched source.
///
/// # Example
///
/// ```rust
/// use pagewright_parser::parse_front_matter;
///
/// let fm = parse_front_matter("---\ntitle: Home\n---\n\n<h1>Hi</h1>", "---", "---");
/// assert_eq!(fm.get("title"), Some("Home"));
/// assert_eq!(fm.body, "<h1>Hi</h1>");
/// ```
pub fn parse_front_matter<'a>(source: &'a str, prefix: &str, suffix: &str) -> FrontMatter<'a> {
    let no_args = FrontMatter {
        args: Vec::new(),
        body: source,
    };
    if prefix.is_empty() {
        return no_args;
    }

    let start = source.len() - source.trim_start().len();
    let mut lines = LineIter::new(source, start);

    match lines.next() {
        Some(first) if first.trim().starts_with(prefix) => {}
        _ => return no_args,
    }

    let mut args = Vec::new();
    #[allow(clippy::while_let_on_iterator)]
    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with(suffix) {
            let body = source[lines.pos..].trim_start();
            return FrontMatter { args, body };
        }
        let (key, value) = match line.split_once(':') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (line, ""),
        };
        args.push((key.to_string(), value.to_string()));
    }

    FrontMatter {
        args,
        body: &source[source.len()..],
    }
}

/// Line iterator that tracks the byte offset after the last yielded line.
struct LineIter<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> LineIter<'a> {
    fn new(source: &'a str, pos: usize) -> Self {
        Self { source, pos }
    }
}

impl<'a> Iterator for LineIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.source.len() {
            return None;
        }
        let rest = &self.source[self.pos..];
        let (line, advance) = match rest.find('\n') {
            Some(i) => (&rest[..i], i + 1),
            None => (rest, rest.len()),
        };
        self.pos += advance;
        Some(line.strip_suffix('\r').unwrap_or(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_front_matter_keeps_source() {
        let fm = parse_front_matter("  <p>hello</p>\n", "---", "---");
        assert!(!fm.has_args());
        assert_eq!(fm.body, "  <p>hello</p>\n");
    }

    #[test]
    fn test_basic_args() {
        let fm = parse_front_matter("---\ntitle: Home\nlayout: wide\n---\nbody", "---", "---");
        assert_eq!(
            fm.args,
            vec![
                ("title".to_string(), "Home".to_string()),
                ("layout".to_string(), "wide".to_string()),
            ]
        );
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn test_html_delimiters() {
        let fm = parse_front_matter("\n\n<!--\ntitle: About\n-->\n<h1>About</h1>", "<!--", "-->");
        assert_eq!(fm.get("title"), Some("About"));
        assert_eq!(fm.body, "<h1>About</h1>");
    }

    #[test]
    fn test_value_split_on_first_colon() {
        let fm = parse_front_matter("---\nurl: http://example.org:8080\n---\n", "---", "---");
        assert_eq!(fm.get("url"), Some("http://example.org:8080"));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let fm = parse_front_matter("---\na: 1\n\n   \nb: 2\n---\nx", "---", "---");
        assert_eq!(fm.args.len(), 2);
        assert_eq!(fm.get("b"), Some("2"));
        assert_eq!(fm.body, "x");
    }

    #[test]
    fn test_missing_colon_is_empty_value() {
        let fm = parse_front_matter("---\ndraft\n---\nx", "---", "---");
        assert_eq!(fm.get("draft"), Some(""));
    }

    #[test]
    fn test_crlf_lines() {
        let fm = parse_front_matter("---\r\ntitle: Win\r\n---\r\nbody", "---", "---");
        assert_eq!(fm.get("title"), Some("Win"));
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn test_unterminated_block_consumes_everything() {
        let fm = parse_front_matter("---\na: 1\nb: 2", "---", "---");
        assert_eq!(fm.args.len(), 2);
        assert_eq!(fm.body, "");
    }

    #[test]
    fn test_last_duplicate_wins_on_get() {
        let fm = parse_front_matter("---\na: 1\na: 2\n---\n", "---", "---");
        assert_eq!(fm.get("a"), Some("2"));
    }
}
