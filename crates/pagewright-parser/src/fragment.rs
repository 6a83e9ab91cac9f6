//! Splitting a page body into text and expression fragments.

use crate::expression::{parse_pipeline, Expression, FilterCall, Pipeline};

/// A piece of a parsed page body.
#[derive(Debug, Clone, PartialEq)]
pub enum PageFragment {
    /// Literal text, emitted verbatim.
    Text(String),
    /// A `{{ ... }}` expression.
    Variable(VariableFragment),
}

impl PageFragment {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PageFragment::Text(text) => Some(text),
            PageFragment::Variable(_) => None,
        }
    }

    pub fn as_variable(&self) -> Option<&VariableFragment> {
        match self {
            PageFragment::Text(_) => None,
            PageFragment::Variable(var) => Some(var),
        }
    }
}

/// A parsed `{{ ... }}` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableFragment {
    /// The full source span including the braces.
    pub original_text: String,
    /// The initial expression of the pipeline.
    pub expression: Expression,
    /// The binding path text when the initial expression is a binding.
    pub binding: Option<String>,
    /// Filter stages applied after the initial expression.
    pub filters: Vec<FilterCall>,
}

impl VariableFragment {
    fn new(original_text: &str, pipeline: Pipeline) -> Self {
        let binding = match &pipeline.initial {
            Expression::Binding(path) => Some(path.text.clone()),
            _ => None,
        };
        Self {
            original_text: original_text.to_string(),
            expression: pipeline.initial,
            binding,
            filters: pipeline.filters,
        }
    }
}

/// Parses a page body into fragments.
///
/// Each `{{` starts an expression that runs to the matching `}}`, ignoring
/// braces inside string literals and nested object literals. Spans that are
/// unterminated or fail to parse are kept as text. Adjacent text is merged,
/// so the result never holds two consecutive [`PageFragment::Text`] items.
pub fn parse_template(body: &str) -> Vec<PageFragment> {
    let mut fragments = Vec::new();
    let mut text = String::new();
    let mut pos = 0;

    while let Some(offset) = body[pos..].find("{{") {
        let start = pos + offset;
        let inner_start = start + 2;
        let Some(close) = find_close(&body[inner_start..]) else {
            break;
        };
        let end = inner_start + close + 2;
        let inner = body[inner_start..inner_start + close].trim();

        match parse_pipeline(inner) {
            Ok(pipeline) => {
                text.push_str(&body[pos..start]);
                if !text.is_empty() {
                    fragments.push(PageFragment::Text(std::mem::take(&mut text)));
                }
                fragments.push(PageFragment::Variable(VariableFragment::new(
                    &body[start..end],
                    pipeline,
                )));
            }
            Err(_) => text.push_str(&body[pos..end]),
        }
        pos = end;
    }

    text.push_str(&body[pos..]);
    if !text.is_empty() {
        fragments.push(PageFragment::Text(text));
    }
    fragments
}

/// Finds the closing `}}` of an expression body, skipping string literals
/// and balanced `{ ... }` object literals.
fn find_close(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
        } else {
            match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'{' => depth += 1,
                b'}' if depth == 0 && bytes.get(i + 1) == Some(&b'}') => return Some(i),
                b'}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Literal;

    fn text(s: &str) -> PageFragment {
        PageFragment::Text(s.to_string())
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(parse_template("<p>hi</p>"), vec![text("<p>hi</p>")]);
        assert!(parse_template("").is_empty());
    }

    #[test]
    fn test_variable_between_text() {
        let frags = parse_template("<h1>{{ title }}</h1>");
        assert_eq!(frags.len(), 3);
        let var = frags[1].as_variable().unwrap();
        assert_eq!(var.original_text, "{{ title }}");
        assert_eq!(var.binding.as_deref(), Some("title"));
        assert!(var.filters.is_empty());
    }

    #[test]
    fn test_adjacent_variables() {
        let frags = parse_template("{{a}}{{b}}");
        assert_eq!(frags.len(), 2);
        assert!(frags.iter().all(|f| f.as_variable().is_some()));
    }

    #[test]
    fn test_literal_initial_has_no_binding() {
        let frags = parse_template("{{ 'war and peace' | titleCase }}");
        let var = frags[0].as_variable().unwrap();
        assert_eq!(var.binding, None);
        assert_eq!(
            var.expression,
            Expression::Literal(Literal::String("war and peace".into()))
        );
    }

    #[test]
    fn test_unparseable_is_text_and_merged() {
        let frags = parse_template("a {{ #if x }} b {{ y }}");
        assert_eq!(frags[0], text("a {{ #if x }} b "));
        assert_eq!(frags[1].as_variable().unwrap().binding.as_deref(), Some("y"));
    }

    #[test]
    fn test_unterminated_is_text() {
        assert_eq!(parse_template("x {{ y"), vec![text("x {{ y")]);
        assert_eq!(parse_template("{{ 'a }}"), vec![text("{{ 'a }}")]);
    }

    #[test]
    fn test_braces_in_strings_and_objects() {
        let frags = parse_template("{{ '}}' | upper }}!");
        assert_eq!(frags[0].as_variable().unwrap().original_text, "{{ '}}' | upper }}");
        assert_eq!(frags[1], text("!"));

        let frags = parse_template("{{ { a: { b: 1 }} | json }}");
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].as_variable().unwrap().filters[0].name, "json");
    }

    #[test]
    fn test_empty_expression_is_text() {
        assert_eq!(parse_template("{{}}"), vec![text("{{}}")]);
    }
}
