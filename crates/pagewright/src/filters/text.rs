//! String filters.

use deunicode::deunicode;
use unicode_width::UnicodeWidthStr;

use super::{string_arg, usize_arg, FilterDef};
use crate::error::TemplateResult;
use crate::format::escape_html;
use crate::value::Value;

pub(super) fn filters() -> Vec<FilterDef> {
    vec![
        string_filter("upper", |s| s.to_uppercase()),
        string_filter("lower", |s| s.to_lowercase()),
        string_filter("titleCase", title_case),
        string_filter("trim", |s| s.trim().to_string()),
        string_filter("generateSlug", generate_slug),
        FilterDef::value("append", 2, |_, value, args| {
            Ok(Value::from(format!("{}{}", text(&value), text_arg(args, 0))))
        })
        .with_params(&["suffix"]),
        FilterDef::value("prepend", 2, |_, value, args| {
            Ok(Value::from(format!("{}{}", text_arg(args, 0), text(&value))))
        })
        .with_params(&["prefix"]),
        FilterDef::value("replace", 3, |_, value, args| {
            let from = string_arg("replace", args, 0)?;
            let to = text_arg(args, 1);
            Ok(Value::from(text(&value).replace(from, &to)))
        })
        .with_params(&["from", "to"]),
        FilterDef::value("substring", 2, |_, value, args| {
            let start = usize_arg("substring", args, 0)?;
            Ok(Value::from(substring(&text(&value), start, None)))
        })
        .with_params(&["start"]),
        FilterDef::value("substring", 3, |_, value, args| {
            let start = usize_arg("substring", args, 0)?;
            let len = usize_arg("substring", args, 1)?;
            Ok(Value::from(substring(&text(&value), start, Some(len))))
        })
        .with_params(&["start", "length"]),
        FilterDef::value("padLeft", 2, |_, value, args| pad("padLeft", &value, args, Side::Left)).with_params(&["width"]),
        FilterDef::value("padLeft", 3, |_, value, args| pad("padLeft", &value, args, Side::Left))
            .with_params(&["width", "fill"]),
        FilterDef::value("padRight", 2, |_, value, args| pad("padRight", &value, args, Side::Right))
            .with_params(&["width"]),
        FilterDef::value("padRight", 3, |_, value, args| pad("padRight", &value, args, Side::Right))
            .with_params(&["width", "fill"]),
        FilterDef::value("htmlEncode", 1, |_, value, _| Ok(Value::Raw(escape_html(&text(&value))))),
        FilterDef::value("raw", 1, |_, value, _| Ok(Value::Raw(text(&value)))),
        FilterDef::value("json", 1, |_, value, _| Ok(Value::Raw(serde_json::to_string(&value.to_json())?))),
        FilterDef::value("split", 2, |_, value, args| {
            let separator = string_arg("split", args, 0)?;
            Ok(Value::Array(text(&value).split(separator).map(Value::from).collect()))
        })
        .with_params(&["separator"]),
        FilterDef::value("join", 1, |_, value, _| Ok(join(&value, ","))),
        FilterDef::value("join", 2, |_, value, args| {
            let separator = string_arg("join", args, 0)?;
            Ok(join(&value, separator))
        })
        .with_params(&["separator"]),
    ]
}

fn string_filter(name: &'static str, f: fn(&str) -> String) -> FilterDef {
    FilterDef::value(name, 1, move |_, value, _| match value {
        Value::Null => Ok(Value::Null),
        other => Ok(Value::from(f(&text(&other)))),
    })
}

/// The display text of a value; null is empty.
fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) | Value::Raw(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_arg(args: &[Value], index: usize) -> String {
    args.get(index).map(text).unwrap_or_default()
}

/// Capitalizes the first letter of every word. Words written entirely in
/// upper case are kept as acronyms.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, word) in s.split(' ').enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let is_acronym = word.chars().any(char::is_alphabetic)
            && word.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase);
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            if is_acronym {
                out.push_str(chars.as_str());
            } else {
                out.push_str(&chars.as_str().to_lowercase());
            }
        }
    }
    out
}

/// Produces a URL slug: transliterated to ASCII, lower case, spaces to
/// dashes, everything but alphanumerics and dashes dropped.
fn generate_slug(s: &str) -> String {
    let transliterated = deunicode(s);
    let mut slug: String = transliterated
        .trim()
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    slug
}

fn substring(s: &str, start: usize, len: Option<usize>) -> String {
    let chars = s.chars().skip(start);
    match len {
        Some(len) => chars.take(len).collect(),
        None => chars.collect(),
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

fn pad(name: &str, value: &Value, args: &[Value], side: Side) -> TemplateResult<Value> {
    let width = usize_arg(name, args, 0)?;
    let fill = match args.get(1) {
        Some(arg) => text(arg).chars().next().unwrap_or(' '),
        None => ' ',
    };
    let s = text(value);
    let current = s.width();
    if current >= width {
        return Ok(Value::from(s));
    }
    let padding: String = std::iter::repeat(fill).take(width - current).collect();
    Ok(Value::from(match side {
        Side::Left => format!("{}{}", padding, s),
        Side::Right => format!("{}{}", s, padding),
    }))
}

fn join(value: &Value, separator: &str) -> Value {
    match value {
        Value::Array(items) => Value::from(items.iter().map(text).collect::<Vec<_>>().join(separator)),
        Value::Null => Value::Null,
        other => Value::from(text(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("war and peace"), "War And Peace");
        assert_eq!(title_case("the NASA files"), "The NASA Files");
        assert_eq!(title_case("hELLO"), "Hello");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("Café & Crème"), "cafe-creme");
        assert_eq!(generate_slug("  spaced   out  "), "spaced-out");
    }

    #[test]
    fn test_substring_counts_chars() {
        assert_eq!(substring("héllo", 1, Some(3)), "éll");
        assert_eq!(substring("héllo", 3, None), "lo");
        assert_eq!(substring("abc", 10, None), "");
    }

    #[test]
    fn test_pad_uses_display_width() {
        let padded = pad("padLeft", &Value::from("日本"), &[Value::from(6)], Side::Left).unwrap();
        assert_eq!(padded, Value::from("  日本"));
        let padded = pad("padRight", &Value::from(42), &[Value::from(5), Value::from("0")], Side::Right).unwrap();
        assert_eq!(padded, Value::from("42000"));
        let unchanged = pad("padLeft", &Value::from("hello"), &[Value::from(3)], Side::Left).unwrap();
        assert_eq!(unchanged, Value::from("hello"));
    }

    #[test]
    fn test_json_is_raw() {
        let def = filters().into_iter().find(|f| f.name() == "json").unwrap();
        let super::super::FilterInvoke::Value(json) = def.invoke() else {
            panic!("json is a value filter");
        };
        let ctx = crate::TemplateContext::new(std::sync::Arc::new(crate::vfs::MemoryVirtualFiles::new()));
        let value: Value = [("a", Value::from(vec![1, 2]))].into_iter().collect();
        assert_eq!(json(&ctx, value, &[]).unwrap(), Value::Raw(r#"{"a":[1,2]}"#.into()));
    }

    #[test]
    fn test_join() {
        let items = Value::from(vec!["a", "b", "c"]);
        assert_eq!(join(&items, ","), Value::from("a,b,c"));
        assert_eq!(join(&items, " / "), Value::from("a / b / c"));
        assert_eq!(join(&Value::Null, ","), Value::Null);
    }
}
