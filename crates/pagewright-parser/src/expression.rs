//! Filter expression syntax tree and parser.
//!
//! The grammar is deliberately small. It covers literals, binding paths,
//! array and object literals, filter calls, and `|` pipelines:
//!
//! ```text
//! pipeline   := expression ( '|' stage )*
//! stage      := ident ( '(' arguments? ')' | ':' text )?
//! expression := literal | array | object | call | path
//! call       := ident '(' arguments? ')'
//! path       := ident ( '.' ident | '[' expression ']' )*
//! literal    := number | string | 'true' | 'false' | 'null'
//! array      := '[' arguments? ']'
//! object     := '{' ( entry ( ',' entry )* )? '}'
//! entry      := ( ident | string ) ( ':' expression )?
//! ```
//!
//! Strings may use single, double or back quotes.

use crate::cursor::{find_unquoted, is_ident_char, is_ident_start, Cursor};
use crate::error::{ParseError, ParseResult};

/// A constant value written in the template.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A constant.
    Literal(Literal),
    /// A reference resolved through the scope at evaluation time.
    Binding(BindingPath),
    /// `[a, b, c]`
    Array(Vec<Expression>),
    /// `{ key: value }`, entries in source order.
    Object(Vec<(String, Expression)>),
    /// `name(args)`, resolved against the registered filters.
    Call(FilterCall),
}

impl Expression {
    /// Shorthand for a string literal expression.
    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    /// Returns `true` if the expression contains no bindings or calls.
    pub fn is_constant(&self) -> bool {
        match self {
            Expression::Literal(_) => true,
            Expression::Binding(_) | Expression::Call(_) => false,
            Expression::Array(items) => items.iter().all(Expression::is_constant),
            Expression::Object(entries) => entries.iter().all(|(_, e)| e.is_constant()),
        }
    }
}

/// A filter invocation: a pipeline stage or a call expression.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expression>,
}

impl FilterCall {
    pub fn new(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// A dotted/indexed access path such as `model.items[0].name`.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingPath {
    /// The path exactly as written.
    pub text: String,
    /// The leading identifier.
    pub head: String,
    /// Member and index steps after the head.
    pub accessors: Vec<Accessor>,
}

impl BindingPath {
    /// The path text following the head identifier (e.g. `.items[0]`).
    pub fn rest(&self) -> &str {
        &self.text[self.head.len()..]
    }

    /// Returns `true` for a bare identifier with no member or index steps.
    pub fn is_simple(&self) -> bool {
        self.accessors.is_empty()
    }
}

/// One step of a binding path.
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    /// `.name`
    Member(String),
    /// `[expression]`
    Index(Expression),
}

/// An initial expression followed by its filter stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub initial: Expression,
    pub filters: Vec<FilterCall>,
}

/// Parses a complete expression. Trailing input is an error.
pub fn parse_expression(text: &str) -> ParseResult<Expression> {
    let mut cursor = Cursor::new(text);
    let expr = parse_expr(&mut cursor)?;
    expect_end(&mut cursor)?;
    Ok(expr)
}

/// Parses the contents of a `{{ ... }}` span into a [`Pipeline`].
///
/// # Example
///
/// ```rust
/// use pagewright_parser::{parse_pipeline, Expression, Literal};
///
/// let p = parse_pipeline("1 | add(2) | assignTo: total").unwrap();
/// assert_eq!(p.initial, Expression::Literal(Literal::Int(1)));
/// assert_eq!(p.filters[0].name, "add");
/// assert_eq!(p.filters[1].args, vec![Expression::string("total")]);
/// ```
pub fn parse_pipeline(text: &str) -> ParseResult<Pipeline> {
    let mut cursor = Cursor::new(text);
    let initial = parse_expr(&mut cursor)?;
    let mut filters = Vec::new();

    loop {
        cursor.skip_ws();
        match cursor.peek() {
            None => break,
            Some('|') => {
                cursor.bump();
            }
            Some(found) => return Err(cursor.unexpected(found, "'|' or end of expression")),
        }
        cursor.skip_ws();
        let name = match cursor.ident() {
            Some(name) => name.to_string(),
            None => {
                return Err(match cursor.peek() {
                    Some(found) => cursor.unexpected(found, "filter name"),
                    None => ParseError::UnexpectedEnd {
                        expected: "filter name",
                    },
                })
            }
        };
        cursor.skip_ws();
        let args = match cursor.peek() {
            Some('(') => {
                cursor.bump();
                parse_list(&mut cursor, ')')?
            }
            Some(':') => {
                cursor.bump();
                parse_colon_argument(&mut cursor)
            }
            _ => Vec::new(),
        };
        filters.push(FilterCall { name, args });
    }

    Ok(Pipeline { initial, filters })
}

/// Parses the accessor chain following a binding head, e.g. `.a[0].b`.
///
/// This is used when compiling the remainder of a binding expression against
/// a runtime value.
pub fn parse_accessors(rest: &str) -> ParseResult<Vec<Accessor>> {
    let mut cursor = Cursor::new(rest);
    let accessors = parse_accessor_chain(&mut cursor)?;
    if let Some(found) = cursor.peek() {
        return Err(cursor.unexpected(found, "'.' or '['"));
    }
    Ok(accessors)
}

/// Splits a binding expression at its first delimiter (`.`, `[` or space).
///
/// ```rust
/// use pagewright_parser::split_binding;
///
/// assert_eq!(split_binding("model.items[0]"), ("model", ".items[0]"));
/// assert_eq!(split_binding("rows[2]"), ("rows", "[2]"));
/// assert_eq!(split_binding("name"), ("name", ""));
/// ```
pub fn split_binding(text: &str) -> (&str, &str) {
    match text.find(['.', '[', ' ']) {
        Some(i) => (&text[..i], &text[i..]),
        None => (text, ""),
    }
}

fn expect_end(cursor: &mut Cursor<'_>) -> ParseResult<()> {
    cursor.skip_ws();
    match cursor.peek() {
        None => Ok(()),
        Some(found) => Err(cursor.unexpected(found, "end of expression")),
    }
}

fn parse_expr(cursor: &mut Cursor<'_>) -> ParseResult<Expression> {
    cursor.skip_ws();
    let Some(c) = cursor.peek() else {
        return Err(ParseError::UnexpectedEnd {
            expected: "expression",
        });
    };

    match c {
        '\'' | '"' | '`' => Ok(Expression::Literal(Literal::String(parse_string(cursor)?))),
        '0'..='9' => parse_number(cursor),
        '-' | '.' if matches!(cursor.peek_nth(1), Some('0'..='9')) => parse_number(cursor),
        '[' => {
            cursor.bump();
            Ok(Expression::Array(parse_list(cursor, ']')?))
        }
        '{' => {
            cursor.bump();
            parse_object(cursor)
        }
        c if is_ident_start(c) => parse_identifier_expr(cursor),
        found => Err(cursor.unexpected(found, "expression")),
    }
}

fn parse_identifier_expr(cursor: &mut Cursor<'_>) -> ParseResult<Expression> {
    let start = cursor.pos();
    let Some(head) = cursor.ident() else {
        return Err(ParseError::UnexpectedEnd {
            expected: "identifier",
        });
    };

    match cursor.peek() {
        Some('(') => {
            cursor.bump();
            let args = parse_list(cursor, ')')?;
            return Ok(Expression::Call(FilterCall::new(head, args)));
        }
        Some('.') | Some('[') => {}
        _ => match head {
            "true" => return Ok(Expression::Literal(Literal::Bool(true))),
            "false" => return Ok(Expression::Literal(Literal::Bool(false))),
            "null" => return Ok(Expression::Literal(Literal::Null)),
            _ => {}
        },
    }

    let accessors = parse_accessor_chain(cursor)?;
    Ok(Expression::Binding(BindingPath {
        text: cursor.slice(start, cursor.pos()).to_string(),
        head: head.to_string(),
        accessors,
    }))
}

fn parse_accessor_chain(cursor: &mut Cursor<'_>) -> ParseResult<Vec<Accessor>> {
    let mut accessors = Vec::new();
    loop {
        match cursor.peek() {
            Some('.') => {
                cursor.bump();
                match cursor.ident() {
                    Some(member) => accessors.push(Accessor::Member(member.to_string())),
                    None => {
                        return Err(match cursor.peek() {
                            Some(found) => cursor.unexpected(found, "member name"),
                            None => ParseError::UnexpectedEnd {
                                expected: "member name",
                            },
                        })
                    }
                }
            }
            Some('[') => {
                cursor.bump();
                let index = parse_expr(cursor)?;
                cursor.expect(']', "']'")?;
                accessors.push(Accessor::Index(index));
            }
            _ => return Ok(accessors),
        }
    }
}

fn parse_list(cursor: &mut Cursor<'_>, close: char) -> ParseResult<Vec<Expression>> {
    let mut items = Vec::new();
    if cursor.eat(close) {
        return Ok(items);
    }
    loop {
        items.push(parse_expr(cursor)?);
        if cursor.eat(',') {
            continue;
        }
        cursor.expect(close, if close == ')' { "',' or ')'" } else { "',' or ']'" })?;
        return Ok(items);
    }
}

fn parse_object(cursor: &mut Cursor<'_>) -> ParseResult<Expression> {
    let mut entries = Vec::new();
    if cursor.eat('}') {
        return Ok(Expression::Object(entries));
    }
    loop {
        cursor.skip_ws();
        let (key, shorthand) = match cursor.peek() {
            Some('\'' | '"' | '`') => (parse_string(cursor)?, false),
            Some(c) if is_ident_start(c) => (cursor.ident().unwrap_or_default().to_string(), true),
            Some(found) => return Err(cursor.unexpected(found, "object key")),
            None => {
                return Err(ParseError::UnexpectedEnd {
                    expected: "object key",
                })
            }
        };

        let value = if cursor.eat(':') {
            parse_expr(cursor)?
        } else if shorthand {
            Expression::Binding(BindingPath {
                text: key.clone(),
                head: key.clone(),
                accessors: Vec::new(),
            })
        } else {
            return Err(match cursor.peek() {
                Some(found) => cursor.unexpected(found, "':'"),
                None => ParseError::UnexpectedEnd { expected: "':'" },
            });
        };
        entries.push((key, value));

        if cursor.eat(',') {
            continue;
        }
        cursor.expect('}', "',' or '}'")?;
        return Ok(Expression::Object(entries));
    }
}

fn parse_number(cursor: &mut Cursor<'_>) -> ParseResult<Expression> {
    let start = cursor.pos();
    let mut is_float = false;
    if cursor.peek() == Some('-') {
        cursor.bump();
    }
    while let Some(c) = cursor.peek() {
        match c {
            '0'..='9' | '_' => {}
            '.' if !is_float && matches!(cursor.peek_nth(1), Some('0'..='9')) => is_float = true,
            'e' | 'E' => {
                is_float = true;
                cursor.bump();
                if matches!(cursor.peek(), Some('+' | '-')) {
                    cursor.bump();
                }
                continue;
            }
            _ => break,
        }
        cursor.bump();
    }

    let text = cursor.slice(start, cursor.pos());
    if let Some(found) = cursor.peek().filter(|c| is_ident_char(*c)) {
        return Err(cursor.unexpected(found, "end of number"));
    }

    let digits = text.replace('_', "");
    let invalid = || ParseError::InvalidNumber {
        text: text.to_string(),
    };
    if is_float {
        digits
            .parse::<f64>()
            .map(|f| Expression::Literal(Literal::Float(f)))
            .map_err(|_| invalid())
    } else {
        match digits.parse::<i64>() {
            Ok(i) => Ok(Expression::Literal(Literal::Int(i))),
            Err(_) => digits
                .parse::<f64>()
                .map(|f| Expression::Literal(Literal::Float(f)))
                .map_err(|_| invalid()),
        }
    }
}

fn parse_string(cursor: &mut Cursor<'_>) -> ParseResult<String> {
    let start = cursor.pos();
    let quote = cursor.bump().unwrap_or('\'');
    let mut out = String::new();
    loop {
        match cursor.bump() {
            None => return Err(ParseError::UnterminatedString { position: start }),
            Some(c) if c == quote => return Ok(out),
            Some('\\') => match cursor.bump() {
                None => return Err(ParseError::UnterminatedString { position: start }),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('u') => {
                    let hex: String = (0..4).filter_map(|_| cursor.bump()).collect();
                    match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        Some(ch) => out.push(ch),
                        None => {
                            out.push_str("\\u");
                            out.push_str(&hex);
                        }
                    }
                }
                Some(other) => out.push(other),
            },
            Some(c) => out.push(c),
        }
    }
}

/// Reads the remainder of a colon-form stage as one string argument.
///
/// A single quoted string is unquoted; anything else is passed through as
/// trimmed text.
fn parse_colon_argument(cursor: &mut Cursor<'_>) -> Vec<Expression> {
    let rest = cursor.rest();
    let end = find_unquoted(rest, "|").unwrap_or(rest.len());
    let raw = rest[..end].trim();
    cursor.advance(end);

    if raw.is_empty() {
        return Vec::new();
    }
    match parse_expression(raw) {
        Ok(Expression::Literal(Literal::String(s))) => vec![Expression::string(s)],
        _ => vec![Expression::string(raw)],
    }
}
