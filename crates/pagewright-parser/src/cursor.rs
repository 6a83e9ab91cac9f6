//! Byte-position cursor over expression text.

use crate::error::{ParseError, ParseResult};

pub(crate) struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.input[start..end]
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    pub(crate) fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Moves forward `n` bytes. `n` must land on a char boundary.
    pub(crate) fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    pub(crate) fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Consumes `c` if it is next, ignoring leading whitespace.
    pub(crate) fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, c: char, expected: &'static str) -> ParseResult<()> {
        self.skip_ws();
        match self.peek() {
            Some(found) if found == c => {
                self.bump();
                Ok(())
            }
            Some(found) => Err(self.unexpected(found, expected)),
            None => Err(ParseError::UnexpectedEnd { expected }),
        }
    }

    pub(crate) fn unexpected(&self, found: char, expected: &'static str) -> ParseError {
        ParseError::UnexpectedChar {
            found,
            position: self.pos,
            expected,
        }
    }

    /// Reads an identifier: `[A-Za-z_$][A-Za-z0-9_$]*`.
    pub(crate) fn ident(&mut self) -> Option<&'a str> {
        let start = self.pos;
        match self.peek() {
            Some(c) if is_ident_start(c) => {
                self.bump();
            }
            _ => return None,
        }
        while matches!(self.peek(), Some(c) if is_ident_char(c)) {
            self.bump();
        }
        Some(self.slice(start, self.pos))
    }
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Finds the byte offset of the first `needle` outside of string literals
/// and `{ ... }` groups.
pub(crate) fn find_unquoted(input: &str, needle: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' || b == b'`' {
                    quote = Some(b);
                } else if depth == 0 && bytes[i..].starts_with(needle.as_bytes()) {
                    return Some(i);
                } else if b == b'{' {
                    depth += 1;
                } else if b == b'}' {
                    depth = depth.saturating_sub(1);
                }
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_unquoted_skips_strings() {
        assert_eq!(find_unquoted("a | b", "|"), Some(2));
        assert_eq!(find_unquoted("'a|b' | c", "|"), Some(6));
        assert_eq!(find_unquoted("\"}}\" }}", "}}"), Some(5));
        assert_eq!(find_unquoted("'it\\'s' }}", "}}"), Some(8));
        assert_eq!(find_unquoted("'open", "|"), None);
        assert_eq!(find_unquoted("<b>{ it | upper }</b> | x", "|"), Some(22));
    }

    #[test]
    fn test_ident() {
        let mut c = Cursor::new("foo_1.bar");
        assert_eq!(c.ident(), Some("foo_1"));
        assert_eq!(c.peek(), Some('.'));
        assert_eq!(Cursor::new("1abc").ident(), None);
    }
}
