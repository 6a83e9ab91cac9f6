//! Error types for expression parsing.

use thiserror::Error;

/// Errors produced while parsing a filter expression.
///
/// Positions are byte offsets into the expression text that was handed to the
/// parser (not into the enclosing page).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A character that cannot start or continue the current construct.
    #[error("unexpected character '{found}' at {position}, expected {expected}")]
    UnexpectedChar {
        found: char,
        position: usize,
        expected: &'static str,
    },

    /// Input ended in the middle of a construct.
    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    /// A numeric literal that does not fit the supported number types.
    #[error("invalid number literal '{text}'")]
    InvalidNumber { text: String },

    /// A string literal without its closing quote.
    #[error("unterminated string literal starting at {position}")]
    UnterminatedString { position: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;
