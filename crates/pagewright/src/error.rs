//! Error types for page loading and rendering.
//!
//! [`TemplateError`] is the single error type returned by the engine. Errors
//! raised while evaluating an expression are wrapped with the filter name
//! ([`TemplateError::Filter`]) before being offered to the page format's
//! exception hook, so the variant tells callers where a failure happened
//! and the source chain tells them why.

use pagewright_parser::ParseError;
use thiserror::Error;

/// Error type for all engine operations.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// An object was used before its `init()` completed.
    #[error("{0} used before init()")]
    NotInitialized(&'static str),

    /// A page requested by path does not exist in any registered format.
    #[error("page not found: {path}")]
    PageNotFound { path: String },

    /// No registered page format handles the file's extension.
    #[error("no page format registered for '{path}'")]
    NoPageFormat { path: String },

    /// A pipeline stage names a filter that is not registered with a
    /// matching arity.
    #[error("filter '{name}' not found at position {position}{}", did_you_mean(.suggestions))]
    FilterNotFound {
        name: String,
        position: usize,
        suggestions: Vec<String>,
    },

    /// A stage after a block filter is neither a block filter nor a
    /// registered filter transformer.
    #[error("filter transformer '{name}' not found")]
    FilterTransformerNotFound { name: String },

    /// The remainder of a binding expression cannot be applied to the
    /// runtime value it resolved to.
    #[error("cannot bind '{member}' in '{expression}': {message}")]
    Binding {
        expression: String,
        member: String,
        message: String,
    },

    /// A filter invocation failed.
    #[error("filter '{name}' failed: {source}")]
    Filter {
        name: String,
        #[source]
        source: Box<TemplateError>,
    },

    /// A filter received an argument it cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not available in this context.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Partials nested deeper than the configured limit.
    #[error("partial '{name}' exceeded the maximum nesting depth of {depth}")]
    RecursivePartial { name: String, depth: usize },

    /// A stream transformer failed.
    #[error("transform failed: {0}")]
    Transform(String),

    /// The render was cancelled before output began.
    #[error("render cancelled")]
    Cancelled,

    /// An expression could not be parsed.
    #[error("cannot parse '{text}': {source}")]
    Parse {
        text: String,
        #[source]
        source: ParseError,
    },

    /// I/O error from a virtual file source or output stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Page content or rendered output was not valid UTF-8.
    #[error("invalid UTF-8 in '{path}'")]
    Utf8 {
        path: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Value conversion failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for engine operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

impl TemplateError {
    /// Creates an [`TemplateError::InvalidArgument`] error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        TemplateError::InvalidArgument(message.into())
    }

    /// Wraps `source` with the name of the filter that raised it.
    pub fn filter(name: impl Into<String>, source: TemplateError) -> Self {
        TemplateError::Filter {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Returns `true` if this error, or any error it wraps, is
    /// [`TemplateError::NotSupported`].
    pub fn is_not_supported(&self) -> bool {
        match self {
            TemplateError::NotSupported(_) => true,
            TemplateError::Filter { source, .. } => source.is_not_supported(),
            _ => false,
        }
    }

    /// Returns `true` for errors that a page format may replace with a
    /// fallback value.
    ///
    /// Only failures raised while evaluating a value qualify: filter and
    /// binding errors. Lookup failures of the pipeline itself
    /// (missing filters or transformers) and not-supported errors always
    /// propagate.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TemplateError::Filter { .. } | TemplateError::Binding { .. }
        ) && !self.is_not_supported()
    }
}

fn did_you_mean(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}

impl From<serde_json::Error> for TemplateError {
    fn from(err: serde_json::Error) -> Self {
        TemplateError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for TemplateError {
    fn from(err: serde_yaml::Error) -> Self {
        TemplateError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_not_found_message_lists_suggestions() {
        let err = TemplateError::FilterNotFound {
            name: "uper".into(),
            position: 1,
            suggestions: vec!["upper".into()],
        };
        assert_eq!(
            err.to_string(),
            "filter 'uper' not found at position 1 (did you mean: upper?)"
        );

        let err = TemplateError::FilterNotFound {
            name: "zzz".into(),
            position: 2,
            suggestions: vec![],
        };
        assert_eq!(err.to_string(), "filter 'zzz' not found at position 2");
    }

    #[test]
    fn test_not_supported_is_found_through_wrapping() {
        let err = TemplateError::filter("partial", TemplateError::NotSupported("x".into()));
        assert!(err.is_not_supported());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_recoverable_errors() {
        let err = TemplateError::filter("divide", TemplateError::invalid_argument("zero"));
        assert!(err.is_recoverable());
        assert!(!TemplateError::Cancelled.is_recoverable());
        assert!(!TemplateError::FilterTransformerNotFound { name: "x".into() }.is_recoverable());
    }
}
