//! Stream transformers.
//!
//! A [`StreamTransformer`] rewrites a buffered chunk of rendered output. They
//! are used at three levels:
//!
//! - page transformers run over the output of a single page (not its layout)
//! - output transformers run over the complete render
//! - filter transformers run over the buffered output of a block filter when
//!   they are named as a later pipeline stage, e.g.
//!   `{{ 'nav' | partial | htmlencode }}`
//!
//! Closures with the signature `Fn(Vec<u8>) -> TemplateResult<Vec<u8>>` are
//! transformers:
//!
//! ```rust
//! use pagewright::transform::StreamTransformer;
//! use pagewright::TemplateResult;
//!
//! let shout = |input: Vec<u8>| -> TemplateResult<Vec<u8>> { Ok(input.to_ascii_uppercase()) };
//! # let _: &dyn StreamTransformer = &shout;
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{TemplateError, TemplateResult};
use crate::format::escape_html;

#[async_trait]
pub trait StreamTransformer: Send + Sync {
    async fn transform(&self, input: Vec<u8>) -> TemplateResult<Vec<u8>>;
}

#[async_trait]
impl<F> StreamTransformer for F
where
    F: Fn(Vec<u8>) -> TemplateResult<Vec<u8>> + Send + Sync,
{
    async fn transform(&self, input: Vec<u8>) -> TemplateResult<Vec<u8>> {
        (self)(input)
    }
}

/// Runs `input` through each transformer in order.
pub async fn apply_transformers(
    mut input: Vec<u8>,
    transformers: &[Arc<dyn StreamTransformer>],
) -> TemplateResult<Vec<u8>> {
    for transformer in transformers {
        input = transformer.transform(input).await?;
    }
    Ok(input)
}

/// HTML-encodes the buffered output.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlEncodeTransformer;

#[async_trait]
impl StreamTransformer for HtmlEncodeTransformer {
    async fn transform(&self, input: Vec<u8>) -> TemplateResult<Vec<u8>> {
        let text = String::from_utf8(input).map_err(|e| TemplateError::Transform(e.to_string()))?;
        Ok(escape_html(&text).into_bytes())
    }
}

/// Trims leading and trailing whitespace from the buffered output.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimTransformer;

#[async_trait]
impl StreamTransformer for TrimTransformer {
    async fn transform(&self, input: Vec<u8>) -> TemplateResult<Vec<u8>> {
        Ok(input.trim_ascii().to_vec())
    }
}
