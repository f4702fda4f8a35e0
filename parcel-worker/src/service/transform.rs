//! Content transformation
//!
//! The processing step applied to every input. It is a pure function of the
//! input bytes and runs on the blocking pool.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("input is not valid UTF-8 text: {0}")]
    InvalidText(#[from] std::str::Utf8Error),
}

pub trait Transform: Send + Sync {
    fn apply(&self, input: &[u8]) -> Result<Vec<u8>, TransformError>;
}

/// Header placed in front of every processed text
pub const PROCESSED_HEADER: &str = "Processed Content:\n--------------------\n";

/// Default transformation: prefixes text with [`PROCESSED_HEADER`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerTransform;

impl Transform for MarkerTransform {
    fn apply(&self, input: &[u8]) -> Result<Vec<u8>, TransformError> {
        let text = std::str::from_utf8(input)?;

        let mut output = String::with_capacity(PROCESSED_HEADER.len() + text.len());
        output.push_str(PROCESSED_HEADER);
        output.push_str(text);
        Ok(output.into_bytes())
    }
}
