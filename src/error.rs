//! Error types for HTML to DOCX conversion.

use thiserror::Error;

/// Errors that can fail a conversion. No partial package is ever returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// The input could not be parsed as an editor HTML document.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A block element appeared where only inline content is allowed.
    #[error("structural error: block element not allowed at `{path}`")]
    Structural { path: String },

    /// Two merge regions of a table overlap.
    #[error("invalid table at row {row}, column {column}: {reason}")]
    InvalidTable {
        row: usize,
        column: usize,
        reason: String,
    },

    /// Package invariant violated while assembling the container.
    #[error("packaging error in `{part}`: {reason}")]
    Packaging { part: String, reason: String },

    /// An image referenced by the document was not supplied or is unusable.
    #[error("resource error for `{src}`: {reason}")]
    Resource { src: String, reason: String },
}

impl ConversionError {
    pub(crate) fn packaging(part: impl Into<String>, reason: impl Into<String>) -> Self {
        ConversionError::Packaging {
            part: part.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn resource(src: impl Into<String>, reason: impl Into<String>) -> Self {
        ConversionError::Resource {
            src: src.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable code, handy for transport layers.
    pub fn code(&self) -> &'static str {
        match self {
            ConversionError::MalformedInput(_) => "MALFORMED_INPUT",
            ConversionError::Structural { .. } => "STRUCTURAL",
            ConversionError::InvalidTable { .. } => "INVALID_TABLE",
            ConversionError::Packaging { .. } => "PACKAGING",
            ConversionError::Resource { .. } => "RESOURCE",
        }
    }
}

impl From<zip::result::ZipError> for ConversionError {
    fn from(err: zip::result::ZipError) -> Self {
        ConversionError::packaging("zip", err.to_string())
    }
}

impl From<std::io::Error> for ConversionError {
    fn from(err: std::io::Error) -> Self {
        ConversionError::packaging("zip", err.to_string())
    }
}

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConversionError>;
