//! Extraction errors

use thiserror::Error;

/// Reasons a document page yields no usable text
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),
    #[error("No content container matched (tried {0:?})")]
    NoContainer(Vec<String>),
    #[error("Section start marker '{0}' not found")]
    SectionNotFound(String),
    #[error("Section end marker '{0}' not found")]
    SectionEndNotFound(String),
    #[error("Container held no paragraph text")]
    Empty,
}
