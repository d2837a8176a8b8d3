use skein_ql::error::{FilterError, ParseError};
use thiserror::Error;

use crate::dialect::Dialect;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    /// The selected dialect cannot express a requested filter or extraction. Raised before any SQL
    /// is produced, so the caller can report it without side effects.
    #[error("{dialect} does not support {feature}")]
    UnsupportedCapability { dialect: Dialect, feature: String },
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),
    #[error("Invalid JSON path: {0}")]
    Parse(#[from] ParseError),
}

impl CompileError {
    pub fn unsupported(dialect: Dialect, feature: impl Into<String>) -> Self {
        CompileError::UnsupportedCapability { dialect, feature: feature.into() }
    }
}
