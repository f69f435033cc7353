//! Errors raised while parsing fundamental types from text.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid hex length: expected {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
