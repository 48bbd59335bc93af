//! Errors raised at the edges of the conversion
//!
//! The lowering itself never fails; structural problems are reported as
//! diagnostics. These errors cover decoding the inputs and requesting output
//! from a score that produced nothing.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Invalid music tree: {0}")]
    InvalidTree(#[from] serde_json::Error),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("The score contains no music")]
    EmptyScore,
}

pub type Result<T> = std::result::Result<T, ConversionError>;
