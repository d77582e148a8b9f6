//! Name validation error types

use thiserror::Error;

/// Errors raised by name validators and processors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The validator itself is misconfigured (empty or bad pattern, bad replacement)
    #[error("Invalid name pattern: {0}")]
    InvalidPattern(String),

    /// Strict processing met a character it may not replace
    #[error("Invalid character {rune:?} in name {name:?}")]
    InvalidRune { name: String, rune: char },
}

/// Result type for name operations
pub type NameResult<T> = Result<T, NameError>;
