//! Tag error types

use thiserror::Error;

use crate::name::NameError;
use crate::tags::TagSet;

/// Errors that can occur while parsing or cleaning tags
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TagError {
    /// A pair without `=`
    #[error("Bad tag: {0}")]
    BadPair(String),

    /// The same key appeared twice
    #[error("Duplicated tag: {0}")]
    Duplicate(String),

    /// A key or value contains characters OpenTSDB rejects
    ///
    /// Parsing continues past this error; `partial` holds every pair that
    /// was read.
    #[error("Invalid character in {value}")]
    InvalidCharacter { value: String, partial: TagSet },

    /// Cleaning removed every character of a key or value
    #[error("Cleaning value [{value}] for tag [{key}] resulted in an empty string")]
    EmptyAfterClean { key: String, value: String },

    /// The name processor failed
    #[error("Cleaning tag {key}: {source}")]
    Name { key: String, source: NameError },
}

impl TagError {
    /// Best-effort tags parsed before the error, when parsing could continue
    pub fn partial(&self) -> Option<&TagSet> {
        match self {
            TagError::InvalidCharacter { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// Result type for tag operations
pub type TagResult<T> = Result<T, TagError>;
