//! Name/Character Validator
//!
//! Decides which characters are legal in metric names and tag keys/values,
//! and cleans names by replacing or stripping the rest.

mod error;
mod processor;

pub use error::{NameError, NameResult};
pub use processor::{
    clean, is_valid_name, must_replace, replace, CharRule, NameProcessor, Processor,
    RegexValidator, Validator,
};
