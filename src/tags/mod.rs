//! Tag Set Algebra
//!
//! [`TagSet`] plus the parsing helpers built on it. All operations are pure
//! except [`TagSet::clean`], which rewrites the set in place only when every
//! key and value cleans successfully.

mod error;
mod tagset;

pub use error::{TagError, TagResult};
pub use tagset::{parse_tags, replace_tags, TagSet};
