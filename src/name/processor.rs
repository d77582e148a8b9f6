//! Metric and tag name validation
//!
//! OpenTSDB accepts letters (including Unicode letters), digits, `-`, `_`,
//! `.` and `/` in metric names, tag keys and tag values. A [`NameProcessor`]
//! checks names against such a character rule and replaces or strips the
//! characters it rejects.

use regex::Regex;

use crate::name::error::{NameError, NameResult};

/// Decides whether a whole name is acceptable
pub trait Validator {
    fn is_valid(&self, name: &str) -> bool;
}

/// A validator that can also rewrite names into valid ones
pub trait Processor: Validator {
    /// Replace or strip invalid characters
    fn format_name(&self, name: &str) -> NameResult<String>;
}

/// Validator matching whole names against a regular expression
#[derive(Debug, Clone)]
pub struct RegexValidator {
    matcher: Regex,
}

impl RegexValidator {
    pub fn new(pattern: &str) -> NameResult<Self> {
        if pattern.is_empty() {
            return Err(NameError::InvalidPattern("pattern must not be empty".to_string()));
        }
        let matcher =
            Regex::new(pattern).map_err(|e| NameError::InvalidPattern(e.to_string()))?;
        Ok(Self { matcher })
    }
}

impl Validator for RegexValidator {
    fn is_valid(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }
}

/// Per-character acceptance rule
#[derive(Debug, Clone)]
pub enum CharRule {
    /// Letters, digits, `-`, `_`, `.` and `/`
    OpenTsdb,
    /// A single-character pattern such as `[a-z0-9_.]`
    Pattern(Regex),
}

impl CharRule {
    /// Build a rule from a character-class pattern
    pub fn pattern(class: &str) -> NameResult<Self> {
        if class.is_empty() {
            return Err(NameError::InvalidPattern("pattern must not be empty".to_string()));
        }
        let anchored = format!("^(?:{})$", class);
        let re = Regex::new(&anchored).map_err(|e| NameError::InvalidPattern(e.to_string()))?;
        Ok(CharRule::Pattern(re))
    }

    pub fn accepts(&self, c: char) -> bool {
        match self {
            CharRule::OpenTsdb => {
                c.is_alphabetic() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.' | '/')
            }
            CharRule::Pattern(re) => {
                let mut buf = [0u8; 4];
                re.is_match(c.encode_utf8(&mut buf))
            }
        }
    }
}

/// Checks names character by character and rewrites invalid ones
///
/// Invalid characters are replaced with `replacement` (empty by default,
/// which strips them). In strict mode any invalid character is an error.
#[derive(Debug, Clone)]
pub struct NameProcessor {
    rule: CharRule,
    replacement: String,
    strict: bool,
}

impl NameProcessor {
    /// OpenTSDB rule, stripping invalid characters
    pub fn opentsdb() -> Self {
        Self {
            rule: CharRule::OpenTsdb,
            replacement: String::new(),
            strict: false,
        }
    }

    /// OpenTSDB rule with a replacement string
    ///
    /// The replacement must itself be made of valid characters.
    pub fn new(replacement: &str) -> NameResult<Self> {
        Self::with_rule(CharRule::OpenTsdb, replacement)
    }

    pub fn with_rule(rule: CharRule, replacement: &str) -> NameResult<Self> {
        if let Some(bad) = replacement.chars().find(|c| !rule.accepts(*c)) {
            return Err(NameError::InvalidPattern(format!(
                "replacement {:?} contains invalid character {:?}",
                replacement, bad
            )));
        }
        Ok(Self {
            rule,
            replacement: replacement.to_string(),
            strict: false,
        })
    }

    /// Reject instead of replacing invalid characters
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }
}

impl Default for NameProcessor {
    fn default() -> Self {
        Self::opentsdb()
    }
}

impl Validator for NameProcessor {
    /// Non-empty and made only of accepted characters
    fn is_valid(&self, name: &str) -> bool {
        !name.is_empty() && name.chars().all(|c| self.rule.accepts(c))
    }
}

impl Processor for NameProcessor {
    fn format_name(&self, name: &str) -> NameResult<String> {
        let mut out = String::with_capacity(name.len());
        for c in name.chars() {
            if self.rule.accepts(c) {
                out.push(c);
            } else if self.strict {
                return Err(NameError::InvalidRune {
                    name: name.to_string(),
                    rune: c,
                });
            } else {
                out.push_str(&self.replacement);
            }
        }
        Ok(out)
    }
}

/// True if `s` is a valid OpenTSDB metric, tag key or tag value
pub fn is_valid_name(s: &str) -> bool {
    NameProcessor::opentsdb().is_valid(s)
}

/// Strip characters that are invalid for OpenTSDB names
pub fn clean(s: &str) -> NameResult<String> {
    replace(s, "")
}

/// Replace characters that are invalid for OpenTSDB names
pub fn replace(s: &str, replacement: &str) -> NameResult<String> {
    NameProcessor::new(replacement)?.format_name(s)
}

/// Like [`replace`], returning an empty string on error
pub fn must_replace(s: &str, replacement: &str) -> String {
    replace(s, replacement).unwrap_or_default()
}
