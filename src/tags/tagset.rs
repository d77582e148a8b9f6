//! Tag sets
//!
//! A [`TagSet`] maps tag keys to tag values. Keys are unique and
//! case-sensitive; the set is kept sorted by key so its canonical form
//! (`{a=1,b=2}`) falls out of iteration order.

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use crate::name::{is_valid_name, NameProcessor, Processor};
use crate::tags::error::{TagError, TagResult};

/// Mapping from tag key to tag value
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder method: add a tag
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pairs in ascending key order
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Keep only the pairs for which `f` returns true
    pub fn retain(&mut self, mut f: impl FnMut(&str, &str) -> bool) {
        self.0.retain(|k, v| f(k, v));
    }

    /// Add or overwrite everything from `other`
    pub fn merge(&mut self, other: &TagSet) -> &mut Self {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
        self
    }

    /// Returns true if every pair of `other` is also in `self`
    pub fn subset(&self, other: &TagSet) -> bool {
        if other.len() > self.len() {
            return false;
        }
        other.0.iter().all(|(k, v)| self.0.get(k) == Some(v))
    }

    /// Returns true if no key present in both sets has differing values
    pub fn compatible(&self, other: &TagSet) -> bool {
        other
            .0
            .iter()
            .all(|(k, v)| self.0.get(k).map_or(true, |tv| tv == v))
    }

    /// Returns true if the sets share at least one pair and disagree on none
    ///
    /// Sets with no keys in common do not overlap.
    pub fn overlaps(&self, other: &TagSet) -> bool {
        let mut any_match = false;
        for (k, v) in &self.0 {
            match other.0.get(k) {
                None => continue,
                Some(ov) if ov != v => return false,
                Some(_) => any_match = true,
            }
        }
        any_match
    }

    /// Pairs present with the same value in both sets
    pub fn intersection(&self, other: &TagSet) -> TagSet {
        self.0
            .iter()
            .filter(|(k, v)| other.0.get(*k) == Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Canonical `k=v,k2=v2` form, keys ascending
    pub fn tags(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Every non-empty combination of pairs in canonical form
    ///
    /// Combinations are listed depth-first: for keys `a, b, c` the order is
    /// `a`, `a,b`, `a,b,c`, `a,c`, `b`, `b,c`, `c`.
    pub fn all_subsets(&self) -> Vec<String> {
        let pairs: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let mut out = Vec::with_capacity((1usize << pairs.len().min(20)) - 1);
        collect_subsets(&pairs, "", 0, &mut out);
        out
    }

    /// Whether the set can be submitted to OpenTSDB
    pub fn valid(&self) -> bool {
        if self.is_empty() {
            return true;
        }
        parse_tags(&self.tags()).is_ok()
    }

    /// Clean every key and value with the OpenTSDB name rules
    pub fn clean(&mut self) -> TagResult<()> {
        self.clean_with(&NameProcessor::opentsdb())
    }

    /// Clean every key and value with `processor`
    ///
    /// Fails if a key or value ends up empty. The set is left untouched on
    /// failure.
    pub fn clean_with<P: Processor>(&mut self, processor: &P) -> TagResult<()> {
        let mut cleaned = BTreeMap::new();
        for (k, v) in &self.0 {
            let kc = processor.format_name(k).map_err(|source| TagError::Name {
                key: k.clone(),
                source,
            })?;
            let vc = processor.format_name(v).map_err(|source| TagError::Name {
                key: k.clone(),
                source,
            })?;
            if kc.is_empty() || vc.is_empty() {
                return Err(TagError::EmptyAfterClean {
                    key: k.clone(),
                    value: v.clone(),
                });
            }
            cleaned.insert(kc, vc);
        }
        self.0 = cleaned;
        Ok(())
    }
}

fn collect_subsets(pairs: &[String], base: &str, start: usize, out: &mut Vec<String>) {
    for i in start..pairs.len() {
        let part = if base.is_empty() {
            pairs[i].clone()
        } else {
            format!("{},{}", base, pairs[i])
        };
        out.push(part.clone());
        collect_subsets(pairs, &part, i + 1, out);
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.tags())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Parse `k=v,k2=v2` pairs
///
/// A pair without `=` or a repeated key fails immediately. Invalid
/// characters do not stop parsing: the error carries the tags read so far
/// (see [`TagError::partial`]). Values may be `*` or `|`-separated
/// alternatives.
pub fn parse_tags(text: &str) -> TagResult<TagSet> {
    let mut ts = TagSet::new();
    let mut invalid: Option<String> = None;

    for pair in text.split(',') {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| TagError::BadPair(pair.to_string()))?;
        let key = key.trim();
        let value = value.trim();

        if !is_valid_name(key) {
            invalid = Some(key.to_string());
        }
        for alt in value.split('|') {
            if alt != "*" && !is_valid_name(alt) {
                invalid = Some(value.to_string());
            }
        }

        if ts.contains_key(key) {
            return Err(TagError::Duplicate(pair.to_string()));
        }
        ts.insert(key, value);
    }

    match invalid {
        Some(value) => Err(TagError::InvalidCharacter { value, partial: ts }),
        None => Ok(ts),
    }
}

/// Replace tag values inside every `{…}` group of `text`
///
/// For `"test.metric{host=*}"` and a group with `host=web01` the result is
/// `"test.metric{host=web01}"`. Groups that fail to parse are left as is.
pub fn replace_tags(text: &str, group: &TagSet) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = match after.find('}') {
            Some(0) | None => {
                out.push('{');
                rest = after;
                continue;
            }
            Some(close) => close,
        };

        let inner = &after[..close];
        match parse_tags(inner) {
            Ok(mut tags) => {
                for (k, v) in group.iter() {
                    if !v.is_empty() && tags.contains_key(k) {
                        tags.insert(k.clone(), v.clone());
                    }
                }
                out.push_str(&tags.to_string());
            }
            Err(_) => {
                out.push('{');
                out.push_str(inner);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}
