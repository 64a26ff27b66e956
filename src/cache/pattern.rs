//! Pattern Matcher Module
//!
//! Key match specifications for bulk invalidation without tags.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Key Pattern ==
/// A match specification against the literal key string.
///
/// Serialized as `{"type": "prefix", "pattern": "report-"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "pattern", rename_all = "lowercase")]
pub enum KeyPattern {
    /// `*` matches any sequence, `?` any single character; anchored to the full key
    Glob(String),
    /// Regular expression, anchored only if the expression says so
    Regex(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl KeyPattern {
    pub fn glob(pattern: impl Into<String>) -> Self {
        KeyPattern::Glob(pattern.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        KeyPattern::Regex(pattern.into())
    }

    pub fn prefix(pattern: impl Into<String>) -> Self {
        KeyPattern::Prefix(pattern.into())
    }

    pub fn suffix(pattern: impl Into<String>) -> Self {
        KeyPattern::Suffix(pattern.into())
    }

    pub fn contains(pattern: impl Into<String>) -> Self {
        KeyPattern::Contains(pattern.into())
    }

    /// Compiles the pattern into a reusable matcher.
    pub fn compile(&self) -> Result<KeyMatcher> {
        let matcher = match self {
            KeyPattern::Glob(glob) => KeyMatcher::Regex(build_regex(glob, &glob_to_regex(glob))?),
            KeyPattern::Regex(expr) => KeyMatcher::Regex(build_regex(expr, expr)?),
            KeyPattern::Prefix(p) => KeyMatcher::Prefix(p.clone()),
            KeyPattern::Suffix(p) => KeyMatcher::Suffix(p.clone()),
            KeyPattern::Contains(p) => KeyMatcher::Contains(p.clone()),
        };
        Ok(matcher)
    }
}

// == Key Matcher ==
/// A compiled `KeyPattern`.
#[derive(Debug, Clone)]
pub enum KeyMatcher {
    Regex(Regex),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl KeyMatcher {
    pub fn is_match(&self, key: &str) -> bool {
        match self {
            KeyMatcher::Regex(re) => re.is_match(key),
            KeyMatcher::Prefix(p) => key.starts_with(p.as_str()),
            KeyMatcher::Suffix(p) => key.ends_with(p.as_str()),
            KeyMatcher::Contains(p) => key.contains(p.as_str()),
        }
    }
}

fn build_regex(original: &str, expr: &str) -> Result<Regex> {
    Regex::new(expr).map_err(|source| CacheError::InvalidPattern {
        pattern: original.to_string(),
        source,
    })
}

/// Translates a glob into an anchored regex; everything but `*` and `?`
/// is literal.
fn glob_to_regex(glob: &str) -> String {
    let mut expr = String::with_capacity(glob.len() + 8);
    expr.push_str("(?s)^");
    let mut buf = [0u8; 4];
    for ch in glob.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    expr.push('$');
    expr
}
