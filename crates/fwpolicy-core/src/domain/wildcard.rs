//! Wildcard domain patterns
//!
//! `*` matches zero or more characters, every other character is literal.
//! Patterns are anchored at both ends, so `*.example.com` matches
//! `a.example.com` but neither `example.com` nor `a.example.com.evil`.

use crate::error::{Error, Result};
use regex::Regex;

/// Compiled wildcard pattern
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    pattern: String,
    regex: Regex,
}

impl WildcardPattern {
    /// Compile a glob into an anchored matcher
    ///
    /// # Errors
    /// Returns [`Error::InvalidPattern`] for empty patterns or patterns the
    /// regex engine rejects (e.g. exceeding its size limit).
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::invalid_pattern(pattern, "empty pattern"));
        }

        let regex = Regex::new(&glob_to_regex(pattern))
            .map_err(|e| Error::invalid_pattern(pattern, e.to_string()))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Source glob
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// True when the whole of `domain` matches
    pub fn matches(&self, domain: &str) -> bool {
        self.regex.is_match(domain)
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{body}$")
}
