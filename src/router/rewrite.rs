//! Regex based path rewrites and redirects, applied before route lookup.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use regex::Regex;

/// One `regex → replacement` rule. The replacement may use `$1`, `${name}`
/// capture references.
pub struct Rewrite {
    regex: Regex,
    replacement: String,
    matched: AtomicU64,
}

impl fmt::Debug for Rewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rewrite")
            .field("regex", &self.regex.as_str())
            .field("replacement", &self.replacement)
            .field("matched", &self.matched())
            .finish()
    }
}

impl Rewrite {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            replacement: replacement.to_string(),
            matched: AtomicU64::new(0),
        })
    }

    /// Rewrite `path` in place if the rule matches.
    pub fn apply(&self, path: &mut String) -> bool {
        if !self.regex.is_match(path) {
            return false;
        }
        let rewritten = self
            .regex
            .replace(path, self.replacement.as_str())
            .into_owned();
        debug!("rewrite {} -> {}", path, rewritten);
        *path = rewritten;
        self.matched.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
    pub fn replacement(&self) -> &str {
        &self.replacement
    }
    /// How many paths this rule changed so far.
    pub fn matched(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }
}

/// Ordered rule list.
#[derive(Debug, Default)]
pub struct Rewrites(Vec<Rewrite>);

impl Rewrites {
    pub fn new() -> Self {
        Self(vec![])
    }
    pub fn add(&mut self, pattern: &str, replacement: &str) -> Result<(), regex::Error> {
        self.0.push(Rewrite::new(pattern, replacement)?);
        Ok(())
    }
    /// Run `path` through every rule in order. Returns the number of rules
    /// that changed it.
    pub fn apply(&self, path: &mut String) -> usize {
        self.0.iter().filter(|rule| rule.apply(path)).count()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Rewrite> {
        self.0.iter()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
