//! Exclusion globs compiled to regexes.
//!
//! `*` matches within one path segment, `**` across segments, `?` one
//! character. A pattern without `/` is tested against the entry name at any
//! depth; with `/` it is anchored at the archived root.

use dmp_core::{ArchiveError, Result};
use regex::Regex;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
struct CompiledExclusion {
    original: String,
    regex: Regex,
    /// Matched against the full relative path rather than the name
    anchored: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    exact: BTreeSet<String>,
    patterns: Vec<CompiledExclusion>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude one relative path exactly (the README, the lock marker)
    pub fn exact(mut self, relative_path: impl Into<String>) -> Self {
        self.exact.insert(normalize(&relative_path.into()));
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim().trim_start_matches("./").trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ArchiveError::Config(format!("empty exclusion pattern {:?}", pattern)));
        }
        let anchored = trimmed.contains('/');
        let regex = Regex::new(&glob_to_regex(trimmed.trim_start_matches('/')))
            .map_err(|e| ArchiveError::Config(format!("invalid exclusion {:?}: {}", pattern, e)))?;
        self.patterns.push(CompiledExclusion {
            original: pattern.to_string(),
            regex,
            anchored,
        });
        Ok(self)
    }

    pub fn patterns<'a>(mut self, patterns: impl IntoIterator<Item = &'a String>) -> Result<Self> {
        for p in patterns {
            self = self.pattern(p)?;
        }
        Ok(self)
    }

    /// `relative_path` is `/`-separated and relative to the archived root
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        if self.exact.contains(relative_path) {
            return true;
        }
        let name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        self.patterns.iter().any(|p| {
            if p.anchored {
                p.regex.is_match(relative_path)
            } else {
                p.regex.is_match(name)
            }
        })
    }

    /// Human readable list for logs and dry-run reports
    pub fn describe(&self) -> Vec<String> {
        self.exact
            .iter()
            .cloned()
            .chain(self.patterns.iter().map(|p| p.original.clone()))
            .collect()
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches("./").trim_matches('/').to_string()
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            _ => {
                if "\\^$.|+()[]{}".contains(c) {
                    out.push('\\');
                }
                out.push(c);
            }
        }
    }

    out.push('$');
    out
}
