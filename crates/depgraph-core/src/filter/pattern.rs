//! `group:artifact` glob patterns.
//!
//! `*` matches any run of characters (including none), `?` matches exactly
//! one character. Everything else is literal. Matching is case-sensitive and
//! covers the whole string.

use regex::Regex;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern '{0}' must have the form group:artifact")]
    MissingSeparator(String),
    #[error("pattern '{0}' has an empty group or artifact part")]
    EmptyPart(String),
    #[error("pattern '{pattern}' could not be compiled: {reason}")]
    Compile { pattern: String, reason: String },
}

/// A compiled `group:artifact` glob.
#[derive(Debug, Clone)]
pub struct ArtifactPattern {
    raw: String,
    group: Regex,
    artifact: Regex,
}

impl ArtifactPattern {
    /// Compile `pattern`. Only the first `:` separates the two halves.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when the colon is missing or a half is empty.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let Some((group, artifact)) = pattern.split_once(':') else {
            return Err(PatternError::MissingSeparator(pattern.to_string()));
        };
        if group.is_empty() || artifact.is_empty() {
            return Err(PatternError::EmptyPart(pattern.to_string()));
        }

        Ok(Self {
            raw: pattern.to_string(),
            group: compile_glob(pattern, group)?,
            artifact: compile_glob(pattern, artifact)?,
        })
    }

    /// True iff both halves match their glob.
    #[must_use]
    pub fn matches(&self, group: &str, artifact: &str) -> bool {
        self.group.is_match(group) && self.artifact.is_match(artifact)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for ArtifactPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for ArtifactPattern {}

impl fmt::Display for ArtifactPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ArtifactPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn compile_glob(pattern: &str, glob: &str) -> Result<Regex, PatternError> {
    let mut source = String::with_capacity(glob.len() + 8);
    source.push_str(r"(?s)\A");
    let mut literal = String::new();
    for ch in glob.chars() {
        match ch {
            '*' | '?' => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str(if ch == '*' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    source.push_str(&regex::escape(&literal));
    source.push_str(r"\z");

    Regex::new(&source).map_err(|err| PatternError::Compile {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })
}
