//! Hierarchical tags and the patterns trigger conditions match them with.
//!
//! A tag is a dot-separated path such as `rep.vt.malware`. Patterns use the
//! same syntax, where a `*` segment matches exactly one tag segment and a
//! trailing `**` matches one or more remaining segments.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::node::is_valid_path;

/// Normalize a tag: strip a leading `#`, trim and lowercase.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTag`] if a segment is empty or contains
/// characters outside `[a-z0-9_]`.
pub fn normalize_tag(raw: &str) -> Result<String, ValidationError> {
    let tag = raw.trim().trim_start_matches('#').to_lowercase();
    if is_valid_path(&tag, '.') {
        Ok(tag)
    } else {
        Err(ValidationError::InvalidTag(raw.to_string()))
    }
}

/// Split a normalized tag into the segments used in permission paths.
#[must_use]
pub fn tag_segments(tag: &str) -> Vec<String> {
    tag.split('.').map(str::to_string).collect()
}

/// A tag match pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagPattern(String);

impl TagPattern {
    /// Parse and normalize a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTagPattern`] if a segment is empty,
    /// has invalid characters, or `**` appears anywhere but last.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let text = raw.trim().trim_start_matches('#').to_lowercase();
        let invalid = || ValidationError::InvalidTagPattern(raw.to_string());
        if text.is_empty() {
            return Err(invalid());
        }
        let segments: Vec<&str> = text.split('.').collect();
        let last = segments.len() - 1;
        for (idx, segment) in segments.iter().enumerate() {
            let ok = match *segment {
                "*" => true,
                "**" => idx == last,
                other => is_valid_path(other, '.'),
            };
            if !ok {
                return Err(invalid());
            }
        }
        Ok(Self(text))
    }

    /// Whether the pattern contains no wildcard.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        !self.0.contains('*')
    }

    /// The normalized pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check a normalized tag against this pattern.
    #[must_use]
    pub fn matches(&self, tag: &str) -> bool {
        if self.is_exact() {
            return self.0 == tag;
        }
        let mut tag_parts = tag.split('.');
        for pattern_part in self.0.split('.') {
            if pattern_part == "**" {
                return tag_parts.next().is_some();
            }
            match tag_parts.next() {
                Some(part) if pattern_part == "*" || pattern_part == part => {}
                _ => return false,
            }
        }
        tag_parts.next().is_none()
    }
}

impl TryFrom<String> for TagPattern {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TagPattern> for String {
    fn from(value: TagPattern) -> Self {
        value.0
    }
}

impl std::fmt::Display for TagPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
