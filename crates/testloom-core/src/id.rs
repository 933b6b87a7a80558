//! Hierarchical test identifiers.
//!
//! An identifier is `<fileToken>::<suite>::…::<case>`. The file token is the
//! absolute source path with `%`, `/`, `\` and `:` percent-escaped, so it never
//! contains the separator and decodes back to the exact path.
//!
//! Every comparison between identifiers (and between an identifier and a
//! path) is case-insensitive.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Separator between identifier segments.
pub const SEPARATOR: &str = "::";

/// A separator-joined identifier naming one tree node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(String);

/// An identifier split into its file token and name segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedId {
    pub file_token: String,
    /// Suite and case names, outermost first.
    pub segments: Vec<String>,
}

impl TestId {
    /// Joins `file_token` and `names` with the separator.
    pub fn encode<S: AsRef<str>>(names: &[S], file_token: &str) -> Self {
        let mut id = String::from(file_token);
        for name in names {
            id.push_str(SEPARATOR);
            id.push_str(name.as_ref());
        }
        Self(id)
    }

    /// Identifier of the file-level node for `path`.
    pub fn for_file(path: &Path) -> Self {
        Self(file_token(path))
    }

    /// Wraps an already-encoded identifier string.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Splits on the separator: the first segment is the file token.
    pub fn decode(&self) -> DecodedId {
        let mut parts = self.0.split(SEPARATOR);
        let file_token = parts.next().unwrap_or_default().to_string();
        DecodedId {
            file_token,
            segments: parts.map(str::to_string).collect(),
        }
    }

    /// Name segments joined by a single space, without the file token.
    ///
    /// Empty for a file-level identifier; callers treat that as "no filter".
    pub fn to_name_pattern(&self) -> String {
        self.decode().segments.join(" ")
    }

    /// Identifier of a direct child named `name`.
    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}{}{}", self.0, SEPARATOR, name))
    }

    /// Identifier of the parent node, derived by prefix-splitting.
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once(SEPARATOR)
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// The file token (first segment).
    pub fn file_token(&self) -> &str {
        self.0.split(SEPARATOR).next().unwrap_or_default()
    }

    /// The source path the file token decodes to.
    pub fn file_path(&self) -> Option<PathBuf> {
        path_from_token(self.file_token())
    }

    /// The innermost name, or `None` for a file-level identifier.
    pub fn name(&self) -> Option<&str> {
        self.0.split_once(SEPARATOR)?;
        self.0.rsplit(SEPARATOR).next()
    }

    /// Number of name segments below the file token.
    pub fn depth(&self) -> usize {
        self.0.matches(SEPARATOR).count()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive equality.
    pub fn matches(&self, other: &TestId) -> bool {
        self.key() == other.key()
    }

    /// Case-insensitive: `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &TestId) -> bool {
        is_prefix_key(&self.key(), &other.key())
    }

    /// Case-folded form used as a lookup key.
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for TestId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// `prefix` and `full` must already be case-folded.
pub(crate) fn is_prefix_key(prefix: &str, full: &str) -> bool {
    match full.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// Encodes an absolute path into a file token.
pub fn file_token(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut token = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => token.push_str("%25"),
            '/' => token.push_str("%2F"),
            '\\' => token.push_str("%5C"),
            ':' => token.push_str("%3A"),
            other => token.push(other),
        }
    }
    token
}

/// Decodes a file token back into a path. `None` on a malformed escape.
pub fn path_from_token(token: &str) -> Option<PathBuf> {
    let mut path = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            path.push(ch);
            continue;
        }
        let hex: String = chars.by_ref().take(2).collect();
        let decoded = match hex.to_ascii_uppercase().as_str() {
            "25" => '%',
            "2F" => '/',
            "5C" => '\\',
            "3A" => ':',
            _ => return None,
        };
        path.push(decoded);
    }
    Some(PathBuf::from(path))
}

/// Case-insensitive comparison of a file token against a filesystem path.
pub fn token_matches_path(token: &str, path: &Path) -> bool {
    token.to_lowercase() == file_token(path).to_lowercase()
}
