//! Tree path normalization and validation.
//!
//! A [`TreePath`] is a slash-separated path relative to the root of a commit's
//! tree. [`TreePath::check`] applies the rule set below and reports the first
//! rule broken instead of silently trimming the input into something else.
//!
//! Rules, in order:
//! 1. no control characters (including NUL);
//! 2. `.` segments and empty segments (`a//b`, leading or trailing `/`) are dropped;
//! 3. `..` removes the previous segment and may not climb above the root;
//! 4. no segment may be `.git` in any letter case;
//! 5. the result may not be empty.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::Error;

const RESERVED_SEGMENT: &str = ".git";

/// Why a path was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRejection {
    /// Nothing left after normalization.
    Empty,
    /// A `..` segment would leave the tree.
    EscapesRoot,
    /// A segment is reserved by git.
    ReservedSegment(String),
    /// The path contains a control character.
    ControlCharacter,
    /// A leading component is an existing file, so the path cannot be created.
    ParentIsFile(String),
    /// The path names a directory, not a file.
    IsDirectory,
}

impl fmt::Display for PathRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "path is empty"),
            Self::EscapesRoot => write!(f, "path escapes the repository root"),
            Self::ReservedSegment(seg) => write!(f, "'{seg}' is a reserved name"),
            Self::ControlCharacter => write!(f, "path contains control characters"),
            Self::ParentIsFile(parent) => write!(f, "'{parent}' is a file, not a directory"),
            Self::IsDirectory => write!(f, "path is a directory"),
        }
    }
}

/// Outcome of [`TreePath::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathCheck {
    /// The normalized path.
    Valid(TreePath),
    /// The rule that rejected it.
    Invalid(PathRejection),
}

/// A normalized path inside a repository tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreePath(String);

impl TreePath {
    /// Normalize `raw` and validate it against the rule set.
    #[must_use]
    pub fn check(raw: &str) -> PathCheck {
        if raw.chars().any(char::is_control) {
            return PathCheck::Invalid(PathRejection::ControlCharacter);
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.trim().split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return PathCheck::Invalid(PathRejection::EscapesRoot);
                    }
                }
                seg if seg.eq_ignore_ascii_case(RESERVED_SEGMENT) => {
                    return PathCheck::Invalid(PathRejection::ReservedSegment(seg.to_string()));
                }
                seg => segments.push(seg),
            }
        }

        if segments.is_empty() {
            return PathCheck::Invalid(PathRejection::Empty);
        }
        PathCheck::Valid(Self(segments.join("/")))
    }

    /// Create a validated path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if `raw` breaks a rule.
    pub fn new(raw: &str) -> Result<Self, Error> {
        match Self::check(raw) {
            PathCheck::Valid(path) => Ok(path),
            PathCheck::Invalid(reason) => Err(Error::InvalidPath {
                path: raw.to_string(),
                reason,
            }),
        }
    }

    /// Get the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading directories, shortest first: `a/b/c` yields `a`, `a/b`.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.0
            .match_indices('/')
            .map(move |(at, _)| &self.0[..at])
    }
}

impl AsRef<str> for TreePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for TreePath {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for TreePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid(raw: &str) -> String {
        match TreePath::check(raw) {
            PathCheck::Valid(path) => path.as_str().to_string(),
            PathCheck::Invalid(reason) => panic!("{raw:?} rejected: {reason}"),
        }
    }

    fn rejection(raw: &str) -> PathRejection {
        match TreePath::check(raw) {
            PathCheck::Valid(path) => panic!("{raw:?} accepted as {path}"),
            PathCheck::Invalid(reason) => reason,
        }
    }

    #[test]
    fn test_plain_paths_unchanged() {
        assert_eq!(valid("docs/readme.md"), "docs/readme.md");
        assert_eq!(valid("README"), "README");
        assert_eq!(valid("a b/c d.txt"), "a b/c d.txt");
    }

    #[test]
    fn test_normalization() {
        assert_eq!(valid("/docs/readme.md"), "docs/readme.md");
        assert_eq!(valid("docs//readme.md/"), "docs/readme.md");
        assert_eq!(valid("./docs/./readme.md"), "docs/readme.md");
        assert_eq!(valid("docs/old/../readme.md"), "docs/readme.md");
        assert_eq!(valid("  docs/readme.md  "), "docs/readme.md");
    }

    #[test]
    fn test_empty_paths() {
        assert_eq!(rejection(""), PathRejection::Empty);
        assert_eq!(rejection("   "), PathRejection::Empty);
        assert_eq!(rejection("/"), PathRejection::Empty);
        assert_eq!(rejection("./."), PathRejection::Empty);
        assert_eq!(rejection("a/.."), PathRejection::Empty);
    }

    #[test]
    fn test_escaping_root() {
        assert_eq!(rejection("../etc/passwd"), PathRejection::EscapesRoot);
        assert_eq!(rejection("a/../../b"), PathRejection::EscapesRoot);
    }

    #[test]
    fn test_reserved_segments() {
        assert!(matches!(rejection(".git/config"), PathRejection::ReservedSegment(_)));
        assert!(matches!(rejection("sub/.GIT/hooks/x"), PathRejection::ReservedSegment(_)));
        assert!(matches!(rejection("a/.Git"), PathRejection::ReservedSegment(_)));
        // Only exact segments are reserved.
        assert_eq!(valid(".github/workflows/ci.yml"), ".github/workflows/ci.yml");
        assert_eq!(valid("notes.git"), "notes.git");
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(rejection("a\0b"), PathRejection::ControlCharacter);
        assert_eq!(rejection("a\nb"), PathRejection::ControlCharacter);
    }

    #[test]
    fn test_new_reports_original_input() {
        let err = TreePath::new("../x").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidPath { ref path, reason: PathRejection::EscapesRoot } if path == "../x"
        ));
    }

    #[test]
    fn test_parents() {
        let path = TreePath::new("a/b/c.txt").unwrap();
        let parents: Vec<&str> = path.parents().collect();
        assert_eq!(parents, vec!["a", "a/b"]);

        let top = TreePath::new("c.txt").unwrap();
        assert_eq!(top.parents().count(), 0);
    }

    #[test]
    fn test_serializes_as_string() {
        let path = TreePath::new("docs/readme.md").unwrap();
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"docs/readme.md\"");
    }
}
