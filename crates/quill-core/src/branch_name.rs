//! Branch name validation and newtype.
//!
//! Provides a [`BranchName`] type that only admits names git accepts under
//! `refs/heads/` (the `git check-ref-format --branch` rules).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// A validated git branch name.
///
/// # Examples
///
/// ```
/// use quill_core::BranchName;
///
/// assert!(BranchName::new("main").is_ok());
/// assert!(BranchName::new("feature/auth").is_ok());
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("feature..x").is_err());
/// assert!(BranchName::new("refs.lock").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBranchName`] if git would refuse the name.
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        match violation(&name) {
            Some(reason) => Err(Error::InvalidBranchName {
                name,
                reason: reason.to_string(),
            }),
            None => Ok(Self(name)),
        }
    }

    /// Get the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full reference name, e.g. `refs/heads/main`.
    #[must_use]
    pub fn ref_name(&self) -> String {
        format!("refs/heads/{}", self.0)
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for BranchName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for BranchName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for BranchName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Serialize for BranchName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BranchName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Return the first ref-format rule `name` breaks, if any.
fn violation(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("branch name cannot be empty");
    }
    if name == "@" {
        return Some("branch name cannot be '@'");
    }
    if name.starts_with('-') {
        return Some("branch name cannot start with '-'");
    }
    if name.ends_with('.') {
        return Some("branch name cannot end with '.'");
    }
    if name.contains("..") {
        return Some("branch name cannot contain '..'");
    }
    if name.contains("@{") {
        return Some("branch name cannot contain '@{'");
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_ascii_control() || matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
    {
        return Some(if c.is_ascii_control() {
            "branch name cannot contain control characters"
        } else {
            "branch name cannot contain space, '~', '^', ':', '?', '*', '[' or '\\'"
        });
    }

    // Per-component rules; this also rejects leading, trailing and doubled slashes.
    for component in name.split('/') {
        if component.is_empty() {
            return Some("branch name cannot have empty path components");
        }
        if component.starts_with('.') {
            return Some("branch name component cannot start with '.'");
        }
        #[allow(clippy::case_sensitive_file_extension_comparisons)]
        if component.ends_with(".lock") {
            return Some("branch name component cannot end with '.lock'");
        }
    }

    None
}
