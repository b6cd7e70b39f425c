//! Repository settings loaded from `<git dir>/quill.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::User;

/// Per-repository settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoSettings {
    /// Repository coordinates and default branch.
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Staging workspace settings.
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Push event settings.
    #[serde(default)]
    pub events: EventsConfig,

    /// Branches that reject direct pushes from users outside their allowlist.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protected_branches: Vec<ProtectedBranch>,

    /// Known users, resolvable by email.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<User>,
}

impl RepoSettings {
    /// Load settings from a TOML file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns error if file can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::SettingsParse {
            file: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save settings to a TOML file.
    ///
    /// # Errors
    /// Returns error if serialization or write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| std::io::Error::other(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Whether `email` is barred from pushing directly to `branch`.
    #[must_use]
    pub fn is_protected_for_push(&self, branch: &str, email: &str) -> bool {
        self.protected_branches
            .iter()
            .filter(|rule| rule.name == branch)
            .any(|rule| !rule.allows(email))
    }
}

/// Repository coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Owning user or organisation.
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Repository name; inferred from the directory when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Branch used when a request names none.
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            name: String::new(),
            default_branch: default_branch(),
        }
    }
}

fn default_owner() -> String {
    "local".into()
}

fn default_branch() -> String {
    "main".into()
}

/// Staging workspace settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory workspaces are created in (system temp dir if unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,
}

/// Push event settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Append push events as JSON lines to this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

/// A protected branch rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedBranch {
    /// Exact branch name.
    pub name: String,

    /// Emails allowed to push directly despite the protection.
    #[serde(default)]
    pub push_allowlist: Vec<String>,
}

impl ProtectedBranch {
    fn allows(&self, email: &str) -> bool {
        self.push_allowlist
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(email))
    }
}
