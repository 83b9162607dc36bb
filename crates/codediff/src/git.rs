//! Git revision metadata.
//!
//! Commit descriptions are fetched by shelling out to `git`. The process call
//! sits behind [`GitQuery`] so callers (and tests) can substitute canned output.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;

/// Source of `git` output.
///
/// Implementations return the trimmed stdout of `git <args>`, or an empty
/// string when the command fails or prints nothing.
pub trait GitQuery {
    /// Run `git` with the given arguments
    fn query(&self, args: &[&str]) -> String;
}

/// Runs the real `git` binary
#[derive(Debug, Clone, Default)]
pub struct GitCommand {
    repo_dir: Option<PathBuf>,
}

impl GitCommand {
    /// Query the repository containing the current directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Query the repository at `dir`
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: Some(dir.into()),
        }
    }
}

impl GitQuery for GitCommand {
    fn query(&self, args: &[&str]) -> String {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = &self.repo_dir {
            cmd.current_dir(dir);
        }
        match cmd.output() {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            Ok(output) => {
                tracing::debug!(?args, status = %output.status, "git exited unsuccessfully");
                String::new()
            }
            Err(e) => {
                tracing::debug!(?args, error = %e, "could not run git");
                String::new()
            }
        }
    }
}

/// Description of one commit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GitRev {
    /// Full commit hash as recorded by the harness
    pub full_hash: String,
    /// Uncommitted changes present when the run was captured
    #[serde(default)]
    pub diff: Option<String>,
    /// Abbreviated hash
    #[serde(default)]
    pub abbrev: String,
    /// Commit subject line
    #[serde(default)]
    pub title: String,
    /// Author name
    #[serde(default)]
    pub author_name: String,
    /// Author email
    #[serde(default)]
    pub author_email: String,
    /// Author date
    #[serde(default)]
    pub author_time: String,
    /// Committer date
    #[serde(default)]
    pub commit_time: String,
}

impl GitRev {
    /// Resolve metadata for `full_hash`
    pub fn resolve(full_hash: impl Into<String>, diff: Option<String>, git: &dyn GitQuery) -> Self {
        let full_hash = full_hash.into();
        let show = |format: &str| {
            git.query(&[
                "show",
                "--no-patch",
                &format!("--format={format}"),
                full_hash.as_str(),
            ])
        };

        Self {
            abbrev: git.query(&["rev-parse", "--short", full_hash.as_str()]),
            title: show("%s"),
            author_name: show("%an"),
            author_email: show("%ae"),
            author_time: show("%ad"),
            commit_time: show("%cd"),
            diff,
            full_hash,
        }
    }

    /// Resolve the currently checked-out commit
    pub fn head(git: &dyn GitQuery) -> Self {
        let hash = git.query(&["rev-parse", "HEAD"]);
        Self::resolve(hash, None, git)
    }
}
