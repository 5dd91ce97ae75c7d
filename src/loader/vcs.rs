//! Version-control client

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{DigyError, Result};

/// Fetches repository content into a destination directory
pub trait VersionControl: Send + Sync {
    fn clone_repo(&self, url: &str, branch: Option<&str>, destination: &Path) -> Result<()>;
}

/// `git` command-line client doing shallow clones
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn clone_args(url: &str, branch: Option<&str>, destination: &Path) -> Vec<String> {
        let mut args = vec!["clone".to_string(), "--depth".to_string(), "1".to_string()];
        if let Some(branch) = branch {
            args.push("--branch".to_string());
            args.push(branch.to_string());
        }
        args.push(url.to_string());
        args.push(destination.to_string_lossy().to_string());
        args
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionControl for GitCli {
    fn clone_repo(&self, url: &str, branch: Option<&str>, destination: &Path) -> Result<()> {
        tracing::debug!(url, ?branch, destination = %destination.display(), "git clone");

        let output = Command::new(&self.program)
            .args(Self::clone_args(url, branch, destination))
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| DigyError::CloneFailed(format!("cannot run {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            return Err(DigyError::CloneFailed(format!(
                "{}: {}",
                url,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}
