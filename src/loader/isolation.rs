//! Isolation runtime (container engine) client

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{DigyError, Result};

/// Mount point of the host staging directory inside a context
pub const WORKSPACE_MOUNT: &str = "/workspace";

/// A running isolation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationContext {
    pub id: String,
    /// Host directory mounted at [`WORKSPACE_MOUNT`], if any
    pub workspace: Option<PathBuf>,
    /// Whether digy created the context (and so may remove it)
    pub created: bool,
}

impl IsolationContext {
    pub fn attached(id: impl Into<String>, workspace: Option<PathBuf>) -> Self {
        Self {
            id: id.into(),
            workspace,
            created: false,
        }
    }

    pub fn created(id: impl Into<String>, workspace: &Path) -> Self {
        Self {
            id: id.into(),
            workspace: Some(workspace.to_path_buf()),
            created: true,
        }
    }
}

/// Creates and removes isolation contexts
pub trait IsolationRuntime: Send + Sync {
    /// Look up an existing context by name or id
    fn attach(&self, reference: &str) -> Result<Option<IsolationContext>>;

    /// Create a context called `name` with `workspace` mounted at
    /// [`WORKSPACE_MOUNT`]
    fn create(&self, name: &str, workspace: &Path) -> Result<IsolationContext>;

    /// Remove a context. `Ok(false)` means it was already gone.
    fn remove(&self, context_id: &str, force: bool) -> Result<bool>;

    /// Attach to the context called `name`, creating it when it does not exist
    fn create_or_attach(&self, name: &str, workspace: &Path) -> Result<IsolationContext> {
        match self.attach(name)? {
            Some(context) => Ok(context),
            None => self.create(name, workspace),
        }
    }
}

/// Docker command-line client
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
    image: String,
}

impl DockerCli {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("docker"),
            image: image.into(),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn docker(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| DigyError::IsolationError(format!("cannot run {}: {}", self.program.display(), e)))
    }

}

/// `docker inspect` format printing the id and the workspace mount source
const INSPECT_FORMAT: &str =
    "{{.Id}}|{{range .Mounts}}{{if eq .Destination \"/workspace\"}}{{.Source}}{{end}}{{end}}";

fn parse_inspect(stdout: &str) -> Option<IsolationContext> {
    let line = stdout.lines().next()?.trim();
    let (id, workspace) = line.split_once('|').unwrap_or((line, ""));
    if id.is_empty() {
        return None;
    }
    let workspace = (!workspace.is_empty()).then(|| PathBuf::from(workspace));
    Some(IsolationContext::attached(id, workspace))
}

impl IsolationRuntime for DockerCli {
    fn attach(&self, reference: &str) -> Result<Option<IsolationContext>> {
        let output = self.docker(&["inspect", "--type", "container", "--format", INSPECT_FORMAT, reference])?;
        if !output.status.success() {
            return Ok(None);
        }
        let context = parse_inspect(&String::from_utf8_lossy(&output.stdout));
        if let Some(ref context) = context {
            tracing::info!(reference, id = %context.id, "Attached to existing container");
        }
        Ok(context)
    }

    fn create(&self, name: &str, workspace: &Path) -> Result<IsolationContext> {
        let mount = format!("{}:{}", workspace.display(), WORKSPACE_MOUNT);
        let output = self.docker(&[
            "run",
            "-d",
            "--name",
            name,
            "-v",
            &mount,
            "-w",
            WORKSPACE_MOUNT,
            &self.image,
            "sleep",
            "infinity",
        ])?;

        if !output.status.success() {
            return Err(DigyError::IsolationError(format!(
                "docker run failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::info!(name, id = %id, image = %self.image, "Created container");
        Ok(IsolationContext::created(id, workspace))
    }

    fn remove(&self, context_id: &str, force: bool) -> Result<bool> {
        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(context_id);

        let output = self.docker(&args)?;
        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing_context(&stderr) {
            return Ok(false);
        }

        Err(DigyError::IsolationError(format!(
            "docker rm {} failed: {}",
            context_id,
            stderr.trim()
        )))
    }
}

fn is_missing_context(stderr: &str) -> bool {
    stderr.to_lowercase().contains("no such container")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_context_detection() {
        assert!(is_missing_context("Error response from daemon: No such container: abc"));
        assert!(is_missing_context("Error: no such container: abc"));
        assert!(!is_missing_context("permission denied"));
    }

    #[test]
    fn test_missing_program_is_isolation_error() {
        let docker = DockerCli::new("python:3.11-slim").with_program("/nonexistent/docker");
        let result = docker.remove("abc", true);
        assert!(matches!(result, Err(DigyError::IsolationError(_))));
        assert!(matches!(docker.attach("abc"), Err(DigyError::IsolationError(_))));
    }

    #[test]
    fn test_parse_inspect() {
        let context = parse_inspect("4f2a9c|/tmp/digy/isolated/digy-repo-1\n").unwrap();
        assert_eq!(context.id, "4f2a9c");
        assert_eq!(context.workspace, Some(PathBuf::from("/tmp/digy/isolated/digy-repo-1")));
        assert!(!context.created);

        let bare = parse_inspect("4f2a9c|\n").unwrap();
        assert_eq!(bare.workspace, None);
        assert!(parse_inspect("").is_none());
    }
}
