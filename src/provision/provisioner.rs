//! Environment provisioner for one loaded repository

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use super::discovery::DeploymentEnvironment;
use super::inspect::{inspect_file, FileReport};
use super::runner::{ExecutionResult, ScriptRunner, DEFAULT_TIMEOUT};
use super::toolchain::Toolchain;
use super::ATTACHMENTS_DIR;
use crate::error::{DigyError, Result};

/// Discovers, provisions and runs scripts for one repository.
///
/// The runtime environment lives in a temporary directory under the env
/// root and is removed by [`Provisioner::cleanup`] or on drop.
pub struct Provisioner {
    repo_path: PathBuf,
    toolchain: Box<dyn Toolchain>,
    env_root: PathBuf,
    timeout: Duration,
    envs: Vec<(String, String)>,
    abort: Option<Arc<AtomicBool>>,
    environment: Option<DeploymentEnvironment>,
    env_dir: Option<TempDir>,
}

impl Provisioner {
    pub fn new(repo_path: impl Into<PathBuf>, toolchain: impl Toolchain + 'static) -> Self {
        Self {
            repo_path: repo_path.into(),
            toolchain: Box::new(toolchain),
            env_root: std::env::temp_dir().join("digy").join("envs"),
            timeout: DEFAULT_TIMEOUT,
            envs: Vec::new(),
            abort: None,
            environment: None,
            env_dir: None,
        }
    }

    pub fn with_env_root(mut self, env_root: impl Into<PathBuf>) -> Self {
        self.env_root = env_root.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Environment variable passed to every executed script
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Last discovery result
    pub fn environment(&self) -> Option<&DeploymentEnvironment> {
        self.environment.as_ref()
    }

    /// Runtime environment directory, once created
    pub fn env_path(&self) -> Option<&Path> {
        self.env_dir.as_ref().map(|d| d.path())
    }

    /// Classify the repository's files, replacing any earlier result
    pub fn discover(&mut self) -> Result<&DeploymentEnvironment> {
        let mut discovered = DeploymentEnvironment::discover(&self.repo_path)?;
        discovered.env_path = self.env_path().map(Path::to_path_buf);
        Ok(&*self.environment.insert(discovered))
    }

    fn ensure_discovered(&mut self) -> Result<()> {
        if self.environment.is_none() {
            self.discover()?;
        }
        Ok(())
    }

    /// Create the runtime environment. A second call is a no-op.
    pub fn create_environment(&mut self) -> Result<()> {
        if self.env_dir.is_some() {
            return Ok(());
        }
        self.ensure_discovered()?;

        fs::create_dir_all(&self.env_root).map_err(|e| {
            DigyError::EnvironmentSetupFailed(format!("cannot create {}: {}", self.env_root.display(), e))
        })?;
        let env_dir = tempfile::Builder::new()
            .prefix("digy-env-")
            .tempdir_in(&self.env_root)
            .map_err(|e| DigyError::EnvironmentSetupFailed(e.to_string()))?;

        tracing::info!(env = %env_dir.path().display(), "Creating runtime environment");
        // On failure env_dir drops here and takes the partial env with it
        self.toolchain.create_environment(env_dir.path())?;

        if let Some(environment) = self.environment.as_mut() {
            environment.env_path = Some(env_dir.path().to_path_buf());
        }
        self.env_dir = Some(env_dir);
        Ok(())
    }

    /// Install every discovered manifest in order, stopping at the first
    /// failure. Succeeds without action when there are none.
    pub fn install_dependencies(&mut self) -> Result<()> {
        self.ensure_discovered()?;
        let manifests = self
            .environment
            .as_ref()
            .map(|e| e.manifests.clone())
            .unwrap_or_default();
        if manifests.is_empty() {
            return Ok(());
        }

        self.create_environment()?;
        let env_path = self
            .env_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| DigyError::EnvironmentSetupFailed("environment missing".to_string()))?;

        for manifest in &manifests {
            tracing::info!(manifest = %manifest.display(), "Installing dependencies");
            self.toolchain
                .install(&env_path, &self.repo_path.join(manifest))
                .map_err(|diagnostic| {
                    DigyError::EnvironmentSetupFailed(format!("{}: {}", manifest.display(), diagnostic))
                })?;
        }
        Ok(())
    }

    /// Create the environment and install dependencies
    pub fn setup_environment(&mut self) -> Result<()> {
        self.create_environment()?;
        self.install_dependencies()
    }

    /// Run a script from the repository with `args`.
    ///
    /// A missing script fails with [`DigyError::FileNotFound`] before any
    /// process starts; a failed setup with `EnvironmentSetupFailed`. Every
    /// execution outcome, timeouts included, comes back as a result.
    pub fn run(&mut self, relative_path: &str, args: &[String]) -> Result<ExecutionResult> {
        self.run_with_attachments(relative_path, args, &[])
    }

    /// Like [`Provisioner::run`], staging `attachments` into
    /// `.digy_attachments/` for the duration of the run
    pub fn run_with_attachments(
        &mut self,
        relative_path: &str,
        args: &[String],
        attachments: &[PathBuf],
    ) -> Result<ExecutionResult> {
        let script = self.resolve(relative_path)?;
        if let Some(missing) = attachments.iter().find(|a| !a.is_file()) {
            return Err(DigyError::FileNotFound(missing.display().to_string()));
        }

        self.setup_environment()?;
        let env_path = self
            .env_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| DigyError::EnvironmentSetupFailed("environment missing".to_string()))?;

        let staged = if attachments.is_empty() {
            None
        } else {
            Some(Attachments::stage(&self.repo_path, attachments)?)
        };

        let mut runner = ScriptRunner::new(self.toolchain.interpreter(&env_path), &self.repo_path)
            .with_timeout(self.timeout);
        for (key, value) in &self.envs {
            runner = runner.with_env(key.clone(), value.clone());
        }
        if let Some(staged) = &staged {
            runner = runner.with_env("DIGY_ATTACHMENTS_DIR", staged.dir.to_string_lossy());
        }
        if let Some(flag) = &self.abort {
            runner = runner.with_abort_flag(Arc::clone(flag));
        }

        tracing::info!(script = relative_path, args = ?args, "Running script");
        let result = runner.run(&script, args);
        drop(staged);
        Ok(result)
    }

    /// Static scan of a repository file
    pub fn inspect(&self, relative_path: &str) -> FileReport {
        match self.resolve(relative_path) {
            Ok(path) => inspect_file(&path),
            Err(_) => FileReport::default(),
        }
    }

    /// Interpreter of the provisioned environment
    pub fn interpreter(&self) -> Option<PathBuf> {
        self.env_path().map(|env| self.toolchain.interpreter(env))
    }

    /// Remove the runtime environment. Safe to call repeatedly and before
    /// any environment exists.
    pub fn cleanup(&mut self) -> Result<()> {
        if let Some(environment) = self.environment.as_mut() {
            environment.env_path = None;
        }
        match self.env_dir.take() {
            Some(env_dir) => {
                let path = env_dir.path().to_path_buf();
                env_dir
                    .close()
                    .map_err(|e| DigyError::CleanupFailed(format!("{}: {}", path.display(), e)))?;
                tracing::debug!(env = %path.display(), "Runtime environment removed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Resolve a repository-relative path, refusing anything that leaves
    /// the repository
    fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let relative = Path::new(relative_path);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        let path = self.repo_path.join(relative);
        if escapes || !path.is_file() {
            return Err(DigyError::FileNotFound(relative_path.to_string()));
        }
        Ok(path)
    }
}

impl Drop for Provisioner {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!(error = %e, "Runtime environment cleanup failed");
        }
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("repo_path", &self.repo_path)
            .field("env_path", &self.env_path())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Attachment files copied into the repository for one run
struct Attachments {
    dir: PathBuf,
    created_dir: bool,
    files: Vec<PathBuf>,
}

impl Attachments {
    fn stage(repo_path: &Path, sources: &[PathBuf]) -> Result<Self> {
        let dir = repo_path.join(ATTACHMENTS_DIR);
        let created_dir = !dir.exists();
        fs::create_dir_all(&dir)?;

        let mut staged = Self {
            dir,
            created_dir,
            files: Vec::new(),
        };
        for source in sources {
            let name = source
                .file_name()
                .ok_or_else(|| DigyError::FileNotFound(source.display().to_string()))?;
            let target = staged.dir.join(name);
            fs::copy(source, &target)?;
            staged.files.push(target);
        }
        Ok(staged)
    }
}

impl Drop for Attachments {
    fn drop(&mut self) {
        let removed = if self.created_dir {
            fs::remove_dir_all(&self.dir)
        } else {
            self.files.iter().try_for_each(fs::remove_file)
        };
        if let Err(e) = removed {
            tracing::warn!(dir = %self.dir.display(), error = %e, "Could not remove attachments");
        }
    }
}
