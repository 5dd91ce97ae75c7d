//! Session orchestrator
//!
//! One session is Load -> Provision -> Execute or Interact -> Cleanup, in
//! strict sequence. Cleanup of the loaded repository is tied to a guard so
//! it runs exactly once on every exit path, panics included.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::auth::AuthContext;
use crate::config::Config;
use crate::error::Result;
use crate::loader::{RepoHandle, RepoLoader};
use crate::provision::{ExecutionResult, Provisioner, PythonVenv, Toolchain};

/// Per-session load and environment options
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub branch: Option<String>,
    pub auth: Option<AuthContext>,
}

/// One scripted execution
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Script path relative to the repository root
    pub script: String,
    pub args: Vec<String>,
    pub attachments: Vec<PathBuf>,
    pub options: SessionOptions,
}

impl RunRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<PathBuf>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }
}

/// What an interactive body gets to work with
#[derive(Debug)]
pub struct SessionContext {
    pub handle: RepoHandle,
    pub provisioner: Provisioner,
}

/// Drives sessions against a shared loader
pub struct Orchestrator {
    loader: Arc<RepoLoader>,
    config: Config,
    toolchain: Arc<dyn Toolchain>,
    abort: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Orchestrator provisioning Python venvs
    pub fn new(loader: Arc<RepoLoader>, config: Config) -> Self {
        let toolchain = Arc::new(PythonVenv::new(config.python.clone()));
        Self {
            loader,
            config,
            toolchain,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_toolchain(mut self, toolchain: impl Toolchain + 'static) -> Self {
        self.toolchain = Arc::new(toolchain);
        self
    }

    pub fn loader(&self) -> &RepoLoader {
        &self.loader
    }

    /// Setting this flag kills any running script; the session still cleans up
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Load `identifier`, run one script from it, and clean up.
    ///
    /// Load and provisioning failures come back as `Err`; anything the
    /// script itself does, timeouts included, is in the `ExecutionResult`.
    pub fn run_file(&self, identifier: &str, request: &RunRequest) -> Result<ExecutionResult> {
        self.session(identifier, &request.options, |session| {
            let result = session.provisioner.run_with_attachments(
                &request.script,
                &request.args,
                &request.attachments,
            )?;
            tracing::info!(
                id = identifier,
                script = %request.script,
                success = result.success,
                timed_out = result.timed_out,
                duration_ms = result.duration.as_millis() as u64,
                "Script finished"
            );
            Ok(result)
        })
    }

    /// Load `identifier` and hand the session to `body`, cleaning up
    /// afterwards whatever `body` returns
    pub fn interact<R, F>(&self, identifier: &str, options: &SessionOptions, body: F) -> Result<R>
    where
        F: FnOnce(&mut SessionContext) -> Result<R>,
    {
        self.session(identifier, options, body)
    }

    fn session<R, F>(&self, identifier: &str, options: &SessionOptions, body: F) -> Result<R>
    where
        F: FnOnce(&mut SessionContext) -> Result<R>,
    {
        let handle = self.loader.load(identifier, options.branch.as_deref())?;
        let _guard = CleanupGuard {
            loader: &self.loader,
            id: identifier,
        };

        let mut provisioner = Provisioner::new(handle.path(), Arc::clone(&self.toolchain))
            .with_env_root(self.config.env_root())
            .with_timeout(self.config.execution_timeout)
            .with_abort_flag(self.abort_flag());
        if let Some(auth) = &options.auth {
            for (key, value) in auth.env_vars() {
                provisioner = provisioner.with_env(key, value);
            }
        }

        let mut context = SessionContext { handle, provisioner };
        let outcome = body(&mut context);

        // Environment goes before the repository it lives beside
        if let Err(e) = context.provisioner.cleanup() {
            tracing::warn!(id = identifier, error = %e, "Environment cleanup failed");
        }
        drop(context);
        outcome
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("loader", &self.loader)
            .field("config", &self.config)
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Releases one loaded repository when dropped
struct CleanupGuard<'a> {
    loader: &'a RepoLoader,
    id: &'a str,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.loader.cleanup(self.id) {
            tracing::warn!(id = self.id, error = %e, "Session cleanup failed");
        }
    }
}
