//! Repository loader
//!
//! The RepoLoader resolves identifiers to a backend, performs the
//! backend-specific clone or attach, and owns the registry of loaded
//! repositories. A failed load leaves nothing behind; cleanup always drops
//! the registry entry, even when the backend removal step fails.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytesize::ByteSize;
use chrono::Utc;
use sha2::{Digest, Sha256};

use super::handle::RepoHandle;
use super::isolation::{DockerCli, IsolationRuntime};
use super::registry::{Registry, RepoState};
use super::source::{parse, Backend, RepoSource};
use super::vcs::{GitCli, VersionControl};
use crate::admission::MemoryBudget;
use crate::config::Config;
use crate::error::{DigyError, Result};

static CHECKOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Loads repositories into backends and tracks them until cleanup
pub struct RepoLoader {
    memory_root: PathBuf,
    isolated_root: PathBuf,
    budget: Arc<MemoryBudget>,
    vcs: Box<dyn VersionControl>,
    isolation: Box<dyn IsolationRuntime>,
    registry: Mutex<Registry>,
}

impl RepoLoader {
    /// Create a loader using `git` and `docker` from PATH
    pub fn new(config: &Config, budget: Arc<MemoryBudget>) -> Self {
        Self {
            memory_root: config.memory_root.clone(),
            isolated_root: config.isolated_root(),
            budget,
            vcs: Box::new(GitCli::new()),
            isolation: Box::new(DockerCli::new(config.isolation_image.clone())),
            registry: Mutex::new(Registry::new()),
        }
    }

    /// Replace the version-control client
    pub fn with_vcs(mut self, vcs: impl VersionControl + 'static) -> Self {
        self.vcs = Box::new(vcs);
        self
    }

    /// Replace the isolation runtime
    pub fn with_isolation(mut self, isolation: impl IsolationRuntime + 'static) -> Self {
        self.isolation = Box::new(isolation);
        self
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    /// Load `identifier` into its backend and register the handle.
    ///
    /// On failure the identifier stays unregistered and any partial
    /// checkout, allocation or context is rolled back.
    pub fn load(&self, identifier: &str, branch: Option<&str>) -> Result<RepoHandle> {
        let source = parse(identifier);
        self.lock().begin_loading(identifier)?;

        tracing::info!(
            id = identifier,
            location = %source.location,
            backend = %source.backend,
            "Loading repository"
        );

        match self.load_backend(identifier, &source, branch) {
            Ok(handle) => {
                tracing::info!(id = identifier, path = %handle.path.display(), "Repository loaded");
                self.lock().finish_loading(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                tracing::warn!(id = identifier, error = %e, "Load failed");
                self.lock().abort_loading(identifier);
                Err(e)
            }
        }
    }

    fn load_backend(&self, id: &str, source: &RepoSource, branch: Option<&str>) -> Result<RepoHandle> {
        match source.backend {
            Backend::Local => self.attach_local(id, source),
            Backend::MemoryResident => self.clone_memory_resident(id, source, branch),
            Backend::Isolated => match source.context_reference() {
                Some(reference) => self.attach_isolated(id, source, reference),
                None => self.clone_isolated(id, source, branch),
            },
        }
    }

    fn attach_local(&self, id: &str, source: &RepoSource) -> Result<RepoHandle> {
        let path = Path::new(&source.location);
        if !path.exists() {
            return Err(DigyError::PathNotFound(source.location.clone()));
        }
        if !path.is_dir() {
            return Err(DigyError::PathNotFound(format!("{} is not a directory", source.location)));
        }

        let path = path.canonicalize()?;
        Ok(RepoHandle::new(id, source, path, None))
    }

    fn clone_memory_resident(&self, id: &str, source: &RepoSource, branch: Option<&str>) -> Result<RepoHandle> {
        let amount = self.budget.base_limit();
        if !self.budget.allocate(id, amount) {
            return Err(DigyError::MemoryExhausted {
                id: id.to_string(),
                requested: ByteSize(amount),
                headroom: ByteSize(self.budget.available_headroom().unwrap_or(0)),
            });
        }

        let destination = checkout_dir(&self.memory_root, &source.name);
        let cloned = fs::create_dir_all(&self.memory_root)
            .map_err(|e| DigyError::CloneFailed(format!("cannot create {}: {}", self.memory_root.display(), e)))
            .and_then(|_| self.vcs.clone_repo(&source.location, branch, &destination));

        if let Err(e) = cloned {
            remove_tree_quietly(&destination);
            self.budget.deallocate(id);
            return Err(e);
        }

        Ok(RepoHandle::new(id, source, destination, None))
    }

    fn clone_isolated(&self, id: &str, source: &RepoSource, branch: Option<&str>) -> Result<RepoHandle> {
        let context_name = context_name(id, source);
        let staging = self.isolated_root.join(&context_name);
        let fresh_staging = !staging.exists();
        fs::create_dir_all(&staging)?;

        let context = match self.isolation.create_or_attach(&context_name, &staging) {
            Ok(context) => context,
            Err(e) => {
                if fresh_staging {
                    remove_tree_quietly(&staging);
                }
                return Err(e);
            }
        };

        // An attached context may already hold the checkout
        if is_empty_dir(&staging) {
            if let Err(e) = self.vcs.clone_repo(&source.location, branch, &staging) {
                if context.created {
                    if let Err(remove_err) = self.isolation.remove(&context.id, true) {
                        tracing::warn!(context = %context.id, error = %remove_err, "Rollback could not remove context");
                    }
                }
                if fresh_staging || context.created {
                    remove_tree_quietly(&staging);
                } else {
                    clear_dir_quietly(&staging);
                }
                return Err(e);
            }
        }

        let handle = RepoHandle::new(id, source, staging, Some(context.id));
        Ok(match (context.created, fresh_staging) {
            (true, _) => handle,
            (false, true) => handle.attached(),
            (false, false) => handle.attached().borrowing(),
        })
    }

    /// Attach to an existing context by name or id. Nothing is cloned, and
    /// cleanup leaves the context running.
    fn attach_isolated(&self, id: &str, source: &RepoSource, reference: &str) -> Result<RepoHandle> {
        let context = self
            .isolation
            .attach(reference)?
            .ok_or_else(|| DigyError::IsolationError(format!("no such context: {}", reference)))?;

        if let Some(workspace) = context.workspace.filter(|w| w.is_dir()) {
            let handle = RepoHandle::new(id, source, workspace, Some(context.id));
            return Ok(handle.attached().borrowing());
        }

        // No host-visible workspace: hand out an empty scratch directory
        let staging = self.isolated_root.join(context_name(id, source));
        fs::create_dir_all(&staging)?;
        Ok(RepoHandle::new(id, source, staging, Some(context.id)).attached())
    }

    /// Release the backend resources of `id` and drop its registry entry.
    ///
    /// Unknown identifiers are a no-op success. A failing removal step is
    /// reported as [`DigyError::CleanupFailed`] after the entry is gone.
    pub fn cleanup(&self, id: &str) -> Result<()> {
        let Some(handle) = self.lock().begin_cleanup(id) else {
            tracing::debug!(id, "Nothing to clean up");
            return Ok(());
        };

        let released = self.release(&handle);
        self.lock().finish_cleanup(id);

        match released {
            Ok(()) => {
                tracing::info!(id, backend = %handle.backend, "Repository cleaned up");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(id, backend = %handle.backend, error = %e, "Cleanup incomplete");
                Err(DigyError::CleanupFailed(format!("{}: {}", id, e)))
            }
        }
    }

    fn release(&self, handle: &RepoHandle) -> Result<()> {
        match handle.backend {
            // Borrowed directory: never touched
            Backend::Local => Ok(()),
            Backend::MemoryResident => {
                let removed = remove_tree(&handle.path);
                self.budget.deallocate(&handle.id);
                removed
            }
            Backend::Isolated => {
                let removed_context = match handle.context_id.as_ref().filter(|_| handle.owns_context) {
                    Some(context_id) => match self.isolation.remove(context_id, true) {
                        Ok(true) => Ok(()),
                        Ok(false) => {
                            tracing::debug!(context = %context_id, "Context already gone");
                            Ok(())
                        }
                        Err(e) => Err(e),
                    },
                    None => Ok(()),
                };
                let removed_staging = if handle.is_borrowed() {
                    Ok(())
                } else {
                    remove_tree(&handle.path)
                };
                removed_context.and(removed_staging)
            }
        }
    }

    /// Clean up every loaded repository, returning the faults encountered
    pub fn cleanup_all(&self) -> Vec<DigyError> {
        let ids = self.lock().loaded_ids();
        ids.iter().filter_map(|id| self.cleanup(id).err()).collect()
    }

    /// Get the handle of a loaded repository
    pub fn get(&self, id: &str) -> Option<RepoHandle> {
        self.lock().get(id).cloned()
    }

    /// Lifecycle state of an identifier
    pub fn state(&self, id: &str) -> RepoState {
        self.lock().state(id)
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.state(id) == RepoState::Loaded
    }

    /// Identifiers currently loaded
    pub fn loaded_ids(&self) -> Vec<String> {
        self.lock().loaded_ids()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RepoLoader {
    fn drop(&mut self) {
        for e in self.cleanup_all() {
            tracing::warn!(error = %e, "Cleanup at shutdown failed");
        }
    }
}

impl std::fmt::Debug for RepoLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoLoader")
            .field("memory_root", &self.memory_root)
            .field("isolated_root", &self.isolated_root)
            .field("loaded", &self.loaded_ids())
            .finish()
    }
}

fn checkout_dir(root: &Path, name: &str) -> PathBuf {
    let seq = CHECKOUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    root.join(format!(
        "{}-{}-{}-{}",
        name,
        std::process::id(),
        Utc::now().format("%Y%m%d%H%M%S"),
        seq
    ))
}

/// `digy-<name>-<hash>`, keyed on the identifier so two identifiers for
/// the same remote never share a context
fn context_name(id: &str, source: &RepoSource) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let hash: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    let safe: String = source
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("digy-{}-{}", safe, hash)
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

fn remove_tree(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

/// Empty a directory that is not ours to delete
fn clear_dir_quietly(path: &Path) {
    let Ok(entries) = fs::read_dir(path) else {
        return;
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        let removed = if entry_path.is_dir() {
            fs::remove_dir_all(&entry_path)
        } else {
            fs::remove_file(&entry_path)
        };
        if let Err(e) = removed {
            tracing::warn!(path = %entry_path.display(), error = %e, "Rollback could not remove partial checkout");
        }
    }
}

fn remove_tree_quietly(path: &Path) {
    if let Err(e) = remove_tree(path) {
        tracing::warn!(path = %path.display(), error = %e, "Rollback could not remove directory");
    }
}
