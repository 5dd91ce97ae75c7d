//! Loaded repository handle
//!
//! A RepoHandle records one active repository: where it came from, which
//! backend holds it, and where its files are on the host.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::source::{Backend, RepoSource};

/// Record of one loaded repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoHandle {
    /// Identifier exactly as the caller supplied it
    pub id: String,
    /// Normalized URL or path
    pub location: String,
    /// Backend holding the content
    pub backend: Backend,
    /// Directory containing the repository files on the host
    pub path: PathBuf,
    /// Isolation context id, for isolated loads
    pub context_id: Option<String>,
    /// Whether cleanup removes the context. False for attached contexts.
    #[serde(default)]
    pub owns_context: bool,
    /// Whether cleanup must leave `path` alone
    #[serde(default)]
    pub borrowed: bool,
    /// When the load completed
    pub created_at: DateTime<Utc>,
}

impl RepoHandle {
    /// Create a handle for a freshly loaded source
    pub fn new(id: &str, source: &RepoSource, path: PathBuf, context_id: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            location: source.location.clone(),
            backend: source.backend,
            path,
            owns_context: context_id.is_some(),
            context_id,
            borrowed: source.backend == Backend::Local,
            created_at: Utc::now(),
        }
    }

    /// The context existed before this load; cleanup leaves it running
    pub fn attached(mut self) -> Self {
        self.owns_context = false;
        self
    }

    /// The files belong to someone else; cleanup leaves them in place
    pub fn borrowing(mut self) -> Self {
        self.borrowed = true;
        self
    }

    /// Get the repository root
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Short name for display
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.location.clone())
    }

    /// Whether cleanup must leave the files alone
    pub fn is_borrowed(&self) -> bool {
        self.borrowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::source::parse;

    #[test]
    fn test_handle_new() {
        let source = parse("/srv/checkout");
        let handle = RepoHandle::new("/srv/checkout", &source, PathBuf::from("/srv/checkout"), None);
        assert_eq!(handle.id, "/srv/checkout");
        assert_eq!(handle.backend, Backend::Local);
        assert_eq!(handle.name(), "checkout");
        assert!(handle.is_borrowed());
        assert!(handle.context_id.is_none());
    }

    #[test]
    fn test_handle_isolated() {
        let source = parse("docker://github.com/user/repo");
        let handle = RepoHandle::new(
            "docker://github.com/user/repo",
            &source,
            PathBuf::from("/tmp/digy/isolated/repo-1"),
            Some("c0ffee".to_string()),
        );
        assert_eq!(handle.location, "https://github.com/user/repo");
        assert_eq!(handle.context_id.as_deref(), Some("c0ffee"));
        assert!(handle.owns_context);
        assert!(!handle.is_borrowed());
    }

    #[test]
    fn test_handle_attached_context() {
        let source = parse("container://test_container_123");
        let handle = RepoHandle::new(
            "container://test_container_123",
            &source,
            PathBuf::from("/srv/shared/workspace"),
            Some("test_container_123".to_string()),
        )
        .attached()
        .borrowing();
        assert!(!handle.owns_context);
        assert!(handle.is_borrowed());
        assert_eq!(handle.backend, Backend::Isolated);
    }
}
