//! Registry of loaded repositories
//!
//! Each identifier moves through `Loading -> Loaded -> CleaningUp` and is
//! removed afterward. Only `Loaded` entries carry a handle.

use std::collections::HashMap;

use super::handle::RepoHandle;
use crate::error::{DigyError, Result};

/// Lifecycle state of an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    Unregistered,
    Loading,
    Loaded,
    CleaningUp,
}

#[derive(Debug)]
enum Entry {
    Loading,
    Loaded(RepoHandle),
    CleaningUp,
}

/// Tracks identifiers and their handles
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `id`
    pub fn state(&self, id: &str) -> RepoState {
        match self.entries.get(id) {
            None => RepoState::Unregistered,
            Some(Entry::Loading) => RepoState::Loading,
            Some(Entry::Loaded(_)) => RepoState::Loaded,
            Some(Entry::CleaningUp) => RepoState::CleaningUp,
        }
    }

    /// Reserve `id` for a load in progress
    pub fn begin_loading(&mut self, id: &str) -> Result<()> {
        if self.entries.contains_key(id) {
            return Err(DigyError::AlreadyLoaded(id.to_string()));
        }
        self.entries.insert(id.to_string(), Entry::Loading);
        Ok(())
    }

    /// Publish the handle of a finished load
    pub fn finish_loading(&mut self, handle: RepoHandle) {
        self.entries.insert(handle.id.clone(), Entry::Loaded(handle));
    }

    /// Drop the reservation of a failed load
    pub fn abort_loading(&mut self, id: &str) {
        if matches!(self.entries.get(id), Some(Entry::Loading)) {
            self.entries.remove(id);
        }
    }

    /// Move a loaded entry to `CleaningUp`, handing back its handle
    pub fn begin_cleanup(&mut self, id: &str) -> Option<RepoHandle> {
        match self.entries.remove(id) {
            Some(Entry::Loaded(handle)) => {
                self.entries.insert(id.to_string(), Entry::CleaningUp);
                Some(handle)
            }
            Some(other) => {
                self.entries.insert(id.to_string(), other);
                None
            }
            None => None,
        }
    }

    /// Remove the entry once cleanup is done
    pub fn finish_cleanup(&mut self, id: &str) {
        self.entries.remove(id);
    }

    /// Get a loaded handle
    pub fn get(&self, id: &str) -> Option<&RepoHandle> {
        match self.entries.get(id) {
            Some(Entry::Loaded(handle)) => Some(handle),
            _ => None,
        }
    }

    /// Identifiers currently loaded
    pub fn loaded_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Loaded(_)))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of tracked identifiers in any state
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::source::parse;
    use std::path::PathBuf;

    fn handle(id: &str) -> RepoHandle {
        RepoHandle::new(id, &parse(id), PathBuf::from(id), None)
    }

    #[test]
    fn test_registry_new() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.state("x"), RepoState::Unregistered);
    }

    #[test]
    fn test_registry_lifecycle() {
        let mut registry = Registry::new();
        registry.begin_loading("/a").unwrap();
        assert_eq!(registry.state("/a"), RepoState::Loading);
        assert!(registry.get("/a").is_none());

        registry.finish_loading(handle("/a"));
        assert_eq!(registry.state("/a"), RepoState::Loaded);
        assert_eq!(registry.loaded_ids(), vec!["/a".to_string()]);

        let taken = registry.begin_cleanup("/a").unwrap();
        assert_eq!(taken.id, "/a");
        assert_eq!(registry.state("/a"), RepoState::CleaningUp);

        registry.finish_cleanup("/a");
        assert_eq!(registry.state("/a"), RepoState::Unregistered);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_duplicate_load() {
        let mut registry = Registry::new();
        registry.begin_loading("/a").unwrap();
        assert!(matches!(registry.begin_loading("/a"), Err(DigyError::AlreadyLoaded(_))));

        registry.finish_loading(handle("/a"));
        assert!(registry.begin_loading("/a").is_err());
    }

    #[test]
    fn test_registry_abort_loading() {
        let mut registry = Registry::new();
        registry.begin_loading("/a").unwrap();
        registry.abort_loading("/a");
        assert_eq!(registry.state("/a"), RepoState::Unregistered);
    }

    #[test]
    fn test_abort_does_not_touch_loaded() {
        let mut registry = Registry::new();
        registry.finish_loading(handle("/a"));
        registry.abort_loading("/a");
        assert_eq!(registry.state("/a"), RepoState::Loaded);
    }

    #[test]
    fn test_cleanup_only_from_loaded() {
        let mut registry = Registry::new();
        assert!(registry.begin_cleanup("/missing").is_none());

        registry.begin_loading("/a").unwrap();
        assert!(registry.begin_cleanup("/a").is_none());
        assert_eq!(registry.state("/a"), RepoState::Loading);
    }
}
