//! Per-repository memory budget

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytesize::ByteSize;

use super::probe::{MemoryProbe, SystemMemoryProbe};
use crate::config::Config;

/// Tracks advisory allocations for memory-resident repositories.
///
/// Headroom is the probe's available figure minus everything already
/// allocated here. The check and the insert happen under one lock so two
/// concurrent loads cannot both pass against the same headroom.
pub struct MemoryBudget {
    base_limit: u64,
    safety_margin: u64,
    probe: Arc<dyn MemoryProbe>,
    allocations: Mutex<HashMap<String, u64>>,
}

impl MemoryBudget {
    /// Create a budget using the host memory probe
    pub fn new(config: &Config) -> Self {
        Self::with_probe(config.base_limit, config.safety_margin, Arc::new(SystemMemoryProbe))
    }

    /// Create a budget with an explicit probe
    pub fn with_probe(base_limit: u64, safety_margin: u64, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            base_limit,
            safety_margin,
            probe,
            allocations: Mutex::new(HashMap::new()),
        }
    }

    /// Default estimate for one repository
    pub fn base_limit(&self) -> u64 {
        self.base_limit
    }

    pub fn safety_margin(&self) -> u64 {
        self.safety_margin
    }

    /// Record `amount` under `id` if it fits in headroom minus the safety
    /// margin. A denied request leaves the table untouched.
    pub fn allocate(&self, id: &str, amount: u64) -> bool {
        let mut allocations = self.lock();

        // Re-allocating an id replaces its entry, so its old amount is not
        // counted against itself.
        let others: u64 = allocations
            .iter()
            .filter(|(key, _)| key.as_str() != id)
            .map(|(_, bytes)| *bytes)
            .sum();

        let Some(headroom) = self.headroom_with(others) else {
            tracing::warn!(id, "Host memory query failed, denying allocation");
            return false;
        };

        let usable = headroom.saturating_sub(self.safety_margin);
        if amount > usable {
            tracing::info!(
                id,
                requested = %ByteSize(amount),
                usable = %ByteSize(usable),
                "Memory allocation denied"
            );
            return false;
        }

        allocations.insert(id.to_string(), amount);
        tracing::debug!(id, amount = %ByteSize(amount), "Memory allocated");
        true
    }

    /// Remove the entry for `id`; absent ids are ignored
    pub fn deallocate(&self, id: &str) {
        if let Some(amount) = self.lock().remove(id) {
            tracing::debug!(id, amount = %ByteSize(amount), "Memory released");
        }
    }

    /// Host available memory minus current allocations.
    ///
    /// `None` means the host could not be queried; callers must treat that
    /// as scarce.
    pub fn available_headroom(&self) -> Option<u64> {
        let allocated = self.total_allocated();
        self.headroom_with(allocated)
    }

    /// Amount recorded for `id`
    pub fn allocated(&self, id: &str) -> Option<u64> {
        self.lock().get(id).copied()
    }

    /// Sum of all recorded allocations
    pub fn total_allocated(&self) -> u64 {
        self.lock().values().sum()
    }

    /// Number of repositories holding an allocation
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn headroom_with(&self, allocated: u64) -> Option<u64> {
        self.probe
            .available_bytes()
            .map(|available| available.saturating_sub(allocated))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        // The map stays consistent even if a holder panicked
        self.allocations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for MemoryBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBudget")
            .field("base_limit", &self.base_limit)
            .field("safety_margin", &self.safety_margin)
            .field("allocations", &*self.lock())
            .finish()
    }
}
