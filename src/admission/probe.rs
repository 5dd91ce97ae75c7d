//! Host memory introspection

use sysinfo::System;

/// Source of the host's available memory figure
pub trait MemoryProbe: Send + Sync {
    /// Available memory in bytes, or `None` when it cannot be determined
    fn available_bytes(&self) -> Option<u64>;
}

/// Probe backed by `sysinfo`
#[derive(Debug, Default)]
pub struct SystemMemoryProbe;

impl MemoryProbe for SystemMemoryProbe {
    fn available_bytes(&self) -> Option<u64> {
        let mut sys = System::new();
        sys.refresh_memory();

        // sysinfo reports 0 when the platform query fails
        match sys.available_memory() {
            0 => None,
            available => Some(available),
        }
    }
}

/// Probe that always reports the same figure
#[derive(Debug, Clone, Copy)]
pub struct StaticMemoryProbe(pub Option<u64>);

impl MemoryProbe for StaticMemoryProbe {
    fn available_bytes(&self) -> Option<u64> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_probe_reports_memory() {
        let available = SystemMemoryProbe.available_bytes();
        assert!(available.map_or(true, |bytes| bytes > 0));
    }

    #[test]
    fn test_static_probe() {
        assert_eq!(StaticMemoryProbe(Some(42)).available_bytes(), Some(42));
        assert_eq!(StaticMemoryProbe(None).available_bytes(), None);
    }
}
