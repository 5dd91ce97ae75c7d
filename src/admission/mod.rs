//! Admission control for memory-resident loads
//!
//! The budget is advisory: it records how much each repository is expected
//! to occupy and refuses new loads that would not fit in the host's
//! available memory. Nothing is physically reserved.

mod budget;
mod probe;

pub use budget::MemoryBudget;
pub use probe::{MemoryProbe, StaticMemoryProbe, SystemMemoryProbe};
