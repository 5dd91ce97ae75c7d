//! Repository loading
//!
//! Identifiers resolve to one of three backends:
//! - Local: an existing directory, used in place
//! - MemoryResident: a clone under the memory-backed root, admitted by the
//!   memory budget
//! - Isolated: a clone inside a container context

mod handle;
mod isolation;
mod manager;
mod registry;
mod source;
mod vcs;

pub use handle::RepoHandle;
pub use isolation::{DockerCli, IsolationContext, IsolationRuntime, WORKSPACE_MOUNT};
pub use manager::RepoLoader;
pub use registry::{Registry, RepoState};
pub use source::{parse, Backend, RepoSource};
pub use vcs::{GitCli, VersionControl};
