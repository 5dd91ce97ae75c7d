//! Digy - run code from a repository in a throwaway environment
//!
//! Digy loads a repository (local path, remote URL, or isolated context)
//! into an ephemeral backend, provisions a disposable runtime for it, runs a
//! chosen script inside that runtime, and releases everything it acquired.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use digy::{Config, MemoryBudget, Orchestrator, RepoLoader, RunRequest};
//!
//! let config = Config::from_env().unwrap();
//! let budget = Arc::new(MemoryBudget::new(&config));
//! let loader = Arc::new(RepoLoader::new(&config, budget));
//! let orchestrator = Orchestrator::new(loader, config);
//!
//! let result = orchestrator
//!     .run_file("github.com/user/repo", &RunRequest::new("main.py"))
//!     .unwrap();
//! println!("{}", result.stdout);
//! ```

pub mod admission;
pub mod cli;
pub mod config;
pub mod error;
pub mod loader;
pub mod logging;
pub mod menu;
pub mod output;
pub mod provision;
pub mod session;

#[cfg(feature = "repl")]
pub mod repl;

pub use admission::{MemoryBudget, MemoryProbe, StaticMemoryProbe, SystemMemoryProbe};
pub use config::Config;
pub use error::{DigyError, Result};
pub use loader::{Backend, RepoHandle, RepoLoader, RepoSource, RepoState};
pub use menu::{dispatch, Menu, MenuAction, MenuIo};
pub use output::{format_output, OutputFormat, Report};
pub use provision::{DeploymentEnvironment, ExecutionResult, FileReport, Provisioner};
pub use session::{AuthContext, Orchestrator, RunRequest, SessionContext, SessionOptions};
