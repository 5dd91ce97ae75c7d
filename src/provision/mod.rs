//! Runtime environment provisioning and script execution

mod discovery;
mod inspect;
mod provisioner;
mod runner;
mod toolchain;

/// Directory inside the repository that holds staged attachments
pub const ATTACHMENTS_DIR: &str = ".digy_attachments";

pub use discovery::{classify, DeploymentEnvironment, FileKind};
pub use inspect::{inspect_file, FileReport};
pub use provisioner::Provisioner;
pub use runner::{ExecutionResult, ScriptRunner, DEFAULT_TIMEOUT};
pub use toolchain::{PythonVenv, SystemInterpreter, Toolchain};
