//! Error types for Digy

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigyError {
    #[error("Insufficient memory to load '{id}': requested {requested}, headroom {headroom}")]
    MemoryExhausted {
        id: String,
        requested: bytesize::ByteSize,
        headroom: bytesize::ByteSize,
    },

    #[error("Clone failed: {0}")]
    CloneFailed(String),

    #[error("Environment setup failed: {0}")]
    EnvironmentSetupFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Execution timed out after {0} seconds")]
    ExecutionTimeout(u64),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Cleanup failed: {0}")]
    CleanupFailed(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Repository already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("Isolation runtime error: {0}")]
    IsolationError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DigyError>;
