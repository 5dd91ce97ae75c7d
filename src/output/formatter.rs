//! Output formatting

use serde::Serialize;

use crate::loader::RepoHandle;
use crate::output::human::format_human;
use crate::output::json::format_json;
use crate::provision::{DeploymentEnvironment, ExecutionResult, FileReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// A file together with its static scan
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: String,
    #[serde(flatten)]
    pub report: FileReport,
}

/// Anything the shell prints
#[derive(Debug, Clone)]
pub enum Report {
    Execution(ExecutionResult),
    File(FileSummary),
    Files(Vec<FileSummary>),
    Repository {
        handle: RepoHandle,
        environment: DeploymentEnvironment,
    },
    Message(String),
}

pub fn format_output(report: &Report, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Human => format_human(report),
        OutputFormat::Json => format_json(report),
    }
}
