//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "digy")]
#[command(author, version, about = "Load a repository into an ephemeral environment and run code from it", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubCommand,

    /// Output format as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum SubCommand {
    /// Run one script from a repository
    Run {
        /// Local path, remote URL, or ram:// / docker:// reference
        repo: String,

        /// Script path relative to the repository root
        file: String,

        /// Arguments passed to the script
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// File copied into .digy_attachments/ for the run (repeatable)
        #[arg(long = "attach", value_name = "PATH")]
        attachments: Vec<PathBuf>,

        /// Branch or tag to clone
        #[arg(long)]
        branch: Option<String>,

        /// Authentication method exposed to the script
        #[arg(long, value_name = "METHOD")]
        auth: Option<String>,

        /// User info JSON exposed to the script
        #[arg(long, value_name = "JSON", requires = "auth")]
        user_info: Option<String>,

        /// Execution timeout in seconds
        #[arg(long, value_name = "SECONDS", env = "DIGY_TIMEOUT_SECS")]
        timeout: Option<u64>,

        /// Use the host interpreter instead of a fresh virtualenv
        #[arg(long)]
        system_python: bool,
    },

    /// Statically inspect one file without running it
    Inspect {
        repo: String,
        file: String,

        #[arg(long)]
        branch: Option<String>,
    },

    /// List the Python files of a repository
    Files {
        repo: String,

        #[arg(long)]
        branch: Option<String>,
    },

    /// Open the interactive menu for a repository
    Interact {
        repo: String,

        #[arg(long)]
        branch: Option<String>,
    },
}
