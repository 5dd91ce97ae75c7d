//! Digy CLI - run code from a repository in a throwaway environment

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use digy::cli::{Args, SubCommand};
use digy::output::FileSummary;
use digy::provision::SystemInterpreter;
use digy::{
    format_output, AuthContext, Config, MemoryBudget, Orchestrator, OutputFormat, RepoLoader, Report,
    RunRequest, SessionOptions,
};

fn main() {
    let args = Args::parse();
    digy::logging::init(args.verbose);

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Build the shared services once for this process
fn orchestrator(config: Config, system_python: bool) -> Orchestrator {
    let python = config.python.clone();
    let budget = Arc::new(MemoryBudget::new(&config));
    let loader = Arc::new(RepoLoader::new(&config, budget));
    let orchestrator = Orchestrator::new(loader, config);

    if system_python {
        let program = python.unwrap_or_else(|| PathBuf::from("python3"));
        orchestrator.with_toolchain(SystemInterpreter::new(program))
    } else {
        orchestrator
    }
}

fn install_abort_handler(orchestrator: &Orchestrator) {
    let flag = orchestrator.abort_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(error = %e, "Failed to set Ctrl+C handler");
    }
}

fn print(report: &Report, format: &OutputFormat) {
    println!("{}", format_output(report, format));
}

/// Returns whether the command succeeded
fn run(args: Args) -> anyhow::Result<bool> {
    let format = if args.json { OutputFormat::Json } else { OutputFormat::Human };
    let mut config = Config::from_env().context("invalid configuration")?;

    match args.command {
        SubCommand::Run {
            repo,
            file,
            args: script_args,
            attachments,
            branch,
            auth,
            user_info,
            timeout,
            system_python,
        } => {
            if let Some(secs) = timeout {
                config.execution_timeout = Duration::from_secs(secs);
            }
            let auth = auth
                .map(|method| AuthContext::parse(&method, user_info.as_deref()))
                .transpose()?;

            let orchestrator = orchestrator(config, system_python);
            install_abort_handler(&orchestrator);

            let request = RunRequest::new(file)
                .with_args(script_args)
                .with_attachments(attachments)
                .with_options(SessionOptions { branch, auth });
            let result = orchestrator
                .run_file(&repo, &request)
                .with_context(|| format!("cannot run {} from {}", request.script, repo))?;

            let success = result.success;
            print(&Report::Execution(result), &format);
            Ok(success)
        }

        SubCommand::Inspect { repo, file, branch } => {
            let orchestrator = orchestrator(config, false);
            let options = SessionOptions { branch, auth: None };
            let report = orchestrator.interact(&repo, &options, |session| Ok(session.provisioner.inspect(&file)))?;

            let exists = report.exists;
            print(&Report::File(FileSummary { path: file, report }), &format);
            Ok(exists)
        }

        SubCommand::Files { repo, branch } => {
            let orchestrator = orchestrator(config, false);
            let options = SessionOptions { branch, auth: None };
            let files = orchestrator.interact(&repo, &options, |session| {
                let sources = session.provisioner.discover()?.source_files.clone();
                Ok(sources
                    .iter()
                    .map(|path| {
                        let path = path.to_string_lossy().to_string();
                        let report = session.provisioner.inspect(&path);
                        FileSummary { path, report }
                    })
                    .collect::<Vec<_>>())
            })?;

            print(&Report::Files(files), &format);
            Ok(true)
        }

        #[cfg(feature = "repl")]
        SubCommand::Interact { repo, branch } => {
            let orchestrator = orchestrator(config, false);
            install_abort_handler(&orchestrator);
            let options = SessionOptions { branch, auth: None };
            digy::repl::run_repl(&orchestrator, &repo, &options)?;
            Ok(true)
        }
        #[cfg(not(feature = "repl"))]
        SubCommand::Interact { .. } => {
            eprintln!("Interactive mode not enabled. Rebuild with --features repl");
            Ok(false)
        }
    }
}
