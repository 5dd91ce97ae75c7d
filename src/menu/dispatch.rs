//! Menu action handlers

use std::fs;
use std::path::PathBuf;

use super::{MenuAction, MenuIo};
use crate::error::Result;
use crate::output::{format_output, FileSummary, OutputFormat, Report};
use crate::session::SessionContext;

enum Selection {
    File(String),
    Invalid,
    Quit,
}

/// Perform `action` against the session. Returns false when the session
/// should end: for Exit, or when the user quits at a prompt.
pub fn dispatch(action: MenuAction, session: &mut SessionContext, io: &mut dyn MenuIo) -> Result<bool> {
    tracing::debug!(?action, "Menu action");
    match action {
        MenuAction::ShowInfo => show_info(session, io),
        MenuAction::ViewReadme => view_readme(session, io),
        MenuAction::SetupEnvironment => setup_environment(session, io),
        MenuAction::ListFiles => list_files(session, io),
        MenuAction::RunFile => run_file(session, io),
        MenuAction::InspectFile => inspect_file(session, io),
        MenuAction::Shell => shell(session, io),
        MenuAction::Exit => Ok(false),
    }
}

fn show(io: &mut dyn MenuIo, report: &Report) {
    io.show(&format_output(report, &OutputFormat::Human));
}

fn source_files(session: &mut SessionContext) -> Result<Vec<PathBuf>> {
    match session.provisioner.environment() {
        Some(env) => Ok(env.source_files.clone()),
        None => Ok(session.provisioner.discover()?.source_files.clone()),
    }
}

fn show_info(session: &mut SessionContext, io: &mut dyn MenuIo) -> Result<bool> {
    if session.provisioner.environment().is_none() {
        session.provisioner.discover()?;
    }
    if let Some(environment) = session.provisioner.environment() {
        let report = Report::Repository {
            handle: session.handle.clone(),
            environment: environment.clone(),
        };
        show(io, &report);
    }
    Ok(true)
}

fn view_readme(session: &mut SessionContext, io: &mut dyn MenuIo) -> Result<bool> {
    if session.provisioner.environment().is_none() {
        session.provisioner.discover()?;
    }
    let readme = session.provisioner.environment().and_then(|env| env.readme_path());
    match readme {
        Some(path) => match fs::read_to_string(&path) {
            Ok(content) => io.show(&content),
            Err(e) => io.show(&format!("Cannot read {}: {}", path.display(), e)),
        },
        None => io.show("No README found"),
    }
    Ok(true)
}

fn setup_environment(session: &mut SessionContext, io: &mut dyn MenuIo) -> Result<bool> {
    io.show("Setting up environment...");
    match session.provisioner.setup_environment() {
        Ok(()) => io.show("Environment ready"),
        Err(e) => io.show(&format!("Environment setup failed: {}", e)),
    }
    Ok(true)
}

fn list_files(session: &mut SessionContext, io: &mut dyn MenuIo) -> Result<bool> {
    let files = source_files(session)?;
    let summaries = files
        .iter()
        .map(|path| {
            let path = path.to_string_lossy().to_string();
            let report = session.provisioner.inspect(&path);
            FileSummary { path, report }
        })
        .collect();
    show(io, &Report::Files(summaries));
    Ok(true)
}

fn select_file(session: &mut SessionContext, io: &mut dyn MenuIo) -> Result<Selection> {
    let files = source_files(session)?;
    if files.is_empty() {
        io.show("No Python files found");
        return Ok(Selection::Invalid);
    }

    let mut listing = String::new();
    for (i, file) in files.iter().enumerate() {
        listing.push_str(&format!("{:>3}. {}\n", i + 1, file.display()));
    }
    io.show(&listing);

    let Some(answer) = io.prompt("File number") else {
        return Ok(Selection::Quit);
    };
    let chosen = answer
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| files.get(i));
    match chosen {
        Some(file) => Ok(Selection::File(file.to_string_lossy().to_string())),
        None => {
            io.show(&format!("Invalid selection: {}", answer.trim()));
            Ok(Selection::Invalid)
        }
    }
}

fn run_file(session: &mut SessionContext, io: &mut dyn MenuIo) -> Result<bool> {
    let file = match select_file(session, io)? {
        Selection::File(file) => file,
        Selection::Invalid => return Ok(true),
        Selection::Quit => return Ok(false),
    };
    let Some(arg_line) = io.prompt("Arguments (space separated)") else {
        return Ok(false);
    };
    let args: Vec<String> = arg_line.split_whitespace().map(str::to_string).collect();

    match session.provisioner.run(&file, &args) {
        Ok(result) => show(io, &Report::Execution(result)),
        Err(e) => io.show(&format!("Cannot run {}: {}", file, e)),
    }
    Ok(true)
}

fn inspect_file(session: &mut SessionContext, io: &mut dyn MenuIo) -> Result<bool> {
    let file = match select_file(session, io)? {
        Selection::File(file) => file,
        Selection::Invalid => return Ok(true),
        Selection::Quit => return Ok(false),
    };
    let report = session.provisioner.inspect(&file);
    show(io, &Report::File(FileSummary { path: file, report }));
    Ok(true)
}

fn shell(session: &mut SessionContext, io: &mut dyn MenuIo) -> Result<bool> {
    if let Err(e) = session.provisioner.setup_environment() {
        io.show(&format!("Environment setup failed: {}", e));
        return Ok(true);
    }
    let Some(interpreter) = session.provisioner.interpreter() else {
        io.show("No interpreter available");
        return Ok(true);
    };
    io.show(&format!("Starting {} (exit the shell to return)", interpreter.display()));
    let working_dir = session.provisioner.repo_path().to_path_buf();
    if let Err(e) = io.launch_shell(&interpreter, &working_dir) {
        io.show(&format!("Shell failed: {}", e));
    }
    Ok(true)
}
