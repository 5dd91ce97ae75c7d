//! Terminal front end for the session menu

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{DigyError, Result};
use crate::menu::{run_menu, MenuIo};
use crate::session::{Orchestrator, SessionOptions};

/// [`MenuIo`] over a rustyline editor
pub struct RustylineIo {
    editor: DefaultEditor,
    abort: Option<Arc<AtomicBool>>,
}

impl RustylineIo {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().map_err(|e| DigyError::ExecutionFailed(e.to_string()))?;
        Ok(Self { editor, abort: None })
    }

    /// Clear `flag` whenever the menu waits for input, so a Ctrl+C that
    /// killed one script does not abort the next
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }
}

impl MenuIo for RustylineIo {
    fn prompt(&mut self, message: &str) -> Option<String> {
        if let Some(flag) = &self.abort {
            flag.store(false, Ordering::SeqCst);
        }
        match self.editor.readline(&format!("{}: ", message)) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Some(line)
            }
            // Ctrl+C and Ctrl+D both leave the session
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                None
            }
        }
    }

    fn show(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Load `identifier` and drive the menu on the terminal until the user
/// exits. The repository is cleaned up afterwards either way.
pub fn run_repl(orchestrator: &Orchestrator, identifier: &str, options: &SessionOptions) -> Result<()> {
    let mut io = RustylineIo::new()?.with_abort_flag(orchestrator.abort_flag());

    println!("DIGY v{} - Interactive Mode", env!("CARGO_PKG_VERSION"));
    println!("Repository: {}\n", identifier);

    orchestrator.interact(identifier, options, |session| run_menu(session, &mut io))?;

    println!("Goodbye!");
    Ok(())
}
