//! Interactive session menu
//!
//! A closed set of actions, a cursor over them, and a dispatcher that maps
//! each action to its handler. Terminal I/O sits behind [`MenuIo`] so the
//! same loop drives a rustyline front end and scripted tests.

mod dispatch;

use std::path::Path;
use std::process::Command;

use crate::error::{DigyError, Result};
use crate::session::SessionContext;

pub use dispatch::dispatch;

/// Menu entries, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuAction {
    ShowInfo,
    ViewReadme,
    SetupEnvironment,
    ListFiles,
    RunFile,
    InspectFile,
    Shell,
    Exit,
}

impl MenuAction {
    pub const ALL: [MenuAction; 8] = [
        MenuAction::ShowInfo,
        MenuAction::ViewReadme,
        MenuAction::SetupEnvironment,
        MenuAction::ListFiles,
        MenuAction::RunFile,
        MenuAction::InspectFile,
        MenuAction::Shell,
        MenuAction::Exit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MenuAction::ShowInfo => "Show repository info",
            MenuAction::ViewReadme => "View README",
            MenuAction::SetupEnvironment => "Set up environment",
            MenuAction::ListFiles => "List Python files",
            MenuAction::RunFile => "Run Python file",
            MenuAction::InspectFile => "Inspect file",
            MenuAction::Shell => "Open interactive shell",
            MenuAction::Exit => "Exit",
        }
    }
}

/// Cursor over [`MenuAction::ALL`]
#[derive(Debug, Clone, Default)]
pub struct Menu {
    selection: usize,
}

impl Menu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> usize {
        self.selection
    }

    pub fn selected(&self) -> MenuAction {
        MenuAction::ALL[self.selection]
    }

    /// Move the cursor for `up`/`k` or `down`/`j`, wrapping at either end.
    /// Returns false for any other key.
    pub fn navigate(&mut self, key: &str) -> bool {
        let len = MenuAction::ALL.len();
        match key {
            "up" | "k" => self.selection = (self.selection + len - 1) % len,
            "down" | "j" => self.selection = (self.selection + 1) % len,
            _ => return false,
        }
        true
    }

    /// Interpret one line of input: a 1-based number or `q`/`exit` picks an
    /// action directly, an empty line picks the highlighted one
    pub fn choose(&mut self, input: &str) -> Option<MenuAction> {
        let input = input.trim();
        if input.is_empty() {
            return Some(self.selected());
        }
        if matches!(input, "q" | "quit" | "exit") {
            return Some(MenuAction::Exit);
        }
        let index = input.parse::<usize>().ok()?.checked_sub(1)?;
        let action = MenuAction::ALL.get(index).copied()?;
        self.selection = index;
        Some(action)
    }

    /// Menu text with the cursor marked
    pub fn render(&self) -> String {
        let mut output = String::new();
        for (i, action) in MenuAction::ALL.iter().enumerate() {
            let marker = if i == self.selection { ">" } else { " " };
            output.push_str(&format!("{} {}. {}\n", marker, i + 1, action.label()));
        }
        output
    }
}

/// Line-oriented terminal access for the menu
pub trait MenuIo {
    /// Read one line; `None` means the user quit (Ctrl-C or EOF)
    fn prompt(&mut self, message: &str) -> Option<String>;

    fn show(&mut self, text: &str);

    /// Hand the terminal to an interactive interpreter until it exits
    fn launch_shell(&mut self, interpreter: &Path, working_dir: &Path) -> Result<()> {
        let status = Command::new(interpreter)
            .current_dir(working_dir)
            .status()
            .map_err(|e| DigyError::ExecutionFailed(format!("{}: {}", interpreter.display(), e)))?;
        tracing::debug!(code = ?status.code(), "Shell exited");
        Ok(())
    }
}

/// Run the menu loop until Exit or the user quits
pub fn run_menu(session: &mut SessionContext, io: &mut dyn MenuIo) -> Result<()> {
    let mut menu = Menu::new();
    loop {
        io.show(&menu.render());
        let Some(line) = io.prompt("Select an option (number, j/k to move, Enter to pick)") else {
            return Ok(());
        };
        let input = line.trim();
        if menu.navigate(input) {
            continue;
        }
        match menu.choose(input) {
            Some(action) => {
                if !dispatch(action, session, io)? {
                    return Ok(());
                }
            }
            None => io.show(&format!("Unknown option: {}", input)),
        }
    }
}
