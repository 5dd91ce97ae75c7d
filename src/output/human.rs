//! Human-readable output formatting

use bytesize::ByteSize;

use crate::output::formatter::{FileSummary, Report};
use crate::provision::ExecutionResult;

pub fn format_human(report: &Report) -> String {
    match report {
        Report::Execution(result) => format_execution(result),
        Report::File(file) => format_file(file),
        Report::Files(files) => {
            if files.is_empty() {
                return "No Python files found".to_string();
            }
            let mut output = String::from("Python Files\n------------\n");
            output.push_str(&format!(
                "{:<4} {:<40} {:>7} {:>10} {:>6}\n",
                "#", "PATH", "LINES", "SIZE", "MAIN"
            ));
            output.push_str(&"-".repeat(71));
            output.push('\n');
            for (i, file) in files.iter().enumerate() {
                output.push_str(&format!(
                    "{:<4} {:<40} {:>7} {:>10} {:>6}\n",
                    i + 1,
                    truncate(&file.path, 40),
                    file.report.line_count,
                    ByteSize(file.report.byte_size).to_string(),
                    if file.report.has_entry_point { "yes" } else { "" }
                ));
            }
            output
        }
        Report::Repository { handle, environment } => {
            let mut output = String::from("Repository Information\n----------------------\n");
            output.push_str(&format!("Name:         {}\n", handle.name()));
            output.push_str(&format!("Location:     {}\n", handle.location));
            output.push_str(&format!("Backend:      {}\n", handle.backend));
            output.push_str(&format!("Path:         {}\n", handle.path.display()));
            if let Some(ref context) = handle.context_id {
                let attached = if handle.owns_context { "" } else { " (attached)" };
                output.push_str(&format!("Context:      {}{}\n", context, attached));
            }
            output.push_str(&format!(
                "Loaded:       {}\n",
                handle.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            output.push_str(&format!("Python files: {}\n", environment.source_files.len()));
            output.push_str(&format!("Requirements: {}\n", environment.manifests.len()));
            output.push_str(&format!("Setup files:  {}\n", environment.build_files.len()));
            output.push_str(&format!(
                "Environment:  {}\n",
                environment
                    .env_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "not created".to_string())
            ));
            output
        }
        Report::Message(msg) => msg.clone(),
    }
}

fn format_execution(result: &ExecutionResult) -> String {
    let mut output = String::new();
    if !result.stdout.is_empty() {
        output.push_str(&result.stdout);
        if !result.stdout.ends_with('\n') {
            output.push('\n');
        }
    }
    if !result.stderr.is_empty() {
        output.push_str("--- stderr ---\n");
        output.push_str(&result.stderr);
        if !result.stderr.ends_with('\n') {
            output.push('\n');
        }
    }

    let status = if result.success {
        "succeeded".to_string()
    } else if result.timed_out {
        "timed out".to_string()
    } else if result.aborted {
        "aborted".to_string()
    } else {
        match result.exit_code {
            Some(code) => format!("failed (exit code {})", code),
            None => "failed".to_string(),
        }
    };
    output.push_str(&format!(
        "--- Execution {} in {:.2}s ---",
        status,
        result.duration.as_secs_f64()
    ));
    output
}

fn format_file(file: &FileSummary) -> String {
    if !file.report.exists {
        return format!("File not found: {}", file.path);
    }

    let mut output = format!("File: {}\n", file.path);
    output.push_str(&"-".repeat(file.path.len() + 6));
    output.push('\n');
    output.push_str(&format!("Lines:       {}\n", file.report.line_count));
    output.push_str(&format!("Size:        {}\n", ByteSize(file.report.byte_size)));
    output.push_str(&format!(
        "Entry point: {}\n",
        if file.report.has_entry_point { "yes" } else { "no" }
    ));
    if file.report.imports.is_empty() {
        output.push_str("Imports:     none\n");
    } else {
        output.push_str("Imports:\n");
        for import in &file.report.imports {
            output.push_str(&format!("  {}\n", import));
        }
    }
    output
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
