//! JSON output formatting

use serde_json::{json, Value};

use crate::output::formatter::Report;

pub fn format_json(report: &Report) -> String {
    let data: Value = match report {
        Report::Execution(result) => serde_json::to_value(result).unwrap_or(json!(null)),
        Report::File(file) => serde_json::to_value(file).unwrap_or(json!(null)),
        Report::Files(files) => json!({ "files": files }),
        Report::Repository { handle, environment } => json!({
            "repository": handle,
            "environment": environment,
        }),
        Report::Message(msg) => json!({ "message": msg }),
    };

    serde_json::to_string_pretty(&data).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::formatter::FileSummary;
    use crate::provision::{ExecutionResult, FileReport};

    #[test]
    fn test_execution_json() {
        let result = ExecutionResult::not_started("Failed to start python".to_string());
        let value: Value = serde_json::from_str(&format_json(&Report::Execution(result))).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["stderr"], "Failed to start python");
        assert_eq!(value["exit_code"], Value::Null);
    }

    #[test]
    fn test_file_json_is_flat() {
        let file = FileSummary {
            path: "main.py".to_string(),
            report: FileReport {
                exists: true,
                line_count: 3,
                byte_size: 40,
                has_entry_point: false,
                imports: vec![],
            },
        };
        let value: Value = serde_json::from_str(&format_json(&Report::File(file))).unwrap();
        assert_eq!(value["path"], "main.py");
        assert_eq!(value["line_count"], 3);
        assert_eq!(value["exists"], true);
    }

    #[test]
    fn test_message_json() {
        let value: Value = serde_json::from_str(&format_json(&Report::Message("done".into()))).unwrap();
        assert_eq!(value["message"], "done");
    }
}
