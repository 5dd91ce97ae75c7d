//! Static, non-executing file inspection

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// What a static scan of one file found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub exists: bool,
    pub line_count: usize,
    pub byte_size: u64,
    /// Declares an `if __name__ == "__main__":` guard
    pub has_entry_point: bool,
    /// Import statements, trimmed, in file order
    pub imports: Vec<String>,
}

/// Scan `path` without executing it. A missing or unreadable file yields
/// an empty report with `exists = false`.
pub fn inspect_file(path: &Path) -> FileReport {
    let Ok(metadata) = fs::metadata(path) else {
        return FileReport::default();
    };
    if !metadata.is_file() {
        return FileReport::default();
    }

    let content = match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cannot read file for inspection");
            return FileReport::default();
        }
    };

    FileReport {
        exists: true,
        line_count: content.lines().count(),
        byte_size: metadata.len(),
        has_entry_point: entry_point().is_match(&content),
        imports: content
            .lines()
            .filter(|line| import_line().is_match(line))
            .map(|line| line.trim().to_string())
            .collect(),
    }
}

fn entry_point() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*if\s+__name__\s*==\s*['"]__main__['"]\s*:"#).expect("valid entry point regex")
    })
}

fn import_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(import\s+[\w.]+|from\s+[\w.]+\s+import\s+)").expect("valid import regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"#!/usr/bin/env python3
import os
import sys
from pathlib import Path

def main():
    print("Hello World")

if __name__ == "__main__":
    main()
"#;

    #[test]
    fn test_inspect_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info_test.py");
        fs::write(&path, SAMPLE).unwrap();

        let report = inspect_file(&path);
        assert!(report.exists);
        assert_eq!(report.line_count, 10);
        assert_eq!(report.byte_size, SAMPLE.len() as u64);
        assert!(report.has_entry_point);
        assert_eq!(
            report.imports,
            vec!["import os", "import sys", "from pathlib import Path"]
        );
    }

    #[test]
    fn test_inspect_without_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.py");
        fs::write(&path, "# importing nothing\nx = 'import os'\nname = '__main__'\n").unwrap();

        let report = inspect_file(&path);
        assert!(report.exists);
        assert!(!report.has_entry_point);
        assert!(report.imports.is_empty());
    }

    #[test]
    fn test_single_quoted_guard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.py");
        fs::write(&path, "import json\nif __name__=='__main__':\n    pass\n").unwrap();

        let report = inspect_file(&path);
        assert!(report.has_entry_point);
        assert_eq!(report.imports, vec!["import json"]);
    }

    #[test]
    fn test_inspect_missing_file() {
        let report = inspect_file(Path::new("/nonexistent.py"));
        assert_eq!(report, FileReport::default());
        assert!(!report.exists);
        assert_eq!(report.line_count, 0);
        assert_eq!(report.byte_size, 0);
        assert!(!report.has_entry_point);
        assert!(report.imports.is_empty());
    }
}
