//! Repository file discovery

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::error::{DigyError, Result};

/// Directories never descended into
const SKIPPED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    ".venv",
    "venv",
    "node_modules",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    super::ATTACHMENTS_DIR,
];

const BUILD_DESCRIPTORS: &[&str] = &["setup.py", "setup.cfg", "pyproject.toml"];

/// Role of a file in the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Source,
    DependencyManifest,
    BuildDescriptor,
}

/// Classify a file by name; `None` for files that play no role
pub fn classify(path: &Path) -> Option<FileKind> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();

    if BUILD_DESCRIPTORS.contains(&name.as_str()) {
        Some(FileKind::BuildDescriptor)
    } else if name.starts_with("requirements") && name.ends_with(".txt") {
        Some(FileKind::DependencyManifest)
    } else if name.ends_with(".py") {
        Some(FileKind::Source)
    } else {
        None
    }
}

/// Classified view of a repository plus its runtime environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentEnvironment {
    pub repo_path: PathBuf,
    /// Runtime environment directory, once created
    pub env_path: Option<PathBuf>,
    /// Paths relative to `repo_path`, in walk order
    pub source_files: Vec<PathBuf>,
    pub manifests: Vec<PathBuf>,
    pub build_files: Vec<PathBuf>,
    pub readme: Option<PathBuf>,
}

impl DeploymentEnvironment {
    /// Walk `repo_path` at any depth and classify every file
    pub fn discover(repo_path: &Path) -> Result<Self> {
        if !repo_path.is_dir() {
            return Err(DigyError::PathNotFound(repo_path.display().to_string()));
        }

        let mut env = Self {
            repo_path: repo_path.to_path_buf(),
            env_path: None,
            source_files: Vec::new(),
            manifests: Vec::new(),
            build_files: Vec::new(),
            readme: None,
        };

        let walker = WalkDir::new(repo_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(repo_path) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };

            if entry.depth() == 1 && env.readme.is_none() && is_readme(&relative) {
                env.readme = Some(relative.clone());
            }

            match classify(&relative) {
                Some(FileKind::Source) => env.source_files.push(relative),
                Some(FileKind::DependencyManifest) => env.manifests.push(relative),
                Some(FileKind::BuildDescriptor) => env.build_files.push(relative),
                None => {}
            }
        }

        tracing::debug!(
            repo = %repo_path.display(),
            sources = env.source_files.len(),
            manifests = env.manifests.len(),
            build_files = env.build_files.len(),
            "Discovery finished"
        );

        Ok(env)
    }

    /// Absolute path of the README, if one was found
    pub fn readme_path(&self) -> Option<PathBuf> {
        self.readme.as_ref().map(|r| self.repo_path.join(r))
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map_or(false, |name| SKIPPED_DIRS.contains(&name))
}

fn is_readme(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase().starts_with("readme"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "# Test content").unwrap();
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(Path::new("a/b/main.py")), Some(FileKind::Source));
        assert_eq!(classify(Path::new("requirements.txt")), Some(FileKind::DependencyManifest));
        assert_eq!(classify(Path::new("requirements-dev.txt")), Some(FileKind::DependencyManifest));
        assert_eq!(classify(Path::new("setup.py")), Some(FileKind::BuildDescriptor));
        assert_eq!(classify(Path::new("pyproject.toml")), Some(FileKind::BuildDescriptor));
        assert_eq!(classify(Path::new("README.md")), None);
        assert_eq!(classify(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_discover_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        for rel in [
            "main.py",
            "utils.py",
            "requirements.txt",
            "setup.py",
            "subdir/helper.py",
            "deep/a/b/c/leaf.py",
            "services/api/requirements.txt",
            "README.md",
        ] {
            touch(dir.path(), rel);
        }

        let env = DeploymentEnvironment::discover(dir.path()).unwrap();

        assert!(env.source_files.contains(&PathBuf::from("main.py")));
        assert!(env.source_files.contains(&PathBuf::from("utils.py")));
        assert!(env.source_files.contains(&PathBuf::from("subdir/helper.py")));
        assert!(env.source_files.contains(&PathBuf::from("deep/a/b/c/leaf.py")));
        assert!(!env.source_files.contains(&PathBuf::from("setup.py")));
        assert_eq!(
            env.manifests,
            vec![PathBuf::from("requirements.txt"), PathBuf::from("services/api/requirements.txt")]
        );
        assert_eq!(env.build_files, vec![PathBuf::from("setup.py")]);
        assert_eq!(env.readme, Some(PathBuf::from("README.md")));
        assert!(env.env_path.is_none());
    }

    #[test]
    fn test_discover_skips_vcs_and_env_dirs() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "app.py");
        touch(dir.path(), ".git/hooks/pre-commit.py");
        touch(dir.path(), ".venv/lib/site.py");
        touch(dir.path(), "__pycache__/app.py");

        let env = DeploymentEnvironment::discover(dir.path()).unwrap();
        assert_eq!(env.source_files, vec![PathBuf::from("app.py")]);
    }

    #[test]
    fn test_discover_missing_repo() {
        let result = DeploymentEnvironment::discover(Path::new("/no/such/repo"));
        assert!(matches!(result, Err(DigyError::PathNotFound(_))));
    }

    #[test]
    fn test_nested_readme_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "docs/README.md");
        let env = DeploymentEnvironment::discover(dir.path()).unwrap();
        assert!(env.readme.is_none());
        assert!(env.readme_path().is_none());
    }
}
