//! Host environment and package-management facility

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::error::{DigyError, Result};

/// Creates runtime environments and installs dependencies into them
pub trait Toolchain: Send + Sync {
    /// Materialize an environment at `env_path`
    fn create_environment(&self, env_path: &Path) -> Result<()>;

    /// Install the dependencies declared in `manifest`. `Err` carries the
    /// tool's diagnostic text.
    fn install(&self, env_path: &Path, manifest: &Path) -> std::result::Result<(), String>;

    /// Interpreter that runs scripts inside the environment
    fn interpreter(&self, env_path: &Path) -> PathBuf;
}

impl<T: Toolchain + ?Sized> Toolchain for Arc<T> {
    fn create_environment(&self, env_path: &Path) -> Result<()> {
        (**self).create_environment(env_path)
    }

    fn install(&self, env_path: &Path, manifest: &Path) -> std::result::Result<(), String> {
        (**self).install(env_path, manifest)
    }

    fn interpreter(&self, env_path: &Path) -> PathBuf {
        (**self).interpreter(env_path)
    }
}

/// Python `venv` + `pip`
#[derive(Debug, Clone)]
pub struct PythonVenv {
    python: Option<PathBuf>,
}

impl PythonVenv {
    /// Use `python` to create environments, or search PATH when `None`
    pub fn new(python: Option<PathBuf>) -> Self {
        Self { python }
    }

    fn host_python(&self) -> Result<PathBuf> {
        if let Some(python) = &self.python {
            return Ok(python.clone());
        }
        which::which("python3")
            .or_else(|_| which::which("python"))
            .map_err(|_| DigyError::EnvironmentSetupFailed("python3 or python not found in PATH".to_string()))
    }

    /// pip executable inside `env_path`
    pub fn pip(env_path: &Path) -> PathBuf {
        if cfg!(windows) {
            env_path.join("Scripts").join("pip.exe")
        } else {
            env_path.join("bin").join("pip")
        }
    }
}

impl Toolchain for PythonVenv {
    fn create_environment(&self, env_path: &Path) -> Result<()> {
        let python = self.host_python()?;
        let output = Command::new(&python)
            .arg("-m")
            .arg("venv")
            .arg(env_path)
            .output()
            .map_err(|e| DigyError::EnvironmentSetupFailed(format!("cannot run {}: {}", python.display(), e)))?;

        if !output.status.success() {
            return Err(DigyError::EnvironmentSetupFailed(format!(
                "venv failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn install(&self, env_path: &Path, manifest: &Path) -> std::result::Result<(), String> {
        let pip = Self::pip(env_path);
        let output = Command::new(&pip)
            .arg("install")
            .arg("-r")
            .arg(manifest)
            .output()
            .map_err(|e| format!("cannot run {}: {}", pip.display(), e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }

    fn interpreter(&self, env_path: &Path) -> PathBuf {
        if cfg!(windows) {
            env_path.join("Scripts").join("python.exe")
        } else {
            env_path.join("bin").join("python")
        }
    }
}

/// Runs scripts with a host interpreter and no per-repository installs.
///
/// The environment directory is still created so bookkeeping matches the
/// venv flow; installing a manifest is reported as unsupported.
#[derive(Debug, Clone)]
pub struct SystemInterpreter {
    program: PathBuf,
}

impl SystemInterpreter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Toolchain for SystemInterpreter {
    fn create_environment(&self, env_path: &Path) -> Result<()> {
        std::fs::create_dir_all(env_path)?;
        Ok(())
    }

    fn install(&self, _env_path: &Path, manifest: &Path) -> std::result::Result<(), String> {
        Err(format!(
            "cannot install {} with the system interpreter {}",
            manifest.display(),
            self.program.display()
        ))
    }

    fn interpreter(&self, _env_path: &Path) -> PathBuf {
        self.program.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venv_paths() {
        let venv = PythonVenv::new(None);
        let python = venv.interpreter(Path::new("/fake/venv"));
        let pip = PythonVenv::pip(Path::new("/fake/venv"));

        assert!(python.starts_with("/fake/venv"));
        assert!(pip.starts_with("/fake/venv"));
        if cfg!(windows) {
            assert!(python.ends_with("python.exe"));
            assert!(pip.ends_with("pip.exe"));
        } else {
            assert!(python.ends_with("bin/python"));
            assert!(pip.ends_with("bin/pip"));
        }
    }

    #[test]
    fn test_venv_with_missing_python() {
        let venv = PythonVenv::new(Some(PathBuf::from("/nonexistent/python3")));
        let dir = tempfile::tempdir().unwrap();
        let result = venv.create_environment(&dir.path().join("env"));
        assert!(matches!(result, Err(DigyError::EnvironmentSetupFailed(_))));
    }

    #[test]
    fn test_venv_install_with_missing_pip() {
        let venv = PythonVenv::new(None);
        let result = venv.install(Path::new("/fake/venv"), Path::new("requirements.txt"));
        assert!(result.unwrap_err().contains("cannot run"));
    }

    #[test]
    fn test_system_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("env");
        let system = SystemInterpreter::new("sh");

        system.create_environment(&env_path).unwrap();
        assert!(env_path.is_dir());
        assert_eq!(system.interpreter(&env_path), PathBuf::from("sh"));
        assert!(system.install(&env_path, Path::new("requirements.txt")).is_err());
    }
}
