//! Timeout-bounded script execution

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::DigyError;

/// Default wall-clock bound for one execution
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// How often the child is polled for exit, timeout and abort
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Minimum wait for the output pipes to drain once the child is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Outcome of one script execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` when the child was killed or never started
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub aborted: bool,
    pub duration: Duration,
}

impl ExecutionResult {
    /// Result for a child that could not be started
    pub fn not_started(message: String) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message,
            exit_code: None,
            timed_out: false,
            aborted: false,
            duration: Duration::ZERO,
        }
    }

    /// The failure this result represents, if any
    pub fn error(&self) -> Option<DigyError> {
        if self.success {
            None
        } else if self.timed_out {
            Some(DigyError::ExecutionTimeout(self.duration.as_secs()))
        } else if self.aborted {
            Some(DigyError::ExecutionFailed("aborted".to_string()))
        } else {
            let reason = match self.exit_code {
                Some(code) => format!("exit code {}", code),
                None => self.stderr.lines().next().unwrap_or("terminated").to_string(),
            };
            Some(DigyError::ExecutionFailed(reason))
        }
    }
}

enum Completion {
    Exited(ExitStatus),
    TimedOut,
    Aborted,
    WaitFailed(std::io::Error),
}

/// Runs scripts under an interpreter with captured output and a timeout
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: PathBuf,
    working_dir: PathBuf,
    timeout: Duration,
    envs: Vec<(String, String)>,
    abort: Option<Arc<AtomicBool>>,
}

impl ScriptRunner {
    /// Create a runner executing in `working_dir`
    pub fn new(interpreter: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            working_dir: working_dir.into(),
            timeout: DEFAULT_TIMEOUT,
            envs: Vec::new(),
            abort: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set an environment variable for the child
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Kill the child when `flag` becomes true
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `script` with `args`. Never fails: spawn errors, timeouts and
    /// aborts are all reported in the result.
    pub fn run(&self, script: &Path, args: &[String]) -> ExecutionResult {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(script)
            .args(args)
            .current_dir(&self.working_dir)
            .env("PYTHONUNBUFFERED", "1")
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group so a kill reaches grandchildren too
            command.process_group(0);
        }

        let start = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult::not_started(format!(
                    "Failed to start {}: {}",
                    self.interpreter.display(),
                    e
                ));
            }
        };

        tracing::debug!(
            pid = child.id(),
            script = %script.display(),
            timeout_secs = self.timeout.as_secs(),
            "Script started"
        );

        // Drain pipes while the child runs; a full pipe would block it
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let completion = self.wait(&mut child, start);
        let duration = start.elapsed();

        // Background processes left by the script still hold the pipes
        kill_group(&child);
        let deadline = Instant::now() + self.timeout.saturating_sub(start.elapsed()).max(DRAIN_GRACE);
        let stdout = drain(stdout_reader, deadline, &child);
        let stderr = drain(stderr_reader, deadline, &child);

        match completion {
            Completion::Exited(status) => ExecutionResult {
                success: status.success(),
                stdout,
                stderr,
                exit_code: status.code(),
                timed_out: false,
                aborted: false,
                duration,
            },
            Completion::TimedOut => {
                tracing::warn!(script = %script.display(), timeout_secs = self.timeout.as_secs(), "Script timed out");
                ExecutionResult {
                    success: false,
                    stdout,
                    stderr: format!("Execution timed out after {} seconds", self.timeout.as_secs()),
                    exit_code: None,
                    timed_out: true,
                    aborted: false,
                    duration,
                }
            }
            Completion::Aborted => {
                tracing::warn!(script = %script.display(), "Script aborted");
                ExecutionResult {
                    success: false,
                    stdout,
                    stderr: "Execution aborted".to_string(),
                    exit_code: None,
                    timed_out: false,
                    aborted: true,
                    duration,
                }
            }
            Completion::WaitFailed(e) => ExecutionResult {
                success: false,
                stdout,
                stderr: format!("Failed to wait for script: {}", e),
                exit_code: None,
                timed_out: false,
                aborted: false,
                duration,
            },
        }
    }

    fn wait(&self, child: &mut Child, start: Instant) -> Completion {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Completion::Exited(status),
                Ok(None) => {
                    if start.elapsed() >= self.timeout {
                        terminate(child);
                        return Completion::TimedOut;
                    }
                    if self.abort.as_ref().map_or(false, |f| f.load(Ordering::SeqCst)) {
                        terminate(child);
                        return Completion::Aborted;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    terminate(child);
                    return Completion::WaitFailed(e);
                }
            }
        }
    }
}

/// Kill the child (and its process group on unix) and reap it
fn terminate(child: &mut Child) {
    kill_group(child);
    let _ = child.kill();
    if let Err(e) = child.wait() {
        tracing::warn!(pid = child.id(), error = %e, "Could not reap child");
    }
}

/// SIGKILL the process group the child leads. Harmless once it is empty.
fn kill_group(child: &Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: plain syscall on a process group this runner created
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = child;
}

/// Output collected from one pipe by a background thread
struct PipeReader {
    captured: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<PipeReader> {
    pipe.map(|mut pipe| {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&captured);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .extend_from_slice(&chunk[..n]),
                }
            }
            let _ = tx.send(());
        });
        PipeReader { captured, done }
    })
}

/// Wait for a pipe to reach EOF until `deadline`, then return whatever it
/// delivered. A reader still blocked at the deadline is left detached.
fn drain(reader: Option<PipeReader>, deadline: Instant, child: &Child) -> String {
    let Some(reader) = reader else {
        return String::new();
    };

    let wait = deadline.saturating_duration_since(Instant::now());
    if let Err(RecvTimeoutError::Timeout) = reader.done.recv_timeout(wait) {
        tracing::warn!(pid = child.id(), "Output pipe still open after the script ended; keeping partial output");
        kill_group(child);
    }

    let captured = reader
        .captured
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    String::from_utf8_lossy(&captured).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_run_success_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let ok = script(dir.path(), "ok.sh", "echo hello; echo \"args: $1 $2\"\n");
        let runner = ScriptRunner::new("sh", dir.path());

        let result = runner.run(&ok, &["a".to_string(), "b".to_string()]);
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("hello"));
        assert!(result.stdout.contains("args: a b"));
        assert!(result.error().is_none());
    }

    #[test]
    fn test_run_failure_captures_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let bad = script(dir.path(), "bad.sh", "echo 'ValueError: Test error' >&2; exit 3\n");
        let runner = ScriptRunner::new("sh", dir.path());

        let result = runner.run(&bad, &[]);
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert!(result.stderr.contains("ValueError: Test error"));
        assert!(matches!(result.error(), Some(DigyError::ExecutionFailed(_))));
    }

    #[test]
    fn test_run_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let slow = script(
            dir.path(),
            "slow.sh",
            &format!("echo $$ > {}; exec sleep 30\n", pid_file.display()),
        );
        let runner = ScriptRunner::new("sh", dir.path()).with_timeout(Duration::from_millis(500));

        let result = runner.run(&slow, &[]);
        assert!(!result.success);
        assert!(result.timed_out);
        assert!(result.stderr.contains("timed out"));
        assert!(result.duration < Duration::from_secs(10));
        assert!(matches!(result.error(), Some(DigyError::ExecutionTimeout(_))));

        let pid: libc::pid_t = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        // SAFETY: signal 0 only checks for existence
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        assert!(!alive);
    }

    #[test]
    fn test_run_abort_flag() {
        let dir = tempfile::tempdir().unwrap();
        let slow = script(dir.path(), "slow.sh", "sleep 30\n");
        let flag = Arc::new(AtomicBool::new(true));
        let runner = ScriptRunner::new("sh", dir.path()).with_abort_flag(flag);

        let result = runner.run(&slow, &[]);
        assert!(result.aborted);
        assert!(!result.success);
    }

    #[test]
    fn test_run_passes_env() {
        let dir = tempfile::tempdir().unwrap();
        let env = script(dir.path(), "env.sh", "echo \"$DIGY_AUTH_METHOD\"\n");
        let runner = ScriptRunner::new("sh", dir.path()).with_env("DIGY_AUTH_METHOD", "web");

        let result = runner.run(&env, &[]);
        assert_eq!(result.stdout.trim(), "web");
    }

    #[test]
    fn test_missing_interpreter_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ok = script(dir.path(), "ok.sh", "true\n");
        let runner = ScriptRunner::new("/nonexistent/interpreter", dir.path());

        let result = runner.run(&ok, &[]);
        assert!(!result.success);
        assert!(result.stderr.starts_with("Failed to start"));
    }

    /// Running, not merely a zombie waiting for its reaper
    fn is_running(pid: libc::pid_t) -> bool {
        // SAFETY: signal 0 only checks for existence
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        match fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map_or(true, |(_, rest)| !rest.trim_start().starts_with('Z')),
            Err(_) => !Path::new("/proc/self").exists(),
        }
    }

    #[test]
    fn test_background_child_does_not_outlive_run() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("bg.pid");
        let bg = script(
            dir.path(),
            "bg.sh",
            &format!("sleep 30 &\necho $! > {}\necho done\n", pid_file.display()),
        );
        let runner = ScriptRunner::new("sh", dir.path()).with_timeout(Duration::from_secs(1));

        let start = Instant::now();
        let result = runner.run(&bg, &[]);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(result.success);
        assert!(!result.timed_out);
        assert!(result.stdout.contains("done"));

        let pid: libc::pid_t = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        let gone_by = Instant::now() + Duration::from_secs(3);
        while is_running(pid) && Instant::now() < gone_by {
            thread::sleep(Duration::from_millis(50));
        }
        assert!(!is_running(pid));
    }

    #[test]
    fn test_large_output_does_not_deadlock() {
        let dir = tempfile::tempdir().unwrap();
        let big = script(dir.path(), "big.sh", "i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done\n");
        let runner = ScriptRunner::new("sh", dir.path()).with_timeout(Duration::from_secs(60));

        let result = runner.run(&big, &[]);
        assert!(result.success);
        assert!(result.stdout.contains("line-19999"));
    }
}
