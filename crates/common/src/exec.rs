//! External server-command execution
//!
//! A command is spawned directly (no shell) and its stdout is parsed as a
//! single JSON value. The call resolves on whichever happens first:
//! - the accumulated stdout parses, in which case the process is left running
//! - the process exits and its stdout closes
//! - the timeout elapses, in which case the process group gets SIGTERM

use crate::error::CommandError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8192;

/// How long to wait for stderr to close once the process has exited
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// Most stderr kept for a non-zero exit report
const STDERR_LIMIT: usize = 64 * 1024;

/// stderr kept while a command is unresolved
///
/// Only the first `STDERR_LIMIT` bytes are retained. Once the call resolves
/// without needing them, the capture is released and later output is dropped.
#[derive(Default)]
struct StderrCapture {
    buf: Mutex<Vec<u8>>,
    released: AtomicBool,
}

impl StderrCapture {
    fn push(&self, bytes: &[u8]) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        let mut buf = self.buf.lock();
        let room = STDERR_LIMIT.saturating_sub(buf.len());
        buf.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
        *self.buf.lock() = Vec::new();
    }

    fn len(&self) -> usize {
        self.buf.lock().len()
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub timeout: Duration,
    pub cwd: Option<PathBuf>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(crate::DEFAULT_COMMAND_TIMEOUT_MS),
            cwd: None,
        }
    }
}

impl ExecOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

/// Runs a server command and returns its parsed JSON output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(
        &self,
        command: &Path,
        args: &[String],
        options: &ExecOptions,
    ) -> Result<Value, CommandError>;
}

/// Production runner backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessExecutor {
    async fn execute(
        &self,
        command: &Path,
        args: &[String],
        options: &ExecOptions,
    ) -> Result<Value, CommandError> {
        self.run(command, args, options, Arc::new(StderrCapture::default()))
            .await
    }
}

impl ProcessExecutor {
    async fn run(
        &self,
        command: &Path,
        args: &[String],
        options: &ExecOptions,
        stderr_capture: Arc<StderrCapture>,
    ) -> Result<Value, CommandError> {
        let command_str = command.display().to_string();
        let exec_error = |message: String| CommandError::ExecutionError {
            command: command_str.clone(),
            args: args.to_vec(),
            message,
        };

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        // Own process group, so terminal signals aimed at the daemon do not
        // reach the server and a timeout can signal the whole group.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| exec_error(e.to_string()))?;
        debug!("Spawned {} {:?} (pid {:?})", command_str, args, child.id());

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| exec_error("stdout not captured".to_string()))?;
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| spawn_drain(pipe, stderr_capture.clone()));

        let deadline = tokio::time::sleep(options.timeout);
        tokio::pin!(deadline);

        let mut output = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut stdout_open = true;
        let mut exit: Option<ExitStatus> = None;

        while stdout_open || exit.is_none() {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(
                        "Command {} timed out after {}ms, terminating",
                        command_str,
                        options.timeout.as_millis()
                    );
                    stderr_capture.release();
                    if exit.is_none() {
                        terminate(&mut child);
                        tokio::spawn(async move {
                            let _ = child.wait().await;
                        });
                    }
                    return Err(CommandError::Timeout {
                        command: command_str,
                        args: args.to_vec(),
                        timeout_ms: options.timeout.as_millis() as u64,
                    });
                }
                read = stdout.read(&mut chunk), if stdout_open => {
                    match read {
                        Ok(0) => stdout_open = false,
                        Ok(n) => {
                            output.extend_from_slice(&chunk[..n]);
                            if let Some(value) = try_parse(&output) {
                                info!("Command {} produced JSON output", command_str);
                                stderr_capture.release();
                                // Keep draining so a long-running server never
                                // blocks on a full pipe, and reap it on exit.
                                let exited = exit.is_some();
                                tokio::spawn(async move {
                                    let _ = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await;
                                    if !exited {
                                        let _ = child.wait().await;
                                    }
                                });
                                return Ok(value);
                            }
                        }
                        Err(e) => {
                            debug!("stdout read failed for {}: {}", command_str, e);
                            stdout_open = false;
                        }
                    }
                }
                status = child.wait(), if exit.is_none() => {
                    match status {
                        Ok(status) => {
                            debug!("Command {} exited with {}", command_str, status);
                            exit = Some(status);
                        }
                        Err(e) => return Err(exec_error(e.to_string())),
                    }
                }
            }
        }

        let Some(status) = exit else {
            return Err(exec_error("process exit status unavailable".to_string()));
        };

        if !status.success() {
            if let Some(task) = stderr_task {
                let _ = tokio::time::timeout(STDERR_GRACE, task).await;
            }
            let stderr = stderr_capture.text();
            return Err(CommandError::NonZeroExit {
                command: command_str,
                args: args.to_vec(),
                exit_code: status.code().unwrap_or(-1),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output).into_owned();
        let parse_error = if stdout.trim().is_empty() {
            "empty output".to_string()
        } else {
            match serde_json::from_str::<Value>(stdout.trim()) {
                Ok(value) => return Ok(value),
                Err(e) => e.to_string(),
            }
        };

        Err(CommandError::InvalidJson {
            command: command_str,
            args: args.to_vec(),
            stdout,
            parse_error,
        })
    }
}

fn try_parse(buf: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(buf);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn spawn_drain<R>(mut pipe: R, sink: Arc<StderrCapture>) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.push(&chunk[..n]),
            }
        }
    })
}

/// Deliver the cancellation signal to the child's process group.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if killpg(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                return;
            }
        }
    }

    if let Err(e) = child.start_kill() {
        debug!("Failed to signal timed-out command: {}", e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    async fn sh(script: &str, timeout_ms: u64) -> Result<Value, CommandError> {
        ProcessExecutor::new()
            .execute(
                Path::new("/bin/sh"),
                &["-c".to_string(), script.to_string()],
                &ExecOptions::with_timeout(Duration::from_millis(timeout_ms)),
            )
            .await
    }

    #[tokio::test]
    async fn test_parses_json_on_exit() {
        let value = sh(r#"echo '{"status":"stopped","message":"bye"}'"#, 5000)
            .await
            .unwrap();
        assert_eq!(value["status"], "stopped");
    }

    #[tokio::test]
    async fn test_resolves_before_long_running_process_exits() {
        let start = Instant::now();
        let value = sh(r#"echo '{"status":"ready","port":5173}'; sleep 3"#, 10_000)
            .await
            .unwrap();
        assert_eq!(value["port"], 5173);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_json_split_across_writes() {
        let value = sh(r#"printf '{"a":'; sleep 0.2; printf '1}\n'; sleep 3"#, 10_000)
            .await
            .unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn test_invalid_json_on_clean_exit() {
        match sh("echo 'server starting...'", 5000).await.unwrap_err() {
            CommandError::InvalidJson { stdout, parse_error, .. } => {
                assert_eq!(stdout, "server starting...\n");
                assert!(!parse_error.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_output() {
        match sh("exit 0", 5000).await.unwrap_err() {
            CommandError::InvalidJson { parse_error, .. } => assert_eq!(parse_error, "empty output"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_zero_exit_captures_stderr() {
        match sh("echo 'port in use' >&2; exit 3", 5000).await.unwrap_err() {
            CommandError::NonZeroExit { exit_code, stderr, .. } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr.trim(), "port in use");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stderr_dropped_once_ready() {
        let capture = Arc::new(StderrCapture::default());
        let script = r#"echo '{"status":"ready"}'; head -c 4000000 /dev/zero >&2; sleep 3"#;
        let value = ProcessExecutor::new()
            .run(
                Path::new("/bin/sh"),
                &["-c".to_string(), script.to_string()],
                &ExecOptions::with_timeout(Duration::from_secs(10)),
                capture.clone(),
            )
            .await
            .unwrap();
        assert_eq!(value["status"], "ready");

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(capture.len(), 0);
    }

    #[tokio::test]
    async fn test_failure_stderr_is_capped() {
        match sh("head -c 300000 /dev/zero >&2; exit 1", 5000).await.unwrap_err() {
            CommandError::NonZeroExit { stderr, .. } => assert_eq!(stderr.len(), STDERR_LIMIT),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_capture_limit_and_release() {
        let capture = StderrCapture::default();
        capture.push(&[b'x'; 50_000]);
        capture.push(&[b'y'; 50_000]);
        assert_eq!(capture.len(), STDERR_LIMIT);

        capture.release();
        capture.push(b"late");
        assert_eq!(capture.len(), 0);
    }

    #[tokio::test]
    async fn test_timeout() {
        let start = Instant::now();
        let err = sh("sleep 5", 200).await.unwrap_err();
        assert_eq!(err.kind(), "timeout");
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let err = ProcessExecutor::new()
            .execute(
                Path::new("/nonexistent/e2e-dev-server"),
                &["--start".to_string()],
                &ExecOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "execution_error");
        assert_eq!(err.command(), "/nonexistent/e2e-dev-server");
    }
}
