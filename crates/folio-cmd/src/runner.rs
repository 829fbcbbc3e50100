//! Command spawning, result capture, and memoization.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use folio_cache::{CacheBucket, NullCacheBucket};
use serde::{Deserialize, Serialize};

use crate::context::ExecContext;
use crate::error::CmdError;
use crate::key::{CmdKey, fingerprint_dir};

/// Poll interval while waiting on a child process. Must stay small so
/// tight deadlines interrupt promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Captured result of a successful command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code the process returned.
    pub exit: i32,
}

/// One command to execute.
#[derive(Debug, Clone)]
pub struct CmdRequest {
    /// Full command line, run through `sh -c`.
    pub command: String,
    /// Working directory for the process.
    pub dir: PathBuf,
    /// Exit code considered success (default 0).
    pub expected_exit: i32,
    /// Whether the result may be persisted in the on-disk cache.
    pub cache: bool,
}

impl CmdRequest {
    /// Create a request with the default expectations (exit 0, no
    /// on-disk caching).
    #[must_use]
    pub fn new(command: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            dir: dir.into(),
            expected_exit: 0,
            cache: false,
        }
    }

    /// Set the exit code considered success.
    #[must_use]
    pub fn expected_exit(mut self, exit: i32) -> Self {
        self.expected_exit = exit;
        self
    }

    /// Allow the result to be persisted in the on-disk cache.
    #[must_use]
    pub fn cached(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

/// An execution in flight; duplicate requests for its key block here.
struct Flight {
    result: Mutex<Option<Result<CmdOutput, CmdError>>>,
    ready: Condvar,
}

/// Executes external commands with per-key at-most-once semantics.
///
/// Three layers keep a side-effecting command from running twice for the
/// same (command, working-directory fingerprint) key:
///
/// 1. a per-run memo of completed successes,
/// 2. a single-flight table — concurrent duplicates block on the first
///    in-flight execution and share its result,
/// 3. optionally, an on-disk [`CacheBucket`] memoizing results across
///    runs (only for requests opting in via [`CmdRequest::cached`]).
pub struct CommandRunner {
    bucket: Box<dyn CacheBucket>,
    completed: Mutex<HashMap<String, CmdOutput>>,
    inflight: Mutex<HashMap<String, Arc<Flight>>>,
}

impl CommandRunner {
    /// Create a runner persisting cacheable results into `bucket`.
    #[must_use]
    pub fn new(bucket: Box<dyn CacheBucket>) -> Self {
        Self {
            bucket,
            completed: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Create a runner without on-disk persistence (per-run memoization
    /// still applies).
    #[must_use]
    pub fn without_cache() -> Self {
        Self::new(Box::new(NullCacheBucket))
    }

    /// Execute a command, observing the context's deadline/cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`CmdError`] on spawn failure, unexpected exit code, I/O
    /// failure, or interruption. An interrupted child is killed and
    /// reaped before this returns.
    pub fn run(&self, req: &CmdRequest, ctx: &ExecContext) -> Result<CmdOutput, CmdError> {
        ctx.check().map_err(|interrupt| CmdError::Interrupted {
            command: req.command.clone(),
            interrupt,
        })?;

        let fingerprint = fingerprint_dir(&req.dir);
        let key = CmdKey {
            command: &req.command,
            dir_fingerprint: &fingerprint,
        }
        .compute_hash();

        // Per-run memo first, then the cross-run disk cache
        if let Some(output) = self.completed.lock().unwrap().get(&key) {
            return Ok(output.clone());
        }
        if req.cache
            && let Some(bytes) = self.bucket.get(&key, "")
            && let Ok(output) = serde_json::from_slice::<CmdOutput>(&bytes)
        {
            tracing::debug!(command = %req.command, "command cache hit");
            self.completed.lock().unwrap().insert(key, output.clone());
            return Ok(output);
        }

        let (flight, leader) = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(&key) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let flight = Arc::new(Flight {
                        result: Mutex::new(None),
                        ready: Condvar::new(),
                    });
                    inflight.insert(key.clone(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };

        if leader {
            let result = spawn_and_wait(req, ctx);

            if let Ok(output) = &result {
                self.completed
                    .lock()
                    .unwrap()
                    .insert(key.clone(), output.clone());
                if req.cache
                    && let Ok(bytes) = serde_json::to_vec(output)
                {
                    self.bucket.put(&key, "", &bytes);
                }
            }

            *flight.result.lock().unwrap() = Some(result.clone());
            flight.ready.notify_all();
            self.inflight.lock().unwrap().remove(&key);
            result
        } else {
            // Block-and-share: wait for the leader's result
            let mut guard = flight.result.lock().unwrap();
            while guard.is_none() {
                guard = flight.ready.wait(guard).unwrap();
            }
            guard.clone().expect("flight result was just observed")
        }
    }
}

/// Spawn the process and wait for it, polling the context.
fn spawn_and_wait(req: &CmdRequest, ctx: &ExecContext) -> Result<CmdOutput, CmdError> {
    tracing::debug!(command = %req.command, dir = %req.dir.display(), "spawning command");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&req.command)
        .current_dir(&req.dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CmdError::Spawn {
            command: req.command.clone(),
            dir: req.dir.clone(),
            message: e.to_string(),
        })?;

    // Drain pipes on their own threads so a chatty child can't fill the
    // pipe buffer and deadlock against our wait loop
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if let Err(interrupt) = ctx.check() {
                    // Kill and reap so the child is never orphaned
                    let _ = child.kill();
                    let _ = child.wait();
                    join(stdout);
                    join(stderr);
                    tracing::debug!(command = %req.command, %interrupt, "command interrupted");
                    return Err(CmdError::Interrupted {
                        command: req.command.clone(),
                        interrupt,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                join(stdout);
                join(stderr);
                return Err(CmdError::Io {
                    command: req.command.clone(),
                    message: e.to_string(),
                });
            }
        }
    };

    let stdout = join(stdout);
    let stderr = join(stderr);
    let exit = status.code().unwrap_or(-1);

    if exit != req.expected_exit {
        return Err(CmdError::ExitMismatch {
            command: req.command.clone(),
            dir: req.dir.clone(),
            expected: req.expected_exit,
            exit,
            stdout,
            stderr,
        });
    }

    Ok(CmdOutput {
        stdout,
        stderr,
        exit,
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut p| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = p.read_to_string(&mut buf);
            buf
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Instant;

    use folio_cache::{Cache, FileCache};
    use tempfile::TempDir;

    use super::*;
    use crate::context::Interrupt;

    #[test]
    fn test_run_captures_stdout() {
        let tmp = TempDir::new().unwrap();
        let runner = CommandRunner::without_cache();
        let req = CmdRequest::new("echo hello", tmp.path());

        let output = runner.run(&req, &ExecContext::background()).unwrap();

        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.exit, 0);
    }

    #[test]
    fn test_run_with_expected_exit() {
        let tmp = TempDir::new().unwrap();
        let runner = CommandRunner::without_cache();
        let req = CmdRequest::new("exit 3", tmp.path()).expected_exit(3);

        let output = runner.run(&req, &ExecContext::background()).unwrap();

        assert_eq!(output.exit, 3);
    }

    #[test]
    fn test_exit_mismatch_carries_diagnostics() {
        let tmp = TempDir::new().unwrap();
        let runner = CommandRunner::without_cache();
        let req = CmdRequest::new("echo oops >&2; exit 2", tmp.path());

        let err = runner.run(&req, &ExecContext::background()).unwrap_err();

        match err {
            CmdError::ExitMismatch {
                expected,
                exit,
                stderr,
                dir,
                ..
            } => {
                assert_eq!(expected, 0);
                assert_eq!(exit, 2);
                assert_eq!(stderr, "oops\n");
                assert_eq!(dir, tmp.path());
            }
            other => panic!("expected ExitMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_deadline_interrupts_quickly() {
        let tmp = TempDir::new().unwrap();
        let runner = CommandRunner::without_cache();
        let req = CmdRequest::new("sleep 2", tmp.path());
        let ctx = ExecContext::with_timeout(Duration::from_millis(1));

        let start = Instant::now();
        let err = runner.run(&req, &ctx).unwrap_err();
        let elapsed = start.elapsed();

        assert!(err.is_deadline(), "expected deadline error, got {err:?}");
        assert!(elapsed < Duration::from_millis(100), "took {elapsed:?}");
    }

    #[test]
    fn test_pre_canceled_context_skips_spawn() {
        let tmp = TempDir::new().unwrap();
        let runner = CommandRunner::without_cache();
        let (ctx, handle) = ExecContext::cancellable();
        handle.cancel();

        let err = runner
            .run(&CmdRequest::new("echo never", tmp.path()), &ctx)
            .unwrap_err();

        assert!(matches!(
            err,
            CmdError::Interrupted {
                interrupt: Interrupt::Canceled,
                ..
            }
        ));
    }

    #[test]
    fn test_same_key_executes_once_per_run() {
        let work = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let marker = out.path().join("marker");
        let runner = CommandRunner::without_cache();
        let req = CmdRequest::new(
            format!("echo once >> {}", marker.display()),
            work.path(),
        );

        runner.run(&req, &ExecContext::background()).unwrap();
        runner.run(&req, &ExecContext::background()).unwrap();

        let lines = fs::read_to_string(&marker).unwrap();
        assert_eq!(lines.lines().count(), 1);
    }

    #[test]
    fn test_concurrent_duplicates_block_and_share() {
        let work = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let marker = out.path().join("marker");
        let runner = Arc::new(CommandRunner::without_cache());
        let req = CmdRequest::new(
            format!("sleep 0.1; echo ran >> {}", marker.display()),
            work.path(),
        );

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let runner = Arc::clone(&runner);
                let req = req.clone();
                thread::spawn(move || runner.run(&req, &ExecContext::background()))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for result in &results {
            assert_eq!(result.as_ref().unwrap().stdout, "");
        }
        let lines = fs::read_to_string(&marker).unwrap();
        assert_eq!(lines.lines().count(), 1, "command must execute exactly once");
    }

    #[test]
    fn test_disk_cache_survives_runner_instances() {
        let work = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let marker = out.path().join("marker");
        let cache = FileCache::new(cache_dir.path().join("cache"), "v1");
        let req = CmdRequest::new(
            format!("echo ran >> {}", marker.display()),
            work.path(),
        )
        .cached(true);

        let first = CommandRunner::new(cache.bucket("results"));
        first.run(&req, &ExecContext::background()).unwrap();

        let second = CommandRunner::new(cache.bucket("results"));
        second.run(&req, &ExecContext::background()).unwrap();

        let lines = fs::read_to_string(&marker).unwrap();
        assert_eq!(lines.lines().count(), 1, "second runner must hit the disk cache");
    }
}
