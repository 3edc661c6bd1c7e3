//! One engine worker: a subprocess plus its RPC channel and stderr capture.
//!
//! A [`WorkerProcess`] is created by the pool when a task needs a worker and
//! none is free, and destroyed when the pool closes or replaces a dead slot.
//! It has no identity outside its owning pool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{watch, Notify};
use tracing::{debug, trace, warn};

use kiln_core::{KilnError, Result};

use crate::limit_buffer::LimitBuffer;
use crate::rpc::RpcChannel;

/// One OS subprocess with a persistent RPC channel on its stdin/stdout and a
/// bounded capture of its stderr.
///
/// The busy flag is toggled only by the pool, under the pool's slot lock, so
/// scan-and-claim stays atomic. Exit detection is push-based: a waiter task
/// owns the child handle and fires the exit signal exactly once, whether the
/// process crashed, exited normally, or was killed.
pub struct WorkerProcess {
    program: PathBuf,
    pid: Option<u32>,
    channel: Arc<RpcChannel>,
    diagnostics: Arc<LimitBuffer>,
    busy: AtomicBool,
    exit: Arc<ExitState>,
    kill_tx: watch::Sender<bool>,
}

/// Single-fire exit signal shared with the waiter task.
struct ExitState {
    fired: AtomicBool,
    notify: Notify,
    kill_error: std::sync::Mutex<Option<std::io::Error>>,
}

impl ExitState {
    fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            notify: Notify::new(),
            kill_error: std::sync::Mutex::new(None),
        }
    }

    fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn record_kill_error(&self, err: std::io::Error) {
        let mut slot = self.kill_error.lock().expect("exit state poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

impl WorkerProcess {
    /// Launch a worker subprocess and wire up its pipes.
    ///
    /// Must be called from within a tokio runtime: the exit waiter and the
    /// stderr pump run as background tasks. Fails with [`KilnError::Spawn`]
    /// when the executable cannot be launched or a pipe cannot be attached;
    /// a half-initialized worker never escapes (the child is killed on drop).
    pub fn spawn(program: &Path, args: &[String], stderr_capacity: usize) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            KilnError::spawn_with_source(format!("failed to launch {}", program.display()), e)
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| KilnError::spawn("stdin pipe unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| KilnError::spawn("stdout pipe unavailable"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| KilnError::spawn("stderr pipe unavailable"))?;

        let pid = child.id();
        debug!(program = %program.display(), pid, "worker spawned");

        // Pump stderr into the bounded capture buffer until the pipe closes.
        let diagnostics = Arc::new(LimitBuffer::new(stderr_capacity));
        let capture = Arc::clone(&diagnostics);
        tokio::spawn(async move {
            let mut chunk = [0u8; 4096];
            loop {
                match stderr.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        capture.write(&chunk[..n]);
                    }
                }
            }
        });

        // The waiter owns the child handle. It fires the exit signal when the
        // process terminates for any reason; a kill request (or the worker
        // handle being dropped) makes it terminate the process first.
        let (kill_tx, mut kill_rx) = watch::channel(false);
        let exit = Arc::new(ExitState::new());
        let waiter_exit = Arc::clone(&exit);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx.changed() => {
                    if let Err(e) = child.start_kill() {
                        // Racing a natural exit is fine; anything else is
                        // reported back through kill().
                        if e.kind() != std::io::ErrorKind::InvalidInput {
                            waiter_exit.record_kill_error(e);
                        }
                    }
                    child.wait().await
                }
            };
            match status {
                Ok(status) => trace!(pid, %status, "worker exited"),
                Err(e) => warn!(pid, error = %e, "failed waiting on worker"),
            }
            waiter_exit.fire();
        });

        Ok(Self {
            program: program.to_path_buf(),
            pid,
            channel: Arc::new(RpcChannel::new(stdout, stdin)),
            diagnostics,
            busy: AtomicBool::new(false),
            exit,
            kill_tx,
        })
    }

    /// Non-blocking exit check; true forever once the process terminated.
    pub fn is_exited(&self) -> bool {
        self.exit.fired.load(Ordering::Acquire)
    }

    /// True when this worker can accept a task.
    pub fn is_free(&self) -> bool {
        !self.is_exited() && !self.busy.load(Ordering::Acquire)
    }

    /// Claim this worker for one task. Pool-synchronized.
    pub fn mark_busy(&self) {
        self.busy.store(true, Ordering::Release);
    }

    /// Release this worker after a task. Pool-synchronized.
    pub fn mark_free(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// The worker's RPC channel.
    pub fn channel(&self) -> Arc<RpcChannel> {
        Arc::clone(&self.channel)
    }

    /// The worker's captured stderr.
    pub fn diagnostics(&self) -> Arc<LimitBuffer> {
        Arc::clone(&self.diagnostics)
    }

    /// OS process id, when the handle still knows it.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Await the exit signal.
    pub async fn wait_exited(&self) {
        loop {
            let notified = self.exit.notify.notified();
            if self.is_exited() {
                return;
            }
            notified.await;
        }
    }

    /// Terminate the worker process. Idempotent.
    ///
    /// A no-op returning `Ok(())` on an already-exited worker. Otherwise
    /// requests termination, awaits the exit signal, and reports the kill
    /// error if the termination signal could not be delivered.
    pub async fn kill(&self) -> Result<()> {
        if self.is_exited() {
            return Ok(());
        }
        // Ignore send failure: the waiter only goes away after firing exit.
        let _ = self.kill_tx.send(true);
        self.wait_exited().await;

        let recorded = self
            .exit
            .kill_error
            .lock()
            .expect("exit state poisoned")
            .take();
        match recorded {
            Some(e) => Err(KilnError::io("killing worker", &self.program, e)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("program", &self.program)
            .field("pid", &self.pid)
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .field("exited", &self.is_exited())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> WorkerProcess {
        WorkerProcess::spawn(
            Path::new("/bin/sh"),
            &["-c".to_string(), script.to_string()],
            1024,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let err = WorkerProcess::spawn(Path::new("/nonexistent/kiln-engine"), &[], 1024)
            .unwrap_err();
        assert!(matches!(err, KilnError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_exit_signal_fires_on_natural_exit() {
        let worker = sh("exit 0");
        worker.wait_exited().await;
        assert!(worker.is_exited());
        assert!(!worker.is_free());
    }

    #[tokio::test]
    async fn test_kill_terminates_long_running_worker() {
        let worker = sh("sleep 30");
        assert!(!worker.is_exited());
        worker.kill().await.unwrap();
        assert!(worker.is_exited());
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let worker = sh("sleep 30");
        worker.kill().await.unwrap();
        worker.kill().await.unwrap();
        assert!(worker.is_exited());
    }

    #[tokio::test]
    async fn test_kill_after_natural_exit_is_noop() {
        let worker = sh("exit 3");
        worker.wait_exited().await;
        worker.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_stderr_is_captured() {
        let worker = sh("echo diagnostic output >&2; sleep 30");
        let diagnostics = worker.diagnostics();
        for _ in 0..200 {
            if !diagnostics.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(diagnostics.drain_to_string().contains("diagnostic output"));
        worker.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_busy_flag_toggles() {
        let worker = sh("sleep 30");
        assert!(worker.is_free());
        worker.mark_busy();
        assert!(!worker.is_free());
        worker.mark_free();
        assert!(worker.is_free());
        worker.kill().await.unwrap();
    }
}
