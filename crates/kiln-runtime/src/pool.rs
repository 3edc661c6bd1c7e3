//! Bounded pool of long-lived engine worker processes.
//!
//! The pool owns a fixed table of worker slots, enforces a global concurrency
//! ceiling with a semaphore, and hands each submitted task exactly one free
//! worker for the task's whole duration. Dead workers are not respawned in
//! the background; a crashed slot is replaced on the next acquisition, so
//! respawn cost is tied directly to demand.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, Semaphore};
use tracing::{debug, warn};

use kiln_core::config::DEFAULT_STDERR_CAPACITY;
use kiln_core::{KilnError, Result};

use crate::limit_buffer::LimitBuffer;
use crate::rpc::RpcChannel;
use crate::worker::WorkerProcess;

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;

/// Everything a task needs to talk to its assigned worker.
pub struct TaskContext {
    /// The worker's persistent RPC channel. Used by at most one task at a
    /// time by construction.
    pub channel: Arc<RpcChannel>,
    /// The worker's captured stderr, for annotating failed calls.
    pub diagnostics: Arc<LimitBuffer>,
}

/// Fixed-size pool of engine worker processes.
///
/// Built with explicit configuration and an explicit lifetime: [`start`]
/// warms it up, [`submit`] runs tasks, [`close`] drains and kills it. Share
/// it by reference (`Arc`) with whichever component needs it.
///
/// [`start`]: WorkerPool::start
/// [`submit`]: WorkerPool::submit
/// [`close`]: WorkerPool::close
pub struct WorkerPool {
    max_concurrency: usize,
    program: PathBuf,
    args: Vec<String>,
    stderr_capacity: usize,
    slots: Mutex<Vec<Option<Arc<WorkerProcess>>>>,
    permits: Semaphore,
    state: AtomicU8,
    in_flight: InFlight,
}

/// Join-able counter of currently executing tasks; lets [`WorkerPool::close`]
/// wait for natural completion instead of force-killing active work.
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Releases a claimed worker when the task completes or is dropped mid-await.
struct ClaimGuard<'a> {
    pool: &'a WorkerPool,
    worker: Arc<WorkerProcess>,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.worker.mark_free();
        self.pool.in_flight.exit();
    }
}

impl WorkerPool {
    /// Create a pool with `max_concurrency` worker slots for the given
    /// command. Spawns nothing eagerly; `max_concurrency` is clamped to at
    /// least 1.
    pub fn new(
        max_concurrency: usize,
        program: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            max_concurrency,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stderr_capacity: DEFAULT_STDERR_CAPACITY,
            slots: Mutex::new((0..max_concurrency).map(|_| None).collect()),
            permits: Semaphore::new(max_concurrency),
            state: AtomicU8::new(RUNNING),
            in_flight: InFlight {
                count: AtomicUsize::new(0),
                idle: Notify::new(),
            },
        }
    }

    /// Set the per-worker stderr capture capacity.
    pub fn with_stderr_capacity(mut self, capacity: usize) -> Self {
        self.stderr_capacity = capacity;
        self
    }

    /// The pool's concurrency ceiling.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// The command this pool spawns.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// True once [`close`](WorkerPool::close) has begun.
    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) != RUNNING
    }

    /// Warm up the pool: spawn a worker into every empty or exited slot.
    ///
    /// Live slots are left untouched, so this doubles as a self-healing
    /// call and is safe to invoke repeatedly. Individual spawn failures are
    /// logged and skipped; a later [`submit`](WorkerPool::submit) will try
    /// to fill the gap.
    pub fn start(&self) {
        let mut slots = self.slots.lock().expect("worker slots poisoned");
        for (index, slot) in slots.iter_mut().enumerate() {
            let needs_spawn = match slot {
                None => true,
                Some(worker) => worker.is_exited(),
            };
            if !needs_spawn {
                continue;
            }
            match WorkerProcess::spawn(&self.program, &self.args, self.stderr_capacity) {
                Ok(worker) => {
                    debug!(slot = index, pid = worker.pid(), "worker prespawned");
                    *slot = Some(Arc::new(worker));
                }
                Err(e) => {
                    warn!(slot = index, error = %e, "failed to prespawn worker");
                }
            }
        }
    }

    /// Run one task on a free worker. The pool's only execution entry point.
    ///
    /// Blocks (asynchronously) while `max_concurrency` tasks are already
    /// running, then binds the task to exactly one worker for its whole
    /// duration. Returns [`KilnError::PoolClosed`] once
    /// [`close`](WorkerPool::close) has begun and [`KilnError::Spawn`] when
    /// no worker could be obtained at all; in both cases the task is never
    /// invoked.
    pub async fn submit<F, Fut, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = T>,
    {
        if self.is_closed() {
            return Err(KilnError::PoolClosed);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| KilnError::PoolClosed)?;

        // close() may have begun while we waited for a permit.
        if self.is_closed() {
            return Err(KilnError::PoolClosed);
        }

        let worker = self.claim_worker()?;
        self.in_flight.enter();
        let _guard = ClaimGuard {
            pool: self,
            worker: Arc::clone(&worker),
        };

        let context = TaskContext {
            channel: worker.channel(),
            diagnostics: worker.diagnostics(),
        };
        Ok(task(context).await)
    }

    /// Find a free worker, or make one. Scan-and-claim is atomic under the
    /// slot lock so two tasks can never claim the same worker.
    fn claim_worker(&self) -> Result<Arc<WorkerProcess>> {
        let mut slots = self.slots.lock().expect("worker slots poisoned");

        for slot in slots.iter() {
            if let Some(worker) = slot {
                if worker.is_free() {
                    worker.mark_busy();
                    return Ok(Arc::clone(worker));
                }
            }
        }

        // No free worker; replace the first dead or empty slot that will
        // take a fresh spawn.
        let mut last_error = None;
        for (index, slot) in slots.iter_mut().enumerate() {
            let replaceable = match slot {
                None => true,
                Some(worker) => worker.is_exited(),
            };
            if !replaceable {
                continue;
            }
            match WorkerProcess::spawn(&self.program, &self.args, self.stderr_capacity) {
                Ok(worker) => {
                    worker.mark_busy();
                    debug!(slot = index, pid = worker.pid(), "worker respawned on demand");
                    let worker = Arc::new(worker);
                    *slot = Some(Arc::clone(&worker));
                    return Ok(worker);
                }
                Err(e) => {
                    warn!(slot = index, error = %e, "failed to respawn worker");
                    last_error = Some(e);
                }
            }
        }

        // Every slot holds a busy worker; grow while below the ceiling.
        if slots.len() < self.max_concurrency {
            match WorkerProcess::spawn(&self.program, &self.args, self.stderr_capacity) {
                Ok(worker) => {
                    worker.mark_busy();
                    let worker = Arc::new(worker);
                    slots.push(Some(Arc::clone(&worker)));
                    return Ok(worker);
                }
                Err(e) => last_error = Some(e),
            }
        }

        // The semaphore bounds busy workers to max_concurrency, so reaching
        // this point without a spawn error would be a bookkeeping bug.
        Err(last_error
            .unwrap_or_else(|| KilnError::internal("no free worker slot available")))
    }

    /// Shut the pool down.
    ///
    /// New submissions are rejected immediately, in-flight tasks finish
    /// naturally, then every worker is killed. Kill errors are aggregated:
    /// all workers are attempted and the first error is returned. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.state.store(STOPPING, Ordering::Release);
        self.permits.close();
        self.in_flight.wait_idle().await;

        let workers: Vec<Arc<WorkerProcess>> = {
            let mut slots = self.slots.lock().expect("worker slots poisoned");
            slots.iter_mut().filter_map(|slot| slot.take()).collect()
        };

        let mut first_error = None;
        for worker in workers {
            if let Err(e) = worker.kill().await {
                warn!(error = %e, "failed to kill worker during close");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        self.state.store(STOPPED, Ordering::Release);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Process ids of the live workers currently in the slot table.
    pub fn worker_pids(&self) -> Vec<u32> {
        let slots = self.slots.lock().expect("worker slots poisoned");
        slots
            .iter()
            .flatten()
            .filter(|worker| !worker.is_exited())
            .filter_map(|worker| worker.pid())
            .collect()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("max_concurrency", &self.max_concurrency)
            .field("program", &self.program)
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
