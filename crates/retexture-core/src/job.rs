//! Task Pool
//!
//! Worker threads for fire-and-forget background work.
//! Features:
//! - Named worker threads fed from a shared unbounded queue
//! - Priority and kind tags carried for diagnostics
//! - Explicit drain or discard of queued work on shutdown
//! - Panicking tasks are contained to the task

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

/// Task priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TaskPriority {
    /// Background work nobody waits on
    Low = 0,
    /// Normal priority tasks
    #[default]
    Normal = 1,
    /// Work the frame is likely to need soon
    High = 2,
}

/// What a task spends its time on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskKind {
    /// CPU bound work
    #[default]
    Compute,
    /// Work that blocks on file or device I/O
    IoBlocking,
}

/// Handle to a submitted task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    completed: Arc<AtomicBool>,
    id: u64,
}

impl TaskHandle {
    /// Check if the task has run to completion
    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Get the task ID
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A unit of work that can be executed by the pool
pub trait Task: Send + 'static {
    /// Execute the task, consuming it
    fn run(self: Box<Self>);

    /// Get the task name for debugging
    fn name(&self) -> &str {
        "unnamed_task"
    }

    /// Scheduling priority
    fn priority(&self) -> TaskPriority {
        TaskPriority::Normal
    }

    /// Whether the task blocks on I/O
    fn kind(&self) -> TaskKind {
        TaskKind::Compute
    }
}

/// Wrapper for closure-based tasks
struct ClosureTask<F: FnOnce() + Send + 'static> {
    func: F,
    name: &'static str,
    priority: TaskPriority,
}

impl<F: FnOnce() + Send + 'static> Task for ClosureTask<F> {
    fn run(self: Box<Self>) {
        (self.func)();
    }

    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> TaskPriority {
        self.priority
    }
}

/// How to treat queued work when the pool shuts down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Run everything already queued, then stop
    Drain,
    /// Drop queued tasks without running them
    Discard,
}

/// Internal task wrapper with metadata
struct Envelope {
    task: Box<dyn Task>,
    completed: Arc<AtomicBool>,
    id: u64,
}

struct Shared {
    pending: AtomicUsize,
    discarded: AtomicUsize,
    discard: AtomicBool,
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl Shared {
    fn finish_one(&self) {
        let _guard = self.idle_lock.lock();
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_all();
        }
    }
}

/// Thread pool for background tasks
pub struct TaskPool {
    workers: Vec<JoinHandle<()>>,
    sender: Option<Sender<Envelope>>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl TaskPool {
    /// Create a new pool with the specified number of workers
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let (sender, receiver) = unbounded();
        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
            discard: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
        });

        let workers = (0..num_workers)
            .filter_map(|id| spawn_worker(id, receiver.clone(), shared.clone()))
            .collect::<Vec<_>>();

        if workers.is_empty() {
            log::error!("No task pool workers could be started, tasks will run inline");
        }

        Self {
            workers,
            sender: Some(sender),
            shared,
            next_id: AtomicU64::new(0),
        }
    }

    /// Create a pool with one worker per CPU core
    pub fn with_cores() -> Self {
        let num_cores = thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);
        Self::new(num_cores)
    }

    /// Get the number of live workers
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Submit a task. The caller never waits on it.
    pub fn submit<T: Task>(&self, task: T) -> TaskHandle {
        self.submit_boxed(Box::new(task))
    }

    /// Submit a closure as a task
    pub fn submit_fn<F>(&self, name: &'static str, priority: TaskPriority, func: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(ClosureTask { func, name, priority })
    }

    /// Submit an already boxed task
    pub fn submit_boxed(&self, task: Box<dyn Task>) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let completed = Arc::new(AtomicBool::new(false));
        let handle = TaskHandle {
            completed: completed.clone(),
            id,
        };

        tracing::debug!(
            target: "tasks",
            id,
            name = task.name(),
            priority = ?task.priority(),
            kind = ?task.kind(),
            "Task submitted"
        );

        let envelope = Envelope { task, completed, id };

        let Some(sender) = self.sender.as_ref().filter(|_| !self.workers.is_empty()) else {
            if self.sender.is_none() {
                log::warn!("Task '{}' submitted after shutdown, dropping it", envelope.task.name());
            } else {
                execute(envelope);
            }
            return handle;
        };

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if let Err(err) = sender.send(envelope) {
            // All workers are gone, nothing will ever pick it up.
            log::error!("Task '{}' could not be queued", err.0.task.name());
            self.shared.finish_one();
        }
        handle
    }

    /// Get the number of tasks queued or running
    pub fn pending_tasks(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Check if the pool is idle
    pub fn is_idle(&self) -> bool {
        self.pending_tasks() == 0
    }

    /// Block until every submitted task has finished or been discarded
    pub fn wait_idle(&self) {
        let mut guard = self.shared.idle_lock.lock();
        while self.shared.pending.load(Ordering::Acquire) > 0 {
            self.shared.idle.wait(&mut guard);
        }
    }

    /// Stop the workers. Returns how many queued tasks were dropped unrun.
    pub fn shutdown(&mut self, mode: ShutdownMode) -> usize {
        let Some(sender) = self.sender.take() else {
            return 0;
        };

        if mode == ShutdownMode::Discard {
            self.shared.discard.store(true, Ordering::Release);
        }
        drop(sender);

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Task pool worker exited abnormally");
            }
        }

        let discarded = self.shared.discarded.load(Ordering::Acquire);
        if discarded > 0 {
            log::info!("Task pool shut down, discarded {} queued tasks", discarded);
        }
        discarded
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::with_cores()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown(ShutdownMode::Drain);
    }
}

fn spawn_worker(id: usize, receiver: Receiver<Envelope>, shared: Arc<Shared>) -> Option<JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name(format!("task-worker-{}", id))
        .spawn(move || {
            for envelope in receiver.iter() {
                if shared.discard.load(Ordering::Acquire) {
                    shared.discarded.fetch_add(1, Ordering::Relaxed);
                } else {
                    execute(envelope);
                }
                shared.finish_one();
            }
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(err) => {
            log::error!("Failed to spawn task worker {}: {}", id, err);
            None
        }
    }
}

fn execute(envelope: Envelope) {
    let Envelope { task, completed, id } = envelope;
    let name = task.name().to_string();

    if panic::catch_unwind(AssertUnwindSafe(move || task.run())).is_err() {
        tracing::error!(target: "tasks", id, name = %name, "Task panicked");
        return;
    }

    completed.store(true, Ordering::Release);
    tracing::debug!(target: "tasks", id, name = %name, "Task completed");
}
