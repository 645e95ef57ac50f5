//! Worker thread pool for compiler invocations
//!
//! The pool keeps `min_threads` resident workers and grows up to
//! `max_threads` under load. Extra workers exit after `idle_timeout` without
//! work. Host capabilities are resolved once, when the pool is built.
use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;

/// Set when running inside a hermetic build sandbox
pub const HERMETIC_SANDBOX_ENV: &str = "RUNFILES";

/// Compiled-code cache directory of the host runtime
pub const COMPILE_CACHE_ENV: &str = "LIBPACK_COMPILE_CACHE";

/// Set when the runtime cannot share memory with workers
pub const RESTRICTED_RUNTIME_ENV: &str = "LIBPACK_RESTRICTED_RUNTIME";

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Worker pool has been shut down")]
    ShutDown,

    #[error("Task result was lost before completion")]
    Disconnected,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// How a waiting caller is handed a task's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Shared slot guarded by a lock and condition variable
    AtomicWait,
    /// Result sent over a one-shot channel
    MessagePassing,
}

/// Facts about the host, read once from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostCapabilities {
    pub hermetic_sandbox: bool,
    pub restricted_runtime: bool,
    pub compile_cache_dir: Option<PathBuf>,
}

impl HostCapabilities {
    pub fn detect() -> Self {
        Self {
            hermetic_sandbox: std::env::var_os(HERMETIC_SANDBOX_ENV).is_some(),
            restricted_runtime: std::env::var_os(RESTRICTED_RUNTIME_ENV).is_some(),
            compile_cache_dir: std::env::var_os(COMPILE_CACHE_ENV)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn sync_mode(&self) -> SyncMode {
        if self.restricted_runtime {
            SyncMode::MessagePassing
        } else {
            SyncMode::AtomicWait
        }
    }

    /// Environment handed to every worker
    ///
    /// The compile cache is left out under a hermetic sandbox, where on-disk
    /// caches break reproducibility.
    pub fn worker_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let (false, Some(dir)) = (self.hermetic_sandbox, &self.compile_cache_dir) {
            env.insert(
                COMPILE_CACHE_ENV.to_string(),
                dir.to_string_lossy().into_owned(),
            );
        }
        env
    }
}

/// Pool configuration
#[derive(Debug, Clone)]
pub struct WorkerPoolOptions {
    pub min_threads: usize,
    pub max_threads: usize,
    /// How long a worker above `min_threads` may sit idle
    pub idle_timeout: Duration,
    /// Accumulate per-task run time in [`PoolStats`]
    pub record_timing: bool,
    /// Overrides the mode chosen from host capabilities
    pub sync_mode: Option<SyncMode>,
    /// Extra worker environment; wins over detected entries
    pub env: BTreeMap<String, String>,
}

impl Default for WorkerPoolOptions {
    fn default() -> Self {
        Self {
            min_threads: 1,
            max_threads: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            idle_timeout: Duration::from_secs(1),
            record_timing: false,
            sync_mode: None,
            env: BTreeMap::new(),
        }
    }
}

/// What a task can see of the worker running it
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub worker_id: usize,
    pub sync_mode: SyncMode,
    env: Arc<BTreeMap<String, String>>,
}

impl WorkerContext {
    /// Environment to apply to processes spawned by the task
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }
}

/// Counters collected while the pool runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub completed: u64,
    pub panicked: u64,
    pub spawned_threads: u64,
    pub retired_threads: u64,
    pub live_threads: usize,
    /// Total task run time; `None` unless timing is recorded
    pub busy_time: Option<Duration>,
}

type Job = Box<dyn FnOnce(&WorkerContext) + Send + 'static>;

struct State {
    queue: VecDeque<Job>,
    threads: usize,
    idle: usize,
    next_id: usize,
    shutdown: bool,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    panicked: AtomicU64,
    spawned: AtomicU64,
    retired: AtomicU64,
    busy_nanos: AtomicU64,
}

struct Shared {
    state: Mutex<State>,
    available: Condvar,
    counters: Counters,
    live: AtomicUsize,
    options: WorkerPoolOptions,
    sync_mode: SyncMode,
    env: Arc<BTreeMap<String, String>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, succeeded: bool, started: Instant) {
        let counter = if succeeded {
            &self.counters.completed
        } else {
            &self.counters.panicked
        };
        counter.fetch_add(1, Ordering::SeqCst);

        if self.options.record_timing {
            let nanos = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
            self.counters.busy_nanos.fetch_add(nanos, Ordering::SeqCst);
        }
    }
}

/// Thread pool driven by compiler transforms
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Build a pool for the current host
    pub fn new(options: WorkerPoolOptions) -> Result<Self, PoolError> {
        Self::with_capabilities(options, HostCapabilities::detect())
    }

    /// Build a pool for explicitly given host capabilities
    pub fn with_capabilities(
        options: WorkerPoolOptions,
        capabilities: HostCapabilities,
    ) -> Result<Self, PoolError> {
        let mut options = options;
        options.max_threads = options.max_threads.max(1);
        options.min_threads = options.min_threads.min(options.max_threads);

        let sync_mode = options.sync_mode.unwrap_or_else(|| capabilities.sync_mode());
        let mut env = capabilities.worker_env();
        env.extend(options.env.clone());

        tracing::debug!(
            min_threads = options.min_threads,
            max_threads = options.max_threads,
            ?sync_mode,
            cache = env.contains_key(COMPILE_CACHE_ENV),
            "starting worker pool"
        );

        let pool = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    threads: 0,
                    idle: 0,
                    next_id: 0,
                    shutdown: false,
                }),
                available: Condvar::new(),
                counters: Counters::default(),
                live: AtomicUsize::new(0),
                sync_mode,
                env: Arc::new(env),
                options,
            }),
            handles: Mutex::new(Vec::new()),
        };

        for _ in 0..pool.shared.options.min_threads {
            let mut state = pool.shared.lock();
            pool.spawn_worker(&mut state)?;
        }

        Ok(pool)
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.shared.sync_mode
    }

    /// Environment handed to every worker
    pub fn worker_env(&self) -> &BTreeMap<String, String> {
        &self.shared.env
    }

    /// Queue a task
    pub fn execute<F, T>(&self, task: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce(&WorkerContext) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (completion, handle) = completion_pair(self.shared.sync_mode);
        let shared = Arc::clone(&self.shared);
        let job: Job = Box::new(move |ctx| {
            let started = Instant::now();
            let result = catch_unwind(AssertUnwindSafe(|| task(ctx)));
            shared.record(result.is_ok(), started);
            completion.complete(result);
        });

        let mut state = self.shared.lock();
        if state.shutdown {
            return Err(PoolError::ShutDown);
        }
        state.queue.push_back(job);
        if state.queue.len() > state.idle && state.threads < self.shared.options.max_threads {
            self.spawn_worker(&mut state)?;
        }
        drop(state);
        self.shared.available.notify_one();

        Ok(handle)
    }

    pub fn stats(&self) -> PoolStats {
        let counters = &self.shared.counters;
        PoolStats {
            completed: counters.completed.load(Ordering::SeqCst),
            panicked: counters.panicked.load(Ordering::SeqCst),
            spawned_threads: counters.spawned.load(Ordering::SeqCst),
            retired_threads: counters.retired.load(Ordering::SeqCst),
            live_threads: self.shared.live.load(Ordering::SeqCst),
            busy_time: self
                .shared
                .options
                .record_timing
                .then(|| Duration::from_nanos(counters.busy_nanos.load(Ordering::SeqCst))),
        }
    }

    /// Run queued tasks to completion and stop every worker
    pub fn shutdown(&self) {
        self.shared.lock().shutdown = true;
        self.shared.available.notify_all();

        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn spawn_worker(&self, state: &mut State) -> Result<(), PoolError> {
        let id = state.next_id;
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(format!("libpack-worker-{}", id))
            .spawn(move || worker_loop(shared, id))?;

        state.next_id += 1;
        state.threads += 1;
        self.shared.live.fetch_add(1, Ordering::SeqCst);
        self.shared.counters.spawned.fetch_add(1, Ordering::SeqCst);

        if let Ok(mut handles) = self.handles.lock() {
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>, id: usize) {
    let ctx = WorkerContext {
        worker_id: id,
        sync_mode: shared.sync_mode,
        env: Arc::clone(&shared.env),
    };

    loop {
        let job = {
            let mut state = shared.lock();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    break Some(job);
                }
                if state.shutdown {
                    state.threads -= 1;
                    break None;
                }

                state.idle += 1;
                let (next, timeout) = shared
                    .available
                    .wait_timeout(state, shared.options.idle_timeout)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                state = next;
                state.idle -= 1;

                if timeout.timed_out()
                    && state.queue.is_empty()
                    && state.threads > shared.options.min_threads
                {
                    state.threads -= 1;
                    shared.counters.retired.fetch_add(1, Ordering::SeqCst);
                    break None;
                }
            }
        };

        let Some(job) = job else {
            shared.live.fetch_sub(1, Ordering::SeqCst);
            return;
        };

        job(&ctx);
    }
}

type Slot<T> = Arc<(Mutex<Option<thread::Result<T>>>, Condvar)>;

enum Completion<T> {
    Slot(Slot<T>),
    Channel(oneshot::Sender<thread::Result<T>>),
}

impl<T> Completion<T> {
    fn complete(self, result: thread::Result<T>) {
        match self {
            Completion::Slot(slot) => {
                let (lock, ready) = &*slot;
                let mut value = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                *value = Some(result);
                ready.notify_all();
            }
            Completion::Channel(sender) => {
                let _ = sender.send(result);
            }
        }
    }
}

enum Waiter<T> {
    Slot(Slot<T>),
    Channel(oneshot::Receiver<thread::Result<T>>),
}

fn completion_pair<T>(mode: SyncMode) -> (Completion<T>, TaskHandle<T>) {
    match mode {
        SyncMode::AtomicWait => {
            let slot: Slot<T> = Arc::new((Mutex::new(None), Condvar::new()));
            (
                Completion::Slot(Arc::clone(&slot)),
                TaskHandle {
                    waiter: Waiter::Slot(slot),
                },
            )
        }
        SyncMode::MessagePassing => {
            let (sender, receiver) = oneshot::channel();
            (
                Completion::Channel(sender),
                TaskHandle {
                    waiter: Waiter::Channel(receiver),
                },
            )
        }
    }
}

/// Result of a queued task
pub struct TaskHandle<T> {
    waiter: Waiter<T>,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Block the current thread until the task finishes
    ///
    /// Must not be called from inside an async runtime; use [`TaskHandle::wait`].
    pub fn join(self) -> Result<T, PoolError> {
        let result = match self.waiter {
            Waiter::Slot(slot) => wait_slot(&slot),
            Waiter::Channel(receiver) => receiver
                .blocking_recv()
                .map_err(|_| PoolError::Disconnected)?,
        };
        unpack(result)
    }

    /// Wait for the task without blocking the async runtime
    pub async fn wait(self) -> Result<T, PoolError> {
        let result = match self.waiter {
            Waiter::Slot(slot) => tokio::task::spawn_blocking(move || wait_slot(&slot))
                .await
                .map_err(|_| PoolError::Disconnected)?,
            Waiter::Channel(receiver) => receiver.await.map_err(|_| PoolError::Disconnected)?,
        };
        unpack(result)
    }
}

fn wait_slot<T>(slot: &Slot<T>) -> thread::Result<T> {
    let (lock, ready) = &**slot;
    let mut value = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    loop {
        if let Some(result) = value.take() {
            return result;
        }
        value = ready.wait(value).unwrap_or_else(|poisoned| poisoned.into_inner());
    }
}

fn unpack<T>(result: thread::Result<T>) -> Result<T, PoolError> {
    result.map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        PoolError::TaskPanicked(message)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn caps(hermetic: bool, restricted: bool, cache: Option<&str>) -> HostCapabilities {
        HostCapabilities {
            hermetic_sandbox: hermetic,
            restricted_runtime: restricted,
            compile_cache_dir: cache.map(PathBuf::from),
        }
    }

    #[test]
    fn test_sync_mode_from_capabilities() {
        assert_eq!(caps(false, false, None).sync_mode(), SyncMode::AtomicWait);
        assert_eq!(caps(false, true, None).sync_mode(), SyncMode::MessagePassing);
    }

    #[test]
    fn test_cache_propagated_outside_hermetic_sandbox() {
        let env = caps(false, false, Some("/cache")).worker_env();
        assert_eq!(env.get(COMPILE_CACHE_ENV).map(String::as_str), Some("/cache"));

        assert!(caps(true, false, Some("/cache")).worker_env().is_empty());
        assert!(caps(false, false, None).worker_env().is_empty());
    }

    #[test]
    fn test_default_options() {
        let options = WorkerPoolOptions::default();
        assert_eq!(options.min_threads, 1);
        assert!(options.max_threads >= 1);
        assert_eq!(options.idle_timeout, Duration::from_secs(1));
        assert!(!options.record_timing);
    }

    #[test]
    fn test_panic_message_extracted() {
        let result: thread::Result<()> = Err(Box::new("boom"));
        assert!(matches!(unpack(result), Err(PoolError::TaskPanicked(m)) if m == "boom"));
    }
}
