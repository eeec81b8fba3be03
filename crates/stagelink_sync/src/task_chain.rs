//! Chains of deferred work steps with per-step thread affinity.
//!
//! A `TaskChain` is an ordered list of steps. Synchronous steps run on the
//! thread that polls the chain and receive the main-thread state `S`;
//! asynchronous steps run on a rayon worker pool and only see what they
//! captured, so they cannot reach the scene. Data flows between steps
//! through a `Handoff`.
//!
//! Chains never block: `execute` advances as far as it can and returns.
//!
//! ```ignore
//! let result = Handoff::new();
//! let out = result.clone();
//! let chain = TaskChain::start_async(&pool, move || {
//!     out.put(expensive_build());
//!     true
//! })
//! .then_sync(move |state: &mut State| match result.take() {
//!     Some(value) => state.install(value),
//!     None => false,
//! });
//! ```

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::SyncResult;

/// Result of polling a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    InProgress,
    Done,
    Failed,
}

type SyncWork<S> = Box<dyn FnOnce(&mut S) -> bool>;
type AsyncWork = Box<dyn FnOnce() -> bool + Send + 'static>;

enum Step<S> {
    Sync(SyncWork<S>),
    Async(AsyncWork),
}

/// An ordered sequence of sync and async steps.
pub struct TaskChain<S> {
    pool: Arc<ThreadPool>,
    steps: VecDeque<Step<S>>,
    running: Option<Receiver<bool>>,
    failed: bool,
}

impl<S> TaskChain<S> {
    fn empty(pool: &Arc<ThreadPool>) -> Self {
        Self {
            pool: Arc::clone(pool),
            steps: VecDeque::new(),
            running: None,
            failed: false,
        }
    }

    /// Start a chain whose first step runs on the polling thread.
    pub fn start_sync(pool: &Arc<ThreadPool>, work: impl FnOnce(&mut S) -> bool + 'static) -> Self {
        Self::empty(pool).then_sync(work)
    }

    /// Start a chain whose first step is submitted to the pool right away.
    pub fn start_async(
        pool: &Arc<ThreadPool>,
        work: impl FnOnce() -> bool + Send + 'static,
    ) -> Self {
        let mut chain = Self::empty(pool);
        chain.running = Some(chain.submit(Box::new(work)));
        chain
    }

    /// Append a step that runs on the polling thread.
    pub fn then_sync(mut self, work: impl FnOnce(&mut S) -> bool + 'static) -> Self {
        self.steps.push_back(Step::Sync(Box::new(work)));
        self
    }

    /// Append a step that runs on the worker pool.
    pub fn then_async(mut self, work: impl FnOnce() -> bool + Send + 'static) -> Self {
        self.steps.push_back(Step::Async(Box::new(work)));
        self
    }

    fn submit(&self, work: AsyncWork) -> Receiver<bool> {
        let (tx, rx) = mpsc::channel();
        self.pool.spawn(move || {
            // A panicking step drops `tx`, which the poller sees as a failure.
            let ok = work();
            let _ = tx.send(ok);
        });
        rx
    }

    /// Number of steps not yet started.
    pub fn pending_steps(&self) -> usize {
        self.steps.len()
    }

    /// Advance the chain as far as possible without blocking.
    ///
    /// Sync steps run inline; an async step is submitted once it becomes
    /// current and the chain waits for it on later polls. A step returning
    /// false (or a worker panic) fails the chain and drops the rest.
    pub fn execute(&mut self, state: &mut S) -> TaskStatus {
        loop {
            if self.failed {
                return TaskStatus::Failed;
            }

            if let Some(rx) = &self.running {
                match rx.try_recv() {
                    Ok(true) => self.running = None,
                    Ok(false) | Err(TryRecvError::Disconnected) => {
                        self.running = None;
                        self.fail();
                        continue;
                    }
                    Err(TryRecvError::Empty) => return TaskStatus::InProgress,
                }
            }

            match self.steps.pop_front() {
                None => return TaskStatus::Done,
                Some(Step::Sync(work)) => {
                    if !work(state) {
                        self.fail();
                    }
                }
                Some(Step::Async(work)) => {
                    self.running = Some(self.submit(work));
                }
            }
        }
    }

    fn fail(&mut self) {
        self.failed = true;
        self.steps.clear();
    }
}

/// A value passed from one step of a chain to a later one.
pub struct Handoff<T>(Arc<Mutex<Option<T>>>);

impl<T> Handoff<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    pub fn put(&self, value: T) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    pub fn take(&self) -> Option<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Handoff<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Chains keyed by what they build, driven together.
pub struct ChainSet<K, S> {
    chains: Vec<(K, TaskChain<S>)>,
}

impl<K: Clone, S> ChainSet<K, S> {
    pub fn new() -> Self {
        Self { chains: Vec::new() }
    }

    pub fn push(&mut self, key: K, chain: TaskChain<S>) {
        self.chains.push((key, chain));
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Poll every chain once, dropping finished ones.
    ///
    /// Returns the keys of chains that failed during this poll.
    pub fn poll(&mut self, state: &mut S) -> Vec<K> {
        let mut failed = Vec::new();
        self.chains.retain_mut(|(key, chain)| match chain.execute(state) {
            TaskStatus::InProgress => true,
            TaskStatus::Done => false,
            TaskStatus::Failed => {
                failed.push(key.clone());
                false
            }
        });
        failed
    }

    /// Poll until every chain has finished. Returns the keys that failed.
    pub fn run_to_completion(&mut self, state: &mut S) -> Vec<K> {
        let mut failed = Vec::new();
        while !self.chains.is_empty() {
            failed.extend(self.poll(state));
            if !self.chains.is_empty() {
                std::thread::yield_now();
            }
        }
        failed
    }
}

impl<K: Clone, S> Default for ChainSet<K, S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the worker pool async steps run on (`threads == 0` uses one
/// thread per core).
pub fn build_worker_pool(threads: usize) -> SyncResult<Arc<ThreadPool>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("stagelink-worker-{}", i))
        .panic_handler(|_| log::error!("Task chain step panicked on a worker thread"))
        .build()?;
    log::debug!("Started worker pool with {} threads", pool.current_num_threads());
    Ok(Arc::new(pool))
}
