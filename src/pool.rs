use super::{
    dispatcher::{Dispatcher, DispatcherHandle},
    errors::PoolError,
    handle::Task,
    model::{Counters, PanicHandler, PoolMetrics, TaskPanic},
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::debug;


/// Work queue configuration
#[derive(Clone)]
pub struct Config {
    pub num_workers: usize,
    pub thread_name: String,
    pub stack_size: Option<usize>,
    pub panic_handler: Option<PanicHandler>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            thread_name: "workqueue".to_string(),
            stack_size: None,
            panic_handler: None,
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        Self::default()
    }

    pub fn io_bound() -> Self {
        Self {
            num_workers: num_cpus::get() * 2,
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Called on the worker thread each time a task panics.
    pub fn with_panic_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(TaskPanic) + Send + Sync + 'static,
    {
        self.panic_handler = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("num_workers", &self.num_workers)
            .field("thread_name", &self.thread_name)
            .field("stack_size", &self.stack_size)
            .field("panic_handler", &self.panic_handler.is_some())
            .finish()
    }
}


struct Shared {
    dispatcher: DispatcherHandle,
    counters: Arc<Counters>,
    closed: AtomicBool,
    num_workers: usize,
}

/// Fixed-size pool fed through a rendezvous channel.
///
/// `submit` blocks until the dispatcher has accepted the task, never until a
/// worker is free. Clones share the same pool. Dropping every clone without
/// calling [`WorkQueue::close`] still stops the workers, in the background.
///
/// No ordering is promised between submission and start of execution when
/// more tasks are waiting than workers are idle.
#[derive(Clone)]
pub struct WorkQueue {
    shared: Arc<Shared>,
}

impl WorkQueue {
    pub fn new(num_workers: usize) -> Result<Self, PoolError> {
        Self::with_config(Config::default().with_workers(num_workers))
    }

    /// One worker per available CPU.
    pub fn new_default() -> Result<Self, PoolError> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self, PoolError> {
        if config.num_workers == 0 {
            return Err(PoolError::InvalidWorkerCount(config.num_workers));
        }

        let counters = Arc::new(Counters::default());
        let dispatcher = Dispatcher::spawn(&config, counters.clone())?;

        Ok(Self {
            shared: Arc::new(Shared {
                dispatcher,
                counters,
                closed: AtomicBool::new(false),
                num_workers: config.num_workers,
            }),
        })
    }

    pub fn submit<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_task(Some(Box::new(f)))
    }

    /// Submits an already boxed task. `None` is rejected without touching
    /// the pool.
    pub fn submit_task(&self, task: Option<Task>) -> Result<(), PoolError> {
        let task = task.ok_or(PoolError::EmptyTask)?;
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        self.shared
            .dispatcher
            .submissions
            .send(task)
            .map_err(|_| PoolError::Closed)
    }

    /// Stops accepting work and blocks until every accepted task has run and
    /// all workers have exited.
    ///
    /// Only the first call does the shutdown; later calls return
    /// [`PoolError::AlreadyClosed`]. Must not be called from inside a task of
    /// the same pool, since the calling worker could never be drained.
    pub fn close(&self) -> Result<(), PoolError> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Err(PoolError::AlreadyClosed);
        }

        debug!("closing work queue");
        let _ = self.shared.dispatcher.shutdown.send(());
        self.shared
            .dispatcher
            .finished
            .recv()
            .map_err(|_| PoolError::DispatcherLost)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.shared.num_workers
    }

    pub fn metrics(&self) -> PoolMetrics {
        let counters = &self.shared.counters;
        PoolMetrics {
            workers: self.shared.num_workers,
            live_workers: Counters::load(&counters.live_workers),
            idle_workers: self.shared.dispatcher.registry.len(),
            active_tasks: Counters::load(&counters.active_tasks),
            pending_matches: self.shared.dispatcher.matches.len(),
            submitted: Counters::load(&counters.submitted),
            completed: Counters::load(&counters.completed),
            panicked: Counters::load(&counters.panicked),
        }
    }
}
