use super::{
    errors::PoolError,
    handle::Task,
    model::Counters,
    pool::Config,
    registry::IdleRegistry,
    worker::Worker,
};
use std::{sync::Arc, thread};
use crossbeam::channel::{self, select, Receiver, Sender};
use tokio::runtime::{Builder, Runtime};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};


/// Caller-side ends of a running dispatcher.
pub(crate) struct DispatcherHandle {
    pub submissions: Sender<Task>,
    pub shutdown: Sender<()>,
    pub finished: Receiver<()>,
    pub registry: Arc<IdleRegistry>,
    pub matches: TaskTracker,
}

/// Matches submitted tasks to idle workers.
///
/// The accept loop runs on its own thread and never waits for a worker:
/// every accepted task gets a matching future on a small runtime, and those
/// futures race for handles in the registry. Start order therefore does not
/// follow submission order once workers are contended.
pub(crate) struct Dispatcher {
    registry: Arc<IdleRegistry>,
    workers: Vec<Worker>,
    runtime: Runtime,
    matches: TaskTracker,
    counters: Arc<Counters>,
}

impl Dispatcher {
    pub fn spawn(config: &Config, counters: Arc<Counters>) -> Result<DispatcherHandle, PoolError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(format!("{}-matcher", config.thread_name))
            .build()?;

        let registry = Arc::new(IdleRegistry::new(config.num_workers));
        let mut dispatcher = Dispatcher {
            registry: registry.clone(),
            workers: Vec::with_capacity(config.num_workers),
            runtime,
            matches: TaskTracker::new(),
            counters: counters.clone(),
        };

        for id in 0..config.num_workers {
            let spawned = Worker::spawn(
                id,
                &config.thread_name,
                config.stack_size,
                registry.clone(),
                counters.clone(),
                config.panic_handler.clone(),
            );
            match spawned {
                Ok(worker) => dispatcher.workers.push(worker),
                Err(err) => {
                    error!(worker = id, %err, "failed to start worker, stopping the rest");
                    dispatcher.drain();
                    return Err(err);
                }
            }
        }

        let (submissions, accepted) = channel::bounded::<Task>(0);
        let (shutdown, shutdown_rx) = channel::bounded::<()>(0);
        let (finished_tx, finished) = channel::bounded::<()>(1);
        let matches = dispatcher.matches.clone();

        // handed over only once the thread exists, so a failed spawn can
        // still stop the workers from here
        let (handoff_tx, handoff_rx) = channel::bounded::<Dispatcher>(1);
        let started = thread::Builder::new()
            .name(format!("{}-dispatcher", config.thread_name))
            .spawn(move || {
                if let Ok(dispatcher) = handoff_rx.recv() {
                    dispatcher.run(accepted, shutdown_rx);
                }
                let _ = finished_tx.send(());
            });

        match started {
            Ok(_) => {
                let _ = handoff_tx.send(dispatcher);
            }
            Err(err) => {
                dispatcher.drain();
                return Err(PoolError::Spawn(err));
            }
        }

        info!(workers = config.num_workers, "work queue started");
        Ok(DispatcherHandle {
            submissions,
            shutdown,
            finished,
            registry,
            matches,
        })
    }

    fn run(self, accepted: Receiver<Task>, shutdown: Receiver<()>) {
        loop {
            select! {
                recv(accepted) -> task => match task {
                    Ok(task) => self.dispatch(task),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }

        // submitters still blocked on the rendezvous now fail with Closed
        drop(accepted);
        debug!(pending = self.matches.len(), "dispatcher stopped accepting");
        self.drain();
    }

    fn dispatch(&self, task: Task) {
        Counters::bump(&self.counters.submitted);
        let registry = self.registry.clone();

        self.matches.spawn_on(
            async move {
                let Some(worker) = registry.take().await else {
                    error!("idle registry yielded no handle; task dropped");
                    return;
                };
                if let Err(err) = worker.assign(task) {
                    error!(worker = worker.id(), %err, "idle worker refused a task; task dropped");
                }
            },
            self.runtime.handle(),
        );
    }

    /// Waits for outstanding matches, then closes every worker exactly once.
    fn drain(mut self) {
        self.matches.close();
        self.runtime.block_on(self.matches.wait());

        for _ in 0..self.workers.len() {
            match self.runtime.block_on(self.registry.take()) {
                Some(handle) => {
                    if !handle.close() {
                        error!(worker = handle.id(), "worker rejected close");
                    }
                }
                None => error!("idle registry yielded no handle during shutdown"),
            }
        }

        let stopped = self.workers.len();
        for worker in self.workers.drain(..) {
            worker.join();
        }
        info!(workers = stopped, "work queue stopped");
    }
}
