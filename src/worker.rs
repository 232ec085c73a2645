use super::{
    errors::PoolError,
    handle::{Message, Task, WorkerHandle},
    model::{Counters, PanicHandler, TaskPanic},
    registry::IdleRegistry,
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};
use crossbeam::channel::Receiver;
use tracing::{debug, error, warn};


/// Join side of a worker thread, owned by the dispatcher.
pub(crate) struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

/// Keeps `live_workers` honest even if the loop unwinds.
struct LiveGuard {
    id: usize,
    counters: Arc<Counters>,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        Counters::drop_one(&self.counters.live_workers);
        debug!(worker = self.id, "worker stopped");
    }
}

struct WorkerLoop {
    id: usize,
    handle: WorkerHandle,
    inbox: Receiver<Message>,
    registry: Arc<IdleRegistry>,
    counters: Arc<Counters>,
    panic_handler: Option<PanicHandler>,
}

impl Worker {
    /// Starts the thread, then registers its handle as idle.
    pub fn spawn(
        id: usize,
        thread_name: &str,
        stack_size: Option<usize>,
        registry: Arc<IdleRegistry>,
        counters: Arc<Counters>,
        panic_handler: Option<PanicHandler>,
    ) -> Result<Self, PoolError> {
        let (handle, inbox) = WorkerHandle::new(id);

        let mut builder = thread::Builder::new().name(format!("{thread_name}-worker-{id}"));
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }

        let worker = WorkerLoop {
            id,
            handle: handle.clone(),
            inbox,
            registry: registry.clone(),
            counters: counters.clone(),
            panic_handler,
        };

        Counters::bump(&counters.live_workers);
        let thread = match builder.spawn(move || worker.run()) {
            Ok(thread) => thread,
            Err(err) => {
                Counters::drop_one(&counters.live_workers);
                return Err(PoolError::Spawn(err));
            }
        };

        let worker = Self { id, thread };
        if let Err(err) = registry.put(handle.clone()) {
            handle.close();
            worker.join();
            return Err(err);
        }
        Ok(worker)
    }

    pub fn join(self) {
        if self.thread.join().is_err() {
            warn!(worker = self.id, "worker thread panicked outside a task");
        }
    }
}

impl WorkerLoop {
    fn run(self) {
        let _live = LiveGuard {
            id: self.id,
            counters: self.counters.clone(),
        };

        while let Ok(message) = self.inbox.recv() {
            match message {
                Message::Run(task) => {
                    self.execute(task);
                    if let Err(err) = self.registry.put(self.handle.clone()) {
                        error!(worker = self.id, %err, "worker could not re-register");
                        break;
                    }
                }
                Message::Close => break,
            }
        }
    }

    fn execute(&self, task: Task) {
        Counters::bump(&self.counters.active_tasks);
        let outcome = panic::catch_unwind(AssertUnwindSafe(task));
        Counters::drop_one(&self.counters.active_tasks);

        match outcome {
            Ok(()) => Counters::bump(&self.counters.completed),
            Err(payload) => {
                Counters::bump(&self.counters.panicked);
                let fault = TaskPanic::from_payload(self.id, payload.as_ref());
                warn!(worker = self.id, message = %fault.message, "task panicked");
                if let Some(handler) = &self.panic_handler {
                    let reported = panic::catch_unwind(AssertUnwindSafe(|| handler(fault)));
                    if let Err(payload) = reported {
                        let nested = TaskPanic::from_payload(self.id, payload.as_ref());
                        error!(worker = self.id, message = %nested.message, "panic handler panicked");
                    }
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{atomic::Ordering, Mutex},
        time::Duration,
    };

    fn take_blocking(registry: &IdleRegistry) -> WorkerHandle {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(registry.take()).unwrap()
    }

    #[test]
    fn worker_registers_runs_and_reregisters() {
        let registry = Arc::new(IdleRegistry::new(1));
        let counters = Arc::new(Counters::default());
        let worker = Worker::spawn(0, "test", None, registry.clone(), counters.clone(), None).unwrap();
        assert_eq!(registry.len(), 1);

        let (done_tx, done_rx) = crossbeam::channel::bounded(1);
        let handle = take_blocking(&registry);
        assert!(handle.assign(Box::new(move || done_tx.send(()).unwrap())).is_ok());
        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        let handle = take_blocking(&registry);
        assert_eq!(handle.id(), 0);
        assert!(handle.close());
        worker.join();

        assert_eq!(counters.completed.load(Ordering::Acquire), 1);
        assert_eq!(counters.live_workers.load(Ordering::Acquire), 0);
    }

    #[test]
    fn panicking_task_is_reported_and_worker_survives() {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));

        let registry = Arc::new(IdleRegistry::new(1));
        let counters = Arc::new(Counters::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: PanicHandler = Arc::new(move |fault: TaskPanic| sink.lock().unwrap().push(fault));

        let worker =
            Worker::spawn(5, "test", None, registry.clone(), counters.clone(), Some(handler)).unwrap();

        let handle = take_blocking(&registry);
        assert!(handle.assign(Box::new(|| panic!("task failed"))).is_ok());

        // the worker only comes back to the registry if it survived the panic
        let handle = take_blocking(&registry);
        assert!(handle.close());
        worker.join();

        panic::set_hook(previous);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], TaskPanic { worker: 5, message: "task failed".into() });
        assert_eq!(counters.panicked.load(Ordering::Acquire), 1);
    }

    #[test]
    fn panicking_handler_does_not_kill_worker() {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));

        let registry = Arc::new(IdleRegistry::new(1));
        let counters = Arc::new(Counters::default());
        let handler: PanicHandler = Arc::new(|_: TaskPanic| panic!("handler failed"));

        let worker =
            Worker::spawn(2, "test", None, registry.clone(), counters.clone(), Some(handler)).unwrap();

        let handle = take_blocking(&registry);
        assert!(handle.assign(Box::new(|| panic!("task failed"))).is_ok());

        let handle = take_blocking(&registry);
        assert!(handle.close());
        worker.join();

        panic::set_hook(previous);

        assert_eq!(counters.panicked.load(Ordering::Acquire), 1);
        assert_eq!(counters.live_workers.load(Ordering::Acquire), 0);
    }
}
