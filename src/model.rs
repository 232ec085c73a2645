use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};


#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub workers: usize,
    pub live_workers: usize,
    pub idle_workers: usize,
    pub active_tasks: usize,
    pub pending_matches: usize,
    pub submitted: usize,
    pub completed: usize,
    pub panicked: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.workers == 0 {
            return 0.0;
        }
        self.active_tasks as f64 / self.workers as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed + self.panicked;
        if total == 0 {
            return 1.0;
        }
        self.completed as f64 / total as f64
    }
}


/// Fault raised by a task body, as seen by the worker that ran it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPanic {
    pub worker: usize,
    pub message: String,
}

impl TaskPanic {
    pub(crate) fn from_payload(worker: usize, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { worker, message }
    }
}

pub type PanicHandler = Arc<dyn Fn(TaskPanic) + Send + Sync + 'static>;


#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub live_workers: AtomicUsize,
    pub active_tasks: AtomicUsize,
    pub submitted: AtomicUsize,
    pub completed: AtomicUsize,
    pub panicked: AtomicUsize,
}

impl Counters {
    #[inline]
    pub fn load(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Acquire)
    }

    #[inline]
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn drop_one(counter: &AtomicUsize) {
        counter.fetch_sub(1, Ordering::AcqRel);
    }
}
