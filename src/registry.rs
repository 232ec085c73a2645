//! Bounded registry of idle worker handles.
//!
//! Handles live in a lock-free `ArrayQueue`; a semaphore carries one permit
//! per handle present so takers can wait without polling. `put` always pushes
//! before releasing the permit, so a taker holding a permit always finds a
//! handle.

use super::{errors::PoolError, handle::WorkerHandle};
use crossbeam::queue::ArrayQueue;
use tokio::sync::Semaphore;


pub(crate) struct IdleRegistry {
    slots: ArrayQueue<WorkerHandle>,
    available: Semaphore,
}

impl IdleRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: ArrayQueue::new(capacity),
            available: Semaphore::new(0),
        }
    }

    pub fn put(&self, handle: WorkerHandle) -> Result<(), PoolError> {
        self.slots.push(handle).map_err(|_| PoolError::RegistryFull)?;
        self.available.add_permits(1);
        Ok(())
    }

    /// Waits for an idle handle.
    ///
    /// Returns `None` only if the permit count and the queue disagree, which
    /// cannot happen while every insertion goes through `put`.
    pub async fn take(&self) -> Option<WorkerHandle> {
        let permit = self.available.acquire().await.ok()?;
        permit.forget();
        self.slots.pop()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    #[tokio::test]
    async fn take_returns_registered_handle() {
        let registry = IdleRegistry::new(2);
        let (handle, _inbox) = WorkerHandle::new(7);
        registry.put(handle).unwrap();
        assert_eq!(registry.len(), 1);

        let taken = registry.take().await.unwrap();
        assert_eq!(taken.id(), 7);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn put_beyond_capacity_is_rejected() {
        let registry = IdleRegistry::new(1);
        let (first, _a) = WorkerHandle::new(0);
        let (second, _b) = WorkerHandle::new(1);
        registry.put(first).unwrap();
        assert!(matches!(registry.put(second), Err(PoolError::RegistryFull)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn take_waits_for_put_from_another_thread() {
        let registry = Arc::new(IdleRegistry::new(1));
        let producer = registry.clone();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let (handle, inbox) = WorkerHandle::new(3);
            producer.put(handle).unwrap();
            // keep the inbox alive until the handle has been used
            std::thread::sleep(Duration::from_millis(50));
            drop(inbox);
        });

        let taken = tokio::time::timeout(Duration::from_secs(2), registry.take())
            .await
            .expect("take should complete once a handle is put")
            .unwrap();
        assert_eq!(taken.id(), 3);
    }
}
