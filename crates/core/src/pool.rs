//! The job-slot pool bounding subprocess parallelism.
//!
//! A task reserves `job_count` slots for the duration of its commands.
//! Reservations over the pool size are clamped so a "job hog" can still
//! run by taking the whole pool.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct JobPool {
    capacity: usize,
    slots: Option<Arc<Semaphore>>,
}

impl JobPool {
    /// `jobs == 0` means unbounded.
    pub fn new(jobs: usize) -> Self {
        Self {
            capacity: jobs,
            slots: if jobs == 0 {
                None
            } else {
                Some(Arc::new(Semaphore::new(jobs)))
            },
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reserve `count` slots, suspending until they are available. The
    /// permit releases the slots when dropped.
    pub async fn acquire(&self, count: usize) -> Option<OwnedSemaphorePermit> {
        let slots = self.slots.as_ref()?;
        let clamped = count.clamp(1, self.capacity) as u32;
        match slots.clone().acquire_many_owned(clamped).await {
            Ok(permit) => Some(permit),
            // The semaphore is never closed; treat it as unbounded if it
            // somehow is.
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_bounded_concurrency() {
        let pool = Arc::new(JobPool::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = pool.acquire(1).await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_oversized_request_is_clamped() {
        let pool = JobPool::new(4);
        // Requesting more than the pool holds must still succeed by
        // reserving the whole pool.
        let permit = pool.acquire(64).await;
        assert!(permit.is_some());
    }

    #[tokio::test]
    async fn test_unbounded_pool_never_blocks() {
        let pool = JobPool::new(0);
        assert!(pool.acquire(1000).await.is_none());
    }
}
