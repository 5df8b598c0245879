//! Bounded-concurrency task pool.
//!
//! Admission is gated by a [`Semaphore`]: `submit` waits for a permit, so
//! callers feel backpressure instead of losing work. The capacity can be
//! changed at runtime. Shrinking forgets idle permits right away and retires
//! the rest as running tasks finish.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::{Error, Result};

#[derive(Debug)]
struct PoolState {
    capacity: usize,
    /// Permits to forget instead of returning once their task finishes.
    retiring: usize,
}

/// Pool running at most `capacity` tasks at a time.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    state: Arc<Mutex<PoolState>>,
    running: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Create a pool, a capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            state: Arc::new(Mutex::new(PoolState {
                capacity,
                retiring: 0,
            })),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Number of tasks currently executing.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Change the capacity. Tasks already admitted keep running.
    pub fn tune(&self, capacity: usize) {
        let capacity = capacity.max(1);
        let mut state = self.state.lock();

        if capacity > state.capacity {
            let grow = capacity - state.capacity;
            let reclaimed = grow.min(state.retiring);
            state.retiring -= reclaimed;
            self.semaphore.add_permits(grow - reclaimed);
        } else if capacity < state.capacity {
            let shrink = state.capacity - capacity;
            let forgotten = self.semaphore.forget_permits(shrink);
            state.retiring += shrink - forgotten;
        }

        debug!(
            from = state.capacity,
            to = capacity,
            retiring = state.retiring,
            "Worker pool resized"
        );
        state.capacity = capacity;
    }

    /// Stop accepting work. Running tasks are not interrupted.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Wait for a free slot, then run `task` on the runtime.
    ///
    /// Returns once the task has been admitted, not when it completes.
    pub async fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolClosed)?;

        self.running.fetch_add(1, Ordering::SeqCst);
        let slot = Slot {
            permit: Some(permit),
            state: Arc::clone(&self.state),
            running: Arc::clone(&self.running),
        };

        tokio::spawn(async move {
            let _slot = slot;
            task.await;
        });

        Ok(())
    }
}

/// Held by a running task, gives the permit back (or retires it) on drop.
struct Slot {
    permit: Option<OwnedSemaphorePermit>,
    state: Arc<Mutex<PoolState>>,
    running: Arc<AtomicUsize>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if let Some(permit) = self.permit.take() {
            if state.retiring > 0 {
                state.retiring -= 1;
                permit.forget();
            } else {
                drop(permit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    /// Submit `count` tasks sleeping `ms` and return the highest concurrency observed.
    async fn peak_concurrency(pool: &WorkerPool, count: usize, ms: u64) -> usize {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (done_tx, mut done_rx) = mpsc::channel(count);

        for _ in 0..count {
            let active = active.clone();
            let peak = peak.clone();
            let done_tx = done_tx.clone();
            pool.submit(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                let _ = done_tx.send(()).await;
            })
            .await
            .unwrap();
        }

        for _ in 0..count {
            done_rx.recv().await.unwrap();
        }
        peak.load(Ordering::SeqCst)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_capacity_is_respected() {
        let pool = WorkerPool::new(2);
        let peak = peak_concurrency(&pool, 8, 30).await;
        assert!(peak <= 2, "peak concurrency was {peak}");
        assert!(peak >= 1);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.capacity(), 1);
        pool.tune(0);
        assert_eq!(pool.capacity(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tune_down_idle() {
        let pool = WorkerPool::new(4);
        pool.tune(1);
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.semaphore.available_permits(), 1);

        let peak = peak_concurrency(&pool, 4, 20).await;
        assert_eq!(peak, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tune_up() {
        let pool = WorkerPool::new(1);
        pool.tune(3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.semaphore.available_permits(), 3);

        let peak = peak_concurrency(&pool, 6, 30).await;
        assert!(peak <= 3, "peak concurrency was {peak}");
    }

    #[tokio::test]
    async fn test_tune_down_while_busy() {
        let pool = WorkerPool::new(2);
        let (release_a, wait_a) = oneshot::channel::<()>();
        let (release_b, wait_b) = oneshot::channel::<()>();
        let (done_tx, mut done_rx) = mpsc::channel(2);

        for wait in [wait_a, wait_b] {
            let done_tx = done_tx.clone();
            pool.submit(async move {
                let _ = wait.await;
                let _ = done_tx.send(()).await;
            })
            .await
            .unwrap();
        }
        assert_eq!(pool.semaphore.available_permits(), 0);

        // Nothing is idle, so the extra permit retires when a task ends.
        pool.tune(1);
        assert_eq!(pool.state.lock().retiring, 1);

        release_a.send(()).unwrap();
        done_rx.recv().await.unwrap();
        release_b.send(()).unwrap();
        done_rx.recv().await.unwrap();

        // Let the slot guards drop.
        while pool.running() > 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(pool.state.lock().retiring, 0);
        assert_eq!(pool.semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_regrow_cancels_retirement() {
        let pool = WorkerPool::new(2);
        let (release, wait) = oneshot::channel::<()>();
        let (other_release, other_wait) = oneshot::channel::<()>();

        pool.submit(async move {
            let _ = wait.await;
        })
        .await
        .unwrap();
        pool.submit(async move {
            let _ = other_wait.await;
        })
        .await
        .unwrap();

        pool.tune(1);
        pool.tune(3);
        assert_eq!(pool.state.lock().retiring, 0);
        assert_eq!(pool.semaphore.available_permits(), 1);

        release.send(()).unwrap();
        other_release.send(()).unwrap();
        while pool.running() > 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(pool.semaphore.available_permits(), 3);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects() {
        let pool = WorkerPool::new(1);
        pool.close();
        assert!(pool.is_closed());

        let err = pool.submit(async {}).await.unwrap_err();
        assert!(matches!(err, Error::PoolClosed));
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_submitter() {
        let pool = WorkerPool::new(1);
        let (release, wait) = oneshot::channel::<()>();
        pool.submit(async move {
            let _ = wait.await;
        })
        .await
        .unwrap();

        let waiting = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.submit(async {}).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.close();

        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(Error::PoolClosed)));
        let _ = release.send(());
    }
}
