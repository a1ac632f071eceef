//! Bounded worker pool for asynchronous cache backfill.
//!
//! `core_workers` long-lived tasks drain a bounded queue. When the queue is
//! full, up to `max_workers - core_workers` extra tasks run overflow jobs
//! directly. Past that, jobs are rejected: backfill is an optimisation and
//! dropping one only costs a future cache miss.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, Notify, Semaphore};

type Job = BoxFuture<'static, ()>;

/// Pool sizing.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackfillSettings {
    pub core_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        BackfillSettings {
            core_workers: 5,
            max_workers: 10,
            queue_capacity: 1024,
        }
    }
}

impl BackfillSettings {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.core_workers == 0 {
            return Err(Error::ConfigError(
                "backfill core_workers must be at least 1".to_string(),
            ));
        }
        if self.max_workers < self.core_workers {
            return Err(Error::ConfigError(format!(
                "backfill max_workers ({}) is below core_workers ({})",
                self.max_workers, self.core_workers
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::ConfigError(
                "backfill queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Tracker {
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Tracker {
    fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    fn end(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

async fn run(job: Job) {
    if AssertUnwindSafe(job).catch_unwind().await.is_err() {
        error!("Backfill job panicked");
    }
}

/// Handle to the backfill workers. Clones share the same pool.
///
/// Workers exit once every handle is dropped and the queue is drained.
#[derive(Clone)]
pub struct BackfillPool {
    sender: mpsc::Sender<Job>,
    burst: Arc<Semaphore>,
    tracker: Arc<Tracker>,
}

impl BackfillPool {
    /// Start the core workers on the current tokio runtime.
    ///
    /// # Errors
    /// - `Error::ConfigError`: invalid sizing, or no tokio runtime is running
    pub fn new(settings: BackfillSettings) -> Result<Self> {
        settings.validate()?;

        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::ConfigError(format!("Backfill pool needs a tokio runtime: {}", e))
        })?;

        let (sender, receiver) = mpsc::channel::<Job>(settings.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let tracker = Arc::new(Tracker::default());

        for _ in 0..settings.core_workers {
            let receiver = Arc::clone(&receiver);
            let tracker = Arc::clone(&tracker);
            handle.spawn(async move {
                loop {
                    let job = receiver.lock().await.recv().await;
                    match job {
                        Some(job) => {
                            run(job).await;
                            tracker.end();
                        }
                        None => break,
                    }
                }
            });
        }

        info!(
            "✓ Backfill pool started: {} core / {} max workers, queue {}",
            settings.core_workers, settings.max_workers, settings.queue_capacity
        );

        Ok(BackfillPool {
            sender,
            burst: Arc::new(Semaphore::new(settings.max_workers - settings.core_workers)),
            tracker,
        })
    }

    /// Queue a job. Returns `false` if the pool is saturated and the job was
    /// dropped.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.begin();

        match self.sender.try_send(job.boxed()) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => match Arc::clone(&self.burst).try_acquire_owned() {
                Ok(permit) => {
                    let tracker = Arc::clone(&self.tracker);
                    tokio::spawn(async move {
                        run(job).await;
                        drop(permit);
                        tracker.end();
                    });
                    true
                }
                Err(_) => {
                    self.tracker.end();
                    warn!("Backfill pool saturated, dropping job");
                    false
                }
            },
            Err(TrySendError::Closed(_)) => {
                self.tracker.end();
                warn!("Backfill pool closed, dropping job");
                false
            }
        }
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight.load(Ordering::Acquire)
    }

    /// Wait until no job is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.tracker.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_run() {
        let pool = BackfillPool::new(BackfillSettings::default()).expect("Failed to start pool");
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            assert!(pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_saturated_pool_rejects() {
        let pool = BackfillPool::new(BackfillSettings {
            core_workers: 1,
            max_workers: 2,
            queue_capacity: 1,
        })
        .expect("Failed to start pool");

        let gate = Arc::new(Semaphore::new(0));
        let blocked = |gate: Arc<Semaphore>| async move {
            let _ = gate.acquire().await;
        };

        // core worker, queue slot, burst worker
        assert!(pool.submit(blocked(Arc::clone(&gate))));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(pool.submit(blocked(Arc::clone(&gate))));
        assert!(pool.submit(blocked(Arc::clone(&gate))));

        assert!(!pool.submit(async {}));
        assert_eq!(pool.in_flight(), 3);

        gate.add_permits(3);
        pool.wait_idle().await;
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let pool = BackfillPool::new(BackfillSettings {
            core_workers: 1,
            max_workers: 1,
            queue_capacity: 4,
        })
        .unwrap();

        pool.submit(async { panic!("boom") });
        let done = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&done);
        pool.submit(async move {
            flag.store(1, Ordering::SeqCst);
        });

        pool.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_settings() {
        let settings = BackfillSettings {
            core_workers: 4,
            max_workers: 2,
            queue_capacity: 8,
        };
        assert!(matches!(settings.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_requires_runtime() {
        let result = BackfillPool::new(BackfillSettings::default());
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
