//! Background execution of save requests.
//!
//! Handlers push [`SaveJob`]s into a bounded queue and return right away. A
//! fixed set of workers pulls jobs from the queue, so a burst of saves applies
//! backpressure instead of spawning unbounded tasks. A panicking job is caught
//! and logged; the worker carries on with the next one. On shutdown the queue
//! stops accepting jobs and the workers finish whatever is already queued.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::database::RateDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveJob {
    pub date: RateDate,
    /// Id of the request that triggered the job, for log correlation.
    pub request_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("save queue is full")]
    Full,
    #[error("save queue is shut down")]
    Closed,
}

/// Producer side of the save queue. Cheap to clone.
#[derive(Clone)]
pub struct SaveQueue {
    sender: mpsc::Sender<SaveJob>,
    shutdown: CancellationToken,
}

impl SaveQueue {
    /// Enqueues a job without waiting for room.
    pub fn submit(&self, job: SaveJob) -> Result<(), SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::Closed);
        }

        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }
}

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    receiver: Arc<Mutex<mpsc::Receiver<SaveJob>>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawns `workers` tasks serving a queue of `capacity` pending jobs.
    pub fn start<F, Fut>(workers: usize, capacity: usize, handler: F) -> (SaveQueue, WorkerPool)
    where
        F: Fn(SaveJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);
        let shutdown = CancellationToken::new();

        let workers = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&receiver),
                    Arc::clone(&handler),
                    shutdown.clone(),
                ))
            })
            .collect();

        let queue = SaveQueue {
            sender,
            shutdown: shutdown.clone(),
        };
        let pool = WorkerPool {
            workers,
            receiver,
            shutdown,
        };
        (queue, pool)
    }

    /// Stops intake, lets the workers drain the queue and waits for them.
    pub async fn shutdown(self) {
        self.shutdown.cancel();

        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!("Save worker terminated abnormally: {}", e);
            }
        }

        // A submit racing with `cancel` may still have slipped in.
        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut dropped = 0;
        while receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!(dropped, "Discarded save jobs submitted during shutdown");
        }

        tracing::info!("Save workers stopped");
    }
}

async fn run_worker<F, Fut>(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<SaveJob>>>,
    handler: Arc<F>,
    shutdown: CancellationToken,
) where
    F: Fn(SaveJob) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            // Queued jobs win over cancellation so the queue drains first.
            tokio::select! {
                biased;
                job = receiver.recv() => job,
                _ = shutdown.cancelled() => None,
            }
        };
        let Some(job) = next else { break };

        let span = tracing::info_span!(
            "save_job",
            worker = id,
            request_id = %job.request_id,
            date = %job.date,
        );
        // Building the future happens inside the guard too, so a handler
        // that panics before returning a future is caught as well.
        let outcome = AssertUnwindSafe(async { handler(job).await })
            .catch_unwind()
            .instrument(span.clone())
            .await;

        if let Err(panic) = outcome {
            span.in_scope(|| {
                tracing::error!("Save job panicked: {}", panic_message(&*panic));
            });
        }
    }

    tracing::debug!(worker = id, "Save worker exiting");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Semaphore;

    use super::*;

    fn job(date: &str) -> SaveJob {
        SaveJob {
            date: date.parse().unwrap(),
            request_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn runs_submitted_jobs() {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let (queue, pool) = WorkerPool::start(2, 8, move |job: SaveJob| {
            let done_tx = done_tx.clone();
            async move {
                done_tx.send(job.date).unwrap();
            }
        });

        queue.submit(job("01.01.2022")).unwrap();
        queue.submit(job("02.01.2022")).unwrap();

        let mut dates = vec![
            done_rx.recv().await.unwrap().to_string(),
            done_rx.recv().await.unwrap().to_string(),
        ];
        dates.sort();
        assert_eq!(dates, ["01.01.2022", "02.01.2022"]);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_the_worker() {
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completed);
        let (queue, pool) = WorkerPool::start(1, 8, move |job: SaveJob| {
            let counter = Arc::clone(&counter);
            async move {
                if job.date.to_string() == "13.12.2013" {
                    panic!("feed exploded");
                }
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        queue.submit(job("13.12.2013")).unwrap();
        queue.submit(job("14.12.2013")).unwrap();
        queue.submit(job("15.12.2013")).unwrap();
        pool.shutdown().await;

        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handler_panicking_before_its_future_does_not_stop_the_worker() {
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completed);
        let (queue, pool) = WorkerPool::start(1, 8, move |job: SaveJob| {
            if job.date.to_string() == "13.12.2013" {
                panic!("refused to build the job");
            }
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        queue.submit(job("13.12.2013")).unwrap();
        queue.submit(job("14.12.2013")).unwrap();
        pool.shutdown().await;

        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejects_jobs_when_queue_is_full() {
        let gate = Arc::new(Semaphore::new(0));
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let worker_gate = Arc::clone(&gate);
        let (queue, pool) = WorkerPool::start(1, 1, move |_job: SaveJob| {
            let gate = Arc::clone(&worker_gate);
            let started_tx = started_tx.clone();
            async move {
                started_tx.send(()).unwrap();
                let _permit = gate.acquire().await.unwrap();
            }
        });

        queue.submit(job("01.01.2022")).unwrap();
        started_rx.recv().await.unwrap();

        queue.submit(job("02.01.2022")).unwrap();
        assert_eq!(queue.submit(job("03.01.2022")), Err(SubmitError::Full));

        gate.add_permits(10);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_queued_jobs_and_closes_intake() {
        let gate = Arc::new(Semaphore::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let (worker_gate, counter) = (Arc::clone(&gate), Arc::clone(&completed));
        let (queue, pool) = WorkerPool::start(1, 8, move |_job: SaveJob| {
            let gate = Arc::clone(&worker_gate);
            let counter = Arc::clone(&counter);
            async move {
                let _permit = gate.acquire().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for day in 1..=4 {
            queue.submit(job(&format!("{day:02}.01.2022"))).unwrap();
        }

        let release = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                gate.add_permits(4);
            })
        };
        pool.shutdown().await;
        release.await.unwrap();

        assert_eq!(completed.load(Ordering::SeqCst), 4);
        assert_eq!(queue.submit(job("05.01.2022")), Err(SubmitError::Closed));
    }
}
