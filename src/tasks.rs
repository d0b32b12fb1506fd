//! Background task runner
//!
//! A fixed pool of tokio workers drains a shared queue of boxed futures. Submissions
//! never block; excess work waits in the queue. Each job runs in its own spawned task,
//! so a panic is contained there and reported through the job's [`TaskHandle`] while
//! the worker carries on.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use metrics::gauge;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, error, info};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Why a task produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task panicked")]
    Panicked,
    #[error("task was cancelled")]
    Cancelled,
    #[error("task runner shut down before the task completed")]
    Dropped,
}

/// Handle to a submitted task. Dropping it does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    result_rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task to finish.
    pub async fn join(self) -> Result<T, TaskError> {
        self.result_rx.await.unwrap_or(Err(TaskError::Dropped))
    }
}

/// Fixed-size worker pool for fire-and-forget work such as notification delivery.
pub struct TaskRunner {
    job_tx: mpsc::UnboundedSender<Job>,
    in_flight: Arc<watch::Sender<usize>>,
    worker_count: usize,
}

impl TaskRunner {
    /// Start `worker_count` workers (at least one) on the current tokio runtime.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (in_flight, _) = watch::channel(0usize);
        let in_flight = Arc::new(in_flight);

        for worker_id in 0..worker_count {
            let job_rx = Arc::clone(&job_rx);
            let in_flight = Arc::clone(&in_flight);
            tokio::spawn(worker_task(worker_id, job_rx, in_flight));
        }

        info!(workers = worker_count, "Task runner started");

        Self {
            job_tx,
            in_flight,
            worker_count,
        }
    }

    /// Queue `future` for execution and return immediately.
    pub fn run_async<F, T>(&self, future: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();

        let job: Job = Box::pin(async move {
            let result = match tokio::spawn(future).await {
                Ok(value) => Ok(value),
                Err(err) if err.is_panic() => {
                    error!(error = %err, "Background task panicked");
                    Err(TaskError::Panicked)
                }
                Err(_) => Err(TaskError::Cancelled),
            };
            // Receiver may have been dropped; the caller chose not to wait.
            let _ = result_tx.send(result);
        });

        adjust_in_flight(&self.in_flight, 1);
        if self.job_tx.send(job).is_err() {
            error!("Task runner queue closed; dropping task");
            adjust_in_flight(&self.in_flight, -1);
        }

        TaskHandle { result_rx }
    }

    /// Tasks queued or running.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Resolve once every submitted task has completed.
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

async fn worker_task(
    worker_id: usize,
    job_rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    in_flight: Arc<watch::Sender<usize>>,
) {
    loop {
        let job = {
            let mut rx = job_rx.lock().await;
            rx.recv().await
        };

        let Some(job) = job else {
            debug!(worker_id, "Task worker shutting down (queue closed)");
            return;
        };

        job.await;
        adjust_in_flight(&in_flight, -1);
    }
}

fn adjust_in_flight(in_flight: &watch::Sender<usize>, delta: isize) {
    in_flight.send_modify(|count| *count = count.saturating_add_signed(delta));
    gauge!("keeper_tasks_in_flight").set(*in_flight.borrow() as f64);
}
