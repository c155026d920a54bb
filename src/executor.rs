//! Bounded worker pool for media jobs.
//!
//! N tokio tasks share one bounded channel. Submitting waits while the queue
//! is full, so a producer that discovers work faster than the pool drains it
//! is throttled to the pool's pace.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, Instrument};

/// A unit of work run by the pool.
pub type Job = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Runs once the job has completed, whether it succeeded or failed.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

type Task = (Job, Option<Callback>);

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Executor {0} has not been started")]
    NotStarted(String),

    #[error("Executor {0} is shut down")]
    ShutDown(String),
}

/// Bounded-queue pool of worker tasks.
pub struct Executor {
    prefix: String,
    queue_size: usize,
    nb_workers: usize,
    sender: StdMutex<Option<mpsc::Sender<Task>>>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    stopped: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(prefix: &str, queue_size: usize, nb_workers: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            queue_size: queue_size.max(1),
            nb_workers: nb_workers.max(1),
            sender: StdMutex::new(None),
            workers: StdMutex::new(Vec::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the worker tasks. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut sender = lock(&self.sender);
        if sender.is_some() {
            return;
        }

        let (tx, rx) = mpsc::channel::<Task>(self.queue_size);
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = lock(&self.workers);

        for worker_id in 1..=self.nb_workers {
            let rx = rx.clone();
            let stopped = self.stopped.clone();
            let span = info_span!("worker", name = %format!("{}{}", self.prefix, worker_id));
            workers.push(tokio::spawn(worker_loop(rx, stopped).instrument(span)));
        }

        debug!(
            "Started {} with {} workers (queue {})",
            self.prefix, self.nb_workers, self.queue_size
        );
        *sender = Some(tx);
    }

    /// Queue a job, waiting while the queue is full.
    pub async fn submit(&self, job: Job, callback: Option<Callback>) -> Result<(), ExecutorError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ExecutorError::ShutDown(self.prefix.clone()));
        }
        let sender = lock(&self.sender)
            .clone()
            .ok_or_else(|| ExecutorError::NotStarted(self.prefix.clone()))?;
        sender
            .send((job, callback))
            .await
            .map_err(|_| ExecutorError::ShutDown(self.prefix.clone()))
    }

    /// Stop accepting jobs.
    ///
    /// With `wait`, every queued job is run and this returns once the workers
    /// are idle. Without it, workers stop after their current job and the rest
    /// of the queue is discarded.
    pub async fn shutdown(&self, wait: bool) {
        if !wait {
            self.stopped.store(true, Ordering::SeqCst);
        }
        // dropping the last sender lets workers exit once the queue is empty
        lock(&self.sender).take();

        let workers: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        if !wait {
            debug!("{} stopping without draining", self.prefix);
            return;
        }
        for handle in workers {
            if let Err(e) = handle.await {
                error!("{} worker ended abnormally: {}", self.prefix, e);
            }
        }
        debug!("{} drained", self.prefix);
    }
}

async fn worker_loop(rx: Arc<Mutex<mpsc::Receiver<Task>>>, stopped: Arc<AtomicBool>) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some((job, callback)) = next else {
            break;
        };
        if stopped.load(Ordering::SeqCst) {
            break;
        }

        match AssertUnwindSafe(job).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Job failed: {:#}", e),
            Err(_) => error!("Job panicked"),
        }
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Lock a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
