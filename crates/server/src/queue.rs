//! Per-sender serial queue.
//!
//! The single concurrency-control point of the system: one logical worker
//! per active sender key, fed through an unbounded channel. Tasks for the
//! same key run strictly in enqueue order and never concurrently; tasks for
//! different keys proceed in parallel. A task that fails (tasks are `async`
//! blocks that handle their own errors and resolve to `()`) cannot block the
//! tasks queued behind it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default)]
pub struct SenderQueue {
    workers: Mutex<HashMap<String, mpsc::UnboundedSender<Job>>>,
}

impl SenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `job` to run after every previously enqueued job for the
    /// same key has completed. Never blocks the caller.
    pub fn enqueue(&self, key: &str, job: impl Future<Output = ()> + Send + 'static) {
        let mut job: Job = Box::pin(job);
        let mut workers = self.lock();

        if let Some(tx) = workers.get(key) {
            match tx.send(job) {
                Ok(()) => return,
                // Worker task is gone (runtime shutdown mid-flight); fall
                // through and respawn it with this job.
                Err(mpsc::error::SendError(returned)) => job = returned,
            }
        }

        let tx = spawn_worker(key.to_string());
        if tx.send(job).is_ok() {
            workers.insert(key.to_string(), tx);
        }
    }

    /// Number of sender keys with a live worker.
    pub fn active_keys(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<Job>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_worker(key: String) -> mpsc::UnboundedSender<Job> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    tokio::spawn(async move {
        debug!(event_name = "queue.worker.start", sender_id = %key, "serial worker started");
        while let Some(job) = rx.recv().await {
            job.await;
        }
        debug!(event_name = "queue.worker.stop", sender_id = %key, "serial worker stopped");
    });
    tx
}
