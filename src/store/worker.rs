//! Dedicated worker threads for blocking database clients.
//!
//! Each worker owns one connection and pulls jobs from a shared bounded
//! queue. Callers submit closures from async code and await a oneshot reply,
//! so no blocking call ever runs on the request-handling runtime. The pool is
//! sized independently of the runtime's own thread count.

use super::StorageError;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::{mpsc, oneshot};

type Job<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Pool of OS threads, each holding a connection of type `C`.
///
/// Dropping the pool closes the queue; workers finish their current job and
/// exit.
pub struct WorkerPool<C: Send + 'static> {
    sender: mpsc::Sender<Job<C>>,
    size: usize,
}

impl<C: Send + 'static> WorkerPool<C> {
    /// Start one worker per connection. `queue_capacity` bounds pending jobs;
    /// submitters wait asynchronously when it is full.
    pub fn start(
        name: &str,
        connections: Vec<C>,
        queue_capacity: usize,
    ) -> Result<Self, StorageError> {
        let size = connections.len();
        if size == 0 {
            return Err(StorageError::Connection(
                "worker pool needs at least one connection".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::channel::<Job<C>>(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        for (index, connection) in connections.into_iter().enumerate() {
            let receiver = Arc::clone(&receiver);
            thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(connection, receiver))
                .map_err(|err| {
                    StorageError::Connection(format!("failed to spawn storage worker: {err}"))
                })?;
        }

        tracing::debug!(workers = size, "Storage worker pool started");
        Ok(Self { sender, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` on some worker's connection and await its result.
    pub async fn run<T, F>(&self, job: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut C) -> Result<T, StorageError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let boxed: Job<C> = Box::new(move |connection| {
            // Receiver gone means the caller stopped waiting; the work is still done.
            let _ = reply_tx.send(job(connection));
        });

        self.sender
            .send(boxed)
            .await
            .map_err(|_| StorageError::WorkerUnavailable)?;

        reply_rx.await.map_err(|_| StorageError::WorkerUnavailable)?
    }
}

fn worker_loop<C>(mut connection: C, receiver: Arc<Mutex<mpsc::Receiver<Job<C>>>>) {
    loop {
        let next = match receiver.lock() {
            Ok(mut queue) => queue.blocking_recv(),
            Err(_) => None,
        };

        match next {
            Some(job) => job(&mut connection),
            None => break,
        }
    }
    tracing::debug!("Storage worker exiting");
}
