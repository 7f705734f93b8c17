// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker pool feeding operation IDs to an [`Executor`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::pipeline::Executor;

/// Shared queue of operation IDs.
///
/// Cloning is cheap; all clones feed the same workers.
#[derive(Clone)]
pub struct Queue {
    sender: mpsc::UnboundedSender<String>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    executor: Arc<dyn Executor>,
    shutdown: CancellationToken,
}

impl Queue {
    /// Create a queue feeding `executor`. Workers stop once `shutdown` is cancelled.
    pub fn new(executor: Arc<dyn Executor>, shutdown: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            executor,
            shutdown,
        }
    }

    /// Enqueue an operation for immediate processing.
    pub fn add(&self, operation_id: impl Into<String>) {
        let operation_id = operation_id.into();
        if self.sender.send(operation_id).is_err() {
            debug!("Queue closed, dropping operation");
        }
    }

    /// Enqueue an operation once `delay` has passed.
    pub fn add_after(&self, operation_id: impl Into<String>, delay: Duration) {
        let operation_id = operation_id.into();
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = queue.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => queue.add(operation_id),
            }
        });
    }

    /// Run `workers` workers until the shutdown token is cancelled.
    pub async fn run(self, workers: usize) {
        info!(workers, "Queue started");

        let mut tasks = JoinSet::new();
        for worker in 0..workers.max(1) {
            tasks.spawn(self.clone().worker(worker));
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Queue worker panicked");
            }
        }

        info!("Queue stopped");
    }

    async fn worker(self, worker: usize) {
        loop {
            let next = {
                let mut receiver = self.receiver.lock().await;
                tokio::select! {
                    _ = self.shutdown.cancelled() => None,
                    id = receiver.recv() => id,
                }
            };
            let Some(operation_id) = next else {
                debug!(worker, "Worker shutting down");
                break;
            };

            match self.executor.execute(&operation_id).await {
                Ok(delay) if !delay.is_zero() => {
                    debug!(worker, operation_id = %operation_id, delay_secs = delay.as_secs(), "Requeueing operation");
                    self.add_after(operation_id, delay);
                }
                Ok(_) => debug!(worker, operation_id = %operation_id, "Operation processed"),
                Err(e) => error!(worker, operation_id = %operation_id, error = %e, "Operation processing failed"),
            }
        }
    }
}
