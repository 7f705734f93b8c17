// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation Manager: the single write path for operation state.
//!
//! Steps never talk to the store directly. They either ask for a delayed
//! retry ([`OperationManager::retry_operation`]) or persist a mutation
//! ([`OperationManager::update_operation`]). Both return the same shape as
//! [`Step::run`](crate::step::Step::run), so a step can return their result
//! as-is.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{Span, error, info, warn};

use crate::error::StepError;
use crate::operation::{Operation, OperationState};
use crate::persistence::OperationStore;
use crate::step::StepResult;

/// Default number of write attempts in [`OperationManager::update_operation`].
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: usize = 3;

/// Delay a step may ask for when persisting its result failed.
pub const UPDATE_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Retry scheduling and optimistic state updates on top of an [`OperationStore`].
#[derive(Clone)]
pub struct OperationManager {
    store: Arc<dyn OperationStore>,
    max_update_attempts: usize,
}

impl OperationManager {
    /// Create a manager writing to `store`.
    pub fn new(store: Arc<dyn OperationStore>) -> Self {
        Self {
            store,
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }

    /// Override the number of write attempts made on version conflicts.
    pub fn with_max_update_attempts(mut self, attempts: usize) -> Self {
        self.max_update_attempts = attempts.max(1);
        self
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn OperationStore> {
        &self.store
    }

    /// Ask for the step to be re-run after `retry_interval`.
    ///
    /// Time spent retrying is measured from the operation's last persisted
    /// update. While it is below `max_time` the operation is returned
    /// unmodified together with `retry_interval`. Once it is exceeded the
    /// operation is marked failed and [`StepError::OperationFailed`] is
    /// returned.
    pub async fn retry_operation(
        &self,
        operation: Operation,
        message: &str,
        cause: &(dyn Display + Sync),
        retry_interval: Duration,
        max_time: Duration,
        log: &Span,
    ) -> StepResult {
        info!(parent: log, error = %cause, "Retry Operation was triggered with message: {}", message);

        let elapsed = (Utc::now() - operation.updated_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if elapsed < max_time {
            info!(
                parent: log,
                retry_in_secs = retry_interval.as_secs(),
                elapsed_secs = elapsed.as_secs(),
                max_time_secs = max_time.as_secs(),
                "Retrying"
            );
            return Ok((operation, retry_interval));
        }

        error!(parent: log, max_time_secs = max_time.as_secs(), "Aborting after {:?} of failing retries", max_time);
        self.operation_failed(operation, message, Some(cause), log)
            .await
    }

    /// Apply `mutate` and persist the result.
    ///
    /// On a version conflict the latest stored operation is re-read and
    /// `mutate` is applied again, up to the configured number of attempts.
    /// `mutate` must therefore be safe to apply to any version of the
    /// operation. Returns the persisted operation with a zero delay.
    pub async fn update_operation<F>(&self, operation: Operation, mutate: F, log: &Span) -> StepResult
    where
        F: Fn(&mut Operation) + Send + Sync,
    {
        let mut candidate = operation;
        mutate(&mut candidate);

        let mut attempt = 1;
        loop {
            match self.store.update_operation(&candidate).await {
                Ok(updated) => return Ok((updated, Duration::ZERO)),
                Err(err) if err.is_conflict() && attempt < self.max_update_attempts => {
                    warn!(parent: log, attempt, error = %err, "Operation changed concurrently, reapplying update");
                    let mut latest = self.store.get_operation_by_id(&candidate.id).await?;
                    mutate(&mut latest);
                    candidate = latest;
                    attempt += 1;
                }
                Err(err) => {
                    error!(parent: log, attempt, error = %err, "Update operation failed");
                    return Err(err.into());
                }
            }
        }
    }

    /// Mark the operation succeeded.
    pub async fn operation_succeeded(
        &self,
        operation: Operation,
        description: &str,
        log: &Span,
    ) -> StepResult {
        let description = description.to_string();
        self.update_operation(
            operation,
            |op| {
                op.state = OperationState::Succeeded;
                op.description = description.clone();
            },
            log,
        )
        .await
    }

    /// Mark the operation failed and return the permanent error describing it.
    pub async fn operation_failed(
        &self,
        operation: Operation,
        description: &str,
        cause: Option<&(dyn Display + Sync)>,
        log: &Span,
    ) -> StepResult {
        let description = match cause {
            Some(cause) => format!("{}: {}", description, cause),
            None => description.to_string(),
        };
        error!(parent: log, description = %description, "Operation failed");

        let (failed, _) = self
            .update_operation(
                operation,
                |op| {
                    op.state = OperationState::Failed;
                    op.description = description.clone();
                },
                log,
            )
            .await?;

        Err(StepError::OperationFailed {
            operation_id: failed.id,
            description,
        })
    }
}
