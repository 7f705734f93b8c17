// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the processing engine.
//!
//! | Error | Meaning | Handled by |
//! |-------|---------|------------|
//! | [`StoreError::NotFound`] | lookup miss, often expected | the caller, e.g. a fallback lookup |
//! | [`StoreError::Conflict`] | stale `version` on write | [`OperationManager::update_operation`](crate::manager::OperationManager::update_operation), bounded |
//! | transient collaborator errors | AVS, version resolution | steps, via `retry_operation` |
//! | [`StepError::OperationFailed`] | retry budget exhausted | halts the operation |

use thiserror::Error;

use crate::operation::OperationType;

/// Errors from the operation and runtime state stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// No record matched the lookup.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of record looked up.
        entity: &'static str,
        /// Key used for the lookup.
        id: String,
    },

    /// The stored version differs from the one the write was based on.
    #[error("operation '{id}' version conflict: expected {expected}, found {actual}")]
    Conflict {
        /// Operation ID.
        id: String,
        /// Version the caller read.
        expected: i64,
        /// Version currently stored.
        actual: i64,
    },

    /// A record with the same ID already exists.
    #[error("{entity} '{id}' already exists")]
    AlreadyExists {
        /// Kind of record inserted.
        entity: &'static str,
        /// Duplicate ID.
        id: String,
    },

    /// The backing database failed.
    #[error("database error: {0}")]
    Database(String),

    /// A stored payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Optimistic concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Database(format!("migration failed: {}", err))
    }
}

/// Errors returned from steps and the operation manager.
///
/// Any error halts the operation; retryable conditions are expressed as
/// `Ok((operation, delay))` instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StepError {
    /// The operation was marked failed and will not be retried.
    #[error("operation '{operation_id}' failed: {description}")]
    OperationFailed {
        /// Operation ID.
        operation_id: String,
        /// Failure description, as persisted on the operation.
        description: String,
    },

    /// The operation could not be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from running an operation through its pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProcessError {
    /// The operation could not be loaded or saved.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A step halted the operation.
    #[error("step '{step}' failed: {source}")]
    Step {
        /// Name of the failing step.
        step: &'static str,
        /// Step error.
        #[source]
        source: StepError,
    },

    /// No pipeline handles this operation type.
    #[error("no pipeline registered for {0} operations")]
    NoPipeline(OperationType),
}
