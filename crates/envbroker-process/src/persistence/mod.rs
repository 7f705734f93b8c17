//! Persistence interfaces and backends for operations and runtime states.
//!
//! Both backends share the same contract:
//!
//! - lookups fail with [`StoreError::NotFound`] when nothing matches,
//! - [`OperationStore::update_operation`] compares `version` and fails with
//!   [`StoreError::Conflict`] when another writer got there first,
//! - "latest" runtime state queries order by `created_at`.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::operation::{Operation, OperationType, RuntimeState};

/// Storage for operation records.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Insert a new operation as-is.
    async fn insert_operation(&self, operation: &Operation) -> Result<(), StoreError>;

    async fn get_operation_by_id(&self, id: &str) -> Result<Operation, StoreError>;

    /// Persist `operation` if the stored version equals `operation.version`.
    ///
    /// Returns the stored record, with `version` incremented and
    /// `updated_at` set to now.
    async fn update_operation(&self, operation: &Operation) -> Result<Operation, StoreError>;

    /// Pending and in-progress operations of one type, oldest first.
    async fn list_unfinished_operations(
        &self,
        operation_type: OperationType,
    ) -> Result<Vec<Operation>, StoreError>;
}

/// Append-only storage for runtime state snapshots.
#[async_trait]
pub trait RuntimeStateStore: Send + Sync {
    async fn insert_runtime_state(&self, state: &RuntimeState) -> Result<(), StoreError>;

    /// Newest snapshot for the runtime, regardless of provenance.
    async fn get_latest_by_runtime_id(&self, runtime_id: &str)
    -> Result<RuntimeState, StoreError>;

    /// Newest snapshot for the runtime that carries reconciler input.
    async fn get_latest_with_reconciler_input_by_runtime_id(
        &self,
        runtime_id: &str,
    ) -> Result<RuntimeState, StoreError>;

    /// All snapshots for the runtime, newest first.
    async fn list_by_runtime_id(&self, runtime_id: &str) -> Result<Vec<RuntimeState>, StoreError>;
}

pub(crate) fn operation_not_found(id: &str) -> StoreError {
    StoreError::NotFound {
        entity: "operation",
        id: id.to_string(),
    }
}

pub(crate) fn runtime_state_not_found(runtime_id: &str) -> StoreError {
    StoreError::NotFound {
        entity: "runtime state",
        id: runtime_id.to_string(),
    }
}
