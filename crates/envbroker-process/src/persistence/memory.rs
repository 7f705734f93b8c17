// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory persistence backend.
//!
//! Used by tests and by embedders that do not need durability. Semantics
//! match [`SqliteStore`](super::SqliteStore), including version checks.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{OperationStore, RuntimeStateStore, operation_not_found, runtime_state_not_found};
use crate::error::StoreError;
use crate::operation::{Operation, OperationType, RuntimeState};

/// In-memory operation and runtime state store.
#[derive(Default)]
pub struct MemoryStore {
    operations: RwLock<HashMap<String, Operation>>,
    runtime_states: RwLock<Vec<RuntimeState>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn latest_matching(
        &self,
        runtime_id: &str,
        predicate: impl Fn(&RuntimeState) -> bool,
    ) -> Result<RuntimeState, StoreError> {
        let states = self.runtime_states.read().await;
        // max_by_key keeps the last of equal timestamps, i.e. the last inserted
        states
            .iter()
            .filter(|s| s.runtime_id == runtime_id && predicate(s))
            .max_by_key(|s| s.created_at)
            .cloned()
            .ok_or_else(|| runtime_state_not_found(runtime_id))
    }
}

#[async_trait]
impl OperationStore for MemoryStore {
    async fn insert_operation(&self, operation: &Operation) -> Result<(), StoreError> {
        let mut operations = self.operations.write().await;
        if operations.contains_key(&operation.id) {
            return Err(StoreError::AlreadyExists {
                entity: "operation",
                id: operation.id.clone(),
            });
        }
        operations.insert(operation.id.clone(), operation.clone());
        Ok(())
    }

    async fn get_operation_by_id(&self, id: &str) -> Result<Operation, StoreError> {
        self.operations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| operation_not_found(id))
    }

    async fn update_operation(&self, operation: &Operation) -> Result<Operation, StoreError> {
        let mut operations = self.operations.write().await;
        let stored = operations
            .get_mut(&operation.id)
            .ok_or_else(|| operation_not_found(&operation.id))?;

        if stored.version != operation.version {
            return Err(StoreError::Conflict {
                id: operation.id.clone(),
                expected: operation.version,
                actual: stored.version,
            });
        }

        let mut updated = operation.clone();
        updated.version += 1;
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn list_unfinished_operations(
        &self,
        operation_type: OperationType,
    ) -> Result<Vec<Operation>, StoreError> {
        let mut unfinished: Vec<Operation> = self
            .operations
            .read()
            .await
            .values()
            .filter(|op| op.operation_type == operation_type && !op.state.is_terminal())
            .cloned()
            .collect();
        unfinished.sort_by_key(|op| op.created_at);
        Ok(unfinished)
    }
}

#[async_trait]
impl RuntimeStateStore for MemoryStore {
    async fn insert_runtime_state(&self, state: &RuntimeState) -> Result<(), StoreError> {
        let mut states = self.runtime_states.write().await;
        if states.iter().any(|s| s.id == state.id) {
            return Err(StoreError::AlreadyExists {
                entity: "runtime state",
                id: state.id.clone(),
            });
        }
        states.push(state.clone());
        Ok(())
    }

    async fn get_latest_by_runtime_id(
        &self,
        runtime_id: &str,
    ) -> Result<RuntimeState, StoreError> {
        self.latest_matching(runtime_id, |_| true).await
    }

    async fn get_latest_with_reconciler_input_by_runtime_id(
        &self,
        runtime_id: &str,
    ) -> Result<RuntimeState, StoreError> {
        self.latest_matching(runtime_id, RuntimeState::has_reconciler_input)
            .await
    }

    async fn list_by_runtime_id(&self, runtime_id: &str) -> Result<Vec<RuntimeState>, StoreError> {
        let mut states: Vec<RuntimeState> = self
            .runtime_states
            .read()
            .await
            .iter()
            .filter(|s| s.runtime_id == runtime_id)
            .cloned()
            .collect();
        states.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(states)
    }
}
