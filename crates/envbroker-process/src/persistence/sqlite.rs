//! SQLite-backed persistence implementation.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::{OperationStore, RuntimeStateStore, operation_not_found, runtime_state_not_found};
use crate::error::StoreError;
use crate::operation::{
    EvaluationData, Operation, OperationType, ProvisioningParameters, RuntimeState,
};
use crate::runtime_version::RuntimeVersionData;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Operation columns that are not queried on are kept in one JSON document.
#[derive(Serialize)]
struct OperationDataRef<'a> {
    provisioning_parameters: &'a ProvisioningParameters,
    avs: &'a EvaluationData,
    runtime_version: &'a RuntimeVersionData,
    last_runtime_state: &'a Option<RuntimeState>,
    finished_stages: &'a [String],
}

#[derive(Deserialize)]
struct OperationData {
    provisioning_parameters: ProvisioningParameters,
    avs: EvaluationData,
    runtime_version: RuntimeVersionData,
    last_runtime_state: Option<RuntimeState>,
    #[serde(default)]
    finished_stages: Vec<String>,
}

fn encode_data(operation: &Operation) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&OperationDataRef {
        provisioning_parameters: &operation.provisioning_parameters,
        avs: &operation.avs,
        runtime_version: &operation.runtime_version,
        last_runtime_state: &operation.last_runtime_state,
        finished_stages: &operation.finished_stages,
    })?)
}

#[derive(sqlx::FromRow)]
struct OperationRow {
    id: String,
    instance_id: String,
    runtime_id: String,
    operation_type: String,
    state: String,
    description: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    data: String,
}

impl TryFrom<OperationRow> for Operation {
    type Error = StoreError;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        let data: OperationData = serde_json::from_str(&row.data)?;
        Ok(Operation {
            operation_type: row.operation_type.parse().map_err(StoreError::Database)?,
            state: row.state.parse().map_err(StoreError::Database)?,
            id: row.id,
            instance_id: row.instance_id,
            runtime_id: row.runtime_id,
            description: row.description,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            provisioning_parameters: data.provisioning_parameters,
            avs: data.avs,
            runtime_version: data.runtime_version,
            last_runtime_state: data.last_runtime_state,
            finished_stages: data.finished_stages,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RuntimeStateRow {
    id: String,
    runtime_id: String,
    operation_id: String,
    created_at: DateTime<Utc>,
    runtime_version: String,
    kubernetes_version: String,
    reconciler_input: Option<String>,
}

impl TryFrom<RuntimeStateRow> for RuntimeState {
    type Error = StoreError;

    fn try_from(row: RuntimeStateRow) -> Result<Self, Self::Error> {
        let reconciler_input = row
            .reconciler_input
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(RuntimeState {
            id: row.id,
            runtime_id: row.runtime_id,
            operation_id: row.operation_id,
            created_at: row.created_at,
            runtime_version: row.runtime_version,
            kubernetes_version: row.kubernetes_version,
            reconciler_input,
        })
    }
}

const SELECT_OPERATION: &str = r#"
    SELECT id, instance_id, runtime_id, operation_type, state, description,
           version, created_at, updated_at, data
    FROM operations
"#;

const SELECT_RUNTIME_STATE: &str = r#"
    SELECT id, runtime_id, operation_id, created_at, runtime_version,
           kubernetes_version, reconciler_input
    FROM runtime_states
"#;

/// SQLite-backed operation and runtime state store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url` and run migrations.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = SqliteStore::connect("sqlite:.data/broker.db?mode=rwc").await?;
    /// ```
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// Open (creating if needed) a database file and run migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Database(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }

        Self::connect(&format!("sqlite:{}?mode=rwc", path.to_string_lossy())).await
    }

    async fn latest_state(
        &self,
        runtime_id: &str,
        with_reconciler_input: bool,
    ) -> Result<RuntimeState, StoreError> {
        let filter = if with_reconciler_input {
            "WHERE runtime_id = ? AND reconciler_input IS NOT NULL"
        } else {
            "WHERE runtime_id = ?"
        };
        let sql = format!(
            "{} {} ORDER BY created_at DESC, rowid DESC LIMIT 1",
            SELECT_RUNTIME_STATE, filter
        );

        sqlx::query_as::<_, RuntimeStateRow>(&sql)
            .bind(runtime_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| runtime_state_not_found(runtime_id))?
            .try_into()
    }
}

#[async_trait]
impl OperationStore for SqliteStore {
    async fn insert_operation(&self, operation: &Operation) -> Result<(), StoreError> {
        let data = encode_data(operation)?;
        let result = sqlx::query(
            r#"
            INSERT INTO operations (id, instance_id, runtime_id, operation_type, state,
                                    description, version, created_at, updated_at, data)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&operation.id)
        .bind(&operation.instance_id)
        .bind(&operation.runtime_id)
        .bind(operation.operation_type.as_str())
        .bind(operation.state.as_str())
        .bind(&operation.description)
        .bind(operation.version)
        .bind(operation.created_at)
        .bind(operation.updated_at)
        .bind(data)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                entity: "operation",
                id: operation.id.clone(),
            });
        }
        Ok(())
    }

    async fn get_operation_by_id(&self, id: &str) -> Result<Operation, StoreError> {
        let sql = format!("{} WHERE id = ?", SELECT_OPERATION);
        sqlx::query_as::<_, OperationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| operation_not_found(id))?
            .try_into()
    }

    async fn update_operation(&self, operation: &Operation) -> Result<Operation, StoreError> {
        let mut updated = operation.clone();
        updated.version = operation.version + 1;
        updated.updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE operations
            SET instance_id = ?, runtime_id = ?, operation_type = ?, state = ?,
                description = ?, version = ?, updated_at = ?, data = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&updated.instance_id)
        .bind(&updated.runtime_id)
        .bind(updated.operation_type.as_str())
        .bind(updated.state.as_str())
        .bind(&updated.description)
        .bind(updated.version)
        .bind(updated.updated_at)
        .bind(encode_data(&updated)?)
        .bind(&operation.id)
        .bind(operation.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(updated);
        }

        let stored: Option<(i64,)> = sqlx::query_as("SELECT version FROM operations WHERE id = ?")
            .bind(&operation.id)
            .fetch_optional(&self.pool)
            .await?;

        match stored {
            None => Err(operation_not_found(&operation.id)),
            Some((actual,)) => Err(StoreError::Conflict {
                id: operation.id.clone(),
                expected: operation.version,
                actual,
            }),
        }
    }

    async fn list_unfinished_operations(
        &self,
        operation_type: OperationType,
    ) -> Result<Vec<Operation>, StoreError> {
        let sql = format!(
            "{} WHERE operation_type = ? AND state IN ('pending', 'in_progress') ORDER BY created_at",
            SELECT_OPERATION
        );
        sqlx::query_as::<_, OperationRow>(&sql)
            .bind(operation_type.as_str())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Operation::try_from)
            .collect()
    }
}

#[async_trait]
impl RuntimeStateStore for SqliteStore {
    async fn insert_runtime_state(&self, state: &RuntimeState) -> Result<(), StoreError> {
        let reconciler_input = state
            .reconciler_input
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO runtime_states (id, runtime_id, operation_id, created_at,
                                        runtime_version, kubernetes_version, reconciler_input)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&state.id)
        .bind(&state.runtime_id)
        .bind(&state.operation_id)
        .bind(state.created_at)
        .bind(&state.runtime_version)
        .bind(&state.kubernetes_version)
        .bind(reconciler_input)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                entity: "runtime state",
                id: state.id.clone(),
            });
        }
        Ok(())
    }

    async fn get_latest_by_runtime_id(
        &self,
        runtime_id: &str,
    ) -> Result<RuntimeState, StoreError> {
        self.latest_state(runtime_id, false).await
    }

    async fn get_latest_with_reconciler_input_by_runtime_id(
        &self,
        runtime_id: &str,
    ) -> Result<RuntimeState, StoreError> {
        self.latest_state(runtime_id, true).await
    }

    async fn list_by_runtime_id(&self, runtime_id: &str) -> Result<Vec<RuntimeState>, StoreError> {
        let sql = format!(
            "{} WHERE runtime_id = ? ORDER BY created_at DESC, rowid DESC",
            SELECT_RUNTIME_STATE
        );
        sqlx::query_as::<_, RuntimeStateRow>(&sql)
            .bind(runtime_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(RuntimeState::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationState;
    use crate::runtime_version::VersionOrigin;
    use chrono::Duration;

    /// Create an in-memory SQLite store for testing.
    async fn test_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        MIGRATOR.run(&pool).await.expect("Failed to run migrations");

        SqliteStore::new(pool)
    }

    fn operation() -> Operation {
        let mut op = Operation::new(
            OperationType::Update,
            "instance-1",
            "runtime-1",
            ProvisioningParameters {
                plan_id: crate::plan::AZURE_PLAN_ID.to_string(),
                global_account_id: "ga-1".to_string(),
                subaccount_id: "sa-1".to_string(),
                runtime_version: None,
            },
        );
        op.avs.internal_id = 1234;
        op.avs.external_id = 5678;
        op
    }

    #[tokio::test]
    async fn test_insert_and_get_operation() {
        let store = test_store().await;
        let op = operation();

        store.insert_operation(&op).await.unwrap();
        let loaded = store.get_operation_by_id(&op.id).await.unwrap();

        assert_eq!(loaded, op);
    }

    #[tokio::test]
    async fn test_insert_duplicate_operation() {
        let store = test_store().await;
        let op = operation();
        store.insert_operation(&op).await.unwrap();

        let err = store.insert_operation(&op).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_get_operation_not_found() {
        let store = test_store().await;

        let err = store.get_operation_by_id("nonexistent").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_roundtrip() {
        let store = test_store().await;
        let mut op = operation();
        store.insert_operation(&op).await.unwrap();

        op.avs.internal_deleted = true;
        op.state = OperationState::InProgress;
        op.runtime_version = RuntimeVersionData::new("2.4.1", VersionOrigin::Defaults, 2);
        op.last_runtime_state = Some(
            RuntimeState::new("runtime-1", "op-0", "2.3.0")
                .with_reconciler_input(serde_json::json!({"components": ["istio"]})),
        );
        op.finished_stages.push("step-a".to_string());

        let updated = store.update_operation(&op).await.unwrap();
        let loaded = store.get_operation_by_id(&op.id).await.unwrap();

        assert_eq!(updated.version, 1);
        assert_eq!(loaded, updated);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = test_store().await;
        let op = operation();
        store.insert_operation(&op).await.unwrap();
        store.update_operation(&op).await.unwrap();

        let err = store.update_operation(&op).await.unwrap_err();

        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_missing_operation() {
        let store = test_store().await;

        let err = store.update_operation(&operation()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_unfinished_operations() {
        let store = test_store().await;
        let pending = operation();
        let mut in_progress = operation();
        in_progress.state = OperationState::InProgress;
        in_progress.created_at = pending.created_at + Duration::seconds(1);
        let mut succeeded = operation();
        succeeded.state = OperationState::Succeeded;
        for op in [&pending, &in_progress, &succeeded] {
            store.insert_operation(op).await.unwrap();
        }

        let unfinished = store
            .list_unfinished_operations(OperationType::Update)
            .await
            .unwrap();

        assert_eq!(
            unfinished.iter().map(|op| op.id.as_str()).collect::<Vec<_>>(),
            vec![pending.id.as_str(), in_progress.id.as_str()]
        );
        assert!(
            store
                .list_unfinished_operations(OperationType::Provision)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_latest_runtime_state_queries() {
        let store = test_store().await;
        let now = Utc::now();

        let mut tagged = RuntimeState::new("runtime-1", "op-1", "2.0.0")
            .with_reconciler_input(serde_json::json!({"kymaConfig": {"version": "2.0.0"}}));
        tagged.created_at = now - Duration::minutes(10);
        let mut plain = RuntimeState::new("runtime-1", "op-2", "2.1.0");
        plain.created_at = now;
        for state in [&tagged, &plain] {
            store.insert_runtime_state(state).await.unwrap();
        }

        let latest = store.get_latest_by_runtime_id("runtime-1").await.unwrap();
        assert_eq!(latest, plain);

        let latest_tagged = store
            .get_latest_with_reconciler_input_by_runtime_id("runtime-1")
            .await
            .unwrap();
        assert_eq!(latest_tagged, tagged);

        let all = store.list_by_runtime_id("runtime-1").await.unwrap();
        assert_eq!(all, vec![plain, tagged]);
    }

    #[tokio::test]
    async fn test_runtime_state_not_found() {
        let store = test_store().await;
        store
            .insert_runtime_state(&RuntimeState::new("runtime-1", "op-1", "2.0.0"))
            .await
            .unwrap();

        let err = store
            .get_latest_with_reconciler_input_by_runtime_id("runtime-1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = store.get_latest_by_runtime_id("runtime-2").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_from_path_creates_database() {
        let dir = std::env::temp_dir().join(format!("envbroker-{}", uuid::Uuid::new_v4()));
        let store = SqliteStore::from_path(dir.join("nested/broker.db"))
            .await
            .unwrap();

        let op = operation();
        store.insert_operation(&op).await.unwrap();
        assert!(store.get_operation_by_id(&op.id).await.is_ok());

        let _ = std::fs::remove_dir_all(dir);
    }
}
