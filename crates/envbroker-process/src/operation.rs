// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation and runtime state records.
//!
//! An [`Operation`] is the persisted state of one lifecycle workflow
//! (provisioning, deprovisioning, update). Steps receive an operation by
//! value, and every change they make goes back to the store through
//! [`OperationManager`](crate::manager::OperationManager).
//!
//! # Invariants
//!
//! - `id` never changes after insert.
//! - `version` grows by exactly one per persisted update; the store compares
//!   it on every write.
//! - The evaluation `*_deleted` flags only ever go from `false` to `true`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runtime_version::RuntimeVersionData;

/// Lifecycle workflow an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Runtime provisioning.
    Provision,
    /// Runtime deprovisioning.
    Deprovision,
    /// Runtime update (upgrade, plan parameters).
    Update,
}

impl OperationType {
    /// Stable string used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Deprovision => "deprovision",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provision" => Ok(Self::Provision),
            "deprovision" => Ok(Self::Deprovision),
            "update" => Ok(Self::Update),
            other => Err(format!("unknown operation type '{}'", other)),
        }
    }
}

/// Processing state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Created, not yet picked up.
    #[default]
    Pending,
    /// At least one step has run.
    InProgress,
    /// All steps completed.
    Succeeded,
    /// A step failed permanently.
    Failed,
}

impl OperationState {
    /// Stable string used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Succeeded and failed operations are never processed again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown operation state '{}'", other)),
        }
    }
}

/// Parameters the runtime was provisioned with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProvisioningParameters {
    /// Service plan.
    pub plan_id: String,
    /// Global account owning the runtime.
    pub global_account_id: String,
    /// Subaccount owning the runtime.
    pub subaccount_id: String,
    /// Runtime version explicitly requested by the user.
    #[serde(default)]
    pub runtime_version: Option<String>,
}

/// AVS evaluations created for the runtime and their removal progress.
///
/// An ID of `0` means no evaluation of that kind exists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvaluationData {
    /// Evaluation used by the operators.
    pub internal_id: i64,
    /// Evaluation visible to the customer.
    pub external_id: i64,
    /// Internal evaluation has been removed from AVS.
    pub internal_deleted: bool,
    /// External evaluation has been removed from AVS.
    pub external_deleted: bool,
}

/// Append-only snapshot of a runtime's reconciliation status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    /// Unique ID.
    pub id: String,
    /// Runtime the snapshot belongs to.
    pub runtime_id: String,
    /// Operation that produced the snapshot.
    pub operation_id: String,
    /// Snapshots are ordered by this timestamp.
    pub created_at: DateTime<Utc>,
    /// Runtime version at the time of the snapshot.
    pub runtime_version: String,
    /// Kubernetes version at the time of the snapshot.
    pub kubernetes_version: String,
    /// Cluster setup sent to the reconciler, if the reconciler was involved.
    #[serde(default)]
    pub reconciler_input: Option<serde_json::Value>,
}

impl RuntimeState {
    /// Create an untagged snapshot stamped with the current time.
    pub fn new(
        runtime_id: impl Into<String>,
        operation_id: impl Into<String>,
        runtime_version: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            runtime_id: runtime_id.into(),
            operation_id: operation_id.into(),
            created_at: Utc::now(),
            runtime_version: runtime_version.into(),
            kubernetes_version: String::new(),
            reconciler_input: None,
        }
    }

    /// Attach the reconciler input, tagging the snapshot with reconciler provenance.
    pub fn with_reconciler_input(mut self, input: serde_json::Value) -> Self {
        self.reconciler_input = Some(input);
        self
    }

    /// Whether the snapshot was produced by the reconciliation workflow.
    pub fn has_reconciler_input(&self) -> bool {
        self.reconciler_input.is_some()
    }
}

/// Persisted state of one lifecycle workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique ID.
    pub id: String,
    /// Service instance the operation acts on.
    pub instance_id: String,
    /// Runtime the operation acts on.
    pub runtime_id: String,
    /// Workflow kind.
    pub operation_type: OperationType,
    /// Processing state.
    pub state: OperationState,
    /// Human readable progress or failure description.
    pub description: String,
    /// Optimistic concurrency counter.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last persisted update.
    pub updated_at: DateTime<Utc>,
    /// Parameters the runtime was provisioned with.
    pub provisioning_parameters: ProvisioningParameters,
    /// AVS evaluation bookkeeping.
    pub avs: EvaluationData,
    /// Resolved target runtime version.
    pub runtime_version: RuntimeVersionData,
    /// Latest runtime state known to the operation.
    pub last_runtime_state: Option<RuntimeState>,
    /// Names of steps that have completed.
    pub finished_stages: Vec<String>,
}

impl Operation {
    /// Create a pending operation with a fresh ID.
    pub fn new(
        operation_type: OperationType,
        instance_id: impl Into<String>,
        runtime_id: impl Into<String>,
        provisioning_parameters: ProvisioningParameters,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instance_id: instance_id.into(),
            runtime_id: runtime_id.into(),
            operation_type,
            state: OperationState::Pending,
            description: String::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            provisioning_parameters,
            avs: EvaluationData::default(),
            runtime_version: RuntimeVersionData::default(),
            last_runtime_state: None,
            finished_stages: Vec::new(),
        }
    }

    /// Plan the runtime is on.
    pub fn plan_id(&self) -> &str {
        &self.provisioning_parameters.plan_id
    }

    /// Whether the named step already completed for this operation.
    pub fn is_stage_finished(&self, stage: &str) -> bool {
        self.finished_stages.iter().any(|s| s == stage)
    }
}
