// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Update step resolving the target runtime version and the last runtime state.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Span, error, info};

use super::{RETRY_INTERVAL, RETRY_MAX_TIME};
use crate::error::StoreError;
use crate::manager::{OperationManager, UPDATE_RETRY_DELAY};
use crate::operation::{Operation, RuntimeState};
use crate::persistence::{RuntimeStateStore, runtime_state_not_found};
use crate::runtime_version::VersionConfigurator;
use crate::step::{Step, StepResult};

/// One way of finding the runtime state an update starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateLookup {
    /// Newest state written by the reconciliation workflow.
    LatestWithReconcilerInput,
    /// Newest state of any kind.
    Latest,
}

/// Lookups tried in order until one finds a state.
///
/// Runtimes that never went through the reconciler (preview plan, for one)
/// only have untagged states, so the second entry is still needed.
pub const STATE_LOOKUP_CHAIN: [StateLookup; 2] =
    [StateLookup::LatestWithReconcilerInput, StateLookup::Latest];

impl StateLookup {
    async fn find(
        self,
        store: &dyn RuntimeStateStore,
        runtime_id: &str,
    ) -> Result<RuntimeState, StoreError> {
        match self {
            Self::LatestWithReconcilerInput => {
                store
                    .get_latest_with_reconciler_input_by_runtime_id(runtime_id)
                    .await
            }
            Self::Latest => store.get_latest_by_runtime_id(runtime_id).await,
        }
    }
}

/// Sets the runtime version and last runtime state of an update operation.
pub struct InitRuntimeVersionStep {
    manager: OperationManager,
    configurator: Arc<dyn VersionConfigurator>,
    runtime_states: Arc<dyn RuntimeStateStore>,
}

impl InitRuntimeVersionStep {
    /// Create the step reading states from `runtime_states`.
    pub fn new(
        manager: OperationManager,
        configurator: Arc<dyn VersionConfigurator>,
        runtime_states: Arc<dyn RuntimeStateStore>,
    ) -> Self {
        Self {
            manager,
            configurator,
            runtime_states,
        }
    }

    async fn latest_state(&self, runtime_id: &str, log: &Span) -> Result<RuntimeState, StoreError> {
        let mut last_miss = None;
        for lookup in STATE_LOOKUP_CHAIN {
            match lookup.find(self.runtime_states.as_ref(), runtime_id).await {
                Ok(state) => return Ok(state),
                Err(err) if err.is_not_found() => {
                    info!(parent: log, ?lookup, runtime_id, "No runtime state found");
                    last_miss = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_miss.unwrap_or_else(|| runtime_state_not_found(runtime_id)))
    }
}

#[async_trait]
impl Step for InitRuntimeVersionStep {
    fn name(&self) -> &'static str {
        "Update_Init_Runtime_Version"
    }

    async fn run(&self, operation: Operation, log: &Span) -> StepResult {
        let version = if operation.runtime_version.is_empty() {
            match self.configurator.for_updating(&operation).await {
                Ok(version) => version,
                Err(err) => {
                    return self
                        .manager
                        .retry_operation(
                            operation,
                            "error while getting runtime version",
                            &err,
                            RETRY_INTERVAL,
                            RETRY_MAX_TIME,
                            log,
                        )
                        .await;
                }
            }
        } else {
            operation.runtime_version.clone()
        };

        let state = match self.latest_state(&operation.runtime_id, log).await {
            Ok(state) => state,
            Err(err) => {
                return self
                    .manager
                    .retry_operation(
                        operation,
                        "error while getting latest runtime state",
                        &err,
                        RETRY_INTERVAL,
                        RETRY_MAX_TIME,
                        log,
                    )
                    .await;
            }
        };

        let updated = self
            .manager
            .update_operation(
                operation.clone(),
                |op| {
                    op.runtime_version = version.clone();
                    op.last_runtime_state = Some(state.clone());
                },
                log,
            )
            .await;

        match updated {
            Ok((operation, delay)) => {
                info!(
                    parent: log,
                    major_version = operation.runtime_version.major_version,
                    runtime_state_id = %state.id,
                    "Init runtime version"
                );
                Ok((operation, delay))
            }
            Err(err) => {
                // picked up again on the next run, nothing was persisted
                error!(parent: log, error = %err, "Unable to save runtime version");
                Ok((operation, UPDATE_RETRY_DELAY))
            }
        }
    }
}
