// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deprovisioning step removing the runtime's AVS evaluations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::Span;

use super::{RETRY_INTERVAL, RETRY_MAX_TIME};
use crate::error::StepError;
use crate::evaluation::{Delegator, EvalAssistant, RemovalError};
use crate::manager::OperationManager;
use crate::operation::Operation;
use crate::step::{Step, StepResult};

/// Removes the internal and the external evaluation of a runtime.
pub struct EvaluationRemovalStep {
    delegator: Delegator,
    manager: OperationManager,
    internal: Arc<dyn EvalAssistant>,
    external: Arc<dyn EvalAssistant>,
}

impl EvaluationRemovalStep {
    /// Create the step.
    pub fn new(
        delegator: Delegator,
        manager: OperationManager,
        internal: Arc<dyn EvalAssistant>,
        external: Arc<dyn EvalAssistant>,
    ) -> Self {
        Self {
            delegator,
            manager,
            internal,
            external,
        }
    }
}

#[async_trait]
impl Step for EvaluationRemovalStep {
    fn name(&self) -> &'static str {
        "De-provision_AVS_Evaluations"
    }

    async fn run(&self, operation: Operation, log: &Span) -> StepResult {
        let mut operation = operation;
        for assistant in [&self.internal, &self.external] {
            match self
                .delegator
                .remove_evaluation(&operation, assistant.as_ref(), log)
                .await
            {
                Ok(updated) => operation = updated,
                Err(RemovalError::Avs { source, .. }) => {
                    return self
                        .manager
                        .retry_operation(
                            operation,
                            "error while deleting avs evaluation",
                            &source,
                            RETRY_INTERVAL,
                            RETRY_MAX_TIME,
                            log,
                        )
                        .await;
                }
                Err(RemovalError::Step(StepError::Store(source))) => {
                    return self
                        .manager
                        .retry_operation(
                            operation,
                            "error while deleting avs evaluation",
                            &source,
                            RETRY_INTERVAL,
                            RETRY_MAX_TIME,
                            log,
                        )
                        .await;
                }
                Err(RemovalError::Step(err)) => return Err(err),
            }
        }
        Ok((operation, Duration::ZERO))
    }
}
