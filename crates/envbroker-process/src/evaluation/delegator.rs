// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Conditional removal of AVS evaluations.

use std::sync::Arc;

use envbroker_avs::{AvsError, EvaluationApi};
use thiserror::Error;
use tracing::{Span, info};

use super::{EvalAssistant, EvaluationKind};
use crate::error::StepError;
use crate::manager::OperationManager;
use crate::operation::Operation;

/// Failure while removing an evaluation.
#[derive(Debug, Error)]
pub enum RemovalError {
    /// AVS could not be reached or refused the request. Worth retrying.
    #[error("removing {kind} evaluation {evaluation_id} failed: {source}")]
    Avs {
        /// Evaluation kind.
        kind: EvaluationKind,
        /// Evaluation ID.
        evaluation_id: i64,
        /// Client error.
        source: AvsError,
    },

    /// Recording the removal on the operation failed.
    #[error(transparent)]
    Step(#[from] StepError),
}

/// Issues evaluation removals and records them on the operation.
#[derive(Clone)]
pub struct Delegator {
    client: Arc<dyn EvaluationApi>,
    manager: OperationManager,
}

impl Delegator {
    /// Create a delegator calling `client` and persisting through `manager`.
    pub fn new(client: Arc<dyn EvaluationApi>, manager: OperationManager) -> Self {
        Self { client, manager }
    }

    /// Remove the evaluation handled by `assistant`, if there is one to remove.
    ///
    /// Returns the operation unchanged when the kind is excluded for the plan,
    /// when no evaluation was created, or when it was already removed. Otherwise
    /// unlinks the evaluation from its parent, deletes it, and persists the
    /// deleted flag.
    pub async fn remove_evaluation(
        &self,
        operation: &Operation,
        assistant: &dyn EvalAssistant,
        log: &Span,
    ) -> Result<Operation, RemovalError> {
        let kind = assistant.kind();

        if assistant.is_excluded(operation) {
            info!(parent: log, kind = %kind, plan_id = %operation.plan_id(), "Evaluation kind not used by the plan, skipping");
            return Ok(operation.clone());
        }

        let evaluation_id = assistant.evaluation_id(&operation.avs);
        if evaluation_id == 0 {
            info!(parent: log, kind = %kind, "No evaluation to remove");
            return Ok(operation.clone());
        }

        if assistant.is_already_deleted(&operation.avs) {
            info!(parent: log, kind = %kind, evaluation_id, "Evaluation has been deleted previously");
            return Ok(operation.clone());
        }

        let avs_error = |source| RemovalError::Avs {
            kind,
            evaluation_id,
            source,
        };
        let parent_id = assistant.parent_id();
        self.client
            .remove_reference_from_parent_eval(parent_id, evaluation_id)
            .await
            .map_err(avs_error)?;
        self.client
            .delete_evaluation(evaluation_id)
            .await
            .map_err(avs_error)?;

        info!(parent: log, kind = %kind, evaluation_id, parent_id, "Evaluation removed");

        let (updated, _) = self
            .manager
            .update_operation(
                operation.clone(),
                |op| assistant.set_deleted(&mut op.avs),
                log,
            )
            .await?;
        Ok(updated)
    }
}
