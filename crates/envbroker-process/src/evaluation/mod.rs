// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AVS evaluation bookkeeping.
//!
//! A runtime has up to two evaluations: an internal one for operators and an
//! external one visible to the customer. An [`EvalAssistant`] tells the
//! [`Delegator`] which fields of [`EvaluationData`] belong to its kind, under
//! which parent the evaluation lives, and whether the kind applies to the
//! operation's plan at all.

mod delegator;

pub use delegator::{Delegator, RemovalError};

use std::fmt;

use crate::operation::{EvaluationData, Operation};
use crate::plan;

/// Evaluation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationKind {
    /// Operator facing.
    Internal,
    /// Customer facing.
    External,
}

impl fmt::Display for EvaluationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => f.write_str("internal"),
            Self::External => f.write_str("external"),
        }
    }
}

/// Strategy for one evaluation kind.
pub trait EvalAssistant: Send + Sync {
    /// Kind handled by this assistant.
    fn kind(&self) -> EvaluationKind;

    /// The kind does not apply to the operation's plan.
    fn is_excluded(&self, operation: &Operation) -> bool;

    /// Evaluation ID, `0` when none was created.
    fn evaluation_id(&self, data: &EvaluationData) -> i64;

    /// Removal already completed.
    fn is_already_deleted(&self, data: &EvaluationData) -> bool;

    /// Record completed removal.
    fn set_deleted(&self, data: &mut EvaluationData);

    /// Parent evaluation the kind is grouped under.
    fn parent_id(&self) -> i64;
}

/// Assistant for the internal evaluation. Applies to every plan.
#[derive(Debug, Clone)]
pub struct InternalEvalAssistant {
    parent_id: i64,
}

impl InternalEvalAssistant {
    /// Create an assistant grouping evaluations under `parent_id`.
    pub fn new(parent_id: i64) -> Self {
        Self { parent_id }
    }
}

impl EvalAssistant for InternalEvalAssistant {
    fn kind(&self) -> EvaluationKind {
        EvaluationKind::Internal
    }

    fn is_excluded(&self, _operation: &Operation) -> bool {
        false
    }

    fn evaluation_id(&self, data: &EvaluationData) -> i64 {
        data.internal_id
    }

    fn is_already_deleted(&self, data: &EvaluationData) -> bool {
        data.internal_deleted
    }

    fn set_deleted(&self, data: &mut EvaluationData) {
        data.internal_deleted = true;
    }

    fn parent_id(&self) -> i64 {
        self.parent_id
    }
}

/// Assistant for the external evaluation. Trial and freemium runtimes have none.
#[derive(Debug, Clone)]
pub struct ExternalEvalAssistant {
    parent_id: i64,
}

impl ExternalEvalAssistant {
    /// Create an assistant grouping evaluations under `parent_id`.
    pub fn new(parent_id: i64) -> Self {
        Self { parent_id }
    }
}

impl EvalAssistant for ExternalEvalAssistant {
    fn kind(&self) -> EvaluationKind {
        EvaluationKind::External
    }

    fn is_excluded(&self, operation: &Operation) -> bool {
        plan::is_trial_plan(operation.plan_id()) || plan::is_freemium_plan(operation.plan_id())
    }

    fn evaluation_id(&self, data: &EvaluationData) -> i64 {
        data.external_id
    }

    fn is_already_deleted(&self, data: &EvaluationData) -> bool {
        data.external_deleted
    }

    fn set_deleted(&self, data: &mut EvaluationData) {
        data.external_deleted = true;
    }

    fn parent_id(&self) -> i64 {
        self.parent_id
    }
}
