// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The unit of work advancing an operation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::Span;

use crate::error::StepError;
use crate::operation::Operation;

/// Outcome of a step.
///
/// | Result | Meaning |
/// |--------|---------|
/// | `Err(_)` | unrecoverable, the operation halts |
/// | `Ok((op, delay))` with `delay > 0` | run the same step again after `delay` |
/// | `Ok((op, Duration::ZERO))` | done, continue with the next step |
pub type StepResult = Result<(Operation, Duration), StepError>;

/// A stateless, idempotent unit of work.
///
/// Steps run at least once: after a crash or a retry the same step sees the
/// same persisted operation again and must converge to the same result
/// without repeating side effects that already took place.
#[async_trait]
pub trait Step: Send + Sync {
    /// Stable identifier, recorded in [`Operation::finished_stages`].
    fn name(&self) -> &'static str;

    /// Advance `operation`. Log through `log`, which carries the operation context.
    async fn run(&self, operation: Operation, log: &Span) -> StepResult;
}
