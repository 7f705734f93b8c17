// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recording fakes shared by unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use envbroker_avs::{AvsError, EvaluationApi};

/// A request the fake AVS received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AvsCall {
    RemoveFromParent { parent_id: i64, evaluation_id: i64 },
    Delete { evaluation_id: i64 },
}

/// In-process AVS fake. Each test owns its instance.
#[derive(Default)]
pub(crate) struct RecordingEvaluationApi {
    calls: Mutex<Vec<AvsCall>>,
    /// Number of upcoming calls answered with `failure_status`.
    failures_left: AtomicUsize,
    failure_status: u16,
}

impl RecordingEvaluationApi {
    /// Every call fails with `status`.
    pub(crate) fn failing(status: u16) -> Self {
        Self::failing_times(status, usize::MAX)
    }

    /// The next `times` calls fail with `status`.
    pub(crate) fn failing_times(status: u16, times: usize) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(times),
            failure_status: status,
        }
    }

    pub(crate) fn calls(&self) -> Vec<AvsCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: AvsCall) -> Result<(), AvsError> {
        self.calls.lock().unwrap().push(call);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AvsError::UnexpectedStatus {
                status: self.failure_status,
                url: "http://avs.test".to_string(),
                body: String::new(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EvaluationApi for RecordingEvaluationApi {
    async fn remove_reference_from_parent_eval(
        &self,
        parent_id: i64,
        evaluation_id: i64,
    ) -> Result<(), AvsError> {
        self.record(AvsCall::RemoveFromParent {
            parent_id,
            evaluation_id,
        })
    }

    async fn delete_evaluation(&self, evaluation_id: i64) -> Result<(), AvsError> {
        self.record(AvsCall::Delete { evaluation_id })
    }
}
