// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service plan identifiers.

/// Azure (standard) plan.
pub const AZURE_PLAN_ID: &str = "4deee563-e5ec-4731-b9b1-53b42d855f0c";
/// Trial plan.
pub const TRIAL_PLAN_ID: &str = "7d55d31d-35ae-4438-bf13-6ffdfa107d9f";
/// Freemium plan.
pub const FREEMIUM_PLAN_ID: &str = "b1a5764e-2ea1-4f95-94c0-2b4538b37b55";
/// Preview plan. Runtimes on it are not reconciled.
pub const PREVIEW_PLAN_ID: &str = "5cb3d976-b85c-42ea-a636-79cadda109a9";

/// Returns true for the trial plan.
pub fn is_trial_plan(plan_id: &str) -> bool {
    plan_id == TRIAL_PLAN_ID
}

/// Returns true for the freemium plan.
pub fn is_freemium_plan(plan_id: &str) -> bool {
    plan_id == FREEMIUM_PLAN_ID
}
