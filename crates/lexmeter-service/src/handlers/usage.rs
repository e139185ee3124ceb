//! Usage handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use lexmeter_core::{Credits, MeteringWindow, PlanTier};

use crate::auth::AuthUser;
use crate::engine::gate;
use crate::error::ApiError;
use crate::state::AppState;

/// Usage response.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// Tier usage is metered under.
    pub plan: PlanTier,
    /// Current metering window; absent when unmetered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<MeteringWindow>,
    /// Documents counted in the window.
    pub used: u32,
    /// Analysis credits left.
    pub remaining_credits: Credits,
}

/// Get the caller's usage in the current metering window.
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UsageResponse>, ApiError> {
    let entitlements = gate::load(state.store.as_ref(), &auth.user_id, state.clock.now())?;

    Ok(Json(UsageResponse {
        plan: entitlements.tier,
        window: entitlements.window,
        used: entitlements.used,
        remaining_credits: entitlements.remaining_credits,
    }))
}
