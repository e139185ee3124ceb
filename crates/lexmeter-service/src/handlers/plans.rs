//! Plan handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use lexmeter_core::{EffectivePlan, PlanRecord, PlanTier};

use crate::auth::AuthUser;
use crate::engine::{gate, plans};
use crate::error::ApiError;
use crate::state::AppState;

/// Plan response.
#[derive(Debug, Serialize)]
pub struct PlanResponse {
    /// Tier features are gated with right now.
    pub plan: PlanTier,
    /// Plan selected by precedence, with its source.
    pub effective: EffectivePlan,
    /// Stored plan row.
    pub stored: PlanRecord,
    /// Whether the user ever completed a purchase.
    pub ever_paid: bool,
}

/// Get the caller's plan.
pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<PlanResponse>, ApiError> {
    let entitlements = gate::load(state.store.as_ref(), &auth.user_id, state.clock.now())?;

    Ok(Json(PlanResponse {
        plan: entitlements.tier,
        effective: entitlements.effective,
        stored: entitlements.stored,
        ever_paid: entitlements.ever_paid,
    }))
}

/// Plan selection request.
#[derive(Debug, Deserialize)]
pub struct SelectPlanRequest {
    /// Tier to select.
    pub plan: PlanTier,
}

/// Select a plan. Only free can be selected without a purchase.
pub async fn select_plan(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<SelectPlanRequest>,
) -> Result<Json<PlanRecord>, ApiError> {
    if body.plan.is_paid() {
        return Err(ApiError::PaymentRequired(format!(
            "the {} plan requires a purchase",
            body.plan.display_name()
        )));
    }

    let plan = plans::select_free(state.store.as_ref(), &auth.user_id, state.clock.now())?;
    Ok(Json(plan))
}
