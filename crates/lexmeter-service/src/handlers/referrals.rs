//! Referral handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use lexmeter_core::{PlanTier, ReferralReward, UserId};

use crate::auth::ServiceAuth;
use crate::engine::referrals;
use crate::error::ApiError;
use crate::state::AppState;

/// Record referral request.
#[derive(Debug, Deserialize)]
pub struct RecordReferralRequest {
    /// User credited with the referral.
    pub referrer_id: String,
}

/// Record referral response.
#[derive(Debug, Serialize)]
pub struct RecordReferralResponse {
    /// Referrals counted this month, including this one.
    pub referral_count: u32,
    /// Tier granted or upgraded to by this referral.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted: Option<PlanTier>,
    /// Reward row for the month.
    pub reward: ReferralReward,
}

/// Count a referral for a referrer.
pub async fn record_referral(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<RecordReferralRequest>,
) -> Result<Json<RecordReferralResponse>, ApiError> {
    let referrer: UserId = body
        .referrer_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid referrer ID".into()))?;

    tracing::debug!(service = %auth.service_name, referrer = %referrer, "Recording referral");

    let outcome = referrals::add_referral(
        state.store.as_ref(),
        &state.config.referral_policy,
        &referrer,
        state.clock.now(),
    )?;

    Ok(Json(RecordReferralResponse {
        referral_count: outcome.reward.referral_count,
        granted: outcome.granted,
        reward: outcome.reward,
    }))
}
