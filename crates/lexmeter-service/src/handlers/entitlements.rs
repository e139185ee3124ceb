//! Entitlement handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use lexmeter_core::{Credits, Decision, Feature, PlanTier, UnknownFeature};

use crate::auth::AuthUser;
use crate::engine::gate;
use crate::error::ApiError;
use crate::state::AppState;

/// Decisions for every feature.
#[derive(Debug, Serialize)]
pub struct EntitlementsResponse {
    /// Tier features are gated with.
    pub plan: PlanTier,
    /// Analysis credits left.
    pub remaining_credits: Credits,
    /// Decision per feature, keyed by feature name.
    pub features: BTreeMap<&'static str, Decision>,
}

/// Evaluate every feature for the caller.
///
/// A failed read answers every feature with `evaluation-failed`.
pub async fn list_entitlements(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Json<EntitlementsResponse> {
    let response = match gate::load(state.store.as_ref(), &auth.user_id, state.clock.now()) {
        Ok(entitlements) => EntitlementsResponse {
            plan: entitlements.tier,
            remaining_credits: entitlements.remaining_credits,
            features: Feature::ALL
                .into_iter()
                .map(|feature| (feature.as_str(), entitlements.decide(feature)))
                .collect(),
        },
        Err(e) => {
            tracing::warn!(user_id = %auth.user_id, error = %e, "Entitlement evaluation failed");
            EntitlementsResponse {
                plan: PlanTier::Free,
                remaining_credits: Credits::Remaining(0),
                features: Feature::ALL
                    .into_iter()
                    .map(|feature| (feature.as_str(), Decision::evaluation_failed()))
                    .collect(),
            }
        }
    };

    Json(response)
}

/// Evaluate one feature for the caller.
pub async fn get_entitlement(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(feature): Path<String>,
) -> Result<Json<Decision>, ApiError> {
    let feature: Feature = feature
        .parse()
        .map_err(|e: UnknownFeature| ApiError::NotFound(e.to_string()))?;

    Ok(Json(gate::decide(
        state.store.as_ref(),
        &auth.user_id,
        feature,
        state.clock.now(),
    )))
}
