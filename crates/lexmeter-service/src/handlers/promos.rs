//! Promo code handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use lexmeter_core::PromoRedemption;

use crate::auth::AuthUser;
use crate::engine::promos;
use crate::error::ApiError;
use crate::state::AppState;

/// Redeem request.
#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    /// Promo code, matched case-insensitively.
    pub code: String,
}

/// Redeem a promo code for the caller.
pub async fn redeem(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<RedeemRequest>,
) -> Result<Json<PromoRedemption>, ApiError> {
    if body.code.trim().is_empty() {
        return Err(ApiError::BadRequest("code must not be empty".into()));
    }

    let redemption = promos::redeem_promo(
        state.store.as_ref(),
        &state.config.promo_codes,
        &auth.user_id,
        &body.code,
        state.clock.now(),
    )?;
    Ok(Json(redemption))
}
