//! Manual expiration sweep.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::auth::ServiceAuth;
use crate::engine::sweeper::{sweep_all, SweepReport};
use crate::error::ApiError;
use crate::state::AppState;

/// Run a full expiration sweep now.
pub async fn run_sweep(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
) -> Result<Json<SweepReport>, ApiError> {
    tracing::info!(service = %auth.service_name, "Manual expiration sweep requested");
    let report = sweep_all(state.store.as_ref(), state.clock.now())?;
    Ok(Json(report))
}
