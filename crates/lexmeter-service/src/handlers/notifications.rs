//! Plan change notifications.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use lexmeter_core::PlanTransition;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Upper bound on `limit`.
const MAX_LIMIT: usize = 200;

/// Notification list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    /// Maximum number of entries to return (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// List the caller's plan transitions, newest first.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<Vec<PlanTransition>>, ApiError> {
    let limit = query.limit.min(MAX_LIMIT);
    let transitions = state.store.list_transitions(&auth.user_id, limit)?;
    Ok(Json(transitions))
}
