//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    documents, entitlements, health, notifications, plans, promos, referrals, sweep, usage,
    webhooks,
};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for gate checks, which every client screen
/// issues.
const GATE_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Plans (user JWT auth)
/// - `GET /v1/plan` - Effective and stored plan
/// - `POST /v1/plan/select` - Select the free plan
///
/// ## Entitlements (user JWT auth, rate-limited)
/// - `GET /v1/entitlements` - Decision for every feature
/// - `GET /v1/entitlements/:feature` - Decision for one feature
/// - `GET /v1/usage` - Metering window and credits
///
/// ## Documents (user JWT auth)
/// - `POST /v1/documents` - Gate and record an analyzed document
/// - `DELETE /v1/documents/:id` - Soft-delete a document
///
/// ## Grants
/// - `POST /v1/promo/redeem` - Redeem a promo code (user JWT auth)
/// - `POST /v1/referrals` - Record a referral (service API key auth)
///
/// ## Notifications (user JWT auth)
/// - `GET /v1/notifications` - Recent plan transitions
///
/// ## Maintenance (service API key auth)
/// - `POST /v1/sweep` - Run an expiration sweep now
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/payments` - Payment provider events
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let gate_routes = Router::new()
        .route("/entitlements", get(entitlements::list_entitlements))
        .route("/entitlements/:feature", get(entitlements::get_entitlement))
        .route("/usage", get(usage::get_usage))
        .layer(ConcurrencyLimitLayer::new(GATE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Plans
        .route("/plan", get(plans::get_plan))
        .route("/plan/select", post(plans::select_plan))
        // Documents
        .route("/documents", post(documents::record_document))
        .route("/documents/:id", delete(documents::delete_document))
        // Grants
        .route("/promo/redeem", post(promos::redeem))
        .route("/referrals", post(referrals::record_referral))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        // Maintenance
        .route("/sweep", post(sweep::run_sweep))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .merge(gate_routes);

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by the payment provider)
        .route("/webhooks/payments", post(webhooks::payment_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
