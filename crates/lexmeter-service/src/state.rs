//! Application state.

use std::sync::Arc;

use lexmeter_core::{Clock, SystemClock};
use lexmeter_store::Store;

use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Source of "now" for every entitlement decision.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create application state on the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create application state on an explicit clock.
    #[must_use]
    pub fn with_clock(store: Arc<dyn Store>, config: ServiceConfig, clock: Arc<dyn Clock>) -> Self {
        if config.jwt_secret.is_none() {
            tracing::warn!("JWT secret not configured - user requests will be rejected");
        }
        if config.service_api_key.is_none() {
            tracing::warn!("Service API key not configured - service endpoints are disabled");
        }
        if config.payment_webhook_secret.is_none() {
            tracing::warn!(
                "Payment webhook secret not configured - webhook signatures will not be verified"
            );
        }
        tracing::info!(
            products = config.products.len(),
            promo_codes = config.promo_codes.len(),
            "Entitlement catalogs loaded"
        );

        Self {
            store,
            config,
            clock,
        }
    }
}
