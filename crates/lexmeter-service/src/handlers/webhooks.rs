//! Payment provider webhook.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lexmeter_core::{EntitlementError, PurchaseEvent, PurchaseStatus};

use crate::crypto::verify_signature;
use crate::engine::purchases::ingest_purchase;
use crate::engine::EngineError;
use crate::error::ApiError;
use crate::state::AppState;

/// Payment webhook payload.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    /// Provider order identifier.
    pub order_id: String,
    /// Paying user.
    pub user_id: String,
    /// Provider product identifier.
    pub product_id: String,
    /// Payment status.
    pub status: PurchaseStatus,
    /// Amount in minor units.
    #[serde(default)]
    pub amount_cents: i64,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// End of the purchased term, overriding the catalog term.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was accepted.
    pub received: bool,
    /// `applied`, `duplicate` or `ignored`.
    pub outcome: &'static str,
}

/// Handle payment webhooks.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let now = state.clock.now();

    if let Some(secret) = &state.config.payment_webhook_secret {
        let signature = headers
            .get("x-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing webhook signature".into()))?;

        verify_signature(
            secret,
            signature,
            &body,
            now,
            state.config.webhook_tolerance_seconds,
        )
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid payment webhook signature");
            ApiError::BadRequest("Invalid webhook signature".into())
        })?;
    } else {
        tracing::warn!("Payment webhook secret not configured - skipping signature verification");
    }

    let webhook: PaymentWebhook =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        order_id = %webhook.order_id,
        product_id = %webhook.product_id,
        status = ?webhook.status,
        "Received payment webhook"
    );

    let user_id = webhook
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let (plan, expires_at) = state
        .config
        .products
        .resolve(&webhook.product_id, webhook.expires_at, now)
        .map_err(|e| {
            tracing::warn!(
                order_id = %webhook.order_id,
                product_id = %webhook.product_id,
                "Payment for unmapped product rejected"
            );
            ApiError::from(e)
        })?;

    let event = PurchaseEvent {
        user_id,
        external_order_id: webhook.order_id,
        plan,
        product_id: webhook.product_id,
        amount_cents: webhook.amount_cents,
        currency: webhook.currency,
        status: webhook.status,
        expires_at,
    };

    let outcome = match ingest_purchase(state.store.as_ref(), &event, now) {
        Ok(outcome) => outcome.as_str(),
        Err(EngineError::Entitlement(e @ EntitlementError::InvalidStatusTransition { .. })) => {
            // Redelivering would not help; acknowledge so the provider stops.
            tracing::warn!(
                order_id = %event.external_order_id,
                error = %e,
                "Payment event out of order, ignored"
            );
            "ignored"
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}
