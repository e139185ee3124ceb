//! Error types for lexmeter domain logic.

use chrono::{DateTime, Utc};

use crate::ids::IdError;
use crate::purchase::PurchaseStatus;

/// Result type for lexmeter domain operations.
pub type Result<T> = std::result::Result<T, EntitlementError>;

/// Errors raised by the entitlement model.
#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    /// A plan identifier outside the known tiers.
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    /// A purchased product with no plan mapping.
    #[error("unknown product: {product_id}")]
    UnknownProduct {
        /// The unmapped product.
        product_id: String,
    },

    /// A validity window that ends before it starts.
    #[error("invalid window: starts_at={starts_at}, expires_at={expires_at}")]
    InvalidWindow {
        /// Window start.
        starts_at: DateTime<Utc>,
        /// Window end.
        expires_at: DateTime<Utc>,
    },

    /// A purchase status change other than completed → refunded.
    #[error("invalid purchase status transition from {from:?} to {to:?}")]
    InvalidStatusTransition {
        /// Current status.
        from: PurchaseStatus,
        /// Requested status.
        to: PurchaseStatus,
    },

    /// A malformed `YYYY-MM` month key.
    #[error("invalid month-year: {0}")]
    InvalidMonthYear(String),

    /// A promo code that is not in the catalog.
    #[error("unknown promo code: {0}")]
    UnknownPromoCode(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
