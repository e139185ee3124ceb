//! Promo code redemption.

use chrono::{DateTime, Utc};

use lexmeter_core::{PromoCatalog, PromoRedemption, UserId};
use lexmeter_store::Store;

use super::EngineError;

/// Redeem `code` for `user_id`.
///
/// # Errors
///
/// Returns `EntitlementError::UnknownPromoCode` for a code outside the
/// catalog and `StoreError::Duplicate` when the user already redeemed it.
pub fn redeem_promo(
    store: &dyn Store,
    catalog: &PromoCatalog,
    user_id: &UserId,
    code: &str,
    now: DateTime<Utc>,
) -> Result<PromoRedemption, EngineError> {
    let promo = catalog.find(code)?;
    let redemption = promo.redeem(*user_id, now);
    store.put_promo_redemption(&redemption)?;

    tracing::info!(
        user_id = %user_id,
        code = %redemption.code,
        plan = %redemption.plan,
        expires_at = %redemption.expires_at,
        "Promo code redeemed"
    );
    Ok(redemption)
}
