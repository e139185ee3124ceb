//! Entitlement gate on top of the store.
//!
//! [`load`] gathers everything [`lexmeter_core::evaluate`] needs for one
//! user. Reads of the plan, purchases and grants must succeed: callers turn
//! an error into a closed decision. The usage count is the exception and
//! falls back to zero.

use chrono::{DateTime, Utc};
use serde::Serialize;

use lexmeter_core::{
    evaluate, has_ever_paid, metering_window, remaining_credits, resolve_effective_plan,
    Credits, Decision, EffectivePlan, Feature, MeteringWindow, PlanRecord, PlanState, PlanTier,
    UserId,
};
use lexmeter_store::Store;

use super::sweeper::sweep_user;
use super::EngineError;

/// Entitlement state of one user at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct UserEntitlements {
    /// Stored plan row, or the implicit free plan.
    pub stored: PlanRecord,
    /// Plan selected by precedence.
    pub effective: EffectivePlan,
    /// Tier features are gated with.
    pub tier: PlanTier,
    /// Whether the user ever completed a purchase.
    pub ever_paid: bool,
    /// Current metering window; `None` when unmetered.
    pub window: Option<MeteringWindow>,
    /// Documents counted in `window`.
    pub used: u32,
    /// Analysis credits left.
    pub remaining_credits: Credits,
    #[serde(skip)]
    state: PlanState,
}

impl UserEntitlements {
    /// Gate input derived from this state.
    #[must_use]
    pub const fn state(&self) -> PlanState {
        self.state
    }

    /// Decide one feature.
    #[must_use]
    pub fn decide(&self, feature: Feature) -> Decision {
        evaluate(feature, &self.state)
    }
}

/// Load the user's entitlement state at `now`.
///
/// The user's own plan is swept first so a lapsed plan never gates as paid.
///
/// # Errors
///
/// Returns an error if the plan, purchase or grant reads fail.
pub fn load(
    store: &dyn Store,
    user_id: &UserId,
    now: DateTime<Utc>,
) -> Result<UserEntitlements, EngineError> {
    if let Err(e) = sweep_user(store, user_id, now) {
        tracing::warn!(user_id = %user_id, error = %e, "On-demand sweep failed");
    }

    let stored = store
        .get_plan(user_id)?
        .unwrap_or_else(|| PlanRecord::free(*user_id, now));
    let purchases = store.list_purchases_by_user(user_id)?;
    let rewards = store.list_referral_rewards(user_id)?;
    let promos = store.list_promo_redemptions(user_id)?;

    let effective = resolve_effective_plan(now, &stored, &rewards, &promos);
    let tier = effective.gating_tier(now);
    let ever_paid = has_ever_paid(&purchases);
    let window = metering_window(tier, effective.started_at, now);

    // Users who already paid get no free credits, so there is nothing to count.
    let counted = window.filter(|_| tier.is_paid() || !ever_paid);
    let used = counted.map_or(0, |window| count_usage(store, user_id, window));

    let state = PlanState {
        tier,
        ever_paid,
        used_this_window: used,
    };

    Ok(UserEntitlements {
        stored,
        effective,
        tier,
        ever_paid,
        window,
        used,
        remaining_credits: remaining_credits(&state),
        state,
    })
}

/// Decide `feature` for the user, failing closed on read errors.
pub fn decide(store: &dyn Store, user_id: &UserId, feature: Feature, now: DateTime<Utc>) -> Decision {
    match load(store, user_id, now) {
        Ok(entitlements) => entitlements.decide(feature),
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                feature = %feature,
                error = %e,
                "Entitlement evaluation failed"
            );
            Decision::evaluation_failed()
        }
    }
}

/// Non-deleted documents created inside `window`; zero if the count fails.
fn count_usage(store: &dyn Store, user_id: &UserId, window: MeteringWindow) -> u32 {
    store
        .count_documents(user_id, window.start, window.end)
        .unwrap_or_else(|e| {
            tracing::warn!(user_id = %user_id, error = %e, "Usage count failed, assuming zero");
            0
        })
}
