//! Referral counting.

use chrono::{DateTime, Utc};

use lexmeter_core::{
    record_referral, MonthYear, PlanRecord, PlanTransition, ReferralOutcome, ReferralPolicy,
    TransitionKind, UserId,
};
use lexmeter_store::{PlanChange, PlanGuard, Store};

use super::{with_retry, EngineError};

/// Count one referral for `referrer` at `now`.
///
/// The referrer's plan row is rewritten on every referral so the version
/// guard also orders concurrent increments of the monthly count.
///
/// # Errors
///
/// Returns an error if the store fails or the commit keeps conflicting.
pub fn add_referral(
    store: &dyn Store,
    policy: &ReferralPolicy,
    referrer: &UserId,
    now: DateTime<Utc>,
) -> Result<ReferralOutcome, EngineError> {
    with_retry(|| {
        let stored = store.get_plan(referrer)?;
        let plan = stored
            .clone()
            .unwrap_or_else(|| PlanRecord::free(*referrer, now));
        let existing = store.get_referral_reward(referrer, MonthYear::of(now))?;

        let from = plan.plan;
        let outcome = record_referral(now, policy, &plan, existing);

        let mut change = PlanChange::new(*referrer, PlanGuard::of(stored.as_ref()));
        change.plan = Some(outcome.plan.clone().unwrap_or(plan));
        change.rewards.push(outcome.reward.clone());
        change.transition = outcome.granted.map(|tier| {
            let expires_at = outcome
                .reward
                .is_active(now)
                .then_some(outcome.reward.expires_at);
            PlanTransition::new(
                *referrer,
                TransitionKind::RewardGranted,
                from,
                tier,
                expires_at,
                now,
            )
        });
        store.commit(&change)?;

        match outcome.granted {
            Some(tier) => tracing::info!(
                referrer = %referrer,
                count = outcome.reward.referral_count,
                plan = %tier,
                paused = !outcome.reward.is_active(now),
                "Referral reward granted"
            ),
            None => tracing::debug!(
                referrer = %referrer,
                count = outcome.reward.referral_count,
                "Referral counted"
            ),
        }
        Ok(outcome)
    })
}
