//! Plan expiry.
//!
//! Expiry is applied lazily on read and periodically by a background sweep.
//! Both paths call [`plan_expiry`], which is idempotent: a swept record is no
//! longer expired, so a second pass produces nothing.

use chrono::{DateTime, Utc};

use crate::plan::{PlanRecord, PlanTier};
use crate::referral::ReferralReward;
use crate::transition::{PlanTransition, TransitionKind};

/// Writes produced by expiring one plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryChange {
    /// Plan record after expiry.
    pub plan: PlanRecord,
    /// Referral reward row reactivated from the paused snapshot.
    pub reward: Option<ReferralReward>,
    /// The recorded transition.
    pub transition: PlanTransition,
}

/// Expire `plan` if it has lapsed at `now`.
///
/// `paused_row` is the referral reward row the paused snapshot points at.
/// When a snapshot with time left exists the reward resumes for that time;
/// otherwise the user reverts to free. Returns `None` when nothing lapsed.
#[must_use]
pub fn plan_expiry(
    now: DateTime<Utc>,
    plan: &PlanRecord,
    paused_row: Option<ReferralReward>,
) -> Option<ExpiryChange> {
    if plan.plan == PlanTier::Free || !plan.is_expired(now) {
        return None;
    }

    let mut next = plan.clone();
    next.purchase_ref = None;
    next.started_at = now;
    next.updated_at = now;

    let paused = next
        .paused_reward
        .take()
        .filter(|paused| paused.remaining_ms > 0);

    let Some(paused) = paused else {
        next.plan = PlanTier::Free;
        next.expires_at = None;
        let transition = PlanTransition::new(
            plan.user_id,
            TransitionKind::Expired,
            plan.plan,
            PlanTier::Free,
            None,
            now,
        );
        return Some(ExpiryChange {
            plan: next,
            reward: None,
            transition,
        });
    };

    let mut reward = paused_row
        .filter(|row| row.month_year == paused.month_year)
        .unwrap_or_else(|| ReferralReward {
            user_id: plan.user_id,
            month_year: paused.month_year,
            plan: paused.reward_plan,
            referral_count: 0,
            starts_at: now,
            expires_at: now,
        });
    reward.resume(paused.reward_plan, now, paused.remaining());

    next.plan = paused.reward_plan;
    next.expires_at = Some(reward.expires_at);

    let transition = PlanTransition::new(
        plan.user_id,
        TransitionKind::RewardRestored,
        plan.plan,
        paused.reward_plan,
        Some(reward.expires_at),
        now,
    );
    Some(ExpiryChange {
        plan: next,
        reward: Some(reward),
        transition,
    })
}
