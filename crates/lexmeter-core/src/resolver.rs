//! Effective plan resolution.
//!
//! A user's plan can come from three places: an explicit plan record, a
//! referral reward or a promo-code redemption. [`resolve_effective_plan`] picks
//! the one that governs entitlement right now.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::{PlanRecord, PlanTier};
use crate::promo::PromoRedemption;
use crate::referral::ReferralReward;

/// Where the effective plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanSource {
    /// The stored plan record.
    ExplicitPlan,
    /// An active referral reward.
    ReferralReward,
    /// An active promo redemption.
    PromoCode,
}

/// The plan that governs entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePlan {
    /// Resolved tier, before expiry is applied.
    pub plan: PlanTier,
    /// Start of the source's validity window (anchors metering windows).
    pub started_at: DateTime<Utc>,
    /// End of the source's validity window.
    pub expires_at: Option<DateTime<Utc>>,
    /// Which source won.
    pub source: PlanSource,
}

impl EffectivePlan {
    /// Whether the resolved plan has lapsed at `now`.
    ///
    /// Only explicit plans can lapse while still resolved; rewards and promos
    /// stop being selected once their window closes.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Tier to gate features with: free once the plan has lapsed.
    #[must_use]
    pub fn gating_tier(&self, now: DateTime<Utc>) -> PlanTier {
        if self.is_expired(now) {
            PlanTier::Free
        } else {
            self.plan
        }
    }
}

/// Resolve the effective plan.
///
/// Precedence is promo code, then referral reward, then the explicit plan.
/// Among several active grants of the same kind the highest tier wins, then
/// the latest expiry.
#[must_use]
pub fn resolve_effective_plan(
    now: DateTime<Utc>,
    plan: &PlanRecord,
    referral_rewards: &[ReferralReward],
    promo_redemptions: &[PromoRedemption],
) -> EffectivePlan {
    if let Some(promo) = promo_redemptions
        .iter()
        .filter(|promo| promo.is_active(now))
        .max_by_key(|promo| (promo.plan.rank(), promo.expires_at))
    {
        return EffectivePlan {
            plan: promo.plan,
            started_at: promo.starts_at,
            expires_at: Some(promo.expires_at),
            source: PlanSource::PromoCode,
        };
    }

    if let Some(reward) = referral_rewards
        .iter()
        .filter(|reward| reward.is_active(now))
        .max_by_key(|reward| (reward.plan.rank(), reward.expires_at))
    {
        return EffectivePlan {
            plan: reward.plan,
            started_at: reward.starts_at,
            expires_at: Some(reward.expires_at),
            source: PlanSource::ReferralReward,
        };
    }

    EffectivePlan {
        plan: plan.plan,
        started_at: plan.started_at,
        expires_at: plan.expires_at,
        source: PlanSource::ExplicitPlan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use crate::referral::MonthYear;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 15, 12, 0, 0).unwrap()
    }

    fn basic_plan(user_id: UserId) -> PlanRecord {
        let mut plan = PlanRecord::free(user_id, now() - Duration::days(5));
        plan.plan = PlanTier::Basic;
        plan.expires_at = Some(now() + Duration::days(25));
        plan
    }

    fn reward(user_id: UserId, plan: PlanTier, days_left: i64) -> ReferralReward {
        ReferralReward {
            user_id,
            month_year: MonthYear::of(now()),
            plan,
            referral_count: 3,
            starts_at: now() - Duration::days(1),
            expires_at: now() + Duration::days(days_left),
        }
    }

    fn promo(user_id: UserId, plan: PlanTier) -> PromoRedemption {
        PromoRedemption {
            user_id,
            code: "LAUNCH".into(),
            plan,
            starts_at: now() - Duration::hours(1),
            expires_at: now() + Duration::days(7),
        }
    }

    #[test]
    fn explicit_plan_when_nothing_else_applies() {
        let user_id = UserId::generate();
        let resolved = resolve_effective_plan(now(), &basic_plan(user_id), &[], &[]);
        assert_eq!(resolved.plan, PlanTier::Basic);
        assert_eq!(resolved.source, PlanSource::ExplicitPlan);
        assert_eq!(resolved.started_at, now() - Duration::days(5));
    }

    #[test]
    fn referral_reward_beats_explicit_plan() {
        let user_id = UserId::generate();
        let rewards = [reward(user_id, PlanTier::Premium, 10)];
        let resolved = resolve_effective_plan(now(), &basic_plan(user_id), &rewards, &[]);
        assert_eq!(resolved.plan, PlanTier::Premium);
        assert_eq!(resolved.source, PlanSource::ReferralReward);
        assert_eq!(resolved.expires_at, Some(now() + Duration::days(10)));
    }

    #[test]
    fn promo_beats_referral_reward() {
        let user_id = UserId::generate();
        let rewards = [reward(user_id, PlanTier::Premium, 10)];
        let promos = [promo(user_id, PlanTier::Basic)];
        let resolved = resolve_effective_plan(now(), &basic_plan(user_id), &rewards, &promos);
        assert_eq!(resolved.plan, PlanTier::Basic);
        assert_eq!(resolved.source, PlanSource::PromoCode);
    }

    #[test]
    fn inactive_grants_are_ignored() {
        let user_id = UserId::generate();
        let expired = reward(user_id, PlanTier::Premium, -1);
        let mut future = promo(user_id, PlanTier::Premium);
        future.starts_at = now() + Duration::days(1);

        let resolved = resolve_effective_plan(now(), &basic_plan(user_id), &[expired], &[future]);
        assert_eq!(resolved.source, PlanSource::ExplicitPlan);
    }

    #[test]
    fn highest_active_reward_wins() {
        let user_id = UserId::generate();
        let rewards = [
            reward(user_id, PlanTier::Basic, 20),
            reward(user_id, PlanTier::Premium, 3),
        ];
        let resolved = resolve_effective_plan(now(), &PlanRecord::free(user_id, now()), &rewards, &[]);
        assert_eq!(resolved.plan, PlanTier::Premium);
    }

    #[test]
    fn lapsed_explicit_plan_gates_as_free() {
        let user_id = UserId::generate();
        let plan = basic_plan(user_id);
        let later = now() + Duration::days(26);

        let resolved = resolve_effective_plan(later, &plan, &[], &[]);
        assert_eq!(resolved.plan, PlanTier::Basic);
        assert!(resolved.is_expired(later));
        assert_eq!(resolved.gating_tier(later), PlanTier::Free);
        assert_eq!(resolved.gating_tier(now()), PlanTier::Basic);
    }
}
