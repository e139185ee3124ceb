//! Referral reward ledger types and granting rules.
//!
//! A referrer accumulates referrals per calendar month. Crossing a tier
//! threshold grants a time-boxed bonus plan. While a purchased plan is in
//! force the reward is frozen as a [`PausedReward`] on the plan record and
//! resumes once the purchase lapses.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EntitlementError, Result};
use crate::ids::UserId;
use crate::plan::{PausedReward, PlanRecord, PlanTier};

/// Default number of days a referral reward lasts.
pub const DEFAULT_REWARD_DAYS: u32 = 30;

/// A calendar month, rendered `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthYear {
    year: i32,
    month: u32,
}

impl MonthYear {
    /// Build from a year and a 1-based month.
    ///
    /// # Errors
    ///
    /// Returns `EntitlementError::InvalidMonthYear` if `month` is not 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if (1..=12).contains(&month) {
            Ok(Self { year, month })
        } else {
            Err(EntitlementError::InvalidMonthYear(format!("{year}-{month}")))
        }
    }

    /// The month containing `at`.
    #[must_use]
    pub fn of(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    /// Calendar year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// 1-based month.
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthYear {
    type Err = EntitlementError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || EntitlementError::InvalidMonthYear(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for MonthYear {
    type Error = EntitlementError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MonthYear> for String {
    fn from(value: MonthYear) -> Self {
        value.to_string()
    }
}

/// Referral reward earned by a user for one month.
///
/// Before the first threshold is reached the row only tracks the count: its
/// tier is free and its window is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralReward {
    /// The referring user.
    pub user_id: UserId,

    /// Month the referrals were made in.
    pub month_year: MonthYear,

    /// Granted tier.
    pub plan: PlanTier,

    /// Referrals counted this month.
    pub referral_count: u32,

    /// Start of the reward window.
    pub starts_at: DateTime<Utc>,

    /// End of the reward window (exclusive).
    pub expires_at: DateTime<Utc>,
}

impl ReferralReward {
    /// Whether the reward governs the plan at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.plan.is_paid() && self.starts_at <= now && now < self.expires_at
    }

    /// Reward time left at `now`, zero when inactive.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        if self.is_active(now) {
            self.expires_at - now
        } else {
            Duration::zero()
        }
    }

    /// Freeze the reward at `now`, pulling its expiry forward.
    ///
    /// Returns the snapshot to keep on the plan record.
    pub fn pause(&mut self, now: DateTime<Utc>) -> PausedReward {
        let snapshot = PausedReward {
            reward_plan: self.plan,
            month_year: self.month_year,
            remaining_ms: self.remaining_at(now).num_milliseconds(),
            original_expiry: self.expires_at,
        };
        if self.expires_at > now {
            self.expires_at = now.max(self.starts_at);
        }
        snapshot
    }

    /// Reactivate the reward for `remaining`, starting at `now`.
    pub fn resume(&mut self, plan: PlanTier, now: DateTime<Utc>, remaining: Duration) {
        self.plan = plan;
        self.starts_at = now;
        self.expires_at = now + remaining;
    }
}

/// Fold a newly paused reward into an existing snapshot.
///
/// Only one snapshot fits on a plan record, so a second reward adds its time
/// to the first and the higher tier is kept.
#[must_use]
pub fn merge_paused(existing: Option<PausedReward>, incoming: PausedReward) -> PausedReward {
    match existing {
        None => incoming,
        Some(mut paused) => {
            paused.remaining_ms += incoming.remaining_ms;
            if incoming.reward_plan.rank() > paused.reward_plan.rank() {
                paused.reward_plan = incoming.reward_plan;
            }
            paused
        }
    }
}

/// A referral count threshold and the tier it unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralTier {
    /// Referrals needed in a month.
    pub threshold: u32,
    /// Tier granted once reached.
    pub plan: PlanTier,
}

/// Referral reward rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralPolicy {
    /// Thresholds, in any order.
    pub tiers: Vec<ReferralTier>,
    /// Reward length in days.
    pub reward_days: u32,
}

impl Default for ReferralPolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                ReferralTier {
                    threshold: 3,
                    plan: PlanTier::Basic,
                },
                ReferralTier {
                    threshold: 5,
                    plan: PlanTier::Premium,
                },
            ],
            reward_days: DEFAULT_REWARD_DAYS,
        }
    }
}

impl ReferralPolicy {
    /// Tier earned with `count` referrals, if any.
    #[must_use]
    pub fn tier_for(&self, count: u32) -> Option<PlanTier> {
        self.tiers
            .iter()
            .filter(|tier| tier.threshold <= count)
            .max_by_key(|tier| (tier.threshold, tier.plan.rank()))
            .map(|tier| tier.plan)
    }

    /// Reward length.
    #[must_use]
    pub fn reward_duration(&self) -> Duration {
        Duration::days(i64::from(self.reward_days))
    }
}

/// Result of counting one more referral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralOutcome {
    /// Updated reward row for the month.
    pub reward: ReferralReward,
    /// Updated plan record, when the paused snapshot changed.
    pub plan: Option<PlanRecord>,
    /// Tier granted or upgraded to by this referral.
    pub granted: Option<PlanTier>,
}

/// Count one referral for `plan.user_id` at `now`.
///
/// `existing` is the referrer's reward row for the current month, if any.
#[must_use]
pub fn record_referral(
    now: DateTime<Utc>,
    policy: &ReferralPolicy,
    plan: &PlanRecord,
    existing: Option<ReferralReward>,
) -> ReferralOutcome {
    let month_year = MonthYear::of(now);
    let mut reward = existing.unwrap_or(ReferralReward {
        user_id: plan.user_id,
        month_year,
        plan: PlanTier::Free,
        referral_count: 0,
        starts_at: now,
        expires_at: now,
    });

    let previous_tier = policy.tier_for(reward.referral_count);
    reward.referral_count += 1;
    let tier = policy.tier_for(reward.referral_count);

    let Some(tier) = tier.filter(|tier| Some(*tier) != previous_tier) else {
        return ReferralOutcome {
            reward,
            plan: None,
            granted: None,
        };
    };

    if reward.plan.is_paid() {
        // Already granted this month: upgrade in place, window unchanged.
        reward.plan = tier;
        let plan = plan
            .paused_reward
            .as_ref()
            .filter(|paused| paused.month_year == month_year)
            .map(|_| {
                let mut updated = plan.clone();
                if let Some(paused) = updated.paused_reward.as_mut() {
                    if tier.rank() > paused.reward_plan.rank() {
                        paused.reward_plan = tier;
                    }
                }
                updated.updated_at = now;
                updated
            });
        return ReferralOutcome {
            reward,
            plan,
            granted: Some(tier),
        };
    }

    let duration = policy.reward_duration();
    reward.plan = tier;

    if plan.has_active_purchase(now) {
        reward.starts_at = now;
        reward.expires_at = now;
        let incoming = PausedReward {
            reward_plan: tier,
            month_year,
            remaining_ms: duration.num_milliseconds(),
            original_expiry: now + duration,
        };
        let mut updated = plan.clone();
        updated.paused_reward = Some(merge_paused(updated.paused_reward.take(), incoming));
        updated.updated_at = now;
        ReferralOutcome {
            reward,
            plan: Some(updated),
            granted: Some(tier),
        }
    } else {
        reward.starts_at = now;
        reward.expires_at = now + duration;
        ReferralOutcome {
            reward,
            plan: None,
            granted: Some(tier),
        }
    }
}
