//! Plan tiers and the per-user plan record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EntitlementError, Result};
use crate::ids::{PurchaseId, UserId};
use crate::referral::MonthYear;

// ============================================================================
// Constants
// ============================================================================

/// Documents a never-paid free user may analyze per calendar month.
pub const FREE_MONTHLY_DOCUMENTS: u32 = 1;

/// Documents a basic subscriber may analyze per metering window.
pub const BASIC_WINDOW_DOCUMENTS: u32 = 10;

/// Documents a pay-per-use purchase covers per metering window.
pub const PAY_PER_USE_DOCUMENTS: u32 = 1;

/// Available plan tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanTier {
    /// No subscription.
    Free,
    /// Single-document purchase.
    PayPerUse,
    /// Monthly subscription, 10 analyses per window.
    Basic,
    /// Unlimited analyses and every tool.
    Premium,
}

impl PlanTier {
    /// Every tier, lowest first.
    pub const ALL: [Self; 4] = [Self::Free, Self::PayPerUse, Self::Basic, Self::Premium];

    /// Stable wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::PayPerUse => "pay-per-use",
            Self::Basic => "basic",
            Self::Premium => "premium",
        }
    }

    /// Ordering used when several grants compete.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Free => 0,
            Self::PayPerUse => 1,
            Self::Basic => 2,
            Self::Premium => 3,
        }
    }

    /// Whether the tier is sold rather than given away.
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        !matches!(self, Self::Free)
    }

    /// Analyses allowed per metering window, `None` when unmetered.
    #[must_use]
    pub const fn window_document_limit(&self) -> Option<u32> {
        match self {
            Self::Free => Some(FREE_MONTHLY_DOCUMENTS),
            Self::PayPerUse => Some(PAY_PER_USE_DOCUMENTS),
            Self::Basic => Some(BASIC_WINDOW_DOCUMENTS),
            Self::Premium => None,
        }
    }

    /// Human-readable name for notifications.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::PayPerUse => "Pay-per-use",
            Self::Basic => "Basic",
            Self::Premium => "Premium",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = EntitlementError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pay-per-use" | "pay_per_use" | "payperuse" => Ok(Self::PayPerUse),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            other => Err(EntitlementError::UnknownPlan(other.to_string())),
        }
    }
}

/// Snapshot of a referral reward frozen while a purchase takes precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausedReward {
    /// Tier the reward grants.
    pub reward_plan: PlanTier,

    /// Month of the referral reward row this snapshot belongs to.
    pub month_year: MonthYear,

    /// Reward time left when it was paused, in milliseconds.
    pub remaining_ms: i64,

    /// Expiry the reward had before it was paused.
    pub original_expiry: DateTime<Utc>,
}

impl PausedReward {
    /// Remaining reward time as a duration.
    #[must_use]
    pub fn remaining(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.remaining_ms)
    }
}

/// The stored plan of a single user.
///
/// There is at most one row per user; it is overwritten in place and never
/// deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRecord {
    /// Owning user.
    pub user_id: UserId,

    /// Explicitly held tier.
    pub plan: PlanTier,

    /// When the tier was (re)started.
    pub started_at: DateTime<Utc>,

    /// When the tier lapses; `None` never lapses.
    pub expires_at: Option<DateTime<Utc>>,

    /// Purchase backing the tier, if any.
    pub purchase_ref: Option<PurchaseId>,

    /// Referral reward frozen by a purchase.
    pub paused_reward: Option<PausedReward>,

    /// Optimistic concurrency counter, bumped by the store on every commit.
    #[serde(default)]
    pub version: u64,

    /// When the row was created.
    pub created_at: DateTime<Utc>,

    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl PlanRecord {
    /// A fresh, never-stored free plan.
    #[must_use]
    pub fn free(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            plan: PlanTier::Free,
            started_at: now,
            expires_at: None,
            purchase_ref: None,
            paused_reward: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the explicit plan has lapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Whether a purchased plan is currently in force.
    #[must_use]
    pub fn has_active_purchase(&self, now: DateTime<Utc>) -> bool {
        self.plan.is_paid() && self.purchase_ref.is_some() && !self.is_expired(now)
    }

    /// Check the validity-window invariant.
    ///
    /// # Errors
    ///
    /// Returns `EntitlementError::InvalidWindow` if `expires_at` precedes
    /// `started_at`.
    pub fn validate(&self) -> Result<()> {
        match self.expires_at {
            Some(expires_at) if expires_at < self.started_at => {
                Err(EntitlementError::InvalidWindow {
                    starts_at: self.started_at,
                    expires_at,
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn plan_tier_wire_names() {
        assert_eq!(
            serde_json::to_string(&PlanTier::PayPerUse).unwrap(),
            "\"pay-per-use\""
        );
        assert_eq!("premium".parse::<PlanTier>().unwrap(), PlanTier::Premium);
        assert_eq!("Pay_Per_Use".parse::<PlanTier>().unwrap(), PlanTier::PayPerUse);
        assert!(matches!(
            "enterprise".parse::<PlanTier>(),
            Err(EntitlementError::UnknownPlan(_))
        ));
    }

    #[test]
    fn window_limits() {
        assert_eq!(PlanTier::Free.window_document_limit(), Some(1));
        assert_eq!(PlanTier::PayPerUse.window_document_limit(), Some(1));
        assert_eq!(PlanTier::Basic.window_document_limit(), Some(10));
        assert_eq!(PlanTier::Premium.window_document_limit(), None);
    }

    #[test]
    fn free_plan_never_expires() {
        let record = PlanRecord::free(UserId::generate(), now());
        assert!(!record.is_expired(now() + Duration::days(4000)));
        assert!(!record.has_active_purchase(now()));
    }

    #[test]
    fn expiry_is_strictly_after_expires_at() {
        let mut record = PlanRecord::free(UserId::generate(), now());
        record.plan = PlanTier::Basic;
        record.expires_at = Some(now() + Duration::days(30));

        assert!(!record.is_expired(now() + Duration::days(30)));
        assert!(record.is_expired(now() + Duration::days(30) + Duration::milliseconds(1)));
    }

    #[test]
    fn validate_rejects_inverted_window() {
        let mut record = PlanRecord::free(UserId::generate(), now());
        record.expires_at = Some(now() - Duration::seconds(1));
        assert!(matches!(
            record.validate(),
            Err(EntitlementError::InvalidWindow { .. })
        ));

        record.expires_at = Some(now());
        assert!(record.validate().is_ok());
    }
}
