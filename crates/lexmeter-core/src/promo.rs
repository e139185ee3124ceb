//! Promo codes and their redemptions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EntitlementError, Result};
use crate::ids::UserId;
use crate::plan::PlanTier;

/// A promo code offered by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Code as typed by the user (matched case-insensitively).
    pub code: String,
    /// Tier it grants.
    pub plan: PlanTier,
    /// How long the grant lasts.
    pub duration_days: u32,
}

impl PromoCode {
    /// Redeem the code for `user_id` at `now`.
    #[must_use]
    pub fn redeem(&self, user_id: UserId, now: DateTime<Utc>) -> PromoRedemption {
        PromoRedemption {
            user_id,
            code: normalize_code(&self.code),
            plan: self.plan,
            starts_at: now,
            expires_at: now + Duration::days(i64::from(self.duration_days)),
        }
    }
}

/// A user's redemption of a promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoRedemption {
    /// Redeeming user.
    pub user_id: UserId,
    /// Normalized code.
    pub code: String,
    /// Granted tier.
    pub plan: PlanTier,
    /// Start of the grant.
    pub starts_at: DateTime<Utc>,
    /// End of the grant (exclusive).
    pub expires_at: DateTime<Utc>,
}

impl PromoRedemption {
    /// Whether the grant governs the plan at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.expires_at
    }
}

/// Canonical form of a code: trimmed and upper-cased.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// The set of redeemable codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromoCatalog {
    codes: Vec<PromoCode>,
}

impl PromoCatalog {
    /// Build a catalog from codes.
    #[must_use]
    pub fn new(codes: Vec<PromoCode>) -> Self {
        Self { codes }
    }

    /// Look up a code.
    ///
    /// # Errors
    ///
    /// Returns `EntitlementError::UnknownPromoCode` if no entry matches.
    pub fn find(&self, code: &str) -> Result<&PromoCode> {
        let wanted = normalize_code(code);
        self.codes
            .iter()
            .find(|entry| normalize_code(&entry.code) == wanted)
            .ok_or(EntitlementError::UnknownPromoCode(wanted))
    }

    /// Parse the `CODE:plan:days,...` form used by configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed entry or an unknown plan.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut codes = Vec::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split(':');
            let (Some(code), Some(plan), Some(days), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(EntitlementError::UnknownPromoCode(entry.to_string()));
            };
            let duration_days = days
                .trim()
                .parse()
                .map_err(|_| EntitlementError::UnknownPromoCode(entry.to_string()))?;
            codes.push(PromoCode {
                code: normalize_code(code),
                plan: plan.parse()?,
                duration_days,
            });
        }
        Ok(Self { codes })
    }

    /// Number of codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
