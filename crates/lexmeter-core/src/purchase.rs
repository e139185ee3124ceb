//! Purchase ledger types and the purchase-ingestion state transition.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EntitlementError, Result};
use crate::ids::{PurchaseId, UserId};
use crate::plan::{PlanRecord, PlanTier};
use crate::referral::{merge_paused, ReferralReward};
use crate::transition::{PlanTransition, TransitionKind};

/// Status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Paid.
    Completed,
    /// Paid, then refunded.
    Refunded,
}

/// One completed or refunded payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Ledger identifier.
    pub id: PurchaseId,

    /// Paying user.
    pub user_id: UserId,

    /// Order identifier of the payment provider, unique per payment.
    pub external_order_id: String,

    /// Tier bought.
    pub plan: PlanTier,

    /// Product identifier of the payment provider.
    pub product_id: String,

    /// Amount paid in minor units.
    pub amount_cents: i64,

    /// ISO currency code.
    pub currency: String,

    /// Payment status.
    pub status: PurchaseStatus,

    /// Start of the purchased term.
    pub started_at: DateTime<Utc>,

    /// End of the purchased term, `None` for non-expiring purchases.
    pub expires_at: Option<DateTime<Utc>>,

    /// When the row was created.
    pub created_at: DateTime<Utc>,

    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRecord {
    /// Whether this purchase counts towards "has ever paid".
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == PurchaseStatus::Completed
    }

    /// Apply the only allowed status change, completed → refunded.
    ///
    /// # Errors
    ///
    /// Returns `EntitlementError::InvalidStatusTransition` when the purchase
    /// is already refunded.
    pub fn mark_refunded(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            PurchaseStatus::Completed => {
                self.status = PurchaseStatus::Refunded;
                self.updated_at = now;
                Ok(())
            }
            PurchaseStatus::Refunded => Err(EntitlementError::InvalidStatusTransition {
                from: self.status,
                to: PurchaseStatus::Refunded,
            }),
        }
    }
}

/// Whether any completed purchase exists.
#[must_use]
pub fn has_ever_paid(purchases: &[PurchaseRecord]) -> bool {
    purchases.iter().any(PurchaseRecord::is_completed)
}

/// A sellable product and the plan it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSpec {
    /// Product identifier of the payment provider.
    pub product_id: String,
    /// Tier granted.
    pub plan: PlanTier,
    /// Term length; `None` never expires.
    pub duration_days: Option<u32>,
}

/// Mapping from payment products to plans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCatalog {
    products: Vec<ProductSpec>,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        let product = |product_id: &str, plan, duration_days| ProductSpec {
            product_id: product_id.to_string(),
            plan,
            duration_days,
        };
        Self {
            products: vec![
                product("basic-monthly", PlanTier::Basic, Some(30)),
                product("premium-monthly", PlanTier::Premium, Some(30)),
                product("premium-lifetime", PlanTier::Premium, None),
                product("pay-per-use", PlanTier::PayPerUse, Some(30)),
            ],
        }
    }
}

impl ProductCatalog {
    /// Build a catalog from products.
    #[must_use]
    pub fn new(products: Vec<ProductSpec>) -> Self {
        Self { products }
    }

    /// Parse the `product:plan:days|none,...` form used by configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed entry or an unknown plan.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut products = Vec::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let malformed = || EntitlementError::UnknownProduct {
                product_id: entry.to_string(),
            };
            let mut parts = entry.split(':');
            let (Some(product_id), Some(plan), Some(days), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(malformed());
            };
            let duration_days = match days.trim() {
                "none" | "" => None,
                days => Some(days.parse().map_err(|_| malformed())?),
            };
            products.push(ProductSpec {
                product_id: product_id.trim().to_string(),
                plan: plan.parse()?,
                duration_days,
            });
        }
        Ok(Self { products })
    }

    /// Number of products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Find a product.
    #[must_use]
    pub fn get(&self, product_id: &str) -> Option<&ProductSpec> {
        self.products.iter().find(|p| p.product_id == product_id)
    }

    /// Map a paid product to its tier and term end.
    ///
    /// A provider-supplied `expires_at` overrides the catalog term.
    ///
    /// # Errors
    ///
    /// Returns `EntitlementError::UnknownProduct` when the product is not in
    /// the catalog, or maps to the free tier.
    pub fn resolve(
        &self,
        product_id: &str,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(PlanTier, Option<DateTime<Utc>>)> {
        let spec = self
            .get(product_id)
            .filter(|spec| spec.plan.is_paid())
            .ok_or_else(|| EntitlementError::UnknownProduct {
                product_id: product_id.to_string(),
            })?;
        let expires_at = expires_at.or_else(|| {
            spec.duration_days
                .map(|days| now + Duration::days(i64::from(days)))
        });
        Ok((spec.plan, expires_at))
    }
}

/// A payment event as delivered by the webhook receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseEvent {
    /// Paying user.
    pub user_id: UserId,
    /// Provider order identifier (idempotency key).
    pub external_order_id: String,
    /// Tier bought.
    pub plan: PlanTier,
    /// Provider product identifier.
    pub product_id: String,
    /// Amount paid in minor units.
    pub amount_cents: i64,
    /// ISO currency code.
    pub currency: String,
    /// Payment status.
    pub status: PurchaseStatus,
    /// End of the purchased term.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Writes produced by one purchase event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseChange {
    /// Purchase row to upsert.
    pub purchase: PurchaseRecord,
    /// New plan row, if the plan changes.
    pub plan: Option<PlanRecord>,
    /// Referral rewards paused by the purchase.
    pub rewards: Vec<ReferralReward>,
    /// Notification for the plan change.
    pub transition: Option<PlanTransition>,
}

/// What a purchase event does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseEffect {
    /// Already applied (at-least-once redelivery).
    Duplicate,
    /// Writes to commit atomically.
    Apply(PurchaseChange),
}

/// Compute the effect of a purchase event.
///
/// `existing` is the ledger row with the same order identifier, `plan` the
/// user's current plan row and `rewards` the user's referral rewards.
///
/// # Errors
///
/// Returns `EntitlementError::InvalidStatusTransition` when a completion
/// arrives for an already refunded order, and `InvalidWindow` when the term
/// ends before now.
pub fn apply_purchase(
    now: DateTime<Utc>,
    event: &PurchaseEvent,
    existing: Option<&PurchaseRecord>,
    plan: &PlanRecord,
    rewards: &[ReferralReward],
) -> Result<PurchaseEffect> {
    match (existing, event.status) {
        (Some(existing), status) if existing.status == status => Ok(PurchaseEffect::Duplicate),
        (Some(existing), PurchaseStatus::Refunded) => {
            let mut purchase = existing.clone();
            purchase.mark_refunded(now)?;
            Ok(PurchaseEffect::Apply(refund(now, purchase, plan)))
        }
        (Some(existing), PurchaseStatus::Completed) => {
            Err(EntitlementError::InvalidStatusTransition {
                from: existing.status,
                to: PurchaseStatus::Completed,
            })
        }
        (None, status) => {
            let purchase = PurchaseRecord {
                id: PurchaseId::generate(),
                user_id: event.user_id,
                external_order_id: event.external_order_id.clone(),
                plan: event.plan,
                product_id: event.product_id.clone(),
                amount_cents: event.amount_cents,
                currency: event.currency.clone(),
                status,
                started_at: now,
                expires_at: event.expires_at,
                created_at: now,
                updated_at: now,
            };
            match status {
                PurchaseStatus::Completed => complete(now, purchase, plan, rewards),
                // Refund delivered before its completion: ledger only.
                PurchaseStatus::Refunded => Ok(PurchaseEffect::Apply(PurchaseChange {
                    purchase,
                    plan: None,
                    rewards: Vec::new(),
                    transition: None,
                })),
            }
        }
    }
}

fn complete(
    now: DateTime<Utc>,
    purchase: PurchaseRecord,
    plan: &PlanRecord,
    rewards: &[ReferralReward],
) -> Result<PurchaseEffect> {
    let mut updated = plan.clone();
    updated.plan = purchase.plan;
    updated.started_at = now;
    updated.expires_at = purchase.expires_at;
    updated.purchase_ref = Some(purchase.id);
    updated.updated_at = now;
    updated.validate()?;

    let mut paused_rewards = Vec::new();
    for reward in rewards.iter().filter(|reward| reward.is_active(now)) {
        let mut reward = reward.clone();
        let snapshot = reward.pause(now);
        updated.paused_reward = Some(merge_paused(updated.paused_reward.take(), snapshot));
        paused_rewards.push(reward);
    }

    let transition = PlanTransition::new(
        plan.user_id,
        TransitionKind::Purchased,
        plan.plan,
        updated.plan,
        updated.expires_at,
        now,
    );

    Ok(PurchaseEffect::Apply(PurchaseChange {
        purchase,
        plan: Some(updated),
        rewards: paused_rewards,
        transition: Some(transition),
    }))
}

fn refund(now: DateTime<Utc>, purchase: PurchaseRecord, plan: &PlanRecord) -> PurchaseChange {
    if plan.purchase_ref != Some(purchase.id) {
        return PurchaseChange {
            purchase,
            plan: None,
            rewards: Vec::new(),
            transition: None,
        };
    }

    let mut updated = plan.clone();
    updated.plan = PlanTier::Free;
    updated.started_at = now;
    updated.expires_at = None;
    updated.purchase_ref = None;
    updated.paused_reward = None;
    updated.updated_at = now;

    let transition = PlanTransition::new(
        plan.user_id,
        TransitionKind::Refunded,
        plan.plan,
        PlanTier::Free,
        None,
        now,
    );

    PurchaseChange {
        purchase,
        plan: Some(updated),
        rewards: Vec::new(),
        transition: Some(transition),
    }
}
