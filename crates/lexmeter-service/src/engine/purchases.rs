//! Purchase ingestion.

use chrono::{DateTime, Utc};

use lexmeter_core::{
    apply_purchase, PlanRecord, PurchaseEffect, PurchaseEvent, PurchaseRecord, TransitionKind,
};
use lexmeter_store::{PlanChange, PlanGuard, Store};

use super::{with_retry, EngineError};

/// Result of ingesting one payment event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event was already applied.
    Duplicate,
    /// The event was committed.
    Applied {
        /// Ledger row as written.
        purchase: PurchaseRecord,
        /// Plan row as written, when the plan changed.
        plan: Option<PlanRecord>,
    },
}

impl IngestOutcome {
    /// Short label for responses and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Applied { .. } => "applied",
        }
    }
}

/// Apply a payment event in one atomic commit.
///
/// Events for an order already in the ledger are applied to the ledger
/// row's owner.
///
/// # Errors
///
/// Returns an error if the event violates a purchase rule, the store fails,
/// or the commit keeps conflicting.
pub fn ingest_purchase(
    store: &dyn Store,
    event: &PurchaseEvent,
    now: DateTime<Utc>,
) -> Result<IngestOutcome, EngineError> {
    with_retry(|| {
        let existing = store.get_purchase_by_order(&event.external_order_id)?;
        let user_id = existing.as_ref().map_or(event.user_id, |p| p.user_id);

        let stored = store.get_plan(&user_id)?;
        let plan = stored
            .clone()
            .unwrap_or_else(|| PlanRecord::free(user_id, now));
        let rewards = store.list_referral_rewards(&user_id)?;

        let change = match apply_purchase(now, event, existing.as_ref(), &plan, &rewards)? {
            PurchaseEffect::Duplicate => {
                tracing::debug!(
                    order_id = %event.external_order_id,
                    status = ?event.status,
                    "Duplicate purchase event ignored"
                );
                return Ok(IngestOutcome::Duplicate);
            }
            PurchaseEffect::Apply(change) => change,
        };

        let paused = change.rewards.len();
        let kind = change.transition.as_ref().map(|t| t.kind);

        let mut commit = PlanChange::new(user_id, PlanGuard::of(stored.as_ref()));
        commit.plan = change.plan;
        commit.purchase = Some(change.purchase.clone());
        commit.rewards = change.rewards;
        commit.transition = change.transition;
        let plan = store.commit(&commit)?;

        match kind {
            Some(TransitionKind::Purchased) => tracing::info!(
                user_id = %user_id,
                order_id = %event.external_order_id,
                plan = %event.plan,
                paused_rewards = paused,
                "Purchase applied"
            ),
            Some(TransitionKind::Refunded) => tracing::info!(
                user_id = %user_id,
                order_id = %event.external_order_id,
                "Refund reverted plan to free"
            ),
            _ => tracing::info!(
                user_id = %user_id,
                order_id = %event.external_order_id,
                status = ?change.purchase.status,
                "Purchase recorded without plan change"
            ),
        }

        Ok(IngestOutcome::Applied {
            purchase: change.purchase,
            plan,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use lexmeter_core::{PlanTier, PurchaseStatus, UserId};

    use lexmeter_store::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn event(user_id: UserId, status: PurchaseStatus) -> PurchaseEvent {
        PurchaseEvent {
            user_id,
            external_order_id: "ord_100".into(),
            plan: PlanTier::Basic,
            product_id: "basic-monthly".into(),
            amount_cents: 999,
            currency: "USD".into(),
            status,
            expires_at: Some(now() + Duration::days(30)),
        }
    }

    #[test]
    fn completion_then_redelivery() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let completed = event(user_id, PurchaseStatus::Completed);

        let outcome = ingest_purchase(&store, &completed, now()).unwrap();
        let IngestOutcome::Applied { plan, .. } = outcome else {
            panic!("expected applied");
        };
        assert_eq!(plan.unwrap().plan, PlanTier::Basic);

        assert_eq!(
            ingest_purchase(&store, &completed, now()).unwrap(),
            IngestOutcome::Duplicate
        );
        assert_eq!(store.list_purchases_by_user(&user_id).unwrap().len(), 1);
    }

    #[test]
    fn refund_reverts_backing_plan() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        ingest_purchase(&store, &event(user_id, PurchaseStatus::Completed), now()).unwrap();

        let later = now() + Duration::days(2);
        ingest_purchase(&store, &event(user_id, PurchaseStatus::Refunded), later).unwrap();

        let plan = store.get_plan(&user_id).unwrap().unwrap();
        assert_eq!(plan.plan, PlanTier::Free);
        assert!(plan.purchase_ref.is_none());
        let purchase = store.get_purchase_by_order("ord_100").unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Refunded);

        let kinds: Vec<_> = store
            .list_transitions(&user_id, 10)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(kinds, vec![TransitionKind::Refunded, TransitionKind::Purchased]);
    }

    #[test]
    fn completion_after_refund_is_rejected() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        ingest_purchase(&store, &event(user_id, PurchaseStatus::Completed), now()).unwrap();
        ingest_purchase(&store, &event(user_id, PurchaseStatus::Refunded), now()).unwrap();

        let err = ingest_purchase(&store, &event(user_id, PurchaseStatus::Completed), now())
            .unwrap_err();
        assert!(matches!(err, EngineError::Entitlement(_)));
        assert_eq!(store.get_plan(&user_id).unwrap().unwrap().plan, PlanTier::Free);
    }
}
