//! In-memory storage implementation.
//!
//! All tables sit behind one `RwLock`, so a commit is trivially atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use lexmeter_core::{
    DocumentId, DocumentRecord, MonthYear, PlanRecord, PlanTransition, PromoRedemption,
    PurchaseId, PurchaseRecord, ReferralReward, UserId,
};

use crate::error::{Result, StoreError};
use crate::{PlanChange, Store};

#[derive(Debug, Default)]
struct Tables {
    plans: HashMap<UserId, PlanRecord>,
    purchases: BTreeMap<PurchaseId, PurchaseRecord>,
    purchases_by_order: HashMap<String, PurchaseId>,
    referral_rewards: BTreeMap<(UserId, MonthYear), ReferralReward>,
    promo_redemptions: BTreeMap<(UserId, String), PromoRedemption>,
    documents: HashMap<DocumentId, DocumentRecord>,
    transitions: Vec<PlanTransition>,
}

/// Storage held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    // =========================================================================
    // Plan Operations
    // =========================================================================

    fn get_plan(&self, user_id: &UserId) -> Result<Option<PlanRecord>> {
        Ok(self.read().plans.get(user_id).cloned())
    }

    fn list_plans_expiring_before(&self, now: DateTime<Utc>) -> Result<Vec<PlanRecord>> {
        Ok(self
            .read()
            .plans
            .values()
            .filter(|plan| plan.plan.is_paid() && plan.expires_at.is_some_and(|at| at < now))
            .cloned()
            .collect())
    }

    fn commit(&self, change: &PlanChange) -> Result<Option<PlanRecord>> {
        let mut tables = self.write();

        let next = change.prepare(tables.plans.get(&change.user_id))?;

        if let Some(purchase) = &change.purchase {
            if let Some(existing) = tables.purchases_by_order.get(&purchase.external_order_id) {
                if *existing != purchase.id {
                    return Err(StoreError::Duplicate {
                        key: purchase.external_order_id.clone(),
                    });
                }
            }
        }

        if let Some(plan) = &next {
            tables.plans.insert(change.user_id, plan.clone());
        }
        if let Some(purchase) = &change.purchase {
            tables
                .purchases_by_order
                .insert(purchase.external_order_id.clone(), purchase.id);
            tables.purchases.insert(purchase.id, purchase.clone());
        }
        for reward in &change.rewards {
            tables
                .referral_rewards
                .insert((reward.user_id, reward.month_year), reward.clone());
        }
        if let Some(transition) = &change.transition {
            tables.transitions.push(transition.clone());
        }

        Ok(next.or_else(|| tables.plans.get(&change.user_id).cloned()))
    }

    // =========================================================================
    // Purchase Operations
    // =========================================================================

    fn get_purchase_by_order(&self, external_order_id: &str) -> Result<Option<PurchaseRecord>> {
        let tables = self.read();
        Ok(tables
            .purchases_by_order
            .get(external_order_id)
            .and_then(|id| tables.purchases.get(id))
            .cloned())
    }

    fn list_purchases_by_user(&self, user_id: &UserId) -> Result<Vec<PurchaseRecord>> {
        Ok(self
            .read()
            .purchases
            .values()
            .filter(|purchase| purchase.user_id == *user_id)
            .cloned()
            .collect())
    }

    // =========================================================================
    // Referral & Promo Operations
    // =========================================================================

    fn get_referral_reward(
        &self,
        user_id: &UserId,
        month_year: MonthYear,
    ) -> Result<Option<ReferralReward>> {
        Ok(self
            .read()
            .referral_rewards
            .get(&(*user_id, month_year))
            .cloned())
    }

    fn list_referral_rewards(&self, user_id: &UserId) -> Result<Vec<ReferralReward>> {
        Ok(self
            .read()
            .referral_rewards
            .values()
            .filter(|reward| reward.user_id == *user_id)
            .cloned()
            .collect())
    }

    fn put_promo_redemption(&self, redemption: &PromoRedemption) -> Result<()> {
        let mut tables = self.write();
        let key = (redemption.user_id, redemption.code.clone());
        if tables.promo_redemptions.contains_key(&key) {
            return Err(StoreError::Duplicate {
                key: redemption.code.clone(),
            });
        }
        tables.promo_redemptions.insert(key, redemption.clone());
        Ok(())
    }

    fn list_promo_redemptions(&self, user_id: &UserId) -> Result<Vec<PromoRedemption>> {
        Ok(self
            .read()
            .promo_redemptions
            .values()
            .filter(|redemption| redemption.user_id == *user_id)
            .cloned()
            .collect())
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    fn put_document(&self, document: &DocumentRecord) -> Result<()> {
        self.write().documents.insert(document.id, document.clone());
        Ok(())
    }

    fn get_document(&self, document_id: &DocumentId) -> Result<Option<DocumentRecord>> {
        Ok(self.read().documents.get(document_id).cloned())
    }

    fn delete_document(
        &self,
        document_id: &DocumentId,
        now: DateTime<Utc>,
    ) -> Result<DocumentRecord> {
        let mut tables = self.write();
        let document = tables
            .documents
            .get_mut(document_id)
            .ok_or(StoreError::NotFound)?;
        if document.deleted_at.is_none() {
            document.deleted_at = Some(now);
        }
        Ok(document.clone())
    }

    fn count_documents(
        &self,
        user_id: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32> {
        let count = self
            .read()
            .documents
            .values()
            .filter(|doc| doc.user_id == *user_id && doc.is_counted())
            .filter(|doc| start <= doc.created_at && doc.created_at < end)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    // =========================================================================
    // Transition Operations
    // =========================================================================

    fn list_transitions(&self, user_id: &UserId, limit: usize) -> Result<Vec<PlanTransition>> {
        let tables = self.read();
        let mut transitions: Vec<_> = tables
            .transitions
            .iter()
            .filter(|transition| transition.user_id == *user_id)
            .cloned()
            .collect();
        // Stable sort keeps commit order among equal timestamps.
        transitions.sort_by(|a, b| b.at.cmp(&a.at));
        transitions.truncate(limit);
        Ok(transitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlanGuard;
    use chrono::{Duration, TimeZone};
    use lexmeter_core::{PlanTier, PurchaseStatus, TransitionKind};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 3, 10, 0, 0).unwrap()
    }

    fn purchase(user_id: UserId, order: &str) -> PurchaseRecord {
        PurchaseRecord {
            id: PurchaseId::generate(),
            user_id,
            external_order_id: order.to_string(),
            plan: PlanTier::Basic,
            product_id: "basic-monthly".into(),
            amount_cents: 999,
            currency: "USD".into(),
            status: PurchaseStatus::Completed,
            started_at: now(),
            expires_at: Some(now() + Duration::days(30)),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn commit_checks_version() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        let mut change = PlanChange::new(user_id, PlanGuard::Absent);
        change.plan = Some(PlanRecord::free(user_id, now()));
        let stored = store.commit(&change).unwrap().unwrap();
        assert_eq!(stored.version, 1);

        // Same guard again: the row now exists.
        assert!(matches!(
            store.commit(&change),
            Err(StoreError::Conflict { .. })
        ));

        let mut upgrade = PlanChange::new(user_id, PlanGuard::Version(1));
        let mut plan = stored.clone();
        plan.plan = PlanTier::Basic;
        upgrade.plan = Some(plan);
        assert_eq!(store.commit(&upgrade).unwrap().unwrap().version, 2);

        // A stale writer loses.
        assert!(matches!(
            store.commit(&upgrade),
            Err(StoreError::Conflict { .. })
        ));
        assert_eq!(store.get_plan(&user_id).unwrap().unwrap().plan, PlanTier::Basic);
    }

    #[test]
    fn rejected_commit_writes_nothing() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        let mut change = PlanChange::new(user_id, PlanGuard::Version(3));
        change.purchase = Some(purchase(user_id, "ord_1"));
        assert!(store.commit(&change).is_err());

        assert!(store.get_purchase_by_order("ord_1").unwrap().is_none());
        assert!(store.get_plan(&user_id).unwrap().is_none());
    }

    #[test]
    fn order_ids_are_unique() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();

        let mut first = PlanChange::new(user_id, PlanGuard::Any);
        first.purchase = Some(purchase(user_id, "ord_1"));
        store.commit(&first).unwrap();

        let mut second = PlanChange::new(user_id, PlanGuard::Any);
        second.purchase = Some(purchase(user_id, "ord_1"));
        assert!(matches!(
            store.commit(&second),
            Err(StoreError::Duplicate { .. })
        ));

        // Re-writing the same purchase (a refund) is fine.
        let mut refunded = first.purchase.clone().unwrap();
        refunded.status = PurchaseStatus::Refunded;
        let mut refund = PlanChange::new(user_id, PlanGuard::Any);
        refund.purchase = Some(refunded);
        store.commit(&refund).unwrap();

        let stored = store.get_purchase_by_order("ord_1").unwrap().unwrap();
        assert_eq!(stored.status, PurchaseStatus::Refunded);
        assert_eq!(store.list_purchases_by_user(&user_id).unwrap().len(), 1);
    }

    #[test]
    fn document_counting_respects_window_and_deletion() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let start = now() - Duration::days(2);
        let end = now() + Duration::days(2);

        let inside = DocumentRecord::new(user_id, None, now());
        let before = DocumentRecord::new(user_id, None, start - Duration::milliseconds(1));
        let at_end = DocumentRecord::new(user_id, None, end);
        let deleted = DocumentRecord::new(user_id, Some("lease.pdf".into()), now());
        let other = DocumentRecord::new(UserId::generate(), None, now());
        for doc in [&inside, &before, &at_end, &deleted, &other] {
            store.put_document(doc).unwrap();
        }
        store.delete_document(&deleted.id, now()).unwrap();

        assert_eq!(store.count_documents(&user_id, start, end).unwrap(), 1);
        assert!(matches!(
            store.delete_document(&DocumentId::generate(), now()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn window_count_grows_with_its_end() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let start = now() - Duration::days(10);
        let end = now() + Duration::days(10);

        let instants: Vec<_> = (0..8).map(|i| start + Duration::days(i * 2)).collect();
        for &at in &instants {
            store.put_document(&DocumentRecord::new(user_id, None, at)).unwrap();
        }
        store.put_document(&DocumentRecord::new(user_id, None, end)).unwrap();

        let mut ends = instants.clone();
        ends.push(end);
        ends.push(end + Duration::milliseconds(1));
        let counts: Vec<u32> = ends
            .iter()
            .map(|&t| store.count_documents(&user_id, start, t).unwrap())
            .collect();
        for (i, pair) in counts.windows(2).enumerate() {
            assert!(pair[1] >= pair[0], "count shrank between {} and {}", ends[i], ends[i + 1]);
        }

        // The end is exclusive: a document exactly at `t` is not yet counted.
        assert_eq!(counts[0], 0);
        assert_eq!(counts[3], 3);
        assert_eq!(store.count_documents(&user_id, start, end).unwrap(), 8);
        assert_eq!(counts[counts.len() - 1], 9);
    }

    #[test]
    fn promo_redemption_is_once_per_code() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let redemption = PromoRedemption {
            user_id,
            code: "LAUNCH".into(),
            plan: PlanTier::Premium,
            starts_at: now(),
            expires_at: now() + Duration::days(7),
        };

        store.put_promo_redemption(&redemption).unwrap();
        assert!(matches!(
            store.put_promo_redemption(&redemption),
            Err(StoreError::Duplicate { .. })
        ));
        assert_eq!(store.list_promo_redemptions(&user_id).unwrap().len(), 1);
    }

    #[test]
    fn transitions_are_newest_first() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        for days in [0, 2, 1] {
            let mut change = PlanChange::new(user_id, PlanGuard::Any);
            change.transition = Some(PlanTransition::new(
                user_id,
                TransitionKind::PlanSelected,
                PlanTier::Free,
                PlanTier::Free,
                None,
                now() + Duration::days(days),
            ));
            store.commit(&change).unwrap();
        }

        let listed = store.list_transitions(&user_id, 2).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].at, now() + Duration::days(2));
        assert_eq!(listed[1].at, now() + Duration::days(1));
    }

    #[test]
    fn expiring_plans_are_listed() {
        let store = MemoryStore::new();
        let lapsed = UserId::generate();
        let active = UserId::generate();
        for (user_id, offset) in [(lapsed, -1), (active, 1)] {
            let mut plan = PlanRecord::free(user_id, now() - Duration::days(30));
            plan.plan = PlanTier::Basic;
            plan.expires_at = Some(now() + Duration::days(offset));
            let mut change = PlanChange::new(user_id, PlanGuard::Absent);
            change.plan = Some(plan);
            store.commit(&change).unwrap();
        }

        let expiring = store.list_plans_expiring_before(now()).unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].user_id, lapsed);
    }
}
