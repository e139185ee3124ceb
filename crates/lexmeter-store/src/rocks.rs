//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use lexmeter_core::{
    DocumentId, DocumentRecord, MonthYear, PlanRecord, PlanTransition, PromoRedemption,
    PurchaseId, PurchaseRecord, ReferralReward, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{PlanChange, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes read-check-write sequences (commits, unique inserts).
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Collect `(key, value)` pairs from `from` while keys stay below `until`
    /// and share `prefix`.
    fn scan(
        &self,
        cf_name: &str,
        prefix: &[u8],
        from: &[u8],
        until: Option<&[u8]>,
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(from, Direction::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) || until.is_some_and(|until| &*key >= until) {
                break;
            }
            rows.push((key, value));
        }
        Ok(rows)
    }

    fn scan_values<T: serde::de::DeserializeOwned>(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<T>> {
        self.scan(cf_name, prefix, prefix, None)?
            .iter()
            .map(|(_, value)| Self::deserialize(value))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_purchase(&self, purchase_id: &PurchaseId) -> Result<Option<PurchaseRecord>> {
        self.get_value(cf::PURCHASES, &keys::purchase_key(purchase_id))
    }

    fn order_owner(&self, external_order_id: &str) -> Result<Option<PurchaseId>> {
        let cf = self.cf(cf::PURCHASES_BY_ORDER)?;
        let Some(data) = self
            .db
            .get_cf(&cf, keys::order_key(external_order_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };
        let bytes: [u8; 16] = data
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Serialization(format!("bad order index for {external_order_id}")))?;
        Ok(Some(PurchaseId::from_bytes(bytes)))
    }

    fn document_primary_key(&self, document_id: &DocumentId) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf::DOCUMENTS_BY_ID)?;
        self.db
            .get_cf(&cf, keys::document_id_key(document_id))
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Plan Operations
    // =========================================================================

    fn get_plan(&self, user_id: &UserId) -> Result<Option<PlanRecord>> {
        self.get_value(cf::PLANS, &keys::plan_key(user_id))
    }

    fn list_plans_expiring_before(&self, now: DateTime<Utc>) -> Result<Vec<PlanRecord>> {
        let plans: Vec<PlanRecord> = self.scan_values(cf::PLANS, &[])?;
        Ok(plans
            .into_iter()
            .filter(|plan| plan.plan.is_paid() && plan.expires_at.is_some_and(|at| at < now))
            .collect())
    }

    fn commit(&self, change: &PlanChange) -> Result<Option<PlanRecord>> {
        let _guard = self.lock();

        let current = self.get_plan(&change.user_id)?;
        let next = change.prepare(current.as_ref())?;

        let mut batch = WriteBatch::default();

        if let Some(plan) = &next {
            let cf_plans = self.cf(cf::PLANS)?;
            batch.put_cf(&cf_plans, keys::plan_key(&plan.user_id), Self::serialize(plan)?);
        }

        if let Some(purchase) = &change.purchase {
            if let Some(owner) = self.order_owner(&purchase.external_order_id)? {
                if owner != purchase.id {
                    return Err(StoreError::Duplicate {
                        key: purchase.external_order_id.clone(),
                    });
                }
            }
            let cf_purchases = self.cf(cf::PURCHASES)?;
            let cf_by_order = self.cf(cf::PURCHASES_BY_ORDER)?;
            let cf_by_user = self.cf(cf::PURCHASES_BY_USER)?;
            batch.put_cf(
                &cf_purchases,
                keys::purchase_key(&purchase.id),
                Self::serialize(purchase)?,
            );
            batch.put_cf(
                &cf_by_order,
                keys::order_key(&purchase.external_order_id),
                purchase.id.to_bytes(),
            );
            batch.put_cf(
                &cf_by_user,
                keys::user_purchase_key(&purchase.user_id, &purchase.id),
                [], // Index entry (empty value)
            );
        }

        if !change.rewards.is_empty() {
            let cf_rewards = self.cf(cf::REFERRAL_REWARDS)?;
            for reward in &change.rewards {
                batch.put_cf(
                    &cf_rewards,
                    keys::referral_reward_key(&reward.user_id, reward.month_year),
                    Self::serialize(reward)?,
                );
            }
        }

        if let Some(transition) = &change.transition {
            let cf_transitions = self.cf(cf::TRANSITIONS)?;
            batch.put_cf(
                &cf_transitions,
                keys::transition_key(&transition.user_id, transition.at, &transition.id),
                Self::serialize(transition)?,
            );
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(
            user_id = %change.user_id,
            version = next.as_ref().map(|plan| plan.version),
            "plan change committed"
        );

        Ok(next.or(current))
    }

    // =========================================================================
    // Purchase Operations
    // =========================================================================

    fn get_purchase_by_order(&self, external_order_id: &str) -> Result<Option<PurchaseRecord>> {
        match self.order_owner(external_order_id)? {
            Some(purchase_id) => self.get_purchase(&purchase_id),
            None => Ok(None),
        }
    }

    fn list_purchases_by_user(&self, user_id: &UserId) -> Result<Vec<PurchaseRecord>> {
        let prefix = keys::user_prefix(user_id);
        let mut purchases = Vec::new();
        for (key, _) in self.scan(cf::PURCHASES_BY_USER, &prefix, &prefix, None)? {
            let purchase_id = keys::extract_purchase_id(&key)
                .ok_or_else(|| StoreError::Serialization("bad purchase index key".into()))?;
            if let Some(purchase) = self.get_purchase(&purchase_id)? {
                purchases.push(purchase);
            }
        }
        Ok(purchases)
    }

    // =========================================================================
    // Referral & Promo Operations
    // =========================================================================

    fn get_referral_reward(
        &self,
        user_id: &UserId,
        month_year: MonthYear,
    ) -> Result<Option<ReferralReward>> {
        self.get_value(
            cf::REFERRAL_REWARDS,
            &keys::referral_reward_key(user_id, month_year),
        )
    }

    fn list_referral_rewards(&self, user_id: &UserId) -> Result<Vec<ReferralReward>> {
        self.scan_values(cf::REFERRAL_REWARDS, &keys::user_prefix(user_id))
    }

    fn put_promo_redemption(&self, redemption: &PromoRedemption) -> Result<()> {
        let _guard = self.lock();
        let cf = self.cf(cf::PROMO_REDEMPTIONS)?;
        let key = keys::promo_key(&redemption.user_id, &redemption.code);

        let exists = self
            .db
            .get_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if exists {
            return Err(StoreError::Duplicate {
                key: redemption.code.clone(),
            });
        }

        self.db
            .put_cf(&cf, key, Self::serialize(redemption)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn list_promo_redemptions(&self, user_id: &UserId) -> Result<Vec<PromoRedemption>> {
        self.scan_values(cf::PROMO_REDEMPTIONS, &keys::user_prefix(user_id))
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    fn put_document(&self, document: &DocumentRecord) -> Result<()> {
        let cf_docs = self.cf(cf::DOCUMENTS)?;
        let cf_by_id = self.cf(cf::DOCUMENTS_BY_ID)?;

        let key = keys::document_key(&document.user_id, document.created_at, &document.id);
        let value = Self::serialize(document)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_docs, &key, &value);
        batch.put_cf(&cf_by_id, keys::document_id_key(&document.id), &key);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_document(&self, document_id: &DocumentId) -> Result<Option<DocumentRecord>> {
        match self.document_primary_key(document_id)? {
            Some(key) => self.get_value(cf::DOCUMENTS, &key),
            None => Ok(None),
        }
    }

    fn delete_document(
        &self,
        document_id: &DocumentId,
        now: DateTime<Utc>,
    ) -> Result<DocumentRecord> {
        let _guard = self.lock();
        let key = self
            .document_primary_key(document_id)?
            .ok_or(StoreError::NotFound)?;
        let mut document: DocumentRecord = self
            .get_value(cf::DOCUMENTS, &key)?
            .ok_or(StoreError::NotFound)?;

        if document.deleted_at.is_none() {
            document.deleted_at = Some(now);
            let cf = self.cf(cf::DOCUMENTS)?;
            self.db
                .put_cf(&cf, &key, Self::serialize(&document)?)
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        Ok(document)
    }

    fn count_documents(
        &self,
        user_id: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32> {
        let prefix = keys::user_prefix(user_id);
        let from = keys::document_bound(user_id, start);
        let until = keys::document_bound(user_id, end);

        let mut count: u32 = 0;
        for (_, value) in self.scan(cf::DOCUMENTS, &prefix, &from, Some(&until))? {
            let document: DocumentRecord = Self::deserialize(&value)?;
            if document.is_counted() {
                count = count.saturating_add(1);
            }
        }
        Ok(count)
    }

    // =========================================================================
    // Transition Operations
    // =========================================================================

    fn list_transitions(&self, user_id: &UserId, limit: usize) -> Result<Vec<PlanTransition>> {
        let mut transitions: Vec<PlanTransition> =
            self.scan_values(cf::TRANSITIONS, &keys::user_prefix(user_id))?;
        // Keys are chronological; newest first.
        transitions.reverse();
        transitions.truncate(limit);
        Ok(transitions)
    }
}
