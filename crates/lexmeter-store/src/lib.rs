//! Storage layer for lexmeter.
//!
//! This crate persists plan records and the ledgers that feed them. Two
//! backends implement the [`Store`] trait:
//!
//! - [`MemoryStore`]: everything behind one `RwLock`, for tests and
//!   ephemeral deployments
//! - `RocksStore`: `RocksDB` with one column family per table (feature
//!   `rocksdb-backend`)
//!
//! # Commits
//!
//! Every plan mutation goes through [`Store::commit`], which writes the plan
//! row, the purchase row, any referral reward rows and the transition record
//! as one atomic unit. The commit carries a [`PlanGuard`] and fails with
//! `StoreError::Conflict` if the plan row moved since it was read.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use lexmeter_core::{PlanRecord, UserId};
//! use lexmeter_store::{MemoryStore, PlanChange, PlanGuard, Store};
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//!
//! let mut change = PlanChange::new(user_id, PlanGuard::Absent);
//! change.plan = Some(PlanRecord::free(user_id, Utc::now()));
//! let stored = store.commit(&change).unwrap().unwrap();
//! assert_eq!(stored.version, 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod schema;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use lexmeter_core::{
    DocumentId, DocumentRecord, MonthYear, PlanRecord, PlanTransition, PromoRedemption,
    PurchaseRecord, ReferralReward, UserId,
};

/// Precondition on the stored plan row for a commit to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanGuard {
    /// Apply unconditionally.
    Any,
    /// Apply only if the user has no plan row yet.
    Absent,
    /// Apply only if the plan row is at this version.
    Version(u64),
}

impl PlanGuard {
    /// The guard matching a plan row as it was read.
    #[must_use]
    pub fn of(plan: Option<&PlanRecord>) -> Self {
        plan.map_or(Self::Absent, |plan| Self::Version(plan.version))
    }

    /// Whether `current` satisfies the guard.
    #[must_use]
    pub fn admits(&self, current: Option<&PlanRecord>) -> bool {
        match (self, current) {
            (Self::Any, _) | (Self::Absent, None) => true,
            (Self::Version(version), Some(plan)) => plan.version == *version,
            (Self::Absent, Some(_)) | (Self::Version(_), None) => false,
        }
    }
}

/// Writes committed together for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanChange {
    /// User whose plan row is guarded.
    pub user_id: UserId,
    /// Precondition on the stored plan row.
    pub guard: PlanGuard,
    /// New plan row.
    pub plan: Option<PlanRecord>,
    /// Purchase row to upsert.
    pub purchase: Option<PurchaseRecord>,
    /// Referral reward rows to upsert.
    pub rewards: Vec<ReferralReward>,
    /// Transition to record.
    pub transition: Option<PlanTransition>,
}

impl PlanChange {
    /// An empty change for `user_id`.
    #[must_use]
    pub fn new(user_id: UserId, guard: PlanGuard) -> Self {
        Self {
            user_id,
            guard,
            plan: None,
            purchase: None,
            rewards: Vec::new(),
            transition: None,
        }
    }

    /// Check the guard against `current` and compute the row to write.
    ///
    /// Returns the new plan row with its version bumped, or `None` when the
    /// change leaves the plan untouched.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the guard rejects `current`.
    pub fn prepare(&self, current: Option<&PlanRecord>) -> Result<Option<PlanRecord>> {
        if !self.guard.admits(current) {
            return Err(StoreError::Conflict {
                user_id: self.user_id,
            });
        }
        Ok(self.plan.as_ref().map(|plan| {
            let mut next = plan.clone();
            next.version = current.map_or(0, |current| current.version) + 1;
            next
        }))
    }
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (`RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Plan Operations
    // =========================================================================

    /// Get a user's plan row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_plan(&self, user_id: &UserId) -> Result<Option<PlanRecord>>;

    /// List paid plan rows whose `expires_at` is before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_plans_expiring_before(&self, now: DateTime<Utc>) -> Result<Vec<PlanRecord>>;

    /// Apply a change atomically.
    ///
    /// Returns the stored plan row after the commit, if there is one.
    ///
    /// # Errors
    ///
    /// - `StoreError::Conflict` if the guard rejects the stored plan row.
    /// - `StoreError::Duplicate` if the purchase's order ID already belongs to
    ///   another purchase.
    fn commit(&self, change: &PlanChange) -> Result<Option<PlanRecord>>;

    // =========================================================================
    // Purchase Operations
    // =========================================================================

    /// Get a purchase by provider order ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_purchase_by_order(&self, external_order_id: &str) -> Result<Option<PurchaseRecord>>;

    /// List a user's purchases, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_purchases_by_user(&self, user_id: &UserId) -> Result<Vec<PurchaseRecord>>;

    // =========================================================================
    // Referral & Promo Operations
    // =========================================================================

    /// Get a user's referral reward row for a month.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_referral_reward(
        &self,
        user_id: &UserId,
        month_year: MonthYear,
    ) -> Result<Option<ReferralReward>>;

    /// List all of a user's referral reward rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_referral_rewards(&self, user_id: &UserId) -> Result<Vec<ReferralReward>>;

    /// Record a promo redemption.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the user already redeemed the code.
    fn put_promo_redemption(&self, redemption: &PromoRedemption) -> Result<()>;

    /// List a user's promo redemptions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_promo_redemptions(&self, user_id: &UserId) -> Result<Vec<PromoRedemption>>;

    // =========================================================================
    // Document Operations
    // =========================================================================

    /// Insert a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_document(&self, document: &DocumentRecord) -> Result<()>;

    /// Get a document by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_document(&self, document_id: &DocumentId) -> Result<Option<DocumentRecord>>;

    /// Soft-delete a document, returning the updated row.
    ///
    /// Deleting an already deleted document is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the document doesn't exist.
    fn delete_document(
        &self,
        document_id: &DocumentId,
        now: DateTime<Utc>,
    ) -> Result<DocumentRecord>;

    /// Count a user's non-deleted documents created in `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_documents(
        &self,
        user_id: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32>;

    // =========================================================================
    // Transition Operations
    // =========================================================================

    /// List a user's plan transitions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transitions(&self, user_id: &UserId, limit: usize) -> Result<Vec<PlanTransition>>;
}
