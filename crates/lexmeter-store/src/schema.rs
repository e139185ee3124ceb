//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Plan records, keyed by `user_id`.
    pub const PLANS: &str = "plans";

    /// Purchase records, keyed by `purchase_id` (ULID).
    pub const PURCHASES: &str = "purchases";

    /// Index: purchase by provider order, keyed by `external_order_id`.
    /// Value is the `purchase_id`.
    pub const PURCHASES_BY_ORDER: &str = "purchases_by_order";

    /// Index: purchases by user, keyed by `user_id || purchase_id`.
    /// Value is empty (index only).
    pub const PURCHASES_BY_USER: &str = "purchases_by_user";

    /// Referral rewards, keyed by `user_id || month_year`.
    pub const REFERRAL_REWARDS: &str = "referral_rewards";

    /// Promo redemptions, keyed by `user_id || code`.
    pub const PROMO_REDEMPTIONS: &str = "promo_redemptions";

    /// Documents, keyed by `user_id || created_at || document_id` so a
    /// window count is a range scan.
    pub const DOCUMENTS: &str = "documents";

    /// Index: document primary key by `document_id`.
    pub const DOCUMENTS_BY_ID: &str = "documents_by_id";

    /// Plan transitions, keyed by `user_id || at || transition_id`.
    pub const TRANSITIONS: &str = "transitions";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::PLANS,
        cf::PURCHASES,
        cf::PURCHASES_BY_ORDER,
        cf::PURCHASES_BY_USER,
        cf::REFERRAL_REWARDS,
        cf::PROMO_REDEMPTIONS,
        cf::DOCUMENTS,
        cf::DOCUMENTS_BY_ID,
        cf::TRANSITIONS,
    ]
}
