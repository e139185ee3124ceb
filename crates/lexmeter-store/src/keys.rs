//! Key encoding utilities for `RocksDB`.
//!
//! Per-user keys start with the 16 raw bytes of the `UserId`, so listing a
//! user's rows is a prefix scan. Timestamps are encoded as big-endian
//! milliseconds with the sign bit flipped, which makes byte order match
//! chronological order.

use chrono::{DateTime, Utc};
use lexmeter_core::{DocumentId, MonthYear, PurchaseId, TransitionId, UserId};

/// Length of an encoded timestamp.
const TIMESTAMP_LEN: usize = 8;

/// Create a plan key from a user ID.
#[must_use]
pub fn plan_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a purchase key from a purchase ID.
#[must_use]
pub fn purchase_key(purchase_id: &PurchaseId) -> Vec<u8> {
    purchase_id.to_bytes().to_vec()
}

/// Create an order index key from a provider order ID.
#[must_use]
pub fn order_key(external_order_id: &str) -> Vec<u8> {
    external_order_id.as_bytes().to_vec()
}

/// Create a user-purchase index key.
///
/// Format: `user_id (16 bytes) || purchase_id (16 bytes)`
#[must_use]
pub fn user_purchase_key(user_id: &UserId, purchase_id: &PurchaseId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&purchase_id.to_bytes());
    key
}

/// Create a prefix for iterating all rows of a user.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the purchase ID from a user-purchase index key.
#[must_use]
pub fn extract_purchase_id(key: &[u8]) -> Option<PurchaseId> {
    let bytes: [u8; 16] = key.get(16..32)?.try_into().ok()?;
    Some(PurchaseId::from_bytes(bytes))
}

/// Create a referral reward key.
///
/// Format: `user_id (16 bytes) || "YYYY-MM"`
#[must_use]
pub fn referral_reward_key(user_id: &UserId, month_year: MonthYear) -> Vec<u8> {
    let mut key = user_prefix(user_id);
    key.extend_from_slice(month_year.to_string().as_bytes());
    key
}

/// Create a promo redemption key.
///
/// Format: `user_id (16 bytes) || code`
#[must_use]
pub fn promo_key(user_id: &UserId, code: &str) -> Vec<u8> {
    let mut key = user_prefix(user_id);
    key.extend_from_slice(code.as_bytes());
    key
}

/// Encode an instant so that byte order is chronological.
#[must_use]
pub fn timestamp_bytes(at: DateTime<Utc>) -> [u8; TIMESTAMP_LEN] {
    let mut bytes = at.timestamp_millis().to_be_bytes();
    bytes[0] ^= 0x80;
    bytes
}

/// Create a document key.
///
/// Format: `user_id (16 bytes) || created_at (8 bytes) || document_id (16 bytes)`
#[must_use]
pub fn document_key(user_id: &UserId, created_at: DateTime<Utc>, document_id: &DocumentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&timestamp_bytes(created_at));
    key.extend_from_slice(document_id.as_bytes());
    key
}

/// Lower bound of the document keys created at or after `at`.
#[must_use]
pub fn document_bound(user_id: &UserId, at: DateTime<Utc>) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&timestamp_bytes(at));
    key
}

/// Create a document ID index key.
#[must_use]
pub fn document_id_key(document_id: &DocumentId) -> Vec<u8> {
    document_id.as_bytes().to_vec()
}

/// Create a transition key.
///
/// Format: `user_id (16 bytes) || at (8 bytes) || transition_id (16 bytes)`
#[must_use]
pub fn transition_key(user_id: &UserId, at: DateTime<Utc>, transition_id: &TransitionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&timestamp_bytes(at));
    key.extend_from_slice(&transition_id.to_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn user_purchase_key_format() {
        let user_id = UserId::generate();
        let purchase_id = PurchaseId::generate();
        let key = user_purchase_key(&user_id, &purchase_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(extract_purchase_id(&key), Some(purchase_id));
        assert_eq!(extract_purchase_id(&key[..20]), None);
    }

    #[test]
    fn timestamps_sort_chronologically() {
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let instants = [
            epoch - Duration::days(400),
            epoch - Duration::milliseconds(1),
            epoch,
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        ];
        let encoded: Vec<_> = instants.iter().map(|at| timestamp_bytes(*at)).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn document_key_sits_inside_its_window() {
        let user_id = UserId::generate();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        let key = document_key(&user_id, start + Duration::days(3), &DocumentId::generate());

        assert_eq!(key.len(), 40);
        assert!(document_bound(&user_id, start) <= key);
        assert!(key < document_bound(&user_id, end));
    }

    #[test]
    fn referral_reward_key_format() {
        let user_id = UserId::generate();
        let key = referral_reward_key(&user_id, "2026-04".parse().unwrap());
        assert_eq!(&key[16..], b"2026-04");
    }
}
