//! Analyzed documents, the unit of metering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DocumentId, UserId};

/// A document submitted for analysis.
///
/// Each row created inside a metering window consumes one credit until it is
/// deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document identifier.
    pub id: DocumentId,
    /// Owning user.
    pub user_id: UserId,
    /// Original file name, if provided.
    pub title: Option<String>,
    /// When the document was submitted.
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    /// A new, undeleted document.
    #[must_use]
    pub fn new(user_id: UserId, title: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: DocumentId::generate(),
            user_id,
            title,
            created_at: now,
            deleted_at: None,
        }
    }

    /// Whether the document is counted toward usage.
    #[must_use]
    pub const fn is_counted(&self) -> bool {
        self.deleted_at.is_none()
    }
}
