//! Committed plan transitions.
//!
//! Every change to a user's plan row is recorded as a [`PlanTransition`]. The
//! transitions double as the user-visible notifications ("your subscription
//! expired, reverted to Free").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TransitionId, UserId};
use crate::plan::PlanTier;

/// Why the plan changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// A completed purchase replaced the plan.
    Purchased,
    /// The backing purchase was refunded.
    Refunded,
    /// The plan lapsed and reverted to free.
    Expired,
    /// The plan lapsed and a paused referral reward resumed.
    RewardRestored,
    /// The user picked a plan themselves.
    PlanSelected,
    /// A referral reward was granted or upgraded.
    RewardGranted,
}

/// A recorded plan change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTransition {
    /// Time-ordered identifier.
    pub id: TransitionId,

    /// Affected user.
    pub user_id: UserId,

    /// What happened.
    pub kind: TransitionKind,

    /// Tier before the change.
    pub from: PlanTier,

    /// Tier after the change.
    pub to: PlanTier,

    /// Expiry of the new tier, if it lapses.
    pub expires_at: Option<DateTime<Utc>>,

    /// Notification text.
    pub message: String,

    /// When the change was committed.
    pub at: DateTime<Utc>,
}

impl PlanTransition {
    /// Build a transition with the standard message for its kind.
    #[must_use]
    pub fn new(
        user_id: UserId,
        kind: TransitionKind,
        from: PlanTier,
        to: PlanTier,
        expires_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransitionId::generate(),
            user_id,
            kind,
            from,
            to,
            expires_at,
            message: describe(kind, from, to, expires_at),
            at,
        }
    }
}

fn describe(
    kind: TransitionKind,
    from: PlanTier,
    to: PlanTier,
    expires_at: Option<DateTime<Utc>>,
) -> String {
    let until = expires_at
        .map(|at| format!(" until {}", at.format("%Y-%m-%d")))
        .unwrap_or_default();

    match kind {
        TransitionKind::Purchased => {
            format!("Your {} plan is active{until}.", to.display_name())
        }
        TransitionKind::Refunded => format!(
            "Your {} purchase was refunded, reverted to {}.",
            from.display_name(),
            to.display_name()
        ),
        TransitionKind::Expired => format!(
            "Your {} subscription expired, reverted to {}.",
            from.display_name(),
            to.display_name()
        ),
        TransitionKind::RewardRestored => format!(
            "Your {} subscription expired, your {} referral reward resumed{until}.",
            from.display_name(),
            to.display_name()
        ),
        TransitionKind::PlanSelected => {
            format!("You are now on the {} plan.", to.display_name())
        }
        TransitionKind::RewardGranted => {
            format!("You earned a {} referral reward{until}.", to.display_name())
        }
    }
}
