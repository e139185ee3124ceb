//! Entitlement operations on top of the store.
//!
//! Each operation reads the rows it needs, runs the pure rule from
//! `lexmeter-core`, and commits the result in one guarded [`Store::commit`].
//! A commit that loses a race is retried from a fresh read.
//!
//! [`Store::commit`]: lexmeter_store::Store::commit

pub mod gate;
pub mod plans;
pub mod promos;
pub mod purchases;
pub mod referrals;
pub mod sweeper;

use lexmeter_core::{EntitlementError, PlanTier};
use lexmeter_store::StoreError;

/// Attempts made before a version conflict is surfaced.
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Errors raised by entitlement operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Storage failure or lost race.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A domain rule rejected the operation.
    #[error(transparent)]
    Entitlement(#[from] EntitlementError),

    /// The user already holds a paid plan that has not lapsed.
    #[error("{plan} plan is still active")]
    PlanActive {
        /// Tier in force.
        plan: PlanTier,
    },
}

impl EngineError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}

/// Run `attempt` until it commits or fails with something other than a
/// version conflict.
pub(crate) fn with_retry<T>(
    mut attempt: impl FnMut() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let mut tries = 1;
    loop {
        match attempt() {
            Err(err) if err.is_conflict() && tries < MAX_COMMIT_ATTEMPTS => {
                tracing::debug!(attempt = tries, "Plan commit conflicted, retrying");
                tries += 1;
            }
            result => return result,
        }
    }
}
