//! Plan selection.

use chrono::{DateTime, Utc};

use lexmeter_core::{PlanRecord, PlanTier, PlanTransition, TransitionKind, UserId};
use lexmeter_store::{PlanChange, PlanGuard, Store, StoreError};

use super::sweeper::sweep_user;
use super::{with_retry, EngineError};

/// Put the user on the free plan.
///
/// Creates the plan row on first selection and returns an existing free row
/// unchanged.
///
/// # Errors
///
/// Returns `EngineError::PlanActive` while a paid plan is in force.
pub fn select_free(
    store: &dyn Store,
    user_id: &UserId,
    now: DateTime<Utc>,
) -> Result<PlanRecord, EngineError> {
    sweep_user(store, user_id, now)?;

    with_retry(|| {
        match store.get_plan(user_id)? {
            Some(plan) if plan.plan.is_paid() && !plan.is_expired(now) => {
                Err(EngineError::PlanActive { plan: plan.plan })
            }
            Some(plan) => Ok(plan),
            None => {
                let mut change = PlanChange::new(*user_id, PlanGuard::Absent);
                change.plan = Some(PlanRecord::free(*user_id, now));
                change.transition = Some(PlanTransition::new(
                    *user_id,
                    TransitionKind::PlanSelected,
                    PlanTier::Free,
                    PlanTier::Free,
                    None,
                    now,
                ));
                let plan = store.commit(&change)?.ok_or(StoreError::NotFound)?;
                tracing::info!(user_id = %user_id, "Free plan selected");
                Ok(plan)
            }
        }
    })
}
