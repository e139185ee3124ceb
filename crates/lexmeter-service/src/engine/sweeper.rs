//! Expiration sweeper.
//!
//! [`sweep_user`] applies expiry to one plan; [`sweep_all`] walks every plan
//! that lapsed; [`run_sweeper`] calls `sweep_all` on a fixed interval. All
//! three are safe to run concurrently: the commit is guarded by the plan
//! version, and a loser re-reads a plan that is no longer expired.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use lexmeter_core::{plan_expiry, PlanTransition, TransitionKind, UserId};
use lexmeter_store::{PlanChange, PlanGuard, Store};

use super::{with_retry, EngineError};
use crate::state::AppState;

/// Summary of one full sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Lapsed plans found.
    pub scanned: usize,
    /// Plans reverted to free.
    pub expired: usize,
    /// Plans that resumed a paused referral reward.
    pub restored: usize,
    /// Plans that could not be swept.
    pub failed: usize,
}

/// Expire the user's plan if it lapsed at `now`.
///
/// Returns the recorded transition, or `None` when nothing changed.
///
/// # Errors
///
/// Returns an error if the store fails or the commit keeps conflicting.
pub fn sweep_user(
    store: &dyn Store,
    user_id: &UserId,
    now: DateTime<Utc>,
) -> Result<Option<PlanTransition>, EngineError> {
    with_retry(|| {
        let Some(plan) = store.get_plan(user_id)? else {
            return Ok(None);
        };
        let paused_row = match &plan.paused_reward {
            Some(paused) => store.get_referral_reward(user_id, paused.month_year)?,
            None => None,
        };
        let Some(expiry) = plan_expiry(now, &plan, paused_row) else {
            return Ok(None);
        };

        let mut change = PlanChange::new(*user_id, PlanGuard::Version(plan.version));
        change.plan = Some(expiry.plan);
        change.rewards.extend(expiry.reward);
        change.transition = Some(expiry.transition.clone());
        store.commit(&change)?;

        tracing::info!(
            user_id = %user_id,
            from = %expiry.transition.from,
            to = %expiry.transition.to,
            kind = ?expiry.transition.kind,
            "Plan expired"
        );
        Ok(Some(expiry.transition))
    })
}

/// Sweep every plan that lapsed before `now`.
///
/// # Errors
///
/// Returns an error only if the lapsed plans cannot be listed; per-user
/// failures are logged and counted.
pub fn sweep_all(store: &dyn Store, now: DateTime<Utc>) -> Result<SweepReport, EngineError> {
    let lapsed = store.list_plans_expiring_before(now)?;
    let mut report = SweepReport {
        scanned: lapsed.len(),
        ..SweepReport::default()
    };

    for plan in lapsed {
        match sweep_user(store, &plan.user_id, now) {
            Ok(Some(transition)) if transition.kind == TransitionKind::RewardRestored => {
                report.restored += 1;
            }
            Ok(Some(_)) => report.expired += 1,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(user_id = %plan.user_id, error = %e, "Failed to sweep plan");
                report.failed += 1;
            }
        }
    }

    if report.scanned > 0 {
        tracing::info!(
            scanned = report.scanned,
            expired = report.expired,
            restored = report.restored,
            failed = report.failed,
            "Expiration sweep finished"
        );
    }
    Ok(report)
}

/// Run [`sweep_all`] every `period` until the task is dropped.
pub async fn run_sweeper(state: Arc<AppState>, period: Duration) {
    tracing::info!(period_seconds = period.as_secs(), "Expiration sweeper started");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let now = state.clock.now();
        if let Err(e) = sweep_all(state.store.as_ref(), now) {
            tracing::error!(error = %e, "Expiration sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lexmeter_core::{PlanRecord, PlanTier, PurchaseId};
    use lexmeter_store::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
    }

    fn seed_basic(store: &MemoryStore, user_id: UserId, expires_in: chrono::Duration) {
        let mut plan = PlanRecord::free(user_id, now() - chrono::Duration::days(30));
        plan.plan = PlanTier::Basic;
        plan.expires_at = Some(now() + expires_in);
        plan.purchase_ref = Some(PurchaseId::generate());
        let mut change = PlanChange::new(user_id, PlanGuard::Absent);
        change.plan = Some(plan);
        store.commit(&change).unwrap();
    }

    #[test]
    fn sweep_user_is_idempotent() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        seed_basic(&store, user_id, -chrono::Duration::hours(1));

        let transition = sweep_user(&store, &user_id, now()).unwrap().unwrap();
        assert_eq!(transition.kind, TransitionKind::Expired);
        assert!(sweep_user(&store, &user_id, now()).unwrap().is_none());

        let plan = store.get_plan(&user_id).unwrap().unwrap();
        assert_eq!(plan.plan, PlanTier::Free);
        assert_eq!(plan.version, 2);
        assert_eq!(store.list_transitions(&user_id, 10).unwrap().len(), 1);
    }

    #[test]
    fn sweep_all_only_touches_lapsed_plans() {
        let store = MemoryStore::new();
        let lapsed = UserId::generate();
        let active = UserId::generate();
        seed_basic(&store, lapsed, -chrono::Duration::minutes(5));
        seed_basic(&store, active, chrono::Duration::days(3));

        let report = sweep_all(&store, now()).unwrap();
        assert_eq!(
            report,
            SweepReport {
                scanned: 1,
                expired: 1,
                restored: 0,
                failed: 0
            }
        );
        assert_eq!(store.get_plan(&active).unwrap().unwrap().plan, PlanTier::Basic);

        assert_eq!(sweep_all(&store, now()).unwrap().scanned, 0);
    }

    #[test]
    fn unknown_user_is_a_no_op() {
        let store = MemoryStore::new();
        assert!(sweep_user(&store, &UserId::generate(), now()).unwrap().is_none());
    }
}
