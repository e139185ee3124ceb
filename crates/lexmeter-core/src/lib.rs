//! Core types and rules for lexmeter.
//!
//! This crate holds the plan and entitlement model used by every other
//! lexmeter crate. Nothing in here touches storage or the network:
//!
//! - **Identifiers**: `UserId`, `DocumentId`, `PurchaseId`, `TransitionId`
//! - **Plans**: `PlanTier`, `PlanRecord`, `PausedReward`
//! - **Usage**: `DocumentRecord`
//! - **Grants**: `PurchaseRecord`, `ReferralReward`, `PromoRedemption`
//! - **Resolution**: `resolve_effective_plan`, `metering_window`
//! - **Gate**: `Feature`, `PlanState`, `evaluate`
//! - **State changes**: `apply_purchase`, `record_referral`, `plan_expiry`
//!
//! # Time
//!
//! Every rule takes `now` as an argument. The service reads it from a
//! [`Clock`], so expiry and metering can be tested without sleeping.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod document;
pub mod entitlement;
pub mod error;
pub mod ids;
pub mod metering;
pub mod plan;
pub mod promo;
pub mod purchase;
pub mod referral;
pub mod resolver;
pub mod sweep;
pub mod transition;

pub use clock::{Clock, ManualClock, SystemClock};
pub use document::DocumentRecord;
pub use entitlement::{
    evaluate, remaining_credits, BlockReason, Credits, Decision, Feature, FeatureClass,
    PlanState, UnknownFeature,
};
pub use error::{EntitlementError, Result};
pub use ids::{DocumentId, IdError, PurchaseId, TransitionId, UserId};
pub use metering::{metering_window, start_of_month, start_of_next_month, MeteringWindow};
pub use plan::{
    PausedReward, PlanRecord, PlanTier, BASIC_WINDOW_DOCUMENTS, FREE_MONTHLY_DOCUMENTS,
    PAY_PER_USE_DOCUMENTS,
};
pub use promo::{normalize_code, PromoCatalog, PromoCode, PromoRedemption};
pub use purchase::{
    apply_purchase, has_ever_paid, ProductCatalog, ProductSpec, PurchaseChange, PurchaseEffect,
    PurchaseEvent, PurchaseRecord, PurchaseStatus,
};
pub use referral::{
    merge_paused, record_referral, MonthYear, ReferralOutcome, ReferralPolicy, ReferralReward,
    ReferralTier, DEFAULT_REWARD_DAYS,
};
pub use resolver::{resolve_effective_plan, EffectivePlan, PlanSource};
pub use sweep::{plan_expiry, ExpiryChange};
pub use transition::{PlanTransition, TransitionKind};
