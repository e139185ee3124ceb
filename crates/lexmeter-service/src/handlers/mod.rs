//! API handlers.

pub mod documents;
pub mod entitlements;
pub mod health;
pub mod notifications;
pub mod plans;
pub mod promos;
pub mod referrals;
pub mod sweep;
pub mod usage;
pub mod webhooks;
