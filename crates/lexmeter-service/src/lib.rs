//! lexmeter HTTP API service.
//!
//! This crate serves plan entitlements over HTTP:
//!
//! - Effective plan and per-feature gate decisions
//! - Document recording against the metering window
//! - Promo code redemption and referral counting
//! - Payment webhooks and the expiration sweeper
//!
//! # Authentication
//!
//! The service supports three authentication methods:
//!
//! 1. **HS256 JWT tokens** - For end-user requests
//! 2. **Service API keys** - For referral and maintenance calls
//! 3. **HMAC signatures** - For payment provider webhooks

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers call the synchronous store

pub mod auth;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{ServiceConfig, StoreBackend};
pub use engine::sweeper::{run_sweeper, sweep_all, SweepReport};
pub use engine::EngineError;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
