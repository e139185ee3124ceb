//! Common test utilities for lexmeter integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Router;
use axum_test::{TestResponse, TestServer};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::TempDir;

use lexmeter_core::{
    Clock, DocumentId, DocumentRecord, ManualClock, MonthYear, PlanRecord, PlanTransition,
    ProductCatalog, PromoCatalog, PromoRedemption, PurchaseRecord, ReferralReward, UserId,
};
use lexmeter_service::auth::JwtClaims;
use lexmeter_service::crypto::sign_payload;
use lexmeter_service::{create_router, AppState, ServiceConfig, StoreBackend};
use lexmeter_store::{MemoryStore, PlanChange, Store, StoreError};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const SERVICE_API_KEY: &str = "test-service-key";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Start of every test: 12:00 UTC on 10 March 2026.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server, with fault switches.
    pub store: Arc<FlakyStore>,
    /// The clock the server reads.
    pub clock: ManualClock,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// Temporary directory for a `RocksDB` store (kept alive for test duration).
    pub _temp_dir: Option<TempDir>,
}

impl TestHarness {
    /// Create a new test harness over an empty in-memory store.
    pub fn new() -> Self {
        Self::build(Arc::new(MemoryStore::new()), None)
    }

    /// Create a new test harness over a fresh `RocksDB` store.
    #[cfg(feature = "rocksdb-backend")]
    pub fn with_rocks() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = lexmeter_store::RocksStore::open(temp_dir.path()).expect("Failed to open store");
        Self::build(Arc::new(store), Some(temp_dir))
    }

    fn build(inner: Arc<dyn Store>, temp_dir: Option<TempDir>) -> Self {
        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            store_backend: StoreBackend::Memory,
            jwt_secret: Some(JWT_SECRET.into()),
            service_api_key: Some(SERVICE_API_KEY.into()),
            payment_webhook_secret: Some(WEBHOOK_SECRET.into()),
            sweep_interval_seconds: 0,
            products: ProductCatalog::parse(
                "basic-monthly:basic:30,premium-monthly:premium:30,single-analysis:pay-per-use:30",
            )
            .expect("valid product catalog"),
            promo_codes: PromoCatalog::parse("LAUNCH:premium:14,TRYBASIC:basic:7")
                .expect("valid promo codes"),
            ..ServiceConfig::default()
        };

        let store = Arc::new(FlakyStore::new(inner));
        let clock = ManualClock::new(start());
        let state = AppState::with_clock(store.clone(), config, Arc::new(clock.clone()));
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            clock,
            test_user_id: UserId::generate(),
            _temp_dir: temp_dir,
        }
    }

    /// Get the authorization header for the test user.
    pub fn user_auth_header(&self) -> String {
        Self::auth_header_for(&self.test_user_id)
    }

    /// Get the authorization header for any user.
    ///
    /// Expiry is checked against the wall clock, not the test clock.
    pub fn auth_header_for(user_id: &UserId) -> String {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            sub: user_id.to_string(),
            aud: "lexmeter".into(),
            exp: now + 3600,
            iat: now,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("Failed to sign token");
        format!("Bearer {token}")
    }

    /// Deliver a signed payment webhook.
    pub async fn post_webhook(&self, payload: &Value) -> TestResponse {
        let body = payload.to_string();
        let signature = sign_payload(WEBHOOK_SECRET, self.clock.now().timestamp(), &body)
            .expect("Failed to sign payload");
        self.server
            .post("/webhooks/payments")
            .add_header("x-signature", signature)
            .text(body)
            .await
    }

    /// Deliver a signed completed-purchase webhook for the test user.
    pub async fn purchase(&self, order_id: &str, product_id: &str) -> TestResponse {
        self.post_webhook(&json!({
            "order_id": order_id,
            "user_id": self.test_user_id.to_string(),
            "product_id": product_id,
            "status": "completed",
            "amount_cents": 999,
            "currency": "USD"
        }))
        .await
    }

    /// Deliver a signed refund webhook for the test user.
    pub async fn refund(&self, order_id: &str, product_id: &str) -> TestResponse {
        self.post_webhook(&json!({
            "order_id": order_id,
            "user_id": self.test_user_id.to_string(),
            "product_id": product_id,
            "status": "refunded",
            "amount_cents": 999,
            "currency": "USD"
        }))
        .await
    }

    /// Record a document for the test user.
    pub async fn record_document(&self) -> TestResponse {
        self.server
            .post("/v1/documents")
            .add_header("authorization", self.user_auth_header())
            .json(&json!({ "title": "lease.pdf" }))
            .await
    }

    /// Record a referral through the service endpoint.
    pub async fn refer(&self, referrer: &UserId) -> TestResponse {
        self.server
            .post("/v1/referrals")
            .add_header("x-api-key", SERVICE_API_KEY)
            .add_header("x-service-name", "signup")
            .json(&json!({ "referrer_id": referrer.to_string() }))
            .await
    }

    /// Decision for one feature, for the test user.
    pub async fn entitlement(&self, feature: &str) -> Value {
        let response = self
            .server
            .get(&format!("/v1/entitlements/{feature}"))
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Usage for the test user.
    pub async fn usage(&self) -> Value {
        let response = self
            .server
            .get("/v1/usage")
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        response.json()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Fault injection
// ============================================================================

/// A store that can be told to fail reads.
pub struct FlakyStore {
    inner: Arc<dyn Store>,
    fail_plan_reads: AtomicBool,
    fail_counts: AtomicBool,
}

impl FlakyStore {
    fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            fail_plan_reads: AtomicBool::new(false),
            fail_counts: AtomicBool::new(false),
        }
    }

    /// Make plan and grant reads fail.
    pub fn fail_plan_reads(&self, fail: bool) {
        self.fail_plan_reads.store(fail, Ordering::SeqCst);
    }

    /// Make usage counts fail.
    pub fn fail_counts(&self, fail: bool) {
        self.fail_counts.store(fail, Ordering::SeqCst);
    }

    fn check_plan_reads(&self) -> lexmeter_store::Result<()> {
        if self.fail_plan_reads.load(Ordering::SeqCst) {
            Err(StoreError::Database("injected read failure".into()))
        } else {
            Ok(())
        }
    }
}

impl Store for FlakyStore {
    fn get_plan(&self, user_id: &UserId) -> lexmeter_store::Result<Option<PlanRecord>> {
        self.check_plan_reads()?;
        self.inner.get_plan(user_id)
    }

    fn list_plans_expiring_before(
        &self,
        now: DateTime<Utc>,
    ) -> lexmeter_store::Result<Vec<PlanRecord>> {
        self.inner.list_plans_expiring_before(now)
    }

    fn commit(&self, change: &PlanChange) -> lexmeter_store::Result<Option<PlanRecord>> {
        self.inner.commit(change)
    }

    fn get_purchase_by_order(
        &self,
        external_order_id: &str,
    ) -> lexmeter_store::Result<Option<PurchaseRecord>> {
        self.inner.get_purchase_by_order(external_order_id)
    }

    fn list_purchases_by_user(&self, user_id: &UserId) -> lexmeter_store::Result<Vec<PurchaseRecord>> {
        self.check_plan_reads()?;
        self.inner.list_purchases_by_user(user_id)
    }

    fn get_referral_reward(
        &self,
        user_id: &UserId,
        month_year: MonthYear,
    ) -> lexmeter_store::Result<Option<ReferralReward>> {
        self.inner.get_referral_reward(user_id, month_year)
    }

    fn list_referral_rewards(&self, user_id: &UserId) -> lexmeter_store::Result<Vec<ReferralReward>> {
        self.check_plan_reads()?;
        self.inner.list_referral_rewards(user_id)
    }

    fn put_promo_redemption(&self, redemption: &PromoRedemption) -> lexmeter_store::Result<()> {
        self.inner.put_promo_redemption(redemption)
    }

    fn list_promo_redemptions(
        &self,
        user_id: &UserId,
    ) -> lexmeter_store::Result<Vec<PromoRedemption>> {
        self.check_plan_reads()?;
        self.inner.list_promo_redemptions(user_id)
    }

    fn put_document(&self, document: &DocumentRecord) -> lexmeter_store::Result<()> {
        self.inner.put_document(document)
    }

    fn get_document(&self, document_id: &DocumentId) -> lexmeter_store::Result<Option<DocumentRecord>> {
        self.inner.get_document(document_id)
    }

    fn delete_document(
        &self,
        document_id: &DocumentId,
        now: DateTime<Utc>,
    ) -> lexmeter_store::Result<DocumentRecord> {
        self.inner.delete_document(document_id, now)
    }

    fn count_documents(
        &self,
        user_id: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> lexmeter_store::Result<u32> {
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected count failure".into()));
        }
        self.inner.count_documents(user_id, start, end)
    }

    fn list_transitions(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> lexmeter_store::Result<Vec<PlanTransition>> {
        self.inner.list_transitions(user_id, limit)
    }
}
