//! Service configuration.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use lexmeter_core::{ProductCatalog, PromoCatalog, ReferralPolicy};

/// Which storage backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// `RocksDB` under `data_dir`.
    Rocksdb,
    /// Process memory; nothing survives a restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rocksdb" | "rocks" => Ok(Self::Rocksdb),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/lexmeter").
    pub data_dir: String,

    /// Storage backend (default: rocksdb).
    pub store_backend: StoreBackend,

    /// HS256 secret for user JWTs.
    pub jwt_secret: Option<String>,

    /// Expected JWT audience (default: "lexmeter").
    pub jwt_audience: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// HMAC secret of the payment webhook.
    pub payment_webhook_secret: Option<String>,

    /// Accepted age of a webhook signature timestamp, in seconds.
    pub webhook_tolerance_seconds: i64,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Background sweep period in seconds; 0 disables the sweeper task.
    pub sweep_interval_seconds: u64,

    /// Product to plan mapping for purchases.
    pub products: ProductCatalog,

    /// Redeemable promo codes.
    pub promo_codes: PromoCatalog,

    /// Referral reward thresholds.
    pub referral_policy: ReferralPolicy,
}

/// Secrets file structure.
#[derive(Debug, Default, Deserialize)]
struct Secrets {
    #[serde(default)]
    jwt_secret: Option<String>,
    #[serde(default)]
    service_api_key: Option<String>,
    #[serde(default)]
    payment_webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and the secrets file.
    #[must_use]
    pub fn from_env() -> Self {
        let secrets = load_secrets();
        let defaults = Self::default();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            store_backend: std::env::var("STORE_BACKEND")
                .ok()
                .and_then(|s| {
                    s.parse()
                        .map_err(|e: String| tracing::warn!(error = %e, "Ignoring STORE_BACKEND"))
                        .ok()
                })
                .unwrap_or(defaults.store_backend),
            jwt_secret: secrets.jwt_secret.or_else(|| std::env::var("JWT_SECRET").ok()),
            jwt_audience: std::env::var("JWT_AUDIENCE").unwrap_or(defaults.jwt_audience),
            service_api_key: secrets
                .service_api_key
                .or_else(|| std::env::var("SERVICE_API_KEY").ok()),
            payment_webhook_secret: secrets
                .payment_webhook_secret
                .or_else(|| std::env::var("PAYMENT_WEBHOOK_SECRET").ok()),
            webhook_tolerance_seconds: env_parse("WEBHOOK_TOLERANCE_SECONDS")
                .unwrap_or(defaults.webhook_tolerance_seconds),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            sweep_interval_seconds: env_parse("SWEEP_INTERVAL_SECONDS")
                .unwrap_or(defaults.sweep_interval_seconds),
            products: std::env::var("PRODUCT_CATALOG")
                .ok()
                .and_then(|spec| {
                    ProductCatalog::parse(&spec)
                        .map_err(|e| tracing::warn!(error = %e, "Ignoring PRODUCT_CATALOG"))
                        .ok()
                })
                .unwrap_or(defaults.products),
            promo_codes: std::env::var("PROMO_CODES")
                .ok()
                .and_then(|spec| {
                    PromoCatalog::parse(&spec)
                        .map_err(|e| tracing::warn!(error = %e, "Ignoring PROMO_CODES"))
                        .ok()
                })
                .unwrap_or(defaults.promo_codes),
            referral_policy: defaults.referral_policy,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Load secrets from the first secrets file found.
fn load_secrets() -> Secrets {
    let secret_paths = [
        ".secrets/lexmeter.json",
        "lexmeter/.secrets/lexmeter.json",
        "../.secrets/lexmeter.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<Secrets>(path) {
            tracing::info!(path = %path, "Loaded secrets from file");
            return secrets;
        }
    }

    tracing::debug!("Secrets file not found, using environment variables");
    Secrets::default()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/lexmeter".into(),
            store_backend: StoreBackend::Rocksdb,
            jwt_secret: None,
            jwt_audience: "lexmeter".into(),
            service_api_key: None,
            payment_webhook_secret: None,
            webhook_tolerance_seconds: 300,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            sweep_interval_seconds: 60,
            products: ProductCatalog::default(),
            promo_codes: PromoCatalog::default(),
            referral_policy: ReferralPolicy::default(),
        }
    }
}
