use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use strum::{Display, EnumString};
use url::Url;

use crate::domain::entities::usage::{ThrottlingConfig, ThrottlingPeriod};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub cors_origin: HeaderValue,
    /// HS256 secret of the identity provider's access tokens.
    pub jwt_secret: SecretString,
    pub lemonsqueezy_api_url: Url,
    pub lemonsqueezy_api_key: SecretString,
    pub lemonsqueezy_webhook_secret: SecretString,
    /// The single product this deployment bills; other products are ignored.
    pub lemonsqueezy_product_id: i64,
    pub provider_timeout: Duration,
    pub throttling: ThrottlingConfig,
    /// TTL of cached `false` premium flags.
    pub non_premium_cache_ttl: Duration,
    pub reconcile_workers: usize,
    pub reconcile_queue_capacity: usize,
    pub reconcile_job_timeout: Duration,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)));
        let database_url: String = get_env("DATABASE_URL");
        let database_max_connections: u32 = get_env_default("DATABASE_MAX_CONNECTIONS", 10);
        let redis_url: String = get_env_default("REDIS_URL", "redis://127.0.0.1:6379".to_string());
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");

        let jwt_secret = SecretString::new(get_env::<String>("JWT_SECRET").into());

        let lemonsqueezy_api_url: Url = get_env_default(
            "LEMONSQUEEZY_API_URL",
            Url::parse("https://api.lemonsqueezy.com/v1").expect("default provider URL is valid"),
        );
        let lemonsqueezy_api_key =
            SecretString::new(get_env::<String>("LEMONSQUEEZY_API_KEY").into());
        let lemonsqueezy_webhook_secret =
            SecretString::new(get_env::<String>("LEMONSQUEEZY_WEBHOOK_SECRET").into());
        let lemonsqueezy_product_id: i64 = get_env("LEMONSQUEEZY_PRODUCT_ID");
        let provider_timeout_secs: u64 = get_env_default("PROVIDER_TIMEOUT_SECS", 10);

        let throttling_limit: i64 = get_env_default("THROTTLING_LIMIT", 10);
        let throttling_period: ThrottlingPeriod =
            get_env_default("THROTTLING_PERIOD", ThrottlingPeriod::Daily);
        let non_premium_cache_ttl_secs: u64 = get_env_default("NON_PREMIUM_CACHE_TTL_SECS", 3600);

        let reconcile_workers: usize = get_env_default("RECONCILE_WORKERS", 4);
        let reconcile_queue_capacity: usize = get_env_default("RECONCILE_QUEUE_CAPACITY", 256);
        let reconcile_job_timeout_secs: u64 = get_env_default("RECONCILE_JOB_TIMEOUT_SECS", 120);

        let log_format: LogFormat = get_env_default("LOG_FORMAT", LogFormat::Pretty);

        Self {
            bind_addr,
            database_url,
            database_max_connections,
            redis_url,
            cors_origin,
            jwt_secret,
            lemonsqueezy_api_url,
            lemonsqueezy_api_key,
            lemonsqueezy_webhook_secret,
            lemonsqueezy_product_id,
            provider_timeout: Duration::from_secs(provider_timeout_secs),
            throttling: ThrottlingConfig {
                limit: throttling_limit,
                period: throttling_period,
            },
            non_premium_cache_ttl: Duration::from_secs(non_premium_cache_ttl_secs),
            reconcile_workers: reconcile_workers.max(1),
            reconcile_queue_capacity: reconcile_queue_capacity.max(1),
            reconcile_job_timeout: Duration::from_secs(reconcile_job_timeout_secs),
            log_format,
        }
    }
}
