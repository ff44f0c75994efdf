//! Test app state builder for HTTP-level testing.
//!
//! `TestAppStateBuilder` wires every use case onto in-memory mocks and keeps
//! handles to them so tests can seed and inspect state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        jwt,
        use_cases::{
            reconciler::SubscriptionReconciler, usage_ledger::UsageLedger, user::UserUseCases,
            webhook_ingest::WebhookIngestor,
        },
    },
    domain::entities::{
        usage::{ThrottlingConfig, ThrottlingPeriod, UsagePeriod},
        user::User,
    },
    infra::config::{AppConfig, LogFormat},
    test_utils::{
        FakeBillingProvider, InMemoryCache, InMemoryPaymentRepo, InMemoryUsageRepo,
        InMemoryUserRepo, InMemoryWebhookEventRepo, RecordingDispatcher, TEST_PRODUCT_ID,
    },
};

pub const TEST_JWT_SECRET: &str = "test_jwt_secret";
pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret";

/// `Authorization` header value for a freshly issued access token.
pub fn bearer(user_id: Uuid, email: &str) -> String {
    let token = jwt::issue(
        user_id,
        email,
        &SecretString::new(TEST_JWT_SECRET.into()),
        chrono::Duration::hours(1),
    )
    .expect("test token should encode");
    format!("Bearer {token}")
}

/// Mocks behind a built `AppState`.
pub struct TestApp {
    pub state: AppState,
    pub users: Arc<InMemoryUserRepo>,
    pub usage: Arc<InMemoryUsageRepo>,
    pub cache: Arc<InMemoryCache>,
    pub events: Arc<InMemoryWebhookEventRepo>,
    pub payments: Arc<InMemoryPaymentRepo>,
    pub provider: Arc<FakeBillingProvider>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

/// Builder for creating `AppState` with in-memory mocks for testing.
///
/// # Example
///
/// ```ignore
/// let user = create_test_user(|_| {});
/// let app = TestAppStateBuilder::new()
///     .with_user(user.clone())
///     .with_limit(3)
///     .build_with_mocks();
/// ```
pub struct TestAppStateBuilder {
    users: Vec<User>,
    periods: Vec<UsagePeriod>,
    provider: FakeBillingProvider,
    throttling: ThrottlingConfig,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            users: vec![],
            periods: vec![],
            provider: FakeBillingProvider::new(),
            throttling: ThrottlingConfig {
                limit: 10,
                period: ThrottlingPeriod::Daily,
            },
        }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.push(user);
        self
    }

    pub fn with_period(mut self, period: UsagePeriod) -> Self {
        self.periods.push(period);
        self
    }

    pub fn with_provider(mut self, provider: FakeBillingProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Free-tier units per period.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.throttling.limit = limit;
        self
    }

    pub fn build(self) -> AppState {
        self.build_with_mocks().state
    }

    /// Build the AppState and return the mocks alongside it.
    pub fn build_with_mocks(self) -> TestApp {
        let users = Arc::new(InMemoryUserRepo::with_users(self.users));
        let usage = Arc::new(InMemoryUsageRepo::new());
        for period in self.periods {
            usage.insert(period);
        }
        let cache = Arc::new(InMemoryCache::new());
        let events = Arc::new(InMemoryWebhookEventRepo::new());
        let payments = Arc::new(InMemoryPaymentRepo::new());
        let provider = Arc::new(self.provider);
        let dispatcher = Arc::new(RecordingDispatcher::new());

        // Create minimal config for testing
        let config = Arc::new(AppConfig {
            bind_addr: "127.0.0.1:3001".parse::<SocketAddr>().unwrap(),
            database_url: String::new(),
            database_max_connections: 1,
            redis_url: String::new(),
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            jwt_secret: SecretString::new(TEST_JWT_SECRET.into()),
            lemonsqueezy_api_url: Url::parse("http://localhost:9999/v1").unwrap(),
            lemonsqueezy_api_key: SecretString::new("test_api_key".into()),
            lemonsqueezy_webhook_secret: SecretString::new(TEST_WEBHOOK_SECRET.into()),
            lemonsqueezy_product_id: TEST_PRODUCT_ID,
            provider_timeout: Duration::from_secs(5),
            throttling: self.throttling,
            non_premium_cache_ttl: Duration::from_secs(3600),
            reconcile_workers: 1,
            reconcile_queue_capacity: 8,
            reconcile_job_timeout: Duration::from_secs(5),
            log_format: LogFormat::Pretty,
        });

        let ledger = Arc::new(UsageLedger::new(
            users.clone(),
            usage.clone(),
            cache.clone(),
            config.throttling,
            config.non_premium_cache_ttl,
        ));
        let reconciler = Arc::new(SubscriptionReconciler::new(
            users.clone(),
            payments.clone(),
            provider.clone(),
            ledger.clone(),
            config.lemonsqueezy_product_id,
        ));
        let webhook_ingestor = Arc::new(WebhookIngestor::new(
            events.clone(),
            dispatcher.clone(),
            config.lemonsqueezy_webhook_secret.clone(),
        ));
        let user_use_cases = Arc::new(UserUseCases::new(users.clone(), dispatcher.clone()));

        let state = AppState {
            config,
            ledger,
            reconciler,
            webhook_ingestor,
            user_use_cases,
        };

        TestApp {
            state,
            users,
            usage,
            cache,
            events,
            payments,
            provider,
            dispatcher,
        }
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
