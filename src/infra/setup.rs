use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::{billing_provider::BillingProvider, cache::CacheStore},
        use_cases::{
            reconciler::{PaymentRepoTrait, SubscriptionReconciler},
            usage_ledger::{UsageLedger, UsageRepoTrait},
            user::{UserRepoTrait, UserUseCases},
            webhook_ingest::{WebhookEventRepoTrait, WebhookIngestor},
        },
    },
    infra::{
        config::{AppConfig, LogFormat},
        http_client::build_client,
        lemonsqueezy_client::LemonSqueezyClient,
        postgres_persistence,
        reconcile_worker::{ReconcileQueue, WorkerSettings},
        redis_cache::RedisCache,
    },
};
use std::fs::File;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();
    init_tracing(config.log_format);

    let postgres_arc = Arc::new(
        postgres_persistence(&config.database_url, config.database_max_connections).await?,
    );
    let user_repo_arc = postgres_arc.clone() as Arc<dyn UserRepoTrait>;
    let usage_repo_arc = postgres_arc.clone() as Arc<dyn UsageRepoTrait>;
    let payment_repo_arc = postgres_arc.clone() as Arc<dyn PaymentRepoTrait>;
    let webhook_repo_arc = postgres_arc.clone() as Arc<dyn WebhookEventRepoTrait>;

    let cache = Arc::new(RedisCache::new(&config.redis_url).await?) as Arc<dyn CacheStore>;

    let provider = Arc::new(LemonSqueezyClient::new(
        build_client(config.provider_timeout)?,
        &config.lemonsqueezy_api_url,
        config.lemonsqueezy_api_key.clone(),
    )) as Arc<dyn BillingProvider>;

    let ledger = Arc::new(UsageLedger::new(
        user_repo_arc.clone(),
        usage_repo_arc,
        cache,
        config.throttling,
        config.non_premium_cache_ttl,
    ));

    let reconciler = Arc::new(SubscriptionReconciler::new(
        user_repo_arc.clone(),
        payment_repo_arc,
        provider,
        ledger.clone(),
        config.lemonsqueezy_product_id,
    ));

    let queue = Arc::new(ReconcileQueue::start(
        reconciler.clone(),
        WorkerSettings {
            workers: config.reconcile_workers,
            capacity: config.reconcile_queue_capacity,
            job_timeout: config.reconcile_job_timeout,
        },
    ));

    let webhook_ingestor = WebhookIngestor::new(
        webhook_repo_arc,
        queue.clone(),
        config.lemonsqueezy_webhook_secret.clone(),
    );
    let user_use_cases = UserUseCases::new(user_repo_arc, queue);

    info!(
        product_id = config.lemonsqueezy_product_id,
        throttling_limit = config.throttling.limit,
        throttling_period = %config.throttling.period,
        "Billing sync initialized"
    );

    Ok(AppState {
        config: Arc::new(config),
        ledger,
        reconciler,
        webhook_ingestor: Arc::new(webhook_ingestor),
        user_use_cases: Arc::new(user_use_cases),
    })
}

pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false) // don’t show target (module path)
        .with_level(true) // show log level
        .pretty(); // human-friendly, with colors

    // File (structured JSON logs)
    let json_layer = match format {
        LogFormat::Json => File::create("app.log").ok().map(|file| {
            fmt::layer()
                .json()
                .with_writer(file)
                .with_current_span(true)
                .with_span_list(true)
        }),
        LogFormat::Pretty => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
