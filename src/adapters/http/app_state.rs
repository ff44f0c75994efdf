use std::sync::Arc;

use crate::{
    application::use_cases::{
        reconciler::SubscriptionReconciler, usage_ledger::UsageLedger, user::UserUseCases,
        webhook_ingest::WebhookIngestor,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub ledger: Arc<UsageLedger>,
    pub reconciler: Arc<SubscriptionReconciler>,
    pub webhook_ingestor: Arc<WebhookIngestor>,
    pub user_use_cases: Arc<UserUseCases>,
}
