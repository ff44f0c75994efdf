pub mod reconciler;
pub mod usage_ledger;
pub mod user;
pub mod webhook_ingest;
