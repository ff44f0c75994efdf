use uuid::Uuid;

use crate::{app_error::AppResult, domain::entities::webhook::WebhookPayload};

/// Work item handed from the webhook endpoint to background reconciliation.
#[derive(Debug, Clone)]
pub enum ReconcileJob {
    /// A verified and durably stored webhook.
    Webhook {
        raw_event_id: Uuid,
        payload: WebhookPayload,
    },
    /// First sign-in: link whatever the provider already knows for this email.
    LinkExisting { user_id: Uuid },
}

impl ReconcileJob {
    /// Jobs sharing a key are processed one at a time.
    pub fn ordering_key(&self) -> String {
        match self {
            ReconcileJob::Webhook { payload, .. } => payload.ordering_key(),
            ReconcileJob::LinkExisting { user_id, .. } => format!("user:{user_id}"),
        }
    }
}

/// Fire-and-forget hand-off. Must not wait for the job to run.
pub trait ReconcileDispatcher: Send + Sync {
    fn dispatch(&self, job: ReconcileJob) -> AppResult<()>;
}
