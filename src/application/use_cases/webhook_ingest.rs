use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::reconcile_queue::{ReconcileDispatcher, ReconcileJob},
    domain::entities::webhook::{WebhookEventProfile, WebhookPayload},
    infra::webhook_signature::verify_signature,
};

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait WebhookEventRepoTrait: Send + Sync {
    /// Appends the raw callback. Nothing is parsed or deduplicated here.
    async fn create(&self, payload: &str, signature: &str) -> AppResult<WebhookEventProfile>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<WebhookEventProfile>>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub event_id: Uuid,
}

#[derive(Clone)]
pub struct WebhookIngestor {
    events: Arc<dyn WebhookEventRepoTrait>,
    dispatcher: Arc<dyn ReconcileDispatcher>,
    secret: SecretString,
}

impl WebhookIngestor {
    pub fn new(
        events: Arc<dyn WebhookEventRepoTrait>,
        dispatcher: Arc<dyn ReconcileDispatcher>,
        secret: SecretString,
    ) -> Self {
        Self {
            events,
            dispatcher,
            secret,
        }
    }

    /// Verifies, stores, then hands the event to background reconciliation.
    ///
    /// Returns as soon as the raw event is durable; processing is never awaited.
    #[instrument(skip(self, raw_body, signature), fields(bytes = raw_body.len()))]
    pub async fn receive(&self, raw_body: &[u8], signature: Option<&str>) -> AppResult<WebhookAck> {
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            warn!("Webhook without signature rejected");
            return Err(AppError::InvalidSignature);
        };
        if !verify_signature(self.secret.expose_secret(), raw_body, signature) {
            warn!("Webhook signature mismatch");
            return Err(AppError::InvalidSignature);
        }

        // The raw log keeps the signed bytes verbatim, so they must be text.
        let body = std::str::from_utf8(raw_body).map_err(|e| {
            warn!(error = %e, "Signed webhook body is not UTF-8");
            AppError::InvalidInput("Webhook body is not valid UTF-8".into())
        })?;
        let stored = self
            .events
            .create(&body, signature)
            .await
            .map_err(|e| AppError::RawWebhookStorage(e.to_string()))?;

        let payload: WebhookPayload = serde_json::from_str(body).map_err(|e| {
            warn!(event_id = %stored.id, error = %e, "Stored webhook has unusable payload");
            AppError::InvalidInput(format!("Unrecognized webhook payload: {e}"))
        })?;

        info!(
            event_id = %stored.id,
            event = %payload.event_name(),
            entity = payload.data.kind(),
            entity_id = payload.data.id(),
            "Webhook accepted"
        );

        self.dispatcher.dispatch(ReconcileJob::Webhook {
            raw_event_id: stored.id,
            payload,
        })?;

        Ok(WebhookAck {
            received: true,
            event_id: stored.id,
        })
    }

    /// Re-dispatches a stored event, e.g. after a resolution failure was fixed.
    ///
    /// The operator signs the event id with the webhook secret.
    #[instrument(skip(self, signature))]
    pub async fn replay(&self, event_id: Uuid, signature: Option<&str>) -> AppResult<WebhookAck> {
        let id = event_id.to_string();
        let authorized = signature
            .is_some_and(|s| verify_signature(self.secret.expose_secret(), id.as_bytes(), s.trim()));
        if !authorized {
            warn!(%event_id, "Replay request with bad signature");
            return Err(AppError::InvalidSignature);
        }

        let stored = self
            .events
            .get_by_id(event_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let payload: WebhookPayload = serde_json::from_str(&stored.payload)
            .map_err(|e| AppError::InvalidInput(format!("Unrecognized webhook payload: {e}")))?;

        self.dispatcher.dispatch(ReconcileJob::Webhook {
            raw_event_id: stored.id,
            payload,
        })?;
        info!(%event_id, "Webhook replayed");

        Ok(WebhookAck {
            received: true,
            event_id: stored.id,
        })
    }
}
