use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{billing_provider::BillingProvider, reconcile_queue::ReconcileJob},
        use_cases::{usage_ledger::UsageLedger, user::UserRepoTrait},
    },
    domain::entities::{
        lemonsqueezy::{OrderAttributes, SubscriptionAttributes, SubscriptionInvoiceAttributes},
        payment::NewPayment,
        user::{BillingUpdate, Tier, User},
        webhook::{EventName, WebhookEntity, WebhookPayload},
    },
};

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait PaymentRepoTrait: Send + Sync {
    /// Stores the payment unless one with the same invoice id exists.
    /// Returns whether a row was inserted.
    async fn create_payment(&self, payment: &NewPayment) -> AppResult<bool>;
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The event was applied to the stored user in place.
    Applied { user_id: Uuid, tier: Tier },
    /// Local state was overwritten from the provider's live view.
    Rebuilt { user_id: Uuid, tier: Tier },
    /// The event required no change.
    Unchanged { user_id: Option<Uuid> },
    PaymentRecorded {
        user_id: Option<Uuid>,
        duplicate: bool,
    },
    /// The event belongs to a different product.
    Skipped,
}

impl ReconcileOutcome {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            ReconcileOutcome::Applied { user_id, .. } | ReconcileOutcome::Rebuilt { user_id, .. } => {
                Some(*user_id)
            }
            ReconcileOutcome::Unchanged { user_id } | ReconcileOutcome::PaymentRecorded { user_id, .. } => {
                *user_id
            }
            ReconcileOutcome::Skipped => None,
        }
    }
}

/// Strongest proof of entitlement found at the provider.
#[derive(Debug, Clone, PartialEq)]
enum Evidence {
    None,
    Subscription {
        customer_id: i64,
        subscription_id: String,
        variant_id: i64,
        until: DateTime<Utc>,
    },
    Lifetime {
        customer_id: i64,
        variant_id: i64,
    },
}

impl Evidence {
    fn rank(&self) -> u8 {
        match self {
            Evidence::None => 0,
            Evidence::Subscription { .. } => 1,
            Evidence::Lifetime { .. } => 2,
        }
    }

    /// Lifetime beats subscriptions; among subscriptions the longest lasting wins.
    fn stronger(self, other: Evidence) -> Evidence {
        match (&self, &other) {
            (
                Evidence::Subscription { until: a, .. },
                Evidence::Subscription { until: b, .. },
            ) => {
                if b > a {
                    other
                } else {
                    self
                }
            }
            _ if other.rank() > self.rank() => other,
            _ => self,
        }
    }

    fn into_update(self, fallback_customer: Option<i64>) -> BillingUpdate {
        match self {
            Evidence::None => BillingUpdate::free(fallback_customer),
            Evidence::Subscription {
                customer_id,
                subscription_id,
                variant_id,
                until,
            } => BillingUpdate::premium(Some(customer_id), subscription_id, variant_id, until),
            Evidence::Lifetime {
                customer_id,
                variant_id,
            } => BillingUpdate::lifetime(Some(customer_id), variant_id),
        }
    }
}

fn mismatch(user_id: Uuid, detail: impl Into<String>) -> AppError {
    AppError::SubscriptionMismatch {
        user_id,
        detail: detail.into(),
    }
}

fn standing_for(id: &str, attrs: &SubscriptionAttributes, now: DateTime<Utc>) -> BillingUpdate {
    if attrs.is_entitled_at(now) {
        BillingUpdate::premium(
            Some(attrs.customer_id),
            id.to_string(),
            attrs.variant_id,
            attrs.entitled_until(),
        )
    } else {
        BillingUpdate::free(Some(attrs.customer_id))
    }
}

// ============================================================================
// Use Cases
// ============================================================================

/// Applies provider events to local billing state and repairs it from the
/// provider when the two disagree.
#[derive(Clone)]
pub struct SubscriptionReconciler {
    users: Arc<dyn UserRepoTrait>,
    payments: Arc<dyn PaymentRepoTrait>,
    provider: Arc<dyn BillingProvider>,
    ledger: Arc<UsageLedger>,
    product_id: i64,
}

impl SubscriptionReconciler {
    pub fn new(
        users: Arc<dyn UserRepoTrait>,
        payments: Arc<dyn PaymentRepoTrait>,
        provider: Arc<dyn BillingProvider>,
        ledger: Arc<UsageLedger>,
        product_id: i64,
    ) -> Self {
        Self {
            users,
            payments,
            provider,
            ledger,
            product_id,
        }
    }

    /// Entry point of background workers.
    pub async fn handle(&self, job: &ReconcileJob) -> AppResult<ReconcileOutcome> {
        match job {
            ReconcileJob::Webhook { payload, .. } => self.process(payload).await,
            ReconcileJob::LinkExisting { user_id } => {
                let user = self.rebuild_user(*user_id, None).await?;
                self.ledger.revalidate_user(user.id).await?;
                Ok(ReconcileOutcome::Rebuilt {
                    user_id: user.id,
                    tier: user.tier,
                })
            }
        }
    }

    #[instrument(
        skip(self, payload),
        fields(event = %payload.event_name(), entity = payload.data.kind(), entity_id = payload.data.id())
    )]
    pub async fn process(&self, payload: &WebhookPayload) -> AppResult<ReconcileOutcome> {
        if let Some(product_id) = payload.data.product_id()
            && product_id != self.product_id
        {
            warn!(product_id, "Ignoring webhook for another product");
            return Ok(ReconcileOutcome::Skipped);
        }

        let outcome = match self.apply(payload).await {
            Ok(outcome) => outcome,
            Err(AppError::SubscriptionMismatch { user_id, detail }) => {
                warn!(%user_id, %detail, "Webhook contradicts stored subscription, rebuilding");
                let customer_hint = self.live_customer_hint(payload).await;
                let user = self.rebuild_user(user_id, Some(customer_hint)).await?;
                ReconcileOutcome::Rebuilt {
                    user_id,
                    tier: user.tier,
                }
            }
            Err(e) => return Err(e),
        };

        if let Some(user_id) = outcome.user_id() {
            self.ledger.revalidate_user(user_id).await?;
        }
        info!(?outcome, "Webhook reconciled");
        Ok(outcome)
    }

    async fn apply(&self, payload: &WebhookPayload) -> AppResult<ReconcileOutcome> {
        let event = payload.event_name();
        match &payload.data {
            WebhookEntity::Order { attributes, .. } => match event {
                EventName::OrderCreated => self.on_order_created(payload, attributes).await,
                EventName::OrderRefunded => self.on_order_refunded(payload, attributes).await,
                _ => self.on_unrecognized(payload).await,
            },
            WebhookEntity::Subscription { id, attributes } => match event {
                EventName::SubscriptionCreated => {
                    self.on_subscription_created(payload, id, attributes).await
                }
                EventName::SubscriptionUpdated => {
                    self.on_subscription_updated(payload, id, attributes).await
                }
                EventName::SubscriptionCancelled => {
                    self.on_subscription_cancelled(payload, id, attributes).await
                }
                _ => self.on_unrecognized(payload).await,
            },
            WebhookEntity::SubscriptionInvoice { id, attributes } => match event {
                EventName::SubscriptionPaymentSuccess => {
                    self.on_payment_success(payload, id, attributes).await
                }
                _ => self.on_unrecognized(payload).await,
            },
            WebhookEntity::LicenseKey { .. } => self.on_unrecognized(payload).await,
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    async fn on_order_created(
        &self,
        payload: &WebhookPayload,
        order: &OrderAttributes,
    ) -> AppResult<ReconcileOutcome> {
        let variant_id = order.first_order_item.variant_id;
        let price = self.provider.get_variant_price(variant_id).await?;
        if !price.attributes.is_lifetime() {
            debug!(variant_id, "Subscription order, waiting for subscription_created");
            return Ok(ReconcileOutcome::Unchanged { user_id: None });
        }

        let user = self.resolve_user(payload).await?;
        if !order.is_settled() {
            warn!(user_id = %user.id, status = %order.status, "Lifetime order is not paid yet");
            return Ok(ReconcileOutcome::Unchanged {
                user_id: Some(user.id),
            });
        }

        self.write(&user, BillingUpdate::lifetime(Some(order.customer_id), variant_id))
            .await
    }

    async fn on_order_refunded(
        &self,
        payload: &WebhookPayload,
        order: &OrderAttributes,
    ) -> AppResult<ReconcileOutcome> {
        let user = self.resolve_user(payload).await?;
        let variant_id = order.first_order_item.variant_id;
        if user.variant_id != Some(variant_id) {
            return Err(mismatch(
                user.id,
                format!("refund for variant {variant_id}, stored {:?}", user.variant_id),
            ));
        }

        self.write(&user, BillingUpdate::free(Some(order.customer_id)))
            .await
    }

    async fn on_subscription_created(
        &self,
        payload: &WebhookPayload,
        subscription_id: &str,
        attrs: &SubscriptionAttributes,
    ) -> AppResult<ReconcileOutcome> {
        let user = self.resolve_user(payload).await?;
        if user.tier == Tier::Lifetime {
            return Err(mismatch(user.id, "subscription created for a lifetime user"));
        }
        if let Some(stored) = user.subscription_id.as_deref()
            && stored != subscription_id
        {
            return Err(mismatch(
                user.id,
                format!("created {subscription_id}, stored {stored}"),
            ));
        }

        self.write(&user, standing_for(subscription_id, attrs, Utc::now()))
            .await
    }

    async fn on_subscription_updated(
        &self,
        payload: &WebhookPayload,
        subscription_id: &str,
        attrs: &SubscriptionAttributes,
    ) -> AppResult<ReconcileOutcome> {
        let user = self.resolve_user(payload).await?;
        self.ensure_matches(&user, subscription_id, attrs)?;

        self.write(&user, standing_for(subscription_id, attrs, Utc::now()))
            .await
    }

    async fn on_subscription_cancelled(
        &self,
        payload: &WebhookPayload,
        subscription_id: &str,
        attrs: &SubscriptionAttributes,
    ) -> AppResult<ReconcileOutcome> {
        let user = self.resolve_user(payload).await?;
        self.ensure_matches(&user, subscription_id, attrs)?;

        let ends_at = attrs.entitled_until();
        if user.premium_until == Some(ends_at) {
            return Ok(ReconcileOutcome::Unchanged {
                user_id: Some(user.id),
            });
        }

        let updated = self.users.set_premium_until(user.id, ends_at).await?;
        info!(user_id = %updated.id, %ends_at, "Subscription cancelled, access ends at period end");
        Ok(ReconcileOutcome::Applied {
            user_id: updated.id,
            tier: updated.tier,
        })
    }

    async fn on_payment_success(
        &self,
        payload: &WebhookPayload,
        invoice_id: &str,
        invoice: &SubscriptionInvoiceAttributes,
    ) -> AppResult<ReconcileOutcome> {
        let (user_id, email) = match self.resolve_user(payload).await {
            Ok(user) => (Some(user.id), None),
            Err(AppError::UserNotResolved(reason)) => {
                warn!(%reason, invoice_id, "Invoice has no local user, recording by customer email");
                let customer = self.provider.get_customer(invoice.customer_id).await?;
                (None, Some(customer.attributes.email))
            }
            Err(e) => return Err(e),
        };

        let payment = NewPayment {
            invoice_id: invoice_id.to_string(),
            user_id,
            email,
            provider_subscription_id: invoice.subscription_id.to_string(),
            provider_customer_id: invoice.customer_id,
            billing_reason: invoice.billing_reason.clone(),
            status: invoice.status.clone(),
            currency: invoice.currency.clone(),
            total: invoice.total,
            subtotal: invoice.subtotal,
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        };
        let inserted = self.payments.create_payment(&payment).await?;
        if !inserted {
            info!(invoice_id, "Payment already recorded");
        }

        Ok(ReconcileOutcome::PaymentRecorded {
            user_id,
            duplicate: !inserted,
        })
    }

    async fn on_unrecognized(&self, payload: &WebhookPayload) -> AppResult<ReconcileOutcome> {
        warn!(
            event = %payload.event_name(),
            entity = payload.data.kind(),
            "Unhandled webhook, rebuilding as a precaution"
        );
        let user = self.resolve_user(payload).await?;
        let rebuilt = self
            .rebuild_user(user.id, Some(payload.data.customer_id()))
            .await?;
        Ok(ReconcileOutcome::Rebuilt {
            user_id: rebuilt.id,
            tier: rebuilt.tier,
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// `custom_data.user_id` first, then the provider customer link.
    async fn resolve_user(&self, payload: &WebhookPayload) -> AppResult<User> {
        if let Some(raw) = payload.custom_user_id() {
            match Uuid::parse_str(raw) {
                Ok(user_id) => match self.users.get_user(user_id).await? {
                    Some(user) => return Ok(user),
                    None => warn!(%user_id, "custom_data user does not exist"),
                },
                Err(_) => warn!(user_id = raw, "custom_data user_id is not a uuid"),
            }
        }

        let customer_id = payload.data.customer_id();
        self.users
            .get_user_by_provider_customer_id(customer_id)
            .await?
            .ok_or_else(|| AppError::UserNotResolved(format!("provider customer {customer_id}")))
    }

    /// Customer owning the event's subscription according to the provider,
    /// falling back to the payload's copy.
    async fn live_customer_hint(&self, payload: &WebhookPayload) -> i64 {
        if let WebhookEntity::Subscription { id, attributes } = &payload.data {
            match self.provider.get_subscription(id).await {
                Ok(live) => {
                    if live.attributes.customer_id != attributes.customer_id {
                        warn!(
                            subscription_id = %id,
                            event_customer = attributes.customer_id,
                            live_customer = live.attributes.customer_id,
                            "Event customer differs from provider"
                        );
                    }
                    return live.attributes.customer_id;
                }
                Err(e) => {
                    debug!(subscription_id = %id, error = %e, "Live subscription lookup failed")
                }
            }
        }
        payload.data.customer_id()
    }

    fn ensure_matches(
        &self,
        user: &User,
        subscription_id: &str,
        attrs: &SubscriptionAttributes,
    ) -> AppResult<()> {
        if user.subscription_id.as_deref() != Some(subscription_id)
            || user.variant_id != Some(attrs.variant_id)
        {
            return Err(mismatch(
                user.id,
                format!(
                    "event {subscription_id}/{}, stored {:?}/{:?}",
                    attrs.variant_id, user.subscription_id, user.variant_id
                ),
            ));
        }
        Ok(())
    }

    async fn write(&self, user: &User, update: BillingUpdate) -> AppResult<ReconcileOutcome> {
        if update.is_reflected_in(user) {
            return Ok(ReconcileOutcome::Unchanged {
                user_id: Some(user.id),
            });
        }

        let updated = self.users.update_billing(user.id, &update).await?;
        info!(user_id = %updated.id, from = %user.tier, to = %updated.tier, "Billing state updated");
        Ok(ReconcileOutcome::Applied {
            user_id: updated.id,
            tier: updated.tier,
        })
    }

    // ========================================================================
    // Rebuild
    // ========================================================================

    /// Overwrites the user's billing state with what the provider reports now.
    ///
    /// Considers the stored customer and `customer_hint`; without either the
    /// customer is looked up by the user's email.
    #[instrument(skip(self))]
    pub async fn rebuild_user(&self, user_id: Uuid, customer_hint: Option<i64>) -> AppResult<User> {
        let user = self.users.get_user(user_id).await?.ok_or(AppError::NotFound)?;

        let mut customers: Vec<i64> = [user.provider_customer_id, customer_hint]
            .into_iter()
            .flatten()
            .collect();
        customers.dedup();

        if customers.is_empty()
            && let Some(customer) = self.provider.find_customer_by_email(&user.email).await?
        {
            let id = customer.id.parse::<i64>().map_err(|_| AppError::Provider {
                status: 200,
                message: format!("non-numeric customer id {}", customer.id),
            })?;
            customers.push(id);
        }

        let now = Utc::now();
        let mut evidence = Evidence::None;
        for customer_id in &customers {
            let customer = self.provider.get_customer(*customer_id).await?;
            debug!(customer_id, customer = %customer.id, "Collecting provider evidence");
            evidence = evidence.stronger(self.classify_customer(*customer_id, now).await?);
        }

        let update = evidence.into_update(customers.first().copied());
        if update.is_reflected_in(&user) {
            debug!(%user_id, "Rebuild confirmed stored state");
            return Ok(user);
        }

        let updated = self.users.update_billing(user_id, &update).await?;
        info!(%user_id, from = %user.tier, to = %updated.tier, "Rebuilt billing state from provider");
        Ok(updated)
    }

    async fn classify_customer(&self, customer_id: i64, now: DateTime<Utc>) -> AppResult<Evidence> {
        let (orders, subscriptions) = tokio::try_join!(
            self.provider.list_orders(customer_id),
            self.provider.list_subscriptions(customer_id)
        )?;

        let mut checked = HashSet::new();
        for order in orders.iter().filter(|o| {
            o.attributes.is_settled() && o.attributes.first_order_item.product_id == self.product_id
        }) {
            let variant_id = order.attributes.first_order_item.variant_id;
            if !checked.insert(variant_id) {
                continue;
            }
            if self
                .provider
                .get_variant_price(variant_id)
                .await?
                .attributes
                .is_lifetime()
            {
                return Ok(Evidence::Lifetime {
                    customer_id,
                    variant_id,
                });
            }
        }

        Ok(subscriptions
            .into_iter()
            .filter(|s| s.attributes.product_id == self.product_id && s.attributes.is_entitled_at(now))
            .fold(Evidence::None, |best, s| {
                best.stronger(Evidence::Subscription {
                    customer_id,
                    variant_id: s.attributes.variant_id,
                    until: s.attributes.entitled_until(),
                    subscription_id: s.id,
                })
            }))
    }

    // ========================================================================
    // License pairing
    // ========================================================================

    /// Links a license key bought outside the app to the user.
    /// Returns whether the user ends up premium.
    #[instrument(skip(self, license_key))]
    pub async fn apply_license(
        &self,
        user_id: Uuid,
        license_key: &str,
        instance_id: &str,
    ) -> AppResult<bool> {
        let user = self.users.get_user(user_id).await?.ok_or(AppError::NotFound)?;

        let validation = self.provider.validate_license(license_key, instance_id).await?;
        if !validation.is_usable() {
            info!(%user_id, error = ?validation.error, "Submitted license is not active");
            return Ok(false);
        }
        if let Some(product_id) = validation.meta.product_id
            && product_id != self.product_id
        {
            warn!(%user_id, product_id, "License belongs to another product");
            return Ok(false);
        }
        if user.tier == Tier::Lifetime {
            return Ok(true);
        }

        let now = Utc::now();
        let update = match self
            .provider
            .find_subscription_by_order_item(validation.meta.order_item_id)
            .await?
        {
            Some(subscription) if subscription.attributes.is_entitled_at(now) => {
                standing_for(&subscription.id, &subscription.attributes, now)
            }
            Some(_) => return Ok(false),
            None => {
                let variant_id = validation.meta.variant_id.ok_or_else(|| {
                    AppError::InvalidInput("License carries no variant".into())
                })?;
                let price = self.provider.get_variant_price(variant_id).await?;
                if !price.attributes.is_lifetime() {
                    return Ok(false);
                }
                BillingUpdate::lifetime(validation.meta.customer_id, variant_id)
            }
        };

        self.write(&user, update).await?;
        self.ledger.revalidate_user(user_id).await?;
        Ok(true)
    }
}
