//! In-memory mocks for payments, raw webhooks, the queue and the provider.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            billing_provider::BillingProvider,
            reconcile_queue::{ReconcileDispatcher, ReconcileJob},
        },
        use_cases::{reconciler::PaymentRepoTrait, webhook_ingest::WebhookEventRepoTrait},
    },
    domain::entities::{
        lemonsqueezy::{
            Customer, LicenseMeta, LicenseValidation, Order, Price, Subscription,
            ValidatedLicenseKey,
        },
        payment::NewPayment,
        webhook::WebhookEventProfile,
    },
};

use super::factories::TEST_PRODUCT_ID;

// ============================================================================
// InMemoryPaymentRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPaymentRepo {
    payments: Mutex<Vec<NewPayment>>,
}

impl InMemoryPaymentRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<NewPayment> {
        self.payments.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentRepoTrait for InMemoryPaymentRepo {
    async fn create_payment(&self, payment: &NewPayment) -> AppResult<bool> {
        let mut payments = self.payments.lock().unwrap();
        if payments.iter().any(|p| p.invoice_id == payment.invoice_id) {
            return Ok(false);
        }
        payments.push(payment.clone());
        Ok(true)
    }
}

// ============================================================================
// InMemoryWebhookEventRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryWebhookEventRepo {
    events: Mutex<Vec<WebhookEventProfile>>,
    failing: AtomicBool,
}

impl InMemoryWebhookEventRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<WebhookEventProfile> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl WebhookEventRepoTrait for InMemoryWebhookEventRepo {
    async fn create(&self, payload: &str, signature: &str) -> AppResult<WebhookEventProfile> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Database("connection refused".into()));
        }
        let event = WebhookEventProfile {
            id: Uuid::new_v4(),
            payload: payload.to_string(),
            signature: signature.to_string(),
            received_at: Utc::now(),
        };
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<WebhookEventProfile>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }
}

// ============================================================================
// RecordingDispatcher
// ============================================================================

/// Records dispatched jobs instead of running them.
#[derive(Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<ReconcileJob>>,
    closed: bool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher whose queue is gone; every dispatch fails.
    pub fn closed() -> Self {
        Self {
            jobs: Mutex::new(vec![]),
            closed: true,
        }
    }

    pub fn jobs(&self) -> Vec<ReconcileJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl ReconcileDispatcher for RecordingDispatcher {
    fn dispatch(&self, job: ReconcileJob) -> AppResult<()> {
        if self.closed {
            return Err(AppError::QueueUnavailable);
        }
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

// ============================================================================
// FakeBillingProvider
// ============================================================================

/// Scripted provider. Unknown ids answer 404 like the real API.
#[derive(Default)]
pub struct FakeBillingProvider {
    prices: HashMap<i64, Price>,
    customers: HashMap<i64, Customer>,
    orders: HashMap<i64, Vec<Order>>,
    subscriptions: HashMap<i64, Vec<Subscription>>,
    licenses: HashMap<String, LicenseValidation>,
    order_item_subscriptions: HashMap<i64, Subscription>,
    failing: bool,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, price: Price) -> Self {
        self.prices.insert(price.attributes.variant_id, price);
        self
    }

    /// Customer ids are numeric strings on the wire.
    pub fn with_customer(mut self, customer: Customer) -> Self {
        let id = customer.id.parse().expect("test customer id must be numeric");
        self.customers.insert(id, customer);
        self
    }

    pub fn with_orders(mut self, customer_id: i64, orders: Vec<Order>) -> Self {
        self.orders.insert(customer_id, orders);
        self
    }

    pub fn with_subscriptions(mut self, customer_id: i64, subscriptions: Vec<Subscription>) -> Self {
        self.subscriptions.insert(customer_id, subscriptions);
        self
    }

    pub fn with_license(
        mut self,
        license_key: &str,
        order_item_id: i64,
        variant_id: Option<i64>,
        active: bool,
    ) -> Self {
        let status = if active { "active" } else { "expired" };
        self.licenses.insert(
            license_key.to_string(),
            LicenseValidation {
                valid: active,
                error: (!active).then(|| "license_key is expired".to_string()),
                license_key: ValidatedLicenseKey {
                    status: status.to_string(),
                },
                meta: LicenseMeta {
                    order_item_id,
                    product_id: Some(TEST_PRODUCT_ID),
                    variant_id,
                    customer_id: None,
                },
            },
        );
        self
    }

    pub fn with_order_item_subscription(
        mut self,
        order_item_id: i64,
        subscription: Subscription,
    ) -> Self {
        self.order_item_subscriptions
            .insert(order_item_id, subscription);
        self
    }

    /// Every call answers 503.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, name: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| *c == name)
    }

    fn record(&self, name: &'static str) -> AppResult<()> {
        self.calls.lock().unwrap().push(name);
        if self.failing {
            return Err(AppError::Provider {
                status: 503,
                message: "service unavailable".into(),
            });
        }
        Ok(())
    }
}

fn not_found(what: impl std::fmt::Display) -> AppError {
    AppError::Provider {
        status: 404,
        message: format!("{what} not found"),
    }
}

#[async_trait]
impl BillingProvider for FakeBillingProvider {
    async fn validate_license(
        &self,
        license_key: &str,
        _instance_id: &str,
    ) -> AppResult<LicenseValidation> {
        self.record("validate_license")?;
        Ok(self
            .licenses
            .get(license_key)
            .cloned()
            .unwrap_or_else(|| LicenseValidation {
                valid: false,
                error: Some("license_key not found.".into()),
                license_key: ValidatedLicenseKey {
                    status: "inactive".into(),
                },
                meta: LicenseMeta {
                    order_item_id: 0,
                    product_id: None,
                    variant_id: None,
                    customer_id: None,
                },
            }))
    }

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<Subscription> {
        self.record("get_subscription")?;
        self.subscriptions
            .values()
            .flatten()
            .chain(self.order_item_subscriptions.values())
            .find(|s| s.id == subscription_id)
            .cloned()
            .ok_or_else(|| not_found(format!("subscription {subscription_id}")))
    }

    async fn find_subscription_by_order_item(
        &self,
        order_item_id: i64,
    ) -> AppResult<Option<Subscription>> {
        self.record("find_subscription_by_order_item")?;
        Ok(self.order_item_subscriptions.get(&order_item_id).cloned())
    }

    async fn list_orders(&self, customer_id: i64) -> AppResult<Vec<Order>> {
        self.record("list_orders")?;
        Ok(self.orders.get(&customer_id).cloned().unwrap_or_default())
    }

    async fn list_subscriptions(&self, customer_id: i64) -> AppResult<Vec<Subscription>> {
        self.record("list_subscriptions")?;
        Ok(self
            .subscriptions
            .get(&customer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_customer(&self, customer_id: i64) -> AppResult<Customer> {
        self.record("get_customer")?;
        self.customers
            .get(&customer_id)
            .cloned()
            .ok_or_else(|| not_found(format!("customer {customer_id}")))
    }

    async fn find_customer_by_email(&self, email: &str) -> AppResult<Option<Customer>> {
        self.record("find_customer_by_email")?;
        Ok(self
            .customers
            .values()
            .find(|c| c.attributes.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_variant_price(&self, variant_id: i64) -> AppResult<Price> {
        self.record("get_variant_price")?;
        self.prices
            .get(&variant_id)
            .cloned()
            .ok_or_else(|| not_found(format!("price for variant {variant_id}")))
    }
}
