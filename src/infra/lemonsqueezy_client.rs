use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, header::ACCEPT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::{Origin, Url};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::BillingProvider,
    domain::entities::lemonsqueezy::{
        Customer, Document, LicenseValidation, Order, Price, Resource, Subscription,
    },
};

const JSON_API: &str = "application/vnd.api+json";
const PAGE_SIZE: &str = "100";
/// Upper bound on followed `links.next` per listing.
const MAX_PAGES: usize = 50;
const MAX_ERROR_BODY_LEN: usize = 500;

#[derive(Debug, Deserialize)]
struct ListDocument<A> {
    data: Vec<Resource<A>>,
    #[serde(default)]
    links: Option<ListLinks>,
}

#[derive(Debug, Deserialize)]
struct ListLinks {
    #[serde(default)]
    next: Option<String>,
}

/// Thin request/response wrapper over the Lemon Squeezy REST API.
#[derive(Clone)]
pub struct LemonSqueezyClient {
    client: Client,
    base_url: String,
    origin: Origin,
    api_key: SecretString,
}

impl LemonSqueezyClient {
    pub fn new(client: Client, base_url: &Url, api_key: SecretString) -> Self {
        Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            origin: base_url.origin(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header(ACCEPT, JSON_API)
            .bearer_auth(self.api_key.expose_secret())
    }

    async fn fetch_one<A: for<'de> Deserialize<'de>>(&self, path: &str) -> AppResult<Resource<A>> {
        let response = self.get(&self.url(path)).send().await?;
        let document: Document<Resource<A>> = self.handle_response(response).await?;
        Ok(document.data)
    }

    /// Collects every page of a filtered listing.
    async fn list_all<A: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        filter: (&str, String),
    ) -> AppResult<Vec<Resource<A>>> {
        let first = self
            .get(&self.url(path))
            .query(&[(filter.0, filter.1.as_str()), ("page[size]", PAGE_SIZE)]);
        let mut page: ListDocument<A> = self.handle_response(first.send().await?).await?;
        let mut items = std::mem::take(&mut page.data);

        for _ in 1..MAX_PAGES {
            let Some(next) = page.links.and_then(|l| l.next) else {
                return Ok(items);
            };
            let next = self.same_origin(&next)?;
            page = self.handle_response(self.get(next.as_str()).send().await?).await?;
            items.append(&mut page.data);
        }

        tracing::warn!(path, pages = MAX_PAGES, "Provider listing truncated");
        Ok(items)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Pagination links carry the API key, so they must stay on the API origin.
    fn same_origin(&self, link: &str) -> AppResult<Url> {
        match Url::parse(link) {
            Ok(url) if url.origin() == self.origin => Ok(url),
            _ => {
                tracing::error!(link, "Provider pagination link leaves the API origin");
                Err(AppError::Provider {
                    status: 200,
                    message: format!("Refusing to follow pagination link {link}"),
                })
            }
        }
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Lemon Squeezy API error");
            return Err(AppError::Provider {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Lemon Squeezy response");
            AppError::Provider {
                status: status.as_u16(),
                message: format!("Unexpected response shape: {e}"),
            }
        })
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LEN {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[async_trait]
impl BillingProvider for LemonSqueezyClient {
    async fn validate_license(
        &self,
        license_key: &str,
        instance_id: &str,
    ) -> AppResult<LicenseValidation> {
        let response = self
            .client
            .post(self.url("licenses/validate"))
            .header(ACCEPT, "application/json")
            .form(&[("license_key", license_key), ("instance_id", instance_id)])
            .send()
            .await?;

        // Unknown or disabled keys come back as 4xx with the same body shape.
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<LicenseValidation>(&body) {
            Ok(validation) => Ok(validation),
            Err(e) => {
                tracing::error!(status = %status, body = %body, error = %e, "License validation failed");
                Err(AppError::Provider {
                    status: status.as_u16(),
                    message: truncate(&body),
                })
            }
        }
    }

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<Subscription> {
        self.fetch_one(&format!("subscriptions/{subscription_id}"))
            .await
    }

    async fn find_subscription_by_order_item(
        &self,
        order_item_id: i64,
    ) -> AppResult<Option<Subscription>> {
        let subscriptions = self
            .list_all(
                "subscriptions",
                ("filter[order_item_id]", order_item_id.to_string()),
            )
            .await?;
        Ok(subscriptions.into_iter().next())
    }

    async fn list_orders(&self, customer_id: i64) -> AppResult<Vec<Order>> {
        self.list_all("orders", ("filter[customer_id]", customer_id.to_string()))
            .await
    }

    async fn list_subscriptions(&self, customer_id: i64) -> AppResult<Vec<Subscription>> {
        self.list_all(
            "subscriptions",
            ("filter[customer_id]", customer_id.to_string()),
        )
        .await
    }

    async fn get_customer(&self, customer_id: i64) -> AppResult<Customer> {
        self.fetch_one(&format!("customers/{customer_id}")).await
    }

    async fn find_customer_by_email(&self, email: &str) -> AppResult<Option<Customer>> {
        let customers = self
            .list_all("customers", ("filter[email]", email.to_string()))
            .await?;
        Ok(customers.into_iter().next())
    }

    async fn get_variant_price(&self, variant_id: i64) -> AppResult<Price> {
        self.fetch_one(&format!("variants/{variant_id}/price-model"))
            .await
    }
}
