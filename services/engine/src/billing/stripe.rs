//! Stripe invoice status client.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use hostpool_id::InvoiceId;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, error};

use super::{BillingError, BillingProvider};

/// Billing provider configuration.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Base URL of the provider API.
    pub api_url: String,

    /// Secret API key.
    pub api_key: String,

    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl BillingConfig {
    pub const DEFAULT_API_URL: &'static str = "https://api.stripe.com";

    /// Load from `HOSTPOOL_BILLING_API_URL` and `HOSTPOOL_BILLING_API_KEY`.
    ///
    /// Live keys are refused unless `production` is set.
    pub fn from_env(production: bool) -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), production)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        production: bool,
    ) -> anyhow::Result<Self> {
        let api_url = lookup("HOSTPOOL_BILLING_API_URL")
            .unwrap_or_else(|| Self::DEFAULT_API_URL.to_string());
        let api_key =
            lookup("HOSTPOOL_BILLING_API_KEY").context("HOSTPOOL_BILLING_API_KEY must be set")?;

        Self::new(api_url, api_key, production)
    }

    pub fn new(api_url: String, api_key: String, production: bool) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            bail!("billing API key is empty");
        }
        if !production && !api_key.starts_with("sk_test_") {
            bail!("refusing a live billing API key outside production mode");
        }

        Ok(Self {
            api_url,
            api_key,
            request_timeout: Duration::from_secs(10),
        })
    }
}

#[derive(Debug, Deserialize)]
struct InvoiceBody {
    #[serde(default)]
    status: Option<String>,
}

/// Reads invoice status from the Stripe REST API.
#[derive(Debug, Clone)]
pub struct StripeInvoiceClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl StripeInvoiceClient {
    pub fn new(config: &BillingConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl BillingProvider for StripeInvoiceClient {
    async fn invoice_status(&self, id: &InvoiceId) -> Result<Option<String>, BillingError> {
        let url = format!("{}/v1/invoices/{}", self.api_url, id);
        debug!(invoice_id = %id, "Fetching invoice status");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BillingError::Unreachable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(invoice_id = %id, "Invoice not found at provider");
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Failed to fetch invoice");
            return Err(if status.is_server_error() {
                BillingError::Unreachable(format!("{status}"))
            } else {
                BillingError::Unexpected(format!("{status} - {body}"))
            });
        }

        let body: InvoiceBody = response
            .json()
            .await
            .map_err(|e| BillingError::Unexpected(e.to_string()))?;

        // a null status reads the same as a missing invoice
        Ok(Some(body.status.unwrap_or_default()))
    }
}
