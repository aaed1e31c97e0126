//! Outbound client for the external payment processor.
//!
//! The processor mints a redirectable checkout session ("preference") for a
//! cart and later reports payment outcomes through webhooks handled in
//! `handlers::payment_webhooks`. Only intent issuance lives here; the
//! gateway holds no order state.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::errors::ServiceError;

/// One cart line as the processor expects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub quantity: i32,
    pub currency_id: String,
    pub unit_price: Decimal,
}

/// Checkout-session request. `external_reference` carries the order id and
/// is round-tripped by the processor in its webhook notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceRequest {
    pub external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
    pub items: Vec<PreferenceItem>,
}

/// Processor-side session: its id plus the URL the client is redirected to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutPreference {
    pub id: String,
    pub init_point: String,
}

/// Capability for minting checkout sessions; injected into the checkout
/// service so tests can substitute a stub.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<CheckoutPreference, ServiceError>;
}

/// HTTP implementation talking to the real processor.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpPaymentGateway {
    /// The timeout is enforced by the underlying client on every call;
    /// a timed-out call surfaces as an upstream error, never as success.
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to build payment client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(external_reference = %request.external_reference))]
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<CheckoutPreference, ServiceError> {
        let url = format!("{}/checkout/preferences", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "checkout preference request failed");
                ServiceError::ExternalServiceError(format!(
                    "payment processor unreachable: {e}"
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "payment processor rejected preference");
            return Err(ServiceError::ExternalServiceError(format!(
                "payment processor returned {status}"
            )));
        }

        response.json::<CheckoutPreference>().await.map_err(|e| {
            error!(error = %e, "could not decode preference response");
            ServiceError::ExternalServiceError(format!("invalid preference response: {e}"))
        })
    }
}
