use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{PaymentGateway, PreferenceItem, PreferenceRequest},
    services::order_status::OrderStatus,
    store::{NewOrder, NewOrderItem, OrderStore},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    #[validate(length(min = 1, message = "Product reference is required"))]
    pub product_id: String,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[validate(length(min = 3, max = 3, message = "Currency must be 3 characters"))]
    pub currency: String,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "Cart must contain at least one item"))]
    pub items: Vec<CheckoutItem>,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub freight_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub preference_id: String,
    pub checkout_url: String,
}

/// Issues payment intents: one fresh order per call, then a checkout
/// session minted by the external processor with the order id as the
/// external reference. No idempotency at this layer; dedup happens
/// downstream at reconciliation.
#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<EventSender>,
    notification_url: Option<String>,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<EventSender>,
        notification_url: Option<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            event_sender,
            notification_url,
        }
    }

    #[instrument(skip(self, request), fields(user_id = %user_id, items = request.items.len()))]
    pub async fn create_checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        self.validate_request(&request)?;

        let currency = request.items[0].currency.to_uppercase();
        let items_total: Decimal = request
            .items
            .iter()
            .map(|item| item.unit_price * Decimal::from(item.quantity))
            .sum();
        let total_amount = items_total + request.freight_amount;

        let order_id = Uuid::new_v4();
        let record = self
            .store
            .create(NewOrder {
                id: order_id,
                user_id,
                currency,
                payment_method: request.payment_method.clone(),
                freight_amount: request.freight_amount,
                total_amount,
                items: request
                    .items
                    .iter()
                    .map(|item| NewOrderItem {
                        product_id: item.product_id.clone(),
                        name: item.title.clone(),
                        quantity: item.quantity,
                        unit_price: item.unit_price,
                    })
                    .collect(),
            })
            .await?;

        let preference_request = PreferenceRequest {
            external_reference: order_id.to_string(),
            notification_url: self.notification_url.clone(),
            items: request
                .items
                .iter()
                .map(|item| PreferenceItem {
                    id: item.product_id.clone(),
                    title: item.title.clone(),
                    quantity: item.quantity,
                    currency_id: item.currency.to_uppercase(),
                    unit_price: item.unit_price,
                })
                .collect(),
        };

        let preference = match self.gateway.create_preference(&preference_request).await {
            Ok(preference) => preference,
            Err(err) => {
                // The row already exists so the session request could carry
                // its id; park it in a clearly-abandoned state rather than
                // leaving it ambiguous. A fresh checkout is always safe.
                warn!(order_id = %order_id, error = %err, "abandoning order after processor failure");
                if let Err(abandon_err) = self
                    .store
                    .transition(order_id, OrderStatus::Pending, OrderStatus::Cancelled)
                    .await
                {
                    error!(
                        order_id = %order_id,
                        error = %abandon_err,
                        "failed to abandon order after processor failure"
                    );
                }
                return Err(err);
            }
        };

        self.store
            .set_payment_reference(order_id, &preference.id)
            .await?;

        info!(
            order_id = %order_id,
            preference_id = %preference.id,
            total = %record.order.total_amount,
            "checkout intent issued"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::OrderCreated(order_id)).await {
                warn!(error = %e, order_id = %order_id, "failed to send order created event");
            }
        }

        Ok(CheckoutResponse {
            order_id,
            preference_id: preference.id,
            checkout_url: preference.init_point,
        })
    }

    fn validate_request(&self, request: &CheckoutRequest) -> Result<(), ServiceError> {
        request.validate()?;

        for item in &request.items {
            item.validate()?;
            if item.unit_price <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Unit price for '{}' must be positive",
                    item.product_id
                )));
            }
        }

        if request.freight_amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Freight amount cannot be negative".to_string(),
            ));
        }

        let currency = &request.items[0].currency;
        if request
            .items
            .iter()
            .any(|item| !item.currency.eq_ignore_ascii_case(currency))
        {
            return Err(ServiceError::ValidationError(
                "All cart lines must share one currency".to_string(),
            ));
        }

        Ok(())
    }
}
