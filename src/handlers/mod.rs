use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::services::checkout::CheckoutService;
use crate::services::order_status::OrderStatusService;
use crate::AppState;

pub mod checkout;
pub mod health;
pub mod orders;
pub mod payment_webhooks;

/// Services shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
    pub order_status: Arc<OrderStatusService>,
}

impl AppServices {
    pub fn new(checkout: CheckoutService, order_status: OrderStatusService) -> Self {
        Self {
            checkout: Arc::new(checkout),
            order_status: Arc::new(order_status),
        }
    }
}

/// Versioned API routes, nested under `/api/v1` by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout::create_checkout))
        .route("/payments/webhook", post(payment_webhooks::payment_webhook))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", get(orders::get_order_status))
        .route("/orders/:id/ship", post(orders::ship_order))
        .route("/orders/:id/deliver", post(orders::deliver_order))
}
