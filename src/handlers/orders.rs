use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::order_item;
use crate::errors::ServiceError;
use crate::services::order_status::{OrderStatus, ReconcileOutcome, StatusSignal};
use crate::store::OrderRecord;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub paid: bool,
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub product_id: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub paid: bool,
    pub payment_method: Option<String>,
    pub currency: String,
    pub total_amount: Decimal,
    pub freight_amount: Decimal,
    pub items: Vec<OrderItemView>,
    pub created_at: DateTime<Utc>,
}

fn parse_status(record: &OrderRecord) -> Result<OrderStatus, ServiceError> {
    record.order.status.parse().map_err(|_| {
        ServiceError::InternalError(format!(
            "order {} has unrecognized status '{}'",
            record.order.id, record.order.status
        ))
    })
}

/// Loads an order and enforces ownership against the stored user reference.
async fn load_owned_order(
    state: &AppState,
    auth: &AuthUser,
    order_id: Uuid,
) -> Result<OrderRecord, ServiceError> {
    let record = state
        .store
        .find(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    if record.order.user_id != auth.user_id {
        warn!(
            order_id = %order_id,
            caller = %auth.user_id,
            "order status requested by a non-owner"
        );
        return Err(ServiceError::Forbidden(
            "order belongs to another user".to_string(),
        ));
    }

    Ok(record)
}

fn map_item(model: &order_item::Model) -> OrderItemView {
    OrderItemView {
        product_id: model.product_id.clone(),
        name: model.name.clone(),
        quantity: model.quantity,
        unit_price: model.unit_price,
    }
}

// GET /api/v1/orders/{id}/status
//
// The client's only way to detect confirmation before (or instead of) a
// webhook arrival, so this reads the store directly with no caching.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Current order status", body = OrderStatusResponse),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderStatusResponse>, ServiceError> {
    let record = load_owned_order(&state, &auth, order_id).await?;
    let status = parse_status(&record)?;

    Ok(Json(OrderStatusResponse {
        order_id,
        status,
        paid: status.is_paid(),
        payment_method: record.order.payment_method,
    }))
}

// GET /api/v1/orders/{id}
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with line items", body = OrderResponse),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let record = load_owned_order(&state, &auth, order_id).await?;
    let status = parse_status(&record)?;

    Ok(Json(OrderResponse {
        order_id,
        status,
        paid: status.is_paid(),
        payment_method: record.order.payment_method.clone(),
        currency: record.order.currency.clone(),
        total_amount: record.order.total_amount,
        freight_amount: record.order.freight_amount,
        items: record.items.iter().map(map_item).collect(),
        created_at: record.order.created_at,
    }))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

async fn apply_fulfillment(
    state: &AppState,
    auth: &AuthUser,
    order_id: Uuid,
    signal: StatusSignal,
) -> Result<Json<FulfillmentResponse>, ServiceError> {
    if !auth.is_admin() {
        return Err(ServiceError::Forbidden(
            "administrator role required".to_string(),
        ));
    }

    match state
        .services
        .order_status
        .apply_signal(order_id, signal)
        .await?
    {
        ReconcileOutcome::Applied { to, .. } => Ok(Json(FulfillmentResponse {
            order_id,
            status: to,
        })),
        ReconcileOutcome::NoOp { current } => Err(ServiceError::InvalidOperation(format!(
            "order in status {} cannot take this transition",
            current
        ))),
        ReconcileOutcome::UnknownOrder => Err(ServiceError::NotFound(format!(
            "Order {} not found",
            order_id
        ))),
    }
}

// POST /api/v1/orders/{id}/ship
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/ship",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order marked shipped", body = FulfillmentResponse),
        (status = 400, description = "Transition not applicable", body = crate::errors::ErrorResponse),
        (status = 403, description = "Administrator role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn ship_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<FulfillmentResponse>, ServiceError> {
    apply_fulfillment(&state, &auth, order_id, StatusSignal::MarkShipped).await
}

// POST /api/v1/orders/{id}/deliver
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/deliver",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order marked delivered", body = FulfillmentResponse),
        (status = 400, description = "Transition not applicable", body = crate::errors::ErrorResponse),
        (status = 403, description = "Administrator role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn deliver_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<FulfillmentResponse>, ServiceError> {
    apply_fulfillment(&state, &auth, order_id, StatusSignal::MarkDelivered).await
}
