use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::checkout::CheckoutRequest;
use crate::AppState;

// POST /api/v1/checkout
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Checkout session created", body = crate::services::checkout::CheckoutResponse),
        (status = 400, description = "Malformed cart", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state
        .services
        .checkout
        .create_checkout(auth.user_id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}
