use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Quitanda API",
        version = "0.2.0",
        description = r#"
# Quitanda Storefront API

Checkout and order-tracking backend for the Quitanda grocery storefront.

## Flow

1. `POST /api/v1/checkout` creates an order and a redirectable checkout
   session with the external payment processor.
2. The processor reports payment outcomes asynchronously to
   `POST /api/v1/payments/webhook`; deliveries may repeat and arrive out
   of order, and are folded into a single monotonic order status.
3. Clients poll `GET /api/v1/orders/{id}/status` to observe confirmation,
   independent of webhook timing.

## Authentication

All endpoints except the webhook require a JWT bearer token:

```
Authorization: Bearer <your-jwt-token>
```
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Payment intent issuance"),
        (name = "Orders", description = "Order status and fulfillment"),
        (name = "Payments", description = "Payment processor callbacks")
    ),
    modifiers(&SecurityAddon),
    paths(
        crate::handlers::checkout::create_checkout,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_status,
        crate::handlers::orders::ship_order,
        crate::handlers::orders::deliver_order,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(
        schemas(
            crate::services::checkout::CheckoutRequest,
            crate::services::checkout::CheckoutItem,
            crate::services::checkout::CheckoutResponse,
            crate::services::order_status::OrderStatus,
            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::OrderItemView,
            crate::handlers::orders::OrderStatusResponse,
            crate::handlers::orders::FulfillmentResponse,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
