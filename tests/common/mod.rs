//! Shared harness: the real router wired to an in-memory order store, so
//! tests exercise the full HTTP surface without a database or network.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{header, Method, Request, Response, StatusCode},
    routing::get,
    Router,
};
use hmac::{Hmac, Mac};
use rust_decimal_macros::dec;
use serde_json::Value;
use sha2::Sha256;
use tower::ServiceExt;
use uuid::Uuid;

use quitanda_api::{
    auth::{AuthService, ROLE_ADMIN},
    config::AppConfig,
    handlers::{self, AppServices},
    payments::{CheckoutPreference, PaymentGateway, PreferenceRequest},
    services::{checkout::CheckoutService, order_status::OrderStatusService},
    store::{InMemoryOrderStore, NewOrder, NewOrderItem, OrderStore},
    AppState,
};

pub const JWT_SECRET: &str = "test-secret-test-secret-test-secret!";
pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// Gateway stub that always mints a session.
struct AlwaysSucceedsGateway;

#[async_trait::async_trait]
impl PaymentGateway for AlwaysSucceedsGateway {
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<CheckoutPreference, quitanda_api::errors::ServiceError> {
        Ok(CheckoutPreference {
            id: format!("pref-{}", request.external_reference),
            init_point: "https://checkout.example/redirect".into(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryOrderStore>,
    pub auth: Arc<AuthService>,
}

pub struct TestAppBuilder {
    webhook_secret: Option<String>,
    gateway: Option<Arc<dyn PaymentGateway>>,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            webhook_secret: None,
            gateway: None,
        }
    }

    pub fn with_webhook_secret(mut self, secret: &str) -> Self {
        self.webhook_secret = Some(secret.to_string());
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn build(self) -> TestApp {
        let store = Arc::new(InMemoryOrderStore::new());
        let gateway = self
            .gateway
            .unwrap_or_else(|| Arc::new(AlwaysSucceedsGateway));

        let checkout = CheckoutService::new(store.clone(), gateway, None, None);
        let order_status = OrderStatusService::new(store.clone(), None);
        let services = AppServices::new(checkout, order_status);

        let auth = Arc::new(AuthService::new(
            JWT_SECRET,
            "quitanda-api",
            Duration::from_secs(3600),
        ));

        let state = AppState {
            config: test_config(self.webhook_secret),
            store: store.clone(),
            services,
        };

        let router = Router::new()
            .route("/health", get(handlers::health::health))
            .nest("/api/v1", quitanda_api::api_v1_routes())
            .layer(axum::middleware::from_fn_with_state(
                auth.clone(),
                quitanda_api::auth::inject_auth_service,
            ))
            .with_state(state);

        TestApp {
            router,
            store,
            auth,
        }
    }
}

fn test_config(webhook_secret: Option<String>) -> AppConfig {
    AppConfig {
        environment: "test".into(),
        host: "127.0.0.1".into(),
        port: 8080,
        log_level: "info".into(),
        log_json: false,
        database_url: "sqlite::memory:".into(),
        auto_migrate: false,
        jwt_secret: JWT_SECRET.into(),
        jwt_issuer: "quitanda-api".into(),
        jwt_expiration: 3600,
        cors_allowed_origins: None,
        cors_allow_any_origin: false,
        payment_api_url: "https://payments.invalid".into(),
        payment_access_token: Some("test-token".into()),
        payment_timeout_secs: 5,
        payment_notification_url: None,
        payment_webhook_secret: webhook_secret,
        payment_webhook_tolerance_secs: 300,
    }
}

impl TestApp {
    pub fn new() -> Self {
        TestAppBuilder::new().build()
    }

    pub fn token_for(&self, user_id: Uuid) -> String {
        self.auth.issue_token(user_id, vec![]).expect("token")
    }

    pub fn admin_token_for(&self, user_id: Uuid) -> String {
        self.auth
            .issue_token(user_id, vec![ROLE_ADMIN.to_string()])
            .expect("token")
    }

    /// Seeds a pending order directly through the store: one line,
    /// qty 2 at 22.00 BRL.
    pub async fn seed_order(&self, user_id: Uuid) -> Uuid {
        let order_id = Uuid::new_v4();
        self.store
            .create(NewOrder {
                id: order_id,
                user_id,
                currency: "BRL".into(),
                payment_method: Some("checkout_pro".into()),
                freight_amount: dec!(0),
                total_amount: dec!(44.00),
                items: vec![NewOrderItem {
                    product_id: "banana-prata".into(),
                    name: "Banana Prata 1kg".into(),
                    quantity: 2,
                    unit_price: dec!(22.00),
                }],
            })
            .await
            .expect("seed order");
        order_id
    }

    pub async fn stored_status(&self, order_id: Uuid) -> String {
        self.store
            .find(order_id)
            .await
            .expect("store read")
            .expect("order exists")
            .order
            .status
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router.clone().oneshot(request).await.expect("response")
    }

    /// Delivers a webhook notification, optionally signed.
    pub async fn deliver_webhook(&self, payload: &Value, secret: Option<&str>) -> Response<Body> {
        let body = payload.to_string();
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json");

        if let Some(secret) = secret {
            let ts = chrono::Utc::now().timestamp();
            builder = builder.header("x-signature", sign_webhook(secret, &body, ts));
        }

        let request = builder.body(Body::from(body)).expect("request");
        self.router.clone().oneshot(request).await.expect("response")
    }
}

pub fn sign_webhook(secret: &str, body: &str, ts: i64) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key");
    mac.update(format!("{ts}.{body}").as_bytes());
    format!("ts={},v1={}", ts, hex::encode(mac.finalize().into_bytes()))
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
