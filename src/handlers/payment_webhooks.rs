use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::order_status::{ReconcileOutcome, StatusSignal};
use crate::{errors::ServiceError, AppState};

type HmacSha256 = Hmac<Sha256>;

/// What a notification resolved to: which order it is about and what the
/// processor is telling us happened to the payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PaymentNotification {
    pub reference: String,
    pub kind: PaymentEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PaymentEventKind {
    Confirmed,
    Cancelled,
}

impl PaymentEventKind {
    fn signal(self) -> StatusSignal {
        match self {
            Self::Confirmed => StatusSignal::PaymentConfirmed,
            Self::Cancelled => StatusSignal::PaymentCancelled,
        }
    }
}

// POST /api/v1/payments/webhook
//
// The processor retries aggressively and delivers with no ordering or
// at-most-once guarantee, so past the signature gate this endpoint always
// acknowledges: an unparseable payload, an unknown reference, a stale
// transition or a store failure is logged and swallowed, never surfaced.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Notification acknowledged"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Authentication gate: when a secret is configured the signature is
    // mandatory and checked before anything else.
    if let Some(secret) = &state.config.payment_webhook_secret {
        if !verify_signature(
            &headers,
            &body,
            secret,
            state.config.payment_webhook_tolerance_secs,
        ) {
            warn!("payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let acknowledgment = (StatusCode::OK, Json(json!({ "received": true })));

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "unparseable webhook payload; acknowledging anyway");
            return Ok(acknowledgment);
        }
    };

    let Some(notification) = resolve_notification(&payload) else {
        info!("webhook payload carries no actionable payment event");
        return Ok(acknowledgment);
    };

    let order_id = match notification.reference.parse::<Uuid>() {
        Ok(order_id) => order_id,
        Err(_) => {
            warn!(
                reference = %notification.reference,
                "webhook reference does not resolve to an order id"
            );
            return Ok(acknowledgment);
        }
    };

    match state
        .services
        .order_status
        .apply_signal(order_id, notification.kind.signal())
        .await
    {
        Ok(ReconcileOutcome::Applied { from, to }) => {
            info!(order_id = %order_id, from = %from, to = %to, "webhook reconciled");
        }
        Ok(ReconcileOutcome::NoOp { current }) => {
            info!(
                order_id = %order_id,
                current = %current,
                "duplicate or out-of-order webhook; no change"
            );
        }
        Ok(ReconcileOutcome::UnknownOrder) => {
            warn!(order_id = %order_id, "webhook references an unknown order");
        }
        Err(e) => {
            error!(order_id = %order_id, error = %e, "reconciliation failed; acknowledging anyway");
        }
    }

    Ok(acknowledgment)
}

/// Resolves the order reference and event kind from any of the payload
/// shapes the processor uses. The external reference wins when present;
/// the raw event/resource id is the fallback.
pub(crate) fn resolve_notification(payload: &Value) -> Option<PaymentNotification> {
    let reference = resolve_reference(payload)?;
    let kind = resolve_kind(payload)?;
    Some(PaymentNotification { reference, kind })
}

fn resolve_reference(payload: &Value) -> Option<String> {
    if let Some(external) = payload.get("external_reference").and_then(Value::as_str) {
        if !external.is_empty() {
            return Some(external.to_string());
        }
    }

    if let Some(id) = payload.pointer("/data/id").and_then(value_as_id) {
        return Some(id);
    }

    if let Some(resource) = payload.get("resource").and_then(Value::as_str) {
        // May be a bare id or a URL whose trailing segment is the id
        let id = resource.rsplit('/').next().unwrap_or(resource);
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }

    payload.get("id").and_then(value_as_id)
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn resolve_kind(payload: &Value) -> Option<PaymentEventKind> {
    let raw = payload
        .get("action")
        .and_then(Value::as_str)
        .or_else(|| payload.get("status").and_then(Value::as_str))
        .or_else(|| payload.pointer("/data/status").and_then(Value::as_str))?;
    let raw = raw.to_ascii_lowercase();

    const CONFIRMED: &[&str] = &["approved", "accredited", "confirmed", "succeeded"];
    const CANCELLED: &[&str] = &["cancelled", "canceled", "rejected", "failed"];

    if CONFIRMED.iter().any(|needle| raw.contains(needle)) {
        Some(PaymentEventKind::Confirmed)
    } else if CANCELLED.iter().any(|needle| raw.contains(needle)) {
        Some(PaymentEventKind::Cancelled)
    } else {
        None
    }
}

/// Checks the `x-signature` header: `ts=<unix>,v1=<hex hmac-sha256>` over
/// `"{ts}.{body}"`, with the timestamp bounded by the configured tolerance.
pub(crate) fn verify_signature(
    headers: &HeaderMap,
    payload: &Bytes,
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let Some(signature) = headers.get("x-signature").and_then(|h| h.to_str().ok()) else {
        return false;
    };

    let mut ts = "";
    let mut v1 = "";
    for part in signature.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("ts"), Some(val)) => ts = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }
    if ts.is_empty() || v1.is_empty() {
        return false;
    }

    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = chrono::Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            return false;
        }
    } else {
        return false;
    }

    let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, v1)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn external_reference_wins_over_every_other_shape() {
        let payload = json!({
            "action": "payment.approved",
            "external_reference": "order-123",
            "data": { "id": "998877" },
            "resource": "https://processor.example/payments/42",
            "id": "11"
        });

        let notification = resolve_notification(&payload).unwrap();
        assert_eq!(notification.reference, "order-123");
        assert_eq!(notification.kind, PaymentEventKind::Confirmed);
    }

    #[test]
    fn empty_external_reference_falls_back_to_the_nested_id() {
        let payload = json!({
            "action": "payment.approved",
            "external_reference": "",
            "data": { "id": 998877 }
        });

        let notification = resolve_notification(&payload).unwrap();
        assert_eq!(notification.reference, "998877");
    }

    #[test]
    fn resource_url_resolves_to_its_trailing_segment() {
        let payload = json!({
            "status": "rejected",
            "resource": "https://processor.example/collections/55443322"
        });

        let notification = resolve_notification(&payload).unwrap();
        assert_eq!(notification.reference, "55443322");
        assert_eq!(notification.kind, PaymentEventKind::Cancelled);
    }

    #[test]
    fn bare_id_shape_resolves() {
        let payload = json!({ "id": "777", "status": "approved" });

        let notification = resolve_notification(&payload).unwrap();
        assert_eq!(notification.reference, "777");
        assert_eq!(notification.kind, PaymentEventKind::Confirmed);
    }

    #[test]
    fn kind_falls_back_to_the_nested_status() {
        let payload = json!({
            "external_reference": "order-9",
            "data": { "id": "1", "status": "accredited" }
        });

        let notification = resolve_notification(&payload).unwrap();
        assert_eq!(notification.kind, PaymentEventKind::Confirmed);
    }

    #[test]
    fn unactionable_event_kinds_resolve_to_nothing() {
        let payload = json!({
            "external_reference": "order-9",
            "action": "payment.updated"
        });
        assert!(resolve_notification(&payload).is_none());

        let payload = json!({ "topic": "merchant_order" });
        assert!(resolve_notification(&payload).is_none());
    }

    fn signed_headers(secret: &str, body: &str, ts: i64) -> HeaderMap {
        let signed = format!("{}.{}", ts, body);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed.as_bytes());
        let v1 = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-signature",
            format!("ts={},v1={}", ts, v1).parse().unwrap(),
        );
        headers
    }

    #[test]
    fn valid_signature_passes() {
        let secret = "whsec_test";
        let body = r#"{"id":"1"}"#;
        let ts = chrono::Utc::now().timestamp();

        let headers = signed_headers(secret, body, ts);
        assert!(verify_signature(
            &headers,
            &Bytes::from(body.to_owned()),
            secret,
            300
        ));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = r#"{"id":"1"}"#;
        let ts = chrono::Utc::now().timestamp();

        let headers = signed_headers("whsec_other", body, ts);
        assert!(!verify_signature(
            &headers,
            &Bytes::from(body.to_owned()),
            "whsec_test",
            300
        ));
    }

    #[test]
    fn stale_timestamp_fails() {
        let secret = "whsec_test";
        let body = r#"{"id":"1"}"#;
        let ts = chrono::Utc::now().timestamp() - 3600;

        let headers = signed_headers(secret, body, ts);
        assert!(!verify_signature(
            &headers,
            &Bytes::from(body.to_owned()),
            secret,
            300
        ));
    }

    #[test]
    fn missing_header_fails() {
        assert!(!verify_signature(
            &HeaderMap::new(),
            &Bytes::from_static(b"{}"),
            "whsec_test",
            300
        ));
    }
}
