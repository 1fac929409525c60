use crate::{
    errors::ServiceError,
    services::payment_gateway::PaymentNotification,
    services::payment_reconciliation::ReconcileOutcome,
    AppState,
};
use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// POST /api/v1/payments/webhook
///
/// Gateway notification endpoint. Idempotent by construction: every state
/// transition downstream is conditional, so duplicate, out-of-order and
/// concurrent deliveries converge on the same final state. Any handled
/// outcome answers 200 — including "insufficient stock" — so the gateway only
/// retries on real infrastructure failures.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Notification processed"),
        (status = 400, description = "Malformed payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Verify signature if configured
    if let Some(secret) = state.config.payment_webhook_secret.as_deref() {
        let tolerance = state
            .config
            .payment_webhook_tolerance_secs
            .unwrap_or(DEFAULT_TOLERANCE_SECS);
        if !verify_signature(&headers, &body, secret, tolerance) {
            warn!("payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    } else {
        warn!("payment webhook received with signature verification disabled");
    }

    let notification: PaymentNotification = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid notification payload: {}", e)))?;

    info!(
        order_id = %notification.order_id,
        status = ?notification.transaction_status,
        fraud = ?notification.fraud_status,
        "payment notification received"
    );

    let outcome = state
        .reconciliation
        .process_notification(&notification)
        .await?;

    let message = match outcome {
        ReconcileOutcome::Fulfilled => "order fulfilled",
        ReconcileOutcome::AwaitingFulfillment => "payment received, delivery deferred",
        ReconcileOutcome::MarkedProcessing => "payment received",
        ReconcileOutcome::PaymentHeld => "payment held for review",
        ReconcileOutcome::Canceled => "order canceled",
        ReconcileOutcome::NoOp | ReconcileOutcome::NoChange => "no change",
    };

    Ok((axum::http::StatusCode::OK, Json(json!({ "message": message }))))
}

/// HMAC-SHA256 over `"<timestamp>.<body>"` against the `x-timestamp` and
/// `x-signature` headers, with a replay-window check on the timestamp.
fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) else {
        return false;
    };
    let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) else {
        return false;
    };

    let Ok(ts_i) = ts.parse::<i64>() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts_i).unsigned_abs() > tolerance_secs {
        return false;
    }

    let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(&expected, sig)
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

    fn signed_headers(secret: &str, body: &str, ts: i64) -> HeaderMap {
        let signed = format!("{}.{}", ts, body);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed.as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", ts.to_string().parse().unwrap());
        headers.insert("x-signature", sig.parse().unwrap());
        headers
    }

    #[test]
    fn valid_signature_passes() {
        let body = r#"{"order_id":"abc","transaction_status":"settlement"}"#;
        let ts = chrono::Utc::now().timestamp();
        let headers = signed_headers("topsecret", body, ts);

        assert!(verify_signature(
            &headers,
            &Bytes::from(body),
            "topsecret",
            300
        ));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = r#"{"order_id":"abc","transaction_status":"settlement"}"#;
        let ts = chrono::Utc::now().timestamp();
        let headers = signed_headers("other", body, ts);

        assert!(!verify_signature(
            &headers,
            &Bytes::from(body),
            "topsecret",
            300
        ));
    }

    #[test]
    fn stale_timestamp_fails() {
        let body = r#"{"order_id":"abc","transaction_status":"settlement"}"#;
        let ts = chrono::Utc::now().timestamp() - 3600;
        let headers = signed_headers("topsecret", body, ts);

        assert!(!verify_signature(
            &headers,
            &Bytes::from(body),
            "topsecret",
            300
        ));
    }

    #[test]
    fn tampered_body_fails() {
        let ts = chrono::Utc::now().timestamp();
        let headers = signed_headers(
            "topsecret",
            r#"{"order_id":"abc","transaction_status":"settlement"}"#,
            ts,
        );

        assert!(!verify_signature(
            &headers,
            &Bytes::from(r#"{"order_id":"abc","transaction_status":"expire"}"#),
            "topsecret",
            300
        ));
    }

    #[test]
    fn missing_headers_fail() {
        assert!(!verify_signature(
            &HeaderMap::new(),
            &Bytes::from("{}"),
            "topsecret",
            300
        ));
    }
}
