use crate::{config::AppConfig, errors::ServiceError};
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

const SANDBOX_BASE_URL: &str = "https://app.sandbox.midtrans.com";
const PRODUCTION_BASE_URL: &str = "https://app.midtrans.com";

/// Transaction reference and amount as displayed on the hosted checkout.
/// `gross_amount` must equal the sum of the item detail lines exactly or the
/// gateway rejects the session.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetails {
    pub order_id: String,
    pub gross_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemDetail {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
    pub email: String,
    pub first_name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapTransactionRequest {
    pub transaction_details: TransactionDetails,
    pub item_details: Vec<ItemDetail>,
    pub customer_details: CustomerDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapTransactionResponse {
    pub token: String,
}

/// Gateway transaction lifecycle signals carried by notifications. Strict
/// union with an explicit fallback arm so unrecognized statuses surface in
/// logs instead of silently mapping anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Capture,
    Settlement,
    Pending,
    Authorize,
    Cancel,
    Deny,
    Expire,
    Refund,
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudStatus {
    Accept,
    Challenge,
    Deny,
    #[serde(other)]
    Unrecognized,
}

/// Inbound webhook payload. The gateway may deliver the same notification
/// multiple times, out of order, and from concurrent connections.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    pub order_id: String,
    pub transaction_status: TransactionStatus,
    #[serde(default)]
    pub fraud_status: Option<FraudStatus>,
}

/// Client for the gateway's hosted-checkout (Snap) API.
#[derive(Clone)]
pub struct MidtransClient {
    http: Client,
    server_key: String,
    base_url: String,
}

impl MidtransClient {
    /// Builds a client using a default reqwest client with sensible timeouts.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to construct gateway client: {}", e))
            })?;

        Ok(Self::with_client(cfg, http))
    }

    /// Builds a client from an existing reqwest client (useful for testing).
    pub fn with_client(cfg: &AppConfig, http: Client) -> Self {
        let base_url = cfg.midtrans_base_url.clone().unwrap_or_else(|| {
            if cfg.midtrans_is_production {
                PRODUCTION_BASE_URL.to_string()
            } else {
                SANDBOX_BASE_URL.to_string()
            }
        });

        Self {
            http,
            server_key: cfg.midtrans_server_key.clone(),
            base_url,
        }
    }

    fn auth_headers(&self) -> Result<HeaderMap, ServiceError> {
        let credential =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:", self.server_key));
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", credential)).map_err(|e| {
                ServiceError::InternalError(format!("invalid gateway credential: {}", e))
            })?,
        );
        Ok(headers)
    }

    /// Creates a hosted payment session and returns its token.
    #[instrument(skip(self, request), fields(order_id = %request.transaction_details.order_id))]
    pub async fn create_transaction(
        &self,
        request: &SnapTransactionRequest,
    ) -> Result<SnapTransactionResponse, ServiceError> {
        let url = format!("{}/snap/v1/transactions", self.base_url);

        let response = self
            .http
            .post(&url)
            .headers(self.auth_headers()?)
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalApiError(format!("gateway unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalApiError(format!(
                "gateway rejected session creation ({}): {}",
                status, body
            )));
        }

        let parsed: SnapTransactionResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalApiError(format!("malformed gateway response: {}", e))
        })?;

        info!("payment session created");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_status_parses_known_values() {
        let n: PaymentNotification = serde_json::from_str(
            r#"{"order_id":"abc","transaction_status":"settlement","fraud_status":"accept"}"#,
        )
        .unwrap();
        assert_eq!(n.transaction_status, TransactionStatus::Settlement);
        assert_eq!(n.fraud_status, Some(FraudStatus::Accept));
    }

    #[test]
    fn transaction_status_falls_back_loudly_typed() {
        let n: PaymentNotification = serde_json::from_str(
            r#"{"order_id":"abc","transaction_status":"partial_chargeback"}"#,
        )
        .unwrap();
        assert_eq!(n.transaction_status, TransactionStatus::Unrecognized);
        assert_eq!(n.fraud_status, None);
    }
}
