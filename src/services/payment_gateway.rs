//! Online payment provider integration.
//!
//! Checkout opens a provider-side order for the amount due; the provider
//! later reports the payment to the client, which forwards it to
//! `POST /orders/verify` together with an HMAC signature that
//! [`SignatureVerifier`] checks.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayOrderRequest {
    /// Amount in minor currency units (paise for INR).
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

/// Provider-side order returned to the client so it can open the payment
/// widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("payment provider request failed: {0}")]
    Transport(String),
    #[error("payment provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected payment provider response: {0}")]
    InvalidResponse(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::UpstreamError(err.to_string())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: GatewayOrderRequest)
        -> Result<GatewayOrder, GatewayError>;
}

/// Converts a decimal amount into integral minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError("Order total is out of range".to_string()))
}

/// Receipt reference sent with each provider order.
pub fn receipt_reference() -> String {
    format!("receipt_{}", chrono::Utc::now().timestamp_millis())
}

/// Razorpay Orders API client.
#[derive(Clone)]
pub struct RazorpayGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    timeout: Duration,
}

impl RazorpayGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            timeout,
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, GatewayError> {
        Self::new(
            cfg.payment_base_url.clone(),
            cfg.payment_key_id.clone(),
            cfg.payment_key_secret.clone(),
            cfg.payment_timeout(),
        )
    }

    async fn post_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<GatewayOrder>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self), fields(amount = request.amount, receipt = %request.receipt))]
    async fn create_order(
        &self,
        request: GatewayOrderRequest,
    ) -> Result<GatewayOrder, GatewayError> {
        match tokio::time::timeout(self.timeout, self.post_order(&request)).await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!(error = %e, "gateway order creation failed");
                }
                result
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "gateway order creation timed out");
                Err(GatewayError::Timeout(self.timeout))
            }
        }
    }
}

/// Checks `hex(HMAC-SHA256(secret, "{order_id}|{payment_id}"))`.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, gateway_order_id: &str, gateway_payment_id: &str) -> Result<HmacSha256, ServiceError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("invalid signing key: {}", e)))?;
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(gateway_payment_id.as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> Result<String, ServiceError> {
        let mac = self.mac(gateway_order_id, gateway_payment_id)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time comparison against the supplied hex signature.
    pub fn verify(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        let Ok(supplied) = hex::decode(signature.trim()) else {
            return false;
        };
        match self.mac(gateway_order_id, gateway_payment_id) {
            Ok(mac) => mac.verify_slice(&supplied).is_ok(),
            Err(_) => false,
        }
    }
}
