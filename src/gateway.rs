use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::GatewayConfig;

/// Errors surfaced by the payment gateway collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway not configured")]
    NotConfigured,

    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected the request (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// External payment gateway.
///
/// A single call creates a single remote order; the gateway itself is not
/// assumed idempotent, so callers are responsible for reusing references
/// they have already obtained. Implementations do not retry.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Whether credentials are present. Checked by callers before any
    /// remote call so misconfiguration surfaces as a distinct condition.
    fn is_configured(&self) -> bool;

    /// Creates a remote payment order for `amount_minor` minor units and
    /// returns the gateway's opaque order identifier.
    async fn create_remote_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<String, GatewayError>;
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Deserialize)]
struct RemoteOrder {
    id: String,
}

/// Razorpay Orders API client (HTTP basic auth, JSON).
pub struct RazorpayGateway {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn orders_url(&self) -> String {
        format!("{}/v1/orders", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    #[instrument(skip(self), fields(amount_minor, currency, receipt))]
    async fn create_remote_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<String, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let body = CreateOrderBody {
            amount: amount_minor,
            currency,
            receipt,
        };

        let response = self
            .http
            .post(self.orders_url())
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "gateway rejected order creation");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let order: RemoteOrder = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        if order.id.is_empty() {
            return Err(GatewayError::InvalidResponse(
                "missing order id in gateway response".to_string(),
            ));
        }

        info!(remote_order_id = %order.id, "created gateway order");
        Ok(order.id)
    }
}
