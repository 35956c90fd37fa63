use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::MailConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail API rejected the message (status {status})")]
    Rejected { status: u16 },
}

/// Outbound mail delivery for verification codes.
///
/// Single-attempt: a failure is reported to the caller, who must not let
/// it roll back OTP state that is already persisted.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_otp_email(&self, to: &str, code: &str, ttl_minutes: i64)
        -> Result<(), MailError>;
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

/// Transactional-mail HTTP API client.
pub struct HttpMailer {
    config: MailConfig,
    http: reqwest::Client,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MailTransport for HttpMailer {
    #[instrument(skip(self, code), fields(to))]
    async fn send_otp_email(
        &self,
        to: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<(), MailError> {
        let message = OutboundMessage {
            from: &self.config.from,
            to,
            subject: "Your verification code",
            text: format!(
                "Hello,\n\nYour verification code is: {}\nIt expires in {} minutes.\n\nIf you did not request this, ignore this email.\n",
                code, ttl_minutes
            ),
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected {
                status: status.as_u16(),
            });
        }

        info!("verification mail dispatched");
        Ok(())
    }
}
