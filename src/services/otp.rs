use chrono::{Duration, Utc};
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::OtpConfig;
use crate::db::DbPool;
use crate::entities::email_otp::{self, Entity as EmailOtp};
use crate::entities::user::normalize_email;
use crate::errors::ServiceError;
use crate::mail::MailTransport;

/// One-time-code issuance and verification.
///
/// Per normalized email the record moves NONE → ISSUED → {VERIFIED,
/// EXPIRED, LOCKED}; the three terminal states all purge the record, so a
/// later send starts a fresh cycle. Verification failures are uniform:
/// callers cannot tell a missing record from an expired or exhausted one.
#[derive(Clone)]
pub struct OtpService {
    db: Arc<DbPool>,
    mailer: Arc<dyn MailTransport>,
    config: OtpConfig,
}

impl OtpService {
    pub fn new(db: Arc<DbPool>, mailer: Arc<dyn MailTransport>, config: OtpConfig) -> Self {
        Self { db, mailer, config }
    }

    /// Issues a code for `email` and dispatches it by mail.
    ///
    /// A request inside the resend cooldown returns `Ok(())` with no side
    /// effects, indistinguishable from a successful send. The record is
    /// persisted before the mail call: a transport failure is reported but
    /// leaves the code valid, and the next issue is gated by the cooldown
    /// rather than retried here.
    #[instrument(skip_all)]
    pub async fn issue(&self, email: &str) -> Result<(), ServiceError> {
        let email = normalize_email(email);
        let now = Utc::now();
        let cooldown = Duration::seconds(self.config.resend_cooldown_secs);

        let existing = EmailOtp::find()
            .filter(email_otp::Column::Email.eq(email.clone()))
            .one(&*self.db)
            .await?;

        if let Some(rec) = &existing {
            if now - rec.last_sent_at < cooldown {
                debug!("re-send inside cooldown window, ignoring");
                return Ok(());
            }
        }

        let code = self.generate_code();
        let code_hash = hash_code(&code);
        let expires_at = now + Duration::minutes(self.config.ttl_minutes);

        match existing {
            Some(rec) => {
                // Guarded refresh: a concurrent issue for the same email
                // loses here and is treated as a cooldown no-op.
                let refreshed = EmailOtp::update_many()
                    .col_expr(email_otp::Column::CodeHash, Expr::value(code_hash))
                    .col_expr(email_otp::Column::ExpiresAt, Expr::value(expires_at))
                    .col_expr(email_otp::Column::Attempts, Expr::value(0))
                    .col_expr(email_otp::Column::LastSentAt, Expr::value(now))
                    .filter(email_otp::Column::Id.eq(rec.id))
                    .filter(email_otp::Column::LastSentAt.lte(now - cooldown))
                    .exec(&*self.db)
                    .await?;
                if refreshed.rows_affected == 0 {
                    debug!("concurrent issue refreshed the record first, ignoring");
                    return Ok(());
                }
            }
            None => {
                let record = email_otp::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    email: Set(email.clone()),
                    code_hash: Set(code_hash),
                    expires_at: Set(expires_at),
                    attempts: Set(0),
                    last_sent_at: Set(now),
                };
                record.insert(&*self.db).await?;
            }
        }

        if let Err(e) = self
            .mailer
            .send_otp_email(&email, &code, self.config.ttl_minutes)
            .await
        {
            warn!(error = %e, "verification mail dispatch failed; issued code stands");
            return Err(e.into());
        }

        info!("verification code issued");
        Ok(())
    }

    /// Checks `candidate` against the live record for `email`.
    ///
    /// Returns `Ok(true)` exactly once per issued code; every other
    /// outcome is `Ok(false)` without detail. `Err` is reserved for
    /// storage failures.
    #[instrument(skip_all)]
    pub async fn verify(&self, email: &str, candidate: &str) -> Result<bool, ServiceError> {
        let email = normalize_email(email);

        let record = EmailOtp::find()
            .filter(email_otp::Column::Email.eq(email))
            .one(&*self.db)
            .await?;

        let Some(record) = record else {
            return Ok(false);
        };

        if record.expires_at < Utc::now() {
            self.purge(record.id).await?;
            return Ok(false);
        }

        if record.attempts >= self.config.max_attempts {
            self.purge(record.id).await?;
            return Ok(false);
        }

        if record.code_hash == hash_code(candidate.trim()) {
            self.purge(record.id).await?;
            info!("verification code accepted");
            return Ok(true);
        }

        if record.attempts + 1 >= self.config.max_attempts {
            self.purge(record.id).await?;
        } else {
            // Atomic increment so concurrent wrong guesses are all counted.
            EmailOtp::update_many()
                .col_expr(
                    email_otp::Column::Attempts,
                    Expr::col(email_otp::Column::Attempts).add(1),
                )
                .filter(email_otp::Column::Id.eq(record.id))
                .exec(&*self.db)
                .await?;
        }

        Ok(false)
    }

    async fn purge(&self, id: Uuid) -> Result<(), ServiceError> {
        EmailOtp::delete_by_id(id).exec(&*self.db).await?;
        Ok(())
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.config.code_length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

/// One-way hash under which codes are stored; plaintext never persists.
pub(crate) fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}
