use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::user::{self, normalize_email, Entity as AppUser, Role};
use crate::errors::ServiceError;
use crate::services::otp::OtpService;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterAccountRequest {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,

    pub role: String,
}

/// Pending-account registration and OTP-gated activation.
///
/// Registration is deliberately uninformative about whether an account
/// already exists: both paths issue (or cooldown-suppress) a code and
/// return the same result, so the operation cannot be used to probe for
/// registered emails.
#[derive(Clone)]
pub struct AccountService {
    db: Arc<DbPool>,
    otp: OtpService,
}

impl AccountService {
    pub fn new(db: Arc<DbPool>, otp: OtpService) -> Self {
        Self { db, otp }
    }

    /// Creates a disabled account (unless the email is already taken) and
    /// issues a verification code.
    #[instrument(skip_all)]
    pub async fn register(&self, request: RegisterAccountRequest) -> Result<(), ServiceError> {
        request.validate()?;

        let role = Role::parse(&request.role)
            .map_err(|rejected| ServiceError::ValidationError(format!("unknown role: {rejected}")))?;
        let email = normalize_email(&request.email);

        let existing = AppUser::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(&*self.db)
            .await?;

        if existing.is_none() {
            let account = user::ActiveModel {
                id: Set(Uuid::new_v4()),
                email: Set(email.clone()),
                password_hash: Set(hash_password(&request.password)?),
                role: Set(role.to_string()),
                name: Set(request.name.trim().to_string()),
                email_verified: Set(false),
                enabled: Set(false),
                created_at: Set(Utc::now()),
            };
            account.insert(&*self.db).await?;
            info!(%role, "pending account created");
        }

        self.otp.issue(&email).await
    }

    /// Verifies the code and, on success, activates the account in a
    /// single statement setting `enabled` and `email_verified` together.
    #[instrument(skip_all)]
    pub async fn verify_and_activate(&self, email: &str, code: &str) -> Result<(), ServiceError> {
        let verified = self.otp.verify(email, code).await?;
        if !verified {
            return Err(ServiceError::BadRequest(
                "invalid or expired verification code".to_string(),
            ));
        }

        let email = normalize_email(email);
        let activated = AppUser::update_many()
            .col_expr(user::Column::Enabled, Expr::value(true))
            .col_expr(user::Column::EmailVerified, Expr::value(true))
            .filter(user::Column::Email.eq(email))
            .exec(&*self.db)
            .await?;

        if activated.rows_affected == 0 {
            return Err(ServiceError::NotFound("account not found".to_string()));
        }

        info!("account activated");
        Ok(())
    }

    /// Re-sends a verification code; the cooldown makes this safe to
    /// expose unauthenticated and the outcome is uniform either way.
    pub async fn resend(&self, email: &str) -> Result<(), ServiceError> {
        self.otp.issue(email).await
    }

    /// Case-insensitive account lookup (emails are stored normalized).
    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        let found = AppUser::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&*self.db)
            .await?;
        Ok(found)
    }
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::InternalError(format!("password hashing failed: {e}")))
}
