use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A marketplace account. Created disabled; `enabled` and `email_verified`
/// are flipped together, in one statement, by the activation path only.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "app_users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Stored trimmed and lower-cased
    #[sea_orm(unique)]
    pub email: String,

    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Holds a `Role` in its canonical uppercase string form
    pub role: String,

    pub name: String,

    pub email_verified: bool,
    pub enabled: bool,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Closed set of account roles.
///
/// Unknown role strings are rejected at the registration boundary instead
/// of silently falling back to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Farmer,
    Customer,
    Admin,
}

impl Role {
    /// Parses a role string case-insensitively; `Err` carries the rejected
    /// input for the validation message.
    pub fn parse(input: &str) -> Result<Self, String> {
        Role::from_str(input.trim().to_uppercase().as_str()).map_err(|_| input.trim().to_string())
    }
}

/// Normalizes an email for storage and lookup: trim + lower-case.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
