use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Live one-time-code record: at most one per normalized email.
///
/// Only the SHA-256 hash of the code is stored. The record is purged on
/// successful verification, on detected expiry, and on attempt exhaustion.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_otps")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Stored trimmed and lower-cased
    #[sea_orm(unique)]
    pub email: String,

    #[serde(skip_serializing)]
    pub code_hash: String,

    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub last_sent_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
