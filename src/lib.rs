//! Agrimarket Core
//!
//! Order lifecycle, payment-gateway reconciliation, and OTP-gated account
//! activation for a farmers marketplace. This crate is the transport-free
//! core: operations are plain async calls returning typed results, and the
//! HTTP layer that exposes them lives elsewhere.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod catalog;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod mail;
pub mod migrator;
pub mod money;
pub mod services;

use std::sync::Arc;

use crate::catalog::{DbProductCatalog, ProductCatalog};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::mail::MailTransport;
use crate::services::accounts::AccountService;
use crate::services::orders::OrderService;
use crate::services::otp::OtpService;
use crate::services::payments::PaymentService;

/// The wired-up core services sharing one database pool.
///
/// Collaborators (gateway, mail transport, catalog) are injected at
/// construction; nothing here reaches for ambient globals, which keeps
/// the whole core swappable in tests.
#[derive(Clone)]
pub struct Core {
    pub accounts: AccountService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub otp: OtpService,
}

impl Core {
    pub fn new(
        db: Arc<DbPool>,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn MailTransport>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let catalog: Arc<dyn ProductCatalog> = Arc::new(DbProductCatalog::new(db.clone()));
        Self::with_catalog(db, config, gateway, mailer, catalog, event_sender)
    }

    /// Like [`Core::new`] but with an explicit catalog, for callers that
    /// source product data from somewhere other than the local tables.
    pub fn with_catalog(
        db: Arc<DbPool>,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn MailTransport>,
        catalog: Arc<dyn ProductCatalog>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let otp = OtpService::new(db.clone(), mailer, config.otp.clone());
        let accounts = AccountService::new(db.clone(), otp.clone());
        let orders = OrderService::new(db.clone(), catalog, event_sender.clone());
        let payments = PaymentService::new(
            db,
            gateway,
            config.gateway.currency.clone(),
            event_sender,
        );

        Self {
            accounts,
            orders,
            payments,
            otp,
        }
    }
}
