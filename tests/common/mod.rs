#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use agrimarket_core::config::{AppConfig, OtpConfig};
use agrimarket_core::db::{self, DbPool};
use agrimarket_core::entities::{email_otp, order, product, user};
use agrimarket_core::events::{self, Event};
use agrimarket_core::gateway::{GatewayError, PaymentGateway};
use agrimarket_core::mail::{MailError, MailTransport};
use agrimarket_core::migrator::Migrator;
use agrimarket_core::services::orders::{OrderResponse, PlaceOrderRequest};
use agrimarket_core::Core;

/// One recorded call to the mock gateway.
#[derive(Debug, Clone)]
pub struct RemoteOrderRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub receipt: String,
}

/// Gateway double: hands out sequential references and records every call.
pub struct MockGateway {
    configured: AtomicBool,
    fail: AtomicBool,
    counter: AtomicUsize,
    calls: Mutex<Vec<RemoteOrderRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            configured: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            counter: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_configured(&self, configured: bool) {
        self.configured.store(configured, Ordering::SeqCst);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RemoteOrderRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    async fn create_remote_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<String, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 502,
                body: "upstream unavailable".to_string(),
            });
        }
        self.calls.lock().unwrap().push(RemoteOrderRequest {
            amount_minor,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
        });
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("order_mock_{n}"))
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub code: String,
    pub ttl_minutes: i64,
}

/// Mail double. Dispatch attempts are recorded even when configured to
/// fail, so tests can read the code that would have been delivered.
pub struct MockMailer {
    fail: AtomicBool,
    sent: Mutex<Vec<SentMail>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_code(&self) -> String {
        self.sent
            .lock()
            .unwrap()
            .last()
            .expect("no mail was dispatched")
            .code
            .clone()
    }
}

#[async_trait]
impl MailTransport for MockMailer {
    async fn send_otp_email(
        &self,
        to: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            code: code.to_string(),
            ttl_minutes,
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Rejected { status: 500 });
        }
        Ok(())
    }
}

/// Core services over a throwaway SQLite database, with mock gateway and
/// mail collaborators.
pub struct TestCore {
    pub core: Core,
    pub db: Arc<DbPool>,
    pub gateway: Arc<MockGateway>,
    pub mailer: Arc<MockMailer>,
    pub events: Mutex<tokio::sync::mpsc::Receiver<Event>>,
}

impl TestCore {
    pub async fn new() -> Self {
        Self::with_otp(OtpConfig::default()).await
    }

    pub async fn with_otp(otp: OtpConfig) -> Self {
        let db_path =
            std::env::temp_dir().join(format!("agrimarket_test_{}.db", Uuid::new_v4().simple()));
        let mut cfg = AppConfig::for_tests(format!("sqlite://{}?mode=rwc", db_path.display()));
        cfg.otp = otp;

        let db = Arc::new(
            db::establish_connection(&cfg)
                .await
                .expect("connect to test database"),
        );
        Migrator::up(&*db, None).await.expect("run migrations");

        let gateway = Arc::new(MockGateway::new());
        let mailer = Arc::new(MockMailer::new());
        let (event_sender, event_rx) = events::channel(1024);

        let core = Core::new(
            db.clone(),
            &cfg,
            gateway.clone(),
            mailer.clone(),
            Some(Arc::new(event_sender)),
        );

        Self {
            core,
            db,
            gateway,
            mailer,
            events: Mutex::new(event_rx),
        }
    }

    pub fn drain_events(&self) -> Vec<Event> {
        let mut rx = self.events.lock().unwrap();
        let mut drained = Vec::new();
        while let Ok(event) = rx.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub async fn seed_user(&self, role: &str, enabled: bool) -> Uuid {
        let id = Uuid::new_v4();
        let row = user::ActiveModel {
            id: Set(id),
            email: Set(format!("user_{}@example.com", id.simple())),
            password_hash: Set("test-hash".to_string()),
            role: Set(role.to_string()),
            name: Set("Test User".to_string()),
            email_verified: Set(enabled),
            enabled: Set(enabled),
            created_at: Set(Utc::now()),
        };
        row.insert(&*self.db).await.expect("seed user");
        id
    }

    pub async fn seed_customer(&self) -> Uuid {
        self.seed_user("CUSTOMER", true).await
    }

    pub async fn seed_farmer(&self) -> Uuid {
        self.seed_user("FARMER", true).await
    }

    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        owner_id: Option<Uuid>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let row = product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            category: Set("Vegetables".to_string()),
            description: Set(None),
            price: Set(price),
            quantity: Set(100),
            owner_id: Set(owner_id),
        };
        row.insert(&*self.db).await.expect("seed product");
        id
    }

    pub async fn set_product_price(&self, id: Uuid, price: Decimal) {
        product::Entity::update_many()
            .col_expr(product::Column::Price, Expr::value(price))
            .filter(product::Column::Id.eq(id))
            .exec(&*self.db)
            .await
            .expect("set product price");
    }

    pub async fn set_product_owner(&self, id: Uuid, owner_id: Option<Uuid>) {
        product::Entity::update_many()
            .col_expr(product::Column::OwnerId, Expr::value(owner_id))
            .filter(product::Column::Id.eq(id))
            .exec(&*self.db)
            .await
            .expect("set product owner");
    }

    pub async fn delete_product(&self, id: Uuid) {
        product::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .expect("delete product");
    }

    pub async fn place_order(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> OrderResponse {
        self.core
            .orders
            .place(
                customer_id,
                PlaceOrderRequest {
                    product_id,
                    quantity,
                    address: "12 Farm Lane, Pune".to_string(),
                },
            )
            .await
            .expect("place order")
    }

    pub async fn order_row(&self, id: Uuid) -> order::Model {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("load order")
            .expect("order exists")
    }

    pub async fn user_row(&self, email: &str) -> Option<user::Model> {
        user::Entity::find()
            .filter(user::Column::Email.eq(email.trim().to_lowercase()))
            .one(&*self.db)
            .await
            .expect("load user")
    }

    pub async fn otp_row(&self, email: &str) -> Option<email_otp::Model> {
        email_otp::Entity::find()
            .filter(email_otp::Column::Email.eq(email.trim().to_lowercase()))
            .one(&*self.db)
            .await
            .expect("load otp record")
    }

    /// Pushes the record's `last_sent_at` into the past, as if the
    /// cooldown had already elapsed.
    pub async fn age_otp(&self, email: &str, secs: i64) {
        let rec = self.otp_row(email).await.expect("otp record exists");
        email_otp::Entity::update_many()
            .col_expr(
                email_otp::Column::LastSentAt,
                Expr::value(rec.last_sent_at - Duration::seconds(secs)),
            )
            .filter(email_otp::Column::Id.eq(rec.id))
            .exec(&*self.db)
            .await
            .expect("age otp record");
    }

    /// Moves the record's expiry into the past.
    pub async fn expire_otp(&self, email: &str) {
        let rec = self.otp_row(email).await.expect("otp record exists");
        email_otp::Entity::update_many()
            .col_expr(
                email_otp::Column::ExpiresAt,
                Expr::value(Utc::now() - Duration::minutes(1)),
            )
            .filter(email_otp::Column::Id.eq(rec.id))
            .exec(&*self.db)
            .await
            .expect("expire otp record");
    }
}
