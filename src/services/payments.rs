use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{self, Entity as Order, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::PaymentGateway;
use crate::money::to_minor_units;

/// A charge created at (or reused from) the payment gateway.
///
/// `amount_minor` is the exact integer amount the gateway was asked to
/// collect; for a bundle it is the rounded sum, not the sum of rounded
/// parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeResponse {
    pub gateway_order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub order_ids: Vec<Uuid>,
}

/// Payment outcome reported back by the gateway after checkout.
///
/// All fields are optional: gateways omit the payment reference on
/// failures and the status on some webhook shapes.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GatewayCallback {
    pub payment_ref: Option<String>,
    pub signature: Option<String>,
    pub status: Option<String>,
}

/// Post-reconcile view of one order's payment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentView {
    pub order_id: Uuid,
    pub payment_status: String,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
}

/// Gateway-facing side of the order lifecycle: creating remote charges
/// (single and bundled) and folding the gateway's reported outcome back
/// into the local payment state.
///
/// Charge creation is idempotent per order: once a remote reference is
/// stored it is reused for every later request until the payment fails,
/// so client retries cannot open duplicate charges at the gateway.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        currency: impl Into<String>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            gateway,
            currency: currency.into(),
            event_sender,
        }
    }

    /// Creates a gateway charge for one order, or returns the charge that
    /// already exists for it.
    ///
    /// The stored reference is reused unless the previous payment FAILED,
    /// in which case a fresh remote order is created and the status moves
    /// back to PENDING for the retry.
    #[instrument(skip(self), fields(order_id = %order_id, caller_id = %caller_id))]
    pub async fn create_charge(
        &self,
        order_id: Uuid,
        caller_id: Uuid,
    ) -> Result<ChargeResponse, ServiceError> {
        let existing = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("order not found".to_string()))?;

        if existing.customer_id != caller_id {
            return Err(ServiceError::Forbidden("not your order".to_string()));
        }

        if let Some(reference) = &existing.gateway_order_id {
            if existing.payment_status != PaymentStatus::FAILED {
                info!(gateway_order_id = %reference, "reusing existing gateway order");
                return Ok(ChargeResponse {
                    gateway_order_id: reference.clone(),
                    amount_minor: to_minor_units(existing.total_amount)?,
                    currency: self.currency.clone(),
                    order_ids: vec![order_id],
                });
            }
        }

        if !self.gateway.is_configured() {
            return Err(ServiceError::ServiceUnavailable(
                "payment gateway not configured".to_string(),
            ));
        }

        let amount_minor = to_minor_units(existing.total_amount)?;
        let receipt = format!("order_{}", order_id);
        let reference = self
            .gateway
            .create_remote_order(amount_minor, &self.currency, &receipt)
            .await?;

        // Guarded persist: only the first charge (or a retry of a FAILED
        // one) may claim the slot. Losing the guard means a concurrent
        // call already stored its reference; return that winner.
        let claimed = Order::update_many()
            .col_expr(
                order::Column::GatewayOrderId,
                Expr::value(Some(reference.clone())),
            )
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::PENDING),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(
                Condition::any()
                    .add(order::Column::GatewayOrderId.is_null())
                    .add(order::Column::PaymentStatus.eq(PaymentStatus::FAILED)),
            )
            .exec(&*self.db)
            .await?;

        if claimed.rows_affected == 0 {
            let winner = Order::find_by_id(order_id)
                .one(&*self.db)
                .await?
                .and_then(|o| o.gateway_order_id)
                .ok_or_else(|| {
                    ServiceError::InternalError("gateway order reference vanished".to_string())
                })?;
            warn!(gateway_order_id = %winner, "lost charge race, returning winner's reference");
            return Ok(ChargeResponse {
                gateway_order_id: winner,
                amount_minor,
                currency: self.currency.clone(),
                order_ids: vec![order_id],
            });
        }

        info!(gateway_order_id = %reference, amount_minor, "gateway charge created");
        self.send_event(Event::ChargeCreated {
            order_ids: vec![order_id],
            gateway_order_id: reference.clone(),
            amount_minor,
        })
        .await;

        Ok(ChargeResponse {
            gateway_order_id: reference,
            amount_minor,
            currency: self.currency.clone(),
            order_ids: vec![order_id],
        })
    }

    /// Creates one gateway charge covering several orders.
    ///
    /// All orders must exist, belong to the caller, and not be PAID;
    /// any violation fails the whole bundle before the gateway is
    /// contacted. The remote amount is the rounded sum of the order
    /// totals, and every order receives the same reference while keeping
    /// its own `total_amount`.
    #[instrument(skip(self, order_ids), fields(caller_id = %caller_id, count = order_ids.len()))]
    pub async fn create_bundle_charge(
        &self,
        order_ids: &[Uuid],
        caller_id: Uuid,
    ) -> Result<ChargeResponse, ServiceError> {
        let ids = distinct_ids(order_ids)?;

        let orders = Order::find()
            .filter(order::Column::Id.is_in(ids.clone()))
            .all(&*self.db)
            .await?;
        if orders.len() != ids.len() {
            return Err(ServiceError::NotFound(
                "one or more orders not found".to_string(),
            ));
        }
        for ord in &orders {
            if ord.customer_id != caller_id {
                return Err(ServiceError::Forbidden("not your order".to_string()));
            }
            if ord.payment_status == PaymentStatus::PAID {
                return Err(ServiceError::Conflict(
                    "bundle contains an already paid order".to_string(),
                ));
            }
        }

        if !self.gateway.is_configured() {
            return Err(ServiceError::ServiceUnavailable(
                "payment gateway not configured".to_string(),
            ));
        }

        // Rounding happens once, on the sum, so the remote amount matches
        // the decimal total of the bundle regardless of how it is split.
        let total: Decimal = orders.iter().map(|o| o.total_amount).sum();
        let amount_minor = to_minor_units(total)?;
        let receipt = format!("bundle_{}_{}", caller_id, Utc::now().timestamp_millis());

        let reference = self
            .gateway
            .create_remote_order(amount_minor, &self.currency, &receipt)
            .await?;

        let txn = self.db.begin().await?;
        let stamped = Order::update_many()
            .col_expr(
                order::Column::GatewayOrderId,
                Expr::value(Some(reference.clone())),
            )
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::PENDING),
            )
            .filter(order::Column::Id.is_in(ids.clone()))
            .filter(order::Column::PaymentStatus.ne(PaymentStatus::PAID))
            .exec(&txn)
            .await?;

        if stamped.rows_affected != ids.len() as u64 {
            // A payment landed between the precondition read and the
            // write; dropping the transaction rolls back every stamp.
            return Err(ServiceError::Conflict(
                "bundle contains an already paid order".to_string(),
            ));
        }
        txn.commit().await?;

        info!(gateway_order_id = %reference, amount_minor, orders = ids.len(), "bundle charge created");
        self.send_event(Event::ChargeCreated {
            order_ids: ids.clone(),
            gateway_order_id: reference.clone(),
            amount_minor,
        })
        .await;

        Ok(ChargeResponse {
            gateway_order_id: reference,
            amount_minor,
            currency: self.currency.clone(),
            order_ids: ids,
        })
    }

    /// Folds a gateway-reported outcome into one order.
    ///
    /// The reported status is normalized case-insensitively (`SUCCESS`
    /// and `PAID` both mean paid, unknown statuses are stored verbatim
    /// uppercased); re-reporting the same outcome is harmless. An order
    /// that is already PAID never moves away from it.
    #[instrument(skip(self, callback), fields(order_id = %order_id))]
    pub async fn reconcile(
        &self,
        order_id: Uuid,
        callback: GatewayCallback,
    ) -> Result<PaymentView, ServiceError> {
        let existing = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("order not found".to_string()))?;

        let new_status = PaymentStatus::from_reported(callback.status.as_deref());
        guard_paid_regression(&existing.payment_status, &new_status)?;

        let updated = self
            .apply_status(&*self.db, &[order_id], &callback, &new_status)
            .await?;
        if updated == 0 {
            // The guard in the write itself caught a payment that landed
            // after our read.
            return Err(ServiceError::Conflict(
                "order is already paid".to_string(),
            ));
        }

        if existing.payment_status != new_status.as_str() {
            self.send_event(Event::PaymentStatusChanged {
                order_id,
                old_status: existing.payment_status,
                new_status: new_status.as_str().to_string(),
            })
            .await;
        }

        info!(status = new_status.as_str(), "payment reconciled");
        Ok(PaymentView {
            order_id,
            payment_status: new_status.as_str().to_string(),
            gateway_order_id: existing.gateway_order_id,
            gateway_payment_id: callback
                .payment_ref
                .clone()
                .or(existing.gateway_payment_id),
        })
    }

    /// Applies one gateway-reported outcome uniformly to a bundle.
    ///
    /// Ownership of every order and the PAID invariant are re-checked
    /// before anything is written; a single violation leaves the whole
    /// set untouched.
    #[instrument(skip(self, order_ids, callback), fields(caller_id = %caller_id, count = order_ids.len()))]
    pub async fn reconcile_bundle(
        &self,
        order_ids: &[Uuid],
        caller_id: Uuid,
        callback: GatewayCallback,
    ) -> Result<Vec<PaymentView>, ServiceError> {
        let ids = distinct_ids(order_ids)?;

        let orders = Order::find()
            .filter(order::Column::Id.is_in(ids.clone()))
            .all(&*self.db)
            .await?;
        if orders.len() != ids.len() {
            return Err(ServiceError::NotFound(
                "one or more orders not found".to_string(),
            ));
        }

        let new_status = PaymentStatus::from_reported(callback.status.as_deref());
        for ord in &orders {
            if ord.customer_id != caller_id {
                return Err(ServiceError::Forbidden("not your order".to_string()));
            }
            guard_paid_regression(&ord.payment_status, &new_status)?;
        }

        let txn = self.db.begin().await?;
        let updated = self.apply_status(&txn, &ids, &callback, &new_status).await?;
        if updated != ids.len() as u64 {
            return Err(ServiceError::Conflict(
                "order is already paid".to_string(),
            ));
        }
        txn.commit().await?;

        for ord in &orders {
            if ord.payment_status != new_status.as_str() {
                self.send_event(Event::PaymentStatusChanged {
                    order_id: ord.id,
                    old_status: ord.payment_status.clone(),
                    new_status: new_status.as_str().to_string(),
                })
                .await;
            }
        }

        info!(status = new_status.as_str(), orders = ids.len(), "bundle reconciled");
        Ok(orders
            .into_iter()
            .map(|ord| PaymentView {
                order_id: ord.id,
                payment_status: new_status.as_str().to_string(),
                gateway_order_id: ord.gateway_order_id,
                gateway_payment_id: callback.payment_ref.clone().or(ord.gateway_payment_id),
            })
            .collect())
    }

    /// Writes the normalized status (plus payment reference and signature
    /// when present) to the given orders. Unless the new status is PAID
    /// itself, the statement refuses to touch a PAID row, making the
    /// invariant hold even against a concurrent payment.
    async fn apply_status<C: sea_orm::ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[Uuid],
        callback: &GatewayCallback,
        new_status: &PaymentStatus,
    ) -> Result<u64, ServiceError> {
        let mut update = Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(new_status.as_str()),
            )
            .filter(order::Column::Id.is_in(ids.iter().copied()));

        if let Some(payment_ref) = non_blank(callback.payment_ref.as_deref()) {
            update = update.col_expr(
                order::Column::GatewayPaymentId,
                Expr::value(Some(payment_ref.to_string())),
            );
        }
        if let Some(signature) = non_blank(callback.signature.as_deref()) {
            update = update.col_expr(
                order::Column::GatewaySignature,
                Expr::value(Some(signature.to_string())),
            );
        }
        if *new_status != PaymentStatus::Paid {
            update = update.filter(order::Column::PaymentStatus.ne(PaymentStatus::PAID));
        }

        let result = update.exec(conn).await?;
        Ok(result.rows_affected)
    }

    async fn send_event(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to send payment event");
            }
        }
    }
}

fn distinct_ids(order_ids: &[Uuid]) -> Result<Vec<Uuid>, ServiceError> {
    if order_ids.is_empty() {
        return Err(ServiceError::ValidationError(
            "at least one order id is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    Ok(order_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn guard_paid_regression(current: &str, new_status: &PaymentStatus) -> Result<(), ServiceError> {
    if current == PaymentStatus::PAID && *new_status != PaymentStatus::Paid {
        return Err(ServiceError::Conflict(
            "order is already paid".to_string(),
        ));
    }
    Ok(())
}
