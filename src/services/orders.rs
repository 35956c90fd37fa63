use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use sea_orm::ActiveModelTrait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::catalog::{CatalogProduct, ProductCatalog};
use crate::db::DbPool;
use crate::entities::order::{self, Entity as Order, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money::line_total;

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("address is required".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    pub product_id: Uuid,

    #[validate(range(min = 1, message = "quantity must be > 0"))]
    pub quantity: i32,

    #[validate(custom = "validate_not_blank")]
    pub address: String,
}

/// Partial update for an order; absent fields are left untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OrderPatch {
    pub quantity: Option<i32>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_category: String,
    pub quantity: i32,
    pub total_amount: Decimal,
    pub address: String,
    pub payment_status: String,
    pub order_status: String,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Order lifecycle: placement, owner-scoped edit/delete, and the customer
/// and farmer read projections.
///
/// Edits and deletes are refused once an order is PAID; that guard is
/// enforced in the WHERE clause of the write itself, not just on the
/// preceding read, so it holds under concurrent payment callbacks.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    catalog: Arc<dyn ProductCatalog>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        catalog: Arc<dyn ProductCatalog>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            catalog,
            event_sender,
        }
    }

    /// Places an order for the given customer.
    ///
    /// The total is computed from the product's current catalog price in
    /// decimal arithmetic, and the product's owner is denormalized onto
    /// the order as `farmer_id`.
    #[instrument(skip(self, request), fields(customer_id = %customer_id, product_id = %request.product_id))]
    pub async fn place(
        &self,
        customer_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;

        let product = self
            .catalog
            .get(request.product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("product not found".to_string()))?;

        let total_amount = line_total(product.price, request.quantity);
        let order_id = Uuid::new_v4();

        let model = order::ActiveModel {
            id: Set(order_id),
            customer_id: Set(customer_id),
            product_id: Set(product.id),
            farmer_id: Set(product.owner_id),
            quantity: Set(request.quantity),
            address: Set(request.address.trim().to_string()),
            total_amount: Set(total_amount),
            payment_status: Set(PaymentStatus::PENDING.to_string()),
            order_status: Set(OrderStatus::Created.to_string()),
            gateway_order_id: Set(None),
            gateway_payment_id: Set(None),
            gateway_signature: Set(None),
            created_at: Set(Utc::now()),
        };

        let saved = model.insert(&*self.db).await?;
        info!(order_id = %order_id, "order placed");

        self.send_event(Event::OrderCreated(order_id)).await;
        Ok(to_response(saved, Some(&product)))
    }

    /// Applies the provided fields to an order owned by `caller_id`.
    ///
    /// A quantity change recomputes the total from the product's
    /// *current* price: price changes between placement and edit are
    /// honored by design.
    #[instrument(skip(self, patch), fields(order_id = %order_id, caller_id = %caller_id))]
    pub async fn edit(
        &self,
        order_id: Uuid,
        caller_id: Uuid,
        patch: OrderPatch,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let existing = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("order not found".to_string()))?;

        if existing.customer_id != caller_id {
            return Err(ServiceError::Forbidden("not your order".to_string()));
        }
        if existing.payment_status == PaymentStatus::PAID {
            return Err(ServiceError::Conflict("cannot edit a paid order".to_string()));
        }

        let mut quantity = existing.quantity;
        let mut total_amount = existing.total_amount;
        let mut address = existing.address.clone();

        if let Some(new_quantity) = patch.quantity {
            if new_quantity <= 0 {
                return Err(ServiceError::ValidationError(
                    "quantity must be > 0".to_string(),
                ));
            }
            let product = self
                .catalog
                .get(existing.product_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound("product not found".to_string()))?;
            quantity = new_quantity;
            total_amount = line_total(product.price, new_quantity);
        }

        if let Some(new_address) = &patch.address {
            if !new_address.trim().is_empty() {
                address = new_address.trim().to_string();
            }
        }

        let updated = Order::update_many()
            .col_expr(order::Column::Quantity, Expr::value(quantity))
            .col_expr(order::Column::Address, Expr::value(address))
            .col_expr(order::Column::TotalAmount, Expr::value(total_amount))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.ne(PaymentStatus::PAID))
            .exec(&txn)
            .await?;

        if updated.rows_affected == 0 {
            return Err(ServiceError::Conflict("cannot edit a paid order".to_string()));
        }

        let refreshed = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InternalError("order vanished during edit".to_string()))?;
        txn.commit().await?;

        info!(order_id = %order_id, "order updated");
        self.send_event(Event::OrderUpdated(order_id)).await;

        let product = self.catalog.get(refreshed.product_id).await?;
        Ok(to_response(refreshed, product.as_ref()))
    }

    /// Hard-deletes an order owned by `caller_id`, unless it is PAID.
    #[instrument(skip(self), fields(order_id = %order_id, caller_id = %caller_id))]
    pub async fn delete(&self, order_id: Uuid, caller_id: Uuid) -> Result<(), ServiceError> {
        let existing = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("order not found".to_string()))?;

        if existing.customer_id != caller_id {
            return Err(ServiceError::Forbidden("not your order".to_string()));
        }
        if existing.payment_status == PaymentStatus::PAID {
            return Err(ServiceError::Conflict(
                "cannot delete a paid order".to_string(),
            ));
        }

        let deleted = Order::delete_many()
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.ne(PaymentStatus::PAID))
            .exec(&*self.db)
            .await?;

        if deleted.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "cannot delete a paid order".to_string(),
            ));
        }

        info!(order_id = %order_id, "order deleted");
        self.send_event(Event::OrderDeleted(order_id)).await;
        Ok(())
    }

    /// All orders placed by the customer, newest first.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = orders
            .iter()
            .map(|o| o.product_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let products = self.product_map(&product_ids).await?;

        Ok(orders
            .into_iter()
            .map(|o| {
                let product = products.get(&o.product_id);
                to_response(o, product)
            })
            .collect())
    }

    /// All orders referencing products currently owned by the farmer.
    ///
    /// This resolves the farmer's products first and then matches orders
    /// on `product_id`; the denormalized `farmer_id` column is not used
    /// because it reflects ownership at placement time only.
    #[instrument(skip(self), fields(farmer_id = %farmer_id))]
    pub async fn list_for_farmer(
        &self,
        farmer_id: Uuid,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let products = self.catalog.owned_by(farmer_id).await?;
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let product_map: HashMap<Uuid, CatalogProduct> =
            products.into_iter().map(|p| (p.id, p)).collect();

        let orders = Order::find()
            .filter(order::Column::ProductId.is_in(product_ids))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(orders
            .into_iter()
            .map(|o| {
                let product = product_map.get(&o.product_id);
                to_response(o, product)
            })
            .collect())
    }

    async fn product_map(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, CatalogProduct>, ServiceError> {
        let products = self.catalog.get_many(ids).await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn send_event(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to send order event");
            }
        }
    }
}

/// Builds the caller-facing projection; a product missing from the
/// catalog degrades to a placeholder name instead of failing the read.
fn to_response(order: order::Model, product: Option<&CatalogProduct>) -> OrderResponse {
    let product_name = product
        .map(|p| p.name.clone())
        .unwrap_or_else(|| format!("Product #{}", order.product_id));
    let product_category = product
        .map(|p| p.category.clone())
        .unwrap_or_else(|| "General".to_string());

    OrderResponse {
        id: order.id,
        product_id: order.product_id,
        product_name,
        product_category,
        quantity: order.quantity,
        total_amount: order.total_amount,
        address: order.address,
        payment_status: order.payment_status,
        order_status: order.order_status,
        gateway_order_id: order.gateway_order_id,
        gateway_payment_id: order.gateway_payment_id,
        created_at: order.created_at,
    }
}
