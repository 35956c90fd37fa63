use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::product::{self, Entity as Product};
use crate::errors::ServiceError;

/// Catalog view of a product: just what order placement and listing need.
#[derive(Debug, Clone)]
pub struct CatalogProduct {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub price: Decimal,
    pub owner_id: Option<Uuid>,
}

impl From<product::Model> for CatalogProduct {
    fn from(model: product::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            category: model.category,
            price: model.price,
            owner_id: model.owner_id,
        }
    }
}

/// Read-only product lookup. The core never writes to the catalog;
/// listing management lives outside this crate.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<CatalogProduct>, ServiceError>;

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<CatalogProduct>, ServiceError>;

    /// Products owned by the given farmer.
    async fn owned_by(&self, owner_id: Uuid) -> Result<Vec<CatalogProduct>, ServiceError>;
}

/// Catalog backed by the `products` table.
pub struct DbProductCatalog {
    db: Arc<DbPool>,
}

impl DbProductCatalog {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductCatalog for DbProductCatalog {
    async fn get(&self, id: Uuid) -> Result<Option<CatalogProduct>, ServiceError> {
        let found = Product::find_by_id(id).one(&*self.db).await?;
        Ok(found.map(CatalogProduct::from))
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<CatalogProduct>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = Product::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .all(&*self.db)
            .await?;
        Ok(found.into_iter().map(CatalogProduct::from).collect())
    }

    async fn owned_by(&self, owner_id: Uuid) -> Result<Vec<CatalogProduct>, ServiceError> {
        let found = Product::find()
            .filter(product::Column::OwnerId.eq(owner_id))
            .all(&*self.db)
            .await?;
        Ok(found.into_iter().map(CatalogProduct::from).collect())
    }
}
