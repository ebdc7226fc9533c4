use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::inventory_level;
use crate::errors::ServiceError;

/// Read-only view of stock. The engine never reserves or decrements inventory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryGateway: Send + Sync {
    /// Available quantity summed across locations; zero when the product has no stock record.
    async fn available_quantity(&self, product_id: Uuid) -> Result<Decimal, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmInventory {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmInventory {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InventoryGateway for SeaOrmInventory {
    async fn available_quantity(&self, product_id: Uuid) -> Result<Decimal, ServiceError> {
        let levels = inventory_level::Entity::find()
            .filter(inventory_level::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?;
        Ok(levels.iter().map(|level| level.available_quantity).sum())
    }
}

/// Stock levels keyed by (product, location).
#[derive(Debug, Default, Clone)]
pub struct InMemoryInventory {
    levels: Arc<DashMap<(Uuid, Uuid), Decimal>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, product_id: Uuid, location_id: Uuid, quantity: Decimal) {
        self.levels.insert((product_id, location_id), quantity);
    }
}

#[async_trait]
impl InventoryGateway for InMemoryInventory {
    async fn available_quantity(&self, product_id: Uuid) -> Result<Decimal, ServiceError> {
        Ok(self
            .levels
            .iter()
            .filter(|entry| entry.key().0 == product_id)
            .map(|entry| *entry.value())
            .sum())
    }
}
