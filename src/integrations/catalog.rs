use async_trait::async_trait;
use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::entities::product_conversion;
use crate::errors::ServiceError;
use crate::models::product_conversion::ProductConversion;

/// Read/write access to product conversion factors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// The active conversion for the ordered pair. When more than one is active the most
    /// recently updated wins.
    async fn get_conversion(
        &self,
        source_product_id: Uuid,
        destination_product_id: Uuid,
    ) -> Result<Option<ProductConversion>, ServiceError>;

    async fn find_conversion(&self, id: Uuid) -> Result<Option<ProductConversion>, ServiceError>;

    /// All conversions, optionally restricted to one source product.
    async fn list_conversions(
        &self,
        source_product_id: Option<Uuid>,
    ) -> Result<Vec<ProductConversion>, ServiceError>;

    /// Inserts or replaces by id.
    async fn save_conversion(&self, conversion: &ProductConversion) -> Result<(), ServiceError>;

    async fn delete_conversion(&self, id: Uuid) -> Result<bool, ServiceError>;
}

fn pick_latest(
    mut candidates: Vec<ProductConversion>,
    source: Uuid,
    destination: Uuid,
) -> Option<ProductConversion> {
    if candidates.len() > 1 {
        warn!(
            source_product_id = %source,
            destination_product_id = %destination,
            count = candidates.len(),
            "Multiple active conversions for product pair; using the most recently updated"
        );
    }
    candidates.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    candidates.into_iter().next()
}

#[derive(Debug, Clone)]
pub struct SeaOrmProductCatalog {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmProductCatalog {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<product_conversion::Model> for ProductConversion {
    fn from(model: product_conversion::Model) -> Self {
        Self {
            id: model.id,
            source_product_id: model.source_product_id,
            destination_product_id: model.destination_product_id,
            conversion_factor: model.conversion_factor,
            waste_percentage: model.waste_percentage,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[async_trait]
impl ProductCatalog for SeaOrmProductCatalog {
    async fn get_conversion(
        &self,
        source_product_id: Uuid,
        destination_product_id: Uuid,
    ) -> Result<Option<ProductConversion>, ServiceError> {
        let rows = product_conversion::Entity::find()
            .filter(product_conversion::Column::SourceProductId.eq(source_product_id))
            .filter(product_conversion::Column::DestinationProductId.eq(destination_product_id))
            .filter(product_conversion::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?;
        Ok(pick_latest(
            rows.into_iter().map(Into::into).collect(),
            source_product_id,
            destination_product_id,
        ))
    }

    async fn find_conversion(&self, id: Uuid) -> Result<Option<ProductConversion>, ServiceError> {
        Ok(product_conversion::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(Into::into))
    }

    async fn list_conversions(
        &self,
        source_product_id: Option<Uuid>,
    ) -> Result<Vec<ProductConversion>, ServiceError> {
        let mut query = product_conversion::Entity::find()
            .order_by_asc(product_conversion::Column::CreatedAt);
        if let Some(source) = source_product_id {
            query = query.filter(product_conversion::Column::SourceProductId.eq(source));
        }
        Ok(query
            .all(&*self.db)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn save_conversion(&self, conversion: &ProductConversion) -> Result<(), ServiceError> {
        let existing = product_conversion::Entity::find_by_id(conversion.id)
            .one(&*self.db)
            .await?;

        match existing {
            Some(model) => {
                let mut active = model.into_active_model();
                active.source_product_id = Set(conversion.source_product_id);
                active.destination_product_id = Set(conversion.destination_product_id);
                active.conversion_factor = Set(conversion.conversion_factor);
                active.waste_percentage = Set(conversion.waste_percentage);
                active.is_active = Set(conversion.is_active);
                active.updated_at = Set(conversion.updated_at);
                active.update(&*self.db).await?;
            }
            None => {
                product_conversion::ActiveModel {
                    id: Set(conversion.id),
                    source_product_id: Set(conversion.source_product_id),
                    destination_product_id: Set(conversion.destination_product_id),
                    conversion_factor: Set(conversion.conversion_factor),
                    waste_percentage: Set(conversion.waste_percentage),
                    is_active: Set(conversion.is_active),
                    created_at: Set(conversion.created_at),
                    updated_at: Set(conversion.updated_at),
                }
                .insert(&*self.db)
                .await?;
            }
        }
        Ok(())
    }

    async fn delete_conversion(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = product_conversion::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

/// Process-local conversion table.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProductCatalog {
    conversions: Arc<DashMap<Uuid, ProductConversion>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn get_conversion(
        &self,
        source_product_id: Uuid,
        destination_product_id: Uuid,
    ) -> Result<Option<ProductConversion>, ServiceError> {
        let candidates = self
            .conversions
            .iter()
            .filter(|entry| {
                entry.is_active && entry.matches_pair(source_product_id, destination_product_id)
            })
            .map(|entry| entry.value().clone())
            .collect();
        Ok(pick_latest(
            candidates,
            source_product_id,
            destination_product_id,
        ))
    }

    async fn find_conversion(&self, id: Uuid) -> Result<Option<ProductConversion>, ServiceError> {
        Ok(self.conversions.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_conversions(
        &self,
        source_product_id: Option<Uuid>,
    ) -> Result<Vec<ProductConversion>, ServiceError> {
        let mut conversions: Vec<ProductConversion> = self
            .conversions
            .iter()
            .filter(|entry| source_product_id.map_or(true, |id| entry.source_product_id == id))
            .map(|entry| entry.value().clone())
            .collect();
        conversions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(conversions)
    }

    async fn save_conversion(&self, conversion: &ProductConversion) -> Result<(), ServiceError> {
        self.conversions.insert(conversion.id, conversion.clone());
        Ok(())
    }

    async fn delete_conversion(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.conversions.remove(&id).is_some())
    }
}
