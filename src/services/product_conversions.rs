use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

use super::conversion_resolver::ProductConversionResolver;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::integrations::ProductCatalog;
use crate::models::product_conversion::{
    ConversionPreview, ProductConversion, ProductConversionInput,
};

/// Operator-facing management of product conversion factors.
#[derive(Clone)]
pub struct ProductConversionService {
    catalog: Arc<dyn ProductCatalog>,
    resolver: Arc<ProductConversionResolver>,
    event_sender: Arc<EventSender>,
    // Serializes the "one active conversion per pair" check with the write.
    write_lock: Arc<Mutex<()>>,
}

impl ProductConversionService {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        resolver: Arc<ProductConversionResolver>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            catalog,
            resolver,
            event_sender,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    #[instrument(
        skip(self, input),
        fields(
            source = %input.source_product_id,
            destination = %input.destination_product_id
        )
    )]
    pub async fn create_conversion(
        &self,
        input: ProductConversionInput,
    ) -> Result<ProductConversion, ServiceError> {
        input.validate_rules()?;
        let _guard = self.write_lock.lock().await;

        let now = Utc::now();
        let conversion = input.into_conversion(Uuid::new_v4(), now, now);
        self.ensure_unique_active(&conversion).await?;
        self.catalog.save_conversion(&conversion).await?;

        info!(conversion_id = %conversion.id, "Product conversion created");
        self.event_sender
            .publish(Event::ProductConversionSaved(conversion.id))
            .await;
        Ok(conversion)
    }

    #[instrument(skip(self, input), fields(conversion_id = %id))]
    pub async fn update_conversion(
        &self,
        id: Uuid,
        input: ProductConversionInput,
    ) -> Result<ProductConversion, ServiceError> {
        input.validate_rules()?;
        let _guard = self.write_lock.lock().await;

        let existing = self.get_conversion(id).await?;
        let conversion = input.into_conversion(id, existing.created_at, Utc::now());
        self.ensure_unique_active(&conversion).await?;
        self.catalog.save_conversion(&conversion).await?;

        info!("Product conversion updated");
        self.event_sender
            .publish(Event::ProductConversionSaved(id))
            .await;
        Ok(conversion)
    }

    #[instrument(skip(self), fields(conversion_id = %id))]
    pub async fn deactivate_conversion(&self, id: Uuid) -> Result<ProductConversion, ServiceError> {
        let _guard = self.write_lock.lock().await;

        let mut conversion = self.get_conversion(id).await?;
        if !conversion.is_active {
            return Ok(conversion);
        }
        conversion.is_active = false;
        conversion.updated_at = Utc::now();
        self.catalog.save_conversion(&conversion).await?;

        info!("Product conversion deactivated");
        self.event_sender
            .publish(Event::ProductConversionSaved(id))
            .await;
        Ok(conversion)
    }

    #[instrument(skip(self), fields(conversion_id = %id))]
    pub async fn delete_conversion(&self, id: Uuid) -> Result<(), ServiceError> {
        let _guard = self.write_lock.lock().await;

        if !self.catalog.delete_conversion(id).await? {
            return Err(ServiceError::not_found("Product conversion", id));
        }
        info!("Product conversion deleted");
        self.event_sender
            .publish(Event::ProductConversionDeleted(id))
            .await;
        Ok(())
    }

    pub async fn get_conversion(&self, id: Uuid) -> Result<ProductConversion, ServiceError> {
        self.catalog
            .find_conversion(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product conversion", id))
    }

    pub async fn list_conversions(
        &self,
        source_product_id: Option<Uuid>,
    ) -> Result<Vec<ProductConversion>, ServiceError> {
        self.catalog.list_conversions(source_product_id).await
    }

    pub async fn preview(
        &self,
        source_product_id: Uuid,
        destination_product_id: Uuid,
        destination_quantity: Decimal,
    ) -> Result<ConversionPreview, ServiceError> {
        if destination_quantity < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "quantity must not be negative".to_string(),
            ));
        }
        self.resolver
            .preview(
                source_product_id,
                destination_product_id,
                destination_quantity,
            )
            .await
    }

    async fn ensure_unique_active(
        &self,
        candidate: &ProductConversion,
    ) -> Result<(), ServiceError> {
        if !candidate.is_active {
            return Ok(());
        }
        let clash = self
            .catalog
            .list_conversions(Some(candidate.source_product_id))
            .await?
            .into_iter()
            .find(|other| {
                other.id != candidate.id
                    && other.is_active
                    && other.matches_pair(
                        candidate.source_product_id,
                        candidate.destination_product_id,
                    )
            });

        match clash {
            Some(other) => Err(ServiceError::ValidationError(format!(
                "an active conversion ({}) already exists for this product pair",
                other.id
            ))),
            None => Ok(()),
        }
    }
}
