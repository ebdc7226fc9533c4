use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::integrations::ProductCatalog;
use crate::models::product_conversion::{ConversionPreview, ConversionYield, ProductConversion};

/// Fractional digits shown in conversion previews.
pub const PREVIEW_SCALE: u32 = 4;

/// Resolves conversion factors and computes source requirements and yields.
///
/// All arithmetic is fixed-point `Decimal`; results are never rounded here, only the
/// preview is truncated for display.
#[derive(Clone)]
pub struct ProductConversionResolver {
    catalog: Arc<dyn ProductCatalog>,
}

impl ProductConversionResolver {
    pub fn new(catalog: Arc<dyn ProductCatalog>) -> Self {
        Self { catalog }
    }

    /// The active conversion for the ordered (source, destination) pair.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        source_product_id: Uuid,
        destination_product_id: Uuid,
    ) -> Result<ProductConversion, ServiceError> {
        self.catalog
            .get_conversion(source_product_id, destination_product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No active conversion from product {} to product {}",
                    source_product_id, destination_product_id
                ))
            })
    }

    /// Source quantity needed to obtain `destination_quantity` net of waste.
    pub fn required_source(
        destination_quantity: Decimal,
        conversion: &ProductConversion,
    ) -> Result<Decimal, ServiceError> {
        let net_factor = conversion.net_factor();
        if net_factor <= Decimal::ZERO {
            return Err(ServiceError::DivisionByZero(format!(
                "conversion {} has no net yield (waste {}%)",
                conversion.id, conversion.waste_percentage
            )));
        }
        destination_quantity.checked_div(net_factor).ok_or_else(|| {
            ServiceError::DivisionByZero(format!(
                "required source quantity for conversion {} is out of range",
                conversion.id
            ))
        })
    }

    /// Net and waste destination quantities produced from `source_quantity`.
    /// Their sum is always `source_quantity * conversion_factor`.
    pub fn yield_from_source(
        source_quantity: Decimal,
        conversion: &ProductConversion,
    ) -> Result<ConversionYield, ServiceError> {
        let scale = |factor: Decimal| {
            source_quantity.checked_mul(factor).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "yield of {} source units through conversion {} is out of range",
                    source_quantity, conversion.id
                ))
            })
        };
        Ok(ConversionYield {
            net_quantity: scale(conversion.net_factor())?,
            waste_quantity: scale(conversion.waste_factor())?,
        })
    }

    /// Resolve followed by [`Self::required_source`].
    #[instrument(skip(self))]
    pub async fn source_requirement(
        &self,
        source_product_id: Uuid,
        destination_product_id: Uuid,
        destination_quantity: Decimal,
    ) -> Result<Decimal, ServiceError> {
        let conversion = self
            .resolve(source_product_id, destination_product_id)
            .await?;
        let required = Self::required_source(destination_quantity, &conversion)?;
        debug!(conversion_id = %conversion.id, %required, "Resolved source requirement");
        Ok(required)
    }

    /// Display figures for drawing `destination_quantity` through the active conversion.
    #[instrument(skip(self))]
    pub async fn preview(
        &self,
        source_product_id: Uuid,
        destination_product_id: Uuid,
        destination_quantity: Decimal,
    ) -> Result<ConversionPreview, ServiceError> {
        let conversion = self
            .resolve(source_product_id, destination_product_id)
            .await?;
        let required = Self::required_source(destination_quantity, &conversion)?;
        let produced = Self::yield_from_source(required, &conversion)?;

        Ok(ConversionPreview {
            conversion_id: conversion.id,
            destination_quantity,
            required_source_quantity: truncate(required),
            net_factor: truncate(conversion.net_factor()),
            waste_factor: truncate(conversion.waste_factor()),
            net_quantity: truncate(produced.net_quantity),
            waste_quantity: truncate(produced.waste_quantity),
        })
    }
}

fn truncate(value: Decimal) -> Decimal {
    value.trunc_with_scale(PREVIEW_SCALE).normalize()
}
