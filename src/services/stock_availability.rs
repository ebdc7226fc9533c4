use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::integrations::InventoryGateway;

/// Classification of one requirement against available stock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LineAvailability {
    /// available >= required
    Sufficient,
    /// 0 < available < required
    Insufficient { available: Decimal, required: Decimal },
    /// Nothing available (including no stock record or a negative balance).
    Unavailable,
}

impl LineAvailability {
    pub fn classify(required: Decimal, available: Decimal) -> Self {
        if available <= Decimal::ZERO {
            LineAvailability::Unavailable
        } else if available >= required {
            LineAvailability::Sufficient
        } else {
            LineAvailability::Insufficient {
                available,
                required,
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCheckLine {
    pub product_id: Uuid,
    pub required: Decimal,
    pub available: Decimal,
    pub availability: LineAvailability,
}

impl StockCheckLine {
    /// Quantity to purchase: `required - available`, or all of `required` when unavailable.
    pub fn shortfall(&self) -> Decimal {
        match self.availability {
            LineAvailability::Sufficient => Decimal::ZERO,
            LineAvailability::Insufficient {
                available,
                required,
            } => required - available,
            LineAvailability::Unavailable => self.required,
        }
    }
}

/// Advisory, read-only stock check. Nothing is reserved.
#[derive(Clone)]
pub struct StockAvailabilityChecker {
    inventory: Arc<dyn InventoryGateway>,
}

impl StockAvailabilityChecker {
    pub fn new(inventory: Arc<dyn InventoryGateway>) -> Self {
        Self { inventory }
    }

    #[instrument(skip(self, requirements), fields(lines = requirements.len()))]
    pub async fn check(
        &self,
        requirements: &[(Uuid, Decimal)],
    ) -> Result<Vec<StockCheckLine>, ServiceError> {
        let mut lines = Vec::with_capacity(requirements.len());
        for &(product_id, required) in requirements {
            let available = self
                .inventory
                .available_quantity(product_id)
                .await
                .map_err(|e| {
                    ServiceError::DownstreamFailure(format!(
                        "inventory lookup for product {} failed: {}",
                        product_id, e
                    ))
                })?;
            let availability = LineAvailability::classify(required, available);
            debug!(%product_id, %required, %available, ?availability, "Classified stock line");
            lines.push(StockCheckLine {
                product_id,
                required,
                available,
                availability,
            });
        }
        Ok(lines)
    }
}
