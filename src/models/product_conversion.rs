use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Declared ratio turning units of a stocked source product into units of a
/// destination product, with a waste allowance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductConversion {
    pub id: Uuid,
    pub source_product_id: Uuid,
    pub destination_product_id: Uuid,
    /// Destination units produced per one source unit.
    pub conversion_factor: Decimal,
    /// 0..=100
    pub waste_percentage: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductConversion {
    /// Usable yield per source unit: `factor * (1 - waste / 100)`.
    pub fn net_factor(&self) -> Decimal {
        self.conversion_factor * (Decimal::ONE - self.waste_percentage / ONE_HUNDRED)
    }

    /// Wasted destination units per source unit: `factor * (waste / 100)`.
    pub fn waste_factor(&self) -> Decimal {
        self.conversion_factor * (self.waste_percentage / ONE_HUNDRED)
    }

    pub fn matches_pair(&self, source: Uuid, destination: Uuid) -> bool {
        self.source_product_id == source && self.destination_product_id == destination
    }
}

/// Operator input for creating or replacing a conversion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductConversionInput {
    pub source_product_id: Uuid,
    pub destination_product_id: Uuid,
    pub conversion_factor: Decimal,
    #[serde(default)]
    pub waste_percentage: Option<Decimal>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ProductConversionInput {
    pub fn validate_rules(&self) -> Result<(), ServiceError> {
        if self.source_product_id == self.destination_product_id {
            return Err(ServiceError::ValidationError(
                "source and destination products must differ".to_string(),
            ));
        }
        if self.conversion_factor <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "conversion_factor must be greater than zero".to_string(),
            ));
        }
        let waste = self.waste_percentage.unwrap_or(Decimal::ZERO);
        if waste < Decimal::ZERO || waste > ONE_HUNDRED {
            return Err(ServiceError::ValidationError(
                "waste_percentage must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_conversion(
        self,
        id: Uuid,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ProductConversion {
        ProductConversion {
            id,
            source_product_id: self.source_product_id,
            destination_product_id: self.destination_product_id,
            conversion_factor: self.conversion_factor,
            waste_percentage: self.waste_percentage.unwrap_or(Decimal::ZERO),
            is_active: self.is_active,
            created_at,
            updated_at: now,
        }
    }
}

/// Net and waste destination quantities produced from a source quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionYield {
    pub net_quantity: Decimal,
    pub waste_quantity: Decimal,
}

/// Display figures for a conversion, truncated to 4 fractional digits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversionPreview {
    pub conversion_id: Uuid,
    pub destination_quantity: Decimal,
    pub required_source_quantity: Decimal,
    pub net_factor: Decimal,
    pub waste_factor: Decimal,
    pub net_quantity: Decimal,
    pub waste_quantity: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn conversion(factor: Decimal, waste: Decimal) -> ProductConversion {
        let now = Utc::now();
        ProductConversion {
            id: Uuid::new_v4(),
            source_product_id: Uuid::new_v4(),
            destination_product_id: Uuid::new_v4(),
            conversion_factor: factor,
            waste_percentage: waste,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn flour_sack_factors() {
        let conv = conversion(dec!(50), dec!(2));
        assert_eq!(conv.net_factor(), dec!(49));
        assert_eq!(conv.waste_factor(), dec!(1));
    }

    #[test]
    fn waste_factor_scales_percentage_first() {
        let conv = conversion(dec!(5_000_000_000_000_000_000_000_000_000), dec!(50));
        assert_eq!(conv.waste_factor(), conv.net_factor());
    }

    #[test]
    fn zero_waste_keeps_full_factor() {
        let conv = conversion(dec!(12.5), Decimal::ZERO);
        assert_eq!(conv.net_factor(), dec!(12.5));
        assert_eq!(conv.waste_factor(), Decimal::ZERO);
    }

    #[test]
    fn input_rules() {
        let product = Uuid::new_v4();
        let mut input = ProductConversionInput {
            source_product_id: product,
            destination_product_id: product,
            conversion_factor: dec!(1),
            waste_percentage: None,
            is_active: true,
        };
        assert_matches!(input.validate_rules(), Err(ServiceError::ValidationError(_)));

        input.destination_product_id = Uuid::new_v4();
        assert!(input.validate_rules().is_ok());

        input.conversion_factor = Decimal::ZERO;
        assert_matches!(input.validate_rules(), Err(ServiceError::ValidationError(_)));

        input.conversion_factor = dec!(2);
        input.waste_percentage = Some(dec!(100.01));
        assert_matches!(input.validate_rules(), Err(ServiceError::ValidationError(_)));

        input.waste_percentage = Some(dec!(100));
        assert!(input.validate_rules().is_ok());
    }
}
