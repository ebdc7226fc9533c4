use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::common::{created_response, non_negative_decimal, success_response, validate_input};
use crate::{
    errors::ServiceError,
    models::{ConversionPreview, ProductConversion, ProductConversionInput},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct ProductConversionRequest {
    pub source_product_id: Uuid,
    pub destination_product_id: Uuid,
    #[validate(custom = "positive_factor")]
    pub conversion_factor: Decimal,
    #[validate(custom = "percentage")]
    pub waste_percentage: Option<Decimal>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

fn positive_factor(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("conversion_factor");
        err.message = Some("conversion_factor must be greater than zero".into());
        Err(err)
    }
}

fn percentage(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO && *value <= Decimal::ONE_HUNDRED {
        Ok(())
    } else {
        let mut err = ValidationError::new("waste_percentage");
        err.message = Some("waste_percentage must be between 0 and 100".into());
        Err(err)
    }
}

impl From<ProductConversionRequest> for ProductConversionInput {
    fn from(req: ProductConversionRequest) -> Self {
        Self {
            source_product_id: req.source_product_id,
            destination_product_id: req.destination_product_id,
            conversion_factor: req.conversion_factor,
            waste_percentage: req.waste_percentage,
            is_active: req.is_active,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversionListQuery {
    pub source_product_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PreviewQuery {
    pub source_product_id: Uuid,
    pub destination_product_id: Uuid,
    #[validate(custom = "non_negative_decimal")]
    pub quantity: Decimal,
}

pub fn product_conversions_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_conversions).post(create_conversion))
        .route("/preview", get(preview_conversion))
        .route(
            "/:id",
            get(get_conversion)
                .put(update_conversion)
                .delete(delete_conversion),
        )
        .route("/:id/deactivate", post(deactivate_conversion))
}

pub async fn create_conversion(
    State(state): State<AppState>,
    Json(request): Json<ProductConversionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductConversion>>), ServiceError> {
    validate_input(&request)?;
    let conversion = state
        .services
        .conversions
        .create_conversion(request.into())
        .await?;
    Ok(created_response(conversion))
}

pub async fn list_conversions(
    State(state): State<AppState>,
    Query(query): Query<ConversionListQuery>,
) -> ApiResult<Vec<ProductConversion>> {
    let conversions = state
        .services
        .conversions
        .list_conversions(query.source_product_id)
        .await?;
    Ok(success_response(conversions))
}

pub async fn get_conversion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductConversion> {
    let conversion = state.services.conversions.get_conversion(id).await?;
    Ok(success_response(conversion))
}

pub async fn update_conversion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ProductConversionRequest>,
) -> ApiResult<ProductConversion> {
    validate_input(&request)?;
    let conversion = state
        .services
        .conversions
        .update_conversion(id, request.into())
        .await?;
    Ok(success_response(conversion))
}

pub async fn deactivate_conversion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductConversion> {
    let conversion = state.services.conversions.deactivate_conversion(id).await?;
    Ok(success_response(conversion))
}

pub async fn delete_conversion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.conversions.delete_conversion(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn preview_conversion(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<ConversionPreview> {
    validate_input(&query)?;
    let preview = state
        .services
        .conversions
        .preview(
            query.source_product_id,
            query.destination_product_id,
            query.quantity,
        )
        .await?;
    Ok(success_response(preview))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(50), Some(dec!(2)), true)]
    #[case(dec!(0), None, false)]
    #[case(dec!(-3), None, false)]
    #[case(dec!(1), Some(dec!(100)), true)]
    #[case(dec!(1), Some(dec!(100.01)), false)]
    #[case(dec!(1), Some(dec!(-0.5)), false)]
    fn request_bounds(
        #[case] factor: Decimal,
        #[case] waste: Option<Decimal>,
        #[case] valid: bool,
    ) {
        let request = ProductConversionRequest {
            source_product_id: Uuid::new_v4(),
            destination_product_id: Uuid::new_v4(),
            conversion_factor: factor,
            waste_percentage: waste,
            is_active: true,
        };
        assert_eq!(request.validate().is_ok(), valid);
    }
}
