use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;
use validator::Validate;

use super::common::{
    created_response, non_negative_decimal, positive_decimal, success_response, validate_input,
};
use crate::{
    errors::ServiceError,
    models::{
        LineItemPatch, NewLineItem, PurchaseOrderOutcome, Quote, QuoteEvent, QuoteHeaderPatch,
        QuoteStatus, SalesOrderRef,
    },
    repositories::QuoteFilter,
    services::{
        quote_state::QuoteStateMachine, quotes::CreateQuote, stock_availability::StockCheckLine,
    },
    ApiResult, AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct LineItemRequest {
    pub product_id: Uuid,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(custom = "positive_decimal")]
    pub quantity: Decimal,
    #[validate(custom = "non_negative_decimal")]
    pub unit_price: Decimal,
    #[validate(custom = "non_negative_decimal")]
    pub discount_amount: Option<Decimal>,
    #[validate(custom = "non_negative_decimal")]
    pub tax_amount: Option<Decimal>,
}

impl From<LineItemRequest> for NewLineItem {
    fn from(req: LineItemRequest) -> Self {
        Self {
            product_id: req.product_id,
            description: req.description,
            quantity: req.quantity,
            unit_price: req.unit_price,
            discount_amount: req.discount_amount,
            tax_amount: req.tax_amount,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuoteRequest {
    pub contact_id: Uuid,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub quote_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    #[validate(length(max = 255))]
    pub estimated_eta: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate]
    #[serde(default)]
    pub lines: Vec<LineItemRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuoteRequest {
    #[validate(length(max = 255))]
    pub estimated_eta: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLineItemRequest {
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(custom = "positive_decimal")]
    pub quantity: Option<Decimal>,
    #[validate(custom = "non_negative_decimal")]
    pub unit_price: Option<Decimal>,
    #[validate(custom = "non_negative_decimal")]
    pub discount_amount: Option<Decimal>,
    #[validate(custom = "non_negative_decimal")]
    pub tax_amount: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RejectQuoteRequest {
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuoteListQuery {
    pub status: Option<QuoteStatus>,
    pub contact_id: Option<Uuid>,
}

/// Quote as returned over HTTP, with the actions its current status allows.
#[derive(Debug, Serialize)]
pub struct QuoteView {
    #[serde(flatten)]
    pub quote: Quote,
    pub available_events: Vec<QuoteEvent>,
    pub can_edit: bool,
    pub is_expired: bool,
}

impl From<Quote> for QuoteView {
    fn from(quote: Quote) -> Self {
        Self {
            available_events: QuoteStateMachine::available_events(&quote),
            can_edit: quote.can_edit(),
            is_expired: quote.is_expired(Utc::now()),
            quote,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StockAvailabilityView {
    pub quote_id: Uuid,
    pub all_sufficient: bool,
    pub lines: Vec<StockCheckLine>,
}

pub fn quotes_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_quotes).post(create_quote))
        .route(
            "/:id",
            get(get_quote).patch(update_quote).delete(delete_quote),
        )
        .route("/:id/lines", post(add_line_item))
        .route(
            "/:id/lines/:line_id",
            put(update_line_item).delete(remove_line_item),
        )
        .route("/:id/send", post(send_quote))
        .route("/:id/accept", post(accept_quote))
        .route("/:id/reject", post(reject_quote))
        .route("/:id/cancel", post(cancel_quote))
        .route("/:id/duplicate", post(duplicate_quote))
        .route("/:id/convert", post(convert_quote))
        .route("/:id/purchase-order", post(generate_purchase_order))
        .route("/:id/stock-availability", get(stock_availability))
}

fn operation_deadline(state: &AppState) -> Option<Instant> {
    state
        .config
        .operation_deadline()
        .map(|budget| Instant::now() + budget)
}

pub async fn create_quote(
    State(state): State<AppState>,
    Json(request): Json<CreateQuoteRequest>,
) -> Result<(StatusCode, Json<crate::ApiResponse<QuoteView>>), ServiceError> {
    validate_input(&request)?;

    let quote = state
        .services
        .quotes
        .create_quote(CreateQuote {
            contact_id: request.contact_id,
            currency: request.currency,
            quote_date: request.quote_date,
            valid_until: request.valid_until,
            estimated_eta: request.estimated_eta,
            notes: request.notes,
            lines: request.lines.into_iter().map(NewLineItem::from).collect(),
        })
        .await?;
    Ok(created_response(quote.into()))
}

pub async fn list_quotes(
    State(state): State<AppState>,
    Query(query): Query<QuoteListQuery>,
) -> ApiResult<Vec<QuoteView>> {
    let quotes = state
        .services
        .quotes
        .list_quotes(QuoteFilter {
            status: query.status,
            contact_id: query.contact_id,
        })
        .await?;
    Ok(success_response(
        quotes.into_iter().map(QuoteView::from).collect(),
    ))
}

pub async fn get_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<QuoteView> {
    let quote = state.services.quotes.get_quote(id).await?;
    Ok(success_response(quote.into()))
}

pub async fn update_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateQuoteRequest>,
) -> ApiResult<QuoteView> {
    validate_input(&request)?;
    let quote = state
        .services
        .quotes
        .update_header(
            id,
            QuoteHeaderPatch {
                estimated_eta: request.estimated_eta,
                notes: request.notes,
            },
        )
        .await?;
    Ok(success_response(quote.into()))
}

pub async fn delete_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.quotes.delete_quote(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_line_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<LineItemRequest>,
) -> Result<(StatusCode, Json<crate::ApiResponse<QuoteView>>), ServiceError> {
    validate_input(&request)?;
    let quote = state
        .services
        .quotes
        .add_line_item(id, request.into())
        .await?;
    Ok(created_response(quote.into()))
}

pub async fn update_line_item(
    State(state): State<AppState>,
    Path((id, line_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateLineItemRequest>,
) -> ApiResult<QuoteView> {
    validate_input(&request)?;
    let quote = state
        .services
        .quotes
        .update_line_item(
            id,
            line_id,
            LineItemPatch {
                description: request.description,
                quantity: request.quantity,
                unit_price: request.unit_price,
                discount_amount: request.discount_amount,
                tax_amount: request.tax_amount,
            },
        )
        .await?;
    Ok(success_response(quote.into()))
}

pub async fn remove_line_item(
    State(state): State<AppState>,
    Path((id, line_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<QuoteView> {
    let quote = state
        .services
        .quotes
        .remove_line_item(id, line_id)
        .await?;
    Ok(success_response(quote.into()))
}

pub async fn send_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<QuoteView> {
    let quote = state.services.quotes.send_quote(id).await?;
    Ok(success_response(quote.into()))
}

pub async fn accept_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<QuoteView> {
    let quote = state.services.quotes.accept_quote(id).await?;
    Ok(success_response(quote.into()))
}

impl RejectQuoteRequest {
    /// An empty body means no reason; anything else must be a valid request.
    fn from_body(body: &[u8]) -> Result<Self, ServiceError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ServiceError::ValidationError(format!("invalid reject request: {}", e)))
    }
}

/// The body is optional; a bare POST rejects without a reason.
pub async fn reject_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<QuoteView> {
    let request = RejectQuoteRequest::from_body(&body)?;
    validate_input(&request)?;
    let quote = state
        .services
        .quotes
        .reject_quote(id, request.reason)
        .await?;
    Ok(success_response(quote.into()))
}

pub async fn cancel_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<QuoteView> {
    let quote = state.services.quotes.cancel_quote(id).await?;
    Ok(success_response(quote.into()))
}

pub async fn duplicate_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<crate::ApiResponse<QuoteView>>), ServiceError> {
    let quote = state.services.quotes.duplicate_quote(id).await?;
    Ok(created_response(quote.into()))
}

pub async fn convert_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<crate::ApiResponse<SalesOrderRef>>), ServiceError> {
    let deadline = operation_deadline(&state);
    let sales_order = state.services.quotes.convert_quote(id, deadline).await?;
    Ok(created_response(sales_order))
}

/// 201 with the purchase order reference, or 200 when stock already covers the quote.
pub async fn generate_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let deadline = operation_deadline(&state);
    let outcome = state
        .services
        .quotes
        .generate_purchase_order(id, deadline)
        .await?;
    Ok(match outcome {
        PurchaseOrderOutcome::Created(_) => created_response(outcome).into_response(),
        PurchaseOrderOutcome::NoActionNeeded => success_response(outcome).into_response(),
    })
}

pub async fn stock_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StockAvailabilityView> {
    let lines = state.services.quotes.stock_availability(id).await?;
    Ok(success_response(StockAvailabilityView {
        quote_id: id,
        all_sufficient: lines.iter().all(|line| line.shortfall() == Decimal::ZERO),
        lines,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn reject_body_is_optional_but_must_parse() {
        assert_eq!(RejectQuoteRequest::from_body(b"").unwrap().reason, None);
        assert_eq!(RejectQuoteRequest::from_body(b"  \n").unwrap().reason, None);
        assert_eq!(
            RejectQuoteRequest::from_body(br#"{"reason":"too expensive"}"#)
                .unwrap()
                .reason
                .as_deref(),
            Some("too expensive")
        );
        assert_matches!(
            RejectQuoteRequest::from_body(br#"{"reason":5}"#),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            RejectQuoteRequest::from_body(b"reason=late"),
            Err(ServiceError::ValidationError(_))
        );
    }

    fn line(quantity: Decimal, unit_price: Decimal) -> LineItemRequest {
        LineItemRequest {
            product_id: Uuid::new_v4(),
            description: None,
            quantity,
            unit_price,
            discount_amount: None,
            tax_amount: Some(dec!(0)),
        }
    }

    #[test]
    fn create_request_validates_nested_lines() {
        let mut request = CreateQuoteRequest {
            contact_id: Uuid::new_v4(),
            currency: Some("EUR".to_string()),
            quote_date: None,
            valid_until: None,
            estimated_eta: None,
            notes: None,
            lines: vec![line(dec!(2), dec!(10))],
        };
        assert!(request.validate().is_ok());

        request.lines.push(line(dec!(0), dec!(10)));
        assert!(request.validate().is_err());
    }

    #[test]
    fn currency_must_be_three_letters() {
        let request = CreateQuoteRequest {
            contact_id: Uuid::new_v4(),
            currency: Some("EURO".to_string()),
            quote_date: None,
            valid_until: None,
            estimated_eta: None,
            notes: None,
            lines: Vec::new(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn negative_patch_values_are_rejected() {
        let patch = UpdateLineItemRequest {
            description: None,
            quantity: None,
            unit_price: Some(dec!(-1)),
            discount_amount: None,
            tax_amount: None,
        };
        assert!(patch.validate().is_err());
    }
}
