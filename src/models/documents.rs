//! Downstream documents created from quotes: drafts handed to the sales-order and
//! purchase-order collaborators and the references they hand back.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SalesOrderLineDraft {
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Sales order contents copied from an accepted quote. Prices are never recomputed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SalesOrderDraft {
    pub quote_id: Uuid,
    pub quote_number: String,
    pub contact_id: Uuid,
    pub currency: String,
    pub lines: Vec<SalesOrderLineDraft>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderRef {
    pub id: Uuid,
    pub order_number: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderLineDraft {
    pub product_id: Uuid,
    pub quantity: Decimal,
}

/// One line per stock shortfall on the originating quote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderDraft {
    pub quote_id: Uuid,
    pub quote_number: String,
    pub currency: String,
    pub lines: Vec<PurchaseOrderLineDraft>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderRef {
    pub id: Uuid,
    pub po_number: String,
}

/// Result of purchase-order generation. `NoActionNeeded` is not an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurchaseOrderOutcome {
    Created(PurchaseOrderRef),
    NoActionNeeded,
}

/// Lifecycle of documents created by the engine. Sales orders start provisional until
/// the quote transition commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentStatus {
    Provisional,
    Draft,
    Confirmed,
    Voided,
}
