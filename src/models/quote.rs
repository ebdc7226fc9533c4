use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::documents::{SalesOrderDraft, SalesOrderLineDraft};

/// Lifecycle status of a quote.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
    Cancelled,
    Converted,
}

impl QuoteStatus {
    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::Converted)
    }

    /// Header fields and line items may only change in these statuses.
    pub fn is_editable(self) -> bool {
        matches!(self, Self::Draft | Self::Sent)
    }
}

/// Events accepted by the quote state machine.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuoteEvent {
    Send,
    Accept,
    Reject,
    Cancel,
    Convert,
    Duplicate,
}

/// A priced line on a quote. `line_total` is derived and never set by callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteLineItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
    pub position: i32,
}

impl QuoteLineItem {
    /// `quantity * unit_price`. Lines on a quote have already passed this check.
    pub fn gross_amount(&self) -> Result<Decimal, ServiceError> {
        checked_gross(self.quantity, self.unit_price)
    }

    fn recompute(&mut self) -> Result<(), ServiceError> {
        self.line_total = validate_line_amounts(
            self.quantity,
            self.unit_price,
            self.discount_amount,
            self.tax_amount,
        )?;
        Ok(())
    }
}

/// Input for a new line item. Prices and taxes arrive already resolved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewLineItem {
    pub product_id: Uuid,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_amount: Option<Decimal>,
    #[serde(default)]
    pub tax_amount: Option<Decimal>,
}

/// Partial update of an existing line item.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LineItemPatch {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
}

/// Editable header fields. Absent fields are left untouched; an empty string clears.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuoteHeaderPatch {
    pub estimated_eta: Option<String>,
    pub notes: Option<String>,
}

/// Monetary and quantity totals derived from the line items.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTotals {
    pub subtotal_amount: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub items_count: i32,
    pub total_quantity: Decimal,
}

impl QuoteTotals {
    /// Sums the lines; fails with `ValidationError` when a sum leaves the decimal range.
    pub fn from_lines(lines: &[QuoteLineItem]) -> Result<Self, ServiceError> {
        let mut totals = Self::default();
        for line in lines {
            totals.subtotal_amount = checked_sum(totals.subtotal_amount, line.gross_amount()?)?;
            totals.discount_amount = checked_sum(totals.discount_amount, line.discount_amount)?;
            totals.tax_amount = checked_sum(totals.tax_amount, line.tax_amount)?;
            totals.total_quantity = checked_sum(totals.total_quantity, line.quantity)?;
        }
        totals.items_count = lines.len() as i32;
        totals.total_amount = totals
            .subtotal_amount
            .checked_sub(totals.discount_amount)
            .and_then(|net| net.checked_add(totals.tax_amount))
            .ok_or_else(overflow)?;
        Ok(totals)
    }
}

/// The quote aggregate: header, owned line items and derived totals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub quote_number: String,
    pub status: QuoteStatus,
    pub contact_id: Uuid,
    pub currency: String,
    pub quote_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub estimated_eta: Option<String>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    #[serde(flatten)]
    pub totals: QuoteTotals,
    pub sales_order_id: Option<Uuid>,
    pub purchase_order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every persisted change.
    pub version: i32,
    pub lines: Vec<QuoteLineItem>,
}

/// Everything needed to open a new draft quote.
#[derive(Clone, Debug)]
pub struct QuoteDraft {
    pub quote_number: String,
    pub contact_id: Uuid,
    pub currency: String,
    pub quote_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub estimated_eta: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<NewLineItem>,
}

impl Quote {
    /// Opens a new quote in `draft`.
    pub fn new(id: Uuid, draft: QuoteDraft, now: DateTime<Utc>) -> Result<Self, ServiceError> {
        if draft.currency.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "currency is required".to_string(),
            ));
        }
        if let Some(valid_until) = draft.valid_until {
            if valid_until < draft.quote_date {
                return Err(ServiceError::ValidationError(
                    "valid_until must not precede quote_date".to_string(),
                ));
            }
        }

        let mut lines = Vec::with_capacity(draft.lines.len());
        for input in draft.lines {
            lines.push(build_line(input, lines.len())?);
        }
        let totals = QuoteTotals::from_lines(&lines)?;

        Ok(Self {
            id,
            quote_number: draft.quote_number,
            status: QuoteStatus::Draft,
            contact_id: draft.contact_id,
            currency: draft.currency.trim().to_ascii_uppercase(),
            quote_date: draft.quote_date,
            valid_until: draft.valid_until,
            estimated_eta: normalize_text(draft.estimated_eta),
            notes: normalize_text(draft.notes),
            rejection_reason: None,
            totals,
            sales_order_id: None,
            purchase_order_id: None,
            created_at: now,
            updated_at: now,
            sent_at: None,
            accepted_at: None,
            rejected_at: None,
            converted_at: None,
            version: 1,
            lines,
        })
    }

    pub fn can_edit(&self) -> bool {
        self.status.is_editable()
    }

    /// A sent quote past its validity date. Display only; it never changes the status.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == QuoteStatus::Sent
            && self
                .valid_until
                .map_or(false, |valid_until| valid_until < now.date_naive())
    }

    pub fn ensure_editable(&self) -> Result<(), ServiceError> {
        if self.can_edit() {
            Ok(())
        } else {
            Err(ServiceError::InvalidState(format!(
                "quote {} cannot be edited while {}",
                self.quote_number, self.status
            )))
        }
    }

    pub fn line(&self, line_id: Uuid) -> Option<&QuoteLineItem> {
        self.lines.iter().find(|line| line.id == line_id)
    }

    pub fn update_header(&mut self, patch: QuoteHeaderPatch) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        if let Some(eta) = patch.estimated_eta {
            self.estimated_eta = normalize_text(Some(eta));
        }
        if let Some(notes) = patch.notes {
            self.notes = normalize_text(Some(notes));
        }
        Ok(())
    }

    pub fn add_line(&mut self, input: NewLineItem) -> Result<Uuid, ServiceError> {
        self.ensure_editable()?;
        let line = build_line(input, self.lines.len())?;
        let id = line.id;
        let mut lines = self.lines.clone();
        lines.push(line);
        self.replace_lines(lines)?;
        Ok(id)
    }

    pub fn update_line(&mut self, line_id: Uuid, patch: LineItemPatch) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        let mut lines = self.lines.clone();
        let updated = lines
            .iter_mut()
            .find(|line| line.id == line_id)
            .ok_or_else(|| ServiceError::not_found("Quote line item", line_id))?;

        if let Some(description) = patch.description {
            updated.description = normalize_text(Some(description));
        }
        if let Some(quantity) = patch.quantity {
            updated.quantity = quantity;
        }
        if let Some(unit_price) = patch.unit_price {
            updated.unit_price = unit_price;
        }
        if let Some(discount) = patch.discount_amount {
            updated.discount_amount = discount;
        }
        if let Some(tax) = patch.tax_amount {
            updated.tax_amount = tax;
        }
        updated.recompute()?;
        self.replace_lines(lines)
    }

    pub fn remove_line(&mut self, line_id: Uuid) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        let mut lines = self.lines.clone();
        lines.retain(|line| line.id != line_id);
        if lines.len() == self.lines.len() {
            return Err(ServiceError::not_found("Quote line item", line_id));
        }
        for (index, line) in lines.iter_mut().enumerate() {
            line.position = index as i32;
        }
        self.replace_lines(lines)
    }

    /// Links a generated purchase order. Status is unaffected.
    pub fn link_purchase_order(&mut self, purchase_order_id: Uuid) -> Result<(), ServiceError> {
        if let Some(existing) = self.purchase_order_id {
            return Err(ServiceError::InvalidState(format!(
                "quote {} is already linked to purchase order {}",
                self.quote_number, existing
            )));
        }
        self.purchase_order_id = Some(purchase_order_id);
        Ok(())
    }

    /// Copy for `Duplicate`: same contact, currency and lines; fresh identity, draft status,
    /// no lifecycle timestamps and no downstream links.
    pub fn duplicate(
        &self,
        id: Uuid,
        quote_number: String,
        now: DateTime<Utc>,
    ) -> Result<Self, ServiceError> {
        let lines = self
            .lines
            .iter()
            .map(|line| NewLineItem {
                product_id: line.product_id,
                description: line.description.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount_amount: Some(line.discount_amount),
                tax_amount: Some(line.tax_amount),
            })
            .collect();

        Self::new(
            id,
            QuoteDraft {
                quote_number,
                contact_id: self.contact_id,
                currency: self.currency.clone(),
                quote_date: now.date_naive(),
                valid_until: None,
                estimated_eta: None,
                notes: None,
                lines,
            },
            now,
        )
    }

    /// Sales order copy of the quote: prices are carried over verbatim.
    pub fn sales_order_draft(&self) -> SalesOrderDraft {
        SalesOrderDraft {
            quote_id: self.id,
            quote_number: self.quote_number.clone(),
            contact_id: self.contact_id,
            currency: self.currency.clone(),
            lines: self
                .lines
                .iter()
                .map(|line| SalesOrderLineDraft {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
        }
    }

    /// Required quantity per product, summed over lines, in first-appearance order.
    pub fn product_requirements(&self) -> Vec<(Uuid, Decimal)> {
        let mut requirements: Vec<(Uuid, Decimal)> = Vec::new();
        for line in &self.lines {
            match requirements
                .iter_mut()
                .find(|(product_id, _)| *product_id == line.product_id)
            {
                Some((_, quantity)) => *quantity += line.quantity,
                None => requirements.push((line.product_id, line.quantity)),
            }
        }
        requirements
    }

    /// Marks a persisted change: bumps the version and the modification time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }

    /// Installs a new line set only if its totals can be computed.
    fn replace_lines(&mut self, lines: Vec<QuoteLineItem>) -> Result<(), ServiceError> {
        self.totals = QuoteTotals::from_lines(&lines)?;
        self.lines = lines;
        Ok(())
    }
}

fn build_line(input: NewLineItem, position: usize) -> Result<QuoteLineItem, ServiceError> {
    let mut line = QuoteLineItem {
        id: Uuid::new_v4(),
        product_id: input.product_id,
        description: normalize_text(input.description),
        quantity: input.quantity,
        unit_price: input.unit_price,
        discount_amount: input.discount_amount.unwrap_or(Decimal::ZERO),
        tax_amount: input.tax_amount.unwrap_or(Decimal::ZERO),
        line_total: Decimal::ZERO,
        position: position as i32,
    };
    line.recompute()?;
    Ok(line)
}

fn overflow() -> ServiceError {
    ServiceError::ValidationError("line amounts exceed the supported decimal range".to_string())
}

fn checked_gross(quantity: Decimal, unit_price: Decimal) -> Result<Decimal, ServiceError> {
    quantity.checked_mul(unit_price).ok_or_else(overflow)
}

fn checked_sum(acc: Decimal, value: Decimal) -> Result<Decimal, ServiceError> {
    acc.checked_add(value).ok_or_else(overflow)
}

/// Checks a line's amounts and returns its `line_total`.
fn validate_line_amounts(
    quantity: Decimal,
    unit_price: Decimal,
    discount_amount: Decimal,
    tax_amount: Decimal,
) -> Result<Decimal, ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "quantity must be greater than zero".to_string(),
        ));
    }
    if unit_price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "unit_price must not be negative".to_string(),
        ));
    }
    let gross = checked_gross(quantity, unit_price)?;
    if discount_amount < Decimal::ZERO || discount_amount > gross {
        return Err(ServiceError::ValidationError(
            "discount_amount must be between zero and quantity * unit_price".to_string(),
        ));
    }
    if tax_amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "tax_amount must not be negative".to_string(),
        ));
    }
    Ok(gross - discount_amount)
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
