use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::quote_locks::QuoteLocks;
use super::quote_state::{QuoteCommand, QuoteStateMachine};
use super::stock_availability::{StockAvailabilityChecker, StockCheckLine};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::integrations::{PurchaseOrderGateway, SalesOrderGateway};
use crate::metrics;
use crate::models::documents::{
    PurchaseOrderDraft, PurchaseOrderLineDraft, PurchaseOrderOutcome, SalesOrderRef,
};
use crate::models::quote::{Quote, QuoteEvent, QuoteStatus};
use crate::repositories::QuoteStore;

/// Turns quotes into downstream documents.
///
/// `convert` is two-phase: the sales order is created provisional, the quote is moved to
/// `converted` with a version compare-and-set, and only then is the order confirmed.
/// A lost race or failed write voids the provisional order; a failed confirmation rolls
/// the quote back to `accepted` before the order is voided.
#[derive(Clone)]
pub struct ConversionOrchestrator {
    store: Arc<dyn QuoteStore>,
    sales_orders: Arc<dyn SalesOrderGateway>,
    purchase_orders: Arc<dyn PurchaseOrderGateway>,
    stock: StockAvailabilityChecker,
    locks: QuoteLocks,
    event_sender: Arc<EventSender>,
    max_attempts: u32,
}

impl ConversionOrchestrator {
    pub fn new(
        store: Arc<dyn QuoteStore>,
        sales_orders: Arc<dyn SalesOrderGateway>,
        purchase_orders: Arc<dyn PurchaseOrderGateway>,
        stock: StockAvailabilityChecker,
        locks: QuoteLocks,
        event_sender: Arc<EventSender>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            sales_orders,
            purchase_orders,
            stock,
            locks,
            event_sender,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Fails with `NotConvertible` unless the quote is accepted and unlinked, and with
    /// `EmptyQuote` when it has no lines.
    pub fn ensure_convertible(quote: &Quote) -> Result<(), ServiceError> {
        if quote.status != QuoteStatus::Accepted {
            return Err(ServiceError::NotConvertible(
                quote.id,
                format!("status is {}", quote.status),
            ));
        }
        if let Some(existing) = quote.sales_order_id {
            return Err(ServiceError::NotConvertible(
                quote.id,
                format!("already linked to sales order {}", existing),
            ));
        }
        if quote.lines.is_empty() {
            return Err(ServiceError::EmptyQuote(quote.id));
        }
        Ok(())
    }

    pub async fn convert(&self, quote_id: Uuid) -> Result<SalesOrderRef, ServiceError> {
        self.convert_with_deadline(quote_id, None).await
    }

    /// `deadline` is only honoured before the first write.
    #[instrument(skip(self), fields(quote_id = %quote_id))]
    pub async fn convert_with_deadline(
        &self,
        quote_id: Uuid,
        deadline: Option<Instant>,
    ) -> Result<SalesOrderRef, ServiceError> {
        let result = self.try_convert(quote_id, deadline).await;
        if let Err(e) = &result {
            metrics::record_rejected("convert", e.code());
        }
        result
    }

    async fn try_convert(
        &self,
        quote_id: Uuid,
        deadline: Option<Instant>,
    ) -> Result<SalesOrderRef, ServiceError> {
        let _guard = self.locks.acquire(quote_id).await;

        for attempt in 1..=self.max_attempts {
            let quote = self.load(quote_id).await?;
            Self::ensure_convertible(&quote)?;
            ensure_before_deadline(deadline, "creating the sales order")?;

            let order = self
                .sales_orders
                .create_provisional(&quote.sales_order_draft())
                .await
                .map_err(|e| {
                    error!(error = %e, "Sales order creation failed");
                    ServiceError::DownstreamFailure(format!("sales order creation failed: {}", e))
                })?;

            let mut converted = quote.clone();
            let now = Utc::now();
            if let Err(e) = QuoteStateMachine::apply(
                &mut converted,
                QuoteCommand::Convert {
                    sales_order_id: order.id,
                },
                now,
            ) {
                self.void_sales_order(order.id).await;
                return Err(e);
            }
            converted.touch(now);

            match self.store.update(&converted, quote.version).await {
                Ok(true) => {}
                Ok(false) => {
                    metrics::record_version_conflict();
                    warn!(
                        attempt,
                        sales_order_id = %order.id,
                        "Quote changed during conversion; voiding provisional order"
                    );
                    self.void_sales_order(order.id).await;
                    continue;
                }
                Err(e) => {
                    error!(error = %e, sales_order_id = %order.id, "Failed to persist conversion");
                    self.void_sales_order(order.id).await;
                    return Err(e);
                }
            }

            if let Err(e) = self.sales_orders.confirm(order.id).await {
                error!(
                    error = %e,
                    sales_order_id = %order.id,
                    "Sales order confirmation failed; rolling back conversion"
                );
                return Err(self.compensate_confirmation(quote_id, order.id, e).await);
            }

            metrics::record_conversion();
            metrics::record_transition(QuoteEvent::Convert.as_ref());
            info!(
                sales_order_id = %order.id,
                order_number = %order.order_number,
                "Quote converted to sales order"
            );
            self.event_sender
                .publish(Event::QuoteStatusChanged {
                    quote_id,
                    from: QuoteStatus::Accepted,
                    to: QuoteStatus::Converted,
                })
                .await;
            self.event_sender
                .publish(Event::QuoteConverted {
                    quote_id,
                    sales_order_id: order.id,
                })
                .await;
            return Ok(order);
        }

        Err(ServiceError::ConcurrentModification(quote_id))
    }

    /// Rolls the committed conversion back, then voids the order. Returns the error to report.
    async fn compensate_confirmation(
        &self,
        quote_id: Uuid,
        sales_order_id: Uuid,
        cause: ServiceError,
    ) -> ServiceError {
        match self.rollback_conversion(quote_id, sales_order_id).await {
            Ok(()) => {
                metrics::record_compensation("quote_rollback");
                self.void_sales_order(sales_order_id).await;
                ServiceError::DownstreamFailure(format!(
                    "sales order {} could not be confirmed: {}; quote restored to accepted",
                    sales_order_id, cause
                ))
            }
            Err(rollback_error) => {
                error!(
                    error = %rollback_error,
                    %sales_order_id,
                    "Conversion rollback failed; quote remains linked to an unconfirmed sales order"
                );
                ServiceError::DownstreamFailure(format!(
                    "sales order {} could not be confirmed: {}; rollback failed: {}",
                    sales_order_id, cause, rollback_error
                ))
            }
        }
    }

    async fn rollback_conversion(
        &self,
        quote_id: Uuid,
        sales_order_id: Uuid,
    ) -> Result<(), ServiceError> {
        for _ in 0..self.max_attempts {
            let current = self.load(quote_id).await?;
            if current.sales_order_id != Some(sales_order_id) {
                return Ok(());
            }
            let mut reverted = current.clone();
            QuoteStateMachine::revert_conversion(&mut reverted, sales_order_id)?;
            reverted.touch(Utc::now());
            if self.store.update(&reverted, current.version).await? {
                warn!(%quote_id, %sales_order_id, "Conversion rolled back");
                return Ok(());
            }
            metrics::record_version_conflict();
        }
        Err(ServiceError::ConcurrentModification(quote_id))
    }

    async fn void_sales_order(&self, sales_order_id: Uuid) {
        match self.sales_orders.void(sales_order_id).await {
            Ok(()) => {
                metrics::record_compensation("void_sales_order");
                warn!(%sales_order_id, "Provisional sales order voided");
            }
            Err(e) => {
                metrics::record_compensation("void_sales_order_failed");
                error!(%sales_order_id, error = %e, "Failed to void sales order");
            }
        }
    }

    /// Read-only stock check over the quote's aggregated line requirements.
    #[instrument(skip(self), fields(quote_id = %quote_id))]
    pub async fn check_stock(&self, quote_id: Uuid) -> Result<Vec<StockCheckLine>, ServiceError> {
        let quote = self.load(quote_id).await?;
        self.stock.check(&quote.product_requirements()).await
    }

    pub async fn generate_purchase_order(
        &self,
        quote_id: Uuid,
    ) -> Result<PurchaseOrderOutcome, ServiceError> {
        self.generate_purchase_order_with_deadline(quote_id, None)
            .await
    }

    /// Drafts a purchase order covering every stock shortfall on the quote and links it.
    /// Returns `NoActionNeeded` without writing anything when stock covers every line.
    #[instrument(skip(self), fields(quote_id = %quote_id))]
    pub async fn generate_purchase_order_with_deadline(
        &self,
        quote_id: Uuid,
        deadline: Option<Instant>,
    ) -> Result<PurchaseOrderOutcome, ServiceError> {
        let result = self.try_generate_purchase_order(quote_id, deadline).await;
        if let Err(e) = &result {
            metrics::record_rejected("generate_purchase_order", e.code());
        }
        result
    }

    async fn try_generate_purchase_order(
        &self,
        quote_id: Uuid,
        deadline: Option<Instant>,
    ) -> Result<PurchaseOrderOutcome, ServiceError> {
        let _guard = self.locks.acquire(quote_id).await;

        for attempt in 1..=self.max_attempts {
            let quote = self.load(quote_id).await?;
            ensure_purchasable(&quote)?;

            let report = self.stock.check(&quote.product_requirements()).await?;
            let lines: Vec<PurchaseOrderLineDraft> = report
                .iter()
                .filter_map(|line| {
                    let quantity = line.shortfall();
                    (quantity > rust_decimal::Decimal::ZERO).then(|| PurchaseOrderLineDraft {
                        product_id: line.product_id,
                        quantity,
                    })
                })
                .collect();

            if lines.is_empty() {
                info!("Stock covers every line; no purchase order needed");
                return Ok(PurchaseOrderOutcome::NoActionNeeded);
            }
            ensure_before_deadline(deadline, "creating the purchase order")?;

            let draft = PurchaseOrderDraft {
                quote_id,
                quote_number: quote.quote_number.clone(),
                currency: quote.currency.clone(),
                lines,
            };
            let order = self
                .purchase_orders
                .create_draft(&draft)
                .await
                .map_err(|e| {
                    error!(error = %e, "Purchase order creation failed");
                    ServiceError::DownstreamFailure(format!(
                        "purchase order creation failed: {}",
                        e
                    ))
                })?;

            let mut linked = quote.clone();
            linked.link_purchase_order(order.id)?;
            linked.touch(Utc::now());

            match self.store.update(&linked, quote.version).await {
                Ok(true) => {}
                Ok(false) => {
                    metrics::record_version_conflict();
                    warn!(
                        attempt,
                        purchase_order_id = %order.id,
                        "Quote changed while linking purchase order"
                    );
                    self.void_purchase_order(order.id).await;
                    continue;
                }
                Err(e) => {
                    self.void_purchase_order(order.id).await;
                    return Err(e);
                }
            }

            metrics::record_purchase_order();
            info!(
                purchase_order_id = %order.id,
                po_number = %order.po_number,
                lines = draft.lines.len(),
                "Purchase order generated for quote shortfalls"
            );
            self.event_sender
                .publish(Event::PurchaseOrderGenerated {
                    quote_id,
                    purchase_order_id: order.id,
                })
                .await;
            return Ok(PurchaseOrderOutcome::Created(order));
        }

        Err(ServiceError::ConcurrentModification(quote_id))
    }

    async fn void_purchase_order(&self, purchase_order_id: Uuid) {
        match self.purchase_orders.void(purchase_order_id).await {
            Ok(()) => {
                metrics::record_compensation("void_purchase_order");
                warn!(%purchase_order_id, "Draft purchase order voided");
            }
            Err(e) => {
                metrics::record_compensation("void_purchase_order_failed");
                error!(%purchase_order_id, error = %e, "Failed to void purchase order");
            }
        }
    }

    async fn load(&self, quote_id: Uuid) -> Result<Quote, ServiceError> {
        self.store
            .get(quote_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Quote", quote_id))
    }
}

fn ensure_purchasable(quote: &Quote) -> Result<(), ServiceError> {
    if let Some(existing) = quote.purchase_order_id {
        return Err(ServiceError::InvalidState(format!(
            "quote {} is already linked to purchase order {}",
            quote.quote_number, existing
        )));
    }
    if matches!(quote.status, QuoteStatus::Rejected | QuoteStatus::Cancelled) {
        return Err(ServiceError::InvalidState(format!(
            "cannot generate a purchase order for a {} quote",
            quote.status
        )));
    }
    Ok(())
}

fn ensure_before_deadline(deadline: Option<Instant>, step: &str) -> Result<(), ServiceError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            warn!(step, "Deadline elapsed before the first write");
            Err(ServiceError::DeadlineExceeded(step.to_string()))
        }
        _ => Ok(()),
    }
}
