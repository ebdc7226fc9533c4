use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::conversion_orchestrator::ConversionOrchestrator;
use super::quote_locks::QuoteLocks;
use super::quote_state::{QuoteCommand, QuoteStateMachine, Transition};
use super::stock_availability::StockCheckLine;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::integrations::document_number;
use crate::metrics;
use crate::models::documents::{PurchaseOrderOutcome, SalesOrderRef};
use crate::models::quote::{
    LineItemPatch, NewLineItem, Quote, QuoteDraft, QuoteEvent, QuoteHeaderPatch, QuoteStatus,
};
use crate::repositories::{QuoteFilter, QuoteStore};

/// Defaults applied when quotes are created.
#[derive(Clone, Debug)]
pub struct QuoteSettings {
    pub number_prefix: String,
    pub default_currency: String,
    pub default_validity_days: u32,
    pub max_attempts: u32,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            number_prefix: "QT".to_string(),
            default_currency: "USD".to_string(),
            default_validity_days: 30,
            max_attempts: 3,
        }
    }
}

/// Input for opening a quote. Unit prices and taxes are already resolved by the caller.
#[derive(Clone, Debug, Default)]
pub struct CreateQuote {
    pub contact_id: Uuid,
    pub currency: Option<String>,
    pub quote_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub estimated_eta: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<NewLineItem>,
}

/// Inbound operations on quotes: authoring, lifecycle transitions, and delegation to the
/// [`ConversionOrchestrator`] for document conversion.
///
/// Every write is a read-modify-write under the per-quote lock, persisted with a
/// version compare-and-set and retried from a fresh load when it loses.
#[derive(Clone)]
pub struct QuoteService {
    store: Arc<dyn QuoteStore>,
    orchestrator: Arc<ConversionOrchestrator>,
    locks: QuoteLocks,
    event_sender: Arc<EventSender>,
    settings: QuoteSettings,
}

struct Mutation {
    before: Quote,
    after: Quote,
}

impl QuoteService {
    pub fn new(
        store: Arc<dyn QuoteStore>,
        orchestrator: Arc<ConversionOrchestrator>,
        locks: QuoteLocks,
        event_sender: Arc<EventSender>,
        settings: QuoteSettings,
    ) -> Self {
        Self {
            store,
            orchestrator,
            locks,
            event_sender,
            settings,
        }
    }

    fn next_quote_number(&self, date: NaiveDate) -> String {
        document_number(&self.settings.number_prefix, date)
    }

    #[instrument(
        skip(self, input),
        fields(contact_id = %input.contact_id, lines = input.lines.len())
    )]
    pub async fn create_quote(&self, input: CreateQuote) -> Result<Quote, ServiceError> {
        let now = Utc::now();
        let quote_date = input.quote_date.unwrap_or_else(|| now.date_naive());
        let valid_until = input.valid_until.or_else(|| {
            quote_date.checked_add_signed(Duration::days(
                i64::from(self.settings.default_validity_days),
            ))
        });

        let quote = Quote::new(
            Uuid::new_v4(),
            QuoteDraft {
                quote_number: self.next_quote_number(quote_date),
                contact_id: input.contact_id,
                currency: input
                    .currency
                    .unwrap_or_else(|| self.settings.default_currency.clone()),
                quote_date,
                valid_until,
                estimated_eta: input.estimated_eta,
                notes: input.notes,
                lines: input.lines,
            },
            now,
        )?;
        self.store.insert(&quote).await?;

        info!(
            quote_id = %quote.id,
            quote_number = %quote.quote_number,
            total = %quote.totals.total_amount,
            "Quote created"
        );
        self.event_sender.publish(Event::QuoteCreated(quote.id)).await;
        Ok(quote)
    }

    pub async fn get_quote(&self, quote_id: Uuid) -> Result<Quote, ServiceError> {
        self.store
            .get(quote_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Quote", quote_id))
    }

    pub async fn list_quotes(&self, filter: QuoteFilter) -> Result<Vec<Quote>, ServiceError> {
        self.store.list(filter).await
    }

    #[instrument(skip(self, patch), fields(quote_id = %quote_id))]
    pub async fn update_header(
        &self,
        quote_id: Uuid,
        patch: QuoteHeaderPatch,
    ) -> Result<Quote, ServiceError> {
        let mutation = self
            .mutate("update_header", quote_id, |quote| {
                quote.update_header(patch.clone())?;
                Ok(true)
            })
            .await?;
        self.published_update(mutation).await
    }

    #[instrument(skip(self, line), fields(quote_id = %quote_id))]
    pub async fn add_line_item(
        &self,
        quote_id: Uuid,
        line: NewLineItem,
    ) -> Result<Quote, ServiceError> {
        let mutation = self
            .mutate("add_line_item", quote_id, |quote| {
                quote.add_line(line.clone())?;
                Ok(true)
            })
            .await?;
        self.published_update(mutation).await
    }

    #[instrument(skip(self, patch), fields(quote_id = %quote_id, line_id = %line_id))]
    pub async fn update_line_item(
        &self,
        quote_id: Uuid,
        line_id: Uuid,
        patch: LineItemPatch,
    ) -> Result<Quote, ServiceError> {
        let mutation = self
            .mutate("update_line_item", quote_id, |quote| {
                quote.update_line(line_id, patch.clone())?;
                Ok(true)
            })
            .await?;
        self.published_update(mutation).await
    }

    #[instrument(skip(self), fields(quote_id = %quote_id, line_id = %line_id))]
    pub async fn remove_line_item(
        &self,
        quote_id: Uuid,
        line_id: Uuid,
    ) -> Result<Quote, ServiceError> {
        let mutation = self
            .mutate("remove_line_item", quote_id, |quote| {
                quote.remove_line(line_id)?;
                Ok(true)
            })
            .await?;
        self.published_update(mutation).await
    }

    pub async fn send_quote(&self, quote_id: Uuid) -> Result<Quote, ServiceError> {
        self.transition(quote_id, QuoteCommand::Send).await
    }

    pub async fn accept_quote(&self, quote_id: Uuid) -> Result<Quote, ServiceError> {
        self.transition(quote_id, QuoteCommand::Accept).await
    }

    pub async fn reject_quote(
        &self,
        quote_id: Uuid,
        reason: Option<String>,
    ) -> Result<Quote, ServiceError> {
        self.transition(quote_id, QuoteCommand::Reject { reason })
            .await
    }

    pub async fn cancel_quote(&self, quote_id: Uuid) -> Result<Quote, ServiceError> {
        self.transition(quote_id, QuoteCommand::Cancel).await
    }

    #[instrument(skip(self), fields(quote_id = %quote_id, event = %command.event()))]
    async fn transition(
        &self,
        quote_id: Uuid,
        command: QuoteCommand,
    ) -> Result<Quote, ServiceError> {
        let event = command.event();
        if event == QuoteEvent::Convert {
            return Err(ServiceError::InvalidState(
                "conversion runs through convert_quote".to_string(),
            ));
        }

        let mut applied: Option<Transition> = None;
        let mutation = self
            .mutate(event.as_ref(), quote_id, |quote| {
                let transition = QuoteStateMachine::apply(quote, command.clone(), Utc::now())?;
                applied = Some(transition);
                Ok(transition.changed)
            })
            .await?;

        match applied {
            Some(transition) if transition.changed => {
                metrics::record_transition(event.as_ref());
                info!(from = %transition.from, to = %transition.to, "Quote transition committed");
                self.event_sender
                    .publish(Event::QuoteStatusChanged {
                        quote_id,
                        from: transition.from,
                        to: transition.to,
                    })
                    .await;
            }
            _ => info!(status = %mutation.after.status, "Quote resent; nothing changed"),
        }
        Ok(mutation.after)
    }

    /// Copies contact, currency and line items into a new draft quote.
    #[instrument(skip(self), fields(quote_id = %quote_id))]
    pub async fn duplicate_quote(&self, quote_id: Uuid) -> Result<Quote, ServiceError> {
        let source = self.get_quote(quote_id).await?;
        if let Err(e) = QuoteStateMachine::check(&source, QuoteEvent::Duplicate) {
            metrics::record_rejected("duplicate", e.code());
            return Err(e);
        }

        let now = Utc::now();
        let copy = source.duplicate(
            Uuid::new_v4(),
            self.next_quote_number(now.date_naive()),
            now,
        )?;
        self.store.insert(&copy).await?;

        metrics::record_transition(QuoteEvent::Duplicate.as_ref());
        info!(new_quote_id = %copy.id, quote_number = %copy.quote_number, "Quote duplicated");
        self.event_sender
            .publish(Event::QuoteDuplicated {
                source_id: quote_id,
                quote_id: copy.id,
            })
            .await;
        Ok(copy)
    }

    /// Removes a quote and its lines. Accepted and converted quotes are kept.
    #[instrument(skip(self), fields(quote_id = %quote_id))]
    pub async fn delete_quote(&self, quote_id: Uuid) -> Result<(), ServiceError> {
        let _guard = self.locks.acquire(quote_id).await;

        for _ in 0..self.settings.max_attempts {
            let quote = self.get_quote(quote_id).await?;
            if matches!(quote.status, QuoteStatus::Accepted | QuoteStatus::Converted) {
                let err = ServiceError::InvalidState(format!(
                    "quote {} cannot be deleted while {}",
                    quote.quote_number, quote.status
                ));
                metrics::record_rejected("delete", err.code());
                return Err(err);
            }
            if self.store.delete(quote_id, quote.version).await? {
                info!("Quote deleted");
                self.event_sender.publish(Event::QuoteDeleted(quote_id)).await;
                return Ok(());
            }
            metrics::record_version_conflict();
        }
        Err(ServiceError::ConcurrentModification(quote_id))
    }

    pub async fn convert_quote(
        &self,
        quote_id: Uuid,
        deadline: Option<Instant>,
    ) -> Result<SalesOrderRef, ServiceError> {
        self.orchestrator
            .convert_with_deadline(quote_id, deadline)
            .await
    }

    pub async fn generate_purchase_order(
        &self,
        quote_id: Uuid,
        deadline: Option<Instant>,
    ) -> Result<PurchaseOrderOutcome, ServiceError> {
        self.orchestrator
            .generate_purchase_order_with_deadline(quote_id, deadline)
            .await
    }

    pub async fn stock_availability(
        &self,
        quote_id: Uuid,
    ) -> Result<Vec<StockCheckLine>, ServiceError> {
        self.orchestrator.check_stock(quote_id).await
    }

    async fn published_update(&self, mutation: Mutation) -> Result<Quote, ServiceError> {
        self.event_sender
            .publish(Event::QuoteUpdated(mutation.after.id))
            .await;
        info!(
            version = mutation.after.version,
            total_before = %mutation.before.totals.total_amount,
            total_after = %mutation.after.totals.total_amount,
            "Quote updated"
        );
        Ok(mutation.after)
    }

    /// Loads, applies `op` to a copy, and writes it back if `op` reports a change.
    /// Guard errors from `op` leave the stored quote untouched.
    async fn mutate<F>(
        &self,
        operation: &str,
        quote_id: Uuid,
        mut op: F,
    ) -> Result<Mutation, ServiceError>
    where
        F: FnMut(&mut Quote) -> Result<bool, ServiceError>,
    {
        let _guard = self.locks.acquire(quote_id).await;

        for attempt in 1..=self.settings.max_attempts {
            let before = self.get_quote(quote_id).await?;
            let mut after = before.clone();
            let changed = match op(&mut after) {
                Ok(changed) => changed,
                Err(e) => {
                    metrics::record_rejected(operation, e.code());
                    return Err(e);
                }
            };
            if !changed {
                return Ok(Mutation {
                    after: before.clone(),
                    before,
                });
            }

            after.touch(Utc::now());
            if self.store.update(&after, before.version).await? {
                return Ok(Mutation { before, after });
            }
            metrics::record_version_conflict();
            warn!(attempt, operation, "Quote version changed underneath; retrying");
        }

        Err(ServiceError::ConcurrentModification(quote_id))
    }
}
