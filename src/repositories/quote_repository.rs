use async_trait::async_trait;
use dashmap::DashMap;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{quote, quote_line_item};
use crate::errors::ServiceError;
use crate::models::quote::{Quote, QuoteLineItem, QuoteStatus, QuoteTotals};

use super::{BaseRepository, Repository};

/// Filters for listing quotes. `None` matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuoteFilter {
    pub status: Option<QuoteStatus>,
    pub contact_id: Option<Uuid>,
}

impl QuoteFilter {
    fn matches(&self, quote: &Quote) -> bool {
        self.status.map_or(true, |status| quote.status == status)
            && self
                .contact_id
                .map_or(true, |contact| quote.contact_id == contact)
    }
}

/// Persistence for the quote aggregate (header plus owned line items).
///
/// `update` and `delete` are compare-and-set on `version`: they only apply when the
/// stored version still equals `expected_version` and report `false` otherwise.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Quote>, ServiceError>;

    async fn insert(&self, quote: &Quote) -> Result<(), ServiceError>;

    async fn update(&self, quote: &Quote, expected_version: i32) -> Result<bool, ServiceError>;

    async fn delete(&self, id: Uuid, expected_version: i32) -> Result<bool, ServiceError>;

    async fn list(&self, filter: QuoteFilter) -> Result<Vec<Quote>, ServiceError>;
}

/// Quote store backed by the `quotes` and `quote_line_items` tables.
#[derive(Debug, Clone)]
pub struct SeaOrmQuoteStore {
    base: BaseRepository,
}

impl SeaOrmQuoteStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl QuoteStore for SeaOrmQuoteStore {
    async fn get(&self, id: Uuid) -> Result<Option<Quote>, ServiceError> {
        let db = self.base.get_db();
        let Some(header) = quote::Entity::find_by_id(id).one(db).await? else {
            return Ok(None);
        };
        let lines = quote_line_item::Entity::find()
            .filter(quote_line_item::Column::QuoteId.eq(id))
            .order_by_asc(quote_line_item::Column::Position)
            .all(db)
            .await?;
        to_domain(header, lines).map(Some)
    }

    async fn insert(&self, quote: &Quote) -> Result<(), ServiceError> {
        let txn = self.base.get_db().begin().await?;
        quote::Entity::insert(header_active_model(quote))
            .exec(&txn)
            .await?;
        insert_lines(&txn, quote).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn update(&self, quote: &Quote, expected_version: i32) -> Result<bool, ServiceError> {
        let txn = self.base.get_db().begin().await?;

        let result = quote::Entity::update_many()
            .set(header_active_model(quote))
            .filter(quote::Column::Id.eq(quote.id))
            .filter(quote::Column::Version.eq(expected_version))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        quote_line_item::Entity::delete_many()
            .filter(quote_line_item::Column::QuoteId.eq(quote.id))
            .exec(&txn)
            .await?;
        insert_lines(&txn, quote).await?;

        txn.commit().await?;
        Ok(true)
    }

    async fn delete(&self, id: Uuid, expected_version: i32) -> Result<bool, ServiceError> {
        let txn = self.base.get_db().begin().await?;

        quote_line_item::Entity::delete_many()
            .filter(quote_line_item::Column::QuoteId.eq(id))
            .exec(&txn)
            .await?;
        let result = quote::Entity::delete_many()
            .filter(quote::Column::Id.eq(id))
            .filter(quote::Column::Version.eq(expected_version))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(false);
        }
        txn.commit().await?;
        Ok(true)
    }

    async fn list(&self, filter: QuoteFilter) -> Result<Vec<Quote>, ServiceError> {
        let db = self.base.get_db();
        let mut query = quote::Entity::find().order_by_desc(quote::Column::CreatedAt);
        if let Some(status) = filter.status {
            query = query.filter(quote::Column::Status.eq(status.to_string()));
        }
        if let Some(contact_id) = filter.contact_id {
            query = query.filter(quote::Column::ContactId.eq(contact_id));
        }
        let headers = query.all(db).await?;
        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = headers.iter().map(|header| header.id).collect();
        let mut lines_by_quote: HashMap<Uuid, Vec<quote_line_item::Model>> = HashMap::new();
        for line in quote_line_item::Entity::find()
            .filter(quote_line_item::Column::QuoteId.is_in(ids))
            .order_by_asc(quote_line_item::Column::Position)
            .all(db)
            .await?
        {
            lines_by_quote.entry(line.quote_id).or_default().push(line);
        }

        headers
            .into_iter()
            .map(|header| {
                let lines = lines_by_quote.remove(&header.id).unwrap_or_default();
                to_domain(header, lines)
            })
            .collect()
    }
}

async fn insert_lines<C: sea_orm::ConnectionTrait>(
    conn: &C,
    quote: &Quote,
) -> Result<(), ServiceError> {
    if quote.lines.is_empty() {
        return Ok(());
    }
    let models = quote.lines.iter().map(|line| quote_line_item::ActiveModel {
        id: Set(line.id),
        quote_id: Set(quote.id),
        product_id: Set(line.product_id),
        description: Set(line.description.clone()),
        quantity: Set(line.quantity),
        unit_price: Set(line.unit_price),
        discount_amount: Set(line.discount_amount),
        tax_amount: Set(line.tax_amount),
        line_total: Set(line.line_total),
        position: Set(line.position),
    });
    quote_line_item::Entity::insert_many(models)
        .exec(conn)
        .await?;
    Ok(())
}

fn header_active_model(quote: &Quote) -> quote::ActiveModel {
    quote::ActiveModel {
        id: Set(quote.id),
        quote_number: Set(quote.quote_number.clone()),
        status: Set(quote.status.to_string()),
        contact_id: Set(quote.contact_id),
        currency: Set(quote.currency.clone()),
        quote_date: Set(quote.quote_date),
        valid_until: Set(quote.valid_until),
        estimated_eta: Set(quote.estimated_eta.clone()),
        notes: Set(quote.notes.clone()),
        rejection_reason: Set(quote.rejection_reason.clone()),
        subtotal_amount: Set(quote.totals.subtotal_amount),
        discount_amount: Set(quote.totals.discount_amount),
        tax_amount: Set(quote.totals.tax_amount),
        total_amount: Set(quote.totals.total_amount),
        items_count: Set(quote.totals.items_count),
        total_quantity: Set(quote.totals.total_quantity),
        sales_order_id: Set(quote.sales_order_id),
        purchase_order_id: Set(quote.purchase_order_id),
        version: Set(quote.version),
        created_at: Set(quote.created_at),
        updated_at: Set(quote.updated_at),
        sent_at: Set(quote.sent_at),
        accepted_at: Set(quote.accepted_at),
        rejected_at: Set(quote.rejected_at),
        converted_at: Set(quote.converted_at),
    }
}

fn to_domain(
    header: quote::Model,
    lines: Vec<quote_line_item::Model>,
) -> Result<Quote, ServiceError> {
    let status = QuoteStatus::from_str(&header.status).map_err(|_| {
        ServiceError::InternalError(format!(
            "quote {} has unknown status '{}'",
            header.id, header.status
        ))
    })?;

    Ok(Quote {
        id: header.id,
        quote_number: header.quote_number,
        status,
        contact_id: header.contact_id,
        currency: header.currency,
        quote_date: header.quote_date,
        valid_until: header.valid_until,
        estimated_eta: header.estimated_eta,
        notes: header.notes,
        rejection_reason: header.rejection_reason,
        totals: QuoteTotals {
            subtotal_amount: header.subtotal_amount,
            discount_amount: header.discount_amount,
            tax_amount: header.tax_amount,
            total_amount: header.total_amount,
            items_count: header.items_count,
            total_quantity: header.total_quantity,
        },
        sales_order_id: header.sales_order_id,
        purchase_order_id: header.purchase_order_id,
        created_at: header.created_at,
        updated_at: header.updated_at,
        sent_at: header.sent_at,
        accepted_at: header.accepted_at,
        rejected_at: header.rejected_at,
        converted_at: header.converted_at,
        version: header.version,
        lines: lines
            .into_iter()
            .map(|line| QuoteLineItem {
                id: line.id,
                product_id: line.product_id,
                description: line.description,
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount_amount: line.discount_amount,
                tax_amount: line.tax_amount,
                line_total: line.line_total,
                position: line.position,
            })
            .collect(),
    })
}

/// Process-local quote store, used by tests and the `in-memory` storage backend.
#[derive(Debug, Default, Clone)]
pub struct InMemoryQuoteStore {
    quotes: Arc<DashMap<Uuid, Quote>>,
}

impl InMemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuoteStore for InMemoryQuoteStore {
    async fn get(&self, id: Uuid) -> Result<Option<Quote>, ServiceError> {
        Ok(self.quotes.get(&id).map(|entry| entry.value().clone()))
    }

    async fn insert(&self, quote: &Quote) -> Result<(), ServiceError> {
        if self
            .quotes
            .iter()
            .any(|entry| entry.quote_number == quote.quote_number)
        {
            return Err(ServiceError::ValidationError(format!(
                "quote number {} already exists",
                quote.quote_number
            )));
        }
        match self.quotes.entry(quote.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ServiceError::ValidationError(
                format!("quote {} already exists", quote.id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(quote.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, quote: &Quote, expected_version: i32) -> Result<bool, ServiceError> {
        match self.quotes.get_mut(&quote.id) {
            Some(mut stored) if stored.version == expected_version => {
                *stored = quote.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid, expected_version: i32) -> Result<bool, ServiceError> {
        Ok(self
            .quotes
            .remove_if(&id, |_, stored| stored.version == expected_version)
            .is_some())
    }

    async fn list(&self, filter: QuoteFilter) -> Result<Vec<Quote>, ServiceError> {
        let mut quotes: Vec<Quote> = self
            .quotes
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        quotes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quote::{NewLineItem, QuoteDraft};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_quote(number: &str) -> Quote {
        let now = Utc::now();
        Quote::new(
            Uuid::new_v4(),
            QuoteDraft {
                quote_number: number.to_string(),
                contact_id: Uuid::new_v4(),
                currency: "EUR".into(),
                quote_date: now.date_naive(),
                valid_until: None,
                estimated_eta: None,
                notes: None,
                lines: vec![NewLineItem {
                    product_id: Uuid::new_v4(),
                    description: None,
                    quantity: dec!(2),
                    unit_price: dec!(10),
                    discount_amount: None,
                    tax_amount: None,
                }],
            },
            now,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn update_is_compare_and_set_on_version() {
        let store = InMemoryQuoteStore::new();
        let quote = sample_quote("QT-1");
        store.insert(&quote).await.unwrap();

        let mut first = quote.clone();
        first.notes = Some("first".into());
        first.touch(Utc::now());
        assert!(store.update(&first, quote.version).await.unwrap());

        let mut stale = quote.clone();
        stale.notes = Some("stale".into());
        stale.touch(Utc::now());
        assert!(!store.update(&stale, quote.version).await.unwrap());

        let stored = store.get(quote.id).await.unwrap().unwrap();
        assert_eq!(stored.notes.as_deref(), Some("first"));
        assert_eq!(stored.version, quote.version + 1);
    }

    #[tokio::test]
    async fn delete_requires_current_version() {
        let store = InMemoryQuoteStore::new();
        let quote = sample_quote("QT-2");
        store.insert(&quote).await.unwrap();

        assert!(!store.delete(quote.id, quote.version + 1).await.unwrap());
        assert!(store.delete(quote.id, quote.version).await.unwrap());
        assert!(store.get(quote.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_quote_number_is_rejected() {
        let store = InMemoryQuoteStore::new();
        store.insert(&sample_quote("QT-3")).await.unwrap();
        assert!(store.insert(&sample_quote("QT-3")).await.is_err());
    }

    #[tokio::test]
    async fn list_applies_filters() {
        let store = InMemoryQuoteStore::new();
        let draft = sample_quote("QT-4");
        let mut sent = sample_quote("QT-5");
        sent.status = QuoteStatus::Sent;
        store.insert(&draft).await.unwrap();
        store.insert(&sent).await.unwrap();

        let only_sent = store
            .list(QuoteFilter {
                status: Some(QuoteStatus::Sent),
                contact_id: None,
            })
            .await
            .unwrap();
        assert_eq!(only_sent.len(), 1);
        assert_eq!(only_sent[0].id, sent.id);

        let by_contact = store
            .list(QuoteFilter {
                status: None,
                contact_id: Some(draft.contact_id),
            })
            .await
            .unwrap();
        assert_eq!(by_contact.len(), 1);
        assert_eq!(by_contact[0].id, draft.id);
    }
}
