use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::document_number;
use crate::entities::{sales_order, sales_order_line};
use crate::errors::ServiceError;
use crate::models::documents::{DocumentStatus, SalesOrderDraft, SalesOrderRef};

/// Sales-order service contract. Orders are created provisional and only become
/// binding once `confirm` succeeds; `void` is the compensation for both states.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SalesOrderGateway: Send + Sync {
    async fn create_provisional(&self, draft: &SalesOrderDraft)
        -> Result<SalesOrderRef, ServiceError>;

    async fn confirm(&self, sales_order_id: Uuid) -> Result<(), ServiceError>;

    async fn void(&self, sales_order_id: Uuid) -> Result<(), ServiceError>;
}

fn order_total(draft: &SalesOrderDraft) -> Result<Decimal, ServiceError> {
    draft.lines.iter().try_fold(Decimal::ZERO, |total, line| {
        line.quantity
            .checked_mul(line.unit_price)
            .and_then(|amount| total.checked_add(amount))
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "sales order total for quote {} exceeds the supported decimal range",
                    draft.quote_number
                ))
            })
    })
}

#[derive(Debug, Clone)]
pub struct SeaOrmSalesOrders {
    db: Arc<DatabaseConnection>,
    number_prefix: String,
}

impl SeaOrmSalesOrders {
    pub fn new(db: Arc<DatabaseConnection>, number_prefix: impl Into<String>) -> Self {
        Self {
            db,
            number_prefix: number_prefix.into(),
        }
    }

    async fn set_status(
        &self,
        sales_order_id: Uuid,
        from: &[DocumentStatus],
        to: DocumentStatus,
    ) -> Result<(), ServiceError> {
        let result = sales_order::Entity::update_many()
            .set(sales_order::ActiveModel {
                status: Set(to.to_string()),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(sales_order::Column::Id.eq(sales_order_id))
            .filter(sales_order::Column::Status.is_in(from.iter().map(ToString::to_string)))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidState(format!(
                "sales order {} cannot move to {}",
                sales_order_id, to
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SalesOrderGateway for SeaOrmSalesOrders {
    async fn create_provisional(
        &self,
        draft: &SalesOrderDraft,
    ) -> Result<SalesOrderRef, ServiceError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let order_number = document_number(&self.number_prefix, now.date_naive());
        let total_amount = order_total(draft)?;

        let txn = self.db.begin().await?;
        sales_order::Entity::insert(sales_order::ActiveModel {
            id: Set(id),
            order_number: Set(order_number.clone()),
            quote_id: Set(draft.quote_id),
            contact_id: Set(draft.contact_id),
            currency: Set(draft.currency.clone()),
            status: Set(DocumentStatus::Provisional.to_string()),
            total_amount: Set(total_amount),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .exec(&txn)
        .await?;

        if !draft.lines.is_empty() {
            let lines = draft
                .lines
                .iter()
                .enumerate()
                .map(|(index, line)| sales_order_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    sales_order_id: Set(id),
                    line_number: Set(index as i32 + 1),
                    product_id: Set(line.product_id),
                    quantity: Set(line.quantity),
                    unit_price: Set(line.unit_price),
                });
            sales_order_line::Entity::insert_many(lines)
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;

        info!(
            sales_order_id = %id,
            order_number = %order_number,
            quote_id = %draft.quote_id,
            "Provisional sales order created"
        );
        Ok(SalesOrderRef { id, order_number })
    }

    async fn confirm(&self, sales_order_id: Uuid) -> Result<(), ServiceError> {
        self.set_status(
            sales_order_id,
            &[DocumentStatus::Provisional],
            DocumentStatus::Confirmed,
        )
        .await
    }

    async fn void(&self, sales_order_id: Uuid) -> Result<(), ServiceError> {
        self.set_status(
            sales_order_id,
            &[DocumentStatus::Provisional, DocumentStatus::Confirmed],
            DocumentStatus::Voided,
        )
        .await
    }
}

/// A sales order held by [`InMemorySalesOrders`].
#[derive(Clone, Debug, PartialEq)]
pub struct StoredSalesOrder {
    pub reference: SalesOrderRef,
    pub draft: SalesOrderDraft,
    pub status: DocumentStatus,
}

#[derive(Debug, Default, Clone)]
pub struct InMemorySalesOrders {
    orders: Arc<DashMap<Uuid, StoredSalesOrder>>,
    number_prefix: String,
}

impl InMemorySalesOrders {
    pub fn new(number_prefix: impl Into<String>) -> Self {
        Self {
            orders: Arc::default(),
            number_prefix: number_prefix.into(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<StoredSalesOrder> {
        self.orders.get(&id).map(|entry| entry.value().clone())
    }

    pub fn all(&self) -> Vec<StoredSalesOrder> {
        self.orders.iter().map(|entry| entry.value().clone()).collect()
    }

    fn transition(
        &self,
        id: Uuid,
        from: &[DocumentStatus],
        to: DocumentStatus,
    ) -> Result<(), ServiceError> {
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::not_found("Sales order", id))?;
        if !from.contains(&order.status) {
            return Err(ServiceError::InvalidState(format!(
                "sales order {} is {} and cannot move to {}",
                id, order.status, to
            )));
        }
        order.status = to;
        Ok(())
    }
}

#[async_trait]
impl SalesOrderGateway for InMemorySalesOrders {
    async fn create_provisional(
        &self,
        draft: &SalesOrderDraft,
    ) -> Result<SalesOrderRef, ServiceError> {
        let reference = SalesOrderRef {
            id: Uuid::new_v4(),
            order_number: document_number(&self.number_prefix, Utc::now().date_naive()),
        };
        self.orders.insert(
            reference.id,
            StoredSalesOrder {
                reference: reference.clone(),
                draft: draft.clone(),
                status: DocumentStatus::Provisional,
            },
        );
        Ok(reference)
    }

    async fn confirm(&self, sales_order_id: Uuid) -> Result<(), ServiceError> {
        self.transition(
            sales_order_id,
            &[DocumentStatus::Provisional],
            DocumentStatus::Confirmed,
        )
    }

    async fn void(&self, sales_order_id: Uuid) -> Result<(), ServiceError> {
        self.transition(
            sales_order_id,
            &[DocumentStatus::Provisional, DocumentStatus::Confirmed],
            DocumentStatus::Voided,
        )
    }
}
