use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::document_number;
use crate::entities::{purchase_order, purchase_order_line};
use crate::errors::ServiceError;
use crate::models::documents::{DocumentStatus, PurchaseOrderDraft, PurchaseOrderRef};

/// Purchase-order service contract. Orders are created as drafts for a buyer to act on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PurchaseOrderGateway: Send + Sync {
    async fn create_draft(&self, draft: &PurchaseOrderDraft)
        -> Result<PurchaseOrderRef, ServiceError>;

    async fn void(&self, purchase_order_id: Uuid) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmPurchaseOrders {
    db: Arc<DatabaseConnection>,
    number_prefix: String,
}

impl SeaOrmPurchaseOrders {
    pub fn new(db: Arc<DatabaseConnection>, number_prefix: impl Into<String>) -> Self {
        Self {
            db,
            number_prefix: number_prefix.into(),
        }
    }
}

#[async_trait]
impl PurchaseOrderGateway for SeaOrmPurchaseOrders {
    async fn create_draft(
        &self,
        draft: &PurchaseOrderDraft,
    ) -> Result<PurchaseOrderRef, ServiceError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let po_number = document_number(&self.number_prefix, now.date_naive());

        let txn = self.db.begin().await?;
        purchase_order::Entity::insert(purchase_order::ActiveModel {
            id: Set(id),
            po_number: Set(po_number.clone()),
            quote_id: Set(Some(draft.quote_id)),
            currency: Set(draft.currency.clone()),
            status: Set(DocumentStatus::Draft.to_string()),
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
                .map(|(index, line)| purchase_order_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    purchase_order_id: Set(id),
                    line_number: Set(index as i32 + 1),
                    product_id: Set(line.product_id),
                    quantity: Set(line.quantity),
                });
            purchase_order_line::Entity::insert_many(lines)
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;

        info!(
            purchase_order_id = %id,
            po_number = %po_number,
            quote_id = %draft.quote_id,
            "Draft purchase order created"
        );
        Ok(PurchaseOrderRef { id, po_number })
    }

    async fn void(&self, purchase_order_id: Uuid) -> Result<(), ServiceError> {
        let result = purchase_order::Entity::update_many()
            .set(purchase_order::ActiveModel {
                status: Set(DocumentStatus::Voided.to_string()),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(purchase_order::Column::Id.eq(purchase_order_id))
            .filter(purchase_order::Column::Status.eq(DocumentStatus::Draft.to_string()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidState(format!(
                "purchase order {} is not a draft",
                purchase_order_id
            )));
        }
        Ok(())
    }
}

/// A purchase order held by [`InMemoryPurchaseOrders`].
#[derive(Clone, Debug, PartialEq)]
pub struct StoredPurchaseOrder {
    pub reference: PurchaseOrderRef,
    pub draft: PurchaseOrderDraft,
    pub status: DocumentStatus,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryPurchaseOrders {
    orders: Arc<DashMap<Uuid, StoredPurchaseOrder>>,
    number_prefix: String,
}

impl InMemoryPurchaseOrders {
    pub fn new(number_prefix: impl Into<String>) -> Self {
        Self {
            orders: Arc::default(),
            number_prefix: number_prefix.into(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<StoredPurchaseOrder> {
        self.orders.get(&id).map(|entry| entry.value().clone())
    }

    pub fn all(&self) -> Vec<StoredPurchaseOrder> {
        self.orders.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait]
impl PurchaseOrderGateway for InMemoryPurchaseOrders {
    async fn create_draft(
        &self,
        draft: &PurchaseOrderDraft,
    ) -> Result<PurchaseOrderRef, ServiceError> {
        let reference = PurchaseOrderRef {
            id: Uuid::new_v4(),
            po_number: document_number(&self.number_prefix, Utc::now().date_naive()),
        };
        self.orders.insert(
            reference.id,
            StoredPurchaseOrder {
                reference: reference.clone(),
                draft: draft.clone(),
                status: DocumentStatus::Draft,
            },
        );
        Ok(reference)
    }

    async fn void(&self, purchase_order_id: Uuid) -> Result<(), ServiceError> {
        let mut order = self
            .orders
            .get_mut(&purchase_order_id)
            .ok_or_else(|| ServiceError::not_found("Purchase order", purchase_order_id))?;
        if order.status != DocumentStatus::Draft {
            return Err(ServiceError::InvalidState(format!(
                "purchase order {} is not a draft",
                purchase_order_id
            )));
        }
        order.status = DocumentStatus::Voided;
        Ok(())
    }
}
