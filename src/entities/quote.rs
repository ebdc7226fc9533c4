use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quotes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub quote_number: String,
    pub status: String,
    pub contact_id: Uuid,
    pub currency: String,
    pub quote_date: Date,
    pub valid_until: Option<Date>,
    pub estimated_eta: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_reason: Option<String>,
    pub subtotal_amount: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub items_count: i32,
    pub total_quantity: Decimal,
    #[sea_orm(unique)]
    pub sales_order_id: Option<Uuid>,
    pub purchase_order_id: Option<Uuid>,
    pub version: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub sent_at: Option<DateTimeUtc>,
    pub accepted_at: Option<DateTimeUtc>,
    pub rejected_at: Option<DateTimeUtc>,
    pub converted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::quote_line_item::Entity")]
    QuoteLineItems,
}

impl Related<super::quote_line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QuoteLineItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
