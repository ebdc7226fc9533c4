//! Outbound collaborators of the engine: product catalog, inventory, and the
//! sales-order and purchase-order services. Each contract has a sea-orm backed
//! implementation and a process-local one.

pub mod catalog;
pub mod inventory;
pub mod purchase_orders;
pub mod sales_orders;

use chrono::NaiveDate;
use uuid::Uuid;

pub use catalog::{InMemoryProductCatalog, ProductCatalog, SeaOrmProductCatalog};
pub use inventory::{InMemoryInventory, InventoryGateway, SeaOrmInventory};
pub use purchase_orders::{
    InMemoryPurchaseOrders, PurchaseOrderGateway, SeaOrmPurchaseOrders, StoredPurchaseOrder,
};
pub use sales_orders::{InMemorySalesOrders, SalesOrderGateway, SeaOrmSalesOrders, StoredSalesOrder};

/// Display number for a quote or downstream document: `{prefix}-{YYYYMMDD}-{8 hex}`.
pub(crate) fn document_number(prefix: &str, date: NaiveDate) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        prefix,
        date.format("%Y%m%d"),
        suffix[..8].to_ascii_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_number_carries_prefix_date_and_suffix() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let number = document_number("SO", date);
        let parts: Vec<&str> = number.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "SO");
        assert_eq!(parts[1], "20240310");
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_ne!(number, document_number("SO", date));
    }
}
