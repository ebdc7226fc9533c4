pub mod inventory_level;
pub mod product_conversion;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod quote;
pub mod quote_line_item;
pub mod sales_order;
pub mod sales_order_line;
