pub mod documents;
pub mod product_conversion;
pub mod quote;

pub use documents::{
    DocumentStatus, PurchaseOrderDraft, PurchaseOrderLineDraft, PurchaseOrderOutcome,
    PurchaseOrderRef, SalesOrderDraft, SalesOrderLineDraft, SalesOrderRef,
};
pub use product_conversion::{
    ConversionPreview, ConversionYield, ProductConversion, ProductConversionInput,
};
pub use quote::{
    LineItemPatch, NewLineItem, Quote, QuoteDraft, QuoteEvent, QuoteHeaderPatch, QuoteLineItem,
    QuoteStatus, QuoteTotals,
};
