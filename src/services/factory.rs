use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::integrations::{
    InMemoryInventory, InMemoryProductCatalog, InMemoryPurchaseOrders, InMemorySalesOrders,
    InventoryGateway, ProductCatalog, PurchaseOrderGateway, SalesOrderGateway, SeaOrmInventory,
    SeaOrmProductCatalog, SeaOrmPurchaseOrders, SeaOrmSalesOrders,
};
use crate::repositories::{InMemoryQuoteStore, QuoteStore, SeaOrmQuoteStore};
use crate::services::{
    conversion_orchestrator::ConversionOrchestrator,
    conversion_resolver::ProductConversionResolver,
    product_conversions::ProductConversionService,
    quote_locks::QuoteLocks,
    quotes::{QuoteService, QuoteSettings},
    stock_availability::StockAvailabilityChecker,
};

/// Storage and collaborator implementations the services are wired against.
#[derive(Clone)]
pub struct Backends {
    pub quotes: Arc<dyn QuoteStore>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub inventory: Arc<dyn InventoryGateway>,
    pub sales_orders: Arc<dyn SalesOrderGateway>,
    pub purchase_orders: Arc<dyn PurchaseOrderGateway>,
}

impl Backends {
    /// Everything persisted through sea-orm on one connection pool.
    pub fn database(db: Arc<DatabaseConnection>, config: &AppConfig) -> Self {
        Self {
            quotes: Arc::new(SeaOrmQuoteStore::new(db.clone())),
            catalog: Arc::new(SeaOrmProductCatalog::new(db.clone())),
            inventory: Arc::new(SeaOrmInventory::new(db.clone())),
            sales_orders: Arc::new(SeaOrmSalesOrders::new(
                db.clone(),
                config.sales_order_number_prefix.clone(),
            )),
            purchase_orders: Arc::new(SeaOrmPurchaseOrders::new(
                db,
                config.purchase_order_number_prefix.clone(),
            )),
        }
    }

    /// Process-local state; nothing survives a restart.
    pub fn in_memory(config: &AppConfig) -> Self {
        Self {
            quotes: Arc::new(InMemoryQuoteStore::new()),
            catalog: Arc::new(InMemoryProductCatalog::new()),
            inventory: Arc::new(InMemoryInventory::new()),
            sales_orders: Arc::new(InMemorySalesOrders::new(
                config.sales_order_number_prefix.clone(),
            )),
            purchase_orders: Arc::new(InMemoryPurchaseOrders::new(
                config.purchase_order_number_prefix.clone(),
            )),
        }
    }
}

impl From<&AppConfig> for QuoteSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            number_prefix: cfg.quote_number_prefix.clone(),
            default_currency: cfg.default_currency.clone(),
            default_validity_days: cfg.default_validity_days,
            max_attempts: cfg.transition_max_retries,
        }
    }
}

/// Service container holding all service instances
#[derive(Clone)]
pub struct ServiceContainer {
    pub quotes: Arc<QuoteService>,
    pub conversions: Arc<ProductConversionService>,
    pub orchestrator: Arc<ConversionOrchestrator>,
    pub resolver: Arc<ProductConversionResolver>,
}

impl ServiceContainer {
    /// Wires every service. Quote transitions and conversions share one lock table so
    /// all writes to a quote are serialized in this process.
    pub fn new(backends: Backends, settings: QuoteSettings, event_sender: EventSender) -> Self {
        let event_sender = Arc::new(event_sender);
        let locks = QuoteLocks::new();

        let resolver = Arc::new(ProductConversionResolver::new(backends.catalog.clone()));
        let orchestrator = Arc::new(ConversionOrchestrator::new(
            backends.quotes.clone(),
            backends.sales_orders,
            backends.purchase_orders,
            StockAvailabilityChecker::new(backends.inventory),
            locks.clone(),
            event_sender.clone(),
            settings.max_attempts,
        ));
        let quotes = Arc::new(QuoteService::new(
            backends.quotes,
            orchestrator.clone(),
            locks,
            event_sender.clone(),
            settings,
        ));
        let conversions = Arc::new(ProductConversionService::new(
            backends.catalog,
            resolver.clone(),
            event_sender,
        ));

        Self {
            quotes,
            conversions,
            orchestrator,
            resolver,
        }
    }
}
