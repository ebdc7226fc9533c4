// Quote lifecycle core
pub mod quote_locks;
pub mod quote_state;
pub mod quotes;

// Document conversion
pub mod conversion_orchestrator;
pub mod stock_availability;

// Product conversion factors
pub mod conversion_resolver;
pub mod product_conversions;

// Service factory for dependency injection
pub mod factory;

pub use factory::{Backends, ServiceContainer};
