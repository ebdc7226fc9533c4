pub mod common;
pub mod product_conversions;
pub mod quotes;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
