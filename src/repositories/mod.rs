use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod quote_repository;

pub use quote_repository::{InMemoryQuoteStore, QuoteFilter, QuoteStore, SeaOrmQuoteStore};

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}
