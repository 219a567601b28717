//! Shared app dependency container for managers.

use std::path::Path;
use std::sync::Arc;

use crate::Result;
use crate::db::Database;

/// Shared app dependencies used by every manager.
pub struct AppServices {
    db: Database,
}

impl AppServices {
    /// Creates a shared service container around an open database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens the database at `db_path` and wraps it in a service container.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(db_path: &Path) -> Result<Arc<Self>> {
        let db = Database::open(db_path).await?;

        Ok(Arc::new(Self::new(db)))
    }

    /// Returns the application database handle.
    pub fn db(&self) -> &Database {
        &self.db
    }
}

#[cfg(test)]
impl AppServices {
    /// Creates a service container over an in-memory database for tests.
    pub async fn open_in_memory() -> Arc<Self> {
        let db = Database::open_in_memory()
            .await
            .expect("failed to open in-memory db");

        Arc::new(Self::new(db))
    }
}
