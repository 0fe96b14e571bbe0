//! # recap-db
//!
//! PostgreSQL storage layer for recap.
//!
//! This crate provides:
//! - Connection pool management
//! - Document repository with mutual summary/source linking
//! - Vector similarity search with pgvector
//! - Persistent processing task queue
//! - In-memory repository implementations for tests and embedded use
//!
//! ## Example
//!
//! ```rust,ignore
//! use recap_core::{DocLevel, UpsertDocumentRequest};
//! use recap_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/recap").await?;
//!
//!     let doc = db.documents.upsert(UpsertDocumentRequest {
//!         id: recap_core::new_v7(),
//!         title: None,
//!         category: "notes".to_string(),
//!         level: DocLevel::L0,
//!         metadata: serde_json::json!({}),
//!         content: "Hello, world!".to_string(),
//!         embedding: None,
//!     }).await?;
//!
//!     println!("Stored document: {}", doc.id);
//!     Ok(())
//! }
//! ```

pub mod documents;
pub mod memory;
pub mod pool;
pub mod tasks;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use recap_core::*;

pub use documents::PgDocumentRepository;
pub use memory::{MemoryDocumentStore, MemoryTaskQueue};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use tasks::PgTaskRepository;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Document repository.
    pub documents: PgDocumentRepository,
    /// Processing task repository.
    pub tasks: PgTaskRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            documents: PgDocumentRepository::new(pool.clone()),
            tasks: PgTaskRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("plain"), "plain");
    }
}
