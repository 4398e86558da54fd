// ============================================================================
// Repository Module - Durable order storage
// ============================================================================
//
// - postgres/ - sqlx-backed production repository
// - memory/   - in-process repository used by tests and local runs
//
// ============================================================================

mod memory;
mod postgres;

pub use memory::InMemoryOrderRepository;
pub use postgres::PostgresOrderRepository;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("order not found: {0}")]
    NotFound(String),

    /// Insert hit the unique constraint on order_uid
    #[error("order already exists: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
