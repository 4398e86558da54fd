use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{Order, OrderParams};
use crate::repository::RepositoryError;

use super::order::UseCaseError;

/// Durable order storage.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Fails with [`RepositoryError::NotFound`] when no order has this uid.
    async fn get_order_by_uid(&self, uid: &str) -> Result<Order, RepositoryError>;

    async fn check_idempotency_key(&self, uid: &str) -> Result<bool, RepositoryError>;

    /// Most recently created orders first, items attached.
    async fn get_last_orders(&self, limit: i64) -> Result<Vec<Order>, RepositoryError>;
}

/// Order snapshot cache keyed by order uid.
#[async_trait]
pub trait OrderCache: Send + Sync {
    async fn get(&self, uid: &str) -> Option<Arc<Order>>;

    /// Unconditionally overwrites any entry with the same uid.
    async fn set(&self, order: Arc<Order>);
}

/// The slice of the use case the ingestion pipeline depends on.
#[async_trait]
pub trait OrderCreator: Send + Sync {
    async fn create_order(&self, params: OrderParams) -> Result<(), UseCaseError>;
}
