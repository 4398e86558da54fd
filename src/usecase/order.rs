use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{DomainError, Order, OrderParams};
use crate::metrics::Metrics;
use crate::repository::RepositoryError;

use super::ports::{OrderCache, OrderCreator, OrderRepository};

// ============================================================================
// Use Case Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum UseCaseError {
    #[error(transparent)]
    InvalidState(#[from] DomainError),

    #[error("idempotency key already exists: {0}")]
    IdempotencyKeyExists(String),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("repository failure: {0}")]
    Repository(#[source] RepositoryError),
}

impl UseCaseError {
    /// Only infrastructure faults are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            UseCaseError::InvalidState(_) | UseCaseError::IdempotencyKeyExists(_)
        )
    }
}

// ============================================================================
// Order Use Case
// ============================================================================

pub struct OrderUseCase {
    repository: Arc<dyn OrderRepository>,
    cache: Arc<dyn OrderCache>,
    metrics: Option<Arc<Metrics>>,
}

impl OrderUseCase {
    pub fn new(repository: Arc<dyn OrderRepository>, cache: Arc<dyn OrderCache>) -> Self {
        Self {
            repository,
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate, persist and cache a new order.
    pub async fn create_order(&self, params: OrderParams) -> Result<(), UseCaseError> {
        if params.order_uid.is_empty() {
            return Err(DomainError::MissingRequiredField("order_uid").into());
        }

        self.check_idempotency(&params.order_uid).await?;

        let order = Order::new(params)?;

        match self.repository.save_order(&order).await {
            Ok(()) => {}
            // Lost the race against a concurrent delivery of the same uid
            Err(RepositoryError::Duplicate(uid)) => {
                return Err(UseCaseError::IdempotencyKeyExists(uid));
            }
            Err(e) => return Err(UseCaseError::Repository(e)),
        }

        tracing::debug!(order_uid = %order.order_uid, "Order persisted");
        self.cache.set(Arc::new(order)).await;
        Ok(())
    }

    /// Cache-first lookup; a miss is served from the repository and cached.
    pub async fn get_order(&self, uid: &str) -> Result<Arc<Order>, UseCaseError> {
        if uid.is_empty() {
            return Err(DomainError::MissingRequiredField("order_uid").into());
        }

        if let Some(order) = self.cache.get(uid).await {
            self.record_cache_lookup(true);
            return Ok(order);
        }
        self.record_cache_lookup(false);

        let order = match self.repository.get_order_by_uid(uid).await {
            Ok(order) => Arc::new(order),
            Err(RepositoryError::NotFound(uid)) => return Err(UseCaseError::NotFound(uid)),
            Err(e) => return Err(UseCaseError::Repository(e)),
        };

        self.cache.set(order.clone()).await;
        Ok(order)
    }

    /// Warm the cache with the `limit` most recently created orders.
    /// Returns the number of orders loaded.
    pub async fn load_orders_cache(&self, limit: i64) -> Result<usize, UseCaseError> {
        let orders = self
            .repository
            .get_last_orders(limit)
            .await
            .map_err(UseCaseError::Repository)?;

        let loaded = orders.len();
        for order in orders {
            self.cache.set(Arc::new(order)).await;
        }

        tracing::info!(loaded, limit, "Orders cache warmed up");
        Ok(loaded)
    }

    async fn check_idempotency(&self, uid: &str) -> Result<(), UseCaseError> {
        let exists = self
            .repository
            .check_idempotency_key(uid)
            .await
            .map_err(UseCaseError::Repository)?;

        if exists {
            return Err(UseCaseError::IdempotencyKeyExists(uid.to_string()));
        }
        Ok(())
    }

    fn record_cache_lookup(&self, hit: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(hit);
        }
    }
}

#[async_trait]
impl OrderCreator for OrderUseCase {
    async fn create_order(&self, params: OrderParams) -> Result<(), UseCaseError> {
        OrderUseCase::create_order(self, params).await
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LruOrderCache;
    use crate::domain::order::tests::{sample_order, sample_params};
    use crate::repository::InMemoryOrderRepository;

    fn use_case() -> (OrderUseCase, Arc<InMemoryOrderRepository>, Arc<LruOrderCache>) {
        let repository = Arc::new(InMemoryOrderRepository::new());
        let cache = Arc::new(LruOrderCache::new(10));
        let uc = OrderUseCase::new(repository.clone(), cache.clone());
        (uc, repository, cache)
    }

    #[tokio::test]
    async fn test_create_order_persists_and_caches() {
        let (uc, repository, cache) = use_case();

        uc.create_order(sample_params()).await.unwrap();

        assert_eq!(repository.count("b563feb7b2b84b6test").await, 1);
        let cached = cache.get("b563feb7b2b84b6test").await.unwrap();
        assert_eq!(*cached, sample_order());
    }

    #[tokio::test]
    async fn test_create_order_twice_is_idempotent() {
        let (uc, repository, _) = use_case();

        uc.create_order(sample_params()).await.unwrap();
        let err = uc.create_order(sample_params()).await.unwrap_err();

        assert!(matches!(err, UseCaseError::IdempotencyKeyExists(ref uid) if uid == "b563feb7b2b84b6test"));
        assert!(!err.is_retryable());
        assert_eq!(repository.count("b563feb7b2b84b6test").await, 1);
    }

    #[tokio::test]
    async fn test_empty_uid_rejected_before_repository() {
        let (uc, repository, _) = use_case();
        let mut params = sample_params();
        params.order_uid.clear();

        let err = uc.create_order(params).await.unwrap_err();

        assert!(matches!(err, UseCaseError::InvalidState(_)));
        assert_eq!(repository.idempotency_checks().await, 0);
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_retryable() {
        let (uc, repository, cache) = use_case();
        let mut params = sample_params();
        params.items.clear();

        let err = uc.create_order(params).await.unwrap_err();

        assert!(matches!(err, UseCaseError::InvalidState(_)));
        assert!(!err.is_retryable());
        assert_eq!(repository.count("b563feb7b2b84b6test").await, 0);
        assert!(cache.get("b563feb7b2b84b6test").await.is_none());
    }

    #[tokio::test]
    async fn test_repository_failure_is_retryable_and_not_cached() {
        let (uc, repository, cache) = use_case();
        repository.fail_next_saves(1).await;

        let err = uc.create_order(sample_params()).await.unwrap_err();

        assert!(matches!(err, UseCaseError::Repository(_)));
        assert!(err.is_retryable());
        assert!(cache.get("b563feb7b2b84b6test").await.is_none());

        // Next attempt goes through once storage recovers
        uc.create_order(sample_params()).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_conflict_maps_to_idempotency_error() {
        let (uc, repository, _) = use_case();
        repository.hide_from_idempotency_check(true).await;

        uc.create_order(sample_params()).await.unwrap();
        let err = uc.create_order(sample_params()).await.unwrap_err();

        assert!(matches!(err, UseCaseError::IdempotencyKeyExists(_)));
        assert_eq!(repository.count("b563feb7b2b84b6test").await, 1);
    }

    #[tokio::test]
    async fn test_get_order_hits_cache_without_repository() {
        let (uc, repository, cache) = use_case();
        cache.set(Arc::new(sample_order())).await;

        let order = uc.get_order("b563feb7b2b84b6test").await.unwrap();

        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(repository.reads().await, 0);
    }

    #[tokio::test]
    async fn test_get_order_reads_through_on_miss() {
        let (uc, repository, cache) = use_case();
        repository.save_order(&sample_order()).await.unwrap();

        let first = uc.get_order("b563feb7b2b84b6test").await.unwrap();
        let second = uc.get_order("b563feb7b2b84b6test").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repository.reads().await, 1);
        assert!(cache.get("b563feb7b2b84b6test").await.is_some());
    }

    #[tokio::test]
    async fn test_get_order_not_found_and_invalid() {
        let (uc, _, _) = use_case();

        let err = uc.get_order("missing").await.unwrap_err();
        assert!(matches!(err, UseCaseError::NotFound(ref uid) if uid == "missing"));

        let err = uc.get_order("").await.unwrap_err();
        assert!(matches!(err, UseCaseError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_load_orders_cache_takes_most_recent() {
        let (uc, repository, cache) = use_case();
        for (i, uid) in ["old", "mid", "new"].iter().enumerate() {
            let mut order = sample_order();
            order.order_uid = uid.to_string();
            order.date_created += chrono::Duration::hours(i as i64);
            repository.save_order(&order).await.unwrap();
        }

        let loaded = uc.load_orders_cache(2).await.unwrap();

        assert_eq!(loaded, 2);
        assert!(cache.get("new").await.is_some());
        assert!(cache.get("mid").await.is_some());
        assert!(cache.get("old").await.is_none());
    }
}
