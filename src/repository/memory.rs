use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::domain::Order;
use crate::usecase::OrderRepository;

use super::RepositoryError;

// ============================================================================
// In-Memory Order Repository
// ============================================================================
//
// Mirrors the Postgres contract (unique order uid, newest-first listing) and
// adds failure injection and call counters for tests.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryOrderRepository {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    orders: HashMap<String, Order>,
    failing_saves: u32,
    failing_reads: u32,
    hide_existing: bool,
    idempotency_checks: u32,
    reads: u32,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` saves fail with a transient storage error.
    pub async fn fail_next_saves(&self, n: u32) {
        self.state.lock().await.failing_saves = n;
    }

    /// Make the next `n` reads fail with a transient storage error.
    pub async fn fail_next_reads(&self, n: u32) {
        self.state.lock().await.failing_reads = n;
    }

    /// Report every uid as unseen to the idempotency check, so duplicates
    /// are only caught by the insert.
    pub async fn hide_from_idempotency_check(&self, hide: bool) {
        self.state.lock().await.hide_existing = hide;
    }

    pub async fn count(&self, uid: &str) -> usize {
        usize::from(self.state.lock().await.orders.contains_key(uid))
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn idempotency_checks(&self) -> u32 {
        self.state.lock().await.idempotency_checks
    }

    pub async fn reads(&self) -> u32 {
        self.state.lock().await.reads
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.failing_saves > 0 {
            state.failing_saves -= 1;
            return Err(RepositoryError::Unavailable("injected save failure".to_string()));
        }
        if state.orders.contains_key(&order.order_uid) {
            return Err(RepositoryError::Duplicate(order.order_uid.clone()));
        }

        state.orders.insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_order_by_uid(&self, uid: &str) -> Result<Order, RepositoryError> {
        let mut state = self.state.lock().await;
        state.reads += 1;
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(RepositoryError::Unavailable("injected read failure".to_string()));
        }

        state
            .orders
            .get(uid)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(uid.to_string()))
    }

    async fn check_idempotency_key(&self, uid: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        state.idempotency_checks += 1;
        Ok(!state.hide_existing && state.orders.contains_key(uid))
    }

    async fn get_last_orders(&self, limit: i64) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.date_created.cmp(&a.date_created));
        orders.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(orders)
    }
}
