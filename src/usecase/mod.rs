// ============================================================================
// Use Case Layer
// ============================================================================
//
// Orchestrates idempotency check → domain construction → persistence → cache
// population, and cache-first retrieval. Collaborators are injected as
// capability traits (see `ports`).
//
// ============================================================================

mod order;
mod ports;

pub use order::{OrderUseCase, UseCaseError};
pub use ports::{OrderCache, OrderCreator, OrderRepository};
