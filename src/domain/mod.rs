// ============================================================================
// Domain Layer - Order Value Objects
// ============================================================================
//
// Pure constructors that turn raw ingestion parameters into immutable value
// objects. No I/O happens here; a failure is always a permanent property of
// the input.
//
// ============================================================================

pub mod delivery;
pub mod errors;
pub mod item;
pub mod order;
pub mod payment;

pub use delivery::{Delivery, DeliveryParams};
pub use errors::DomainError;
pub use item::{Item, ItemParams};
pub use order::{Order, OrderParams};
pub use payment::{Payment, PaymentParams};
