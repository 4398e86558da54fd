// ============================================================================
// HTTP Module - order query API and metrics endpoint (actix-web)
// ============================================================================

pub mod dto;
pub mod handlers;
pub mod server;

pub use dto::{ErrorResponse, OrderResponse};
pub use handlers::ApiError;
pub use server::{api_server, metrics_server};
