use actix_web::{http::StatusCode, web, HttpResponse, Responder, ResponseError};
use prometheus::{Encoder, Registry, TextEncoder};

use super::dto::{ErrorResponse, OrderResponse};
use crate::usecase::{OrderUseCase, UseCaseError};

/// Query-surface errors, rendered as `{ "code": .., "message": .. }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal server error")]
    Internal,
}

impl From<UseCaseError> for ApiError {
    fn from(err: UseCaseError) -> Self {
        match err {
            UseCaseError::InvalidState(e) => ApiError::BadRequest(e.to_string()),
            UseCaseError::NotFound(uid) => ApiError::NotFound(format!("order not found: {uid}")),
            other => {
                tracing::error!(error = %other, "Order lookup failed");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorResponse {
            code: status.as_u16(),
            message: self.to_string(),
        })
    }
}

/// Routes of the order query API.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/order/{uid}", web::get().to(get_order))
        .route("/order/", web::get().to(missing_uid))
        .route("/health", web::get().to(health_handler));
}

/// Routes of the Prometheus scrape endpoint.
pub fn configure_metrics(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler))
        .route("/health", web::get().to(health_handler));
}

async fn get_order(
    usecase: web::Data<OrderUseCase>,
    uid: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let uid = uid.into_inner();
    if uid.trim().is_empty() {
        return Err(ApiError::BadRequest("order uid required".to_string()));
    }

    let order = usecase.get_order(&uid).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order.as_ref())))
}

async fn missing_uid() -> Result<HttpResponse, ApiError> {
    Err(ApiError::BadRequest("order uid required".to_string()))
}

async fn metrics_handler(registry: web::Data<Registry>) -> Result<HttpResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        tracing::error!(error = %e, "Failed to encode metrics");
        ApiError::Internal
    })?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer))
}

async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-service"
    }))
}
