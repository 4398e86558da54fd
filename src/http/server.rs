use actix_web::dev::{Server, Service};
use actix_web::{web, App, HttpServer};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use super::handlers::{configure_api, configure_metrics};
use crate::usecase::OrderUseCase;

// ============================================================================
// HTTP Servers
// ============================================================================
//
// Two listeners: the order query API and the Prometheus scrape endpoint.
// Signal handling is left to the application so shutdown follows the
// pipeline's own ordering.
//
// ============================================================================

const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Bind the order query API. The returned server must be spawned.
pub fn api_server(usecase: Arc<OrderUseCase>, host: &str, port: u16) -> std::io::Result<Server> {
    tracing::info!("Starting order API on http://{}:{}/order/{{uid}}", host, port);
    let usecase = web::Data::from(usecase);

    let server = HttpServer::new(move || {
        App::new()
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let path = req.path().to_string();
                let started = Instant::now();
                let fut = srv.call(req);
                async move {
                    let res = fut.await?;
                    tracing::info!(
                        method = %method,
                        path = %path,
                        status = res.status().as_u16(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "request"
                    );
                    Ok(res)
                }
            })
            .app_data(usecase.clone())
            .configure(configure_api)
    })
    .disable_signals()
    .shutdown_timeout(SHUTDOWN_TIMEOUT_SECS)
    .bind((host, port))?
    .run();

    Ok(server)
}

/// Bind the metrics endpoint. The returned server must be spawned.
pub fn metrics_server(registry: Registry, host: &str, port: u16) -> std::io::Result<Server> {
    tracing::info!("📊 Starting metrics server on http://{}:{}/metrics", host, port);
    let registry = web::Data::new(registry);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(registry.clone())
            .configure(configure_metrics)
    })
    .disable_signals()
    .shutdown_timeout(SHUTDOWN_TIMEOUT_SECS)
    .workers(1)
    .bind((host, port))?
    .run();

    Ok(server)
}
