//! Listener lifecycle and the middleware stack shared by both tiers.

use std::any::Any;
use std::net::SocketAddr;

use axum::{
    http::Method,
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
};

use crate::api_errors::{AppError, INTERNAL_MESSAGE, NOT_FOUND_MESSAGE};
use crate::errors::{RiskError, RiskResult};
use crate::log_sink::log_requests;

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AnyOrigin)
}

async fn not_found() -> AppError {
    AppError::not_found(NOT_FOUND_MESSAGE)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!("Internal server error: handler panicked: {detail}");
    AppError::internal(INTERNAL_MESSAGE).into_response()
}

/// JSON 404 fallback, panic guard, request logging and CORS.
pub fn with_common_layers(router: Router) -> Router {
    router
        .fallback(not_found)
        // Inside the logger so panics still get their response line.
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn(log_requests))
        .layer(cors_layer())
}

/// Bind `addr` and serve `router` until Ctrl-C or SIGTERM.
pub async fn serve(router: Router, addr: &str, name: &str) -> RiskResult<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RiskError::io(format!("binding {addr}"), e))?;
    let local = listener
        .local_addr()
        .map_err(|e| RiskError::io("reading local address", e))?;
    tracing::info!("{name} listening on http://{local}");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| RiskError::io(format!("serving {name}"), e))?;

    tracing::info!("{name} stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
