use axum::{Router, routing::post};
use std::{
    net::{Ipv4Addr, SocketAddr},
    process::exit,
};
use tower_http::trace::TraceLayer;

mod apex;
mod mail;

use apex::{config::Config, state::AppState};
use mail::{endpoints::send_endpoint, schemas::SEND_PATH};

pub(crate) fn app(state: AppState) -> Router {
    Router::new()
        .route(SEND_PATH, post(send_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("{}", error);
            exit(1);
        }
    };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.http_port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!("Failed to bind {}: {}", addr, error);
            exit(1);
        }
    };

    tracing::info!(
        smtp_host = %config.smtp.host,
        smtp_port = config.smtp.port,
        "Server starting on port {}",
        config.http_port
    );

    let router = app(AppState::new(config));

    if let Err(error) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", error);
        exit(1);
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}
