// Framework bootstrap for the race server runtime.

use crate::domain::Tuning;
use crate::frameworks::{config, tracks};
use crate::interface_adapters::net::{
    list_maps_handler, list_rooms_handler, not_found_handler, ws_handler,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::RoomRegistry;

use axum::{Router, routing::get};
use std::{io::Result, net::SocketAddr, sync::Arc};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Serves the race server on an already bound listener until the server fails.
pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state();
    let registry = state.registry.clone();

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/rooms", get(list_rooms_handler))
        .route("/maps", get(list_maps_handler))
        .fallback(not_found_handler)
        .with_state(state);

    tracing::info!(%address, "listening");

    let served = axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    });
    registry.shutdown_all().await;
    served
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let host: std::net::IpAddr = config::http_host().parse().map_err(|e| {
        std::io::Error::other(format!("invalid RACE_SERVER_HOST: {e}"))
    })?;
    let address = SocketAddr::new(host, config::http_port());

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state() -> Arc<AppState> {
    let catalog = tracks::load_catalog(&config::maps_dir(), &config::default_map_id());
    let settings = config::room_settings();
    tracing::debug!(
        capacity = settings.capacity,
        tick_ms = settings.tick_interval.as_millis() as u64,
        "room settings"
    );

    // The registry owns every room task; rooms are created on demand by joins.
    let registry = Arc::new(RoomRegistry::new(
        settings,
        Tuning::default(),
        Arc::new(catalog),
    ));

    Arc::new(AppState { registry })
}
