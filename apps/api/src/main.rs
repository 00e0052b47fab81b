use std::net::SocketAddr;
use std::sync::Arc;
use chrono::{FixedOffset, Offset, Utc};
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use reminder_cell::scheduler;
use reminder_cell::services::ReminderService;
use shared_config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Aum Clinic API server");

    let config = AppConfig::from_env();
    let port = config.port;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = Arc::new(config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = if state.reminder_scheduler_enabled {
        let offset = FixedOffset::east_opt(state.clinic_utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        let service = Arc::new(ReminderService::new(&state).with_shutdown(shutdown_rx.clone()));
        Some(tokio::spawn(scheduler::run_daily(
            service,
            state.reminder_daily_hour,
            offset,
            shutdown_rx,
        )))
    } else {
        warn!("Reminder scheduler disabled; use GET /reminders/run to send reminders");
        None
    };

    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            warn!("Reminder scheduler ended abnormally: {}", e);
        }
    }

    info!("Server stopped");
    Ok(())
}
