use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use latchkey_core::registry::DeviceRegistry;
use latchkey_events::EventBus;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use latchkey_api::background::ScheduleDispatcher;
use latchkey_api::config::ServerConfig;
use latchkey_api::router::build_app_router;
use latchkey_api::state::AppState;
use latchkey_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "latchkey_api=debug,latchkey_db=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid configuration");
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let jobs_cancel = CancellationToken::new();

    // --- Device registry ---
    let (registry, listener_handle) = match &config.database_url {
        Some(database_url) => {
            let pool = latchkey_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            latchkey_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            latchkey_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            let listener = tokio::spawn(latchkey_db::listener::run(
                pool.clone(),
                Arc::clone(&event_bus),
                jobs_cancel.clone(),
            ));
            let registry: Arc<dyn DeviceRegistry> =
                Arc::new(latchkey_db::PgDeviceRegistry::new(pool));
            (registry, Some(listener))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory device registry");
            let registry: Arc<dyn DeviceRegistry> = Arc::new(
                latchkey_db::InMemoryRegistry::with_event_bus(Arc::clone(&event_bus)),
            );
            (registry, None)
        }
    };

    // --- App state ---
    let state = AppState::new(config.clone(), Arc::clone(&registry));
    let ws_manager = Arc::clone(&state.ws_manager);
    let ws_tasks = state.ws_tasks.clone();
    let relay = Arc::clone(&state.relay);

    // --- Registration handler (device removals) ---
    let registration_handle =
        tokio::spawn(Arc::clone(relay.registration()).run(event_bus.subscribe()));

    // --- Schedule dispatcher ---
    let dispatcher = ScheduleDispatcher::new(
        Arc::clone(&registry),
        Arc::clone(relay.router()),
        &config.schedule,
    );
    let dispatcher_handle = tokio::spawn(dispatcher.run(jobs_cancel.clone()));

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&ws_manager),
        config.relay.ping_interval,
        jobs_cancel.clone(),
    );

    tracing::info!(
        presence_timeout_secs = config.relay.presence_timeout.as_secs(),
        timezone = %config.schedule.timezone,
        "Relay services started"
    );

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let step_timeout = Duration::from_secs(config.shutdown_timeout_secs);

    // Stop the dispatcher, heartbeat and notification listener.
    jobs_cancel.cancel();
    let _ = tokio::time::timeout(step_timeout, dispatcher_handle).await;
    let _ = tokio::time::timeout(step_timeout, heartbeat_handle).await;
    if let Some(handle) = listener_handle {
        let _ = tokio::time::timeout(step_timeout, handle).await;
    }
    tracing::info!("Background jobs stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;
    ws_tasks.close();
    if tokio::time::timeout(step_timeout, ws_tasks.wait()).await.is_err() {
        tracing::warn!(remaining = ws_tasks.len(), "WebSocket tasks did not finish in time");
    }

    relay.shutdown();

    // The registry still holds a bus sender, so the handler never sees Closed.
    registration_handle.abort();

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
