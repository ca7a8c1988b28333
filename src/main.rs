//! Tank Arena - authoritative simulation server
//!
//! Runs the world manager, the physics driver and the NPC controller against
//! a shared key-value store. Clients read and write the world through the
//! same store.

use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tank_arena_core::app::AppState;
use tank_arena_core::config::Config;
use tank_arena_core::util::shutdown;
use tank_arena_core::util::time::{init_server_time, uptime_secs};

/// How long background tasks get to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!(
        started_at = %chrono::Utc::now().to_rfc3339(),
        npcs = config.num_npcs,
        difficulty = config.npc_difficulty,
        "Starting Tank Arena server"
    );

    let state = AppState::build(config).await?;

    let (trigger, shutdown) = shutdown::channel();
    let tasks = state.spawn_tasks(&shutdown);
    state.spawn_npcs().await;

    info!(tasks = tasks.len(), "Simulation running");

    shutdown_signal().await;
    trigger.trigger();

    state.npcs.remove_all_npcs().await;

    for task in tasks {
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Background task failed"),
            Err(_) => warn!("Background task did not stop in time"),
        }
    }

    info!(uptime_secs = uptime_secs(), "Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
