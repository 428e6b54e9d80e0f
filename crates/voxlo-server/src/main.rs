use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use voxlo_db::Database;
use voxlo_gateway::{Hub, SystemClock};
use voxlo_server::config::Config;
use voxlo_server::maintenance;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "voxlo_server=debug,voxlo_gateway=debug,voxlo_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Restore the last snapshot, if persistence is on
    let db = match &config.db_path {
        Some(path) => Some(Arc::new(Database::open(path)?)),
        None => {
            warn!("VOXLO_DB_PATH is empty, running without persistence");
            None
        }
    };
    let hub = match &db {
        Some(db) => Hub::restore(db.load_snapshot()?, Arc::new(SystemClock)),
        None => Hub::new(),
    };

    // Background tasks
    let shutdown = CancellationToken::new();
    let mut tasks = vec![tokio::spawn(maintenance::run_compaction_loop(
        hub.clone(),
        config.compaction_interval_secs,
        shutdown.clone(),
    ))];
    if let Some(db) = &db {
        tasks.push(tokio::spawn(maintenance::run_snapshot_loop(
            hub.clone(),
            db.clone(),
            config.snapshot_interval_secs,
            shutdown.clone(),
        )));
    }

    let state = voxlo_server::app_state(hub.clone(), config.admin_token.clone());
    if state.admin_token.is_some() {
        info!("Admin routes enabled");
    }
    let app = voxlo_server::app(state, config.cors_layer()?);

    let addr = config.addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("VOXLO server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    for task in tasks {
        let _ = task.await;
    }

    if let Some(db) = &db {
        maintenance::save_snapshot(&hub, db).await?;
        info!("Final snapshot written");
    }

    info!("VOXLO server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
