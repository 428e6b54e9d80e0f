use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use voxlo_db::Database;
use voxlo_gateway::Hub;

/// Background task that drops expired messages.
///
/// Liveness is already enforced on every read, so this only bounds memory
/// and keeps snapshots small.
pub async fn run_compaction_loop(hub: Hub, interval_secs: u64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let removed = hub.compact_all().await;
                if removed > 0 {
                    info!("Compaction: dropped {} expired messages", removed);
                }
            }
        }
    }
}

/// Background task that writes a snapshot after state changed, at most once
/// per `interval_secs`.
pub async fn run_snapshot_loop(
    hub: Hub,
    db: Arc<Database>,
    interval_secs: u64,
    shutdown: CancellationToken,
) {
    let debounce = Duration::from_secs(interval_secs);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = hub.changed() => {}
        }

        // Coalesce bursts; the caller flushes on shutdown.
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(debounce) => {}
        }

        if let Err(e) = save_snapshot(&hub, &db).await {
            warn!("Snapshot error: {:#}", e);
        }
    }
}

/// Copy the hub state and write it on a blocking thread.
pub async fn save_snapshot(hub: &Hub, db: &Arc<Database>) -> anyhow::Result<()> {
    let snapshot = hub.snapshot().await;
    let counts = (snapshot.identities.len(), snapshot.conversations.len());

    let db = db.clone();
    tokio::task::spawn_blocking(move || db.save_snapshot(&snapshot)).await??;

    debug!("Snapshot saved: {} identities, {} conversations", counts.0, counts.1);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saved_snapshot_restores_identities() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let hub = Hub::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let conn = voxlo_gateway::ConnId::new();
        hub.attach(conn, tx).await;
        let ada = hub.register(conn, None, "Ada", None).await.unwrap();

        save_snapshot(&hub, &db).await.unwrap();

        let loaded = db.load_snapshot().unwrap();
        assert_eq!(loaded.identities.len(), 1);
        assert_eq!(loaded.identities[0].id, ada.id);
        assert_eq!(loaded.identities[0].invite_code, ada.invite_code);
    }

    #[tokio::test]
    async fn snapshot_loop_stops_on_shutdown() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_snapshot_loop(Hub::new(), db, 1, shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
