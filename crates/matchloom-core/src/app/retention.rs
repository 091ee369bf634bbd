//! RetentionLoop - 終端状態のタスクを期限後に registry から削除
//!
//! # フロー
//! 1. `purge_interval` ごとに起きる
//! 2. `now - retention` 以前に終わったタスクを purge
//! 3. shutdown 要求で停止

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::ports::Clock;
use crate::registry::TaskRegistry;

/// Retention loop handle.
/// - `request_shutdown()` で次の tick を待たずに止まる
/// - `shutdown_and_join()` で停止を待てる
pub struct RetentionLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RetentionLoop {
    pub fn spawn(
        registry: Arc<TaskRegistry>,
        clock: Arc<dyn Clock>,
        retention: Duration,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            retention_loop(registry, clock, retention, interval, &mut shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn retention_loop(
    registry: Arc<TaskRegistry>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                purge_expired(&registry, clock.as_ref(), retention).await;
            }
        }
    }
    debug!("retention loop stopped");
}

/// Purge tasks that finished more than `retention` ago.
pub async fn purge_expired(registry: &TaskRegistry, clock: &dyn Clock, retention: Duration) -> usize {
    let cutoff = chrono::Duration::from_std(retention)
        .ok()
        .and_then(|keep| clock.now().checked_sub_signed(keep));
    match cutoff {
        Some(cutoff) => registry.purge(cutoff).await,
        None => {
            warn!(retention_secs = retention.as_secs(), "retention out of range, nothing purged");
            0
        }
    }
}
