//! Periodic expiration sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::cache::store::CacheStore;

pub struct CacheSweeper {
    cache: Arc<CacheStore>,
    interval: Duration,
}

impl CacheSweeper {
    pub fn new(cache: Arc<CacheStore>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Sweep every `interval` until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.interval.is_zero() {
            tracing::info!("Cache sweeper disabled");
            return;
        }

        tracing::info!(interval = ?self.interval, "Cache sweeper starting");
        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.cache.sweep();
                    if purged > 0 {
                        tracing::info!(purged, "Cache sweep removed expired entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
