//! Periodic deletion of old decided requests. Pending requests are never
//! touched regardless of age.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::RetentionConfig;
use crate::db::RequestStore;

pub struct RetentionSweeper {
    store: Arc<dyn RequestStore>,
    interval: Duration,
    retention: chrono::Duration,
    running: Mutex<()>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn RequestStore>, config: &RetentionConfig) -> Self {
        Self {
            store,
            interval: Duration::from_secs(config.sweep_interval_hours * 3600),
            retention: chrono::Duration::days(config.max_age_days as i64),
            running: Mutex::new(()),
        }
    }

    /// One sweep pass. Overlapping triggers are skipped rather than queued;
    /// the next scheduled run picks up whatever this one missed.
    pub async fn sweep_once(&self) -> Option<u64> {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("retention sweep already in progress, skipping");
                return None;
            }
        };

        let cutoff = Utc::now() - self.retention;
        match self.store.delete_terminal_older_than(cutoff).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed = removed, "retention sweep deleted old requests");
                }
                Some(removed)
            }
            Err(e) => {
                // Best effort; the next run retries.
                warn!(error = %e, "retention sweep failed");
                None
            }
        }
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately, which doubles as a cleanup
            // pass on startup.
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }
}
