// src/scheduler/mod.rs

//! Periodic-task runner: schema refresh, session sweep, health heartbeat.
//!
//! Multiple instances may run; each tick is gated by an advisory lock in
//! the cache with a lease of twice the period, so only one holder does the
//! work. Missed ticks do not accumulate.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::cache::Cache;
use crate::catalog::SchemaCatalog;
use crate::metrics;

pub struct Scheduler {
    cache: Cache,
    catalog: Arc<SchemaCatalog>,
    schema_refresh_interval: Duration,
    heartbeat_interval: Duration,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(cache: Cache, catalog: Arc<SchemaCatalog>, schema_refresh_secs: u64) -> Self {
        Self {
            cache,
            catalog,
            schema_refresh_interval: Duration::from_secs(schema_refresh_secs),
            heartbeat_interval: Duration::from_secs(300),
            handles: Vec::new(),
        }
    }

    /// Starts all periodic tasks
    pub fn start(&mut self) {
        info!("Starting scheduler");

        self.handles.push(self.spawn_schema_refresh());
        self.handles.push(self.spawn_heartbeat());

        // Session TTL sweep: both cache backends expire entries natively,
        // so the sweep is a no-op in this deployment.
        info!("Session sweep skipped: cache backend handles TTL natively");

        info!("Started {} scheduler tasks", self.handles.len());
    }

    fn spawn_schema_refresh(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let catalog = self.catalog.clone();
        let interval = self.schema_refresh_interval;
        let lease = interval * 2;

        tokio::spawn(async move {
            info!("Schema refresh task started (interval: {:?})", interval);

            let mut timer = time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The immediate first tick would race startup's lazy load
            timer.tick().await;

            loop {
                timer.tick().await;

                if !cache.try_lock("scheduler:schema_refresh", lease).await {
                    debug!("Schema refresh skipped: another instance holds the lease");
                    continue;
                }

                match catalog.refresh().await {
                    Ok(count) => {
                        metrics::record_scheduled_task("schema_refresh", true);
                        info!("Schema refresh complete: {} tables", count);
                    }
                    Err(e) => {
                        // Previous snapshots stay valid
                        metrics::record_scheduled_task("schema_refresh", false);
                        error!("Schema refresh failed: {}", e);
                    }
                }
            }
        })
    }

    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let interval = self.heartbeat_interval;

        tokio::spawn(async move {
            let mut timer = time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                timer.tick().await;

                let healthy = cache.healthy().await;
                metrics::record_scheduled_task("heartbeat", healthy);

                if !healthy {
                    error!("Cache backend unreachable; running in all-miss mode");
                }
            }
        })
    }

    /// Gracefully shutdown all periodic tasks
    pub fn shutdown(self) {
        info!("Shutting down scheduler");

        for handle in self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnector;

    #[tokio::test]
    async fn test_election_lease_blocks_second_instance() {
        let cache = Cache::in_memory(100);
        let lease = Duration::from_secs(120);

        assert!(cache.try_lock("scheduler:schema_refresh", lease).await);
        // A second instance inside the lease window loses the election
        assert!(!cache.try_lock("scheduler:schema_refresh", lease).await);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let cache = Cache::in_memory(100);
        let connector = Arc::new(MockConnector::new().with_table(
            "users",
            vec![("id", "integer", false, Some("primary key"))],
        ));
        let catalog = Arc::new(SchemaCatalog::new(connector, cache.clone(), 3_600));

        catalog.refresh().await.unwrap();
        let first = catalog.ddl("users").await.unwrap();

        catalog.refresh().await.unwrap();
        let second = catalog.ddl("users").await.unwrap();

        assert_eq!(first, second);
    }
}
