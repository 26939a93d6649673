// src/dispatch/mod.rs

//! The task dispatcher owns the concurrency model: bounded per-pool queues,
//! one-job-at-a-time workers, soft/hard time limits, transient-failure
//! retries, and back-pressure at submit.

pub mod classifier;
pub mod result_store;
pub mod types;
mod worker;

pub use classifier::Classifier;
pub use result_store::ResultStore;
pub use types::{Job, PoolKind, ResultRecord};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::agent::{CancelCause, JobControl, SqlAgent};
use crate::config::DispatchConfig;
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::metrics;

struct PoolHandle {
    tx: mpsc::Sender<Job>,
    capacity: usize,
}

pub struct Dispatcher {
    config: DispatchConfig,
    results: ResultStore,
    classifier: Classifier,
    controls: worker::ControlMap,
    pools: HashMap<PoolKind, PoolHandle>,
    shutdown_tx: watch::Sender<bool>,
}

impl Dispatcher {
    /// Build the three pools and spawn their workers.
    pub fn start(
        config: DispatchConfig,
        agent: Arc<SqlAgent>,
        results: ResultStore,
        classifier: Classifier,
    ) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let controls: worker::ControlMap = Arc::new(RwLock::new(HashMap::new()));
        let mut pools = HashMap::new();

        let pool_specs = [
            (PoolKind::Simple, config.simple.clone()),
            (PoolKind::Standard, config.standard.clone()),
            (PoolKind::Complex, config.complex.clone()),
        ];

        for (kind, pool_config) in pool_specs {
            let capacity = (pool_config.workers * config.prefetch_multiplier).max(1);
            let (tx, rx) = mpsc::channel::<Job>(capacity);

            worker::spawn_pool(
                pool_config.clone(),
                config.clone(),
                kind.as_str(),
                Arc::new(Mutex::new(rx)),
                tx.clone(),
                agent.clone(),
                results.clone(),
                controls.clone(),
                shutdown_rx.clone(),
            );

            info!(
                pool = kind.as_str(),
                workers = pool_config.workers,
                capacity,
                "Worker pool started"
            );

            pools.insert(kind, PoolHandle { tx, capacity });
        }

        Arc::new(Self {
            config,
            results,
            classifier,
            controls,
            pools,
            shutdown_tx,
        })
    }

    /// Enqueue a question. Returns immediately with the job id, or rejects
    /// with `Overloaded` when the routed pool's queue is full.
    pub async fn submit(&self, question: &str, session_id: Option<String>) -> CoreResult<String> {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return Err(CoreError::invalid_input("question is empty"));
        }

        if trimmed.len() > self.config.max_question_bytes {
            return Err(CoreError::invalid_input(format!(
                "question exceeds {} bytes",
                self.config.max_question_bytes
            )));
        }

        let pool_kind = self.classifier.route(trimmed).await;
        let pool = self
            .pools
            .get(&pool_kind)
            .ok_or_else(|| CoreError::internal("pool not provisioned"))?;

        let job = Job {
            id: Uuid::new_v4().to_string(),
            question: trimmed.to_string(),
            session_id,
            submitted_at: Utc::now(),
            pool: pool_kind,
            attempt: 0,
        };
        let job_id = job.id.clone();

        // Record and control exist before the job becomes visible to a
        // worker, so poll/cancel never race pickup.
        self.results
            .put(&job_id, &ResultRecord::Queued { submitted_at: job.submitted_at })
            .await;
        self.controls
            .write()
            .await
            .insert(job_id.clone(), JobControl::new());

        match pool.tx.try_send(job) {
            Ok(()) => {
                let depth = pool.capacity - pool.tx.capacity();
                metrics::set_queue_depth(pool_kind.as_str(), depth);
                debug!(job_id = %job_id, pool = pool_kind.as_str(), "Job enqueued");
                Ok(job_id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.results.remove(&job_id).await;
                self.controls.write().await.remove(&job_id);
                metrics::record_overload(pool_kind.as_str());

                Err(CoreError::new(
                    ErrorKind::Overloaded,
                    format!("{} pool queue is full", pool_kind.as_str()),
                ))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.results.remove(&job_id).await;
                self.controls.write().await.remove(&job_id);
                Err(CoreError::internal("dispatcher is shut down"))
            }
        }
    }

    /// Current record for a job. `UnknownJob` when it never existed or its
    /// record has expired.
    pub async fn poll(&self, job_id: &str) -> CoreResult<ResultRecord> {
        self.results
            .get(job_id)
            .await
            .ok_or_else(|| CoreError::new(ErrorKind::UnknownJob, "no such job"))
    }

    /// Flag a job for cooperative cancellation. Terminal jobs are a no-op.
    pub async fn cancel(&self, job_id: &str) -> CoreResult<()> {
        if let Some(ctrl) = self.controls.read().await.get(job_id) {
            ctrl.cancel(CancelCause::UserRequest);
            info!(job_id, "Cancellation requested");
            return Ok(());
        }

        // No live control: either terminal (fine) or unknown
        match self.results.get(job_id).await {
            Some(_) => Ok(()),
            None => Err(CoreError::new(ErrorKind::UnknownJob, "no such job")),
        }
    }

    /// Stop accepting work and wind the workers down.
    pub fn shutdown(&self) {
        info!("Dispatcher shutting down");
        let _ = self.shutdown_tx.send(true);
    }
}
