// src/dispatch/worker.rs
// Worker loop: pull a job, run the pipeline under soft/hard limits, write
// the terminal record. One job at a time per worker.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tracing::{debug, info, warn};

use super::types::{Job, ResultRecord};
use super::result_store::ResultStore;
use crate::agent::{CancelCause, JobControl, SqlAgent};
use crate::config::{DispatchConfig, PoolConfig};
use crate::error::ErrorKind;
use crate::metrics;

pub(crate) type SharedReceiver = Arc<Mutex<mpsc::Receiver<Job>>>;
pub(crate) type ControlMap = Arc<RwLock<HashMap<String, JobControl>>>;

/// Why a worker loop returned.
enum WorkerExit {
    Shutdown,
    Recycle,
}

/// Spawn the workers for one pool, each wrapped in a supervisor that
/// respawns it after `max_tasks_per_child` jobs.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_pool(
    pool: PoolConfig,
    dispatch: DispatchConfig,
    pool_name: &'static str,
    rx: SharedReceiver,
    requeue_tx: mpsc::Sender<Job>,
    agent: Arc<SqlAgent>,
    results: ResultStore,
    controls: ControlMap,
    shutdown: watch::Receiver<bool>,
) {
    for worker_id in 0..pool.workers {
        let pool = pool.clone();
        let dispatch = dispatch.clone();
        let rx = rx.clone();
        let requeue_tx = requeue_tx.clone();
        let agent = agent.clone();
        let results = results.clone();
        let controls = controls.clone();
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            loop {
                let exit = run_worker(
                    &pool,
                    &dispatch,
                    pool_name,
                    worker_id,
                    rx.clone(),
                    requeue_tx.clone(),
                    agent.clone(),
                    results.clone(),
                    controls.clone(),
                    shutdown.clone(),
                )
                .await;

                match exit {
                    WorkerExit::Shutdown => break,
                    WorkerExit::Recycle => {
                        info!(pool = pool_name, worker_id, "Recycling worker");
                    }
                }
            }
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    pool: &PoolConfig,
    dispatch: &DispatchConfig,
    pool_name: &'static str,
    worker_id: usize,
    rx: SharedReceiver,
    requeue_tx: mpsc::Sender<Job>,
    agent: Arc<SqlAgent>,
    results: ResultStore,
    controls: ControlMap,
    mut shutdown: watch::Receiver<bool>,
) -> WorkerExit {
    debug!(pool = pool_name, worker_id, "Worker started");
    let mut jobs_done = 0usize;

    loop {
        if *shutdown.borrow() {
            return WorkerExit::Shutdown;
        }

        // Hold the receiver lock only while waiting for pickup
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = shutdown.changed() => continue,
                job = rx.recv() => job,
            }
        };

        let Some(job) = job else {
            return WorkerExit::Shutdown;
        };

        process_job(pool, dispatch, pool_name, job, &requeue_tx, &agent, &results, &controls).await;

        jobs_done += 1;
        if dispatch.max_tasks_per_child > 0 && jobs_done >= dispatch.max_tasks_per_child {
            return WorkerExit::Recycle;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_job(
    pool: &PoolConfig,
    dispatch: &DispatchConfig,
    pool_name: &'static str,
    job: Job,
    requeue_tx: &mpsc::Sender<Job>,
    agent: &Arc<SqlAgent>,
    results: &ResultStore,
    controls: &ControlMap,
) {
    let started = Instant::now();

    results
        .put(&job.id, &ResultRecord::Running { started_at: Utc::now() })
        .await;

    let ctrl = controls
        .read()
        .await
        .get(&job.id)
        .cloned()
        .unwrap_or_default();

    // Soft limit: ask the pipeline to wind down at the next stage boundary
    let soft_guard = {
        let ctrl = ctrl.clone();
        let soft_limit = pool.soft_limit();
        tokio::spawn(async move {
            tokio::time::sleep(soft_limit).await;
            warn!("Soft time limit reached, flagging cancellation");
            ctrl.cancel(CancelCause::SoftTimeLimit);
        })
    };

    // Hard limit: abandon the stage outright and discard its output
    let outcome = tokio::time::timeout(
        pool.hard_limit(),
        agent.answer(&job.question, job.session_id.as_deref(), &ctrl),
    )
    .await;

    soft_guard.abort();

    let record = match outcome {
        Err(_) => {
            warn!(job_id = %job.id, "Hard time limit exceeded, abandoning job");
            ResultRecord::Failed {
                kind: ErrorKind::Timeout,
                message: format!("hard time limit of {:?} exceeded", pool.hard_limit()),
                finished_at: Utc::now(),
            }
        }
        Ok(Ok(payload)) => ResultRecord::Succeeded {
            payload,
            finished_at: Utc::now(),
        },
        Ok(Err(e)) if e.kind == ErrorKind::Cancelled => {
            ResultRecord::Cancelled { finished_at: Utc::now() }
        }
        Ok(Err(e)) if e.transient && job.attempt < dispatch.max_retries => {
            // Transient failure with retry budget left: back off and
            // re-enqueue instead of writing a terminal record.
            let backoff =
                Duration::from_millis(dispatch.retry_base_ms) * 2u32.pow(job.attempt);
            info!(
                job_id = %job.id,
                attempt = job.attempt + 1,
                "Transient failure ({}), re-enqueueing in {:?}",
                e,
                backoff
            );
            metrics::record_job_retry(pool_name);

            results
                .put(&job.id, &ResultRecord::Queued { submitted_at: job.submitted_at })
                .await;

            let retry = Job {
                attempt: job.attempt + 1,
                ..job
            };
            let requeue_tx = requeue_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(backoff).await;
                if requeue_tx.send(retry).await.is_err() {
                    warn!("Requeue failed: pool queue closed");
                }
            });
            return;
        }
        Ok(Err(e)) => ResultRecord::Failed {
            kind: e.kind,
            message: e.message,
            finished_at: Utc::now(),
        },
    };

    metrics::record_job_terminal(pool_name, record.state_name());
    metrics::record_job_duration(pool_name, started.elapsed().as_secs_f64());

    results.put(&job.id, &record).await;
    controls.write().await.remove(&job.id);

    debug!(job_id = %job.id, state = record.state_name(), "Job finished");
}
