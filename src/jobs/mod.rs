//! Background job controller: hosts one long-running tokio task per
//! registered job. Each worker owns a cancellation signal observed both
//! between iterations and inside the inter-tick sleep, so `stop` interrupts
//! the wait immediately. Task errors are logged (tracing + the durable
//! system log) and the loop proceeds to the next tick.

pub mod market_data_refresher;
pub mod order_matcher;
pub mod position_revaluer;
pub mod trading_bot;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::JobError;
use crate::storage::Store;

const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// One iteration of the worker. Errors are logged by the controller;
    /// they never terminate the loop.
    async fn run(&self) -> anyhow::Result<()>;
}

struct JobEntry {
    job: Arc<dyn Job>,
    interval: Duration,
    cancel_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
    last_run: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl JobEntry {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub running: bool,
    pub interval_secs: u64,
    pub last_run: Option<DateTime<Utc>>,
}

pub struct JobController {
    jobs: Mutex<HashMap<String, JobEntry>>,
    store: Store,
}

impl JobController {
    pub fn new(store: Store) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Register a job. A duplicate name is replaced only while the old job
    /// is not running; replacing a running job is an error.
    pub fn register(&self, name: &str, job: Arc<dyn Job>, interval: Duration) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock();
        if let Some(existing) = jobs.get(name) {
            if existing.is_running() {
                return Err(JobError::AlreadyRegistered(name.to_string()));
            }
        }
        jobs.insert(
            name.to_string(),
            JobEntry {
                job,
                interval,
                cancel_tx: None,
                handle: None,
                last_run: Arc::new(Mutex::new(None)),
            },
        );
        info!(job = name, interval_secs = interval.as_secs(), "job registered");
        Ok(())
    }

    /// Start one job, or every registered job when `name` is None. Starting
    /// an already-running or unknown job is a warning, not an error.
    pub fn start(&self, name: Option<&str>) {
        let mut jobs = self.jobs.lock();
        let targets: Vec<String> = match name {
            Some(n) => vec![n.to_string()],
            None => jobs.keys().cloned().collect(),
        };

        for target in targets {
            let Some(entry) = jobs.get_mut(&target) else {
                warn!(job = %target, "job not found");
                continue;
            };
            if entry.is_running() {
                warn!(job = %target, "job already running");
                continue;
            }

            let (cancel_tx, cancel_rx) = watch::channel(false);
            let handle = tokio::spawn(worker_loop(
                target.clone(),
                entry.job.clone(),
                entry.interval,
                cancel_rx,
                entry.last_run.clone(),
                self.store.clone(),
            ));
            entry.cancel_tx = Some(cancel_tx);
            entry.handle = Some(handle);
            info!(job = %target, "job started");
        }
    }

    /// Stop one job, or all. Signals cancellation, then waits up to five
    /// seconds for the worker to exit before abandoning the handle. Stopping
    /// an already-stopped or unknown job is a no-op.
    pub async fn stop(&self, name: Option<&str>) {
        let targets: Vec<(String, Option<watch::Sender<bool>>, Option<JoinHandle<()>>)> = {
            let mut jobs = self.jobs.lock();
            let names: Vec<String> = match name {
                Some(n) => vec![n.to_string()],
                None => jobs.keys().cloned().collect(),
            };
            names
                .into_iter()
                .filter_map(|n| {
                    jobs.get_mut(&n)
                        .map(|entry| (n, entry.cancel_tx.take(), entry.handle.take()))
                })
                .collect()
        };

        for (job_name, cancel_tx, handle) in targets {
            if let Some(cancel_tx) = cancel_tx {
                let _ = cancel_tx.send(true);
            }
            if let Some(handle) = handle {
                match tokio::time::timeout(STOP_JOIN_TIMEOUT, handle).await {
                    Ok(_) => info!(job = %job_name, "job stopped"),
                    Err(_) => warn!(job = %job_name, "job did not stop within timeout, abandoned"),
                }
            }
        }
    }

    /// Stop and deregister; unknown names are a no-op.
    pub async fn remove(&self, name: &str) {
        self.stop(Some(name)).await;
        if self.jobs.lock().remove(name).is_some() {
            info!(job = name, "job removed");
        }
    }

    pub fn status(&self) -> HashMap<String, JobStatus> {
        let jobs = self.jobs.lock();
        jobs.iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    JobStatus {
                        running: entry.is_running(),
                        interval_secs: entry.interval.as_secs(),
                        last_run: *entry.last_run.lock(),
                    },
                )
            })
            .collect()
    }
}

async fn worker_loop(
    name: String,
    job: Arc<dyn Job>,
    interval: Duration,
    mut cancel_rx: watch::Receiver<bool>,
    last_run: Arc<Mutex<Option<DateTime<Utc>>>>,
    store: Store,
) {
    loop {
        if *cancel_rx.borrow() {
            break;
        }

        if let Err(e) = job.run().await {
            error!(job = %name, error = %e, "job iteration failed");
            let _ = store
                .system_log()
                .error(&name, "job iteration failed", Some(&format!("{e:#}")))
                .await;
        }
        *last_run.lock() = Some(Utc::now());

        // Sleep-after-completion scheduling; the select makes the wait
        // cancellable mid-interval.
        tokio::select! {
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{migrate, Db};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Job for CountingJob {
        async fn run(&self) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("synthetic failure");
            }
            Ok(())
        }
    }

    async fn controller() -> (tempfile::TempDir, JobController) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path().join("jobs.db").to_str().unwrap()).unwrap();
        migrate::init(&db).await.unwrap();
        (dir, JobController::new(Store::new(db)))
    }

    #[tokio::test]
    async fn start_runs_and_stop_interrupts_the_wait() {
        let (_dir, controller) = controller().await;
        let runs = Arc::new(AtomicUsize::new(0));
        controller
            .register(
                "counter",
                Arc::new(CountingJob { runs: runs.clone(), fail: false }),
                // Long interval: the loop runs once, then parks in the
                // inter-tick sleep until stop interrupts it.
                Duration::from_secs(3600),
            )
            .unwrap();

        controller.start(Some("counter"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(controller.status()["counter"].running);

        let before = std::time::Instant::now();
        controller.stop(Some("counter")).await;
        assert!(before.elapsed() < Duration::from_secs(1));
        assert!(!controller.status()["counter"].running);
    }

    #[tokio::test]
    async fn failures_do_not_terminate_the_loop() {
        let (_dir, controller) = controller().await;
        let runs = Arc::new(AtomicUsize::new(0));
        controller
            .register(
                "flaky",
                Arc::new(CountingJob { runs: runs.clone(), fail: true }),
                Duration::from_millis(10),
            )
            .unwrap();

        controller.start(None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.stop(None).await;

        assert!(runs.load(Ordering::SeqCst) >= 2, "loop should survive errors");
    }

    #[tokio::test]
    async fn register_rejects_running_duplicates_and_replaces_idle_ones() {
        let (_dir, controller) = controller().await;
        let runs = Arc::new(AtomicUsize::new(0));
        let job = || Arc::new(CountingJob { runs: runs.clone(), fail: false });

        controller.register("dup", job(), Duration::from_secs(3600)).unwrap();
        // Idle replacement is allowed.
        controller.register("dup", job(), Duration::from_secs(3600)).unwrap();

        controller.start(Some("dup"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            controller.register("dup", job(), Duration::from_secs(3600)),
            Err(JobError::AlreadyRegistered(_))
        ));
        controller.stop(None).await;
    }

    #[tokio::test]
    async fn stop_and_remove_are_noops_for_unknown_jobs() {
        let (_dir, controller) = controller().await;
        controller.stop(Some("ghost")).await;
        controller.remove("ghost").await;
        controller.start(Some("ghost"));
        assert!(controller.status().is_empty());
    }
}
