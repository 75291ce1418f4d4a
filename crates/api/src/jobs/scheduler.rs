//! Periodic background jobs.
//!
//! Each registered job runs on its own task with a fixed period. The first
//! run happens one period after start. All tasks stop on `shutdown`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// A unit of periodic work.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    /// Time between runs.
    fn period(&self) -> Duration;

    async fn execute(&self) -> Result<(), String>;
}

pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    pub fn start(&mut self) {
        info!(jobs = self.jobs.len(), "Starting background jobs");
        for job in &self.jobs {
            let handle = tokio::spawn(run_job(job.clone(), self.shutdown_tx.subscribe()));
            self.handles.push(handle);
        }
    }

    /// Signals every job to stop after its current run.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Waits up to `timeout` for the job tasks to finish.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        let handles = self.handles;
        let joined = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Job task panicked");
                }
            }
        };

        if tokio::time::timeout(timeout, joined).await.is_err() {
            warn!(timeout_secs = timeout.as_secs(), "Background jobs did not stop in time");
        } else {
            info!("Background jobs stopped");
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job(job: Arc<dyn Job>, mut shutdown: watch::Receiver<bool>) {
    let name = job.name();
    let period = job.period();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(job = name, period_secs = period.as_secs(), "Job scheduled");

    loop {
        tokio::select! {
            _ = ticker.tick() => run_once(job.as_ref()).await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(job = name, "Job stopped");
                    break;
                }
            }
        }
    }
}

async fn run_once(job: &dyn Job) {
    let name = job.name();
    let start = Instant::now();
    let result = job.execute().await;
    let elapsed = start.elapsed();
    histogram!("background_job_duration_seconds", "job" => name).record(elapsed.as_secs_f64());

    match result {
        Ok(()) => {
            counter!("background_job_runs_total", "job" => name, "outcome" => "ok").increment(1);
            debug!(job = name, elapsed_ms = elapsed.as_millis() as u64, "Job run finished");
        }
        Err(e) => {
            counter!("background_job_runs_total", "job" => name, "outcome" => "error")
                .increment(1);
            error!(
                job = name,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "Job run failed"
            );
        }
    }
}
