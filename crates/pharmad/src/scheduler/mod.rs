//! Job scheduler and worker pool.
//!
//! One bounded queue feeds a small pool of workers; the periodic
//! enqueuers (expiration scan ticker, daily purge timer) and on-demand
//! callers all push into the same queue, so a forced run is exactly an
//! early scheduled run. Jobs are idempotent and fault handling is
//! at-most-once: work still queued at shutdown is dropped, and the next
//! periodic run picks up whatever state is left.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveTime};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pharma_store::Store;

use crate::bus::NotificationBus;
use crate::config::SchedulerConfig;

mod jobs;
mod retry;

pub use jobs::Job;
pub use retry::{RetryPolicy, TaskOutcome};

use jobs::JobContext;

/// Queue depth before enqueueing reports back pressure.
const JOB_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 100;

/// Errors from enqueueing work.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// The queue is at capacity right now.
    #[error("job queue full")]
    QueueFull,

    /// The scheduler stopped; only seen during daemon shutdown.
    #[error("scheduler channel closed")]
    ChannelClosed,
}

/// Events broadcast by the worker pool, mainly for observability and tests.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A job ran to completion.
    TaskCompleted { job: &'static str },

    /// A job gave up: retry budget spent, or the fault was not retryable.
    TaskFailure { job: &'static str, error: String },
}

/// Handle to the scheduler. Cloning is cheap.
#[derive(Clone)]
pub struct SchedulerHandle {
    job_tx: mpsc::Sender<Job>,
    event_tx: broadcast::Sender<SchedulerEvent>,
}

impl SchedulerHandle {
    /// Queues a job without waiting. Full-queue backpressure surfaces as
    /// [`SchedulerError::QueueFull`] and the caller decides what to drop.
    pub fn enqueue(&self, job: Job) -> Result<(), SchedulerError> {
        self.job_tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SchedulerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SchedulerError::ChannelClosed,
        })
    }

    /// Subscribes to job outcome events.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }
}

/// Spawns the worker pool and both periodic enqueuers.
///
/// Everything winds down through `cancel`: the tickers stop enqueueing,
/// workers finish the job in hand and exit.
pub fn spawn_scheduler(
    store: Arc<dyn Store>,
    bus: NotificationBus,
    config: &SchedulerConfig,
    cancel: CancellationToken,
) -> SchedulerHandle {
    let (job_tx, job_rx) = mpsc::channel(JOB_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let context = Arc::new(JobContext {
        store,
        bus,
        retention_days: config.retention_days,
    });
    // Workers share one receiver; whoever grabs the lock takes the job.
    let receiver = Arc::new(Mutex::new(job_rx));
    let policy = RetryPolicy::default();

    for worker in 0..config.workers {
        spawn_worker(
            worker,
            Arc::clone(&receiver),
            Arc::clone(&context),
            policy,
            event_tx.clone(),
            cancel.clone(),
        );
    }

    spawn_scan_ticker(job_tx.clone(), config.scan_interval_secs, cancel.clone());
    spawn_purge_timer(job_tx.clone(), config.purge_hour, cancel);

    info!(
        workers = config.workers,
        scan_interval_secs = config.scan_interval_secs,
        purge_hour = config.purge_hour,
        "scheduler started"
    );

    SchedulerHandle { job_tx, event_tx }
}

fn spawn_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    context: Arc<JobContext>,
    policy: RetryPolicy,
    events: broadcast::Sender<SchedulerEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(worker, "job worker started");
        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = async { receiver.lock().await.recv().await } => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let nombre = job.nombre();
            debug!(worker, job = nombre, "job started");
            match policy.run(nombre, || context.execute(&job)).await {
                TaskOutcome::Succeeded => {
                    let _ = events.send(SchedulerEvent::TaskCompleted { job: nombre });
                }
                TaskOutcome::Exhausted(e) => {
                    error!(worker, job = nombre, error = %e, "job gave up");
                    let _ = events.send(SchedulerEvent::TaskFailure {
                        job: nombre,
                        error: e.to_string(),
                    });
                }
            }
        }
        debug!(worker, "job worker stopped");
    })
}

/// Enqueues an expiration scan every `interval_secs`. The first tick
/// fires immediately, so the daemon scans once right after startup.
fn spawn_scan_ticker(
    job_tx: mpsc::Sender<Job>,
    interval_secs: u64,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(std::time::Duration::from_secs(interval_secs));
        info!(interval_secs, "expiration scan ticker started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match job_tx.try_send(Job::ExpirationScan) {
                        Ok(()) => {}
                        // The next tick covers a skipped scan.
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!("job queue full; expiration scan skipped this tick");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
            }
        }
        info!("expiration scan ticker stopped");
    })
}

/// Enqueues the notification purge once a day at `purge_hour` local time.
fn spawn_purge_timer(
    job_tx: mpsc::Sender<Job>,
    purge_hour: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(purge_hour, "purge timer started");
        loop {
            let espera = match proxima_purga(Local::now(), purge_hour) {
                Some(momento) => {
                    debug!(proxima = %momento, "next purge scheduled");
                    (momento - Local::now())
                        .to_std()
                        .unwrap_or(std::time::Duration::ZERO)
                }
                // DST gap ate the target hour; look again in a day.
                None => std::time::Duration::from_secs(24 * 60 * 60),
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(espera) => {}
            }
            if cancel.is_cancelled() {
                break;
            }
            if job_tx.send(Job::PurgeNotificaciones).await.is_err() {
                break;
            }
        }
        info!("purge timer stopped");
    })
}

/// Next wall-clock occurrence of `hora`:00 strictly after `desde`.
fn proxima_purga(desde: DateTime<Local>, hora: u32) -> Option<DateTime<Local>> {
    let objetivo = NaiveTime::from_hms_opt(hora, 0, 0)?;
    let mut dia = desde.date_naive();
    // Today if the hour is still ahead, otherwise tomorrow. Either day
    // may lose the hour to a DST gap.
    for _ in 0..2 {
        if let Some(candidato) = dia.and_time(objetivo).and_local_timezone(Local).earliest() {
            if candidato > desde {
                return Some(candidato);
            }
        }
        dia = dia.succ_opt()?;
    }
    None
}
