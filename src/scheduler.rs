//! Triggers sort runs off the calling thread, once or on a fixed period.
//!
//! Every run executes on Tokio's blocking pool, so the caller never waits on
//! filesystem I/O. A one-shot run hands back a [`RunTicket`] that can be
//! awaited or polled. A periodic schedule is owned by the [`Scheduler`], which
//! is either idle or running exactly one schedule; starting while running and
//! stopping while idle are reported, not treated as errors.
//!
//! All methods that spawn work must be called from within a Tokio runtime.

use crate::config::{ConfigError, validate_request};
use crate::sorter::{RunStats, SortEngine, SortError, SortRequest, SortRunResult};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Log sink shared between the caller and worker threads.
pub type SharedLogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A sink that discards every line.
pub fn silent_sink() -> SharedLogSink {
    Arc::new(|_: &str| {})
}

/// Time between two firings of a periodic schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalPeriod(Duration);

impl IntervalPeriod {
    /// Validates a period given in whole minutes.
    pub fn from_minutes(minutes: i64) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidPeriod(minutes.to_string());
        if minutes <= 0 {
            return Err(invalid());
        }
        let secs = u64::try_from(minutes)
            .ok()
            .and_then(|m| m.checked_mul(60))
            .ok_or_else(invalid)?;
        Ok(Self(Duration::from_secs(secs)))
    }

    /// Accepts any non-zero duration, for periods shorter than a minute.
    pub fn from_duration(duration: Duration) -> Result<Self, ConfigError> {
        if duration.is_zero() {
            return Err(ConfigError::InvalidPeriod(format!("{:?}", duration)));
        }
        Ok(Self(duration))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for IntervalPeriod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let minutes: i64 = s
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPeriod(s.trim().to_string()))?;
        Self::from_minutes(minutes)
    }
}

impl fmt::Display for IntervalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        if secs >= 60 && secs % 60 == 0 && self.0.subsec_nanos() == 0 {
            let minutes = secs / 60;
            write!(f, "{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub result: SortRunResult,
    pub stats: RunStats,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

/// Why a run produced no report.
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error(transparent)]
    Sort(#[from] SortError),
    /// The worker panicked or was torn down before finishing.
    #[error("Sort worker failed: {0}")]
    Worker(String),
}

/// Handle to a one-shot run in flight.
#[derive(Debug)]
pub struct RunTicket {
    rx: oneshot::Receiver<Result<RunReport, RunFailure>>,
}

impl RunTicket {
    /// Waits for the run to finish.
    pub async fn wait(self) -> Result<RunReport, RunFailure> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(RunFailure::Worker("run was dropped".to_string())))
    }

    /// Returns the outcome if the run has finished, without waiting.
    pub fn try_result(&mut self) -> Option<Result<RunReport, RunFailure>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(RunFailure::Worker("run was dropped".to_string())))
            }
        }
    }
}

/// What happened in one firing of a periodic schedule.
#[derive(Debug)]
pub enum Notification {
    Completed(RunReport),
    Failed(String),
    /// The firing didn't run, e.g. because a path was empty.
    Skipped(String),
}

/// Supplies the request for each firing, so path or category edits made
/// between firings are picked up.
pub trait RequestProvider: Send + Sync + 'static {
    fn current(&self) -> SortRequest;
}

impl<F> RequestProvider for F
where
    F: Fn() -> SortRequest + Send + Sync + 'static,
{
    fn current(&self) -> SortRequest {
        self()
    }
}

impl RequestProvider for watch::Receiver<SortRequest> {
    fn current(&self) -> SortRequest {
        self.borrow().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStatus {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    Stopped,
    NotRunning,
}

/// An active periodic schedule. Dropping it cancels future firings.
#[derive(Debug)]
pub struct ScheduleHandle {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
    period: IntervalPeriod,
}

impl ScheduleHandle {
    pub fn period(&self) -> IntervalPeriod {
        self.period
    }
}

#[derive(Debug, Default)]
enum ScheduleState {
    #[default]
    Idle,
    Running(ScheduleHandle),
}

/// Starts one-shot runs and owns at most one periodic schedule.
pub struct Scheduler {
    state: ScheduleState,
    sink: SharedLogSink,
    notifications: Option<mpsc::UnboundedSender<Notification>>,
}

impl Scheduler {
    pub fn new(sink: SharedLogSink) -> Self {
        Self {
            state: ScheduleState::Idle,
            sink,
            notifications: None,
        }
    }

    /// Sends the outcome of every periodic firing to `tx`.
    pub fn with_notifications(mut self, tx: mpsc::UnboundedSender<Notification>) -> Self {
        self.notifications = Some(tx);
        self
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ScheduleState::Running(_))
    }

    /// Period of the active schedule, if any.
    pub fn period(&self) -> Option<IntervalPeriod> {
        match &self.state {
            ScheduleState::Running(handle) => Some(handle.period()),
            ScheduleState::Idle => None,
        }
    }

    /// Starts a single run in the background.
    ///
    /// # Errors
    ///
    /// Rejects a request with an empty source or target path before anything
    /// is spawned.
    pub fn run_once(&self, request: SortRequest) -> Result<RunTicket, ConfigError> {
        validate_request(&request)?;

        let (tx, rx) = oneshot::channel();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let outcome = execute(request, sink).await;
            // The ticket may have been dropped; nobody to tell then.
            let _ = tx.send(outcome);
        });

        Ok(RunTicket { rx })
    }

    /// Validates `minutes` and starts a periodic schedule.
    pub fn start_interval_minutes<P: RequestProvider>(
        &mut self,
        provider: P,
        minutes: i64,
    ) -> Result<StartStatus, ConfigError> {
        if self.is_running() {
            return Ok(StartStatus::AlreadyRunning);
        }
        let period = IntervalPeriod::from_minutes(minutes)?;
        Ok(self.start_interval(provider, period))
    }

    /// Starts firing every `period`, the first firing right away.
    ///
    /// A firing finishes before the next one is considered. This is not strict
    /// fixed-rate scheduling: when a firing overruns its period, the missed
    /// ticks are not caught up in a burst; the next firing starts once the
    /// late one is done and the schedule continues a full period after that.
    pub fn start_interval<P: RequestProvider>(
        &mut self,
        provider: P,
        period: IntervalPeriod,
    ) -> StartStatus {
        if self.is_running() {
            info!("auto-sort already running");
            return StartStatus::AlreadyRunning;
        }

        let provider = Arc::new(provider);
        let (cancel, mut cancelled) = oneshot::channel::<()>();
        let sink = self.sink.clone();
        let notifications = self.notifications.clone();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(period.as_duration());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancelled => break,
                    _ = ticker.tick() => {}
                }

                let notification = fire(&provider, &sink).await;
                if let Some(tx) = &notifications {
                    let _ = tx.send(notification);
                }
            }
            debug!("auto-sort loop exited");
        });

        info!(period = %period, "auto-sort started");
        self.state = ScheduleState::Running(ScheduleHandle {
            cancel,
            task,
            period,
        });
        StartStatus::Started
    }

    /// Cancels the schedule. A firing already in progress still completes.
    pub fn stop(&mut self) -> StopStatus {
        match std::mem::take(&mut self.state) {
            ScheduleState::Running(handle) => {
                let _ = handle.cancel.send(());
                info!("auto-sort stopped");
                StopStatus::Stopped
            }
            ScheduleState::Idle => StopStatus::NotRunning,
        }
    }

    /// Cancels the schedule and waits for an in-flight firing to finish.
    pub async fn shutdown(&mut self) -> StopStatus {
        match std::mem::take(&mut self.state) {
            ScheduleState::Running(handle) => {
                let _ = handle.cancel.send(());
                if let Err(e) = handle.task.await {
                    warn!(error = %e, "auto-sort task ended abnormally");
                }
                info!("auto-sort stopped");
                StopStatus::Stopped
            }
            ScheduleState::Idle => StopStatus::NotRunning,
        }
    }
}

/// Runs the engine on the blocking pool and converts every failure,
/// panics included, into a [`RunFailure`].
async fn execute(request: SortRequest, sink: SharedLogSink) -> Result<RunReport, RunFailure> {
    let started_at = Local::now();
    let worker = task::spawn_blocking(move || {
        let mut engine = SortEngine::new();
        let mut lines = |line: &str| sink(line);
        let result = engine.run(&request, &mut lines)?;
        Ok::<_, SortError>((result, engine.into_stats()))
    });

    match worker.await {
        Ok(Ok((result, stats))) => Ok(RunReport {
            result,
            stats,
            started_at,
            finished_at: Local::now(),
        }),
        Ok(Err(e)) => Err(RunFailure::Sort(e)),
        Err(e) => Err(RunFailure::Worker(e.to_string())),
    }
}

/// One firing: snapshot the request, skip it if incomplete, run it, and
/// keep every failure inside the firing.
///
/// Providers may block (reading a settings file, taking a lock), so the
/// snapshot is taken on the blocking pool too.
async fn fire<P: RequestProvider>(provider: &Arc<P>, sink: &SharedLogSink) -> Notification {
    let snapshot = {
        let provider = Arc::clone(provider);
        task::spawn_blocking(move || provider.current()).await
    };
    let request = match snapshot {
        Ok(request) => request,
        Err(e) => {
            let message = format!("Auto-sort run failed: could not read settings: {}", e);
            error!("{}", message);
            sink(&message);
            return Notification::Failed(message);
        }
    };
    if let Err(e) = validate_request(&request) {
        let message = format!("Auto-sort skipped: {}", e);
        warn!("{}", message);
        sink(&message);
        return Notification::Skipped(message);
    }

    match execute(request, sink.clone()).await {
        Ok(report) => {
            sink(&format!(
                "Auto-sort run completed. Moved {} of {}",
                report.result.moved_files, report.result.total_files
            ));
            Notification::Completed(report)
        }
        Err(e) => {
            let message = format!("Auto-sort run failed: {}", e);
            error!("{}", message);
            sink(&message);
            Notification::Failed(message)
        }
    }
}
