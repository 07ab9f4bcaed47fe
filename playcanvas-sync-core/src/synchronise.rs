//! High-level pipeline: export → download → install → scripts → push.
//!
//! [`SyncOrchestrator`] owns at most one active run. A run is started with
//! [`SyncOrchestrator::start_sync`] and observed through the returned
//! [`SyncHandle`]: a stream of [`SyncEvent`]s, a cancellation token scoped to
//! that run, and a single completion future yielding the [`SyncReport`].
//!
//! # States
//! `Idle → Validating → ExportStarting → ExportPolling → Downloading →
//! Installing → FetchingScripts → Pushing → Finished`, with an early exit to
//! `Finished` from any state on failure or cancellation.
//!
//! # Error Handling
//! No step is retried. Every error raised inside a phase is caught here,
//! logged as one line and turned into [`SyncOutcome::Failed`], except
//! cancellation which ends the run as [`SyncOutcome::Cancelled`].
//!
//! # Cancellation
//! Observed at phase boundaries, at the top of each poll iteration, during
//! the poll delay and before each script asset. Never inside an in-flight
//! request or file write. Partial side effects are not rolled back.

use chrono::Local;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::archive::install_archive;
use crate::assets::download_script_assets;
use crate::config::SyncSettings;
use crate::context::PushContext;
use crate::contract::{AssetApi, ExportApi, JobStatus, Pusher};
use crate::error::{SyncError, SyncResult};
use crate::log::{LogEntry, LogLevel, RunLog, TIMESTAMP_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Validating,
    ExportStarting,
    ExportPolling,
    Downloading,
    Installing,
    FetchingScripts,
    Pushing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    Cancelled,
    Failed(String),
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Success => f.write_str("success"),
            SyncOutcome::Cancelled => f.write_str("cancelled"),
            SyncOutcome::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    State(SyncState),
    Log(LogEntry),
    Finished(SyncOutcome),
}

/// What a finished run did.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub outcome: SyncOutcome,
    pub log: Vec<LogEntry>,
    pub job_id: Option<u64>,
    pub polls: u32,
    pub scripts: usize,
}

/// Caller's side of one run.
pub struct SyncHandle {
    run_id: Uuid,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    cancel: CancellationToken,
    completion: JoinHandle<SyncReport>,
}

impl SyncHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Requests cancellation. Irreversible; in-flight calls still complete.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the run has finished and the stream is drained.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.events.recv().await
    }

    /// Resolves exactly once, when the run reaches `Finished`.
    pub async fn finished(self) -> SyncReport {
        match self.completion.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, run_id = %self.run_id, "Sync task did not complete");
                SyncReport {
                    run_id: self.run_id,
                    outcome: SyncOutcome::Failed(format!("sync task aborted: {e}")),
                    log: Vec::new(),
                    job_id: None,
                    polls: 0,
                    scripts: 0,
                }
            }
        }
    }
}

type ActiveSlot = Arc<Mutex<Option<(Uuid, CancellationToken)>>>;

fn lock_slot(slot: &ActiveSlot) -> MutexGuard<'_, Option<(Uuid, CancellationToken)>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Frees the orchestrator for the next run and invalidates this run's token.
struct ActiveRunGuard {
    slot: ActiveSlot,
    run_id: Uuid,
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        let mut slot = lock_slot(&self.slot);
        if let Some((id, token)) = slot.as_ref() {
            if *id == self.run_id {
                token.cancel();
                *slot = None;
            }
        }
    }
}

pub struct SyncOrchestrator<E, A, P> {
    export: Arc<E>,
    assets: Arc<A>,
    pusher: Arc<P>,
    settings: Arc<SyncSettings>,
    active: ActiveSlot,
}

impl<E, A, P> Clone for SyncOrchestrator<E, A, P> {
    fn clone(&self) -> Self {
        Self {
            export: Arc::clone(&self.export),
            assets: Arc::clone(&self.assets),
            pusher: Arc::clone(&self.pusher),
            settings: Arc::clone(&self.settings),
            active: Arc::clone(&self.active),
        }
    }
}

impl<E, A, P> SyncOrchestrator<E, A, P>
where
    E: ExportApi + 'static,
    A: AssetApi + 'static,
    P: Pusher + 'static,
{
    pub fn new(export: Arc<E>, assets: Arc<A>, pusher: Arc<P>, settings: SyncSettings) -> Self {
        Self {
            export,
            assets,
            pusher,
            settings: Arc::new(settings),
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        lock_slot(&self.active).is_some()
    }

    /// Cancels the active run, if any. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        match lock_slot(&self.active).as_ref() {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Starts a run on the current tokio runtime.
    ///
    /// Fails with [`SyncError::AlreadyRunning`] while another run is active.
    pub fn start_sync(&self, context: PushContext) -> SyncResult<SyncHandle> {
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        {
            let mut slot = lock_slot(&self.active);
            if let Some((active_id, _)) = slot.as_ref() {
                warn!(active_run = %active_id, "Rejected sync request while a run is active");
                return Err(SyncError::AlreadyRunning);
            }
            *slot = Some((run_id, cancel.clone()));
        }

        let guard = ActiveRunGuard {
            slot: Arc::clone(&self.active),
            run_id,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let run = SyncRun {
            id: run_id,
            cancel: cancel.clone(),
            guard: Some(guard),
            log: RunLog::new(),
            events: tx,
            job_id: None,
            polls: 0,
            scripts: 0,
        };
        let pipeline = self.clone();
        let span = info_span!("sync_run", run_id = %run_id, project_id = %context.project_id);
        let completion =
            tokio::spawn(async move { pipeline.run(context, run).await }.instrument(span));

        Ok(SyncHandle {
            run_id,
            events: rx,
            cancel,
            completion,
        })
    }

    async fn run(&self, context: PushContext, mut run: SyncRun) -> SyncReport {
        info!("[SYNC] Starting sync run");
        let result = self.execute(&context, &mut run).await;

        let outcome = match result {
            Ok(()) => SyncOutcome::Success,
            Err(SyncError::Cancelled) => SyncOutcome::Cancelled,
            Err(e) => SyncOutcome::Failed(e.to_string()),
        };
        self.finish(&context, &mut run, &outcome).await;

        SyncReport {
            run_id: run.id,
            outcome,
            log: run.log.entries().to_vec(),
            job_id: run.job_id,
            polls: run.polls,
            scripts: run.scripts,
        }
    }

    async fn execute(&self, context: &PushContext, run: &mut SyncRun) -> SyncResult<()> {
        run.enter(SyncState::Validating);
        if let Err(e) = context.validate() {
            if let SyncError::Validation(report) = &e {
                run.log(LogLevel::Error, report.clone());
            }
            // Observers get a moment to render the validation message.
            tokio::time::sleep(self.settings.validation_grace()).await;
            return Err(e);
        }
        let layout = context.layout(&self.settings);

        run.enter(SyncState::ExportStarting);
        run.check_cancelled()?;
        run.log(LogLevel::Info, "Starting export job...");
        let job_id = self.export.start_export_job(context).await?;
        run.job_id = Some(job_id);

        run.enter(SyncState::ExportPolling);
        run.log(LogLevel::Info, "Waiting for export to complete...");
        let download_url = self.poll_until_complete(job_id, context, run).await?;

        run.enter(SyncState::Downloading);
        run.check_cancelled()?;
        run.log(LogLevel::Info, "Downloading exported app...");
        let zip_path = self.export.download_artifact(&download_url).await?;

        run.enter(SyncState::Installing);
        run.check_cancelled()?;
        run.log(LogLevel::Info, "Extracting app...");
        let output_dir = layout.output_dir.clone();
        let files = install_blocking(zip_path, output_dir.clone()).await?;
        run.log(
            LogLevel::Success,
            format!(
                "App successfully exported to '{}' ({files} files)!",
                output_dir.display()
            ),
        );

        run.enter(SyncState::FetchingScripts);
        run.check_cancelled()?;
        run.log(LogLevel::Info, "Downloading scripts...");
        let scripts =
            download_script_assets(&*self.assets, context, &layout.scripts_dir, &run.cancel)
                .await?;
        run.scripts = scripts;
        run.log(
            LogLevel::Success,
            format!(
                "{scripts} scripts downloaded to '{}'",
                layout.scripts_dir.display()
            ),
        );

        run.enter(SyncState::Pushing);
        run.check_cancelled()?;
        run.log(
            LogLevel::Info,
            format!(
                "Pushing local repo at {} to {}...",
                layout.project_dir.display(),
                context.remote_url
            ),
        );
        self.pusher
            .push(&layout.project_dir)
            .await
            .map_err(SyncError::PushFailed)?;
        run.log(LogLevel::Success, "Project successfully pushed!");

        Ok(())
    }

    /// Polls until the job completes or fails. Unbounded: a job that never
    /// finishes is polled until the run is cancelled.
    async fn poll_until_complete(
        &self,
        job_id: u64,
        context: &PushContext,
        run: &mut SyncRun,
    ) -> SyncResult<String> {
        let interval = self.settings.poll_interval();
        loop {
            run.check_cancelled()?;
            let snapshot = self.export.poll_job_status(job_id, context).await?;
            run.polls += 1;
            debug!(job_id, poll = run.polls, status = ?snapshot.status, "Export job status");

            match (snapshot.status, snapshot.download_url) {
                (JobStatus::Complete, Some(url)) => return Ok(url),
                (JobStatus::Error, _) => return Err(SyncError::ExportJobFailed),
                _ => {}
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = run.cancel.cancelled() => return Err(SyncError::Cancelled),
            }
        }
    }

    async fn finish(&self, context: &PushContext, run: &mut SyncRun, outcome: &SyncOutcome) {
        run.enter(SyncState::Finished);
        let now = Local::now();
        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        match outcome {
            SyncOutcome::Success => {
                run.log(LogLevel::Success, format!("Sync finished at {stamp}: success"));
            }
            SyncOutcome::Cancelled => {
                run.log(LogLevel::Cancelled, "Job cancelled.");
                run.log(LogLevel::Cancelled, format!("Sync finished at {stamp}: cancelled"));
            }
            SyncOutcome::Failed(reason) => {
                run.log(LogLevel::Error, format!("An error occurred: {reason}"));
                run.log(LogLevel::Error, format!("Sync finished at {stamp}: {outcome}"));
            }
        }

        let layout = context.layout(&self.settings);
        if layout.project_dir.is_dir() {
            run.notify(LogLevel::Info, "Saving log...");
            match run.log.persist(&layout.log_file, now).await {
                Ok(()) => run.notify(LogLevel::Success, "Saved log successfully"),
                Err(e) => run.notify(LogLevel::Warning, format!("Failed to save log: {e}")),
            }
        } else {
            debug!(dir = %layout.project_dir.display(), "No project directory, log not persisted");
        }

        // Observers may start the next run as soon as they see `Finished`.
        run.release();
        let _ = run.events.send(SyncEvent::Finished(outcome.clone()));
    }
}

async fn install_blocking(zip_path: PathBuf, output_dir: PathBuf) -> SyncResult<usize> {
    tokio::task::spawn_blocking(move || install_archive(&zip_path, &output_dir))
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e.to_string())))?
}

/// State of one run, passed explicitly through every phase.
struct SyncRun {
    id: Uuid,
    cancel: CancellationToken,
    /// Dropped at the latest when the run's task ends, even on panic.
    guard: Option<ActiveRunGuard>,
    log: RunLog,
    events: mpsc::UnboundedSender<SyncEvent>,
    job_id: Option<u64>,
    polls: u32,
    scripts: usize,
}

impl SyncRun {
    fn enter(&mut self, state: SyncState) {
        debug!(?state, "[SYNC] State transition");
        let _ = self.events.send(SyncEvent::State(state));
    }

    /// Appends to the run log and publishes the line.
    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = self.log.push(level, message).clone();
        trace_entry(&entry);
        let _ = self.events.send(SyncEvent::Log(entry));
    }

    /// Publishes a line without recording it in the run log.
    fn notify(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            level,
            message: message.into(),
        };
        trace_entry(&entry);
        let _ = self.events.send(SyncEvent::Log(entry));
    }

    /// Frees the orchestrator's active slot and invalidates this run's token.
    fn release(&mut self) {
        self.guard.take();
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn trace_entry(entry: &LogEntry) {
    match entry.level {
        LogLevel::Error => error!(level = %entry.level, "{}", entry.message),
        LogLevel::Warning => warn!(level = %entry.level, "{}", entry.message),
        _ => info!(level = %entry.level, "{}", entry.message),
    }
}
