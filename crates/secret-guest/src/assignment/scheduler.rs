use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::closer::{AssignmentCloser, ClosureOutcome};
use super::domain::Offer;
use super::scanner::ExpirationScanner;
use super::store::{ApplicationStore, OfferStore, ReportStore};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Tally of one scan-and-close cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub resumed: usize,
    pub scanned: usize,
    pub awarded: usize,
    pub no_applicants: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Listing offers failed; whatever was already closed stays closed.
    Aborted { report: CycleReport, reason: String },
    /// Another cycle held the worker.
    Skipped,
}

/// Single logical worker running scan-and-close cycles one at a time.
pub struct DrawWorker<O, A, R> {
    scanner: ExpirationScanner<O>,
    closer: AssignmentCloser<O, A, R>,
    busy: tokio::sync::Mutex<()>,
    cycles: AtomicU64,
}

impl<O, A, R> DrawWorker<O, A, R>
where
    O: OfferStore + 'static,
    A: ApplicationStore + 'static,
    R: ReportStore + 'static,
{
    pub fn new(scanner: ExpirationScanner<O>, closer: AssignmentCloser<O, A, R>) -> Self {
        Self {
            scanner,
            closer,
            busy: tokio::sync::Mutex::new(()),
            cycles: AtomicU64::new(0),
        }
    }

    /// Number of cycles that actually ran (skips excluded).
    pub fn completed_cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Runs one cycle unless another is in flight, in which case it returns `Skipped`.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.busy.try_lock() else {
            debug!("draw cycle already running; skipping tick");
            return CycleOutcome::Skipped;
        };

        let outcome = self.cycle().await;
        self.cycles.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    /// Waits for an in-flight cycle, if any, to release the worker.
    pub async fn wait_idle(&self) {
        let _guard = self.busy.lock().await;
    }

    async fn cycle(&self) -> CycleOutcome {
        let mut report = CycleReport::default();
        info!("draw cycle started");

        match self.scanner.get_interrupted_offers().await {
            Ok(stalled) => {
                report.resumed = stalled.len();
                self.close_all(&stalled, &mut report).await;
            }
            Err(err) => {
                error!(error = %err, "failed to list interrupted offers");
                return CycleOutcome::Aborted {
                    report,
                    reason: err.to_string(),
                };
            }
        }

        let expired = match self.scanner.get_expired_offers().await {
            Ok(expired) => expired,
            Err(err) => {
                error!(error = %err, "failed to list expired offers");
                return CycleOutcome::Aborted {
                    report,
                    reason: err.to_string(),
                };
            }
        };

        if expired.is_empty() && report.resumed == 0 {
            debug!("no expired offers");
        }
        report.scanned = expired.len();
        self.close_all(&expired, &mut report).await;

        info!(
            resumed = report.resumed,
            scanned = report.scanned,
            awarded = report.awarded,
            no_applicants = report.no_applicants,
            failed = report.failed,
            "draw cycle finished"
        );
        CycleOutcome::Completed(report)
    }

    async fn close_all(&self, offers: &[Offer], report: &mut CycleReport) {
        for offer in offers {
            match self.closer.close_offer(offer).await {
                Ok(ClosureOutcome::Awarded(_)) => report.awarded += 1,
                Ok(ClosureOutcome::NoApplicants) => report.no_applicants += 1,
                Ok(ClosureOutcome::AlreadyClosed) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(offer_id = %offer.id, error = %err, "offer closure aborted");
                }
            }
        }
    }
}

/// Scheduler lifecycle failures.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,
    #[error("scheduler is not running")]
    NotRunning,
    #[error("scheduler must be started inside a tokio runtime")]
    NoRuntime,
    #[error("scheduler task ended abnormally: {0}")]
    Join(String),
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum SchedulerState {
    Stopped,
    Running(RunningTask),
}

/// Drives a [`DrawWorker`] on a fixed interval.
///
/// The first cycle fires on start. Ticks missed while a cycle runs are
/// dropped, and cancellation is only observed between cycles.
pub struct Scheduler<O, A, R> {
    worker: Arc<DrawWorker<O, A, R>>,
    interval: Duration,
    state: Mutex<SchedulerState>,
}

impl<O, A, R> Scheduler<O, A, R>
where
    O: OfferStore + 'static,
    A: ApplicationStore + 'static,
    R: ReportStore + 'static,
{
    pub fn new(worker: Arc<DrawWorker<O, A, R>>, interval: Duration) -> Self {
        Self {
            worker,
            interval,
            state: Mutex::new(SchedulerState::Stopped),
        }
    }

    pub fn worker(&self) -> &Arc<DrawWorker<O, A, R>> {
        &self.worker
    }

    pub fn is_running(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(*state, SchedulerState::Running(_))
    }

    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SchedulerState::Running(_)) {
            return Err(SchedulerError::AlreadyRunning);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run_loop(
            Arc::clone(&self.worker),
            self.interval,
            cancel.clone(),
        ));
        *state = SchedulerState::Running(RunningTask { cancel, handle });
        info!(interval = ?self.interval, "draw scheduler started");
        Ok(())
    }

    /// Signals the loop and waits for any in-flight cycle to finish.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let task = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *state, SchedulerState::Stopped) {
                SchedulerState::Running(task) => task,
                SchedulerState::Stopped => return Err(SchedulerError::NotRunning),
            }
        };

        info!("draw scheduler stopping");
        task.cancel.cancel();
        let joined = task.handle.await;
        // Manually triggered cycles run outside the loop task.
        self.worker.wait_idle().await;
        joined.map_err(|err| SchedulerError::Join(err.to_string()))?;
        info!("draw scheduler stopped");
        Ok(())
    }

    /// Runs a cycle now, honoring the same non-overlap guard as the timer.
    pub async fn trigger(&self) -> CycleOutcome {
        self.worker.run_cycle().await
    }
}

async fn run_loop<O, A, R>(
    worker: Arc<DrawWorker<O, A, R>>,
    interval: Duration,
    cancel: CancellationToken,
) where
    O: OfferStore + 'static,
    A: ApplicationStore + 'static,
    R: ReportStore + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // A panicking cycle takes down only its own task; the loop keeps ticking.
        let cycle = tokio::spawn({
            let worker = Arc::clone(&worker);
            async move { worker.run_cycle().await }
        });
        match cycle.await {
            Ok(CycleOutcome::Skipped) => debug!("scheduled tick skipped"),
            Ok(_) => {}
            Err(err) => error!(error = %err, "draw cycle panicked"),
        }
    }
}
