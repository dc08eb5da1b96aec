//! Periodic refresh: graph update and log append on a fixed cadence.
//!
//! The loop only ever reads published snapshots, so bursts of sensor events
//! never turn into bursts of render calls or log writes. Stopping is checked
//! between ticks; a tick that has started always runs to completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use crate::error::{TelemetryError, TelemetryResult};
use crate::graph::TelemetryView;
use crate::ingest::SharedTelemetryState;
use crate::logger::TelemetryLogger;

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub rendered: usize,
    pub render_failures: usize,
    pub logged: bool,
    pub log_failed: bool,
}

/// Body of one refresh tick, shareable with the background task
#[derive(Clone)]
pub struct RefreshTask {
    shared: Arc<SharedTelemetryState>,
    view: Arc<dyn TelemetryView>,
    logger: Arc<TelemetryLogger>,
    display_scale: f32,
    render_failure_streak: Arc<AtomicU64>,
    log_failure_streak: Arc<AtomicU64>,
}

impl RefreshTask {
    pub fn new(
        shared: Arc<SharedTelemetryState>,
        view: Arc<dyn TelemetryView>,
        logger: Arc<TelemetryLogger>,
        display_scale: f32,
    ) -> Self {
        Self {
            shared,
            view,
            logger,
            display_scale,
            render_failure_streak: Arc::new(AtomicU64::new(0)),
            log_failure_streak: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Read one snapshot, hand it to the view, and log it if a session is open
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let snapshot = match self.shared.snapshot() {
            Ok(s) => s,
            Err(e) => {
                log::error!("refresh skipped, snapshot unavailable: {}", e);
                return report;
            }
        };

        for (series, value) in snapshot.values.iter().enumerate() {
            match self.view.append(series, value * self.display_scale) {
                Ok(()) => report.rendered += 1,
                Err(e) => {
                    report.render_failures += 1;
                    note_failure(&self.render_failure_streak, "renderer", &e.to_string());
                }
            }
        }
        if let Err(e) = self
            .view
            .show_status(snapshot.sample_interval_millis, snapshot.accuracy)
        {
            report.render_failures += 1;
            note_failure(&self.render_failure_streak, "renderer", &e.to_string());
        }
        if report.render_failures == 0 {
            note_recovery(&self.render_failure_streak, "renderer");
        }

        match self.logger.append(&snapshot.values, self.logger.now_millis()) {
            Ok(written) => {
                report.logged = written;
                note_recovery(&self.log_failure_streak, "telemetry log");
            }
            Err(e) => {
                report.log_failed = true;
                note_failure(&self.log_failure_streak, "telemetry log", &e.to_string());
            }
        }

        log::trace!("tick #{}: {:?}", snapshot.sequence, report);
        report
    }

    /// Consecutive ticks whose log line could not be written
    pub fn log_failure_streak(&self) -> u64 {
        self.log_failure_streak.load(Ordering::Relaxed)
    }
}

/// Warn on the first failure of a streak only; the rest go to debug
fn note_failure(streak: &AtomicU64, what: &str, message: &str) {
    let count = streak.fetch_add(1, Ordering::Relaxed) + 1;
    if count == 1 {
        log::warn!("{} unavailable: {}", what, message);
    } else {
        log::debug!("{} still unavailable ({} failures): {}", what, count, message);
    }
}

fn note_recovery(streak: &AtomicU64, what: &str) {
    let previous = streak.swap(0, Ordering::Relaxed);
    if previous > 0 {
        log::info!("{} recovered after {} failed updates", what, previous);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<u64>,
}

/// Owns the background refresh loop (STOPPED <-> RUNNING)
pub struct RefreshScheduler {
    task: RefreshTask,
    period: Duration,
    running: Option<RunningLoop>,
}

impl RefreshScheduler {
    pub fn new(task: RefreshTask, period: Duration) -> Self {
        Self {
            task,
            period,
            running: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn task(&self) -> &RefreshTask {
        &self.task
    }

    /// Spawn the refresh loop on the current tokio runtime
    pub fn start(&mut self) -> TelemetryResult<()> {
        if self.running.is_some() {
            return Err(TelemetryError::AlreadyRunning);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TelemetryError::Internal(format!("refresh loop needs a tokio runtime: {}", e)))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(refresh_loop(self.task.clone(), self.period, stop_rx));
        self.running = Some(RunningLoop { stop_tx, handle });
        log::info!("refresh loop started ({:?} period)", self.period);
        Ok(())
    }

    /// Signal the loop and wait for it to leave; returns the number of ticks it ran
    pub async fn stop(&mut self) -> TelemetryResult<u64> {
        let running = self.running.take().ok_or(TelemetryError::NotRunning)?;
        // The receiver may already be gone if the loop exited on its own
        let _ = running.stop_tx.send(true);
        let ticks = running
            .handle
            .await
            .map_err(|e| TelemetryError::Internal(format!("refresh loop failed: {}", e)))?;
        log::info!("refresh loop stopped after {} ticks", ticks);
        Ok(ticks)
    }

    /// Stop the loop without waiting for it. Returns false if it was not running.
    pub fn abort(&mut self) -> bool {
        match self.running.take() {
            Some(running) => {
                let _ = running.stop_tx.send(true);
                running.handle.abort();
                log::debug!("refresh loop aborted");
                true
            }
            None => false,
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn refresh_loop(task: RefreshTask, period: Duration, mut stop_rx: watch::Receiver<bool>) -> u64 {
    // First refresh lands one period after start, like every later one
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }
        if *stop_rx.borrow() {
            break;
        }

        task.tick();
        ticks += 1;
    }

    ticks
}
