//! One telemetry screen: source subscription, filtering, refresh loop and log
//! control wired together with a resume/pause lifecycle.

use std::path::PathBuf;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::PipelineConfig;
use crate::error::{TelemetryError, TelemetryResult};
use crate::graph::TelemetryView;
use crate::ingest::{Ingestor, SharedTelemetryState};
use crate::logger::{FileSink, TelemetryLogger};
use crate::scheduler::{RefreshScheduler, RefreshTask, SchedulerState, TickReport};
use crate::session::{LogControl, SessionState, StorageAuthorizer};
use crate::source::{SampleListener, SampleSource};
use crate::types::{SensorKind, TelemetrySnapshot};

pub struct TelemetryPipeline {
    config: PipelineConfig,
    source: Arc<dyn SampleSource>,
    ingestor: Arc<Ingestor>,
    control: LogControl,
    scheduler: RefreshScheduler,
    kinds: Vec<SensorKind>,
}

impl TelemetryPipeline {
    /// Build a stopped pipeline. Fails if the configuration is invalid or the
    /// source lacks one of the sensors the variant needs.
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn SampleSource>,
        view: Arc<dyn TelemetryView>,
        clock: Arc<dyn Clock>,
        authorizer: Arc<dyn StorageAuthorizer>,
    ) -> TelemetryResult<Self> {
        config.validate()?;

        let kinds = config.profile.strategy.sensor_kinds();
        if let Some(missing) = kinds.iter().find(|k| !source.has_sensor(**k)) {
            log::warn!("{:?} pipeline unavailable: no {} sensor", config.profile.variant, missing);
            return Err(TelemetryError::SensorUnavailable(*missing));
        }

        let shared = Arc::new(SharedTelemetryState::new(config.profile.strategy.channel_count()));
        let ingestor = Arc::new(Ingestor::new(&config.profile, Arc::clone(&shared))?);
        let logger = Arc::new(TelemetryLogger::new(clock));
        let sink = Arc::new(FileSink::new(config.log_path(), config.append));
        let control = LogControl::new(Arc::clone(&logger), sink, authorizer);
        let task = RefreshTask::new(shared, view, logger, config.profile.display_scale);
        let scheduler = RefreshScheduler::new(task, config.refresh_period);

        log::info!(
            "{:?} pipeline ready: {} channel(s), alpha {}, log {}",
            config.profile.variant,
            config.profile.strategy.channel_count(),
            config.profile.alpha,
            config.log_path().display()
        );

        Ok(Self {
            config,
            source,
            ingestor,
            control,
            scheduler,
            kinds,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn log_path(&self) -> PathBuf {
        self.config.log_path()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.state() == SchedulerState::Running
    }

    /// Subscribe to the sensors and start the refresh loop
    pub fn resume(&mut self) -> TelemetryResult<()> {
        if self.is_running() {
            return Err(TelemetryError::AlreadyRunning);
        }
        self.ingestor.reset_timestamp()?;

        let listener: Arc<dyn SampleListener> = self.ingestor.clone();
        for (i, kind) in self.kinds.iter().enumerate() {
            if let Err(e) = self.source.subscribe(*kind, Arc::clone(&listener)) {
                for subscribed in &self.kinds[..i] {
                    self.source.unsubscribe(*subscribed);
                }
                return Err(e);
            }
        }

        if let Err(e) = self.scheduler.start() {
            self.unsubscribe_all();
            return Err(e);
        }
        log::info!("{:?} pipeline resumed", self.config.profile.variant);
        Ok(())
    }

    /// Stop refreshing, release the sensors and close any open log session.
    /// Returns the number of refresh ticks run since the matching resume.
    pub async fn pause(&mut self) -> TelemetryResult<u64> {
        if !self.is_running() {
            return Err(TelemetryError::NotRunning);
        }
        let ticks = self.scheduler.stop().await?;
        self.unsubscribe_all();
        if let Some(lines) = self.control.stop()? {
            log::info!("log closed on pause ({} lines)", lines);
        }
        log::info!("{:?} pipeline paused", self.config.profile.variant);
        Ok(ticks)
    }

    pub fn request_log_start(&self) -> TelemetryResult<SessionState> {
        self.control.request_start()
    }

    pub fn on_authorization_result(&self, granted: bool) -> TelemetryResult<SessionState> {
        self.control.on_authorization_result(granted)
    }

    pub fn stop_logging(&self) -> TelemetryResult<Option<u64>> {
        self.control.stop()
    }

    pub fn log_state(&self) -> TelemetryResult<SessionState> {
        self.control.state()
    }

    pub fn snapshot(&self) -> TelemetryResult<Arc<TelemetrySnapshot>> {
        self.ingestor.shared().snapshot()
    }

    /// Run one refresh tick on the calling thread
    pub fn refresh_now(&self) -> TickReport {
        self.scheduler.task().tick()
    }

    fn unsubscribe_all(&self) {
        for kind in &self.kinds {
            self.source.unsubscribe(*kind);
        }
    }
}

impl Drop for TelemetryPipeline {
    fn drop(&mut self) {
        // Same order as pause: loop, then sensors, then the log
        if self.scheduler.abort() {
            self.unsubscribe_all();
        }
        if let Err(e) = self.control.stop() {
            log::warn!("failed to close telemetry log: {}", e);
        }
    }
}
