use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::error::{poisoned, TelemetryError, TelemetryResult};
use crate::logger::{SinkProvider, TelemetryLogger};

/// Answer of the storage permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    /// The platform asked the operator; the answer arrives via `on_authorization_result`
    Pending,
    Denied,
}

/// Decides whether the telemetry log may be written
pub trait StorageAuthorizer: Send + Sync {
    fn authorize(&self) -> Authorization;
}

impl<F> StorageAuthorizer for F
where
    F: Fn() -> Authorization + Send + Sync,
{
    fn authorize(&self) -> Authorization {
        self()
    }
}

/// Authorizer for platforms without a permission step
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysGranted;

impl StorageAuthorizer for AlwaysGranted {
    fn authorize(&self) -> Authorization {
        Authorization::Granted
    }
}

/// Log session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No log open, nothing requested
    Idle,
    /// Start requested, waiting for the permission answer
    AwaitingPermission,
    /// Log open and receiving lines
    Recording,
}

/// Operator-facing start/stop control for the telemetry log.
///
/// Every start request opens the sink at most once, whether authorization
/// is granted immediately or arrives later through the permission callback.
pub struct LogControl {
    state: Mutex<SessionState>,
    logger: Arc<TelemetryLogger>,
    sink: Arc<dyn SinkProvider>,
    authorizer: Arc<dyn StorageAuthorizer>,
}

impl LogControl {
    pub fn new(
        logger: Arc<TelemetryLogger>,
        sink: Arc<dyn SinkProvider>,
        authorizer: Arc<dyn StorageAuthorizer>,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            logger,
            sink,
            authorizer,
        }
    }

    /// Operator pressed "start"
    pub fn request_start(&self) -> TelemetryResult<SessionState> {
        let mut state = self.state.lock().map_err(poisoned("log control state"))?;

        match *state {
            SessionState::Recording => self.open(&mut state),
            SessionState::AwaitingPermission => {
                log::debug!("start requested while permission is pending");
                Ok(SessionState::AwaitingPermission)
            }
            SessionState::Idle => match self.authorizer.authorize() {
                Authorization::Granted => self.open(&mut state),
                Authorization::Pending => {
                    log::info!("waiting for storage permission before opening {}", self.sink.describe());
                    *state = SessionState::AwaitingPermission;
                    Ok(SessionState::AwaitingPermission)
                }
                Authorization::Denied => {
                    log::warn!("storage permission denied, telemetry log not started");
                    Err(TelemetryError::PermissionDenied)
                }
            },
        }
    }

    /// Permission flow finished. Ignored unless a start request is pending.
    pub fn on_authorization_result(&self, granted: bool) -> TelemetryResult<SessionState> {
        let mut state = self.state.lock().map_err(poisoned("log control state"))?;

        if *state != SessionState::AwaitingPermission {
            log::debug!("authorization result ({}) with no pending start, ignored", granted);
            return Ok(*state);
        }

        if granted {
            self.open(&mut state)
        } else {
            log::warn!("storage permission refused, telemetry log not started");
            *state = SessionState::Idle;
            Err(TelemetryError::PermissionDenied)
        }
    }

    /// Operator pressed "stop" (or the pipeline is going away)
    pub fn stop(&self) -> TelemetryResult<Option<u64>> {
        let mut state = self.state.lock().map_err(poisoned("log control state"))?;
        *state = SessionState::Idle;
        self.logger.stop()
    }

    pub fn state(&self) -> TelemetryResult<SessionState> {
        let state = self.state.lock().map_err(poisoned("log control state"))?;
        Ok(*state)
    }

    pub fn is_recording(&self) -> bool {
        self.logger.is_active()
    }

    fn open(&self, state: &mut SessionState) -> TelemetryResult<SessionState> {
        match self.logger.start(self.sink.as_ref()) {
            Ok(_) => {
                *state = SessionState::Recording;
                Ok(SessionState::Recording)
            }
            Err(e) => {
                *state = SessionState::Idle;
                Err(e)
            }
        }
    }
}
