//! Append-only telemetry log.
//!
//! One line per refresh tick while a session is open:
//!
//! ```text
//! <seconds>.<millis>: <c0> <c1> ... <cN>
//! ```
//!
//! Elapsed time is measured from the session start; the millisecond remainder
//! is written without zero padding (`1.5` is 1005 ms). Every line is flushed
//! as soon as it is written so an interrupted session stays readable.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::error::{poisoned, TelemetryError, TelemetryResult};

/// Something a log session can be opened on
pub trait SinkProvider: Send + Sync {
    fn open(&self) -> io::Result<Box<dyn Write + Send>>;

    /// Human-readable location, for diagnostics
    fn describe(&self) -> String;
}

/// Plain file sink; truncates on open unless `append` is set
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
    append: bool,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, append: bool) -> Self {
        Self {
            path: path.into(),
            append,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SinkProvider for FileSink {
    fn open(&self) -> io::Result<Box<dyn Write + Send>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.append)
            .truncate(!self.append)
            .open(&self.path)?;
        Ok(Box::new(file))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// One open recording interval
struct LogSession {
    start_epoch_millis: i64,
    writer: BufWriter<Box<dyn Write + Send>>,
    lines: u64,
    location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { start_epoch_millis: i64 },
    AlreadyActive,
}

/// Format one log line (without the trailing newline)
pub fn format_log_line(elapsed_millis: i64, values: &[f32]) -> String {
    let elapsed = elapsed_millis.max(0);
    let components: Vec<String> = values.iter().map(|v| format_component(*v)).collect();
    format!("{}.{}: {}", elapsed / 1000, elapsed % 1000, components.join(" "))
}

/// Shortest round-trip form; plain decimal in [1e-3, 1e7), otherwise
/// `<mantissa>E<exponent>` with at least one fractional digit (`5.0E-4`).
pub fn format_component(value: f32) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let magnitude = value.abs();
    if value == 0.0 || (1e-3..1e7).contains(&magnitude) {
        return format!("{:?}", value);
    }

    let scientific = format!("{:e}", value);
    match scientific.split_once('e') {
        Some((mantissa, exponent)) if mantissa.contains('.') => format!("{}E{}", mantissa, exponent),
        Some((mantissa, exponent)) => format!("{}.0E{}", mantissa, exponent),
        None => scientific,
    }
}

/// Writes telemetry lines while a session is open; silently idle otherwise
pub struct TelemetryLogger {
    session: Mutex<Option<LogSession>>,
    clock: Arc<dyn Clock>,
}

impl TelemetryLogger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            session: Mutex::new(None),
            clock,
        }
    }

    /// Open a session on `sink`. A second start while one is open does nothing.
    pub fn start(&self, sink: &dyn SinkProvider) -> TelemetryResult<StartOutcome> {
        let mut session = self.session.lock().map_err(poisoned("log session"))?;
        if session.is_some() {
            log::debug!("log session already open, ignoring start");
            return Ok(StartOutcome::AlreadyActive);
        }

        let handle = sink.open().map_err(|e| {
            log::warn!("cannot open telemetry log {}: {}", sink.describe(), e);
            TelemetryError::IoFailure(format!("{}: {}", sink.describe(), e))
        })?;

        let start_epoch_millis = self.clock.now_millis();
        *session = Some(LogSession {
            start_epoch_millis,
            writer: BufWriter::new(handle),
            lines: 0,
            location: sink.describe(),
        });
        log::info!("telemetry log opened at {}", sink.describe());
        Ok(StartOutcome::Started { start_epoch_millis })
    }

    /// Append one line stamped relative to the session start.
    ///
    /// Returns `Ok(false)` when no session is open. A failed write keeps the
    /// session open so the next tick can try again.
    pub fn append(&self, values: &[f32], now_millis: i64) -> TelemetryResult<bool> {
        let mut guard = self.session.lock().map_err(poisoned("log session"))?;
        let session = match guard.as_mut() {
            Some(s) => s,
            None => return Ok(false),
        };

        let line = format_log_line(now_millis - session.start_epoch_millis, values);
        writeln!(session.writer, "{}", line)?;
        session.writer.flush()?;
        session.lines += 1;
        Ok(true)
    }

    /// Flush and close the open session, returning how many lines it holds
    pub fn stop(&self) -> TelemetryResult<Option<u64>> {
        let taken = self.session.lock().map_err(poisoned("log session"))?.take();
        let mut session = match taken {
            Some(s) => s,
            None => return Ok(None),
        };

        let lines = session.lines;
        let flushed = session.writer.flush();
        drop(session.writer);
        log::info!("telemetry log {} closed after {} lines", session.location, lines);
        flushed?;
        Ok(Some(lines))
    }

    pub fn is_active(&self) -> bool {
        self.session.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn start_epoch_millis(&self) -> Option<i64> {
        self.session
            .lock()
            .ok()?
            .as_ref()
            .map(|s| s.start_epoch_millis)
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}
