//! Live sensor telemetry: smoothed readings on a scrolling graph, with an
//! optional append-only text log of what was shown.

pub mod clock;
pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod logger;
pub mod orientation;
pub mod pipeline;
pub mod scheduler;
pub mod session;
pub mod smoothing;
pub mod source;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PipelineConfig, Variant, VariantProfile};
pub use error::{TelemetryError, TelemetryResult};
pub use graph::{GraphModel, RenderError, TelemetryView};
pub use logger::{FileSink, SinkProvider, TelemetryLogger};
pub use pipeline::TelemetryPipeline;
pub use session::{AlwaysGranted, Authorization, SessionState, StorageAuthorizer};
pub use source::{ManualSource, SampleListener, SampleSource, SimulatedSource};
pub use types::{AccuracyGrade, AttitudeEstimate, RawSample, SensorKind, TelemetrySnapshot};
