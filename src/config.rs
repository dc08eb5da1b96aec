use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{TelemetryError, TelemetryResult};
use crate::orientation::Axis;
use crate::types::{AttitudeEstimate, SensorKind};

// ===== Variants =====

/// Which sensor(s) feed the pipeline and how readings become displayed values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum Variant {
    /// Raw magnetic field, three axes
    Magnetic,
    /// Attitude fused from accelerometer and magnetic field
    Orientation,
    /// Single-channel proximity distance
    Proximity,
}

/// Attitude angle feeding one displayed channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttitudeAxis {
    Yaw,
    Pitch,
    Roll,
}

impl AttitudeAxis {
    pub fn pick(self, attitude: &AttitudeEstimate) -> f32 {
        match self {
            AttitudeAxis::Yaw => attitude.yaw,
            AttitudeAxis::Pitch => attitude.pitch,
            AttitudeAxis::Roll => attitude.roll,
        }
    }
}

/// How raw samples are turned into channel values
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Smooth the sample's own channels directly
    Raw { kind: SensorKind },
    /// Estimate attitude from accel + magnetic, then smooth the permuted angles
    FusedOrientation {
        channels: [AttitudeAxis; 3],
        remap: (Axis, Axis),
    },
}

impl Strategy {
    pub fn sensor_kinds(&self) -> Vec<SensorKind> {
        match self {
            Strategy::Raw { kind } => vec![*kind],
            Strategy::FusedOrientation { .. } => vec![SensorKind::Accel, SensorKind::Magnetic],
        }
    }

    pub fn channel_count(&self) -> usize {
        match self {
            Strategy::Raw { kind } => kind.channel_count(),
            Strategy::FusedOrientation { channels, .. } => channels.len(),
        }
    }
}

/// Fixed per-variant parameters
#[derive(Debug, Clone, PartialEq)]
pub struct VariantProfile {
    pub variant: Variant,
    pub strategy: Strategy,
    pub alpha: f32,
    /// Multiplier applied to filtered values before they reach the graph
    pub display_scale: f32,
    /// File stem of the telemetry log, e.g. `orientation` -> `orientation.txt`
    pub log_stem: &'static str,
}

impl Variant {
    pub fn profile(self) -> VariantProfile {
        match self {
            Variant::Magnetic => VariantProfile {
                variant: self,
                strategy: Strategy::Raw {
                    kind: SensorKind::Magnetic,
                },
                alpha: 0.75,
                display_scale: 1.0,
                log_stem: "magnetic",
            },
            Variant::Orientation => VariantProfile {
                variant: self,
                strategy: Strategy::FusedOrientation {
                    channels: [AttitudeAxis::Yaw, AttitudeAxis::Pitch, AttitudeAxis::Roll],
                    remap: (Axis::X, Axis::Y),
                },
                alpha: 0.75,
                display_scale: 20.0 / std::f32::consts::PI,
                log_stem: "orientation",
            },
            Variant::Proximity => VariantProfile {
                variant: self,
                strategy: Strategy::Raw {
                    kind: SensorKind::Proximity,
                },
                alpha: 0.0,
                display_scale: 1.0,
                log_stem: "proximity",
            },
        }
    }
}

// ===== Pipeline configuration =====

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub profile: VariantProfile,
    /// Scheduler period (graph refresh + log append)
    pub refresh_period: Duration,
    /// Directory the telemetry log is written to
    pub output_dir: PathBuf,
    /// Keep existing log contents instead of truncating on session start
    pub append: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_variant(Variant::Orientation)
    }
}

impl PipelineConfig {
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            profile: variant.profile(),
            refresh_period: Duration::from_millis(20),
            output_dir: PathBuf::from("."),
            append: false,
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.txt", self.profile.log_stem))
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if !(0.0..1.0).contains(&self.profile.alpha) {
            return Err(TelemetryError::InvalidInput(format!(
                "smoothing coefficient {} outside [0, 1)",
                self.profile.alpha
            )));
        }
        if self.refresh_period.is_zero() {
            return Err(TelemetryError::InvalidInput(
                "refresh period must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
