use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical sensor a sample originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Accel,
    Magnetic,
    Proximity,
}

impl SensorKind {
    /// Number of scalar channels a sample of this kind carries
    pub fn channel_count(self) -> usize {
        match self {
            SensorKind::Accel | SensorKind::Magnetic => 3,
            SensorKind::Proximity => 1,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Accel => "accelerometer",
            SensorKind::Magnetic => "magnetic field",
            SensorKind::Proximity => "proximity",
        };
        f.write_str(name)
    }
}

/// Accuracy grade reported by the sensor service (0 = unreliable .. 3 = high)
pub type AccuracyGrade = i32;

/// Raw sensor event as pushed by a sample source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub values: Vec<f32>,
    pub timestamp_nanos: i64,
    pub kind: SensorKind,
}

impl RawSample {
    pub fn new(kind: SensorKind, timestamp_nanos: i64, values: Vec<f32>) -> Self {
        Self {
            values,
            timestamp_nanos,
            kind,
        }
    }

    /// Single-channel sample (proximity)
    pub fn scalar(kind: SensorKind, timestamp_nanos: i64, value: f32) -> Self {
        Self::new(kind, timestamp_nanos, vec![value])
    }

    /// Three-axis sample (accelerometer, magnetometer)
    pub fn vector(kind: SensorKind, timestamp_nanos: i64, x: f32, y: f32, z: f32) -> Self {
        Self::new(kind, timestamp_nanos, vec![x, y, z])
    }
}

/// Attitude angles in radians
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeEstimate {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// One published view of the filtered state.
///
/// A snapshot is immutable once published; every field in it was produced by
/// the same ingestion step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub values: Vec<f32>,
    pub sample_interval_millis: f32,
    pub accuracy: AccuracyGrade,
    /// Number of ingestion steps that produced this snapshot
    pub sequence: u64,
}

impl TelemetrySnapshot {
    pub fn zeroed(channels: usize) -> Self {
        Self {
            values: vec![0.0; channels],
            sample_interval_millis: 0.0,
            accuracy: 0,
            sequence: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_counts() {
        assert_eq!(SensorKind::Accel.channel_count(), 3);
        assert_eq!(SensorKind::Magnetic.channel_count(), 3);
        assert_eq!(SensorKind::Proximity.channel_count(), 1);
    }

    #[test]
    fn test_sample_constructors() {
        let s = RawSample::vector(SensorKind::Accel, 10, 0.0, 0.0, 9.81);
        assert_eq!(s.values.len(), 3);
        let p = RawSample::scalar(SensorKind::Proximity, 20, 5.0);
        assert_eq!(p.values, vec![5.0]);
        assert_eq!(p.timestamp_nanos, 20);
    }
}
