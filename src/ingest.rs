//! Ingestion path: raw sensor events in, published telemetry snapshots out.
//!
//! Events arrive on whatever thread the sample source delivers on. Each event
//! produces one complete [`TelemetrySnapshot`] which replaces the previous one
//! in [`SharedTelemetryState`] with a single pointer swap, so a reader never
//! sees a value from one event next to an interval from another.

use crossbeam::sync::ShardedLock;
use std::sync::{Arc, Mutex};

use crate::config::{Strategy, VariantProfile};
use crate::error::{poisoned, TelemetryError, TelemetryResult};
use crate::orientation::OrientationEstimator;
use crate::smoothing::ExponentialSmoother;
use crate::source::SampleListener;
use crate::types::{AccuracyGrade, RawSample, SensorKind, TelemetrySnapshot};

/// Latest filtered state, shared between the ingestion path and the refresh loop
#[derive(Debug)]
pub struct SharedTelemetryState {
    slot: ShardedLock<Arc<TelemetrySnapshot>>,
}

impl SharedTelemetryState {
    pub fn new(channels: usize) -> Self {
        Self {
            slot: ShardedLock::new(Arc::new(TelemetrySnapshot::zeroed(channels))),
        }
    }

    /// Consistent view of the most recently published state
    pub fn snapshot(&self) -> TelemetryResult<Arc<TelemetrySnapshot>> {
        let guard = self.slot.read().map_err(poisoned("telemetry snapshot"))?;
        Ok(Arc::clone(&guard))
    }

    fn publish(&self, values: Vec<f32>, sample_interval_millis: f32) -> TelemetryResult<()> {
        let mut guard = self.slot.write().map_err(poisoned("telemetry snapshot"))?;
        let next = TelemetrySnapshot {
            values,
            sample_interval_millis,
            accuracy: guard.accuracy,
            sequence: guard.sequence + 1,
        };
        *guard = Arc::new(next);
        Ok(())
    }

    fn set_accuracy(&self, accuracy: AccuracyGrade) -> TelemetryResult<()> {
        let mut guard = self.slot.write().map_err(poisoned("telemetry snapshot"))?;
        let next = TelemetrySnapshot {
            accuracy,
            ..TelemetrySnapshot::clone(&guard)
        };
        *guard = Arc::new(next);
        Ok(())
    }
}

#[derive(Debug)]
struct IngestState {
    filtered: Vec<f32>,
    last_timestamp_nanos: Option<i64>,
    latest_accel: Option<Vec<f32>>,
    latest_magnetic: Option<Vec<f32>>,
}

/// Turns raw samples into smoothed channel values
#[derive(Debug)]
pub struct Ingestor {
    strategy: Strategy,
    smoother: ExponentialSmoother,
    estimator: OrientationEstimator,
    state: Mutex<IngestState>,
    shared: Arc<SharedTelemetryState>,
}

impl Ingestor {
    pub fn new(profile: &VariantProfile, shared: Arc<SharedTelemetryState>) -> TelemetryResult<Self> {
        let smoother = ExponentialSmoother::new(profile.alpha)?;
        let estimator = match profile.strategy {
            Strategy::FusedOrientation { remap, .. } => OrientationEstimator::new(remap.0, remap.1)?,
            Strategy::Raw { .. } => OrientationEstimator::default(),
        };
        let channels = profile.strategy.channel_count();

        Ok(Self {
            strategy: profile.strategy.clone(),
            smoother,
            estimator,
            state: Mutex::new(IngestState {
                filtered: vec![0.0; channels],
                last_timestamp_nanos: None,
                latest_accel: None,
                latest_magnetic: None,
            }),
            shared,
        })
    }

    pub fn shared(&self) -> &Arc<SharedTelemetryState> {
        &self.shared
    }

    /// Forget the previous event timestamp so the next interval is not measured across a pause
    pub fn reset_timestamp(&self) -> TelemetryResult<()> {
        let mut state = self.state.lock().map_err(poisoned("ingest state"))?;
        state.last_timestamp_nanos = None;
        Ok(())
    }

    /// Process one sensor event.
    ///
    /// On `InvalidInput` nothing is updated: filtered values, stored readings and
    /// the interval timestamp all keep their previous contents.
    pub fn on_event(&self, sample: &RawSample) -> TelemetryResult<()> {
        let mut state = self.state.lock().map_err(poisoned("ingest state"))?;

        let values = match &self.strategy {
            Strategy::Raw { kind } => {
                if sample.kind != *kind {
                    log::debug!("ignoring {} sample on {} pipeline", sample.kind, kind);
                    return Ok(());
                }
                self.smoother.apply_all(&state.filtered, &sample.values)?
            }
            Strategy::FusedOrientation { channels, .. } => {
                if sample.values.len() != 3 {
                    return Err(TelemetryError::InvalidInput(format!(
                        "{} sample must have 3 components, got {}",
                        sample.kind,
                        sample.values.len()
                    )));
                }
                match sample.kind {
                    SensorKind::Accel => state.latest_accel = Some(sample.values.clone()),
                    SensorKind::Magnetic => state.latest_magnetic = Some(sample.values.clone()),
                    SensorKind::Proximity => {
                        log::debug!("ignoring proximity sample on orientation pipeline");
                        return Ok(());
                    }
                }

                match (&state.latest_accel, &state.latest_magnetic) {
                    (Some(accel), Some(magnetic)) => {
                        let attitude = self.estimator.estimate(accel, magnetic)?;
                        let angles: Vec<f32> = channels.iter().map(|axis| axis.pick(&attitude)).collect();
                        self.smoother.apply_all(&state.filtered, &angles)?
                    }
                    // Until both kinds have been seen there is nothing to estimate
                    _ => state.filtered.clone(),
                }
            }
        };

        let interval_millis = match state.last_timestamp_nanos {
            Some(prev) => ((sample.timestamp_nanos - prev) as f64 / 1_000_000.0) as f32,
            None => 0.0,
        };
        state.last_timestamp_nanos = Some(sample.timestamp_nanos);
        state.filtered.clone_from(&values);

        self.shared.publish(values, interval_millis)
    }

    /// Accuracy changes are published independently of value updates
    pub fn on_accuracy(&self, kind: SensorKind, accuracy: AccuracyGrade) -> TelemetryResult<()> {
        log::info!("{} accuracy changed to {}", kind, accuracy);
        self.shared.set_accuracy(accuracy)
    }
}

impl SampleListener for Ingestor {
    fn on_sample(&self, sample: RawSample) {
        if let Err(e) = self.on_event(&sample) {
            log::warn!("dropping {} sample at {}ns: {}", sample.kind, sample.timestamp_nanos, e);
        }
    }

    fn on_accuracy_changed(&self, kind: SensorKind, accuracy: AccuracyGrade) {
        if let Err(e) = self.on_accuracy(kind, accuracy) {
            log::warn!("failed to record accuracy change: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::FRAC_PI_6;
    use std::thread;

    fn ingestor(variant: Variant) -> Ingestor {
        let profile = variant.profile();
        let shared = Arc::new(SharedTelemetryState::new(profile.strategy.channel_count()));
        Ingestor::new(&profile, shared).unwrap()
    }

    #[test]
    fn test_proximity_passthrough() {
        let ing = ingestor(Variant::Proximity);
        ing.on_event(&RawSample::scalar(SensorKind::Proximity, 0, 5.0)).unwrap();
        ing.on_event(&RawSample::scalar(SensorKind::Proximity, 20_000_000, 0.0)).unwrap();

        let snap = ing.shared().snapshot().unwrap();
        assert_eq!(snap.values, vec![0.0]);
        assert_abs_diff_eq!(snap.sample_interval_millis, 20.0);
        assert_eq!(snap.sequence, 2);
    }

    #[test]
    fn test_magnetic_smoothing() {
        let ing = ingestor(Variant::Magnetic);
        ing.on_event(&RawSample::vector(SensorKind::Magnetic, 0, 40.0, 0.0, -8.0)).unwrap();

        let snap = ing.shared().snapshot().unwrap();
        // alpha = 0.75 from a zero start
        assert_abs_diff_eq!(snap.values[0], 10.0, epsilon = 1e-5);
        assert_abs_diff_eq!(snap.values[1], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(snap.values[2], -2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_first_interval_is_zero() {
        let ing = ingestor(Variant::Proximity);
        ing.on_event(&RawSample::scalar(SensorKind::Proximity, 5_000_000_000, 1.0)).unwrap();
        assert_eq!(ing.shared().snapshot().unwrap().sample_interval_millis, 0.0);
    }

    #[test]
    fn test_reset_prevents_stale_interval() {
        let ing = ingestor(Variant::Proximity);
        ing.on_event(&RawSample::scalar(SensorKind::Proximity, 1_000_000, 1.0)).unwrap();
        ing.on_event(&RawSample::scalar(SensorKind::Proximity, 21_000_000, 1.0)).unwrap();

        ing.reset_timestamp().unwrap();
        ing.on_event(&RawSample::scalar(SensorKind::Proximity, 9_000_000_000, 1.0)).unwrap();
        assert_eq!(ing.shared().snapshot().unwrap().sample_interval_millis, 0.0);

        ing.on_event(&RawSample::scalar(SensorKind::Proximity, 9_010_000_000, 1.0)).unwrap();
        assert_abs_diff_eq!(ing.shared().snapshot().unwrap().sample_interval_millis, 10.0);
    }

    #[test]
    fn test_fused_waits_for_both_kinds() {
        let ing = ingestor(Variant::Orientation);
        ing.on_event(&RawSample::vector(SensorKind::Accel, 0, 0.0, 0.0, 9.81)).unwrap();
        ing.on_event(&RawSample::vector(SensorKind::Accel, 10_000_000, 3.0, 0.0, 9.0)).unwrap();

        let snap = ing.shared().snapshot().unwrap();
        assert_eq!(snap.values, vec![0.0, 0.0, 0.0]);
        // interval still tracked while waiting
        assert_abs_diff_eq!(snap.sample_interval_millis, 10.0);
    }

    #[test]
    fn test_fused_uses_latest_of_each_kind() {
        let ing = ingestor(Variant::Orientation);
        // Facing east, flat
        ing.on_event(&RawSample::vector(SensorKind::Magnetic, 0, -22.0, 0.0, -40.0)).unwrap();
        ing.on_event(&RawSample::vector(SensorKind::Accel, 1_000_000, 0.0, 0.0, 9.81)).unwrap();

        let snap = ing.shared().snapshot().unwrap();
        // channel 0 is yaw, smoothed from zero with alpha = 0.75
        assert_abs_diff_eq!(snap.values[0], 0.25 * std::f32::consts::FRAC_PI_2, epsilon = 1e-5);
        assert_abs_diff_eq!(snap.values[1], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(snap.values[2], 0.0, epsilon = 1e-5);

        // A second accel reading reuses the stored (stale) magnetic reading
        ing.on_event(&RawSample::vector(SensorKind::Accel, 2_000_000, 0.0, 0.0, 9.81)).unwrap();
        let snap = ing.shared().snapshot().unwrap();
        let expected = 0.75 * 0.25 * std::f32::consts::FRAC_PI_2 + 0.25 * std::f32::consts::FRAC_PI_2;
        assert_abs_diff_eq!(snap.values[0], expected, epsilon = 1e-5);
    }

    #[test]
    fn test_pitch_lands_on_channel_one() {
        let ing = ingestor(Variant::Orientation);
        let g = 9.81_f32;
        // Top edge raised by 30 degrees, facing north
        ing.on_event(&RawSample::vector(SensorKind::Magnetic, 0, 0.0, 22.0, -40.0)).unwrap();
        ing.on_event(&RawSample::vector(SensorKind::Accel, 1_000_000, 0.0, g * 0.5, g * 0.75_f32.sqrt()))
            .unwrap();

        let snap = ing.shared().snapshot().unwrap();
        assert_abs_diff_eq!(snap.values[0], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(snap.values[1], 0.25 * -FRAC_PI_6, epsilon = 1e-5);
        assert_abs_diff_eq!(snap.values[2], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_roll_lands_on_channel_two() {
        let ing = ingestor(Variant::Orientation);
        let g = 9.81_f32;
        // Left edge raised by 30 degrees, facing north
        ing.on_event(&RawSample::vector(SensorKind::Magnetic, 0, 0.0, 22.0, -40.0)).unwrap();
        ing.on_event(&RawSample::vector(SensorKind::Accel, 1_000_000, g * 0.5, 0.0, g * 0.75_f32.sqrt()))
            .unwrap();

        let snap = ing.shared().snapshot().unwrap();
        assert_abs_diff_eq!(snap.values[1], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(snap.values[2], 0.25 * -FRAC_PI_6, epsilon = 1e-5);
    }

    #[test]
    fn test_invalid_input_keeps_state() {
        let ing = ingestor(Variant::Orientation);
        ing.on_event(&RawSample::vector(SensorKind::Magnetic, 0, -22.0, 0.0, -40.0)).unwrap();
        ing.on_event(&RawSample::vector(SensorKind::Accel, 1_000_000, 0.0, 0.0, 9.81)).unwrap();
        let before = ing.shared().snapshot().unwrap();

        let bad = RawSample::new(SensorKind::Accel, 50_000_000, vec![1.0, 2.0]);
        assert!(matches!(ing.on_event(&bad), Err(TelemetryError::InvalidInput(_))));

        let after = ing.shared().snapshot().unwrap();
        assert_eq!(*before, *after);

        // Interval is still measured against the last good event
        ing.on_event(&RawSample::vector(SensorKind::Accel, 3_000_000, 0.0, 0.0, 9.81)).unwrap();
        assert_abs_diff_eq!(ing.shared().snapshot().unwrap().sample_interval_millis, 2.0);
    }

    #[test]
    fn test_wrong_kind_ignored() {
        let ing = ingestor(Variant::Proximity);
        ing.on_event(&RawSample::vector(SensorKind::Accel, 0, 1.0, 2.0, 3.0)).unwrap();
        assert_eq!(ing.shared().snapshot().unwrap().sequence, 0);
    }

    #[test]
    fn test_accuracy_is_independent() {
        let ing = ingestor(Variant::Proximity);
        ing.on_event(&RawSample::scalar(SensorKind::Proximity, 0, 3.0)).unwrap();
        ing.on_accuracy(SensorKind::Proximity, 2).unwrap();

        let snap = ing.shared().snapshot().unwrap();
        assert_eq!(snap.accuracy, 2);
        assert_eq!(snap.values, vec![3.0]);

        ing.on_event(&RawSample::scalar(SensorKind::Proximity, 1_000_000, 4.0)).unwrap();
        assert_eq!(ing.shared().snapshot().unwrap().accuracy, 2);
    }

    #[test]
    fn test_snapshots_are_never_torn() {
        // Each event carries value == interval, so any snapshot mixing two events is detectable
        let ing = Arc::new(ingestor(Variant::Proximity));
        let writer = {
            let ing = Arc::clone(&ing);
            thread::spawn(move || {
                let mut ts: i64 = 0;
                for step in 1..=2_000_i64 {
                    ts += step * 1_000_000;
                    ing.on_event(&RawSample::scalar(SensorKind::Proximity, ts, step as f32))
                        .unwrap();
                }
            })
        };

        for _ in 0..2_000 {
            let snap = ing.shared().snapshot().unwrap();
            if snap.sequence > 1 {
                assert_eq!(snap.values[0], snap.sample_interval_millis);
            }
        }
        writer.join().unwrap();
    }
}
