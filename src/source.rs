use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::error::{poisoned, TelemetryError, TelemetryResult};
use crate::types::{AccuracyGrade, RawSample, SensorKind};

/// Receiver of pushed sensor events. Called from the source's delivery thread.
pub trait SampleListener: Send + Sync {
    fn on_sample(&self, sample: RawSample);
    fn on_accuracy_changed(&self, kind: SensorKind, accuracy: AccuracyGrade);
}

/// Push-based provider of raw sensor events.
///
/// Delivery order across kinds is unspecified; within one kind timestamps are
/// monotonic. There is no way to slow a source down.
pub trait SampleSource: Send + Sync {
    fn has_sensor(&self, kind: SensorKind) -> bool;
    fn subscribe(&self, kind: SensorKind, listener: Arc<dyn SampleListener>) -> TelemetryResult<()>;
    fn unsubscribe(&self, kind: SensorKind);
}

// ===== Manual source =====

/// Source driven by the caller: samples pushed here go straight to the subscriber
pub struct ManualSource {
    available: Vec<SensorKind>,
    listeners: Mutex<HashMap<SensorKind, Arc<dyn SampleListener>>>,
}

impl ManualSource {
    pub fn new(available: &[SensorKind]) -> Self {
        Self {
            available: available.to_vec(),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    fn listener(&self, kind: SensorKind) -> Option<Arc<dyn SampleListener>> {
        self.listeners.lock().ok()?.get(&kind).cloned()
    }

    /// Deliver a sample; returns false when nobody is subscribed to its kind
    pub fn push(&self, sample: RawSample) -> bool {
        match self.listener(sample.kind) {
            Some(listener) => {
                listener.on_sample(sample);
                true
            }
            None => false,
        }
    }

    pub fn set_accuracy(&self, kind: SensorKind, accuracy: AccuracyGrade) -> bool {
        match self.listener(kind) {
            Some(listener) => {
                listener.on_accuracy_changed(kind, accuracy);
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, kind: SensorKind) -> bool {
        self.listener(kind).is_some()
    }
}

impl SampleSource for ManualSource {
    fn has_sensor(&self, kind: SensorKind) -> bool {
        self.available.contains(&kind)
    }

    fn subscribe(&self, kind: SensorKind, listener: Arc<dyn SampleListener>) -> TelemetryResult<()> {
        if !self.has_sensor(kind) {
            return Err(TelemetryError::SensorUnavailable(kind));
        }
        self.listeners
            .lock()
            .map_err(poisoned("listener table"))?
            .insert(kind, listener);
        Ok(())
    }

    fn unsubscribe(&self, kind: SensorKind) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(&kind);
        }
    }
}

// ===== Simulated source =====

/// Emits synthetic readings for every kind on its own tokio task
pub struct SimulatedSource {
    period: Duration,
    epoch: Instant,
    tasks: Mutex<HashMap<SensorKind, JoinHandle<()>>>,
}

impl SimulatedSource {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            epoch: Instant::now(),
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl SampleSource for SimulatedSource {
    fn has_sensor(&self, _kind: SensorKind) -> bool {
        true
    }

    fn subscribe(&self, kind: SensorKind, listener: Arc<dyn SampleListener>) -> TelemetryResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TelemetryError::Internal(format!("simulated source needs a tokio runtime: {}", e)))?;
        let mut tasks = self.tasks.lock().map_err(poisoned("simulated source tasks"))?;
        if let Some(previous) = tasks.remove(&kind) {
            previous.abort();
        }
        let handle = runtime.spawn(emit_loop(kind, listener, self.period, self.epoch));
        tasks.insert(kind, handle);
        log::debug!("simulated {} source started ({:?} period)", kind, self.period);
        Ok(())
    }

    fn unsubscribe(&self, kind: SensorKind) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(handle) = tasks.remove(&kind) {
                handle.abort();
                log::debug!("simulated {} source stopped", kind);
            }
        }
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for (_, handle) in tasks.drain() {
                handle.abort();
            }
        }
    }
}

async fn emit_loop(kind: SensorKind, listener: Arc<dyn SampleListener>, period: Duration, epoch: Instant) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut n: u64 = 0;

    listener.on_accuracy_changed(kind, 3);

    loop {
        ticker.tick().await;
        let timestamp_nanos = epoch.elapsed().as_nanos() as i64;
        let t = n as f32 * period.as_secs_f32();
        listener.on_sample(mock_sample(kind, timestamp_nanos, t));
        n += 1;
    }
}

fn mock_sample(kind: SensorKind, timestamp_nanos: i64, t: f32) -> RawSample {
    use std::f32::consts::PI;

    match kind {
        SensorKind::Accel => RawSample::vector(
            kind,
            timestamp_nanos,
            (t * 2.0 * PI).sin() * 0.5,
            (t * 2.0 * PI).cos() * 0.3,
            9.81 + (t * PI).sin() * 0.1,
        ),
        // Slowly turning horizontal component with a constant downward dip
        SensorKind::Magnetic => RawSample::vector(
            kind,
            timestamp_nanos,
            -22.0 * (t * 0.2).sin(),
            22.0 * (t * 0.2).cos(),
            -40.0,
        ),
        // Object toggles near/far every two seconds
        SensorKind::Proximity => {
            let near = (t / 2.0) as u64 % 2 == 1;
            RawSample::scalar(kind, timestamp_nanos, if near { 0.0 } else { 5.0 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collector {
        samples: Mutex<Vec<RawSample>>,
        accuracy: Mutex<Vec<(SensorKind, AccuracyGrade)>>,
    }

    impl SampleListener for Collector {
        fn on_sample(&self, sample: RawSample) {
            self.samples.lock().unwrap().push(sample);
        }

        fn on_accuracy_changed(&self, kind: SensorKind, accuracy: AccuracyGrade) {
            self.accuracy.lock().unwrap().push((kind, accuracy));
        }
    }

    #[test]
    fn test_manual_source_routing() {
        let source = ManualSource::new(&[SensorKind::Proximity]);
        let collector = Arc::new(Collector::default());

        assert!(!source.push(RawSample::scalar(SensorKind::Proximity, 0, 1.0)));
        source.subscribe(SensorKind::Proximity, collector.clone()).unwrap();
        assert!(source.push(RawSample::scalar(SensorKind::Proximity, 1, 2.0)));
        assert!(source.set_accuracy(SensorKind::Proximity, 1));

        source.unsubscribe(SensorKind::Proximity);
        assert!(!source.push(RawSample::scalar(SensorKind::Proximity, 2, 3.0)));

        assert_eq!(collector.samples.lock().unwrap().len(), 1);
        assert_eq!(*collector.accuracy.lock().unwrap(), vec![(SensorKind::Proximity, 1)]);
    }

    #[test]
    fn test_manual_source_missing_sensor() {
        let source = ManualSource::new(&[SensorKind::Accel]);
        let err = source
            .subscribe(SensorKind::Magnetic, Arc::new(Collector::default()))
            .unwrap_err();
        assert_eq!(err, TelemetryError::SensorUnavailable(SensorKind::Magnetic));
    }

    #[test]
    fn test_simulated_needs_runtime() {
        let source = SimulatedSource::new(Duration::from_millis(5));
        assert!(source
            .subscribe(SensorKind::Accel, Arc::new(Collector::default()))
            .is_err());
    }

    #[tokio::test]
    async fn test_simulated_source_emits_monotonic_samples() {
        let source = SimulatedSource::new(Duration::from_millis(2));
        let collector = Arc::new(Collector::default());
        source.subscribe(SensorKind::Magnetic, collector.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        source.unsubscribe(SensorKind::Magnetic);

        let samples = collector.samples.lock().unwrap().clone();
        assert!(samples.len() >= 3);
        assert!(samples.windows(2).all(|w| w[0].timestamp_nanos <= w[1].timestamp_nanos));
        assert!(samples.iter().all(|s| s.values.len() == 3));
        assert_eq!(collector.accuracy.lock().unwrap()[0], (SensorKind::Magnetic, 3));
    }
}
