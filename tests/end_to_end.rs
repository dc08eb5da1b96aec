use std::sync::Arc;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use sensor_graph::{
    AlwaysGranted, Authorization, GraphModel, ManualClock, ManualSource, PipelineConfig, RawSample,
    SensorKind, SessionState, TelemetryError, TelemetryPipeline, Variant,
};

struct Rig {
    pipeline: TelemetryPipeline,
    source: Arc<ManualSource>,
    clock: Arc<ManualClock>,
    graph: Arc<GraphModel>,
    _dir: tempfile::TempDir,
}

fn rig(variant: Variant, authorize: Arc<dyn sensor_graph::StorageAuthorizer>) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::for_variant(variant);
    config.output_dir = dir.path().to_path_buf();
    // Background refresh stays out of the way; ticks are driven explicitly
    config.refresh_period = Duration::from_secs(3600);

    let source = Arc::new(ManualSource::new(&[
        SensorKind::Accel,
        SensorKind::Magnetic,
        SensorKind::Proximity,
    ]));
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let graph = Arc::new(GraphModel::new(config.profile.strategy.channel_count(), 8));
    let pipeline = TelemetryPipeline::new(config, source.clone(), graph.clone(), clock.clone(), authorize)
        .unwrap();

    Rig {
        pipeline,
        source,
        clock,
        graph,
        _dir: dir,
    }
}

#[tokio::test]
async fn proximity_session_logs_each_tick() {
    let mut rig = rig(Variant::Proximity, Arc::new(AlwaysGranted));
    rig.pipeline.resume().unwrap();
    assert_eq!(rig.pipeline.request_log_start().unwrap(), SessionState::Recording);

    for (i, value) in [5.0_f32, 5.0, 0.0].iter().enumerate() {
        let ts = i as i64 * 20_000_000;
        assert!(rig.source.push(RawSample::scalar(SensorKind::Proximity, ts, *value)));
        rig.pipeline.refresh_now();
        rig.clock.advance(20);
    }

    let snapshot = rig.pipeline.snapshot().unwrap();
    assert_abs_diff_eq!(snapshot.sample_interval_millis, 20.0);
    assert_eq!(rig.graph.series(0), Some(vec![5.0, 5.0, 0.0]));

    assert_eq!(rig.pipeline.stop_logging().unwrap(), Some(3));
    let log = std::fs::read_to_string(rig.pipeline.log_path()).unwrap();
    assert_eq!(log, "0.0: 5.0\n0.20: 5.0\n0.40: 0.0\n");

    // Nothing more is written once stopped
    rig.pipeline.refresh_now();
    assert_eq!(std::fs::read_to_string(rig.pipeline.log_path()).unwrap(), log);
    rig.pipeline.pause().await.unwrap();
}

#[tokio::test]
async fn orientation_flat_north_reads_zero() {
    let mut rig = rig(Variant::Orientation, Arc::new(AlwaysGranted));
    rig.pipeline.resume().unwrap();

    for step in 0..40_i64 {
        let ts = step * 10_000_000;
        rig.source
            .push(RawSample::vector(SensorKind::Accel, ts, 0.0, 0.0, 9.81));
        rig.source
            .push(RawSample::vector(SensorKind::Magnetic, ts + 5_000_000, 0.0, 22.0, -40.0));
    }
    rig.pipeline.refresh_now();

    let snapshot = rig.pipeline.snapshot().unwrap();
    for v in &snapshot.values {
        assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-4);
    }
    assert_abs_diff_eq!(snapshot.sample_interval_millis, 5.0, epsilon = 1e-3);
    assert_eq!(rig.graph.series_count(), 3);
    rig.pipeline.pause().await.unwrap();
}

#[tokio::test]
async fn log_opens_once_after_pending_permission() {
    let mut rig = rig(Variant::Magnetic, Arc::new(|| Authorization::Pending));
    rig.pipeline.resume().unwrap();

    assert_eq!(
        rig.pipeline.request_log_start().unwrap(),
        SessionState::AwaitingPermission
    );
    // Ticks before the grant are not logged
    assert!(!rig.pipeline.refresh_now().logged);

    assert_eq!(rig.pipeline.on_authorization_result(true).unwrap(), SessionState::Recording);
    rig.source
        .push(RawSample::vector(SensorKind::Magnetic, 0, 4.0, 8.0, -12.0));
    assert!(rig.pipeline.refresh_now().logged);

    rig.pipeline.pause().await.unwrap();
    assert_eq!(rig.pipeline.log_state().unwrap(), SessionState::Idle);
    assert_eq!(
        std::fs::read_to_string(rig.pipeline.log_path()).unwrap(),
        "0.0: 1.0 2.0 -3.0\n"
    );
}

#[tokio::test]
async fn refused_permission_writes_nothing() {
    let mut rig = rig(Variant::Proximity, Arc::new(|| Authorization::Pending));
    rig.pipeline.resume().unwrap();
    rig.pipeline.request_log_start().unwrap();
    assert_eq!(
        rig.pipeline.on_authorization_result(false).unwrap_err(),
        TelemetryError::PermissionDenied
    );

    rig.source.push(RawSample::scalar(SensorKind::Proximity, 0, 5.0));
    assert!(!rig.pipeline.refresh_now().logged);
    assert!(!rig.pipeline.log_path().exists());
    rig.pipeline.pause().await.unwrap();
}
