use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration};

use sensor_graph::graph::DEFAULT_GRAPH_CAPACITY;
use sensor_graph::{
    AlwaysGranted, GraphModel, PipelineConfig, SimulatedSource, SystemClock, TelemetryPipeline,
    TelemetrySnapshot, Variant,
};

#[derive(Parser, Debug)]
#[command(name = "sensor_graph")]
#[command(about = "Live sensor telemetry graph with optional text log", long_about = None)]
struct Args {
    /// Telemetry variant to run
    #[arg(long, value_enum, default_value = "orientation")]
    variant: Variant,

    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(long, value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Graph refresh / log append period
    #[arg(long, default_value = "20")]
    refresh_ms: u64,

    /// Simulated sensor event period
    #[arg(long, default_value = "10")]
    sample_ms: u64,

    /// Points kept per graph series
    #[arg(long, default_value_t = DEFAULT_GRAPH_CAPACITY, value_parser = parse_capacity)]
    graph_capacity: usize,

    /// Directory for the telemetry log and run summary
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Start a log session immediately
    #[arg(long)]
    log: bool,

    /// Append to an existing log instead of truncating it
    #[arg(long)]
    append: bool,
}

fn parse_capacity(raw: &str) -> std::result::Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("graph capacity must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[derive(Serialize)]
struct RunSummary {
    variant: Variant,
    started_at: String,
    duration_secs: f64,
    refresh_ticks: u64,
    log_path: Option<String>,
    log_lines: Option<u64>,
    final_snapshot: TelemetrySnapshot,
}

/// Owned copy of the last published snapshot, for the run summary
fn final_snapshot(pipeline: &TelemetryPipeline) -> Result<TelemetrySnapshot> {
    let published = pipeline.snapshot()?;
    Ok((*published).clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let mut config = PipelineConfig::for_variant(args.variant);
    config.refresh_period = Duration::from_millis(args.refresh_ms);
    config.output_dir = args.output_dir.clone();
    config.append = args.append;
    let channels = config.profile.strategy.channel_count();
    let log_stem = config.profile.log_stem;

    let source = Arc::new(SimulatedSource::new(Duration::from_millis(args.sample_ms.max(1))));
    let graph = Arc::new(GraphModel::new(channels, args.graph_capacity));
    let mut pipeline = TelemetryPipeline::new(
        config,
        source,
        graph.clone(),
        Arc::new(SystemClock),
        Arc::new(AlwaysGranted),
    )?;

    log::info!("sensor_graph starting: {:?}", args);
    pipeline.resume()?;
    if args.log {
        pipeline.request_log_start()?;
    }

    let started = Utc::now();
    let deadline = async {
        if args.duration == 0 {
            std::future::pending::<()>().await
        } else {
            sleep(Duration::from_secs(args.duration)).await
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut status = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = &mut deadline => {
                log::info!("run duration reached");
                break;
            }
            signal = &mut ctrl_c => {
                signal.context("waiting for Ctrl-C")?;
                log::info!("interrupted");
                break;
            }
            _ = status.tick() => {
                let snapshot = pipeline.snapshot()?;
                let shown: Vec<String> = graph
                    .latest()
                    .iter()
                    .map(|v| v.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v)))
                    .collect();
                log::info!(
                    "{} | dt {:.1} ms | accuracy {}",
                    shown.join(" "),
                    snapshot.sample_interval_millis,
                    snapshot.accuracy
                );
            }
        }
    }

    let log_lines = pipeline.stop_logging()?;
    let refresh_ticks = pipeline.pause().await?;
    let final_snapshot = final_snapshot(&pipeline)?;

    let summary = RunSummary {
        variant: args.variant,
        started_at: started.to_rfc3339(),
        duration_secs: (Utc::now() - started).num_milliseconds() as f64 / 1000.0,
        refresh_ticks,
        log_path: log_lines.map(|_| pipeline.log_path().display().to_string()),
        log_lines,
        final_snapshot,
    };
    let summary_path = args.output_dir.join(format!("{}_summary.json", log_stem));
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    log::info!(
        "done: {} refresh ticks, summary at {}",
        refresh_ticks,
        summary_path.display()
    );
    Ok(())
}
