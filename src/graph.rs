use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

use crate::types::AccuracyGrade;

/// Points kept per series when the caller has no preference
pub const DEFAULT_GRAPH_CAPACITY: usize = 500;

/// Failure reported by a rendering collaborator; the refresh loop logs and moves on
#[derive(Error, Debug, Clone, PartialEq)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

/// Rendering collaborator fed once per refresh tick
pub trait TelemetryView: Send + Sync {
    /// Append one point to a series
    fn append(&self, series: usize, value: f32) -> Result<(), RenderError>;

    /// Latest sample interval and accuracy grade
    fn show_status(&self, _sample_interval_millis: f32, _accuracy: AccuracyGrade) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Fixed-capacity scrolling series; the oldest point is evicted on overflow
#[derive(Debug, Clone)]
pub struct GraphSeries {
    points: VecDeque<f32>,
    capacity: usize,
}

impl GraphSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        GraphSeries {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f32> {
        self.points.back().copied()
    }

    /// Points from oldest to newest
    pub fn values(&self) -> Vec<f32> {
        self.points.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusLine {
    pub sample_interval_millis: f32,
    pub accuracy: AccuracyGrade,
}

/// In-memory graph backing store: one series per displayed channel
#[derive(Debug)]
pub struct GraphModel {
    series: Mutex<Vec<GraphSeries>>,
    status: Mutex<StatusLine>,
}

impl GraphModel {
    pub fn new(channels: usize, capacity: usize) -> Self {
        GraphModel {
            series: Mutex::new((0..channels).map(|_| GraphSeries::new(capacity)).collect()),
            status: Mutex::new(StatusLine::default()),
        }
    }

    pub fn series_count(&self) -> usize {
        self.series.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Copy of one series, oldest first
    pub fn series(&self, id: usize) -> Option<Vec<f32>> {
        self.series.lock().ok()?.get(id).map(GraphSeries::values)
    }

    pub fn latest(&self) -> Vec<Option<f32>> {
        self.series
            .lock()
            .map(|s| s.iter().map(GraphSeries::latest).collect())
            .unwrap_or_default()
    }

    pub fn status(&self) -> StatusLine {
        self.status.lock().map(|s| *s).unwrap_or_default()
    }
}

impl TelemetryView for GraphModel {
    fn append(&self, series: usize, value: f32) -> Result<(), RenderError> {
        let mut all = self
            .series
            .lock()
            .map_err(|_| RenderError("graph series lock poisoned".to_string()))?;
        let target = all
            .get_mut(series)
            .ok_or_else(|| RenderError(format!("no graph series {}", series)))?;
        target.push(value);
        Ok(())
    }

    fn show_status(&self, sample_interval_millis: f32, accuracy: AccuracyGrade) -> Result<(), RenderError> {
        let mut status = self
            .status
            .lock()
            .map_err(|_| RenderError("status lock poisoned".to_string()))?;
        *status = StatusLine {
            sample_interval_millis,
            accuracy,
        };
        Ok(())
    }
}
