use crate::error::{TelemetryError, TelemetryResult};

/// Single-pole exponential smoothing: `out = alpha * previous + (1 - alpha) * incoming`
///
/// The coefficient is fixed for the lifetime of the filter. `alpha = 0` passes the
/// incoming value straight through; values close to 1 smooth heavily.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialSmoother {
    alpha: f32,
}

impl ExponentialSmoother {
    /// Create a smoother, rejecting coefficients outside `[0, 1)`
    pub fn new(alpha: f32) -> TelemetryResult<Self> {
        if !(0.0..1.0).contains(&alpha) {
            return Err(TelemetryError::InvalidInput(format!(
                "smoothing coefficient {} outside [0, 1)",
                alpha
            )));
        }
        Ok(Self { alpha })
    }

    /// Passthrough filter (alpha = 0)
    pub fn passthrough() -> Self {
        Self { alpha: 0.0 }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Smooth one scalar channel
    pub fn apply(&self, previous: f32, incoming: f32) -> f32 {
        smooth(previous, incoming, self.alpha)
    }

    /// Smooth every channel of `state` towards `incoming` in place
    pub fn apply_in_place(&self, state: &mut [f32], incoming: &[f32]) -> TelemetryResult<()> {
        if state.len() != incoming.len() {
            return Err(TelemetryError::InvalidInput(format!(
                "expected {} channels, got {}",
                state.len(),
                incoming.len()
            )));
        }
        for (prev, value) in state.iter_mut().zip(incoming) {
            *prev = smooth(*prev, *value, self.alpha);
        }
        Ok(())
    }

    /// Element-wise smoothing returning a new vector
    pub fn apply_all(&self, previous: &[f32], incoming: &[f32]) -> TelemetryResult<Vec<f32>> {
        let mut out = previous.to_vec();
        self.apply_in_place(&mut out, incoming)?;
        Ok(out)
    }
}

/// Pure smoothing step.
///
/// Written as `incoming + alpha * (previous - incoming)` so equal inputs come back
/// bit-for-bit unchanged.
pub fn smooth(previous: f32, incoming: f32, alpha: f32) -> f32 {
    incoming + alpha * (previous - incoming)
}
