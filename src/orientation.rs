//! Attitude from a gravity reading and a geomagnetic reading.
//!
//! The rotation basis is the usual East/North/Up construction: the horizontal
//! east axis is `magnetic x gravity`, north completes the right-handed frame,
//! and up is the normalised gravity reading. The matrix is stored row-major
//! with the rows being those three axes expressed in device coordinates.

use nalgebra::{Matrix3, Vector3};

use crate::error::{TelemetryError, TelemetryResult};
use crate::types::AttitudeEstimate;

const STANDARD_GRAVITY: f32 = 9.81;

/// Below this squared magnitude the device is considered in free fall
const FREE_FALL_GRAVITY_SQUARED: f32 = 0.01 * STANDARD_GRAVITY * STANDARD_GRAVITY;

/// Minimum norm of the east vector; smaller means gravity and field are near-parallel
const MIN_EAST_NORM: f32 = 0.1;

/// Device axis used when remapping the rotation matrix into display coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
    MinusX,
    MinusY,
    MinusZ,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::X | Axis::MinusX => 0,
            Axis::Y | Axis::MinusY => 1,
            Axis::Z | Axis::MinusZ => 2,
        }
    }

    fn is_negative(self) -> bool {
        matches!(self, Axis::MinusX | Axis::MinusY | Axis::MinusZ)
    }
}

/// Build the device-to-world rotation matrix.
///
/// Returns `None` when the device is in free fall or the field is (nearly)
/// parallel to gravity; no attitude can be derived in either case.
pub fn rotation_matrix(gravity: &Vector3<f32>, geomagnetic: &Vector3<f32>) -> Option<Matrix3<f32>> {
    if gravity.norm_squared() < FREE_FALL_GRAVITY_SQUARED {
        return None;
    }

    let east = geomagnetic.cross(gravity);
    let east_norm = east.norm();
    if east_norm < MIN_EAST_NORM {
        return None;
    }
    let east = east / east_norm;
    let up = gravity.normalize();
    let north = up.cross(&east);

    Some(Matrix3::from_rows(&[
        east.transpose(),
        north.transpose(),
        up.transpose(),
    ]))
}

/// Re-express a rotation matrix with the device X/Y axes mapped onto `x_axis`/`y_axis`.
///
/// The third axis is chosen so the result stays right-handed. Mapping an axis
/// onto itself (`X`, `Y`) returns the input unchanged.
pub fn remap_coordinate_system(
    rotation: &Matrix3<f32>,
    x_axis: Axis,
    y_axis: Axis,
) -> TelemetryResult<Matrix3<f32>> {
    let x = x_axis.index();
    let y = y_axis.index();
    if x == y {
        return Err(TelemetryError::InvalidInput(format!(
            "cannot remap X and Y onto the same axis ({:?}, {:?})",
            x_axis, y_axis
        )));
    }
    let z = 3 - x - y;

    // (x, y, z) must be a cyclic permutation for z = x cross y; otherwise flip z
    let cyclic = x == (z + 1) % 3 && y == (z + 2) % 3;
    let sx = x_axis.is_negative();
    let sy = y_axis.is_negative();
    let sz = sx ^ sy ^ !cyclic;

    let signed = |negate: bool, v: f32| if negate { -v } else { v };
    let mut out = Matrix3::zeros();
    for row in 0..3 {
        out[(row, x)] = signed(sx, rotation[(row, 0)]);
        out[(row, y)] = signed(sy, rotation[(row, 1)]);
        out[(row, z)] = signed(sz, rotation[(row, 2)]);
    }
    Ok(out)
}

/// Decompose a rotation matrix into yaw (azimuth), pitch and roll
pub fn attitude_from_rotation(rotation: &Matrix3<f32>) -> AttitudeEstimate {
    AttitudeEstimate {
        yaw: rotation[(0, 1)].atan2(rotation[(1, 1)]),
        pitch: (-rotation[(2, 1)]).clamp(-1.0, 1.0).asin(),
        roll: (-rotation[(2, 0)]).atan2(rotation[(2, 2)]),
    }
}

/// Combines acceleration and magnetic field readings into an attitude estimate
#[derive(Debug, Clone, Copy)]
pub struct OrientationEstimator {
    x_axis: Axis,
    y_axis: Axis,
}

impl Default for OrientationEstimator {
    fn default() -> Self {
        Self {
            x_axis: Axis::X,
            y_axis: Axis::Y,
        }
    }
}

impl OrientationEstimator {
    pub fn new(x_axis: Axis, y_axis: Axis) -> TelemetryResult<Self> {
        if x_axis.index() == y_axis.index() {
            return Err(TelemetryError::InvalidInput(format!(
                "display remap uses the same axis twice ({:?}, {:?})",
                x_axis, y_axis
            )));
        }
        Ok(Self { x_axis, y_axis })
    }

    /// Estimate attitude from raw three-axis readings.
    ///
    /// Degenerate geometry (free fall, field parallel to gravity) yields a zero
    /// attitude rather than an error; only wrongly sized inputs are rejected.
    pub fn estimate(&self, accel: &[f32], magnetic: &[f32]) -> TelemetryResult<AttitudeEstimate> {
        let gravity = to_vector3(accel, "acceleration")?;
        let field = to_vector3(magnetic, "magnetic field")?;

        let rotation = match rotation_matrix(&gravity, &field) {
            Some(r) => remap_coordinate_system(&r, self.x_axis, self.y_axis)?,
            None => {
                log::debug!("degenerate accel/magnetic geometry, attitude left at zero");
                return Ok(AttitudeEstimate::default());
            }
        };

        Ok(attitude_from_rotation(&rotation))
    }
}

fn to_vector3(values: &[f32], what: &str) -> TelemetryResult<Vector3<f32>> {
    match values {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(TelemetryError::InvalidInput(format!(
            "{} vector must have 3 components, got {}",
            what,
            values.len()
        ))),
    }
}
