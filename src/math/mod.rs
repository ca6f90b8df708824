//! Deterministic fixed-point mathematics.
//!
//! All simulation-visible scalars use fixed-point arithmetic so that every
//! client in a lockstep network game derives bit-identical values. Floats are
//! only permitted at the configuration boundary, converted once on load.

use fixed::types::I48F16;

pub use vec2::FixedVec2;

mod vec2;

/// Fixed-point number type used throughout the estimator.
///
/// Uses I48F16 format: 48 bits for the integer part, 16 bits for the
/// fractional part.
pub type FixedNum = I48F16;

/// sqrt(2) in I48F16, used for diagonal step costs.
pub const SQRT_TWO: FixedNum = FixedNum::from_bits(0x16A0A);

/// 0.5 in I48F16.
pub const HALF: FixedNum = FixedNum::from_bits(0x8000);

/// Axis-aligned rectangle in world units.
#[derive(Clone, Copy, Debug)]
pub struct WorldRect {
    pub min: FixedVec2,
    pub max: FixedVec2,
}

impl WorldRect {
    pub fn new(min: FixedVec2, max: FixedVec2) -> Self {
        Self { min, max }
    }

    pub fn from_f32(min_x: f32, min_z: f32, max_x: f32, max_z: f32) -> Self {
        Self {
            min: FixedVec2::from_f32(min_x, min_z),
            max: FixedVec2::from_f32(max_x, max_z),
        }
    }
}
