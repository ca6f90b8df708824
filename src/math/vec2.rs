use super::FixedNum;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Sub};

/// 2-D vector over [`FixedNum`]. The axes are named x/z to match the map
/// plane (y is height).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedVec2 {
    pub x: FixedNum,
    pub z: FixedNum,
}

impl FixedVec2 {
    pub const ZERO: FixedVec2 = FixedVec2 {
        x: FixedNum::ZERO,
        z: FixedNum::ZERO,
    };

    pub fn new(x: FixedNum, z: FixedNum) -> Self {
        Self { x, z }
    }

    pub fn from_f32(x: f32, z: f32) -> Self {
        Self {
            x: FixedNum::from_num(x),
            z: FixedNum::from_num(z),
        }
    }

    pub fn length_squared(&self) -> FixedNum {
        self.x * self.x + self.z * self.z
    }

    pub fn distance_squared(&self, other: FixedVec2) -> FixedNum {
        (*self - other).length_squared()
    }
}

impl Add for FixedVec2 {
    type Output = FixedVec2;
    fn add(self, rhs: FixedVec2) -> FixedVec2 {
        FixedVec2::new(self.x + rhs.x, self.z + rhs.z)
    }
}

impl Sub for FixedVec2 {
    type Output = FixedVec2;
    fn sub(self, rhs: FixedVec2) -> FixedVec2 {
        FixedVec2::new(self.x - rhs.x, self.z - rhs.z)
    }
}

impl Mul<FixedNum> for FixedVec2 {
    type Output = FixedVec2;
    fn mul(self, rhs: FixedNum) -> FixedVec2 {
        FixedVec2::new(self.x * rhs, self.z * rhs)
    }
}

impl Div<FixedNum> for FixedVec2 {
    type Output = FixedVec2;
    fn div(self, rhs: FixedNum) -> FixedVec2 {
        FixedVec2::new(self.x / rhs, self.z / rhs)
    }
}
