use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use crate::{IkError, Result};

pub const NUM_JOINTS: usize = 6;

/// A closed interval `[min, max]` of joint angles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointRange {
    pub min: f64,
    pub max: f64,
}

impl JointRange {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !(min.is_finite() && max.is_finite()) {
            return Err(IkError::InvalidParameter(format!(
                "joint range [{min}, {max}] is not finite"
            )));
        }
        if min > max {
            return Err(IkError::InvalidParameter(format!(
                "joint range [{min}, {max}] has min > max"
            )));
        }
        Ok(Self { min, max })
    }

    #[inline]
    pub fn clamp(&self, angle: f64) -> f64 {
        angle.max(self.min).min(self.max)
    }

    #[inline]
    pub fn contains(&self, angle: f64) -> bool {
        self.min <= angle && angle <= self.max
    }
}

/// Per-joint angle limits of the arm, in joint order.
#[derive(Debug, Clone, PartialEq)]
pub struct JointLimits {
    ranges: [JointRange; NUM_JOINTS],
}

impl Default for JointLimits {
    fn default() -> Self {
        let r = |min, max| JointRange { min, max };
        Self {
            ranges: [
                r(-PI, PI),
                r(-3.0 * FRAC_PI_2, 0.0),
                r(0.0, 3.0 * FRAC_PI_2),
                r(-PI, PI),
                r(0.0, PI),
                r(-FRAC_PI_2, 3.0 * FRAC_PI_2),
            ],
        }
    }
}

impl JointLimits {
    /// Build limits from `[min, max]` pairs. Exactly six pairs are required.
    pub fn from_pairs(pairs: &[[f64; 2]]) -> Result<Self> {
        if pairs.len() != NUM_JOINTS {
            return Err(IkError::InvalidParameter(format!(
                "expected {NUM_JOINTS} joint limits, found {}",
                pairs.len()
            )));
        }
        let mut ranges = JointLimits::default().ranges;
        for (i, [min, max]) in pairs.iter().enumerate() {
            ranges[i] = JointRange::new(*min, *max)
                .map_err(|e| IkError::InvalidParameter(format!("joint {i}: {e}")))?;
        }
        Ok(Self { ranges })
    }

    pub fn to_pairs(&self) -> Vec<[f64; 2]> {
        self.ranges.iter().map(|r| [r.min, r.max]).collect()
    }

    /// The range of joint `joint_id`. Panics if `joint_id >= NUM_JOINTS`.
    pub fn get(&self, joint_id: usize) -> &JointRange {
        &self.ranges[joint_id]
    }

    pub fn clamp(&self, joint_id: usize, angle: f64) -> f64 {
        self.ranges[joint_id].clamp(angle)
    }
}
