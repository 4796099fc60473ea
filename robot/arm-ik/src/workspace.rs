use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::{IkError, Result};

/// Default value for [Workspace::x_max].
pub const DEFAULT_X_MAX: f64 = 25.0;
/// Default value for [Workspace::y_max].
pub const DEFAULT_Y_MAX: f64 = 25.0;
/// Default value for [Workspace::z_base].
pub const DEFAULT_Z_BASE: f64 = 5.0;
/// Default value for [Workspace::z_max].
pub const DEFAULT_Z_MAX: f64 = 25.0;

fn default_x_max() -> f64 {
    DEFAULT_X_MAX
}
fn default_y_max() -> f64 {
    DEFAULT_Y_MAX
}
fn default_z_base() -> f64 {
    DEFAULT_Z_BASE
}
fn default_z_max() -> f64 {
    DEFAULT_Z_MAX
}
fn default_x_reach() -> f64 {
    25.0
}
fn default_camera_height() -> f64 {
    30.0
}
fn default_scale() -> f64 {
    1.0
}

/// Box of targets the arm is commanded to, in the arm base frame.
///
/// `x ∈ [0, x_max]`, `y ∈ [−y_max, y_max]`, `z ∈ [z_base, z_base + z_max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Workspace {
    #[serde(default = "default_x_max")]
    pub x_max: f64,
    #[serde(default = "default_y_max")]
    pub y_max: f64,
    #[serde(default = "default_z_base")]
    pub z_base: f64,
    #[serde(default = "default_z_max")]
    pub z_max: f64,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            x_max: DEFAULT_X_MAX,
            y_max: DEFAULT_Y_MAX,
            z_base: DEFAULT_Z_BASE,
            z_max: DEFAULT_Z_MAX,
        }
    }
}

impl Workspace {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("x_max", self.x_max),
            ("y_max", self.y_max),
            ("z_base", self.z_base),
            ("z_max", self.z_max),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(IkError::InvalidParameter(format!(
                    "workspace {name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Clamp each coordinate into the box. Idempotent.
    pub fn clamp(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::new(
            p.x.max(0.0).min(self.x_max),
            p.y.max(-self.y_max).min(self.y_max),
            p.z.max(self.z_base).min(self.z_base + self.z_max),
        )
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0.0..=self.x_max).contains(&p.x)
            && (-self.y_max..=self.y_max).contains(&p.y)
            && (self.z_base..=self.z_base + self.z_max).contains(&p.z)
    }
}

/// Maps a point from the calibration frame (camera 0) into the arm base
/// frame.
///
/// `x_arm = x_reach − scale·y`, `y_arm = scale·x`, `z_arm = scale·z −
/// camera_height`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetFrame {
    #[serde(default = "default_x_reach")]
    pub x_reach: f64,
    #[serde(default = "default_camera_height")]
    pub camera_height: f64,
    /// Calibration units per arm unit.
    #[serde(default = "default_scale")]
    pub scale: f64,
}

impl Default for TargetFrame {
    fn default() -> Self {
        Self {
            x_reach: default_x_reach(),
            camera_height: default_camera_height(),
            scale: default_scale(),
        }
    }
}

impl TargetFrame {
    pub fn validate(&self) -> Result<()> {
        if !(self.x_reach.is_finite() && self.camera_height.is_finite()) {
            return Err(IkError::InvalidParameter(
                "target frame offsets must be finite".into(),
            ));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(IkError::InvalidParameter(format!(
                "target frame scale must be positive, got {}",
                self.scale
            )));
        }
        Ok(())
    }

    pub fn to_arm(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::new(
            self.x_reach - self.scale * p.y,
            self.scale * p.x,
            self.scale * p.z - self.camera_height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_maps_to_reach_limit() {
        let frame = TargetFrame::default();
        let ws = Workspace::default();
        let arm = frame.to_arm(&Point3::origin());
        assert_eq!(arm, Point3::new(25.0, 0.0, -30.0));
        assert_eq!(ws.clamp(&arm), Point3::new(25.0, 0.0, 5.0));
    }

    #[test]
    fn test_clamp_is_idempotent() {
        let ws = Workspace::default();
        for p in [
            Point3::new(-3.0, 40.0, 100.0),
            Point3::new(12.0, -7.0, 17.0),
            Point3::new(1e9, -1e9, -1e9),
            Point3::new(25.0, 25.0, 30.0),
        ] {
            let once = ws.clamp(&p);
            assert!(ws.contains(&once));
            assert_eq!(ws.clamp(&once), once);
        }
    }

    #[test]
    fn test_validate() {
        assert!(Workspace::default().validate().is_ok());
        let ws = Workspace {
            y_max: -1.0,
            ..Default::default()
        };
        assert!(ws.validate().is_err());
        let frame = TargetFrame {
            scale: 0.0,
            ..Default::default()
        };
        assert!(frame.validate().is_err());
    }
}
