use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::{Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{IkError, JointLimits, Result, Workspace, NUM_JOINTS};

/// Shoulder and elbow angles are limited to ±`MECHANICAL_RANGE`.
pub const MECHANICAL_RANGE: f64 = 3.0 * PI / 4.0;

/// Added to the shoulder angle before it is emitted.
pub const SHOULDER_JOINT_OFFSET: f64 = -3.0 * PI / 4.0;
/// Added to the elbow angle before it is emitted.
pub const ELBOW_JOINT_OFFSET: f64 = 3.0 * PI / 4.0;
/// Added to the wrist roll angle before it is emitted.
pub const WRIST_ROLL_JOINT_OFFSET: f64 = FRAC_PI_2;
/// Pitch added to the target orientation so that `alpha = 0` points the
/// tool horizontally.
pub const TARGET_PITCH_OFFSET: f64 = FRAC_PI_2;

/// Below this, the wrist pitch is treated as 0 or π.
pub const GIMBAL_LOCK_EPSILON: f64 = 1e-9;
/// Elbow cosines this close outside [−1, 1] are rounding error.
pub const ACOS_DOMAIN_TOLERANCE: f64 = 1e-12;

fn default_link() -> f64 {
    20.0
}

/// Link constants of the positioning chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArmGeometry {
    /// Height of the shoulder above the base.
    #[serde(default = "default_link")]
    pub d1: f64,
    /// Upper arm length.
    #[serde(default = "default_link")]
    pub a2: f64,
    /// Forearm length, elbow to wrist center.
    #[serde(default = "default_link")]
    pub d4: f64,
}

impl Default for ArmGeometry {
    fn default() -> Self {
        Self {
            d1: default_link(),
            a2: default_link(),
            d4: default_link(),
        }
    }
}

impl ArmGeometry {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("d1", self.d1), ("a2", self.a2), ("d4", self.d4)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(IkError::InvalidParameter(format!(
                    "link length {name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Which joints are solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArmMode {
    /// Joints 0 to 2.
    #[default]
    Position,
    /// All six joints.
    PositionAndOrientation,
}

impl ArmMode {
    pub fn num_joints(self) -> usize {
        match self {
            ArmMode::Position => 3,
            ArmMode::PositionAndOrientation => NUM_JOINTS,
        }
    }
}

/// Constant angles added to each kinematic joint angle to obtain the angle
/// commanded to the actuator.
#[derive(Debug, Clone, PartialEq)]
pub struct JointOffsets {
    pub offsets: [f64; NUM_JOINTS],
}

impl Default for JointOffsets {
    fn default() -> Self {
        Self {
            offsets: [
                0.0,
                SHOULDER_JOINT_OFFSET,
                ELBOW_JOINT_OFFSET,
                0.0,
                0.0,
                WRIST_ROLL_JOINT_OFFSET,
            ],
        }
    }
}

/// Target orientation of the tool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WristOrientation {
    /// Pitch.
    pub alpha: f64,
    /// Roll.
    pub miu: f64,
    /// Yaw.
    pub phi: f64,
}

impl WristOrientation {
    /// `Rz(phi)·Ry(alpha + π/2)·Rx(miu)`
    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_axis_angle(&Vector3::z_axis(), self.phi)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), self.alpha + TARGET_PITCH_OFFSET)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), self.miu)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IkTarget {
    /// In the arm base frame, before workspace clamping.
    pub position: Point3<f64>,
    pub orientation: Option<WristOrientation>,
}

impl IkTarget {
    pub fn position(position: Point3<f64>) -> Self {
        Self {
            position,
            orientation: None,
        }
    }

    pub fn with_orientation(position: Point3<f64>, orientation: WristOrientation) -> Self {
        Self {
            position,
            orientation: Some(orientation),
        }
    }
}

/// Kinematic joint angles, before offsets and joint limits are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct IkSolution {
    /// Three or six angles.
    pub theta: Vec<f64>,
    /// The target after workspace clamping.
    pub clamped_target: Point3<f64>,
    /// Shoulder or elbow was limited to the mechanical range.
    pub saturated: bool,
    pub gimbal_lock: bool,
}

/// Joint angles ready to be commanded, each inside its joint limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmConfiguration {
    angles: Vec<f64>,
}

impl ArmConfiguration {
    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    pub fn to_degrees(&self) -> Vec<f64> {
        self.angles.iter().map(|a| a.to_degrees()).collect()
    }
}

/// Rotation of the wrist center frame given base, shoulder and elbow
/// angles: `Rz(θ0)·Ry(π/2 − (θ1 + θ2))`.
pub fn positioning_rotation(theta0: f64, theta1: f64, theta2: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), theta0)
        * Rotation3::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2 - (theta1 + theta2))
}

/// Rotation of the spherical wrist: `Rz(θ3)·Ry(θ4)·Rz(θ5)`.
pub fn wrist_rotation(theta3: f64, theta4: f64, theta5: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), theta3)
        * Rotation3::from_axis_angle(&Vector3::y_axis(), theta4)
        * Rotation3::from_axis_angle(&Vector3::z_axis(), theta5)
}

/// Recover the wrist angles `[θ3, θ4, θ5]` from the rotation the wrist must
/// produce. The flag is true at gimbal lock, where θ5 is fixed at zero and
/// the coupled rotation is carried by θ3.
pub fn decompose_wrist(r36: &Rotation3<f64>) -> ([f64; 3], bool) {
    let m = r36.matrix();
    let s4 = m[(0, 2)].hypot(m[(1, 2)]);
    if s4 < GIMBAL_LOCK_EPSILON {
        let theta4 = if m[(2, 2)] > 0.0 { 0.0 } else { PI };
        let theta3 = (-m[(0, 1)]).atan2(m[(1, 1)]);
        return ([theta3, theta4, 0.0], true);
    }
    let theta3 = m[(1, 2)].atan2(m[(0, 2)]);
    let theta4 = s4.atan2(m[(2, 2)]);
    let theta5 = m[(2, 1)].atan2(-m[(2, 0)]);
    ([theta3, theta4, theta5], false)
}

fn ensure_finite(theta: &[f64]) -> Result<()> {
    if theta.iter().all(|t| t.is_finite()) {
        Ok(())
    } else {
        Err(IkError::NumericalDegeneracy {
            reason: "non-finite joint angle",
        })
    }
}

fn clamp_mechanical(angle: f64) -> f64 {
    angle.max(-MECHANICAL_RANGE).min(MECHANICAL_RANGE)
}

/// Closed-form solver for the positioning chain and spherical wrist.
#[derive(Debug, Clone)]
pub struct IkSolver {
    geometry: ArmGeometry,
    workspace: Workspace,
    limits: JointLimits,
    offsets: JointOffsets,
}

impl IkSolver {
    pub fn new(geometry: ArmGeometry, workspace: Workspace, limits: JointLimits) -> Result<Self> {
        geometry.validate()?;
        workspace.validate()?;
        Ok(Self {
            geometry,
            workspace,
            limits,
            offsets: JointOffsets::default(),
        })
    }

    pub fn with_offsets(mut self, offsets: JointOffsets) -> Self {
        self.offsets = offsets;
        self
    }

    pub fn geometry(&self) -> &ArmGeometry {
        &self.geometry
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn limits(&self) -> &JointLimits {
        &self.limits
    }

    pub fn offsets(&self) -> &JointOffsets {
        &self.offsets
    }

    /// Solve base, shoulder and elbow (elbow down) for a wrist center
    /// position.
    pub fn solve_position(&self, target: &Point3<f64>) -> Result<IkSolution> {
        if !target.coords.iter().all(|v| v.is_finite()) {
            return Err(IkError::NumericalDegeneracy {
                reason: "non-finite target",
            });
        }
        let p = self.workspace.clamp(target);
        let ArmGeometry { d1, a2, d4 } = self.geometry;

        let theta0 = p.y.atan2(p.x);
        let r = p.x.hypot(p.y);
        let h = p.z - d1;

        let mut cos_elbow = (r * r + h * h - a2 * a2 - d4 * d4) / (2.0 * a2 * d4);
        if cos_elbow.abs() > 1.0 {
            if cos_elbow.abs() - 1.0 <= ACOS_DOMAIN_TOLERANCE {
                cos_elbow = cos_elbow.signum();
            } else {
                return Err(IkError::UnreachableTarget { cos_elbow });
            }
        }

        let theta2 = -cos_elbow.acos();
        let theta1 = h.atan2(r) - (d4 * theta2.sin()).atan2(a2 + d4 * theta2.cos());

        let theta1_clamped = clamp_mechanical(theta1);
        let theta2_clamped = clamp_mechanical(theta2);
        let saturated = theta1_clamped != theta1 || theta2_clamped != theta2;
        if saturated {
            debug!(
                "shoulder/elbow limited to mechanical range ({:.1}°, {:.1}°)",
                theta1.to_degrees(),
                theta2.to_degrees()
            );
        }

        let theta = vec![theta0, theta1_clamped, theta2_clamped];
        ensure_finite(&theta)?;
        Ok(IkSolution {
            theta,
            clamped_target: p,
            saturated,
            gimbal_lock: false,
        })
    }

    /// Solve all six joints for a position and a target rotation of the
    /// tool.
    pub fn solve_with_rotation(
        &self,
        position: &Point3<f64>,
        target_rotation: &Rotation3<f64>,
    ) -> Result<IkSolution> {
        let mut solution = self.solve_position(position)?;
        let r03 = positioning_rotation(solution.theta[0], solution.theta[1], solution.theta[2]);
        let r36 = r03.inverse() * target_rotation;
        let (wrist, gimbal_lock) = decompose_wrist(&r36);
        if gimbal_lock {
            debug!("wrist at gimbal lock, roll folded into joint 3");
        }
        solution.theta.extend_from_slice(&wrist);
        solution.gimbal_lock = gimbal_lock;
        ensure_finite(&solution.theta)?;
        Ok(solution)
    }

    pub fn solve(&self, target: &IkTarget) -> Result<IkSolution> {
        match &target.orientation {
            None => self.solve_position(&target.position),
            Some(o) => self.solve_with_rotation(&target.position, &o.rotation()),
        }
    }

    /// Apply joint offsets and clamp into the joint limits.
    pub fn emit(&self, solution: &IkSolution) -> ArmConfiguration {
        let angles = solution
            .theta
            .iter()
            .enumerate()
            .map(|(i, theta)| self.limits.clamp(i, theta + self.offsets.offsets[i]))
            .collect();
        ArmConfiguration { angles }
    }

    pub fn solve_configuration(&self, target: &IkTarget) -> Result<ArmConfiguration> {
        Ok(self.emit(&self.solve(target)?))
    }

    /// Wrist center position for kinematic angles `theta[0..3]`.
    pub fn forward_position(&self, theta: &[f64]) -> Result<Point3<f64>> {
        let [theta0, theta1, theta2] = match theta {
            [a, b, c, ..] => [*a, *b, *c],
            _ => {
                return Err(IkError::InvalidParameter(format!(
                    "need at least 3 angles, got {}",
                    theta.len()
                )))
            }
        };
        let ArmGeometry { d1, a2, d4 } = self.geometry;
        let r = a2 * theta1.cos() + d4 * (theta1 + theta2).cos();
        let z = d1 + a2 * theta1.sin() + d4 * (theta1 + theta2).sin();
        Ok(Point3::new(r * theta0.cos(), r * theta0.sin(), z))
    }

    /// Tool rotation for six kinematic angles.
    pub fn forward_rotation(&self, theta: &[f64]) -> Result<Rotation3<f64>> {
        match theta {
            [t0, t1, t2, t3, t4, t5] => {
                Ok(positioning_rotation(*t0, *t1, *t2) * wrist_rotation(*t3, *t4, *t5))
            }
            _ => Err(IkError::InvalidParameter(format!(
                "need {NUM_JOINTS} angles, got {}",
                theta.len()
            ))),
        }
    }
}
