//! Closed-form inverse kinematics for a six joint arm.
//!
//! The first three joints (base yaw, shoulder, elbow) position the wrist
//! center. The last three form a spherical wrist which orients the end
//! effector. Targets are clamped into a box-shaped [`Workspace`] before any
//! trigonometry, and every emitted [`ArmConfiguration`] lies inside its
//! [`JointLimits`].
//!
//! All angles are radians.
#![deny(rust_2018_idioms)]

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IkError {
    #[error("target out of reach (elbow cosine {cos_elbow})")]
    UnreachableTarget { cos_elbow: f64 },
    #[error("numerical degeneracy: {reason}")]
    NumericalDegeneracy { reason: &'static str },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<M> = std::result::Result<M, IkError>;

mod limits;
pub use crate::limits::{JointLimits, JointRange, NUM_JOINTS};

mod workspace;
pub use crate::workspace::{TargetFrame, Workspace};

mod solver;
pub use crate::solver::{
    decompose_wrist, positioning_rotation, wrist_rotation, ArmConfiguration, ArmGeometry, ArmMode,
    IkSolution, IkSolver, IkTarget, JointOffsets, WristOrientation, ACOS_DOMAIN_TOLERANCE,
    ELBOW_JOINT_OFFSET, GIMBAL_LOCK_EPSILON, MECHANICAL_RANGE, SHOULDER_JOINT_OFFSET,
    TARGET_PITCH_OFFSET, WRIST_ROLL_JOINT_OFFSET,
};
