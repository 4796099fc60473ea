//! Stereo geometry for tracking a hand with two calibrated cameras.
//!
//! This crate holds the projection matrices of a two-camera rig, recovers 3D
//! points from corresponding pixel coordinates by Direct Linear Transform
//! (DLT) triangulation and reduces a triangulated 21-point hand skeleton to a
//! single [`HandPose`] (palm position plus three orientation angles).
//!
//! ## Core Types
//!
//! - [`ProjectionMatrix`]: 3×4 camera matrix mapping homogeneous world
//!   coordinates to homogeneous pixel coordinates
//! - [`CalibrationStore`]: the two projection matrices of the rig, either of
//!   which may be absent
//! - [`PixelPoint`], [`PointWorldFrame`]: 2D pixel and 3D point types
//! - [`HandDetection`], [`HandKeypoints`]: per-camera landmark observations
//! - [`HandPoseEstimator`], [`HandPose`]: skeleton triangulation and pose
//!
//! ## Coordinate Systems
//!
//! - **World Frame**: the calibration reference frame, which is the frame of
//!   camera 0
//! - **Pixel Coordinates**: 2D image coordinates, origin top-left, X→right,
//!   Y→down
//!
//! ## Example
//!
//! Project a point into both cameras of a synthetic rig and triangulate it
//! back.
//!
//! ```rust
//! use hand_mvg::{pseudo_stereo_pair, CalibrationStore, PointWorldFrame};
//! use nalgebra::Point3;
//!
//! let (p0, p1) = pseudo_stereo_pair(1000.0, 320.0, 240.0, 10.0);
//! let store = CalibrationStore::from_pair(p0, p1);
//!
//! let original = PointWorldFrame { coords: Point3::new(1.0, -2.0, 300.0) };
//! let px0 = store.camera_0().unwrap().project(&original);
//! let px1 = store.camera_1().unwrap().project(&original);
//!
//! let recovered = store.triangulate(&px0, &px1)?;
//! assert!((recovered.coords - original.coords).norm() < 1e-3);
//! # Ok::<(), hand_mvg::MvgError>(())
//! ```
#![deny(rust_2018_idioms)]
use thiserror::Error;

use nalgebra::geometry::{Point2, Point3};
use nalgebra::RealField;

#[derive(Error, Debug)]
pub enum MvgError {
    #[error("no projection matrix loaded for {0}")]
    CalibrationMissing(CameraId),
    #[error("numerical degeneracy: {reason}")]
    NumericalDegeneracy { reason: &'static str },
    #[error("landmark {0:?} could not be triangulated")]
    IncompleteSkeleton(HandLandmark),
    #[error("invalid shape: expected {expected}, found {found}")]
    InvalidShape { expected: String, found: String },
    #[error("projection matrix contains non-finite values")]
    NonFiniteMatrix,
    #[error("unsupported .npy file: {0}")]
    NpyFormat(String),
    #[error("unknown calibration file format: {0}")]
    UnknownFileFormat(String),
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("serde_yaml error: {source}")]
    SerdeYaml {
        #[from]
        source: serde_yaml::Error,
    },
    #[error("serde_json error: {source}")]
    SerdeJson {
        #[from]
        source: serde_json::Error,
    },
}

pub type Result<M> = std::result::Result<M, MvgError>;

pub mod npy;

mod calibration;
pub use crate::calibration::{
    pseudo_stereo_pair, read_projection_matrix, write_projection_matrix_npy, CalibrationFileNames,
    CalibrationStore, CameraId, ProjectionMatrix,
};

mod triangulate;
pub use crate::triangulate::{
    triangulate, triangulate_with_reprojection, TriangulatedPoint, DEFAULT_DEGENERACY_RCOND,
};

mod landmarks;
pub use crate::landmarks::{
    HandDetection, HandKeypoints, HandLandmark, Handedness, NUM_HAND_LANDMARKS,
};

mod hand_pose;
pub use crate::hand_pose::{
    wrap_angle, HandOrientation, HandPose, HandPoseEstimator, HandSkeleton, REQUIRED_LANDMARKS,
};

/// A 2D image coordinate in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint<R: RealField + Copy> {
    pub coords: Point2<R>,
}

impl<R: RealField + Copy> PixelPoint<R> {
    pub fn new(u: R, v: R) -> Self {
        Self {
            coords: Point2::new(u, v),
        }
    }
}

/// A 3D point in the calibration reference frame (the frame of camera 0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointWorldFrame<R: RealField + Copy> {
    pub coords: Point3<R>,
}

impl<R: RealField + Copy> PointWorldFrame<R> {
    pub fn new(x: R, y: R, z: R) -> Self {
        Self {
            coords: Point3::new(x, y, z),
        }
    }

    /// The point halfway between `self` and `other`.
    pub fn midpoint(&self, other: &Self) -> Self {
        Self {
            coords: nalgebra::center(&self.coords, &other.coords),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    pub(crate) fn get_test_store() -> CalibrationStore<f64> {
        let (p0, p1) = pseudo_stereo_pair(1000.0, 320.0, 240.0, 10.0);
        CalibrationStore::from_pair(p0, p1)
    }

    #[test]
    fn test_midpoint() {
        let a = PointWorldFrame::new(0.0, 2.0, 4.0);
        let b = PointWorldFrame::new(2.0, 4.0, 8.0);
        assert_eq!(a.midpoint(&b), PointWorldFrame::new(1.0, 3.0, 6.0));
    }
}
