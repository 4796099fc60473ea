use nalgebra as na;
use nalgebra::RealField;

use crate::{
    CalibrationStore, HandKeypoints, HandLandmark, MvgError, PointWorldFrame, Result,
    NUM_HAND_LANDMARKS,
};

/// Landmarks without which no pose can be computed.
pub const REQUIRED_LANDMARKS: [HandLandmark; 4] = [
    HandLandmark::Wrist,
    HandLandmark::IndexMcp,
    HandLandmark::MiddleMcp,
    HandLandmark::PinkyMcp,
];

/// Map an angle into the interval (−π, π].
///
/// Non-finite input is returned unchanged.
pub fn wrap_angle<R: RealField + Copy>(angle: R) -> R {
    if !angle.is_finite() {
        return angle;
    }
    let pi = R::pi();
    let two_pi = R::two_pi();
    // `%` is exact, so this is in (−2π, 2π) for any finite input.
    let a = angle % two_pi;
    if a > pi {
        a - two_pi
    } else if a <= -pi {
        a + two_pi
    } else {
        a
    }
}

/// Orientation of the palm, in radians, each in (−π, π].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandOrientation<R: RealField + Copy> {
    /// In-image rotation of the wrist to middle finger base vector, measured
    /// in camera 0 pixels.
    pub twist: R,
    /// Depth versus lateral angle of the index base to pinky base vector.
    pub tilt_1: R,
    /// Depth versus vertical angle of the palm axis.
    pub tilt_2: R,
}

impl<R: RealField + Copy> std::fmt::Display for HandOrientation<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let deg = |x: R| x * na::convert(180.0 / std::f64::consts::PI);
        write!(
            f,
            "twist {:.1}°, tilt_1 {:.1}°, tilt_2 {:.1}°",
            deg(self.twist),
            deg(self.tilt_1),
            deg(self.tilt_2)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandPose<R: RealField + Copy> {
    /// Midpoint of the wrist and the middle finger base.
    pub position: PointWorldFrame<R>,
    pub orientation: HandOrientation<R>,
}

/// Triangulated landmarks; `None` where triangulation failed.
#[derive(Debug, Clone, PartialEq)]
pub struct HandSkeleton<R: RealField + Copy> {
    points: Vec<Option<PointWorldFrame<R>>>,
}

impl<R: RealField + Copy> HandSkeleton<R> {
    pub fn get(&self, landmark: HandLandmark) -> Option<&PointWorldFrame<R>> {
        self.points[landmark.index()].as_ref()
    }

    fn required(&self, landmark: HandLandmark) -> Result<&PointWorldFrame<R>> {
        self.get(landmark)
            .ok_or(MvgError::IncompleteSkeleton(landmark))
    }

    pub fn num_valid(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }
}

/// Turns a pair of per-camera keypoint sets into a [`HandPose`].
#[derive(Debug, Clone)]
pub struct HandPoseEstimator<R: RealField + Copy> {
    store: CalibrationStore<R>,
}

impl<R: RealField + Copy> HandPoseEstimator<R> {
    pub fn new(store: CalibrationStore<R>) -> Self {
        Self { store }
    }

    pub fn calibration(&self) -> &CalibrationStore<R> {
        &self.store
    }

    /// Triangulate every landmark independently.
    ///
    /// Fails only when calibration is missing. Landmarks that cannot be
    /// triangulated are left empty.
    pub fn triangulate_skeleton(
        &self,
        cam0: &HandKeypoints<R>,
        cam1: &HandKeypoints<R>,
    ) -> Result<HandSkeleton<R>> {
        let (p0, p1) = self.store.pair()?;
        let mut points = Vec::with_capacity(NUM_HAND_LANDMARKS);
        for landmark in HandLandmark::ALL {
            let pt = match crate::triangulate(cam0.get(landmark), cam1.get(landmark), p0, p1) {
                Ok(pt) => Some(pt),
                Err(e) => {
                    tracing::trace!("{landmark:?} not triangulated: {e}");
                    None
                }
            };
            points.push(pt);
        }
        Ok(HandSkeleton { points })
    }

    /// Compute the hand pose.
    ///
    /// Returns [`MvgError::IncompleteSkeleton`] naming the first required
    /// landmark that could not be triangulated.
    pub fn estimate(&self, cam0: &HandKeypoints<R>, cam1: &HandKeypoints<R>) -> Result<HandPose<R>> {
        let skeleton = self.triangulate_skeleton(cam0, cam1)?;
        let wrist = skeleton.required(HandLandmark::Wrist)?;
        let index_base = skeleton.required(HandLandmark::IndexMcp)?;
        let middle_base = skeleton.required(HandLandmark::MiddleMcp)?;
        let pinky_base = skeleton.required(HandLandmark::PinkyMcp)?;

        let position = wrist.midpoint(middle_base);

        let w_px = cam0.get(HandLandmark::Wrist).coords;
        let m_px = cam0.get(HandLandmark::MiddleMcp).coords;
        let twist = (m_px.y - w_px.y).atan2(m_px.x - w_px.x);

        let across = pinky_base.coords - index_base.coords;
        let tilt_1 = across.z.atan2(across.x);

        let knuckles = index_base.midpoint(pinky_base);
        let palm_axis = knuckles.coords - wrist.coords;
        let tilt_2 = palm_axis.z.atan2(palm_axis.y);

        Ok(HandPose {
            position,
            orientation: HandOrientation {
                twist: wrap_angle(twist),
                tilt_1: wrap_angle(tilt_1),
                tilt_2: wrap_angle(tilt_2),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(PI), PI);
        assert_relative_eq!(wrap_angle(-PI), PI);
        assert_relative_eq!(wrap_angle(3.0 * PI / 2.0), -PI / 2.0);
        assert_relative_eq!(wrap_angle(-5.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(0.25), 0.25);
        assert!(wrap_angle(f64::NAN).is_nan());
        assert_eq!(wrap_angle(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn test_wrap_huge_angle() {
        for angle in [1e17, -1e17, 2.0f64.powi(60), 123456789.0] {
            let a = wrap_angle(angle);
            assert!(a > -PI && a <= PI, "{angle} wrapped to {a}");
        }
        assert_relative_eq!(wrap_angle(1000.0 * PI + 0.5), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_calibration_short_circuits() {
        let estimator = HandPoseEstimator::<f64>::new(CalibrationStore::default());
        let kp = HandKeypoints::from_pixels(vec![crate::PixelPoint::new(1.0, 2.0); 21]).unwrap();
        assert!(matches!(
            estimator.estimate(&kp, &kp),
            Err(MvgError::CalibrationMissing(_))
        ));
    }

    #[test]
    fn test_orientation_display_in_degrees() {
        let o = HandOrientation {
            twist: PI / 2.0,
            tilt_1: 0.0,
            tilt_2: -PI / 4.0,
        };
        assert_eq!(o.to_string(), "twist 90.0°, tilt_1 0.0°, tilt_2 -45.0°");
    }
}
