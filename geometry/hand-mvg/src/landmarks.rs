use nalgebra as na;
use nalgebra::RealField;
use serde::{Deserialize, Serialize};

use crate::{MvgError, PixelPoint, Result};

pub const NUM_HAND_LANDMARKS: usize = 21;

/// The 21 hand landmarks, in the order a detector reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandLandmark {
    Wrist = 0,
    ThumbCmc = 1,
    ThumbMcp = 2,
    ThumbIp = 3,
    ThumbTip = 4,
    IndexMcp = 5,
    IndexPip = 6,
    IndexDip = 7,
    IndexTip = 8,
    MiddleMcp = 9,
    MiddlePip = 10,
    MiddleDip = 11,
    MiddleTip = 12,
    RingMcp = 13,
    RingPip = 14,
    RingDip = 15,
    RingTip = 16,
    PinkyMcp = 17,
    PinkyPip = 18,
    PinkyDip = 19,
    PinkyTip = 20,
}

impl HandLandmark {
    pub const ALL: [HandLandmark; NUM_HAND_LANDMARKS] = [
        HandLandmark::Wrist,
        HandLandmark::ThumbCmc,
        HandLandmark::ThumbMcp,
        HandLandmark::ThumbIp,
        HandLandmark::ThumbTip,
        HandLandmark::IndexMcp,
        HandLandmark::IndexPip,
        HandLandmark::IndexDip,
        HandLandmark::IndexTip,
        HandLandmark::MiddleMcp,
        HandLandmark::MiddlePip,
        HandLandmark::MiddleDip,
        HandLandmark::MiddleTip,
        HandLandmark::RingMcp,
        HandLandmark::RingPip,
        HandLandmark::RingDip,
        HandLandmark::RingTip,
        HandLandmark::PinkyMcp,
        HandLandmark::PinkyPip,
        HandLandmark::PinkyDip,
        HandLandmark::PinkyTip,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Which hand the detector believes it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// One camera's landmark detection for one frame.
///
/// Coordinates are normalized to the image size, so `(0, 0)` is the top left
/// corner and `(1, 1)` the bottom right. Detectors may report values slightly
/// outside this range for landmarks near the border; they are kept as is.
#[derive(Debug, Clone, PartialEq)]
pub struct HandDetection {
    landmarks: Vec<[f64; 2]>,
    handedness: Option<Handedness>,
}

impl HandDetection {
    pub fn from_normalized(
        landmarks: Vec<[f64; 2]>,
        handedness: Option<Handedness>,
    ) -> Result<Self> {
        if landmarks.len() != NUM_HAND_LANDMARKS {
            return Err(MvgError::InvalidShape {
                expected: format!("{NUM_HAND_LANDMARKS} landmarks"),
                found: format!("{} landmarks", landmarks.len()),
            });
        }
        Ok(Self {
            landmarks,
            handedness,
        })
    }

    pub fn normalized(&self, landmark: HandLandmark) -> [f64; 2] {
        self.landmarks[landmark.index()]
    }

    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }

    /// Scale the normalized coordinates to pixels of a `width`×`height` frame.
    pub fn to_pixels<R: RealField + Copy>(&self, width: u32, height: u32) -> HandKeypoints<R> {
        let w: R = na::convert(width as f64);
        let h: R = na::convert(height as f64);
        let pixels = self
            .landmarks
            .iter()
            .map(|[x, y]| {
                let x: R = na::convert(*x);
                let y: R = na::convert(*y);
                PixelPoint::new(x * w, y * h)
            })
            .collect();
        HandKeypoints { pixels }
    }
}

/// The 21 landmarks of one detection in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct HandKeypoints<R: RealField + Copy> {
    pixels: Vec<PixelPoint<R>>,
}

impl<R: RealField + Copy> HandKeypoints<R> {
    pub fn from_pixels(pixels: Vec<PixelPoint<R>>) -> Result<Self> {
        if pixels.len() != NUM_HAND_LANDMARKS {
            return Err(MvgError::InvalidShape {
                expected: format!("{NUM_HAND_LANDMARKS} landmarks"),
                found: format!("{} landmarks", pixels.len()),
            });
        }
        Ok(Self { pixels })
    }

    #[inline]
    pub fn get(&self, landmark: HandLandmark) -> &PixelPoint<R> {
        &self.pixels[landmark.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (HandLandmark, &PixelPoint<R>)> {
        HandLandmark::ALL.into_iter().zip(self.pixels.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_order() {
        for (i, lm) in HandLandmark::ALL.iter().enumerate() {
            assert_eq!(lm.index(), i);
        }
        assert_eq!(HandLandmark::MiddleMcp.index(), 9);
        assert_eq!(HandLandmark::PinkyMcp.index(), 17);
    }

    #[test]
    fn test_wrong_landmark_count() {
        let result = HandDetection::from_normalized(vec![[0.5, 0.5]; 20], None);
        assert!(matches!(result, Err(MvgError::InvalidShape { .. })));
    }

    #[test]
    fn test_to_pixels() {
        let mut landmarks = vec![[0.0, 0.0]; NUM_HAND_LANDMARKS];
        landmarks[HandLandmark::MiddleMcp.index()] = [0.5, 0.25];
        let det = HandDetection::from_normalized(landmarks, Some(Handedness::Right)).unwrap();
        let kp: HandKeypoints<f64> = det.to_pixels(640, 480);
        let px = kp.get(HandLandmark::MiddleMcp);
        approx::assert_relative_eq!(px.coords.x, 320.0);
        approx::assert_relative_eq!(px.coords.y, 120.0);
        assert_eq!(det.handedness(), Some(Handedness::Right));
        assert_eq!(kp.iter().count(), NUM_HAND_LANDMARKS);
    }
}
