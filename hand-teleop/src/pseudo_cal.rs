//! Write a synthetic stereo calibration for testing without cameras.
use std::path::Path;

use hand_mvg::{pseudo_stereo_pair, write_projection_matrix_npy, CalibrationFileNames};

use crate::Result;

/// Two identical pinhole cameras looking along +Z, camera 1 displaced by
/// `baseline` along +X.
#[derive(Debug, Clone, PartialEq)]
pub struct PseudoCalibrationData {
    pub focal_length: f64,
    pub cx: f64,
    pub cy: f64,
    pub baseline: f64,
}

impl PseudoCalibrationData {
    /// Write both projection matrices as `.npy` files into `dir`.
    pub fn write_npy(&self, dir: &Path, names: &CalibrationFileNames) -> Result<()> {
        let (p0, p1) = pseudo_stereo_pair(self.focal_length, self.cx, self.cy, self.baseline);
        std::fs::create_dir_all(dir)?;
        write_projection_matrix_npy(dir.join(&names.camera_0), &p0)?;
        write_projection_matrix_npy(dir.join(&names.camera_1), &p1)?;
        Ok(())
    }
}

#[test]
fn test_pseudo_cal() -> eyre::Result<()> {
    use hand_mvg::{CalibrationStore, PixelPoint};

    let tempdir = tempfile::tempdir()?;
    let out_dir = tempdir.path().join("cal");
    let names = CalibrationFileNames::default();
    let pc = PseudoCalibrationData {
        focal_length: 1000.0,
        cx: 320.0,
        cy: 240.0,
        baseline: 10.0,
    };
    pc.write_npy(&out_dir, &names)?;

    let store = CalibrationStore::<f64>::load_dir(&out_dir, &names)?;
    let pt = store.triangulate(&PixelPoint::new(320.0, 240.0), &PixelPoint::new(300.0, 240.0))?;
    approx::assert_relative_eq!(pt.coords.z, 500.0, max_relative = 1e-6);
    Ok(())
}
