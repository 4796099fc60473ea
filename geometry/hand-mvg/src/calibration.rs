use std::path::{Path, PathBuf};

use nalgebra as na;
use nalgebra::core::dimension::{U3, U4};
use nalgebra::core::{Matrix3, OMatrix, Vector3};
use nalgebra::RealField;
use serde::{Deserialize, Serialize};

use crate::{npy, triangulate, MvgError, PixelPoint, PointWorldFrame, Result};

/// Identifies one of the two cameras of the stereo rig.
///
/// Camera 0 defines the calibration reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CameraId {
    Camera0,
    Camera1,
}

impl CameraId {
    pub const BOTH: [CameraId; 2] = [CameraId::Camera0, CameraId::Camera1];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            CameraId::Camera0 => 0,
            CameraId::Camera1 => 1,
        }
    }
}

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "camera {}", self.index())
    }
}

/// A 3×4 camera projection matrix `P = K[R|t]`.
///
/// Maps homogeneous world coordinates `[X Y Z 1]ᵀ` to homogeneous pixel
/// coordinates `s[u v 1]ᵀ`. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionMatrix<R: RealField + Copy> {
    m: OMatrix<R, U3, U4>,
}

impl<R: RealField + Copy> ProjectionMatrix<R> {
    /// Wrap a 3×4 matrix. All entries must be finite.
    pub fn new(m: OMatrix<R, U3, U4>) -> Result<Self> {
        if m.iter().any(|v| !v.is_finite()) {
            return Err(MvgError::NonFiniteMatrix);
        }
        Ok(Self { m })
    }

    /// Build from 12 values in row-major order.
    pub fn from_row_slice(data: &[R]) -> Result<Self> {
        if data.len() != 12 {
            return Err(MvgError::InvalidShape {
                expected: "12 values".into(),
                found: format!("{} values", data.len()),
            });
        }
        Self::new(OMatrix::<R, U3, U4>::from_row_slice(data))
    }

    /// Build `K[I|-C]` for a pinhole camera without skew whose axes are
    /// aligned with the world frame and whose center is at `camcenter`.
    pub fn from_pinhole(focal_length: R, cx: R, cy: R, camcenter: Vector3<R>) -> Self {
        let zero = R::zero();
        let one = R::one();
        #[rustfmt::skip]
        let k = Matrix3::new(
            focal_length, zero, cx,
            zero, focal_length, cy,
            zero, zero, one,
        );
        let mut rt = OMatrix::<R, U3, U4>::zeros();
        rt.fixed_view_mut::<3, 3>(0, 0).fill_with_identity();
        rt.set_column(3, &(-camcenter));
        Self { m: k * rt }
    }

    #[inline]
    pub fn matrix(&self) -> &OMatrix<R, U3, U4> {
        &self.m
    }

    /// Project a world point to pixel coordinates.
    pub fn project(&self, pt: &PointWorldFrame<R>) -> PixelPoint<R> {
        let cc = self.m * pt.coords.to_homogeneous();
        PixelPoint::new(cc[0] / cc[2], cc[1] / cc[2])
    }
}

/// Make a synthetic rig of two identical pinhole cameras looking down +Z.
///
/// Camera 0 sits at the origin and camera 1 is translated by `baseline`
/// along +X.
pub fn pseudo_stereo_pair<R: RealField + Copy>(
    focal_length: R,
    cx: R,
    cy: R,
    baseline: R,
) -> (ProjectionMatrix<R>, ProjectionMatrix<R>) {
    let p0 = ProjectionMatrix::from_pinhole(focal_length, cx, cy, Vector3::zeros());
    let p1 = ProjectionMatrix::from_pinhole(focal_length, cx, cy, Vector3::x() * baseline);
    (p0, p1)
}

/// File names of the two persisted projection matrices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationFileNames {
    pub camera_0: PathBuf,
    pub camera_1: PathBuf,
}

impl Default for CalibrationFileNames {
    fn default() -> Self {
        Self {
            camera_0: "P_0.npy".into(),
            camera_1: "P_1.npy".into(),
        }
    }
}

impl CalibrationFileNames {
    fn get(&self, cam: CameraId) -> &Path {
        match cam {
            CameraId::Camera0 => &self.camera_0,
            CameraId::Camera1 => &self.camera_1,
        }
    }
}

/// Projection matrices of the stereo rig, loaded once at startup.
///
/// Either slot may be empty. Triangulation fails with
/// [`MvgError::CalibrationMissing`] until both are present.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStore<R: RealField + Copy> {
    pmats: [Option<ProjectionMatrix<R>>; 2],
}

impl<R: RealField + Copy> Default for CalibrationStore<R> {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl<R: RealField + Copy> CalibrationStore<R> {
    pub fn new(camera_0: Option<ProjectionMatrix<R>>, camera_1: Option<ProjectionMatrix<R>>) -> Self {
        Self {
            pmats: [camera_0, camera_1],
        }
    }

    pub fn from_pair(camera_0: ProjectionMatrix<R>, camera_1: ProjectionMatrix<R>) -> Self {
        Self::new(Some(camera_0), Some(camera_1))
    }

    /// Load both projection matrices from `dir`.
    ///
    /// A file that does not exist leaves its slot empty. A file that exists
    /// but cannot be parsed is an error.
    pub fn load_dir<P: AsRef<Path>>(dir: P, names: &CalibrationFileNames) -> Result<Self> {
        let dir = dir.as_ref();
        let mut store = Self::default();
        for cam in CameraId::BOTH {
            let path = dir.join(names.get(cam));
            if !path.exists() {
                tracing::warn!(
                    "Projection matrix for {cam} not found at \"{}\".",
                    path.display()
                );
                continue;
            }
            let pmat = read_projection_matrix(&path)?;
            tracing::debug!("Loaded projection matrix for {cam} from \"{}\".", path.display());
            store.pmats[cam.index()] = Some(pmat);
        }
        Ok(store)
    }

    #[inline]
    pub fn get(&self, cam: CameraId) -> Option<&ProjectionMatrix<R>> {
        self.pmats[cam.index()].as_ref()
    }

    #[inline]
    pub fn camera_0(&self) -> Option<&ProjectionMatrix<R>> {
        self.get(CameraId::Camera0)
    }

    #[inline]
    pub fn camera_1(&self) -> Option<&ProjectionMatrix<R>> {
        self.get(CameraId::Camera1)
    }

    /// True when both projection matrices are present.
    pub fn is_complete(&self) -> bool {
        self.pmats.iter().all(Option::is_some)
    }

    /// Both projection matrices, or the first missing camera.
    pub fn pair(&self) -> Result<(&ProjectionMatrix<R>, &ProjectionMatrix<R>)> {
        let p0 = self
            .camera_0()
            .ok_or(MvgError::CalibrationMissing(CameraId::Camera0))?;
        let p1 = self
            .camera_1()
            .ok_or(MvgError::CalibrationMissing(CameraId::Camera1))?;
        Ok((p0, p1))
    }

    /// Triangulate one landmark seen as `point0` by camera 0 and `point1` by
    /// camera 1.
    pub fn triangulate(
        &self,
        point0: &PixelPoint<R>,
        point1: &PixelPoint<R>,
    ) -> Result<PointWorldFrame<R>> {
        let (p0, p1) = self.pair()?;
        triangulate(point0, point1, p0, p1)
    }
}

/// Write a projection matrix as a `(3, 4)` little-endian `f8` `.npy` file.
pub fn write_projection_matrix_npy<P: AsRef<Path>>(
    path: P,
    pmat: &ProjectionMatrix<f64>,
) -> Result<()> {
    let data: Vec<f64> = pmat.matrix().transpose().iter().copied().collect();
    let f = std::fs::File::create(path)?;
    let mut wtr = std::io::BufWriter::new(f);
    npy::write_f64(&mut wtr, &[3, 4], &data)?;
    Ok(())
}

/// Read a projection matrix from a `.npy`, `.json`, `.yaml` or `.yml` file.
///
/// JSON and YAML files hold a 3×4 array of rows.
pub fn read_projection_matrix<R: RealField + Copy, P: AsRef<Path>>(
    path: P,
) -> Result<ProjectionMatrix<R>> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let row_major: Vec<f64> = match ext.as_str() {
        "npy" => {
            let rdr = std::io::BufReader::new(std::fs::File::open(path)?);
            let arr = npy::read_f64(rdr)?;
            if arr.shape != [3, 4] {
                return Err(MvgError::InvalidShape {
                    expected: "(3, 4)".into(),
                    found: format!("{:?}", arr.shape),
                });
            }
            arr.into_row_major()
        }
        "json" => {
            let rdr = std::io::BufReader::new(std::fs::File::open(path)?);
            let rows: Vec<Vec<f64>> = serde_json::from_reader(rdr)?;
            flatten_rows(rows)?
        }
        "yaml" | "yml" => {
            let rdr = std::io::BufReader::new(std::fs::File::open(path)?);
            let rows: Vec<Vec<f64>> = serde_yaml::from_reader(rdr)?;
            flatten_rows(rows)?
        }
        _ => return Err(MvgError::UnknownFileFormat(path.display().to_string())),
    };
    let data: Vec<R> = row_major.into_iter().map(na::convert).collect();
    ProjectionMatrix::from_row_slice(&data)
}

fn flatten_rows(rows: Vec<Vec<f64>>) -> Result<Vec<f64>> {
    let ncols: Vec<usize> = rows.iter().map(Vec::len).collect();
    if rows.len() != 3 || ncols.iter().any(|&n| n != 4) {
        return Err(MvgError::InvalidShape {
            expected: "3 rows of 4 values".into(),
            found: format!("{} rows with lengths {ncols:?}", rows.len()),
        });
    }
    Ok(rows.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_missing_camera_is_reported() {
        let (p0, _) = pseudo_stereo_pair(1000.0, 320.0, 240.0, 10.0);
        let store = CalibrationStore::new(Some(p0), None);
        assert!(!store.is_complete());
        let px = PixelPoint::new(320.0, 240.0);
        match store.triangulate(&px, &px) {
            Err(MvgError::CalibrationMissing(CameraId::Camera1)) => {}
            other => panic!("unexpected result {other:?}"),
        }

        let empty = CalibrationStore::<f64>::default();
        match empty.pair() {
            Err(MvgError::CalibrationMissing(CameraId::Camera0)) => {}
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_pinhole_projection() {
        let (_, p1) = pseudo_stereo_pair(1000.0, 320.0, 240.0, 10.0);
        let px = p1.project(&PointWorldFrame {
            coords: Point3::new(0.0, 0.0, 500.0),
        });
        approx::assert_relative_eq!(px.coords.x, 300.0, epsilon = 1e-10);
        approx::assert_relative_eq!(px.coords.y, 240.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rejects_non_finite() {
        let mut data = [0.0; 12];
        data[5] = f64::NAN;
        assert!(matches!(
            ProjectionMatrix::from_row_slice(&data),
            Err(MvgError::NonFiniteMatrix)
        ));
        assert!(matches!(
            ProjectionMatrix::<f64>::from_row_slice(&data[..11]),
            Err(MvgError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_file_roundtrip() -> eyre::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let (p0, p1) = pseudo_stereo_pair(800.0, 320.0, 240.0, 60.0);
        write_projection_matrix_npy(tempdir.path().join("P_0.npy"), &p0)?;

        let rows: Vec<Vec<f64>> = p1
            .matrix()
            .row_iter()
            .map(|r| r.iter().copied().collect())
            .collect();
        std::fs::write(tempdir.path().join("P_1.yaml"), serde_yaml::to_string(&rows)?)?;

        let names = CalibrationFileNames {
            camera_0: "P_0.npy".into(),
            camera_1: "P_1.yaml".into(),
        };
        let store = CalibrationStore::<f64>::load_dir(tempdir.path(), &names)?;
        assert_eq!(store.camera_0(), Some(&p0));
        assert_eq!(store.camera_1(), Some(&p1));
        Ok(())
    }

    #[test]
    fn test_load_dir_without_files() -> eyre::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let store = CalibrationStore::<f64>::load_dir(tempdir.path(), &Default::default())?;
        assert!(store.camera_0().is_none());
        assert!(store.camera_1().is_none());
        Ok(())
    }

    #[test]
    fn test_bad_json_shape() -> eyre::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("P.json");
        std::fs::write(&path, "[[1,2,3,4],[5,6,7,8]]")?;
        let result = read_projection_matrix::<f64, _>(&path);
        assert!(matches!(result, Err(MvgError::InvalidShape { .. })));
        Ok(())
    }
}
