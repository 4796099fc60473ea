#![allow(non_snake_case)]

use nalgebra as na;
use nalgebra::core::Matrix4;
use nalgebra::RealField;

use crate::{MvgError, PixelPoint, PointWorldFrame, ProjectionMatrix, Result};

const SVD_MAX_ITERATIONS: usize = 1_000_000;

/// Relative singular value threshold below which the normal matrix is
/// considered to have more than one null direction.
///
/// For exact data the normal matrix `B = AᵀA` has one zero singular value.
/// When the second smallest one is also negligible relative to the largest,
/// the two viewing rays do not pin down a single point (coincident camera
/// centers or a landmark on the baseline).
pub const DEFAULT_DEGENERACY_RCOND: f64 = 1e-12;

/// A triangulated point with its distance, in pixels, to each observation
/// after reprojection.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangulatedPoint<R: RealField + Copy> {
    pub point: PointWorldFrame<R>,
    pub reproj_dists: [R; 2],
}

impl<R: RealField + Copy> TriangulatedPoint<R> {
    pub fn mean_reproj_dist(&self) -> R {
        (self.reproj_dists[0] + self.reproj_dists[1]) / na::convert(2.0)
    }
}

/// Recover a 3D point from one pixel observation in each camera.
///
/// Builds the 4×4 DLT system `A` with two rows per camera,
/// `v·P[2,:] − P[1,:]` and `P[0,:] − u·P[2,:]`, forms `B = AᵀA` and takes
/// the right-singular vector of the smallest singular value of `B` as the
/// homogeneous solution. There is no outlier rejection.
pub fn triangulate<R: RealField + Copy>(
    point0: &PixelPoint<R>,
    point1: &PixelPoint<R>,
    P0: &ProjectionMatrix<R>,
    P1: &ProjectionMatrix<R>,
) -> Result<PointWorldFrame<R>> {
    let mut A = Matrix4::<R>::zeros();
    for (i, (pt, pmat)) in [(point0, P0), (point1, P1)].into_iter().enumerate() {
        let P = pmat.matrix();
        let u = pt.coords.x;
        let v = pt.coords.y;
        A.set_row(2 * i, &(P.row(2) * v - P.row(1)));
        A.set_row(2 * i + 1, &(P.row(0) - P.row(2) * u));
    }

    if A.iter().any(|x| !x.is_finite()) {
        return Err(MvgError::NumericalDegeneracy {
            reason: "non-finite pixel coordinates",
        });
    }

    let B = A.transpose() * A;

    let svd = na::linalg::SVD::try_new(B, false, true, R::default_epsilon(), SVD_MAX_ITERATIONS)
        .ok_or(MvgError::NumericalDegeneracy {
            reason: "SVD did not converge",
        })?;
    let v_t = svd.v_t.ok_or(MvgError::NumericalDegeneracy {
        reason: "SVD did not return right-singular vectors",
    })?;

    // Sort ascending rather than relying on the ordering of the SVD output.
    let mut order: Vec<(usize, R)> = svd.singular_values.iter().copied().enumerate().collect();
    order.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    let (smallest_idx, _) = order[0];
    let second_smallest = order[1].1;
    let largest = order[3].1;

    if largest <= R::zero() {
        return Err(MvgError::NumericalDegeneracy {
            reason: "normal matrix is zero",
        });
    }
    if second_smallest / largest < na::convert(DEFAULT_DEGENERACY_RCOND) {
        return Err(MvgError::NumericalDegeneracy {
            reason: "viewing rays do not determine a unique point",
        });
    }

    let X = v_t.row(smallest_idx);
    let w = X[3];
    if w.abs() < na::convert(1e-12) {
        return Err(MvgError::NumericalDegeneracy {
            reason: "point at infinity",
        });
    }
    Ok(PointWorldFrame::new(X[0] / w, X[1] / w, X[2] / w))
}

/// Triangulate and report the reprojection distance in each camera.
pub fn triangulate_with_reprojection<R: RealField + Copy>(
    point0: &PixelPoint<R>,
    point1: &PixelPoint<R>,
    P0: &ProjectionMatrix<R>,
    P1: &ProjectionMatrix<R>,
) -> Result<TriangulatedPoint<R>> {
    let point = triangulate(point0, point1, P0, P1)?;
    let reproj_dists = [
        na::distance(&P0.project(&point).coords, &point0.coords),
        na::distance(&P1.project(&point).coords, &point1.coords),
    ];
    Ok(TriangulatedPoint {
        point,
        reproj_dists,
    })
}
