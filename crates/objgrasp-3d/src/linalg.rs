use faer::Mat;
use glam::{DMat3, DVec3};

/// Eigen decomposition of a symmetric 3x3 matrix.
///
/// Eigenvalues are sorted in ascending order and `vectors[i]` is the unit
/// eigenvector associated with `values[i]`.
#[derive(Debug, Clone, Copy)]
pub struct SymmetricEigen3 {
    /// Eigenvalues in ascending order.
    pub values: [f64; 3],
    /// Unit eigenvectors, one per eigenvalue.
    pub vectors: [DVec3; 3],
}

/// Compute the covariance matrix of a set of 3d vectors.
///
/// The vectors are centered on their mean and the result is normalized by the
/// number of samples. Returns the zero matrix for an empty input.
///
/// Example:
///
/// ```
/// use glam::DVec3;
/// use objgrasp_3d::linalg::covariance3;
///
/// let cov = covariance3(&[DVec3::new(1.0, 0.0, 0.0), DVec3::new(-1.0, 0.0, 0.0)]);
/// assert_eq!(cov.x_axis.x, 1.0);
/// ```
pub fn covariance3(vectors: &[DVec3]) -> DMat3 {
    if vectors.is_empty() {
        return DMat3::ZERO;
    }
    let n = vectors.len() as f64;
    let mean = vectors.iter().copied().sum::<DVec3>() / n;

    let mut cov = DMat3::ZERO;
    for v in vectors {
        let d = *v - mean;
        // outer product d * d^T via column scaling
        cov += DMat3::from_cols(d * d.x, d * d.y, d * d.z);
    }
    cov * (1.0 / n)
}

/// Compute the covariance matrix of a set of points.
pub fn points_covariance(points: &[[f64; 3]]) -> DMat3 {
    let vectors = points
        .iter()
        .map(|p| DVec3::from_array(*p))
        .collect::<Vec<_>>();
    covariance3(&vectors)
}

/// Eigen decomposition of a symmetric 3x3 matrix.
///
/// The decomposition is delegated to faer; the eigenvalues are recomputed as
/// Rayleigh quotients of the returned eigenvectors so that values and vectors
/// always stay paired after sorting.
pub fn symmetric_eigen3(m: &DMat3) -> SymmetricEigen3 {
    let mat = Mat::<f64>::from_fn(3, 3, |i, j| m.col(j)[i]);
    let evd = mat.selfadjoint_eigendecomposition(faer::Side::Lower);
    let u = evd.u();

    let mut pairs = (0..3)
        .map(|j| {
            let v = DVec3::new(u.read(0, j), u.read(1, j), u.read(2, j)).normalize_or_zero();
            (v.dot(*m * v), v)
        })
        .collect::<Vec<_>>();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    SymmetricEigen3 {
        values: [pairs[0].0, pairs[1].0, pairs[2].0],
        vectors: [pairs[0].1, pairs[1].1, pairs[2].1],
    }
}

/// Build two unit vectors spanning the plane orthogonal to `axis`.
///
/// The returned pair together with `axis` forms a right-handed orthonormal basis.
pub fn orthonormal_basis(axis: DVec3) -> (DVec3, DVec3) {
    let axis = axis.normalize_or_zero();
    let helper = if axis.x.abs() < 0.9 {
        DVec3::X
    } else {
        DVec3::Y
    };
    let u = axis.cross(helper).normalize_or_zero();
    let v = axis.cross(u);
    (u, v)
}
