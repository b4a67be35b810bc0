//! RANSAC model fitting over 3d points.
//!
//! The loop samples minimal sets without replacement, scores every candidate
//! on the full point set and shrinks the number of iterations as the inlier
//! ratio of the best model grows. The winning model is refined on its
//! consensus set and kept only if the refinement does not lose inliers.

use glam::{DMat3, DMat4, DVec3, DVec4};
use rand::{rngs::StdRng, SeedableRng};

use crate::linalg::{covariance3, symmetric_eigen3};
use crate::GeometryError;

/// Parameters for RANSAC model fitting.
#[derive(Debug, Clone)]
pub struct RansacParams {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Distance threshold to classify a point as an inlier.
    pub distance_threshold: f64,
    /// Desired probability that at least one sample set is outlier-free.
    pub confidence: f64,
    /// Optional fixed seed for reproducible sampling.
    pub random_seed: Option<u64>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            distance_threshold: 0.005,
            confidence: 0.99,
            random_seed: None,
        }
    }
}

/// Result of a RANSAC fit.
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    /// Best model found.
    pub model: M,
    /// Indices of the inlier points.
    pub inliers: Vec<usize>,
}

impl<M> RansacResult<M> {
    /// Fraction of `total_points` that are inliers of the model.
    pub fn inlier_ratio(&self, total_points: usize) -> f64 {
        if total_points == 0 {
            return 0.0;
        }
        self.inliers.len() as f64 / total_points as f64
    }
}

/// A geometric model that can be estimated from a minimal sample of points.
pub trait RansacModel: Sized + Clone {
    /// Number of points in a minimal sample.
    const SAMPLE_SIZE: usize;

    /// Estimate the model from exactly `SAMPLE_SIZE` points.
    fn from_sample(sample: &[DVec3]) -> Option<Self>;

    /// Distance from `point` to the model surface.
    fn distance(&self, point: DVec3) -> f64;

    /// Re-estimate the model from all of its inliers.
    fn refine(&self, _inliers: &[DVec3]) -> Option<Self> {
        Some(self.clone())
    }
}

/// A plane `normal . p + d = 0` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal of the plane.
    pub normal: DVec3,
    /// Offset of the plane.
    pub d: f64,
}

impl Plane {
    /// Create a plane through `point` with the given normal.
    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Option<Self> {
        let normal = normal.try_normalize()?;
        Some(Self {
            normal,
            d: -normal.dot(point),
        })
    }

    /// Signed distance from `point` to the plane, positive on the normal side.
    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.d
    }

    /// The plane coefficients `[a, b, c, d]`.
    pub fn coefficients(&self) -> [f64; 4] {
        [self.normal.x, self.normal.y, self.normal.z, self.d]
    }

    /// The same plane with its normal flipped.
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            d: -self.d,
        }
    }

    /// Least-squares plane through a set of points.
    pub fn fit(points: &[DVec3]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        let mean = points.iter().copied().sum::<DVec3>() / points.len() as f64;
        let eig = symmetric_eigen3(&covariance3(points));
        Self::from_point_normal(mean, eig.vectors[0])
    }
}

impl RansacModel for Plane {
    const SAMPLE_SIZE: usize = 3;

    fn from_sample(sample: &[DVec3]) -> Option<Self> {
        let normal = (sample[1] - sample[0]).cross(sample[2] - sample[0]);
        Self::from_point_normal(sample[0], normal)
    }

    fn distance(&self, point: DVec3) -> f64 {
        self.signed_distance(point).abs()
    }

    fn refine(&self, inliers: &[DVec3]) -> Option<Self> {
        Self::fit(inliers)
    }
}

/// A sphere given by its center and radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center of the sphere.
    pub center: DVec3,
    /// Radius of the sphere.
    pub radius: f64,
}

impl Sphere {
    /// Algebraic least-squares sphere through a set of points.
    ///
    /// Solves `x² + y² + z² + D x + E y + F z + G = 0` in the least-squares sense.
    pub fn fit(points: &[DVec3]) -> Option<Self> {
        if points.len() < 4 {
            return None;
        }
        // center the data to keep the normal equations well conditioned
        let mean = points.iter().copied().sum::<DVec3>() / points.len() as f64;

        let mut ata = DMat4::ZERO;
        let mut atb = DVec4::ZERO;
        for p in points {
            let q = *p - mean;
            let a = DVec4::new(q.x, q.y, q.z, 1.0);
            let b = -q.length_squared();
            ata += DMat4::from_cols(a * a.x, a * a.y, a * a.z, a * a.w);
            atb += a * b;
        }
        if ata.determinant().abs() < f64::EPSILON {
            return None;
        }
        let sol = ata.inverse() * atb;
        let center = DVec3::new(-0.5 * sol.x, -0.5 * sol.y, -0.5 * sol.z);
        let r2 = center.length_squared() - sol.w;
        if !r2.is_finite() || r2 <= 0.0 {
            return None;
        }
        Some(Self {
            center: center + mean,
            radius: r2.sqrt(),
        })
    }
}

impl RansacModel for Sphere {
    const SAMPLE_SIZE: usize = 4;

    fn from_sample(sample: &[DVec3]) -> Option<Self> {
        // 2 (p_i - p_0) . c = |p_i|² - |p_0|², relative to p_0
        let rows = [
            sample[1] - sample[0],
            sample[2] - sample[0],
            sample[3] - sample[0],
        ];
        let a = DMat3::from_cols(rows[0] * 2.0, rows[1] * 2.0, rows[2] * 2.0).transpose();
        let scale = rows.iter().map(|r| 2.0 * r.length()).product::<f64>();
        let det = a.determinant();
        if scale <= 0.0 || det.abs() < 1e-6 * scale {
            return None;
        }
        let b = DVec3::new(
            rows[0].length_squared(),
            rows[1].length_squared(),
            rows[2].length_squared(),
        );
        let offset = a.inverse() * b;
        let radius = offset.length();
        radius.is_finite().then_some(Self {
            center: sample[0] + offset,
            radius,
        })
    }

    fn distance(&self, point: DVec3) -> f64 {
        ((point - self.center).length() - self.radius).abs()
    }

    fn refine(&self, inliers: &[DVec3]) -> Option<Self> {
        Self::fit(inliers)
    }
}

/// Fit a model with RANSAC, using point-to-model distance for scoring.
pub fn ransac<M: RansacModel>(
    points: &[[f64; 3]],
    params: &RansacParams,
) -> Result<RansacResult<M>, GeometryError> {
    ransac_filtered(points, params, |_| true)
}

/// Fit a model with RANSAC, discarding candidate models rejected by `is_valid`.
pub fn ransac_filtered<M: RansacModel>(
    points: &[[f64; 3]],
    params: &RansacParams,
    is_valid: impl Fn(&M) -> bool,
) -> Result<RansacResult<M>, GeometryError> {
    let pts = points
        .iter()
        .map(|p| DVec3::from_array(*p))
        .collect::<Vec<_>>();
    let threshold = params.distance_threshold;
    ransac_core(
        &pts,
        params,
        is_valid,
        |model: &M, i| model.distance(pts[i]) <= threshold,
    )
}

/// Fit a plane with RANSAC where an inlier must also agree with the plane orientation.
///
/// A point is an inlier when it lies within the distance threshold and the
/// absolute cosine between its normal and the plane normal is at least
/// `min_normal_cos`.
pub fn ransac_plane_with_normals(
    points: &[[f64; 3]],
    normals: &[[f64; 3]],
    params: &RansacParams,
    min_normal_cos: f64,
) -> Result<RansacResult<Plane>, GeometryError> {
    if points.len() != normals.len() {
        return Err(GeometryError::Degenerate(format!(
            "{} points but {} normals",
            points.len(),
            normals.len()
        )));
    }
    let pts = points
        .iter()
        .map(|p| DVec3::from_array(*p))
        .collect::<Vec<_>>();
    let nrm = normals
        .iter()
        .map(|n| DVec3::from_array(*n))
        .collect::<Vec<_>>();
    let threshold = params.distance_threshold;
    ransac_core(
        &pts,
        params,
        |_| true,
        |plane: &Plane, i| {
            plane.distance(pts[i]) <= threshold && plane.normal.dot(nrm[i]).abs() >= min_normal_cos
        },
    )
}

fn ransac_core<M: RansacModel>(
    points: &[DVec3],
    params: &RansacParams,
    is_valid: impl Fn(&M) -> bool,
    is_inlier: impl Fn(&M, usize) -> bool,
) -> Result<RansacResult<M>, GeometryError> {
    let n = points.len();
    let sample_size = M::SAMPLE_SIZE;
    if n < sample_size {
        return Err(GeometryError::InsufficientPoints {
            required: sample_size,
            actual: n,
        });
    }

    let mut rng: StdRng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let count_inliers = |model: &M| (0..n).filter(|&i| is_inlier(model, i)).collect::<Vec<_>>();

    let mut best: Option<RansacResult<M>> = None;
    let mut required_iters = params.max_iterations;
    let mut sample = Vec::with_capacity(sample_size);
    let mut iter = 0;

    while iter < required_iters {
        iter += 1;

        sample.clear();
        sample.extend(
            rand::seq::index::sample(&mut rng, n, sample_size)
                .iter()
                .map(|i| points[i]),
        );

        let Some(model) = M::from_sample(&sample) else {
            continue;
        };
        if !is_valid(&model) {
            continue;
        }

        let inliers = count_inliers(&model);
        let best_len = best.as_ref().map_or(0, |b| b.inliers.len());
        if inliers.len() > best_len {
            // shrink the number of iterations from the current inlier ratio
            let w = inliers.len() as f64 / n as f64;
            if w >= 1.0 {
                required_iters = iter;
            } else {
                let ws = w.powi(sample_size as i32);
                let log_conf = (1.0 - params.confidence).max(1e-12).ln();
                let log_denom = (1.0 - ws).ln();
                if log_denom.is_finite() && log_denom < 0.0 {
                    let est = (log_conf / log_denom).ceil();
                    if est.is_finite() && est > 0.0 {
                        required_iters = required_iters.min(est as usize).max(iter);
                    }
                }
            }
            best = Some(RansacResult { model, inliers });
        }
    }

    let Some(best) = best else {
        return Err(GeometryError::Degenerate(
            "no valid model could be estimated from the samples".into(),
        ));
    };

    let inlier_points = best.inliers.iter().map(|&i| points[i]).collect::<Vec<_>>();
    if let Some(refined) = best.model.refine(&inlier_points) {
        if is_valid(&refined) {
            let refined_inliers = count_inliers(&refined);
            if refined_inliers.len() >= best.inliers.len() {
                log::trace!(
                    "ransac refinement kept {} inliers after {iter} iterations",
                    refined_inliers.len()
                );
                return Ok(RansacResult {
                    model: refined,
                    inliers: refined_inliers,
                });
            }
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane_with_outliers() -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for i in 0..20 {
            for j in 0..20 {
                points.push([i as f64 * 0.01, 0.3, j as f64 * 0.01]);
            }
        }
        for k in 0..50 {
            let t = k as f64 * 0.013;
            points.push([t % 0.2, 0.3 + 0.05 + (t * 7.0) % 0.1, (t * 3.0) % 0.2]);
        }
        points
    }

    fn sphere_points(center: DVec3, radius: f64) -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        let n = 400;
        let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
        for i in 0..n {
            let y = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
            let r = (1.0 - y * y).sqrt();
            let theta = golden * i as f64;
            let p = center + DVec3::new(r * theta.cos(), y, r * theta.sin()) * radius;
            points.push(p.to_array());
        }
        points
    }

    #[test]
    fn test_ransac_plane() -> Result<(), GeometryError> {
        let points = plane_with_outliers();
        let params = RansacParams {
            distance_threshold: 0.002,
            random_seed: Some(7),
            ..Default::default()
        };
        let result = ransac::<Plane>(&points, &params)?;
        assert_eq!(result.inliers.len(), 400);
        assert_relative_eq!(result.model.normal.y.abs(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(
            result.model.distance(DVec3::new(0.5, 0.3, -2.0)),
            0.0,
            epsilon = 1e-9
        );
        Ok(())
    }

    #[test]
    fn test_ransac_sphere() -> Result<(), GeometryError> {
        let center = DVec3::new(0.1, -0.05, 0.6);
        let points = sphere_points(center, 0.035);
        let params = RansacParams {
            random_seed: Some(3),
            ..Default::default()
        };
        let result = ransac::<Sphere>(&points, &params)?;
        assert_eq!(result.inlier_ratio(points.len()), 1.0);
        assert_relative_eq!(result.model.radius, 0.035, epsilon = 1e-6);
        assert_relative_eq!(result.model.center.distance(center), 0.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_ransac_insufficient_points() {
        let points = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let result = ransac::<Plane>(&points, &RansacParams::default());
        assert!(matches!(
            result,
            Err(GeometryError::InsufficientPoints {
                required: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_ransac_reproducible_with_seed() -> Result<(), GeometryError> {
        let points = plane_with_outliers();
        let params = RansacParams {
            distance_threshold: 0.002,
            random_seed: Some(42),
            ..Default::default()
        };
        let a = ransac::<Plane>(&points, &params)?;
        let b = ransac::<Plane>(&points, &params)?;
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.model, b.model);
        Ok(())
    }

    #[test]
    fn test_plane_with_normals_rejects_disagreeing_normals() -> Result<(), GeometryError> {
        // a flat patch whose normals all point sideways cannot support a plane
        let mut points = Vec::new();
        let mut normals = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                points.push([i as f64 * 0.01, 0.0, j as f64 * 0.01]);
                normals.push([1.0, 0.0, 0.0]);
            }
        }
        let params = RansacParams {
            distance_threshold: 0.002,
            random_seed: Some(1),
            max_iterations: 50,
            ..Default::default()
        };
        let result = ransac_plane_with_normals(&points, &normals, &params, 0.96);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_sphere_fit_least_squares() {
        let center = DVec3::new(0.0, 0.2, 0.5);
        let points = sphere_points(center, 0.05)
            .into_iter()
            .map(DVec3::from_array)
            .collect::<Vec<_>>();
        let sphere = Sphere::fit(&points).expect("sphere fit");
        assert_relative_eq!(sphere.radius, 0.05, epsilon = 1e-9);
        assert_relative_eq!(sphere.center.distance(center), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_plane_helpers() {
        let plane = Plane::from_point_normal(DVec3::new(0.0, 1.0, 0.0), DVec3::new(0.0, 2.0, 0.0))
            .expect("plane");
        assert_eq!(plane.coefficients(), [0.0, 1.0, 0.0, -1.0]);
        assert_relative_eq!(plane.signed_distance(DVec3::new(0.0, 3.0, 0.0)), 2.0);
        assert_relative_eq!(plane.flipped().signed_distance(DVec3::new(0.0, 3.0, 0.0)), -2.0);
    }
}
