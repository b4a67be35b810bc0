use glam::DVec3;
use objgrasp_3d::{
    linalg::{covariance3, symmetric_eigen3},
    neighbors::NeighborIndex,
};
use serde::Serialize;

use crate::config::CurvatureConfig;
use crate::error::AnalysisError;

/// Summary of the local surface flatness of an object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CurvatureProfile {
    /// Fraction of points classified as flat.
    pub flat_ratio: f64,
    /// Fraction of points classified as curved.
    pub curved_ratio: f64,
    /// Mean of the unfiltered curvature values.
    pub mean_curvature: f64,
}

/// Per-point curvature together with its summary.
#[derive(Debug, Clone)]
pub struct CurvatureEstimate {
    /// Median filtered curvature of every point.
    pub per_point: Vec<f64>,
    /// Flat and curved ratios derived from `per_point`.
    pub profile: CurvatureProfile,
}

/// Classify every point as flat or curved from the spread of nearby normals.
///
/// The raw curvature of a point is the smallest eigenvalue of the covariance
/// of the unit normals in its neighborhood (the point and its `k` nearest
/// neighbors). The raw values are then median filtered over the same
/// neighborhoods before thresholding.
///
/// # Errors
///
/// Returns [`AnalysisError::InsufficientData`] when fewer than `k + 1` points
/// are given and [`AnalysisError::MismatchedLengths`] when points and normals
/// are not aligned.
pub fn compute_profile(
    points: &[[f64; 3]],
    normals: &[[f64; 3]],
    config: &CurvatureConfig,
) -> Result<CurvatureEstimate, AnalysisError> {
    if points.len() != normals.len() {
        return Err(AnalysisError::MismatchedLengths {
            left_name: "points",
            left_len: points.len(),
            right_name: "normals",
            right_len: normals.len(),
        });
    }

    let neighborhood = config.neighbors + 1;
    if points.len() < neighborhood {
        return Err(AnalysisError::InsufficientData {
            required: neighborhood,
            actual: points.len(),
        });
    }

    let unit_normals = normals
        .iter()
        .map(|n| DVec3::from_array(*n).normalize_or_zero())
        .collect::<Vec<_>>();

    let index = NeighborIndex::new(points);
    let neighborhoods = points
        .iter()
        .map(|p| index.knn_indices(p, neighborhood))
        .collect::<Vec<_>>();

    let raw = neighborhoods
        .iter()
        .map(|nn| {
            let local = nn.iter().map(|&i| unit_normals[i]).collect::<Vec<_>>();
            symmetric_eigen3(&covariance3(&local)).values[0].max(0.0)
        })
        .collect::<Vec<_>>();

    let mut window = Vec::with_capacity(neighborhood);
    let per_point = neighborhoods
        .iter()
        .map(|nn| {
            window.clear();
            window.extend(nn.iter().map(|&i| raw[i]));
            median(&mut window)
        })
        .collect::<Vec<_>>();

    let n = points.len() as f64;
    let flat = per_point
        .iter()
        .filter(|&&c| c < config.flat_threshold)
        .count() as f64;
    let profile = CurvatureProfile {
        flat_ratio: flat / n,
        curved_ratio: 1.0 - flat / n,
        mean_curvature: raw.iter().sum::<f64>() / n,
    };

    log::debug!(
        "curvature profile: flat {:.3}, curved {:.3}, mean {:.5}",
        profile.flat_ratio,
        profile.curved_ratio,
        profile.mean_curvature
    );

    Ok(CurvatureEstimate { per_point, profile })
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane_grid(n: usize) -> (Vec<[f64; 3]>, Vec<[f64; 3]>) {
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                points.push([i as f64 * 0.005, 0.1, 0.5 + j as f64 * 0.005]);
            }
        }
        let normals = vec![[0.0, -1.0, 0.0]; points.len()];
        (points, normals)
    }

    #[test]
    fn test_flat_plane() -> Result<(), AnalysisError> {
        let (points, normals) = plane_grid(12);
        let estimate = compute_profile(&points, &normals, &CurvatureConfig::default())?;
        assert_eq!(estimate.per_point.len(), points.len());
        assert_relative_eq!(estimate.profile.flat_ratio, 1.0);
        assert_relative_eq!(estimate.profile.curved_ratio, 0.0);
        assert_relative_eq!(estimate.profile.mean_curvature, 0.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_scattered_normals_are_curved() -> Result<(), AnalysisError> {
        // normals cycling through all six axis directions spread in every direction
        let (points, _) = plane_grid(12);
        let axes = [
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, -1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, -1.0],
        ];
        let normals = (0..points.len()).map(|i| axes[i % 6]).collect::<Vec<_>>();
        let estimate = compute_profile(&points, &normals, &CurvatureConfig::default())?;
        assert_relative_eq!(estimate.profile.curved_ratio, 1.0);
        assert!(estimate.profile.mean_curvature > 0.1);
        Ok(())
    }

    #[test]
    fn test_local_disturbance_stays_local() -> Result<(), AnalysisError> {
        let (points, mut normals) = plane_grid(12);
        normals[70] = [1.0, 0.0, 0.0];
        normals[71] = [0.0, 0.0, 1.0];
        normals[82] = [-1.0, 0.0, 0.0];
        let estimate = compute_profile(&points, &normals, &CurvatureConfig::default())?;
        assert!(estimate.profile.mean_curvature > 0.0);
        assert!(estimate.profile.flat_ratio > 0.5);
        assert!(estimate.per_point[0] < 0.01);
        Ok(())
    }

    #[test]
    fn test_insufficient_points() {
        let points = vec![[0.0, 0.0, 0.5]];
        let normals = vec![[0.0, 0.0, -1.0]];
        let result = compute_profile(&points, &normals, &CurvatureConfig::default());
        assert!(matches!(
            result,
            Err(AnalysisError::InsufficientData {
                required: 31,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_mismatched_lengths() {
        let points = vec![[0.0, 0.0, 0.5]; 40];
        let normals = vec![[0.0, 0.0, -1.0]; 39];
        let result = compute_profile(&points, &normals, &CurvatureConfig::default());
        assert!(matches!(
            result,
            Err(AnalysisError::MismatchedLengths { left_len: 40, right_len: 39, .. })
        ));
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&mut []), 0.0);
    }
}
