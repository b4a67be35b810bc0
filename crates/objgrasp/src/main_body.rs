use glam::DVec3;
use objgrasp_3d::{
    filter::{dbscan, largest_cluster, statistical_outlier_removal},
    pointcloud::centroid,
};

use crate::config::MainBodyConfig;
use crate::error::AnalysisError;

/// The cleaned object cloud and its size estimate.
#[derive(Debug, Clone)]
pub struct MainBody {
    /// Points of the largest cluster.
    pub points: Vec<[f64; 3]>,
    /// Normals aligned with `points`.
    pub normals: Vec<[f64; 3]>,
    /// Mean of `points`.
    pub centroid: DVec3,
    /// Mean distance of the points to the centroid.
    pub radius: f64,
}

impl MainBody {
    /// Take the points as they are and measure their centroid and radius.
    pub fn new(points: Vec<[f64; 3]>, normals: Vec<[f64; 3]>) -> Self {
        let center = centroid(&points);
        let radius = if points.is_empty() {
            0.0
        } else {
            points
                .iter()
                .map(|p| DVec3::from_array(*p).distance(center))
                .sum::<f64>()
                / points.len() as f64
        };
        Self {
            points,
            normals,
            centroid: center,
            radius,
        }
    }
}

/// Isolate the main body of an object cloud.
///
/// Statistical outliers are removed first, then the survivors are clustered
/// and only the most populated cluster is kept. Clouds too small to form a
/// single cluster are passed through unchanged so that the later stages can
/// report them as insufficient data.
///
/// # Errors
///
/// Returns [`AnalysisError::EmptyCluster`] when no point survives.
pub fn characterize(
    points: &[[f64; 3]],
    normals: &[[f64; 3]],
    config: &MainBodyConfig,
) -> Result<MainBody, AnalysisError> {
    if points.len() != normals.len() {
        return Err(AnalysisError::MismatchedLengths {
            left_name: "points",
            left_len: points.len(),
            right_name: "normals",
            right_len: normals.len(),
        });
    }

    let keep = if points.len() < config.cluster_min_points {
        (0..points.len()).collect::<Vec<_>>()
    } else {
        let inliers =
            statistical_outlier_removal(points, config.outlier_neighbors, config.outlier_std_ratio);
        let filtered = inliers.iter().map(|&i| points[i]).collect::<Vec<_>>();
        let labels = dbscan(&filtered, config.cluster_eps, config.cluster_min_points);
        let cluster = largest_cluster(&labels).ok_or(AnalysisError::EmptyCluster)?;
        cluster.into_iter().map(|i| inliers[i]).collect()
    };

    if keep.is_empty() {
        return Err(AnalysisError::EmptyCluster);
    }

    log::debug!("main body keeps {} of {} points", keep.len(), points.len());

    Ok(MainBody::new(
        keep.iter().map(|&i| points[i]).collect(),
        keep.iter().map(|&i| normals[i]).collect(),
    ))
}
