use glam::DVec3;
use objgrasp_3d::{
    obb::OrientedBoundingBox,
    pointcloud::centroid,
    ransac::{ransac, Plane, RansacParams},
};
use serde::Serialize;

use crate::config::PlaneConfig;

/// A detected planar surface.
///
/// The plane is oriented: `normal` points to the side the object stands on,
/// so [`PlaneInfo::height_of`] is positive above the surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaneInfo {
    /// Coefficients `[a, b, c, d]` of `a x + b y + c z + d = 0` with a unit normal.
    pub model: [f64; 4],
    /// Unit normal `[a, b, c]`.
    pub normal: [f64; 3],
    /// Mean of the inlier points.
    pub centroid: [f64; 3],
    /// Points classified as belonging to the plane. Never empty.
    pub inlier_points: Vec<[f64; 3]>,
    /// Area of the bounding rectangle of the inliers within the plane.
    pub area_estimate: f64,
}

impl PlaneInfo {
    fn from_inliers(plane: Plane, inlier_points: Vec<[f64; 3]>) -> Option<Self> {
        if inlier_points.is_empty() {
            return None;
        }
        let obb = OrientedBoundingBox::from_points(&inlier_points);
        Some(Self {
            model: plane.coefficients(),
            normal: plane.normal.to_array(),
            centroid: centroid(&inlier_points).to_array(),
            area_estimate: obb.extents[0] * obb.extents[1],
            inlier_points,
        })
    }

    /// Unit normal as a vector.
    pub fn normal_vec(&self) -> DVec3 {
        DVec3::from_array(self.normal)
    }

    /// Signed distance of `point` along the plane normal.
    pub fn height_of(&self, point: DVec3) -> f64 {
        self.normal_vec().dot(point) + self.model[3]
    }
}

fn plane_params(config: &PlaneConfig, threshold: f64, seed: Option<u64>) -> RansacParams {
    RansacParams {
        max_iterations: config.ransac_iterations,
        distance_threshold: threshold,
        random_seed: seed,
        ..Default::default()
    }
}

/// Orient `plane` so that its normal has a non-negative component along `up`.
fn oriented_up(plane: Plane, up: DVec3) -> Plane {
    if plane.normal.dot(up) < 0.0 {
        plane.flipped()
    } else {
        plane
    }
}

/// Find the supporting table in the scene.
///
/// The dominant plane of the scene is accepted only when it is horizontal,
/// i.e. `|normal . up|` exceeds the configured alignment. A wall or tilted
/// clutter plane yields `None`.
pub fn extract_table_plane(
    scene_points: &[[f64; 3]],
    up: DVec3,
    config: &PlaneConfig,
    seed: Option<u64>,
) -> Option<PlaneInfo> {
    let params = plane_params(config, config.table_threshold, seed);
    let result = match ransac::<Plane>(scene_points, &params) {
        Ok(result) => result,
        Err(err) => {
            log::debug!("no table plane: {err}");
            return None;
        }
    };

    let alignment = result.model.normal.dot(up).abs();
    if alignment <= config.table_alignment {
        log::debug!("rejecting dominant scene plane with |n . up| = {alignment:.3}");
        return None;
    }

    let plane = oriented_up(result.model, up);
    let inliers = result
        .inliers
        .iter()
        .map(|&i| scene_points[i])
        .collect::<Vec<_>>();
    log::debug!(
        "table plane {:?} with {} inliers",
        plane.coefficients(),
        inliers.len()
    );
    PlaneInfo::from_inliers(plane, inliers)
}

/// Find a flat, upward facing top surface on the object.
///
/// Only the highest fraction of the points along `up` is searched, so curved
/// sides below the top do not dilute the consensus set.
pub fn detect_top_plane(
    object_points: &[[f64; 3]],
    up: DVec3,
    config: &PlaneConfig,
    seed: Option<u64>,
) -> Option<PlaneInfo> {
    let mut by_height = object_points
        .iter()
        .map(|p| (DVec3::from_array(*p).dot(up), *p))
        .collect::<Vec<_>>();
    by_height.sort_by(|a, b| b.0.total_cmp(&a.0));

    let count = ((object_points.len() as f64 * config.top_slice_fraction).ceil() as usize)
        .min(object_points.len());
    let slice = by_height[..count].iter().map(|(_, p)| *p).collect::<Vec<_>>();

    let params = plane_params(config, config.top_threshold, seed);
    let result = ransac::<Plane>(&slice, &params).ok()?;

    let plane = oriented_up(result.model, up);
    let tilt = plane.normal.dot(up).clamp(-1.0, 1.0).acos().to_degrees();
    let ratio = result.inlier_ratio(slice.len());
    if tilt > config.top_max_tilt_deg || ratio <= config.top_min_ratio {
        log::debug!("rejecting top plane: tilt {tilt:.1} deg, ratio {ratio:.3}");
        return None;
    }

    let inliers = result.inliers.iter().map(|&i| slice[i]).collect();
    PlaneInfo::from_inliers(plane, inliers)
}
