use std::path::Path;

use glam::DVec3;
use objgrasp_3d::{
    filter::estimate_normals,
    io::{pcd::read_pcd, ply::read_ply},
    obb::OrientedBoundingBox,
    pointcloud::PointCloud,
};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::curvature::CurvatureProfile;
use crate::error::AnalysisError;
use crate::grasp::{grasp_confidence, surface_coverage, GraspConfidence, GraspPlanner};
use crate::main_body::{characterize, MainBody};
use crate::planes::{detect_top_plane, extract_table_plane, PlaneInfo};
use crate::shape::{ShapeEstimate, ShapeEstimator};
use crate::slot::CancelToken;

/// Seed streams of the randomized stages.
const TABLE_STAGE: u64 = 0;
const SHAPE_STAGE: u64 = 1;
const TOP_STAGE: u64 = 2;

/// Complete result of one analysis run.
///
/// The analysis owns copies of everything it reports and never refers back
/// to the input clouds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectAnalysis {
    /// Centroid of the main body.
    pub centroid: [f64; 3],
    /// Points of the main body.
    pub main_body_points: Vec<[f64; 3]>,
    /// Mean distance of the main body points to the centroid.
    pub main_body_radius: f64,
    /// Number of main body points.
    pub num_points: usize,
    /// Estimated shape.
    pub shape: ShapeEstimate,
    /// Supporting table, when one was found in the scene.
    pub table_plane: Option<PlaneInfo>,
    /// Flat top of the object, searched only when a table was found.
    pub top_plane: Option<PlaneInfo>,
    /// Point between the fingers when closed.
    pub grasp_point: [f64; 3],
    /// Unit direction the gripper travels towards the object.
    pub grasp_approach: [f64; 3],
    /// Jaw opening in meters.
    pub grasp_width: f64,
    /// Height of the object above the table, or along the up axis without one.
    pub object_height: f64,
    /// Fraction of the bounding box surface covered by points.
    pub surface_coverage: f64,
    /// Whether the gripper limits allow the grasp.
    pub graspable: bool,
    /// How much the grasp can be trusted.
    pub grasp_confidence: GraspConfidence,
}

/// Analyze one object.
///
/// `points` and `normals` describe the segmented object; `scene` is only used
/// to find the supporting table and may be empty.
///
/// # Errors
///
/// Only caller contract violations are errors: an empty object cloud
/// ([`AnalysisError::InvalidInput`]) and misaligned points and normals
/// ([`AnalysisError::MismatchedLengths`]). Too few points or a cloud that is
/// all noise produce a low confidence irregular analysis instead.
///
/// # Example
///
/// ```
/// use glam::DVec3;
/// use objgrasp::{analyze, synthetic, AnalysisConfig, ShapeKind};
///
/// let object = synthetic::sphere(DVec3::new(0.0, 0.115, 0.5), 0.035, 1200, 3);
/// let normals = object.normals().unwrap_or_default();
/// let config = AnalysisConfig::default().with_seed(7);
///
/// let analysis = analyze(object.points(), normals, &[], &config)?;
/// assert_eq!(analysis.shape.shape_type.kind(), ShapeKind::Sphere);
/// assert!(!analysis.graspable);
/// # Ok::<(), objgrasp::AnalysisError>(())
/// ```
pub fn analyze(
    points: &[[f64; 3]],
    normals: &[[f64; 3]],
    scene: &[[f64; 3]],
    config: &AnalysisConfig,
) -> Result<ObjectAnalysis, AnalysisError> {
    analyze_with_cancel(points, normals, scene, config, &CancelToken::new())
}

/// Analyze one object, stopping between stages once `cancel` is cancelled.
///
/// # Errors
///
/// Same as [`analyze`], plus [`AnalysisError::Cancelled`].
pub fn analyze_with_cancel(
    points: &[[f64; 3]],
    normals: &[[f64; 3]],
    scene: &[[f64; 3]],
    config: &AnalysisConfig,
    cancel: &CancelToken,
) -> Result<ObjectAnalysis, AnalysisError> {
    if points.is_empty() {
        return Err(AnalysisError::InvalidInput {
            reason: "the object point cloud is empty".into(),
        });
    }
    if points.len() != normals.len() {
        return Err(AnalysisError::MismatchedLengths {
            left_name: "points",
            left_len: points.len(),
            right_name: "normals",
            right_len: normals.len(),
        });
    }

    let up = DVec3::from_array(config.up_axis)
        .try_normalize()
        .ok_or_else(|| AnalysisError::InvalidInput {
            reason: format!("up axis {:?} has no direction", config.up_axis),
        })?;
    let camera = DVec3::from_array(config.camera_position);

    cancel.check()?;
    let table = extract_table_plane(scene, up, &config.planes, config.stage_seed(TABLE_STAGE));

    cancel.check()?;
    let (body, shape) = match characterize(points, normals, &config.main_body) {
        Ok(body) => {
            let estimator = ShapeEstimator::from_config(config, config.stage_seed(SHAPE_STAGE));
            match estimator.estimate(&body.points, &body.normals) {
                Ok(shape) => (body, Some(shape)),
                Err(err @ AnalysisError::InsufficientData { .. }) => {
                    log::warn!("{err}, falling back to a bounding box analysis");
                    (body, None)
                }
                Err(err) => return Err(err),
            }
        }
        Err(AnalysisError::EmptyCluster) => {
            log::warn!("no cluster survived, falling back to a bounding box analysis");
            (MainBody::new(points.to_vec(), normals.to_vec()), None)
        }
        Err(err) => return Err(err),
    };

    let fallback = shape.is_none();
    let shape = shape.unwrap_or_else(|| {
        ShapeEstimate::irregular(
            &OrientedBoundingBox::from_points(&body.points),
            CurvatureProfile::default(),
        )
    });

    cancel.check()?;
    let top_plane = match &table {
        Some(_) if !fallback => {
            detect_top_plane(&body.points, up, &config.planes, config.stage_seed(TOP_STAGE))
        }
        _ => None,
    };

    let planner = GraspPlanner::new(&config.gripper, table.as_ref(), up, camera);
    let plan = planner.plan(&shape, &body);
    let grasp_point = planner.enforce_clearance(plan.point);
    let object_height = planner.object_height(&body.points);
    let graspable = planner.is_graspable(plan.width, object_height);

    let coverage = surface_coverage(
        &body.points,
        &shape.oriented_bbox.to_obb(),
        config.voxel_size,
    );
    let confidence = if fallback {
        GraspConfidence::Low
    } else {
        grasp_confidence(
            &shape,
            body.points.len(),
            coverage,
            config.min_points_for_confidence,
        )
    };

    log::info!(
        "{} with confidence {:.2}: grasp width {:.4} m, graspable {graspable}, {confidence:?} confidence",
        shape.shape_type.kind(),
        shape.confidence,
        plan.width,
    );

    Ok(ObjectAnalysis {
        centroid: body.centroid.to_array(),
        num_points: body.points.len(),
        main_body_radius: body.radius,
        main_body_points: body.points,
        shape,
        table_plane: table,
        top_plane,
        grasp_point: grasp_point.to_array(),
        grasp_approach: plan.approach.to_array(),
        grasp_width: plan.width,
        object_height,
        surface_coverage: coverage,
        graspable,
        grasp_confidence: confidence,
    })
}

/// Read a point cloud from a `.ply` or `.pcd` file.
pub fn read_point_cloud(path: impl AsRef<Path>) -> Result<PointCloud, AnalysisError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "ply" => Ok(read_ply(path)?),
        "pcd" => Ok(read_pcd(path)?),
        _ => Err(AnalysisError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Analyze an object stored in a point cloud file.
///
/// Files without normals get normals estimated from their nearest neighbors,
/// oriented towards the camera. Without a scene file no table is searched.
pub fn analyze_from_file(
    path: impl AsRef<Path>,
    scene_path: Option<&Path>,
    config: &AnalysisConfig,
) -> Result<ObjectAnalysis, AnalysisError> {
    let cloud = read_point_cloud(path.as_ref())?;
    let scene = match scene_path {
        Some(scene_path) => read_point_cloud(scene_path)?.into_parts().0,
        None => Vec::new(),
    };

    let (points, normals) = cloud.into_parts();
    let normals = match normals {
        Some(normals) => normals,
        None => {
            log::debug!("estimating normals for {}", path.as_ref().display());
            estimate_normals(
                &points,
                config.normal_neighbors,
                DVec3::from_array(config.camera_position),
            )
        }
    };

    analyze(&points, &normals, &scene, config)
}
