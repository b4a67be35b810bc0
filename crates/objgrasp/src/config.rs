use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Physical limits of the two-finger parallel gripper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperConstants {
    /// Maximum jaw opening in meters.
    pub max_opening_m: f64,
    /// Minimum graspable width in meters.
    pub min_width_m: f64,
    /// Minimum object height above the table in meters.
    pub min_height_m: f64,
    /// Minimum distance of the grasp point above the table in meters.
    pub table_clearance_m: f64,
}

impl Default for GripperConstants {
    fn default() -> Self {
        Self {
            max_opening_m: 0.066,
            min_width_m: 0.005,
            min_height_m: 0.005,
            table_clearance_m: 0.015,
        }
    }
}

/// Parameters of the per-point curvature classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurvatureConfig {
    /// Number of neighbors besides the point itself.
    pub neighbors: usize,
    /// Filtered curvature below this value classifies a point as flat.
    pub flat_threshold: f64,
}

impl Default for CurvatureConfig {
    fn default() -> Self {
        Self {
            neighbors: 30,
            flat_threshold: 0.01,
        }
    }
}

/// Parameters of the primitive fitters and the shape selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    /// Flat or curved ratio above which the matching primitive is tried first.
    pub class_ratio: f64,
    /// Inlier ratio below which the other fitters are tried and below which
    /// the shape is irregular.
    pub min_fit_ratio: f64,
    /// Candidates whose inlier ratios differ by less than this are tied.
    pub tie_margin: f64,
    /// Sphere inlier distance in meters.
    pub sphere_threshold: f64,
    /// Cylinder inlier distance in meters.
    pub cylinder_threshold: f64,
    /// Maximum angle in degrees between a point normal and the plane
    /// orthogonal to the cylinder axis for the point to count as side surface.
    pub cylinder_side_max_angle_deg: f64,
    /// Box face plane inlier distance in meters.
    pub face_threshold: f64,
    /// Depth of the face slab as a fraction of the box extent.
    pub face_slab_fraction: f64,
    /// Face plane inlier ratio needed to confirm a face.
    pub face_min_ratio: f64,
    /// Minimum `|normal . axis|` needed to confirm a face.
    pub face_axis_alignment: f64,
    /// Maximum angle in degrees between a point normal and a face plane normal.
    pub face_normal_max_angle_deg: f64,
    /// Maximum number of RANSAC iterations per fit.
    pub ransac_iterations: usize,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            class_ratio: 0.6,
            min_fit_ratio: 0.4,
            tie_margin: 0.02,
            sphere_threshold: 0.005,
            cylinder_threshold: 0.005,
            cylinder_side_max_angle_deg: 20.0,
            face_threshold: 0.002,
            face_slab_fraction: 0.1,
            face_min_ratio: 0.5,
            face_axis_alignment: 0.9,
            face_normal_max_angle_deg: 5.0,
            ransac_iterations: 500,
        }
    }
}

/// Parameters of the table and top plane detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneConfig {
    /// Table plane inlier distance in meters.
    pub table_threshold: f64,
    /// Minimum `|normal . up|` for the table plane.
    pub table_alignment: f64,
    /// Fraction of the highest object points searched for the top plane.
    pub top_slice_fraction: f64,
    /// Top plane inlier distance in meters.
    pub top_threshold: f64,
    /// Maximum tilt of the top plane from vertical in degrees.
    pub top_max_tilt_deg: f64,
    /// Top plane inlier ratio needed to accept it.
    pub top_min_ratio: f64,
    /// Maximum number of RANSAC iterations per plane.
    pub ransac_iterations: usize,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            table_threshold: 0.005,
            table_alignment: 0.8,
            top_slice_fraction: 0.2,
            top_threshold: 0.003,
            top_max_tilt_deg: 30.0,
            top_min_ratio: 0.3,
            ransac_iterations: 500,
        }
    }
}

/// Parameters of the main body extraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MainBodyConfig {
    /// Neighbors used by the statistical outlier removal.
    pub outlier_neighbors: usize,
    /// Standard deviation multiplier of the statistical outlier removal.
    pub outlier_std_ratio: f64,
    /// DBSCAN neighborhood radius in meters.
    pub cluster_eps: f64,
    /// DBSCAN minimum neighborhood size of a core point.
    pub cluster_min_points: usize,
}

impl Default for MainBodyConfig {
    fn default() -> Self {
        Self {
            outlier_neighbors: 20,
            outlier_std_ratio: 2.0,
            cluster_eps: 0.015,
            cluster_min_points: 10,
        }
    }
}

/// Configuration of a full analysis run.
///
/// Every field has a default, so a JSON file only needs to name the values
/// it overrides:
///
/// ```
/// use objgrasp::AnalysisConfig;
///
/// let config: AnalysisConfig =
///     serde_json::from_str(r#"{ "gripper": { "max_opening_m": 0.08 } }"#)?;
/// assert_eq!(config.gripper.max_opening_m, 0.08);
/// assert_eq!(config.gripper.min_width_m, 0.005);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Gripper limits.
    pub gripper: GripperConstants,
    /// Curvature classification.
    pub curvature: CurvatureConfig,
    /// Primitive fitting and selection.
    pub shape: ShapeConfig,
    /// Table and top plane detection.
    pub planes: PlaneConfig,
    /// Main body extraction.
    pub main_body: MainBodyConfig,
    /// Unit vector pointing up in the camera frame.
    pub up_axis: [f64; 3],
    /// Camera position in the point cloud frame.
    pub camera_position: [f64; 3],
    /// Voxel size of the surface area proxy in meters.
    pub voxel_size: f64,
    /// Object clouds with fewer points get a low grasp confidence.
    pub min_points_for_confidence: usize,
    /// Neighbors used to estimate normals for files without them.
    pub normal_neighbors: usize,
    /// Fixed RANSAC seed; `None` seeds from the operating system.
    pub random_seed: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            gripper: GripperConstants::default(),
            curvature: CurvatureConfig::default(),
            shape: ShapeConfig::default(),
            planes: PlaneConfig::default(),
            main_body: MainBodyConfig::default(),
            up_axis: [0.0, -1.0, 0.0],
            camera_position: [0.0, 0.0, 0.0],
            voxel_size: 0.005,
            min_points_for_confidence: 200,
            normal_neighbors: 20,
            random_seed: None,
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// The same configuration with a fixed RANSAC seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Derive the seed of one pipeline stage from the configured seed.
    pub(crate) fn stage_seed(&self, stage: u64) -> Option<u64> {
        self.random_seed
            .map(|s| s.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(stage))
    }
}
