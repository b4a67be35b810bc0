use glam::DVec3;
use objgrasp_3d::{filter::occupied_voxels, linalg::orthonormal_basis, obb::OrientedBoundingBox};
use serde::Serialize;

use crate::config::GripperConstants;
use crate::main_body::MainBody;
use crate::planes::PlaneInfo;
use crate::shape::{BoxFace, ShapeEstimate, ShapeKind, ShapeType};

/// Faces whose shorter sides differ by less than this are equally narrow.
const FACE_WIDTH_TIE_M: f64 = 0.002;

/// Relative area difference under which two faces count as equally large.
const FACE_AREA_TIE: f64 = 0.01;

/// Widths above this multiple of the main body radius are not trusted.
const MAX_WIDTH_BODY_RATIO: f64 = 4.0;

/// How much the planner trusts its grasp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GraspConfidence {
    /// Well fitting primitive and a well covered surface.
    High,
    /// Anything between high and low.
    Medium,
    /// Irregular shape, few points or a poorly covered surface.
    Low,
}

/// Where and how the gripper closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraspPlan {
    /// Point between the fingers when closed.
    pub point: DVec3,
    /// Unit direction the gripper travels towards the object.
    pub approach: DVec3,
    /// Jaw opening needed around the object in meters.
    pub width: f64,
}

/// Shape aware grasp planning for a parallel gripper.
///
/// Approaches always come from the side seen by the camera.
pub struct GraspPlanner<'a> {
    gripper: &'a GripperConstants,
    table: Option<&'a PlaneInfo>,
    up: DVec3,
    camera: DVec3,
}

impl<'a> GraspPlanner<'a> {
    /// Create a planner. `up` is normalized and defaults to `-y` when zero.
    pub fn new(
        gripper: &'a GripperConstants,
        table: Option<&'a PlaneInfo>,
        up: DVec3,
        camera: DVec3,
    ) -> Self {
        Self {
            gripper,
            table,
            up: up.normalize_or(DVec3::NEG_Y),
            camera,
        }
    }

    /// Compute the grasp for the estimated shape, before clearance enforcement.
    ///
    /// A box is grasped across the confirmed face with the smallest shorter side, not the
    /// largest one, so the jaw width matches the narrowest graspable dimension.
    pub fn plan(&self, shape: &ShapeEstimate, body: &MainBody) -> GraspPlan {
        let centroid = body.centroid;
        let narrowest = shape.oriented_bbox.extents[2];

        let mut plan = match &shape.shape_type {
            ShapeType::Cylinder { radius, axis, .. } => GraspPlan {
                point: centroid,
                approach: self.approach_across(centroid, DVec3::from_array(*axis)),
                width: 2.0 * radius,
            },
            ShapeType::Box { faces, .. } => {
                let face = self.grasp_face(faces);
                GraspPlan {
                    point: DVec3::from_array(face.center),
                    approach: -DVec3::from_array(face.normal),
                    width: face.short_side(),
                }
            }
            ShapeType::Sphere { radius, .. } => {
                let top_down = self
                    .table
                    .map_or(true, |t| t.height_of(centroid) >= self.gripper.table_clearance_m);
                let approach = if top_down {
                    -self.up
                } else {
                    self.approach_across(centroid, self.up)
                };
                GraspPlan {
                    point: centroid,
                    approach,
                    width: 2.0 * radius,
                }
            }
            ShapeType::Irregular { .. } => GraspPlan {
                point: centroid,
                approach: -self.up,
                width: narrowest,
            },
        };

        if body.radius > 0.0 && plan.width > MAX_WIDTH_BODY_RATIO * body.radius {
            log::warn!(
                "{} grasp width {:.4} exceeds {MAX_WIDTH_BODY_RATIO} x body radius {:.4}, using the narrowest extent",
                shape.shape_type.kind(),
                plan.width,
                body.radius
            );
            plan.width = narrowest;
        }

        plan
    }

    /// Horizontal direction from the camera towards `point`, orthogonal to `axis`.
    fn approach_across(&self, point: DVec3, axis: DVec3) -> DVec3 {
        let axis = axis.normalize_or(self.up);
        let view = point - self.camera;
        (view - axis * view.dot(axis))
            .try_normalize()
            .unwrap_or_else(|| orthonormal_basis(axis).0)
    }

    /// The face the gripper closes across.
    ///
    /// Among confirmed faces, or all faces when none is confirmed, the face
    /// with the shortest side wins. Equally narrow faces go to the larger one
    /// and then to the one facing the camera most directly.
    fn grasp_face(&self, faces: &[BoxFace; 3]) -> BoxFace {
        let mut candidates = faces.iter().filter(|f| f.confirmed).collect::<Vec<_>>();
        if candidates.is_empty() {
            candidates = faces.iter().collect();
        }

        let narrowest = candidates
            .iter()
            .map(|f| f.short_side())
            .fold(f64::INFINITY, f64::min);
        candidates.retain(|f| f.short_side() <= narrowest + FACE_WIDTH_TIE_M);

        let largest = candidates.iter().map(|f| f.area()).fold(0.0, f64::max);
        candidates.retain(|f| f.area() >= largest * (1.0 - FACE_AREA_TIE));

        let facing = |f: &BoxFace| {
            let to_camera = (self.camera - DVec3::from_array(f.center)).normalize_or_zero();
            DVec3::from_array(f.normal).dot(to_camera)
        };
        candidates
            .into_iter()
            .max_by(|a, b| facing(a).total_cmp(&facing(b)))
            .copied()
            .unwrap_or(faces[0])
    }

    /// Lift `point` along the table normal until it clears the table.
    ///
    /// Points already high enough, or any point without a table, are returned unchanged.
    pub fn enforce_clearance(&self, point: DVec3) -> DVec3 {
        let Some(table) = self.table else {
            return point;
        };
        let height = table.height_of(point);
        let clearance = self.gripper.table_clearance_m;
        if height < clearance {
            log::debug!("lifting grasp point from {height:.4} to {clearance:.4} above the table");
            point + table.normal_vec() * (clearance - height)
        } else {
            point
        }
    }

    /// Height of the object above the table, or its extent along `up` without a table.
    pub fn object_height(&self, points: &[[f64; 3]]) -> f64 {
        if points.is_empty() {
            return 0.0;
        }
        match self.table {
            Some(table) => points
                .iter()
                .map(|p| table.height_of(DVec3::from_array(*p)))
                .fold(f64::NEG_INFINITY, f64::max)
                .max(0.0),
            None => {
                let heights = points.iter().map(|p| DVec3::from_array(*p).dot(self.up));
                let (lo, hi) = heights.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), h| {
                    (lo.min(h), hi.max(h))
                });
                hi - lo
            }
        }
    }

    /// Whether the gripper can hold an object of this width and height.
    pub fn is_graspable(&self, width: f64, height: f64) -> bool {
        (self.gripper.min_width_m..=self.gripper.max_opening_m).contains(&width)
            && height >= self.gripper.min_height_m
    }
}

/// Fraction of the bounding box surface covered by the points.
///
/// The covered area is approximated by the number of occupied voxels times
/// the area of one voxel face.
pub fn surface_coverage(points: &[[f64; 3]], obb: &OrientedBoundingBox, voxel_size: f64) -> f64 {
    let area = obb.surface_area();
    if area <= 0.0 || voxel_size <= 0.0 {
        return 0.0;
    }
    let covered = occupied_voxels(points, voxel_size) as f64 * voxel_size * voxel_size;
    (covered / area).clamp(0.0, 1.0)
}

/// Grade the grasp from the shape fit, the number of points and the coverage.
pub fn grasp_confidence(
    shape: &ShapeEstimate,
    num_points: usize,
    coverage: f64,
    min_points: usize,
) -> GraspConfidence {
    if shape.shape_type.kind() == ShapeKind::Irregular || num_points < min_points || coverage < 0.3
    {
        GraspConfidence::Low
    } else if shape.confidence > 0.7 && coverage > 0.6 {
        GraspConfidence::High
    } else {
        GraspConfidence::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curvature::CurvatureProfile;
    use approx::assert_relative_eq;

    const UP: DVec3 = DVec3::NEG_Y;

    fn table() -> PlaneInfo {
        // y = 0.15 facing the camera
        PlaneInfo {
            model: [0.0, -1.0, 0.0, 0.15],
            normal: [0.0, -1.0, 0.0],
            centroid: [0.0, 0.15, 0.5],
            inlier_points: vec![[0.0, 0.15, 0.5]],
            area_estimate: 0.1,
        }
    }

    fn body(centroid: DVec3, radius: f64) -> MainBody {
        MainBody {
            points: vec![centroid.to_array()],
            normals: vec![[0.0, 0.0, -1.0]],
            centroid,
            radius,
        }
    }

    fn estimate(shape_type: ShapeType, extents: [f64; 3]) -> ShapeEstimate {
        let obb = OrientedBoundingBox {
            center: DVec3::new(0.0, 0.1, 0.5),
            axes: [DVec3::X, DVec3::Y, DVec3::Z],
            extents,
        };
        ShapeEstimate {
            shape_type,
            confidence: 0.9,
            oriented_bbox: (&obb).into(),
            curvature_profile: CurvatureProfile::default(),
            fit_residual: Some(0.001),
        }
    }

    fn face(normal: [f64; 3], center: [f64; 3], extents: [f64; 2], confirmed: bool) -> BoxFace {
        BoxFace {
            normal,
            center,
            extents,
            inlier_ratio: if confirmed { 0.8 } else { 0.1 },
            confirmed,
        }
    }

    #[test]
    fn test_cylinder_grasp_from_camera_side() {
        let gripper = GripperConstants::default();
        let table = table();
        let planner = GraspPlanner::new(&gripper, Some(&table), UP, DVec3::ZERO);
        let shape = estimate(
            ShapeType::Cylinder {
                radius: 0.03,
                height: 0.1,
                axis: [0.0, -1.0, 0.0],
                center: [0.0, 0.1, 0.5],
            },
            [0.1, 0.06, 0.06],
        );
        let plan = planner.plan(&shape, &body(DVec3::new(0.0, 0.1, 0.5), 0.035));
        assert_relative_eq!(plan.width, 0.06);
        assert_relative_eq!(plan.approach.z, 1.0, epsilon = 1e-12);
        assert_relative_eq!(plan.point.y, 0.1);
    }

    #[test]
    fn test_box_grasp_picks_narrowest_face() {
        let gripper = GripperConstants::default();
        let planner = GraspPlanner::new(&gripper, None, UP, DVec3::ZERO);
        // a 0.06 x 0.04 x 0.08 box seen from the front
        let faces = [
            face([-1.0, 0.0, 0.0], [-0.03, 0.13, 0.5], [0.04, 0.08], true),
            face([0.0, -1.0, 0.0], [0.0, 0.11, 0.5], [0.08, 0.06], true),
            face([0.0, 0.0, -1.0], [0.0, 0.13, 0.46], [0.06, 0.04], true),
        ];
        let shape = estimate(
            ShapeType::Box {
                extents: [0.06, 0.04, 0.08],
                faces,
            },
            [0.08, 0.06, 0.04],
        );
        let plan = planner.plan(&shape, &body(DVec3::new(0.0, 0.13, 0.5), 0.04));
        assert_relative_eq!(plan.width, 0.04);
        // the larger of the two faces with a 4 cm side
        assert_eq!(plan.point, DVec3::new(-0.03, 0.13, 0.5));
        assert_eq!(plan.approach, DVec3::X);
    }

    #[test]
    fn test_box_without_confirmed_faces_prefers_camera_facing() {
        let gripper = GripperConstants::default();
        let planner = GraspPlanner::new(&gripper, None, UP, DVec3::ZERO);
        // a cube: all faces tie on width and area
        let faces = [
            face([-1.0, 0.0, 0.0], [-0.02, 0.1, 0.5], [0.04, 0.04], false),
            face([0.0, -1.0, 0.0], [0.0, 0.08, 0.5], [0.04, 0.04], false),
            face([0.0, 0.0, -1.0], [0.0, 0.1, 0.48], [0.04, 0.04], false),
        ];
        let shape = estimate(
            ShapeType::Box {
                extents: [0.04; 3],
                faces,
            },
            [0.04; 3],
        );
        let plan = planner.plan(&shape, &body(DVec3::new(0.0, 0.1, 0.5), 0.03));
        assert_eq!(plan.approach, DVec3::Z);
        assert_relative_eq!(plan.width, 0.04);
    }

    #[test]
    fn test_sphere_approach_depends_on_clearance() {
        let gripper = GripperConstants::default();
        let table = table();
        let shape = estimate(
            ShapeType::Sphere {
                radius: 0.035,
                center: [0.0, 0.115, 0.5],
            },
            [0.07; 3],
        );

        let planner = GraspPlanner::new(&gripper, Some(&table), UP, DVec3::ZERO);
        let high = planner.plan(&shape, &body(DVec3::new(0.0, 0.115, 0.5), 0.035));
        assert_eq!(high.approach, DVec3::Y);
        assert_relative_eq!(high.width, 0.07);

        let low = planner.plan(&shape, &body(DVec3::new(0.0, 0.14, 0.5), 0.035));
        assert_relative_eq!(low.approach.dot(UP), 0.0, epsilon = 1e-12);
        assert!(low.approach.z > 0.9);

        let no_table = GraspPlanner::new(&gripper, None, UP, DVec3::ZERO);
        let plan = no_table.plan(&shape, &body(DVec3::new(0.0, 0.14, 0.5), 0.035));
        assert_eq!(plan.approach, DVec3::Y);
    }

    #[test]
    fn test_irregular_grasp_is_top_down_across_narrowest_extent() {
        let gripper = GripperConstants::default();
        let planner = GraspPlanner::new(&gripper, None, UP, DVec3::ZERO);
        let shape = estimate(
            ShapeType::Irregular {
                extents: [0.18, 0.11, 0.08],
            },
            [0.18, 0.11, 0.08],
        );
        let plan = planner.plan(&shape, &body(DVec3::new(0.0, 0.1, 0.5), 0.05));
        assert_eq!(plan.approach, DVec3::Y);
        assert_relative_eq!(plan.width, 0.08);
    }

    #[test]
    fn test_implausible_width_falls_back_to_narrowest_extent() {
        let gripper = GripperConstants::default();
        let planner = GraspPlanner::new(&gripper, None, UP, DVec3::ZERO);
        let shape = estimate(
            ShapeType::Sphere {
                radius: 0.5,
                center: [0.0, 0.1, 0.5],
            },
            [0.07, 0.06, 0.05],
        );
        let plan = planner.plan(&shape, &body(DVec3::new(0.0, 0.1, 0.5), 0.03));
        assert_relative_eq!(plan.width, 0.05);
    }

    #[test]
    fn test_enforce_clearance() {
        let gripper = GripperConstants::default();
        let table = table();
        let planner = GraspPlanner::new(&gripper, Some(&table), UP, DVec3::ZERO);

        let lifted = planner.enforce_clearance(DVec3::new(0.0, 0.145, 0.5));
        assert_relative_eq!(table.height_of(lifted), 0.015, epsilon = 1e-12);
        assert_relative_eq!(lifted.y, 0.135, epsilon = 1e-12);

        let below = planner.enforce_clearance(DVec3::new(0.0, 0.2, 0.5));
        assert_relative_eq!(table.height_of(below), 0.015, epsilon = 1e-12);

        let high = DVec3::new(0.0, 0.05, 0.5);
        assert_eq!(planner.enforce_clearance(high), high);

        let no_table = GraspPlanner::new(&gripper, None, UP, DVec3::ZERO);
        assert_eq!(no_table.enforce_clearance(below), below);
    }

    #[test]
    fn test_object_height_and_graspability() {
        let gripper = GripperConstants::default();
        let table = table();
        let points = [[0.0, 0.15, 0.5], [0.0, 0.11, 0.5], [0.01, 0.13, 0.5]];

        let planner = GraspPlanner::new(&gripper, Some(&table), UP, DVec3::ZERO);
        assert_relative_eq!(planner.object_height(&points), 0.04, epsilon = 1e-12);

        let no_table = GraspPlanner::new(&gripper, None, UP, DVec3::ZERO);
        assert_relative_eq!(no_table.object_height(&points), 0.04, epsilon = 1e-12);
        assert_eq!(no_table.object_height(&[]), 0.0);

        assert!(planner.is_graspable(0.06, 0.04));
        assert!(planner.is_graspable(0.066, 0.04));
        assert!(!planner.is_graspable(0.07, 0.04));
        assert!(!planner.is_graspable(0.004, 0.04));
        assert!(!planner.is_graspable(0.03, 0.004));
    }

    #[test]
    fn test_grasp_confidence() {
        let good = estimate(
            ShapeType::Sphere {
                radius: 0.03,
                center: [0.0, 0.1, 0.5],
            },
            [0.06; 3],
        );
        assert_eq!(grasp_confidence(&good, 1000, 0.8, 200), GraspConfidence::High);
        assert_eq!(grasp_confidence(&good, 1000, 0.5, 200), GraspConfidence::Medium);
        assert_eq!(grasp_confidence(&good, 1000, 0.2, 200), GraspConfidence::Low);
        assert_eq!(grasp_confidence(&good, 100, 0.8, 200), GraspConfidence::Low);

        let irregular = ShapeEstimate::irregular(
            &OrientedBoundingBox::default(),
            CurvatureProfile::default(),
        );
        assert_eq!(grasp_confidence(&irregular, 1000, 0.8, 200), GraspConfidence::Low);
    }

    #[test]
    fn test_surface_coverage() {
        let obb = OrientedBoundingBox {
            center: DVec3::ZERO,
            axes: [DVec3::X, DVec3::Y, DVec3::Z],
            extents: [0.01, 0.01, 0.01],
        };
        // 4 voxels of 5 mm over a 6 cm2 box surface
        let points = [
            [0.001, 0.001, 0.001],
            [0.006, 0.001, 0.001],
            [0.001, 0.006, 0.001],
            [0.001, 0.001, 0.006],
        ];
        assert_relative_eq!(surface_coverage(&points, &obb, 0.005), 1.0 / 6.0, epsilon = 1e-12);
        assert_eq!(surface_coverage(&points, &OrientedBoundingBox::default(), 0.005), 0.0);
    }
}
