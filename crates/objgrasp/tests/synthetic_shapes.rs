use approx::assert_relative_eq;
use glam::DVec3;
use objgrasp::{
    analyze, analyze_from_file, synthetic, AnalysisConfig, AnalysisError, GraspConfidence,
    ObjectAnalysis, ShapeKind, ShapeType,
};
use objgrasp_3d::{io::ply::write_ply_binary, pointcloud::PointCloud};

const TABLE_Y: f64 = 0.15;

fn config() -> AnalysisConfig {
    AnalysisConfig::default().with_seed(7)
}

fn cylinder() -> PointCloud {
    synthetic::cylinder(DVec3::new(0.0, 0.1, 0.5), DVec3::NEG_Y, 0.03, 0.1, 1500, 1)
}

fn cuboid() -> PointCloud {
    synthetic::cuboid(DVec3::new(0.0, 0.13, 0.5), [0.06, 0.04, 0.08], 1500, 2)
}

fn sphere() -> PointCloud {
    synthetic::sphere(DVec3::new(0.0, 0.115, 0.5), 0.035, 1200, 3)
}

fn blob() -> PointCloud {
    synthetic::lumpy_blob(DVec3::new(0.0, 0.1, 0.5), 0.025, 1500, 4)
}

/// The object standing on a 40 cm table patch.
fn scene_with(object: &PointCloud) -> Vec<[f64; 3]> {
    let table = synthetic::table_patch(DVec3::new(0.0, TABLE_Y, 0.5), DVec3::NEG_Y, 0.4, 3000, 5);
    [table.points(), object.points()].concat()
}

fn analyze_on_table(object: &PointCloud) -> Result<ObjectAnalysis, AnalysisError> {
    analyze(
        object.points(),
        object.normals().unwrap_or_default(),
        &scene_with(object),
        &config(),
    )
}

fn check_invariants(analysis: &ObjectAnalysis) {
    let approach = DVec3::from_array(analysis.grasp_approach);
    assert_relative_eq!(approach.length(), 1.0, epsilon = 1e-6);
    assert!(analysis.grasp_width >= 0.0);
    assert!((0.0..=1.0).contains(&analysis.shape.confidence));
    assert!((0.0..=1.0).contains(&analysis.surface_coverage));
    assert_eq!(analysis.num_points, analysis.main_body_points.len());
    if analysis.shape.shape_type.kind() == ShapeKind::Irregular {
        assert_eq!(analysis.grasp_confidence, GraspConfidence::Low);
    }
    if analysis.num_points < AnalysisConfig::default().min_points_for_confidence {
        assert_eq!(analysis.grasp_confidence, GraspConfidence::Low);
    }
    if let Some(table) = &analysis.table_plane {
        // grasp point keeps its clearance above the table
        let height = table.height_of(DVec3::from_array(analysis.grasp_point));
        assert!(height >= config().gripper.table_clearance_m - 1e-4);
    }
    if analysis.graspable {
        let gripper = config().gripper;
        assert!(analysis.grasp_width <= gripper.max_opening_m);
        assert!(analysis.grasp_width >= gripper.min_width_m);
    }
}

#[test]
fn test_cylinder_on_table() -> Result<(), AnalysisError> {
    let analysis = analyze_on_table(&cylinder())?;
    check_invariants(&analysis);

    let ShapeType::Cylinder { radius, axis, .. } = analysis.shape.shape_type else {
        panic!("expected a cylinder, got {:?}", analysis.shape.shape_type);
    };
    assert_relative_eq!(radius, 0.03, epsilon = 2e-3);
    assert!(DVec3::from_array(axis).dot(DVec3::Y).abs() > 0.95);
    assert_relative_eq!(analysis.grasp_width, 0.06, epsilon = 4e-3);

    // side approach, orthogonal to the upright axis
    assert!(DVec3::from_array(analysis.grasp_approach).dot(DVec3::Y).abs() < 0.1);

    let table = analysis.table_plane.as_ref().expect("table plane");
    assert!(table.normal_vec().dot(DVec3::NEG_Y) > 0.99);
    assert_relative_eq!(analysis.object_height, 0.1, epsilon = 5e-3);
    assert!(analysis.graspable);
    Ok(())
}

#[test]
fn test_box_on_table() -> Result<(), AnalysisError> {
    let analysis = analyze_on_table(&cuboid())?;
    check_invariants(&analysis);

    let ShapeType::Box { extents, .. } = analysis.shape.shape_type else {
        panic!("expected a box, got {:?}", analysis.shape.shape_type);
    };
    let mut extents = extents;
    extents.sort_by(|a, b| b.total_cmp(a));
    assert_relative_eq!(extents[0], 0.08, epsilon = 3e-3);
    assert_relative_eq!(extents[1], 0.06, epsilon = 3e-3);
    assert_relative_eq!(extents[2], 0.04, epsilon = 3e-3);

    assert_relative_eq!(analysis.grasp_width, 0.04, epsilon = 3e-3);
    assert_relative_eq!(analysis.object_height, 0.04, epsilon = 3e-3);
    assert!(analysis.graspable);
    Ok(())
}

#[test]
fn test_sphere_is_too_wide() -> Result<(), AnalysisError> {
    let analysis = analyze_on_table(&sphere())?;
    check_invariants(&analysis);

    let ShapeType::Sphere { radius, .. } = analysis.shape.shape_type else {
        panic!("expected a sphere, got {:?}", analysis.shape.shape_type);
    };
    assert_relative_eq!(radius, 0.035, epsilon = 2e-3);
    assert_relative_eq!(analysis.grasp_width, 0.07, epsilon = 4e-3);

    // high enough above the table for a top-down approach
    assert!(DVec3::from_array(analysis.grasp_approach).dot(DVec3::Y) > 0.99);
    assert!(!analysis.graspable);
    Ok(())
}

#[test]
fn test_blob_is_irregular() -> Result<(), AnalysisError> {
    let analysis = analyze_on_table(&blob())?;
    check_invariants(&analysis);

    assert_eq!(analysis.shape.shape_type.kind(), ShapeKind::Irregular);
    assert_eq!(analysis.shape.fit_residual, None);
    assert_eq!(analysis.grasp_confidence, GraspConfidence::Low);
    assert_relative_eq!(
        analysis.grasp_width,
        analysis.shape.oriented_bbox.extents[2],
        epsilon = 1e-12
    );
    Ok(())
}

/// Only the part of the object the camera at the origin sees, as a depth sensor delivers it.
fn seen_from_camera(object: &PointCloud) -> PointCloud {
    synthetic::visible_from(object, DVec3::ZERO)
}

#[test]
fn test_single_view_cylinder() -> Result<(), AnalysisError> {
    let analysis = analyze_on_table(&seen_from_camera(&cylinder()))?;
    check_invariants(&analysis);

    let ShapeType::Cylinder { radius, .. } = analysis.shape.shape_type else {
        panic!("expected a cylinder, got {:?}", analysis.shape.shape_type);
    };
    assert_relative_eq!(radius, 0.03, epsilon = 2e-3);
    assert_relative_eq!(analysis.grasp_width, 0.06, epsilon = 4e-3);
    assert!(analysis.graspable);
    Ok(())
}

#[test]
fn test_single_view_box() -> Result<(), AnalysisError> {
    let analysis = analyze_on_table(&seen_from_camera(&cuboid()))?;
    check_invariants(&analysis);

    assert_eq!(analysis.shape.shape_type.kind(), ShapeKind::Box);
    assert_relative_eq!(analysis.grasp_width, 0.04, epsilon = 3e-3);
    assert!(analysis.graspable);
    Ok(())
}

#[test]
fn test_single_view_sphere() -> Result<(), AnalysisError> {
    let analysis = analyze_on_table(&seen_from_camera(&sphere()))?;
    check_invariants(&analysis);

    let ShapeType::Sphere { radius, .. } = analysis.shape.shape_type else {
        panic!("expected a sphere, got {:?}", analysis.shape.shape_type);
    };
    assert_relative_eq!(radius, 0.035, epsilon = 2e-3);
    assert_relative_eq!(analysis.grasp_width, 0.07, epsilon = 4e-3);
    assert!(!analysis.graspable);
    Ok(())
}

#[test]
fn test_without_table() -> Result<(), AnalysisError> {
    let object = cylinder();
    let analysis = analyze(
        object.points(),
        object.normals().unwrap_or_default(),
        &[],
        &config(),
    )?;
    check_invariants(&analysis);

    assert!(analysis.table_plane.is_none());
    assert!(analysis.top_plane.is_none());
    // extent along up
    assert_relative_eq!(analysis.object_height, 0.1, epsilon = 5e-3);
    Ok(())
}

#[test]
fn test_wall_is_not_a_table() -> Result<(), AnalysisError> {
    let object = cuboid();
    let wall = synthetic::table_patch(DVec3::new(0.0, 0.0, 0.7), DVec3::NEG_Z, 0.4, 3000, 6);
    let analysis = analyze(
        object.points(),
        object.normals().unwrap_or_default(),
        wall.points(),
        &config(),
    )?;
    assert!(analysis.table_plane.is_none());
    assert!(analysis.top_plane.is_none());
    Ok(())
}

#[test]
fn test_seeded_analysis_is_repeatable() -> Result<(), AnalysisError> {
    let object = cuboid();
    let first = analyze_on_table(&object)?;
    let second = analyze_on_table(&object)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_serializes_to_json() -> Result<(), Box<dyn std::error::Error>> {
    let analysis = analyze_on_table(&cylinder())?;
    let value = serde_json::to_value(&analysis)?;
    assert_eq!(value["shape"]["shape_type"]["type"], "cylinder");
    assert!(value["grasp_confidence"].is_string());
    assert!(value["table_plane"]["model"].is_array());
    Ok(())
}

#[test]
fn test_analyze_from_ply_file() -> Result<(), Box<dyn std::error::Error>> {
    let object = cylinder();
    let file = tempfile::Builder::new().suffix(".ply").tempfile()?;
    write_ply_binary(file.path(), &object)?;

    let from_file = analyze_from_file(file.path(), None, &config())?;
    let in_memory = analyze(
        object.points(),
        object.normals().unwrap_or_default(),
        &[],
        &config(),
    )?;

    assert_eq!(from_file.shape.shape_type.kind(), ShapeKind::Cylinder);
    assert!(from_file.table_plane.is_none());
    assert_relative_eq!(from_file.grasp_width, in_memory.grasp_width, epsilon = 1e-3);
    Ok(())
}

#[test]
fn test_analyze_from_ply_without_normals() -> Result<(), Box<dyn std::error::Error>> {
    let object = cuboid();
    let bare = PointCloud::new(object.points().to_vec(), None, None);
    let file = tempfile::Builder::new().suffix(".ply").tempfile()?;
    write_ply_binary(file.path(), &bare)?;

    let analysis = analyze_from_file(file.path(), None, &config())?;
    check_invariants(&analysis);
    assert!(analysis.num_points > 1000);
    Ok(())
}
