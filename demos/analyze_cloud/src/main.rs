use argh::FromArgs;
use std::path::PathBuf;

use glam::DVec3;
use objgrasp::{analyze, analyze_from_file, synthetic, AnalysisConfig};
use objgrasp_3d::{io::ply::write_ply_binary, pointcloud::PointCloud};

#[derive(FromArgs)]
/// Estimate the shape of an object and plan a parallel-gripper grasp
struct Args {
    /// path to the object point cloud (.ply or .pcd)
    #[argh(option, short = 'i')]
    input_path: Option<PathBuf>,

    /// path to the scene point cloud used to find the table
    #[argh(option, short = 's')]
    scene_path: Option<PathBuf>,

    /// analyze a synthetic object instead: cylinder, box, sphere or blob
    #[argh(option)]
    synthetic: Option<String>,

    /// write the synthetic object to this PLY file
    #[argh(option)]
    save_path: Option<PathBuf>,

    /// JSON configuration file
    #[argh(option, short = 'c')]
    config_path: Option<PathBuf>,

    /// fixed RANSAC seed
    #[argh(option)]
    seed: Option<u64>,
}

fn synthetic_object(kind: &str) -> Result<PointCloud, Box<dyn std::error::Error>> {
    // objects stand on a table at y = 0.15, half a meter in front of the camera
    let cloud = match kind {
        "cylinder" => synthetic::cylinder(DVec3::new(0.0, 0.1, 0.5), DVec3::NEG_Y, 0.03, 0.1, 1500, 1),
        "box" => synthetic::cuboid(DVec3::new(0.0, 0.13, 0.5), [0.06, 0.04, 0.08], 1500, 2),
        "sphere" => synthetic::sphere(DVec3::new(0.0, 0.115, 0.5), 0.035, 1200, 3),
        "blob" => synthetic::lumpy_blob(DVec3::new(0.0, 0.1, 0.5), 0.025, 1500, 4),
        _ => return Err(format!("Unsupported synthetic object: {kind}").into()),
    };
    Ok(cloud)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config_path {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let analysis = match (&args.synthetic, &args.input_path) {
        (Some(kind), _) => {
            let object = synthetic_object(kind)?;
            if let Some(path) = &args.save_path {
                write_ply_binary(path, &object)?;
                println!("Wrote #{} points to {}", object.len(), path.display());
            }
            let table = synthetic::table_patch(DVec3::new(0.0, 0.15, 0.5), DVec3::NEG_Y, 0.4, 3000, 5);
            let scene = [table.points(), object.points()].concat();
            analyze(
                object.points(),
                object.normals().unwrap_or_default(),
                &scene,
                &config,
            )?
        }
        (None, Some(path)) => analyze_from_file(path, args.scene_path.as_deref(), &config)?,
        (None, None) => return Err("either --input-path or --synthetic is required".into()),
    };

    println!("{}", serde_json::to_string_pretty(&analysis)?);

    Ok(())
}
