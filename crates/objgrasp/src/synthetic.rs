//! Seeded surface samples of simple objects with exact normals.
//!
//! Samples are uniform over the surface area, like points sampled from a mesh.
//! Every generator returns a [`PointCloud`] with normals pointing out of the
//! object.

use std::f64::consts::TAU;

use glam::DVec3;
use objgrasp_3d::{linalg::orthonormal_basis, pointcloud::PointCloud};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn cloud(points: Vec<DVec3>, normals: Vec<DVec3>) -> PointCloud {
    PointCloud::new(
        points.iter().map(|p| p.to_array()).collect(),
        None,
        Some(normals.iter().map(|n| n.to_array()).collect()),
    )
}

fn random_direction(rng: &mut StdRng) -> DVec3 {
    let z: f64 = rng.random_range(-1.0..1.0);
    let phi = rng.random_range(0.0..TAU);
    let r = f64::sqrt(1.0 - z * z);
    DVec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// A closed cylinder with its caps.
///
/// `axis` is normalized; the cylinder spans `height / 2` on both sides of
/// `center` along it.
pub fn cylinder(
    center: DVec3,
    axis: DVec3,
    radius: f64,
    height: f64,
    num_points: usize,
    seed: u64,
) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let axis = axis.normalize_or(DVec3::NEG_Y);
    let (u, v) = orthonormal_basis(axis);

    let lateral = TAU * radius * height;
    let cap = 0.5 * TAU * radius * radius;
    let total = lateral + 2.0 * cap;

    let mut points = Vec::with_capacity(num_points);
    let mut normals = Vec::with_capacity(num_points);
    for _ in 0..num_points {
        let pick = rng.random_range(0.0..total);
        let theta = rng.random_range(0.0..TAU);
        let radial = u * theta.cos() + v * theta.sin();
        if pick < lateral {
            let t = rng.random_range(-0.5..0.5) * height;
            points.push(center + radial * radius + axis * t);
            normals.push(radial);
        } else {
            let side = if pick < lateral + cap { 1.0 } else { -1.0 };
            let r = radius * rng.random::<f64>().sqrt();
            points.push(center + axis * (side * 0.5 * height) + radial * r);
            normals.push(axis * side);
        }
    }
    cloud(points, normals)
}

/// An axis aligned box with side lengths `dims` along x, y and z.
pub fn cuboid(center: DVec3, dims: [f64; 3], num_points: usize, seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);

    let faces = (0..3)
        .flat_map(|axis| {
            let area = dims[(axis + 1) % 3] * dims[(axis + 2) % 3];
            [(axis, -1.0, area), (axis, 1.0, area)]
        })
        .collect::<Vec<_>>();
    let total = faces.iter().map(|f| f.2).sum::<f64>();

    let mut points = Vec::with_capacity(num_points);
    let mut normals = Vec::with_capacity(num_points);
    for _ in 0..num_points {
        let mut pick = rng.random_range(0.0..total);
        let mut face = faces[faces.len() - 1];
        for f in &faces {
            if pick < f.2 {
                face = *f;
                break;
            }
            pick -= f.2;
        }

        let (axis, sign, _) = face;
        let mut local = [0.0; 3];
        let mut normal = [0.0; 3];
        local[axis] = sign * 0.5 * dims[axis];
        normal[axis] = sign;
        for other in [(axis + 1) % 3, (axis + 2) % 3] {
            local[other] = rng.random_range(-0.5..0.5) * dims[other];
        }
        points.push(center + DVec3::from_array(local));
        normals.push(DVec3::from_array(normal));
    }
    cloud(points, normals)
}

/// A sphere.
pub fn sphere(center: DVec3, radius: f64, num_points: usize, seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let (points, normals) = (0..num_points)
        .map(|_| {
            let d = random_direction(&mut rng);
            (center + d * radius, d)
        })
        .unzip();
    cloud(points, normals)
}

const BLOB_STRETCH: DVec3 = DVec3::new(1.5, 0.8, 1.0);
const BLOB_WEIGHT: f64 = 0.3;

/// Log radius of the blob along the unit direction `d` and its gradient.
///
/// A sum of low order harmonics gives a surface with several bumps and
/// saddles that no single primitive follows.
fn blob_log_radius(d: DVec3) -> (f64, DVec3) {
    let (x, y, z) = (d.x, d.y, d.z);
    let w = BLOB_WEIGHT;

    let g = w * (x.powi(3) - 3.0 * x * y * y)
        + w * (y.powi(3) - 3.0 * y * z * z)
        + w * (15.0 * x * y * z)
        + w * (z.powi(3) - 3.0 * z * x * x)
        + w * (x.powi(4) - 6.0 * x * x * z * z + z.powi(4))
        + w * 8.0 * x * y * (x * x - y * y);

    let gx = w * (3.0 * x * x - 3.0 * y * y) + w * 15.0 * y * z - w * 6.0 * z * x
        + w * (4.0 * x.powi(3) - 12.0 * x * z * z)
        + w * 8.0 * (3.0 * x * x * y - y.powi(3));
    let gy = -w * 6.0 * x * y + w * (3.0 * y * y - 3.0 * z * z) + w * 15.0 * x * z
        + w * 8.0 * (x.powi(3) - 3.0 * x * y * y);
    let gz = -w * 6.0 * y * z + w * 15.0 * x * y + w * (3.0 * z * z - 3.0 * x * x)
        + w * (4.0 * z.powi(3) - 12.0 * x * x * z);

    (g, DVec3::new(gx, gy, gz))
}

/// Surface point, normal and area density of the blob along direction `d`.
fn blob_sample(d: DVec3, scale: f64) -> (DVec3, DVec3, f64) {
    let (g, grad) = blob_log_radius(d);
    let tangential = grad - d * grad.dot(d);
    let unit_normal = (d - tangential).normalize_or(d);
    let radius = scale * g.exp();

    let point = d * radius * BLOB_STRETCH;
    let normal = unit_normal / BLOB_STRETCH;
    let weight = radius * radius / unit_normal.dot(d) * normal.length();
    (point, normal.normalize_or(d), weight)
}

/// A lumpy, stretched star-shaped blob roughly `7 x 4 x 5` times `scale`.
///
/// Stands in for scanned organic objects: no sphere, cylinder or box explains
/// a large share of its surface.
pub fn lumpy_blob(center: DVec3, scale: f64, num_points: usize, seed: u64) -> PointCloud {
    const WEIGHT_PROBES: usize = 4096;

    let mut rng = StdRng::seed_from_u64(seed);
    let max_weight = (0..WEIGHT_PROBES)
        .map(|_| blob_sample(random_direction(&mut rng), scale).2)
        .fold(0.0, f64::max)
        * 1.2;

    let mut points = Vec::with_capacity(num_points);
    let mut normals = Vec::with_capacity(num_points);
    while points.len() < num_points {
        let (p, n, w) = blob_sample(random_direction(&mut rng), scale);
        // rejection sampling turns direction samples into area samples
        if rng.random::<f64>() * max_weight > w {
            continue;
        }
        points.push(center + p);
        normals.push(n);
    }
    cloud(points, normals)
}

/// A flat square patch of side `size` centered at `center`, orthogonal to `up`.
pub fn table_patch(center: DVec3, up: DVec3, size: f64, num_points: usize, seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let up = up.normalize_or(DVec3::NEG_Y);
    let (u, v) = orthonormal_basis(up);
    let points = (0..num_points)
        .map(|_| {
            let a = rng.random_range(-0.5..0.5) * size;
            let b = rng.random_range(-0.5..0.5) * size;
            center + u * a + v * b
        })
        .collect();
    cloud(points, vec![up; num_points])
}

/// The part of `cloud` a camera at `camera` sees: points whose normals face it.
///
/// Self occlusion is not modelled, which is exact for convex objects. Clouds
/// without normals are returned unchanged.
pub fn visible_from(cloud: &PointCloud, camera: DVec3) -> PointCloud {
    let Some(normals) = cloud.normals() else {
        return cloud.clone();
    };
    let visible = cloud
        .points()
        .iter()
        .zip(normals)
        .enumerate()
        .filter(|(_, (p, n))| DVec3::from_array(**n).dot(camera - DVec3::from_array(**p)) > 0.0)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    cloud.select(&visible)
}
