//! Sphere, box and cylinder fitting.
//!
//! Every fitter is a pure function of its inputs and reports the fraction of
//! the points it explains together with the mean distance of those inliers to
//! the fitted surface.

use glam::{DMat3, DVec2, DVec3};
use objgrasp_3d::{
    linalg::{orthonormal_basis, symmetric_eigen3},
    obb::OrientedBoundingBox,
    ransac::{ransac_filtered, ransac_plane_with_normals, RansacModel, RansacParams, Sphere},
};

use crate::config::ShapeConfig;

/// Normals this close to the longest box side are left out of the axis estimate.
const AXIS_GUESS_MAX_COS: f64 = 0.5;

/// Outcome of one primitive fit.
#[derive(Debug, Clone)]
pub struct FitResult<P> {
    /// Fitted primitive parameters.
    pub params: P,
    /// Fraction of the points that are inliers of the primitive.
    pub inlier_ratio: f64,
    /// Mean distance of the inliers to the fitted surface.
    pub residual: f64,
}

/// Plane fit on the slab of points next to one box face.
#[derive(Debug, Clone, Copy)]
pub struct FaceFit {
    /// Index of the box axis orthogonal to the face.
    pub axis: usize,
    /// Outward unit normal of the face, on the camera side.
    pub normal: DVec3,
    /// Center of the face.
    pub center: DVec3,
    /// The two side lengths of the face.
    pub extents: [f64; 2],
    /// Fraction of the slab points explained by the face plane.
    pub inlier_ratio: f64,
    /// Mean distance of the face inliers to the face plane.
    pub residual: f64,
    /// Whether the face passed the ratio and orientation checks.
    pub confirmed: bool,
}

/// A box given by its bounding box and the three visible face fits.
#[derive(Debug, Clone)]
pub struct BoxFit {
    /// Bounding box aligned with the confirmed face normals.
    pub obb: OrientedBoundingBox,
    /// One face fit per box axis, in axis order.
    pub faces: [FaceFit; 3],
}

impl BoxFit {
    /// Iterator over the confirmed faces.
    pub fn confirmed_faces(&self) -> impl Iterator<Item = &FaceFit> {
        self.faces.iter().filter(|f| f.confirmed)
    }
}

/// A finite cylinder.
#[derive(Debug, Clone, Copy)]
pub struct CylinderFit {
    /// Unit axis direction.
    pub axis: DVec3,
    /// Point on the axis, halfway along the height.
    pub center: DVec3,
    /// Radius of the cylinder.
    pub radius: f64,
    /// Length of the cylinder along its axis.
    pub height: f64,
}

/// Runs the primitive fits over one object cloud.
///
/// The fitter borrows the cloud and never modifies it; each fit can be run
/// independently and in any order.
pub struct PrimitiveFitter<'a> {
    points: &'a [[f64; 3]],
    normals: &'a [[f64; 3]],
    obb: &'a OrientedBoundingBox,
    camera: DVec3,
    config: &'a ShapeConfig,
    seed: Option<u64>,
}

impl<'a> PrimitiveFitter<'a> {
    /// Create a fitter for aligned points and normals.
    pub fn new(
        points: &'a [[f64; 3]],
        normals: &'a [[f64; 3]],
        obb: &'a OrientedBoundingBox,
        camera: DVec3,
        config: &'a ShapeConfig,
        seed: Option<u64>,
    ) -> Self {
        Self {
            points,
            normals,
            obb,
            camera,
            config,
            seed,
        }
    }

    fn ransac_params(&self, threshold: f64, stream: u64) -> RansacParams {
        RansacParams {
            max_iterations: self.config.ransac_iterations,
            distance_threshold: threshold,
            random_seed: self.seed.map(|s| s.wrapping_add(stream)),
            ..Default::default()
        }
    }

    /// RANSAC sphere fit.
    ///
    /// Candidate spheres larger than the longest box side are rejected.
    pub fn sphere(&self) -> Option<FitResult<Sphere>> {
        let max_radius = self.obb.extents[0];
        let params = self.ransac_params(self.config.sphere_threshold, 1);
        let result = ransac_filtered::<Sphere>(self.points, &params, |s| {
            s.radius > 0.0 && s.radius <= max_radius
        })
        .ok()?;

        let sphere = result.model;
        let residual = mean(result.inliers.iter().map(|&i| {
            ((DVec3::from_array(self.points[i]) - sphere.center).length() - sphere.radius).abs()
        }));

        Some(FitResult {
            params: sphere,
            inlier_ratio: result.inlier_ratio(self.points.len()),
            residual,
        })
    }

    /// Box fit by confirming the camera-facing faces of the bounding box.
    ///
    /// For every axis the points within a slab next to the visible face are
    /// fitted with a plane whose inliers must also agree with its orientation.
    /// The box ratio is the fraction of confirmed faces scaled by their mean
    /// inlier ratio, so one or two visible faces still yield a box.
    pub fn cuboid(&self) -> Option<FitResult<BoxFit>> {
        if self.points.len() < 3 || self.normals.len() != self.points.len() {
            return None;
        }

        let obb = self.obb;
        let min_normal_cos = self.config.face_normal_max_angle_deg.to_radians().cos();

        // (axis, inlier ratio, fitted normal, residual, confirmed)
        let mut planes = Vec::with_capacity(3);
        for axis in 0..3 {
            let outward = obb.facing_normal(axis, self.camera);
            let face_center = obb.face_center(axis, outward);
            let depth = self.config.face_slab_fraction * obb.extents[axis];

            let slab = (0..self.points.len())
                .filter(|&i| (DVec3::from_array(self.points[i]) - face_center).dot(outward) >= -depth)
                .collect::<Vec<_>>();
            let slab_points = slab.iter().map(|&i| self.points[i]).collect::<Vec<_>>();
            let slab_normals = slab.iter().map(|&i| self.normals[i]).collect::<Vec<_>>();

            let params = self.ransac_params(self.config.face_threshold, 10 + axis as u64);
            let Ok(result) =
                ransac_plane_with_normals(&slab_points, &slab_normals, &params, min_normal_cos)
            else {
                planes.push((axis, 0.0, obb.axes[axis], 0.0, false));
                continue;
            };

            let plane = result.model;
            let ratio = result.inlier_ratio(slab_points.len());
            let alignment = plane.normal.dot(obb.axes[axis]).abs();
            let residual = mean(
                result
                    .inliers
                    .iter()
                    .map(|&i| plane.distance(DVec3::from_array(slab_points[i]))),
            );
            let confirmed =
                ratio > self.config.face_min_ratio && alignment > self.config.face_axis_alignment;

            log::debug!(
                "box face {axis}: {} slab points, ratio {ratio:.3}, alignment {alignment:.3}, confirmed {confirmed}",
                slab_points.len()
            );

            let normal = if plane.normal.dot(obb.axes[axis]) >= 0.0 {
                plane.normal
            } else {
                -plane.normal
            };
            planes.push((axis, ratio, normal, residual, confirmed));
        }

        let mut confirmed = planes.iter().filter(|p| p.4).collect::<Vec<_>>();
        confirmed.sort_by(|a, b| b.1.total_cmp(&a.1));

        // re-measure the box along the confirmed face normals
        let refined = match confirmed.as_slice() {
            [] => *obb,
            [first, rest @ ..] => {
                let a = first.0;
                let e0 = first.2.normalize_or(obb.axes[a]);
                let (b, nb) = match rest.first() {
                    Some(second) => (second.0, second.2),
                    None => ((a + 1) % 3, obb.axes[(a + 1) % 3]),
                };
                let e1 = (nb - e0 * nb.dot(e0)).normalize_or(obb.axes[b]);
                let c = 3 - a - b;
                let mut e2 = e0.cross(e1).normalize_or(obb.axes[c]);
                if e2.dot(obb.axes[c]) < 0.0 {
                    e2 = -e2;
                }
                let mut axes = obb.axes;
                axes[a] = e0;
                axes[b] = e1;
                axes[c] = e2;
                OrientedBoundingBox::from_axes(self.points, axes)
            }
        };

        let faces = [0, 1, 2].map(|axis| {
            let (_, ratio, _, residual, is_confirmed) = planes[axis];
            let normal = refined.facing_normal(axis, self.camera);
            FaceFit {
                axis,
                normal,
                center: refined.face_center(axis, normal),
                extents: refined.face_extents(axis),
                inlier_ratio: ratio,
                residual,
                confirmed: is_confirmed,
            }
        });

        let (inlier_ratio, residual) = if confirmed.is_empty() {
            (0.0, 0.0)
        } else {
            let mean_ratio = mean(confirmed.iter().map(|p| p.1));
            (
                confirmed.len() as f64 / 3.0 * mean_ratio,
                mean(confirmed.iter().map(|p| p.3)),
            )
        };

        Some(FitResult {
            params: BoxFit {
                obb: refined,
                faces,
            },
            inlier_ratio,
            residual,
        })
    }

    /// Cylinder fit around the axis of the curved side.
    ///
    /// Side normals are orthogonal to the axis, so the axis is the direction
    /// least covered by the normals of the points lying roughly along the
    /// longest box side. Only points whose normals stay within
    /// `cylinder_side_max_angle_deg` of orthogonal to the axis are projected
    /// onto the plane orthogonal to it, keeping caps out of the circle fit: an
    /// algebraic fit seeds a geometric Gauss-Newton fit, which is then repeated
    /// twice on its own inliers.
    pub fn cylinder(&self) -> Option<FitResult<CylinderFit>> {
        if self.points.len() < 3 || self.normals.len() != self.points.len() {
            return None;
        }

        let normals = self
            .normals
            .iter()
            .map(|n| DVec3::from_array(*n).normalize_or_zero())
            .collect::<Vec<_>>();

        let guess = self.obb.axes[0];
        let mut moments = DMat3::ZERO;
        for n in normals.iter().filter(|n| n.dot(guess).abs() < AXIS_GUESS_MAX_COS) {
            moments += DMat3::from_cols(*n * n.x, *n * n.y, *n * n.z);
        }
        if moments == DMat3::ZERO {
            return None;
        }
        let mut axis = symmetric_eigen3(&moments).vectors[0];
        if axis.dot(guess) < 0.0 {
            axis = -axis;
        }

        let max_side_cos = self.config.cylinder_side_max_angle_deg.to_radians().sin();
        let (u, v) = orthonormal_basis(axis);
        let origin = self.obb.center;
        let projected = self
            .points
            .iter()
            .zip(&normals)
            .filter(|(_, n)| n.dot(axis).abs() <= max_side_cos)
            .map(|(p, _)| {
                let d = DVec3::from_array(*p) - origin;
                DVec2::new(d.dot(u), d.dot(v))
            })
            .collect::<Vec<_>>();
        if projected.len() < 3 {
            return None;
        }

        let threshold = self.config.cylinder_threshold;
        let (mut center, mut radius) = fit_circle_algebraic(&projected)?;
        (center, radius) = refine_circle(&projected, center, radius);
        for _ in 0..2 {
            let inliers = projected
                .iter()
                .copied()
                .filter(|p| ((*p - center).length() - radius).abs() <= threshold)
                .collect::<Vec<_>>();
            if inliers.len() < 3 {
                break;
            }
            (center, radius) = refine_circle(&inliers, center, radius);
        }

        // the cross-section cannot be wider than the object
        if !radius.is_finite() || radius <= 0.0 || radius > self.obb.extents[1] {
            log::debug!("rejecting cylinder with radius {radius:.4}");
            return None;
        }

        let distances = projected
            .iter()
            .map(|p| ((*p - center).length() - radius).abs())
            .filter(|d| *d <= threshold)
            .collect::<Vec<_>>();

        let (t_min, t_max) = self
            .points
            .iter()
            .map(|p| (DVec3::from_array(*p) - origin).dot(axis))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
                (lo.min(t), hi.max(t))
            });

        Some(FitResult {
            params: CylinderFit {
                axis,
                center: origin + u * center.x + v * center.y + axis * (0.5 * (t_min + t_max)),
                radius,
                height: t_max - t_min,
            },
            inlier_ratio: distances.len() as f64 / self.points.len() as f64,
            residual: mean(distances.iter().copied()),
        })
    }
}

/// Algebraic (Kåsa) circle fit: least squares on `x² + y² + D x + E y + F = 0`.
fn fit_circle_algebraic(points: &[DVec2]) -> Option<(DVec2, f64)> {
    let mut ata = DMat3::ZERO;
    let mut atb = DVec3::ZERO;
    for p in points {
        let a = DVec3::new(p.x, p.y, 1.0);
        ata += DMat3::from_cols(a * a.x, a * a.y, a * a.z);
        atb += a * -p.length_squared();
    }
    if ata.determinant().abs() < 1e-18 {
        return None;
    }
    let sol = ata.inverse() * atb;
    let center = DVec2::new(-0.5 * sol.x, -0.5 * sol.y);
    let r2 = center.length_squared() - sol.z;
    (r2 > 0.0).then(|| (center, r2.sqrt()))
}

/// Gauss-Newton refinement of the geometric circle residual `|p - c| - r`.
fn refine_circle(points: &[DVec2], mut center: DVec2, mut radius: f64) -> (DVec2, f64) {
    const MAX_ITERATIONS: usize = 30;

    for _ in 0..MAX_ITERATIONS {
        let mut jtj = DMat3::ZERO;
        let mut jtr = DVec3::ZERO;
        for p in points {
            let d = *p - center;
            let dist = d.length();
            if dist < 1e-12 {
                continue;
            }
            let j = DVec3::new(-d.x / dist, -d.y / dist, -1.0);
            jtj += DMat3::from_cols(j * j.x, j * j.y, j * j.z);
            jtr += j * (dist - radius);
        }
        if jtj.determinant().abs() < 1e-18 {
            break;
        }
        let step = jtj.inverse() * -jtr;
        if !step.is_finite() {
            break;
        }
        center += DVec2::new(step.x, step.y);
        radius += step.z;
        if step.length() < 1e-12 {
            break;
        }
    }

    (center, radius.abs())
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
