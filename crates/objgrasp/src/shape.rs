use std::fmt;

use glam::DVec3;
use objgrasp_3d::obb::OrientedBoundingBox;
use serde::Serialize;

use crate::config::{AnalysisConfig, CurvatureConfig, ShapeConfig};
use crate::curvature::{compute_profile, CurvatureProfile};
use crate::error::AnalysisError;
use crate::fitting::{BoxFit, CylinderFit, FitResult, PrimitiveFitter};

/// Confidence reported for objects that match no primitive.
pub const IRREGULAR_CONFIDENCE: f64 = 0.1;

/// The primitive families, without their parameters.
///
/// The declaration order is the tie-break preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    /// A cuboid.
    Box,
    /// A finite circular cylinder.
    Cylinder,
    /// A sphere.
    Sphere,
    /// No primitive explains the points.
    Irregular,
}

impl ShapeKind {
    /// Lowercase name of the shape.
    pub fn label(self) -> &'static str {
        match self {
            ShapeKind::Box => "box",
            ShapeKind::Cylinder => "cylinder",
            ShapeKind::Sphere => "sphere",
            ShapeKind::Irregular => "irregular",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One face of a box estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxFace {
    /// Outward unit normal on the camera side.
    pub normal: [f64; 3],
    /// Center of the face.
    pub center: [f64; 3],
    /// The two side lengths of the face.
    pub extents: [f64; 2],
    /// Inlier ratio of the face plane within its slab.
    pub inlier_ratio: f64,
    /// Whether the face was confirmed by the plane fit.
    pub confirmed: bool,
}

impl BoxFace {
    /// The shorter of the two side lengths.
    pub fn short_side(&self) -> f64 {
        self.extents[0].min(self.extents[1])
    }

    /// Area of the face.
    pub fn area(&self) -> f64 {
        self.extents[0] * self.extents[1]
    }
}

/// The estimated shape together with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeType {
    /// A cylinder along `axis`.
    Cylinder {
        /// Radius in meters.
        radius: f64,
        /// Length along the axis in meters.
        height: f64,
        /// Unit axis direction.
        axis: [f64; 3],
        /// Point on the axis halfway along the height.
        center: [f64; 3],
    },
    /// A cuboid.
    Box {
        /// Side lengths along the box axes.
        extents: [f64; 3],
        /// The camera-facing face of each box axis.
        faces: [BoxFace; 3],
    },
    /// A sphere.
    Sphere {
        /// Radius in meters.
        radius: f64,
        /// Center of the sphere.
        center: [f64; 3],
    },
    /// Anything else, described by its bounding box side lengths.
    Irregular {
        /// Side lengths of the oriented bounding box, longest first.
        extents: [f64; 3],
    },
}

impl ShapeType {
    /// The shape family.
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeType::Cylinder { .. } => ShapeKind::Cylinder,
            ShapeType::Box { .. } => ShapeKind::Box,
            ShapeType::Sphere { .. } => ShapeKind::Sphere,
            ShapeType::Irregular { .. } => ShapeKind::Irregular,
        }
    }
}

/// A serializable oriented bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    /// Center of the box.
    pub center: [f64; 3],
    /// Unit axes, longest side first.
    pub axes: [[f64; 3]; 3],
    /// Side lengths along `axes`.
    pub extents: [f64; 3],
}

impl From<&OrientedBoundingBox> for BoundingBox {
    fn from(obb: &OrientedBoundingBox) -> Self {
        Self {
            center: obb.center.to_array(),
            axes: obb.axes.map(|a| a.to_array()),
            extents: obb.extents,
        }
    }
}

impl BoundingBox {
    /// Convert back to the geometric box.
    pub fn to_obb(&self) -> OrientedBoundingBox {
        OrientedBoundingBox {
            center: DVec3::from_array(self.center),
            axes: self.axes.map(DVec3::from_array),
            extents: self.extents,
        }
    }
}

/// Outcome of the shape estimation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeEstimate {
    /// The winning shape with its parameters.
    pub shape_type: ShapeType,
    /// Inlier ratio of the winning fit, or [`IRREGULAR_CONFIDENCE`].
    pub confidence: f64,
    /// Principal axes bounding box of the object.
    pub oriented_bbox: BoundingBox,
    /// Flatness summary of the object surface.
    pub curvature_profile: CurvatureProfile,
    /// Mean inlier distance of the winning fit; `None` for irregular shapes.
    pub fit_residual: Option<f64>,
}

impl ShapeEstimate {
    /// An irregular estimate described only by the bounding box.
    pub fn irregular(obb: &OrientedBoundingBox, curvature_profile: CurvatureProfile) -> Self {
        Self {
            shape_type: ShapeType::Irregular {
                extents: obb.extents,
            },
            confidence: IRREGULAR_CONFIDENCE,
            oriented_bbox: obb.into(),
            curvature_profile,
            fit_residual: None,
        }
    }
}

enum Candidate {
    Box(FitResult<BoxFit>),
    Cylinder(FitResult<CylinderFit>),
    Sphere(FitResult<objgrasp_3d::ransac::Sphere>),
}

impl Candidate {
    fn kind(&self) -> ShapeKind {
        match self {
            Candidate::Box(_) => ShapeKind::Box,
            Candidate::Cylinder(_) => ShapeKind::Cylinder,
            Candidate::Sphere(_) => ShapeKind::Sphere,
        }
    }

    fn ratio(&self) -> f64 {
        match self {
            Candidate::Box(fit) => fit.inlier_ratio,
            Candidate::Cylinder(fit) => fit.inlier_ratio,
            Candidate::Sphere(fit) => fit.inlier_ratio,
        }
    }

    fn into_estimate(
        self,
        obb: &OrientedBoundingBox,
        curvature_profile: CurvatureProfile,
    ) -> ShapeEstimate {
        let (shape_type, confidence, residual) = match self {
            Candidate::Cylinder(fit) => (
                ShapeType::Cylinder {
                    radius: fit.params.radius,
                    height: fit.params.height,
                    axis: fit.params.axis.to_array(),
                    center: fit.params.center.to_array(),
                },
                fit.inlier_ratio,
                fit.residual,
            ),
            Candidate::Box(fit) => (
                ShapeType::Box {
                    extents: fit.params.obb.extents,
                    faces: fit.params.faces.map(|f| BoxFace {
                        normal: f.normal.to_array(),
                        center: f.center.to_array(),
                        extents: f.extents,
                        inlier_ratio: f.inlier_ratio,
                        confirmed: f.confirmed,
                    }),
                },
                fit.inlier_ratio,
                fit.residual,
            ),
            Candidate::Sphere(fit) => (
                ShapeType::Sphere {
                    radius: fit.params.radius,
                    center: fit.params.center.to_array(),
                },
                fit.inlier_ratio,
                fit.residual,
            ),
        };
        ShapeEstimate {
            shape_type,
            confidence: confidence.clamp(0.0, 1.0),
            oriented_bbox: obb.into(),
            curvature_profile,
            fit_residual: Some(residual),
        }
    }
}

/// Index of the winning candidate among `(kind, inlier ratio)` pairs.
///
/// Candidates within `tie_margin` of the best ratio are tied and resolved by
/// the [`ShapeKind`] order. Returns `None` when the best ratio is below
/// `min_ratio`.
fn select(candidates: &[(ShapeKind, f64)], min_ratio: f64, tie_margin: f64) -> Option<usize> {
    let best = candidates
        .iter()
        .map(|(_, r)| *r)
        .max_by(|a, b| a.total_cmp(b))?;
    if best < min_ratio {
        return None;
    }
    candidates
        .iter()
        .enumerate()
        .filter(|(_, (_, r))| best - r <= tie_margin)
        .min_by_key(|(_, (kind, _))| *kind)
        .map(|(i, _)| i)
}

/// Chooses and fits the primitive that best explains an object cloud.
#[derive(Debug, Clone)]
pub struct ShapeEstimator {
    curvature: CurvatureConfig,
    shape: ShapeConfig,
    camera: DVec3,
    seed: Option<u64>,
}

impl ShapeEstimator {
    /// Create an estimator looking from `camera`.
    pub fn new(
        curvature: CurvatureConfig,
        shape: ShapeConfig,
        camera: DVec3,
        seed: Option<u64>,
    ) -> Self {
        Self {
            curvature,
            shape,
            camera,
            seed,
        }
    }

    /// Create an estimator from the analysis configuration.
    pub fn from_config(config: &AnalysisConfig, seed: Option<u64>) -> Self {
        Self::new(
            config.curvature,
            config.shape,
            DVec3::from_array(config.camera_position),
            seed,
        )
    }

    /// Estimate the shape of an object.
    ///
    /// The curvature profile decides which fit is attempted first: mostly
    /// flat surfaces try a box, mostly curved ones a sphere and mixed ones a
    /// cylinder. When the first fit explains too few points all three are
    /// compared.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InsufficientData`] when the cloud cannot form a
    /// curvature neighborhood, and [`AnalysisError::MismatchedLengths`] when
    /// points and normals are not aligned.
    pub fn estimate(
        &self,
        points: &[[f64; 3]],
        normals: &[[f64; 3]],
    ) -> Result<ShapeEstimate, AnalysisError> {
        let curvature = compute_profile(points, normals, &self.curvature)?;
        let profile = curvature.profile;
        let obb = OrientedBoundingBox::from_points(points);
        let fitter =
            PrimitiveFitter::new(points, normals, &obb, self.camera, &self.shape, self.seed);

        let fit = |kind: ShapeKind| -> Option<Candidate> {
            match kind {
                ShapeKind::Box => fitter.cuboid().map(Candidate::Box),
                ShapeKind::Cylinder => fitter.cylinder().map(Candidate::Cylinder),
                ShapeKind::Sphere => fitter.sphere().map(Candidate::Sphere),
                ShapeKind::Irregular => None,
            }
        };

        let primary = if profile.flat_ratio > self.shape.class_ratio {
            ShapeKind::Box
        } else if profile.curved_ratio > self.shape.class_ratio {
            ShapeKind::Sphere
        } else {
            ShapeKind::Cylinder
        };

        let mut candidates = fit(primary).into_iter().collect::<Vec<_>>();
        let primary_ratio = candidates.first().map_or(0.0, Candidate::ratio);
        log::debug!("primary {primary} fit ratio {primary_ratio:.3}");

        if primary_ratio < self.shape.min_fit_ratio {
            for kind in [ShapeKind::Box, ShapeKind::Cylinder, ShapeKind::Sphere] {
                if kind != primary {
                    candidates.extend(fit(kind));
                }
            }
        }

        let scores = candidates
            .iter()
            .map(|c| (c.kind(), c.ratio()))
            .collect::<Vec<_>>();
        log::debug!("candidate fits: {scores:?}");

        match select(&scores, self.shape.min_fit_ratio, self.shape.tie_margin) {
            Some(winner) => {
                let candidate = candidates.swap_remove(winner);
                Ok(candidate.into_estimate(&obb, profile))
            }
            None => {
                log::debug!("no primitive explains the object, classifying as irregular");
                Ok(ShapeEstimate::irregular(&obb, profile))
            }
        }
    }
}
