use glam::DVec3;

use crate::linalg::{points_covariance, symmetric_eigen3};
use crate::pointcloud::centroid;

/// Oriented bounding box aligned to the principal axes of a point set.
///
/// The axes are unit vectors sorted by decreasing extent, so `axes[0]` is the
/// longest side of the box and `axes[2]` the shortest. The axes form a
/// right-handed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBoundingBox {
    /// Center of the box.
    pub center: DVec3,
    /// Unit axes of the box, sorted by decreasing extent.
    pub axes: [DVec3; 3],
    /// Full side lengths along each axis.
    pub extents: [f64; 3],
}

impl Default for OrientedBoundingBox {
    fn default() -> Self {
        Self {
            center: DVec3::ZERO,
            axes: [DVec3::X, DVec3::Y, DVec3::Z],
            extents: [0.0; 3],
        }
    }
}

impl OrientedBoundingBox {
    /// Compute the box from the principal axes (PCA) of the points.
    ///
    /// Returns a degenerate box at the origin for an empty input.
    pub fn from_points(points: &[[f64; 3]]) -> Self {
        if points.is_empty() {
            return Self::default();
        }

        let eig = symmetric_eigen3(&points_covariance(points));
        let mut axes = eig.vectors;
        if axes.iter().any(|a| a.length_squared() < 0.5) {
            axes = [DVec3::X, DVec3::Y, DVec3::Z];
        }

        let fitted = Self::from_axes(points, axes);
        let mut sides = (0..3)
            .map(|i| (fitted.extents[i], fitted.axes[i]))
            .collect::<Vec<_>>();
        sides.sort_by(|a, b| b.0.total_cmp(&a.0));

        let x = sides[0].1;
        let y = sides[1].1;
        Self {
            center: fitted.center,
            axes: [x, y, x.cross(y).normalize_or_zero()],
            extents: [sides[0].0, sides[1].0, sides[2].0],
        }
    }

    /// Compute the tightest box around the points with the given unit axes.
    ///
    /// The axes are kept in the given order, so the extents are not sorted.
    pub fn from_axes(points: &[[f64; 3]], axes: [DVec3; 3]) -> Self {
        if points.is_empty() {
            return Self {
                axes,
                ..Default::default()
            };
        }

        let mean = centroid(points);
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for p in points {
            let d = DVec3::from_array(*p) - mean;
            for i in 0..3 {
                let s = d.dot(axes[i]);
                min[i] = min[i].min(s);
                max[i] = max[i].max(s);
            }
        }

        let center = mean + (0..3).map(|i| axes[i] * (0.5 * (max[i] + min[i]))).sum::<DVec3>();
        Self {
            center,
            axes,
            extents: [max[0] - min[0], max[1] - min[1], max[2] - min[2]],
        }
    }

    /// Total surface area of the box.
    pub fn surface_area(&self) -> f64 {
        let [a, b, c] = self.extents;
        2.0 * (a * b + b * c + a * c)
    }

    /// The two extents lying in the face orthogonal to `axis`.
    pub fn face_extents(&self, axis: usize) -> [f64; 2] {
        let others = [(axis + 1) % 3, (axis + 2) % 3];
        [self.extents[others[0]], self.extents[others[1]]]
    }

    /// Center of the face orthogonal to `axis` on the side of `outward`.
    pub fn face_center(&self, axis: usize, outward: DVec3) -> DVec3 {
        let sign = if outward.dot(self.axes[axis]) >= 0.0 {
            1.0
        } else {
            -1.0
        };
        self.center + self.axes[axis] * (sign * 0.5 * self.extents[axis])
    }

    /// Outward direction of the face orthogonal to `axis` that faces `viewpoint`.
    ///
    /// When the viewpoint lies exactly in the face plane the positive axis is returned.
    pub fn facing_normal(&self, axis: usize, viewpoint: DVec3) -> DVec3 {
        if (viewpoint - self.center).dot(self.axes[axis]) >= 0.0 {
            self.axes[axis]
        } else {
            -self.axes[axis]
        }
    }
}
