use glam::DVec3;

/// A point cloud with points, colors, and normals.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The colors of the points.
    colors: Option<Vec<[u8; 3]>>,
    // The normals of the points.
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points, colors (optional), and normals (optional).
    pub fn new(
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[u8; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Self {
        Self {
            points,
            colors,
            normals,
        }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the colors of the points in the point cloud.
    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Consume the point cloud and return its points and normals.
    pub fn into_parts(self) -> (Vec<[f64; 3]>, Option<Vec<[f64; 3]>>) {
        (self.points, self.normals)
    }

    /// Build a new point cloud holding the points at `indices`, keeping colors and normals aligned.
    pub fn select(&self, indices: &[usize]) -> PointCloud {
        let points = indices.iter().map(|&i| self.points[i]).collect();
        let colors = self
            .colors
            .as_ref()
            .map(|c| indices.iter().map(|&i| c[i]).collect());
        let normals = self
            .normals
            .as_ref()
            .map(|n| indices.iter().map(|&i| n[i]).collect());
        PointCloud::new(points, colors, normals)
    }

    /// Get the mean of all points. Returns the origin for an empty cloud.
    pub fn centroid(&self) -> DVec3 {
        centroid(&self.points)
    }
}

/// Mean of a set of points. Returns the origin for an empty slice.
pub fn centroid(points: &[[f64; 3]]) -> DVec3 {
    if points.is_empty() {
        return DVec3::ZERO;
    }
    let sum = points
        .iter()
        .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p));
    sum / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointcloud() {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            Some(vec![[255, 0, 0], [0, 255, 0]]),
            Some(vec![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
        );

        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.points().len(), 2);
        assert_eq!(pointcloud.colors().map(|c| c.len()), Some(2));
        assert_eq!(pointcloud.normals().map(|n| n.len()), Some(2));
        assert_eq!(pointcloud.centroid(), DVec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_select_keeps_attributes_aligned() {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            None,
            Some(vec![[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
        );

        let selected = pointcloud.select(&[2, 0]);
        assert_eq!(selected.points(), &[[2.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        assert_eq!(
            selected.normals(),
            Some(&[[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]][..])
        );
        assert!(selected.colors().is_none());
    }

    #[test]
    fn test_empty_centroid() {
        let pointcloud = PointCloud::default();
        assert!(pointcloud.is_empty());
        assert_eq!(pointcloud.centroid(), DVec3::ZERO);
    }
}
