use std::num::NonZeroUsize;

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

/// Nearest neighbor index over a fixed set of 3d points.
///
/// Wraps an immutable kd-tree; items are the positions of the points in the
/// slice the index was built from.
pub struct NeighborIndex {
    tree: Option<ImmutableKdTree<f64, u32, 3, 32>>,
    len: usize,
}

impl NeighborIndex {
    /// Build the index from a slice of points.
    pub fn new(points: &[[f64; 3]]) -> Self {
        let tree = (!points.is_empty()).then(|| ImmutableKdTree::new_from_slice(points));
        Self {
            tree,
            len: points.len(),
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the index holds no points.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Find the `k` nearest points to `query`, sorted by increasing distance.
    ///
    /// Returns pairs of `(index, euclidean distance)`. A query point that is part
    /// of the index is returned as its own first neighbor.
    pub fn knn(&self, query: &[f64; 3], k: usize) -> Vec<(usize, f64)> {
        let (Some(tree), Some(k)) = (&self.tree, NonZeroUsize::new(k.min(self.len))) else {
            return Vec::new();
        };
        tree.nearest_n::<SquaredEuclidean>(query, k)
            .into_iter()
            .map(|nn| (nn.item as usize, nn.distance.sqrt()))
            .collect()
    }

    /// Indices of the `k` nearest points to `query`, sorted by increasing distance.
    pub fn knn_indices(&self, query: &[f64; 3], k: usize) -> Vec<usize> {
        self.knn(query, k).into_iter().map(|(i, _)| i).collect()
    }

    /// Indices of all points within `radius` of `query`, in no particular order.
    pub fn within(&self, query: &[f64; 3], radius: f64) -> Vec<usize> {
        let Some(tree) = &self.tree else {
            return Vec::new();
        };
        tree.within_unsorted::<SquaredEuclidean>(query, radius * radius)
            .into_iter()
            .map(|nn| nn.item as usize)
            .collect()
    }
}
