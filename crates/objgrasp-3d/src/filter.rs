use std::collections::{HashSet, VecDeque};

use glam::DVec3;

use crate::linalg::{covariance3, symmetric_eigen3};
use crate::neighbors::NeighborIndex;

/// Remove points whose mean distance to their neighbors is unusually large.
///
/// For every point the mean distance to its `k` nearest neighbors is computed.
/// Points whose mean distance exceeds `mean + std_ratio * std` over the whole
/// cloud are discarded.
///
/// Returns the indices of the kept points in ascending order. Clouds with at
/// most `k` points are returned unchanged.
pub fn statistical_outlier_removal(points: &[[f64; 3]], k: usize, std_ratio: f64) -> Vec<usize> {
    if k == 0 || points.len() <= k {
        return (0..points.len()).collect();
    }

    let index = NeighborIndex::new(points);
    let mean_dists = points
        .iter()
        .map(|p| {
            // the first neighbor is the point itself
            let nn = index.knn(p, k + 1);
            let sum = nn.iter().skip(1).map(|(_, d)| d).sum::<f64>();
            sum / (nn.len().saturating_sub(1)).max(1) as f64
        })
        .collect::<Vec<_>>();

    let n = mean_dists.len() as f64;
    let mean = mean_dists.iter().sum::<f64>() / n;
    let var = mean_dists.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    let limit = mean + std_ratio * var.sqrt();

    mean_dists
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| (d <= limit).then_some(i))
        .collect()
}

/// Density based clustering (DBSCAN).
///
/// Returns one label per point: `Some(cluster_id)` for clustered points and
/// `None` for noise. Cluster ids are assigned in discovery order starting at zero.
pub fn dbscan(points: &[[f64; 3]], eps: f64, min_points: usize) -> Vec<Option<usize>> {
    let n = points.len();
    let mut labels = vec![None; n];
    if n == 0 {
        return labels;
    }

    let index = NeighborIndex::new(points);
    let mut visited = vec![false; n];
    let mut cluster = 0;

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        let seeds = index.within(&points[i], eps);
        if seeds.len() < min_points {
            continue;
        }

        labels[i] = Some(cluster);
        let mut queue = VecDeque::from(seeds);
        while let Some(j) = queue.pop_front() {
            if labels[j].is_none() {
                labels[j] = Some(cluster);
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;

            let neighbors = index.within(&points[j], eps);
            if neighbors.len() >= min_points {
                queue.extend(neighbors.into_iter().filter(|&m| !visited[m]));
            }
        }
        cluster += 1;
    }

    log::trace!("dbscan found {cluster} clusters in {n} points");

    labels
}

/// Indices of the points belonging to the most populated cluster.
///
/// Ties are resolved in favor of the cluster found first. Returns `None` when
/// every point is noise.
pub fn largest_cluster(labels: &[Option<usize>]) -> Option<Vec<usize>> {
    let num_clusters = labels.iter().flatten().max().map(|m| m + 1)?;
    let mut counts = vec![0usize; num_clusters];
    for label in labels.iter().flatten() {
        counts[*label] += 1;
    }

    let mut best = 0;
    for (id, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = id;
        }
    }

    Some(
        labels
            .iter()
            .enumerate()
            .filter_map(|(i, l)| (*l == Some(best)).then_some(i))
            .collect(),
    )
}

/// Estimate unit normals from the local covariance of the `k` nearest neighbors.
///
/// Each normal is flipped to point towards `viewpoint`. Points with fewer than
/// three neighbors get a normal pointing at the viewpoint.
pub fn estimate_normals(points: &[[f64; 3]], k: usize, viewpoint: DVec3) -> Vec<[f64; 3]> {
    let index = NeighborIndex::new(points);
    points
        .iter()
        .map(|p| {
            let p_vec = DVec3::from_array(*p);
            let to_view = (viewpoint - p_vec).normalize_or(DVec3::NEG_Z);

            let nn = index.knn_indices(p, k.max(3));
            if nn.len() < 3 {
                return to_view.to_array();
            }
            let local = nn
                .iter()
                .map(|&i| DVec3::from_array(points[i]))
                .collect::<Vec<_>>();
            let eig = symmetric_eigen3(&covariance3(&local));
            let normal = eig.vectors[0].normalize_or(to_view);
            if normal.dot(to_view) < 0.0 {
                (-normal).to_array()
            } else {
                normal.to_array()
            }
        })
        .collect()
}

/// Number of distinct cubic voxels of side `voxel_size` touched by the points.
pub fn occupied_voxels(points: &[[f64; 3]], voxel_size: f64) -> usize {
    if voxel_size <= 0.0 {
        return 0;
    }
    points
        .iter()
        .map(|p| {
            [
                (p[0] / voxel_size).floor() as i64,
                (p[1] / voxel_size).floor() as i64,
                (p[2] / voxel_size).floor() as i64,
            ]
        })
        .collect::<HashSet<_>>()
        .len()
}
