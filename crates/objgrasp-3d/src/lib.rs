#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Point cloud filtering, clustering and normal estimation.
pub mod filter;

/// I/O utilities for reading and writing point clouds.
pub mod io;

/// Linear algebra utilities.
pub mod linalg;

/// Nearest neighbor search.
pub mod neighbors;

/// Oriented bounding boxes.
pub mod obb;

/// Point cloud container.
pub mod pointcloud;

/// Robust model fitting with RANSAC.
pub mod ransac;

/// Error types for geometric operations.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// Not enough points to estimate a model.
    #[error("Operation requires at least {required} points, got {actual}")]
    InsufficientPoints {
        /// Minimum number of points required.
        required: usize,
        /// Actual number of points provided.
        actual: usize,
    },

    /// The input configuration is degenerate for the requested model.
    #[error("Degenerate input: {0}")]
    Degenerate(String),
}
