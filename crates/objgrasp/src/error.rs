use objgrasp_3d::io::{pcd::PcdError, ply::PlyError};

/// Errors raised by the analysis pipeline.
///
/// Only the caller contract violations and file entry point failures escape
/// [`crate::analyze`]; `InsufficientData` and `EmptyCluster` select the
/// fallback analysis instead.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The caller supplied unusable input, e.g. an empty object cloud.
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Description of the violation.
        reason: String,
    },

    /// Two arrays that must be aligned have different lengths.
    #[error("Mismatched array lengths: {left_name} has {left_len} but {right_name} has {right_len}")]
    MismatchedLengths {
        /// Name of the first array.
        left_name: &'static str,
        /// Length of the first array.
        left_len: usize,
        /// Name of the second array.
        right_name: &'static str,
        /// Length of the second array.
        right_len: usize,
    },

    /// Too few points to form a neighborhood or fit a model.
    #[error("Insufficient data: requires at least {required} points, got {actual}")]
    InsufficientData {
        /// Minimum number of points required.
        required: usize,
        /// Actual number of points provided.
        actual: usize,
    },

    /// Outlier removal and clustering left no cluster.
    #[error("No cluster survived outlier removal")]
    EmptyCluster,

    /// The run was cancelled before it completed.
    #[error("Analysis was cancelled")]
    Cancelled,

    /// Failed to read a PLY file.
    #[error(transparent)]
    Ply(#[from] PlyError),

    /// Failed to read a PCD file.
    #[error(transparent)]
    Pcd(#[from] PcdError),

    /// The file extension is not a supported point cloud format.
    #[error("Unsupported point cloud format: {0}")]
    UnsupportedFormat(String),

    /// Failed to parse a configuration file.
    #[error("Failed to parse configuration")]
    Config(#[from] serde_json::Error),

    /// Failed to read a file.
    #[error("Failed to read file")]
    Io(#[from] std::io::Error),
}
