mod parser;
mod properties;

pub use parser::*;
pub use properties::*;

/// Error types for the PLY module.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    /// Failed to read or write the PLY file
    #[error("Failed to read PLY file")]
    Io(#[from] std::io::Error),

    /// Failed to deserialize a PLY vertex
    #[error("Failed to deserialize PLY file")]
    Deserialize(#[from] bincode::error::DecodeError),

    /// Failed to serialize a PLY vertex
    #[error("Failed to serialize PLY file")]
    Serialize(#[from] bincode::error::EncodeError),

    /// Malformed PLY header
    #[error("Malformed PLY header: {0}")]
    MalformedHeader(String),

    /// Unsupported PLY property
    #[error("Unsupported PLY property")]
    UnsupportedProperty,

    /// Normals do not match the number of points
    #[error("Point cloud has {points} points but {normals} normals")]
    MismatchedNormals {
        /// Number of points.
        points: usize,
        /// Number of normals.
        normals: usize,
    },
}
