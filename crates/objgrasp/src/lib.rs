#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Full analysis pipeline and its result.
pub mod analysis;

/// Tunable parameters of every stage.
pub mod config;

/// Per-point curvature classification.
pub mod curvature;

/// Error types of the analysis.
pub mod error;

/// Primitive fitting.
pub mod fitting;

/// Grasp point, approach and width computation.
pub mod grasp;

/// Isolation of the main body of an object cloud.
pub mod main_body;

/// Table and top plane detection.
pub mod planes;

/// Shape estimation.
pub mod shape;

/// Result slot for analyses running in the background.
pub mod slot;

/// Synthetic object point clouds.
pub mod synthetic;

pub use analysis::{analyze, analyze_from_file, analyze_with_cancel, ObjectAnalysis};
pub use config::{AnalysisConfig, GripperConstants};
pub use error::AnalysisError;
pub use grasp::GraspConfidence;
pub use planes::PlaneInfo;
pub use shape::{ShapeEstimate, ShapeKind, ShapeType};
pub use slot::{AnalysisSlot, CancelToken, SlotStatus};
