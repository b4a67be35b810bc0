/// PCD reader module.
pub mod pcd;

/// PLY reader and writer module.
pub mod ply;
