#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Per-frame accumulation shared by carving and fusion.
pub mod accumulator;

/// Pinhole camera with a known pose.
pub mod camera;

/// Binary space carving.
pub mod carving;

/// Error types for the 3d module.
pub mod error;

/// Depth frames with their camera.
pub mod frame;

/// TSDF fusion.
pub mod fusion;

/// Linear algebra utilities.
pub mod linalg;

/// Projection of voxel centres into depth frames.
pub mod projection;

/// Regular voxel grids.
pub mod voxel_grid;

pub use crate::error::Voxel3dError;
