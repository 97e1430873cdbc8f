//! Filter operations
//!
//! This module provides filter operations for depth images.

/// Filter kernels
pub mod kernels;

/// Edge preserving bilateral filter
mod bilateral;
pub use bilateral::*;
