#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// depth map pre-filtering pipeline.
pub mod depth;

/// image filtering module.
pub mod filter;

/// filling of missing pixels.
pub mod fill;
