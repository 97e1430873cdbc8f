#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use voxfuse_image as image;

#[doc(inline)]
pub use voxfuse_imgproc as imgproc;

#[doc(inline)]
pub use voxfuse_3d as k3d;
