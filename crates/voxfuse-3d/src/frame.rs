use voxfuse_image::DepthImage;

use crate::camera::Camera;
use crate::error::Voxel3dError;

/// A depth image together with the camera that captured it.
///
/// Frames are immutable once built. If the camera declares an image size, the depth
/// image must match it.
#[derive(Debug, Clone)]
pub struct Frame {
    depth: DepthImage,
    camera: Camera,
    frame_id: Option<String>,
}

impl Frame {
    /// Create a frame from a depth map and its camera.
    ///
    /// # Errors
    ///
    /// Returns [`Voxel3dError::ShapeMismatch`] if the camera declares an image size that
    /// differs from the depth image size.
    pub fn new(depth: DepthImage, camera: Camera) -> Result<Self, Voxel3dError> {
        if let Some(expected) = camera.image_size() {
            if expected != depth.size() {
                return Err(Voxel3dError::shape_mismatch(expected, depth.size()));
            }
        }
        Ok(Self {
            depth,
            camera,
            frame_id: None,
        })
    }

    /// Tag the frame with an identifier used in log messages.
    pub fn with_id(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = Some(frame_id.into());
        self
    }

    /// The depth map, NaN where there is no measurement.
    #[inline]
    pub fn depth(&self) -> &DepthImage {
        &self.depth
    }

    /// The camera that captured the depth map.
    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// The frame identifier, if any.
    pub fn frame_id(&self) -> Option<&str> {
        self.frame_id.as_deref()
    }
}
