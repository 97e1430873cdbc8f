use voxfuse_image::ImageError;

/// Errors raised by the carving and fusion pipeline.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Voxel3dError {
    /// A calibration matrix could not be inverted.
    #[error("{0} matrix is singular")]
    SingularMatrix(&'static str),

    /// Two arrays or images that must share a shape do not.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// The shape required by the receiver.
        expected: String,
        /// The shape that was supplied.
        actual: String,
    },

    /// A flat voxel index lies outside the grid.
    #[error("Voxel index {0} is out of bounds for a grid of {1} voxels")]
    IndexOutOfBounds(usize, usize),

    /// A scalar parameter is outside its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from the image module.
    #[error(transparent)]
    Image(#[from] ImageError),
}

impl Voxel3dError {
    pub(crate) fn shape_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
