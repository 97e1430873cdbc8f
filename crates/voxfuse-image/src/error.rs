/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when the data length does not match the image size.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when two images that must share a size do not.
    #[error("Image size mismatch: {0} vs {1}")]
    InvalidImageSize(String, String),

    /// Error when a filter window does not have an odd, positive side.
    #[error("Kernel size ({0}) must be odd and positive")]
    InvalidKernelSize(usize),

    /// Error when a gaussian sigma is not a positive finite number.
    #[error("Gaussian sigma ({0}) must be positive and finite")]
    InvalidSigma(f32),
}
