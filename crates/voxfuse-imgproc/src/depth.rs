use serde::{Deserialize, Serialize};
use voxfuse_image::{DepthImage, ImageError};

use crate::{fill, filter};

/// Parameters of the depth pre-filter applied before fusing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthFilterParams {
    /// Sigma of the range gaussian, in depth units.
    pub sigma_range: f32,
    /// Sigma of the spatial gaussian, in pixels.
    pub sigma_spatial: f32,
    /// Side of the filter window. Derived from `sigma_spatial` when `None`.
    pub kernel_size: Option<usize>,
}

impl Default for DepthFilterParams {
    fn default() -> Self {
        Self {
            sigma_range: 30.0,
            sigma_spatial: 4.5,
            kernel_size: None,
        }
    }
}

impl DepthFilterParams {
    /// The odd window size used by the bilateral filter.
    pub fn window_size(&self) -> usize {
        match self.kernel_size {
            Some(size) if size % 2 == 1 => size,
            Some(size) => size + 1,
            None => filter::kernels::default_window_size(self.sigma_spatial),
        }
    }

    /// Check that both sigmas are positive and finite.
    pub fn validate(&self) -> Result<(), ImageError> {
        for sigma in [self.sigma_range, self.sigma_spatial] {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(ImageError::InvalidSigma(sigma));
            }
        }
        Ok(())
    }
}

/// Denoise a depth map while keeping its holes.
///
/// Missing pixels are first filled from their nearest valid neighbour so they do not
/// bias the smoothing, the filled map is bilateral filtered, and the pixels that were
/// missing in the input are set back to NaN.
///
/// # Arguments
///
/// * `depth` - The input depth map, NaN where there is no measurement.
/// * `params` - The filter parameters.
///
/// # Returns
///
/// The filtered depth map, with the same size and the same NaN pixels as the input.
pub fn prefilter_depth(
    depth: &DepthImage,
    params: &DepthFilterParams,
) -> Result<DepthImage, ImageError> {
    params.validate()?;

    let mut filled = DepthImage::from_size_val(depth.size(), 0.0)?;
    fill::fill_nan_nearest(depth, &mut filled)?;

    let mut denoised = DepthImage::from_size_val(depth.size(), 0.0)?;
    filter::bilateral_filter(
        &filled,
        &mut denoised,
        params.window_size(),
        params.sigma_range,
        params.sigma_spatial,
    )?;

    // re-mask the pixels that had no measurement
    denoised
        .as_slice_mut()
        .iter_mut()
        .zip(depth.as_slice().iter())
        .filter(|(_, src)| src.is_nan())
        .for_each(|(dst, _)| *dst = f32::NAN);

    Ok(denoised)
}
