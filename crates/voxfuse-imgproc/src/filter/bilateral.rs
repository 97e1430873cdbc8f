use rayon::prelude::*;
use voxfuse_image::{Image, ImageError};

use super::kernels;

/// Smooth a single channel image with an edge preserving bilateral filter.
///
/// Every output pixel is the average of its `kernel_size x kernel_size` neighbourhood,
/// weighted by a spatial gaussian of `sigma_spatial` pixels times a range gaussian of
/// `sigma_range` on the value difference to the centre pixel. Neighbours outside the
/// image or holding NaN do not contribute, and a NaN centre stays NaN.
///
/// Rows are processed in parallel on the rayon pool.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, 1).
/// * `dst` - The destination image with shape (H, W, 1).
/// * `kernel_size` - The side of the square window. Must be odd.
/// * `sigma_range` - The sigma of the range (value) gaussian.
/// * `sigma_spatial` - The sigma of the spatial gaussian, in pixels.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
///
/// # Errors
///
/// Returns [`ImageError::InvalidKernelSize`] for an even or zero `kernel_size` and
/// [`ImageError::InvalidSigma`] when either sigma is not positive and finite.
pub fn bilateral_filter(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    kernel_size: usize,
    sigma_range: f32,
    sigma_spatial: f32,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.size().to_string(),
            dst.size().to_string(),
        ));
    }

    if kernel_size % 2 == 0 {
        return Err(ImageError::InvalidKernelSize(kernel_size));
    }
    for sigma in [sigma_range, sigma_spatial] {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(ImageError::InvalidSigma(sigma));
        }
    }

    let (width, height) = (src.width() as isize, src.height() as isize);
    if width == 0 || height == 0 {
        return Ok(());
    }

    let spatial = kernels::gaussian_kernel_2d(kernel_size, sigma_spatial);
    let half = (kernel_size / 2) as isize;
    let range_denom = 2.0 * sigma_range * sigma_range;
    let src_data = src.as_slice();

    dst.as_slice_mut()
        .par_chunks_exact_mut(width as usize)
        .enumerate()
        .for_each(|(y, dst_row)| {
            let y = y as isize;
            for (x, dst_pixel) in dst_row.iter_mut().enumerate() {
                let x = x as isize;
                let center = src_data[(y * width + x) as usize];
                if center.is_nan() {
                    *dst_pixel = f32::NAN;
                    continue;
                }

                let mut acc = 0.0f32;
                let mut norm = 0.0f32;
                for ky in -half..=half {
                    let yy = y + ky;
                    if yy < 0 || yy >= height {
                        continue;
                    }
                    for kx in -half..=half {
                        let xx = x + kx;
                        if xx < 0 || xx >= width {
                            continue;
                        }
                        let val = src_data[(yy * width + xx) as usize];
                        if val.is_nan() {
                            continue;
                        }
                        let diff = val - center;
                        let w_range = (-(diff * diff) / range_denom).exp();
                        let w = spatial[((ky + half) * kernel_size as isize + kx + half) as usize]
                            * w_range;
                        acc += w * val;
                        norm += w;
                    }
                }

                // the centre pixel always contributes with weight 1
                *dst_pixel = acc / norm;
            }
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use voxfuse_image::ImageSize;

    #[test]
    fn test_bilateral_constant_image() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 6,
            height: 4,
        };
        let src = Image::<f32, 1>::from_size_val(size, 2.5)?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        bilateral_filter(&src, &mut dst, 5, 0.1, 1.0)?;
        for &v in dst.as_slice() {
            assert_relative_eq!(v, 2.5, epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_bilateral_preserves_step_edge() -> Result<(), ImageError> {
        // left half at 1.0, right half at 3.0; a narrow range sigma keeps the edge
        let size = ImageSize {
            width: 8,
            height: 3,
        };
        let src = Image::<f32, 1>::from_fn(size, |x, _| if x < 4 { 1.0 } else { 3.0 });
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        bilateral_filter(&src, &mut dst, 5, 0.05, 2.0)?;
        assert_relative_eq!(dst.at(3, 1), 1.0, epsilon = 1e-4);
        assert_relative_eq!(dst.at(4, 1), 3.0, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn test_bilateral_smooths_noise() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 5,
            height: 5,
        };
        let src = Image::<f32, 1>::from_fn(size, |x, y| if x == 2 && y == 2 { 1.1 } else { 1.0 });
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        bilateral_filter(&src, &mut dst, 5, 30.0, 4.5)?;
        let center = dst.at(2, 2);
        assert!(center < 1.1 && center > 1.0);
        Ok(())
    }

    #[test]
    fn test_bilateral_skips_nan() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 3,
            height: 1,
        };
        let src = Image::<f32, 1>::new(size, vec![1.0, f32::NAN, 1.0])?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        bilateral_filter(&src, &mut dst, 3, 1.0, 1.0)?;
        assert_relative_eq!(dst.at(0, 0), 1.0);
        assert!(dst.at(1, 0).is_nan());
        assert_relative_eq!(dst.at(2, 0), 1.0);
        Ok(())
    }

    #[test]
    fn test_bilateral_size_mismatch() -> Result<(), ImageError> {
        let src = Image::<f32, 1>::from_size_val([3, 3].into(), 0.0)?;
        let mut dst = Image::<f32, 1>::from_size_val([3, 2].into(), 0.0)?;
        assert!(bilateral_filter(&src, &mut dst, 3, 1.0, 1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_bilateral_rejects_bad_window() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 4,
            height: 4,
        };
        let src = Image::<f32, 1>::from_size_val(size, 1.0)?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        assert_eq!(
            bilateral_filter(&src, &mut dst, 4, 1.0, 1.0),
            Err(ImageError::InvalidKernelSize(4))
        );
        assert_eq!(
            bilateral_filter(&src, &mut dst, 0, 1.0, 1.0),
            Err(ImageError::InvalidKernelSize(0))
        );
        Ok(())
    }

    #[test]
    fn test_bilateral_rejects_bad_sigma() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 4,
            height: 4,
        };
        let src = Image::<f32, 1>::from_size_val(size, 1.0)?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        assert_eq!(
            bilateral_filter(&src, &mut dst, 3, 0.0, 1.0),
            Err(ImageError::InvalidSigma(0.0))
        );
        assert_eq!(
            bilateral_filter(&src, &mut dst, 3, 1.0, -2.0),
            Err(ImageError::InvalidSigma(-2.0))
        );
        assert!(bilateral_filter(&src, &mut dst, 3, f32::NAN, 1.0).is_err());
        // nothing was written
        assert!(dst.as_slice().iter().all(|&v| v == 0.0));
        Ok(())
    }
}
