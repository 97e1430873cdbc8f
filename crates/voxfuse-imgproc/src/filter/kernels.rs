/// Create a 2D spatial gaussian kernel, row-major, centred on the middle element.
///
/// The kernel is not normalized: the bilateral filter normalizes per pixel once the
/// range weights are known.
///
/// # Arguments
///
/// * `kernel_size` - The side of the square kernel. Must be odd.
/// * `sigma` - The spatial sigma in pixels.
pub fn gaussian_kernel_2d(kernel_size: usize, sigma: f32) -> Vec<f32> {
    let half = (kernel_size / 2) as isize;
    let sigma_sq = sigma * sigma;
    let mut kernel = Vec::with_capacity(kernel_size * kernel_size);
    for dy in -half..=half {
        for dx in -half..=half {
            let d_sq = (dx * dx + dy * dy) as f32;
            kernel.push((-d_sq / (2.0 * sigma_sq)).exp());
        }
    }
    kernel
}

/// Window size used when none is given: covers three sigmas on each side, minimum 5.
pub fn default_window_size(sigma_spatial: f32) -> usize {
    let size = 2 * (3.0 * sigma_spatial).ceil() as usize + 1;
    size.max(5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_kernel_2d() {
        let kernel = gaussian_kernel_2d(3, 1.0);
        assert_eq!(kernel.len(), 9);
        assert_relative_eq!(kernel[4], 1.0);
        assert_relative_eq!(kernel[1], (-0.5f32).exp());
        assert_relative_eq!(kernel[0], (-1.0f32).exp());
        assert_relative_eq!(kernel[0], kernel[8]);
    }

    #[test]
    fn test_default_window_size() {
        assert_eq!(default_window_size(4.5), 29);
        assert_eq!(default_window_size(0.5), 5);
    }
}
