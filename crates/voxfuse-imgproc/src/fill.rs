use kiddo::immutable::float::kdtree::ImmutableKdTree;
use rayon::prelude::*;

use voxfuse_image::{Image, ImageError};

/// Fill the NaN pixels of a single channel image with the value of the nearest valid pixel.
///
/// Distances are Euclidean in pixel coordinates. The valid pixels are indexed in a kd-tree
/// which is queried once per missing pixel. Ties between equidistant pixels are broken
/// arbitrarily.
///
/// If the image holds no valid pixel at all, `dst` is left as a copy of `src`.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, 1).
/// * `dst` - The destination image with shape (H, W, 1).
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn fill_nan_nearest(src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.size().to_string(),
            dst.size().to_string(),
        ));
    }

    let width = src.width();
    let src_data = src.as_slice();
    dst.as_slice_mut().copy_from_slice(src_data);

    let (coords, values): (Vec<[f64; 2]>, Vec<f32>) = src_data
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, &v)| ([(i % width) as f64, (i / width) as f64], v))
        .unzip();

    if coords.len() == src_data.len() {
        return Ok(());
    }
    if coords.is_empty() {
        log::debug!("fill_nan_nearest: image has no valid pixel, nothing to fill");
        return Ok(());
    }

    let kdtree: ImmutableKdTree<f64, u32, 2, 32> = ImmutableKdTree::new_from_slice(&coords);

    dst.as_slice_mut()
        .par_iter_mut()
        .enumerate()
        .filter(|(_, v)| v.is_nan())
        .for_each(|(i, dst_pixel)| {
            let query = [(i % width) as f64, (i / width) as f64];
            let nearest = kdtree.nearest_one::<kiddo::SquaredEuclidean>(&query);
            *dst_pixel = values[nearest.item as usize];
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use voxfuse_image::ImageSize;

    #[test]
    fn test_fill_single_hole() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 3,
            height: 3,
        };
        #[rustfmt::skip]
        let src = Image::<f32, 1>::new(size, vec![
            1.0, 1.0, 1.0,
            1.0, f32::NAN, 2.0,
            1.0, 1.0, 1.0,
        ])?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        fill_nan_nearest(&src, &mut dst)?;
        assert_eq!(dst.count_nan(), 0);
        assert!(dst.at(1, 1) == 1.0 || dst.at(1, 1) == 2.0);
        Ok(())
    }

    #[test]
    fn test_fill_takes_nearest_value() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 6,
            height: 1,
        };
        let src = Image::<f32, 1>::new(
            size,
            vec![5.0, f32::NAN, f32::NAN, f32::NAN, f32::NAN, 9.0],
        )?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        fill_nan_nearest(&src, &mut dst)?;
        assert_eq!(dst.as_slice(), &[5.0, 5.0, 5.0, 9.0, 9.0, 9.0]);
        Ok(())
    }

    #[test]
    fn test_fill_large_hole_in_corner() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 4,
            height: 4,
        };
        let src = Image::<f32, 1>::from_fn(size, |x, y| if x == 3 && y == 3 { 7.0 } else { f32::NAN });
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        fill_nan_nearest(&src, &mut dst)?;
        assert!(dst.as_slice().iter().all(|&v| v == 7.0));
        Ok(())
    }

    #[test]
    fn test_fill_all_missing() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 2,
            height: 2,
        };
        let src = Image::<f32, 1>::from_size_val(size, f32::NAN)?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        fill_nan_nearest(&src, &mut dst)?;
        assert_eq!(dst.count_nan(), 4);
        Ok(())
    }

    #[test]
    fn test_fill_matches_brute_force_nearest() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 12,
            height: 12,
        };
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            // a handful of valid pixels with distinct values
            let num_valid = rng.random_range(2..=5);
            let mut sources: Vec<(usize, usize)> = Vec::new();
            while sources.len() < num_valid {
                let p = (rng.random_range(0..size.width), rng.random_range(0..size.height));
                if !sources.contains(&p) {
                    sources.push(p);
                }
            }
            let src = Image::<f32, 1>::from_fn(size, |x, y| {
                match sources.iter().position(|&p| p == (x, y)) {
                    Some(k) => k as f32,
                    None => f32::NAN,
                }
            });

            let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
            fill_nan_nearest(&src, &mut dst)?;
            assert_eq!(dst.count_nan(), 0);

            let dist_sq = |(sx, sy): (usize, usize), x: usize, y: usize| {
                (sx as isize - x as isize).pow(2) + (sy as isize - y as isize).pow(2)
            };
            for y in 0..size.height {
                for x in 0..size.width {
                    let source = sources[dst.at(x, y) as usize];
                    let best = sources
                        .iter()
                        .map(|&p| dist_sq(p, x, y))
                        .min()
                        .expect("at least one source");
                    assert_eq!(dist_sq(source, x, y), best, "pixel ({}, {})", x, y);
                }
            }
        }
        Ok(())
    }
}
