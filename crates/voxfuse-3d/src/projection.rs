use voxfuse_image::{DepthImage, ImageSize};

use crate::camera::Camera;
use crate::frame::Frame;
use crate::voxel_grid::GridGeometry;

/// The voxels of a grid that project into one frame.
///
/// `inside` covers every voxel of the grid in raster order. `indices`, `uv` and `depths`
/// only cover the voxels flagged in `inside`, in the same relative order, so
/// `count(inside) == indices.len() == uv.len() == depths.len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionResult {
    /// Per voxel, whether it lands inside the image.
    pub inside: Vec<bool>,
    /// Flat raster indices of the voxels inside the image.
    pub indices: Vec<usize>,
    /// Rounded pixel coordinates `(u, v)`, i.e. (column, row), of the voxels inside the image.
    pub uv: Vec<[usize; 2]>,
    /// Distance of each inside voxel along the camera's optical axis.
    pub depths: Vec<f64>,
}

impl ProjectionResult {
    /// Number of voxels inside the image.
    #[inline]
    pub fn num_inside(&self) -> usize {
        self.indices.len()
    }

    /// Whether no voxel lands in the image.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Fraction of the grid that lands in the image.
    pub fn fraction_inside(&self) -> f64 {
        if self.inside.is_empty() {
            return 0.0;
        }
        self.indices.len() as f64 / self.inside.len() as f64
    }

    /// The measured depth at the pixel of every inside voxel.
    ///
    /// PRECONDITION: `depth` has the size the projection was computed against.
    pub fn observed_depths(&self, depth: &DepthImage) -> Vec<f64> {
        self.uv
            .iter()
            .map(|&[u, v]| depth.at(u, v) as f64)
            .collect()
    }
}

/// Projects the voxel centres of a fixed grid into camera frames.
///
/// The world coordinates of the voxel centres are computed once and reused for every
/// frame; carving and fusion both hold one of these.
#[derive(Debug, Clone)]
pub struct VoxelProjector {
    world_points: Vec<[f64; 3]>,
}

impl VoxelProjector {
    /// Create a projector for the voxel centres of `geometry`.
    pub fn new(geometry: &GridGeometry) -> Self {
        Self {
            world_points: geometry.world_coordinates(),
        }
    }

    /// Number of voxels handled by the projector.
    pub fn num_voxels(&self) -> usize {
        self.world_points.len()
    }

    /// Project the grid into `frame`, against the size of its depth image.
    pub fn project(&self, frame: &Frame) -> ProjectionResult {
        project_points_into_image(&self.world_points, frame.camera(), frame.depth().size())
    }
}

/// Project the voxel centres of `geometry` into `frame`.
///
/// Convenience wrapper around [`VoxelProjector`] for a single frame.
pub fn project_voxels(geometry: &GridGeometry, frame: &Frame) -> ProjectionResult {
    VoxelProjector::new(geometry).project(frame)
}

/// Project world points through `camera` and keep the ones landing inside an image of
/// `image_size`.
///
/// Pixel coordinates are rounded to the nearest integer, ties to even. A point is
/// inside iff `0 <= u < width`, `0 <= v < height` and its depth is positive; points on
/// or behind the camera plane are never inside, whatever pixel they map to.
pub fn project_points_into_image(
    points: &[[f64; 3]],
    camera: &Camera,
    image_size: ImageSize,
) -> ProjectionResult {
    let projected = camera.project_points(points);
    let (width, height) = (image_size.width as f64, image_size.height as f64);

    let mut result = ProjectionResult {
        inside: vec![false; points.len()],
        ..Default::default()
    };

    for (i, &[u, v, depth]) in projected.iter().enumerate() {
        let (u, v) = (u.round_ties_even(), v.round_ties_even());
        // NaN fails every comparison and stays outside
        let in_bounds = u >= 0.0 && u < width && v >= 0.0 && v < height;
        if !(in_bounds && depth > 0.0) {
            continue;
        }
        result.inside[i] = true;
        result.indices.push(i);
        result.uv.push([u as usize, v as usize]);
        result.depths.push(depth);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Voxel3dError;
    use crate::linalg::IDENTITY4;

    fn small_frame(width: usize, height: usize) -> Result<Frame, Voxel3dError> {
        let size = ImageSize { width, height };
        let camera = Camera::from_pinhole(10.0, 10.0, 2.0, 1.0)?.with_image_size(size);
        Ok(Frame::new(DepthImage::from_size_val(size, 1.0)?, camera)?)
    }

    #[test]
    fn test_projection_consistency() -> Result<(), Voxel3dError> {
        let frame = small_frame(5, 3)?;
        let geometry = GridGeometry::new([6, 6, 4], 0.1, [-0.3, -0.3, 0.5])?;
        let result = project_voxels(&geometry, &frame);

        assert_eq!(result.inside.len(), geometry.num_voxels());
        let count = result.inside.iter().filter(|&&b| b).count();
        assert!(count > 0 && count < geometry.num_voxels());
        assert_eq!(count, result.indices.len());
        assert_eq!(count, result.uv.len());
        assert_eq!(count, result.depths.len());
        for (&i, &[u, v]) in result.indices.iter().zip(result.uv.iter()) {
            assert!(result.inside[i]);
            assert!(u < 5 && v < 3);
        }
        assert!(result.indices.windows(2).all(|w| w[0] < w[1]));
        Ok(())
    }

    #[test]
    fn test_bounds_are_half_open() -> Result<(), Voxel3dError> {
        let camera = Camera::from_pinhole(1.0, 1.0, 0.0, 0.0)?;
        let size = ImageSize {
            width: 2,
            height: 2,
        };
        // u = x / z, v = y / z at z = 1
        let points = [
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [2.0, 0.0, 1.0],
            [0.0, 2.0, 1.0],
            [-1.0, 0.0, 1.0],
            [1.4, 0.0, 1.0],
            [-0.4, 0.0, 1.0],
        ];
        let result = project_points_into_image(&points, &camera, size);
        assert_eq!(
            result.inside,
            vec![true, true, false, false, false, true, true]
        );
        assert_eq!(result.uv, vec![[0, 0], [1, 1], [1, 0], [0, 0]]);
        Ok(())
    }

    #[test]
    fn test_rounding_ties_to_even() -> Result<(), Voxel3dError> {
        let camera = Camera::from_pinhole(1.0, 1.0, 0.0, 0.0)?;
        let size = ImageSize {
            width: 4,
            height: 4,
        };
        let points = [[0.5, 1.5, 1.0], [2.5, 0.0, 1.0]];
        let result = project_points_into_image(&points, &camera, size);
        assert_eq!(result.uv, vec![[0, 2], [2, 0]]);
        Ok(())
    }

    #[test]
    fn test_behind_camera_is_outside() -> Result<(), Voxel3dError> {
        let camera = Camera::from_pinhole(1.0, 1.0, 0.0, 0.0)?;
        let size = ImageSize {
            width: 4,
            height: 4,
        };
        // (-1, -1, -1) divides to pixel (1, 1) but lies behind the camera
        let points = [[-1.0, -1.0, -1.0], [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let result = project_points_into_image(&points, &camera, size);
        assert_eq!(result.inside, vec![false, false, true]);
        Ok(())
    }

    #[test]
    fn test_depth_is_perpendicular_distance() -> Result<(), Voxel3dError> {
        let mut extrinsics = IDENTITY4;
        extrinsics[2][3] = -1.0;
        let camera = Camera::new(
            [[1.0, 0.0, 2.0], [0.0, 1.0, 2.0], [0.0, 0.0, 1.0]],
            extrinsics,
        )?;
        let size = ImageSize {
            width: 5,
            height: 5,
        };
        let result = project_points_into_image(&[[2.0, 2.0, 1.0]], &camera, size);
        assert_eq!(result.depths, vec![2.0]);
        assert_eq!(result.uv, vec![[3, 3]]);
        Ok(())
    }

    #[test]
    fn test_observed_depths() -> Result<(), Voxel3dError> {
        let size = ImageSize {
            width: 2,
            height: 2,
        };
        let depth = DepthImage::new(size, vec![1.0, 2.0, 3.0, f32::NAN])?;
        let result = ProjectionResult {
            inside: vec![true, true, true],
            indices: vec![0, 1, 2],
            uv: vec![[1, 0], [0, 1], [1, 1]],
            depths: vec![0.5, 0.5, 0.5],
        };
        let observed = result.observed_depths(&depth);
        assert_eq!(observed[..2], [2.0, 3.0]);
        assert!(observed[2].is_nan());
        assert_eq!(result.fraction_inside(), 1.0);
        Ok(())
    }
}
