use crate::accumulator::{accumulate_frames, FrameStats, VoxelAccumulator};
use crate::error::Voxel3dError;
use crate::frame::Frame;
use crate::projection::{ProjectionResult, VoxelProjector};
use crate::voxel_grid::VoxelGrid;

/// Binary space carving over a caller-owned grid of empty-observation counters.
///
/// For every frame, each voxel inside the image whose measured depth lies beyond the
/// voxel (`observed > depth_to_voxel`) is known to be free space and its counter is
/// incremented. Counts are cumulative and never normalized. A NaN measurement compares
/// false and leaves the voxel untouched.
pub struct Carver<'a> {
    counts: &'a mut VoxelGrid<u32>,
}

impl<'a> Carver<'a> {
    /// Carve into `counts`, which keeps any value it already holds.
    pub fn new(counts: &'a mut VoxelGrid<u32>) -> Self {
        Self { counts }
    }

    /// Carve every frame, in order.
    pub fn carve(&mut self, frames: &[Frame]) -> Result<Vec<FrameStats>, Voxel3dError> {
        let projector = VoxelProjector::new(self.counts.geometry());
        let stats = accumulate_frames(self, &projector, frames)?;

        let empty = self.counts.count(|&c| c > 0);
        log::info!(
            "carved {} frames: {} of {} voxels observed empty at least once",
            frames.len(),
            empty,
            self.counts.len(),
        );
        Ok(stats)
    }

    /// The counter grid.
    pub fn counts(&self) -> &VoxelGrid<u32> {
        self.counts
    }
}

impl VoxelAccumulator for Carver<'_> {
    fn num_voxels(&self) -> usize {
        self.counts.len()
    }

    fn accumulate(
        &mut self,
        frame: &Frame,
        projection: &ProjectionResult,
    ) -> Result<FrameStats, Voxel3dError> {
        if projection.inside.len() != self.counts.len() {
            return Err(Voxel3dError::shape_mismatch(
                self.counts.len(),
                projection.inside.len(),
            ));
        }

        let observed = projection.observed_depths(frame.depth());
        let known_empty = projection
            .indices
            .iter()
            .zip(observed.iter().zip(projection.depths.iter()))
            .filter(|(_, (&observed, &to_voxel))| observed > to_voxel)
            .map(|(&i, _)| i)
            .collect::<Vec<_>>();

        self.counts
            .update_indexed(&known_empty, |count, _| *count = count.saturating_add(1))?;

        Ok(FrameStats {
            num_voxels: self.counts.len(),
            num_inside: projection.num_inside(),
            num_updated: known_empty.len(),
            ..Default::default()
        })
    }
}

/// Carve `frames` into the counter grid `counts`.
///
/// See [`Carver`]. With an empty frame list the grid is left unchanged.
pub fn carve(counts: &mut VoxelGrid<u32>, frames: &[Frame]) -> Result<Vec<FrameStats>, Voxel3dError> {
    Carver::new(counts).carve(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::voxel_grid::GridGeometry;
    use voxfuse_image::{DepthImage, ImageSize};

    // a single column of voxels on the optical axis at depths 0.5, 1.0, ..., 3.0
    fn column() -> Result<VoxelGrid<u32>, Voxel3dError> {
        Ok(VoxelGrid::new(GridGeometry::new(
            [1, 1, 6],
            0.5,
            [0.0, 0.0, 0.5],
        )?))
    }

    fn frame_with_depth(value: f32) -> Result<Frame, Voxel3dError> {
        let size = ImageSize {
            width: 3,
            height: 3,
        };
        let camera = Camera::from_pinhole(1.0, 1.0, 1.0, 1.0)?.with_image_size(size);
        Frame::new(DepthImage::from_size_val(size, value)?, camera)
    }

    #[test]
    fn test_carve_in_front_of_surface() -> Result<(), Voxel3dError> {
        let mut counts = column()?;
        let stats = carve(&mut counts, &[frame_with_depth(1.75)?])?;
        assert_eq!(counts.as_slice(), &[1, 1, 1, 0, 0, 0]);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].num_inside, 6);
        assert_eq!(stats[0].num_updated, 3);
        Ok(())
    }

    #[test]
    fn test_carve_accumulates_over_frames() -> Result<(), Voxel3dError> {
        let mut counts = column()?;
        let frames = [frame_with_depth(1.75)?, frame_with_depth(2.75)?, frame_with_depth(0.2)?];
        carve(&mut counts, &frames)?;
        assert_eq!(counts.as_slice(), &[2, 2, 2, 1, 1, 0]);
        Ok(())
    }

    #[test]
    fn test_carve_voxel_on_surface_is_not_empty() -> Result<(), Voxel3dError> {
        let mut counts = column()?;
        carve(&mut counts, &[frame_with_depth(1.5)?])?;
        assert_eq!(counts.as_slice(), &[1, 1, 0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_carve_nan_depth_leaves_counts() -> Result<(), Voxel3dError> {
        let mut counts = column()?;
        counts.as_slice_mut()[0] = 4;
        carve(&mut counts, &[frame_with_depth(f32::NAN)?])?;
        assert_eq!(counts.as_slice(), &[4, 0, 0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_carve_no_frames_is_idempotent() -> Result<(), Voxel3dError> {
        let mut counts = column()?;
        counts.as_slice_mut().copy_from_slice(&[3, 1, 4, 1, 5, 9]);
        let before = counts.clone();
        carve(&mut counts, &[])?;
        carve(&mut counts, &[])?;
        assert_eq!(counts, before);
        Ok(())
    }

    #[test]
    fn test_carve_frame_out_of_view() -> Result<(), Voxel3dError> {
        // grid behind the camera
        let mut counts = VoxelGrid::<u32>::new(GridGeometry::new([1, 1, 3], 0.5, [0.0, 0.0, -2.0])?);
        let stats = carve(&mut counts, &[frame_with_depth(1.0)?])?;
        assert_eq!(stats[0].num_inside, 0);
        assert!(counts.as_slice().iter().all(|&c| c == 0));
        Ok(())
    }
}
