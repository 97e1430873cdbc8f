use crate::error::Voxel3dError;
use crate::frame::Frame;
use crate::projection::{ProjectionResult, VoxelProjector};

/// What a single frame contributed to an accumulation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Position of the frame in the sequence.
    pub frame_index: usize,
    /// Number of voxels in the grid.
    pub num_voxels: usize,
    /// Number of voxels projecting inside the image.
    pub num_inside: usize,
    /// Number of voxels whose state changed: marked empty when carving, or given a new
    /// tsdf observation when fusing.
    pub num_updated: usize,
    /// Number of voxels within one voxel diagonal of the observed surface (fusion only).
    pub num_visible: usize,
}

impl FrameStats {
    /// Fraction of the grid projecting inside the image.
    pub fn fraction_inside(&self) -> f64 {
        ratio(self.num_inside, self.num_voxels)
    }

    /// Fraction of the inside voxels that were updated.
    pub fn fraction_updated(&self) -> f64 {
        ratio(self.num_updated, self.num_inside)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// A per-voxel state updated from the projection of one frame at a time.
///
/// Carving and fusion are two implementations; both consume the same
/// [`ProjectionResult`] produced by a shared [`VoxelProjector`].
pub trait VoxelAccumulator {
    /// Number of voxels in the accumulated grid.
    fn num_voxels(&self) -> usize;

    /// Fold one frame into the state.
    ///
    /// PRECONDITION: `projection` was computed for `frame` against a grid of
    /// [`VoxelAccumulator::num_voxels`] voxels.
    fn accumulate(
        &mut self,
        frame: &Frame,
        projection: &ProjectionResult,
    ) -> Result<FrameStats, Voxel3dError>;
}

/// Run every frame through `projector` and fold it into `accumulator`, in order.
///
/// Geometry is checked before the first frame, so a mismatch leaves the state untouched.
/// A frame with no voxel in view is a no-op and only logged.
pub fn accumulate_frames<A: VoxelAccumulator + ?Sized>(
    accumulator: &mut A,
    projector: &VoxelProjector,
    frames: &[Frame],
) -> Result<Vec<FrameStats>, Voxel3dError> {
    if projector.num_voxels() != accumulator.num_voxels() {
        return Err(Voxel3dError::shape_mismatch(
            accumulator.num_voxels(),
            projector.num_voxels(),
        ));
    }

    let mut stats = Vec::with_capacity(frames.len());
    for (frame_index, frame) in frames.iter().enumerate() {
        let projection = projector.project(frame);
        if projection.is_empty() {
            log::warn!(
                "frame {} ({}): no voxel projects into the image",
                frame_index,
                frame.frame_id().unwrap_or("-"),
            );
        }

        let mut frame_stats = accumulator.accumulate(frame, &projection)?;
        frame_stats.frame_index = frame_index;
        log::debug!(
            "frame {} ({}): {:.2}% of voxels in image, {:.2}% of those updated",
            frame_index,
            frame.frame_id().unwrap_or("-"),
            100.0 * frame_stats.fraction_inside(),
            100.0 * frame_stats.fraction_updated(),
        );
        stats.push(frame_stats);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_stats_fractions() {
        let stats = FrameStats {
            frame_index: 0,
            num_voxels: 200,
            num_inside: 50,
            num_updated: 10,
            num_visible: 0,
        };
        assert_eq!(stats.fraction_inside(), 0.25);
        assert_eq!(stats.fraction_updated(), 0.2);
        assert_eq!(FrameStats::default().fraction_updated(), 0.0);
    }
}
