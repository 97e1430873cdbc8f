use std::borrow::Cow;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use voxfuse_imgproc::depth::{prefilter_depth, DepthFilterParams};

use crate::accumulator::{accumulate_frames, FrameStats, VoxelAccumulator};
use crate::error::Voxel3dError;
use crate::frame::Frame;
use crate::projection::{ProjectionResult, VoxelProjector};
use crate::voxel_grid::{GridGeometry, VoxelGrid};

/// Parameters of a TSDF fusion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Truncation distance, in world units.
    pub mu: f64,
    /// Pre-filter every depth map before fusing it. Raw depth is used when `None`.
    pub filter: Option<DepthFilterParams>,
    /// Count, per voxel, the camera frustums it falls into.
    pub measure_in_frustum: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            mu: 0.03,
            filter: None,
            measure_in_frustum: false,
        }
    }
}

impl FusionConfig {
    /// Check that the truncation distance and the filter sigmas are positive finite numbers.
    pub fn validate(&self) -> Result<(), Voxel3dError> {
        if !(self.mu.is_finite() && self.mu > 0.0) {
            return Err(Voxel3dError::InvalidParameter(format!(
                "truncation distance must be positive, got {}",
                self.mu
            )));
        }
        if let Some(filter) = &self.filter {
            filter
                .validate()
                .map_err(|e| Voxel3dError::InvalidParameter(format!("depth filter: {}", e)))?;
        }
        Ok(())
    }
}

/// Lifecycle of a [`TsdfAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// No frame has been folded in yet.
    Empty,
    /// At least one frame has been folded in.
    Accumulating,
}

/// Running weighted average of truncated signed distances, one per voxel.
///
/// Each voxel keeps only its cumulative weight and current mean, so memory does not
/// grow with the number of frames. A voxel becomes valid the first time it receives a
/// value and stays valid.
#[derive(Debug, Clone, PartialEq)]
pub struct TsdfAccumulator {
    geometry: GridGeometry,
    weights: Vec<f32>,
    tsdf: Vec<f32>,
    valid: Vec<bool>,
    num_updates: usize,
}

impl TsdfAccumulator {
    /// Create an empty accumulator over `geometry`.
    pub fn new(geometry: GridGeometry) -> Self {
        let n = geometry.num_voxels();
        Self {
            geometry,
            weights: vec![0.0; n],
            tsdf: vec![0.0; n],
            valid: vec![false; n],
            num_updates: 0,
        }
    }

    /// The grid geometry.
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Whether any update has been applied.
    pub fn state(&self) -> AccumulatorState {
        match self.num_updates {
            0 => AccumulatorState::Empty,
            _ => AccumulatorState::Accumulating,
        }
    }

    /// Number of updates (frames) applied.
    pub fn num_updates(&self) -> usize {
        self.num_updates
    }

    /// Cumulative weight per voxel, flat raster order.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Current mean tsdf per voxel, flat raster order. Meaningless where not valid.
    pub fn tsdf(&self) -> &[f32] {
        &self.tsdf
    }

    /// Whether each voxel has ever been updated, flat raster order.
    pub fn valid(&self) -> &[bool] {
        &self.valid
    }

    /// Fold one frame's observations into the running averages.
    ///
    /// `indices[n]` receives the value `values[n]` with weight `weights[n]`:
    /// `w' = w + w_n` and `tsdf' = (w * tsdf + w_n * v_n) / w'`.
    ///
    /// # Errors
    ///
    /// Returns [`Voxel3dError::ShapeMismatch`] if the three slices differ in length,
    /// [`Voxel3dError::IndexOutOfBounds`] for an index outside the grid and
    /// [`Voxel3dError::InvalidParameter`] for a weight that is not positive and finite.
    /// Nothing is modified on error.
    pub fn update(
        &mut self,
        indices: &[usize],
        weights: &[f32],
        values: &[f32],
    ) -> Result<(), Voxel3dError> {
        if weights.len() != indices.len() {
            return Err(Voxel3dError::shape_mismatch(indices.len(), weights.len()));
        }
        if values.len() != indices.len() {
            return Err(Voxel3dError::shape_mismatch(indices.len(), values.len()));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.valid.len()) {
            return Err(Voxel3dError::IndexOutOfBounds(bad, self.valid.len()));
        }
        if let Some(&bad) = weights.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
            return Err(Voxel3dError::InvalidParameter(format!(
                "update weights must be positive, got {}",
                bad
            )));
        }

        for ((&i, &w_new), &v_new) in indices.iter().zip(weights).zip(values) {
            let w_old = self.weights[i] as f64;
            let w = w_old + w_new as f64;
            self.tsdf[i] = ((w_old * self.tsdf[i] as f64 + w_new as f64 * v_new as f64) / w) as f32;
            self.weights[i] = w as f32;
            self.valid[i] = true;
        }
        self.num_updates += 1;

        Ok(())
    }

    /// Combine the observations of another accumulator over the same grid.
    ///
    /// Partial accumulators built from disjoint frame sets merge into the accumulator
    /// of the union, up to floating point reassociation.
    pub fn merge(&mut self, other: &TsdfAccumulator) -> Result<(), Voxel3dError> {
        if other.geometry != self.geometry {
            return Err(Voxel3dError::shape_mismatch(
                format!("{:?}", self.geometry.shape()),
                format!("{:?}", other.geometry.shape()),
            ));
        }

        for i in 0..self.valid.len() {
            if !other.valid[i] {
                continue;
            }
            let (w_a, w_b) = (self.weights[i] as f64, other.weights[i] as f64);
            let w = w_a + w_b;
            self.tsdf[i] =
                ((w_a * self.tsdf[i] as f64 + w_b * other.tsdf[i] as f64) / w) as f32;
            self.weights[i] = w as f32;
            self.valid[i] = true;
        }
        self.num_updates += other.num_updates;

        Ok(())
    }

    /// The fused tsdf as a grid, with NaN wherever no observation was made.
    pub fn current_tsdf(&self) -> VoxelGrid<f32> {
        let mut grid = VoxelGrid::new(self.geometry.clone());
        grid.as_slice_mut()
            .iter_mut()
            .zip(self.tsdf.iter().zip(self.valid.iter()))
            .for_each(|(dst, (&t, &valid))| *dst = if valid { t } else { f32::NAN });
        grid
    }
}

/// The result of a fusion run.
#[derive(Debug, Clone)]
pub struct FusionOutput {
    /// Fused tsdf, NaN where never observed.
    pub tsdf: VoxelGrid<f32>,
    /// Voxels seen within one voxel diagonal of the measured surface in some frame.
    pub visible: VoxelGrid<bool>,
    /// Number of frustums containing each voxel, when requested.
    pub in_frustum: Option<VoxelGrid<u16>>,
    /// Per frame statistics, in frame order.
    pub stats: Vec<FrameStats>,
}

/// The full per-voxel state of a fusion run: tsdf accumulator, visibility and
/// frustum counts.
#[derive(Debug, Clone)]
pub struct FusionVolume {
    config: FusionConfig,
    accumulator: TsdfAccumulator,
    visible: VoxelGrid<bool>,
    in_frustum: Option<VoxelGrid<u16>>,
}

impl FusionVolume {
    /// Create an empty volume over `geometry`.
    pub fn new(geometry: GridGeometry, config: FusionConfig) -> Self {
        let visible = VoxelGrid::new(geometry.clone());
        let in_frustum = config
            .measure_in_frustum
            .then(|| VoxelGrid::new(geometry.clone()));
        Self {
            config,
            accumulator: TsdfAccumulator::new(geometry),
            visible,
            in_frustum,
        }
    }

    /// The configuration of the run.
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// The tsdf accumulator.
    pub fn accumulator(&self) -> &TsdfAccumulator {
        &self.accumulator
    }

    /// The visibility grid accumulated so far.
    pub fn visible(&self) -> &VoxelGrid<bool> {
        &self.visible
    }

    /// The frustum counts accumulated so far, when requested.
    pub fn in_frustum(&self) -> Option<&VoxelGrid<u16>> {
        self.in_frustum.as_ref()
    }

    /// Combine the state of another volume over the same grid.
    pub fn merge(&mut self, other: &FusionVolume) -> Result<(), Voxel3dError> {
        self.accumulator.merge(&other.accumulator)?;
        self.visible
            .as_slice_mut()
            .iter_mut()
            .zip(other.visible.as_slice())
            .for_each(|(a, &b)| *a |= b);
        if let (Some(a), Some(b)) = (self.in_frustum.as_mut(), other.in_frustum.as_ref()) {
            a.as_slice_mut()
                .iter_mut()
                .zip(b.as_slice())
                .for_each(|(a, &b)| *a = a.saturating_add(b));
        }
        Ok(())
    }

    /// Finish the run.
    pub fn into_output(self, stats: Vec<FrameStats>) -> FusionOutput {
        let tsdf = self.accumulator.current_tsdf();
        log::info!(
            "fused {} frames: {} of {} voxels valid, {} visible",
            self.accumulator.num_updates(),
            self.accumulator.valid().iter().filter(|&&v| v).count(),
            tsdf.len(),
            self.visible.count(|&v| v),
        );
        FusionOutput {
            tsdf,
            visible: self.visible,
            in_frustum: self.in_frustum,
            stats,
        }
    }
}

impl VoxelAccumulator for FusionVolume {
    fn num_voxels(&self) -> usize {
        self.visible.len()
    }

    fn accumulate(
        &mut self,
        frame: &Frame,
        projection: &ProjectionResult,
    ) -> Result<FrameStats, Voxel3dError> {
        if projection.inside.len() != self.visible.len() {
            return Err(Voxel3dError::shape_mismatch(
                self.visible.len(),
                projection.inside.len(),
            ));
        }

        let depth = match &self.config.filter {
            Some(params) => Cow::Owned(prefilter_depth(frame.depth(), params)?),
            None => Cow::Borrowed(frame.depth()),
        };
        let observed = projection.observed_depths(&depth);

        let mu = self.config.mu;
        let visible_dist = std::f64::consts::SQRT_2 * self.visible.voxel_size();

        let mut valid_indices = Vec::new();
        let mut values = Vec::new();
        let mut visible_indices = Vec::new();
        for ((&i, &to_voxel), &observed) in projection
            .indices
            .iter()
            .zip(projection.depths.iter())
            .zip(observed.iter())
        {
            // positive when the voxel lies behind the measured surface
            let surface_to_voxel = to_voxel - observed;

            if surface_to_voxel <= mu {
                valid_indices.push(i);
                values.push(-surface_to_voxel.clamp(-mu, mu) as f32);
            }
            if surface_to_voxel.abs() < visible_dist {
                visible_indices.push(i);
            }
        }

        let weights = vec![1.0f32; valid_indices.len()];
        self.accumulator.update(&valid_indices, &weights, &values)?;
        self.visible
            .update_indexed(&visible_indices, |v, _| *v = true)?;
        if let Some(in_frustum) = self.in_frustum.as_mut() {
            in_frustum.update_indexed(&projection.indices, |c, _| *c = c.saturating_add(1))?;
        }

        Ok(FrameStats {
            num_voxels: self.visible.len(),
            num_inside: projection.num_inside(),
            num_updated: valid_indices.len(),
            num_visible: visible_indices.len(),
            ..Default::default()
        })
    }
}

/// Incremental TSDF fusion of a frame sequence into a fixed grid.
///
/// Follows the KinectFusion running average with one simplification: the signed
/// distance is measured along the optical axis (`depth_to_voxel - observed_depth`)
/// rather than along the camera ray. Voxels more than `mu` behind the surface are not
/// updated; everything in front of it is, with the distance truncated to `mu`.
///
/// # Example
///
/// ```
/// use voxfuse_3d::camera::Camera;
/// use voxfuse_3d::frame::Frame;
/// use voxfuse_3d::fusion::{AccumulatorState, FusionConfig, TsdfFusion};
/// use voxfuse_3d::voxel_grid::GridGeometry;
/// use voxfuse_image::{DepthImage, ImageSize};
///
/// let size = ImageSize { width: 8, height: 8 };
/// let camera = Camera::from_pinhole(8.0, 8.0, 4.0, 4.0).unwrap().with_image_size(size);
/// let frame = Frame::new(DepthImage::from_size_val(size, 1.0).unwrap(), camera).unwrap();
///
/// let geometry = GridGeometry::new([4, 4, 4], 0.01, [-0.015, -0.015, 0.985]).unwrap();
/// let mut fusion = TsdfFusion::new(&geometry, FusionConfig::default()).unwrap();
/// assert_eq!(fusion.state(), AccumulatorState::Empty);
/// fusion.integrate(&frame).unwrap();
/// assert_eq!(fusion.state(), AccumulatorState::Accumulating);
/// let output = fusion.finish();
/// assert!(!output.tsdf.as_slice()[0].is_nan());
/// ```
pub struct TsdfFusion {
    projector: VoxelProjector,
    volume: FusionVolume,
    stats: Vec<FrameStats>,
}

impl TsdfFusion {
    /// Prepare a fusion run over `geometry`.
    pub fn new(geometry: &GridGeometry, config: FusionConfig) -> Result<Self, Voxel3dError> {
        config.validate()?;
        Ok(Self {
            projector: VoxelProjector::new(geometry),
            volume: FusionVolume::new(geometry.clone(), config),
            stats: Vec::new(),
        })
    }

    /// Fuse one frame.
    pub fn integrate(&mut self, frame: &Frame) -> Result<FrameStats, Voxel3dError> {
        self.integrate_all(std::slice::from_ref(frame))?;
        Ok(self.stats.last().copied().unwrap_or_default())
    }

    /// Fuse a sequence of frames, in order.
    pub fn integrate_all(&mut self, frames: &[Frame]) -> Result<(), Voxel3dError> {
        let first = self.stats.len();
        let stats = accumulate_frames(&mut self.volume, &self.projector, frames)?;
        self.stats.extend(stats.into_iter().map(|mut s| {
            s.frame_index += first;
            s
        }));
        Ok(())
    }

    /// Whether any frame has been fused.
    pub fn state(&self) -> AccumulatorState {
        self.volume.accumulator().state()
    }

    /// The underlying per-voxel state.
    pub fn volume(&self) -> &FusionVolume {
        &self.volume
    }

    /// The tsdf fused so far, NaN where never observed.
    pub fn current_tsdf(&self) -> VoxelGrid<f32> {
        self.volume.accumulator().current_tsdf()
    }

    /// Voxels seen near the measured surface so far.
    pub fn visible(&self) -> &VoxelGrid<bool> {
        self.volume.visible()
    }

    /// Frustum counts so far, when requested.
    pub fn in_frustum(&self) -> Option<&VoxelGrid<u16>> {
        self.volume.in_frustum()
    }

    /// Per frame statistics so far.
    pub fn stats(&self) -> &[FrameStats] {
        &self.stats
    }

    /// End the run and return the fused grids.
    pub fn finish(self) -> FusionOutput {
        self.volume.into_output(self.stats)
    }
}

/// Fuse `frames` into a new tsdf over `geometry`, sequentially.
pub fn fuse(
    geometry: &GridGeometry,
    frames: &[Frame],
    config: &FusionConfig,
) -> Result<FusionOutput, Voxel3dError> {
    let mut fusion = TsdfFusion::new(geometry, config.clone())?;
    fusion.integrate_all(frames)?;
    Ok(fusion.finish())
}

/// Fuse `frames` into a new tsdf over `geometry`, spreading frames over the rayon pool.
///
/// Each worker folds its frames into a private [`FusionVolume`]; the partial volumes are
/// then merged. The result matches [`fuse`] up to floating point reassociation.
pub fn fuse_par(
    geometry: &GridGeometry,
    frames: &[Frame],
    config: &FusionConfig,
) -> Result<FusionOutput, Voxel3dError> {
    config.validate()?;
    let projector = VoxelProjector::new(geometry);
    let empty = || (FusionVolume::new(geometry.clone(), config.clone()), Vec::new());

    let (volume, mut stats) = frames
        .par_iter()
        .enumerate()
        .try_fold(empty, |(mut volume, mut stats), (frame_index, frame)| {
            let projection = projector.project(frame);
            let mut frame_stats = volume.accumulate(frame, &projection)?;
            frame_stats.frame_index = frame_index;
            stats.push(frame_stats);
            Ok::<_, Voxel3dError>((volume, stats))
        })
        .try_reduce(empty, |(mut volume, mut stats), (other, other_stats)| {
            volume.merge(&other)?;
            stats.extend(other_stats);
            Ok((volume, stats))
        })?;

    stats.sort_by_key(|s| s.frame_index);
    Ok(volume.into_output(stats))
}
