use crate::error::Voxel3dError;
use crate::linalg::{self, IDENTITY3};

/// The placement of a dense voxel grid in the world.
///
/// Voxel `(i, j, k)` has its centre at `origin + R * (voxel_size * (i, j, k))`, so
/// `origin` is the centre of voxel `(0, 0, 0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    shape: [usize; 3],
    voxel_size: f64,
    rotation: [[f64; 3]; 3],
    rotation_inv: [[f64; 3]; 3],
    origin: [f64; 3],
}

impl GridGeometry {
    /// Create an axis-aligned grid geometry.
    ///
    /// # Errors
    ///
    /// Returns [`Voxel3dError::InvalidParameter`] if `voxel_size` is not a positive finite number.
    pub fn new(shape: [usize; 3], voxel_size: f64, origin: [f64; 3]) -> Result<Self, Voxel3dError> {
        if !(voxel_size.is_finite() && voxel_size > 0.0) {
            return Err(Voxel3dError::InvalidParameter(format!(
                "voxel size must be positive, got {voxel_size}"
            )));
        }
        Ok(Self {
            shape,
            voxel_size,
            rotation: IDENTITY3,
            rotation_inv: IDENTITY3,
            origin,
        })
    }

    /// Rotate the grid about its origin. The inverse rotation is cached.
    pub fn with_rotation(mut self, rotation: [[f64; 3]; 3]) -> Result<Self, Voxel3dError> {
        self.rotation_inv =
            linalg::invert(&rotation).ok_or(Voxel3dError::SingularMatrix("grid rotation"))?;
        self.rotation = rotation;
        Ok(self)
    }

    /// Number of voxels along each axis.
    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Total number of voxels.
    #[inline]
    pub fn num_voxels(&self) -> usize {
        self.shape[0] * self.shape[1] * self.shape[2]
    }

    /// Physical side length of a voxel.
    #[inline]
    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// World position of the centre of voxel `(0, 0, 0)`.
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// The grid rotation.
    pub fn rotation(&self) -> &[[f64; 3]; 3] {
        &self.rotation
    }

    /// The cached inverse of the grid rotation.
    pub fn rotation_inv(&self) -> &[[f64; 3]; 3] {
        &self.rotation_inv
    }

    /// Flat raster index of voxel `(i, j, k)`; `k` varies fastest.
    #[inline]
    pub fn flat_index(&self, index: [usize; 3]) -> Option<usize> {
        let [ni, nj, nk] = self.shape;
        let [i, j, k] = index;
        (i < ni && j < nj && k < nk).then(|| (i * nj + j) * nk + k)
    }

    /// The `(i, j, k)` index of a flat raster index.
    #[inline]
    pub fn unflatten(&self, flat: usize) -> [usize; 3] {
        let [_, nj, nk] = self.shape;
        [flat / (nj * nk), (flat / nk) % nj, flat % nk]
    }

    /// World coordinates of the centre of voxel `index`.
    pub fn index_to_world(&self, index: [usize; 3]) -> [f64; 3] {
        let scaled = index.map(|v| v as f64 * self.voxel_size);
        let rotated = linalg::mat33_mul_vec(&self.rotation, &scaled);
        [
            rotated[0] + self.origin[0],
            rotated[1] + self.origin[1],
            rotated[2] + self.origin[2],
        ]
    }

    /// The voxel whose centre is nearest to `point`, or `None` if it falls outside the grid.
    pub fn world_to_index(&self, point: &[f64; 3]) -> Option<[usize; 3]> {
        let local = linalg::mat33_mul_vec(
            &self.rotation_inv,
            &[
                point[0] - self.origin[0],
                point[1] - self.origin[1],
                point[2] - self.origin[2],
            ],
        );
        let mut index = [0usize; 3];
        for axis in 0..3 {
            let v = (local[axis] / self.voxel_size).round();
            if !(v >= 0.0 && v < self.shape[axis] as f64) {
                return None;
            }
            index[axis] = v as usize;
        }
        Some(index)
    }

    /// World coordinates of every voxel centre, in flat raster order.
    pub fn world_coordinates(&self) -> Vec<[f64; 3]> {
        let [ni, nj, nk] = self.shape;
        let mut scaled = Vec::with_capacity(self.num_voxels());
        for i in 0..ni {
            for j in 0..nj {
                for k in 0..nk {
                    scaled.push([
                        i as f64 * self.voxel_size,
                        j as f64 * self.voxel_size,
                        k as f64 * self.voxel_size,
                    ]);
                }
            }
        }

        linalg::transform_points(&scaled, &self.rotation, &self.origin)
    }
}

/// A dense 3D array of per-voxel values placed in the world by a [`GridGeometry`].
///
/// Values are stored in flat raster order, the same order as
/// [`GridGeometry::world_coordinates`].
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid<T> {
    geometry: GridGeometry,
    values: Vec<T>,
}

impl<T: Clone + Default> VoxelGrid<T> {
    /// Create a grid with every voxel set to `T::default()`.
    pub fn new(geometry: GridGeometry) -> Self {
        let values = vec![T::default(); geometry.num_voxels()];
        Self { geometry, values }
    }

    /// A grid with the same geometry as `self` and every value set to `U::default()`.
    pub fn blank_copy<U: Clone + Default>(&self) -> VoxelGrid<U> {
        VoxelGrid::new(self.geometry.clone())
    }
}

impl<T> VoxelGrid<T> {
    /// Create a grid from values in flat raster order.
    ///
    /// # Errors
    ///
    /// Returns [`Voxel3dError::ShapeMismatch`] if the number of values differs from the
    /// number of voxels.
    pub fn from_values(geometry: GridGeometry, values: Vec<T>) -> Result<Self, Voxel3dError> {
        if values.len() != geometry.num_voxels() {
            return Err(Voxel3dError::shape_mismatch(
                geometry.num_voxels(),
                values.len(),
            ));
        }
        Ok(Self { geometry, values })
    }

    /// The grid geometry.
    #[inline]
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Number of voxels along each axis.
    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.geometry.shape
    }

    /// Physical side length of a voxel.
    #[inline]
    pub fn voxel_size(&self) -> f64 {
        self.geometry.voxel_size
    }

    /// Total number of voxels.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the grid has no voxels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The values in flat raster order.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// The values in flat raster order, mutably.
    #[inline]
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Consume the grid and return its values.
    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    /// The value of voxel `(i, j, k)`.
    pub fn get(&self, index: [usize; 3]) -> Option<&T> {
        self.geometry
            .flat_index(index)
            .and_then(|i| self.values.get(i))
    }

    /// Mutable access to the value of voxel `(i, j, k)`.
    pub fn get_mut(&mut self, index: [usize; 3]) -> Option<&mut T> {
        self.geometry
            .flat_index(index)
            .and_then(|i| self.values.get_mut(i))
    }

    /// World coordinates of every voxel centre, in flat raster order.
    pub fn world_coordinates(&self) -> Vec<[f64; 3]> {
        self.geometry.world_coordinates()
    }

    /// Apply `f` to every value and return a grid with the same geometry.
    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> VoxelGrid<U> {
        VoxelGrid {
            geometry: self.geometry.clone(),
            values: self.values.iter().map(f).collect(),
        }
    }

    /// Number of voxels whose value satisfies `pred`.
    pub fn count(&self, pred: impl Fn(&T) -> bool) -> usize {
        self.values.iter().filter(|v| pred(v)).count()
    }

    fn check_mask(&self, mask: &[bool]) -> Result<(), Voxel3dError> {
        if mask.len() != self.values.len() {
            return Err(Voxel3dError::shape_mismatch(self.values.len(), mask.len()));
        }
        Ok(())
    }

    /// The values of the voxels selected by a flat boolean mask, in raster order.
    pub fn get_indicated(&self, mask: &[bool]) -> Result<Vec<T>, Voxel3dError>
    where
        T: Clone,
    {
        self.check_mask(mask)?;
        Ok(self
            .values
            .iter()
            .zip(mask.iter())
            .filter(|(_, &m)| m)
            .map(|(v, _)| v.clone())
            .collect())
    }

    /// Overwrite the voxels selected by a flat boolean mask with `values`, in raster order.
    ///
    /// # Errors
    ///
    /// Returns [`Voxel3dError::ShapeMismatch`] if the mask does not cover the grid or the
    /// number of values differs from the number of selected voxels. The grid is not
    /// modified on error.
    pub fn set_indicated(&mut self, mask: &[bool], values: &[T]) -> Result<(), Voxel3dError>
    where
        T: Clone,
    {
        self.check_mask(mask)?;
        let selected = mask.iter().filter(|&&m| m).count();
        if selected != values.len() {
            return Err(Voxel3dError::shape_mismatch(selected, values.len()));
        }
        self.values
            .iter_mut()
            .zip(mask.iter())
            .filter(|(_, &m)| m)
            .zip(values.iter())
            .for_each(|((dst, _), src)| *dst = src.clone());
        Ok(())
    }

    /// Set every voxel selected by a flat boolean mask to `value`.
    pub fn fill_indicated(&mut self, mask: &[bool], value: T) -> Result<(), Voxel3dError>
    where
        T: Clone,
    {
        self.check_mask(mask)?;
        self.values
            .iter_mut()
            .zip(mask.iter())
            .filter(|(_, &m)| m)
            .for_each(|(dst, _)| *dst = value.clone());
        Ok(())
    }

    /// The values at a list of flat indices.
    pub fn get_indexed(&self, indices: &[usize]) -> Result<Vec<T>, Voxel3dError>
    where
        T: Clone,
    {
        indices
            .iter()
            .map(|&i| {
                self.values
                    .get(i)
                    .cloned()
                    .ok_or(Voxel3dError::IndexOutOfBounds(i, self.values.len()))
            })
            .collect()
    }

    /// Apply `f` to the voxel at each flat index, together with the position of the index
    /// in `indices`.
    ///
    /// All indices are checked before any voxel is touched, so the grid is unchanged on error.
    pub fn update_indexed(
        &mut self,
        indices: &[usize],
        mut f: impl FnMut(&mut T, usize),
    ) -> Result<(), Voxel3dError> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.values.len()) {
            return Err(Voxel3dError::IndexOutOfBounds(bad, self.values.len()));
        }
        for (pos, &i) in indices.iter().enumerate() {
            f(&mut self.values[i], pos);
        }
        Ok(())
    }
}
