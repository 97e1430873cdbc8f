use serde::{Deserialize, Serialize};
use voxfuse_image::ImageSize;

use crate::error::Voxel3dError;
use crate::linalg::{self, IDENTITY3, IDENTITY4};

/// A pinhole camera with a known pose.
///
/// The camera stores the intrinsic matrix `K` and the extrinsic matrix `H`, a 4x4
/// transform taking points from the camera frame to the world frame. Both inverses
/// are cached and recomputed on every setter, so they always match the last value set.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    intrinsics: [[f64; 3]; 3],
    intrinsics_inv: [[f64; 3]; 3],
    extrinsics: [[f64; 4]; 4],
    extrinsics_inv: [[f64; 4]; 4],
    // inverse of the upper-left 3x3 block of `extrinsics`
    rotation_inv: [[f64; 3]; 3],
    image_size: Option<ImageSize>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            intrinsics: IDENTITY3,
            intrinsics_inv: IDENTITY3,
            extrinsics: IDENTITY4,
            extrinsics_inv: IDENTITY4,
            rotation_inv: IDENTITY3,
            image_size: None,
        }
    }
}

impl Camera {
    /// Create a camera from its intrinsic matrix and camera-to-world transform.
    ///
    /// # Errors
    ///
    /// Returns [`Voxel3dError::SingularMatrix`] if either matrix is not invertible.
    pub fn new(intrinsics: [[f64; 3]; 3], extrinsics: [[f64; 4]; 4]) -> Result<Self, Voxel3dError> {
        let mut camera = Self::default();
        camera.set_intrinsics(intrinsics)?;
        camera.set_extrinsics(extrinsics)?;
        Ok(camera)
    }

    /// Create a camera at the world origin looking down +z from pinhole parameters.
    ///
    /// # Example
    ///
    /// ```
    /// use voxfuse_3d::camera::Camera;
    ///
    /// let camera = Camera::from_pinhole(500.0, 500.0, 320.0, 240.0).unwrap();
    /// let uvd = camera.project_points(&[[0.0, 0.0, 2.0]]);
    /// assert_eq!(uvd[0], [320.0, 240.0, 2.0]);
    /// ```
    pub fn from_pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, Voxel3dError> {
        Self::new([[fx, 0.0, cx], [0.0, fy, cy], [0.0, 0.0, 1.0]], IDENTITY4)
    }

    /// Attach the size of the images this camera produces.
    ///
    /// Frames built with this camera must then carry depth images of exactly this size.
    pub fn with_image_size(mut self, image_size: ImageSize) -> Self {
        self.image_size = Some(image_size);
        self
    }

    /// Set the intrinsic matrix and recompute its inverse.
    ///
    /// On error the camera is left unchanged.
    pub fn set_intrinsics(&mut self, intrinsics: [[f64; 3]; 3]) -> Result<(), Voxel3dError> {
        let inv = linalg::invert(&intrinsics).ok_or(Voxel3dError::SingularMatrix("intrinsic"))?;
        self.intrinsics = intrinsics;
        self.intrinsics_inv = inv;
        Ok(())
    }

    /// Set the camera-to-world transform and recompute its inverse.
    ///
    /// On error the camera is left unchanged.
    pub fn set_extrinsics(&mut self, extrinsics: [[f64; 4]; 4]) -> Result<(), Voxel3dError> {
        let inv = linalg::invert(&extrinsics).ok_or(Voxel3dError::SingularMatrix("extrinsic"))?;
        let (rotation, _) = linalg::split_affine(&extrinsics);
        let rotation_inv =
            linalg::invert(&rotation).ok_or(Voxel3dError::SingularMatrix("extrinsic rotation"))?;
        self.extrinsics = extrinsics;
        self.extrinsics_inv = inv;
        self.rotation_inv = rotation_inv;
        Ok(())
    }

    /// The intrinsic matrix `K`.
    pub fn intrinsics(&self) -> &[[f64; 3]; 3] {
        &self.intrinsics
    }

    /// The cached inverse of `K`.
    pub fn intrinsics_inv(&self) -> &[[f64; 3]; 3] {
        &self.intrinsics_inv
    }

    /// The camera-to-world transform `H`.
    pub fn extrinsics(&self) -> &[[f64; 4]; 4] {
        &self.extrinsics
    }

    /// The cached world-to-camera transform `H^-1`.
    pub fn extrinsics_inv(&self) -> &[[f64; 4]; 4] {
        &self.extrinsics_inv
    }

    /// The declared image size, if any.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    /// The camera centre in world coordinates.
    pub fn position(&self) -> [f64; 3] {
        [
            self.extrinsics[0][3],
            self.extrinsics[1][3],
            self.extrinsics[2][3],
        ]
    }

    /// Project world points into the image.
    ///
    /// Each point is mapped to the camera frame with `H^-1`, multiplied by `K`, and its
    /// first two homogeneous coordinates are divided by the third. The result per point
    /// is `(u, v, depth)`, where depth is the distance along the optical axis.
    ///
    /// No bounds checking is done. Points with depth `<= 0` lie behind the camera and
    /// yield meaningless (possibly infinite) pixel coordinates; callers must filter them.
    pub fn project_points(&self, xyz: &[[f64; 3]]) -> Vec<[f64; 3]> {
        // P = K * [R | t] where [R | t] are the top rows of H^-1
        let (rotation, translation) = linalg::split_affine(&self.extrinsics_inv);
        let projection = linalg::mat33_mul(&self.intrinsics, &rotation);
        let projection_t = linalg::mat33_mul_vec(&self.intrinsics, &translation);

        let mut uvd = linalg::transform_points(xyz, &projection, &projection_t);
        for p in uvd.iter_mut() {
            p[0] /= p[2];
            p[1] /= p[2];
        }
        uvd
    }

    /// Lift image points with depth back into the world, the inverse of [`Camera::project_points`].
    ///
    /// Each `(u, v, d)` becomes the camera-frame point `d * K^-1 * (u, v, 1)`, which is
    /// then mapped to the world with `H`.
    pub fn inv_project_points(&self, uvd: &[[f64; 3]]) -> Vec<[f64; 3]> {
        let camera_points = uvd
            .iter()
            .map(|&[u, v, d]| {
                let ray = linalg::mat33_mul_vec(&self.intrinsics_inv, &[u, v, 1.0]);
                [ray[0] * d, ray[1] * d, ray[2] * d]
            })
            .collect::<Vec<_>>();

        let (rotation, translation) = linalg::split_affine(&self.extrinsics);
        linalg::transform_points(&camera_points, &rotation, &translation)
    }

    /// Transform direction vectors from the world frame into the camera frame.
    ///
    /// Directions ignore the translation; they are multiplied by the inverse of the
    /// upper-left 3x3 block of `H`.
    pub fn inv_transform_normals(&self, normals: &[[f64; 3]]) -> Vec<[f64; 3]> {
        normals
            .iter()
            .map(|n| linalg::mat33_mul_vec(&self.rotation_inv, n))
            .collect()
    }
}

/// Serializable camera description, e.g. for a JSON frame list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    /// The intrinsic matrix, row-major.
    pub intrinsics: [[f64; 3]; 3],
    /// The camera-to-world transform, row-major.
    pub extrinsics: [[f64; 4]; 4],
    /// The image size as `[width, height]`.
    #[serde(default)]
    pub image_size: Option<[usize; 2]>,
}

impl TryFrom<CameraParams> for Camera {
    type Error = Voxel3dError;

    fn try_from(params: CameraParams) -> Result<Self, Self::Error> {
        let camera = Camera::new(params.intrinsics, params.extrinsics)?;
        Ok(match params.image_size {
            Some(size) => camera.with_image_size(size.into()),
            None => camera,
        })
    }
}

impl From<&Camera> for CameraParams {
    fn from(camera: &Camera) -> Self {
        Self {
            intrinsics: camera.intrinsics,
            extrinsics: camera.extrinsics,
            image_size: camera.image_size.map(|s| [s.width, s.height]),
        }
    }
}
