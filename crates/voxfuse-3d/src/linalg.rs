use faer::linalg::solvers::SolverCore;

const SINGULAR_EPS: f64 = 1e-12;

/// The 3x3 identity matrix.
pub const IDENTITY3: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// The 4x4 identity matrix.
pub const IDENTITY4: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Transform a set of points using a linear map and a translation, `M * p + t`.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_m_src` - A 3x3 matrix, row-major.
/// * `dst_t_src` - A translation vector.
///
/// # Returns
///
/// The transformed points, in the same order.
///
/// Example:
///
/// ```
/// use voxfuse_3d::linalg::{transform_points, IDENTITY3};
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let translation = [1.0, 0.0, 0.0];
/// let dst_points = transform_points(&src_points, &IDENTITY3, &translation);
/// assert_eq!(dst_points[1], [4.0, 4.0, 5.0]);
/// ```
pub fn transform_points(
    src_points: &[[f64; 3]],
    dst_m_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
) -> Vec<[f64; 3]> {
    let mut dst_points = vec![[0.0; 3]; src_points.len()];
    if src_points.is_empty() {
        return dst_points;
    }

    let dst_m_src_mat = {
        // SAFETY: [[f64; 3]; 3] is laid out as 9 contiguous f64
        let slice = unsafe { std::slice::from_raw_parts(dst_m_src.as_ptr() as *const f64, 9) };
        faer::mat::from_row_major_slice(slice, 3, 3)
    };

    // create view of the source points
    let points_in_src = {
        let src_points_slice = unsafe {
            std::slice::from_raw_parts(src_points.as_ptr() as *const f64, src_points.len() * 3)
        };
        // SAFETY: src_points_slice is a Nx3 matrix where each row represents a 3D point
        faer::mat::from_row_major_slice(src_points_slice, src_points.len(), 3)
    };

    {
        // create a mutable view of the destination points
        let mut points_in_dst = {
            let dst_points_slice = unsafe {
                std::slice::from_raw_parts_mut(
                    dst_points.as_mut_ptr() as *mut f64,
                    dst_points.len() * 3,
                )
            };
            // SAFETY: dst_points_slice is a 3xN matrix where each column represents a 3D point
            faer::mat::from_column_major_slice_mut(dst_points_slice, 3, dst_points.len())
        };

        faer::linalg::matmul::matmul(
            &mut points_in_dst,
            dst_m_src_mat,
            points_in_src.transpose(),
            None,
            1.0,
            faer::Parallelism::None,
        );
    }

    let [tx, ty, tz] = *dst_t_src;
    for p in dst_points.iter_mut() {
        p[0] += tx;
        p[1] += ty;
        p[2] += tz;
    }

    dst_points
}

fn to_mat<const N: usize>(m: &[[f64; N]; N]) -> faer::Mat<f64> {
    faer::Mat::from_fn(N, N, |i, j| m[i][j])
}

fn from_mat<const N: usize>(m: &faer::Mat<f64>) -> [[f64; N]; N] {
    std::array::from_fn(|i| std::array::from_fn(|j| m.read(i, j)))
}

/// Multiply two 3x3 matrices, `a * b`.
pub fn mat33_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    from_mat(&(&to_mat(a) * &to_mat(b)))
}

/// Multiply a 3x3 matrix with a column vector, `m * v`.
#[inline]
pub fn mat33_mul_vec(m: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Split a 4x4 homogeneous transform into its upper-left 3x3 block and translation column.
pub fn split_affine(m: &[[f64; 4]; 4]) -> ([[f64; 3]; 3], [f64; 3]) {
    let mut block = [[0.0; 3]; 3];
    let mut translation = [0.0; 3];
    for i in 0..3 {
        block[i].copy_from_slice(&m[i][..3]);
        translation[i] = m[i][3];
    }
    (block, translation)
}

/// Invert a square matrix through a partial pivoting LU decomposition.
///
/// Returns `None` when the matrix holds a non-finite entry or is singular to working
/// precision, i.e. `|det(m)|` is below `1e-12` times the smaller of the products of its
/// row norms and of its column norms (the Hadamard bound).
pub fn invert<const N: usize>(m: &[[f64; N]; N]) -> Option<[[f64; N]; N]> {
    if m.iter().flat_map(|row| row.iter()).any(|v| !v.is_finite()) {
        return None;
    }

    let mat = to_mat(m);
    let row_bound: f64 = (0..N).map(|i| mat.row(i).norm_l2()).product();
    let col_bound: f64 = (0..N).map(|j| mat.col(j).norm_l2()).product();
    let det = mat.determinant();
    if !det.is_finite() || det.abs() <= SINGULAR_EPS * row_bound.min(col_bound) {
        return None;
    }

    let inv = from_mat(&mat.partial_piv_lu().inverse());
    inv.iter()
        .flat_map(|row| row.iter())
        .all(|v| v.is_finite())
        .then_some(inv)
}
