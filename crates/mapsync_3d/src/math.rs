//! Column-major 4x4 matrices
//!
//! Layout matches the arrays the engine hands to custom layers: element
//! `cols[c][r]` is column `c`, row `r`, and the flat form is column after column.

use std::ops::Mul;

/// A column-major 4x4 matrix
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat4 {
    pub cols: [[f32; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4 {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn from_cols_array(arr: &[f32; 16]) -> Self {
        let mut cols = [[0.0; 4]; 4];
        for (c, col) in cols.iter_mut().enumerate() {
            col.copy_from_slice(&arr[c * 4..c * 4 + 4]);
        }
        Self { cols }
    }

    pub fn to_cols_array(&self) -> [f32; 16] {
        let mut arr = [0.0; 16];
        for (c, col) in self.cols.iter().enumerate() {
            arr[c * 4..c * 4 + 4].copy_from_slice(col);
        }
        arr
    }

    pub fn from_translation(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[3] = [x, y, z, 1.0];
        m
    }

    /// Right-handed perspective projection with a `[0, 1]` depth range
    pub fn perspective_rh(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let h = 1.0 / (fov_y * 0.5).tan();
        let r = far / (near - far);
        Self {
            cols: [
                [h / aspect, 0.0, 0.0, 0.0],
                [0.0, h, 0.0, 0.0],
                [0.0, 0.0, r, -1.0],
                [0.0, 0.0, near * r, 0.0],
            ],
        }
    }

    /// Inverse, or `None` if the matrix is singular
    pub fn inverse(&self) -> Option<Self> {
        // 2x2 sub-determinants of the first two and last two columns
        let a = &self.cols;
        let s0 = a[0][0] * a[1][1] - a[1][0] * a[0][1];
        let s1 = a[0][0] * a[1][2] - a[1][0] * a[0][2];
        let s2 = a[0][0] * a[1][3] - a[1][0] * a[0][3];
        let s3 = a[0][1] * a[1][2] - a[1][1] * a[0][2];
        let s4 = a[0][1] * a[1][3] - a[1][1] * a[0][3];
        let s5 = a[0][2] * a[1][3] - a[1][2] * a[0][3];

        let c5 = a[2][2] * a[3][3] - a[3][2] * a[2][3];
        let c4 = a[2][1] * a[3][3] - a[3][1] * a[2][3];
        let c3 = a[2][1] * a[3][2] - a[3][1] * a[2][2];
        let c2 = a[2][0] * a[3][3] - a[3][0] * a[2][3];
        let c1 = a[2][0] * a[3][2] - a[3][0] * a[2][2];
        let c0 = a[2][0] * a[3][1] - a[3][0] * a[2][1];

        let det = s0 * c5 - s1 * c4 + s2 * c3 + s3 * c2 - s4 * c1 + s5 * c0;
        if det.abs() < f32::EPSILON * 1e-3 {
            return None;
        }
        let inv = 1.0 / det;

        Some(Self {
            cols: [
                [
                    (a[1][1] * c5 - a[1][2] * c4 + a[1][3] * c3) * inv,
                    (-a[0][1] * c5 + a[0][2] * c4 - a[0][3] * c3) * inv,
                    (a[3][1] * s5 - a[3][2] * s4 + a[3][3] * s3) * inv,
                    (-a[2][1] * s5 + a[2][2] * s4 - a[2][3] * s3) * inv,
                ],
                [
                    (-a[1][0] * c5 + a[1][2] * c2 - a[1][3] * c1) * inv,
                    (a[0][0] * c5 - a[0][2] * c2 + a[0][3] * c1) * inv,
                    (-a[3][0] * s5 + a[3][2] * s2 - a[3][3] * s1) * inv,
                    (a[2][0] * s5 - a[2][2] * s2 + a[2][3] * s1) * inv,
                ],
                [
                    (a[1][0] * c4 - a[1][1] * c2 + a[1][3] * c0) * inv,
                    (-a[0][0] * c4 + a[0][1] * c2 - a[0][3] * c0) * inv,
                    (a[3][0] * s4 - a[3][1] * s2 + a[3][3] * s0) * inv,
                    (-a[2][0] * s4 + a[2][1] * s2 - a[2][3] * s0) * inv,
                ],
                [
                    (-a[1][0] * c3 + a[1][1] * c1 - a[1][2] * c0) * inv,
                    (a[0][0] * c3 - a[0][1] * c1 + a[0][2] * c0) * inv,
                    (-a[3][0] * s3 + a[3][1] * s1 - a[3][2] * s0) * inv,
                    (a[2][0] * s3 - a[2][1] * s1 + a[2][2] * s0) * inv,
                ],
            ],
        })
    }

    /// Copy with the translation column zeroed (keeps `w`)
    pub fn without_translation(&self) -> Self {
        let mut m = *self;
        m.cols[3][0] = 0.0;
        m.cols[3][1] = 0.0;
        m.cols[3][2] = 0.0;
        m
    }

    pub fn approx_eq(&self, other: &Mat4, epsilon: f32) -> bool {
        self.to_cols_array()
            .iter()
            .zip(other.to_cols_array().iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

impl Mul for Mat4 {
    type Output = Mat4;

    fn mul(self, rhs: Mat4) -> Mat4 {
        let mut out = [[0.0; 4]; 4];
        for (c, col) in out.iter_mut().enumerate() {
            for (r, value) in col.iter_mut().enumerate() {
                *value = (0..4).map(|k| self.cols[k][r] * rhs.cols[c][k]).sum();
            }
        }
        Mat4 { cols: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_layout_is_column_major() {
        let m = Mat4::from_translation(1.0, 2.0, 3.0);
        let flat = m.to_cols_array();
        assert_eq!(&flat[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(Mat4::from_cols_array(&flat), m);
    }

    #[test]
    fn test_inverse_round_trip() {
        let m = Mat4::perspective_rh(0.9, 1.5, 0.1, 100.0) * Mat4::from_translation(3.0, -2.0, 5.0);
        let inv = m.inverse().unwrap();
        assert!((m * inv).approx_eq(&Mat4::IDENTITY, 1e-4));
        assert!((inv * m).approx_eq(&Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn test_singular_has_no_inverse() {
        let zero = Mat4 { cols: [[0.0; 4]; 4] };
        assert!(zero.inverse().is_none());
    }

    #[test]
    fn test_translation_applies_last() {
        let t = Mat4::from_translation(1.0, 0.0, 0.0);
        let s = Mat4 {
            cols: [
                [2.0, 0.0, 0.0, 0.0],
                [0.0, 2.0, 0.0, 0.0],
                [0.0, 0.0, 2.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        };
        // Scale, then translate
        assert_eq!((t * s).cols[3], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!((s * t).cols[3], [2.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_without_translation() {
        let m = Mat4::from_translation(4.0, 5.0, 6.0).without_translation();
        assert_eq!(m, Mat4::IDENTITY);
    }
}
