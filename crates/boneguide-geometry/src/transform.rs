//! Rigid-body transform math for the overlay.
//!
//! The wire format carries 4x4 matrices as 16 floats in **row-major** order,
//! while [`Mat4`] stores its columns (the layout every scene graph expects).
//! [`Mat4::from_row_major`] and [`Mat4::to_row_major`] are the only places
//! where that layout changes; nothing else in the workspace transposes by
//! hand.
//!
//! Camera transforms follow the usual AR convention: the camera looks down
//! its local `-Z` axis, so the world-space forward direction is the negated
//! third basis column.
//!
//! # Example
//!
//! ```rust
//! use boneguide_geometry::transform::{position_in_front_of_camera, Mat4, Vec3};
//!
//! let camera = Mat4::from_translation(Vec3::new(0.0, 1.5, 0.0));
//! let p = position_in_front_of_camera(&camera, 0.3);
//! assert!((p.y - 1.5).abs() < 1e-6);
//! assert!((p.z + 0.3).abs() < 1e-6);
//! ```

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (positions, directions, extents).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction.  The zero vector is returned
    /// unchanged.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            return self;
        }
        self.scale(1.0 / len)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    pub fn norm(self) -> f32 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn normalized(self) -> Self {
        let n = self.norm();
        if n <= f32::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// The equivalent 3x3 rotation matrix, indexed `[row][col]`.
    pub fn to_rotation_matrix(self) -> [[f32; 3]; 3] {
        let Self { w, x, y, z } = self;
        [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - w * z),
                2.0 * (x * z + w * y),
            ],
            [
                2.0 * (x * y + w * z),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - w * x),
            ],
            [
                2.0 * (x * z - w * y),
                2.0 * (y * z + w * x),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Mat4
// ────────────────────────────────────────────────────────────────────────────

/// A 4x4 homogeneous transform stored column by column.
///
/// `cols[c][r]` is the element in row `r`, column `c`.  Use [`Mat4::get`]
/// for row/column access and the row-major conversions at the wire boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4 {
    cols: [[f32; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mat4 {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Build from 16 row-major floats (the wire layout).
    ///
    /// # Panics
    ///
    /// Panics if `values` does not hold exactly 16 elements.  Callers that
    /// accept untrusted input validate the length first.
    pub fn from_row_major(values: &[f32]) -> Self {
        assert_eq!(values.len(), 16, "a 4x4 matrix needs 16 values");
        let mut cols = [[0.0; 4]; 4];
        for (r, row) in values.chunks_exact(4).enumerate() {
            for (c, value) in row.iter().enumerate() {
                cols[c][r] = *value;
            }
        }
        Self { cols }
    }

    /// Flatten to 16 row-major floats (the wire layout).
    pub fn to_row_major(&self) -> [f32; 16] {
        let mut out = [0.0; 16];
        for r in 0..4 {
            for c in 0..4 {
                out[r * 4 + c] = self.cols[c][r];
            }
        }
        out
    }

    /// A pure translation.
    pub fn from_translation(t: Vec3) -> Self {
        Self::identity().with_translation(t)
    }

    /// Rotation followed by translation.
    pub fn from_rotation_translation(rotation: Quaternion, translation: Vec3) -> Self {
        let r = rotation.to_rotation_matrix();
        let mut m = Self::identity();
        for (row, values) in r.iter().enumerate() {
            for (col, value) in values.iter().enumerate() {
                m.cols[col][row] = *value;
            }
        }
        m.with_translation(translation)
    }

    /// Element at `row`, `col`.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cols[col][row]
    }

    /// The first three components of column `index`.
    pub fn column(&self, index: usize) -> Vec3 {
        let c = self.cols[index];
        Vec3::new(c[0], c[1], c[2])
    }

    /// The translation part (fourth column).
    pub fn translation(&self) -> Vec3 {
        self.column(3)
    }

    /// Copy of `self` with its translation replaced.
    pub fn with_translation(mut self, t: Vec3) -> Self {
        self.cols[3][0] = t.x;
        self.cols[3][1] = t.y;
        self.cols[3][2] = t.z;
        self
    }

    /// Matrix product `self * rhs` (apply `rhs` first).
    pub fn mul(&self, rhs: &Self) -> Self {
        let mut cols = [[0.0; 4]; 4];
        for (c, col) in cols.iter_mut().enumerate() {
            for (r, value) in col.iter_mut().enumerate() {
                *value = (0..4).map(|k| self.cols[k][r] * rhs.cols[c][k]).sum();
            }
        }
        Self { cols }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Camera-relative helpers
// ────────────────────────────────────────────────────────────────────────────

/// Unit vector the camera is looking along, in world space.
pub fn forward_vector(camera: &Mat4) -> Vec3 {
    camera.column(2).scale(-1.0).normalized()
}

/// World-space point `distance_m` meters straight ahead of the camera.
pub fn position_in_front_of_camera(camera: &Mat4, distance_m: f32) -> Vec3 {
    camera
        .translation()
        .add(forward_vector(camera).scale(distance_m))
}

/// Extract the rotation of `m` as a unit quaternion.
///
/// Uses Shepperd's method: the branch is picked from whichever of
/// `w, x, y, z` is largest so the divisor never approaches zero, including
/// for rotations near 180°.
pub fn quaternion_from_transform(m: &Mat4) -> Quaternion {
    let (m00, m01, m02) = (m.get(0, 0), m.get(0, 1), m.get(0, 2));
    let (m10, m11, m12) = (m.get(1, 0), m.get(1, 1), m.get(1, 2));
    let (m20, m21, m22) = (m.get(2, 0), m.get(2, 1), m.get(2, 2));
    let trace = m00 + m11 + m22;

    let q = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0; // 4w
        Quaternion::new(0.25 * s, (m21 - m12) / s, (m02 - m20) / s, (m10 - m01) / s)
    } else if m00 > m11 && m00 > m22 {
        let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0; // 4x
        Quaternion::new((m21 - m12) / s, 0.25 * s, (m01 + m10) / s, (m02 + m20) / s)
    } else if m11 > m22 {
        let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0; // 4y
        Quaternion::new((m02 - m20) / s, (m01 + m10) / s, 0.25 * s, (m12 + m21) / s)
    } else {
        let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0; // 4z
        Quaternion::new((m10 - m01) / s, (m02 + m20) / s, (m12 + m21) / s, 0.25 * s)
    };
    q.normalized()
}

/// Shift `pose` by `distance` meters along the camera's forward vector and
/// then by `(x, y, z)` in world space.  Orientation is untouched.
pub fn apply_offset(pose: &Mat4, camera: &Mat4, distance: f32, x: f32, y: f32, z: f32) -> Mat4 {
    let shifted = pose
        .translation()
        .add(forward_vector(camera).scale(distance))
        .add(Vec3::new(x, y, z));
    pose.with_translation(shifted)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_1_SQRT_2, PI};

    fn axis_angle_matrix(axis: Vec3, angle: f32) -> [[f32; 3]; 3] {
        // Rodrigues' formula, independent of the quaternion code under test.
        let a = axis.normalized();
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        [
            [t * a.x * a.x + c, t * a.x * a.y - s * a.z, t * a.x * a.z + s * a.y],
            [t * a.x * a.y + s * a.z, t * a.y * a.y + c, t * a.y * a.z - s * a.x],
            [t * a.x * a.z - s * a.y, t * a.y * a.z + s * a.x, t * a.z * a.z + c],
        ]
    }

    fn axis_angle(axis: Vec3, angle: f32) -> Quaternion {
        let a = axis.normalized();
        let (s, c) = (angle * 0.5).sin_cos();
        Quaternion::new(c, a.x * s, a.y * s, a.z * s)
    }

    #[rustfmt::skip]
    fn mat4_from_rotation(r: [[f32; 3]; 3]) -> Mat4 {
        Mat4::from_row_major(&[
            r[0][0], r[0][1], r[0][2], 0.0,
            r[1][0], r[1][1], r[1][2], 0.0,
            r[2][0], r[2][1], r[2][2], 0.0,
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    // ── Mat4 layout ─────────────────────────────────────────────────────────

    #[test]
    #[rustfmt::skip]
    fn row_major_round_trip_is_lossless() {
        let samples: [[f32; 16]; 3] = [
            [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0],
            [0.0, -1.0, 0.0, 0.25, 1.0, 0.0, 0.0, -0.5, 0.0, 0.0, 1.0, 0.125, 0.0, 0.0, 0.0, 1.0],
            [-3.5, 1e-3, 7.25, 0.0, 2.0, 2.0, 2.0, 9.0, 0.1, 0.2, 0.3, 0.4, 0.0, 0.0, 0.0, 1.0],
        ];
        for m in samples {
            let back = Mat4::from_row_major(&m).to_row_major();
            for (a, b) in m.iter().zip(back.iter()) {
                assert!((a - b).abs() < 1e-5, "{a} != {b}");
            }
        }
    }

    #[test]
    #[rustfmt::skip]
    fn row_major_translation_lands_in_fourth_column() {
        let m = Mat4::from_row_major(&[
            1.0, 0.0, 0.0, 0.1,
            0.0, 1.0, 0.0, 0.2,
            0.0, 0.0, 1.0, -0.3,
            0.0, 0.0, 0.0, 1.0,
        ]);
        assert_eq!(m.translation(), Vec3::new(0.1, 0.2, -0.3));
        assert_eq!(m.get(0, 3), 0.1);
        assert_eq!(m.get(3, 0), 0.0);
    }

    #[test]
    #[should_panic(expected = "16 values")]
    fn from_row_major_rejects_wrong_length() {
        let _ = Mat4::from_row_major(&[1.0; 9]);
    }

    #[test]
    fn mul_by_identity_is_noop() {
        let m = Mat4::from_rotation_translation(
            Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2),
            Vec3::new(1.0, 2.0, 3.0),
        );
        assert_eq!(m.mul(&Mat4::identity()), m);
        assert_eq!(Mat4::identity().mul(&m), m);
    }

    #[test]
    fn mul_composes_translations_through_rotation() {
        // Parent rotated 90° about Z, child 1 m along the parent's +X.
        let parent = Mat4::from_rotation_translation(
            Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2),
            Vec3::default(),
        );
        let child = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let t = parent.mul(&child).translation();
        assert!(t.x.abs() < 1e-5, "x={}", t.x);
        assert!((t.y - 1.0).abs() < 1e-5, "y={}", t.y);
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn rotation_matrix_matches_rodrigues() {
        let axis = Vec3::new(1.0, 1.0, 0.0);
        let by_quat = axis_angle(axis, 0.7).to_rotation_matrix();
        let expected = axis_angle_matrix(axis, 0.7);
        for row in 0..3 {
            for col in 0..3 {
                assert!((by_quat[row][col] - expected[row][col]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn extraction_of_identity_is_identity() {
        let q = quaternion_from_transform(&Mat4::identity());
        assert!((q.w - 1.0).abs() < 1e-6);
        assert!(q.x.abs() < 1e-6 && q.y.abs() < 1e-6 && q.z.abs() < 1e-6);
    }

    #[test]
    fn extraction_is_stable_near_half_turn() {
        let axes = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-0.2, 0.9, 0.4),
        ];
        let angles = [PI, PI - 1e-4, PI - 1e-2, -PI + 1e-3];
        for axis in axes {
            for angle in angles {
                let r = axis_angle_matrix(axis, angle);
                let q = quaternion_from_transform(&mat4_from_rotation(r));
                assert!(
                    (q.norm() - 1.0).abs() < 1e-4,
                    "|q| = {} for axis {axis:?} angle {angle}",
                    q.norm()
                );
                let back = q.to_rotation_matrix();
                for row in 0..3 {
                    for col in 0..3 {
                        assert!(
                            (back[row][col] - r[row][col]).abs() < 1e-4,
                            "axis {axis:?} angle {angle}: [{row}][{col}] {} vs {}",
                            back[row][col],
                            r[row][col]
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn extraction_round_trips_general_rotation() {
        let q = axis_angle(Vec3::new(0.3, -0.5, 0.8), 1.1);
        let m = Mat4::from_rotation_translation(q, Vec3::new(4.0, 5.0, 6.0));
        let back = quaternion_from_transform(&m);
        // q and -q are the same rotation.
        let dot = q.w * back.w + q.x * back.x + q.y * back.y + q.z * back.z;
        assert!((dot.abs() - 1.0).abs() < 1e-5, "dot = {dot}");
    }

    // ── Camera helpers ──────────────────────────────────────────────────────

    #[test]
    fn identity_camera_looks_down_negative_z() {
        let f = forward_vector(&Mat4::identity());
        assert_eq!(f, Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn forward_vector_follows_camera_yaw() {
        // Camera turned 90° left (about +Y) now looks down -X.
        let camera = Mat4::from_rotation_translation(
            axis_angle(Vec3::new(0.0, 1.0, 0.0), PI / 2.0),
            Vec3::new(5.0, 0.0, 0.0),
        );
        let f = forward_vector(&camera);
        assert!((f.x + 1.0).abs() < 1e-5, "f = {f:?}");
        let p = position_in_front_of_camera(&camera, 0.3);
        assert!((p.x - 4.7).abs() < 1e-5, "p = {p:?}");
        assert!(p.z.abs() < 1e-5);
    }

    #[test]
    fn apply_offset_moves_along_forward_by_distance() {
        let camera = Mat4::from_rotation_translation(
            axis_angle(Vec3::new(1.0, 0.5, 0.0), 0.4),
            Vec3::new(0.2, 1.4, -0.1),
        );
        let pose = Mat4::identity();
        let adjusted = apply_offset(&pose, &camera, 0.05, 0.0, 0.0, 0.0);
        let forward = forward_vector(&camera);
        let delta = adjusted.translation().sub(pose.translation()).dot(forward);
        assert!((delta - 0.05).abs() < 1e-6, "delta = {delta}");
    }

    #[test]
    fn apply_offset_adds_world_xyz_and_keeps_orientation() {
        let q = axis_angle(Vec3::new(0.0, 0.0, 1.0), 0.3);
        let pose = Mat4::from_rotation_translation(q, Vec3::new(0.0, 0.0, -0.3));
        let adjusted = apply_offset(&pose, &Mat4::identity(), 0.0, 0.01, -0.02, 0.03);
        let t = adjusted.translation();
        assert!((t.x - 0.01).abs() < 1e-6);
        assert!((t.y + 0.02).abs() < 1e-6);
        assert!((t.z + 0.27).abs() < 1e-6);
        for r in 0..3 {
            for c in 0..3 {
                assert_eq!(adjusted.get(r, c), pose.get(r, c));
            }
        }
    }
}
