// Transform utilities for Mat4 and Quat
//
// glam uses column vectors: `a * b` applies `b` first. Scene composition
// in this workspace is always written in that order.

use glam::{Mat4, Quat, Vec4};

/// Determinants smaller than this are treated as singular.
const SINGULAR_EPSILON: f32 = 1e-12;

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Inverse, or `None` when the matrix is singular.
    fn try_inverse(&self) -> Option<Mat4>;

    /// Inverse, falling back to identity for singular matrices.
    fn inverse_or_identity(&self) -> Mat4;

    /// True when every element is within `eps` of the identity matrix.
    fn is_identity_approx(&self, eps: f32) -> bool;
}

impl Mat4Ext for Mat4 {
    fn try_inverse(&self) -> Option<Mat4> {
        if self.determinant().abs() < SINGULAR_EPSILON {
            None
        } else {
            Some(self.inverse())
        }
    }

    fn inverse_or_identity(&self) -> Mat4 {
        self.try_inverse().unwrap_or(Mat4::IDENTITY)
    }

    fn is_identity_approx(&self, eps: f32) -> bool {
        self.abs_diff_eq(Mat4::IDENTITY, eps)
    }
}

/// Reorder a quaternion from imaginary-first storage into a real-first vector.
///
/// `glam::Quat` stores `(x, y, z, w)` like the scene's half/float quaternion
/// attributes; render engines expect `(w, x, y, z)`.
pub fn quat_to_real_first(q: Quat) -> Vec4 {
    Vec4::new(q.w, q.x, q.y, q.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_try_inverse_translation() {
        let mat = Mat4::from_translation(Vec3::new(10.0, 20.0, 30.0));
        let inv = mat.try_inverse().unwrap();
        let point = inv.transform_point3(Vec3::new(11.0, 22.0, 33.0));

        assert!((point - Vec3::new(1.0, 2.0, 3.0)).length() < 0.001);
    }

    #[test]
    fn test_try_inverse_singular() {
        let mat = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        assert!(mat.try_inverse().is_none());
        assert_eq!(mat.inverse_or_identity(), Mat4::IDENTITY);
    }

    #[test]
    fn test_identity_approx() {
        assert!(Mat4::IDENTITY.is_identity_approx(1e-6));
        let nudged = Mat4::from_translation(Vec3::new(1e-7, 0.0, 0.0));
        assert!(nudged.is_identity_approx(1e-6));
        let moved = Mat4::from_translation(Vec3::X);
        assert!(!moved.is_identity_approx(1e-6));
    }

    #[test]
    fn test_quat_to_real_first() {
        let q = Quat::from_xyzw(0.1, 0.2, 0.3, 0.9);
        let v = quat_to_real_first(q);

        assert_eq!(v, Vec4::new(0.9, 0.1, 0.2, 0.3));
    }

    #[test]
    fn test_quat_to_real_first_identity() {
        assert_eq!(quat_to_real_first(Quat::IDENTITY), Vec4::new(1.0, 0.0, 0.0, 0.0));
    }
}
