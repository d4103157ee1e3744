//! Transform operations.

use bif_math::{Mat4, Vec3};

/// Transform operation types found in USD xformOps.
#[derive(Clone, Debug, PartialEq)]
pub enum XformOp {
    /// Translation (xformOp:translate)
    Translate(Vec3),

    /// Rotation in degrees around X axis
    RotateX(f32),

    /// Rotation in degrees around Y axis
    RotateY(f32),

    /// Rotation in degrees around Z axis
    RotateZ(f32),

    /// Euler rotation in degrees, X applied first
    RotateXYZ(Vec3),

    /// Scale (uniform or non-uniform)
    Scale(Vec3),

    /// Full 4x4 transform matrix
    Transform(Mat4),
}

impl XformOp {
    /// Convert this operation to a transformation matrix.
    pub fn to_matrix(&self) -> Mat4 {
        match self {
            XformOp::Translate(t) => Mat4::from_translation(*t),
            XformOp::RotateX(deg) => Mat4::from_rotation_x(deg.to_radians()),
            XformOp::RotateY(deg) => Mat4::from_rotation_y(deg.to_radians()),
            XformOp::RotateZ(deg) => Mat4::from_rotation_z(deg.to_radians()),
            XformOp::RotateXYZ(euler) => {
                Mat4::from_rotation_z(euler.z.to_radians())
                    * Mat4::from_rotation_y(euler.y.to_radians())
                    * Mat4::from_rotation_x(euler.x.to_radians())
            }
            XformOp::Scale(s) => Mat4::from_scale(*s),
            XformOp::Transform(m) => *m,
        }
    }
}

/// Combine an ordered op list into a single local matrix.
///
/// Ops are listed outermost first, so the last op touches points first.
pub fn compose_xform_ops(ops: &[XformOp]) -> Mat4 {
    ops.iter()
        .fold(Mat4::IDENTITY, |result, op| result * op.to_matrix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_op() {
        let matrix = XformOp::Translate(Vec3::new(1.0, 2.0, 3.0)).to_matrix();

        let origin = matrix.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 2.0, 3.0)).length() < 0.001);
    }

    #[test]
    fn test_compose_translate_scale() {
        let ops = [
            XformOp::Translate(Vec3::new(10.0, 0.0, 0.0)),
            XformOp::Scale(Vec3::splat(2.0)),
        ];
        let matrix = compose_xform_ops(&ops);

        // Scale first, then translate
        let p = matrix.transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(12.0, 0.0, 0.0)).length() < 0.001);
    }

    #[test]
    fn test_rotate_xyz_applies_x_first() {
        let matrix = XformOp::RotateXYZ(Vec3::new(90.0, 0.0, 90.0)).to_matrix();

        // +Y rotated about X goes to +Z, which Z-rotation leaves alone
        let p = matrix.transform_point3(Vec3::Y);
        assert!((p - Vec3::Z).length() < 0.001);
    }

    #[test]
    fn test_compose_empty_is_identity() {
        assert_eq!(compose_xform_ops(&[]), Mat4::IDENTITY);
    }
}
