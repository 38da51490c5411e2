// Transform composition for scene descriptions
//
// A `<transform>` block is an ordered list of elementary operations. The
// first listed operation is applied first to a local point, so the composed
// matrix is M = M_n * ... * M_1 (column vectors).

use glam::{Mat3, Mat4, Vec3, Vec4};

/// One atomic affine operation inside a transform block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ElementaryOp {
    /// Rotation about an arbitrary axis, angle in degrees
    Rotate { axis: Vec3, angle: f32 },

    /// Translation by a vector
    Translate(Vec3),

    /// Per-axis scale (a uniform scale is a splatted vector)
    Scale(Vec3),

    /// Full 4x4 matrix, already column-major
    Matrix(Mat4),

    /// Camera-style frame looking from `origin` towards `target`
    LookAt { origin: Vec3, target: Vec3, up: Vec3 },
}

impl ElementaryOp {
    /// Check that the operation describes a usable affine transform.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            ElementaryOp::Rotate { axis, angle } => {
                if axis.length_squared() == 0.0 {
                    return Err("rotation axis must be non-zero");
                }
                if !angle.is_finite() {
                    return Err("rotation angle must be finite");
                }
                Ok(())
            }
            ElementaryOp::Translate(_) | ElementaryOp::Scale(_) | ElementaryOp::Matrix(_) => Ok(()),
            ElementaryOp::LookAt { origin, target, up } => {
                let dir = *target - *origin;
                if dir.length_squared() == 0.0 {
                    return Err("look-at origin and target coincide");
                }
                if up.cross(dir).length_squared() == 0.0 {
                    return Err("look-at up vector is parallel to the view direction");
                }
                Ok(())
            }
        }
    }

    /// Convert this operation to its canonical 4x4 matrix.
    pub fn to_matrix(&self) -> Mat4 {
        match *self {
            ElementaryOp::Rotate { axis, angle } => {
                Mat4::from_axis_angle(axis.normalize(), angle.to_radians())
            }
            ElementaryOp::Translate(t) => Mat4::from_translation(t),
            ElementaryOp::Scale(s) => Mat4::from_scale(s),
            ElementaryOp::Matrix(m) => m,
            ElementaryOp::LookAt { origin, target, up } => {
                let dir = (target - origin).normalize();
                let left = up.cross(dir).normalize();
                let new_up = dir.cross(left);
                Mat4::from_cols(
                    left.extend(0.0),
                    new_up.extend(0.0),
                    dir.extend(0.0),
                    origin.extend(1.0),
                )
            }
        }
    }

    /// Build a matrix op from row-major values (16 for 4x4, 9 for 3x3).
    pub fn from_row_major(values: &[f32]) -> Option<Self> {
        match values.len() {
            16 => {
                let mut cols = [0.0f32; 16];
                cols.copy_from_slice(values);
                Some(ElementaryOp::Matrix(Mat4::from_cols_array(&cols).transpose()))
            }
            9 => {
                let mut cols = [0.0f32; 9];
                cols.copy_from_slice(values);
                Some(ElementaryOp::Matrix(Mat4::from_mat3(
                    Mat3::from_cols_array(&cols).transpose(),
                )))
            }
            _ => None,
        }
    }
}

/// Compose an ordered list of operations into one matrix.
///
/// Ordering is purely positional: `ops[0]` is applied first.
pub fn compose(ops: &[ElementaryOp]) -> Mat4 {
    ops.iter()
        .fold(Mat4::IDENTITY, |acc, op| op.to_matrix() * acc)
}

/// Extension trait for reading poses back out of a composed matrix
pub trait Mat4Ext {
    /// World-space position of the local origin.
    fn origin(&self) -> Vec3;

    /// World-space direction of the local +Z axis (the sensor view direction).
    fn forward(&self) -> Vec3;

    /// True when the bottom row is (0, 0, 0, 1).
    fn is_affine(&self) -> bool;
}

impl Mat4Ext for Mat4 {
    fn origin(&self) -> Vec3 {
        self.w_axis.truncate()
    }

    fn forward(&self) -> Vec3 {
        self.transform_vector3(Vec3::Z).normalize_or_zero()
    }

    fn is_affine(&self) -> bool {
        self.row(3) == Vec4::new(0.0, 0.0, 0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    fn rotate_z(angle: f32) -> ElementaryOp {
        ElementaryOp::Rotate { axis: Vec3::Z, angle }
    }

    #[test]
    fn test_compose_empty_is_identity() {
        assert_eq!(compose(&[]), Mat4::IDENTITY);
    }

    #[test]
    fn test_first_op_applied_first() {
        let m = compose(&[rotate_z(90.0), ElementaryOp::Translate(Vec3::X)]);
        // rotate (1,0,0) -> (0,1,0), then translate -> (1,1,0)
        assert!(approx(m.transform_point3(Vec3::X), Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn test_order_sensitivity() {
        let a = compose(&[rotate_z(90.0), ElementaryOp::Translate(Vec3::X)]);
        let b = compose(&[ElementaryOp::Translate(Vec3::X), rotate_z(90.0)]);

        let pa = a.transform_point3(Vec3::X);
        let pb = b.transform_point3(Vec3::X);
        assert!(approx(pb, Vec3::new(0.0, 2.0, 0.0)));
        assert!(!approx(pa, pb));
    }

    #[test]
    fn test_same_kind_ops_are_not_grouped() {
        let m = compose(&[
            ElementaryOp::Translate(Vec3::X),
            ElementaryOp::Scale(Vec3::splat(2.0)),
            ElementaryOp::Translate(Vec3::X),
        ]);
        // ((0 + 1) * 2) + 1
        assert!(approx(m.transform_point3(Vec3::ZERO), Vec3::new(3.0, 0.0, 0.0)));
    }

    #[test]
    fn test_rotate_normalizes_axis() {
        let op = ElementaryOp::Rotate { axis: Vec3::new(0.0, 0.0, 5.0), angle: 90.0 };
        assert!(approx(op.to_matrix().transform_point3(Vec3::X), Vec3::Y));
    }

    #[test]
    fn test_zero_axis_is_invalid() {
        let op = ElementaryOp::Rotate { axis: Vec3::ZERO, angle: 10.0 };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_row_major_matrix() {
        let op = ElementaryOp::from_row_major(&[
            1.0, 0.0, 0.0, 5.0, //
            0.0, 1.0, 0.0, 6.0, //
            0.0, 0.0, 1.0, 7.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
        .unwrap();
        assert!(approx(op.to_matrix().transform_point3(Vec3::ZERO), Vec3::new(5.0, 6.0, 7.0)));
        assert!(ElementaryOp::from_row_major(&[1.0; 4]).is_none());
    }

    #[test]
    fn test_row_major_3x3() {
        // 90 degrees about z, row-major
        let op = ElementaryOp::from_row_major(&[0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0])
            .unwrap();
        assert!(approx(op.to_matrix().transform_point3(Vec3::X), Vec3::Y));
    }

    #[test]
    fn test_look_at_frame() {
        let op = ElementaryOp::LookAt {
            origin: Vec3::new(0.0, 0.0, -5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
        };
        assert!(op.validate().is_ok());
        let m = op.to_matrix();
        assert!(approx(m.origin(), Vec3::new(0.0, 0.0, -5.0)));
        assert!(approx(m.forward(), Vec3::Z));
        assert!(m.is_affine());
    }

    #[test]
    fn test_degenerate_look_at() {
        let op = ElementaryOp::LookAt { origin: Vec3::ZERO, target: Vec3::Y, up: Vec3::Y };
        assert!(op.validate().is_err());
    }
}
