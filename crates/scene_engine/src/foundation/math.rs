//! Math utilities and types
//!
//! Provides fundamental math types for the scene graph and renderer.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

use serde::{Deserialize, Serialize};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = nalgebra::UnitQuaternion<f32>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix (T * R * S)
    pub fn to_matrix(&self) -> Mat4 {
        compose(&self.position, &self.rotation, &self.scale)
    }

    /// Create a transform from a transformation matrix
    ///
    /// A negative determinant is folded into the X scale so the rotation
    /// part stays a proper rotation.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let mut scale_x = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
        let scale_y = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
        let scale_z = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();

        if matrix.fixed_view::<3, 3>(0, 0).into_owned().determinant() < 0.0 {
            scale_x = -scale_x;
        }

        let position = Vec3::new(matrix.m14, matrix.m24, matrix.m34);

        let inv_x = if scale_x == 0.0 { 0.0 } else { 1.0 / scale_x };
        let inv_y = if scale_y == 0.0 { 0.0 } else { 1.0 / scale_y };
        let inv_z = if scale_z == 0.0 { 0.0 } else { 1.0 / scale_z };

        let rotation_matrix = Matrix3::new(
            matrix.m11 * inv_x, matrix.m12 * inv_y, matrix.m13 * inv_z,
            matrix.m21 * inv_x, matrix.m22 * inv_y, matrix.m23 * inv_z,
            matrix.m31 * inv_x, matrix.m32 * inv_y, matrix.m33 * inv_z,
        );
        let rotation = rotation_from_matrix3(&rotation_matrix);

        Self {
            position,
            rotation,
            scale: Vec3::new(scale_x, scale_y, scale_z),
        }
    }
}

/// Compose a TRS matrix from its parts
pub fn compose(position: &Vec3, rotation: &Quat, scale: &Vec3) -> Mat4 {
    Mat4::new_translation(position)
        * rotation.to_homogeneous()
        * Mat4::new_nonuniform_scaling(scale)
}

/// Build a unit quaternion from a (possibly slightly skewed) rotation matrix
pub fn rotation_from_matrix3(m: &Mat3) -> Quat {
    Quat::from_rotation_matrix(&nalgebra::Rotation3::from_matrix_unchecked(*m))
}

/// Largest axis scale stored in the upper 3x3 block of a matrix
pub fn max_scale_on_axis(m: &Mat4) -> f32 {
    let sx = Vec3::new(m.m11, m.m21, m.m31).magnitude_squared();
    let sy = Vec3::new(m.m12, m.m22, m.m32).magnitude_squared();
    let sz = Vec3::new(m.m13, m.m23, m.m33).magnitude_squared();
    sx.max(sy).max(sz).sqrt()
}

/// Normal matrix (inverse transpose of the upper 3x3 block)
pub fn normal_matrix(m: &Mat4) -> Mat3 {
    let upper: Mat3 = m.fixed_view::<3, 3>(0, 0).into_owned();
    upper
        .try_inverse()
        .map_or_else(Mat3::identity, |inv| inv.transpose())
}

/// Translation column of an affine matrix
pub fn translation_of(m: &Mat4) -> Vec3 {
    Vec3::new(m.m14, m.m24, m.m34)
}

/// Inverse of an affine matrix, falling back to identity when singular
pub fn inverse_or_identity(m: &Mat4) -> Mat4 {
    m.try_inverse().unwrap_or_else(Mat4::identity)
}

/// Rotation that orients +Z from `target` towards `eye`
///
/// Mirrors the conventional look-at basis: `z = eye - target`,
/// `x = up × z`, `y = z × x`. Degenerate inputs are nudged so the result
/// is always a valid rotation.
pub fn look_at_rotation(eye: &Vec3, target: &Vec3, up: &Vec3) -> Quat {
    let mut z = eye - target;
    if z.magnitude_squared() == 0.0 {
        z.z = 1.0;
    }
    z.normalize_mut();

    let mut x = up.cross(&z);
    if x.magnitude_squared() == 0.0 {
        if up.z.abs() == 1.0 {
            z.x += 0.0001;
        } else {
            z.z += 0.0001;
        }
        z.normalize_mut();
        x = up.cross(&z);
    }
    x.normalize_mut();
    let y = z.cross(&x);

    let basis = Mat3::from_columns(&[x, y, z]);
    rotation_from_matrix3(&basis)
}

/// Axis order used when composing Euler angles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EulerOrder {
    /// Rotate about X, then Y, then Z (matrix = Rx * Ry * Rz)
    #[default]
    XYZ,
    /// Y, X, Z
    YXZ,
    /// Z, X, Y
    ZXY,
    /// Z, Y, X
    ZYX,
    /// Y, Z, X
    YZX,
    /// X, Z, Y
    XZY,
}

/// Euler angle rotation in radians
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Euler {
    /// Rotation about the X axis
    pub x: f32,
    /// Rotation about the Y axis
    pub y: f32,
    /// Rotation about the Z axis
    pub z: f32,
    /// Composition order
    pub order: EulerOrder,
}

impl Euler {
    /// Create Euler angles with an explicit order
    pub const fn new(x: f32, y: f32, z: f32, order: EulerOrder) -> Self {
        Self { x, y, z, order }
    }

    /// Convert to a unit quaternion
    pub fn to_quaternion(&self) -> Quat {
        let qx = Quat::from_axis_angle(&Vec3::x_axis(), self.x);
        let qy = Quat::from_axis_angle(&Vec3::y_axis(), self.y);
        let qz = Quat::from_axis_angle(&Vec3::z_axis(), self.z);
        match self.order {
            EulerOrder::XYZ => qx * qy * qz,
            EulerOrder::YXZ => qy * qx * qz,
            EulerOrder::ZXY => qz * qx * qy,
            EulerOrder::ZYX => qz * qy * qx,
            EulerOrder::YZX => qy * qz * qx,
            EulerOrder::XZY => qx * qz * qy,
        }
    }

    /// Extract Euler angles in the given order from a quaternion
    pub fn from_quaternion(q: &Quat, order: EulerOrder) -> Self {
        let m = q.to_rotation_matrix().into_inner();
        Self::from_rotation_matrix(&m, order)
    }

    /// Extract Euler angles in the given order from a pure rotation matrix
    pub fn from_rotation_matrix(m: &Mat3, order: EulerOrder) -> Self {
        const GIMBAL: f32 = 0.999_999_9;
        let (m11, m12, m13) = (m.m11, m.m12, m.m13);
        let (m21, m22, m23) = (m.m21, m.m22, m.m23);
        let (m31, m32, m33) = (m.m31, m.m32, m.m33);
        let clamp = |v: f32| v.clamp(-1.0, 1.0);

        let (x, y, z) = match order {
            EulerOrder::XYZ => {
                let y = clamp(m13).asin();
                if m13.abs() < GIMBAL {
                    ((-m23).atan2(m33), y, (-m12).atan2(m11))
                } else {
                    (m32.atan2(m22), y, 0.0)
                }
            }
            EulerOrder::YXZ => {
                let x = (-clamp(m23)).asin();
                if m23.abs() < GIMBAL {
                    (x, m13.atan2(m33), m21.atan2(m22))
                } else {
                    (x, (-m31).atan2(m11), 0.0)
                }
            }
            EulerOrder::ZXY => {
                let x = clamp(m32).asin();
                if m32.abs() < GIMBAL {
                    (x, (-m31).atan2(m33), (-m12).atan2(m22))
                } else {
                    (x, 0.0, m21.atan2(m11))
                }
            }
            EulerOrder::ZYX => {
                let y = (-clamp(m31)).asin();
                if m31.abs() < GIMBAL {
                    (m32.atan2(m33), y, m21.atan2(m11))
                } else {
                    (0.0, y, (-m12).atan2(m22))
                }
            }
            EulerOrder::YZX => {
                let z = clamp(m21).asin();
                if m21.abs() < GIMBAL {
                    ((-m23).atan2(m22), (-m31).atan2(m11), z)
                } else {
                    (0.0, m13.atan2(m33), z)
                }
            }
            EulerOrder::XZY => {
                let z = (-clamp(m12)).asin();
                if m12.abs() < GIMBAL {
                    (m32.atan2(m22), m13.atan2(m11), z)
                } else {
                    ((-m23).atan2(m33), 0.0, z)
                }
            }
        };

        Self { x, y, z, order }
    }
}

/// Math utility functions
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians.to_degrees()
    }

    /// Linear interpolation
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn test_transform_matrix_round_trip() {
        let original = Transform {
            position: Vec3::new(1.0, -2.0, 3.5),
            rotation: Quat::from_euler_angles(0.3, -0.7, 1.1),
            scale: Vec3::new(2.0, 0.5, 1.5),
        };

        let decomposed = Transform::from_matrix(&original.to_matrix());

        assert_relative_eq!(decomposed.position, original.position, epsilon = 1e-5);
        assert_relative_eq!(decomposed.scale, original.scale, epsilon = 1e-5);
        assert_relative_eq!(
            decomposed.rotation.to_homogeneous(),
            original.rotation.to_homogeneous(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_negative_scale_decomposes_into_x() {
        let m = compose(&Vec3::zeros(), &Quat::identity(), &Vec3::new(-1.0, 1.0, 1.0));
        let decomposed = Transform::from_matrix(&m);

        assert_relative_eq!(decomposed.scale, Vec3::new(-1.0, 1.0, 1.0), epsilon = 1e-6);
        assert_relative_eq!(decomposed.to_matrix(), m, epsilon = 1e-6);
    }

    #[test]
    fn test_euler_orders_recover_rotation() {
        let orders = [
            EulerOrder::XYZ,
            EulerOrder::YXZ,
            EulerOrder::ZXY,
            EulerOrder::ZYX,
            EulerOrder::YZX,
            EulerOrder::XZY,
        ];
        for order in orders {
            let euler = Euler::new(0.4, -0.3, 0.9, order);
            let recovered = Euler::from_quaternion(&euler.to_quaternion(), order);
            assert_relative_eq!(recovered.x, euler.x, epsilon = 1e-5);
            assert_relative_eq!(recovered.y, euler.y, epsilon = 1e-5);
            assert_relative_eq!(recovered.z, euler.z, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_look_at_rotation_points_z_at_eye() {
        let eye = Vec3::new(0.0, 0.0, 5.0);
        let rotation = look_at_rotation(&eye, &Vec3::zeros(), &Vec3::y());
        let z_axis = rotation * Vec3::z();

        assert_relative_eq!(z_axis, Vec3::z(), epsilon = 1e-6);

        let eye = Vec3::new(5.0, 0.0, 0.0);
        let rotation = look_at_rotation(&eye, &Vec3::zeros(), &Vec3::y());
        assert_relative_eq!(rotation * Vec3::z(), Vec3::x(), epsilon = 1e-6);
    }

    #[test]
    fn test_max_scale_on_axis() {
        let m = compose(
            &Vec3::new(4.0, 0.0, 0.0),
            &Quat::from_axis_angle(&Vec3::y_axis(), FRAC_PI_4),
            &Vec3::new(1.0, 3.0, 2.0),
        );
        assert_relative_eq!(max_scale_on_axis(&m), 3.0, epsilon = 1e-5);
    }
}
