//! Object-to-world placement carried by scene objects and baked on join

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Object-to-world matrix; written to the glTF node when not identity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub matrix: Matrix4<f32>,
}

impl Transform3D {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    pub fn translation(offset: Vector3<f32>) -> Self {
        Self {
            matrix: Matrix4::new_translation(&offset),
        }
    }

    pub fn is_identity(&self, epsilon: f32) -> bool {
        (self.matrix - Matrix4::identity()).norm() < epsilon
    }

    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        self.matrix.transform_point(point)
    }

    /// Inverse transpose of the linear part, so baked normals stay
    /// perpendicular under non-uniform scale
    pub fn normal_matrix(&self) -> Matrix3<f32> {
        let linear: Matrix3<f32> = self.matrix.fixed_view::<3, 3>(0, 0).into_owned();
        linear.try_inverse().map_or(linear, |inv| inv.transpose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normals_under_stretch() {
        let stretched = Transform3D {
            matrix: Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 1.0, 1.0)),
        };
        let n = stretched.normal_matrix() * Vector3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(n.x, 0.5, epsilon = 1e-6);
        assert!(!stretched.is_identity(1e-6));
    }

    #[test]
    fn test_translation_moves_points() {
        let t = Transform3D::translation(Vector3::new(0.0, 0.0, 3.0));
        let p = t.transform_point(&Point3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(p.z, 4.0);
        assert!(Transform3D::identity().is_identity(1e-6));
    }
}
