//! Camera node payload
//!
//! Projection parameters plus the cached projection and view matrices. The
//! view matrix (world inverse) is refreshed by the scene graph whenever the
//! camera's world matrix is recomputed.

use crate::foundation::bounds::Frustum;
use crate::foundation::math::{inverse_or_identity, Mat4, Vec3};

/// Projection model
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Pinhole perspective
    Perspective {
        /// Vertical field of view in degrees
        fov: f32,
        /// Width / height
        aspect: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
    /// Parallel projection
    Orthographic {
        /// Left plane
        left: f32,
        /// Right plane
        right: f32,
        /// Top plane
        top: f32,
        /// Bottom plane
        bottom: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
}

/// Camera payload of a node
#[derive(Debug, Clone)]
pub struct Camera {
    projection: Projection,
    zoom: f32,
    projection_matrix: Mat4,
    projection_matrix_inverse: Mat4,
    matrix_world_inverse: Mat4,
    world_position: Vec3,
}

impl Camera {
    /// Perspective camera; `fov` is the vertical field of view in degrees
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::with_projection(Projection::Perspective { fov, aspect, near, far })
    }

    /// Orthographic camera
    pub fn orthographic(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Self {
        Self::with_projection(Projection::Orthographic { left, right, top, bottom, near, far })
    }

    fn with_projection(projection: Projection) -> Self {
        let mut camera = Self {
            projection,
            zoom: 1.0,
            projection_matrix: Mat4::identity(),
            projection_matrix_inverse: Mat4::identity(),
            matrix_world_inverse: Mat4::identity(),
            world_position: Vec3::zeros(),
        };
        camera.update_projection_matrix();
        camera
    }

    /// Projection parameters
    pub const fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Replace the projection parameters and rebuild the matrix
    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.update_projection_matrix();
    }

    /// Zoom factor
    pub const fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Set the zoom factor and rebuild the matrix
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom;
        self.update_projection_matrix();
    }

    /// Whether this is a perspective camera
    pub const fn is_perspective(&self) -> bool {
        matches!(self.projection, Projection::Perspective { .. })
    }

    /// Near clip distance
    pub const fn near(&self) -> f32 {
        match self.projection {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    /// Far clip distance
    pub const fn far(&self) -> f32 {
        match self.projection {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }

    /// Rebuild the projection matrix from the current parameters
    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = match self.projection {
            Projection::Perspective { fov, aspect, near, far } => {
                let top = near * (fov.to_radians() * 0.5).tan() / self.zoom;
                let height = 2.0 * top;
                let width = aspect * height;
                let left = -0.5 * width;
                frustum_matrix(left, left + width, top, top - height, near, far)
            }
            Projection::Orthographic { left, right, top, bottom, near, far } => {
                let dx = (right - left) / (2.0 * self.zoom);
                let dy = (top - bottom) / (2.0 * self.zoom);
                let cx = (right + left) * 0.5;
                let cy = (top + bottom) * 0.5;
                nalgebra::Orthographic3::new(cx - dx, cx + dx, cy - dy, cy + dy, near, far).to_homogeneous()
            }
        };
        self.projection_matrix_inverse = inverse_or_identity(&self.projection_matrix);
    }

    /// Update the aspect ratio (perspective) or horizontal extent (orthographic)
    pub fn set_aspect(&mut self, new_aspect: f32) {
        match &mut self.projection {
            Projection::Perspective { aspect, .. } => *aspect = new_aspect,
            Projection::Orthographic { left, right, top, bottom, .. } => {
                let half_width = (*top - *bottom) * 0.5 * new_aspect;
                let cx = (*left + *right) * 0.5;
                *left = cx - half_width;
                *right = cx + half_width;
            }
        }
        self.update_projection_matrix();
    }

    /// Adapt to a viewport size in pixels
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.set_aspect(width as f32 / height as f32);
        }
    }

    /// Projection matrix
    pub const fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    /// Inverse projection matrix
    pub const fn projection_matrix_inverse(&self) -> &Mat4 {
        &self.projection_matrix_inverse
    }

    /// View matrix (inverse of the camera's world matrix)
    pub const fn matrix_world_inverse(&self) -> &Mat4 {
        &self.matrix_world_inverse
    }

    /// Camera position in world space as of the last world update
    pub const fn world_position(&self) -> &Vec3 {
        &self.world_position
    }

    /// Projection times view
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix * self.matrix_world_inverse
    }

    /// World-space view frustum
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(&self.view_projection())
    }

    pub(crate) fn update_view(&mut self, world: &Mat4) {
        self.matrix_world_inverse = inverse_or_identity(world);
        self.world_position = Vec3::new(world.m14, world.m24, world.m34);
    }
}

/// Off-center perspective matrix with clip depth in `[-1, 1]`
fn frustum_matrix(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Mat4 {
    let x = 2.0 * near / (right - left);
    let y = 2.0 * near / (top - bottom);
    let a = (right + left) / (right - left);
    let b = (top + bottom) / (top - bottom);
    let c = -(far + near) / (far - near);
    let d = -2.0 * far * near / (far - near);

    Mat4::new(
        x, 0.0, a, 0.0,
        0.0, y, b, 0.0,
        0.0, 0.0, c, d,
        0.0, 0.0, -1.0, 0.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perspective_matches_reference() {
        let camera = Camera::perspective(60.0, 1.5, 0.1, 100.0);
        let reference = nalgebra::Perspective3::new(1.5, 60f32.to_radians(), 0.1, 100.0).to_homogeneous();

        assert_relative_eq!(*camera.projection_matrix(), reference, epsilon = 1e-5);
    }

    #[test]
    fn test_zoom_narrows_view() {
        let mut camera = Camera::perspective(60.0, 1.0, 0.1, 100.0);
        let before = camera.projection_matrix().m11;
        camera.set_zoom(2.0);

        assert_relative_eq!(camera.projection_matrix().m11, before * 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_viewport_updates_aspect() {
        let mut camera = Camera::perspective(45.0, 1.0, 0.1, 10.0);
        camera.set_viewport(1920, 1080);

        match camera.projection() {
            Projection::Perspective { aspect, .. } => assert_relative_eq!(*aspect, 1920.0 / 1080.0),
            Projection::Orthographic { .. } => panic!("projection kind changed"),
        }
    }

    #[test]
    fn test_orthographic_aspect_keeps_height() {
        let mut camera = Camera::orthographic(-1.0, 1.0, 1.0, -1.0, 0.1, 10.0);
        camera.set_aspect(2.0);

        match camera.projection() {
            Projection::Orthographic { left, right, top, bottom, .. } => {
                assert_relative_eq!(*left, -2.0);
                assert_relative_eq!(*right, 2.0);
                assert_relative_eq!(*top - *bottom, 2.0);
            }
            Projection::Perspective { .. } => panic!("projection kind changed"),
        }
    }
}
