//! Clipping planes
//!
//! Global planes belong to the renderer and clip everything; local planes
//! belong to a material. Both are uploaded in view space as one array:
//! global planes first, then the material's. Plane counts are part of the
//! program key.

use crate::foundation::bounds::Plane;
use crate::foundation::math::{Mat4, Vec4};
use crate::render::resources::materials::Material;

/// Plane counts a program is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClippingCounts {
    /// Total planes uploaded
    pub planes: usize,
    /// Trailing planes combined by intersection instead of union
    pub intersection: usize,
}

/// Renderer-wide clipping configuration
#[derive(Debug, Clone, Default)]
pub struct ClippingState {
    global_planes: Vec<Plane>,
    /// Honor per-material planes
    pub local_enabled: bool,
}

impl ClippingState {
    /// No global planes
    pub const fn new(local_enabled: bool) -> Self {
        Self { global_planes: Vec::new(), local_enabled }
    }

    /// Replace the global planes (world space)
    pub fn set_global_planes(&mut self, planes: Vec<Plane>) {
        self.global_planes = planes;
    }

    /// Global planes (world space)
    pub fn global_planes(&self) -> &[Plane] {
        &self.global_planes
    }

    fn local_planes<'a>(&self, material: &'a Material) -> &'a [Plane] {
        if self.local_enabled {
            &material.clipping_planes
        } else {
            &[]
        }
    }

    /// Plane counts for a material
    pub fn counts(&self, material: &Material) -> ClippingCounts {
        let local = self.local_planes(material).len();
        ClippingCounts {
            planes: self.global_planes.len() + local,
            intersection: if material.clip_intersection { local } else { 0 },
        }
    }

    /// View-space planes packed as `(nx, ny, nz, d)`
    pub fn uniform_planes(&self, material: &Material, view: &Mat4) -> Vec<Vec4> {
        self.global_planes
            .iter()
            .chain(self.local_planes(material))
            .map(|plane| plane.transformed(view).to_vec4())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;
    use nalgebra::Translation3;

    fn clipped_material(intersection: bool) -> Material {
        let mut material = Material::default();
        material.clipping_planes = vec![
            Plane::new(Vec3::new(1.0, 0.0, 0.0), 0.0),
            Plane::new(Vec3::new(0.0, 1.0, 0.0), 0.0),
        ];
        material.clip_intersection = intersection;
        material
    }

    #[test]
    fn test_counts_respect_local_toggle() {
        let mut state = ClippingState::new(false);
        state.set_global_planes(vec![Plane::new(Vec3::new(0.0, 0.0, 1.0), 1.0)]);
        let material = clipped_material(true);

        assert_eq!(state.counts(&material), ClippingCounts { planes: 1, intersection: 0 });

        state.local_enabled = true;
        assert_eq!(state.counts(&material), ClippingCounts { planes: 3, intersection: 2 });
        assert_eq!(state.counts(&clipped_material(false)).intersection, 0);
    }

    #[test]
    fn test_planes_move_into_view_space() {
        let mut state = ClippingState::new(true);
        state.set_global_planes(vec![Plane::new(Vec3::new(1.0, 0.0, 0.0), 0.0)]);
        let view = Translation3::new(-2.0, 0.0, 0.0).to_homogeneous();

        let planes = state.uniform_planes(&Material::default(), &view);

        assert_eq!(planes.len(), 1);
        assert_relative_eq!(planes[0], Vec4::new(1.0, 0.0, 0.0, 2.0), epsilon = 1e-6);
    }
}
