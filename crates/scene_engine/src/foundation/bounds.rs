//! Bounding volumes and culling primitives
//!
//! Axis-aligned boxes, spheres, planes and the six-plane view frustum used
//! for culling and raycast rejection.

use super::math::{max_scale_on_axis, normal_matrix, Mat4, Vec3, Vec4};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Default for AABB {
    fn default() -> Self {
        Self::empty()
    }
}

impl AABB {
    /// Create a new AABB from min and max points
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An inverted box that any expansion will replace
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// True when no point has been added yet
    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    /// Grow the box to include a point
    pub fn expand_by_point(&mut self, point: &Vec3) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Grow the box to include another box
    pub fn union(&mut self, other: &Self) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::zeros()
        } else {
            (self.min + self.max) * 0.5
        }
    }

    /// Full size along each axis
    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::zeros()
        } else {
            self.max - self.min
        }
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: &Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Transform all eight corners and re-fit an axis-aligned box around them
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::empty();
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand_by_point(&matrix.transform_point(&corner.into()).coords);
        }
        out
    }
}

/// Bounding sphere; a negative radius marks an empty sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Sphere center
    pub center: Vec3,
    /// Sphere radius
    pub radius: f32,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingSphere {
    /// Create a sphere from center and radius
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// An empty sphere that contains nothing
    pub fn empty() -> Self {
        Self { center: Vec3::zeros(), radius: -1.0 }
    }

    /// True for the empty sphere
    pub fn is_empty(&self) -> bool {
        self.radius < 0.0
    }

    /// Check if the sphere contains a point
    pub fn contains_point(&self, point: &Vec3) -> bool {
        (point - self.center).magnitude_squared() <= self.radius * self.radius
    }

    /// Check overlap with another sphere
    pub fn intersects_sphere(&self, other: &Self) -> bool {
        let radius_sum = self.radius + other.radius;
        (other.center - self.center).magnitude_squared() <= radius_sum * radius_sum
    }

    /// Grow the sphere so it also encloses `other`
    pub fn union(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        let offset = other.center - self.center;
        let distance = offset.magnitude();
        if distance + other.radius <= self.radius {
            return;
        }
        if distance + self.radius <= other.radius {
            *self = *other;
            return;
        }
        let radius = (distance + self.radius + other.radius) * 0.5;
        self.center += offset * ((radius - self.radius) / distance);
        self.radius = radius;
    }

    /// Apply an affine transform; the radius scales by the largest axis scale
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            center: matrix.transform_point(&self.center.into()).coords,
            radius: self.radius * max_scale_on_axis(matrix),
        }
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (should be normalized)
    pub normal: Vec3,
    /// Signed distance term: `normal · p + distance = 0` on the plane
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let length = normal.magnitude();
        if length == 0.0 {
            return Self { normal, distance };
        }
        Self { normal: normal / length, distance: distance / length }
    }

    /// Plane through `point` facing `normal`
    pub fn from_point_normal(point: &Vec3, normal: &Vec3) -> Self {
        let normal = normal.normalize();
        Self { distance: -normal.dot(point), normal }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Transform the plane by an affine matrix
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let coplanar = self.normal * -self.distance;
        let point = matrix.transform_point(&coplanar.into()).coords;
        let normal = (normal_matrix(matrix) * self.normal).normalize();
        Self { distance: -point.dot(&normal), normal }
    }

    /// Pack as `(nx, ny, nz, d)` for uniform upload
    pub fn to_vec4(&self) -> Vec4 {
        Vec4::new(self.normal.x, self.normal.y, self.normal.z, self.distance)
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Six planes defining the frustum (right, left, bottom, top, far, near)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub const fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction for clip space with depth in `[-1, 1]`.
    /// Every plane normal points into the frustum.
    pub fn from_matrix(vp_matrix: &Mat4) -> Self {
        let row = |i: usize| -> Vec4 { vp_matrix.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let plane = |v: Vec4| Plane::new(Vec3::new(v.x, v.y, v.z), v.w);

        Self {
            planes: [
                plane(r3 - r0),
                plane(r3 + r0),
                plane(r3 + r1),
                plane(r3 - r1),
                plane(r3 - r2),
                plane(r3 + r2),
            ],
        }
    }

    /// Test if a sphere intersects the frustum
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(&sphere.center) >= -sphere.radius)
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        for plane in &self.planes {
            // Corner furthest along the plane normal
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 { p.x = aabb.max.x; }
            if plane.normal.y >= 0.0 { p.y = aabb.max.y; }
            if plane.normal.z >= 0.0 { p.z = aabb.max.z; }

            if plane.distance_to_point(&p) < 0.0 {
                return false;
            }
        }
        true
    }

    /// Test if a point is inside the frustum
    pub fn contains_point(&self, point: &Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }
}
