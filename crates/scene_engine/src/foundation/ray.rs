//! Ray primitive and its intersection routines

use super::bounds::{BoundingSphere, AABB};
use super::math::{Mat4, Vec3};

/// Half-line with an origin and a unit direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Normalized direction
    pub direction: Vec3,
}

impl Default for Ray {
    fn default() -> Self {
        Self { origin: Vec3::zeros(), direction: -Vec3::z() }
    }
}

/// Closest approach between a ray and a segment
#[derive(Debug, Clone, Copy)]
pub struct SegmentApproach {
    /// Squared distance between the two closest points
    pub distance_sq: f32,
    /// Closest point on the ray
    pub point_on_ray: Vec3,
    /// Closest point on the segment
    pub point_on_segment: Vec3,
}

impl Ray {
    /// Create a ray; the direction is normalized
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction: direction.normalize() }
    }

    /// Point at parameter `t` along the ray
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Transform the ray; the direction is re-normalized
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let origin = matrix.transform_point(&self.origin.into()).coords;
        let direction = matrix.transform_vector(&self.direction);
        let length = direction.magnitude();
        Self {
            origin,
            direction: if length > 0.0 { direction / length } else { direction },
        }
    }

    /// Parameter of the point on the ray closest to `point`, clamped at the origin
    pub fn closest_parameter_to_point(&self, point: &Vec3) -> f32 {
        (point - self.origin).dot(&self.direction).max(0.0)
    }

    /// Point on the ray closest to `point`
    pub fn closest_point_to_point(&self, point: &Vec3) -> Vec3 {
        self.at(self.closest_parameter_to_point(point))
    }

    /// Squared distance from `point` to the ray
    pub fn distance_sq_to_point(&self, point: &Vec3) -> f32 {
        (self.closest_point_to_point(point) - point).magnitude_squared()
    }

    /// True when the ray passes through the sphere
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        !sphere.is_empty() && self.distance_sq_to_point(&sphere.center) <= sphere.radius * sphere.radius
    }

    /// First point where the ray enters the sphere, or the exit point when the
    /// origin is inside
    pub fn intersect_sphere(&self, sphere: &BoundingSphere) -> Option<Vec3> {
        let to_center = sphere.center - self.origin;
        let tca = to_center.dot(&self.direction);
        let d2 = to_center.dot(&to_center) - tca * tca;
        let radius2 = sphere.radius * sphere.radius;
        if d2 > radius2 {
            return None;
        }
        let thc = (radius2 - d2).sqrt();
        let t0 = tca - thc;
        let t1 = tca + thc;
        if t1 < 0.0 {
            return None;
        }
        Some(self.at(if t0 < 0.0 { t1 } else { t0 }))
    }

    /// Slab test against a box, returning the entry point
    pub fn intersect_box(&self, aabb: &AABB) -> Option<Vec3> {
        if aabb.is_empty() {
            return None;
        }
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let origin = self.origin[axis];
            let direction = self.direction[axis];
            let (lo, hi) = (aabb.min[axis], aabb.max[axis]);

            if direction.abs() < f32::EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / direction;
            let mut t1 = (lo - origin) * inv;
            let mut t2 = (hi - origin) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        if t_max < 0.0 {
            return None;
        }
        Some(self.at(if t_min >= 0.0 { t_min } else { t_max }))
    }

    /// True when the ray hits the box
    pub fn intersects_box(&self, aabb: &AABB) -> bool {
        self.intersect_box(aabb).is_some()
    }

    /// Ray/triangle test returning the hit point
    ///
    /// With `backface_culling` only triangles wound counter-clockwise as seen
    /// from the ray origin are hit.
    pub fn intersect_triangle(&self, a: &Vec3, b: &Vec3, c: &Vec3, backface_culling: bool) -> Option<Vec3> {
        let edge1 = b - a;
        let edge2 = c - a;
        let normal = edge1.cross(&edge2);

        // Solve Q + t*D = b1*E1 + b2*E2 with Cramer's rule
        let mut ddn = self.direction.dot(&normal);
        let sign = if ddn > 0.0 {
            if backface_culling {
                return None;
            }
            1.0
        } else if ddn < 0.0 {
            ddn = -ddn;
            -1.0
        } else {
            return None;
        };

        let diff = self.origin - a;
        let ddqxe2 = sign * self.direction.dot(&diff.cross(&edge2));
        if ddqxe2 < 0.0 {
            return None;
        }
        let dde1xq = sign * self.direction.dot(&edge1.cross(&diff));
        if dde1xq < 0.0 {
            return None;
        }
        if ddqxe2 + dde1xq > ddn {
            return None;
        }

        let qdn = -sign * diff.dot(&normal);
        if qdn < 0.0 {
            return None;
        }
        Some(self.at(qdn / ddn))
    }

    /// Closest approach between the ray and the segment `v0..v1`
    pub fn distance_sq_to_segment(&self, v0: &Vec3, v1: &Vec3) -> SegmentApproach {
        let seg_center = (v0 + v1) * 0.5;
        let seg_vector = v1 - v0;
        let seg_extent = seg_vector.magnitude() * 0.5;
        let seg_dir = if seg_extent > 0.0 { seg_vector / (seg_extent * 2.0) } else { Vec3::zeros() };
        let diff = self.origin - seg_center;

        let a01 = -self.direction.dot(&seg_dir);
        let b0 = diff.dot(&self.direction);
        let b1 = -diff.dot(&seg_dir);
        let c = diff.magnitude_squared();
        let det = (1.0 - a01 * a01).abs();

        let (s0, s1, distance_sq);

        if det > 0.0 {
            // Not parallel
            let mut t0 = a01 * b1 - b0;
            let mut t1 = a01 * b0 - b1;
            let ext_det = seg_extent * det;

            if t0 >= 0.0 {
                if t1 >= -ext_det {
                    if t1 <= ext_det {
                        // Region 0: interior of segment and ray
                        let inv_det = 1.0 / det;
                        t0 *= inv_det;
                        t1 *= inv_det;
                        s0 = t0;
                        s1 = t1;
                        distance_sq = t0 * (t0 + a01 * t1 + 2.0 * b0) + t1 * (a01 * t0 + t1 + 2.0 * b1) + c;
                    } else {
                        // Region 1
                        s1 = seg_extent;
                        s0 = (-(a01 * s1 + b0)).max(0.0);
                        distance_sq = -s0 * s0 + s1 * (s1 + 2.0 * b1) + c;
                    }
                } else {
                    // Region 5
                    s1 = -seg_extent;
                    s0 = (-(a01 * s1 + b0)).max(0.0);
                    distance_sq = -s0 * s0 + s1 * (s1 + 2.0 * b1) + c;
                }
            } else if t1 <= -ext_det {
                // Region 4
                let t = -(-a01 * seg_extent + b0);
                s0 = t.max(0.0);
                s1 = if s0 > 0.0 { -seg_extent } else { (-b1).clamp(-seg_extent, seg_extent) };
                distance_sq = -s0 * s0 + s1 * (s1 + 2.0 * b1) + c;
            } else if t1 <= ext_det {
                // Region 3
                s0 = 0.0;
                s1 = (-b1).clamp(-seg_extent, seg_extent);
                distance_sq = s1 * (s1 + 2.0 * b1) + c;
            } else {
                // Region 2
                let t = -(a01 * seg_extent + b0);
                s0 = t.max(0.0);
                s1 = if s0 > 0.0 { seg_extent } else { (-b1).clamp(-seg_extent, seg_extent) };
                distance_sq = -s0 * s0 + s1 * (s1 + 2.0 * b1) + c;
            }
        } else {
            // Parallel: pick the segment end closer along the ray
            s1 = if a01 > 0.0 { -seg_extent } else { seg_extent };
            s0 = (-(a01 * s1 + b0)).max(0.0);
            distance_sq = -s0 * s0 + s1 * (s1 + 2.0 * b1) + c;
        }

        SegmentApproach {
            distance_sq: distance_sq.max(0.0),
            point_on_ray: self.at(s0),
            point_on_segment: seg_center + seg_dir * s1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn down_z() -> Ray {
        Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0))
    }

    #[test]
    fn test_triangle_hit_at_origin() {
        let ray = down_z();
        let hit = ray.intersect_triangle(
            &Vec3::new(-1.0, -1.0, 0.0),
            &Vec3::new(1.0, -1.0, 0.0),
            &Vec3::new(0.0, 1.0, 0.0),
            false,
        );

        let point = hit.expect("ray should hit the triangle");
        assert_relative_eq!(point, Vec3::zeros(), epsilon = 1e-6);
        assert_relative_eq!((point - ray.origin).magnitude(), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_triangle_backface_culling() {
        let ray = down_z();
        // Clockwise when viewed from +Z
        let (a, b, c) = (
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
        );

        assert!(ray.intersect_triangle(&a, &b, &c, true).is_none());
        assert!(ray.intersect_triangle(&a, &b, &c, false).is_some());
    }

    #[test]
    fn test_triangle_miss_and_behind() {
        let ray = down_z();
        let miss = ray.intersect_triangle(
            &Vec3::new(2.0, 2.0, 0.0),
            &Vec3::new(3.0, 2.0, 0.0),
            &Vec3::new(2.0, 3.0, 0.0),
            false,
        );
        assert!(miss.is_none());

        let behind = ray.intersect_triangle(
            &Vec3::new(-1.0, -1.0, 10.0),
            &Vec3::new(1.0, -1.0, 10.0),
            &Vec3::new(0.0, 1.0, 10.0),
            false,
        );
        assert!(behind.is_none());
    }

    #[test]
    fn test_sphere_entry_point() {
        let ray = down_z();
        let sphere = BoundingSphere::new(Vec3::zeros(), 1.0);

        assert!(ray.intersects_sphere(&sphere));
        let hit = ray.intersect_sphere(&sphere).expect("hit");
        assert_relative_eq!(hit, Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-6);

        let offset = BoundingSphere::new(Vec3::new(3.0, 0.0, 0.0), 1.0);
        assert!(!ray.intersects_sphere(&offset));
        assert!(ray.intersect_sphere(&offset).is_none());
    }

    #[test]
    fn test_box_slab() {
        let ray = down_z();
        let aabb = AABB::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));

        let hit = ray.intersect_box(&aabb).expect("hit");
        assert_relative_eq!(hit, Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-6);

        let away = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::z());
        assert!(!away.intersects_box(&aabb));
    }

    #[test]
    fn test_segment_closest_approach() {
        let ray = down_z();
        let approach = ray.distance_sq_to_segment(&Vec3::new(-1.0, 0.5, 0.0), &Vec3::new(1.0, 0.5, 0.0));

        assert_relative_eq!(approach.distance_sq, 0.25, epsilon = 1e-5);
        assert_relative_eq!(approach.point_on_ray, Vec3::zeros(), epsilon = 1e-5);
        assert_relative_eq!(approach.point_on_segment, Vec3::new(0.0, 0.5, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_transformed_ray_stays_normalized() {
        let ray = down_z();
        let matrix = Mat4::new_scaling(3.0);
        let transformed = ray.transformed(&matrix);

        assert_relative_eq!(transformed.origin, Vec3::new(0.0, 0.0, 15.0));
        assert_relative_eq!(transformed.direction.magnitude(), 1.0, epsilon = 1e-6);
    }
}
