//! Per-frame light state
//!
//! Collects the lights found by the list builder into view-space uniform
//! data and per-type counts. The counts are part of every lit program's
//! key; [`LightState::version`] changes whenever they do, which tells the
//! renderer to re-resolve programs of lit materials.

use crate::foundation::math::{normal_matrix, translation_of, Mat4, Vec3, Vec4};
use crate::render::api::UniformValue;
use crate::scene::{Light, LightKind};

/// Active lights per type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub struct LightCounts {
    pub directional: usize,
    pub point: usize,
    pub spot: usize,
    pub hemisphere: usize,
    pub rect_area: usize,
    pub directional_shadow: usize,
    pub point_shadow: usize,
    pub spot_shadow: usize,
}

/// Light found during traversal
#[derive(Debug, Clone, Copy)]
pub struct CollectedLight {
    /// Payload
    pub light: Light,
    /// World matrix of the light node
    pub world: Mat4,
    /// Node casts shadows
    pub cast_shadow: bool,
}

/// Directional light in view space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLightData {
    /// Direction towards the light
    pub direction: Vec3,
    /// Color times intensity
    pub color: Vec3,
}

/// Point light in view space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLightData {
    /// Position
    pub position: Vec3,
    /// Color times intensity
    pub color: Vec3,
    /// Cutoff distance
    pub distance: f32,
    /// Falloff exponent
    pub decay: f32,
}

/// Spot light in view space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLightData {
    /// Position
    pub position: Vec3,
    /// Direction towards the light
    pub direction: Vec3,
    /// Color times intensity
    pub color: Vec3,
    /// Cutoff distance
    pub distance: f32,
    /// Cosine of the outer cone angle
    pub cone_cos: f32,
    /// Cosine of the inner (unattenuated) cone angle
    pub penumbra_cos: f32,
    /// Falloff exponent
    pub decay: f32,
}

/// Hemisphere light in view space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLightData {
    /// Sky direction
    pub direction: Vec3,
    /// Sky color times intensity
    pub sky_color: Vec3,
    /// Ground color times intensity
    pub ground_color: Vec3,
}

/// Rect area light in view space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectAreaLightData {
    /// Center
    pub position: Vec3,
    /// Half extent along the local X axis
    pub half_width: Vec3,
    /// Half extent along the local Y axis
    pub half_height: Vec3,
    /// Color times intensity
    pub color: Vec3,
}

/// Uniform data for every light in the frame
#[derive(Debug, Clone, Default)]
pub struct LightState {
    /// Sum of ambient lights
    pub ambient: Vec3,
    /// Directional lights, shadow casters first
    pub directional: Vec<DirectionalLightData>,
    /// Point lights, shadow casters first
    pub point: Vec<PointLightData>,
    /// Spot lights, shadow casters first
    pub spot: Vec<SpotLightData>,
    /// Hemisphere lights
    pub hemisphere: Vec<HemisphereLightData>,
    /// Rect area lights
    pub rect_area: Vec<RectAreaLightData>,
    counts: LightCounts,
    version: u64,
}

impl LightState {
    /// Empty light state
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-type counts from the last setup
    pub const fn counts(&self) -> LightCounts {
        self.counts
    }

    /// Bumped whenever the counts change
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Rebuild the uniform data from this frame's lights
    pub fn setup(&mut self, lights: &[CollectedLight], view: &Mat4, shadows_enabled: bool) {
        self.ambient = Vec3::zeros();
        self.directional.clear();
        self.point.clear();
        self.spot.clear();
        self.hemisphere.clear();
        self.rect_area.clear();

        let mut counts = LightCounts::default();
        let casts = |collected: &CollectedLight| {
            shadows_enabled && collected.cast_shadow && collected.light.supports_shadows()
        };

        let mut ordered: Vec<&CollectedLight> = lights.iter().collect();
        ordered.sort_by_key(|collected| !casts(collected));

        let view_rotation = normal_matrix(view);
        let to_view_direction = |direction: Vec3| {
            let transformed = view_rotation * direction;
            transformed.try_normalize(f32::EPSILON).unwrap_or(transformed)
        };
        let to_view_point = |point: &Vec3| (view * Vec4::new(point.x, point.y, point.z, 1.0)).xyz();

        for collected in ordered {
            let light = &collected.light;
            let color = light.color * light.intensity;
            let position = translation_of(&collected.world);
            let shadow = casts(collected);

            match light.kind {
                LightKind::Ambient => self.ambient += color,
                LightKind::Directional { target } => {
                    self.directional.push(DirectionalLightData {
                        direction: to_view_direction(position - target),
                        color,
                    });
                    counts.directional += 1;
                    counts.directional_shadow += usize::from(shadow);
                }
                LightKind::Point { distance, decay } => {
                    self.point.push(PointLightData { position: to_view_point(&position), color, distance, decay });
                    counts.point += 1;
                    counts.point_shadow += usize::from(shadow);
                }
                LightKind::Spot { target, distance, angle, penumbra, decay } => {
                    self.spot.push(SpotLightData {
                        position: to_view_point(&position),
                        direction: to_view_direction(position - target),
                        color,
                        distance,
                        cone_cos: angle.cos(),
                        penumbra_cos: (angle * (1.0 - penumbra)).cos(),
                        decay,
                    });
                    counts.spot += 1;
                    counts.spot_shadow += usize::from(shadow);
                }
                LightKind::Hemisphere { ground_color } => {
                    self.hemisphere.push(HemisphereLightData {
                        direction: to_view_direction(position),
                        sky_color: color,
                        ground_color: ground_color * light.intensity,
                    });
                    counts.hemisphere += 1;
                }
                LightKind::RectArea { width, height } => {
                    let rotation = view_rotation * collected.world.fixed_view::<3, 3>(0, 0);
                    self.rect_area.push(RectAreaLightData {
                        position: to_view_point(&position),
                        half_width: rotation * Vec3::new(width * 0.5, 0.0, 0.0),
                        half_height: rotation * Vec3::new(0.0, height * 0.5, 0.0),
                        color,
                    });
                    counts.rect_area += 1;
                }
            }
        }

        if counts != self.counts {
            log::debug!("Light configuration changed: {:?}", counts);
            self.counts = counts;
            self.version += 1;
        }
    }

    /// Uniform values for lit programs
    pub fn uniforms(&self) -> Vec<(&'static str, UniformValue)> {
        let vec3s = |values: Vec<Vec3>| UniformValue::Vec3Array(values);
        let floats = |values: Vec<f32>| UniformValue::FloatArray(values);

        vec![
            ("ambientLightColor", UniformValue::Vec3(self.ambient)),
            ("directionalLights.direction", vec3s(self.directional.iter().map(|l| l.direction).collect())),
            ("directionalLights.color", vec3s(self.directional.iter().map(|l| l.color).collect())),
            ("pointLights.position", vec3s(self.point.iter().map(|l| l.position).collect())),
            ("pointLights.color", vec3s(self.point.iter().map(|l| l.color).collect())),
            ("pointLights.distance", floats(self.point.iter().map(|l| l.distance).collect())),
            ("pointLights.decay", floats(self.point.iter().map(|l| l.decay).collect())),
            ("spotLights.position", vec3s(self.spot.iter().map(|l| l.position).collect())),
            ("spotLights.direction", vec3s(self.spot.iter().map(|l| l.direction).collect())),
            ("spotLights.color", vec3s(self.spot.iter().map(|l| l.color).collect())),
            ("spotLights.distance", floats(self.spot.iter().map(|l| l.distance).collect())),
            ("spotLights.coneCos", floats(self.spot.iter().map(|l| l.cone_cos).collect())),
            ("spotLights.penumbraCos", floats(self.spot.iter().map(|l| l.penumbra_cos).collect())),
            ("spotLights.decay", floats(self.spot.iter().map(|l| l.decay).collect())),
            ("hemisphereLights.direction", vec3s(self.hemisphere.iter().map(|l| l.direction).collect())),
            ("hemisphereLights.skyColor", vec3s(self.hemisphere.iter().map(|l| l.sky_color).collect())),
            ("hemisphereLights.groundColor", vec3s(self.hemisphere.iter().map(|l| l.ground_color).collect())),
            ("rectAreaLights.position", vec3s(self.rect_area.iter().map(|l| l.position).collect())),
            ("rectAreaLights.halfWidth", vec3s(self.rect_area.iter().map(|l| l.half_width).collect())),
            ("rectAreaLights.halfHeight", vec3s(self.rect_area.iter().map(|l| l.half_height).collect())),
            ("rectAreaLights.color", vec3s(self.rect_area.iter().map(|l| l.color).collect())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Translation3;

    fn at(light: Light, position: Vec3, cast_shadow: bool) -> CollectedLight {
        CollectedLight { light, world: Translation3::from(position).to_homogeneous(), cast_shadow }
    }

    #[test]
    fn test_counts_and_version() {
        let mut state = LightState::new();
        let white = Vec3::new(1.0, 1.0, 1.0);
        let lights = [
            at(Light::ambient(white, 0.5), Vec3::zeros(), false),
            at(Light::ambient(white, 0.25), Vec3::zeros(), false),
            at(Light::directional(white, 1.0), Vec3::new(0.0, 10.0, 0.0), true),
            at(Light::point(white, 1.0, 0.0, 2.0), Vec3::new(1.0, 0.0, 0.0), false),
        ];

        state.setup(&lights, &Mat4::identity(), true);
        let counts = state.counts();
        assert_eq!((counts.directional, counts.point, counts.spot), (1, 1, 0));
        assert_eq!(counts.directional_shadow, 1);
        assert_relative_eq!(state.ambient, Vec3::new(0.75, 0.75, 0.75));
        assert_eq!(state.version(), 1);

        state.setup(&lights, &Mat4::identity(), true);
        assert_eq!(state.version(), 1, "same configuration keeps the version");

        state.setup(&lights, &Mat4::identity(), false);
        assert_eq!(state.counts().directional_shadow, 0);
        assert_eq!(state.version(), 2);
    }

    #[test]
    fn test_directions_are_in_view_space() {
        let mut state = LightState::new();
        let lights = [at(Light::directional(Vec3::new(1.0, 1.0, 1.0), 2.0), Vec3::new(0.0, 5.0, 0.0), false)];
        let view = Translation3::new(3.0, 0.0, 0.0).to_homogeneous();

        state.setup(&lights, &view, false);

        let light = state.directional[0];
        assert_relative_eq!(light.direction, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(light.color, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_point_light_position_transforms_with_view() {
        let mut state = LightState::new();
        let lights = [at(Light::point(Vec3::new(1.0, 1.0, 1.0), 1.0, 10.0, 2.0), Vec3::new(1.0, 2.0, 3.0), false)];
        let view = Translation3::new(0.0, 0.0, -5.0).to_homogeneous();

        state.setup(&lights, &view, false);
        assert_relative_eq!(state.point[0].position, Vec3::new(1.0, 2.0, -2.0), epsilon = 1e-6);
    }
}
