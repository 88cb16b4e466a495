//! Light node payload

use crate::foundation::math::Vec3;

/// Light model and its type-specific parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Uniform light from every direction
    Ambient,
    /// Parallel rays from the node position towards `target`
    Directional {
        /// World-space point the light aims at
        target: Vec3,
    },
    /// Omnidirectional light at the node position
    Point {
        /// Cutoff distance, 0 for none
        distance: f32,
        /// Falloff exponent
        decay: f32,
    },
    /// Cone of light towards `target`
    Spot {
        /// World-space point the light aims at
        target: Vec3,
        /// Cutoff distance, 0 for none
        distance: f32,
        /// Cone half-angle in radians
        angle: f32,
        /// Fraction of the cone that is attenuated
        penumbra: f32,
        /// Falloff exponent
        decay: f32,
    },
    /// Sky/ground gradient
    Hemisphere {
        /// Color from below
        ground_color: Vec3,
    },
    /// Rectangular area emitter facing -Z
    RectArea {
        /// Width of the emitter
        width: f32,
        /// Height of the emitter
        height: f32,
    },
}

/// Light payload of a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Model and parameters
    pub kind: LightKind,
    /// Linear RGB color
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
}

impl Light {
    /// White light of the given kind at unit intensity
    pub fn new(kind: LightKind) -> Self {
        Self { kind, color: Vec3::new(1.0, 1.0, 1.0), intensity: 1.0 }
    }

    /// Ambient light
    pub fn ambient(color: Vec3, intensity: f32) -> Self {
        Self { kind: LightKind::Ambient, color, intensity }
    }

    /// Directional light aimed at the origin
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self { kind: LightKind::Directional { target: Vec3::zeros() }, color, intensity }
    }

    /// Point light
    pub fn point(color: Vec3, intensity: f32, distance: f32, decay: f32) -> Self {
        Self { kind: LightKind::Point { distance, decay }, color, intensity }
    }

    /// Spot light aimed at the origin
    pub fn spot(color: Vec3, intensity: f32, angle: f32, penumbra: f32) -> Self {
        Self {
            kind: LightKind::Spot { target: Vec3::zeros(), distance: 0.0, angle, penumbra, decay: 2.0 },
            color,
            intensity,
        }
    }

    /// Hemisphere light
    pub fn hemisphere(sky_color: Vec3, ground_color: Vec3, intensity: f32) -> Self {
        Self { kind: LightKind::Hemisphere { ground_color }, color: sky_color, intensity }
    }

    /// Whether this kind can cast shadows
    pub const fn supports_shadows(&self) -> bool {
        matches!(self.kind, LightKind::Directional { .. } | LightKind::Point { .. } | LightKind::Spot { .. })
    }
}
