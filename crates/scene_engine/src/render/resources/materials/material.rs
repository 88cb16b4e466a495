//! Material definitions
//!
//! A material is a bag of uniforms, shader-feature switches and fixed-function
//! state. Fields are public; after changing anything that alters generated
//! shader source (maps, vertex colors, flat shading, defines...) call
//! [`Material::needs_update`] so the renderer re-resolves the program.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::foundation::bounds::Plane;
use crate::foundation::math::{Mat4, Vec3};
use crate::render::api::UniformValue;
use crate::render::constants::Precision;
use crate::render::pipeline::{
    Blending, DepthFunc, FrontFace, PipelineState, PolygonMode, PolygonOffset, Side,
    StencilState,
};

/// Handle to a texture owned by the backend or an asset collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureHandle(pub u64);

/// Texture slots a material can sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum MapSlot {
    Map,
    AlphaMap,
    AoMap,
    LightMap,
    EmissiveMap,
    BumpMap,
    NormalMap,
    DisplacementMap,
    RoughnessMap,
    MetalnessMap,
    SpecularMap,
    EnvMap,
    ClearcoatMap,
    TransmissionMap,
    Matcap,
    GradientMap,
}

/// How an environment map is sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EnvMapMode {
    /// Mirror reflection
    #[default]
    Reflection,
    /// Refraction through the surface
    Refraction,
}

/// User-supplied shader program
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderSource {
    /// Vertex stage source
    pub vertex: String,
    /// Fragment stage source
    pub fragment: String,
    /// Extra `#define`s prepended to both stages
    pub defines: BTreeMap<String, String>,
    /// Uniform values uploaded with the material
    pub uniforms: BTreeMap<String, UniformValue>,
    /// Receives scene light uniforms
    pub lights: bool,
    /// Skip the built-in prefix entirely
    pub raw: bool,
}

/// Lighting model and its type-specific parameters
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialType {
    /// Unlit color/texture
    Basic,
    /// Per-vertex diffuse lighting
    Lambert,
    /// Blinn-Phong
    Phong {
        /// Specular exponent
        shininess: f32,
        /// Specular color
        specular: Vec3,
    },
    /// Metal/roughness PBR
    Standard {
        /// 0 = mirror, 1 = fully rough
        roughness: f32,
        /// 0 = dielectric, 1 = metal
        metalness: f32,
    },
    /// Standard plus clearcoat, sheen and index of refraction
    Physical {
        /// 0 = mirror, 1 = fully rough
        roughness: f32,
        /// 0 = dielectric, 1 = metal
        metalness: f32,
        /// Clearcoat layer strength
        clearcoat: f32,
        /// Sheen strength
        sheen: f32,
        /// Index of refraction
        ior: f32,
    },
    /// Visualizes normals
    Normal,
    /// Visualizes depth
    Depth,
    /// Solid lines
    LineBasic {
        /// Line width in pixels (backend permitting)
        linewidth: f32,
    },
    /// Dashed lines
    LineDashed {
        /// Dash length
        dash_size: f32,
        /// Gap length
        gap_size: f32,
        /// Pattern scale
        scale: f32,
    },
    /// Point sprites
    Points {
        /// Point size
        size: f32,
        /// Shrink with distance
        size_attenuation: bool,
    },
    /// Camera-facing sprites
    Sprite {
        /// In-plane rotation in radians
        rotation: f32,
        /// Shrink with distance
        size_attenuation: bool,
    },
    /// Custom program
    Shader(ShaderSource),
}

impl MaterialType {
    /// Built-in shader library entry, `None` for custom programs
    pub const fn shader_id(&self) -> Option<&'static str> {
        match self {
            Self::Basic => Some("basic"),
            Self::Lambert => Some("lambert"),
            Self::Phong { .. } => Some("phong"),
            Self::Standard { .. } => Some("standard"),
            Self::Physical { .. } => Some("physical"),
            Self::Normal => Some("normal"),
            Self::Depth => Some("depth"),
            Self::LineBasic { .. } => Some("basic"),
            Self::LineDashed { .. } => Some("dashed"),
            Self::Points { .. } => Some("points"),
            Self::Sprite { .. } => Some("sprite"),
            Self::Shader(_) => None,
        }
    }

    /// Whether the shading model consumes scene lights
    pub const fn uses_lights(&self) -> bool {
        match self {
            Self::Lambert | Self::Phong { .. } | Self::Standard { .. } | Self::Physical { .. } => true,
            Self::Shader(source) => source.lights,
            _ => false,
        }
    }
}

/// Material resource
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Optional name for debugging
    pub name: String,
    /// Lighting model
    pub material_type: MaterialType,

    /// Diffuse / base color (linear RGB)
    pub color: Vec3,
    /// Alpha
    pub opacity: f32,
    /// Emissive color
    pub emissive: Vec3,
    /// Bound textures
    pub maps: BTreeMap<MapSlot, TextureHandle>,
    /// Environment map sampling
    pub env_map_mode: EnvMapMode,
    /// UV transform applied to `map`
    pub map_transform: Option<Mat4>,

    /// Multiply by the `color` vertex attribute
    pub vertex_colors: bool,
    /// Use face normals
    pub flat_shading: bool,
    /// Affected by scene fog
    pub fog: bool,
    /// Discard fragments below this alpha (0 disables)
    pub alpha_test: f32,
    /// Dithered alpha instead of blending
    pub alpha_hash: bool,
    /// Output is premultiplied by alpha
    pub premultiplied_alpha: bool,
    /// Apply renderer tone mapping
    pub tone_mapped: bool,
    /// Alpha blended; goes to the transparent list
    pub transparent: bool,
    /// Refraction strength; positive values go to the transmissive list
    pub transmission: f32,
    /// Faces rendered
    pub side: Side,
    /// Local clipping planes (world space)
    pub clipping_planes: Vec<Plane>,
    /// Clip only where all planes agree instead of any
    pub clip_intersection: bool,
    /// Dithering in the output stage
    pub dithering: bool,
    /// Per-material precision override
    pub precision: Option<Precision>,
    /// Extra string mixed into the program key
    pub custom_program_cache_key: Option<String>,

    /// Blend mode
    pub blending: Blending,
    /// Enable depth testing
    pub depth_test: bool,
    /// Enable depth writing
    pub depth_write: bool,
    /// Depth comparison
    pub depth_func: DepthFunc,
    /// Stencil configuration
    pub stencil: StencilState,
    /// Depth bias
    pub polygon_offset: PolygonOffset,
    /// Write color channels
    pub color_write: bool,
    /// Draw triangle edges only
    pub wireframe: bool,
    /// Hidden materials are skipped by the list builder
    pub visible: bool,

    version: u64,
    serial: u64,
}

impl Default for Material {
    fn default() -> Self {
        Self::new(MaterialType::Basic)
    }
}

impl Material {
    /// Material of the given type with default settings
    pub fn new(material_type: MaterialType) -> Self {
        Self {
            name: String::new(),
            material_type,
            color: Vec3::new(1.0, 1.0, 1.0),
            opacity: 1.0,
            emissive: Vec3::zeros(),
            maps: BTreeMap::new(),
            env_map_mode: EnvMapMode::Reflection,
            map_transform: None,
            vertex_colors: false,
            flat_shading: false,
            fog: true,
            alpha_test: 0.0,
            alpha_hash: false,
            premultiplied_alpha: false,
            tone_mapped: true,
            transparent: false,
            transmission: 0.0,
            side: Side::Front,
            clipping_planes: Vec::new(),
            clip_intersection: false,
            dithering: false,
            precision: None,
            custom_program_cache_key: None,
            blending: Blending::Normal,
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::LessEqual,
            stencil: StencilState::default(),
            polygon_offset: PolygonOffset::default(),
            color_write: true,
            wireframe: false,
            visible: true,
            version: 0,
            serial: 0,
        }
    }

    /// Unlit material
    pub fn basic(color: Vec3) -> Self {
        Self { color, ..Self::new(MaterialType::Basic) }
    }

    /// Lambert material
    pub fn lambert(color: Vec3) -> Self {
        Self { color, ..Self::new(MaterialType::Lambert) }
    }

    /// Phong material
    pub fn phong(color: Vec3, shininess: f32) -> Self {
        Self {
            color,
            ..Self::new(MaterialType::Phong { shininess, specular: Vec3::new(0.067, 0.067, 0.067) })
        }
    }

    /// Standard PBR material
    pub fn standard(color: Vec3, roughness: f32, metalness: f32) -> Self {
        Self { color, ..Self::new(MaterialType::Standard { roughness, metalness }) }
    }

    /// Physical PBR material
    pub fn physical(color: Vec3, roughness: f32, metalness: f32) -> Self {
        Self {
            color,
            ..Self::new(MaterialType::Physical { roughness, metalness, clearcoat: 0.0, sheen: 0.0, ior: 1.5 })
        }
    }

    /// Solid line material
    pub fn line_basic(color: Vec3) -> Self {
        Self { color, fog: true, ..Self::new(MaterialType::LineBasic { linewidth: 1.0 }) }
    }

    /// Dashed line material
    pub fn line_dashed(color: Vec3, dash_size: f32, gap_size: f32) -> Self {
        Self { color, ..Self::new(MaterialType::LineDashed { dash_size, gap_size, scale: 1.0 }) }
    }

    /// Point material
    pub fn points(color: Vec3, size: f32) -> Self {
        Self { color, ..Self::new(MaterialType::Points { size, size_attenuation: true }) }
    }

    /// Sprite material; sprites are blended by default
    pub fn sprite(color: Vec3) -> Self {
        Self {
            color,
            transparent: true,
            ..Self::new(MaterialType::Sprite { rotation: 0.0, size_attenuation: true })
        }
    }

    /// Custom shader material
    pub fn shader(source: ShaderSource) -> Self {
        Self::new(MaterialType::Shader(source))
    }

    /// Set the name for debugging
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bind a texture to a slot
    pub fn with_map(mut self, slot: MapSlot, texture: TextureHandle) -> Self {
        self.maps.insert(slot, texture);
        self
    }

    /// Make the material alpha blended
    pub fn with_transparency(mut self, opacity: f32) -> Self {
        self.transparent = true;
        self.opacity = opacity;
        self
    }

    /// Whether a texture is bound to `slot`
    pub fn has_map(&self, slot: MapSlot) -> bool {
        self.maps.contains_key(&slot)
    }

    /// Flag a change that affects program selection
    pub fn needs_update(&mut self) {
        self.version += 1;
    }

    /// Change counter
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Creation order within the owning scene; used as the "material id" sort key
    pub const fn serial(&self) -> u64 {
        self.serial
    }

    pub(crate) fn set_serial(&mut self, serial: u64) {
        self.serial = serial;
    }

    /// Fixed-function state for a draw with this material
    ///
    /// `mirrored` is set when the object's world matrix has a negative
    /// determinant, which swaps the front-face winding.
    pub fn pipeline_state(&self, mirrored: bool) -> PipelineState {
        let blending = if self.blending == Blending::Normal && !self.transparent {
            Blending::None
        } else {
            self.blending
        };
        let front_face = if mirrored { FrontFace::Clockwise } else { FrontFace::CounterClockwise };

        PipelineState {
            blending,
            premultiplied_alpha: self.premultiplied_alpha,
            depth_test: self.depth_test,
            depth_write: self.depth_write,
            depth_func: self.depth_func,
            stencil: self.stencil,
            cull_mode: self.side.cull_mode(),
            front_face,
            polygon_offset: self.polygon_offset,
            polygon_mode: if self.wireframe { PolygonMode::Line } else { PolygonMode::Fill },
            color_write: self.color_write,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::pipeline::CullMode;

    #[test]
    fn test_opaque_material_disables_normal_blending() {
        let opaque = Material::basic(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(opaque.pipeline_state(false).blending, Blending::None);

        let glass = Material::basic(Vec3::new(1.0, 1.0, 1.0)).with_transparency(0.5);
        assert_eq!(glass.pipeline_state(false).blending, Blending::Normal);

        let mut additive = Material::basic(Vec3::zeros());
        additive.blending = Blending::Additive;
        assert_eq!(additive.pipeline_state(false).blending, Blending::Additive);
    }

    #[test]
    fn test_side_maps_to_cull_and_winding() {
        let mut material = Material::default();
        let state = material.pipeline_state(false);
        assert_eq!((state.cull_mode, state.front_face), (CullMode::Back, FrontFace::CounterClockwise));

        assert_eq!(material.pipeline_state(true).front_face, FrontFace::Clockwise);

        material.side = Side::Back;
        assert_eq!(material.pipeline_state(false).cull_mode, CullMode::Front);

        material.side = Side::Double;
        assert_eq!(material.pipeline_state(false).cull_mode, CullMode::None);
    }

    #[test]
    fn test_needs_update_bumps_version() {
        let mut material = Material::lambert(Vec3::new(0.5, 0.5, 0.5));
        assert_eq!(material.version(), 0);
        material.needs_update();
        material.needs_update();
        assert_eq!(material.version(), 2);
        assert!(material.material_type.uses_lights());
        assert!(!Material::basic(Vec3::zeros()).material_type.uses_lights());
    }
}
