//! Program parameters and cache keys
//!
//! [`get_parameters`] reduces a material plus the frame's light, clipping,
//! output and object state to every input that changes generated shader
//! source. [`get_program_cache_key`] serializes those inputs into the string
//! the program cache deduplicates on. Uniform values (colors, opacity,
//! roughness...) never reach the parameters, so materials that differ only
//! in uniforms share a program.

use std::fmt::Write as _;

use bitflags::bitflags;

use crate::core::config::RendererConfig;
use crate::render::clipping::ClippingCounts;
use crate::render::constants::{ColorSpace, Precision, ShadowMapType, ToneMapping};
use crate::render::lighting::LightCounts;
use crate::render::pipeline::Side;
use crate::render::resources::materials::{EnvMapMode, MapSlot, Material, MaterialType, TextureHandle};
use crate::scene::Fog;

use super::program::MAX_MORPH_TARGETS;

bitflags! {
    /// Boolean shader features; each set bit becomes a `#define`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProgramFeatures: u64 {
        /// Base color map
        const MAP = 1 << 0;
        /// Alpha map
        const ALPHA_MAP = 1 << 1;
        /// Ambient occlusion map
        const AO_MAP = 1 << 2;
        /// Baked light map
        const LIGHT_MAP = 1 << 3;
        /// Emissive map
        const EMISSIVE_MAP = 1 << 4;
        /// Bump map
        const BUMP_MAP = 1 << 5;
        /// Tangent-space normal map
        const NORMAL_MAP = 1 << 6;
        /// Displacement map
        const DISPLACEMENT_MAP = 1 << 7;
        /// Roughness map
        const ROUGHNESS_MAP = 1 << 8;
        /// Metalness map
        const METALNESS_MAP = 1 << 9;
        /// Specular map
        const SPECULAR_MAP = 1 << 10;
        /// Environment map
        const ENV_MAP = 1 << 11;
        /// Clearcoat map
        const CLEARCOAT_MAP = 1 << 12;
        /// Transmission map
        const TRANSMISSION_MAP = 1 << 13;
        /// Matcap texture
        const MATCAP = 1 << 14;
        /// Toon gradient map
        const GRADIENT_MAP = 1 << 15;
        /// UV transform on the base map
        const MAP_TRANSFORM = 1 << 16;
        /// RGB vertex colors
        const VERTEX_COLORS = 1 << 17;
        /// RGBA vertex colors
        const VERTEX_ALPHAS = 1 << 18;
        /// Face normals
        const FLAT_SHADING = 1 << 19;
        /// Linear fog
        const FOG = 1 << 20;
        /// Exponential squared fog
        const FOG_EXP2 = 1 << 21;
        /// Alpha test discard
        const ALPHA_TEST = 1 << 22;
        /// Dithered alpha
        const ALPHA_HASH = 1 << 23;
        /// Premultiplied alpha output
        const PREMULTIPLIED_ALPHA = 1 << 24;
        /// Per-instance matrices
        const INSTANCING = 1 << 25;
        /// Morph positions
        const MORPH_TARGETS = 1 << 26;
        /// Morph normals
        const MORPH_NORMALS = 1 << 27;
        /// Morph targets are offsets from the base
        const MORPH_RELATIVE = 1 << 28;
        /// Vertex skinning
        const SKINNING = 1 << 29;
        /// Receives shadows
        const SHADOW_MAP = 1 << 30;
        /// Both faces rendered
        const DOUBLE_SIDED = 1 << 31;
        /// Back faces rendered
        const FLIP_SIDED = 1 << 32;
        /// Transmission / refraction
        const TRANSMISSION = 1 << 33;
        /// Output dithering
        const DITHERING = 1 << 34;
        /// Point/sprite size shrinks with distance
        const SIZE_ATTENUATION = 1 << 35;
        /// Shading model consumes lights
        const LIGHTS = 1 << 36;
        /// Clearcoat layer
        const CLEARCOAT = 1 << 37;
        /// Sheen layer
        const SHEEN = 1 << 38;
        /// Any UV-mapped texture
        const UV = 1 << 39;
    }
}

impl ProgramFeatures {
    /// `#define` names in bit order
    pub const DEFINES: [(Self, &'static str); 40] = [
        (Self::MAP, "USE_MAP"),
        (Self::ALPHA_MAP, "USE_ALPHAMAP"),
        (Self::AO_MAP, "USE_AOMAP"),
        (Self::LIGHT_MAP, "USE_LIGHTMAP"),
        (Self::EMISSIVE_MAP, "USE_EMISSIVEMAP"),
        (Self::BUMP_MAP, "USE_BUMPMAP"),
        (Self::NORMAL_MAP, "USE_NORMALMAP"),
        (Self::DISPLACEMENT_MAP, "USE_DISPLACEMENTMAP"),
        (Self::ROUGHNESS_MAP, "USE_ROUGHNESSMAP"),
        (Self::METALNESS_MAP, "USE_METALNESSMAP"),
        (Self::SPECULAR_MAP, "USE_SPECULARMAP"),
        (Self::ENV_MAP, "USE_ENVMAP"),
        (Self::CLEARCOAT_MAP, "USE_CLEARCOATMAP"),
        (Self::TRANSMISSION_MAP, "USE_TRANSMISSIONMAP"),
        (Self::MATCAP, "USE_MATCAP"),
        (Self::GRADIENT_MAP, "USE_GRADIENTMAP"),
        (Self::MAP_TRANSFORM, "USE_MAP_TRANSFORM"),
        (Self::VERTEX_COLORS, "USE_COLOR"),
        (Self::VERTEX_ALPHAS, "USE_COLOR_ALPHA"),
        (Self::FLAT_SHADING, "FLAT_SHADED"),
        (Self::FOG, "USE_FOG"),
        (Self::FOG_EXP2, "FOG_EXP2"),
        (Self::ALPHA_TEST, "USE_ALPHATEST"),
        (Self::ALPHA_HASH, "USE_ALPHAHASH"),
        (Self::PREMULTIPLIED_ALPHA, "PREMULTIPLIED_ALPHA"),
        (Self::INSTANCING, "USE_INSTANCING"),
        (Self::MORPH_TARGETS, "USE_MORPHTARGETS"),
        (Self::MORPH_NORMALS, "USE_MORPHNORMALS"),
        (Self::MORPH_RELATIVE, "MORPHTARGETS_RELATIVE"),
        (Self::SKINNING, "USE_SKINNING"),
        (Self::SHADOW_MAP, "USE_SHADOWMAP"),
        (Self::DOUBLE_SIDED, "DOUBLE_SIDED"),
        (Self::FLIP_SIDED, "FLIP_SIDED"),
        (Self::TRANSMISSION, "USE_TRANSMISSION"),
        (Self::DITHERING, "DITHERING"),
        (Self::SIZE_ATTENUATION, "USE_SIZEATTENUATION"),
        (Self::LIGHTS, "USE_LIGHTS"),
        (Self::CLEARCOAT, "USE_CLEARCOAT"),
        (Self::SHEEN, "USE_SHEEN"),
        (Self::UV, "USE_UV"),
    ];

    /// Define names of every set flag
    pub fn define_names(self) -> impl Iterator<Item = &'static str> {
        Self::DEFINES.into_iter().filter(move |(flag, _)| self.contains(*flag)).map(|(_, name)| name)
    }
}

/// Object-level inputs that change shader source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectFeatures {
    /// Drawn with per-instance matrices
    pub instancing: bool,
    /// Morph targets on the geometry
    pub morph_target_count: usize,
    /// Geometry has normal morph targets
    pub morph_normals: bool,
    /// Morph targets are relative
    pub morph_targets_relative: bool,
    /// Skinned in the vertex shader
    pub skinning: bool,
    /// Node receives shadows
    pub receive_shadow: bool,
    /// Color attribute has four components
    pub vertex_alphas: bool,
}

/// Frame-level inputs shared by every program resolved in a frame
#[derive(Debug, Clone, Copy)]
pub struct ProgramContext<'a> {
    /// Renderer output and quality settings
    pub config: &'a RendererConfig,
    /// Active light counts
    pub lights: LightCounts,
    /// Scene fog
    pub fog: Option<&'a Fog>,
    /// Scene environment map
    pub environment: Option<TextureHandle>,
}

/// Identity and sources of a custom program
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomShaderKey {
    /// Vertex source as written by the user
    pub vertex: String,
    /// Fragment source as written by the user
    pub fragment: String,
    /// User defines, sorted by name
    pub defines: Vec<(String, String)>,
    /// No built-in prefix
    pub raw: bool,
}

/// Every input that affects generated shader source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramParameters {
    /// Built-in shader library entry, `None` for custom programs
    pub shader_id: Option<&'static str>,
    /// Custom program identity
    pub custom: Option<CustomShaderKey>,
    /// Extra key contributed by the material
    pub custom_cache_key: Option<String>,
    /// Boolean features
    pub features: ProgramFeatures,
    /// Float precision
    pub precision: Precision,
    /// Environment map mode when an environment map is used
    pub env_map_mode: Option<EnvMapMode>,
    /// Framebuffer color space
    pub output_color_space: ColorSpace,
    /// Tone mapping; `None` when the material opts out
    pub tone_mapping: ToneMapping,
    /// Shadow filtering when shadows are enabled
    pub shadow_map_type: Option<ShadowMapType>,
    /// Active lights; zeroed for unlit materials
    pub lights: LightCounts,
    /// Clipping plane counts
    pub clipping: ClippingCounts,
    /// Morph target count
    pub morph_targets: usize,
}

const fn map_feature(slot: MapSlot) -> ProgramFeatures {
    match slot {
        MapSlot::Map => ProgramFeatures::MAP,
        MapSlot::AlphaMap => ProgramFeatures::ALPHA_MAP,
        MapSlot::AoMap => ProgramFeatures::AO_MAP,
        MapSlot::LightMap => ProgramFeatures::LIGHT_MAP,
        MapSlot::EmissiveMap => ProgramFeatures::EMISSIVE_MAP,
        MapSlot::BumpMap => ProgramFeatures::BUMP_MAP,
        MapSlot::NormalMap => ProgramFeatures::NORMAL_MAP,
        MapSlot::DisplacementMap => ProgramFeatures::DISPLACEMENT_MAP,
        MapSlot::RoughnessMap => ProgramFeatures::ROUGHNESS_MAP,
        MapSlot::MetalnessMap => ProgramFeatures::METALNESS_MAP,
        MapSlot::SpecularMap => ProgramFeatures::SPECULAR_MAP,
        MapSlot::EnvMap => ProgramFeatures::ENV_MAP,
        MapSlot::ClearcoatMap => ProgramFeatures::CLEARCOAT_MAP,
        MapSlot::TransmissionMap => ProgramFeatures::TRANSMISSION_MAP,
        MapSlot::Matcap => ProgramFeatures::MATCAP,
        MapSlot::GradientMap => ProgramFeatures::GRADIENT_MAP,
    }
}

/// Derive the program inputs for drawing `object` with `material`
pub fn get_parameters(
    material: &Material,
    context: &ProgramContext<'_>,
    clipping: ClippingCounts,
    object: &ObjectFeatures,
) -> ProgramParameters {
    let mut features = ProgramFeatures::empty();

    for slot in material.maps.keys() {
        features |= map_feature(*slot);
    }
    let uses_env_map = material.has_map(MapSlot::EnvMap) || (context.environment.is_some() && is_physically_based(material));
    features.set(ProgramFeatures::ENV_MAP, uses_env_map);
    features.set(ProgramFeatures::MAP_TRANSFORM, material.has_map(MapSlot::Map) && material.map_transform.is_some());
    let uv_slots = material.maps.keys().any(|slot| !matches!(slot, MapSlot::EnvMap | MapSlot::Matcap));
    features.set(ProgramFeatures::UV, uv_slots);

    features.set(ProgramFeatures::VERTEX_COLORS, material.vertex_colors);
    features.set(ProgramFeatures::VERTEX_ALPHAS, material.vertex_colors && object.vertex_alphas);
    features.set(ProgramFeatures::FLAT_SHADING, material.flat_shading);

    if material.fog {
        match context.fog {
            Some(Fog::Linear { .. }) => features |= ProgramFeatures::FOG,
            Some(Fog::Exponential { .. }) => features |= ProgramFeatures::FOG | ProgramFeatures::FOG_EXP2,
            None => {}
        }
    }

    features.set(ProgramFeatures::ALPHA_TEST, material.alpha_test > 0.0);
    features.set(ProgramFeatures::ALPHA_HASH, material.alpha_hash);
    features.set(ProgramFeatures::PREMULTIPLIED_ALPHA, material.premultiplied_alpha);
    features.set(ProgramFeatures::DITHERING, material.dithering);
    features.set(ProgramFeatures::TRANSMISSION, material.transmission > 0.0);
    features.set(ProgramFeatures::DOUBLE_SIDED, material.side == Side::Double);
    features.set(ProgramFeatures::FLIP_SIDED, material.side == Side::Back);

    features.set(ProgramFeatures::INSTANCING, object.instancing);
    features.set(ProgramFeatures::MORPH_TARGETS, object.morph_target_count > 0);
    features.set(ProgramFeatures::MORPH_NORMALS, object.morph_target_count > 0 && object.morph_normals);
    features.set(ProgramFeatures::MORPH_RELATIVE, object.morph_target_count > 0 && object.morph_targets_relative);
    features.set(ProgramFeatures::SKINNING, object.skinning);

    let lit = material.material_type.uses_lights();
    features.set(ProgramFeatures::LIGHTS, lit);
    let shadows = context.config.shadow_map.enabled;
    features.set(ProgramFeatures::SHADOW_MAP, lit && shadows && object.receive_shadow);

    match &material.material_type {
        MaterialType::Points { size_attenuation, .. } | MaterialType::Sprite { size_attenuation, .. } => {
            features.set(ProgramFeatures::SIZE_ATTENUATION, *size_attenuation);
        }
        MaterialType::Physical { clearcoat, sheen, .. } => {
            features.set(ProgramFeatures::CLEARCOAT, *clearcoat > 0.0);
            features.set(ProgramFeatures::SHEEN, *sheen > 0.0);
        }
        _ => {}
    }

    let custom = match &material.material_type {
        MaterialType::Shader(source) => Some(CustomShaderKey {
            vertex: source.vertex.clone(),
            fragment: source.fragment.clone(),
            defines: source.defines.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            raw: source.raw,
        }),
        _ => None,
    };

    ProgramParameters {
        shader_id: material.material_type.shader_id(),
        custom,
        custom_cache_key: material.custom_program_cache_key.clone(),
        features,
        precision: material.precision.unwrap_or(context.config.precision),
        env_map_mode: uses_env_map.then_some(material.env_map_mode),
        output_color_space: context.config.output_color_space,
        tone_mapping: if material.tone_mapped { context.config.tone_mapping } else { ToneMapping::None },
        shadow_map_type: (lit && shadows).then_some(context.config.shadow_map.kind),
        lights: if lit { context.lights } else { LightCounts::default() },
        clipping,
        morph_targets: object.morph_target_count.min(MAX_MORPH_TARGETS),
    }
}

const fn is_physically_based(material: &Material) -> bool {
    matches!(material.material_type, MaterialType::Standard { .. } | MaterialType::Physical { .. })
}

/// Deterministic cache key for a parameter set
pub fn get_program_cache_key(parameters: &ProgramParameters) -> String {
    let mut key = String::with_capacity(128);

    match (&parameters.custom, parameters.shader_id) {
        (Some(custom), _) => {
            // Length-prefixed so no source text can imitate a separator
            let _ = write!(
                key,
                "custom:{}:{}:{}:{}",
                custom.vertex.len(),
                custom.vertex,
                custom.fragment.len(),
                custom.fragment
            );
            if custom.raw {
                key.push_str(":raw");
            }
            for (name, value) in &custom.defines {
                let _ = write!(key, ":{name}={value}");
            }
        }
        (None, Some(id)) => key.push_str(id),
        (None, None) => key.push_str("unknown"),
    }

    let lights = &parameters.lights;
    let _ = write!(
        key,
        ",{},{:x},{},{},{},{},l{}.{}.{}.{}.{}.{}.{}.{},c{}.{},m{}",
        parameters.precision.qualifier(),
        parameters.features.bits(),
        parameters.env_map_mode.map_or("-", |mode| match mode {
            EnvMapMode::Reflection => "refl",
            EnvMapMode::Refraction => "refr",
        }),
        parameters.output_color_space.tag(),
        parameters.tone_mapping.tag(),
        parameters.shadow_map_type.map_or("-", ShadowMapType::tag),
        lights.directional,
        lights.point,
        lights.spot,
        lights.hemisphere,
        lights.rect_area,
        lights.directional_shadow,
        lights.point_shadow,
        lights.spot_shadow,
        parameters.clipping.planes,
        parameters.clipping.intersection,
        parameters.morph_targets,
    );

    if let Some(custom_key) = &parameters.custom_cache_key {
        key.push(',');
        key.push_str(custom_key);
    }
    key
}
