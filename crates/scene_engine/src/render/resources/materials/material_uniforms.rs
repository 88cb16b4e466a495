//! Material uniform values for upload
//!
//! Everything here changes per material without touching the program key.

use crate::foundation::math::{Mat3, Mat4};
use crate::render::api::UniformValue;
use crate::scene::Fog;

use super::material::{MapSlot, Material, MaterialType, TextureHandle};

/// Sampler uniform name for a texture slot
pub const fn map_uniform_name(slot: MapSlot) -> &'static str {
    match slot {
        MapSlot::Map => "map",
        MapSlot::AlphaMap => "alphaMap",
        MapSlot::AoMap => "aoMap",
        MapSlot::LightMap => "lightMap",
        MapSlot::EmissiveMap => "emissiveMap",
        MapSlot::BumpMap => "bumpMap",
        MapSlot::NormalMap => "normalMap",
        MapSlot::DisplacementMap => "displacementMap",
        MapSlot::RoughnessMap => "roughnessMap",
        MapSlot::MetalnessMap => "metalnessMap",
        MapSlot::SpecularMap => "specularMap",
        MapSlot::EnvMap => "envMap",
        MapSlot::ClearcoatMap => "clearcoatMap",
        MapSlot::TransmissionMap => "transmissionMap",
        MapSlot::Matcap => "matcap",
        MapSlot::GradientMap => "gradientMap",
    }
}

/// 2D affine part of a UV transform
fn uv_transform(matrix: &Mat4) -> Mat3 {
    Mat3::new(
        matrix[(0, 0)], matrix[(0, 1)], matrix[(0, 3)],
        matrix[(1, 0)], matrix[(1, 1)], matrix[(1, 3)],
        0.0, 0.0, 1.0,
    )
}

/// Uniform values for drawing with `material`
///
/// `environment` is the scene environment, used by physically based
/// materials that have no env map of their own.
pub fn material_uniforms(
    material: &Material,
    fog: Option<&Fog>,
    environment: Option<TextureHandle>,
) -> Vec<(String, UniformValue)> {
    let mut uniforms: Vec<(String, UniformValue)> = Vec::with_capacity(16);
    let mut push = |name: &str, value: UniformValue| uniforms.push((name.to_string(), value));

    push("diffuse", UniformValue::Vec3(material.color));
    push("opacity", UniformValue::Float(material.opacity));
    if material.alpha_test > 0.0 {
        push("alphaTest", UniformValue::Float(material.alpha_test));
    }

    for (slot, texture) in &material.maps {
        push(map_uniform_name(*slot), UniformValue::Texture(*texture));
    }
    if let Some(transform) = &material.map_transform {
        push("mapTransform", UniformValue::Mat3(uv_transform(transform)));
    }

    match &material.material_type {
        MaterialType::Lambert => push("emissive", UniformValue::Vec3(material.emissive)),
        MaterialType::Phong { shininess, specular } => {
            push("emissive", UniformValue::Vec3(material.emissive));
            push("shininess", UniformValue::Float(*shininess));
            push("specular", UniformValue::Vec3(*specular));
        }
        MaterialType::Standard { roughness, metalness } => {
            push("emissive", UniformValue::Vec3(material.emissive));
            push("roughness", UniformValue::Float(*roughness));
            push("metalness", UniformValue::Float(*metalness));
        }
        MaterialType::Physical { roughness, metalness, clearcoat, sheen, ior } => {
            push("emissive", UniformValue::Vec3(material.emissive));
            push("roughness", UniformValue::Float(*roughness));
            push("metalness", UniformValue::Float(*metalness));
            push("clearcoat", UniformValue::Float(*clearcoat));
            push("sheen", UniformValue::Float(*sheen));
            push("ior", UniformValue::Float(*ior));
        }
        MaterialType::LineBasic { linewidth } => push("linewidth", UniformValue::Float(*linewidth)),
        MaterialType::LineDashed { dash_size, gap_size, scale } => {
            push("dashSize", UniformValue::Float(*dash_size));
            push("totalSize", UniformValue::Float(dash_size + gap_size));
            push("scale", UniformValue::Float(*scale));
        }
        MaterialType::Points { size, .. } => push("size", UniformValue::Float(*size)),
        MaterialType::Sprite { rotation, .. } => push("rotation", UniformValue::Float(*rotation)),
        MaterialType::Shader(source) => {
            for (name, value) in &source.uniforms {
                push(name, value.clone());
            }
        }
        MaterialType::Basic | MaterialType::Normal | MaterialType::Depth => {}
    }

    if material.transmission > 0.0 {
        push("transmission", UniformValue::Float(material.transmission));
    }

    let physically_based = matches!(material.material_type, MaterialType::Standard { .. } | MaterialType::Physical { .. });
    if physically_based && !material.has_map(MapSlot::EnvMap) {
        if let Some(environment) = environment {
            push("envMap", UniformValue::Texture(environment));
        }
    }

    if material.fog {
        match fog {
            Some(Fog::Linear { color, near, far }) => {
                push("fogColor", UniformValue::Vec3(*color));
                push("fogNear", UniformValue::Float(*near));
                push("fogFar", UniformValue::Float(*far));
            }
            Some(Fog::Exponential { color, density }) => {
                push("fogColor", UniformValue::Vec3(*color));
                push("fogDensity", UniformValue::Float(*density));
            }
            None => {}
        }
    }

    uniforms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::resources::materials::ShaderSource;

    fn find<'a>(uniforms: &'a [(String, UniformValue)], name: &str) -> Option<&'a UniformValue> {
        uniforms.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    #[test]
    fn test_basic_material_uniforms() {
        let material = Material::basic(Vec3::new(0.5, 0.25, 1.0)).with_map(MapSlot::Map, TextureHandle(7));
        let uniforms = material_uniforms(&material, None, None);

        assert_eq!(find(&uniforms, "diffuse"), Some(&UniformValue::Vec3(Vec3::new(0.5, 0.25, 1.0))));
        assert_eq!(find(&uniforms, "map"), Some(&UniformValue::Texture(TextureHandle(7))));
        assert!(find(&uniforms, "emissive").is_none());
    }

    #[test]
    fn test_fog_respects_material_flag() {
        let fog = Fog::Exponential { color: Vec3::zeros(), density: 0.1 };
        let mut material = Material::lambert(Vec3::new(1.0, 1.0, 1.0));

        assert_eq!(find(&material_uniforms(&material, Some(&fog), None), "fogDensity"), Some(&UniformValue::Float(0.1)));

        material.fog = false;
        assert!(find(&material_uniforms(&material, Some(&fog), None), "fogDensity").is_none());
    }

    #[test]
    fn test_environment_only_for_physically_based() {
        let environment = Some(TextureHandle(3));
        let standard = Material::standard(Vec3::new(1.0, 1.0, 1.0), 0.5, 0.5);
        let basic = Material::basic(Vec3::new(1.0, 1.0, 1.0));

        assert!(find(&material_uniforms(&standard, None, environment), "envMap").is_some());
        assert!(find(&material_uniforms(&basic, None, environment), "envMap").is_none());
    }

    #[test]
    fn test_custom_uniforms_pass_through() {
        let mut source = ShaderSource::default();
        source.uniforms.insert("time".to_string(), UniformValue::Float(2.5));
        let uniforms = material_uniforms(&Material::shader(source), None, None);

        assert_eq!(find(&uniforms, "time"), Some(&UniformValue::Float(2.5)));
    }
}
