//! Compiled programs and source synthesis

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::parameters::{ProgramFeatures, ProgramParameters};
use super::shader_lib::{resolve_includes, shader};
use super::ProgramError;
use crate::render::api::{ProgramHandle, ProgramSources};
use crate::render::constants::{ColorSpace, ShadowMapType, ToneMapping};
use crate::render::resources::materials::EnvMapMode;

/// Morph targets beyond this many are ignored; each one is a vertex input
pub const MAX_MORPH_TARGETS: usize = 8;

/// Readiness of a cached program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStatus {
    /// Submitted, not yet linked
    Pending,
    /// Usable
    Ready,
    /// Unusable until its inputs change
    Failed,
}

/// Why a program failed, with everything needed to debug it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDiagnostics {
    /// Vertex source as submitted
    pub vertex_source: String,
    /// Fragment source as submitted
    pub fragment_source: String,
    /// Compiler/linker log
    pub log: String,
}

/// Cache entry for one compiled program
#[derive(Debug)]
pub struct Program {
    key: String,
    handle: ProgramHandle,
    sources: ProgramSources,
    use_count: usize,
    status: CompileStatus,
    attributes: BTreeMap<String, u32>,
    diagnostics: Option<ProgramDiagnostics>,
    uses_lights: bool,
}

impl Program {
    pub(crate) fn new(key: String, handle: ProgramHandle, sources: ProgramSources, uses_lights: bool) -> Self {
        Self {
            key,
            handle,
            sources,
            use_count: 1,
            status: CompileStatus::Pending,
            attributes: BTreeMap::new(),
            diagnostics: None,
            uses_lights,
        }
    }

    /// Cache key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.sources.name
    }

    /// Backend handle
    pub const fn handle(&self) -> ProgramHandle {
        self.handle
    }

    /// Synthesized sources
    pub const fn sources(&self) -> &ProgramSources {
        &self.sources
    }

    /// Number of material/object pairs using this program
    pub const fn use_count(&self) -> usize {
        self.use_count
    }

    /// Readiness
    pub const fn status(&self) -> CompileStatus {
        self.status
    }

    /// Whether the program can be drawn with
    pub fn is_ready(&self) -> bool {
        self.status == CompileStatus::Ready
    }

    /// Vertex input locations by attribute name
    pub const fn attributes(&self) -> &BTreeMap<String, u32> {
        &self.attributes
    }

    /// Failure details, if compilation failed
    pub const fn diagnostics(&self) -> Option<&ProgramDiagnostics> {
        self.diagnostics.as_ref()
    }

    /// Whether light uniforms must be uploaded
    pub const fn uses_lights(&self) -> bool {
        self.uses_lights
    }

    pub(crate) fn retain(&mut self) {
        self.use_count += 1;
    }

    pub(crate) fn release(&mut self) -> usize {
        self.use_count = self.use_count.saturating_sub(1);
        self.use_count
    }

    pub(crate) fn mark_ready(&mut self, attributes: Vec<(String, u32)>) {
        self.status = CompileStatus::Ready;
        self.attributes = attributes.into_iter().collect();
    }

    pub(crate) fn mark_failed(&mut self, log: String) {
        self.status = CompileStatus::Failed;
        self.diagnostics = Some(ProgramDiagnostics {
            vertex_source: self.sources.vertex.clone(),
            fragment_source: self.sources.fragment.clone(),
            log,
        });
    }
}

/// Build vertex and fragment sources for a parameter set
pub fn build_sources(parameters: &ProgramParameters) -> Result<ProgramSources, ProgramError> {
    let (name, vertex_body, fragment_body, raw) = match (&parameters.custom, parameters.shader_id) {
        (Some(custom), _) => ("custom".to_string(), custom.vertex.as_str(), custom.fragment.as_str(), custom.raw),
        (None, Some(id)) => {
            let (vertex, fragment) = shader(id).ok_or_else(|| ProgramError::UnknownShader(id.to_string()))?;
            (id.to_string(), vertex, fragment, false)
        }
        (None, None) => return Err(ProgramError::UnknownShader(String::new())),
    };

    let mut user_defines = String::new();
    if let Some(custom) = &parameters.custom {
        for (define, value) in &custom.defines {
            let _ = writeln!(user_defines, "#define {define} {value}");
        }
    }

    let (vertex_prefix, fragment_prefix) = if raw {
        (user_defines.clone(), user_defines)
    } else {
        let common = common_defines(parameters, &name);
        (
            format!("{common}{user_defines}{}", vertex_declarations(parameters, &name)),
            format!("{common}{user_defines}{}", fragment_declarations(parameters)),
        )
    };

    Ok(ProgramSources {
        vertex: format!("{vertex_prefix}{}", resolve_includes(vertex_body)?),
        fragment: format!("{fragment_prefix}{}", resolve_includes(fragment_body)?),
        name,
    })
}

fn common_defines(parameters: &ProgramParameters, name: &str) -> String {
    let mut prefix = String::with_capacity(1024);
    let precision = parameters.precision.qualifier();
    let _ = writeln!(prefix, "#version 300 es");
    let _ = writeln!(prefix, "#define SHADER_NAME {name}");
    let _ = writeln!(prefix, "precision {precision} float;\nprecision {precision} int;");

    for define in parameters.features.define_names() {
        let _ = writeln!(prefix, "#define {define}");
    }

    let lights = &parameters.lights;
    let _ = writeln!(prefix, "#define NUM_DIR_LIGHTS {}", lights.directional);
    let _ = writeln!(prefix, "#define NUM_POINT_LIGHTS {}", lights.point);
    let _ = writeln!(prefix, "#define NUM_SPOT_LIGHTS {}", lights.spot);
    let _ = writeln!(prefix, "#define NUM_HEMI_LIGHTS {}", lights.hemisphere);
    let _ = writeln!(prefix, "#define NUM_RECT_AREA_LIGHTS {}", lights.rect_area);
    let _ = writeln!(prefix, "#define NUM_DIR_LIGHT_SHADOWS {}", lights.directional_shadow);
    let _ = writeln!(prefix, "#define NUM_POINT_LIGHT_SHADOWS {}", lights.point_shadow);
    let _ = writeln!(prefix, "#define NUM_SPOT_LIGHT_SHADOWS {}", lights.spot_shadow);

    let clipping = &parameters.clipping;
    let _ = writeln!(prefix, "#define NUM_CLIPPING_PLANES {}", clipping.planes);
    let _ = writeln!(prefix, "#define UNION_CLIPPING_PLANES {}", clipping.planes - clipping.intersection);

    if parameters.morph_targets > 0 {
        let _ = writeln!(prefix, "#define MORPHTARGETS_COUNT {}", parameters.morph_targets);
    }
    if parameters.env_map_mode == Some(EnvMapMode::Refraction) {
        prefix.push_str("#define ENVMAP_MODE_REFRACTION\n");
    }
    if let Some(kind) = parameters.shadow_map_type {
        let define = match kind {
            ShadowMapType::Basic => "SHADOWMAP_TYPE_BASIC",
            ShadowMapType::Pcf => "SHADOWMAP_TYPE_PCF",
            ShadowMapType::PcfSoft => "SHADOWMAP_TYPE_PCF_SOFT",
            ShadowMapType::Vsm => "SHADOWMAP_TYPE_VSM",
        };
        let _ = writeln!(prefix, "#define {define}");
    }
    prefix
}

fn vertex_declarations(parameters: &ProgramParameters, name: &str) -> String {
    let features = parameters.features;
    let mut declarations = String::from(
        "uniform mat4 modelMatrix;\nuniform mat4 modelViewMatrix;\nuniform mat4 projectionMatrix;\n\
         uniform mat4 viewMatrix;\nuniform mat3 normalMatrix;\nuniform vec3 cameraPosition;\n",
    );

    if features.contains(ProgramFeatures::INSTANCING) {
        declarations.push_str("in mat4 instanceMatrix;\n");
    }
    declarations.push_str("in vec3 position;\nin vec3 normal;\nin vec2 uv;\n");
    if features.intersects(ProgramFeatures::AO_MAP | ProgramFeatures::LIGHT_MAP) {
        declarations.push_str("in vec2 uv1;\n");
    }
    if features.contains(ProgramFeatures::VERTEX_ALPHAS) {
        declarations.push_str("in vec4 color;\n");
    } else if features.contains(ProgramFeatures::VERTEX_COLORS) {
        declarations.push_str("in vec3 color;\n");
    }
    if features.contains(ProgramFeatures::SKINNING) {
        declarations.push_str("in vec4 skinIndex;\nin vec4 skinWeight;\n");
    }
    if name == "dashed" {
        declarations.push_str("in float lineDistance;\n");
    }
    if parameters.morph_targets > 0 {
        let mut lookup = String::from("vec3 getMorph(int vertexId, int i) {\n");
        for target in 0..parameters.morph_targets {
            let _ = writeln!(declarations, "in vec3 morphTarget{target};");
            let _ = writeln!(lookup, "    if (i == {target}) return morphTarget{target};");
        }
        lookup.push_str("    return vec3(0.0);\n}\n");
        declarations.push_str(&lookup);
    }
    declarations
}

fn fragment_declarations(parameters: &ProgramParameters) -> String {
    let mut declarations = String::from(
        "#define gl_FragColor pc_fragColor\nout highp vec4 pc_fragColor;\n\
         uniform mat4 viewMatrix;\nuniform vec3 cameraPosition;\n",
    );

    let operator = match parameters.tone_mapping {
        ToneMapping::None => None,
        ToneMapping::Linear => Some("color"),
        ToneMapping::Reinhard => Some("clamp(color / (vec3(1.0) + color), 0.0, 1.0)"),
        ToneMapping::Cineon => Some("pow(max(vec3(0.0), color - 0.004) * (6.2 * max(vec3(0.0), color - 0.004) + 0.5) / (max(vec3(0.0), color - 0.004) * (6.2 * max(vec3(0.0), color - 0.004) + 1.7) + 0.06), vec3(2.2))"),
        ToneMapping::AcesFilmic => Some("clamp((color * (2.51 * color + 0.03)) / (color * (2.43 * color + 0.59) + 0.14), 0.0, 1.0)"),
        ToneMapping::AgX => Some("clamp(color / (color + vec3(0.155)) * 1.019, 0.0, 1.0)"),
        ToneMapping::Neutral => Some("color / max(1.0, max(color.r, max(color.g, color.b)))"),
    };
    if let Some(operator) = operator {
        let _ = writeln!(declarations, "#define TONE_MAPPING\nvec3 toneMapping(vec3 color) {{ return {operator}; }}");
    }

    let transfer = match parameters.output_color_space {
        ColorSpace::Linear => "value",
        ColorSpace::Srgb => {
            "vec4(mix(pow(value.rgb, vec3(0.41666)) * 1.055 - vec3(0.055), value.rgb * 12.92, \
             vec3(lessThanEqual(value.rgb, vec3(0.0031308)))), value.a)"
        }
    };
    let _ = writeln!(declarations, "vec4 linearToOutputTexel(vec4 value) {{ return {transfer}; }}");
    declarations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RendererConfig;
    use crate::foundation::math::Vec3;
    use crate::render::clipping::ClippingCounts;
    use crate::render::lighting::LightCounts;
    use crate::render::resources::materials::{Material, ShaderSource};
    use crate::render::resources::programs::parameters::{get_parameters, ObjectFeatures, ProgramContext};

    fn parameters_for(material: &Material, lights: LightCounts, object: ObjectFeatures) -> ProgramParameters {
        let config = RendererConfig::default();
        let context = ProgramContext { config: &config, lights, fog: None, environment: None };
        get_parameters(material, &context, ClippingCounts { planes: 2, intersection: 1 }, &object)
    }

    #[test]
    fn test_prefix_carries_features_and_counts() {
        let mut material = Material::lambert(Vec3::new(1.0, 1.0, 1.0));
        material.vertex_colors = true;
        let lights = LightCounts { directional: 2, point: 1, ..LightCounts::default() };
        let sources = build_sources(&parameters_for(&material, lights, ObjectFeatures::default())).unwrap();

        assert_eq!(sources.name, "lambert");
        assert!(sources.vertex.contains("#define USE_COLOR\n"));
        assert!(sources.vertex.contains("in vec3 color;"));
        assert!(sources.fragment.contains("#define NUM_DIR_LIGHTS 2"));
        assert!(sources.fragment.contains("#define NUM_POINT_LIGHTS 1"));
        assert!(sources.fragment.contains("#define UNION_CLIPPING_PLANES 1"));
        assert!(!sources.vertex.contains("#include"));
    }

    #[test]
    fn test_instancing_declares_the_matrix_input() {
        let material = Material::basic(Vec3::new(1.0, 1.0, 1.0));
        let object = ObjectFeatures { instancing: true, ..ObjectFeatures::default() };
        let sources = build_sources(&parameters_for(&material, LightCounts::default(), object)).unwrap();

        assert!(sources.vertex.contains("in mat4 instanceMatrix;"));
        assert!(sources.vertex.contains("#define USE_INSTANCING"));
    }

    #[test]
    fn test_raw_shader_skips_builtin_prefix() {
        let mut source = ShaderSource {
            vertex: "in vec3 position;\nvoid main() {}".to_string(),
            fragment: "void main() {}".to_string(),
            raw: true,
            ..ShaderSource::default()
        };
        source.defines.insert("WAVES".to_string(), "3".to_string());
        let sources = build_sources(&parameters_for(&Material::shader(source), LightCounts::default(), ObjectFeatures::default())).unwrap();

        assert!(sources.vertex.starts_with("#define WAVES 3\n"));
        assert!(!sources.vertex.contains("#version"));
    }

    #[test]
    fn test_failed_program_keeps_diagnostics() {
        let sources = ProgramSources { name: "x".into(), vertex: "v".into(), fragment: "f".into() };
        let mut program = Program::new("k".into(), ProgramHandle(1), sources, false);
        program.mark_failed("syntax error".into());

        assert_eq!(program.status(), CompileStatus::Failed);
        let diagnostics = program.diagnostics().unwrap();
        assert_eq!((diagnostics.vertex_source.as_str(), diagnostics.log.as_str()), ("v", "syntax error"));
    }
}
