//! Built-in shader library
//!
//! Each built-in program is a vertex/fragment pair assembled from shared
//! chunks through `#include <name>` lines. Feature switches are plain
//! preprocessor conditionals driven by the defines in the program prefix.

use super::ProgramError;

const MAX_INCLUDE_DEPTH: usize = 16;

/// Look up a chunk by name
pub fn chunk(name: &str) -> Option<&'static str> {
    let source = match name {
        "common" => COMMON,
        "uv_pars_vertex" => "#ifdef USE_UV\nout vec2 vUv;\nuniform mat3 mapTransform;\n#endif",
        "uv_vertex" => "#ifdef USE_UV\n#ifdef USE_MAP_TRANSFORM\nvUv = (mapTransform * vec3(uv, 1.0)).xy;\n#else\nvUv = uv;\n#endif\n#endif",
        "uv_pars_fragment" => "#ifdef USE_UV\nin vec2 vUv;\n#endif",
        "color_pars_vertex" => "#if defined(USE_COLOR_ALPHA)\nout vec4 vColor;\n#elif defined(USE_COLOR)\nout vec3 vColor;\n#endif",
        "color_vertex" => "#if defined(USE_COLOR_ALPHA)\nvColor = color;\n#elif defined(USE_COLOR)\nvColor = color.rgb;\n#endif",
        "color_pars_fragment" => "#if defined(USE_COLOR_ALPHA)\nin vec4 vColor;\n#elif defined(USE_COLOR)\nin vec3 vColor;\n#endif",
        "color_fragment" => "#if defined(USE_COLOR_ALPHA)\ndiffuseColor *= vColor;\n#elif defined(USE_COLOR)\ndiffuseColor.rgb *= vColor;\n#endif",
        "morphtarget_pars_vertex" => "#ifdef USE_MORPHTARGETS\nuniform float morphTargetBaseInfluence;\nuniform float morphTargetInfluences[MORPHTARGETS_COUNT];\n#endif",
        "morphtarget_vertex" => MORPH_VERTEX,
        "skinning_pars_vertex" => "#ifdef USE_SKINNING\nuniform mat4 bindMatrix;\nuniform mat4 bindMatrixInverse;\nuniform sampler2D boneTexture;\n#endif",
        "skinning_vertex" => SKINNING_VERTEX,
        "beginnormal_vertex" => "vec3 objectNormal = vec3(normal);",
        "defaultnormal_vertex" => DEFAULT_NORMAL_VERTEX,
        "begin_vertex" => "vec3 transformed = vec3(position);",
        "project_vertex" => PROJECT_VERTEX,
        "worldpos_vertex" => "vec4 worldPosition = modelMatrix * vec4(transformed, 1.0);",
        "clipping_planes_pars_vertex" => "#if NUM_CLIPPING_PLANES > 0\nout vec3 vClipPosition;\n#endif",
        "clipping_planes_vertex" => "#if NUM_CLIPPING_PLANES > 0\nvClipPosition = -mvPosition.xyz;\n#endif",
        "clipping_planes_pars_fragment" => "#if NUM_CLIPPING_PLANES > 0\nin vec3 vClipPosition;\nuniform vec4 clippingPlanes[NUM_CLIPPING_PLANES];\n#endif",
        "clipping_planes_fragment" => CLIPPING_FRAGMENT,
        "fog_pars_vertex" => "#ifdef USE_FOG\nout float vFogDepth;\n#endif",
        "fog_vertex" => "#ifdef USE_FOG\nvFogDepth = -mvPosition.z;\n#endif",
        "fog_pars_fragment" => FOG_PARS_FRAGMENT,
        "fog_fragment" => FOG_FRAGMENT,
        "map_pars_fragment" => "#ifdef USE_MAP\nuniform sampler2D map;\n#endif",
        "map_fragment" => "#ifdef USE_MAP\ndiffuseColor *= texture(map, vUv);\n#endif",
        "alphamap_pars_fragment" => "#ifdef USE_ALPHAMAP\nuniform sampler2D alphaMap;\n#endif",
        "alphamap_fragment" => "#ifdef USE_ALPHAMAP\ndiffuseColor.a *= texture(alphaMap, vUv).g;\n#endif",
        "alphatest_pars_fragment" => "#ifdef USE_ALPHATEST\nuniform float alphaTest;\n#endif",
        "alphatest_fragment" => "#ifdef USE_ALPHATEST\nif (diffuseColor.a < alphaTest) discard;\n#endif",
        "emissivemap_pars_fragment" => "#ifdef USE_EMISSIVEMAP\nuniform sampler2D emissiveMap;\n#endif",
        "emissivemap_fragment" => "#ifdef USE_EMISSIVEMAP\ntotalEmissiveRadiance *= texture(emissiveMap, vUv).rgb;\n#endif",
        "envmap_pars_fragment" => "#ifdef USE_ENVMAP\nuniform samplerCube envMap;\nuniform float reflectivity;\nuniform float refractionRatio;\n#endif",
        "envmap_fragment" => ENVMAP_FRAGMENT,
        "normal_pars_fragment" => "in vec3 vNormal;",
        "normal_fragment" => NORMAL_FRAGMENT,
        "lights_pars_begin" => LIGHTS_PARS,
        "lights_fragment_begin" => LIGHTS_FRAGMENT,
        "shadowmap_pars_fragment" => "#ifdef USE_SHADOWMAP\nuniform sampler2D directionalShadowMap[NUM_DIR_LIGHT_SHADOWS];\n#endif",
        "premultiplied_alpha_fragment" => "#ifdef PREMULTIPLIED_ALPHA\ngl_FragColor.rgb *= gl_FragColor.a;\n#endif",
        "tonemapping_pars_fragment" => "uniform float toneMappingExposure;",
        "tonemapping_fragment" => "#ifdef TONE_MAPPING\ngl_FragColor.rgb = toneMapping(gl_FragColor.rgb * toneMappingExposure);\n#endif",
        "colorspace_fragment" => "gl_FragColor = linearToOutputTexel(gl_FragColor);",
        "dithering_fragment" => "#ifdef DITHERING\ngl_FragColor.rgb = dithering(gl_FragColor.rgb);\n#endif",
        "output_fragment" => "gl_FragColor = vec4(outgoingLight, diffuseColor.a);",
        _ => return None,
    };
    Some(source)
}

/// Vertex and fragment bodies of a built-in program
pub fn shader(id: &str) -> Option<(&'static str, &'static str)> {
    let pair = match id {
        "basic" => (MESH_VERTEX, BASIC_FRAGMENT),
        "lambert" | "phong" | "standard" | "physical" => (MESH_VERTEX, LIT_FRAGMENT),
        "normal" => (MESH_VERTEX, NORMAL_ONLY_FRAGMENT),
        "depth" => (MESH_VERTEX, DEPTH_FRAGMENT),
        "dashed" => (DASHED_VERTEX, DASHED_FRAGMENT),
        "points" => (POINTS_VERTEX, BASIC_FRAGMENT),
        "sprite" => (SPRITE_VERTEX, BASIC_FRAGMENT),
        _ => return None,
    };
    Some(pair)
}

/// Replace every `#include <name>` line with its chunk, recursively
pub fn resolve_includes(source: &str) -> Result<String, ProgramError> {
    resolve(source, 0)
}

fn resolve(source: &str, depth: usize) -> Result<String, ProgramError> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(ProgramError::IncludeDepthExceeded);
    }

    let mut resolved = String::with_capacity(source.len());
    for line in source.lines() {
        let include = line
            .trim()
            .strip_prefix("#include")
            .map(str::trim)
            .and_then(|rest| rest.strip_prefix('<'))
            .and_then(|rest| rest.strip_suffix('>'));

        match include {
            Some(name) => {
                let body = chunk(name).ok_or_else(|| ProgramError::MissingChunk(name.to_string()))?;
                resolved.push_str(&resolve(body, depth + 1)?);
            }
            None => resolved.push_str(line),
        }
        resolved.push('\n');
    }
    Ok(resolved)
}

const COMMON: &str = "#define PI 3.141592653589793
#define saturate(a) clamp(a, 0.0, 1.0)
float pow2(const in float x) { return x * x; }
vec3 inverseTransformDirection(in vec3 dir, in mat4 matrix) {
    return normalize((vec4(dir, 0.0) * matrix).xyz);
}";

const MORPH_VERTEX: &str = "#ifdef USE_MORPHTARGETS
#ifndef MORPHTARGETS_RELATIVE
transformed *= 1.0 - morphTargetBaseInfluence;
#endif
for (int i = 0; i < MORPHTARGETS_COUNT; i++) {
    transformed += getMorph(gl_VertexID, i) * morphTargetInfluences[i];
}
#endif";

const SKINNING_VERTEX: &str = "#ifdef USE_SKINNING
vec4 skinVertex = bindMatrix * vec4(transformed, 1.0);
vec4 skinned = getBoneMatrix(skinIndex.x) * skinVertex * skinWeight.x;
skinned += getBoneMatrix(skinIndex.y) * skinVertex * skinWeight.y;
skinned += getBoneMatrix(skinIndex.z) * skinVertex * skinWeight.z;
skinned += getBoneMatrix(skinIndex.w) * skinVertex * skinWeight.w;
transformed = (bindMatrixInverse * skinned).xyz;
#endif";

const DEFAULT_NORMAL_VERTEX: &str = "vec3 transformedNormal = objectNormal;
#ifdef USE_INSTANCING
transformedNormal = mat3(instanceMatrix) * transformedNormal;
#endif
transformedNormal = normalMatrix * transformedNormal;
#ifdef FLIP_SIDED
transformedNormal = -transformedNormal;
#endif";

const PROJECT_VERTEX: &str = "vec4 mvPosition = vec4(transformed, 1.0);
#ifdef USE_INSTANCING
mvPosition = instanceMatrix * mvPosition;
#endif
mvPosition = modelViewMatrix * mvPosition;
gl_Position = projectionMatrix * mvPosition;";

const CLIPPING_FRAGMENT: &str = "#if NUM_CLIPPING_PLANES > 0
for (int i = 0; i < UNION_CLIPPING_PLANES; i++) {
    vec4 plane = clippingPlanes[i];
    if (dot(vClipPosition, plane.xyz) > plane.w) discard;
}
#if UNION_CLIPPING_PLANES < NUM_CLIPPING_PLANES
bool clipped = true;
for (int i = UNION_CLIPPING_PLANES; i < NUM_CLIPPING_PLANES; i++) {
    vec4 plane = clippingPlanes[i];
    clipped = (dot(vClipPosition, plane.xyz) > plane.w) && clipped;
}
if (clipped) discard;
#endif
#endif";

const FOG_PARS_FRAGMENT: &str = "#ifdef USE_FOG
uniform vec3 fogColor;
in float vFogDepth;
#ifdef FOG_EXP2
uniform float fogDensity;
#else
uniform float fogNear;
uniform float fogFar;
#endif
#endif";

const FOG_FRAGMENT: &str = "#ifdef USE_FOG
#ifdef FOG_EXP2
float fogFactor = 1.0 - exp(-fogDensity * fogDensity * vFogDepth * vFogDepth);
#else
float fogFactor = smoothstep(fogNear, fogFar, vFogDepth);
#endif
gl_FragColor.rgb = mix(gl_FragColor.rgb, fogColor, fogFactor);
#endif";

const ENVMAP_FRAGMENT: &str = "#ifdef USE_ENVMAP
#ifdef ENVMAP_MODE_REFRACTION
vec3 envDir = refract(normalize(vViewPosition), normal, refractionRatio);
#else
vec3 envDir = reflect(normalize(vViewPosition), normal);
#endif
outgoingLight = mix(outgoingLight, texture(envMap, envDir).rgb, reflectivity);
#endif";

const NORMAL_FRAGMENT: &str = "#ifdef FLAT_SHADED
vec3 normal = normalize(cross(dFdx(vViewPosition), dFdy(vViewPosition)));
#else
vec3 normal = normalize(vNormal);
#ifdef DOUBLE_SIDED
normal *= gl_FrontFacing ? 1.0 : -1.0;
#endif
#endif";

const LIGHTS_PARS: &str = "uniform vec3 ambientLightColor;
#if NUM_DIR_LIGHTS > 0
struct DirectionalLight { vec3 direction; vec3 color; };
uniform DirectionalLight directionalLights[NUM_DIR_LIGHTS];
#endif
#if NUM_POINT_LIGHTS > 0
struct PointLight { vec3 position; vec3 color; float distance; float decay; };
uniform PointLight pointLights[NUM_POINT_LIGHTS];
#endif
#if NUM_SPOT_LIGHTS > 0
struct SpotLight { vec3 position; vec3 direction; vec3 color; float distance; float decay; float coneCos; float penumbraCos; };
uniform SpotLight spotLights[NUM_SPOT_LIGHTS];
#endif
#if NUM_HEMI_LIGHTS > 0
struct HemisphereLight { vec3 direction; vec3 skyColor; vec3 groundColor; };
uniform HemisphereLight hemisphereLights[NUM_HEMI_LIGHTS];
#endif
#if NUM_RECT_AREA_LIGHTS > 0
struct RectAreaLight { vec3 color; vec3 position; vec3 halfWidth; vec3 halfHeight; };
uniform RectAreaLight rectAreaLights[NUM_RECT_AREA_LIGHTS];
#endif";

const LIGHTS_FRAGMENT: &str = "vec3 irradiance = ambientLightColor;
#if NUM_DIR_LIGHTS > 0
for (int i = 0; i < NUM_DIR_LIGHTS; i++) {
    irradiance += saturate(dot(normal, directionalLights[i].direction)) * directionalLights[i].color;
}
#endif
#if NUM_POINT_LIGHTS > 0
for (int i = 0; i < NUM_POINT_LIGHTS; i++) {
    vec3 toLight = pointLights[i].position - vViewPosition;
    irradiance += saturate(dot(normal, normalize(toLight))) * pointLights[i].color;
}
#endif
#if NUM_HEMI_LIGHTS > 0
for (int i = 0; i < NUM_HEMI_LIGHTS; i++) {
    float w = 0.5 * dot(normal, hemisphereLights[i].direction) + 0.5;
    irradiance += mix(hemisphereLights[i].groundColor, hemisphereLights[i].skyColor, w);
}
#endif";

const MESH_VERTEX: &str = "#include <common>
#include <uv_pars_vertex>
#include <color_pars_vertex>
#include <morphtarget_pars_vertex>
#include <skinning_pars_vertex>
#include <fog_pars_vertex>
#include <clipping_planes_pars_vertex>
out vec3 vNormal;
out vec3 vViewPosition;
void main() {
#include <uv_vertex>
#include <color_vertex>
#include <beginnormal_vertex>
#include <defaultnormal_vertex>
#include <begin_vertex>
#include <morphtarget_vertex>
#include <skinning_vertex>
#include <project_vertex>
#include <clipping_planes_vertex>
#include <fog_vertex>
    vNormal = normalize(transformedNormal);
    vViewPosition = -mvPosition.xyz;
}";

const BASIC_FRAGMENT: &str = "#include <common>
uniform vec3 diffuse;
uniform float opacity;
#include <uv_pars_fragment>
#include <color_pars_fragment>
#include <map_pars_fragment>
#include <alphamap_pars_fragment>
#include <alphatest_pars_fragment>
#include <fog_pars_fragment>
#include <clipping_planes_pars_fragment>
#include <tonemapping_pars_fragment>
void main() {
#include <clipping_planes_fragment>
    vec4 diffuseColor = vec4(diffuse, opacity);
#include <map_fragment>
#include <color_fragment>
#include <alphamap_fragment>
#include <alphatest_fragment>
    vec3 outgoingLight = diffuseColor.rgb;
#include <output_fragment>
#include <tonemapping_fragment>
#include <colorspace_fragment>
#include <fog_fragment>
#include <premultiplied_alpha_fragment>
#include <dithering_fragment>
}";

const LIT_FRAGMENT: &str = "#include <common>
uniform vec3 diffuse;
uniform vec3 emissive;
uniform float opacity;
in vec3 vViewPosition;
#include <uv_pars_fragment>
#include <color_pars_fragment>
#include <map_pars_fragment>
#include <alphamap_pars_fragment>
#include <alphatest_pars_fragment>
#include <emissivemap_pars_fragment>
#include <envmap_pars_fragment>
#include <normal_pars_fragment>
#include <lights_pars_begin>
#include <shadowmap_pars_fragment>
#include <fog_pars_fragment>
#include <clipping_planes_pars_fragment>
#include <tonemapping_pars_fragment>
void main() {
#include <clipping_planes_fragment>
    vec4 diffuseColor = vec4(diffuse, opacity);
    vec3 totalEmissiveRadiance = emissive;
#include <map_fragment>
#include <color_fragment>
#include <alphamap_fragment>
#include <alphatest_fragment>
#include <normal_fragment>
#include <emissivemap_fragment>
#include <lights_fragment_begin>
    vec3 outgoingLight = diffuseColor.rgb * irradiance + totalEmissiveRadiance;
#include <envmap_fragment>
#include <output_fragment>
#include <tonemapping_fragment>
#include <colorspace_fragment>
#include <fog_fragment>
#include <premultiplied_alpha_fragment>
#include <dithering_fragment>
}";

const NORMAL_ONLY_FRAGMENT: &str = "uniform float opacity;
#include <normal_pars_fragment>
in vec3 vViewPosition;
#include <clipping_planes_pars_fragment>
void main() {
#include <clipping_planes_fragment>
#include <normal_fragment>
    gl_FragColor = vec4(normal * 0.5 + 0.5, opacity);
}";

const DEPTH_FRAGMENT: &str = "in vec3 vViewPosition;
#include <clipping_planes_pars_fragment>
void main() {
#include <clipping_planes_fragment>
    gl_FragColor = vec4(vec3(1.0 - gl_FragCoord.z), 1.0);
}";

const DASHED_VERTEX: &str = "#include <common>
uniform float scale;
out float vLineDistance;
#include <color_pars_vertex>
#include <fog_pars_vertex>
#include <clipping_planes_pars_vertex>
void main() {
    vLineDistance = scale * lineDistance;
#include <color_vertex>
#include <begin_vertex>
#include <project_vertex>
#include <clipping_planes_vertex>
#include <fog_vertex>
}";

const DASHED_FRAGMENT: &str = "uniform vec3 diffuse;
uniform float opacity;
uniform float dashSize;
uniform float totalSize;
in float vLineDistance;
#include <color_pars_fragment>
#include <fog_pars_fragment>
#include <clipping_planes_pars_fragment>
void main() {
#include <clipping_planes_fragment>
    if (mod(vLineDistance, totalSize) > dashSize) discard;
    vec4 diffuseColor = vec4(diffuse, opacity);
#include <color_fragment>
    vec3 outgoingLight = diffuseColor.rgb;
#include <output_fragment>
#include <colorspace_fragment>
#include <fog_fragment>
}";

const POINTS_VERTEX: &str = "uniform float size;
uniform float pixelScale;
#include <color_pars_vertex>
#include <fog_pars_vertex>
#include <clipping_planes_pars_vertex>
void main() {
#include <color_vertex>
#include <begin_vertex>
#include <project_vertex>
    gl_PointSize = size;
#ifdef USE_SIZEATTENUATION
    if (projectionMatrix[2][3] == -1.0) gl_PointSize *= pixelScale / -mvPosition.z;
#endif
#include <clipping_planes_vertex>
#include <fog_vertex>
}";

const SPRITE_VERTEX: &str = "uniform float rotation;
uniform vec2 center;
#include <uv_pars_vertex>
#include <fog_pars_vertex>
#include <clipping_planes_pars_vertex>
void main() {
#include <uv_vertex>
    vec4 mvPosition = modelViewMatrix * vec4(0.0, 0.0, 0.0, 1.0);
    vec2 scale = vec2(length(modelMatrix[0].xyz), length(modelMatrix[1].xyz));
#ifndef USE_SIZEATTENUATION
    if (projectionMatrix[2][3] == -1.0) scale *= -mvPosition.z;
#endif
    vec2 aligned = (position.xy - (center - vec2(0.5))) * scale;
    vec2 rotated = vec2(cos(rotation) * aligned.x - sin(rotation) * aligned.y, sin(rotation) * aligned.x + cos(rotation) * aligned.y);
    mvPosition.xy += rotated;
    gl_Position = projectionMatrix * mvPosition;
#include <clipping_planes_vertex>
#include <fog_vertex>
}";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_resolves() {
        for id in ["basic", "lambert", "phong", "standard", "physical", "normal", "depth", "dashed", "points", "sprite"] {
            let (vertex, fragment) = shader(id).unwrap();
            let vertex = resolve_includes(vertex).unwrap();
            let fragment = resolve_includes(fragment).unwrap();
            assert!(!vertex.contains("#include"), "{id} vertex");
            assert!(!fragment.contains("#include"), "{id} fragment");
        }
    }

    #[test]
    fn test_missing_chunk_is_reported() {
        assert_eq!(
            resolve_includes("#include <no_such_chunk>"),
            Err(ProgramError::MissingChunk("no_such_chunk".to_string()))
        );
    }

    #[test]
    fn test_include_inside_function_body() {
        let resolved = resolve_includes("void main() {\n#include <fog_vertex>\n}").unwrap();
        assert!(resolved.contains("vFogDepth = -mvPosition.z;"));
    }
}
