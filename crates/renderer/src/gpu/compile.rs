use std::borrow::Cow;

use wgpu::naga::ShaderStage;

/// Compiles GLSL 450 through naga and surfaces validation failures as an
/// error string instead of a device error.
pub(crate) fn compile_glsl(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_owned()),
            stage,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(err.to_string()),
        None => Ok(module),
    }
}

/// Full-screen triangle shared by every post-processing pass.
pub(crate) const FULLSCREEN_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    vec2 pos = positions[uint(gl_VertexIndex)];
    v_uv = vec2(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

const POST_PRELUDE: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(set = 0, binding = 0) uniform texture2D u_source;
layout(set = 0, binding = 1) uniform sampler u_sampler;
layout(set = 0, binding = 2) uniform texture2D u_bloom;
layout(std140, set = 0, binding = 3) uniform PostParams {
    vec2 texel;
    vec2 direction;
    float threshold;
    float strength;
    float radius;
    float _pad;
} params;
";

const THRESHOLD_BODY: &str = r"
void main() {
    vec4 color = texture(sampler2D(u_source, u_sampler), v_uv);
    float luma = dot(color.rgb, vec3(0.2126, 0.7152, 0.0722));
    float weight = smoothstep(params.threshold, params.threshold + 0.1, luma);
    outColor = vec4(color.rgb * weight, 1.0);
}
";

const BLUR_BODY: &str = r"
const float WEIGHTS[5] = float[5](0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216);

void main() {
    vec2 stride = params.texel * params.direction * (1.0 + params.radius * 2.0);
    vec3 sum = texture(sampler2D(u_source, u_sampler), v_uv).rgb * WEIGHTS[0];
    for (int i = 1; i < 5; ++i) {
        vec2 offset = stride * float(i);
        sum += texture(sampler2D(u_source, u_sampler), v_uv + offset).rgb * WEIGHTS[i];
        sum += texture(sampler2D(u_source, u_sampler), v_uv - offset).rgb * WEIGHTS[i];
    }
    outColor = vec4(sum, 1.0);
}
";

const COMPOSITE_BODY: &str = r"
void main() {
    vec4 scene = texture(sampler2D(u_source, u_sampler), v_uv);
    vec3 glow = texture(sampler2D(u_bloom, u_sampler), v_uv).rgb * params.strength;
    float alpha = clamp(max(scene.a, dot(glow, vec3(0.3333))), 0.0, 1.0);
    outColor = vec4(scene.rgb + glow, alpha);
}
";

pub(crate) fn threshold_fragment() -> String {
    format!("{POST_PRELUDE}{THRESHOLD_BODY}")
}

pub(crate) fn blur_fragment() -> String {
    format!("{POST_PRELUDE}{BLUR_BODY}")
}

pub(crate) fn composite_fragment() -> String {
    format!("{POST_PRELUDE}{COMPOSITE_BODY}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_shaders_keep_version_first() {
        for source in [threshold_fragment(), blur_fragment(), composite_fragment()] {
            assert!(source.starts_with("#version 450"));
            assert_eq!(source.matches("#version").count(), 1);
            assert!(source.contains("void main()"));
        }
    }
}
