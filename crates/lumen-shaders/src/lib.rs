//! lumen-shaders: WGSL shader sources.

/// Surface brush: draws a sub-rectangle of the atlas texture as a quad.
///
/// `dst` is the target rectangle in clip space (x0, y0, x1, y1), `uv` the
/// source rectangle in normalized atlas coordinates. Drawn as a 4-vertex
/// triangle strip with no vertex buffer.
pub const BRUSH_WGSL: &str = r#"
struct BrushUniform {
    dst: vec4<f32>,
    uv: vec4<f32>,
};

@group(0) @binding(0) var<uniform> brush: BrushUniform;
@group(0) @binding(1) var atlas_tex: texture_2d<f32>;
@group(0) @binding(2) var atlas_samp: sampler;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> VsOut {
    // Strip order: (0,0) (1,0) (0,1) (1,1)
    let corner = vec2<f32>(f32(idx & 1u), f32(idx >> 1u));
    var out: VsOut;
    out.pos = vec4<f32>(mix(brush.dst.xy, brush.dst.zw, corner), 0.0, 1.0);
    out.uv = mix(brush.uv.xy, brush.uv.zw, corner);
    return out;
}

@fragment
fn fs_main(inp: VsOut) -> @location(0) vec4<f32> {
    return textureSample(atlas_tex, atlas_samp, inp.uv);
}
"#;
