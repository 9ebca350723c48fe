//! WGSL sources for every GPU pass.
//!
//! All shaders share the `Frame` uniform block, mirrored on the Rust side by
//! [`FrameUniform`](super::pipelines::FrameUniform), and the fullscreen
//! triangle vertex stage.

macro_rules! frame_block {
    () => {
        r#"
struct Frame {
    view_proj: mat4x4<f32>,
    inv_view_proj: mat4x4<f32>,
    view: mat4x4<f32>,
    // xyz = camera position, w = near
    camera_position: vec4<f32>,
    // xyz = camera right, w = far
    camera_right: vec4<f32>,
    // xyz = camera up, w = projection y scale
    camera_up: vec4<f32>,
    // width, height, exposure, time
    screen: vec4<f32>,
    // glitch, lut size, depth bias, unused
    post: vec4<f32>,
    // seed, frame index
    flags: vec4<u32>,
};

struct FullscreenOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> FullscreenOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: FullscreenOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

struct InstanceInput {
    @location(5) m0: vec4<f32>,
    @location(6) m1: vec4<f32>,
    @location(7) m2: vec4<f32>,
    @location(8) m3: vec4<f32>,
};

fn instance_matrix(inst: InstanceInput) -> mat4x4<f32> {
    return mat4x4<f32>(inst.m0, inst.m1, inst.m2, inst.m3);
}
"#
    };
}

/// Depth-only cascade rendering.
pub const SHADOW: &str = concat!(
    frame_block!(),
    r#"
@group(0) @binding(0) var<uniform> light_view_proj: mat4x4<f32>;

@vertex
fn vs_shadow_mesh(@location(0) position: vec3<f32>, inst: InstanceInput) -> @builtin(position) vec4<f32> {
    return light_view_proj * instance_matrix(inst) * vec4<f32>(position, 1.0);
}

@vertex
fn vs_shadow_terrain(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return light_view_proj * vec4<f32>(position, 1.0);
}
"#
);

macro_rules! gbuffer_block {
    () => {
        r#"
@group(0) @binding(0) var<uniform> frame: Frame;

struct SurfaceOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) weights: vec4<f32>,
};

struct GBufferOutput {
    @location(0) albedo: vec4<f32>,
    @location(1) normal: vec4<f32>,
    // Reverse-Z depth mirrored into a color target so later passes can
    // read it with a plain textureLoad on every backend.
    @location(2) depth: f32,
};
"#
    };
}

/// G-buffer fill for instanced meshes.
pub const GEOMETRY_MESH: &str = concat!(
    frame_block!(),
    gbuffer_block!(),
    r#"
@group(1) @binding(0) var albedo_tex: texture_2d<f32>;
@group(1) @binding(1) var albedo_sampler: sampler;

@vertex
fn vs_mesh(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    inst: InstanceInput,
) -> SurfaceOutput {
    let model = instance_matrix(inst);
    let m = mat3x3<f32>(model[0].xyz, model[1].xyz, model[2].xyz);
    // Cofactor matrix: the inverse transpose up to the determinant.
    let cof = mat3x3<f32>(cross(m[1], m[2]), cross(m[2], m[0]), cross(m[0], m[1]));
    let det_sign = select(-1.0, 1.0, dot(m[0], cof[0]) >= 0.0);
    var out: SurfaceOutput;
    out.clip = frame.view_proj * model * vec4<f32>(position, 1.0);
    out.normal = cof * normal * det_sign;
    out.uv = uv;
    out.weights = vec4<f32>(0.0);
    return out;
}

@fragment
fn fs_mesh(in: SurfaceOutput) -> GBufferOutput {
    var out: GBufferOutput;
    out.albedo = vec4<f32>(textureSample(albedo_tex, albedo_sampler, in.uv).rgb, 1.0);
    out.normal = vec4<f32>(normalize(in.normal), 1.0);
    out.depth = in.clip.z;
    return out;
}
"#
);

/// G-buffer fill for terrain nodes, blending four ground textures.
pub const GEOMETRY_TERRAIN: &str = concat!(
    frame_block!(),
    gbuffer_block!(),
    r#"
@group(1) @binding(0) var ground0: texture_2d<f32>;
@group(1) @binding(1) var ground1: texture_2d<f32>;
@group(1) @binding(2) var ground2: texture_2d<f32>;
@group(1) @binding(3) var ground3: texture_2d<f32>;
@group(1) @binding(4) var ground_sampler: sampler;
// x = ground texture tiling
@group(1) @binding(5) var<uniform> terrain: vec4<f32>;

@vertex
fn vs_terrain(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) weights: vec4<f32>,
) -> SurfaceOutput {
    var out: SurfaceOutput;
    out.clip = frame.view_proj * vec4<f32>(position, 1.0);
    out.normal = normal;
    out.uv = uv;
    out.weights = weights;
    return out;
}

@fragment
fn fs_terrain(in: SurfaceOutput) -> GBufferOutput {
    let uv = in.uv * terrain.x;
    let c0 = textureSample(ground0, ground_sampler, uv).rgb;
    let c1 = textureSample(ground1, ground_sampler, uv).rgb;
    let c2 = textureSample(ground2, ground_sampler, uv).rgb;
    let c3 = textureSample(ground3, ground_sampler, uv).rgb;
    let total = in.weights.x + in.weights.y + in.weights.z + in.weights.w;
    var albedo = c0;
    if (total > 0.0) {
        let w = in.weights / total;
        albedo = c0 * w.x + c1 * w.y + c2 * w.z + c3 * w.w;
    }
    var out: GBufferOutput;
    out.albedo = vec4<f32>(albedo, 1.0);
    out.normal = vec4<f32>(normalize(in.normal), 1.0);
    out.depth = in.clip.z;
    return out;
}
"#
);

/// Screen-space ambient occlusion.
pub const OCCLUSION: &str = concat!(
    frame_block!(),
    r#"
struct Ssao {
    samples: array<vec4<f32>, 64>,
    noise: array<vec4<f32>, 16>,
    // radius, strength, sample count, enabled
    params: vec4<f32>,
};

@group(0) @binding(0) var<uniform> frame: Frame;
@group(0) @binding(1) var<uniform> ssao: Ssao;
@group(1) @binding(0) var normal_tex: texture_2d<f32>;
@group(1) @binding(1) var depth_tex: texture_2d<f32>;

fn world_at(pixel: vec2<i32>, depth: f32) -> vec3<f32> {
    let dims = vec2<f32>(textureDimensions(depth_tex));
    let uv = (vec2<f32>(pixel) + 0.5) / dims;
    let ndc = vec2<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
    let p = frame.inv_view_proj * vec4<f32>(ndc, depth, 1.0);
    return p.xyz / p.w;
}

fn view_depth(p: vec3<f32>) -> f32 {
    return -(frame.view * vec4<f32>(p, 1.0)).z;
}

@fragment
fn fs_occlusion(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(in.position.xy);
    let depth = textureLoad(depth_tex, pixel, 0).r;
    if (ssao.params.w < 0.5 || depth <= 0.0) {
        return vec4<f32>(1.0);
    }
    let p = world_at(pixel, depth);
    let n = normalize(textureLoad(normal_tex, pixel, 0).xyz);
    let rot = ssao.noise[(u32(pixel.y) % 4u) * 4u + u32(pixel.x) % 4u].xy;
    let r = vec3<f32>(rot, 0.0);
    var tangent = r - n * dot(n, r);
    if (length(tangent) < 1e-4) {
        tangent = cross(n, select(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, 1.0, 0.0), abs(n.x) > 0.9));
    }
    tangent = normalize(tangent);
    let bitangent = cross(n, tangent);
    let dims = vec2<f32>(textureDimensions(depth_tex));
    let p_depth = view_depth(p);
    let count = u32(ssao.params.z);

    var occluded = 0.0;
    for (var i = 0u; i < count; i++) {
        let s = ssao.samples[i].xyz;
        let sample_pos = p + (tangent * s.x + bitangent * s.y + n * s.z) * ssao.params.x;
        let clip = frame.view_proj * vec4<f32>(sample_pos, 1.0);
        if (clip.w <= 1e-5) {
            continue;
        }
        let ndc = clip.xyz / clip.w;
        let screen = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5) * dims;
        if (any(screen < vec2<f32>(0.0)) || any(screen >= dims)) {
            continue;
        }
        let sp = vec2<i32>(screen);
        let scene_depth = textureLoad(depth_tex, sp, 0).r;
        if (scene_depth <= 0.0 || scene_depth <= ndc.z + 1e-6) {
            continue;
        }
        let gap = max(abs(p_depth - view_depth(world_at(sp, scene_depth))), 1e-6);
        occluded += smoothstep(0.0, 1.0, ssao.params.x / gap);
    }
    let ao = clamp(1.0 - ssao.params.y * occluded / f32(max(count, 1u)), 0.0, 1.0);
    return vec4<f32>(ao, ao, ao, 1.0);
}
"#
);

/// Deferred lighting, sky and sun shadows.
pub const LIGHTING: &str = concat!(
    frame_block!(),
    r#"
struct Shadow {
    light_matrices: array<mat4x4<f32>, 3>,
    cascade_ends: vec4<f32>,
    params: vec4<f32>,
};

struct Light {
    position_radius: vec4<f32>,
    color_power: vec4<f32>,
};

struct Lights {
    lights: array<Light, 13>,
    count: vec4<u32>,
};

struct Sky {
    sun_direction: vec4<f32>,
    sun_color: vec4<f32>,
    ambient: vec4<f32>,
    zenith: vec4<f32>,
    horizon: vec4<f32>,
    flags: vec4<f32>,
};

@group(0) @binding(0) var<uniform> frame: Frame;
@group(0) @binding(1) var<uniform> shadow: Shadow;
@group(0) @binding(2) var<uniform> lights: Lights;
@group(0) @binding(3) var<uniform> sky: Sky;

@group(1) @binding(0) var albedo_tex: texture_2d<f32>;
@group(1) @binding(1) var normal_tex: texture_2d<f32>;
@group(1) @binding(2) var depth_tex: texture_2d<f32>;
@group(1) @binding(3) var occlusion_tex: texture_2d<f32>;

@group(2) @binding(0) var shadow_map0: texture_depth_2d;
@group(2) @binding(1) var shadow_map1: texture_depth_2d;
@group(2) @binding(2) var shadow_map2: texture_depth_2d;
@group(2) @binding(3) var shadow_sampler: sampler_comparison;

fn attenuation(distance: f32, radius: f32) -> f32 {
    if (distance >= radius) {
        return 0.0;
    }
    let inv_sq = 1.0 / (distance * distance + 1.0);
    let ratio = distance / radius;
    let t = max(1.0 - ratio * ratio, 0.0);
    return inv_sq * t * t;
}

fn sky_color(dir: vec3<f32>) -> vec3<f32> {
    var base: vec3<f32>;
    if (dir.y >= 0.0) {
        base = mix(sky.horizon.rgb, sky.zenith.rgb, sqrt(dir.y));
    } else {
        base = sky.horizon.rgb * max(1.0 + dir.y, 0.0) * 0.5;
    }
    let glow = pow(max(dot(dir, sky.sun_direction.xyz), 0.0), 256.0);
    return base + sky.sun_color.rgb * glow;
}

fn select_cascade(view_depth: f32) -> u32 {
    for (var i = 0u; i < 2u; i++) {
        if (view_depth <= shadow.cascade_ends[i]) {
            return i;
        }
    }
    return 2u;
}

fn shadow_visibility(world: vec3<f32>, view_depth: f32) -> f32 {
    let index = select_cascade(view_depth);
    let clip = shadow.light_matrices[index] * vec4<f32>(world, 1.0);
    let ndc = clip.xyz / clip.w;
    if (abs(ndc.x) > 1.0 || abs(ndc.y) > 1.0 || ndc.z < 0.0 || ndc.z > 1.0) {
        return 1.0;
    }
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    let reference = ndc.z + shadow.params.x;
    if (index == 0u) {
        return textureSampleCompareLevel(shadow_map0, shadow_sampler, uv, reference);
    } else if (index == 1u) {
        return textureSampleCompareLevel(shadow_map1, shadow_sampler, uv, reference);
    }
    return textureSampleCompareLevel(shadow_map2, shadow_sampler, uv, reference);
}

@fragment
fn fs_lighting(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(in.position.xy);
    let depth = textureLoad(depth_tex, pixel, 0).r;
    let ndc = vec2<f32>(in.uv.x * 2.0 - 1.0, 1.0 - in.uv.y * 2.0);
    if (depth <= 0.0) {
        if (sky.flags.x < 0.5) {
            return vec4<f32>(0.0, 0.0, 0.0, 1.0);
        }
        let near = frame.inv_view_proj * vec4<f32>(ndc, 1.0, 1.0);
        let dir = normalize(near.xyz / near.w - frame.camera_position.xyz);
        return vec4<f32>(sky_color(dir), 1.0);
    }
    let h = frame.inv_view_proj * vec4<f32>(ndc, depth, 1.0);
    let p = h.xyz / h.w;
    let n = normalize(textureLoad(normal_tex, pixel, 0).xyz);
    let albedo = textureLoad(albedo_tex, pixel, 0).rgb;
    let ao = textureLoad(occlusion_tex, pixel, 0).r;

    var color = sky.ambient.rgb * albedo * ao;
    let n_dot_l = dot(n, sky.sun_direction.xyz);
    if (n_dot_l > 0.0) {
        let view_depth = -(frame.view * vec4<f32>(p, 1.0)).z;
        color += sky.sun_color.rgb * albedo * n_dot_l * shadow_visibility(p, view_depth);
    }
    for (var i = 0u; i < lights.count.x; i++) {
        let light = lights.lights[i];
        let to_light = light.position_radius.xyz - p;
        let d = length(to_light);
        let l = select(vec3<f32>(0.0), to_light / d, d > 0.0);
        let radiance = light.color_power.rgb * attenuation(d, light.position_radius.w);
        color += albedo * radiance * max(dot(n, l), 0.0);
    }
    return vec4<f32>(color, 1.0);
}
"#
);

/// Additive camera-facing particle discs.
pub const PARTICLES: &str = concat!(
    frame_block!(),
    r#"
@group(0) @binding(0) var<uniform> frame: Frame;

struct ParticleOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) corner: vec2<f32>,
    @location(1) color: vec3<f32>,
};

@vertex
fn vs_particle(
    @builtin(vertex_index) idx: u32,
    @location(0) position_size: vec4<f32>,
    @location(1) color: vec4<f32>,
) -> ParticleOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, -1.0), vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, 1.0), vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[idx];
    let world = position_size.xyz
        + (frame.camera_right.xyz * corner.x + frame.camera_up.xyz * corner.y) * position_size.w;
    var out: ParticleOutput;
    out.clip = frame.view_proj * vec4<f32>(world, 1.0);
    out.corner = corner;
    out.color = color.rgb;
    return out;
}

@fragment
fn fs_particle(in: ParticleOutput) -> @location(0) vec4<f32> {
    let d2 = dot(in.corner, in.corner);
    if (d2 >= 1.0) {
        discard;
    }
    let falloff = (1.0 - d2) * (1.0 - d2);
    return vec4<f32>(in.color * falloff, 1.0);
}
"#
);

/// Tone mapping and the post-effect chain.
pub const POST: &str = concat!(
    frame_block!(),
    r#"
@group(0) @binding(0) var<uniform> frame: Frame;
@group(1) @binding(0) var source_tex: texture_2d<f32>;
@group(1) @binding(1) var source_sampler: sampler;
@group(2) @binding(0) var aux_tex: texture_2d<f32>;

@fragment
fn fs_tonemap(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let hdr = max(textureSample(source_tex, source_sampler, in.uv).rgb * frame.screen.z, vec3<f32>(0.0));
    let mapped = clamp(
        (hdr * (2.51 * hdr + 0.03)) / (hdr * (2.43 * hdr + 0.59) + 0.14),
        vec3<f32>(0.0),
        vec3<f32>(1.0),
    );
    return vec4<f32>(pow(mapped, vec3<f32>(1.0 / 2.2)), 1.0);
}

fn lut_texel(slice: u32, x: u32, y: u32) -> vec3<f32> {
    let size = u32(frame.post.y);
    return textureLoad(aux_tex, vec2<u32>(slice * size + x, y), 0).rgb;
}

fn lut_slice(slice: u32, r: f32, g: f32) -> vec3<f32> {
    let max_index = u32(frame.post.y) - 1u;
    let r0 = u32(floor(r));
    let g0 = u32(floor(g));
    let r1 = min(r0 + 1u, max_index);
    let g1 = min(g0 + 1u, max_index);
    let fr = r - f32(r0);
    let fg = g - f32(g0);
    let top = mix(lut_texel(slice, r0, g0), lut_texel(slice, r1, g0), fr);
    let bottom = mix(lut_texel(slice, r0, g1), lut_texel(slice, r1, g1), fr);
    return mix(top, bottom, fg);
}

@fragment
fn fs_color_correction(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let max_index = frame.post.y - 1.0;
    let c = clamp(textureSample(source_tex, source_sampler, in.uv).rgb, vec3<f32>(0.0), vec3<f32>(1.0)) * max_index;
    let b0 = floor(c.z);
    let b1 = min(b0 + 1.0, max_index);
    let lo = lut_slice(u32(b0), c.x, c.y);
    let hi = lut_slice(u32(b1), c.x, c.y);
    return vec4<f32>(mix(lo, hi, c.z - b0), 1.0);
}

@fragment
fn fs_vignetting(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let dims = vec2<f32>(textureDimensions(aux_tex));
    let texel = vec2<u32>(clamp(floor(fract(in.uv) * dims), vec2<f32>(0.0), dims - 1.0));
    let mask = textureLoad(aux_tex, texel, 0).rgb;
    return vec4<f32>(textureSample(source_tex, source_sampler, in.uv).rgb * mask, 1.0);
}

fn hash_u32(v: u32) -> u32 {
    var x = v;
    x ^= x >> 16u;
    x *= 0x7feb352du;
    x ^= x >> 15u;
    x *= 0x846ca68bu;
    x ^= x >> 16u;
    return x;
}

fn hash_unit(x: u32) -> f32 {
    return f32(hash_u32(x) >> 8u) / 16777216.0;
}

fn glitch_offset(v: f32, time: f32, seed: u32, intensity: f32) -> f32 {
    if (intensity <= 0.0) {
        return 0.0;
    }
    let band = u32(clamp(v, 0.0, 1.0) * 32.0);
    let tick = u32(max(time, 0.0) * 15.0);
    let key = hash_u32(band ^ hash_u32(tick ^ hash_u32(seed)));
    let strength = min(intensity, 1.0);
    if (hash_unit(key) < 1.0 - 0.5 * strength) {
        return 0.0;
    }
    return (hash_unit(key ^ 0x9e3779b9u) - 0.5) * 0.2 * strength;
}

@fragment
fn fs_glitch(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let offset = glitch_offset(in.uv.y, frame.screen.w, frame.flags.x, frame.post.x);
    let shift = vec2<f32>(offset, 0.0);
    let r = textureSample(source_tex, source_sampler, in.uv + shift * 1.5).r;
    let g = textureSample(source_tex, source_sampler, in.uv + shift).g;
    let b = textureSample(source_tex, source_sampler, in.uv + shift * 0.5).b;
    return vec4<f32>(r, g, b, 1.0);
}
"#
);

/// Debug line overlay.
pub const OVERLAY: &str = concat!(
    frame_block!(),
    r#"
@group(0) @binding(0) var<uniform> frame: Frame;

struct LineOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_overlay(@location(0) position: vec3<f32>, @location(1) color: vec3<f32>) -> LineOutput {
    var out: LineOutput;
    out.clip = frame.view_proj * vec4<f32>(position, 1.0);
    out.color = color;
    return out;
}

@fragment
fn fs_overlay(in: LineOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(clamp(in.color, vec3<f32>(0.0), vec3<f32>(1.0)), 1.0);
}
"#
);
