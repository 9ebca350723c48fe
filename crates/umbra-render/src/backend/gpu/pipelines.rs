//! Bind group layouts, pipelines and samplers of the GPU backend.
//!
//! Every pipeline is created once with the device. Bind groups are built
//! per frame from the current targets and uploads.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use super::shaders;
use super::targets::{
    ALBEDO_FORMAT, DEPTH_FORMAT, HDR_FORMAT, LDR_FORMAT, NORMAL_FORMAT, OCCLUSION_FORMAT, SCENE_DEPTH_FORMAT,
};
use crate::backend::FrameData;
use crate::lights::LightsUniform;
use crate::shadow::ShadowUniform;
use crate::sky::SkyUniform;
use crate::ssao::SsaoUniform;

/// Per-frame values shared by every shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniform {
    pub view_proj: [f32; 16],
    pub inv_view_proj: [f32; 16],
    pub view: [f32; 16],
    /// xyz = camera position, w = near.
    pub camera_position: [f32; 4],
    /// xyz = camera right, w = far.
    pub camera_right: [f32; 4],
    /// xyz = camera up, w = projection y scale.
    pub camera_up: [f32; 4],
    /// Width, height, exposure, time.
    pub screen: [f32; 4],
    /// Glitch intensity, LUT size, depth bias, unused.
    pub post: [f32; 4],
    /// Seed, frame index.
    pub flags: [u32; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<FrameUniform>(), 288);

impl FrameUniform {
    pub fn new(frame: &FrameData<'_>, width: u32, height: u32) -> Self {
        let camera = frame.camera;
        let right = camera.inv_view.x_axis.truncate();
        let up = camera.inv_view.y_axis.truncate();
        let lut_size = frame
            .post
            .color_correction
            .as_ref()
            .map_or(0.0, |lut| lut.size() as f32);
        Self {
            view_proj: camera.view_proj.to_cols_array(),
            inv_view_proj: camera.inv_view_proj.to_cols_array(),
            view: camera.view.to_cols_array(),
            camera_position: camera.position.extend(camera.near).to_array(),
            camera_right: right.extend(camera.far).to_array(),
            camera_up: up.extend(camera.proj.y_axis.y).to_array(),
            screen: [width as f32, height as f32, frame.exposure, frame.post.time],
            post: [frame.post.glitch, lut_size, frame.depth_bias, 0.0],
            flags: [frame.post.seed as u32, frame.index as u32, 0, 0],
        }
    }
}

/// Per-particle instance data.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ParticleInstance {
    /// xyz = world position, w = radius.
    pub position_size: [f32; 4],
    pub color: [f32; 4],
}

/// Model matrices, one per instance.
pub fn instance_data(models: &[Mat4]) -> Vec<[f32; 16]> {
    models.iter().map(Mat4::to_cols_array).collect()
}

const MESH_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
const TERRAIN_ATTRIBUTES: [wgpu::VertexAttribute; 4] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2, 3 => Float32x4];
const POSITION_ATTRIBUTE: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    5 => Float32x4, 6 => Float32x4, 7 => Float32x4, 8 => Float32x4
];
const PARTICLE_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x4, 1 => Float32x4];
const OVERLAY_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

fn mesh_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<crate::assets::Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &MESH_ATTRIBUTES,
    }
}

fn terrain_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<umbra_terrain::TerrainVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &TERRAIN_ATTRIBUTES,
    }
}

fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: 64,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRIBUTES,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages, size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(size as u64),
        },
        count: None,
    }
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, ty: wgpu::SamplerBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(ty),
        count: None,
    }
}

const FILTERABLE: wgpu::TextureSampleType = wgpu::TextureSampleType::Float { filterable: true };
const UNFILTERABLE: wgpu::TextureSampleType = wgpu::TextureSampleType::Float { filterable: false };

/// Reverse-Z depth state; `write` is false for passes that only test.
fn depth_state(write: bool) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: wgpu::CompareFunction::GreaterEqual,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

fn primitive(topology: wgpu::PrimitiveTopology) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: None,
        unclipped_depth: false,
        polygon_mode: wgpu::PolygonMode::Fill,
        conservative: false,
    }
}

fn color_target(format: wgpu::TextureFormat, blend: Option<wgpu::BlendState>) -> Option<wgpu::ColorTargetState> {
    Some(wgpu::ColorTargetState {
        format,
        blend,
        write_mask: wgpu::ColorWrites::ALL,
    })
}

/// Everything created once per device.
pub struct Pipelines {
    pub frame_layout: wgpu::BindGroupLayout,
    pub shadow_layout: wgpu::BindGroupLayout,
    pub albedo_layout: wgpu::BindGroupLayout,
    pub ground_layout: wgpu::BindGroupLayout,
    pub occlusion_uniform_layout: wgpu::BindGroupLayout,
    pub occlusion_input_layout: wgpu::BindGroupLayout,
    pub lighting_uniform_layout: wgpu::BindGroupLayout,
    pub gbuffer_layout: wgpu::BindGroupLayout,
    pub shadow_maps_layout: wgpu::BindGroupLayout,
    pub source_layout: wgpu::BindGroupLayout,
    pub aux_layout: wgpu::BindGroupLayout,

    pub shadow_mesh: wgpu::RenderPipeline,
    pub shadow_terrain: wgpu::RenderPipeline,
    pub geometry_mesh: wgpu::RenderPipeline,
    pub geometry_terrain: wgpu::RenderPipeline,
    pub occlusion: wgpu::RenderPipeline,
    pub lighting: wgpu::RenderPipeline,
    pub particles: wgpu::RenderPipeline,
    pub tonemap: wgpu::RenderPipeline,
    pub color_correction: wgpu::RenderPipeline,
    pub vignetting: wgpu::RenderPipeline,
    pub glitch: wgpu::RenderPipeline,
    pub overlay: wgpu::RenderPipeline,

    /// Nearest, repeating. Matches the software sampler.
    pub repeat_sampler: wgpu::Sampler,
    /// Linear, clamped. Reads full-screen targets.
    pub clamp_sampler: wgpu::Sampler,
    /// Reverse-Z shadow comparison with 2×2 filtering.
    pub shadow_sampler: wgpu::Sampler,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let vf = wgpu::ShaderStages::VERTEX_FRAGMENT;
        let frame_size = std::mem::size_of::<FrameUniform>();

        // 1. Bind group layouts
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame-bgl"),
            entries: &[uniform_entry(0, vf, frame_size)],
        });
        let shadow_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-light-bgl"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX, 64)],
        });
        let albedo_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("albedo-bgl"),
            entries: &[
                texture_entry(0, FILTERABLE),
                sampler_entry(1, wgpu::SamplerBindingType::Filtering),
            ],
        });
        let ground_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ground-bgl"),
            entries: &[
                texture_entry(0, FILTERABLE),
                texture_entry(1, FILTERABLE),
                texture_entry(2, FILTERABLE),
                texture_entry(3, FILTERABLE),
                sampler_entry(4, wgpu::SamplerBindingType::Filtering),
                uniform_entry(5, wgpu::ShaderStages::FRAGMENT, 16),
            ],
        });
        let occlusion_uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("occlusion-uniform-bgl"),
            entries: &[
                uniform_entry(0, vf, frame_size),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT, std::mem::size_of::<SsaoUniform>()),
            ],
        });
        let occlusion_input_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("occlusion-input-bgl"),
            entries: &[
                texture_entry(0, UNFILTERABLE),
                texture_entry(1, UNFILTERABLE),
            ],
        });
        let lighting_uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lighting-uniform-bgl"),
            entries: &[
                uniform_entry(0, vf, frame_size),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT, std::mem::size_of::<ShadowUniform>()),
                uniform_entry(2, wgpu::ShaderStages::FRAGMENT, std::mem::size_of::<LightsUniform>()),
                uniform_entry(3, wgpu::ShaderStages::FRAGMENT, std::mem::size_of::<SkyUniform>()),
            ],
        });
        let gbuffer_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gbuffer-bgl"),
            entries: &[
                texture_entry(0, UNFILTERABLE),
                texture_entry(1, UNFILTERABLE),
                texture_entry(2, UNFILTERABLE),
                texture_entry(3, UNFILTERABLE),
            ],
        });
        let shadow_maps_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-maps-bgl"),
            entries: &[
                texture_entry(0, wgpu::TextureSampleType::Depth),
                texture_entry(1, wgpu::TextureSampleType::Depth),
                texture_entry(2, wgpu::TextureSampleType::Depth),
                sampler_entry(3, wgpu::SamplerBindingType::Comparison),
            ],
        });
        let source_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("post-source-bgl"),
            entries: &[
                texture_entry(0, FILTERABLE),
                sampler_entry(1, wgpu::SamplerBindingType::Filtering),
            ],
        });
        let aux_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("post-aux-bgl"),
            entries: &[texture_entry(0, UNFILTERABLE)],
        });

        // 2. Shader modules
        let module = |label: &str, source: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        };
        let shadow_shader = module("shadow-shader", shaders::SHADOW);
        let mesh_shader = module("geometry-mesh-shader", shaders::GEOMETRY_MESH);
        let terrain_shader = module("geometry-terrain-shader", shaders::GEOMETRY_TERRAIN);
        let occlusion_shader = module("occlusion-shader", shaders::OCCLUSION);
        let lighting_shader = module("lighting-shader", shaders::LIGHTING);
        let particle_shader = module("particle-shader", shaders::PARTICLES);
        let post_shader = module("post-shader", shaders::POST);
        let overlay_shader = module("overlay-shader", shaders::OVERLAY);

        // 3. Pipeline layouts
        let layout = |label: &str, groups: &[&wgpu::BindGroupLayout]| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: groups,
                immediate_size: 0,
            })
        };
        let shadow_pl = layout("shadow-pipeline-layout", &[&shadow_layout]);
        let mesh_pl = layout("geometry-mesh-layout", &[&frame_layout, &albedo_layout]);
        let terrain_pl = layout("geometry-terrain-layout", &[&frame_layout, &ground_layout]);
        let occlusion_pl = layout(
            "occlusion-layout",
            &[&occlusion_uniform_layout, &occlusion_input_layout],
        );
        let lighting_pl = layout(
            "lighting-layout",
            &[&lighting_uniform_layout, &gbuffer_layout, &shadow_maps_layout],
        );
        let frame_only_pl = layout("frame-only-layout", &[&frame_layout]);
        let post_pl = layout("post-layout", &[&frame_layout, &source_layout, &aux_layout]);

        // 4. Pipelines
        let gbuffer_targets = [
            color_target(ALBEDO_FORMAT, None),
            color_target(NORMAL_FORMAT, None),
            color_target(SCENE_DEPTH_FORMAT, None),
        ];
        let render = |label: &str,
                      layout: &wgpu::PipelineLayout,
                      shader: &wgpu::ShaderModule,
                      (vs, fs): (&str, Option<&str>),
                      buffers: &[wgpu::VertexBufferLayout<'_>],
                      targets: &[Option<wgpu::ColorTargetState>],
                      topology: wgpu::PrimitiveTopology,
                      depth: Option<wgpu::DepthStencilState>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some(vs),
                    buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: primitive(topology),
                depth_stencil: depth,
                multisample: wgpu::MultisampleState::default(),
                fragment: fs.map(|entry| wgpu::FragmentState {
                    module: shader,
                    entry_point: Some(entry),
                    targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview_mask: None,
                cache: None,
            })
        };
        let tri = wgpu::PrimitiveTopology::TriangleList;
        let mesh_only_position = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<crate::assets::Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &POSITION_ATTRIBUTE,
        };
        let terrain_only_position = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<umbra_terrain::TerrainVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &POSITION_ATTRIBUTE,
        };

        let shadow_mesh = render(
            "shadow-mesh-pipeline",
            &shadow_pl,
            &shadow_shader,
            ("vs_shadow_mesh", None),
            &[mesh_only_position, instance_layout()],
            &[],
            tri,
            Some(depth_state(true)),
        );
        let shadow_terrain = render(
            "shadow-terrain-pipeline",
            &shadow_pl,
            &shadow_shader,
            ("vs_shadow_terrain", None),
            &[terrain_only_position],
            &[],
            tri,
            Some(depth_state(true)),
        );
        let geometry_mesh = render(
            "geometry-mesh-pipeline",
            &mesh_pl,
            &mesh_shader,
            ("vs_mesh", Some("fs_mesh")),
            &[mesh_layout(), instance_layout()],
            &gbuffer_targets,
            tri,
            Some(depth_state(true)),
        );
        let geometry_terrain = render(
            "geometry-terrain-pipeline",
            &terrain_pl,
            &terrain_shader,
            ("vs_terrain", Some("fs_terrain")),
            &[terrain_layout()],
            &gbuffer_targets,
            tri,
            Some(depth_state(true)),
        );
        let occlusion = render(
            "occlusion-pipeline",
            &occlusion_pl,
            &occlusion_shader,
            ("vs_fullscreen", Some("fs_occlusion")),
            &[],
            &[color_target(OCCLUSION_FORMAT, None)],
            tri,
            None,
        );
        let lighting = render(
            "lighting-pipeline",
            &lighting_pl,
            &lighting_shader,
            ("vs_fullscreen", Some("fs_lighting")),
            &[],
            &[color_target(HDR_FORMAT, None)],
            tri,
            None,
        );
        let additive = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent::REPLACE,
        };
        let particles = render(
            "particle-pipeline",
            &frame_only_pl,
            &particle_shader,
            ("vs_particle", Some("fs_particle")),
            &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<ParticleInstance>() as u64,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &PARTICLE_ATTRIBUTES,
            }],
            &[color_target(HDR_FORMAT, Some(additive))],
            tri,
            Some(depth_state(false)),
        );
        let ldr = [color_target(LDR_FORMAT, None)];
        let post = |label: &str, entry: &str| {
            render(label, &post_pl, &post_shader, ("vs_fullscreen", Some(entry)), &[], &ldr, tri, None)
        };
        let tonemap = post("tonemap-pipeline", "fs_tonemap");
        let color_correction = post("color-correction-pipeline", "fs_color_correction");
        let vignetting = post("vignetting-pipeline", "fs_vignetting");
        let glitch = post("glitch-pipeline", "fs_glitch");
        let overlay = render(
            "overlay-pipeline",
            &frame_only_pl,
            &overlay_shader,
            ("vs_overlay", Some("fs_overlay")),
            &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<crate::overlay::OverlayVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &OVERLAY_ATTRIBUTES,
            }],
            &ldr,
            wgpu::PrimitiveTopology::LineList,
            None,
        );

        // 5. Samplers
        let repeat_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sampler-repeat-nearest"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let clamp_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sampler-clamp-linear"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sampler-shadow-compare"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::GreaterEqual),
            ..Default::default()
        });

        Self {
            frame_layout,
            shadow_layout,
            albedo_layout,
            ground_layout,
            occlusion_uniform_layout,
            occlusion_input_layout,
            lighting_uniform_layout,
            gbuffer_layout,
            shadow_maps_layout,
            source_layout,
            aux_layout,
            shadow_mesh,
            shadow_terrain,
            geometry_mesh,
            geometry_terrain,
            occlusion,
            lighting,
            particles,
            tonemap,
            color_correction,
            vignetting,
            glitch,
            overlay,
            repeat_sampler,
            clamp_sampler,
            shadow_sampler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_strides_match_cpu_types() {
        assert_eq!(mesh_layout().array_stride, 32);
        assert_eq!(terrain_layout().array_stride, 48);
        assert_eq!(instance_layout().array_stride, 64);
        assert_eq!(std::mem::size_of::<ParticleInstance>(), 32);
    }

    #[test]
    fn test_instance_data_is_column_major() {
        let m = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let data = instance_data(&[m]);
        assert_eq!(&data[0][12..15], &[1.0, 2.0, 3.0]);
    }
}
