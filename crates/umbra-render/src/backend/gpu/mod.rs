//! wgpu implementation of every pass.
//!
//! The backend runs headless: it renders into its own targets and the final
//! image is read back on request. Geometry is uploaded once per frame and
//! shared by the shadow and geometry passes; textures are cached for as long
//! as the asset store keeps them alive.

mod pipelines;
mod readback;
mod shaders;
mod targets;

use std::sync::Arc;

use bytemuck::Pod;
use glam::Mat4;
use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use self::pipelines::{FrameUniform, ParticleInstance, Pipelines, instance_data};
use self::targets::{GpuTargets, RenderTarget};
use super::{FrameData, RenderBackend};
use crate::assets::Texture;
use crate::error::RenderError;
use crate::lights::LightsUniform;
use crate::post::PostEffect;
use crate::shadow::ShadowUniform;
use crate::sky::{SEA_ALBEDO, SkyUniform};
use crate::ssao::SsaoUniform;
use crate::targets::TargetLayout;

/// Error type for headless device initialization.
#[derive(Debug, thiserror::Error)]
pub enum GpuInitError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// The adapter rejected a shader or pipeline.
    #[error("failed to create render pipelines: {0}")]
    Pipeline(String),
}

struct MeshUpload {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
    instances: wgpu::Buffer,
    instance_count: u32,
}

struct TerrainUpload {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

/// Buffers built for one frame.
struct FrameUploads {
    frame: u64,
    uniform: wgpu::Buffer,
    /// Parallel to the scene's mesh draws; `None` for empty meshes.
    meshes: Vec<Option<MeshUpload>>,
    terrain: Vec<Option<TerrainUpload>>,
    sea: Option<MeshUpload>,
}

struct CachedTexture {
    source: Arc<Texture>,
    view: wgpu::TextureView,
}

/// Renders with wgpu.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    pipelines: Pipelines,
    targets: Option<GpuTargets>,
    uploads: Option<FrameUploads>,
    textures: FxHashMap<usize, CachedTexture>,
    white: Arc<Texture>,
    sea: Arc<Texture>,
}

impl GpuBackend {
    /// Initialize a headless device, blocking on `pollster`.
    pub fn new() -> Result<Self, GpuInitError> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self, GpuInitError> {
        // 1. Create the wgpu instance with all backends for runtime selection
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // 2. Request any adapter; there is no surface to be compatible with
        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Ok(adapter) => adapter,
            Err(_) => return Err(GpuInitError::NoAdapter),
        };

        let info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        // 3. Request a device and queue
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("umbra-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Self::from_device(device, queue, info.name)
    }

    /// Build the backend on an existing device.
    ///
    /// Shader and pipeline validation errors are reported instead of
    /// reaching the device's uncaptured error handler.
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_name: String,
    ) -> Result<Self, GpuInitError> {
        let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipelines = Pipelines::new(&device);
        if let Some(err) = pollster::block_on(scope.pop()) {
            log::warn!("Adapter {adapter_name} rejected the render pipelines: {err}");
            return Err(GpuInitError::Pipeline(err.to_string()));
        }
        let sea = SEA_ALBEDO * 255.0;
        Ok(Self {
            device,
            queue,
            adapter_name,
            pipelines,
            targets: None,
            uploads: None,
            textures: FxHashMap::default(),
            white: Arc::new(Texture::solid([255, 255, 255, 255])),
            sea: Arc::new(Texture::solid([sea.x as u8, sea.y as u8, sea.z as u8, 255])),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn uniform<T: Pod>(&self, label: &str, value: &T) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(value),
            usage: wgpu::BufferUsages::UNIFORM,
        })
    }

    fn buffer(&self, label: &str, contents: &[u8], usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        })
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// View of a texture, uploading it on first use.
    fn texture_view(&mut self, texture: &Arc<Texture>) -> wgpu::TextureView {
        let key = Arc::as_ptr(texture) as usize;
        if let Some(cached) = self.textures.get(&key) {
            return cached.view.clone();
        }
        let image = texture.image();
        let gpu = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some("asset-texture"),
                size: wgpu::Extent3d {
                    width: image.width(),
                    height: image.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            image.as_raw(),
        );
        let view = gpu.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(
            key,
            CachedTexture {
                source: Arc::clone(texture),
                view: view.clone(),
            },
        );
        view
    }

    /// Drop cached textures nothing else refers to any more.
    fn evict_textures(&mut self) {
        let before = self.textures.len();
        self.textures
            .retain(|_, cached| Arc::strong_count(&cached.source) > 1);
        let evicted = before - self.textures.len();
        if evicted > 0 {
            log::debug!("Evicted {evicted} unused GPU textures");
        }
    }

    fn mesh_upload(&self, vertices: &[u8], indices: &[u32], models: &[Mat4]) -> Option<MeshUpload> {
        if vertices.is_empty() || indices.is_empty() || models.is_empty() {
            return None;
        }
        Some(MeshUpload {
            vertices: self.buffer("mesh-vertices", vertices, wgpu::BufferUsages::VERTEX),
            indices: self.buffer("mesh-indices", bytemuck::cast_slice(indices), wgpu::BufferUsages::INDEX),
            index_count: indices.len() as u32,
            instances: self.buffer(
                "mesh-instances",
                bytemuck::cast_slice(&instance_data(models)),
                wgpu::BufferUsages::VERTEX,
            ),
            instance_count: models.len() as u32,
        })
    }

    /// Build this frame's buffers unless they already exist.
    fn prepare_uploads(&mut self, frame: &FrameData<'_>, layout: TargetLayout) {
        if self.uploads.as_ref().is_some_and(|u| u.frame == frame.index) {
            return;
        }
        self.evict_textures();
        let scene = frame.scene;
        let meshes = scene
            .meshes
            .iter()
            .map(|draw| {
                self.mesh_upload(
                    bytemuck::cast_slice(&draw.mesh.vertices),
                    &draw.mesh.indices,
                    &draw.instances,
                )
            })
            .collect();
        let terrain = scene
            .terrain
            .iter()
            .map(|draw| {
                let mesh = &draw.mesh;
                (!mesh.vertices.is_empty() && !mesh.indices.is_empty()).then(|| TerrainUpload {
                    vertices: self.buffer(
                        "terrain-vertices",
                        bytemuck::cast_slice(&mesh.vertices),
                        wgpu::BufferUsages::VERTEX,
                    ),
                    indices: self.buffer(
                        "terrain-indices",
                        bytemuck::cast_slice(&mesh.indices),
                        wgpu::BufferUsages::INDEX,
                    ),
                    index_count: mesh.indices.len() as u32,
                })
            })
            .collect();
        let sea = scene.sea.and_then(|sea| {
            let mesh = sea.mesh();
            self.mesh_upload(bytemuck::cast_slice(&mesh.vertices), &mesh.indices, &[Mat4::IDENTITY])
        });
        let uniform = self.uniform(
            "frame-uniform",
            &FrameUniform::new(frame, layout.width, layout.height),
        );
        self.uploads = Some(FrameUploads {
            frame: frame.index,
            uniform,
            meshes,
            terrain,
            sea,
        });
    }

    fn frame_bind_group(&self, uniform: &wgpu::Buffer) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame-bg"),
            layout: &self.pipelines.frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            }],
        })
    }

    fn albedo_bind_group(&self, view: &wgpu::TextureView) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("albedo-bg"),
            layout: &self.pipelines.albedo_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.pipelines.repeat_sampler),
                },
            ],
        })
    }

    /// Bind group for one post-effect source or the tone mapper input.
    fn source_bind_group(&self, view: &wgpu::TextureView) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("post-source-bg"),
            layout: &self.pipelines.source_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.pipelines.clamp_sampler),
                },
            ],
        })
    }

    fn aux_bind_group(&self, view: &wgpu::TextureView) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("post-aux-bg"),
            layout: &self.pipelines.aux_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            }],
        })
    }

    fn parts(&self) -> Result<(&GpuTargets, &FrameUploads), RenderError> {
        let targets = self.targets.as_ref().ok_or(RenderError::TargetsNotCreated)?;
        let uploads = self
            .uploads
            .as_ref()
            .ok_or_else(|| RenderError::GpuState("frame buffers missing".into()))?;
        Ok((targets, uploads))
    }

    /// Run `encode` inside a validation error scope.
    fn scoped<T>(
        &mut self,
        what: &str,
        encode: impl FnOnce(&mut Self) -> Result<T, RenderError>,
    ) -> Result<T, RenderError> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = encode(self);
        match pollster::block_on(scope.pop()) {
            Some(err) => Err(RenderError::GpuState(format!("{what}: {err}"))),
            None => result,
        }
    }

    fn layout_or_err(&self) -> Result<TargetLayout, RenderError> {
        self.targets
            .as_ref()
            .map(|t| t.layout)
            .ok_or(RenderError::TargetsNotCreated)
    }
}

fn color_attachment(view: &wgpu::TextureView, load: wgpu::LoadOp<wgpu::Color>) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load,
            store: wgpu::StoreOp::Store,
        },
        depth_slice: None,
    })
}

fn view_entry(binding: u32, target: &RenderTarget) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: wgpu::BindingResource::TextureView(&target.view),
    }
}

fn fullscreen_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    target: &wgpu::TextureView,
    pipeline: &wgpu::RenderPipeline,
    bind_groups: &[&wgpu::BindGroup],
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[color_attachment(target, wgpu::LoadOp::Clear(wgpu::Color::BLACK))],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
    pass.set_pipeline(pipeline);
    for (i, group) in bind_groups.iter().enumerate() {
        pass.set_bind_group(i as u32, *group, &[]);
    }
    pass.draw(0..3, 0..1);
}

fn draw_mesh(pass: &mut wgpu::RenderPass<'_>, upload: &MeshUpload) {
    pass.set_vertex_buffer(0, upload.vertices.slice(..));
    pass.set_vertex_buffer(1, upload.instances.slice(..));
    pass.set_index_buffer(upload.indices.slice(..), wgpu::IndexFormat::Uint32);
    pass.draw_indexed(0..upload.index_count, 0, 0..upload.instance_count);
}

fn draw_terrain(pass: &mut wgpu::RenderPass<'_>, upload: &TerrainUpload) {
    pass.set_vertex_buffer(0, upload.vertices.slice(..));
    pass.set_index_buffer(upload.indices.slice(..), wgpu::IndexFormat::Uint32);
    pass.draw_indexed(0..upload.index_count, 0, 0..1);
}

/// Pass bodies; the trait impl runs each inside [`GpuBackend::scoped`].
impl GpuBackend {
    fn encode_shadow(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let layout = self.layout_or_err()?;
        // A frame that failed after its uploads may reuse the same index.
        self.uploads = None;
        self.prepare_uploads(frame, layout);
        let (targets, uploads) = self.parts()?;
        let scene = frame.scene;

        let mut encoder = self.encoder("shadow-encoder");
        for (cascade, map) in frame.cascades.cascades.iter().zip(&targets.shadows) {
            let matrix = self.uniform("cascade-matrix", &cascade.light_view_proj.to_cols_array());
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("shadow-light-bg"),
                layout: &self.pipelines.shadow_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: matrix.as_entire_binding(),
                }],
            });
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow-cascade"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &map.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0.0), // reverse-Z: clear to 0
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_pipeline(&self.pipelines.shadow_mesh);
            for (draw, upload) in scene.meshes.iter().zip(&uploads.meshes) {
                if let (true, Some(upload)) = (draw.casts_shadows, upload) {
                    draw_mesh(&mut pass, upload);
                }
            }
            pass.set_pipeline(&self.pipelines.shadow_terrain);
            for upload in uploads.terrain.iter().flatten() {
                draw_terrain(&mut pass, upload);
            }
        }
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    fn encode_geometry(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let layout = self.layout_or_err()?;
        self.prepare_uploads(frame, layout);

        // Texture uploads need `&mut self`; resolve every view first.
        let scene = frame.scene;
        let mesh_views: Vec<wgpu::TextureView> =
            scene.meshes.iter().map(|d| self.texture_view(&d.albedo)).collect();
        let ground_views: Vec<[wgpu::TextureView; 4]> = scene
            .terrain
            .iter()
            .map(|d| std::array::from_fn(|i| self.texture_view(&d.ground[i])))
            .collect();
        let sea = Arc::clone(&self.sea);
        let sea_view = self.texture_view(&sea);

        let (targets, uploads) = self.parts()?;
        let frame_group = self.frame_bind_group(&uploads.uniform);
        let mesh_groups: Vec<wgpu::BindGroup> =
            mesh_views.iter().map(|v| self.albedo_bind_group(v)).collect();
        let sea_group = self.albedo_bind_group(&sea_view);
        let ground_groups: Vec<wgpu::BindGroup> = scene
            .terrain
            .iter()
            .zip(&ground_views)
            .map(|(draw, views)| {
                let tiling = self.uniform("terrain-tiling", &[draw.tiling, 0.0, 0.0, 0.0]);
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("ground-bg"),
                    layout: &self.pipelines.ground_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&views[0]),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&views[1]),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&views[2]),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(&views[3]),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::Sampler(&self.pipelines.repeat_sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: tiling.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();

        let mut encoder = self.encoder("geometry-encoder");
        {
            let up = wgpu::Color {
                r: 0.0,
                g: 1.0,
                b: 0.0,
                a: 1.0,
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("geometry"),
                color_attachments: &[
                    color_attachment(&targets.albedo.view, wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)),
                    color_attachment(&targets.normal.view, wgpu::LoadOp::Clear(up)),
                    color_attachment(&targets.scene_depth.view, wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)),
                ],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_bind_group(0, &frame_group, &[]);
            pass.set_pipeline(&self.pipelines.geometry_mesh);
            for ((draw, upload), group) in scene.meshes.iter().zip(&uploads.meshes).zip(&mesh_groups) {
                if let (true, Some(upload)) = (draw.visible, upload) {
                    pass.set_bind_group(1, group, &[]);
                    draw_mesh(&mut pass, upload);
                }
            }
            if let Some(upload) = &uploads.sea {
                pass.set_bind_group(1, &sea_group, &[]);
                draw_mesh(&mut pass, upload);
            }
            pass.set_pipeline(&self.pipelines.geometry_terrain);
            for (upload, group) in uploads.terrain.iter().zip(&ground_groups) {
                if let Some(upload) = upload {
                    pass.set_bind_group(1, group, &[]);
                    draw_terrain(&mut pass, upload);
                }
            }
        }
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    fn encode_occlusion(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let (targets, uploads) = self.parts()?;
        let ssao = self.uniform("ssao-uniform", &SsaoUniform::new(frame.ssao));
        let uniforms = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("occlusion-uniform-bg"),
            layout: &self.pipelines.occlusion_uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uploads.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: ssao.as_entire_binding(),
                },
            ],
        });
        let inputs = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("occlusion-input-bg"),
            layout: &self.pipelines.occlusion_input_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&targets.scene_depth.view),
                },
            ],
        });
        let mut encoder = self.encoder("occlusion-encoder");
        fullscreen_pass(
            &mut encoder,
            "occlusion",
            &targets.occlusion.view,
            &self.pipelines.occlusion,
            &[&uniforms, &inputs],
        );
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    fn encode_lighting(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let (targets, uploads) = self.parts()?;
        let shadow = self.uniform(
            "shadow-uniform",
            &ShadowUniform::new(frame.cascades, frame.depth_bias),
        );
        let lights = self.uniform("lights-uniform", &LightsUniform::new(frame.lights));
        let sky = self.uniform("sky-uniform", &SkyUniform::new(frame.sky));
        let uniforms = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lighting-uniform-bg"),
            layout: &self.pipelines.lighting_uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uploads.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: shadow.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: lights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: sky.as_entire_binding(),
                },
            ],
        });
        let gbuffer = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gbuffer-bg"),
            layout: &self.pipelines.gbuffer_layout,
            entries: &[
                view_entry(0, &targets.albedo),
                view_entry(1, &targets.normal),
                view_entry(2, &targets.scene_depth),
                view_entry(3, &targets.occlusion),
            ],
        });
        let shadow_maps = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-maps-bg"),
            layout: &self.pipelines.shadow_maps_layout,
            entries: &[
                view_entry(0, &targets.shadows[0]),
                view_entry(1, &targets.shadows[1]),
                view_entry(2, &targets.shadows[2]),
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.pipelines.shadow_sampler),
                },
            ],
        });

        let mut encoder = self.encoder("lighting-encoder");
        fullscreen_pass(
            &mut encoder,
            "lighting",
            &targets.hdr.view,
            &self.pipelines.lighting,
            &[&uniforms, &gbuffer, &shadow_maps],
        );

        let particles: Vec<ParticleInstance> = frame
            .scene
            .particles
            .iter()
            .map(|p| ParticleInstance {
                position_size: p.position.extend(p.size).to_array(),
                color: p.color.extend(1.0).to_array(),
            })
            .collect();
        if !particles.is_empty() {
            let instances = self.buffer(
                "particle-instances",
                bytemuck::cast_slice(&particles),
                wgpu::BufferUsages::VERTEX,
            );
            let frame_group = self.frame_bind_group(&uploads.uniform);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("particles"),
                color_attachments: &[color_attachment(&targets.hdr.view, wgpu::LoadOp::Load)],
                // Read-only depth: particles test against the scene.
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth.view,
                    depth_ops: None,
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(&self.pipelines.particles);
            pass.set_bind_group(0, &frame_group, &[]);
            pass.set_vertex_buffer(0, instances.slice(..));
            pass.draw(0..6, 0..particles.len() as u32);
        }
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    fn encode_tonemap(&mut self, _frame: &FrameData<'_>) -> Result<(), RenderError> {
        let white = Arc::clone(&self.white);
        let white_view = self.texture_view(&white);
        let (targets, uploads) = self.parts()?;
        let frame_group = self.frame_bind_group(&uploads.uniform);
        let source = self.source_bind_group(&targets.hdr.view);
        let aux = self.aux_bind_group(&white_view);
        let mut encoder = self.encoder("tonemap-encoder");
        fullscreen_pass(
            &mut encoder,
            "tonemap",
            &targets.ldr_front.view,
            &self.pipelines.tonemap,
            &[&frame_group, &source, &aux],
        );
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    fn encode_post(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let post = frame.post;
        let effects = post.active_effects();
        let white = Arc::clone(&self.white);
        let mut aux_views = Vec::with_capacity(effects.len());
        for effect in &effects {
            let texture = match effect {
                PostEffect::ColorCorrection => post.color_correction.as_ref().map(|lut| Arc::clone(lut.texture())),
                PostEffect::Vignetting => post.vignetting.clone(),
                PostEffect::Glitch => None,
            };
            aux_views.push(self.texture_view(texture.as_ref().unwrap_or(&white)));
        }

        let mut encoder = self.encoder("post-encoder");
        let Some(targets) = self.targets.as_mut() else {
            return Err(RenderError::TargetsNotCreated);
        };
        if effects.is_empty() {
            encoder.copy_texture_to_texture(
                targets.ldr_front.texture.as_image_copy(),
                targets.ldr_back.texture.as_image_copy(),
                targets.ldr_front.texture.size(),
            );
        }
        let uploads = self
            .uploads
            .as_ref()
            .ok_or_else(|| RenderError::GpuState("frame buffers missing".into()))?;
        let device = &self.device;
        let pipelines = &self.pipelines;
        let frame_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame-bg"),
            layout: &pipelines.frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uploads.uniform.as_entire_binding(),
            }],
        });
        for (effect, aux_view) in effects.iter().zip(&aux_views) {
            let source = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("post-source-bg"),
                layout: &pipelines.source_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&targets.ldr_front.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&pipelines.clamp_sampler),
                    },
                ],
            });
            let aux = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("post-aux-bg"),
                layout: &pipelines.aux_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(aux_view),
                }],
            });
            let pipeline = match effect {
                PostEffect::ColorCorrection => &pipelines.color_correction,
                PostEffect::Vignetting => &pipelines.vignetting,
                PostEffect::Glitch => &pipelines.glitch,
            };
            fullscreen_pass(
                &mut encoder,
                "post-effect",
                &targets.ldr_back.view,
                pipeline,
                &[&frame_group, &source, &aux],
            );
            targets.swap_ldr();
        }
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    fn encode_overlay(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        let vertices = frame.scene.overlay.vertices();
        if vertices.is_empty() {
            return Ok(());
        }
        let (targets, uploads) = self.parts()?;
        let buffer = self.buffer(
            "overlay-vertices",
            bytemuck::cast_slice(&vertices),
            wgpu::BufferUsages::VERTEX,
        );
        let frame_group = self.frame_bind_group(&uploads.uniform);
        let mut encoder = self.encoder("overlay-encoder");
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay"),
                color_attachments: &[color_attachment(&targets.ldr_front.view, wgpu::LoadOp::Load)],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(&self.pipelines.overlay);
            pass.set_bind_group(0, &frame_group, &[]);
            pass.set_vertex_buffer(0, buffer.slice(..));
            pass.draw(0..vertices.len() as u32, 0..1);
        }
        self.queue.submit([encoder.finish()]);
        Ok(())
    }
}

impl RenderBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn create_targets(&mut self, layout: TargetLayout) -> Result<(), RenderError> {
        log::debug!(
            "Creating GPU targets {}x{} (shadows {:?})",
            layout.width,
            layout.height,
            layout.shadow_resolutions
        );
        self.uploads = None;
        let targets = self.scoped("targets", |backend| Ok(GpuTargets::new(&backend.device, layout)))?;
        self.targets = Some(targets);
        Ok(())
    }

    fn destroy_targets(&mut self) {
        if let Some(targets) = self.targets.take() {
            let GpuTargets {
                albedo,
                normal,
                depth,
                scene_depth,
                occlusion,
                hdr,
                ldr_front,
                ldr_back,
                shadows,
                ..
            } = targets;
            for target in [albedo, normal, depth, scene_depth, occlusion, hdr, ldr_front, ldr_back]
                .into_iter()
                .chain(shadows)
            {
                target.texture.destroy();
            }
        }
        self.uploads = None;
    }

    fn layout(&self) -> Option<TargetLayout> {
        self.targets.as_ref().map(|t| t.layout)
    }

    fn shadow_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        self.scoped("shadow", |backend| backend.encode_shadow(frame))
    }

    fn geometry_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        self.scoped("geometry", |backend| backend.encode_geometry(frame))
    }

    fn occlusion_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        self.scoped("occlusion", |backend| backend.encode_occlusion(frame))
    }

    fn lighting_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        self.scoped("lighting", |backend| backend.encode_lighting(frame))
    }

    fn tonemap_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        self.scoped("tonemap", |backend| backend.encode_tonemap(frame))
    }

    fn post_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        self.scoped("post", |backend| backend.encode_post(frame))
    }

    fn overlay_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError> {
        self.scoped("overlay", |backend| backend.encode_overlay(frame))
    }

    /// Not measured on the GPU; auto exposure keeps its last target.
    fn average_luminance(&self) -> Option<f32> {
        None
    }

    fn read_final(&mut self) -> Result<image::RgbaImage, RenderError> {
        let targets = self.targets.as_ref().ok_or(RenderError::TargetsNotCreated)?;
        readback::read_rgba8(&self.device, &self.queue, &targets.ldr_front.texture)
    }
}
