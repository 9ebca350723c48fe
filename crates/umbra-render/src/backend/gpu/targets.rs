//! GPU render targets.

use crate::shadow::CASCADE_COUNT;
use crate::targets::{TargetId, TargetLayout};

pub const ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Color copy of the g-buffer depth, read by the occlusion and lighting passes.
pub const SCENE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
pub const OCCLUSION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const LDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A texture with its default view.
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl RenderTarget {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        (width, height): (u32, u32),
        format: wgpu::TextureFormat,
        extra_usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | extra_usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Every target of the frame graph.
pub struct GpuTargets {
    pub layout: TargetLayout,
    pub albedo: RenderTarget,
    pub normal: RenderTarget,
    pub depth: RenderTarget,
    pub scene_depth: RenderTarget,
    pub occlusion: RenderTarget,
    pub hdr: RenderTarget,
    pub ldr_front: RenderTarget,
    pub ldr_back: RenderTarget,
    pub shadows: [RenderTarget; CASCADE_COUNT],
}

impl GpuTargets {
    pub fn new(device: &wgpu::Device, layout: TargetLayout) -> Self {
        let none = wgpu::TextureUsages::empty();
        let copy = wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
        let screen = layout.size_of(TargetId::GBuffer);
        Self {
            layout,
            albedo: RenderTarget::new(device, "gbuffer-albedo", screen, ALBEDO_FORMAT, none),
            normal: RenderTarget::new(device, "gbuffer-normal", screen, NORMAL_FORMAT, none),
            depth: RenderTarget::new(device, "gbuffer-depth", screen, DEPTH_FORMAT, none),
            scene_depth: RenderTarget::new(device, "gbuffer-scene-depth", screen, SCENE_DEPTH_FORMAT, none),
            occlusion: RenderTarget::new(
                device,
                "occlusion",
                layout.size_of(TargetId::Occlusion),
                OCCLUSION_FORMAT,
                none,
            ),
            hdr: RenderTarget::new(device, "hdr", layout.size_of(TargetId::Hdr), HDR_FORMAT, none),
            ldr_front: RenderTarget::new(
                device,
                "ldr-front",
                layout.size_of(TargetId::LdrFront),
                LDR_FORMAT,
                copy,
            ),
            ldr_back: RenderTarget::new(
                device,
                "ldr-back",
                layout.size_of(TargetId::LdrBack),
                LDR_FORMAT,
                copy,
            ),
            shadows: std::array::from_fn(|i| {
                RenderTarget::new(
                    device,
                    &format!("shadow-cascade-{i}"),
                    layout.size_of(TargetId::shadow(i)),
                    DEPTH_FORMAT,
                    none,
                )
            }),
        }
    }

    /// Make the back buffer the front one.
    pub fn swap_ldr(&mut self) {
        std::mem::swap(&mut self.ldr_front, &mut self.ldr_back);
    }
}
