//! Pass executors.
//!
//! A [`RenderBackend`] owns the render targets and runs each of the seven
//! passes on request. The renderer decides the order and checks every pass
//! against the frame ledger before calling into the backend.

mod gpu;
mod raster;
mod software;

pub use gpu::{GpuBackend, GpuInitError};
pub use software::SoftwareBackend;

use crate::camera::FrameCamera;
use crate::error::RenderError;
use crate::lights::LightSet;
use crate::post::PostSettings;
use crate::prepare::PreparedScene;
use crate::shadow::CascadeSet;
use crate::sky::SkyState;
use crate::ssao::SsaoKernel;
use crate::targets::TargetLayout;

/// Everything a pass may read, for one frame.
#[derive(Clone, Copy)]
pub struct FrameData<'a> {
    /// Frame counter, starting at 0.
    pub index: u64,
    pub camera: &'a FrameCamera,
    pub cascades: &'a CascadeSet,
    pub scene: &'a PreparedScene,
    pub lights: &'a LightSet,
    pub sky: &'a SkyState,
    pub ssao: &'a SsaoKernel,
    pub post: &'a PostSettings,
    /// Exposure applied by the tone mapping pass.
    pub exposure: f32,
    /// Shadow comparison bias in light depth units.
    pub depth_bias: f32,
}

/// Runs passes against a set of owned render targets.
pub trait RenderBackend {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Create (or re-create) every target at the given sizes.
    fn create_targets(&mut self, layout: TargetLayout) -> Result<(), RenderError>;

    /// Release every target.
    fn destroy_targets(&mut self);

    /// Sizes of the current targets, if any exist.
    fn layout(&self) -> Option<TargetLayout>;

    /// Depth of every shadow caster into each cascade.
    fn shadow_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError>;

    /// Albedo, normal and depth of visible geometry.
    fn geometry_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError>;

    /// Ambient occlusion from the G-buffer.
    fn occlusion_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError>;

    /// Lit HDR color, sky and additive particles.
    fn lighting_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError>;

    /// HDR to the LDR front buffer.
    fn tonemap_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError>;

    /// Post effects; the result ends up in the LDR front buffer.
    fn post_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError>;

    /// Debug lines over the LDR front buffer.
    fn overlay_pass(&mut self, frame: &FrameData<'_>) -> Result<(), RenderError>;

    /// Log-average luminance of the last lighting pass, when the backend
    /// can measure it cheaply.
    fn average_luminance(&self) -> Option<f32>;

    /// Read the LDR front buffer back as RGBA8.
    fn read_final(&mut self) -> Result<image::RgbaImage, RenderError>;
}
