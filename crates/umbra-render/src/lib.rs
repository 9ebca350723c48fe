//! Deferred renderer: render queue, shadow cascades, G-buffer passes, SSAO,
//! tone mapping and post effects, with a wgpu backend and a CPU reference
//! backend that share one frame graph.

pub mod assets;
pub mod backend;
pub mod camera;
pub mod error;
pub mod exposure;
pub mod graph;
pub mod lights;
pub mod objects;
pub mod overlay;
pub mod post;
pub mod prepare;
pub mod queue;
pub mod renderer;
pub mod shadow;
pub mod sky;
pub mod ssao;
pub mod targets;

pub use assets::{
    AssetKey, AssetStore, MemoryAssetStore, Mesh, Placeholders, ResourceLoadError, Skin, Texture,
    Vertex,
};
pub use backend::{FrameData, GpuBackend, GpuInitError, RenderBackend, SoftwareBackend};
pub use camera::{Camera, FrameCamera};
pub use error::{CapacityError, RenderError};
pub use exposure::Exposure;
pub use graph::{FrameLedger, PassKind};
pub use lights::{Light, LightSet, MAX_DYNAMIC_LIGHTS};
pub use objects::{AnimatedObject, InstancedObject, Particle, RenderObject, StaticObject};
pub use overlay::OverlayBatch;
pub use post::{ColorLut, PostEffect, PostSettings};
pub use renderer::{FrameReport, Renderer};
pub use shadow::{CASCADE_COUNT, CascadeSet, SplitScheme};
pub use sky::SkyState;
pub use targets::{TargetId, TargetLayout};
