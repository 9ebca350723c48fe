//! Landscape heightfields, their chunk LOD quadtree, and live terrain painting.
//!
//! A [`Landscape`] owns a [`Heightmap`], an [`AttributeMap`] of ground-type
//! weights, and a [`LodTree`] over its square power-of-two chunk grid. The
//! renderer queries the tree against the camera frustum each frame and draws
//! the per-node meshes the landscape caches; painting marks chunks dirty so
//! their meshes and bounds are refreshed before the next draw.

mod attributes;
mod error;
mod heightmap;
mod landscape;
mod lod_tree;
mod mesh;
mod paint;

pub use attributes::{AttributeMap, GROUND_TYPES};
pub use error::TerrainError;
pub use heightmap::{Heightmap, HeightmapParams};
pub use landscape::{Landscape, LandscapeDesc, LandscapeHandle, RefreshReport};
pub use lod_tree::{
    ChunkIndex, ChunkRect, ChunkSelection, DistanceRatioPolicy, FinestPolicy, LodNode, LodPolicy,
    LodTree, NodeId, NodeKind,
};
pub use mesh::{TerrainMesh, TerrainVertex};
pub use paint::brush_weight;
