//! Per-node terrain meshes.
//!
//! Every node mesh is a `(chunk_size + 1)²` vertex grid over its footprint,
//! sampling the heightmap with a stride equal to the node's width in chunks,
//! so coarse nodes cost the same to draw as a single leaf chunk.

use glam::Vec3;
use umbra_math::Aabb;

use crate::{Landscape, LodNode, NodeId};

/// Vertex layout shared by the software and GPU terrain paths.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TerrainVertex {
    /// World-space position.
    pub position: [f32; 3],
    /// World-space unit normal.
    pub normal: [f32; 3],
    /// Landscape-wide texture coordinate in `[0, 1]²`.
    pub uv: [f32; 2],
    /// Ground-type weights.
    pub weights: [f32; 4],
}

/// Triangle list for one LOD node.
#[derive(Clone, Debug)]
pub struct TerrainMesh {
    /// Node this mesh was generated for.
    pub node: NodeId,
    /// Levels above the leaves.
    pub level: u32,
    /// Vertex grid, row-major.
    pub vertices: Vec<TerrainVertex>,
    /// Counter-clockwise triangles seen from above.
    pub indices: Vec<u32>,
    /// World bounds of the vertices.
    pub bounds: Aabb,
}

impl TerrainMesh {
    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

pub(crate) fn build_node_mesh(landscape: &Landscape, id: NodeId, node: &LodNode) -> TerrainMesh {
    let cells = landscape.desc().chunk_size;
    let stride = node.rect.size;
    let base_x = node.rect.x * cells;
    let base_z = node.rect.z * cells;
    let edge = cells + 1;
    let map = landscape.heightmap();
    let span_x = (map.width() - 1).max(1) as f32;
    let span_z = (map.depth() - 1).max(1) as f32;

    let mut vertices = Vec::with_capacity((edge * edge) as usize);
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for l in 0..edge {
        for k in 0..edge {
            let sx = base_x + k * stride;
            let sz = base_z + l * stride;
            let position = landscape.sample_world(sx, sz);
            min = min.min(position);
            max = max.max(position);
            vertices.push(TerrainVertex {
                position: position.to_array(),
                normal: landscape.sample_normal(sx, sz, stride).to_array(),
                uv: [sx as f32 / span_x, sz as f32 / span_z],
                weights: landscape.attributes().get(sx, sz),
            });
        }
    }

    let mut indices = Vec::with_capacity((cells * cells * 6) as usize);
    for l in 0..cells {
        for k in 0..cells {
            let a = l * edge + k;
            let b = a + 1;
            let c = a + edge;
            let d = c + 1;
            indices.extend_from_slice(&[a, c, b, b, c, d]);
        }
    }

    TerrainMesh {
        node: id,
        level: node.level,
        vertices,
        indices,
        bounds: Aabb { min, max },
    }
}
