//! The landscape entity: heightfield, ground attributes, LOD tree and mesh cache.

use std::sync::{Arc, RwLock};

use glam::{Mat3, Mat4, Vec2, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};
use umbra_math::{Aabb, Frustum};

use crate::mesh::build_node_mesh;
use crate::{
    AttributeMap, ChunkIndex, ChunkSelection, GROUND_TYPES, Heightmap, LodPolicy, LodTree, NodeId,
    TerrainError, TerrainMesh,
};

/// A landscape shared between the application (which paints it) and the
/// renderer (which draws it).
pub type LandscapeHandle = Arc<RwLock<Landscape>>;

/// Height changes below this many world units leave node bounds untouched.
const REFIT_EPSILON: f32 = 1e-4;

/// Construction parameters for a [`Landscape`].
#[derive(Clone, Debug, PartialEq)]
pub struct LandscapeDesc {
    /// World units between neighbouring samples.
    pub cell_size: f32,
    /// World units per heightmap unit.
    pub vertical_scale: f32,
    /// Cells per chunk edge.
    pub chunk_size: u32,
    /// World position of sample `(0, 0)` at height 0. `None` centers the
    /// landscape on the world origin.
    pub origin: Option<Vec3>,
    /// Asset keys of the ground textures, one per ground type.
    pub ground_textures: [Option<String>; GROUND_TYPES],
}

impl Default for LandscapeDesc {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            vertical_scale: 32.0,
            chunk_size: 32,
            origin: None,
            ground_textures: Default::default(),
        }
    }
}

/// What [`Landscape::refresh_dirty`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Dirty chunks processed.
    pub chunks: usize,
    /// Chunks whose height range moved enough to refit the tree.
    pub refit: usize,
}

/// A heightfield terrain split into a square power-of-two grid of chunks.
#[derive(Debug)]
pub struct Landscape {
    desc: LandscapeDesc,
    origin: Vec3,
    heightmap: Heightmap,
    attributes: AttributeMap,
    tree: LodTree,
    meshes: FxHashMap<NodeId, Arc<TerrainMesh>>,
    dirty: FxHashSet<ChunkIndex>,
}

impl Landscape {
    /// Build a landscape. The heightmap must be square with
    /// `chunks * chunk_size + 1` samples per edge, `chunks` a power of two.
    /// `cell_size` and `vertical_scale` must be finite and positive.
    pub fn new(desc: LandscapeDesc, heightmap: Heightmap) -> Result<Self, TerrainError> {
        for (field, value) in [
            ("cell_size", desc.cell_size),
            ("vertical_scale", desc.vertical_scale),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(TerrainError::InvalidScale { field, value });
            }
        }
        let (width, depth) = (heightmap.width(), heightmap.depth());
        let invalid = TerrainError::InvalidDimensions {
            width,
            depth,
            chunk_size: desc.chunk_size,
        };
        if desc.chunk_size == 0 || width != depth || width < 2 {
            return Err(invalid);
        }
        let cells = width - 1;
        if cells % desc.chunk_size != 0 || !(cells / desc.chunk_size).is_power_of_two() {
            return Err(invalid);
        }
        let chunks_per_side = cells / desc.chunk_size;

        let extent = cells as f32 * desc.cell_size;
        let origin = desc
            .origin
            .unwrap_or(Vec3::new(-extent * 0.5, 0.0, -extent * 0.5));

        let tree = LodTree::build(chunks_per_side, |x, z| {
            chunk_bounds(&heightmap, &desc, origin, x, z)
        })?;
        log::info!(
            "Landscape {}x{} samples, {}x{} chunks, extent {:.1}",
            width,
            depth,
            chunks_per_side,
            chunks_per_side,
            extent
        );
        Ok(Self {
            attributes: AttributeMap::new(width, depth),
            tree,
            desc,
            origin,
            heightmap,
            meshes: FxHashMap::default(),
            dirty: FxHashSet::default(),
        })
    }

    /// Wrap the landscape for sharing with the renderer.
    pub fn into_handle(self) -> LandscapeHandle {
        Arc::new(RwLock::new(self))
    }

    /// Construction parameters.
    pub fn desc(&self) -> &LandscapeDesc {
        &self.desc
    }

    /// World position of sample `(0, 0)` at height 0.
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Horizontal size in world units.
    pub fn extent(&self) -> f32 {
        (self.heightmap.width() - 1) as f32 * self.desc.cell_size
    }

    /// The raw height samples.
    pub fn heightmap(&self) -> &Heightmap {
        &self.heightmap
    }

    /// Ground-type weights.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// The chunk quadtree.
    pub fn tree(&self) -> &LodTree {
        &self.tree
    }

    /// Chunks per grid edge.
    pub fn chunks_per_side(&self) -> u32 {
        self.tree.chunks_per_side()
    }

    /// Transform from sample space `(x, height, z)` into world space.
    pub fn world(&self) -> Mat4 {
        Mat4::from_translation(self.origin)
            * Mat4::from_scale(Vec3::new(
                self.desc.cell_size,
                self.desc.vertical_scale,
                self.desc.cell_size,
            ))
    }

    /// Matrix that carries sample-space normals into world space.
    pub fn world_normal(&self) -> Mat3 {
        Mat3::from_mat4(self.world()).inverse().transpose()
    }

    /// World `(x, z)` of a sample.
    pub fn sample_position(&self, x: u32, z: u32) -> Vec2 {
        Vec2::new(
            self.origin.x + x as f32 * self.desc.cell_size,
            self.origin.z + z as f32 * self.desc.cell_size,
        )
    }

    /// World position of a sample including its height.
    pub fn sample_world(&self, x: u32, z: u32) -> Vec3 {
        let p = self.sample_position(x, z);
        Vec3::new(p.x, self.sample_height(x, z), p.y)
    }

    fn sample_height(&self, x: u32, z: u32) -> f32 {
        self.origin.y + self.heightmap.get(x, z) * self.desc.vertical_scale
    }

    /// Fractional sample coordinates of a world `(x, z)` position.
    pub fn to_sample_space(&self, pos: Vec2) -> Vec2 {
        (pos - Vec2::new(self.origin.x, self.origin.z)) / self.desc.cell_size
    }

    /// World height at `(x, z)`: the bilinear heightmap sample times the
    /// vertical scale. Positions outside the landscape clamp to its edge.
    pub fn height(&self, pos: Vec2) -> f32 {
        let s = self.to_sample_space(pos);
        self.origin.y + self.heightmap.sample_bilinear(s.x, s.y) * self.desc.vertical_scale
    }

    /// Unit surface normal at `(x, z)` from central differences.
    pub fn normal(&self, pos: Vec2) -> Vec3 {
        let e = self.desc.cell_size;
        let left = self.height(pos - Vec2::new(e, 0.0));
        let right = self.height(pos + Vec2::new(e, 0.0));
        let back = self.height(pos - Vec2::new(0.0, e));
        let front = self.height(pos + Vec2::new(0.0, e));
        Vec3::new(left - right, 2.0 * e, back - front).normalize()
    }

    /// Orthonormal surface frame at `(x, z)`: columns are tangent (along +x),
    /// normal, and bitangent (along +z).
    pub fn axis(&self, pos: Vec2) -> Mat3 {
        let n = self.normal(pos);
        let tangent = n.cross(Vec3::Z).normalize();
        let bitangent = tangent.cross(n);
        Mat3::from_cols(tangent, n, bitangent)
    }

    pub(crate) fn sample_normal(&self, x: u32, z: u32, stride: u32) -> Vec3 {
        let w = self.heightmap.width() - 1;
        let d = self.heightmap.depth() - 1;
        let (x0, x1) = (x.saturating_sub(stride), (x + stride).min(w));
        let (z0, z1) = (z.saturating_sub(stride), (z + stride).min(d));
        let dx = ((x1 - x0).max(1)) as f32 * self.desc.cell_size;
        let dz = ((z1 - z0).max(1)) as f32 * self.desc.cell_size;
        let slope_x = (self.sample_height(x1, z) - self.sample_height(x0, z)) / dx;
        let slope_z = (self.sample_height(x, z1) - self.sample_height(x, z0)) / dz;
        Vec3::new(-slope_x, 1.0, -slope_z).normalize()
    }

    /// World bounds of chunk `(x, z)`.
    pub fn chunk_bounds(&self, cx: u32, cz: u32) -> Aabb {
        chunk_bounds(&self.heightmap, &self.desc, self.origin, cx, cz)
    }

    /// Nodes to draw for this camera. See [`LodTree::select_chunks`].
    pub fn select_chunks(
        &self,
        frustum: &Frustum,
        camera_position: Vec3,
        policy: &dyn LodPolicy,
    ) -> Vec<ChunkSelection> {
        self.tree.select_chunks(frustum, camera_position, policy)
    }

    /// Nodes to draw around a position, ignoring visibility.
    pub fn chunks_near(&self, position: Vec3, policy: &dyn LodPolicy) -> Vec<ChunkSelection> {
        self.tree.chunks_near(position, policy)
    }

    /// Mutable access for the painting operations.
    pub(crate) fn maps_mut(&mut self) -> (&mut Heightmap, &mut AttributeMap) {
        (&mut self.heightmap, &mut self.attributes)
    }

    /// Mark every chunk touching the inclusive sample rectangle dirty, with a
    /// one-sample border for normals, and drop the affected cached meshes.
    pub(crate) fn mark_dirty_samples(&mut self, x0: u32, z0: u32, x1: u32, z1: u32) {
        let cells = self.desc.chunk_size;
        let last_chunk = self.chunks_per_side() - 1;
        let last_sample = self.heightmap.width() - 1;
        let first_chunk = |s: u32| {
            let s = s.saturating_sub(1);
            if s == 0 { 0 } else { (s - 1) / cells }
        };
        let last_chunk_of = |s: u32| ((s + 1).min(last_sample) / cells).min(last_chunk);

        for cz in first_chunk(z0)..=last_chunk_of(z1) {
            for cx in first_chunk(x0)..=last_chunk_of(x1) {
                let chunk = cz * self.chunks_per_side() + cx;
                if self.dirty.insert(chunk)
                    && let Some(leaf) = self.tree.leaf_for_chunk(chunk)
                {
                    self.meshes.remove(&leaf);
                    for ancestor in self.tree.ancestors(leaf) {
                        self.meshes.remove(&ancestor);
                    }
                }
            }
        }
    }

    /// Number of chunks waiting for [`Self::refresh_dirty`].
    pub fn dirty_chunk_count(&self) -> usize {
        self.dirty.len()
    }

    /// Returns true if `chunk` was edited since the last refresh.
    pub fn is_chunk_dirty(&self, chunk: ChunkIndex) -> bool {
        self.dirty.contains(&chunk)
    }

    /// Recompute bounds of edited chunks and refit the tree where their
    /// height range moved.
    pub fn refresh_dirty(&mut self) -> RefreshReport {
        let mut report = RefreshReport::default();
        let mut dirty: Vec<ChunkIndex> = self.dirty.drain().collect();
        dirty.sort_unstable();
        let side = self.chunks_per_side();
        for chunk in dirty {
            report.chunks += 1;
            let Some(leaf) = self.tree.leaf_for_chunk(chunk) else {
                continue;
            };
            let bounds = self.chunk_bounds(chunk % side, chunk / side);
            let old = self.tree.node(leaf).bounds;
            if (bounds.min.y - old.min.y).abs() > REFIT_EPSILON
                || (bounds.max.y - old.max.y).abs() > REFIT_EPSILON
            {
                self.tree.refit_chunk(chunk, bounds);
                report.refit += 1;
            }
        }
        if report.chunks > 0 {
            log::debug!(
                "Refreshed {} dirty chunks ({} refit)",
                report.chunks,
                report.refit
            );
        }
        report
    }

    /// The cached mesh of a node, if it is up to date.
    pub fn cached_mesh(&self, id: NodeId) -> Option<Arc<TerrainMesh>> {
        self.meshes.get(&id).cloned()
    }

    /// The mesh of a node, generating it if missing or stale.
    pub fn node_mesh(&mut self, id: NodeId) -> Arc<TerrainMesh> {
        if let Some(mesh) = self.meshes.get(&id) {
            return Arc::clone(mesh);
        }
        let mesh = Arc::new(build_node_mesh(self, id, self.tree.node(id)));
        log::trace!(
            "Generated terrain mesh for node {} (level {}, {} triangles)",
            id.0,
            mesh.level,
            mesh.triangle_count()
        );
        self.meshes.insert(id, Arc::clone(&mesh));
        mesh
    }

    /// Number of cached node meshes.
    pub fn cached_mesh_count(&self) -> usize {
        self.meshes.len()
    }
}

fn chunk_bounds(heightmap: &Heightmap, desc: &LandscapeDesc, origin: Vec3, cx: u32, cz: u32) -> Aabb {
    let cells = desc.chunk_size;
    let (x0, z0) = (cx * cells, cz * cells);
    let (x1, z1) = (x0 + cells, z0 + cells);
    let (lo, hi) = heightmap.range(x0, z0, x1, z1);
    let scale = desc.vertical_scale;
    Aabb::new(
        Vec3::new(
            origin.x + x0 as f32 * desc.cell_size,
            origin.y + lo * scale,
            origin.z + z0 as f32 * desc.cell_size,
        ),
        Vec3::new(
            origin.x + x1 as f32 * desc.cell_size,
            origin.y + hi * scale,
            origin.z + z1 as f32 * desc.cell_size,
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinestPolicy, HeightmapParams};

    fn ramp(chunks: u32, chunk_size: u32) -> Landscape {
        let n = chunks * chunk_size + 1;
        let samples = (0..n * n).map(|i| (i % n) as f32 * 0.1).collect();
        let desc = LandscapeDesc {
            chunk_size,
            vertical_scale: 2.0,
            cell_size: 1.0,
            origin: Some(Vec3::ZERO),
            ..Default::default()
        };
        Landscape::new(desc, Heightmap::new(n, n, samples).unwrap()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_dimensions() {
        let desc = LandscapeDesc {
            chunk_size: 4,
            ..Default::default()
        };
        // 3 chunks per side is not a power of two.
        assert!(matches!(
            Landscape::new(desc.clone(), Heightmap::flat(13, 13, 0.0)),
            Err(TerrainError::InvalidDimensions { width: 13, .. })
        ));
        // Not square.
        assert!(Landscape::new(desc.clone(), Heightmap::flat(9, 17, 0.0)).is_err());
        // Not a whole number of chunks.
        assert!(Landscape::new(desc, Heightmap::flat(10, 10, 0.0)).is_err());
    }

    #[test]
    fn test_rejects_degenerate_scale() {
        for (cell_size, vertical_scale) in [
            (1.0, 0.0),
            (1.0, -2.0),
            (0.0, 1.0),
            (f32::NAN, 1.0),
            (1.0, f32::INFINITY),
        ] {
            let desc = LandscapeDesc {
                chunk_size: 4,
                cell_size,
                vertical_scale,
                ..Default::default()
            };
            assert!(
                matches!(
                    Landscape::new(desc, Heightmap::flat(9, 9, 0.0)),
                    Err(TerrainError::InvalidScale { .. })
                ),
                "accepted cell_size {cell_size}, vertical_scale {vertical_scale}"
            );
        }
    }

    #[test]
    fn test_centered_by_default() {
        let desc = LandscapeDesc {
            chunk_size: 4,
            cell_size: 2.0,
            ..Default::default()
        };
        let l = Landscape::new(desc, Heightmap::flat(9, 9, 0.0)).unwrap();
        assert_eq!(l.extent(), 16.0);
        assert_eq!(l.origin(), Vec3::new(-8.0, 0.0, -8.0));
        assert_eq!(l.sample_position(8, 8), Vec2::new(8.0, 8.0));
    }

    #[test]
    fn test_height_matches_samples_and_interpolates() {
        let l = ramp(2, 4);
        assert!((l.height(Vec2::new(3.0, 1.0)) - 0.3 * 2.0).abs() < 1e-5);
        assert!((l.height(Vec2::new(3.5, 1.0)) - 0.35 * 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_world_matrix_maps_samples() {
        let l = ramp(2, 4);
        let h = l.heightmap().get(5, 2);
        let p = l.world().transform_point3(Vec3::new(5.0, h, 2.0));
        assert!(p.distance(l.sample_world(5, 2)) < 1e-5);
        let n = (l.world_normal() * Vec3::Y).normalize();
        assert!(n.distance(Vec3::Y) < 1e-6);
    }

    #[test]
    fn test_normal_on_ramp_tilts_against_slope() {
        let l = ramp(2, 4);
        let n = l.normal(Vec2::new(4.0, 4.0));
        // Height rises 0.2 per unit along +x.
        let expected = Vec3::new(-0.2, 1.0, 0.0).normalize();
        assert!(n.distance(expected) < 1e-4, "{n}");
    }

    #[test]
    fn test_axis_is_orthonormal_right_handed() {
        let params = HeightmapParams {
            seed: 3,
            amplitude: 4.0,
            base_frequency: 0.1,
            ..Default::default()
        };
        let desc = LandscapeDesc {
            chunk_size: 8,
            ..Default::default()
        };
        let l = Landscape::new(desc, Heightmap::from_fbm(17, 17, &params)).unwrap();
        let axis = l.axis(Vec2::new(1.3, -2.7));
        assert!((axis.determinant() - 1.0).abs() < 1e-4);
        assert!(axis.x_axis.dot(axis.y_axis).abs() < 1e-5);
        assert!(axis.y_axis.dot(axis.z_axis).abs() < 1e-5);
        assert_eq!(axis.y_axis, l.normal(Vec2::new(1.3, -2.7)));
    }

    #[test]
    fn test_node_meshes_have_constant_budget() {
        let mut l = ramp(4, 8);
        for id in (0..l.tree().len() as u32).map(NodeId) {
            let mesh = l.node_mesh(id);
            assert_eq!(mesh.vertices.len(), 81);
            assert_eq!(mesh.triangle_count(), 128);
        }
        let root = l.tree().root();
        let mesh = l.node_mesh(root);
        assert_eq!(mesh.vertices.last().unwrap().position[0], 32.0);
        assert_eq!(l.cached_mesh_count(), l.tree().len());
    }

    #[test]
    fn test_mesh_triangles_face_up() {
        let mut l = ramp(1, 2);
        let mesh = l.node_mesh(l.tree().root());
        for tri in mesh.indices.chunks_exact(3) {
            let p = [0, 1, 2].map(|k| Vec3::from(mesh.vertices[tri[k] as usize].position));
            let n = (p[1] - p[0]).cross(p[2] - p[0]);
            assert!(n.y > 0.0);
        }
    }

    #[test]
    fn test_bounds_enclose_chunk_samples() {
        let l = ramp(4, 4);
        for (leaf, chunk) in l.tree().leaves() {
            let bounds = l.tree().node(leaf).bounds;
            let side = l.chunks_per_side();
            let (cx, cz) = (chunk % side, chunk / side);
            for z in cz * 4..=cz * 4 + 4 {
                for x in cx * 4..=cx * 4 + 4 {
                    assert!(bounds.contains_point(l.sample_world(x, z)));
                }
            }
        }
    }

    #[test]
    fn test_finest_selection_near_center() {
        let l = ramp(2, 4);
        let sel = l.chunks_near(Vec3::new(4.0, 1.0, 4.0), &FinestPolicy);
        assert_eq!(sel.len(), 4);
    }
}
