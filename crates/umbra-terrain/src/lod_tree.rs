//! Arena quadtree of bounding spheres over a landscape's chunk grid.
//!
//! Leaves hold exactly one chunk; internal nodes hold exactly four children
//! covering the quadrants of their footprint. Every node's sphere encloses
//! the spheres of all its descendants, which is what makes pruning a whole
//! subtree on a failed sphere/frustum test safe.

use glam::Vec3;
use umbra_math::{Aabb, BoundingSphere, Frustum};

use crate::TerrainError;

/// Row-major chunk index: `z * chunks_per_side + x`.
pub type ChunkIndex = u32;

/// Index of a node inside its [`LodTree`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Arena slot.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A square block of chunks, in chunk units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkRect {
    /// First chunk column.
    pub x: u32,
    /// First chunk row.
    pub z: u32,
    /// Width and depth in chunks.
    pub size: u32,
}

impl ChunkRect {
    /// Returns true if chunk `(cx, cz)` lies in the rectangle.
    pub fn contains(&self, cx: u32, cz: u32) -> bool {
        cx >= self.x && cx < self.x + self.size && cz >= self.z && cz < self.z + self.size
    }

    /// The four quadrants, ordered `(-x,-z), (+x,-z), (-x,+z), (+x,+z)`.
    pub fn quadrants(&self) -> [ChunkRect; 4] {
        let h = self.size / 2;
        [
            ChunkRect { x: self.x, z: self.z, size: h },
            ChunkRect { x: self.x + h, z: self.z, size: h },
            ChunkRect { x: self.x, z: self.z + h, size: h },
            ChunkRect { x: self.x + h, z: self.z + h, size: h },
        ]
    }

    /// Row-major indices of every chunk inside the rectangle.
    pub fn chunk_indices(&self, chunks_per_side: u32) -> impl Iterator<Item = ChunkIndex> + '_ {
        (self.z..self.z + self.size)
            .flat_map(move |z| (self.x..self.x + self.size).map(move |x| z * chunks_per_side + x))
    }
}

/// Leaf or internal payload of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Exactly one chunk.
    Leaf {
        /// The chunk this leaf draws.
        chunk: ChunkIndex,
    },
    /// Exactly four children in [`ChunkRect::quadrants`] order.
    Internal {
        /// Child node ids.
        children: [NodeId; 4],
    },
}

/// One node of the tree.
#[derive(Clone, Debug)]
pub struct LodNode {
    /// Conservative sphere around this node's geometry and all descendants.
    pub sphere: BoundingSphere,
    /// World-space box of the footprint extruded by the height range.
    pub bounds: Aabb,
    /// Chunks covered by this node.
    pub rect: ChunkRect,
    /// Parent node, `None` for the root.
    pub parent: Option<NodeId>,
    /// Levels above the leaves; leaves are level 0.
    pub level: u32,
    /// Leaf or internal payload.
    pub kind: NodeKind,
}

impl LodNode {
    /// Returns true for leaves.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Lowest world height inside the node.
    pub fn min_height(&self) -> f32 {
        self.bounds.min.y
    }

    /// Highest world height inside the node.
    pub fn max_height(&self) -> f32 {
        self.bounds.max.y
    }
}

/// One entry of a LOD selection: a node drawn as a single mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkSelection {
    /// The selected node.
    pub node: NodeId,
    /// Chunks the node covers.
    pub rect: ChunkRect,
    /// Levels above the leaves (0 is full detail).
    pub level: u32,
    /// Camera distance to the node's sphere center.
    pub distance: f32,
}

/// Decides whether a visible internal node is refined into its children.
pub trait LodPolicy {
    /// Return true to descend into `node`'s children, false to draw it whole.
    fn descend(&self, node: &LodNode, camera_position: Vec3) -> bool;
}

/// Refine while the camera is closer than `ratio` sphere radii, and never
/// draw a node more than `max_coarse_depth` levels above the leaves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceRatioPolicy {
    /// Distance-to-radius ratio under which a node is refined.
    pub ratio: f32,
    /// Coarsest level that may be drawn whole.
    pub max_coarse_depth: u32,
}

impl Default for DistanceRatioPolicy {
    fn default() -> Self {
        Self {
            ratio: 4.0,
            max_coarse_depth: 3,
        }
    }
}

impl LodPolicy for DistanceRatioPolicy {
    fn descend(&self, node: &LodNode, camera_position: Vec3) -> bool {
        node.level > self.max_coarse_depth
            || camera_position.distance(node.sphere.center) < self.ratio * node.sphere.radius
    }
}

/// Always refine down to the leaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FinestPolicy;

impl LodPolicy for FinestPolicy {
    fn descend(&self, _node: &LodNode, _camera_position: Vec3) -> bool {
        true
    }
}

/// The quadtree arena.
#[derive(Clone, Debug)]
pub struct LodTree {
    nodes: Vec<LodNode>,
    root: NodeId,
    chunks_per_side: u32,
    leaf_of_chunk: Vec<NodeId>,
}

impl LodTree {
    /// Build the tree over a `chunks_per_side`² grid. `chunk_bounds(x, z)`
    /// supplies the world box of each chunk.
    pub fn build(
        chunks_per_side: u32,
        mut chunk_bounds: impl FnMut(u32, u32) -> Aabb,
    ) -> Result<Self, TerrainError> {
        if !chunks_per_side.is_power_of_two() {
            return Err(TerrainError::ChunkGrid(chunks_per_side));
        }
        let chunk_count = chunks_per_side as usize * chunks_per_side as usize;
        let mut tree = Self {
            nodes: Vec::with_capacity(chunk_count * 4 / 3 + 1),
            root: NodeId(0),
            chunks_per_side,
            leaf_of_chunk: vec![NodeId(0); chunk_count],
        };
        let root_rect = ChunkRect {
            x: 0,
            z: 0,
            size: chunks_per_side,
        };
        tree.root = tree.build_node(root_rect, chunks_per_side.trailing_zeros(), &mut chunk_bounds);
        log::debug!(
            "Built LOD tree: {} chunks, {} nodes, depth {}",
            chunk_count,
            tree.nodes.len(),
            chunks_per_side.trailing_zeros()
        );
        Ok(tree)
    }

    fn build_node(
        &mut self,
        rect: ChunkRect,
        level: u32,
        chunk_bounds: &mut impl FnMut(u32, u32) -> Aabb,
    ) -> NodeId {
        if rect.size == 1 {
            let chunk = rect.z * self.chunks_per_side + rect.x;
            let bounds = chunk_bounds(rect.x, rect.z);
            let id = NodeId(self.nodes.len() as u32);
            self.nodes.push(LodNode {
                sphere: BoundingSphere::from_aabb(&bounds),
                bounds,
                rect,
                parent: None,
                level: 0,
                kind: NodeKind::Leaf { chunk },
            });
            self.leaf_of_chunk[chunk as usize] = id;
            return id;
        }

        let children = rect
            .quadrants()
            .map(|quadrant| self.build_node(quadrant, level - 1, chunk_bounds));
        let (bounds, sphere) = self.enclose_children(&children);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(LodNode {
            sphere,
            bounds,
            rect,
            parent: None,
            level,
            kind: NodeKind::Internal { children },
        });
        for child in children {
            self.nodes[child.index()].parent = Some(id);
        }
        id
    }

    fn enclose_children(&self, children: &[NodeId; 4]) -> (Aabb, BoundingSphere) {
        let first = &self.nodes[children[0].index()];
        let bounds = children[1..]
            .iter()
            .fold(first.bounds, |acc, c| acc.union(&self.nodes[c.index()].bounds));
        let spheres = children.map(|c| self.nodes[c.index()].sphere);
        let base = BoundingSphere::from_aabb(&bounds);
        let sphere = BoundingSphere::enclosing(base.center, base.radius, &spheres);
        (bounds, sphere)
    }

    /// The root node id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> &LodNode {
        &self.nodes[id.index()]
    }

    /// All nodes in arena order.
    pub fn nodes(&self) -> &[LodNode] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Chunks per grid edge.
    pub fn chunks_per_side(&self) -> u32 {
        self.chunks_per_side
    }

    /// Total chunk count.
    pub fn chunk_count(&self) -> usize {
        self.leaf_of_chunk.len()
    }

    /// The leaf holding `chunk`.
    pub fn leaf_for_chunk(&self, chunk: ChunkIndex) -> Option<NodeId> {
        self.leaf_of_chunk.get(chunk as usize).copied()
    }

    /// `(leaf, chunk)` pairs in arena order.
    pub fn leaves(&self) -> impl Iterator<Item = (NodeId, ChunkIndex)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match n.kind {
            NodeKind::Leaf { chunk } => Some((NodeId(i as u32), chunk)),
            NodeKind::Internal { .. } => None,
        })
    }

    /// Walk from `id`'s parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, move |p| self.node(*p).parent)
    }

    /// Replace a chunk's bounds and refit every ancestor.
    pub fn refit_chunk(&mut self, chunk: ChunkIndex, bounds: Aabb) {
        let Some(leaf) = self.leaf_for_chunk(chunk) else {
            return;
        };
        let node = &mut self.nodes[leaf.index()];
        node.bounds = bounds;
        node.sphere = BoundingSphere::from_aabb(&bounds);

        let mut current = node.parent;
        while let Some(id) = current {
            if let NodeKind::Internal { children } = self.nodes[id.index()].kind {
                let (bounds, sphere) = self.enclose_children(&children);
                let node = &mut self.nodes[id.index()];
                node.bounds = bounds;
                node.sphere = sphere;
            }
            current = self.nodes[id.index()].parent;
        }
    }

    /// Select the nodes to draw for a camera: subtrees whose sphere misses
    /// the frustum are pruned, visible internal nodes are refined while
    /// `policy` asks for it. Each visible chunk is covered by exactly one
    /// selected node.
    pub fn select_chunks(
        &self,
        frustum: &Frustum,
        camera_position: Vec3,
        policy: &dyn LodPolicy,
    ) -> Vec<ChunkSelection> {
        let mut out = Vec::new();
        self.select_node(self.root, Some(frustum), camera_position, policy, &mut out);
        out
    }

    /// Same refinement as [`Self::select_chunks`] without frustum pruning.
    /// The result covers every chunk exactly once.
    pub fn chunks_near(&self, position: Vec3, policy: &dyn LodPolicy) -> Vec<ChunkSelection> {
        let mut out = Vec::new();
        self.select_node(self.root, None, position, policy, &mut out);
        out
    }

    fn select_node(
        &self,
        id: NodeId,
        frustum: Option<&Frustum>,
        camera_position: Vec3,
        policy: &dyn LodPolicy,
        out: &mut Vec<ChunkSelection>,
    ) {
        let node = self.node(id);
        if let Some(frustum) = frustum
            && !frustum.intersects_sphere(&node.sphere)
        {
            return;
        }
        match node.kind {
            NodeKind::Internal { children } if policy.descend(node, camera_position) => {
                for child in children {
                    self.select_node(child, frustum, camera_position, policy, out);
                }
            }
            _ => out.push(ChunkSelection {
                node: id,
                rect: node.rect,
                level: node.level,
                distance: camera_position.distance(node.sphere.center),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const CHUNK_WORLD: f32 = 16.0;

    fn flat_bounds(x: u32, z: u32) -> Aabb {
        let min = Vec3::new(x as f32 * CHUNK_WORLD, 0.0, z as f32 * CHUNK_WORLD);
        Aabb::new(min, min + Vec3::new(CHUNK_WORLD, 1.0, CHUNK_WORLD))
    }

    fn random_tree(rng: &mut ChaCha8Rng, side: u32) -> LodTree {
        LodTree::build(side, |x, z| {
            let lo = rng.random_range(-200.0..50.0);
            let hi = lo + rng.random_range(0.0..300.0);
            let min = Vec3::new(x as f32 * CHUNK_WORLD, lo, z as f32 * CHUNK_WORLD);
            Aabb::new(min, Vec3::new(min.x + CHUNK_WORLD, hi, min.z + CHUNK_WORLD))
        })
        .unwrap()
    }

    fn descendants(tree: &LodTree, id: NodeId, out: &mut Vec<NodeId>) {
        if let NodeKind::Internal { children } = tree.node(id).kind {
            for c in children {
                out.push(c);
                descendants(tree, c, out);
            }
        }
    }

    fn camera_frustum(eye: Vec3, target: Vec3, far: f32) -> Frustum {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let proj = Mat4::perspective_rh(1.0, 16.0 / 9.0, far, 0.5);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn test_rejects_non_power_of_two_grid() {
        assert!(matches!(
            LodTree::build(3, flat_bounds),
            Err(TerrainError::ChunkGrid(3))
        ));
        assert!(matches!(
            LodTree::build(0, flat_bounds),
            Err(TerrainError::ChunkGrid(0))
        ));
    }

    #[test]
    fn test_single_chunk_tree_is_one_leaf() {
        let tree = LodTree::build(1, flat_bounds).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.node(tree.root()).kind, NodeKind::Leaf { chunk: 0 });
    }

    /// Leaf chunk indices are exactly 0..N, each once.
    #[test]
    fn test_leaves_cover_all_chunks_once() {
        for side in [1, 2, 4, 8, 16] {
            let tree = LodTree::build(side, flat_bounds).unwrap();
            let mut chunks: Vec<ChunkIndex> = tree.leaves().map(|(_, c)| c).collect();
            chunks.sort_unstable();
            let expected: Vec<ChunkIndex> = (0..side * side).collect();
            assert_eq!(chunks, expected, "side {side}");
            for (leaf, chunk) in tree.leaves() {
                assert_eq!(tree.leaf_for_chunk(chunk), Some(leaf));
            }
        }
    }

    #[test]
    fn test_internal_nodes_have_exact_quadrants() {
        let tree = LodTree::build(8, flat_bounds).unwrap();
        for node in tree.nodes() {
            if let NodeKind::Internal { children } = node.kind {
                let rects = children.map(|c| tree.node(c).rect);
                assert_eq!(rects, node.rect.quadrants());
                for c in children {
                    assert_eq!(tree.node(c).level + 1, node.level);
                }
            }
        }
        assert!(tree.node(tree.root()).parent.is_none());
        assert_eq!(tree.node(tree.root()).level, 3);
    }

    /// Every node sphere contains the spheres of all its descendants on
    /// randomized terrain.
    #[test]
    fn test_spheres_enclose_descendants_randomized() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        for side in [2, 4, 8, 16] {
            let tree = random_tree(&mut rng, side);
            for (i, node) in tree.nodes().iter().enumerate() {
                let mut below = Vec::new();
                descendants(&tree, NodeId(i as u32), &mut below);
                for d in below {
                    let inner = tree.node(d).sphere;
                    assert!(
                        node.sphere.contains_sphere(&inner),
                        "node {i} {:?} does not contain {inner:?}",
                        node.sphere
                    );
                }
                for corner in node.bounds.corners() {
                    assert!(node.sphere.center.distance(corner) <= node.sphere.radius * 1.0001);
                }
            }
        }
    }

    #[test]
    fn test_refit_keeps_containment() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut tree = random_tree(&mut rng, 8);
        let tall = Aabb::new(
            Vec3::new(3.0 * CHUNK_WORLD, -900.0, 5.0 * CHUNK_WORLD),
            Vec3::new(4.0 * CHUNK_WORLD, 2000.0, 6.0 * CHUNK_WORLD),
        );
        tree.refit_chunk(5 * 8 + 3, tall);
        let leaf = tree.leaf_for_chunk(5 * 8 + 3).unwrap();
        assert_eq!(tree.node(leaf).bounds, tall);
        for ancestor in tree.ancestors(leaf) {
            let node = tree.node(ancestor);
            assert!(node.sphere.contains_sphere(&tree.node(leaf).sphere));
            assert!(node.max_height() >= 2000.0);
        }
    }

    #[test]
    fn test_chunks_near_covers_everything_once() {
        let tree = LodTree::build(16, flat_bounds).unwrap();
        let policy = DistanceRatioPolicy::default();
        let selection = tree.chunks_near(Vec3::new(8.0, 10.0, 8.0), &policy);
        let mut seen = vec![0u32; tree.chunk_count()];
        for s in &selection {
            for c in s.rect.chunk_indices(16) {
                seen[c as usize] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
        // Near the camera we get leaves, far away coarser nodes.
        assert!(selection.iter().any(|s| s.level == 0));
        assert!(selection.iter().any(|s| s.level > 0));
    }

    #[test]
    fn test_finest_policy_selects_only_leaves() {
        let tree = LodTree::build(4, flat_bounds).unwrap();
        let selection = tree.chunks_near(Vec3::ZERO, &FinestPolicy);
        assert_eq!(selection.len(), 16);
        assert!(selection.iter().all(|s| s.level == 0));
    }

    /// No chunk appears twice, and every chunk whose box intersects the
    /// frustum is covered by some selected node.
    #[test]
    fn test_select_chunks_no_duplicates_and_covers_visible() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let side = 16;
        let tree = random_tree(&mut rng, side);
        let policy = DistanceRatioPolicy::default();

        for _ in 0..25 {
            let eye = Vec3::new(
                rng.random_range(-50.0..300.0),
                rng.random_range(50.0..400.0),
                rng.random_range(-50.0..300.0),
            );
            let target = Vec3::new(
                rng.random_range(0.0..256.0),
                0.0,
                rng.random_range(0.0..256.0),
            );
            let frustum = camera_frustum(eye, target, 400.0);
            let selection = tree.select_chunks(&frustum, eye, &policy);

            let mut seen = vec![0u32; tree.chunk_count()];
            for s in &selection {
                for c in s.rect.chunk_indices(side) {
                    seen[c as usize] += 1;
                }
            }
            assert!(seen.iter().all(|&n| n <= 1), "duplicate chunk selected");

            for (leaf, chunk) in tree.leaves() {
                if frustum.is_visible(&tree.node(leaf).bounds) {
                    assert_eq!(seen[chunk as usize], 1, "visible chunk {chunk} not covered");
                }
            }
        }
    }

    #[test]
    fn test_select_chunks_prunes_when_looking_away() {
        let tree = LodTree::build(4, flat_bounds).unwrap();
        let eye = Vec3::new(-10.0, 5.0, -10.0);
        let frustum = camera_frustum(eye, Vec3::new(-100.0, 5.0, -100.0), 50.0);
        assert!(tree.select_chunks(&frustum, eye, &FinestPolicy).is_empty());
    }
}
