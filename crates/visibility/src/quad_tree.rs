use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use worldspace_common::{BoundingBox, Generation};

use crate::chunk::{ChunkId, WorldChunk};
use crate::outcode::BoxOutcode;

/// Deepest tree a layout may ask for (87 381 nodes).
pub const MAX_QUAD_TREE_DEPTH: u32 = 8;

const ROOT: usize = 0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuadTreeError {
    #[error("quadtree depth must be between 1 and {max}, got {0}", max = MAX_QUAD_TREE_DEPTH)]
    Depth(u32),
    #[error("chunk size must be positive and finite, got {0}")]
    ChunkSize(f32),
    #[error("chunk centre {centre:?} lies outside the tree at {corner:?}")]
    OutsideTree { centre: Vec3, corner: (f32, f32) },
    #[error("leaf {leaf} already holds another chunk")]
    LeafOccupied { leaf: usize, occupant: ChunkId },
}

/// Shape shared by every chunk quadtree: `depth` levels below the root, so
/// each tree covers `chunk_size * 2^depth` on a side and holds one chunk per
/// leaf.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadTreeLayout {
    pub depth: u32,
    pub chunk_size: f32,
}

impl Default for QuadTreeLayout {
    fn default() -> Self {
        Self {
            depth: 4,
            chunk_size: 100.0,
        }
    }
}

impl QuadTreeLayout {
    pub fn validate(&self) -> Result<(), QuadTreeError> {
        if !(1..=MAX_QUAD_TREE_DEPTH).contains(&self.depth) {
            return Err(QuadTreeError::Depth(self.depth));
        }
        if !(self.chunk_size.is_finite() && self.chunk_size > 0.0) {
            return Err(QuadTreeError::ChunkSize(self.chunk_size));
        }
        Ok(())
    }

    /// Leaves along one side of a tree.
    pub fn leaves_per_side(&self) -> u32 {
        1 << self.depth
    }

    /// Side length of the area one tree covers.
    pub fn extent(&self) -> f32 {
        self.chunk_size * self.leaves_per_side() as f32
    }

    /// The tree owning `position`.
    pub fn token(&self, position: Vec3) -> QuadTreeToken {
        QuadTreeToken::from_position(position, self.extent())
    }
}

/// Key of one top-level tree: its tile coordinates packed as two `i16`s,
/// `x` in the high half.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct QuadTreeToken(u32);

impl QuadTreeToken {
    pub fn new(x: i16, z: i16) -> Self {
        Self(((x as u16 as u32) << 16) | z as u16 as u32)
    }

    pub fn from_position(position: Vec3, extent: f32) -> Self {
        let tile = |v: f32| (v / extent).floor().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        Self::new(tile(position.x), tile(position.z))
    }

    pub fn x(self) -> i16 {
        (self.0 >> 16) as u16 as i16
    }

    pub fn z(self) -> i16 {
        self.0 as u16 as i16
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Minimum X/Z corner of the tile.
    pub fn corner(self, extent: f32) -> (f32, f32) {
        (self.x() as f32 * extent, self.z() as f32 * extent)
    }
}

/// Child visiting order for a visibility pass.
///
/// Quadrants are numbered with bit 0 set for the high-X half and bit 1 for
/// the high-Z half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalOrder([usize; 4]);

impl Default for TraversalOrder {
    fn default() -> Self {
        Self([0, 1, 2, 3])
    }
}

impl TraversalOrder {
    /// Nearest quadrant first for a camera looking along `direction`.
    pub fn from_view_direction(direction: Vec3) -> Self {
        let mask = (direction.x < 0.0) as usize | ((direction.z < 0.0) as usize) << 1;
        Self([0, 1, 2, 3].map(|q| q ^ mask))
    }

    pub fn quadrants(&self) -> [usize; 4] {
        self.0
    }
}

/// Counters from one visibility pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CullStats {
    pub nodes_tested: usize,
    pub nodes_culled: usize,
    pub chunks_emitted: usize,
    /// Chunks already stamped with the pass generation.
    pub chunks_repeated: usize,
}

impl CullStats {
    pub fn merge(&mut self, other: &CullStats) {
        self.nodes_tested += other.nodes_tested;
        self.nodes_culled += other.nodes_culled;
        self.chunks_emitted += other.chunks_emitted;
        self.chunks_repeated += other.chunks_repeated;
    }
}

#[derive(Debug, Clone)]
struct QuadNode {
    /// Union of the chunk boxes below, inside-out when empty.
    bounds: BoundingBox,
    /// Chunks held in this subtree.
    live: u32,
    /// Occupant of a leaf; always `None` on inner nodes.
    chunk: Option<ChunkId>,
}

struct CullPass<'a> {
    view_projection: &'a Mat4,
    order: TraversalOrder,
    generation: Generation,
    chunks: &'a SlotMap<ChunkId, WorldChunk>,
    out: &'a mut Vec<ChunkId>,
    stats: CullStats,
    on_test: &'a mut dyn FnMut(usize),
}

/// Static quadtree over the chunks of one tile.
///
/// Every node is allocated up front in depth-first order: node 0 is the root
/// and an inner node's children follow it, each a whole subtree apart.
#[derive(Debug, Clone)]
pub struct ChunkQuadTree {
    token: QuadTreeToken,
    layout: QuadTreeLayout,
    corner: (f32, f32),
    nodes: Vec<QuadNode>,
    /// `subtree_sizes[d]` is the node count of a subtree `d` levels deep.
    subtree_sizes: Vec<usize>,
    /// `leaf_slots[d]` is the leaf count of a subtree `d` levels deep.
    leaf_slots: Vec<u32>,
}

impl ChunkQuadTree {
    pub fn new(token: QuadTreeToken, layout: QuadTreeLayout) -> Result<Self, QuadTreeError> {
        layout.validate()?;
        let subtree_sizes: Vec<usize> = (0..=layout.depth)
            .scan(0usize, |size, _| {
                *size = 4 * *size + 1;
                Some(*size)
            })
            .collect();
        let leaf_slots = (0..=layout.depth).map(|d| 1u32 << (2 * d)).collect();
        let total = subtree_sizes[layout.depth as usize];
        let node = QuadNode {
            bounds: BoundingBox::INSIDE_OUT,
            live: 0,
            chunk: None,
        };
        Ok(Self {
            token,
            corner: token.corner(layout.extent()),
            layout,
            nodes: vec![node; total],
            subtree_sizes,
            leaf_slots,
        })
    }

    pub fn token(&self) -> QuadTreeToken {
        self.token
    }

    pub fn layout(&self) -> &QuadTreeLayout {
        &self.layout
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes[ROOT].live as usize
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT].live == 0
    }

    /// Aggregate bounds of every chunk in the tree.
    pub fn bounds(&self) -> &BoundingBox {
        &self.nodes[ROOT].bounds
    }

    /// Distance from `point` to the tree's aggregate bounds, `f32::MAX` when
    /// empty.
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.nodes[ROOT].bounds.distance_to_point(point)
    }

    fn child(&self, node: usize, level: u32, quadrant: usize) -> usize {
        node + 1 + quadrant * self.subtree_sizes[level as usize - 1]
    }

    /// Nodes from the root down to the leaf owning `centre`.
    fn path_to(&self, centre: Vec3) -> Result<Vec<usize>, QuadTreeError> {
        let extent = self.layout.extent();
        let u = (centre.x - self.corner.0) / extent;
        let v = (centre.z - self.corner.1) / extent;
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            return Err(QuadTreeError::OutsideTree {
                centre,
                corner: self.corner,
            });
        }
        let side = self.layout.leaves_per_side();
        let leaf_x = ((u * side as f32) as u32).min(side - 1);
        let leaf_z = ((v * side as f32) as u32).min(side - 1);

        let mut path = Vec::with_capacity(self.layout.depth as usize + 1);
        let mut node = ROOT;
        path.push(node);
        for level in (1..=self.layout.depth).rev() {
            let bit = level - 1;
            let quadrant =
                ((leaf_x >> bit) & 1) as usize | (((leaf_z >> bit) & 1) as usize) << 1;
            node = self.child(node, level, quadrant);
            path.push(node);
        }
        Ok(path)
    }

    fn refresh(&mut self, path: &[usize]) {
        for (i, &node) in path.iter().enumerate().rev().skip(1) {
            let level = self.layout.depth - i as u32;
            let mut bounds = BoundingBox::INSIDE_OUT;
            for quadrant in 0..4 {
                bounds.add_bounds(&self.nodes[self.child(node, level, quadrant)].bounds);
            }
            self.nodes[node].bounds = bounds;
        }
    }

    /// Place a chunk in the leaf owning its centre. Re-adding a chunk to its
    /// own leaf refreshes its bounds.
    pub fn add_chunk(&mut self, id: ChunkId, chunk: &WorldChunk) -> Result<(), QuadTreeError> {
        let path = self.path_to(chunk.centre())?;
        let leaf = path[path.len() - 1];
        match self.nodes[leaf].chunk {
            Some(occupant) if occupant != id => {
                tracing::error!(leaf, ?occupant, ?id, "quadtree leaf already holds a chunk");
                debug_assert!(occupant == id, "leaf {leaf} already holds {occupant:?}");
                return Err(QuadTreeError::LeafOccupied { leaf, occupant });
            }
            Some(_) => {}
            None => {
                self.nodes[leaf].chunk = Some(id);
                for &node in &path {
                    self.nodes[node].live += 1;
                }
                debug_assert!(
                    self.nodes[ROOT].live <= self.leaf_slots[self.layout.depth as usize]
                );
            }
        }
        self.nodes[leaf].bounds = *chunk.bounds();
        self.refresh(&path);
        Ok(())
    }

    /// Remove a chunk. Returns whether the tree still holds any chunk.
    pub fn remove_chunk(&mut self, id: ChunkId, chunk: &WorldChunk) -> bool {
        let Ok(path) = self.path_to(chunk.centre()) else {
            return !self.is_empty();
        };
        let leaf = path[path.len() - 1];
        if self.nodes[leaf].chunk == Some(id) {
            self.nodes[leaf].chunk = None;
            self.nodes[leaf].bounds = BoundingBox::INSIDE_OUT;
            for &node in &path {
                self.nodes[node].live -= 1;
            }
            self.refresh(&path);
        }
        !self.is_empty()
    }

    /// Re-aggregate after a chunk's visibility box changed. Returns false if
    /// the chunk is not in this tree.
    pub fn update_bounds(&mut self, id: ChunkId, chunk: &WorldChunk) -> bool {
        let Ok(path) = self.path_to(chunk.centre()) else {
            return false;
        };
        let leaf = path[path.len() - 1];
        if self.nodes[leaf].chunk != Some(id) {
            return false;
        }
        self.nodes[leaf].bounds = *chunk.bounds();
        self.refresh(&path);
        true
    }

    /// Smallest chunk whose box contains `point`, other than `exclude`.
    /// Subtrees whose aggregate box misses the point are skipped.
    pub fn find_chunk(&self, point: Vec3, exclude: Option<ChunkId>) -> Option<ChunkId> {
        let mut best: Option<(f32, ChunkId)> = None;
        let mut stack = vec![(ROOT, self.layout.depth)];
        while let Some((node, level)) = stack.pop() {
            let n = &self.nodes[node];
            if n.live == 0 || !n.bounds.contains_point(point) {
                continue;
            }
            if level > 0 {
                stack.extend((0..4).rev().map(|q| (self.child(node, level, q), level - 1)));
                continue;
            }
            if let Some(id) = n.chunk.filter(|id| Some(*id) != exclude) {
                let volume = n.bounds.volume();
                if best.is_none_or(|(smallest, _)| volume < smallest) {
                    best = Some((volume, id));
                }
            }
        }
        best.map(|(_, id)| id)
    }

    /// Append every chunk whose box may intersect the frustum to `out`,
    /// roughly front to back for `order`. Chunks already stamped with
    /// `generation` are skipped.
    pub fn calculate_visible(
        &self,
        view_projection: &Mat4,
        order: TraversalOrder,
        generation: Generation,
        chunks: &SlotMap<ChunkId, WorldChunk>,
        out: &mut Vec<ChunkId>,
    ) -> CullStats {
        self.calculate_visible_with(view_projection, order, generation, chunks, out, &mut |_| {})
    }

    /// As [`calculate_visible`](Self::calculate_visible), reporting each node
    /// given a frustum test to `on_test`.
    pub(crate) fn calculate_visible_with(
        &self,
        view_projection: &Mat4,
        order: TraversalOrder,
        generation: Generation,
        chunks: &SlotMap<ChunkId, WorldChunk>,
        out: &mut Vec<ChunkId>,
        on_test: &mut dyn FnMut(usize),
    ) -> CullStats {
        let mut pass = CullPass {
            view_projection,
            order,
            generation,
            chunks,
            out,
            stats: CullStats::default(),
            on_test,
        };
        self.visit(ROOT, self.layout.depth, &mut pass);
        pass.stats
    }

    fn visit(&self, node: usize, level: u32, pass: &mut CullPass<'_>) {
        let n = &self.nodes[node];
        if n.live == 0 {
            return;
        }
        (pass.on_test)(node);
        pass.stats.nodes_tested += 1;

        let code = BoxOutcode::of_box(&n.bounds, pass.view_projection);
        if code.is_outside() {
            pass.stats.nodes_culled += 1;
            return;
        }
        if code.is_inside() || n.live == 1 || level == 0 {
            self.emit(node, level, pass);
            return;
        }
        for quadrant in pass.order.quadrants() {
            self.visit(self.child(node, level, quadrant), level - 1, pass);
        }
    }

    fn emit(&self, node: usize, level: u32, pass: &mut CullPass<'_>) {
        let n = &self.nodes[node];
        if n.live == 0 {
            return;
        }
        if level == 0 {
            let Some(id) = n.chunk else {
                return;
            };
            let Some(chunk) = pass.chunks.get(id) else {
                return;
            };
            if chunk.mark().stamp(pass.generation) {
                pass.stats.chunks_repeated += 1;
            } else {
                pass.stats.chunks_emitted += 1;
                pass.out.push(id);
            }
            return;
        }
        for quadrant in pass.order.quadrants() {
            self.emit(self.child(node, level, quadrant), level - 1, pass);
        }
    }
}
