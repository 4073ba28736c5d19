use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use glam::{Mat4, Vec3};
use slotmap::SlotMap;
use worldspace_common::{BoundingBox, Generation, GenerationCounter};

use crate::chunk::{ChunkId, WorldChunk};
use crate::quad_tree::{
    ChunkQuadTree, CullStats, QuadTreeError, QuadTreeLayout, QuadTreeToken, TraversalOrder,
};

/// The camera as a visibility pass sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    pub view_projection: Mat4,
    pub eye: Vec3,
    pub direction: Vec3,
}

impl ViewParams {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        let inverse = view.inverse();
        Self {
            view_projection: projection * view,
            eye: inverse.w_axis.truncate(),
            direction: -inverse.z_axis.truncate(),
        }
    }
}

/// Chunks registered for culling, tiled into independent quadtrees.
#[derive(Debug)]
pub struct VisibilityIndex {
    layout: QuadTreeLayout,
    chunks: SlotMap<ChunkId, WorldChunk>,
    trees: BTreeMap<QuadTreeToken, ChunkQuadTree>,
    generations: GenerationCounter,
}

impl VisibilityIndex {
    pub fn new(layout: QuadTreeLayout) -> Result<Self, QuadTreeError> {
        layout.validate()?;
        Ok(Self {
            layout,
            chunks: SlotMap::with_key(),
            trees: BTreeMap::new(),
            generations: GenerationCounter::new(),
        })
    }

    pub fn layout(&self) -> &QuadTreeLayout {
        &self.layout
    }

    /// A fresh pass generation.
    pub fn next_generation(&self) -> Generation {
        self.generations.advance()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&WorldChunk> {
        self.chunks.get(id)
    }

    pub fn tree(&self, token: QuadTreeToken) -> Option<&ChunkQuadTree> {
        self.trees.get(&token)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> impl Iterator<Item = &ChunkQuadTree> {
        self.trees.values()
    }

    pub fn add_chunk(&mut self, chunk: WorldChunk) -> Result<ChunkId, QuadTreeError> {
        let token = self.layout.token(chunk.centre());
        let tree = match self.trees.entry(token) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                tracing::debug!(x = token.x(), z = token.z(), "creating chunk quadtree");
                entry.insert(ChunkQuadTree::new(token, self.layout)?)
            }
        };
        let id = self.chunks.insert(chunk);
        if let Err(err) = tree.add_chunk(id, &self.chunks[id]) {
            if tree.is_empty() {
                self.trees.remove(&token);
            }
            self.chunks.remove(id);
            return Err(err);
        }
        tracing::debug!(?id, centre = ?self.chunks[id].centre(), "chunk added");
        Ok(id)
    }

    /// Unregister a chunk, dropping its tree once the tree is empty.
    pub fn remove_chunk(&mut self, id: ChunkId) -> Option<WorldChunk> {
        let chunk = self.chunks.remove(id)?;
        let token = self.layout.token(chunk.centre());
        if let Some(tree) = self.trees.get_mut(&token) {
            if !tree.remove_chunk(id, &chunk) {
                tracing::debug!(x = token.x(), z = token.z(), "dropping empty chunk quadtree");
                self.trees.remove(&token);
            }
        }
        tracing::debug!(?id, "chunk removed");
        Some(chunk)
    }

    pub fn update_chunk_bounds(&mut self, id: ChunkId, bounds: BoundingBox) -> bool {
        let Some(chunk) = self.chunks.get_mut(id) else {
            return false;
        };
        chunk.set_bounds(bounds);
        let token = self.layout.token(chunk.centre());
        self.trees
            .get_mut(&token)
            .is_some_and(|tree| tree.update_bounds(id, chunk))
    }

    /// The smallest chunk whose box contains `point`, or `None` when the
    /// point is in open space.
    pub fn find_chunk(&self, point: Vec3) -> Option<ChunkId> {
        self.find_containing(point, None)
    }

    /// As [`find_chunk`](Self::find_chunk), never answering `exclude`.
    pub fn find_chunk_excluding(&self, point: Vec3, exclude: ChunkId) -> Option<ChunkId> {
        self.find_containing(point, Some(exclude))
    }

    fn find_containing(&self, point: Vec3, exclude: Option<ChunkId>) -> Option<ChunkId> {
        // boxes may reach past their own tile, so every tree that covers the
        // point takes part
        self.trees
            .values()
            .filter(|tree| tree.bounds().contains_point(point))
            .filter_map(|tree| tree.find_chunk(point, exclude))
            .filter_map(|id| self.chunks.get(id).map(|c| (c.bounds().volume(), id)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, id)| id)
    }

    /// Append the visible chunks to `out`, nearest tree first and roughly
    /// front to back within each tree.
    pub fn calculate_visible(
        &self,
        view: &ViewParams,
        generation: Generation,
        out: &mut Vec<ChunkId>,
    ) -> CullStats {
        let _span = tracing::info_span!("calculate_visible").entered();
        let order = TraversalOrder::from_view_direction(view.direction);

        let mut trees: Vec<(f32, &ChunkQuadTree)> = self
            .trees
            .values()
            .map(|tree| (tree.distance_to_point(view.eye), tree))
            .collect();
        trees.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut stats = CullStats::default();
        for (_, tree) in trees {
            let tree_stats =
                tree.calculate_visible(&view.view_projection, order, generation, &self.chunks, out);
            stats.merge(&tree_stats);
        }
        tracing::trace!(
            trees = self.trees.len(),
            tested = stats.nodes_tested,
            culled = stats.nodes_culled,
            visible = stats.chunks_emitted,
            "visibility pass complete"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top_down(centre: Vec3, half: f32) -> ViewParams {
        ViewParams::new(
            Mat4::look_at_rh(centre + Vec3::Y * 1000.0, centre, Vec3::NEG_Z),
            Mat4::orthographic_rh(-half, half, -half, half, 1.0, 2000.0),
        )
    }

    #[test]
    fn view_params_recover_eye_and_direction() {
        let view = top_down(Vec3::new(400.0, 0.0, 400.0), 390.0);
        assert!(view.eye.distance(Vec3::new(400.0, 1000.0, 400.0)) < 1e-3);
        assert!(view.direction.distance(Vec3::NEG_Y) < 1e-5);
    }

    #[test]
    fn trees_follow_tokens() {
        let mut index = VisibilityIndex::new(QuadTreeLayout::default()).unwrap();
        let a = index.add_chunk(WorldChunk::square(0.0, 0.0, 100.0, 0.0, 1.0)).unwrap();
        let b = index.add_chunk(WorldChunk::square(-100.0, 0.0, 100.0, 0.0, 1.0)).unwrap();
        index.add_chunk(WorldChunk::square(100.0, 0.0, 100.0, 0.0, 1.0)).unwrap();
        assert_eq!(index.tree_count(), 2);
        assert_eq!(index.tree(QuadTreeToken::new(0, 0)).map(|t| t.len()), Some(2));

        assert!(index.remove_chunk(b).is_some());
        assert_eq!(index.tree_count(), 1);
        assert!(index.remove_chunk(b).is_none());
        assert!(index.remove_chunk(a).is_some());
        assert_eq!(index.tree_count(), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn nearest_tree_is_emitted_first() {
        let mut index = VisibilityIndex::new(QuadTreeLayout::default()).unwrap();
        let far = index.add_chunk(WorldChunk::square(1600.0, 0.0, 100.0, 0.0, 1.0)).unwrap();
        let near = index.add_chunk(WorldChunk::square(1500.0, 0.0, 100.0, 0.0, 1.0)).unwrap();
        let mut out = Vec::new();
        let view = top_down(Vec3::new(1500.0, 0.0, 50.0), 300.0);
        index.calculate_visible(&view, index.next_generation(), &mut out);
        assert_eq!(out, vec![near, far]);

        let mut out = Vec::new();
        let view = top_down(Vec3::new(1800.0, 0.0, 50.0), 300.0);
        index.calculate_visible(&view, index.next_generation(), &mut out);
        assert_eq!(out, vec![far, near]);
    }

    #[test]
    fn find_chunk_looks_across_tiles() {
        let mut index = VisibilityIndex::new(QuadTreeLayout::default()).unwrap();
        let west = index.add_chunk(WorldChunk::square(1500.0, 0.0, 100.0, 0.0, 10.0)).unwrap();
        let east = index.add_chunk(WorldChunk::square(1600.0, 0.0, 100.0, 0.0, 10.0)).unwrap();
        assert_eq!(index.find_chunk(Vec3::new(1550.0, 5.0, 50.0)), Some(west));
        assert_eq!(index.find_chunk(Vec3::new(1650.0, 5.0, 50.0)), Some(east));
        assert_eq!(index.find_chunk(Vec3::new(1650.0, 50.0, 50.0)), None);

        // west now overhangs into the next tile
        let wide = BoundingBox::new(Vec3::new(1500.0, 0.0, 0.0), Vec3::new(1800.0, 10.0, 100.0));
        assert!(index.update_chunk_bounds(west, wide));
        let shared = Vec3::new(1650.0, 5.0, 50.0);
        assert_eq!(index.find_chunk(shared), Some(east));
        assert_eq!(index.find_chunk_excluding(shared, east), Some(west));
        assert_eq!(index.find_chunk(Vec3::new(1750.0, 5.0, 50.0)), Some(west));

        index.remove_chunk(west);
        assert_eq!(index.find_chunk_excluding(shared, east), None);
    }

    #[test]
    fn updated_bounds_change_visibility() {
        let mut index = VisibilityIndex::new(QuadTreeLayout::default()).unwrap();
        let id = index.add_chunk(WorldChunk::square(0.0, 0.0, 100.0, 0.0, 10.0)).unwrap();
        let view = top_down(Vec3::new(50.0, 0.0, 50.0), 200.0);

        let mut out = Vec::new();
        index.calculate_visible(&view, index.next_generation(), &mut out);
        assert_eq!(out, vec![id]);

        // lifted above the camera
        let lifted = BoundingBox::new(Vec3::new(0.0, 3000.0, 0.0), Vec3::new(100.0, 3100.0, 100.0));
        assert!(index.update_chunk_bounds(id, lifted));
        out.clear();
        let stats = index.calculate_visible(&view, index.next_generation(), &mut out);
        assert!(out.is_empty());
        assert_eq!(stats.nodes_culled, 1);
    }

    #[test]
    fn invalid_layout_is_refused() {
        let layout = QuadTreeLayout {
            depth: 12,
            ..QuadTreeLayout::default()
        };
        assert_eq!(
            VisibilityIndex::new(layout).unwrap_err(),
            QuadTreeError::Depth(12)
        );
    }
}
