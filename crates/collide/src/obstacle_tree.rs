use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::Vec3;
use worldspace_common::{BoundingBox, CellCoord};

use crate::obstacle::ObstacleId;

const ROOT: usize = 0;

/// Default number of subdivision levels below the root.
pub const DEFAULT_TREE_DEPTH: u32 = 5;

/// Integer footprint of a bounding box in a tree's `0..2^depth` address
/// space, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QtRange {
    x0: u32,
    z0: u32,
    x1: u32,
    z1: u32,
}

#[derive(Debug)]
struct Node {
    parent: Option<usize>,
    children: [Option<usize>; 4],
    elements: Vec<(ObstacleId, BoundingBox)>,
    bounds: BoundingBox,
}

impl Node {
    fn new(parent: Option<usize>) -> Self {
        Self {
            parent,
            children: [None; 4],
            elements: Vec::new(),
            bounds: BoundingBox::INSIDE_OUT,
        }
    }
}

/// Fixed-depth quadtree over one grid cell's footprint.
///
/// Obstacles descend while their footprint stays inside a single quadrant;
/// anything straddling a split stays at that node. Child nodes are created
/// on first use and never freed, so removal does no rebalancing.
#[derive(Debug)]
pub struct ObstacleTree {
    origin_x: f32,
    origin_z: f32,
    cell_size: f32,
    depth: u32,
    nodes: Vec<Node>,
    locations: HashMap<ObstacleId, usize>,
}

impl ObstacleTree {
    pub fn new(cell: CellCoord, cell_size: f32, depth: u32) -> Self {
        let (origin_x, origin_z) = cell.origin(cell_size);
        Self {
            origin_x,
            origin_z,
            cell_size,
            depth: depth.min(15),
            nodes: vec![Node::new(None)],
            locations: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Union of every element's box; inside-out when empty.
    pub fn bounds(&self) -> BoundingBox {
        self.nodes[ROOT].bounds
    }

    pub fn contains(&self, id: ObstacleId) -> bool {
        self.locations.contains_key(&id)
    }

    fn range(&self, bb: &BoundingBox) -> Option<QtRange> {
        let span = 1_i64 << self.depth;
        let scale = span as f32 / self.cell_size;
        let to_cell = |v: f32, origin: f32| ((v - origin) * scale).floor() as i64;
        let (x0, x1) = (to_cell(bb.min.x, self.origin_x), to_cell(bb.max.x, self.origin_x));
        let (z0, z1) = (to_cell(bb.min.z, self.origin_z), to_cell(bb.max.z, self.origin_z));
        if x1 < 0 || z1 < 0 || x0 >= span || z0 >= span {
            return None;
        }
        let clamp = |v: i64| v.clamp(0, span - 1) as u32;
        Some(QtRange {
            x0: clamp(x0),
            z0: clamp(z0),
            x1: clamp(x1),
            z1: clamp(z1),
        })
    }

    /// Insert an obstacle by its world bounds. Returns false, with a warning,
    /// when the box lies entirely outside this cell.
    pub fn add(&mut self, id: ObstacleId, bb: BoundingBox) -> bool {
        if bb.is_inside_out() {
            tracing::debug!(?id, "ignoring obstacle with empty bounds");
            return false;
        }
        let Some(range) = self.range(&bb) else {
            tracing::warn!(
                ?id,
                min = ?bb.min,
                max = ?bb.max,
                origin_x = self.origin_x,
                origin_z = self.origin_z,
                "obstacle lies outside the cell's index"
            );
            return false;
        };
        self.remove(id);

        let mut node = ROOT;
        for level in 0..self.depth {
            let shift = self.depth - level - 1;
            if range.x0 >> shift != range.x1 >> shift || range.z0 >> shift != range.z1 >> shift {
                break;
            }
            let quadrant = ((range.x0 >> shift) & 1) | (((range.z0 >> shift) & 1) << 1);
            node = self.child(node, quadrant as usize);
        }
        self.place(node, id, bb);
        true
    }

    /// Insert at the root regardless of position, so the obstacle can be
    /// moved without walking the tree.
    pub fn add_dynamic(&mut self, id: ObstacleId, bb: BoundingBox) {
        self.remove(id);
        self.place(ROOT, id, bb);
    }

    pub fn remove(&mut self, id: ObstacleId) -> bool {
        let Some(node) = self.locations.remove(&id) else {
            return false;
        };
        self.nodes[node].elements.retain(|(e, _)| *e != id);
        self.refresh_bounds(node);
        true
    }

    fn place(&mut self, node: usize, id: ObstacleId, bb: BoundingBox) {
        self.nodes[node].elements.push((id, bb));
        self.locations.insert(id, node);
        self.refresh_bounds(node);
    }

    fn child(&mut self, node: usize, quadrant: usize) -> usize {
        if let Some(c) = self.nodes[node].children[quadrant] {
            return c;
        }
        let c = self.nodes.len();
        self.nodes.push(Node::new(Some(node)));
        self.nodes[node].children[quadrant] = Some(c);
        c
    }

    fn refresh_bounds(&mut self, from: usize) {
        let mut current = Some(from);
        while let Some(n) = current {
            let mut bb = BoundingBox::INSIDE_OUT;
            for (_, e) in &self.nodes[n].elements {
                bb.add_bounds(e);
            }
            for c in self.nodes[n].children.into_iter().flatten() {
                bb.add_bounds(&self.nodes[c].bounds);
            }
            self.nodes[n].bounds = bb;
            current = self.nodes[n].parent;
        }
    }

    #[cfg(test)]
    fn node_of(&self, id: ObstacleId) -> Option<usize> {
        self.locations.get(&id).copied()
    }
}

/// Per-cell obstacle index. Mutations take the write lock for the length of
/// the call; a traversal holds the read lock until it is dropped.
#[derive(Debug)]
pub struct ObstacleIndex {
    tree: RwLock<ObstacleTree>,
}

impl ObstacleIndex {
    pub fn new(cell: CellCoord, cell_size: f32, depth: u32) -> Self {
        Self {
            tree: RwLock::new(ObstacleTree::new(cell, cell_size, depth)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ObstacleTree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ObstacleTree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, id: ObstacleId, bb: BoundingBox) -> bool {
        self.write().add(id, bb)
    }

    pub fn add_dynamic(&self, id: ObstacleId, bb: BoundingBox) {
        self.write().add_dynamic(id, bb);
    }

    pub fn remove(&self, id: ObstacleId) -> bool {
        self.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, id: ObstacleId) -> bool {
        self.read().contains(id)
    }

    pub fn bounds(&self) -> BoundingBox {
        self.read().bounds()
    }

    /// Lazily yield obstacles whose boxes come within `radius` of the
    /// segment `source..extent`.
    pub fn traverse(&self, source: Vec3, extent: Vec3, radius: f32) -> ObstacleTraversal<'_> {
        let tree = self.read();
        let stack = if tree.nodes[ROOT].bounds.intersects_segment(source, extent, radius) {
            vec![ROOT]
        } else {
            Vec::new()
        };
        ObstacleTraversal {
            tree,
            source,
            extent,
            radius,
            stack,
            node: None,
            element: 0,
        }
    }
}

/// Iterator returned by [`ObstacleIndex::traverse`].
pub struct ObstacleTraversal<'a> {
    tree: RwLockReadGuard<'a, ObstacleTree>,
    source: Vec3,
    extent: Vec3,
    radius: f32,
    stack: Vec<usize>,
    node: Option<usize>,
    element: usize,
}

impl Iterator for ObstacleTraversal<'_> {
    type Item = ObstacleId;

    fn next(&mut self) -> Option<ObstacleId> {
        let tree: &ObstacleTree = &self.tree;
        loop {
            if let Some(n) = self.node {
                let elements = &tree.nodes[n].elements;
                while self.element < elements.len() {
                    let (id, bb) = elements[self.element];
                    self.element += 1;
                    if bb.intersects_segment(self.source, self.extent, self.radius) {
                        return Some(id);
                    }
                }
                self.node = None;
            }

            let n = self.stack.pop()?;
            for c in tree.nodes[n].children.into_iter().flatten() {
                if tree.nodes[c]
                    .bounds
                    .intersects_segment(self.source, self.extent, self.radius)
                {
                    self.stack.push(c);
                }
            }
            self.node = Some(n);
            self.element = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use slotmap::SlotMap;
    use tracing::Subscriber;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn ids(n: usize) -> Vec<ObstacleId> {
        let mut map: SlotMap<ObstacleId, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn boxed(x: f32, z: f32, half: f32) -> BoundingBox {
        BoundingBox::from_centre(Vec3::new(x, 0.0, z), Vec3::splat(half))
    }

    #[test]
    fn small_obstacles_descend_straddlers_stay_high() {
        let ids = ids(2);
        let mut tree = ObstacleTree::new(CellCoord::new(0, 0), 100.0, DEFAULT_TREE_DEPTH);
        assert!(tree.add(ids[0], boxed(10.0, 10.0, 0.5)));
        assert!(tree.add(ids[1], boxed(50.0, 50.0, 1.0)));
        assert_eq!(tree.len(), 2);
        assert_ne!(tree.node_of(ids[0]), Some(ROOT));
        assert_eq!(tree.node_of(ids[1]), Some(ROOT));
    }

    #[test]
    fn bounds_follow_adds_and_removes() {
        let ids = ids(2);
        let mut tree = ObstacleTree::new(CellCoord::new(1, -1), 100.0, DEFAULT_TREE_DEPTH);
        let a = boxed(110.0, -90.0, 1.0);
        let b = boxed(180.0, -20.0, 2.0);
        tree.add(ids[0], a);
        tree.add(ids[1], b);
        let mut both = a;
        both.add_bounds(&b);
        assert_eq!(tree.bounds(), both);

        assert!(tree.remove(ids[1]));
        assert_eq!(tree.bounds(), a);
        assert!(tree.remove(ids[0]));
        assert!(tree.bounds().is_inside_out());
        assert!(!tree.remove(ids[0]));
    }

    #[test]
    fn partially_outside_is_clamped_in() {
        let ids = ids(1);
        let mut tree = ObstacleTree::new(CellCoord::new(0, 0), 100.0, DEFAULT_TREE_DEPTH);
        assert!(tree.add(ids[0], boxed(-5.0, 50.0, 10.0)));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn outside_obstacle_is_rejected_with_one_warning() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
        let ids = ids(1);
        let index = ObstacleIndex::new(CellCoord::new(0, 0), 100.0, DEFAULT_TREE_DEPTH);

        tracing::subscriber::with_default(subscriber, || {
            assert!(!index.add(ids[0], boxed(250.0, 50.0, 1.0)));
        });

        assert_eq!(index.len(), 0);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn traverse_yields_only_boxes_near_segment() {
        let ids = ids(3);
        let index = ObstacleIndex::new(CellCoord::new(0, 0), 100.0, DEFAULT_TREE_DEPTH);
        index.add(ids[0], boxed(10.0, 10.0, 1.0));
        index.add(ids[1], boxed(90.0, 10.0, 1.0));
        index.add(ids[2], boxed(50.0, 80.0, 1.0));

        let hits: Vec<ObstacleId> = index
            .traverse(Vec3::new(0.0, 0.0, 10.0), Vec3::new(100.0, 0.0, 10.0), 0.0)
            .collect();
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&ids[0]) && hits.contains(&ids[1]));

        // a fat enough sweep reaches the third box as well
        let wide = index
            .traverse(Vec3::new(0.0, 0.0, 10.0), Vec3::new(100.0, 0.0, 10.0), 70.0)
            .count();
        assert_eq!(wide, 3);
    }

    #[test]
    fn dynamic_obstacles_live_at_root() {
        let ids = ids(1);
        let mut tree = ObstacleTree::new(CellCoord::new(0, 0), 100.0, DEFAULT_TREE_DEPTH);
        tree.add_dynamic(ids[0], boxed(10.0, 10.0, 0.5));
        assert_eq!(tree.node_of(ids[0]), Some(ROOT));
        tree.add_dynamic(ids[0], boxed(60.0, 70.0, 0.5));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.bounds(), boxed(60.0, 70.0, 0.5));
    }
}
