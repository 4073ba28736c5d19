use std::collections::HashMap;

use slotmap::SlotMap;
use worldspace_common::{BoundingBox, CellCoord};

use crate::obstacle::{ChunkObstacle, ObstacleId};
use crate::obstacle_tree::ObstacleIndex;

/// What the sweep engine needs from a world: per-cell indices and an arena
/// to resolve the handles they hold.
pub trait SweepScene {
    fn cell_size(&self) -> f32;

    /// The index of a materialized cell; `None` means no obstacles.
    fn column(&self, cell: CellCoord) -> Option<&ObstacleIndex>;

    fn obstacle(&self, id: ObstacleId) -> Option<&ChunkObstacle>;
}

/// Every cell whose footprint a box touches.
pub fn cells_covering(
    bb: &BoundingBox,
    cell_size: f32,
) -> impl Iterator<Item = CellCoord> + use<> {
    cells_covering_clamped(
        bb,
        cell_size,
        CellCoord::new(i32::MIN, i32::MIN),
        CellCoord::new(i32::MAX, i32::MAX),
    )
}

/// Cells a box touches within `min..=max` (inclusive). The range is clamped
/// before iterating, so a box far larger than the grid costs only the grid.
pub fn cells_covering_clamped(
    bb: &BoundingBox,
    cell_size: f32,
    min: CellCoord,
    max: CellCoord,
) -> impl Iterator<Item = CellCoord> + use<> {
    let (lo, hi) = if bb.is_inside_out() {
        (CellCoord::new(0, 0), CellCoord::new(-1, -1))
    } else {
        let lo = CellCoord::from_position(bb.min, cell_size);
        let hi = CellCoord::from_position(bb.max, cell_size);
        (
            CellCoord::new(lo.x.max(min.x), lo.z.max(min.z)),
            CellCoord::new(hi.x.min(max.x), hi.z.min(max.z)),
        )
    };
    (lo.x..=hi.x).flat_map(move |x| (lo.z..=hi.z).map(move |z| CellCoord::new(x, z)))
}

/// Unbounded scene with every cell resident. Handy for tools and tests that
/// do not need a focus window.
#[derive(Debug)]
pub struct GridScene {
    cell_size: f32,
    depth: u32,
    columns: HashMap<CellCoord, ObstacleIndex>,
    obstacles: SlotMap<ObstacleId, ChunkObstacle>,
}

impl GridScene {
    pub fn new(cell_size: f32, depth: u32) -> Self {
        Self {
            cell_size,
            depth,
            columns: HashMap::new(),
            obstacles: SlotMap::with_key(),
        }
    }

    pub fn insert(&mut self, obstacle: ChunkObstacle) -> ObstacleId {
        let bb = obstacle.world_bounds();
        let dynamic = obstacle.is_dynamic();
        let id = self.obstacles.insert(obstacle);
        for cell in cells_covering(&bb, self.cell_size) {
            let index = self
                .columns
                .entry(cell)
                .or_insert_with(|| ObstacleIndex::new(cell, self.cell_size, self.depth));
            if dynamic {
                index.add_dynamic(id, bb);
            } else {
                index.add(id, bb);
            }
        }
        id
    }

    pub fn remove(&mut self, id: ObstacleId) -> Option<ChunkObstacle> {
        let obstacle = self.obstacles.remove(id)?;
        for cell in cells_covering(&obstacle.world_bounds(), self.cell_size) {
            if let Some(index) = self.columns.get(&cell) {
                index.remove(id);
            }
        }
        Some(obstacle)
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

impl SweepScene for GridScene {
    fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn column(&self, cell: CellCoord) -> Option<&ObstacleIndex> {
        self.columns.get(&cell)
    }

    fn obstacle(&self, id: ObstacleId) -> Option<&ChunkObstacle> {
        self.obstacles.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use worldspace_common::{EntityId, Transform};

    #[test]
    fn covering_spans_every_touched_cell() {
        let bb = BoundingBox::new(Vec3::new(-10.0, 0.0, 90.0), Vec3::new(110.0, 5.0, 120.0));
        let cells: Vec<CellCoord> = cells_covering(&bb, 100.0).collect();
        assert_eq!(cells.len(), 3 * 2);
        assert!(cells.contains(&CellCoord::new(-1, 0)));
        assert!(cells.contains(&CellCoord::new(1, 1)));
        assert_eq!(cells_covering(&BoundingBox::INSIDE_OUT, 100.0).count(), 0);
    }

    #[test]
    fn clamped_covering_stays_inside_the_range() {
        let (min, max) = (CellCoord::new(-4, -4), CellCoord::new(4, 4));
        let huge = BoundingBox::from_centre(Vec3::ZERO, Vec3::splat(1.0e12));
        let cells: Vec<CellCoord> = cells_covering_clamped(&huge, 100.0, min, max).collect();
        assert_eq!(cells.len(), 81);
        assert_eq!(cells.first(), Some(&min));
        assert_eq!(cells.last(), Some(&max));

        let beside = BoundingBox::new(Vec3::new(900.0, 0.0, 0.0), Vec3::new(1.0e9, 1.0, 50.0));
        assert_eq!(cells_covering_clamped(&beside, 100.0, min, max).count(), 0);
    }

    #[test]
    fn insert_and_remove_touch_every_covered_column() {
        let mut scene = GridScene::new(100.0, 5);
        let id = scene.insert(ChunkObstacle::cuboid(
            EntityId::new(),
            Vec3::new(20.0, 1.0, 1.0),
            Transform::from_position(Vec3::new(100.0, 0.0, 50.0)),
        ));
        assert_eq!(scene.column_count(), 2);
        assert!(scene.column(CellCoord::new(0, 0)).is_some_and(|c| c.contains(id)));
        assert!(scene.column(CellCoord::new(1, 0)).is_some_and(|c| c.contains(id)));

        assert!(scene.remove(id).is_some());
        assert!(scene.is_empty());
        assert!(scene.column(CellCoord::new(0, 0)).is_some_and(|c| c.is_empty()));
        assert!(scene.remove(id).is_none());
    }
}
