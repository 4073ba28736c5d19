use std::collections::{HashMap, HashSet};

use worldspace_collide::ObstacleId;
use worldspace_common::CellCoord;

/// Space-wide record of which obstacles touch which cells.
///
/// Covers the whole addressable grid, not just the resident window, so a
/// column can be rebuilt whenever the focus returns to it.
#[derive(Debug, Default)]
pub struct ObstaclePartition {
    cells: HashMap<CellCoord, HashSet<ObstacleId>>,
}

impl ObstaclePartition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ObstacleId, cells: impl IntoIterator<Item = CellCoord>) {
        for coord in cells {
            self.cells.entry(coord).or_default().insert(id);
        }
    }

    pub fn remove(&mut self, id: ObstacleId, cells: impl IntoIterator<Item = CellCoord>) {
        for coord in cells {
            if let Some(set) = self.cells.get_mut(&coord) {
                set.remove(&id);
                if set.is_empty() {
                    self.cells.remove(&coord);
                }
            }
        }
    }

    pub fn obstacles_in_cell(&self, coord: CellCoord) -> impl Iterator<Item = ObstacleId> + '_ {
        self.cells.get(&coord).into_iter().flatten().copied()
    }

    /// Obstacles touching any cell within `radius` cells (square) of `center`.
    pub fn obstacles_in_radius(&self, center: CellCoord, radius: i32) -> HashSet<ObstacleId> {
        let mut result = HashSet::new();
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let coord = CellCoord::new(center.x + dx, center.z + dz);
                if let Some(ids) = self.cells.get(&coord) {
                    result.extend(ids);
                }
            }
        }
        result
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Total number of obstacle placements across all cells.
    pub fn total_placements(&self) -> usize {
        self.cells.values().map(|s| s.len()).sum()
    }
}
