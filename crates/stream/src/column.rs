use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use worldspace_collide::ObstacleIndex;
use worldspace_common::CellCoord;

/// A materialized grid cell: its obstacle index plus a stale flag set when
/// the cell must be rebuilt on the next focus.
#[derive(Debug)]
pub struct Column {
    coord: CellCoord,
    index: ObstacleIndex,
    stale: AtomicBool,
}

impl Column {
    pub fn new(coord: CellCoord, cell_size: f32, depth: u32) -> Self {
        Self {
            coord,
            index: ObstacleIndex::new(coord, cell_size, depth),
            stale: AtomicBool::new(false),
        }
    }

    pub fn coord(&self) -> CellCoord {
        self.coord
    }

    pub fn index(&self) -> &ObstacleIndex {
        &self.index
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Relaxed)
    }

    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::Relaxed);
    }
}

/// Square window of resident columns around a centre cell, stored as a ring
/// buffer so moving the centre never shifts existing entries.
#[derive(Debug)]
pub struct ColumnGrid {
    span_half: i32,
    span: i32,
    centre: CellCoord,
    slots: Vec<Option<Arc<Column>>>,
}

impl ColumnGrid {
    pub fn new(span_half: i32, centre: CellCoord) -> Self {
        let span = 2 * span_half.max(0) + 1;
        Self {
            span_half: span_half.max(0),
            span,
            centre,
            slots: vec![None; (span * span) as usize],
        }
    }

    pub fn centre(&self) -> CellCoord {
        self.centre
    }

    pub fn span_half(&self) -> i32 {
        self.span_half
    }

    pub fn set_centre(&mut self, centre: CellCoord) {
        self.centre = centre;
    }

    pub fn in_window(&self, coord: CellCoord) -> bool {
        coord.ring_distance(self.centre) <= self.span_half
    }

    fn slot(&self, coord: CellCoord) -> usize {
        (coord.x.rem_euclid(self.span) + coord.z.rem_euclid(self.span) * self.span) as usize
    }

    pub fn get(&self, coord: CellCoord) -> Option<&Arc<Column>> {
        if !self.in_window(coord) {
            return None;
        }
        self.slots[self.slot(coord)]
            .as_ref()
            .filter(|c| c.coord() == coord)
    }

    /// Store a column, returning whatever occupied its slot.
    pub fn insert(&mut self, column: Arc<Column>) -> Option<Arc<Column>> {
        let slot = self.slot(column.coord());
        self.slots[slot].replace(column)
    }

    /// Drop columns outside the window and any for which `keep` is false.
    pub fn evict(&mut self, keep: impl Fn(&Column) -> bool) -> Vec<CellCoord> {
        let (centre, span_half) = (self.centre, self.span_half);
        let mut evicted = Vec::new();
        for slot in &mut self.slots {
            let drop = slot
                .as_ref()
                .is_some_and(|c| c.coord().ring_distance(centre) > span_half || !keep(c));
            if drop {
                if let Some(column) = slot.take() {
                    evicted.push(column.coord());
                }
            }
        }
        evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.slots.iter().flatten()
    }

    pub fn resident(&self) -> usize {
        self.iter().count()
    }
}
