use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use serde::Serialize;
use slotmap::SlotMap;
use worldspace_collide::{
    ChunkObstacle, CollisionVisitor, ObstacleId, ObstacleIndex, PointSweep, SweepScene,
    TriangleSweep, cells_covering_clamped, collide,
};
use worldspace_common::{
    BoundingBox, CellCoord, Generation, GenerationCounter, Transform, WorldTriangle,
};

use crate::column::{Column, ColumnGrid};
use crate::config::{ConfigError, SpaceConfig};
use crate::focus::{FocusStats, missing_cells, plan_builds};
use crate::grid::ObstaclePartition;

/// An obstacle whose bounds miss the addressable grid. Carries the
/// obstacle back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("obstacle bounds {min:?}..{max:?} lie outside the addressable grid")]
pub struct OutOfRange {
    pub obstacle: ChunkObstacle,
    pub min: Vec3,
    pub max: Vec3,
}

/// Obstacles placed in a streaming grid, with a focus window of resident
/// per-cell indices that the sweep queries run against.
///
/// Queries only see columns built by [`ChunkSpace::focus`]; cells outside the
/// window report no obstacles.
#[derive(Debug)]
pub struct ChunkSpace {
    config: SpaceConfig,
    obstacles: SlotMap<ObstacleId, ChunkObstacle>,
    partition: ObstaclePartition,
    columns: ColumnGrid,
    generations: GenerationCounter,
}

impl ChunkSpace {
    pub fn new(config: SpaceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            partition: ObstaclePartition::new(),
            columns: ColumnGrid::new(config.focus_span_half, CellCoord::default()),
            obstacles: SlotMap::with_key(),
            generations: GenerationCounter::new(),
            config,
        })
    }

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    /// A fresh query generation.
    pub fn next_generation(&self) -> Generation {
        self.generations.advance()
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn obstacle(&self, id: ObstacleId) -> Option<&ChunkObstacle> {
        self.obstacles.get(id)
    }

    pub fn column(&self, coord: CellCoord) -> Option<Arc<Column>> {
        self.columns.get(coord).cloned()
    }

    pub fn partition(&self) -> &ObstaclePartition {
        &self.partition
    }

    fn placement_cells(&self, bb: &BoundingBox) -> Vec<CellCoord> {
        let SpaceConfig {
            cell_size,
            grid_min,
            grid_max,
            ..
        } = self.config;
        cells_covering_clamped(bb, cell_size, grid_min, grid_max).collect()
    }

    /// Move the focus window to the cell containing `point`: evict columns
    /// that left the window or went stale, then build missing ones nearest
    /// first. Points far off the grid leave an empty window.
    pub fn focus(&mut self, point: Vec3) -> FocusStats {
        let _span = tracing::info_span!("space_focus").entered();
        let started = Instant::now();

        let cell = CellCoord::from_position(point, self.config.cell_size);
        let centre = self.config.clamp_focus(cell);
        if centre != cell {
            tracing::debug!(?cell, ?centre, "focus beyond the grid clamped");
        }
        self.columns.set_centre(centre);
        let evicted = self.columns.evict(|c| !c.is_stale());
        for coord in &evicted {
            tracing::debug!(?coord, "evicting column");
        }

        let missing = missing_cells(&self.columns, |c| self.config.contains(c));
        let (build, deferred) = plan_builds(
            missing,
            centre,
            self.config.focus_span_half,
            self.config.edge_build_budget,
        );
        for coord in &build {
            let column = self.build_column(*coord);
            tracing::debug!(?coord, obstacles = column.index().len(), "building column");
            self.columns.insert(Arc::new(column));
        }

        let stats = FocusStats {
            centre,
            columns_built: build.len(),
            columns_evicted: evicted.len(),
            columns_deferred: deferred,
            resident_columns: self.columns.resident(),
            focus_time: started.elapsed(),
        };
        tracing::trace!(
            built = stats.columns_built,
            evicted = stats.columns_evicted,
            deferred = stats.columns_deferred,
            resident = stats.resident_columns,
            "focus complete"
        );
        stats
    }

    fn build_column(&self, coord: CellCoord) -> Column {
        let column = Column::new(coord, self.config.cell_size, self.config.obstacle_tree_depth);
        for id in self.partition.obstacles_in_cell(coord) {
            if let Some(obstacle) = self.obstacles.get(id) {
                place(column.index(), id, obstacle);
            }
        }
        column
    }

    /// Register an obstacle. Bounds entirely outside the addressable grid
    /// are refused and the obstacle handed back.
    pub fn add_obstacle(&mut self, obstacle: ChunkObstacle) -> Result<ObstacleId, OutOfRange> {
        let bb = obstacle.world_bounds();
        let cells = self.placement_cells(&bb);
        if cells.is_empty() {
            tracing::warn!(min = ?bb.min, max = ?bb.max, "obstacle outside the addressable grid");
            return Err(OutOfRange {
                obstacle,
                min: bb.min,
                max: bb.max,
            });
        }

        let id = self.obstacles.insert(obstacle);
        self.attach(id, &cells);
        tracing::debug!(?id, cells = cells.len(), "obstacle added");
        Ok(id)
    }

    pub fn remove_obstacle(&mut self, id: ObstacleId) -> Option<ChunkObstacle> {
        let bb = self.obstacles.get(id)?.world_bounds();
        let cells = self.placement_cells(&bb);
        self.detach(id, &cells);
        tracing::debug!(?id, "obstacle removed");
        self.obstacles.remove(id)
    }

    /// Move an obstacle and re-place it. Returns false for an unknown id.
    /// A move that takes it off the grid leaves it registered but unplaced
    /// until it moves back.
    pub fn set_obstacle_transform(&mut self, id: ObstacleId, transform: Transform) -> bool {
        let Some(obstacle) = self.obstacles.get(id) else {
            return false;
        };
        let old = self.placement_cells(&obstacle.world_bounds());
        self.detach(id, &old);

        let Some(obstacle) = self.obstacles.get_mut(id) else {
            return false;
        };
        obstacle.set_transform(transform);
        let bb = obstacle.world_bounds();
        let cells = self.placement_cells(&bb);
        if cells.is_empty() {
            tracing::warn!(?id, min = ?bb.min, max = ?bb.max, "obstacle moved off the grid");
        }
        self.attach(id, &cells);
        true
    }

    /// Mark a resident column for rebuild on the next focus.
    pub fn invalidate_column(&mut self, coord: CellCoord) -> bool {
        match self.columns.get(coord) {
            Some(column) => {
                column.mark_stale();
                true
            }
            None => false,
        }
    }

    fn attach(&mut self, id: ObstacleId, cells: &[CellCoord]) {
        self.partition.insert(id, cells.iter().copied());
        let Some(obstacle) = self.obstacles.get(id) else {
            return;
        };
        for coord in cells {
            if let Some(column) = self.columns.get(*coord) {
                place(column.index(), id, obstacle);
            }
        }
    }

    fn detach(&mut self, id: ObstacleId, cells: &[CellCoord]) {
        self.partition.remove(id, cells.iter().copied());
        for coord in cells {
            if let Some(column) = self.columns.get(*coord) {
                column.index().remove(id);
            }
        }
    }

    /// Sweep a ray from `start` to `end`.
    pub fn collide<V>(&self, generation: Generation, start: Vec3, end: Vec3, visitor: &mut V) -> f32
    where
        V: CollisionVisitor + ?Sized,
    {
        collide(self, generation, &PointSweep::new(start), end, visitor)
    }

    /// Sweep a triangle so that its first vertex ends at `end`.
    pub fn collide_triangle<V>(
        &self,
        generation: Generation,
        triangle: WorldTriangle,
        end: Vec3,
        visitor: &mut V,
    ) -> f32
    where
        V: CollisionVisitor + ?Sized,
    {
        collide(self, generation, &TriangleSweep::new(triangle), end, visitor)
    }

    /// Obstacle counts for every cell of the window.
    pub fn summary(&self) -> GridSummary {
        let centre = self.columns.centre();
        let span_half = self.columns.span_half();
        let mut columns = Vec::new();
        for dz in -span_half..=span_half {
            for dx in -span_half..=span_half {
                let coord = CellCoord::new(centre.x + dx, centre.z + dz);
                columns.push(match self.columns.get(coord) {
                    Some(column) => ColumnSummary {
                        coord,
                        resident: true,
                        stale: column.is_stale(),
                        obstacles: column.index().len(),
                    },
                    None => ColumnSummary {
                        coord,
                        resident: false,
                        stale: false,
                        obstacles: self.partition.obstacles_in_cell(coord).count(),
                    },
                });
            }
        }
        GridSummary {
            centre,
            span_half,
            obstacles: self.obstacles.len(),
            window_obstacles: self.partition.obstacles_in_radius(centre, span_half).len(),
            partition_cells: self.partition.cell_count(),
            columns,
        }
    }
}

fn place(index: &ObstacleIndex, id: ObstacleId, obstacle: &ChunkObstacle) {
    if obstacle.is_dynamic() {
        index.add_dynamic(id, obstacle.world_bounds());
    } else {
        index.add(id, obstacle.world_bounds());
    }
}

impl SweepScene for ChunkSpace {
    fn cell_size(&self) -> f32 {
        self.config.cell_size
    }

    fn column(&self, cell: CellCoord) -> Option<&ObstacleIndex> {
        self.columns.get(cell).map(|c| c.index())
    }

    fn obstacle(&self, id: ObstacleId) -> Option<&ChunkObstacle> {
        self.obstacles.get(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub coord: CellCoord,
    pub resident: bool,
    pub stale: bool,
    /// Indexed obstacles if resident, otherwise the partition's count.
    pub obstacles: usize,
}

/// Snapshot of the focus window, row by row from the lowest `z`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSummary {
    pub centre: CellCoord,
    pub span_half: i32,
    pub obstacles: usize,
    pub window_obstacles: usize,
    pub partition_cells: usize,
    pub columns: Vec<ColumnSummary>,
}

impl fmt::Display for GridSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "focus ({}, {}), {} obstacles ({} in window) over {} cells",
            self.centre.x,
            self.centre.z,
            self.obstacles,
            self.window_obstacles,
            self.partition_cells
        )?;
        let span = (2 * self.span_half + 1) as usize;
        // highest z first so the printout reads like a map
        for row in self.columns.chunks(span).rev() {
            write!(f, "{:>6} |", row.first().map_or(0, |c| c.coord.z))?;
            for column in row {
                match (column.resident, column.stale) {
                    (false, _) if column.obstacles == 0 => write!(f, "    .")?,
                    (false, _) => write!(f, " ({:>2})", column.obstacles)?,
                    (true, true) => write!(f, " {:>3}*", column.obstacles)?,
                    (true, false) => write!(f, " {:>4}", column.obstacles)?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
