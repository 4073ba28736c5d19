use std::time::Duration;

use serde::Serialize;
use worldspace_common::CellCoord;

use crate::column::ColumnGrid;

/// Per-focus statistics for instrumentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FocusStats {
    pub centre: CellCoord,
    pub columns_built: usize,
    pub columns_evicted: usize,
    /// Outermost-ring columns left for a later focus by the budget.
    pub columns_deferred: usize,
    pub resident_columns: usize,
    pub focus_time: Duration,
}

/// Cells of the window that have no resident column, nearest first.
pub(crate) fn missing_cells(
    grid: &ColumnGrid,
    addressable: impl Fn(CellCoord) -> bool,
) -> Vec<CellCoord> {
    let centre = grid.centre();
    let r = grid.span_half();
    let mut missing: Vec<CellCoord> = (-r..=r)
        .flat_map(|dz| (-r..=r).map(move |dx| CellCoord::new(centre.x + dx, centre.z + dz)))
        .filter(|c| addressable(*c) && grid.get(*c).is_none())
        .collect();
    missing.sort_by_key(|c| {
        let (dx, dz) = (c.x - centre.x, c.z - centre.z);
        (c.ring_distance(centre), dx * dx + dz * dz, c.z, c.x)
    });
    missing
}

/// Split missing cells into those to build now and the number deferred.
/// Inner cells are always built; the outermost ring is limited to `budget`.
pub(crate) fn plan_builds(
    missing: Vec<CellCoord>,
    centre: CellCoord,
    span_half: i32,
    budget: usize,
) -> (Vec<CellCoord>, usize) {
    let mut build = Vec::with_capacity(missing.len());
    let mut edge_built = 0;
    let mut deferred = 0;
    for coord in missing {
        if coord.ring_distance(centre) < span_half {
            build.push(coord);
        } else if edge_built < budget {
            edge_built += 1;
            build.push(coord);
        } else {
            deferred += 1;
        }
    }
    (build, deferred)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cells_are_nearest_first() {
        let grid = ColumnGrid::new(2, CellCoord::new(10, -3));
        let missing = missing_cells(&grid, |_| true);
        assert_eq!(missing.len(), 25);
        assert_eq!(missing[0], CellCoord::new(10, -3));
        let rings: Vec<i32> = missing
            .iter()
            .map(|c| c.ring_distance(CellCoord::new(10, -3)))
            .collect();
        assert!(rings.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn missing_cells_respect_addressable_bounds() {
        let grid = ColumnGrid::new(1, CellCoord::new(0, 0));
        let missing = missing_cells(&grid, |c| c.x >= 0);
        assert_eq!(missing.len(), 6);
    }

    #[test]
    fn budget_limits_only_the_edge_ring() {
        let grid = ColumnGrid::new(2, CellCoord::new(0, 0));
        let missing = missing_cells(&grid, |_| true);
        let (build, deferred) = plan_builds(missing, CellCoord::new(0, 0), 2, 4);
        // 3x3 inner block plus four edge cells
        assert_eq!(build.len(), 9 + 4);
        assert_eq!(deferred, 16 - 4);
    }

    #[test]
    fn zero_budget_still_builds_inner_cells() {
        let grid = ColumnGrid::new(1, CellCoord::new(0, 0));
        let (build, deferred) =
            plan_builds(missing_cells(&grid, |_| true), CellCoord::new(0, 0), 1, 0);
        assert_eq!(build, vec![CellCoord::new(0, 0)]);
        assert_eq!(deferred, 8);
    }
}
