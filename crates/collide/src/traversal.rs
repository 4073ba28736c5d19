use glam::Vec3;
use worldspace_common::CellCoord;

/// Events closer together than this (relative to the path length) are
/// applied as one batch.
const EVENT_EPSILON: f32 = 1e-6;

/// A cell delivered by [`GridTraversal`]: the swept box overlaps `cell`
/// between travel distances `start` and `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSpan {
    pub cell: CellCoord,
    pub start: f32,
    pub end: f32,
}

/// One axis of the walk. `lo..=hi` are the cells the box currently covers on
/// this axis; the leading edge enters new cells and the trailing edge leaves
/// them.
#[derive(Debug, Clone, Copy)]
struct AxisWalk {
    origin: f32,
    width: f32,
    velocity: f32,
    lo: i32,
    hi: i32,
}

impl AxisWalk {
    fn new(origin: f32, width: f32, velocity: f32, cell_size: f32) -> Self {
        Self {
            origin,
            width,
            velocity,
            lo: (origin / cell_size).floor() as i32,
            hi: ((origin + width) / cell_size).floor() as i32,
        }
    }

    /// Travel at which the leading edge reaches a new cell. Never once the
    /// edge sits in the last representable cell.
    fn next_enter(&self, cell_size: f32) -> f32 {
        let t = if self.velocity > 0.0 && self.hi < i32::MAX {
            ((self.hi as f32 + 1.0) * cell_size - (self.origin + self.width)) / self.velocity
        } else if self.velocity < 0.0 && self.lo > i32::MIN {
            (self.lo as f32 * cell_size - self.origin) / self.velocity
        } else {
            return f32::INFINITY;
        };
        t.max(0.0)
    }

    fn next_leave(&self, cell_size: f32) -> f32 {
        let t = if self.velocity > 0.0 && self.lo < i32::MAX {
            ((self.lo as f32 + 1.0) * cell_size - self.origin) / self.velocity
        } else if self.velocity < 0.0 && self.hi > i32::MIN {
            (self.hi as f32 * cell_size - (self.origin + self.width)) / self.velocity
        } else {
            return f32::INFINITY;
        };
        t.max(0.0)
    }

    fn enter(&mut self) {
        if self.velocity > 0.0 {
            self.hi += 1;
        } else {
            self.lo -= 1;
        }
    }

    fn leave(&mut self) {
        if self.velocity > 0.0 {
            self.lo += 1;
        } else {
            self.hi -= 1;
        }
    }

    fn contains(&self, k: i32) -> bool {
        (self.lo..=self.hi).contains(&k)
    }
}

/// Walks a uniform X/Z grid along a 3-D segment, reporting every cell the
/// moving box overlaps together with its travel window.
///
/// Travel distances are measured along the full 3-D path, so `end` of the
/// last window equals [`GridTraversal::full_dist`]. Cells are delivered once
/// their window closes, smallest `start` first among cells closing together;
/// a wide box may therefore deliver a cell it entered early after cells it
/// entered later.
#[derive(Debug, Clone)]
pub struct GridTraversal {
    source: Vec3,
    size: Vec3,
    cell_size: f32,
    direction: Vec3,
    full_dist: f32,
    x: AxisWalk,
    z: AxisWalk,
    open: Vec<(CellCoord, f32)>,
    pending: Vec<CellSpan>,
    finished: bool,
}

impl GridTraversal {
    /// `source` is the minimum corner of the box at the start of the move,
    /// `extent` the same corner at its end.
    pub fn new(source: Vec3, extent: Vec3, size: Vec3, cell_size: f32) -> Self {
        let delta = extent - source;
        let full_dist = delta.length();
        let direction = if full_dist > 0.0 {
            delta / full_dist
        } else {
            Vec3::ZERO
        };
        let mut traversal = Self {
            source,
            size: size.max(Vec3::ZERO),
            cell_size,
            direction,
            full_dist,
            x: AxisWalk::new(source.x, 0.0, 0.0, cell_size),
            z: AxisWalk::new(source.z, 0.0, 0.0, cell_size),
            open: Vec::new(),
            pending: Vec::new(),
            finished: false,
        };
        traversal.restart();
        traversal
    }

    /// Rewind to the start of the path.
    pub fn restart(&mut self) {
        self.x = AxisWalk::new(self.source.x, self.size.x, self.direction.x, self.cell_size);
        self.z = AxisWalk::new(self.source.z, self.size.z, self.direction.z, self.cell_size);
        self.open.clear();
        self.pending.clear();
        self.finished = false;
        for cx in self.x.lo..=self.x.hi {
            for cz in self.z.lo..=self.z.hi {
                self.open.push((CellCoord::new(cx, cz), 0.0));
            }
        }
    }

    pub fn full_dist(&self) -> f32 {
        self.full_dist
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.pending.is_empty()
    }

    /// Smallest travel distance at which a not yet delivered cell starts.
    /// `f32::INFINITY` once everything has been delivered.
    pub fn frontier(&self) -> f32 {
        let mut frontier = f32::INFINITY;
        for span in &self.pending {
            frontier = frontier.min(span.start);
        }
        for (_, start) in &self.open {
            frontier = frontier.min(*start);
        }
        if !self.finished {
            frontier = frontier.min(self.next_event());
        }
        frontier
    }

    fn next_event(&self) -> f32 {
        let g = self.cell_size;
        self.x
            .next_enter(g)
            .min(self.x.next_leave(g))
            .min(self.z.next_enter(g))
            .min(self.z.next_leave(g))
    }

    /// Apply the next batch of simultaneous events, moving closed cells to
    /// the pending stack.
    fn advance(&mut self) {
        let t = self.next_event();
        if !(t <= self.full_dist) {
            let end = self.full_dist;
            let closed: Vec<CellSpan> = self
                .open
                .drain(..)
                .map(|(cell, start)| CellSpan { cell, start, end })
                .collect();
            self.push_closed(closed);
            self.finished = true;
            return;
        }

        let g = self.cell_size;
        let limit = t + EVENT_EPSILON * self.full_dist.max(1.0);
        let (old_x, old_z) = (self.x, self.z);
        let (enter_x, leave_x) = (self.x.next_enter(g) <= limit, self.x.next_leave(g) <= limit);
        let (enter_z, leave_z) = (self.z.next_enter(g) <= limit, self.z.next_leave(g) <= limit);
        if enter_x {
            self.x.enter();
        }
        if leave_x {
            self.x.leave();
        }
        if enter_z {
            self.z.enter();
        }
        if leave_z {
            self.z.leave();
        }

        let (x, z) = (self.x, self.z);
        let mut closed = Vec::new();
        self.open.retain(|&(cell, start)| {
            let keep = x.contains(cell.x) && z.contains(cell.z);
            if !keep {
                closed.push(CellSpan {
                    cell,
                    start,
                    end: t,
                });
            }
            keep
        });
        // open always mirrors the old rectangle, so only entered cells are new
        for cx in x.lo..=x.hi {
            for cz in z.lo..=z.hi {
                if !(old_x.contains(cx) && old_z.contains(cz)) {
                    self.open.push((CellCoord::new(cx, cz), t));
                }
            }
        }
        self.push_closed(closed);
    }

    fn push_closed(&mut self, closed: Vec<CellSpan>) {
        if closed.is_empty() {
            return;
        }
        let g = self.cell_size;
        let dir = self.direction;
        let along = |span: &CellSpan| {
            let (ox, oz) = span.cell.origin(g);
            (ox + 0.5 * g) * dir.x + (oz + 0.5 * g) * dir.z
        };
        self.pending.extend(closed);
        // popped from the back, so the latest start sits at the bottom
        self.pending.sort_by(|a, b| {
            b.start
                .total_cmp(&a.start)
                .then_with(|| along(b).total_cmp(&along(a)))
                .then_with(|| b.cell.cmp(&a.cell))
        });
    }
}

impl Iterator for GridTraversal {
    type Item = CellSpan;

    fn next(&mut self) -> Option<CellSpan> {
        loop {
            if let Some(span) = self.pending.pop() {
                return Some(span);
            }
            if self.finished {
                return None;
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const G: f32 = 100.0;

    /// Travel window during which `[a0, a0 + w]` moving at `v` overlaps cell
    /// `k` of one axis, computed directly.
    fn axis_window(k: i32, a0: f32, w: f32, v: f32, len: f32) -> Option<(f32, f32)> {
        let lo_edge = k as f32 * G;
        let hi_edge = (k + 1) as f32 * G;
        let (t0, t1) = if v == 0.0 {
            let first = (a0 / G).floor() as i32;
            let last = ((a0 + w) / G).floor() as i32;
            if !(first..=last).contains(&k) {
                return None;
            }
            (0.0, len)
        } else if v > 0.0 {
            ((lo_edge - a0 - w) / v, (hi_edge - a0) / v)
        } else {
            ((hi_edge - a0) / v, (lo_edge - a0 - w) / v)
        };
        let (t0, t1) = (t0.max(0.0), t1.min(len));
        (t0 <= t1).then_some((t0, t1))
    }

    fn brute_force(source: Vec3, extent: Vec3, size: Vec3) -> HashMap<CellCoord, (f32, f32)> {
        let delta = extent - source;
        let len = delta.length();
        let dir = if len > 0.0 { delta / len } else { Vec3::ZERO };
        let range = |a: f32, w: f32, d: f32| {
            let lo = (a.min(a + d) / G).floor() as i32 - 1;
            let hi = ((a + w).max(a + w + d) / G).floor() as i32 + 1;
            lo..=hi
        };
        let mut cells = HashMap::new();
        for cx in range(source.x, size.x, delta.x) {
            for cz in range(source.z, size.z, delta.z) {
                let wx = axis_window(cx, source.x, size.x, dir.x, len);
                let wz = axis_window(cz, source.z, size.z, dir.z, len);
                if let (Some((x0, x1)), Some((z0, z1))) = (wx, wz) {
                    let (s, e) = (x0.max(z0), x1.min(z1));
                    if s <= e {
                        cells.insert(CellCoord::new(cx, cz), (s, e));
                    }
                }
            }
        }
        cells
    }

    fn check_against_brute_force(source: Vec3, extent: Vec3, size: Vec3) {
        let spans: Vec<CellSpan> = GridTraversal::new(source, extent, size, G).collect();
        let expected = brute_force(source, extent, size);

        let mut seen = HashMap::new();
        for span in &spans {
            assert!(
                seen.insert(span.cell, (span.start, span.end)).is_none(),
                "cell {:?} delivered twice for {source} -> {extent}",
                span.cell
            );
            let (s, e) = expected
                .get(&span.cell)
                .unwrap_or_else(|| {
                    panic!("unexpected cell {:?} for {source} -> {extent}", span.cell)
                });
            assert!((span.start - s).abs() < 1e-2, "start {} vs {s}", span.start);
            assert!((span.end - e).abs() < 1e-2, "end {} vs {e}", span.end);
        }
        for (cell, (s, e)) in &expected {
            if e - s > 1e-3 {
                assert!(seen.contains_key(cell), "missing cell {cell:?} for {source} -> {extent}");
            }
        }
    }

    #[test]
    fn axis_aligned_sweeps_match_brute_force() {
        let sizes = [Vec3::ZERO, Vec3::new(37.5, 1.0, 12.25), Vec3::new(180.0, 4.0, 230.0)];
        let starts = [
            Vec3::new(13.7, 0.0, 41.3),
            Vec3::new(-161.9, 5.0, 77.1),
            Vec3::new(250.4, -2.0, -333.3),
        ];
        let moves = [
            Vec3::new(612.3, 0.0, 0.0),
            Vec3::new(-488.1, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 701.9),
            Vec3::new(0.0, 30.0, -355.5),
        ];
        for size in sizes {
            for start in starts {
                for m in moves {
                    check_against_brute_force(start, start + m, size);
                }
            }
        }
    }

    #[test]
    fn diagonal_sweeps_match_brute_force() {
        let sizes = [Vec3::ZERO, Vec3::new(57.3, 0.0, 21.9), Vec3::new(140.2, 10.0, 260.7)];
        let starts = [Vec3::new(13.7, 0.0, 41.3), Vec3::new(-161.9, 5.0, 77.1)];
        let moves = [
            Vec3::new(612.3, 0.0, 233.9),
            Vec3::new(-488.1, 12.0, 519.7),
            Vec3::new(-97.3, -40.0, -803.9),
        ];
        for size in sizes {
            for start in starts {
                for m in moves {
                    check_against_brute_force(start, start + m, size);
                }
            }
        }
    }

    #[test]
    fn wide_box_sweeps_match_brute_force() {
        let size = Vec3::new(2250.0, 0.0, 1730.0);
        let sweeps = [
            (Vec3::new(-13.7, 0.0, 41.3), Vec3::new(980.1, 0.0, 1377.6)),
            (Vec3::new(407.0, 0.0, -92.5), Vec3::new(-1311.2, 0.0, -20.4)),
        ];
        for (source, extent) in sweeps {
            check_against_brute_force(source, extent, size);
        }
    }

    #[test]
    fn walk_stops_at_the_last_representable_cell() {
        let far = Vec3::new(3.0e11, 0.0, 50.0);
        let end = far + Vec3::new(1.0e6, 0.0, 0.0);
        let spans: Vec<CellSpan> = GridTraversal::new(far, end, Vec3::ZERO, G).collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].cell, CellCoord::new(i32::MAX, 0));
        assert_eq!(spans[0].end, (end - far).length());

        let near = Vec3::new(-3.0e11, 0.0, 50.0);
        let size = Vec3::new(250.0, 0.0, 10.0);
        let spans: Vec<CellSpan> =
            GridTraversal::new(near, near - Vec3::new(1.0e6, 0.0, 0.0), size, G).collect();
        assert!(!spans.is_empty());
        assert!(spans.iter().all(|s| s.cell.x == i32::MIN));
    }

    #[test]
    fn ray_is_single_path() {
        let start = Vec3::new(13.7, 0.0, 41.3);
        let end = Vec3::new(612.3, 80.0, 275.2);
        let mut spans: Vec<CellSpan> = GridTraversal::new(start, end, Vec3::ZERO, G).collect();
        spans.sort_by(|a, b| a.start.total_cmp(&b.start));

        // 6 vertical and 2 horizontal grid lines crossed, never at a corner
        assert_eq!(spans.len(), 1 + 6 + 2);
        for pair in spans.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert_eq!((a.cell.x - b.cell.x).abs() + (a.cell.z - b.cell.z).abs(), 1);
            assert!((a.end - b.start).abs() < 1e-3);
        }
        let full = (end - start).length();
        assert_eq!(spans[0].start, 0.0);
        assert!((spans.last().unwrap().end - full).abs() < 1e-3);
    }

    #[test]
    fn ray_through_exact_corners_has_no_phantom_cells() {
        let start = Vec3::new(50.0, 0.0, 50.0);
        let end = Vec3::new(350.0, 0.0, 350.0);
        let cells: Vec<CellCoord> = GridTraversal::new(start, end, Vec3::ZERO, G)
            .map(|s| s.cell)
            .collect();
        assert_eq!(
            cells,
            vec![
                CellCoord::new(0, 0),
                CellCoord::new(1, 1),
                CellCoord::new(2, 2),
                CellCoord::new(3, 3)
            ]
        );
    }

    #[test]
    fn vertical_ray_stays_in_one_cell() {
        let spans: Vec<CellSpan> = GridTraversal::new(
            Vec3::new(0.0, -500.0, 0.0),
            Vec3::new(0.0, 500.0, 0.0),
            Vec3::ZERO,
            G,
        )
        .collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].cell, CellCoord::new(0, 0));
        assert_eq!((spans[0].start, spans[0].end), (0.0, 1000.0));
    }

    #[test]
    fn zero_length_delivers_starting_cells() {
        let source = Vec3::new(90.0, 0.0, 10.0);
        let spans: Vec<CellSpan> =
            GridTraversal::new(source, source, Vec3::new(20.0, 0.0, 5.0), G).collect();
        let mut cells: Vec<CellCoord> = spans.iter().map(|s| s.cell).collect();
        cells.sort();
        assert_eq!(cells, vec![CellCoord::new(0, 0), CellCoord::new(1, 0)]);
        assert!(spans.iter().all(|s| s.start == 0.0 && s.end == 0.0));
    }

    #[test]
    fn restart_replays_the_same_sequence() {
        let mut traversal = GridTraversal::new(
            Vec3::new(-20.0, 0.0, 30.0),
            Vec3::new(450.0, 0.0, -170.0),
            Vec3::new(60.0, 0.0, 60.0),
            G,
        );
        let first: Vec<CellSpan> = traversal.by_ref().collect();
        assert!(traversal.is_finished());
        traversal.restart();
        let second: Vec<CellSpan> = traversal.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn frontier_never_passes_an_undelivered_start() {
        let mut traversal = GridTraversal::new(
            Vec3::new(13.0, 0.0, 27.0),
            Vec3::new(713.0, 0.0, 391.0),
            Vec3::new(150.0, 0.0, 90.0),
            G,
        );
        let mut delivered = Vec::new();
        loop {
            let frontier = traversal.frontier();
            let Some(span) = traversal.next() else { break };
            delivered.push((frontier, span));
        }
        for (i, (frontier, _)) in delivered.iter().enumerate() {
            for (_, later) in &delivered[i..] {
                assert!(*frontier <= later.start + 1e-4);
            }
        }
        assert_eq!(traversal.frontier(), f32::INFINITY);
    }
}
