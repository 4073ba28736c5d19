use glam::Vec3;
use worldspace_common::{EntityId, Generation, WorldTriangle};

use crate::obstacle::ChunkObstacle;
use crate::scene::SweepScene;
use crate::shape::{SweepShape, SweepWindow};
use crate::traversal::GridTraversal;

/// Extra margin added to every obstacle box before clipping a sweep to it.
const CLIP_BLOAT: f32 = 0.01;

/// What a visitor wants after seeing a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionAdvance {
    /// Stop the whole sweep.
    Stop,
    /// Only report hits nearer than this one from now on.
    Nearer,
    /// Only report hits farther than this one from now on.
    Farther,
    /// Keep reporting everything.
    All,
}

/// Running state of one top-level sweep.
#[derive(Debug, Clone)]
pub struct CollisionState {
    /// Last reported distance, -1 before the first report.
    pub dist: f32,
    pub only_less: bool,
    pub only_more: bool,
    /// Travel window of the obstacle currently under test.
    pub s_travel: f32,
    pub e_travel: f32,
    stopped: bool,
}

impl Default for CollisionState {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionState {
    pub fn new() -> Self {
        Self {
            dist: -1.0,
            only_less: false,
            only_more: false,
            s_travel: 0.0,
            e_travel: 0.0,
            stopped: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Whether a hit at `distance` passes the current preference.
    pub fn accepts(&self, distance: f32) -> bool {
        !self.stopped
            && !(self.only_less && distance >= self.dist)
            && !(self.only_more && distance <= self.dist)
    }

    /// Whether any part of a travel window can still produce a wanted hit.
    fn window_wanted(&self, start: f32, end: f32) -> bool {
        !(self.only_less && start > self.dist) && !(self.only_more && end < self.dist)
    }

    pub fn apply(&mut self, advance: CollisionAdvance, distance: f32) {
        self.dist = distance;
        match advance {
            CollisionAdvance::Stop => {
                self.only_less = true;
                self.only_more = true;
                self.stopped = true;
            }
            CollisionAdvance::Nearer => {
                self.only_less = true;
                self.only_more = false;
            }
            CollisionAdvance::Farther => {
                self.only_less = false;
                self.only_more = true;
            }
            CollisionAdvance::All => {}
        }
    }
}

/// Adjudicates hits as a sweep finds them.
pub trait CollisionVisitor {
    /// `triangle` is the obstacle triangle that was hit, in world space.
    fn visit(
        &mut self,
        obstacle: &ChunkObstacle,
        triangle: &WorldTriangle,
        distance: f32,
    ) -> CollisionAdvance;
}

impl<F> CollisionVisitor for F
where
    F: FnMut(&ChunkObstacle, &WorldTriangle, f32) -> CollisionAdvance,
{
    fn visit(
        &mut self,
        obstacle: &ChunkObstacle,
        triangle: &WorldTriangle,
        distance: f32,
    ) -> CollisionAdvance {
        self(obstacle, triangle, distance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    pub owner: EntityId,
    pub triangle: WorldTriangle,
    pub distance: f32,
}

/// Keeps the nearest hit.
#[derive(Debug, Default, Clone)]
pub struct ClosestHit {
    pub hit: Option<SweepHit>,
}

impl CollisionVisitor for ClosestHit {
    fn visit(
        &mut self,
        obstacle: &ChunkObstacle,
        triangle: &WorldTriangle,
        distance: f32,
    ) -> CollisionAdvance {
        if self.hit.is_none_or(|h| distance < h.distance) {
            self.hit = Some(SweepHit {
                owner: obstacle.owner(),
                triangle: *triangle,
                distance,
            });
        }
        CollisionAdvance::Nearer
    }
}

/// Stops at the first hit found, which is not necessarily the nearest.
#[derive(Debug, Default, Clone)]
pub struct AnyHit {
    pub hit: Option<SweepHit>,
}

impl CollisionVisitor for AnyHit {
    fn visit(
        &mut self,
        obstacle: &ChunkObstacle,
        triangle: &WorldTriangle,
        distance: f32,
    ) -> CollisionAdvance {
        self.hit = Some(SweepHit {
            owner: obstacle.owner(),
            triangle: *triangle,
            distance,
        });
        CollisionAdvance::Stop
    }
}

/// Outcome of [`sweep`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepReport {
    /// Last distance reported to the visitor, -1 if none.
    pub distance: f32,
    pub cells_visited: usize,
    pub obstacles_tested: usize,
}

/// Sweep `shape` so that its leader ends at `end`, returning the last
/// distance handed to the visitor (-1 when there was none).
pub fn collide<S, V>(
    scene: &(impl SweepScene + ?Sized),
    generation: Generation,
    shape: &S,
    end: Vec3,
    visitor: &mut V,
) -> f32
where
    S: SweepShape,
    V: CollisionVisitor + ?Sized,
{
    sweep(scene, generation, shape, end, visitor).distance
}

/// [`collide`] with traversal statistics.
pub fn sweep<S, V>(
    scene: &(impl SweepScene + ?Sized),
    generation: Generation,
    shape: &S,
    end: Vec3,
    visitor: &mut V,
) -> SweepReport
where
    S: SweepShape,
    V: CollisionVisitor + ?Sized,
{
    let mut report = SweepReport {
        distance: -1.0,
        cells_visited: 0,
        obstacles_tested: 0,
    };
    let movement = end - shape.leader();
    if movement.length_squared() == 0.0 {
        return report;
    }

    let bb = shape.bounds();
    let size = bb.size();
    let csource = bb.centre();
    let cextent = csource + movement;
    let rad = size.length() * 0.5;

    let mut traversal = GridTraversal::new(bb.min, bb.min + movement, size, scene.cell_size());
    let full_dist = traversal.full_dist();
    let direction = traversal.direction();
    let mut state = CollisionState::new();

    while let Some(span) = traversal.next() {
        report.cells_visited += 1;
        if let Some(index) = scene.column(span.cell) {
            let from = csource + direction * (span.start - rad);
            let to = csource + direction * (span.end + rad);
            for id in index.traverse(from, to, rad) {
                let Some(obstacle) = scene.obstacle(id) else {
                    continue;
                };
                if obstacle.mark().stamp(generation) {
                    continue;
                }
                report.obstacles_tested += 1;
                test_obstacle(
                    obstacle, shape, csource, cextent, direction, full_dist, &mut state, visitor,
                );
                if state.is_stopped() {
                    break;
                }
            }
        }
        if state.is_stopped() {
            break;
        }
        if state.only_less && state.dist + rad <= traversal.frontier() {
            break;
        }
    }

    report.distance = state.dist;
    tracing::trace!(
        cells = report.cells_visited,
        obstacles = report.obstacles_tested,
        distance = report.distance,
        "sweep finished"
    );
    report
}

#[allow(clippy::too_many_arguments)]
fn test_obstacle<S, V>(
    obstacle: &ChunkObstacle,
    shape: &S,
    csource: Vec3,
    cextent: Vec3,
    direction: Vec3,
    full_dist: f32,
    state: &mut CollisionState,
    visitor: &mut V,
) where
    S: SweepShape,
    V: CollisionVisitor + ?Sized,
{
    let inverse = obstacle.inverse();
    let local_source = inverse.transform_point3(csource);
    let local_delta = inverse.transform_point3(cextent) - local_source;

    // parametrize on the axis that moves most
    let abs = local_delta.abs();
    let axis = if abs.x >= abs.y && abs.x >= abs.z {
        0
    } else if abs.y >= abs.z {
        1
    } else {
        2
    };
    let axis_delta = local_delta[axis];
    if axis_delta == 0.0 {
        return;
    }

    let mut clipped_start = local_source;
    let mut clipped_end = local_source + local_delta;
    let bloat = shape.bloat_radius_under(inverse) + CLIP_BLOAT;
    if !obstacle
        .local_bounds()
        .clip_segment(&mut clipped_start, &mut clipped_end, bloat)
    {
        return;
    }

    let travel = |p: Vec3| (p[axis] - local_source[axis]) / axis_delta * full_dist;
    let (start, end) = (travel(clipped_start), travel(clipped_end));
    if !state.window_wanted(start, end) {
        return;
    }

    state.s_travel = start;
    state.e_travel = end;
    let window = SweepWindow {
        direction,
        start,
        end,
        clipped_start,
        clipped_end,
    };
    let local = shape.materialize(&window, inverse);
    obstacle.collide(&local, state, visitor);
}
