//! Swept collision over a uniform X/Z grid of obstacle indices.
//!
//! # Invariants
//! - Travel distances are measured along the full 3-D path, so traversal
//!   windows and hit distances compare directly.
//! - An obstacle is tested at most once per query generation.
//! - With a nearer-only preference, reported distances never increase.

mod obstacle;
mod obstacle_tree;
mod scene;
mod shape;
mod sweep;
mod traversal;

pub use obstacle::{
    ChunkObstacle, HeightField, ObstacleError, ObstacleGeometry, ObstacleId, TriangleMesh,
};
pub use obstacle_tree::{DEFAULT_TREE_DEPTH, ObstacleIndex, ObstacleTraversal, ObstacleTree};
pub use scene::{GridScene, SweepScene, cells_covering, cells_covering_clamped};
pub use shape::{LocalSweep, PointSweep, SweepShape, SweepWindow, TriangleSweep};
pub use sweep::{
    AnyHit, ClosestHit, CollisionAdvance, CollisionState, CollisionVisitor, SweepHit, SweepReport,
    collide, sweep,
};
pub use traversal::{CellSpan, GridTraversal};
