//! Frustum culling of outdoor chunks, and finding the chunk that holds a
//! point.
//!
//! The world is tiled into independent, fixed-area quadtrees keyed by a
//! [`QuadTreeToken`]. Each tree is allocated once and holds at most one chunk
//! per leaf; inner nodes keep the union of the chunk boxes below them.
//!
//! # Invariants
//! - An inner node's bounds are the union of its non-empty children, or
//!   inside-out when it has none.
//! - A chunk is emitted at most once per pass generation.

mod chunk;
mod index;
mod outcode;
mod quad_tree;

pub use chunk::{ChunkId, WorldChunk};
pub use index::{ViewParams, VisibilityIndex};
pub use outcode::{BoxOutcode, Outcode};
pub use quad_tree::{
    ChunkQuadTree, CullStats, MAX_QUAD_TREE_DEPTH, QuadTreeError, QuadTreeLayout, QuadTreeToken,
    TraversalOrder,
};
