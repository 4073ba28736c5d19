//! Shared types for the worldspace spatial core: ids, transforms, cell
//! coordinates, bounding volumes, triangles and query generation marks.
//!
//! # Invariants
//! - An empty `BoundingBox` is inside-out, never a degenerate point box.
//! - A `Generation` is never zero, so a fresh `Mark` is never mistaken for
//!   having been visited.

mod geometry;
mod mark;
mod types;

pub use geometry::{BoundingBox, WorldTriangle};
pub use mark::{Generation, GenerationCounter, Mark};
pub use types::{CellCoord, EntityId, Transform};
