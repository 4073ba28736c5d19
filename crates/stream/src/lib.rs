//! Streaming chunk space: obstacle registration, a focus window of resident
//! per-cell indices, and sweep queries against it.
//!
//! # Invariants
//! - Every registered obstacle is recorded in the partition for each
//!   addressable cell its bounds touch, resident or not.
//! - A resident column's index matches the partition for its cell unless the
//!   column is marked stale.
//! - Moving the focus never rebuilds a resident, non-stale column.

mod column;
mod config;
mod focus;
mod grid;
mod space;

pub use column::{Column, ColumnGrid};
pub use config::{ConfigError, MAX_FOCUS_SPAN_HALF, MAX_GRID_CELL, SpaceConfig, SpaceError};
pub use focus::FocusStats;
pub use grid::ObstaclePartition;
pub use space::{ChunkSpace, ColumnSummary, GridSummary, OutOfRange};
