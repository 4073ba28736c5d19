use serde::{Deserialize, Serialize};
use worldspace_collide::DEFAULT_TREE_DEPTH;
use worldspace_common::CellCoord;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("cell size must be positive and finite, got {0}")]
    CellSize(f32),
    #[error("focus half-span must be between 1 and {max}, got {got}")]
    FocusSpan { got: i32, max: i32 },
    #[error("obstacle tree depth must be between 1 and 15, got {0}")]
    TreeDepth(u32),
    #[error(
        "grid bounds must be non-empty and within ±{limit}: min {min:?}, max {max:?}",
        limit = MAX_GRID_CELL
    )]
    GridBounds { min: CellCoord, max: CellCoord },
}

#[derive(Debug, thiserror::Error)]
pub enum SpaceError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Largest supported focus half-span; the window is `2 * n + 1` cells wide.
pub const MAX_FOCUS_SPAN_HALF: i32 = 64;

/// Largest grid bound magnitude on either axis.
pub const MAX_GRID_CELL: i32 = 1 << 24;

/// Space configuration: grid geometry, focus window and per-focus budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Edge length of one grid cell in world units.
    pub cell_size: f32,
    /// Cells kept resident on each side of the focus cell.
    pub focus_span_half: i32,
    /// Subdivision levels of each cell's obstacle index.
    pub obstacle_tree_depth: u32,
    /// Lowest addressable cell (inclusive).
    pub grid_min: CellCoord,
    /// Highest addressable cell (inclusive).
    pub grid_max: CellCoord,
    /// Maximum number of outermost-ring columns built per focus call.
    pub edge_build_budget: usize,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            cell_size: 100.0,
            focus_span_half: 3,
            obstacle_tree_depth: DEFAULT_TREE_DEPTH,
            grid_min: CellCoord::new(-512, -512),
            grid_max: CellCoord::new(511, 511),
            edge_build_budget: 8,
        }
    }
}

impl SpaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cell_size > 0.0 && self.cell_size.is_finite()) {
            return Err(ConfigError::CellSize(self.cell_size));
        }
        if !(1..=MAX_FOCUS_SPAN_HALF).contains(&self.focus_span_half) {
            return Err(ConfigError::FocusSpan {
                got: self.focus_span_half,
                max: MAX_FOCUS_SPAN_HALF,
            });
        }
        if !(1..=15).contains(&self.obstacle_tree_depth) {
            return Err(ConfigError::TreeDepth(self.obstacle_tree_depth));
        }
        let in_limits = |c: CellCoord| {
            c.x.unsigned_abs().max(c.z.unsigned_abs()) <= MAX_GRID_CELL.unsigned_abs()
        };
        if self.grid_min.x > self.grid_max.x
            || self.grid_min.z > self.grid_max.z
            || !in_limits(self.grid_min)
            || !in_limits(self.grid_max)
        {
            return Err(ConfigError::GridBounds {
                min: self.grid_min,
                max: self.grid_max,
            });
        }
        Ok(())
    }

    /// Parse and validate. Missing keys take their defaults.
    pub fn from_yaml(text: &str) -> Result<Self, SpaceError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn contains(&self, cell: CellCoord) -> bool {
        (self.grid_min.x..=self.grid_max.x).contains(&cell.x)
            && (self.grid_min.z..=self.grid_max.z).contains(&cell.z)
    }

    /// Pull a focus cell toward the grid. Every centre more than one window
    /// beyond the bounds sees no addressable cell, so they all collapse onto
    /// the nearest such centre.
    pub fn clamp_focus(&self, cell: CellCoord) -> CellCoord {
        let reach = self.focus_span_half + 1;
        let clamp = |v: i32, lo: i32, hi: i32| v.clamp(lo - reach, hi + reach);
        CellCoord::new(
            clamp(cell.x, self.grid_min.x, self.grid_max.x),
            clamp(cell.z, self.grid_min.z, self.grid_max.z),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_config_defaults() {
        let config = SpaceConfig::default();
        assert_eq!(config.cell_size, 100.0);
        assert_eq!(config.focus_span_half, 3);
        assert_eq!(config.obstacle_tree_depth, 5);
        assert_eq!(config.edge_build_budget, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_fills_missing_keys_with_defaults() {
        let config = SpaceConfig::from_yaml("cell_size: 50.0\nfocus_span_half: 2\n").unwrap();
        assert_eq!(config.cell_size, 50.0);
        assert_eq!(config.focus_span_half, 2);
        assert_eq!(config.grid_max, CellCoord::new(511, 511));
    }

    #[test]
    fn yaml_reads_grid_bounds() {
        let config =
            SpaceConfig::from_yaml("grid_min: { x: -4, z: -2 }\ngrid_max: { x: 4, z: 2 }\n")
                .unwrap();
        assert!(config.contains(CellCoord::new(-4, 2)));
        assert!(!config.contains(CellCoord::new(5, 0)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad_cell = SpaceConfig {
            cell_size: 0.0,
            ..SpaceConfig::default()
        };
        assert_eq!(bad_cell.validate(), Err(ConfigError::CellSize(0.0)));

        let bad_depth = SpaceConfig {
            obstacle_tree_depth: 0,
            ..SpaceConfig::default()
        };
        assert_eq!(bad_depth.validate(), Err(ConfigError::TreeDepth(0)));

        assert!(matches!(
            SpaceConfig::from_yaml("focus_span_half: 0"),
            Err(SpaceError::Config(ConfigError::FocusSpan { got: 0, .. }))
        ));
        assert!(matches!(
            SpaceConfig::from_yaml("cell_size: [1, 2]"),
            Err(SpaceError::Yaml(_))
        ));
        assert!(matches!(
            SpaceConfig::from_yaml("grid_max: { x: 2147483647, z: 0 }"),
            Err(SpaceError::Config(ConfigError::GridBounds { .. }))
        ));
    }

    #[test]
    fn far_focus_is_clamped_just_past_the_grid() {
        let config = SpaceConfig::default();
        let inside = CellCoord::new(-20, 511);
        assert_eq!(config.clamp_focus(inside), inside);
        assert_eq!(
            config.clamp_focus(CellCoord::new(i32::MAX, i32::MIN)),
            CellCoord::new(511 + 4, -512 - 4)
        );
    }
}
