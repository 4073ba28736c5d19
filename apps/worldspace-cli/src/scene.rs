use anyhow::Context;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use worldspace_collide::{ChunkObstacle, HeightField, ObstacleGeometry};
use worldspace_common::{EntityId, Transform};
use worldspace_stream::{ChunkSpace, SpaceConfig};
use worldspace_visibility::{QuadTreeLayout, VisibilityIndex, WorldChunk};

/// Samples per side of the demo terrain.
const TERRAIN_SAMPLES: usize = 33;

/// Settings file layout. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub space: SpaceConfig,
    pub visibility: QuadTreeLayout,
}

impl CliConfig {
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let config: Self = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Self::default(),
        };
        config.space.validate().context("invalid space settings")?;
        config.visibility.validate().context("invalid visibility settings")?;
        Ok(config)
    }
}

/// A rolling terrain under a field of rotated boxes, centred on the origin.
pub fn demo_space(config: &SpaceConfig, obstacles: usize) -> anyhow::Result<ChunkSpace> {
    let mut space = ChunkSpace::new(config.clone())?;

    let spacing = config.cell_size * 0.5;
    let half = spacing * (TERRAIN_SAMPLES - 1) as f32 * 0.5;
    let heights = (0..TERRAIN_SAMPLES * TERRAIN_SAMPLES)
        .map(|k| {
            let (i, j) = ((k % TERRAIN_SAMPLES) as f32, (k / TERRAIN_SAMPLES) as f32);
            (i * 0.4).sin() * 3.0 + (j * 0.3).cos() * 2.0
        })
        .collect();
    let terrain = HeightField::new(TERRAIN_SAMPLES, TERRAIN_SAMPLES, spacing, heights)?;
    let terrain = ChunkObstacle::new(
        EntityId::new(),
        ObstacleGeometry::Terrain(terrain),
        Transform::from_position(Vec3::new(-half, -5.0, -half)),
    );
    if let Err(err) = space.add_obstacle(terrain) {
        tracing::warn!(%err, "demo terrain not placed");
    }

    let side = (obstacles as f32).sqrt().ceil().max(1.0) as usize;
    let pitch = config.cell_size * 1.5;
    let mut placed = 0;
    for k in 0..obstacles {
        let (gx, gz) = ((k % side) as f32, (k / side) as f32);
        let position = Vec3::new(
            (gx - side as f32 * 0.5) * pitch,
            0.0,
            (gz - side as f32 * 0.5) * pitch,
        );
        let half_extents = Vec3::new(
            10.0 + (k * 37 % 30) as f32,
            5.0 + (k * 17 % 40) as f32,
            10.0 + (k * 53 % 30) as f32,
        );
        let transform = Transform {
            position: position + Vec3::Y * half_extents.y,
            rotation: Quat::from_rotation_y(k as f32 * 0.3),
            ..Transform::default()
        };
        let mut obstacle = ChunkObstacle::cuboid(EntityId::new(), half_extents, transform);
        if k % 7 == 3 {
            obstacle = obstacle.into_dynamic();
        }
        if space.add_obstacle(obstacle).is_ok() {
            placed += 1;
        }
    }
    tracing::info!(placed, requested = obstacles, "demo space ready");
    Ok(space)
}

/// `side` x `side` chunks centred on the origin with uneven heights.
pub fn demo_chunks(layout: &QuadTreeLayout, side: u32) -> anyhow::Result<VisibilityIndex> {
    let mut index = VisibilityIndex::new(*layout)?;
    let size = layout.chunk_size;
    let origin = -(side as f32) * size * 0.5;
    for i in 0..side {
        for j in 0..side {
            let height = 20.0 + ((i * 7 + j * 13) % 9) as f32 * 15.0;
            let chunk = WorldChunk::square(
                origin + i as f32 * size,
                origin + j as f32 * size,
                size,
                -10.0,
                height,
            );
            index.add_chunk(chunk)?;
        }
    }
    tracing::info!(chunks = index.len(), trees = index.tree_count(), "demo chunks ready");
    Ok(index)
}
