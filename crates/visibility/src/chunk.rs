use glam::Vec3;
use worldspace_common::{BoundingBox, Mark};

slotmap::new_key_type! {
    /// Handle to a chunk registered with a [`VisibilityIndex`](crate::VisibilityIndex).
    pub struct ChunkId;
}

/// A streamed unit of outdoor world content as the culler sees it.
#[derive(Debug)]
pub struct WorldChunk {
    centre: Vec3,
    bounds: BoundingBox,
    mark: Mark,
}

impl WorldChunk {
    pub fn new(centre: Vec3, bounds: BoundingBox) -> Self {
        Self {
            centre,
            bounds,
            mark: Mark::new(),
        }
    }

    /// Square chunk of `size` whose footprint starts at `(x, z)`, spanning
    /// `min_y..max_y` vertically.
    pub fn square(x: f32, z: f32, size: f32, min_y: f32, max_y: f32) -> Self {
        let bounds = BoundingBox::new(
            Vec3::new(x, min_y, z),
            Vec3::new(x + size, max_y, z + size),
        );
        Self::new(bounds.centre(), bounds)
    }

    pub fn centre(&self) -> Vec3 {
        self.centre
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub(crate) fn set_bounds(&mut self, bounds: BoundingBox) {
        self.bounds = bounds;
    }

    pub fn mark(&self) -> &Mark {
        &self.mark
    }
}
