use glam::{Mat4, Vec3};
use worldspace_common::{BoundingBox, EntityId, Mark, Transform, WorldTriangle};

use crate::shape::LocalSweep;
use crate::sweep::{CollisionState, CollisionVisitor};

slotmap::new_key_type! {
    /// Handle to an obstacle in a space's arena. Indices hold these rather
    /// than references, and a stale handle simply fails to resolve.
    pub struct ObstacleId;
}

/// Hits closer together than this along one sweep are treated as a single
/// contact (a segment crossing an edge shared by two triangles).
const COINCIDENT_HIT: f32 = 1e-3;

#[derive(Debug, thiserror::Error)]
pub enum ObstacleError {
    #[error("height field needs at least 2x2 samples, got {columns}x{rows}")]
    HeightFieldTooSmall { columns: usize, rows: usize },
    #[error("height field expects {expected} samples, got {actual}")]
    HeightFieldSize { expected: usize, actual: usize },
    #[error("height field spacing must be positive, got {0}")]
    HeightFieldSpacing(f32),
    #[error("triangle index {index} out of range for {vertices} vertices")]
    MeshIndex { index: u32, vertices: usize },
}

/// Indexed triangle soup in the obstacle's local frame.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    vertices: Vec<Vec3>,
    indices: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Result<Self, ObstacleError> {
        if let Some(&index) = indices.iter().flatten().find(|&&i| i as usize >= vertices.len()) {
            return Err(ObstacleError::MeshIndex {
                index,
                vertices: vertices.len(),
            });
        }
        Ok(Self { vertices, indices })
    }

    /// Closed box mesh, two triangles per face.
    pub fn from_bounds(bb: &BoundingBox) -> Self {
        // corner index bits: 1 = +x, 2 = +y, 4 = +z
        const FACES: [[u32; 4]; 6] = [
            [0, 1, 5, 4], // -y
            [2, 6, 7, 3], // +y
            [0, 4, 6, 2], // -x
            [1, 3, 7, 5], // +x
            [0, 2, 3, 1], // -z
            [4, 5, 7, 6], // +z
        ];
        let indices = FACES
            .iter()
            .flat_map(|[a, b, c, d]| [[*a, *b, *c], [*a, *c, *d]])
            .collect();
        Self {
            vertices: bb.corners().to_vec(),
            indices,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangles(&self) -> impl Iterator<Item = WorldTriangle> + '_ {
        self.indices.iter().map(|[a, b, c]| {
            WorldTriangle::new(
                self.vertices[*a as usize],
                self.vertices[*b as usize],
                self.vertices[*c as usize],
            )
        })
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(self.vertices.iter().copied())
    }
}

/// Regular grid of heights on the local X/Z plane, first sample at the
/// local origin.
#[derive(Debug, Clone)]
pub struct HeightField {
    columns: usize,
    rows: usize,
    spacing: f32,
    heights: Vec<f32>,
}

impl HeightField {
    /// `heights` is row-major: `heights[row * columns + column]`.
    pub fn new(
        columns: usize,
        rows: usize,
        spacing: f32,
        heights: Vec<f32>,
    ) -> Result<Self, ObstacleError> {
        if columns < 2 || rows < 2 {
            return Err(ObstacleError::HeightFieldTooSmall { columns, rows });
        }
        if !(spacing > 0.0) {
            return Err(ObstacleError::HeightFieldSpacing(spacing));
        }
        if heights.len() != columns * rows {
            return Err(ObstacleError::HeightFieldSize {
                expected: columns * rows,
                actual: heights.len(),
            });
        }
        Ok(Self {
            columns,
            rows,
            spacing,
            heights,
        })
    }

    fn point(&self, column: usize, row: usize) -> Vec3 {
        Vec3::new(
            column as f32 * self.spacing,
            self.heights[row * self.columns + column],
            row as f32 * self.spacing,
        )
    }

    pub fn bounds(&self) -> BoundingBox {
        let (lo, hi) = self
            .heights
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), h| (lo.min(*h), hi.max(*h)));
        BoundingBox::new(
            Vec3::new(0.0, lo, 0.0),
            Vec3::new(
                (self.columns - 1) as f32 * self.spacing,
                hi,
                (self.rows - 1) as f32 * self.spacing,
            ),
        )
    }

    /// Triangles of every grid square whose footprint overlaps `area`.
    fn for_each_triangle_in(&self, area: &BoundingBox, mut f: impl FnMut(WorldTriangle)) {
        let squares = |lo: f32, hi: f32, count: usize| {
            let last = count as i64 - 2;
            let first = ((lo / self.spacing).floor() as i64).clamp(0, last);
            let end = ((hi / self.spacing).floor() as i64).clamp(0, last);
            first as usize..=end as usize
        };
        let width = (self.columns - 1) as f32 * self.spacing;
        let depth = (self.rows - 1) as f32 * self.spacing;
        if area.max.x < 0.0 || area.max.z < 0.0 || area.min.x > width || area.min.z > depth {
            return;
        }
        for row in squares(area.min.z, area.max.z, self.rows) {
            for column in squares(area.min.x, area.max.x, self.columns) {
                let p00 = self.point(column, row);
                let p10 = self.point(column + 1, row);
                let p01 = self.point(column, row + 1);
                let p11 = self.point(column + 1, row + 1);
                f(WorldTriangle::new(p00, p11, p10));
                f(WorldTriangle::new(p00, p01, p11));
            }
        }
    }
}

/// What an obstacle is made of. Both variants answer the same swept-shape
/// queries.
#[derive(Debug, Clone)]
pub enum ObstacleGeometry {
    Mesh(TriangleMesh),
    Terrain(HeightField),
}

impl ObstacleGeometry {
    pub fn bounds(&self) -> BoundingBox {
        match self {
            Self::Mesh(mesh) => mesh.bounds(),
            Self::Terrain(field) => field.bounds(),
        }
    }

    fn for_each_triangle_in(&self, area: &BoundingBox, mut f: impl FnMut(WorldTriangle)) {
        match self {
            Self::Mesh(mesh) => mesh
                .triangles()
                .filter(|t| t.bounds().intersects(area))
                .for_each(f),
            Self::Terrain(field) => field.for_each_triangle_in(area, &mut f),
        }
    }
}

/// A placed obstacle: immutable geometry, mutable placement.
#[derive(Debug)]
pub struct ChunkObstacle {
    owner: EntityId,
    geometry: ObstacleGeometry,
    local_bounds: BoundingBox,
    transform: Transform,
    matrix: Mat4,
    inverse: Mat4,
    dynamic: bool,
    mark: Mark,
}

impl ChunkObstacle {
    pub fn new(owner: EntityId, geometry: ObstacleGeometry, transform: Transform) -> Self {
        let local_bounds = geometry.bounds();
        let matrix = transform.matrix();
        Self {
            owner,
            geometry,
            local_bounds,
            transform,
            matrix,
            inverse: matrix.inverse(),
            dynamic: false,
            mark: Mark::new(),
        }
    }

    /// Axis-aligned box obstacle centred on the transform's origin.
    pub fn cuboid(owner: EntityId, half_extents: Vec3, transform: Transform) -> Self {
        let bb = BoundingBox::from_centre(Vec3::ZERO, half_extents);
        Self::new(
            owner,
            ObstacleGeometry::Mesh(TriangleMesh::from_bounds(&bb)),
            transform,
        )
    }

    /// Flag as dynamic: indices keep it at their root so moves stay cheap.
    pub fn into_dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn geometry(&self) -> &ObstacleGeometry {
        &self.geometry
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.matrix = transform.matrix();
        self.inverse = self.matrix.inverse();
    }

    pub fn matrix(&self) -> &Mat4 {
        &self.matrix
    }

    pub fn inverse(&self) -> &Mat4 {
        &self.inverse
    }

    pub fn local_bounds(&self) -> &BoundingBox {
        &self.local_bounds
    }

    pub fn world_bounds(&self) -> BoundingBox {
        self.local_bounds.transformed(&self.matrix)
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn mark(&self) -> &Mark {
        &self.mark
    }

    /// Narrow phase: test a shape already brought into this obstacle's frame
    /// over the travel window held in `state`, reporting hits nearest first.
    pub(crate) fn collide<V: CollisionVisitor + ?Sized>(
        &self,
        local: &LocalSweep,
        state: &mut CollisionState,
        visitor: &mut V,
    ) {
        let (s, e) = (state.s_travel, state.e_travel);
        let area = local.bounds().expanded(COINCIDENT_HIT);

        let mut hits: Vec<(f32, WorldTriangle)> = Vec::new();
        self.geometry.for_each_triangle_in(&area, |tri| {
            let fraction = match *local {
                LocalSweep::Segment { start, end } => tri.segment_fraction(start, end),
                LocalSweep::Prism {
                    triangle,
                    translation,
                } => triangle.sweep_fraction(&tri, translation),
            };
            if let Some(f) = fraction {
                hits.push((s + f * (e - s), tri));
            }
        });
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut previous: Option<f32> = None;
        for (distance, tri) in hits {
            if previous.is_some_and(|p| distance - p < COINCIDENT_HIT) {
                continue;
            }
            previous = Some(distance);
            if !state.accepts(distance) {
                continue;
            }
            let world = tri.transformed(&self.matrix);
            let advance = visitor.visit(self, &world, distance);
            state.apply(advance, distance);
            if state.is_stopped() {
                return;
            }
        }
    }
}
