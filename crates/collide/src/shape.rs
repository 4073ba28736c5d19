use glam::{Mat4, Vec3};
use worldspace_common::{BoundingBox, WorldTriangle};

/// A sweep shape brought into an obstacle's local frame for one travel
/// window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalSweep {
    Segment { start: Vec3, end: Vec3 },
    Prism {
        triangle: WorldTriangle,
        translation: Vec3,
    },
}

impl LocalSweep {
    /// Box enclosing everything the shape touches over the window.
    pub fn bounds(&self) -> BoundingBox {
        match *self {
            Self::Segment { start, end } => BoundingBox::from_points([start, end]),
            Self::Prism {
                triangle,
                translation,
            } => {
                let mut bb = triangle.bounds();
                bb.add_bounds(&triangle.translated(translation).bounds());
                bb
            }
        }
    }
}

/// Where a candidate obstacle clipped the sweep, in travel distance and in
/// the obstacle's frame.
#[derive(Debug, Clone, Copy)]
pub struct SweepWindow {
    pub direction: Vec3,
    pub start: f32,
    pub end: f32,
    pub clipped_start: Vec3,
    pub clipped_end: Vec3,
}

/// A shape that can be swept through the world.
pub trait SweepShape {
    /// The point whose movement defines the sweep.
    fn leader(&self) -> Vec3;

    fn bounds(&self) -> BoundingBox;

    /// Radius that covers the shape about its box centre after applying
    /// `inverse`'s linear part.
    fn bloat_radius_under(&self, inverse: &Mat4) -> f32;

    fn materialize(&self, window: &SweepWindow, inverse: &Mat4) -> LocalSweep;
}

/// Upper bound on how much `m` can stretch a vector (Frobenius norm of the
/// linear part).
fn stretch(m: &Mat4) -> f32 {
    (m.x_axis.truncate().length_squared()
        + m.y_axis.truncate().length_squared()
        + m.z_axis.truncate().length_squared())
    .sqrt()
}

/// A ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointSweep {
    pub origin: Vec3,
}

impl PointSweep {
    pub fn new(origin: Vec3) -> Self {
        Self { origin }
    }
}

impl SweepShape for PointSweep {
    fn leader(&self) -> Vec3 {
        self.origin
    }

    fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.origin, self.origin)
    }

    fn bloat_radius_under(&self, _inverse: &Mat4) -> f32 {
        0.0
    }

    fn materialize(&self, window: &SweepWindow, _inverse: &Mat4) -> LocalSweep {
        LocalSweep::Segment {
            start: window.clipped_start,
            end: window.clipped_end,
        }
    }
}

/// A triangle swept along a straight line, i.e. a prism. `v0` leads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleSweep {
    pub triangle: WorldTriangle,
}

impl TriangleSweep {
    pub fn new(triangle: WorldTriangle) -> Self {
        Self { triangle }
    }
}

impl SweepShape for TriangleSweep {
    fn leader(&self) -> Vec3 {
        self.triangle.v0
    }

    fn bounds(&self) -> BoundingBox {
        self.triangle.bounds()
    }

    fn bloat_radius_under(&self, inverse: &Mat4) -> f32 {
        self.bounds().size().length() * 0.5 * stretch(inverse)
    }

    fn materialize(&self, window: &SweepWindow, inverse: &Mat4) -> LocalSweep {
        let at_start = self
            .triangle
            .translated(window.direction * window.start)
            .transformed(inverse);
        let lead_end = inverse.transform_point3(self.triangle.v0 + window.direction * window.end);
        LocalSweep::Prism {
            triangle: at_start,
            translation: lead_end - at_start.v0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_has_no_bloat() {
        let p = PointSweep::new(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p.bloat_radius_under(&Mat4::from_scale(Vec3::splat(4.0))), 0.0);
        assert_eq!(p.bounds().size(), Vec3::ZERO);
    }

    #[test]
    fn triangle_bloat_covers_scaled_half_extent() {
        let t = TriangleSweep::new(WorldTriangle::new(
            Vec3::ZERO,
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
        ));
        let plain = t.bloat_radius_under(&Mat4::IDENTITY);
        assert!(plain >= 2.0_f32.sqrt() - 1e-6);
        let scaled = t.bloat_radius_under(&Mat4::from_scale(Vec3::splat(0.5)));
        assert!(scaled >= 0.5 * 2.0_f32.sqrt() - 1e-6);
    }

    #[test]
    fn triangle_materializes_in_local_frame() {
        let t = TriangleSweep::new(WorldTriangle::new(
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(11.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 1.0),
        ));
        let inverse = Mat4::from_translation(Vec3::new(-10.0, 0.0, 0.0));
        let window = SweepWindow {
            direction: Vec3::Y,
            start: 2.0,
            end: 5.0,
            clipped_start: Vec3::ZERO,
            clipped_end: Vec3::ZERO,
        };
        let LocalSweep::Prism {
            triangle,
            translation,
        } = t.materialize(&window, &inverse)
        else {
            panic!("expected a prism");
        };
        assert_eq!(triangle.v0, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(translation, Vec3::new(0.0, 3.0, 0.0));
    }
}
