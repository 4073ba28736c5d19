use glam::{Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Tolerance used for barycentric and parametric range checks.
const RANGE_TOLERANCE: f32 = 1e-6;

/// Determinants below this are treated as parallel configurations.
const PARALLEL_EPSILON: f32 = 1e-10;

/// Axis-aligned bounding box.
///
/// An empty box is represented "inside-out" (min greater than max on every
/// axis) so that adding any point or box to it yields that point or box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::INSIDE_OUT
    }
}

impl BoundingBox {
    /// The empty box.
    pub const INSIDE_OUT: Self = Self {
        min: Vec3::new(f32::MAX, f32::MAX, f32::MAX),
        max: Vec3::new(f32::MIN, f32::MIN, f32::MIN),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box centred on `centre` with the given half extents.
    pub fn from_centre(centre: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: centre - half_extents,
            max: centre + half_extents,
        }
    }

    /// Smallest box containing every point (inside-out if there are none).
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bb = Self::INSIDE_OUT;
        for p in points {
            bb.add_point(p);
        }
        bb
    }

    pub fn is_inside_out(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn add_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grow to contain `other`. Inside-out boxes contribute nothing.
    pub fn add_bounds(&mut self, other: &BoundingBox) {
        if other.is_inside_out() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn centre(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Axis-aligned box enclosing this box after transformation.
    pub fn transformed(&self, m: &Mat4) -> Self {
        if self.is_inside_out() {
            return Self::INSIDE_OUT;
        }
        Self::from_points(self.corners().into_iter().map(|c| m.transform_point3(c)))
    }

    pub fn expanded(&self, amount: f32) -> Self {
        if self.is_inside_out() {
            return *self;
        }
        Self {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    /// Closed-interval overlap test.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !self.is_inside_out()
            && !other.is_inside_out()
            && self.min.cmple(other.max).all()
            && other.min.cmple(self.max).all()
    }

    /// Enclosed volume, zero when inside-out.
    pub fn volume(&self) -> f32 {
        if self.is_inside_out() {
            return 0.0;
        }
        let size = self.size();
        size.x * size.y * size.z
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.min.cmple(p).all() && p.cmple(self.max).all()
    }

    /// Clip the segment `start..end` to this box grown by `bloat`.
    ///
    /// Returns false (leaving the points untouched) when the segment misses
    /// the box entirely.
    pub fn clip_segment(&self, start: &mut Vec3, end: &mut Vec3, bloat: f32) -> bool {
        if self.is_inside_out() {
            return false;
        }
        let lo = self.min - Vec3::splat(bloat);
        let hi = self.max + Vec3::splat(bloat);
        let origin = *start;
        let delta = *end - origin;

        let mut t0 = 0.0_f32;
        let mut t1 = 1.0_f32;
        for axis in 0..3 {
            let (s, d) = (origin[axis], delta[axis]);
            if d == 0.0 {
                if s < lo[axis] || s > hi[axis] {
                    return false;
                }
                continue;
            }
            let mut ta = (lo[axis] - s) / d;
            let mut tb = (hi[axis] - s) / d;
            if ta > tb {
                std::mem::swap(&mut ta, &mut tb);
            }
            t0 = t0.max(ta);
            t1 = t1.min(tb);
            if t0 > t1 {
                return false;
            }
        }

        *start = origin + delta * t0;
        *end = origin + delta * t1;
        true
    }

    /// Whether the segment passes within `bloat` of this box.
    pub fn intersects_segment(&self, start: Vec3, end: Vec3, bloat: f32) -> bool {
        let (mut s, mut e) = (start, end);
        self.clip_segment(&mut s, &mut e, bloat)
    }

    /// Euclidean distance from a point to the box; zero inside, `f32::MAX`
    /// for an empty box.
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        if self.is_inside_out() {
            return f32::MAX;
        }
        p.clamp(self.min, self.max).distance(p)
    }
}

/// A triangle in some coordinate frame (world space unless stated otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldTriangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
}

impl WorldTriangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [self.v0, self.v1, self.v2]
    }

    pub fn edges(&self) -> [(Vec3, Vec3); 3] {
        [(self.v0, self.v1), (self.v1, self.v2), (self.v2, self.v0)]
    }

    pub fn transformed(&self, m: &Mat4) -> Self {
        Self {
            v0: m.transform_point3(self.v0),
            v1: m.transform_point3(self.v1),
            v2: m.transform_point3(self.v2),
        }
    }

    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            v0: self.v0 + offset,
            v1: self.v1 + offset,
            v2: self.v2 + offset,
        }
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(self.vertices())
    }

    /// Fraction along `start..end` at which the segment meets this triangle.
    ///
    /// Both faces count as hits; segments lying in the triangle's plane do not.
    pub fn segment_fraction(&self, start: Vec3, end: Vec3) -> Option<f32> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        let d = end - start;
        let p = d.cross(e2);
        let det = e1.dot(p);
        if det.abs() < PARALLEL_EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        let s = start - self.v0;
        let u = s.dot(p) * inv;
        if !(-RANGE_TOLERANCE..=1.0 + RANGE_TOLERANCE).contains(&u) {
            return None;
        }
        let q = s.cross(e1);
        let v = d.dot(q) * inv;
        if v < -RANGE_TOLERANCE || u + v > 1.0 + RANGE_TOLERANCE {
            return None;
        }
        let t = e2.dot(q) * inv;
        (0.0..=1.0).contains(&t).then_some(t)
    }

    /// Whether two triangles touch where they currently are.
    pub fn intersects(&self, other: &WorldTriangle) -> bool {
        self.edges()
            .iter()
            .any(|&(a, b)| other.segment_fraction(a, b).is_some())
            || other
                .edges()
                .iter()
                .any(|&(a, b)| self.segment_fraction(a, b).is_some())
    }

    /// First-contact fraction of this triangle moving by `translation` against
    /// the static triangle `other`.
    ///
    /// Contact between two triangles first happens at a vertex meeting a face
    /// or at an edge meeting an edge, so those are the only cases tested.
    pub fn sweep_fraction(&self, other: &WorldTriangle, translation: Vec3) -> Option<f32> {
        if self.intersects(other) {
            return Some(0.0);
        }

        let mut best: Option<f32> = None;
        let mut keep = |f: f32| {
            if best.is_none_or(|b| f < b) {
                best = Some(f);
            }
        };

        for a in self.vertices() {
            if let Some(f) = other.segment_fraction(a, a + translation) {
                keep(f);
            }
        }
        for b in other.vertices() {
            if let Some(f) = self.segment_fraction(b, b - translation) {
                keep(f);
            }
        }

        // a0 + v (a1 - a0) + s T = b0 + u (b1 - b0)
        for (a0, a1) in self.edges() {
            for (b0, b1) in other.edges() {
                let m = Mat3::from_cols(b1 - b0, a0 - a1, -translation);
                if m.determinant().abs() < PARALLEL_EPSILON {
                    continue;
                }
                let sol = m.inverse() * (a0 - b0);
                let in_range = |x: f32| (-RANGE_TOLERANCE..=1.0 + RANGE_TOLERANCE).contains(&x);
                if in_range(sol.x) && in_range(sol.y) && in_range(sol.z) {
                    keep(sol.z.clamp(0.0, 1.0));
                }
            }
        }

        best
    }
}
