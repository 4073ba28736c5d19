use bitflags::bitflags;
use glam::{Mat4, Vec4};
use worldspace_common::BoundingBox;

bitflags! {
    /// Clip planes a point lies outside of. Depth follows the `[0, w]`
    /// convention of glam's right-handed projections.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Outcode: u8 {
        const LEFT   = 0b00_0001;
        const RIGHT  = 0b00_0010;
        const BOTTOM = 0b00_0100;
        const TOP    = 0b00_1000;
        const NEAR   = 0b01_0000;
        const FAR    = 0b10_0000;
    }
}

impl Outcode {
    pub fn of_clip_point(p: Vec4) -> Self {
        let mut code = Outcode::empty();
        code.set(Outcode::LEFT, p.x < -p.w);
        code.set(Outcode::RIGHT, p.x > p.w);
        code.set(Outcode::BOTTOM, p.y < -p.w);
        code.set(Outcode::TOP, p.y > p.w);
        code.set(Outcode::NEAR, p.z < 0.0);
        code.set(Outcode::FAR, p.z > p.w);
        code
    }
}

/// Combined outcode of a box's eight corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxOutcode {
    /// Planes every corner is outside of.
    pub all: Outcode,
    /// Planes at least one corner is outside of.
    pub any: Outcode,
}

impl BoxOutcode {
    /// An inside-out box is reported fully outside.
    pub fn of_box(bb: &BoundingBox, view_projection: &Mat4) -> Self {
        if bb.is_inside_out() {
            return Self {
                all: Outcode::all(),
                any: Outcode::all(),
            };
        }
        let mut all = Outcode::all();
        let mut any = Outcode::empty();
        for corner in bb.corners() {
            let code = Outcode::of_clip_point(*view_projection * corner.extend(1.0));
            all &= code;
            any |= code;
        }
        Self { all, any }
    }

    pub fn is_outside(&self) -> bool {
        !self.all.is_empty()
    }

    pub fn is_inside(&self) -> bool {
        self.any.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn camera() -> Mat4 {
        Mat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 1.0, 100.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 50.0), Vec3::ZERO, Vec3::Y)
    }

    fn cube_at(x: f32, z: f32) -> BoundingBox {
        BoundingBox::from_centre(Vec3::new(x, 0.0, z), Vec3::ONE)
    }

    #[test]
    fn box_classification() {
        let vp = camera();
        let inside = BoxOutcode::of_box(&cube_at(0.0, 0.0), &vp);
        assert!(inside.is_inside());
        assert!(!inside.is_outside());

        let straddling = BoxOutcode::of_box(&cube_at(10.0, 0.0), &vp);
        assert!(!straddling.is_inside());
        assert!(!straddling.is_outside());
        assert_eq!(straddling.any, Outcode::RIGHT);

        let right = BoxOutcode::of_box(&cube_at(20.0, 0.0), &vp);
        assert!(right.is_outside());
        assert_eq!(right.all, Outcode::RIGHT);
    }

    #[test]
    fn behind_the_camera_is_near_clipped() {
        let vp = camera();
        let behind = BoxOutcode::of_box(&cube_at(0.0, 80.0), &vp);
        assert!(behind.all.contains(Outcode::NEAR));
    }

    #[test]
    fn inside_out_box_is_outside() {
        assert!(BoxOutcode::of_box(&BoundingBox::INSIDE_OUT, &camera()).is_outside());
    }
}
