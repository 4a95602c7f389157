//! Math types for PetalSonic Bridge

pub use glam::{Quat, Vec3};

/// Tolerance used when comparing orientation vectors.
const DIRECTION_EPSILON: f32 = 0.0001;

/// Position and orientation of an object or listener in world space.
///
/// Orientation is kept as explicit forward/up vectors because that is the form
/// audio middleware consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformation {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Transformation {
    pub fn new(position: Vec3, forward: Vec3, up: Vec3) -> Self {
        Self {
            position,
            forward,
            up,
        }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    pub fn from_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            forward: rotation * Vec3::NEG_Z,
            up: rotation * Vec3::Y,
        }
    }

    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up)
    }

    pub fn distance(&self, other: &Self) -> f32 {
        self.position.distance(other.position)
    }

    /// Returns true if `other` is within `position_threshold` of this transformation
    /// and points in the same direction.
    pub fn is_equivalent(&self, other: &Self, position_threshold: f32) -> bool {
        self.position.distance(other.position) <= position_threshold
            && self.forward.abs_diff_eq(other.forward, DIRECTION_EPSILON)
            && self.up.abs_diff_eq(other.up, DIRECTION_EPSILON)
    }
}

impl Default for Transformation {
    fn default() -> Self {
        Self::identity()
    }
}
