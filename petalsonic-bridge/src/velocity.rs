//! Velocity derivation from frame-to-frame position deltas.
//!
//! Objects and listeners never receive velocities from the engine. They are derived
//! here: while something moves its velocity is `Δposition / Δtime`, and once it stops
//! the last velocity decays exponentially towards zero so that velocity-driven
//! parameters (doppler, whooshes) fade out instead of snapping.

use crate::math::Vec3;

/// Time constant of the exponential decay applied after movement stops, in seconds.
pub const VELOCITY_DECAY_TIME: f32 = 0.05;

/// What happened during a single [`VelocityTracker::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityStep {
    /// The position changed; velocity was recomputed from the delta.
    Moved,
    /// The position is unchanged and the velocity decayed but is still non-zero.
    Decaying,
    /// The velocity is exactly zero. Tracking can be switched off.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityTracker {
    previous_position: Vec3,
    velocity: Vec3,
}

impl VelocityTracker {
    pub fn new(position: Vec3) -> Self {
        Self {
            previous_position: position,
            velocity: Vec3::ZERO,
        }
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn previous_position(&self) -> Vec3 {
        self.previous_position
    }

    /// Forgets any accumulated velocity and re-anchors at `position`.
    pub fn reset(&mut self, position: Vec3) {
        self.previous_position = position;
        self.velocity = Vec3::ZERO;
    }

    /// Advances the tracker by one frame. `delta_time` must be positive.
    pub fn update(&mut self, position: Vec3, delta_time: f32) -> VelocityStep {
        debug_assert!(delta_time > 0.0);

        let delta_position = position - self.previous_position;

        if delta_position != Vec3::ZERO {
            self.velocity = delta_position / delta_time;
            self.previous_position = position;
            VelocityStep::Moved
        } else if self.velocity != Vec3::ZERO {
            let decay = (1.0 - delta_time / VELOCITY_DECAY_TIME).max(0.0);
            self.velocity *= decay;

            if self.velocity.length_squared() < f32::EPSILON {
                self.velocity = Vec3::ZERO;
                VelocityStep::Stopped
            } else {
                VelocityStep::Decaying
            }
        } else {
            VelocityStep::Stopped
        }
    }
}

impl Default for VelocityTracker {
    fn default() -> Self {
        Self::new(Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_from_position_delta() {
        let mut tracker = VelocityTracker::new(Vec3::ZERO);
        let step = tracker.update(Vec3::new(1.0, 0.0, 0.0), 0.5);

        assert_eq!(step, VelocityStep::Moved);
        assert_eq!(tracker.velocity(), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(tracker.previous_position(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_decay_is_strictly_decreasing_until_zero() {
        let mut tracker = VelocityTracker::new(Vec3::ZERO);
        let position = Vec3::new(0.0, 0.0, 5.0);
        tracker.update(position, 0.1);

        let mut last_speed = tracker.velocity().length();
        let mut frames = 0;

        loop {
            let step = tracker.update(position, 0.01);
            let speed = tracker.velocity().length();
            frames += 1;

            match step {
                VelocityStep::Decaying => {
                    assert!(speed < last_speed);
                    assert!(tracker.velocity().length_squared() >= f32::EPSILON);
                }
                VelocityStep::Stopped => {
                    assert_eq!(tracker.velocity(), Vec3::ZERO);
                    break;
                }
                VelocityStep::Moved => panic!("position did not change"),
            }

            last_speed = speed;
            assert!(frames < 1000, "velocity never reached zero");
        }
    }

    #[test]
    fn test_large_delta_time_stops_immediately() {
        let mut tracker = VelocityTracker::new(Vec3::ZERO);
        tracker.update(Vec3::X, 0.016);

        assert_eq!(tracker.update(Vec3::X, 0.1), VelocityStep::Stopped);
        assert_eq!(tracker.velocity(), Vec3::ZERO);
    }

    #[test]
    fn test_reset_clears_velocity() {
        let mut tracker = VelocityTracker::new(Vec3::ZERO);
        tracker.update(Vec3::ONE, 1.0);
        tracker.reset(Vec3::splat(3.0));

        assert_eq!(tracker.velocity(), Vec3::ZERO);
        assert_eq!(tracker.update(Vec3::splat(3.0), 0.1), VelocityStep::Stopped);
    }
}
