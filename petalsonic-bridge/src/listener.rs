use crate::backend::{Backend, GameObjectId};
use crate::error::RequestStatus;
use crate::math::{Transformation, Vec3};
use crate::velocity::{VelocityStep, VelocityTracker};

/// A listening point.
///
/// Listener velocity is only derived while at least one object tracks its velocity
/// relative to this listener. Those objects are counted as dependents.
#[derive(Debug)]
pub struct Listener {
    game_object_id: GameObjectId,
    name: String,
    transformation: Transformation,
    velocity: VelocityTracker,
    moving_or_decaying: bool,
    relative_velocity_dependents: u32,
}

impl Listener {
    pub(crate) fn new(
        game_object_id: GameObjectId,
        name: String,
        transformation: Transformation,
    ) -> Self {
        Self {
            game_object_id,
            name,
            transformation,
            velocity: VelocityTracker::new(transformation.position),
            moving_or_decaying: false,
            relative_velocity_dependents: 0,
        }
    }

    pub fn game_object_id(&self) -> GameObjectId {
        self.game_object_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    pub fn position(&self) -> Vec3 {
        self.transformation.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity.velocity()
    }

    pub fn is_moving_or_decaying(&self) -> bool {
        self.moving_or_decaying
    }

    pub fn relative_velocity_dependents(&self) -> u32 {
        self.relative_velocity_dependents
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_transformation(
        &mut self,
        backend: &dyn Backend,
        transformation: Transformation,
    ) -> RequestStatus {
        let position_changed = transformation.position != self.transformation.position;
        self.transformation = transformation;

        if self.relative_velocity_dependents > 0 {
            if position_changed {
                self.moving_or_decaying = true;
            }
        } else {
            self.velocity.reset(transformation.position);
        }

        let result = backend.set_position(self.game_object_id, &transformation);
        if let Err(error) = &result {
            log::warn!(
                "Failed to set position of listener \"{}\": {}",
                self.name,
                error
            );
        }
        result.into()
    }

    pub(crate) fn update(&mut self, delta_time: f32) {
        if !self.moving_or_decaying || delta_time <= 0.0 {
            return;
        }

        if self.velocity.update(self.transformation.position, delta_time) == VelocityStep::Stopped {
            self.moving_or_decaying = false;
        }
    }

    pub(crate) fn add_relative_velocity_dependent(&mut self) {
        if self.relative_velocity_dependents == 0 {
            self.velocity.reset(self.transformation.position);
        }
        self.relative_velocity_dependents += 1;
    }

    pub(crate) fn remove_relative_velocity_dependent(&mut self) {
        if self.relative_velocity_dependents == 0 {
            debug_assert!(
                false,
                "listener \"{}\" has no relative velocity dependents",
                self.name
            );
            log::error!(
                "Relative velocity dependents of listener \"{}\" would underflow",
                self.name
            );
            return;
        }

        self.relative_velocity_dependents -= 1;
        if self.relative_velocity_dependents == 0 {
            self.moving_or_decaying = false;
            self.velocity.reset(self.transformation.position);
        }
    }
}
