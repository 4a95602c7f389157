//! Emitter objects.
//!
//! An [`Object`] owns the event instances started on it and decides, once per frame,
//! whether any of them is still audible. Velocity parameters are derived from position
//! deltas here as well; nothing upstream ever hands the bridge a velocity.

use crate::backend::{AuxSendValue, Backend, GameObjectId, UniqueId, unique_id};
use crate::connections::{Environment, EnvironmentKind, Parameter, SwitchState};
use crate::error::{RequestStatus, TriggerResult};
use crate::event_instance::{EventInstance, EventInstanceState, TriggerInstanceId};
use crate::events::BridgeEvent;
use crate::listener::Listener;
use crate::math::{Transformation, Vec3};
use crate::pool::{EventInstanceKey, ListenerKey, ObjectKey, Pool, TriggerKey};
use crate::trigger::Trigger;
use crate::velocity::{VelocityStep, VelocityTracker};
use bitflags::bitflags;
use crossbeam_channel::Sender;

/// Backend parameter receiving the object's speed.
pub const ABSOLUTE_VELOCITY_PARAMETER_ID: UniqueId = unique_id("absolute_velocity");
/// Backend parameter receiving the speed towards the closest-approaching listener.
pub const RELATIVE_VELOCITY_PARAMETER_ID: UniqueId = unique_id("relative_velocity");

/// Aux send amounts closer than this are considered unchanged.
const AUX_SEND_EPSILON: f32 = 0.0001;
/// Upper bound of aux sends pushed to the backend per object.
pub const MAX_AUX_SENDS: usize = 4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u8 {
        /// No event instance on the object is audible.
        const VIRTUAL = 1 << 0;
        /// Position changed recently; velocity is still being derived.
        const MOVING_OR_DECAYING = 1 << 1;
        const TRACK_ABSOLUTE_VELOCITY = 1 << 2;
        const TRACK_RELATIVE_VELOCITY = 1 << 3;
        /// Event instances recompute Playing/Virtual every update.
        const UPDATE_VIRTUAL_STATES = 1 << 4;
    }
}

/// Optional per-object behavior that can be switched on and off at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFunctionality {
    TrackAbsoluteVelocity,
    TrackRelativeVelocity,
}

impl ObjectFunctionality {
    fn flag(self) -> ObjectFlags {
        match self {
            Self::TrackAbsoluteVelocity => ObjectFlags::TRACK_ABSOLUTE_VELOCITY,
            Self::TrackRelativeVelocity => ObjectFlags::TRACK_RELATIVE_VELOCITY,
        }
    }

    fn parameter_id(self) -> UniqueId {
        match self {
            Self::TrackAbsoluteVelocity => ABSOLUTE_VELOCITY_PARAMETER_ID,
            Self::TrackRelativeVelocity => RELATIVE_VELOCITY_PARAMETER_ID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerAssociation {
    pub listener: ListenerKey,
    pub distance: f32,
}

/// Everything [`Object::update`] needs from the world.
pub(crate) struct ObjectContext<'a> {
    pub backend: &'a dyn Backend,
    pub listeners: &'a Pool<ListenerKey, Listener>,
    pub event_instances: &'a mut Pool<EventInstanceKey, EventInstance>,
    pub events: &'a Sender<BridgeEvent>,
    pub velocity_tracking_threshold: f32,
}

/// Speed of the object towards the listener. Positive while approaching.
pub fn relative_velocity(
    object_position: Vec3,
    object_velocity: Vec3,
    listener_position: Vec3,
    listener_velocity: Vec3,
) -> f32 {
    let direction = (object_position - listener_position).normalize_or_zero();
    -(object_velocity - listener_velocity).dot(direction)
}

pub(crate) fn report(events: &Sender<BridgeEvent>, event: BridgeEvent) {
    if events.send(event).is_err() {
        log::warn!("Dropped report {:?}, nobody is listening", event);
    }
}

#[derive(Debug)]
pub struct Object {
    game_object_id: GameObjectId,
    name: String,
    is_global: bool,
    transformation: Transformation,
    pushed_transformation: Transformation,
    listeners: Vec<ListenerAssociation>,
    event_instances: Vec<EventInstanceKey>,
    aux_sends: Vec<AuxSendValue>,
    aux_sends_dirty: bool,
    flags: ObjectFlags,
    shortest_distance_to_listener: f32,
    velocity: VelocityTracker,
    previous_absolute_velocity: f32,
    previous_relative_velocity: f32,
}

impl Object {
    pub(crate) fn new(
        game_object_id: GameObjectId,
        name: String,
        transformation: Transformation,
    ) -> Self {
        Self {
            game_object_id,
            name,
            is_global: false,
            transformation,
            pushed_transformation: transformation,
            listeners: Vec::new(),
            event_instances: Vec::new(),
            aux_sends: Vec::new(),
            aux_sends_dirty: false,
            flags: ObjectFlags::UPDATE_VIRTUAL_STATES,
            shortest_distance_to_listener: 0.0,
            velocity: VelocityTracker::new(transformation.position),
            previous_absolute_velocity: 0.0,
            previous_relative_velocity: 0.0,
        }
    }

    /// The object that global requests are executed on. It has no position, is never
    /// virtual and never sends to aux buses.
    pub(crate) fn new_global(game_object_id: GameObjectId, name: String) -> Self {
        Self {
            is_global: true,
            flags: ObjectFlags::empty(),
            ..Self::new(game_object_id, name, Transformation::identity())
        }
    }

    pub fn game_object_id(&self) -> GameObjectId {
        self.game_object_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_global(&self) -> bool {
        self.is_global
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn is_virtual(&self) -> bool {
        self.flags.contains(ObjectFlags::VIRTUAL)
    }

    pub fn shortest_distance_to_listener(&self) -> f32 {
        self.shortest_distance_to_listener
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity.velocity()
    }

    pub fn event_instances(&self) -> &[EventInstanceKey] {
        &self.event_instances
    }

    pub fn listener_associations(&self) -> &[ListenerAssociation] {
        &self.listeners
    }

    pub fn aux_sends(&self) -> &[AuxSendValue] {
        &self.aux_sends
    }

    fn tracks_velocity(&self) -> bool {
        self.flags.intersects(
            ObjectFlags::TRACK_ABSOLUTE_VELOCITY | ObjectFlags::TRACK_RELATIVE_VELOCITY,
        )
    }

    /// Global parameters are set without a game object.
    fn parameter_target(&self) -> Option<GameObjectId> {
        (!self.is_global).then_some(self.game_object_id)
    }

    pub(crate) fn update_distances(&mut self, listeners: &Pool<ListenerKey, Listener>) {
        let position = self.transformation.position;

        self.listeners.retain_mut(|association| {
            match listeners.get(association.listener) {
                Some(listener) => {
                    association.distance = position.distance(listener.position());
                    true
                }
                None => false,
            }
        });

        self.shortest_distance_to_listener = self
            .listeners
            .iter()
            .map(|association| association.distance)
            .reduce(f32::min)
            .unwrap_or(0.0);
    }

    pub(crate) fn execute_trigger(
        &mut self,
        object_key: ObjectKey,
        backend: &dyn Backend,
        event_instances: &mut Pool<EventInstanceKey, EventInstance>,
        trigger_key: TriggerKey,
        trigger: &mut Trigger,
        trigger_instance_id: TriggerInstanceId,
    ) -> TriggerResult {
        if !self.is_global && self.aux_sends_dirty {
            self.flush_aux_sends(backend);
        }

        let instance = EventInstance::new(
            trigger_instance_id,
            trigger_key,
            object_key,
            trigger.event_id(),
            trigger.max_attenuation_radius(),
        );
        let on_end = instance.end_of_event_callback();

        let Ok(instance_key) = event_instances.insert(instance) else {
            return TriggerResult::Failure;
        };
        trigger.acquire();

        let playing_id = match backend.post_event(trigger.event_id(), self.game_object_id, on_end)
        {
            Ok(playing_id) => playing_id,
            Err(error) => {
                log::warn!(
                    "Failed to execute trigger \"{}\" on object \"{}\": {}",
                    trigger.name(),
                    self.name,
                    error
                );
                event_instances.remove(instance_key);
                trigger.release();
                return TriggerResult::Failure;
            }
        };

        let distance = if self.flags.contains(ObjectFlags::UPDATE_VIRTUAL_STATES) {
            self.shortest_distance_to_listener
        } else {
            0.0
        };

        let Some(instance) = event_instances.get_mut(instance_key) else {
            return TriggerResult::Failure;
        };
        instance.start(playing_id, distance);
        let state = instance.state();

        if self.event_instances.is_empty() {
            self.flags
                .set(ObjectFlags::VIRTUAL, state == EventInstanceState::Virtual);
        }
        self.event_instances.push(instance_key);

        log::debug!(
            "Executed trigger \"{}\" on object \"{}\" as {} ({:?})",
            trigger.name(),
            self.name,
            playing_id,
            state
        );

        match state {
            EventInstanceState::Virtual => TriggerResult::Virtual,
            _ => TriggerResult::Playing,
        }
    }

    /// Per-frame sweep. Returns the event instances that finished since the last
    /// update; each one has already been reported.
    pub(crate) fn update(
        &mut self,
        object_key: ObjectKey,
        delta_time: f32,
        context: &mut ObjectContext<'_>,
    ) -> Vec<EventInstance> {
        self.update_distances(context.listeners);

        let finished =
            self.remove_finished_instances(object_key, context.event_instances, context.events);

        if self.flags.contains(ObjectFlags::UPDATE_VIRTUAL_STATES) {
            self.update_virtual_states(object_key, context.event_instances, context.events);
        }

        if delta_time > 0.0 && self.needs_velocity_update(context.listeners) {
            self.update_velocities(
                delta_time,
                context.backend,
                context.listeners,
                context.velocity_tracking_threshold,
            );
        }

        if !self.is_global && self.aux_sends_dirty {
            self.flush_aux_sends(context.backend);
        }

        finished
    }

    fn remove_finished_instances(
        &mut self,
        object_key: ObjectKey,
        event_instances: &mut Pool<EventInstanceKey, EventInstance>,
        events: &Sender<BridgeEvent>,
    ) -> Vec<EventInstance> {
        let mut finished_keys = Vec::new();

        self.event_instances
            .retain(|instance_key| match event_instances.get(*instance_key) {
                Some(instance) if instance.is_to_be_removed() => {
                    finished_keys.push(*instance_key);
                    false
                }
                Some(_) => true,
                None => false,
            });

        finished_keys
            .into_iter()
            .filter_map(|instance_key| event_instances.remove(instance_key))
            .inspect(|instance| {
                report(events, BridgeEvent::TriggerInstanceFinished {
                    object: object_key,
                    trigger_instance_id: instance.trigger_instance_id(),
                });
            })
            .collect()
    }

    fn update_virtual_states(
        &mut self,
        object_key: ObjectKey,
        event_instances: &mut Pool<EventInstanceKey, EventInstance>,
        events: &Sender<BridgeEvent>,
    ) {
        if self.event_instances.is_empty() {
            self.flags.remove(ObjectFlags::VIRTUAL);
            return;
        }

        let mut has_physical_instance = false;
        for instance_key in &self.event_instances {
            if let Some(instance) = event_instances.get_mut(*instance_key)
                && instance.update_virtual_state(self.shortest_distance_to_listener)
                    == EventInstanceState::Playing
            {
                has_physical_instance = true;
            }
        }

        let is_virtual = !has_physical_instance;
        if is_virtual == self.flags.contains(ObjectFlags::VIRTUAL) {
            return;
        }

        self.flags.set(ObjectFlags::VIRTUAL, is_virtual);
        if is_virtual {
            log::debug!("Object \"{}\" became virtual", self.name);
            report(events, BridgeEvent::ObjectVirtualized { object: object_key });
        } else {
            log::debug!("Object \"{}\" became physical", self.name);
            report(events, BridgeEvent::ObjectPhysicalized { object: object_key });
        }
    }

    /// Velocities are recomputed while anything involved moves, and until every tracked
    /// parameter has settled on zero in the backend.
    fn needs_velocity_update(&self, listeners: &Pool<ListenerKey, Listener>) -> bool {
        if self.flags.contains(ObjectFlags::MOVING_OR_DECAYING) {
            return true;
        }

        if self.flags.contains(ObjectFlags::TRACK_ABSOLUTE_VELOCITY)
            && self.previous_absolute_velocity != 0.0
        {
            return true;
        }

        self.flags.contains(ObjectFlags::TRACK_RELATIVE_VELOCITY)
            && (self.previous_relative_velocity != 0.0
                || self.listeners.iter().any(|association| {
                    listeners
                        .get(association.listener)
                        .is_some_and(Listener::is_moving_or_decaying)
                }))
    }

    fn update_velocities(
        &mut self,
        delta_time: f32,
        backend: &dyn Backend,
        listeners: &Pool<ListenerKey, Listener>,
        threshold: f32,
    ) {
        if self.flags.contains(ObjectFlags::MOVING_OR_DECAYING)
            && self.velocity.update(self.transformation.position, delta_time)
                == VelocityStep::Stopped
        {
            self.flags.remove(ObjectFlags::MOVING_OR_DECAYING);
        }

        let velocity = self.velocity.velocity();

        if self.flags.contains(ObjectFlags::TRACK_ABSOLUTE_VELOCITY) {
            push_velocity_parameter(
                backend,
                self.game_object_id,
                ABSOLUTE_VELOCITY_PARAMETER_ID,
                velocity.length(),
                &mut self.previous_absolute_velocity,
                threshold,
            );
        }

        if self.flags.contains(ObjectFlags::TRACK_RELATIVE_VELOCITY) {
            let position = self.transformation.position;
            let relative = self
                .listeners
                .iter()
                .filter_map(|association| listeners.get(association.listener))
                .map(|listener| {
                    relative_velocity(position, velocity, listener.position(), listener.velocity())
                })
                .fold(0.0f32, |largest, value| {
                    if value.abs() > largest.abs() { value } else { largest }
                });

            push_velocity_parameter(
                backend,
                self.game_object_id,
                RELATIVE_VELOCITY_PARAMETER_ID,
                relative,
                &mut self.previous_relative_velocity,
                threshold,
            );
        }
    }

    fn flush_aux_sends(&mut self, backend: &dyn Backend) {
        self.aux_sends
            .sort_by(|a, b| b.amount.total_cmp(&a.amount));
        let count = self.aux_sends.len().min(MAX_AUX_SENDS);

        if let Err(error) = backend.set_aux_sends(self.game_object_id, &self.aux_sends[..count]) {
            log::warn!(
                "Failed to set aux sends of object \"{}\": {}",
                self.name,
                error
            );
        }

        // Zero amounts only need to reach the backend once.
        self.aux_sends.retain(|send| send.amount > 0.0);
        self.aux_sends_dirty = false;
    }

    pub(crate) fn set_transformation(
        &mut self,
        backend: &dyn Backend,
        transformation: Transformation,
        listeners: &Pool<ListenerKey, Listener>,
        position_update_threshold_multiplier: f32,
    ) -> RequestStatus {
        if self.is_global {
            log::warn!("The global object has no transformation");
            return RequestStatus::Failure;
        }

        let position_changed = transformation.position != self.transformation.position;
        self.transformation = transformation;

        if position_changed {
            self.update_distances(listeners);

            if self.tracks_velocity() {
                self.flags.insert(ObjectFlags::MOVING_OR_DECAYING);
            } else {
                self.velocity.reset(transformation.position);
            }
        }

        let threshold = self.shortest_distance_to_listener * position_update_threshold_multiplier;
        if self
            .pushed_transformation
            .is_equivalent(&transformation, threshold)
        {
            return RequestStatus::Success;
        }

        match backend.set_position(self.game_object_id, &transformation) {
            Ok(()) => {
                self.pushed_transformation = transformation;
                RequestStatus::Success
            }
            Err(error) => {
                log::warn!(
                    "Failed to set position of object \"{}\": {}",
                    self.name,
                    error
                );
                RequestStatus::Failure
            }
        }
    }

    pub(crate) fn set_environment(
        &mut self,
        backend: &dyn Backend,
        environment: &Environment,
        amount: f32,
    ) -> RequestStatus {
        match environment.kind() {
            EnvironmentKind::AuxBus { bus } => {
                if self.is_global {
                    log::warn!(
                        "Aux bus environment \"{}\" cannot be set on the global object",
                        environment.name()
                    );
                    return RequestStatus::Failure;
                }
                self.set_aux_send(bus, amount);
                RequestStatus::Success
            }
            EnvironmentKind::Rtpc {
                parameter,
                multiplier,
                shift,
            } => {
                let result =
                    backend.set_parameter(parameter, multiplier * amount + shift, self.parameter_target());
                if let Err(error) = &result {
                    log::warn!(
                        "Failed to set environment \"{}\" on object \"{}\": {}",
                        environment.name(),
                        self.name,
                        error
                    );
                }
                result.into()
            }
        }
    }

    fn set_aux_send(&mut self, bus: UniqueId, amount: f32) {
        match self.aux_sends.iter_mut().find(|send| send.bus == bus) {
            Some(send) => {
                if (send.amount - amount).abs() > AUX_SEND_EPSILON {
                    send.amount = amount;
                    self.aux_sends_dirty = true;
                }
            }
            None => {
                if amount > AUX_SEND_EPSILON {
                    self.aux_sends.push(AuxSendValue { bus, amount });
                    self.aux_sends_dirty = true;
                }
            }
        }
    }

    pub(crate) fn set_parameter(
        &self,
        backend: &dyn Backend,
        parameter: &Parameter,
        value: f32,
    ) -> RequestStatus {
        let result = parameter.apply(backend, value, self.parameter_target());
        if let Err(error) = &result {
            log::warn!(
                "Failed to set parameter \"{}\" on object \"{}\": {}",
                parameter.name(),
                self.name,
                error
            );
        }
        result.into()
    }

    pub(crate) fn set_switch_state(
        &self,
        backend: &dyn Backend,
        switch_state: &SwitchState,
    ) -> RequestStatus {
        let result = switch_state.apply(backend, self.game_object_id, self.is_global);
        if let Err(error) = &result {
            log::warn!(
                "Failed to set switch state \"{}\" on object \"{}\": {}",
                switch_state.name(),
                self.name,
                error
            );
        }
        result.into()
    }

    pub(crate) fn stop_all_triggers(&self, backend: &dyn Backend) {
        backend.stop_all(Some(self.game_object_id));
    }

    /// Stops every instance of `trigger` on this object. Fails if none is playing.
    pub(crate) fn stop_trigger(
        &self,
        backend: &dyn Backend,
        event_instances: &Pool<EventInstanceKey, EventInstance>,
        trigger: TriggerKey,
        fade_ms: u32,
    ) -> RequestStatus {
        let mut stopped = false;

        for instance in self
            .event_instances
            .iter()
            .filter_map(|instance_key| event_instances.get(*instance_key))
            .filter(|instance| instance.trigger() == trigger)
        {
            instance.stop(backend, fade_ms);
            stopped = true;
        }

        if stopped {
            RequestStatus::Success
        } else {
            RequestStatus::Failure
        }
    }

    pub(crate) fn toggle_functionality(
        &mut self,
        backend: &dyn Backend,
        functionality: ObjectFunctionality,
        enable: bool,
        listeners: &mut Pool<ListenerKey, Listener>,
    ) -> RequestStatus {
        if self.is_global {
            log::warn!("Velocity tracking is not available on the global object");
            return RequestStatus::Failure;
        }

        let flag = functionality.flag();
        if self.flags.contains(flag) == enable {
            return RequestStatus::Success;
        }

        if enable && !self.tracks_velocity() {
            self.velocity.reset(self.transformation.position);
        }
        self.flags.set(flag, enable);

        if functionality == ObjectFunctionality::TrackRelativeVelocity {
            for association in &self.listeners {
                if let Some(listener) = listeners.get_mut(association.listener) {
                    if enable {
                        listener.add_relative_velocity_dependent();
                    } else {
                        listener.remove_relative_velocity_dependent();
                    }
                }
            }
        }

        if !self.tracks_velocity() {
            self.flags.remove(ObjectFlags::MOVING_OR_DECAYING);
        }

        if enable {
            return RequestStatus::Success;
        }

        match functionality {
            ObjectFunctionality::TrackAbsoluteVelocity => self.previous_absolute_velocity = 0.0,
            ObjectFunctionality::TrackRelativeVelocity => self.previous_relative_velocity = 0.0,
        }

        let result = backend.set_parameter(functionality.parameter_id(), 0.0, Some(self.game_object_id));
        if let Err(error) = &result {
            log::warn!(
                "Failed to reset {:?} on object \"{}\": {}",
                functionality,
                self.name,
                error
            );
        }
        result.into()
    }

    pub(crate) fn set_name(&mut self, backend: &dyn Backend, name: String) -> RequestStatus {
        let result = backend.register_game_object(self.game_object_id, &name);
        self.name = name;
        if let Err(error) = &result {
            log::warn!("Failed to rename object \"{}\": {}", self.name, error);
        }
        result.into()
    }

    pub(crate) fn add_listener(&mut self, listener_key: ListenerKey, listener: &mut Listener) {
        if self
            .listeners
            .iter()
            .any(|association| association.listener == listener_key)
        {
            return;
        }

        if self.flags.contains(ObjectFlags::TRACK_RELATIVE_VELOCITY) {
            listener.add_relative_velocity_dependent();
        }

        self.listeners.push(ListenerAssociation {
            listener: listener_key,
            distance: self.transformation.position.distance(listener.position()),
        });
    }

    pub(crate) fn remove_listener(
        &mut self,
        listener_key: ListenerKey,
        listener: Option<&mut Listener>,
    ) {
        let count = self.listeners.len();
        self.listeners
            .retain(|association| association.listener != listener_key);

        if self.listeners.len() != count
            && self.flags.contains(ObjectFlags::TRACK_RELATIVE_VELOCITY)
            && let Some(listener) = listener
        {
            listener.remove_relative_velocity_dependent();
        }
    }

    /// Drops every listener association, releasing relative velocity subscriptions.
    pub(crate) fn release_listeners(&mut self, listeners: &mut Pool<ListenerKey, Listener>) {
        for association in std::mem::take(&mut self.listeners) {
            if self.flags.contains(ObjectFlags::TRACK_RELATIVE_VELOCITY)
                && let Some(listener) = listeners.get_mut(association.listener)
            {
                listener.remove_relative_velocity_dependent();
            }
        }
    }

    /// Detaches every event instance from the object, e.g. when it is destroyed.
    pub(crate) fn take_event_instances(&mut self) -> Vec<EventInstanceKey> {
        std::mem::take(&mut self.event_instances)
    }
}

/// Pushes a derived velocity when it settled at zero or moved past `threshold`.
fn push_velocity_parameter(
    backend: &dyn Backend,
    object: GameObjectId,
    parameter: UniqueId,
    value: f32,
    previous: &mut f32,
    threshold: f32,
) {
    if value == *previous {
        return;
    }

    if value == 0.0 || (value - *previous).abs() > threshold {
        match backend.set_parameter(parameter, value, Some(object)) {
            Ok(()) => *previous = value,
            Err(error) => log::warn!("Failed to push velocity parameter: {}", error),
        }
    }
}
