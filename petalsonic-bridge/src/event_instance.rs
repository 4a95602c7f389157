use crate::backend::{Backend, EndOfEventCallback, PlayingId, UniqueId};
use crate::pool::{ObjectKey, TriggerKey};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Caller-chosen identifier of one trigger execution, echoed back in
/// [`BridgeEvent::TriggerInstanceFinished`](crate::BridgeEvent::TriggerInstanceFinished).
pub type TriggerInstanceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventInstanceState {
    None,
    Playing,
    Virtual,
}

/// An event is virtual when it has a finite attenuation radius and the closest
/// listener is beyond it. A radius of zero means "never virtual".
pub fn is_virtual(max_attenuation_radius: f32, distance: f32) -> bool {
    max_attenuation_radius > 0.0 && distance > max_attenuation_radius
}

/// One in-flight execution of a trigger on an object.
#[derive(Debug)]
pub struct EventInstance {
    trigger_instance_id: TriggerInstanceId,
    trigger: TriggerKey,
    object: ObjectKey,
    event_id: UniqueId,
    max_attenuation_radius: f32,
    state: EventInstanceState,
    playing_id: Option<PlayingId>,
    to_be_removed: Arc<AtomicBool>,
}

impl EventInstance {
    pub(crate) fn new(
        trigger_instance_id: TriggerInstanceId,
        trigger: TriggerKey,
        object: ObjectKey,
        event_id: UniqueId,
        max_attenuation_radius: f32,
    ) -> Self {
        Self {
            trigger_instance_id,
            trigger,
            object,
            event_id,
            max_attenuation_radius,
            state: EventInstanceState::None,
            playing_id: None,
            to_be_removed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn trigger_instance_id(&self) -> TriggerInstanceId {
        self.trigger_instance_id
    }

    pub fn trigger(&self) -> TriggerKey {
        self.trigger
    }

    pub fn object(&self) -> ObjectKey {
        self.object
    }

    pub fn event_id(&self) -> UniqueId {
        self.event_id
    }

    pub fn max_attenuation_radius(&self) -> f32 {
        self.max_attenuation_radius
    }

    pub fn state(&self) -> EventInstanceState {
        self.state
    }

    pub fn playing_id(&self) -> Option<PlayingId> {
        self.playing_id
    }

    pub fn is_to_be_removed(&self) -> bool {
        self.to_be_removed.load(Ordering::Acquire)
    }

    /// Callback handed to the backend. Marks the instance for removal when the event
    /// ends, from whichever thread the backend calls it on.
    pub(crate) fn end_of_event_callback(&self) -> EndOfEventCallback {
        let to_be_removed = self.to_be_removed.clone();
        Box::new(move || {
            to_be_removed.store(true, Ordering::Release);
        })
    }

    /// Records the backend's playing id and the initial audibility.
    pub(crate) fn start(&mut self, playing_id: PlayingId, distance: f32) {
        self.playing_id = Some(playing_id);
        self.update_virtual_state(distance);
    }

    pub(crate) fn update_virtual_state(&mut self, distance: f32) -> EventInstanceState {
        self.state = if is_virtual(self.max_attenuation_radius, distance) {
            EventInstanceState::Virtual
        } else {
            EventInstanceState::Playing
        };
        self.state
    }

    /// Asks the backend to stop. Removal happens once the backend reports the end.
    pub(crate) fn stop(&self, backend: &dyn Backend, fade_ms: u32) {
        if let Some(playing_id) = self.playing_id {
            backend.stop_playing_id(playing_id, fade_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendSettings, GameObjectId, NullBackend};
    use crate::pool::{Pool, PoolKey};
    use std::num::NonZeroU32;

    fn keys() -> (TriggerKey, ObjectKey) {
        (
            TriggerKey::new(0, NonZeroU32::MIN),
            ObjectKey::new(0, NonZeroU32::MIN),
        )
    }

    #[test]
    fn test_virtual_threshold() {
        assert!(!is_virtual(0.0, 1000.0));
        assert!(!is_virtual(30.0, 30.0));
        assert!(!is_virtual(30.0, 10.0));
        assert!(is_virtual(30.0, 30.5));
    }

    #[test]
    fn test_callback_sets_removal_flag() {
        let (trigger, object) = keys();
        let instance = EventInstance::new(7, trigger, object, 1, 0.0);
        let callback = instance.end_of_event_callback();

        assert!(!instance.is_to_be_removed());
        std::thread::spawn(callback).join().unwrap();
        assert!(instance.is_to_be_removed());
    }

    #[test]
    fn test_start_computes_initial_state() {
        let (trigger, object) = keys();
        let mut instance = EventInstance::new(1, trigger, object, 1, 30.0);
        assert_eq!(instance.state(), EventInstanceState::None);

        instance.start(PlayingId(4), 40.0);
        assert_eq!(instance.state(), EventInstanceState::Virtual);
        assert_eq!(instance.update_virtual_state(10.0), EventInstanceState::Playing);
    }

    #[test]
    fn test_stop_uses_fade_and_keeps_instance() {
        let backend = NullBackend::new();
        backend
            .init(&BackendSettings {
                enable_internal_thread: true,
            })
            .unwrap();
        backend.register_game_object(GameObjectId(5), "emitter").unwrap();

        let mut pool: Pool<crate::pool::EventInstanceKey, EventInstance> =
            Pool::with_capacity("event instances", 1);
        let (trigger, object) = keys();
        let mut instance = EventInstance::new(1, trigger, object, 9, 0.0);
        let playing_id = backend
            .post_event(9, GameObjectId(5), instance.end_of_event_callback())
            .unwrap();
        instance.start(playing_id, 0.0);
        let key = pool.insert(instance).unwrap();

        pool.get(key).unwrap().stop(&backend, 10);
        assert!(!pool.get(key).unwrap().is_to_be_removed());
        assert!(backend.calls().contains(&crate::backend::BackendCall::StopPlayingId {
            playing_id,
            fade_ms: 10
        }));

        backend.render_audio();
        assert!(pool.get(key).unwrap().is_to_be_removed());
    }
}
