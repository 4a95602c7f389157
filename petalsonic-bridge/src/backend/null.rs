use super::{
    AuxSendValue, Backend, BackendError, BackendResult, BackendSettings, BankId,
    EndOfEventCallback, GameObjectId, PanningRule, PlayingId, UniqueId,
};
use crate::math::{Transformation, Vec3};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Result code reported for injected failures.
const FAIL_CODE: i32 = 2;
/// Result code reported for calls on unregistered game objects.
const INVALID_OBJECT_CODE: i32 = 15;
/// Without the internal thread, synchronous bank calls give up after this long
/// if nobody renders.
const BLOCKING_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Backend operations that can be made to fail with [`NullBackend::set_failing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOperation {
    Init,
    RegisterGameObject,
    UnregisterGameObject,
    SetDefaultListener,
    SetPosition,
    PostEvent,
    SetParameter,
    SetSwitch,
    SetState,
    SetAuxSends,
    LoadBank,
    UnloadBank,
    ClearBanks,
    SetLanguageFolder,
    SetPanningRule,
}

impl BackendOperation {
    fn name(self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::RegisterGameObject => "RegisterGameObject",
            Self::UnregisterGameObject => "UnregisterGameObject",
            Self::SetDefaultListener => "SetDefaultListener",
            Self::SetPosition => "SetPosition",
            Self::PostEvent => "PostEvent",
            Self::SetParameter => "SetParameter",
            Self::SetSwitch => "SetSwitch",
            Self::SetState => "SetState",
            Self::SetAuxSends => "SetAuxSends",
            Self::LoadBank => "LoadBank",
            Self::UnloadBank => "UnloadBank",
            Self::ClearBanks => "ClearBanks",
            Self::SetLanguageFolder => "SetLanguageFolder",
            Self::SetPanningRule => "SetPanningRule",
        }
    }
}

/// A call received by the [`NullBackend`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    RegisterGameObject {
        object: GameObjectId,
        name: String,
    },
    UnregisterGameObject {
        object: GameObjectId,
    },
    SetDefaultListener {
        listener: GameObjectId,
    },
    SetPosition {
        object: GameObjectId,
        position: Vec3,
    },
    PostEvent {
        event: UniqueId,
        object: GameObjectId,
        playing_id: Option<PlayingId>,
    },
    StopPlayingId {
        playing_id: PlayingId,
        fade_ms: u32,
    },
    StopAll {
        object: Option<GameObjectId>,
    },
    SetParameter {
        parameter: UniqueId,
        value: f32,
        object: Option<GameObjectId>,
    },
    SetSwitch {
        group: UniqueId,
        state: UniqueId,
        object: GameObjectId,
    },
    SetState {
        group: UniqueId,
        state: UniqueId,
    },
    SetAuxSends {
        object: GameObjectId,
        sends: Vec<AuxSendValue>,
    },
    LoadBank {
        name: String,
        bank: Option<BankId>,
    },
    UnloadBank {
        bank: BankId,
    },
    ClearBanks,
    SetLanguageFolder {
        folder: String,
    },
    SetPanningRule {
        rule: PanningRule,
    },
    CancelEventCallbacks {
        object: GameObjectId,
    },
}

struct PlayingEvent {
    object: GameObjectId,
    stopping: bool,
    on_end: EndOfEventCallback,
}

#[derive(Default)]
struct NullState {
    initialized: bool,
    internal_thread: bool,
    objects: BTreeMap<GameObjectId, String>,
    default_listener: Option<GameObjectId>,
    positions: HashMap<GameObjectId, Transformation>,
    parameters: HashMap<(UniqueId, Option<GameObjectId>), f32>,
    aux_sends: HashMap<GameObjectId, Vec<AuxSendValue>>,
    playing: BTreeMap<PlayingId, PlayingEvent>,
    next_playing_id: u32,
    banks: BTreeMap<BankId, String>,
    next_bank_id: u32,
    language_folder: Option<String>,
    panning_rule: PanningRule,
    failing: HashSet<BackendOperation>,
    calls: Vec<BackendCall>,
    render_count: u64,
}

impl NullState {
    fn check(&self, operation: BackendOperation) -> BackendResult<()> {
        if self.failing.contains(&operation) {
            Err(BackendError::new(operation.name(), FAIL_CODE))
        } else {
            Ok(())
        }
    }

    fn check_object(&self, operation: BackendOperation, object: GameObjectId) -> BackendResult<()> {
        self.check(operation)?;
        if self.objects.contains_key(&object) {
            Ok(())
        } else {
            Err(BackendError::new(operation.name(), INVALID_OBJECT_CODE))
        }
    }

    fn take_stopping(&mut self) -> Vec<EndOfEventCallback> {
        let stopping: Vec<PlayingId> = self
            .playing
            .iter()
            .filter(|(_, event)| event.stopping)
            .map(|(id, _)| *id)
            .collect();

        stopping
            .into_iter()
            .filter_map(|id| self.playing.remove(&id))
            .map(|event| event.on_end)
            .collect()
    }
}

/// In-process backend that renders nothing.
///
/// It keeps just enough bookkeeping to behave like real middleware from the bridge's
/// point of view: game objects must be registered before use, posted events stay
/// alive until they are finished or stopped, stopped events end on the next render
/// step, and with the internal thread disabled, synchronous bank calls block until
/// another thread renders. Every call is recorded and failures can be injected per
/// operation, which makes it the backend of choice for tests and the demo.
pub struct NullBackend {
    state: Mutex<NullState>,
    rendered: Condvar,
    rendering: AtomicBool,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NullState {
                next_playing_id: 1,
                next_bank_id: 1,
                ..Default::default()
            }),
            rendered: Condvar::new(),
            rendering: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NullState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the next render step if the internal thread is disabled.
    fn wait_for_render<'a>(
        &self,
        state: MutexGuard<'a, NullState>,
        operation: BackendOperation,
    ) -> (MutexGuard<'a, NullState>, BackendResult<()>) {
        if state.internal_thread {
            return (state, Ok(()));
        }

        let target = state.render_count + 1;
        let (state, timeout) = self
            .rendered
            .wait_timeout_while(state, BLOCKING_CALL_TIMEOUT, |state| {
                state.render_count < target
            })
            .unwrap_or_else(PoisonError::into_inner);

        if timeout.timed_out() {
            log::error!(
                "{} timed out waiting for a render step",
                operation.name()
            );
            (state, Err(BackendError::new(operation.name(), FAIL_CODE)))
        } else {
            (state, Ok(()))
        }
    }

    /// Makes every subsequent call of `operation` fail (or succeed again).
    pub fn set_failing(&self, operation: BackendOperation, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing.insert(operation);
        } else {
            state.failing.remove(&operation);
        }
    }

    /// Ends a playing event right away, firing its callback on the calling thread.
    pub fn finish_event(&self, playing_id: PlayingId) -> bool {
        let event = self.lock().playing.remove(&playing_id);
        match event {
            Some(event) => {
                (event.on_end)();
                true
            }
            None => false,
        }
    }

    /// Ends every playing event and returns how many callbacks fired.
    pub fn finish_all(&self) -> usize {
        let events = std::mem::take(&mut self.lock().playing);
        let count = events.len();
        for event in events.into_values() {
            (event.on_end)();
        }
        count
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    pub fn playing_ids(&self) -> Vec<PlayingId> {
        self.lock().playing.keys().copied().collect()
    }

    pub fn playing_ids_on(&self, object: GameObjectId) -> Vec<PlayingId> {
        self.lock()
            .playing
            .iter()
            .filter(|(_, event)| event.object == object)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn is_registered(&self, object: GameObjectId) -> bool {
        self.lock().objects.contains_key(&object)
    }

    pub fn default_listener(&self) -> Option<GameObjectId> {
        self.lock().default_listener
    }

    pub fn position(&self, object: GameObjectId) -> Option<Transformation> {
        self.lock().positions.get(&object).copied()
    }

    pub fn parameter(&self, parameter: UniqueId, object: Option<GameObjectId>) -> Option<f32> {
        self.lock().parameters.get(&(parameter, object)).copied()
    }

    pub fn aux_sends(&self, object: GameObjectId) -> Vec<AuxSendValue> {
        self.lock()
            .aux_sends
            .get(&object)
            .cloned()
            .unwrap_or_default()
    }

    pub fn loaded_banks(&self) -> Vec<String> {
        self.lock().banks.values().cloned().collect()
    }

    pub fn language_folder(&self) -> Option<String> {
        self.lock().language_folder.clone()
    }

    pub fn panning_rule(&self) -> PanningRule {
        self.lock().panning_rule
    }

    pub fn render_count(&self) -> u64 {
        self.lock().render_count
    }

    /// True while some thread is inside [`Backend::render_audio`].
    pub fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<BackendCall> {
        std::mem::take(&mut self.lock().calls)
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for NullBackend {
    fn init(&self, settings: &BackendSettings) -> BackendResult<()> {
        let mut state = self.lock();
        state.check(BackendOperation::Init)?;
        state.initialized = true;
        state.internal_thread = settings.enable_internal_thread;
        log::debug!(
            "Null backend initialized (internal thread: {})",
            settings.enable_internal_thread
        );
        Ok(())
    }

    fn term(&self) {
        let mut state = self.lock();
        state.initialized = false;
        state.objects.clear();
        state.positions.clear();
        state.playing.clear();
        state.banks.clear();
        state.default_listener = None;
        log::debug!("Null backend terminated");
    }

    fn register_game_object(&self, object: GameObjectId, name: &str) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::RegisterGameObject {
            object,
            name: name.to_owned(),
        });
        state.check(BackendOperation::RegisterGameObject)?;
        state.objects.insert(object, name.to_owned());
        Ok(())
    }

    fn unregister_game_object(&self, object: GameObjectId) -> BackendResult<()> {
        let mut state = self.lock();
        state
            .calls
            .push(BackendCall::UnregisterGameObject { object });
        state.check_object(BackendOperation::UnregisterGameObject, object)?;
        state.objects.remove(&object);
        state.positions.remove(&object);
        state.aux_sends.remove(&object);
        for event in state.playing.values_mut() {
            if event.object == object {
                event.stopping = true;
            }
        }
        if state.default_listener == Some(object) {
            state.default_listener = None;
        }
        Ok(())
    }

    fn set_default_listener(&self, listener: GameObjectId) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::SetDefaultListener { listener });
        state.check_object(BackendOperation::SetDefaultListener, listener)?;
        state.default_listener = Some(listener);
        Ok(())
    }

    fn set_position(
        &self,
        object: GameObjectId,
        transformation: &Transformation,
    ) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::SetPosition {
            object,
            position: transformation.position,
        });
        state.check_object(BackendOperation::SetPosition, object)?;
        state.positions.insert(object, *transformation);
        Ok(())
    }

    fn post_event(
        &self,
        event: UniqueId,
        object: GameObjectId,
        on_end: EndOfEventCallback,
    ) -> BackendResult<PlayingId> {
        let mut state = self.lock();
        if let Err(error) = state.check_object(BackendOperation::PostEvent, object) {
            state.calls.push(BackendCall::PostEvent {
                event,
                object,
                playing_id: None,
            });
            return Err(error);
        }

        let playing_id = PlayingId(state.next_playing_id);
        state.next_playing_id += 1;
        state.playing.insert(
            playing_id,
            PlayingEvent {
                object,
                stopping: false,
                on_end,
            },
        );
        state.calls.push(BackendCall::PostEvent {
            event,
            object,
            playing_id: Some(playing_id),
        });
        Ok(playing_id)
    }

    fn stop_playing_id(&self, playing_id: PlayingId, fade_ms: u32) {
        let mut state = self.lock();
        state.calls.push(BackendCall::StopPlayingId {
            playing_id,
            fade_ms,
        });
        if let Some(event) = state.playing.get_mut(&playing_id) {
            event.stopping = true;
        }
    }

    fn stop_all(&self, object: Option<GameObjectId>) {
        let mut state = self.lock();
        state.calls.push(BackendCall::StopAll { object });
        for event in state.playing.values_mut() {
            if object.is_none_or(|object| event.object == object) {
                event.stopping = true;
            }
        }
    }

    fn set_parameter(
        &self,
        parameter: UniqueId,
        value: f32,
        object: Option<GameObjectId>,
    ) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::SetParameter {
            parameter,
            value,
            object,
        });
        match object {
            Some(object) => state.check_object(BackendOperation::SetParameter, object)?,
            None => state.check(BackendOperation::SetParameter)?,
        }
        state.parameters.insert((parameter, object), value);
        Ok(())
    }

    fn set_switch(
        &self,
        group: UniqueId,
        switch_state: UniqueId,
        object: GameObjectId,
    ) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::SetSwitch {
            group,
            state: switch_state,
            object,
        });
        state.check_object(BackendOperation::SetSwitch, object)
    }

    fn set_state(&self, group: UniqueId, game_state: UniqueId) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::SetState {
            group,
            state: game_state,
        });
        state.check(BackendOperation::SetState)
    }

    fn set_aux_sends(&self, object: GameObjectId, sends: &[AuxSendValue]) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::SetAuxSends {
            object,
            sends: sends.to_vec(),
        });
        state.check_object(BackendOperation::SetAuxSends, object)?;
        state.aux_sends.insert(object, sends.to_vec());
        Ok(())
    }

    fn load_bank(&self, name: &str) -> BackendResult<BankId> {
        let mut state = self.lock();
        if let Err(error) = state.check(BackendOperation::LoadBank) {
            state.calls.push(BackendCall::LoadBank {
                name: name.to_owned(),
                bank: None,
            });
            return Err(error);
        }

        let bank = BankId(state.next_bank_id);
        state.next_bank_id += 1;
        state.banks.insert(bank, name.to_owned());
        state.calls.push(BackendCall::LoadBank {
            name: name.to_owned(),
            bank: Some(bank),
        });
        Ok(bank)
    }

    fn load_bank_from_memory(&self, data: &[u8]) -> BackendResult<BankId> {
        self.load_bank(&format!("<memory:{} bytes>", data.len()))
    }

    fn unload_bank(&self, bank: BankId) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::UnloadBank { bank });
        state.check(BackendOperation::UnloadBank)?;

        let (mut state, rendered) = self.wait_for_render(state, BackendOperation::UnloadBank);
        rendered?;

        match state.banks.remove(&bank) {
            Some(_) => Ok(()),
            None => Err(BackendError::new(
                BackendOperation::UnloadBank.name(),
                FAIL_CODE,
            )),
        }
    }

    fn clear_banks(&self) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::ClearBanks);
        state.check(BackendOperation::ClearBanks)?;

        let (mut state, rendered) = self.wait_for_render(state, BackendOperation::ClearBanks);
        rendered?;

        state.banks.clear();
        Ok(())
    }

    fn set_language_folder(&self, folder: &str) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::SetLanguageFolder {
            folder: folder.to_owned(),
        });
        state.check(BackendOperation::SetLanguageFolder)?;
        state.language_folder = Some(folder.to_owned());
        Ok(())
    }

    fn set_panning_rule(&self, rule: PanningRule) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::SetPanningRule { rule });
        state.check(BackendOperation::SetPanningRule)?;
        state.panning_rule = rule;
        Ok(())
    }

    fn render_audio(&self) {
        self.rendering.store(true, Ordering::SeqCst);

        let finished = {
            let mut state = self.lock();
            state.render_count += 1;
            state.take_stopping()
        };
        self.rendered.notify_all();

        for on_end in finished {
            on_end();
        }

        self.rendering.store(false, Ordering::SeqCst);
    }

    fn active_game_objects(&self) -> Vec<GameObjectId> {
        self.lock().objects.keys().copied().collect()
    }

    fn cancel_event_callbacks(&self, object: GameObjectId) {
        let mut state = self.lock();
        state
            .calls
            .push(BackendCall::CancelEventCallbacks { object });
        state.playing.retain(|_, event| event.object != object);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counting_callback(counter: &Arc<AtomicUsize>) -> EndOfEventCallback {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn initialized(internal_thread: bool) -> NullBackend {
        let backend = NullBackend::new();
        backend
            .init(&BackendSettings {
                enable_internal_thread: internal_thread,
            })
            .unwrap();
        backend
    }

    #[test]
    fn test_post_event_requires_registered_object() {
        let backend = initialized(true);
        let counter = Arc::new(AtomicUsize::new(0));

        let result = backend.post_event(1, GameObjectId(7), counting_callback(&counter));
        assert!(result.is_err());

        backend.register_game_object(GameObjectId(7), "emitter").unwrap();
        assert!(
            backend
                .post_event(1, GameObjectId(7), counting_callback(&counter))
                .is_ok()
        );
    }

    #[test]
    fn test_stopped_event_ends_on_next_render() {
        let backend = initialized(true);
        let counter = Arc::new(AtomicUsize::new(0));
        backend.register_game_object(GameObjectId(2), "emitter").unwrap();
        let playing_id = backend
            .post_event(1, GameObjectId(2), counting_callback(&counter))
            .unwrap();

        backend.stop_playing_id(playing_id, 10);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        backend.render_audio();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(backend.playing_ids().is_empty());
    }

    #[test]
    fn test_cancelled_callbacks_never_fire() {
        let backend = initialized(true);
        let counter = Arc::new(AtomicUsize::new(0));
        backend.register_game_object(GameObjectId(2), "emitter").unwrap();
        backend
            .post_event(1, GameObjectId(2), counting_callback(&counter))
            .unwrap();

        backend.cancel_event_callbacks(GameObjectId(2));
        assert_eq!(backend.finish_all(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_injected_failure() {
        let backend = initialized(true);
        backend.set_failing(BackendOperation::LoadBank, true);
        assert!(backend.load_bank("Init.bnk").is_err());

        backend.set_failing(BackendOperation::LoadBank, false);
        assert!(backend.load_bank("Init.bnk").is_ok());
        assert_eq!(backend.loaded_banks(), vec!["Init.bnk".to_string()]);
    }

    #[test]
    fn test_unload_without_internal_thread_needs_render() {
        let backend = Arc::new(initialized(false));
        let bank = backend.load_bank("Level.bnk").unwrap();

        let renderer = {
            let backend = backend.clone();
            std::thread::spawn(move || {
                while backend.render_count() == 0 || !backend.loaded_banks().is_empty() {
                    backend.render_audio();
                    std::thread::yield_now();
                }
            })
        };

        assert!(backend.unload_bank(bank).is_ok());
        renderer.join().unwrap();
        assert!(backend.loaded_banks().is_empty());
    }

    #[test]
    fn test_unload_with_internal_thread_does_not_block() {
        let backend = initialized(true);
        let bank = backend.load_bank("Level.bnk").unwrap();
        assert!(backend.unload_bank(bank).is_ok());
        assert_eq!(backend.render_count(), 0);
    }
}
