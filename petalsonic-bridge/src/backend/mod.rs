//! The downward call surface into the audio middleware.
//!
//! Everything the bridge needs from the rendering backend goes through the
//! [`Backend`] trait. Mixing, DSP, streaming and the bank format stay inside the
//! backend; the bridge only registers game objects, posts events, pushes parameter
//! values and moves banks in and out of memory.
//!
//! Implementations must be `Send + Sync`: the auxiliary thread calls
//! [`Backend::render_audio`] while the main thread is blocked inside a bank call, and
//! end-of-event callbacks may be fired from a backend-owned thread.

mod null;

pub use null::{BackendCall, BackendOperation, NullBackend};

use crate::math::Transformation;
use thiserror::Error;

/// 32-bit content identifier (event, parameter, switch group, bus, ...).
pub type UniqueId = u32;

/// Identifier of a registered game object (emitter or listener) inside the backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameObjectId(pub u64);

impl std::fmt::Display for GameObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GameObjectId({})", self.0)
    }
}

/// Identifier of one posted event as returned by the backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayingId(pub u32);

impl std::fmt::Display for PlayingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PlayingId({})", self.0)
    }
}

/// Identifier of a loaded sound bank.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BankId(pub u32);

/// Non-success result code returned by the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed with result code {code}")]
pub struct BackendError {
    pub operation: &'static str,
    pub code: i32,
}

impl BackendError {
    pub fn new(operation: &'static str, code: i32) -> Self {
        Self { operation, code }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Callback fired exactly once when a posted event has ended.
///
/// May run on any thread. It must not call back into the bridge.
pub type EndOfEventCallback = Box<dyn FnOnce() + Send + 'static>;

/// Amount routed from one game object to one auxiliary bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxSendValue {
    pub bus: UniqueId,
    pub amount: f32,
}

/// Settings handed to the backend once at init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    /// Whether the backend runs its own event-processing thread. When disabled,
    /// blocking bank operations need someone else to pump [`Backend::render_audio`].
    pub enable_internal_thread: bool,
}

/// How the main output is panned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanningRule {
    #[default]
    Speakers,
    Headphones,
}

pub trait Backend: Send + Sync {
    fn init(&self, settings: &BackendSettings) -> BackendResult<()>;

    fn term(&self);

    fn register_game_object(&self, object: GameObjectId, name: &str) -> BackendResult<()>;

    fn unregister_game_object(&self, object: GameObjectId) -> BackendResult<()>;

    fn set_default_listener(&self, listener: GameObjectId) -> BackendResult<()>;

    fn set_position(
        &self,
        object: GameObjectId,
        transformation: &Transformation,
    ) -> BackendResult<()>;

    /// Posts `event` on `object`. `on_end` must be invoked once the event has ended,
    /// including after it was stopped, unless its object's callbacks were cancelled.
    fn post_event(
        &self,
        event: UniqueId,
        object: GameObjectId,
        on_end: EndOfEventCallback,
    ) -> BackendResult<PlayingId>;

    fn stop_playing_id(&self, playing_id: PlayingId, fade_ms: u32);

    /// Stops everything on `object`, or everything everywhere when `None`.
    fn stop_all(&self, object: Option<GameObjectId>);

    /// Sets a parameter on `object`, or globally when `None`.
    fn set_parameter(
        &self,
        parameter: UniqueId,
        value: f32,
        object: Option<GameObjectId>,
    ) -> BackendResult<()>;

    fn set_switch(
        &self,
        group: UniqueId,
        state: UniqueId,
        object: GameObjectId,
    ) -> BackendResult<()>;

    fn set_state(&self, group: UniqueId, state: UniqueId) -> BackendResult<()>;

    fn set_aux_sends(&self, object: GameObjectId, sends: &[AuxSendValue]) -> BackendResult<()>;

    fn load_bank(&self, name: &str) -> BackendResult<BankId>;

    fn load_bank_from_memory(&self, data: &[u8]) -> BackendResult<BankId>;

    /// Synchronous. Without the internal thread this only returns once
    /// [`Backend::render_audio`] has been pumped by someone else.
    fn unload_bank(&self, bank: BankId) -> BackendResult<()>;

    /// Synchronous, with the same threading caveat as [`Backend::unload_bank`].
    fn clear_banks(&self) -> BackendResult<()>;

    /// Folder that localized banks are resolved against from now on.
    fn set_language_folder(&self, folder: &str) -> BackendResult<()>;

    fn set_panning_rule(&self, rule: PanningRule) -> BackendResult<()>;

    fn render_audio(&self);

    fn active_game_objects(&self) -> Vec<GameObjectId>;

    fn cancel_event_callbacks(&self, object: GameObjectId);
}

/// Hashes a content name into its [`UniqueId`] using 32-bit FNV-1 over the lower-cased
/// bytes, which is how middleware authoring tools derive ids from names.
pub const fn unique_id(name: &str) -> UniqueId {
    const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
    const FNV_PRIME: u32 = 16_777_619;

    let bytes = name.as_bytes();
    let mut hash = FNV_OFFSET_BASIS;
    let mut index = 0;

    while index < bytes.len() {
        hash = hash.wrapping_mul(FNV_PRIME) ^ bytes[index].to_ascii_lowercase() as u32;
        index += 1;
    }

    hash
}
