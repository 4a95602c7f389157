//! PetalSonic Bridge
//!
//! Translates engine-level audio requests (objects, listeners, triggers, parameters,
//! switches, environments, sound banks) into calls on an audio middleware backend.
//! The bridge keeps the bookkeeping the backend does not: which event instances are
//! still alive, whether an object is audible at all, and the velocities derived from
//! successive positions.
//!
//! ```no_run
//! use petalsonic_bridge::{AudioWorld, BridgeDesc, NullBackend, Transformation, TriggerInfo, Vec3};
//! use std::sync::Arc;
//!
//! # fn main() -> petalsonic_bridge::Result<()> {
//! let mut world = AudioWorld::new(BridgeDesc::default(), Arc::new(NullBackend::new()))?;
//!
//! world.construct_listener(Transformation::identity(), "camera")?;
//! let door = world.construct_object(Transformation::from_position(Vec3::new(3.0, 0.0, 0.0)), "door")?;
//! let creak = world.construct_trigger(&TriggerInfo::named("Play_Door_Creak"))?;
//!
//! world.execute_trigger(door, creak, 1);
//!
//! loop {
//!     world.update(1.0 / 60.0);
//!     for event in world.poll_events() {
//!         println!("{:?}", event);
//!     }
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

pub mod aux_thread;
pub mod backend;
pub mod config;
pub mod connections;
pub mod error;
pub mod event_instance;
pub mod events;
pub mod listener;
pub mod math;
pub mod object;
pub mod pool;
pub mod trigger;
pub mod velocity;
pub mod world;

pub use backend::{
    Backend, GameObjectId, NullBackend, PanningRule, PlayingId, UniqueId, unique_id,
};
pub use config::{
    BridgeDesc, EnvironmentInfo, FileInfo, ParameterInfo, SwitchStateInfo, TriggerInfo,
};
pub use error::{BridgeError, RequestStatus, Result, TriggerResult};
pub use event_instance::{EventInstanceState, TriggerInstanceId};
pub use events::BridgeEvent;
pub use math::{Quat, Transformation, Vec3};
pub use object::{ObjectFlags, ObjectFunctionality};
pub use pool::{
    EnvironmentKey, EventInstanceKey, FileKey, ListenerKey, ObjectKey, ParameterKey,
    SwitchStateKey, TriggerKey,
};
pub use world::{AudioWorld, WorldPoolStats};
