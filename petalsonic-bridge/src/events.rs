//! Event types for PetalSonic Bridge

use crate::event_instance::TriggerInstanceId;
use crate::pool::ObjectKey;

/// Report published by the world and drained with `AudioWorld::poll_events`.
///
/// Reports are only produced on the thread driving `AudioWorld::update`, never from
/// backend callback threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A trigger execution ended and its event instance was removed.
    TriggerInstanceFinished {
        object: ObjectKey,
        trigger_instance_id: TriggerInstanceId,
    },
    /// Every remaining event instance on the object went virtual.
    ObjectVirtualized { object: ObjectKey },
    /// At least one event instance on a virtual object became audible again.
    ObjectPhysicalized { object: ObjectKey },
}

impl BridgeEvent {
    pub fn object(&self) -> ObjectKey {
        match self {
            Self::TriggerInstanceFinished { object, .. }
            | Self::ObjectVirtualized { object }
            | Self::ObjectPhysicalized { object } => *object,
        }
    }

    pub fn is_virtual_state_change(&self) -> bool {
        matches!(
            self,
            Self::ObjectVirtualized { .. } | Self::ObjectPhysicalized { .. }
        )
    }
}
