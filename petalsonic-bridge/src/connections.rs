//! Resolved content connections: parameters, switch states, environments and files.
//!
//! These are built from the `*Info` descriptions in [`crate::config`] when the world
//! constructs them. Names are hashed into backend ids once, at construction.

use crate::backend::{Backend, BackendResult, BankId, GameObjectId, UniqueId, unique_id};
use crate::config::{EnvironmentInfo, FileInfo, ParameterInfo, SwitchStateInfo};

/// A game parameter with a linear mapping onto the backend value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    id: UniqueId,
    multiplier: f32,
    shift: f32,
    name: String,
}

impl Parameter {
    pub fn from_info(info: &ParameterInfo) -> Self {
        Self {
            id: unique_id(&info.name),
            multiplier: info.multiplier,
            shift: info.shift,
            name: info.name.clone(),
        }
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_value(&self, value: f32) -> f32 {
        self.multiplier * value + self.shift
    }

    /// Sets the parameter on `object`, or globally when `None`.
    pub(crate) fn apply(
        &self,
        backend: &dyn Backend,
        value: f32,
        object: Option<GameObjectId>,
    ) -> BackendResult<()> {
        backend.set_parameter(self.id, self.backend_value(value), object)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwitchStateKind {
    Switch { group: UniqueId, state: UniqueId },
    State { group: UniqueId, state: UniqueId },
    Rtpc { parameter: UniqueId, value: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchState {
    kind: SwitchStateKind,
    name: String,
}

impl SwitchState {
    pub fn from_info(info: &SwitchStateInfo) -> Self {
        let (kind, name) = match info {
            SwitchStateInfo::Switch { group, state } => (
                SwitchStateKind::Switch {
                    group: unique_id(group),
                    state: unique_id(state),
                },
                format!("{group}/{state}"),
            ),
            SwitchStateInfo::State { group, state } => (
                SwitchStateKind::State {
                    group: unique_id(group),
                    state: unique_id(state),
                },
                format!("{group}/{state}"),
            ),
            SwitchStateInfo::Rtpc { parameter, value } => (
                SwitchStateKind::Rtpc {
                    parameter: unique_id(parameter),
                    value: *value,
                },
                format!("{parameter}={value}"),
            ),
        };

        Self { kind, name }
    }

    pub fn kind(&self) -> SwitchStateKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the state on `object`. States are global in the backend and ignore
    /// the object; rtpc switches on the global object are set globally.
    pub(crate) fn apply(
        &self,
        backend: &dyn Backend,
        object: GameObjectId,
        is_global_object: bool,
    ) -> BackendResult<()> {
        match self.kind {
            SwitchStateKind::Switch { group, state } => backend.set_switch(group, state, object),
            SwitchStateKind::State { group, state } => backend.set_state(group, state),
            SwitchStateKind::Rtpc { parameter, value } => {
                let target = (!is_global_object).then_some(object);
                backend.set_parameter(parameter, value, target)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvironmentKind {
    AuxBus {
        bus: UniqueId,
    },
    Rtpc {
        parameter: UniqueId,
        multiplier: f32,
        shift: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    kind: EnvironmentKind,
    name: String,
}

impl Environment {
    pub fn from_info(info: &EnvironmentInfo) -> Self {
        match info {
            EnvironmentInfo::AuxBus { name } => Self {
                kind: EnvironmentKind::AuxBus {
                    bus: unique_id(name),
                },
                name: name.clone(),
            },
            EnvironmentInfo::Rtpc {
                name,
                multiplier,
                shift,
            } => Self {
                kind: EnvironmentKind::Rtpc {
                    parameter: unique_id(name),
                    multiplier: *multiplier,
                    shift: *shift,
                },
                name: name.clone(),
            },
        }
    }

    pub fn kind(&self) -> EnvironmentKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A sound bank known to the world, loaded or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    localized: bool,
    bank: Option<BankId>,
}

impl File {
    pub fn from_info(info: &FileInfo) -> Self {
        Self {
            name: info.name.clone(),
            localized: info.localized,
            bank: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_localized(&self) -> bool {
        self.localized
    }

    pub fn bank(&self) -> Option<BankId> {
        self.bank
    }

    pub(crate) fn set_bank(&mut self, bank: Option<BankId>) {
        self.bank = bank;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, BackendSettings, NullBackend};

    fn backend_with_object(object: GameObjectId) -> NullBackend {
        let backend = NullBackend::new();
        backend
            .init(&BackendSettings {
                enable_internal_thread: true,
            })
            .unwrap();
        backend.register_game_object(object, "object").unwrap();
        backend
    }

    #[test]
    fn test_parameter_scaling() {
        let parameter = Parameter::from_info(&ParameterInfo::new("speed").with_scaling(2.0, 1.0));
        assert_eq!(parameter.backend_value(3.0), 7.0);
        assert_eq!(parameter.id(), unique_id("speed"));
    }

    #[test]
    fn test_state_ignores_object() {
        let object = GameObjectId(4);
        let backend = backend_with_object(object);
        let state = SwitchState::from_info(&SwitchStateInfo::state("music", "combat"));

        state.apply(&backend, object, false).unwrap();
        assert_eq!(backend.take_calls().last(), Some(&BackendCall::SetState {
            group: unique_id("music"),
            state: unique_id("combat"),
        }));
    }

    #[test]
    fn test_rtpc_switch_on_global_object_is_global() {
        let object = GameObjectId(2);
        let backend = backend_with_object(object);
        let switch = SwitchState::from_info(&SwitchStateInfo::rtpc("wetness", 0.5));

        switch.apply(&backend, object, true).unwrap();
        assert_eq!(backend.parameter(unique_id("wetness"), None), Some(0.5));
    }

    #[test]
    fn test_environment_kinds() {
        let bus = Environment::from_info(&EnvironmentInfo::aux_bus("Cave"));
        assert_eq!(bus.kind(), EnvironmentKind::AuxBus {
            bus: unique_id("cave")
        });

        let rtpc = Environment::from_info(&EnvironmentInfo::rtpc("indoor"));
        assert!(matches!(rtpc.kind(), EnvironmentKind::Rtpc { multiplier, .. } if multiplier == 1.0));
    }
}
