use crate::backend::{UniqueId, unique_id};

/// Description of a trigger (event definition) to construct
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerInfo {
    /// Event referenced by name. The id is derived from the name and the attenuation
    /// radius is looked up in the world's max attenuation table (0 if absent).
    Named { name: String },
    /// Event referenced by raw id with an explicit attenuation radius
    Raw {
        event_id: UniqueId,
        radius: f32,
        name: Option<String>,
    },
}

impl TriggerInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named { name: name.into() }
    }

    pub fn raw(event_id: UniqueId, radius: f32) -> Self {
        Self::Raw {
            event_id,
            radius,
            name: None,
        }
    }

    pub fn event_id(&self) -> UniqueId {
        match self {
            Self::Named { name } => unique_id(name),
            Self::Raw { event_id, .. } => *event_id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named { name } => Some(name),
            Self::Raw { name, .. } => name.as_deref(),
        }
    }
}

/// Description of a parameter connection. The value pushed to the backend is
/// `multiplier * value + shift`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    pub name: String,
    pub multiplier: f32,
    pub shift: f32,
}

impl ParameterInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multiplier: 1.0,
            shift: 0.0,
        }
    }

    pub fn with_scaling(mut self, multiplier: f32, shift: f32) -> Self {
        self.multiplier = multiplier;
        self.shift = shift;
        self
    }
}

/// Description of a switch state connection
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchStateInfo {
    /// Per-object switch in a switch group
    Switch { group: String, state: String },
    /// Global state in a state group
    State { group: String, state: String },
    /// Parameter set to a fixed value when the state is selected
    Rtpc { parameter: String, value: f32 },
}

impl SwitchStateInfo {
    pub fn switch(group: impl Into<String>, state: impl Into<String>) -> Self {
        Self::Switch {
            group: group.into(),
            state: state.into(),
        }
    }

    pub fn state(group: impl Into<String>, state: impl Into<String>) -> Self {
        Self::State {
            group: group.into(),
            state: state.into(),
        }
    }

    pub fn rtpc(parameter: impl Into<String>, value: f32) -> Self {
        Self::Rtpc {
            parameter: parameter.into(),
            value,
        }
    }
}

/// Description of an environment connection
#[derive(Debug, Clone, PartialEq)]
pub enum EnvironmentInfo {
    /// Auxiliary bus fed through per-object aux sends
    AuxBus { name: String },
    /// Parameter set to `multiplier * amount + shift`
    Rtpc {
        name: String,
        multiplier: f32,
        shift: f32,
    },
}

impl EnvironmentInfo {
    pub fn aux_bus(name: impl Into<String>) -> Self {
        Self::AuxBus { name: name.into() }
    }

    pub fn rtpc(name: impl Into<String>) -> Self {
        Self::Rtpc {
            name: name.into(),
            multiplier: 1.0,
            shift: 0.0,
        }
    }
}

/// Description of a sound bank file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub localized: bool,
}

impl FileInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            localized: false,
        }
    }

    pub fn localized(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            localized: true,
        }
    }
}
