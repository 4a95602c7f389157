mod bridge_desc;
mod connection_info;

pub use bridge_desc::BridgeDesc;
pub use connection_info::{EnvironmentInfo, FileInfo, ParameterInfo, SwitchStateInfo, TriggerInfo};
