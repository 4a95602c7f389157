use crate::error::{BridgeError, Result};

/// Configuration descriptor for a bridge world. Read once when the world is created.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeDesc {
    /// Maximum number of emitter objects, the global object included
    pub object_pool_size: usize,
    /// Maximum number of concurrently tracked event instances
    pub event_pool_size: usize,
    pub trigger_pool_size: usize,
    pub parameter_pool_size: usize,
    pub switch_state_pool_size: usize,
    pub environment_pool_size: usize,
    pub file_pool_size: usize,
    pub listener_pool_size: usize,
    /// Minimum change of a derived velocity before it is pushed to the backend again
    pub velocity_tracking_threshold: f32,
    /// Fraction of the distance to the closest listener an object has to move before
    /// its position is pushed to the backend again
    pub position_update_threshold_multiplier: f32,
    /// Whether the backend runs its own event-processing thread. When disabled, the
    /// bridge spawns an auxiliary thread for blocking bank operations.
    pub enable_internal_thread: bool,
    /// Bank loaded at startup and reloaded by `on_refresh`
    pub init_bank_name: String,
    /// Fade applied when stopping individual triggers, in milliseconds
    pub stop_fade_ms: u32,
    /// Folder holding non-localized banks
    pub bank_folder: String,
    /// Root of the per-language folders. Localized banks live under
    /// `<localization_folder>/<language>/<bank_folder>`.
    pub localization_folder: String,
    /// Language selected at startup
    pub language: String,
}

impl Default for BridgeDesc {
    fn default() -> Self {
        Self {
            object_pool_size: 256,
            event_pool_size: 512,
            trigger_pool_size: 512,
            parameter_pool_size: 256,
            switch_state_pool_size: 256,
            environment_pool_size: 64,
            file_pool_size: 64,
            listener_pool_size: 8,
            velocity_tracking_threshold: 0.1,
            position_update_threshold_multiplier: 0.02,
            enable_internal_thread: true,
            init_bank_name: "Init.bnk".to_string(),
            stop_fade_ms: 10,
            bank_folder: "audio/wwise".to_string(),
            localization_folder: "localization".to_string(),
            language: "english".to_string(),
        }
    }
}

impl BridgeDesc {
    pub fn with_object_pool_size(mut self, size: usize) -> Self {
        self.object_pool_size = size;
        self
    }

    pub fn with_event_pool_size(mut self, size: usize) -> Self {
        self.event_pool_size = size;
        self
    }

    pub fn with_trigger_pool_size(mut self, size: usize) -> Self {
        self.trigger_pool_size = size;
        self
    }

    pub fn with_listener_pool_size(mut self, size: usize) -> Self {
        self.listener_pool_size = size;
        self
    }

    pub fn with_velocity_tracking_threshold(mut self, threshold: f32) -> Self {
        self.velocity_tracking_threshold = threshold;
        self
    }

    pub fn with_position_update_threshold_multiplier(mut self, multiplier: f32) -> Self {
        self.position_update_threshold_multiplier = multiplier;
        self
    }

    pub fn with_internal_thread(mut self, enabled: bool) -> Self {
        self.enable_internal_thread = enabled;
        self
    }

    pub fn with_init_bank_name(mut self, name: impl Into<String>) -> Self {
        self.init_bank_name = name.into();
        self
    }

    pub fn with_stop_fade_ms(mut self, fade_ms: u32) -> Self {
        self.stop_fade_ms = fade_ms;
        self
    }

    pub fn with_bank_folder(mut self, folder: impl Into<String>) -> Self {
        self.bank_folder = folder.into();
        self
    }

    pub fn with_localization_folder(mut self, folder: impl Into<String>) -> Self {
        self.localization_folder = folder.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Folder localized banks are read from for `language`.
    pub fn localized_bank_folder(&self, language: &str) -> String {
        format!(
            "{}/{}/{}",
            self.localization_folder, language, self.bank_folder
        )
    }

    /// Checks every value the world relies on at construction time.
    pub fn validate(&self) -> Result<()> {
        let pools = [
            ("object", self.object_pool_size),
            ("event", self.event_pool_size),
            ("trigger", self.trigger_pool_size),
            ("parameter", self.parameter_pool_size),
            ("switch state", self.switch_state_pool_size),
            ("environment", self.environment_pool_size),
            ("file", self.file_pool_size),
            ("listener", self.listener_pool_size),
        ];

        for (name, size) in pools {
            if size == 0 {
                return Err(BridgeError::Configuration(format!(
                    "{name} pool size must be at least 1"
                )));
            }
            if u32::try_from(size).is_err() {
                return Err(BridgeError::Configuration(format!(
                    "{name} pool size {size} is too large"
                )));
            }
        }

        if self.velocity_tracking_threshold.is_nan() || self.velocity_tracking_threshold < 0.0 {
            return Err(BridgeError::Configuration(format!(
                "velocity tracking threshold must be non-negative, got {}",
                self.velocity_tracking_threshold
            )));
        }

        if self.position_update_threshold_multiplier.is_nan()
            || self.position_update_threshold_multiplier < 0.0
        {
            return Err(BridgeError::Configuration(format!(
                "position update threshold multiplier must be non-negative, got {}",
                self.position_update_threshold_multiplier
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let desc = BridgeDesc::default();
        assert!(desc.validate().is_ok());
        assert_eq!(desc.velocity_tracking_threshold, 0.1);
        assert_eq!(desc.position_update_threshold_multiplier, 0.02);
        assert!(desc.enable_internal_thread);
        assert_eq!(desc.init_bank_name, "Init.bnk");
        assert_eq!(desc.stop_fade_ms, 10);
        assert_eq!(desc.language, "english");
    }

    #[test]
    fn test_localized_bank_folder() {
        let desc = BridgeDesc::default()
            .with_bank_folder("sounds")
            .with_localization_folder("loc");
        assert_eq!(desc.localized_bank_folder("german"), "loc/german/sounds");
    }

    #[test]
    fn test_zero_pool_size_is_rejected() {
        let desc = BridgeDesc::default().with_listener_pool_size(0);
        assert!(matches!(
            desc.validate(),
            Err(BridgeError::Configuration(message)) if message.contains("listener")
        ));
    }

    #[test]
    fn test_nan_threshold_is_rejected() {
        let desc = BridgeDesc::default().with_velocity_tracking_threshold(f32::NAN);
        assert!(desc.validate().is_err());
    }
}
