//! # Engine Configuration
//!
//! Switches that steer engine selection and argument handling. A config is
//! captured by each command graph when it is created; nothing here is read
//! from process-wide state while recording.

/// Recording policy switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Allow fills on the copy engine when its pattern limit permits
    pub use_copy_engine_for_fill: bool,
    /// Route device-to-device copies to the copy engine as well
    pub use_copy_engine_for_d2d_copy: bool,
    /// Treat a pointer-sized all-zero by-value argument update as a null pointer
    pub null_value_args_as_null_pointers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_copy_engine_for_fill: false,
            use_copy_engine_for_d2d_copy: false,
            null_value_args_as_null_pointers: true,
        }
    }
}

impl EngineConfig {
    /// Start from defaults
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Overlay environment overrides on the defaults
    ///
    /// Recognized variables (`0`/`1`, `true`/`false`):
    /// - `REPLAY_USE_COPY_ENGINE_FOR_FILL`, falling back to `UR_L0_USE_COPY_ENGINE_FOR_FILL`
    /// - `REPLAY_USE_COPY_ENGINE_FOR_D2D_COPY`, falling back to `UR_L0_USE_COPY_ENGINE_FOR_D2D_COPY`
    /// - `REPLAY_NULL_VALUE_ARGS_AS_NULL_POINTERS`
    #[cfg(feature = "std")]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay overrides produced by `lookup`
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<alloc::string::String>,
    {
        let flag = |names: &[&str]| names.iter().find_map(|name| lookup(name)).and_then(|v| parse_flag(&v));

        if let Some(v) = flag(&[
            "REPLAY_USE_COPY_ENGINE_FOR_FILL",
            "UR_L0_USE_COPY_ENGINE_FOR_FILL",
        ]) {
            self.use_copy_engine_for_fill = v;
        }
        if let Some(v) = flag(&[
            "REPLAY_USE_COPY_ENGINE_FOR_D2D_COPY",
            "UR_L0_USE_COPY_ENGINE_FOR_D2D_COPY",
        ]) {
            self.use_copy_engine_for_d2d_copy = v;
        }
        if let Some(v) = flag(&["REPLAY_NULL_VALUE_ARGS_AS_NULL_POINTERS"]) {
            self.null_value_args_as_null_pointers = v;
        }
        log::debug!("engine config: {:?}", self);
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "on" => Some(true),
        "0" | "false" | "FALSE" | "off" => Some(false),
        other => {
            log::warn!("ignoring unrecognized flag value {:?}", other);
            None
        }
    }
}

/// Builder for [`EngineConfig`]
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Defaults
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// See [`EngineConfig::use_copy_engine_for_fill`]
    pub fn use_copy_engine_for_fill(mut self, enable: bool) -> Self {
        self.config.use_copy_engine_for_fill = enable;
        self
    }

    /// See [`EngineConfig::use_copy_engine_for_d2d_copy`]
    pub fn use_copy_engine_for_d2d_copy(mut self, enable: bool) -> Self {
        self.config.use_copy_engine_for_d2d_copy = enable;
        self
    }

    /// See [`EngineConfig::null_value_args_as_null_pointers`]
    pub fn null_value_args_as_null_pointers(mut self, enable: bool) -> Self {
        self.config.null_value_args_as_null_pointers = enable;
        self
    }

    /// Finish
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::{String, ToString};

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.use_copy_engine_for_fill);
        assert!(!config.use_copy_engine_for_d2d_copy);
        assert!(config.null_value_args_as_null_pointers);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::builder()
            .use_copy_engine_for_fill(true)
            .null_value_args_as_null_pointers(false)
            .build();
        assert!(config.use_copy_engine_for_fill);
        assert!(!config.null_value_args_as_null_pointers);
    }

    #[test]
    fn test_overrides_prefer_primary_name() {
        let lookup = |name: &str| -> Option<String> {
            match name {
                "REPLAY_USE_COPY_ENGINE_FOR_FILL" => Some("0".to_string()),
                "UR_L0_USE_COPY_ENGINE_FOR_FILL" => Some("1".to_string()),
                "UR_L0_USE_COPY_ENGINE_FOR_D2D_COPY" => Some("true".to_string()),
                _ => None,
            }
        };
        let config = EngineConfig::builder()
            .use_copy_engine_for_fill(true)
            .build()
            .with_overrides(lookup);
        assert!(!config.use_copy_engine_for_fill);
        assert!(config.use_copy_engine_for_d2d_copy);
    }

    #[test]
    fn test_overrides_ignore_garbage() {
        let config = EngineConfig::default()
            .with_overrides(|_| Some("maybe".to_string()));
        assert_eq!(config, EngineConfig::default());
    }
}
