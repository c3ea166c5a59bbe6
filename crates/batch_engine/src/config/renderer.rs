use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};

/// Number of layer rows in every object record. Shaders index the same table.
pub const MAX_LAYERS: usize = 8;

/// Resource references one object can hold per layer
pub const MAX_LAYER_RESOURCES: usize = 4;

/// Resource-slot value meaning "no resource, use the intrinsic color"
pub const NO_RESOURCE: u32 = u32::MAX;

/// # Renderer Configuration
///
/// Fixed capacities of the shared device tables and the pipeline depth.
/// Nothing here can change after the renderer is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Slots in the shared resource binding table
    pub max_resources: u32,
    /// Slots in the per-object record table
    pub max_objects: u32,
    /// Entries in the shared indirect draw-command buffer
    pub max_draw_commands: u32,
    /// Frames whose device work may be unfinished at once
    pub frames_in_flight: usize,
    /// Upper bound on a single fence wait, in nanoseconds
    pub fence_timeout_ns: u64,
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
}

impl RendererConfig {
    /// Create a configuration with the engine defaults
    pub fn new() -> Self {
        Self {
            max_resources: 8,
            max_objects: 10_000,
            max_draw_commands: 10_000,
            frames_in_flight: 2,
            fence_timeout_ns: 1_000_000_000,
            log_level: "info".to_string(),
        }
    }

    /// Set the resource table capacity
    pub fn with_max_resources(mut self, count: u32) -> Self {
        self.max_resources = count;
        self
    }

    /// Set the object record table capacity
    pub fn with_max_objects(mut self, count: u32) -> Self {
        self.max_objects = count;
        self
    }

    /// Set the draw-command buffer capacity
    pub fn with_max_draw_commands(mut self, count: u32) -> Self {
        self.max_draw_commands = count;
        self
    }

    /// Set the pipeline depth
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the fence wait timeout
    pub fn with_fence_timeout_ns(mut self, timeout: u64) -> Self {
        self.fence_timeout_ns = timeout;
        self
    }

    /// Set the fallback log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_resources == 0 {
            return Err(ConfigError::Invalid("max_resources must be at least 1".to_string()));
        }
        if self.max_objects == 0 {
            return Err(ConfigError::Invalid("max_objects must be at least 1".to_string()));
        }
        if self.max_draw_commands == 0 {
            return Err(ConfigError::Invalid(
                "max_draw_commands must be at least 1".to_string(),
            ));
        }
        if self.frames_in_flight == 0 || self.frames_in_flight > 8 {
            return Err(ConfigError::Invalid(format!(
                "frames_in_flight must be within 1..=8, got {}",
                self.frames_in_flight
            )));
        }
        if self.max_resources == NO_RESOURCE {
            return Err(ConfigError::Invalid(
                "max_resources collides with the no-resource sentinel".to_string(),
            ));
        }
        if self.max_draw_commands < self.max_objects {
            log::warn!(
                "max_draw_commands ({}) is below max_objects ({}); a full scene will overflow the draw buffer",
                self.max_draw_commands,
                self.max_objects
            );
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for RendererConfig {}
