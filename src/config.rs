//! Component and port configuration.
//!
//! Configuration is normally built in code with the `with_*` builders, or
//! loaded from a TOML file:
//!
//! ```toml
//! name = "vdec"
//! roles = ["video_decoder.avc"]
//! notify_mode = "any"
//! transition_timeout_ms = 500
//!
//! [[ports]]
//! direction = "input"
//! channel = "ring"
//! props = { buffer_count = 4, watermark = 1 }
//!
//! [[ports]]
//! direction = "output"
//! ```

use crate::error::{Error, Result};
use crate::port::{PortDirection, PortProps};
use crate::trigger::NotifyMode;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Default number of commands that may wait for the worker.
pub const DEFAULT_COMMAND_QUEUE_DEPTH: usize = 16;

/// Default bound on an ordinary state transition.
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bound on transitions that acquire hardware resources.
pub const DEFAULT_RESOURCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default transport type.
pub const DEFAULT_CHANNEL: &str = "ring";

/// Configuration of one port.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PortConfig {
    /// Port direction.
    pub direction: PortDirection,
    /// Registered transport type name.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Whether the port starts enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Port properties.
    #[serde(default)]
    pub props: PortProps,
}

impl PortConfig {
    /// An enabled input port on the default transport.
    pub fn input() -> Self {
        Self::new(PortDirection::Input)
    }

    /// An enabled output port on the default transport.
    pub fn output() -> Self {
        Self::new(PortDirection::Output)
    }

    fn new(direction: PortDirection) -> Self {
        Self {
            direction,
            channel: default_channel(),
            enabled: true,
            props: PortProps::default(),
        }
    }

    /// Select the transport type.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Set the port properties.
    pub fn with_props(mut self, props: PortProps) -> Self {
        self.props = props;
        self
    }

    /// Start the port disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Configuration of a component instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// Component name; also the target name matched by buffer marks.
    pub name: String,
    /// Roles the component can take, in enumeration order.
    pub roles: Vec<String>,
    /// Index of the first port.
    pub port_base_index: u32,
    /// Ports, in index order.
    pub ports: Vec<PortConfig>,
    /// Trigger combination mode.
    pub notify_mode: NotifyMode,
    /// Commands that may wait for the worker before `send_command` fails.
    pub command_queue_depth: usize,
    /// Bound on ordinary command acknowledgements.
    #[serde(rename = "transition_timeout_ms", deserialize_with = "duration_ms")]
    pub transition_timeout: Duration,
    /// Bound on transitions that wait for buffers or hardware.
    #[serde(rename = "resource_timeout_ms", deserialize_with = "duration_ms")]
    pub resource_timeout: Duration,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            name: "component".to_string(),
            roles: Vec::new(),
            port_base_index: 0,
            ports: Vec::new(),
            notify_mode: NotifyMode::default(),
            command_queue_depth: DEFAULT_COMMAND_QUEUE_DEPTH,
            transition_timeout: DEFAULT_TRANSITION_TIMEOUT,
            resource_timeout: DEFAULT_RESOURCE_TIMEOUT,
        }
    }
}

impl ComponentConfig {
    /// Create a configuration with the given name and defaults otherwise.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add a port.
    pub fn with_port(mut self, port: PortConfig) -> Self {
        self.ports.push(port);
        self
    }

    /// Set the index of the first port.
    pub fn with_port_base_index(mut self, base: u32) -> Self {
        self.port_base_index = base;
        self
    }

    /// Set the trigger combination mode.
    pub fn with_notify_mode(mut self, mode: NotifyMode) -> Self {
        self.notify_mode = mode;
        self
    }

    /// Set the command queue depth.
    pub fn with_command_queue_depth(mut self, depth: usize) -> Self {
        self.command_queue_depth = depth;
        self
    }

    /// Set the ordinary transition timeout.
    pub fn with_transition_timeout(mut self, timeout: Duration) -> Self {
        self.transition_timeout = timeout;
        self
    }

    /// Set the resource transition timeout.
    pub fn with_resource_timeout(mut self, timeout: Duration) -> Self {
        self.resource_timeout = timeout;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::BadParameter(format!("invalid component config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::BadParameter(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded component config from {}", path.display());
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::BadParameter("component name is empty".into()));
        }
        if self.command_queue_depth == 0 {
            return Err(Error::BadParameter("command queue depth must be > 0".into()));
        }
        if self
            .port_base_index
            .checked_add(self.ports.len() as u32)
            .is_none()
        {
            return Err(Error::BadParameter("port indices overflow".into()));
        }
        for (offset, port) in self.ports.iter().enumerate() {
            let index = self.port_base_index + offset as u32;
            if port.props.buffer_count == 0 {
                return Err(Error::BadParameter(format!(
                    "port {} needs at least one buffer",
                    index
                )));
            }
            if port.props.buffer_count < port.props.min_buffer_count {
                return Err(Error::BadParameter(format!(
                    "port {} buffer count {} below minimum {}",
                    index, port.props.buffer_count, port.props.min_buffer_count
                )));
            }
        }
        Ok(())
    }
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_true() -> bool {
    true
}

fn duration_ms<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Serde helper for optional millisecond durations.
pub(crate) mod option_duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
