use crate::core::CoreSettings;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Global configuration for the controller
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Wake/status HTTP endpoint
    #[serde(default)]
    pub server: ServerConfig,

    /// Connection to the container runtime
    #[serde(default)]
    pub docker: DockerConfig,

    /// Lifecycle controller tunables
    #[serde(default)]
    pub controller: ControllerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port for the wake/status endpoint (default: 8080)
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_listen_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DockerConfig {
    /// Docker endpoint, 'unix:///path' or 'tcp://host:port'.
    /// Unset falls back to DOCKER_HOST and then the platform socket.
    pub host: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ControllerConfig {
    /// Label prefix marking containers as managed (default: lazyload)
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,

    /// Seconds between reconcile passes (default: 5)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Idle seconds before stopping a container whose labels do not
    /// override it (default: 300)
    #[serde(default = "default_stop_delay")]
    pub default_stop_delay_secs: u64,

    /// Readiness status hint when labels do not say (default: 200)
    #[serde(default = "default_wait_for_code")]
    pub wait_for_code: u16,

    /// Readiness probe path hint when labels do not say (default: /)
    #[serde(default = "default_wait_for_path")]
    pub wait_for_path: String,

    /// Stop every managed container when the controller exits
    #[serde(default)]
    pub stop_on_exit: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            label_prefix: default_label_prefix(),
            poll_interval_secs: default_poll_interval(),
            default_stop_delay_secs: default_stop_delay(),
            wait_for_code: default_wait_for_code(),
            wait_for_path: default_wait_for_path(),
            stop_on_exit: false,
        }
    }
}

impl ControllerConfig {
    pub fn core_settings(&self) -> CoreSettings {
        CoreSettings {
            label_prefix: self.label_prefix.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            default_stop_delay: Duration::from_secs(self.default_stop_delay_secs),
            wait_for_code: self.wait_for_code,
            wait_for_path: self.wait_for_path.clone(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_label_prefix() -> String {
    "lazyload".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_stop_delay() -> u64 {
    300 // 5 minutes
}

fn default_wait_for_code() -> u16 {
    200
}

fn default_wait_for_path() -> String {
    "/".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.controller.label_prefix.trim().is_empty() {
            anyhow::bail!("controller.label_prefix must not be empty");
        }
        if self.controller.label_prefix.contains(char::is_whitespace) {
            anyhow::bail!("controller.label_prefix must not contain whitespace");
        }
        if self.controller.poll_interval_secs == 0 {
            anyhow::bail!("controller.poll_interval_secs must be greater than 0");
        }
        Ok(())
    }
}
