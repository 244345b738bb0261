//! Container-runtime capability and its Docker implementation
//!
//! The controller only ever talks to the runtime through the narrow [`Host`]
//! trait: list with a label filter, start, stop, a one-shot stats sample,
//! and close. [`DockerHost`] maps the trait onto the Docker Engine API via
//! bollard; tests substitute an in-memory implementation.

use async_trait::async_trait;
use bollard::container::{ListContainersOptions, StartContainerOptions, StatsOptions, StopContainerOptions};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Length of the shortened container id used in log lines
const SHORT_ID_LEN: usize = 12;

/// Errors surfaced by the container runtime
#[derive(Debug, Error)]
pub enum HostError {
    /// The runtime has no container with the given id
    #[error("no such container: {cid}")]
    NotFound { cid: String },

    /// The runtime could not be reached or refused the request
    #[error("container runtime error: {reason}")]
    Transport { reason: String },

    /// The runtime answered with a payload we could not interpret
    #[error("malformed runtime payload: {reason}")]
    Decode { reason: String },
}

impl HostError {
    fn from_bollard(cid: &str, err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                HostError::NotFound { cid: cid.to_string() }
            }
            bollard::errors::Error::JsonDataError { .. } | bollard::errors::Error::JsonSerdeError { .. } => {
                HostError::Decode { reason: err.to_string() }
            }
            other => HostError::Transport { reason: other.to_string() },
        }
    }
}

/// A container as reported by the runtime's list endpoint
#[derive(Debug, Clone, Default)]
pub struct ContainerSummary {
    pub cid: String,
    pub name: String,
    pub image: String,
    pub running: bool,
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    /// Shortened id for log lines, docker-cli style
    pub fn short_id(&self) -> &str {
        short(&self.cid)
    }

    /// `name(shortid)` as used throughout the logs
    pub fn log_name(&self) -> String {
        format!("{}({})", self.name, self.short_id())
    }
}

/// Truncate a container id for display
pub fn short(cid: &str) -> &str {
    if cid.len() <= SHORT_ID_LEN {
        cid
    } else {
        &cid[..SHORT_ID_LEN]
    }
}

/// Cumulative byte counters for one network interface
#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceBytes {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// A single point-in-time stats sample for one container
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    /// Number of processes inside the container; 0 means not executing
    pub pids_current: u64,
    /// Cumulative byte counters per network interface
    pub networks: HashMap<String, InterfaceBytes>,
}

impl StatsSnapshot {
    /// Sum the rx/tx counters across every interface
    pub fn network_totals(&self) -> (u64, u64) {
        let mut recv = 0;
        let mut send = 0;
        for ifx in self.networks.values() {
            recv += ifx.rx_bytes;
            send += ifx.tx_bytes;
        }
        (recv, send)
    }
}

/// Narrow runtime capability the controller is written against.
///
/// `filter` is a label constraint: either a bare label key or a
/// `key=value` pair, matching what the Docker list endpoint accepts.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    async fn list(&self, filter: &str, include_stopped: bool) -> Result<Vec<ContainerSummary>, HostError>;

    async fn start(&self, cid: &str) -> Result<(), HostError>;

    async fn stop(&self, cid: &str) -> Result<(), HostError>;

    /// Sample runtime statistics exactly once, without streaming
    async fn stats_once(&self, cid: &str) -> Result<StatsSnapshot, HostError>;

    /// Release any resources held against the runtime
    async fn close(&self);
}

/// [`Host`] implementation backed by the Docker Engine API
pub struct DockerHost {
    client: Docker,
}

impl DockerHost {
    /// Connect to the Docker daemon and verify it responds.
    ///
    /// Connection priority:
    /// 1. Explicit `docker_host` parameter
    /// 2. `DOCKER_HOST` environment variable
    /// 3. bollard's platform default socket
    pub async fn connect(docker_host: Option<&str>) -> anyhow::Result<Self> {
        let client = if let Some(host) = docker_host {
            Self::connect_to(host)?
        } else if let Ok(host) = std::env::var("DOCKER_HOST") {
            Self::connect_to(&host)?
        } else {
            Docker::connect_with_socket_defaults().map_err(|e| {
                anyhow::anyhow!(
                    "Cannot connect to the Docker daemon: {}. \
                     Start dockerd or set DOCKER_HOST.",
                    e
                )
            })?
        };

        client.ping().await.map_err(|e| {
            anyhow::anyhow!("Docker daemon is not responding: {}", e)
        })?;

        debug!("Connected to Docker daemon");
        Ok(Self { client })
    }

    fn connect_to(host: &str) -> anyhow::Result<Docker> {
        if host.starts_with("unix://") {
            let socket_path = host.trim_start_matches("unix://");
            Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| anyhow::anyhow!("Cannot connect to Unix socket '{}': {}", socket_path, e))
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| anyhow::anyhow!("Cannot connect to TCP endpoint '{}': {}", host, e))
        } else {
            anyhow::bail!(
                "Invalid docker host '{}': expected 'unix:///path/to/socket' or 'tcp://host:port'",
                host
            )
        }
    }

    /// Human-readable daemon identity for the startup banner
    pub async fn runtime_banner(&self) -> Option<String> {
        match self.client.version().await {
            Ok(v) => Some(format!(
                "{} (v{})",
                v.platform.map(|p| p.name).unwrap_or_else(|| "docker".to_string()),
                v.version.unwrap_or_else(|| "?".to_string())
            )),
            Err(_) => None,
        }
    }
}

fn summary_from(ct: bollard::models::ContainerSummary) -> ContainerSummary {
    // Docker reports names with a leading slash
    let name = ct
        .names
        .as_ref()
        .and_then(|n| n.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .or_else(|| ct.image.clone())
        .unwrap_or_default();

    ContainerSummary {
        cid: ct.id.unwrap_or_default(),
        name,
        image: ct.image.unwrap_or_default(),
        running: ct.state.as_deref() == Some("running"),
        labels: ct.labels.unwrap_or_default(),
    }
}

#[async_trait]
impl Host for DockerHost {
    async fn list(&self, filter: &str, include_stopped: bool) -> Result<Vec<ContainerSummary>, HostError> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert("label".to_string(), vec![filter.to_string()]);

        let containers = self
            .client
            .list_containers(Some(ListContainersOptions {
                all: include_stopped,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| HostError::from_bollard("", e))?;

        Ok(containers.into_iter().map(summary_from).collect())
    }

    async fn start(&self, cid: &str) -> Result<(), HostError> {
        match self.client.start_container(cid, None::<StartContainerOptions<String>>).await {
            Ok(()) => Ok(()),
            // 304: already started
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }) => {
                debug!(cid = short(cid), "container was already started");
                Ok(())
            }
            Err(e) => Err(HostError::from_bollard(cid, e)),
        }
    }

    async fn stop(&self, cid: &str) -> Result<(), HostError> {
        match self.client.stop_container(cid, None::<StopContainerOptions>).await {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }) => {
                debug!(cid = short(cid), "container was already stopped");
                Ok(())
            }
            Err(e) => Err(HostError::from_bollard(cid, e)),
        }
    }

    async fn stats_once(&self, cid: &str) -> Result<StatsSnapshot, HostError> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };

        let stats = self
            .client
            .stats(cid, Some(options))
            .next()
            .await
            .ok_or_else(|| HostError::Decode {
                reason: "stats stream ended without a sample".to_string(),
            })?
            .map_err(|e| HostError::from_bollard(cid, e))?;

        let networks = stats
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, ns)| {
                (
                    name,
                    InterfaceBytes {
                        rx_bytes: ns.rx_bytes,
                        tx_bytes: ns.tx_bytes,
                    },
                )
            })
            .collect();

        Ok(StatsSnapshot {
            pids_current: stats.pids_stats.current.unwrap_or(0),
            networks,
        })
    }

    async fn close(&self) {
        // bollard tears the connection down on drop
        debug!("Releasing Docker client");
    }
}
