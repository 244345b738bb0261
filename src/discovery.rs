//! Finding eligible containers and resolving hostnames to them

use crate::host::{ContainerSummary, Host, HostError};
use crate::labels::{ContainerSettings, LabelSchema};
use crate::rules;
use std::sync::Arc;
use thiserror::Error;

/// Errors from hostname resolution
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No eligible container routes the requested hostname
    #[error("no container found for host: {hostname}")]
    HostNotFound { hostname: String },

    /// The runtime could not be consulted
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Looks containers up through the [`Host`] capability, interpreting the
/// label schema and the proxy's router rules
pub struct Discovery<H> {
    host: Arc<H>,
    schema: LabelSchema,
}

impl<H: Host> Discovery<H> {
    pub fn new(host: Arc<H>, schema: LabelSchema) -> Self {
        Self { host, schema }
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.schema
    }

    /// All containers carrying the prefix label
    pub async fn qualifying(&self, include_stopped: bool) -> Result<Vec<ContainerSummary>, HostError> {
        let mut containers = self.host.list(self.schema.prefix(), include_stopped).await?;
        // The runtime's filter is the primary gate; re-check the labels so
        // a Host that filters more loosely cannot admit unlabeled containers
        containers.retain(|ct| self.schema.is_eligible(&ct.labels));
        Ok(containers)
    }

    /// Containers whose `provides` subkey equals `name`; with an empty
    /// name, every container that has a `provides` subkey at all
    pub async fn providers(&self, name: &str) -> Result<Vec<ContainerSummary>, HostError> {
        let mut containers = self
            .host
            .list(&self.schema.provider_filter(name), true)
            .await?;
        // Same re-check as qualifying(): the labels must actually declare
        // the provider the filter asked for
        containers.retain(|ct| {
            match ContainerSettings::from_labels(&self.schema, &ct.labels).provides {
                Some(provides) => name.is_empty() || provides == name,
                None => false,
            }
        });
        Ok(containers)
    }

    /// Resolve a hostname to a container.
    ///
    /// Stopped containers are included. An explicit `hosts` label wins and
    /// is matched by exact comparison against its comma-split tokens; when
    /// the label is absent the router rules are consulted. The first match
    /// in the runtime's list order is returned; that order carries no
    /// meaning.
    pub async fn resolve(&self, hostname: &str) -> Result<ContainerSummary, ResolveError> {
        let containers = self.qualifying(true).await?;

        for ct in containers {
            let (hosts, explicit) = self.schema.label_or_default(&ct.labels, "hosts", "");
            if explicit {
                if hosts.split(',').any(|h| h.trim() == hostname) {
                    return Ok(ct);
                }
            } else if rules::matches_router_rules(&ct.labels, hostname) {
                return Ok(ct);
            }
        }

        Err(ResolveError::HostNotFound {
            hostname: hostname.to_string(),
        })
    }
}
