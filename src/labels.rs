//! The declarative schema encoded in container labels
//!
//! Containers opt in to management by carrying labels under a configurable
//! prefix, e.g. with the default prefix `lazyload`:
//!
//! ```text
//! lazyload.hosts          comma-separated hostnames routed to the container
//! lazyload.needs          comma-separated provider names it depends on
//! lazyload.provides       provider name this container offers
//! lazyload.provides.delay settle delay after starting this provider (default 2s)
//! lazyload.stopdelay      idle window before the container is stopped
//! lazyload.waitforcode    readiness HTTP status hint for the requester
//! lazyload.waitforpath    readiness probe path hint for the requester
//! ```
//!
//! Durations use the humantime grammar (`2s`, `90s`, `5m`). Any label under
//! the prefix makes a container eligible.

use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Settle delay after starting a provider, when its label does not say
pub const DEFAULT_PROVIDES_DELAY: Duration = Duration::from_secs(2);

/// Knows how to address subkeys under the configured label prefix
#[derive(Debug, Clone)]
pub struct LabelSchema {
    prefix: String,
}

impl LabelSchema {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// The bare prefix, which doubles as the runtime-side label filter
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full label key for a subkey, e.g. `hosts` -> `lazyload.hosts`
    pub fn sub_label(&self, subkey: &str) -> String {
        format!("{}.{}", self.prefix, subkey)
    }

    /// Label filter matching providers; with an empty name, matches any
    /// container that has a `provides` subkey at all
    pub fn provider_filter(&self, name: &str) -> String {
        if name.is_empty() {
            self.sub_label("provides")
        } else {
            format!("{}={}", self.sub_label("provides"), name)
        }
    }

    /// A container qualifies if it carries the prefix label itself or any
    /// subkey under it
    pub fn is_eligible(&self, labels: &HashMap<String, String>) -> bool {
        let dotted = format!("{}.", self.prefix);
        labels
            .keys()
            .any(|k| k == &self.prefix || k.starts_with(&dotted))
    }

    /// Read a subkey, substituting `default` when absent. The second value
    /// reports whether the subkey was present.
    pub fn label_or_default<'a>(
        &self,
        labels: &'a HashMap<String, String>,
        subkey: &str,
        default: &'a str,
    ) -> (&'a str, bool) {
        match labels.get(&self.sub_label(subkey)) {
            Some(v) => (v.as_str(), true),
            None => (default, false),
        }
    }
}

/// Per-container settings parsed out of the label map
#[derive(Debug, Clone, Default)]
pub struct ContainerSettings {
    /// Hostnames explicitly routed to this container; `None` means the
    /// hostname is inferred from the proxy's router rules
    pub hosts: Option<Vec<String>>,
    /// Provider names this container requires, in label order
    pub needs: Vec<String>,
    /// Provider name this container offers, if any
    pub provides: Option<String>,
    /// Settle delay after starting this container as a provider
    pub provides_delay: Duration,
    /// Idle window before stopping; `None` falls back to the controller default
    pub stop_delay: Option<Duration>,
    /// Readiness status-code hint forwarded to the requester
    pub wait_for_code: Option<u16>,
    /// Readiness probe-path hint forwarded to the requester
    pub wait_for_path: Option<String>,
}

impl ContainerSettings {
    pub fn from_labels(schema: &LabelSchema, labels: &HashMap<String, String>) -> Self {
        let hosts = labels
            .get(&schema.sub_label("hosts"))
            .map(|v| split_csv(v));

        let needs = labels
            .get(&schema.sub_label("needs"))
            .map(|v| split_csv(v))
            .unwrap_or_default();

        let provides = labels.get(&schema.sub_label("provides")).cloned();

        let provides_delay = labels
            .get(&schema.sub_label("provides.delay"))
            .and_then(|v| parse_duration_label(&schema.sub_label("provides.delay"), v))
            .unwrap_or(DEFAULT_PROVIDES_DELAY);

        let stop_delay = labels
            .get(&schema.sub_label("stopdelay"))
            .and_then(|v| parse_duration_label(&schema.sub_label("stopdelay"), v));

        let wait_for_code = labels.get(&schema.sub_label("waitforcode")).and_then(|v| {
            match v.trim().parse::<u16>() {
                Ok(code) => Some(code),
                Err(_) => {
                    warn!(value = %v, "invalid waitforcode label, ignoring");
                    None
                }
            }
        });

        let wait_for_path = labels.get(&schema.sub_label("waitforpath")).cloned();

        Self {
            hosts,
            needs,
            provides,
            provides_delay,
            stop_delay,
            wait_for_code,
            wait_for_path,
        }
    }
}

/// Split a comma-separated label value, dropping empty tokens
fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a humantime duration label, warning and falling back on invalid
/// values
fn parse_duration_label(key: &str, value: &str) -> Option<Duration> {
    match humantime::parse_duration(value.trim()) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(key, value, error = %e, "invalid duration label, using default");
            None
        }
    }
}
