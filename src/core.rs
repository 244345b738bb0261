//! The container-lifecycle controller
//!
//! One coarse mutex guards the whole active set; every public entry point
//! takes it. Reconciliation holds it for the duration of a tick, including
//! the runtime calls the tick makes - ticks are the serializer for idleness
//! decisions. The detached start task is the exception: it performs its
//! runtime I/O and settle delays without the mutex and reacquires it only
//! to clear the pin.

use crate::discovery::{Discovery, ResolveError};
use crate::host::{short, ContainerSummary, Host, HostError};
use crate::labels::{ContainerSettings, LabelSchema};
use crate::state::{ContainerState, StartAck, StateDefaults};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Deadline for one reconciliation tick; a tick that overruns is abandoned
/// and the next tick retries
const TICK_DEADLINE: Duration = Duration::from_secs(30);

/// Tunables fixed at construction time
#[derive(Debug, Clone)]
pub struct CoreSettings {
    /// Label prefix marking eligible containers
    pub label_prefix: String,
    /// Rate at which the poll driver reconciles
    pub poll_interval: Duration,
    /// Idle window before stopping, for containers whose labels do not say
    pub default_stop_delay: Duration,
    /// Readiness status hint, for containers whose labels do not say
    pub wait_for_code: u16,
    /// Readiness path hint, for containers whose labels do not say
    pub wait_for_path: String,
}

/// The controller: state store, start-on-demand path, reconciliation
pub struct Core<H: Host> {
    host: Arc<H>,
    discovery: Discovery<H>,
    defaults: StateDefaults,

    /// cid -> state; the one mutex serializing every controller mutation
    active: Mutex<HashMap<String, ContainerState>>,
    term: watch::Sender<bool>,
}

impl<H: Host> Core<H> {
    /// Build the controller and launch its poll driver.
    ///
    /// The driver runs one reconcile pass immediately and then ticks at
    /// the configured rate; construction itself never blocks on the
    /// runtime.
    pub fn new(host: Arc<H>, settings: CoreSettings) -> Arc<Self> {
        let schema = LabelSchema::new(settings.label_prefix.clone());
        let (term, term_rx) = watch::channel(false);

        let core = Arc::new(Self {
            discovery: Discovery::new(Arc::clone(&host), schema),
            host,
            defaults: StateDefaults {
                stop_delay: settings.default_stop_delay,
                wait_for_code: settings.wait_for_code,
                wait_for_path: settings.wait_for_path,
            },
            active: Mutex::new(HashMap::new()),
            term,
        });

        let driver = Arc::clone(&core);
        tokio::spawn(async move {
            driver.poll_driver(settings.poll_interval, term_rx).await;
        });

        core
    }

    /// Resolve a hostname and make sure its container is coming up.
    ///
    /// Idempotent while the container is managed: a second call returns
    /// the existing readiness hints without side effects. Otherwise the
    /// entry is inserted pinned and a detached task brings up the
    /// container's providers and then the container itself.
    pub async fn start_host(self: &Arc<Self>, hostname: &str) -> Result<StartAck, ResolveError> {
        let mut active = self.active.lock().await;

        let ct = match self.discovery.resolve(hostname).await {
            Ok(ct) => ct,
            Err(e) => {
                warn!(hostname, error = %e, "unable to find container for host");
                return Err(e);
            }
        };

        if let Some(existing) = active.get(&ct.cid) {
            debug!(name = %existing.name(), "asked to start host, but it is already managed");
            return Ok(existing.ack());
        }

        let settings = ContainerSettings::from_labels(self.discovery.schema(), &ct.labels);
        let mut entry = ContainerState::new(&ct, &settings, &self.defaults);
        entry.pinned = true;
        let ack = entry.ack();
        active.insert(ct.cid.clone(), entry);
        drop(active);

        let task = Arc::clone(self);
        tokio::spawn(async move {
            task.run_start_task(ct, settings.needs).await;
        });

        Ok(ack)
    }

    /// The detached start path. Runs without the state mutex; every
    /// runtime call and settle sleep here happens outside the lock.
    async fn run_start_task(self: Arc<Self>, target: ContainerSummary, needs: Vec<String>) {
        for need in &needs {
            match self.discovery.providers(need).await {
                Ok(providers) => {
                    for provider in providers {
                        if provider.running {
                            debug!(provider = %provider.name, %need, "provider already running");
                            continue;
                        }
                        match self.host.start(&provider.cid).await {
                            Ok(()) => info!(provider = %provider.log_name(), %need, "started provider"),
                            Err(e) => {
                                warn!(provider = %provider.log_name(), %need, error = %e, "error starting provider")
                            }
                        }
                        let delay = ContainerSettings::from_labels(
                            self.discovery.schema(),
                            &provider.labels,
                        )
                        .provides_delay;
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => warn!(%need, error = %e, "unable to enumerate providers"),
            }
        }

        if target.running {
            debug!(name = %target.log_name(), "container already running, not starting");
        } else {
            match self.host.start(&target.cid).await {
                Ok(()) => info!(name = %target.log_name(), "started container"),
                Err(e) => warn!(name = %target.log_name(), error = %e, "error starting container"),
            }
        }

        // Unpin and grant a fresh idle window, whatever happened above.
        let mut active = self.active.lock().await;
        if let Some(entry) = active.get_mut(&target.cid) {
            entry.pinned = false;
            entry.last_activity = Instant::now();
        }
    }

    /// One thread-safe reconcile pass: adopt and evict against the
    /// runtime's view, then stop whatever has gone idle. Invoked by the
    /// poll driver; public so callers can force a pass.
    pub async fn poll(&self) {
        let mut active = self.active.lock().await;

        let tick = async {
            self.sweep_new_containers(&mut active).await;
            self.sweep_idle(&mut active).await;
        };

        if tokio::time::timeout(TICK_DEADLINE, tick).await.is_err() {
            warn!("reconcile tick exceeded deadline, abandoning until next tick");
        }
    }

    /// Diff the store against the running labeled containers: entries
    /// whose container no longer runs are evicted (with dependency
    /// cascade), running containers we do not know yet are adopted.
    async fn sweep_new_containers(&self, active: &mut HashMap<String, ContainerState>) {
        let listed = match self.discovery.qualifying(false).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = %e, "error checking for new containers");
                return;
            }
        };

        let running: HashMap<&str, &ContainerSummary> = listed
            .iter()
            .filter(|ct| ct.running)
            .map(|ct| (ct.cid.as_str(), ct))
            .collect();

        let gone: Vec<String> = active
            .iter()
            .filter(|(cid, entry)| !entry.pinned && !running.contains_key(cid.as_str()))
            .map(|(cid, _)| cid.clone())
            .collect();

        for cid in gone {
            if let Some(entry) = active.remove(&cid) {
                info!(name = %entry.name(), "container had stopped, removing");
                self.cascade_shutdown(&entry, active).await;
            }
        }

        for (cid, ct) in running {
            if !active.contains_key(cid) {
                info!(name = %ct.log_name(), "discovered running container");
                let settings = ContainerSettings::from_labels(self.discovery.schema(), &ct.labels);
                active.insert(cid.to_string(), ContainerState::new(ct, &settings, &self.defaults));
            }
        }
    }

    /// Sample stats for every non-pinned entry and stop the quiet ones
    async fn sweep_idle(&self, active: &mut HashMap<String, ContainerState>) {
        let mut marked: Vec<String> = Vec::new();

        for (cid, entry) in active.iter_mut() {
            if entry.pinned {
                continue;
            }
            match self.check_inactive(cid, entry).await {
                Ok(true) => marked.push(cid.clone()),
                Ok(false) => {}
                Err(e) => warn!(name = %entry.name(), error = %e, "error checking container state"),
            }
        }

        for cid in marked {
            match self.host.stop(&cid).await {
                Ok(()) => {
                    if let Some(entry) = active.remove(&cid) {
                        info!(name = %entry.name(), "stopped container");
                        self.cascade_shutdown(&entry, active).await;
                    }
                }
                Err(e) => {
                    if let Some(entry) = active.get(&cid) {
                        warn!(name = %entry.name(), error = %e, "error stopping container, will retry");
                    }
                }
            }
        }
    }

    /// Decide whether one entry should be stopped this tick, advancing its
    /// telemetry as a side effect.
    async fn check_inactive(&self, cid: &str, entry: &mut ContainerState) -> Result<bool, HostError> {
        let stats = self.host.stats_once(cid).await?;

        if stats.pids_current == 0 {
            // Not executing; the next sweep would drop it anyway
            debug!(name = %entry.name(), "container has no processes, treating as stopped");
            return Ok(true);
        }

        let (recv, send) = stats.network_totals();
        if recv > entry.last_recv || send > entry.last_send {
            entry.last_recv = recv;
            entry.last_send = send;
            entry.last_activity = Instant::now();
            return Ok(false);
        }

        if recv < entry.last_recv || send < entry.last_send {
            // Counters went backwards: the container restarted behind our
            // back. Re-base the watermarks and grant a fresh idle window.
            debug!(name = %entry.name(), "network counters regressed, refreshing state entry");
            entry.last_recv = recv;
            entry.last_send = send;
            entry.last_activity = Instant::now();
            return Ok(false);
        }

        if entry.idle_for() > entry.stop_delay {
            info!(name = %entry.name(), idle_secs = entry.idle_for().as_secs(), "found idle container");
            return Ok(true);
        }

        Ok(false)
    }

    /// After an entry leaves the store, stop each of its providers that no
    /// remaining entry still needs. One level only: providers' own needs
    /// are not followed.
    async fn cascade_shutdown(&self, removed: &ContainerState, active: &HashMap<String, ContainerState>) {
        for need in removed.needs() {
            let still_consumed = active
                .values()
                .any(|entry| entry.needs().iter().any(|n| n == need));
            if still_consumed {
                continue;
            }

            let providers = match self.discovery.providers(need).await {
                Ok(providers) => providers,
                Err(e) => {
                    warn!(%need, error = %e, "unable to enumerate providers for shutdown");
                    continue;
                }
            };

            for provider in providers.iter().filter(|p| p.running) {
                match self.host.stop(&provider.cid).await {
                    Ok(()) => info!(provider = %provider.log_name(), %need, "stopped unneeded provider"),
                    Err(e) => {
                        warn!(provider = %provider.log_name(), %need, error = %e, "error stopping provider")
                    }
                }
            }
        }
    }

    /// Snapshot of the active set, sorted by container name
    pub async fn active_containers(&self) -> Vec<ContainerState> {
        let active = self.active.lock().await;
        let mut entries: Vec<ContainerState> = active.values().cloned().collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    /// Every container carrying the prefix label, stopped included
    pub async fn qualifying_containers(&self) -> Result<Vec<ContainerSummary>, HostError> {
        self.discovery.qualifying(true).await
    }

    /// Every container declaring a `provides` subkey
    pub async fn provider_containers(&self) -> Result<Vec<ContainerSummary>, HostError> {
        self.discovery.providers("").await
    }

    /// Stop every managed container and clear the store. Errors are
    /// logged; a second call with an empty store is a no-op.
    pub async fn stop_all(&self) {
        let mut active = self.active.lock().await;
        if active.is_empty() {
            return;
        }

        info!("stopping all managed containers");
        let entries: Vec<(String, String)> = active
            .iter()
            .map(|(cid, entry)| (cid.clone(), entry.name().to_string()))
            .collect();
        active.clear();

        for (cid, name) in entries {
            match self.host.stop(&cid).await {
                Ok(()) => info!(name = %name, "stopped container"),
                Err(e) => warn!(name = %name, cid = short(&cid), error = %e, "error stopping container"),
            }
        }
    }

    /// Signal the poll driver to exit and release the runtime client.
    /// Detached start tasks already in flight run to completion.
    pub async fn close(&self) {
        let _ = self.term.send(true);
        self.host.close().await;
    }

    async fn poll_driver(self: Arc<Self>, rate: Duration, mut term_rx: watch::Receiver<bool>) {
        debug!(rate_secs = rate.as_secs(), "poll driver running");
        let mut ticker = tokio::time::interval(rate);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll().await;
                }
                _ = term_rx.changed() => {
                    if *term_rx.borrow() {
                        debug!("poll driver terminating");
                        return;
                    }
                }
            }
        }
    }
}
