//! Request dispatcher — routes work across a dynamic pool of simulated
//! servers.
//!
//! The `Dispatcher` owns the server registry behind a single `RwLock`;
//! request handling and the three background loops (health checks, load
//! decay, pool scaling) all serialize through it. Auto-recovery of a
//! failed server is a spawned one-shot task keyed by server id: it is
//! aborted if the server is removed, and it re-checks the server's state
//! at fire time so a stale timer can never resurrect anything.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use nimbus_core::{
    DispatcherConfig, RequestRecord, RingLog, Server, ServerId, ServerStatus,
};

use crate::balancer::{self, Algorithm};
use crate::error::{DispatchError, DispatchResult};

/// Outcome of a successfully dispatched request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Dispatch {
    pub server_id: ServerId,
    /// The server's load after accepting the request.
    pub server_load: u32,
}

/// Read-only snapshot of the dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatus {
    pub servers: Vec<Server>,
    pub algorithm: Algorithm,
    pub total_requests: u64,
    /// Requests per current server, derived from the bounded history.
    pub distribution: HashMap<ServerId, usize>,
    pub autoscaling_enabled: bool,
    /// The most recent history entries, oldest first.
    pub recent_requests: Vec<RequestRecord>,
}

struct DispatchState {
    servers: Vec<Server>,
    algorithm: Algorithm,
    rr_cursor: usize,
    total_requests: u64,
    history: RingLog<RequestRecord>,
    autoscaling_enabled: bool,
    /// Next suffix for a scaled-up server id. Monotonic, so a removed
    /// id is never reissued to a new server.
    next_server_index: u32,
    rng: StdRng,
    /// Pending auto-recovery tasks keyed by server id.
    recoveries: HashMap<ServerId, JoinHandle<()>>,
}

/// The request dispatcher.
pub struct Dispatcher {
    config: DispatcherConfig,
    state: Arc<RwLock<DispatchState>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a dispatcher with `initial_servers` healthy servers.
    ///
    /// Background loops do not run until [`Dispatcher::start`] is called.
    pub fn new(config: DispatcherConfig) -> Self {
        let servers = (1..=config.initial_servers)
            .map(|i| Server::new(format!("server-{i}"), config.max_load))
            .collect();

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            state: Arc::new(RwLock::new(DispatchState {
                servers,
                algorithm: Algorithm::RoundRobin,
                rr_cursor: 0,
                total_requests: 0,
                history: RingLog::new(config.history_capacity),
                autoscaling_enabled: config.autoscaling_enabled,
                next_server_index: config.initial_servers + 1,
                rng,
                recoveries: HashMap::new(),
            })),
            config,
            shutdown_tx,
            shutdown_rx,
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Dispatch a request to a healthy server using the active algorithm.
    ///
    /// The selected server's load grows by `load` (default
    /// `default_request_load`), clamped to its ceiling.
    pub async fn handle_request(
        &self,
        request_id: &str,
        load: Option<u32>,
    ) -> DispatchResult<Dispatch> {
        let load = load.unwrap_or(self.config.default_request_load);
        let mut guard = self.state.write().await;
        let st = &mut *guard;

        let healthy: Vec<usize> = st
            .servers
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_healthy())
            .map(|(i, _)| i)
            .collect();

        if healthy.is_empty() {
            warn!(%request_id, "no healthy servers available");
            return Err(DispatchError::NoAvailableServer);
        }

        let pos = match st.algorithm {
            Algorithm::RoundRobin => balancer::pick_round_robin(healthy.len(), &mut st.rr_cursor),
            Algorithm::LeastConnections => balancer::pick_least_connections(&st.servers, &healthy),
            Algorithm::Weighted => balancer::pick_weighted(&st.servers, &healthy, &mut st.rng),
        };
        let server = &mut st.servers[healthy[pos]];
        server.load = server.load.saturating_add(load).min(server.max_load);

        let outcome = Dispatch {
            server_id: server.id.clone(),
            server_load: server.load,
        };
        st.history.push(RequestRecord {
            timestamp: epoch_secs(),
            request_id: request_id.to_string(),
            server_id: outcome.server_id.clone(),
            load,
        });
        st.total_requests += 1;

        debug!(
            %request_id,
            server_id = %outcome.server_id,
            server_load = outcome.server_load,
            "request dispatched"
        );
        Ok(outcome)
    }

    /// Switch the balancing algorithm. Unknown names are rejected
    /// without mutating anything.
    pub async fn set_algorithm(&self, name: &str) -> DispatchResult<()> {
        let algorithm: Algorithm = name.parse()?;
        let mut st = self.state.write().await;
        st.algorithm = algorithm;
        info!(algorithm = algorithm.as_str(), "balancing algorithm changed");
        Ok(())
    }

    /// Enable or disable the scaling loop's actions. Returns the new flag.
    pub async fn toggle_auto_scaling(&self, enabled: bool) -> bool {
        let mut st = self.state.write().await;
        st.autoscaling_enabled = enabled;
        info!(enabled, "autoscaling toggled");
        st.autoscaling_enabled
    }

    /// Force a server unhealthy with a fixed-delay auto-recovery.
    pub async fn simulate_server_failure(&self, server_id: &str) -> DispatchResult<()> {
        let mut guard = self.state.write().await;
        let st = &mut *guard;
        let Some(server) = st.servers.iter_mut().find(|s| s.id == server_id) else {
            return Err(DispatchError::UnknownServer(server_id.to_string()));
        };
        server.status = ServerStatus::Unhealthy;
        warn!(%server_id, "server failure injected");
        schedule_recovery(
            &self.state,
            &mut st.recoveries,
            server_id.to_string(),
            self.config.forced_failure_recovery,
        );
        Ok(())
    }

    /// Snapshot the registry, counters, and recent history.
    pub async fn status(&self) -> DispatcherStatus {
        let st = self.state.read().await;
        let distribution = st
            .servers
            .iter()
            .map(|server| {
                let count = st.history.iter().filter(|r| r.server_id == server.id).count();
                (server.id.clone(), count)
            })
            .collect();

        DispatcherStatus {
            servers: st.servers.clone(),
            algorithm: st.algorithm,
            total_requests: st.total_requests,
            distribution,
            autoscaling_enabled: st.autoscaling_enabled,
            recent_requests: st.history.recent(10),
        }
    }

    /// Start the health-check, load-decay, and scaling loops. Idempotent.
    pub async fn start(&self) {
        let mut loops = self.loops.lock().await;
        if !loops.is_empty() {
            return;
        }

        loops.push(tokio::spawn(run_health_loop(
            Arc::clone(&self.state),
            self.config.clone(),
            self.shutdown_rx.clone(),
        )));
        loops.push(tokio::spawn(run_decay_loop(
            Arc::clone(&self.state),
            self.config.clone(),
            self.shutdown_rx.clone(),
        )));
        loops.push(tokio::spawn(run_scaling_loop(
            Arc::clone(&self.state),
            self.config.clone(),
            self.shutdown_rx.clone(),
        )));
        info!("dispatcher background loops started");
    }

    /// Stop the background loops and abort pending recovery timers.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut loops = self.loops.lock().await;
        for handle in loops.drain(..) {
            handle.abort();
        }
        let mut st = self.state.write().await;
        for (_, handle) in st.recoveries.drain() {
            handle.abort();
        }
        info!("dispatcher shut down");
    }
}

/// Schedule an auto-recovery for `server_id`, replacing (and aborting)
/// any recovery already pending for it.
fn schedule_recovery(
    state: &Arc<RwLock<DispatchState>>,
    recoveries: &mut HashMap<ServerId, JoinHandle<()>>,
    server_id: ServerId,
    delay: Duration,
) {
    let task_state = Arc::clone(state);
    let task_id = server_id.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut st = task_state.write().await;
        st.recoveries.remove(&task_id);
        // Fire-time guard: a removed or already-healthy server is left alone.
        if let Some(server) = st.servers.iter_mut().find(|s| s.id == task_id)
            && server.status == ServerStatus::Unhealthy
        {
            server.status = ServerStatus::Healthy;
            info!(server_id = %task_id, "server recovered");
        }
    });
    if let Some(old) = recoveries.insert(server_id, handle) {
        old.abort();
    }
}

async fn run_health_loop(
    state: Arc<RwLock<DispatchState>>,
    config: DispatcherConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.health_check_interval) => {
                health_tick(&state, &config).await;
            }
            _ = shutdown.changed() => {
                debug!("health-check loop shutting down");
                break;
            }
        }
    }
}

async fn run_decay_loop(
    state: Arc<RwLock<DispatchState>>,
    config: DispatcherConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.decay_interval) => {
                decay_tick(&state, &config).await;
            }
            _ = shutdown.changed() => {
                debug!("load-decay loop shutting down");
                break;
            }
        }
    }
}

async fn run_scaling_loop(
    state: Arc<RwLock<DispatchState>>,
    config: DispatcherConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.scaling_interval) => {
                scaling_tick(&state, &config).await;
            }
            _ = shutdown.changed() => {
                debug!("scaling loop shutting down");
                break;
            }
        }
    }
}

/// One health-check pass: each healthy server trips independently with
/// `health_fail_probability`, scheduling a randomized auto-recovery.
async fn health_tick(state: &Arc<RwLock<DispatchState>>, config: &DispatcherConfig) {
    let mut guard = state.write().await;
    let st = &mut *guard;

    let mut tripped = Vec::new();
    for server in st.servers.iter_mut().filter(|s| s.is_healthy()) {
        if st.rng.gen_bool(config.health_fail_probability) {
            server.status = ServerStatus::Unhealthy;
            tripped.push(server.id.clone());
        }
    }

    for server_id in tripped {
        let delay_ms = st.rng.gen_range(
            config.recovery_delay_min.as_millis() as u64
                ..=config.recovery_delay_max.as_millis() as u64,
        );
        warn!(%server_id, recovery_in_ms = delay_ms, "server failed health check");
        schedule_recovery(
            state,
            &mut st.recoveries,
            server_id,
            Duration::from_millis(delay_ms),
        );
    }
}

/// One decay pass: every server sheds a random amount of load, floored
/// at zero.
async fn decay_tick(state: &Arc<RwLock<DispatchState>>, config: &DispatcherConfig) {
    let mut guard = state.write().await;
    let st = &mut *guard;
    for server in st.servers.iter_mut() {
        let shed = st.rng.gen_range(config.decay_min..=config.decay_max);
        server.load = server.load.saturating_sub(shed);
    }
}

/// One scaling pass: grow above the upper threshold, shrink below the
/// lower one, within `[min_servers, max_servers]`.
async fn scaling_tick(state: &Arc<RwLock<DispatchState>>, config: &DispatcherConfig) {
    let mut guard = state.write().await;
    let st = &mut *guard;

    if !st.autoscaling_enabled {
        return;
    }

    let healthy_loads: Vec<u32> = st
        .servers
        .iter()
        .filter(|s| s.is_healthy())
        .map(|s| s.load)
        .collect();
    if healthy_loads.is_empty() {
        return;
    }
    let mean =
        healthy_loads.iter().map(|&l| f64::from(l)).sum::<f64>() / healthy_loads.len() as f64;

    if mean > config.scale_up_threshold && st.servers.len() < config.max_servers {
        let server_id = format!("server-{}", st.next_server_index);
        st.next_server_index += 1;
        st.servers.push(Server::new(server_id.clone(), config.max_load));
        info!(%server_id, mean_load = mean, "scaled up: added server");
    } else if mean < config.scale_down_threshold && st.servers.len() > config.min_servers {
        let mut victim = 0;
        for (idx, server) in st.servers.iter().enumerate().skip(1) {
            if server.load < st.servers[victim].load {
                victim = idx;
            }
        }
        let removed = st.servers.remove(victim);
        if let Some(handle) = st.recoveries.remove(&removed.id) {
            handle.abort();
        }
        info!(server_id = %removed.id, mean_load = mean, "scaled down: removed server");
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
