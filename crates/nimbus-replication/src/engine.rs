//! Replication engine — fans writes out to multiple regions and serves
//! reads from the lowest-latency region holding the data.
//!
//! The engine owns the region registry and the replicated-data index
//! behind a single `RwLock`. Write outcomes and latency jitter are drawn
//! under the lock, then the simulated per-region writes run concurrently
//! with the lock released, so one `replicate` call never blocks readers
//! for longer than the bookkeeping itself. Outage recovery is a spawned
//! one-shot task keyed by region name that re-checks the region's state
//! at fire time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use nimbus_core::{
    Region, RegionEventKind, RegionName, RegionStatus, ReplicatedItem, ReplicationConfig,
    ReplicationLogEntry, RingLog,
};

use crate::error::{ReplicationError, ReplicationResult};

/// Outcome of a fan-out write.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReplicateOutcome {
    /// True iff at least one regional write landed.
    pub success: bool,
    /// Regions whose write succeeded, in target-selection order.
    pub replicated_to: Vec<RegionName>,
}

/// Outcome of a successful nearest-region read.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReadOutcome {
    pub data: serde_json::Value,
    pub read_from: RegionName,
    /// Measured latency: the region's base latency plus jitter.
    pub latency_ms: u64,
}

/// Running per-region write counters.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ReplicationStats {
    pub total_writes: u64,
    pub successful_writes: u64,
    pub failed_writes: u64,
}

/// Read-only snapshot of the replication engine.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationStatus {
    pub active_regions: usize,
    pub total_regions: usize,
    pub replication_factor: usize,
    pub regions: Vec<Region>,
    pub stats: ReplicationStats,
    /// The most recent log entries, oldest first.
    pub recent_logs: Vec<ReplicationLogEntry>,
}

/// One entry of the key→regions index.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReplicatedKey {
    pub key: String,
    pub created_at: u64,
    pub regions: Vec<RegionName>,
}

/// A write's pre-drawn fate: which region, how long the simulated write
/// takes, and whether it fails.
struct WriteDraw {
    region: RegionName,
    base_latency_ms: u64,
    jitter_ms: u64,
    fails: bool,
}

struct ReplState {
    regions: Vec<Region>,
    items: HashMap<String, ReplicatedItem>,
    stats: ReplicationStats,
    log: RingLog<ReplicationLogEntry>,
    rng: StdRng,
    /// Per-region write-failure probability overrides, for fault
    /// injection.
    write_fail_overrides: HashMap<RegionName, f64>,
    /// Pending outage-recovery tasks keyed by region name.
    recoveries: HashMap<RegionName, JoinHandle<()>>,
}

/// The replication engine.
pub struct ReplicationEngine {
    config: ReplicationConfig,
    state: Arc<RwLock<ReplState>>,
}

impl ReplicationEngine {
    pub fn new(config: ReplicationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            state: Arc::new(RwLock::new(ReplState {
                regions: config.regions.clone(),
                items: HashMap::new(),
                stats: ReplicationStats::default(),
                log: RingLog::new(config.log_capacity),
                rng,
                write_fail_overrides: HashMap::new(),
                recoveries: HashMap::new(),
            })),
            config,
        }
    }

    /// Replicate `data` under `key` to up to `replication_factor`
    /// distinct active regions, chosen uniformly at random.
    ///
    /// All regional writes are simulated concurrently and settle
    /// independently. The stored item records only the regions whose
    /// write succeeded; a write that lands nowhere leaves the key
    /// unreadable until a later write supersedes it.
    pub async fn replicate(&self, key: &str, data: serde_json::Value) -> ReplicateOutcome {
        let draws = self.draw_writes(key).await;

        let writes = draws.iter().map(|draw| {
            let key = key.to_string();
            let region = draw.region.clone();
            let base = draw.base_latency_ms;
            let jitter = draw.jitter_ms;
            let fails = draw.fails;
            async move {
                tokio::time::sleep(Duration::from_millis(base)).await;
                if fails {
                    warn!(%key, %region, "simulated regional write failed");
                    return Err(ReplicationError::WriteFailed { key, region });
                }
                debug!(%key, %region, latency_ms = base + jitter, "regional write landed");
                Ok(region)
            }
        });
        let results = join_all(writes).await;

        let targets: Vec<RegionName> = draws.iter().map(|d| d.region.clone()).collect();
        let succeeded: Vec<RegionName> = results.into_iter().filter_map(Result::ok).collect();
        let failed = targets.len() - succeeded.len();

        let mut guard = self.state.write().await;
        let st = &mut *guard;
        st.stats.total_writes += targets.len() as u64;
        st.stats.successful_writes += succeeded.len() as u64;
        st.stats.failed_writes += failed as u64;
        st.items.insert(
            key.to_string(),
            ReplicatedItem {
                key: key.to_string(),
                data,
                regions: succeeded.clone(),
                created_at: epoch_secs(),
            },
        );
        st.log.push(ReplicationLogEntry::Write {
            key: key.to_string(),
            targets,
            successful: succeeded.len() as u32,
            failed: failed as u32,
            timestamp: epoch_secs(),
        });

        ReplicateOutcome {
            success: !succeeded.is_empty(),
            replicated_to: succeeded,
        }
    }

    /// Select target regions and pre-draw each write's outcome under the
    /// lock, so concurrent `replicate` calls consume the engine's
    /// randomness in a deterministic order.
    async fn draw_writes(&self, key: &str) -> Vec<WriteDraw> {
        let mut guard = self.state.write().await;
        let st = &mut *guard;

        let active: Vec<usize> = st
            .regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_active())
            .map(|(i, _)| i)
            .collect();

        let chosen: Vec<usize> = if active.len() <= self.config.replication_factor {
            active
        } else {
            rand::seq::index::sample(&mut st.rng, active.len(), self.config.replication_factor)
                .into_iter()
                .map(|pos| active[pos])
                .collect()
        };

        if chosen.is_empty() {
            warn!(%key, "no active region available for replication");
        }

        chosen
            .into_iter()
            .map(|idx| {
                let name = st.regions[idx].name.clone();
                let fail_probability = st
                    .write_fail_overrides
                    .get(&name)
                    .copied()
                    .unwrap_or(self.config.write_fail_probability);
                WriteDraw {
                    base_latency_ms: st.regions[idx].latency_ms,
                    jitter_ms: draw_jitter(&mut st.rng, self.config.write_jitter_ms),
                    fails: st.rng.gen_bool(fail_probability),
                    region: name,
                }
            })
            .collect()
    }

    /// Read `key` from the lowest-latency active region holding it.
    pub async fn read(&self, key: &str) -> ReplicationResult<ReadOutcome> {
        let (region, base_latency_ms, jitter_ms, fails, data) = {
            let mut guard = self.state.write().await;
            let st = &mut *guard;

            let Some(item) = st.items.get(key) else {
                return Err(ReplicationError::DataNotFound(key.to_string()));
            };

            let holders: Vec<&Region> = st
                .regions
                .iter()
                .filter(|r| r.is_active() && item.regions.contains(&r.name))
                .collect();
            if holders.is_empty() {
                return Err(ReplicationError::NoAvailableRegion(key.to_string()));
            }

            // Ties go to the first holder in registry order.
            let mut best = 0;
            for (idx, holder) in holders.iter().enumerate().skip(1) {
                if holder.latency_ms < holders[best].latency_ms {
                    best = idx;
                }
            }
            let nearest = holders[best];

            (
                nearest.name.clone(),
                nearest.latency_ms,
                draw_jitter(&mut st.rng, self.config.read_jitter_ms),
                st.rng.gen_bool(self.config.read_fail_probability),
                item.data.clone(),
            )
        };

        tokio::time::sleep(Duration::from_millis(base_latency_ms)).await;

        if fails {
            warn!(%key, %region, "simulated regional read failed");
            return Err(ReplicationError::ReadFailed {
                key: key.to_string(),
                region,
            });
        }

        let latency_ms = base_latency_ms + jitter_ms;
        debug!(%key, %region, latency_ms, "read served");
        Ok(ReadOutcome {
            data,
            read_from: region,
            latency_ms,
        })
    }

    /// Override the write-failure probability for one region.
    pub async fn inject_write_failure(
        &self,
        region: &str,
        probability: f64,
    ) -> ReplicationResult<()> {
        let mut st = self.state.write().await;
        if !st.regions.iter().any(|r| r.name == region) {
            return Err(ReplicationError::UnknownRegion(region.to_string()));
        }
        st.write_fail_overrides.insert(region.to_string(), probability);
        info!(%region, probability, "write-failure override injected");
        Ok(())
    }

    /// Remove a region's write-failure override, restoring the
    /// configured default.
    pub async fn clear_write_failure(&self, region: &str) -> ReplicationResult<()> {
        let mut st = self.state.write().await;
        if !st.regions.iter().any(|r| r.name == region) {
            return Err(ReplicationError::UnknownRegion(region.to_string()));
        }
        st.write_fail_overrides.remove(region);
        info!(%region, "write-failure override cleared");
        Ok(())
    }

    /// Take a region down immediately, with automatic recovery after the
    /// configured delay.
    ///
    /// A down region stops receiving replication targets and reads, but
    /// existing item membership is kept, so the region becomes readable
    /// again as soon as it recovers.
    pub async fn simulate_region_outage(&self, name: &str) -> ReplicationResult<()> {
        let mut guard = self.state.write().await;
        let st = &mut *guard;
        let Some(region) = st.regions.iter_mut().find(|r| r.name == name) else {
            return Err(ReplicationError::UnknownRegion(name.to_string()));
        };
        region.status = RegionStatus::Down;
        warn!(region = %name, "region outage injected");
        st.log.push(ReplicationLogEntry::RegionEvent {
            event: RegionEventKind::Outage,
            region: name.to_string(),
            timestamp: epoch_secs(),
        });
        schedule_region_recovery(
            &self.state,
            &mut st.recoveries,
            name.to_string(),
            self.config.outage_recovery_delay,
        );
        Ok(())
    }

    /// Snapshot the registry, counters, and recent log.
    pub async fn status(&self) -> ReplicationStatus {
        let st = self.state.read().await;
        ReplicationStatus {
            active_regions: st.regions.iter().filter(|r| r.is_active()).count(),
            total_regions: st.regions.len(),
            replication_factor: self.config.replication_factor,
            regions: st.regions.clone(),
            stats: st.stats,
            recent_logs: st.log.recent(10),
        }
    }

    /// The full key→regions index, sorted by key.
    pub async fn replicated_data(&self) -> Vec<ReplicatedKey> {
        let st = self.state.read().await;
        let mut index: Vec<ReplicatedKey> = st
            .items
            .values()
            .map(|item| ReplicatedKey {
                key: item.key.clone(),
                created_at: item.created_at,
                regions: item.regions.clone(),
            })
            .collect();
        index.sort_by(|a, b| a.key.cmp(&b.key));
        index
    }

    /// Abort pending outage-recovery timers.
    pub async fn shutdown(&self) {
        let mut st = self.state.write().await;
        for (_, handle) in st.recoveries.drain() {
            handle.abort();
        }
        info!("replication engine shut down");
    }
}

/// Schedule an outage recovery for `name`, replacing (and aborting) any
/// recovery already pending for it.
fn schedule_region_recovery(
    state: &Arc<RwLock<ReplState>>,
    recoveries: &mut HashMap<RegionName, JoinHandle<()>>,
    name: RegionName,
    delay: Duration,
) {
    let task_state = Arc::clone(state);
    let task_name = name.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut guard = task_state.write().await;
        let st = &mut *guard;
        st.recoveries.remove(&task_name);
        // Fire-time guard: a removed or manually-restored region is left alone.
        if let Some(region) = st.regions.iter_mut().find(|r| r.name == task_name)
            && region.status == RegionStatus::Down
        {
            region.status = RegionStatus::Active;
            info!(region = %task_name, "region recovered");
            st.log.push(ReplicationLogEntry::RegionEvent {
                event: RegionEventKind::Recovery,
                region: task_name.clone(),
                timestamp: epoch_secs(),
            });
        }
    });
    if let Some(old) = recoveries.insert(name, handle) {
        old.abort();
    }
}

fn draw_jitter(rng: &mut StdRng, bound_ms: u64) -> u64 {
    if bound_ms == 0 {
        return 0;
    }
    rng.gen_range(0..bound_ms)
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
