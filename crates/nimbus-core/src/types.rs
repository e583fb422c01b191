//! Domain types for the Nimbus simulation.
//!
//! These types represent the mutable registries (servers, regions), the
//! replicated-data index, and the observability records kept in bounded
//! rings. All types are JSON-serializable so status snapshots can be
//! handed to whatever facade drives the core.

use serde::{Deserialize, Serialize};

/// Unique identifier for a simulated compute node.
pub type ServerId = String;

/// Name of a simulated geographic region.
pub type RegionName = String;

// ── Servers ────────────────────────────────────────────────────────

/// Liveness state of a simulated server.
///
/// Only healthy servers receive dispatched requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Healthy,
    Unhealthy,
}

/// A simulated compute node in the dispatcher's registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub id: ServerId,
    pub status: ServerStatus,
    /// Current load. Always within `0..=max_load`.
    pub load: u32,
    /// Load ceiling for this server.
    pub max_load: u32,
}

impl Server {
    /// A fresh healthy server with zero load.
    pub fn new(id: impl Into<ServerId>, max_load: u32) -> Self {
        Self {
            id: id.into(),
            status: ServerStatus::Healthy,
            load: 0,
            max_load,
        }
    }

    /// Remaining capacity before the load ceiling.
    pub fn remaining_capacity(&self) -> u32 {
        self.max_load.saturating_sub(self.load)
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ServerStatus::Healthy
    }
}

/// One dispatched request, mirrored into the bounded history ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestRecord {
    /// Unix timestamp (seconds) when the request was dispatched.
    pub timestamp: u64,
    pub request_id: String,
    pub server_id: ServerId,
    /// Load the request added to its server.
    pub load: u32,
}

// ── Regions ────────────────────────────────────────────────────────

/// Liveness state of a simulated region.
///
/// Only active regions participate in replication and reads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegionStatus {
    Active,
    Down,
}

/// A simulated geographic region in the replication engine's registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub name: RegionName,
    pub status: RegionStatus,
    /// Base round-trip latency to this region in milliseconds.
    pub latency_ms: u64,
}

impl Region {
    /// A fresh active region.
    pub fn new(name: impl Into<RegionName>, latency_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: RegionStatus::Active,
            latency_ms,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RegionStatus::Active
    }
}

/// One replicated key and where it landed.
///
/// Superseded wholesale by a later write to the same key; never deleted
/// implicitly (a logical delete is a replicated write carrying a
/// tombstone payload).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplicatedItem {
    pub key: String,
    pub data: serde_json::Value,
    /// Regions whose simulated write succeeded for this version.
    pub regions: Vec<RegionName>,
    /// Unix timestamp (seconds) of the write.
    pub created_at: u64,
}

/// Append-only observability record for the replication engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplicationLogEntry {
    /// A fan-out write settled.
    Write {
        key: String,
        targets: Vec<RegionName>,
        successful: u32,
        failed: u32,
        timestamp: u64,
    },
    /// A region changed liveness state.
    RegionEvent {
        event: RegionEventKind,
        region: RegionName,
        timestamp: u64,
    },
}

/// What happened to a region.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegionEventKind {
    Outage,
    Recovery,
}

// ── Scaling ────────────────────────────────────────────────────────

/// Direction of an autoscaling step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    ScaleUp,
    ScaleDown,
}

/// The most recent autoscaling action taken.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScaleAction {
    pub action: ScaleDirection,
    /// Unix timestamp (seconds) of the action.
    pub timestamp: u64,
    /// Instance count after the action.
    pub new_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_server_is_healthy_at_zero_load() {
        let s = Server::new("server-1", 100);
        assert!(s.is_healthy());
        assert_eq!(s.load, 0);
        assert_eq!(s.remaining_capacity(), 100);
    }

    #[test]
    fn remaining_capacity_saturates() {
        let mut s = Server::new("server-1", 100);
        s.load = 100;
        assert_eq!(s.remaining_capacity(), 0);
        // Load past the ceiling never happens, but the math must not wrap.
        s.load = 150;
        assert_eq!(s.remaining_capacity(), 0);
    }

    #[test]
    fn status_enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ServerStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
        assert_eq!(
            serde_json::to_string(&RegionStatus::Down).unwrap(),
            "\"down\""
        );
        assert_eq!(
            serde_json::to_string(&ScaleDirection::ScaleUp).unwrap(),
            "\"scale_up\""
        );
    }

    #[test]
    fn replication_log_entry_is_tagged() {
        let entry = ReplicationLogEntry::RegionEvent {
            event: RegionEventKind::Outage,
            region: "us-central1".to_string(),
            timestamp: 1000,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "region_event");
        assert_eq!(json["event"], "outage");
        assert_eq!(json["region"], "us-central1");
    }
}
