//! nimbus-replication — multi-region replication engine for the Nimbus
//! simulation.
//!
//! Fans each write out to a randomly chosen subset of active regions,
//! serves reads from the lowest-latency region holding the key, and
//! simulates region outages with automatic recovery.

pub mod engine;
pub mod error;

pub use engine::{
    ReadOutcome, ReplicateOutcome, ReplicatedKey, ReplicationEngine, ReplicationStats,
    ReplicationStatus,
};
pub use error::{ReplicationError, ReplicationResult};
