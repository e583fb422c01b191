//! nimbus-core — shared domain types for the Nimbus control-plane simulation.
//!
//! Holds the registry entry types (servers, regions), the replicated-data
//! index types, bounded history rings, and the constructor-time
//! configuration for each subsystem.
//!
//! State here is purely in-memory; the subsystem crates own the mutation
//! discipline (one lock per registry, background loops serialized through
//! that lock).

pub mod config;
pub mod ring;
pub mod types;

pub use config::{AutoscalerConfig, DispatcherConfig, ReplicationConfig};
pub use ring::RingLog;
pub use types::*;
