//! Server selection algorithms.
//!
//! All three algorithms operate on the indices of the currently healthy
//! servers so the dispatcher can mutate the chosen registry slot in
//! place. The round-robin cursor persists across calls and is taken
//! modulo the current healthy count, so it tolerates the pool growing
//! and shrinking between calls.

use std::str::FromStr;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use nimbus_core::Server;

use crate::error::DispatchError;

/// The active load-balancing algorithm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    RoundRobin,
    LeastConnections,
    Weighted,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round-robin",
            Algorithm::LeastConnections => "least-connections",
            Algorithm::Weighted => "weighted",
        }
    }
}

impl FromStr for Algorithm {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" => Ok(Algorithm::RoundRobin),
            "least-connections" => Ok(Algorithm::LeastConnections),
            "weighted" => Ok(Algorithm::Weighted),
            other => Err(DispatchError::InvalidAlgorithm(other.to_string())),
        }
    }
}

/// Round-robin: cycle over the healthy list, advancing the cursor on
/// every call. Returns an index into `healthy`.
pub(crate) fn pick_round_robin(healthy_count: usize, cursor: &mut usize) -> usize {
    let pos = *cursor % healthy_count;
    *cursor = cursor.wrapping_add(1);
    pos
}

/// Least-connections: the healthy server with minimum current load,
/// ties resolved by registry order. Returns an index into `healthy`.
pub(crate) fn pick_least_connections(servers: &[Server], healthy: &[usize]) -> usize {
    let mut best = 0;
    for (pos, &idx) in healthy.iter().enumerate().skip(1) {
        if servers[idx].load < servers[healthy[best]].load {
            best = pos;
        }
    }
    best
}

/// Weighted: draw proportionally to remaining capacity. If every healthy
/// server is at its ceiling, fall back to the first one. Returns an
/// index into `healthy`.
pub(crate) fn pick_weighted(servers: &[Server], healthy: &[usize], rng: &mut StdRng) -> usize {
    let total_remaining: u64 = healthy
        .iter()
        .map(|&idx| u64::from(servers[idx].remaining_capacity()))
        .sum();

    if total_remaining == 0 {
        return 0;
    }

    let mut draw = rng.gen_range(0..total_remaining);
    for (pos, &idx) in healthy.iter().enumerate() {
        let remaining = u64::from(servers[idx].remaining_capacity());
        if draw < remaining {
            return pos;
        }
        draw -= remaining;
    }
    0
}
