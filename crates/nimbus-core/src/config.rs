//! Constructor-time configuration for the three subsystems.
//!
//! Every tunable the simulation branches on lives here so drivers and
//! tests can construct subsystems with explicit values. The `Default`
//! impls carry the documented defaults; `seed` pins the subsystem's
//! randomness source for deterministic tests.

use std::time::Duration;

use crate::types::Region;

/// Configuration for the request dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Servers created at construction. Default: 2.
    pub initial_servers: u32,
    /// Load ceiling for every server. Default: 100.
    pub max_load: u32,
    /// Load added by a request that does not specify one. Default: 5.
    pub default_request_load: u32,
    /// Scaling never shrinks the pool below this. Default: 2.
    pub min_servers: usize,
    /// Scaling never grows the pool above this. Default: 5.
    pub max_servers: usize,
    /// Mean healthy load above which the pool grows. Default: 80.0.
    pub scale_up_threshold: f64,
    /// Mean healthy load below which the pool shrinks. Default: 20.0.
    pub scale_down_threshold: f64,
    /// Period of the health-check loop. Default: 10s.
    pub health_check_interval: Duration,
    /// Period of the load-decay loop. Default: 5s.
    pub decay_interval: Duration,
    /// Period of the scaling loop. Default: 15s.
    pub scaling_interval: Duration,
    /// Chance per health check that a healthy server trips. Default: 0.01.
    pub health_fail_probability: f64,
    /// Smallest load shed per decay tick. Default: 5.
    pub decay_min: u32,
    /// Largest load shed per decay tick. Default: 15.
    pub decay_max: u32,
    /// Lower bound of the randomized auto-recovery delay. Default: 20s.
    pub recovery_delay_min: Duration,
    /// Upper bound of the randomized auto-recovery delay. Default: 30s.
    pub recovery_delay_max: Duration,
    /// Fixed recovery delay after a forced failure. Default: 30s.
    pub forced_failure_recovery: Duration,
    /// Request history ring capacity. Default: 100.
    pub history_capacity: usize,
    /// Whether the scaling loop acts. Default: true.
    pub autoscaling_enabled: bool,
    /// Seed for the dispatcher's randomness source. `None` seeds from
    /// entropy.
    pub seed: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            initial_servers: 2,
            max_load: 100,
            default_request_load: 5,
            min_servers: 2,
            max_servers: 5,
            scale_up_threshold: 80.0,
            scale_down_threshold: 20.0,
            health_check_interval: Duration::from_secs(10),
            decay_interval: Duration::from_secs(5),
            scaling_interval: Duration::from_secs(15),
            health_fail_probability: 0.01,
            decay_min: 5,
            decay_max: 15,
            recovery_delay_min: Duration::from_secs(20),
            recovery_delay_max: Duration::from_secs(30),
            forced_failure_recovery: Duration::from_secs(30),
            history_capacity: 100,
            autoscaling_enabled: true,
            seed: None,
        }
    }
}

/// Configuration for the replication engine.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Region registry at construction.
    /// Default: asia-southeast1 (20ms), us-central1 (150ms),
    /// europe-west1 (200ms), all active.
    pub regions: Vec<Region>,
    /// Target number of regions per write. Default: 2.
    pub replication_factor: usize,
    /// Chance a simulated write fails. Default: 0.05.
    pub write_fail_probability: f64,
    /// Chance a simulated read fails. Default: 0.02.
    pub read_fail_probability: f64,
    /// Upper bound (exclusive) of write latency jitter. Default: 50ms.
    pub write_jitter_ms: u64,
    /// Upper bound (exclusive) of read latency jitter. Default: 30ms.
    pub read_jitter_ms: u64,
    /// Fixed delay before a downed region comes back. Default: 30s.
    pub outage_recovery_delay: Duration,
    /// Replication log ring capacity. Default: 100.
    pub log_capacity: usize,
    /// Seed for the engine's randomness source. `None` seeds from
    /// entropy.
    pub seed: Option<u64>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            regions: vec![
                Region::new("asia-southeast1", 20),
                Region::new("us-central1", 150),
                Region::new("europe-west1", 200),
            ],
            replication_factor: 2,
            write_fail_probability: 0.05,
            read_fail_probability: 0.02,
            write_jitter_ms: 50,
            read_jitter_ms: 30,
            outage_recovery_delay: Duration::from_secs(30),
            log_capacity: 100,
            seed: None,
        }
    }
}

/// Configuration for the request-rate autoscaler.
#[derive(Debug, Clone)]
pub struct AutoscalerConfig {
    /// Instance count at construction. Default: 1.
    pub initial_instances: u32,
    /// Floor for scale-down. Default: 1.
    pub min_instances: u32,
    /// Ceiling for scale-up. Default: 10.
    pub max_instances: u32,
    /// Requests per minute above which the scaler grows. Scale-down
    /// triggers below half of this. Default: 10.0.
    pub request_threshold: f64,
    /// Minimum gap between evaluations. Default: 10s.
    pub evaluation_interval: Duration,
    /// Minimum gap between scaling actions. Default: 60s.
    pub cooldown: Duration,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            initial_instances: 1,
            min_instances: 1,
            max_instances: 10,
            request_threshold: 10.0,
            evaluation_interval: Duration::from_secs(10),
            cooldown: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_defaults_match_documented_values() {
        let cfg = DispatcherConfig::default();
        assert_eq!(cfg.initial_servers, 2);
        assert_eq!(cfg.max_load, 100);
        assert_eq!(cfg.min_servers, 2);
        assert_eq!(cfg.max_servers, 5);
        assert_eq!(cfg.scale_up_threshold, 80.0);
        assert_eq!(cfg.scale_down_threshold, 20.0);
        assert_eq!(cfg.health_check_interval, Duration::from_secs(10));
        assert!(cfg.autoscaling_enabled);
        assert!(cfg.seed.is_none());
    }

    #[test]
    fn replication_defaults_match_documented_values() {
        let cfg = ReplicationConfig::default();
        assert_eq!(cfg.regions.len(), 3);
        assert_eq!(cfg.regions[0].name, "asia-southeast1");
        assert_eq!(cfg.regions[0].latency_ms, 20);
        assert_eq!(cfg.replication_factor, 2);
        assert_eq!(cfg.write_fail_probability, 0.05);
        assert_eq!(cfg.read_fail_probability, 0.02);
        assert_eq!(cfg.outage_recovery_delay, Duration::from_secs(30));
    }

    #[test]
    fn autoscaler_defaults_match_documented_values() {
        let cfg = AutoscalerConfig::default();
        assert_eq!(cfg.initial_instances, 1);
        assert_eq!(cfg.min_instances, 1);
        assert_eq!(cfg.max_instances, 10);
        assert_eq!(cfg.request_threshold, 10.0);
        assert_eq!(cfg.cooldown, Duration::from_secs(60));
    }
}
