//! Request-rate autoscaler.
//!
//! Models an infrastructure-level scaler reacting to raw request volume,
//! independent of the dispatcher's own load-based pool scaling. Callers
//! feed it one `record_request` per incoming request; it periodically
//! estimates a requests-per-minute rate from the counter and adjusts the
//! instance count by one step at a time, rate-limited by a cooldown.
//!
//! The whole API is synchronous over an interior mutex. Elapsed time is
//! measured with `tokio::time::Instant` so the scaler follows the
//! runtime clock.

use std::sync::Mutex;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use nimbus_core::{AutoscalerConfig, ScaleAction, ScaleDirection};

/// Read-only snapshot of the autoscaler.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScalerStatus {
    pub current_instances: u32,
    pub max_instances: u32,
    pub last_action: Option<ScaleAction>,
    /// Requests per minute, extrapolated from the current counter.
    pub estimated_request_rate: f64,
}

struct ScalerState {
    instance_count: u32,
    request_counter: u64,
    /// Set at construction and after every completed evaluation. Both
    /// the evaluation trigger and the cooldown measure from here.
    last_evaluation: Instant,
    last_action: Option<ScaleAction>,
}

/// The request-rate autoscaler.
pub struct RequestScaler {
    config: AutoscalerConfig,
    state: Mutex<ScalerState>,
}

impl RequestScaler {
    pub fn new(config: AutoscalerConfig) -> Self {
        Self {
            state: Mutex::new(ScalerState {
                instance_count: config.initial_instances,
                request_counter: 0,
                last_evaluation: Instant::now(),
                last_action: None,
            }),
            config,
        }
    }

    /// Count one incoming request, evaluating scaling needs once per
    /// evaluation interval.
    pub fn record_request(&self) {
        let mut st = self.state.lock().unwrap();
        st.request_counter += 1;
        if st.last_evaluation.elapsed() > self.config.evaluation_interval {
            self.evaluate_locked(&mut st);
        }
    }

    /// Run one scaling evaluation immediately (still subject to the
    /// cooldown).
    pub fn evaluate(&self) {
        let mut st = self.state.lock().unwrap();
        self.evaluate_locked(&mut st);
    }

    /// Extrapolate the rate, act on it, then reset the counter and the
    /// evaluation clock. Skipped wholesale while the cooldown since the
    /// last completed evaluation has not elapsed, leaving the counter
    /// accumulating.
    fn evaluate_locked(&self, st: &mut ScalerState) {
        let now = Instant::now();
        if now.duration_since(st.last_evaluation) < self.config.cooldown {
            return;
        }

        let rate = self.extrapolate_rate(st.request_counter);
        if rate > self.config.request_threshold && st.instance_count < self.config.max_instances {
            self.step(st, ScaleDirection::ScaleUp);
        } else if rate < self.config.request_threshold * 0.5
            && st.instance_count > self.config.min_instances
        {
            self.step(st, ScaleDirection::ScaleDown);
        } else {
            debug!(
                rate,
                instances = st.instance_count,
                "scaling evaluation: no action"
            );
        }

        st.request_counter = 0;
        st.last_evaluation = now;
    }

    fn step(&self, st: &mut ScalerState, direction: ScaleDirection) {
        st.instance_count = match direction {
            ScaleDirection::ScaleUp => st.instance_count + 1,
            ScaleDirection::ScaleDown => st.instance_count - 1,
        };
        st.last_action = Some(ScaleAction {
            action: direction,
            timestamp: epoch_secs(),
            new_count: st.instance_count,
        });
        info!(
            action = ?direction,
            instances = st.instance_count,
            "autoscaler adjusted instance count"
        );
    }

    /// Snapshot the instance count, last action, and the current rate
    /// estimate.
    pub fn status(&self) -> ScalerStatus {
        let st = self.state.lock().unwrap();
        ScalerStatus {
            current_instances: st.instance_count,
            max_instances: self.config.max_instances,
            last_action: st.last_action.clone(),
            estimated_request_rate: self.extrapolate_rate(st.request_counter),
        }
    }

    /// Requests per minute, assuming the counter covers one evaluation
    /// interval.
    fn extrapolate_rate(&self, counter: u64) -> f64 {
        counter as f64 * (60.0 / self.config.evaluation_interval.as_secs_f64())
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn starts_at_initial_instances_with_zero_rate() {
        let scaler = RequestScaler::new(AutoscalerConfig::default());
        let status = scaler.status();
        assert_eq!(status.current_instances, 1);
        assert_eq!(status.max_instances, 10);
        assert_eq!(status.estimated_request_rate, 0.0);
        assert!(status.last_action.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn scales_up_when_rate_exceeds_threshold() {
        let scaler = RequestScaler::new(AutoscalerConfig::default());
        for _ in 0..11 {
            scaler.record_request();
        }

        tokio::time::sleep(Duration::from_secs(61)).await;
        scaler.record_request();

        let status = scaler.status();
        assert_eq!(status.current_instances, 2);
        let action = status.last_action.unwrap();
        assert_eq!(action.action, ScaleDirection::ScaleUp);
        assert_eq!(action.new_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scales_down_when_rate_falls_below_half_threshold() {
        let scaler = RequestScaler::new(AutoscalerConfig {
            initial_instances: 3,
            ..AutoscalerConfig::default()
        });

        tokio::time::sleep(Duration::from_secs(61)).await;
        scaler.evaluate();

        let status = scaler.status();
        assert_eq!(status.current_instances, 2);
        assert_eq!(status.last_action.unwrap().action, ScaleDirection::ScaleDown);
    }

    #[tokio::test(start_paused = true)]
    async fn no_action_when_rate_is_between_half_and_full_threshold() {
        let scaler = RequestScaler::new(AutoscalerConfig {
            initial_instances: 3,
            ..AutoscalerConfig::default()
        });
        // One request in the window extrapolates to 6/min: above half
        // the threshold, below the threshold.
        scaler.record_request();

        tokio::time::sleep(Duration::from_secs(61)).await;
        scaler.evaluate();

        let status = scaler.status();
        assert_eq!(status.current_instances, 3);
        assert!(status.last_action.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn no_scale_up_at_max_instances() {
        let scaler = RequestScaler::new(AutoscalerConfig {
            initial_instances: 1,
            max_instances: 1,
            ..AutoscalerConfig::default()
        });
        for _ in 0..100 {
            scaler.record_request();
        }

        tokio::time::sleep(Duration::from_secs(61)).await;
        scaler.evaluate();

        let status = scaler.status();
        assert_eq!(status.current_instances, 1);
        assert!(status.last_action.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn no_scale_down_at_min_instances() {
        let scaler = RequestScaler::new(AutoscalerConfig::default());

        tokio::time::sleep(Duration::from_secs(61)).await;
        scaler.evaluate();

        assert_eq!(scaler.status().current_instances, 1);
        assert!(scaler.status().last_action.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_bounds_actions_to_one_per_window() {
        let scaler = RequestScaler::new(AutoscalerConfig::default());
        for _ in 0..20 {
            scaler.record_request();
        }

        // A burst after the cooldown: only the first request's
        // evaluation acts, the rest land inside the fresh window.
        tokio::time::sleep(Duration::from_secs(61)).await;
        for _ in 0..20 {
            scaler.record_request();
        }
        assert_eq!(scaler.status().current_instances, 2);

        for _ in 0..20 {
            scaler.record_request();
        }
        assert_eq!(scaler.status().current_instances, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_window_can_act_again() {
        let scaler = RequestScaler::new(AutoscalerConfig::default());
        for _ in 0..20 {
            scaler.record_request();
        }

        tokio::time::sleep(Duration::from_secs(61)).await;
        for _ in 0..20 {
            scaler.record_request();
        }
        assert_eq!(scaler.status().current_instances, 2);

        tokio::time::sleep(Duration::from_secs(61)).await;
        scaler.record_request();
        assert_eq!(scaler.status().current_instances, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn evaluation_resets_counter_even_without_action() {
        let scaler = RequestScaler::new(AutoscalerConfig {
            initial_instances: 3,
            ..AutoscalerConfig::default()
        });
        scaler.record_request();
        assert_eq!(scaler.status().estimated_request_rate, 6.0);

        tokio::time::sleep(Duration::from_secs(61)).await;
        scaler.evaluate();

        assert_eq!(scaler.status().estimated_request_rate, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_skip_leaves_counter_accumulating() {
        let scaler = RequestScaler::new(AutoscalerConfig::default());
        tokio::time::sleep(Duration::from_secs(30)).await;

        for _ in 0..15 {
            scaler.record_request();
        }
        // Evaluations inside the cooldown act on nothing and reset
        // nothing.
        assert_eq!(scaler.status().current_instances, 1);
        assert_eq!(scaler.status().estimated_request_rate, 90.0);
    }

    #[tokio::test]
    async fn rate_extrapolation_follows_the_interval() {
        let scaler = RequestScaler::new(AutoscalerConfig {
            evaluation_interval: Duration::from_secs(30),
            ..AutoscalerConfig::default()
        });
        for _ in 0..5 {
            scaler.record_request();
        }
        assert_eq!(scaler.status().estimated_request_rate, 10.0);
    }
}
